//! Error types for the frame-delivery pipeline.

use thiserror::Error;

/// Errors raised by pose construction, the frame producer and the sync hub.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The tracking client could not connect to the server.
    #[error("failed to connect to {address}")]
    Connection {
        address: String,
        #[source]
        source: anyhow::Error,
    },

    /// The client's blocking frame call failed while streaming.
    #[error("frame capture failed")]
    CaptureFailed(#[source] anyhow::Error),

    /// The server reported data this pipeline cannot represent.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// Malformed pose input, or an operation on an occluded pose.
    #[error("validation error: {0}")]
    Validation(String),

    /// The producer terminated on a fatal error; no further frames will arrive.
    #[error("frame producer stopped: {0}")]
    ProducerStopped(String),

    /// The client was lost when the producer thread panicked.
    #[error("tracking client is no longer available")]
    ClientUnavailable,
}

pub type Result<T, E = StreamError> = std::result::Result<T, E>;
