//! Boundary to the tracking server's network client.
//!
//! The wire protocol lives behind [`TrackingClient`]; this crate only drives
//! it from the frame producer thread. [`scripted`] provides an in-process
//! implementation fed through a channel.

pub mod scripted;
pub mod stream;

pub use scripted::{ScriptedClient, ScriptedFeed, ScriptedFrame, ScriptedSubject, scripted};
pub use stream::{AxisDirection, AxisMapping, StreamMode, StreamSettings};

/// A value reported by the server together with its occlusion flag.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading<T> {
    pub value: T,
    pub occluded: bool,
}

impl<T> Reading<T> {
    /// Reading the server reported as valid.
    pub fn visible(value: T) -> Self {
        Self {
            value,
            occluded: false,
        }
    }

    /// Reading flagged as occluded. `value` is meaningless.
    pub fn occluded(value: T) -> Self {
        Self {
            value,
            occluded: true,
        }
    }
}

/// Capability of a tracking-server client.
///
/// Queries other than `next_frame` describe the frame most recently
/// received by `next_frame`.
pub trait TrackingClient: Send + 'static {
    fn connect(&mut self, address: &str) -> anyhow::Result<()>;

    fn disconnect(&mut self);

    /// Trade precision for roughly a quarter of the bandwidth.
    fn enable_lightweight_segment_data(&mut self) -> anyhow::Result<()>;

    /// Enable segment data and apply stream mode, buffer size and axis mapping.
    fn configure_stream(&mut self, settings: &StreamSettings) -> anyhow::Result<()>;

    /// Block until the server delivers the next frame.
    fn next_frame(&mut self) -> anyhow::Result<()>;

    fn frame_number(&self) -> u64;

    /// Server capture rate in Hz.
    fn frame_rate(&self) -> f64;

    fn subject_names(&self) -> Vec<String>;

    fn segment_names(&self, subject: &str) -> Vec<String>;

    fn segment_global_translation(&self, subject: &str, segment: &str) -> Reading<[f64; 3]>;

    /// Global rotation matrix in row-major order.
    fn segment_global_rotation_matrix(&self, subject: &str, segment: &str) -> Reading<[f64; 9]>;
}
