//! Sync Hub - consumer-facing entry point.
//!
//! The `SyncHub` owns the shared state, starts and stops the frame producer,
//! applies filter settings and serves frame reads. All methods take `&self`,
//! so one hub can be shared between consumer threads.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use std::thread::JoinHandle;

use anyhow::Context;
use parking_lot::Mutex;
use serde::Deserialize;
use tracing::{info, warn};

use crate::client::{StreamSettings, TrackingClient};
use crate::error::{Result, StreamError};
use crate::frame::FrameSnapshot;

use super::producer::{FrameProducer, ProducerExit};
use super::shared_state::SharedState;

/// Connection and filter settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Tracking server address, `host:port`.
    pub address: String,

    /// Reduce bandwidth at the cost of precision.
    pub lightweight: bool,

    /// Drop occluded subjects from delivered frames.
    pub occluded_filter: bool,

    /// Deliver only these subjects, in this order.
    pub object_filter: Option<Vec<String>>,

    /// Stream mode, buffer size and axis mapping.
    pub stream: StreamSettings,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            address: "localhost:801".to_string(),
            lightweight: false,
            occluded_filter: false,
            object_filter: None,
            stream: StreamSettings::default(),
        }
    }
}

impl HubConfig {
    /// Parse a config from YAML text. Missing keys take their defaults.
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        serde_yaml::from_str(yaml).context("Failed to parse hub config")
    }

    /// Load a config from a YAML file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
        serde_yaml::from_reader(file).with_context(|| format!("Failed to parse {:?}", path))
    }
}

struct Lifecycle<C> {
    /// Client waiting for the next connection. `None` while the producer owns it.
    client: Option<C>,

    /// Handle to the producer thread. `Some` iff connected.
    producer: Option<JoinHandle<ProducerExit<C>>>,
}

/// Latest-frame access to a tracking server.
pub struct SyncHub<C: TrackingClient> {
    shared: Arc<SharedState>,
    lifecycle: Mutex<Lifecycle<C>>,
}

impl<C: TrackingClient> SyncHub<C> {
    /// Create a disconnected hub around `client`.
    pub fn new(client: C) -> Self {
        Self {
            shared: SharedState::new(),
            lifecycle: Mutex::new(Lifecycle {
                client: Some(client),
                producer: None,
            }),
        }
    }

    /// True between a successful connect and the next disconnect.
    pub fn is_connected(&self) -> bool {
        self.shared.is_connected()
    }

    /// Connect, start the producer and wait for the first frame.
    ///
    /// The stream runs in server-push mode with a one-frame buffer.
    /// Does nothing if already connected.
    pub fn connect(&self, address: &str, lightweight: bool) -> Result<()> {
        self.start(address, lightweight, &StreamSettings::default())
    }

    fn start(&self, address: &str, lightweight: bool, stream: &StreamSettings) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.producer.is_some() {
            return Ok(());
        }

        let mut client = lifecycle.client.take().ok_or(StreamError::ClientUnavailable)?;
        if let Err(e) = FrameProducer::connect_client(&mut client, address, lightweight, stream) {
            lifecycle.client = Some(client);
            return Err(e);
        }

        self.shared.reset_for_connect();
        let handle = FrameProducer::new(client, Arc::clone(&self.shared)).spawn();
        lifecycle.producer = Some(handle);

        // Make sure data is flowing before reporting success
        if let Err(e) = self.shared.wait_for_frame() {
            self.shared.request_shutdown();
            let Some(handle) = lifecycle.producer.take() else {
                return Err(e);
            };
            let (client, result) = Self::join_producer(handle, &self.shared);
            lifecycle.client = client;
            return Err(result.err().unwrap_or(e));
        }

        self.shared.set_connected(true);
        info!("Connected to {}, ready to capture data", address);
        Ok(())
    }

    /// Apply the filters in `config`, then connect.
    pub fn connect_with(&self, config: &HubConfig) -> Result<()> {
        match &config.object_filter {
            Some(names) => self.enable_object_filter(names.iter().cloned()),
            None => self.disable_object_filter(),
        }
        if config.occluded_filter {
            self.enable_occluded_filter();
        } else {
            self.disable_occluded_filter();
        }
        self.start(&config.address, config.lightweight, &config.stream)
    }

    /// Stop the producer and release the connection.
    ///
    /// Blocks for up to one capture cycle. Returns the producer's fatal error
    /// if it stopped on one. Does nothing if disconnected.
    pub fn disconnect(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock();
        let Some(handle) = lifecycle.producer.take() else {
            return Ok(());
        };

        self.shared.request_shutdown();
        let (client, result) = Self::join_producer(handle, &self.shared);
        lifecycle.client = client;
        self.shared.set_connected(false);

        info!("Disconnected from tracking server");
        result
    }

    fn join_producer(
        handle: JoinHandle<ProducerExit<C>>,
        shared: &SharedState,
    ) -> (Option<C>, Result<()>) {
        match handle.join() {
            Ok(exit) => (Some(exit.client), exit.result),
            Err(_) => {
                let message = "frame producer thread panicked".to_string();
                shared.producer_exited(Some(message.clone()));
                (None, Err(StreamError::ProducerStopped(message)))
            }
        }
    }

    // ------------------------------------------------------------------
    // Filters
    //
    // Each mutator invalidates the ready frame and marks the in-flight
    // capture stale, so the next delivered frame uses the new settings.
    // ------------------------------------------------------------------

    /// Deliver only `names`, in that order. Replaces any previous list.
    pub fn enable_object_filter<I, S>(&self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.shared
            .enable_object_filter(names.into_iter().map(Into::into).collect());
    }

    /// Deliver every subject again.
    pub fn disable_object_filter(&self) {
        self.shared.disable_object_filter();
    }

    /// Drop occluded subjects from delivered frames.
    pub fn enable_occluded_filter(&self) {
        self.shared.set_occluded_filter(true);
    }

    /// Keep occluded subjects in delivered frames.
    pub fn disable_occluded_filter(&self) {
        self.shared.set_occluded_filter(false);
    }

    // ------------------------------------------------------------------
    // Frames
    // ------------------------------------------------------------------

    /// Latest frame, blocking until one built with current settings exists.
    ///
    /// Returns the same frame again until the producer publishes a newer one.
    /// While disconnected, returns an empty snapshot.
    pub fn get_frame(&self) -> Result<Arc<FrameSnapshot>> {
        if !self.shared.is_connected() {
            warn!("get_frame called while not connected");
            return Ok(Arc::new(FrameSnapshot::default()));
        }
        self.shared.wait_for_frame()
    }

    /// Block for a frame published after this call.
    pub fn get_frame_wait_for_new(&self) -> Result<Arc<FrameSnapshot>> {
        self.shared.clear_frame_ready();
        self.get_frame()
    }

    /// Latest frame if it has not been consumed yet, without consuming it.
    /// Otherwise block for a new frame.
    pub fn get_frame_get_unread(&self) -> Result<Arc<FrameSnapshot>> {
        if self.shared.is_connected() {
            if let Some(frame) = self.shared.take_unread() {
                return Ok(frame);
            }
        }
        self.get_frame()
    }

    /// Last frame rate reported by the server, in Hz.
    pub fn get_frame_rate(&self) -> Option<f64> {
        self.shared.frame_rate()
    }
}

impl<C: TrackingClient> Drop for SyncHub<C> {
    fn drop(&mut self) {
        if let Err(e) = self.disconnect() {
            warn!("Frame producer ended with error: {}", e);
        }
    }
}
