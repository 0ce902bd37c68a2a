//! Frame Producer - background capture thread.
//!
//! Each iteration:
//! 1. Settings barrier: clear `settings_changed`, pick up filter settings
//! 2. Filter update: replace the allow-list if a new one is queued
//! 3. Capture: block on the client's next frame, timestamp it locally
//! 4. Assembly: one pose per subject (exactly one segment each)
//! 5. Admission filtering: occlusion and object filters, conjunctively
//! 6. Ordering: allow-list order when the object filter is active
//! 7. Publish: overwrite the mailbox; signal readers unless settings changed

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::SystemTime;

use tracing::{debug, error, info, warn};

use crate::client::{StreamSettings, TrackingClient};
use crate::error::{Result, StreamError};
use crate::frame::FrameSnapshot;
use crate::geometry::PoseSample;

use super::filter::FilterConfig;
use super::shared_state::SharedState;

/// Counters reported when the producer exits.
#[derive(Debug, Default, Clone)]
pub struct ProducerStats {
    pub frames_captured: usize,
    pub frames_published: usize,
    /// Frames dropped because settings changed during capture.
    pub frames_discarded: usize,
}

/// What the producer thread hands back when it exits.
pub struct ProducerExit<C> {
    /// Disconnected client, reusable for the next connection.
    pub client: C,
    pub result: Result<()>,
    pub stats: ProducerStats,
}

/// Background worker owning the tracking client for one connection.
pub struct FrameProducer<C: TrackingClient> {
    client: C,
    filter: FilterConfig,
    shared: Arc<SharedState>,
    stats: ProducerStats,
}

impl<C: TrackingClient> FrameProducer<C> {
    /// Connect `client` to `address` and set up the stream.
    ///
    /// Failure to enable lightweight mode is not fatal. A rejected stream
    /// setup disconnects the client again.
    pub fn connect_client(
        client: &mut C,
        address: &str,
        lightweight: bool,
        stream: &StreamSettings,
    ) -> Result<()> {
        stream.validate()?;
        let connection_error = |source| StreamError::Connection {
            address: address.to_owned(),
            source,
        };

        client.connect(address).map_err(connection_error)?;

        if lightweight {
            match client.enable_lightweight_segment_data() {
                Ok(()) => info!("Using lightweight segment data"),
                Err(e) => warn!(
                    "Lightweight segment data not enabled ({:#}). Continuing in normal mode",
                    e
                ),
            }
        }

        if let Err(e) = client.configure_stream(stream) {
            client.disconnect();
            return Err(connection_error(e));
        }
        debug!(
            "Stream configured: mode={:?}, buffer_size={}, axes={:?}",
            stream.mode, stream.buffer_size, stream.axis_mapping
        );
        Ok(())
    }

    /// Create a producer for an already connected client.
    pub fn new(client: C, shared: Arc<SharedState>) -> Self {
        Self {
            client,
            filter: FilterConfig::default(),
            shared,
            stats: ProducerStats::default(),
        }
    }

    /// Run the producer on its own thread.
    pub fn spawn(self) -> JoinHandle<ProducerExit<C>> {
        thread::spawn(move || self.run_to_exit())
    }

    fn run_to_exit(mut self) -> ProducerExit<C> {
        info!("Frame producer started");

        // A panicking client must still release blocked readers
        let result = match panic::catch_unwind(AssertUnwindSafe(|| self.run())) {
            Ok(result) => result,
            Err(payload) => Err(StreamError::ProducerStopped(panic_message(payload.as_ref()))),
        };
        match &result {
            Ok(()) => self.shared.producer_exited(None),
            Err(e) => {
                error!("Frame producer aborted: {:#}", e);
                self.shared.producer_exited(Some(e.to_string()));
            }
        }
        self.client.disconnect();

        info!(
            "Frame producer exiting. Stats: captured={}, published={}, discarded={}",
            self.stats.frames_captured, self.stats.frames_published, self.stats.frames_discarded
        );

        ProducerExit {
            client: self.client,
            result,
            stats: self.stats,
        }
    }

    /// Main loop. Returns when shutdown is requested or on a fatal error.
    pub fn run(&mut self) -> Result<()> {
        while !self.shared.is_shutdown_requested() {
            // Steps 1-2: barrier and filter update
            if self.shared.begin_iteration(&mut self.filter) {
                debug!("Allow-list updated: {:?}", self.filter.allow_list);
            }

            // Steps 3-5
            let frame = match self.capture() {
                Ok(frame) => frame,
                Err(StreamError::CaptureFailed(e)) if self.shared.is_shutdown_requested() => {
                    debug!("Capture interrupted by shutdown: {:#}", e);
                    break;
                }
                Err(e) => return Err(e),
            };
            self.stats.frames_captured += 1;

            // Step 6
            let frame = self.filter.arrange(frame);

            // Step 7
            let frame_number = frame.frame_number();
            if self.shared.publish(frame) {
                self.stats.frames_published += 1;
            } else {
                self.stats.frames_discarded += 1;
                debug!(
                    "Discarding frame {:?}: settings changed during capture",
                    frame_number
                );
            }
        }
        Ok(())
    }

    /// Wait for the next server frame and build an admitted snapshot from it.
    fn capture(&mut self) -> Result<FrameSnapshot> {
        self.client
            .next_frame()
            .map_err(StreamError::CaptureFailed)?;
        // The server supplies no timestamp
        let captured_at = SystemTime::now();
        self.shared.record_frame_rate(self.client.frame_rate());

        let mut frame = FrameSnapshot::new(self.client.frame_number(), captured_at);
        for subject in self.client.subject_names() {
            let sample = self.read_subject(&subject)?;
            if self.filter.admits(&sample) {
                frame.add_sample(sample);
            }
        }
        Ok(frame)
    }

    fn read_subject(&self, subject: &str) -> Result<PoseSample> {
        let segments = self.client.segment_names(subject);
        let [segment] = segments.as_slice() else {
            return Err(StreamError::InvariantViolation(format!(
                "subject '{}' reports {} segments, expected exactly 1",
                subject,
                segments.len()
            )));
        };

        let translation = self.client.segment_global_translation(subject, segment);
        let rotation = self.client.segment_global_rotation_matrix(subject, segment);
        if translation.occluded || rotation.occluded {
            return Ok(PoseSample::occluded(subject));
        }

        match PoseSample::from_row_major(subject, &rotation.value, &translation.value) {
            Ok(sample) => Ok(sample),
            Err(e) => {
                warn!("Rejected pose of '{}', treating as occluded: {}", subject, e);
                Ok(PoseSample::occluded(subject))
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("tracking client panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("tracking client panicked: {}", s)
    } else {
        "tracking client panicked with unknown payload".to_string()
    }
}
