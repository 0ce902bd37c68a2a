//! Shared state between the frame producer thread and consumers.
//!
//! Everything except the kill flag lives behind one mutex, held only for
//! constant-time updates. Signals:
//! - `frame_ready`: a frame built with current settings is waiting in the mailbox
//!   or the cache. Readers block on the condition variable until it is set.
//! - `frame_consumed`: the latest delivered frame has been read.
//! - `settings_changed`: a filter mutator ran since the producer's last barrier;
//!   the frame being captured must not be delivered.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Condvar, Mutex};

use crate::error::{Result, StreamError};
use crate::frame::FrameSnapshot;

use super::filter::FilterConfig;

struct HubState {
    /// Single-slot mailbox; a new frame overwrites an unread one.
    mailbox: Option<Arc<FrameSnapshot>>,
    /// Last frame handed to a consumer.
    cached: Arc<FrameSnapshot>,

    frame_ready: bool,
    frame_consumed: bool,
    settings_changed: bool,

    object_filter: bool,
    occluded_filter: bool,
    /// Authoritative allow-list, kept across reconnects.
    allow_list: Vec<String>,
    /// Allow-list change queue. The producer drains it whole at its barrier.
    pending_allow_list: Option<Vec<String>>,

    frame_rate: Option<f64>,
    connected: bool,
    producer_running: bool,
    /// Message of the fatal error that stopped the producer.
    fault: Option<String>,
}

/// State shared by `SyncHub` and its `FrameProducer`.
pub struct SharedState {
    state: Mutex<HubState>,
    frame_ready: Condvar,

    /// Request the producer to finish its current iteration and exit.
    shutdown_requested: AtomicBool,
}

impl SharedState {
    /// Create shared state with no producer running.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Reset signals and the mailbox before a producer starts.
    ///
    /// The configured allow-list is queued again so the new producer starts
    /// with it.
    pub fn reset_for_connect(&self) {
        self.shutdown_requested.store(false, Ordering::SeqCst);

        let mut state = self.state.lock();
        state.mailbox = None;
        state.frame_ready = false;
        state.frame_consumed = false;
        state.settings_changed = false;
        state.pending_allow_list = Some(state.allow_list.clone());
        state.frame_rate = None;
        state.producer_running = true;
        state.fault = None;
    }

    /// Record whether the hub reports itself connected.
    pub fn set_connected(&self, connected: bool) {
        self.state.lock().connected = connected;
    }

    /// True between a successful connect and the next disconnect.
    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    /// Ask the producer to exit after its current capture.
    pub fn request_shutdown(&self) {
        self.shutdown_requested.store(true, Ordering::SeqCst);
    }

    /// Check whether shutdown was requested.
    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }

    /// Called once by the producer as it exits. Wakes every blocked reader.
    pub fn producer_exited(&self, fault: Option<String>) {
        {
            let mut state = self.state.lock();
            state.producer_running = false;
            if fault.is_some() {
                state.fault = fault;
            }
        }
        self.frame_ready.notify_all();
    }

    // ------------------------------------------------------------------
    // Settings (consumer side)
    // ------------------------------------------------------------------

    /// Replace the allow-list wholesale and activate the object filter.
    pub fn enable_object_filter(&self, allow_list: Vec<String>) {
        let mut state = self.state.lock();
        state.pending_allow_list = Some(allow_list.clone());
        state.allow_list = allow_list;
        state.object_filter = true;
        Self::mark_settings_changed(&mut state);
    }

    /// Deliver every subject again. The allow-list is kept.
    pub fn disable_object_filter(&self) {
        let mut state = self.state.lock();
        state.object_filter = false;
        Self::mark_settings_changed(&mut state);
    }

    /// Drop or keep occluded subjects.
    pub fn set_occluded_filter(&self, active: bool) {
        let mut state = self.state.lock();
        state.occluded_filter = active;
        Self::mark_settings_changed(&mut state);
    }

    /// Invalidate the ready frame and flag the in-flight capture as stale.
    fn mark_settings_changed(state: &mut HubState) {
        state.frame_ready = false;
        state.settings_changed = true;
    }

    // ------------------------------------------------------------------
    // Producer side
    // ------------------------------------------------------------------

    /// Settings barrier. Settings changed after this call invalidate the
    /// frame captured in this iteration.
    ///
    /// Copies the current filter flags into `filter` and, if the allow-list
    /// queue holds a new list, replaces `filter.allow_list` with it.
    pub fn begin_iteration(&self, filter: &mut FilterConfig) -> bool {
        let mut state = self.state.lock();
        state.settings_changed = false;
        filter.object_filter = state.object_filter;
        filter.occluded_filter = state.occluded_filter;
        match state.pending_allow_list.take() {
            Some(allow_list) => {
                filter.allow_list = allow_list;
                true
            }
            None => false,
        }
    }

    /// Store the frame rate reported with the latest capture.
    pub fn record_frame_rate(&self, frame_rate: f64) {
        self.state.lock().frame_rate = Some(frame_rate);
    }

    /// Overwrite the mailbox with `frame` and signal readers.
    ///
    /// Returns `false` if settings changed since the barrier; the frame then
    /// stays in the mailbox but readers are not signalled.
    pub fn publish(&self, frame: FrameSnapshot) -> bool {
        let frame = Arc::new(frame);
        {
            let mut state = self.state.lock();
            state.mailbox = Some(frame);
            if state.settings_changed {
                return false;
            }
            state.frame_consumed = false;
            state.frame_ready = true;
        }
        self.frame_ready.notify_all();
        true
    }

    // ------------------------------------------------------------------
    // Frame reads (consumer side)
    // ------------------------------------------------------------------

    /// Last recorded frame rate, `None` before the first capture.
    pub fn frame_rate(&self) -> Option<f64> {
        self.state.lock().frame_rate
    }

    /// Make the next wait block for a newly published frame.
    pub fn clear_frame_ready(&self) {
        self.state.lock().frame_ready = false;
    }

    /// Block until a frame is ready, then take it and mark it consumed.
    ///
    /// There is no timeout. Returns early only when the producer exits: with
    /// its fault if it failed, otherwise with an empty snapshot. A mailbox
    /// frame that was never signalled is stale and is not handed out.
    pub fn wait_for_frame(&self) -> Result<Arc<FrameSnapshot>> {
        let mut state = self.state.lock();
        while !state.frame_ready && state.producer_running {
            self.frame_ready.wait(&mut state);
        }

        if let Some(fault) = &state.fault {
            return Err(StreamError::ProducerStopped(fault.clone()));
        }
        if !state.frame_ready {
            return Ok(Arc::new(FrameSnapshot::default()));
        }
        if let Some(frame) = state.mailbox.take() {
            state.cached = frame;
        }
        state.frame_consumed = true;
        Ok(Arc::clone(&state.cached))
    }

    /// Latest frame if it is ready and has not been consumed yet, without
    /// marking it consumed.
    ///
    /// If the latest frame was already consumed, `frame_ready` is cleared so
    /// the next wait blocks for a newer one.
    pub fn take_unread(&self) -> Option<Arc<FrameSnapshot>> {
        let mut state = self.state.lock();
        if state.frame_consumed {
            state.frame_ready = false;
            return None;
        }
        if !state.frame_ready {
            return None;
        }
        if let Some(frame) = state.mailbox.take() {
            state.cached = frame;
        }
        Some(Arc::clone(&state.cached))
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self {
            state: Mutex::new(HubState {
                mailbox: None,
                cached: Arc::new(FrameSnapshot::default()),
                frame_ready: false,
                frame_consumed: false,
                settings_changed: false,
                object_filter: false,
                occluded_filter: false,
                allow_list: Vec::new(),
                pending_allow_list: None,
                frame_rate: None,
                connected: false,
                producer_running: false,
                fault: None,
            }),
            frame_ready: Condvar::new(),
            shutdown_requested: AtomicBool::new(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    fn frame(n: u64) -> FrameSnapshot {
        FrameSnapshot::new(n, SystemTime::now())
    }

    fn running() -> Arc<SharedState> {
        let shared = SharedState::new();
        shared.reset_for_connect();
        shared
    }

    #[test]
    fn test_mailbox_keeps_only_latest() {
        let shared = running();
        let mut filter = FilterConfig::default();

        shared.begin_iteration(&mut filter);
        assert!(shared.publish(frame(1)));
        shared.begin_iteration(&mut filter);
        assert!(shared.publish(frame(2)));

        assert_eq!(shared.wait_for_frame().unwrap().frame_number(), Some(2));
        // Frame 1 is gone for good
        assert_eq!(shared.wait_for_frame().unwrap().frame_number(), Some(2));
    }

    #[test]
    fn test_settings_change_suppresses_in_flight_frame() {
        let shared = running();
        let mut filter = FilterConfig::default();

        shared.begin_iteration(&mut filter);
        shared.set_occluded_filter(true);
        assert!(!shared.publish(frame(1)));
        assert!(!filter.occluded_filter);

        shared.begin_iteration(&mut filter);
        assert!(filter.occluded_filter);
        assert!(shared.publish(frame(2)));
        assert_eq!(shared.wait_for_frame().unwrap().frame_number(), Some(2));
    }

    #[test]
    fn test_allow_list_queue_is_drained_whole() {
        let shared = running();
        let mut filter = FilterConfig::default();

        // reset_for_connect queues the (empty) configured list
        assert!(shared.begin_iteration(&mut filter));
        assert!(!shared.begin_iteration(&mut filter));

        shared.enable_object_filter(vec!["A".into(), "B".into()]);
        shared.enable_object_filter(vec!["C".into()]);
        assert!(shared.begin_iteration(&mut filter));
        assert_eq!(filter.allow_list, ["C"]);
        assert!(filter.object_filter);
    }

    #[test]
    fn test_take_unread_does_not_consume() {
        let shared = running();
        let mut filter = FilterConfig::default();
        shared.begin_iteration(&mut filter);
        shared.publish(frame(5));

        let first = shared.take_unread().unwrap();
        let second = shared.take_unread().unwrap();
        assert_eq!(first, second);

        shared.wait_for_frame().unwrap();
        assert!(shared.take_unread().is_none());
    }

    #[test]
    fn test_producer_fault_wakes_readers() {
        let shared = running();
        let reader = {
            let shared = Arc::clone(&shared);
            std::thread::spawn(move || shared.wait_for_frame())
        };

        shared.producer_exited(Some("segment count".into()));
        let result = reader.join().unwrap();
        assert!(matches!(result, Err(StreamError::ProducerStopped(_))));
    }

    #[test]
    fn test_producer_exit_does_not_leak_discarded_frame() {
        let shared = running();
        let mut filter = FilterConfig::default();
        shared.begin_iteration(&mut filter);
        shared.set_occluded_filter(true);
        assert!(!shared.publish(frame(2)));

        let reader = {
            let shared = Arc::clone(&shared);
            std::thread::spawn(move || shared.wait_for_frame())
        };
        shared.producer_exited(None);

        let delivered = reader.join().unwrap().unwrap();
        assert!(delivered.is_empty());
        assert_eq!(delivered.frame_number(), None);
    }

    #[test]
    fn test_reconnect_requeues_configured_allow_list() {
        let shared = SharedState::new();
        shared.enable_object_filter(vec!["B".into(), "A".into()]);
        shared.reset_for_connect();

        let mut filter = FilterConfig::default();
        shared.begin_iteration(&mut filter);
        assert_eq!(filter.allow_list, ["B", "A"]);
    }
}
