//! In-process tracking client driven by a channel.
//!
//! `ScriptedClient` blocks in `next_frame` until the paired `ScriptedFeed`
//! pushes a frame, which lets callers decide exactly when the producer
//! thread makes progress. Every entry into `next_frame` is reported back to
//! the feed so callers can wait until a capture is in flight.

use std::time::Duration;

use anyhow::{Context, bail};
use crossbeam_channel::{Receiver, Sender, unbounded};

use super::{Reading, StreamSettings, TrackingClient};

const IDENTITY_ROW_MAJOR: [f64; 9] = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];

/// One subject as the server would report it.
#[derive(Debug, Clone)]
pub struct ScriptedSubject {
    pub name: String,
    pub segments: Vec<String>,
    pub translation: Reading<[f64; 3]>,
    pub rotation: Reading<[f64; 9]>,
}

impl ScriptedSubject {
    /// Visible subject with identity orientation and a single segment.
    pub fn visible(name: impl Into<String>, translation: [f64; 3]) -> Self {
        let name = name.into();
        Self {
            segments: vec![name.clone()],
            name,
            translation: Reading::visible(translation),
            rotation: Reading::visible(IDENTITY_ROW_MAJOR),
        }
    }

    /// Subject the server can currently not see.
    pub fn occluded(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            segments: vec![name.clone()],
            name,
            translation: Reading::occluded([0.0; 3]),
            rotation: Reading::occluded([0.0; 9]),
        }
    }

    /// Replace the rotation, given row by row, keeping the occlusion flag.
    pub fn with_rotation(mut self, row_major: [f64; 9]) -> Self {
        self.rotation = Reading {
            value: row_major,
            occluded: self.rotation.occluded,
        };
        self
    }

    /// Report these segment names instead of a single one named after the subject.
    pub fn with_segments<I, S>(mut self, segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.segments = segments.into_iter().map(Into::into).collect();
        self
    }
}

/// One server frame.
#[derive(Debug, Clone)]
pub struct ScriptedFrame {
    pub frame_number: u64,
    pub frame_rate: f64,
    pub subjects: Vec<ScriptedSubject>,
}

impl ScriptedFrame {
    /// Frame reported at 100 Hz.
    pub fn new(frame_number: u64, subjects: Vec<ScriptedSubject>) -> Self {
        Self {
            frame_number,
            frame_rate: 100.0,
            subjects,
        }
    }

    /// Override the reported frame rate.
    pub fn with_frame_rate(mut self, frame_rate: f64) -> Self {
        self.frame_rate = frame_rate;
        self
    }
}

/// Client half. Hand it to a `SyncHub`.
pub struct ScriptedClient {
    frames: Receiver<ScriptedFrame>,
    captures: Sender<u64>,
    current: Option<ScriptedFrame>,
    capture_count: u64,
    connected: bool,
    reachable: bool,
    lightweight_supported: bool,
    lightweight: bool,
    panic_on_capture: Option<u64>,
    stream_setup_supported: bool,
    stream_settings: Option<StreamSettings>,
}

/// Control half: pushes frames and observes captures.
pub struct ScriptedFeed {
    frames: Sender<ScriptedFrame>,
    /// Second handle on the frame queue, used to discard undelivered frames.
    pending: Receiver<ScriptedFrame>,
    captures: Receiver<u64>,
}

/// Create a connected client/feed pair.
pub fn scripted() -> (ScriptedClient, ScriptedFeed) {
    let (frame_tx, frame_rx) = unbounded();
    let (capture_tx, capture_rx) = unbounded();

    let client = ScriptedClient {
        frames: frame_rx.clone(),
        captures: capture_tx,
        current: None,
        capture_count: 0,
        connected: false,
        reachable: true,
        lightweight_supported: true,
        lightweight: false,
        panic_on_capture: None,
        stream_setup_supported: true,
        stream_settings: None,
    };
    let feed = ScriptedFeed {
        frames: frame_tx,
        pending: frame_rx,
        captures: capture_rx,
    };
    (client, feed)
}

impl ScriptedClient {
    /// Make every `connect` call fail.
    pub fn unreachable(mut self) -> Self {
        self.reachable = false;
        self
    }

    /// Make `enable_lightweight_segment_data` fail.
    pub fn without_lightweight(mut self) -> Self {
        self.lightweight_supported = false;
        self
    }

    /// Panic inside `next_frame` on the given 1-based capture, as a faulty
    /// vendor client might.
    pub fn panics_on_capture(mut self, capture: u64) -> Self {
        self.panic_on_capture = Some(capture);
        self
    }

    /// Make `configure_stream` fail.
    pub fn without_stream_setup(mut self) -> Self {
        self.stream_setup_supported = false;
        self
    }

    /// Settings applied by the last `configure_stream`.
    pub fn stream_settings(&self) -> Option<&StreamSettings> {
        self.stream_settings.as_ref()
    }

    /// Whether lightweight segment data was enabled.
    pub fn is_lightweight(&self) -> bool {
        self.lightweight
    }

    /// Whether `connect` succeeded and `disconnect` has not run since.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    fn subject(&self, name: &str) -> Option<&ScriptedSubject> {
        self.current
            .as_ref()
            .and_then(|frame| frame.subjects.iter().find(|s| s.name == name))
    }
}

impl TrackingClient for ScriptedClient {
    fn connect(&mut self, address: &str) -> anyhow::Result<()> {
        if !self.reachable {
            bail!("no tracking server answering at {}", address);
        }
        self.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) {
        self.connected = false;
        self.lightweight = false;
        self.current = None;
    }

    fn enable_lightweight_segment_data(&mut self) -> anyhow::Result<()> {
        if !self.lightweight_supported {
            bail!("server does not support lightweight segment data");
        }
        self.lightweight = true;
        Ok(())
    }

    fn configure_stream(&mut self, settings: &StreamSettings) -> anyhow::Result<()> {
        if !self.stream_setup_supported {
            bail!("server rejected stream mode {:?}", settings.mode);
        }
        self.stream_settings = Some(settings.clone());
        Ok(())
    }

    fn next_frame(&mut self) -> anyhow::Result<()> {
        if !self.connected {
            bail!("client is not connected");
        }
        self.capture_count += 1;
        // The feed may already be gone; that only matters to observers.
        let _ = self.captures.send(self.capture_count);
        if self.panic_on_capture == Some(self.capture_count) {
            panic!("scripted failure on capture {}", self.capture_count);
        }

        let frame = self.frames.recv().context("frame feed closed")?;
        self.current = Some(frame);
        Ok(())
    }

    fn frame_number(&self) -> u64 {
        self.current.as_ref().map_or(0, |f| f.frame_number)
    }

    fn frame_rate(&self) -> f64 {
        self.current.as_ref().map_or(0.0, |f| f.frame_rate)
    }

    fn subject_names(&self) -> Vec<String> {
        self.current
            .as_ref()
            .map(|f| f.subjects.iter().map(|s| s.name.clone()).collect())
            .unwrap_or_default()
    }

    fn segment_names(&self, subject: &str) -> Vec<String> {
        self.subject(subject)
            .map(|s| s.segments.clone())
            .unwrap_or_default()
    }

    fn segment_global_translation(&self, subject: &str, _segment: &str) -> Reading<[f64; 3]> {
        self.subject(subject)
            .map_or(Reading::occluded([0.0; 3]), |s| s.translation)
    }

    fn segment_global_rotation_matrix(&self, subject: &str, _segment: &str) -> Reading<[f64; 9]> {
        self.subject(subject)
            .map_or(Reading::occluded([0.0; 9]), |s| s.rotation)
    }
}

impl ScriptedFeed {
    /// Queue a frame for delivery. Frames are delivered in push order.
    pub fn push(&self, frame: ScriptedFrame) {
        // The feed holds a receiver itself, so this cannot fail
        let _ = self.frames.send(frame);
    }

    /// Drop frames pushed but not yet delivered. Returns how many were dropped.
    pub fn clear(&self) -> usize {
        self.pending.try_iter().count()
    }

    /// Wait until the client enters `next_frame`, returning the 1-based capture count.
    pub fn await_capture(&self, timeout: Duration) -> Option<u64> {
        self.captures.recv_timeout(timeout).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_frame_delivers_pushed_frames_in_order() {
        let (mut client, feed) = scripted();
        client.connect("localhost:801").unwrap();

        feed.push(ScriptedFrame::new(1, vec![ScriptedSubject::visible("A", [1.0, 2.0, 3.0])]));
        feed.push(ScriptedFrame::new(2, vec![ScriptedSubject::occluded("B")]).with_frame_rate(250.0));

        client.next_frame().unwrap();
        assert_eq!(client.frame_number(), 1);
        assert_eq!(client.subject_names(), ["A"]);
        assert_eq!(client.segment_names("A"), ["A"]);
        assert_eq!(
            client.segment_global_translation("A", "A"),
            Reading::visible([1.0, 2.0, 3.0])
        );

        client.next_frame().unwrap();
        assert_eq!(client.frame_number(), 2);
        assert_eq!(client.frame_rate(), 250.0);
        assert!(client.segment_global_rotation_matrix("B", "B").occluded);

        assert_eq!(feed.await_capture(Duration::from_secs(1)), Some(1));
        assert_eq!(feed.await_capture(Duration::from_secs(1)), Some(2));
    }

    #[test]
    fn test_clear_discards_undelivered_frames() {
        let (mut client, feed) = scripted();
        client.connect("localhost:801").unwrap();
        feed.push(ScriptedFrame::new(1, Vec::new()));
        feed.push(ScriptedFrame::new(2, Vec::new()));

        assert_eq!(feed.clear(), 2);
        feed.push(ScriptedFrame::new(3, Vec::new()));
        client.next_frame().unwrap();
        assert_eq!(client.frame_number(), 3);
    }

    #[test]
    fn test_closed_feed_fails_capture() {
        let (mut client, feed) = scripted();
        client.connect("localhost:801").unwrap();
        drop(feed);

        assert!(client.next_frame().is_err());
    }

    #[test]
    fn test_unreachable_and_lightweight_switches() {
        let (client, _feed) = scripted();
        let mut client = client.unreachable().without_lightweight();

        assert!(client.connect("10.0.0.1:801").is_err());
        assert!(client.next_frame().is_err());
        assert!(client.enable_lightweight_segment_data().is_err());
        assert!(!client.is_lightweight());

        let mut client = scripted().0.without_stream_setup();
        assert!(client.configure_stream(&StreamSettings::default()).is_err());
        assert!(client.stream_settings().is_none());
    }
}
