//! Frame snapshots handed to consumers.

pub mod snapshot;

pub use snapshot::FrameSnapshot;
