pub mod client;
pub mod error;
pub mod frame;
pub mod geometry;
pub mod system;

pub use client::{AxisDirection, AxisMapping, Reading, StreamMode, StreamSettings, TrackingClient};
pub use error::{Result, StreamError};
pub use frame::FrameSnapshot;
pub use geometry::{Pose, PoseSample};
pub use system::{HubConfig, SyncHub};
