//! Frame delivery orchestration and thread management.
//!
//! This module contains the `SyncHub` that consumers talk to, the background
//! `FrameProducer` it spawns, and the shared state and filters they
//! coordinate through.
//!
//! # Threading Model
//!
//! One producer thread per connection runs alongside any number of consumer
//! threads. All shared state sits behind a single mutex in `SharedState`;
//! consumers wait on its condition variable for the next ready frame. The
//! producer only blocks inside the client's `next_frame`.

pub mod filter;
pub mod producer;
pub mod shared_state;
mod sync_hub;

pub use filter::FilterConfig;
pub use producer::{FrameProducer, ProducerExit, ProducerStats};
pub use shared_state::SharedState;
pub use sync_hub::{HubConfig, SyncHub};
