//! Rigid-body pose data model and its composition algebra.

pub mod pose;

pub use pose::{Pose, PoseSample};
