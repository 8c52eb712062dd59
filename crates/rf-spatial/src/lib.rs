//! Pose and pose-key types used to index the filter library.
//!
//! A pose identifies the listener/source position and orientation (plus a
//! free-form custom tag triple) that a filter was rendered for. Poses never
//! carry geometry beyond what's needed to key into `FilterStorage` — no
//! vector math, no interpolation, no units.

pub mod error;
pub mod pose;

pub use error::{PoseError, PoseResult};
pub use pose::{Pose, PoseKey, SourcePose, SourcePoseKey, Triple};
