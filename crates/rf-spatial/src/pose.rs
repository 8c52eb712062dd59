//! Pose and key types identifying an impulse response in filter storage.
//!
//! A pose is a tuple of quantised integer triples — never floating point —
//! because it is used purely as a hash-map key, not as a geometric transform:
//! the renderer never rotates or interpolates a pose, it only looks one up.

use serde::{Deserialize, Serialize};

/// One integer triple (yaw/pitch/roll, or x/y/z, or an opaque tag).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Triple(pub i32, pub i32, pub i32);

impl Triple {
    pub const ZERO: Self = Self(0, 0, 0);

    pub fn new(a: i32, b: i32, c: i32) -> Self {
        Self(a, b, c)
    }

    fn write_into(self, out: &mut [i32]) {
        out[0] = self.0;
        out[1] = self.1;
        out[2] = self.2;
    }

    fn read_from(values: &[i32]) -> Self {
        Self(values[0], values[1], values[2])
    }
}

/// Canonical 15-integer key: listener_orientation, listener_position,
/// source_orientation, source_position, custom (§3, §9 field-order decision).
pub type PoseKey = [i32; 15];

/// Canonical 9-integer key used for source-directivity lookups:
/// source_orientation, source_position, custom.
pub type SourcePoseKey = [i32; 9];

/// Number of mismatched slices a dirty-row merge must raise when the
/// caller-provided slice width doesn't match the target stage width.
#[derive(Debug, thiserror::Error)]
pub enum PoseError {
    #[error("expected {expected} pose integers, got {got}")]
    WrongComponentCount { expected: usize, got: usize },
}

/// Full pose: listener orientation/position, source orientation/position,
/// and a custom tag triple. Equality is structural; the key is the ordered
/// concatenation of all fifteen integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Pose {
    pub listener_orientation: Triple,
    pub listener_position: Triple,
    pub source_orientation: Triple,
    pub source_position: Triple,
    pub custom: Triple,
}

impl Pose {
    pub fn new(
        listener_orientation: Triple,
        listener_position: Triple,
        source_orientation: Triple,
        source_position: Triple,
        custom: Triple,
    ) -> Self {
        Self {
            listener_orientation,
            listener_position,
            source_orientation,
            source_position,
            custom,
        }
    }

    /// Ordered concatenation of all fifteen integers; identical keys imply
    /// identical poses and vice versa.
    pub fn create_key(&self) -> PoseKey {
        let mut key = [0i32; 15];
        self.listener_orientation.write_into(&mut key[0..3]);
        self.listener_position.write_into(&mut key[3..6]);
        self.source_orientation.write_into(&mut key[6..9]);
        self.source_position.write_into(&mut key[9..12]);
        self.custom.write_into(&mut key[12..15]);
        key
    }

    /// Parse a 9-wide (listener_orientation + listener_position + custom,
    /// i.e. no source component) or 15-wide filter-value row.
    pub fn from_filter_values(values: &[i32]) -> Result<Self, PoseError> {
        match values.len() {
            9 => Ok(Self::new(
                Triple::read_from(&values[0..3]),
                Triple::read_from(&values[3..6]),
                Triple::ZERO,
                Triple::ZERO,
                Triple::read_from(&values[6..9]),
            )),
            15 => Ok(Self::new(
                Triple::read_from(&values[0..3]),
                Triple::read_from(&values[3..6]),
                Triple::read_from(&values[6..9]),
                Triple::read_from(&values[9..12]),
                Triple::read_from(&values[12..15]),
            )),
            got => Err(PoseError::WrongComponentCount { expected: 15, got }),
        }
    }
}

/// Directivity-only pose: source orientation, source position, custom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SourcePose {
    pub source_orientation: Triple,
    pub source_position: Triple,
    pub custom: Triple,
}

impl SourcePose {
    pub fn new(source_orientation: Triple, source_position: Triple, custom: Triple) -> Self {
        Self {
            source_orientation,
            source_position,
            custom,
        }
    }

    pub fn create_key(&self) -> SourcePoseKey {
        let mut key = [0i32; 9];
        self.source_orientation.write_into(&mut key[0..3]);
        self.source_position.write_into(&mut key[3..6]);
        self.custom.write_into(&mut key[6..9]);
        key
    }

    pub fn from_filter_values(values: &[i32]) -> Result<Self, PoseError> {
        if values.len() != 9 {
            return Err(PoseError::WrongComponentCount {
                expected: 9,
                got: values.len(),
            });
        }
        Ok(Self::new(
            Triple::read_from(&values[0..3]),
            Triple::read_from(&values[3..6]),
            Triple::read_from(&values[6..9]),
        ))
    }
}
