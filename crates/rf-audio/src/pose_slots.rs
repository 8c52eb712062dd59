//! Lock-free control-plane → audio-plane pose handoff.
//!
//! One `PoseSlots` instance per keyed stage (DS/ER/LR use the 15-integer
//! row; SD uses the 9-integer row). The Receiver is the single writer per
//! channel; the Audio Engine is the single reader. Correctness only needs
//! the dirty bit to be observed *after* the row write and cleared with
//! relaxed ordering after the engine consumes it (§5) — the row itself does
//! not need to be written atomically as a whole.

use std::sync::atomic::{AtomicBool, Ordering};

/// `WIDTH` is 15 for DS/ER/LR, 9 for SD.
pub struct PoseSlots<const WIDTH: usize> {
    rows: Vec<[i32; WIDTH]>,
    dirty: Vec<AtomicBool>,
}

impl<const WIDTH: usize> PoseSlots<WIDTH> {
    pub fn new(max_channels: usize) -> Self {
        Self {
            rows: vec![[0i32; WIDTH]; max_channels],
            dirty: (0..max_channels).map(|_| AtomicBool::new(false)).collect(),
        }
    }

    /// Merges `values` into the named channel's row at `offset..offset+values.len()`.
    /// Leaves the dirty bit untouched if the merge is a no-op (the slice was
    /// already equal) — the idempotent-dirty-handling invariant in §8.
    pub fn merge_slice(&mut self, channel: usize, offset: usize, values: &[i32]) {
        let row = &mut self.rows[channel];
        let target = &mut row[offset..offset + values.len()];
        if target == values {
            return;
        }
        target.copy_from_slice(values);
        // Release: the row write must be visible before the dirty bit is.
        self.dirty[channel].store(true, Ordering::Release);
    }

    /// Audio-thread side: if `channel` is dirty, returns its current row and
    /// clears the bit (relaxed — a stale re-read next block is harmless,
    /// §5).
    pub fn take_if_dirty(&self, channel: usize) -> Option<[i32; WIDTH]> {
        if self.dirty[channel].load(Ordering::Acquire) {
            let row = self.rows[channel];
            self.dirty[channel].store(false, Ordering::Relaxed);
            Some(row)
        } else {
            None
        }
    }

    pub fn is_dirty(&self, channel: usize) -> bool {
        self.dirty[channel].load(Ordering::Acquire)
    }

    pub fn any_dirty(&self) -> bool {
        (0..self.dirty.len()).any(|c| self.is_dirty(c))
    }

    pub fn row(&self, channel: usize) -> [i32; WIDTH] {
        self.rows[channel]
    }

    pub fn max_channels(&self) -> usize {
        self.rows.len()
    }
}

pub type FullPoseSlots = PoseSlots<15>;
pub type SourcePoseSlots = PoseSlots<9>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_sets_dirty_only_on_change() {
        let mut slots = FullPoseSlots::new(2);
        slots.merge_slice(0, 0, &[1, 2, 3]);
        assert!(slots.is_dirty(0));
        assert!(!slots.is_dirty(1));
    }

    #[test]
    fn identical_slice_does_not_raise_dirty_twice() {
        let mut slots = FullPoseSlots::new(1);
        slots.merge_slice(0, 0, &[1, 2, 3]);
        let _ = slots.take_if_dirty(0);
        assert!(!slots.is_dirty(0));

        slots.merge_slice(0, 0, &[1, 2, 3]);
        assert!(!slots.is_dirty(0), "re-sending the same slice must not raise the dirty bit");
    }

    #[test]
    fn take_if_dirty_clears_the_bit() {
        let mut slots = FullPoseSlots::new(1);
        slots.merge_slice(0, 3, &[9, 9, 9]);
        let row = slots.take_if_dirty(0).unwrap();
        assert_eq!(&row[3..6], &[9, 9, 9]);
        assert!(!slots.is_dirty(0));
        assert!(slots.take_if_dirty(0).is_none());
    }

    #[test]
    fn source_pose_slots_use_nine_wide_rows() {
        let mut slots = SourcePoseSlots::new(1);
        slots.merge_slice(0, 0, &[1, 2, 3, 4, 5, 6, 7, 8, 9]);
        let row = slots.take_if_dirty(0).unwrap();
        assert_eq!(row.len(), 9);
    }
}
