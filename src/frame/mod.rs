//! Frame metadata store and time anchors.
//!
//! [`FrameStore`] is the only state shared across a whole run. It is
//! mutated exclusively by the pipeline orchestrator (append, commit,
//! destroy) and read by everything else, which is what makes the rest of
//! the pipeline free of locking concerns.
//!
//! [`TimeAnchors`] carries the three floating references (`ref`,
//! `prev_displayed`, `prev_captured`) as an owned value threaded through
//! the orchestrator's per-record step - never ambient state - so the
//! replay pass can reset it trivially.

use crate::capture::RawRecord;

/// Per-record status bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameFlags {
    /// Passed the read filter (or no read filter was set)
    pub passed_read_filter: bool,
    /// Passed the display filter
    pub passed_display_filter: bool,
    /// Kept because a displayed record depends on it
    pub dependent_of_displayed: bool,
    /// Color classification requested for this record
    pub needs_colorization: bool,
    /// This record is the current time reference
    pub time_reference: bool,
}

/// Metadata for one captured record.
///
/// Created when the record is first read. Derived time fields are fixed
/// once against the anchors before dissection; after that the record is
/// immutable except for `flags.dependent_of_displayed`, which a later
/// record's dependency discovery may set.
#[derive(Debug, Clone)]
pub struct FrameRecord {
    /// 1-based, strictly increasing, unique
    pub number: u64,
    /// Locator for re-reading the raw bytes (replay pass)
    pub file_offset: u64,
    /// Captured byte count
    pub captured_len: u32,
    /// Original on-the-wire byte count
    pub original_len: u32,
    /// Running total of captured bytes including this record
    pub cumulative_bytes: u64,
    /// Absolute capture timestamp (microseconds since epoch)
    pub timestamp_us: i64,
    /// Time since the reference record
    pub rel_time_us: i64,
    /// Time since the previous displayed record
    pub delta_displayed_us: i64,
    /// Time since the previous captured record
    pub delta_captured_us: i64,
    /// Status bits
    pub flags: FrameFlags,
}

impl FrameRecord {
    /// Create a record with derived fields zeroed.
    pub fn new(
        number: u64,
        file_offset: u64,
        captured_len: u32,
        original_len: u32,
        timestamp_us: i64,
    ) -> Self {
        FrameRecord {
            number,
            file_offset,
            captured_len,
            original_len,
            cumulative_bytes: 0,
            timestamp_us,
            rel_time_us: 0,
            delta_displayed_us: 0,
            delta_captured_us: 0,
            flags: FrameFlags::default(),
        }
    }

    /// Fix derived times against the current anchors.
    ///
    /// Called once per pass, before dissection, so every consumer of this
    /// record (filter, taps, output) sees the same committed state.
    pub fn fix_times(&mut self, anchors: &TimeAnchors) {
        self.rel_time_us = anchors
            .time_ref
            .map(|(_, ts)| self.timestamp_us - ts)
            .unwrap_or(0);
        self.delta_captured_us = anchors
            .prev_captured
            .map(|(_, ts)| self.timestamp_us - ts)
            .unwrap_or(0);
        self.delta_displayed_us = anchors
            .prev_displayed
            .map(|(_, ts)| self.timestamp_us - ts)
            .unwrap_or(0);
    }
}

/// The three floating references, tracked globally by the orchestrator.
///
/// Invariant: `prev_captured` is updated unconditionally after every
/// record; `prev_displayed` only when the record passed its display
/// filter - a dependency-only emission never moves it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeAnchors {
    /// Time-reference record: (number, absolute timestamp)
    pub time_ref: Option<(u64, i64)>,
    /// Most recent record that passed its filter
    pub prev_displayed: Option<(u64, i64)>,
    /// Most recent record read, filter result notwithstanding
    pub prev_captured: Option<(u64, i64)>,
}

impl TimeAnchors {
    /// Fresh anchors (start of a pass).
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `number` the time reference.
    pub fn set_reference(&mut self, number: u64, timestamp_us: i64) {
        self.time_ref = Some((number, timestamp_us));
    }

    /// Record that `number` was read.
    pub fn observe_captured(&mut self, number: u64, timestamp_us: i64) {
        self.prev_captured = Some((number, timestamp_us));
    }

    /// Record that `number` was displayed (passed the display filter).
    pub fn observe_displayed(&mut self, number: u64, timestamp_us: i64) {
        self.prev_displayed = Some((number, timestamp_us));
    }

    /// Reinitialize for the replay pass.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// What the store does with records after their step completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retention {
    /// Keep every record for a second pass.
    RetainAll,
    /// One-pass mode: records may be destroyed eagerly to bound memory.
    Streaming,
}

/// Append-only-then-random-access sequence of per-record metadata.
///
/// Numbers are contiguous from 1; the total ever appended always equals
/// the number of raw records read before any stop condition.
#[derive(Debug)]
pub struct FrameStore {
    records: Vec<Option<FrameRecord>>,
    retention: Retention,
    sealed: bool,
    cumulative_bytes: u64,
}

impl FrameStore {
    /// Create an empty store with the given retention policy.
    pub fn new(retention: Retention) -> Self {
        FrameStore {
            records: Vec::new(),
            retention,
            sealed: false,
            cumulative_bytes: 0,
        }
    }

    /// Retention policy of this store.
    pub fn retention(&self) -> Retention {
        self.retention
    }

    /// Append a record, assigning the next sequential number and seeding
    /// its cumulative byte total from the running sum.
    pub fn append(&mut self, raw: &RawRecord) -> u64 {
        debug_assert!(!self.sealed, "append() on a sealed store");

        let number = self.records.len() as u64 + 1;
        self.cumulative_bytes += raw.captured_len as u64;

        let mut record = FrameRecord::new(
            number,
            raw.file_offset,
            raw.captured_len,
            raw.original_len,
            raw.timestamp_us,
        );
        record.cumulative_bytes = self.cumulative_bytes;

        self.records.push(Some(record));
        number
    }

    /// Get a resident record.
    pub fn get(&self, number: u64) -> Option<&FrameRecord> {
        let index = number.checked_sub(1)? as usize;
        self.records.get(index).and_then(Option::as_ref)
    }

    /// Get a resident record mutably.
    pub fn get_mut(&mut self, number: u64) -> Option<&mut FrameRecord> {
        let index = number.checked_sub(1)? as usize;
        self.records.get_mut(index).and_then(Option::as_mut)
    }

    /// Random access for the replay pass.
    ///
    /// Calling this before [`seal`](Self::seal) is a programming error,
    /// not a runtime condition.
    pub fn find(&self, number: u64) -> Option<&FrameRecord> {
        debug_assert!(self.sealed, "find() before the store is sealed");
        self.get(number)
    }

    /// Random access for the replay pass, mutable.
    pub fn find_mut(&mut self, number: u64) -> Option<&mut FrameRecord> {
        debug_assert!(self.sealed, "find_mut() before the store is sealed");
        self.get_mut(number)
    }

    /// Dispose of a record that passed no filter and is not a dependency.
    ///
    /// Only one-pass (streaming) runs clean up eagerly; two-pass runs
    /// need every record for the replay pass.
    pub fn destroy_one(&mut self, number: u64) {
        debug_assert!(
            self.retention == Retention::Streaming,
            "destroy_one() on a retaining store"
        );
        if let Some(index) = number.checked_sub(1) {
            if let Some(slot) = self.records.get_mut(index as usize) {
                *slot = None;
            }
        }
    }

    /// Close the store to further appends.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    /// Whether the store is sealed.
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Total records ever appended (numbers are 1..=total).
    pub fn total_appended(&self) -> u64 {
        self.records.len() as u64
    }

    /// Running total of captured bytes across all appended records.
    pub fn cumulative_bytes(&self) -> u64 {
        self.cumulative_bytes
    }

    /// Records still resident (not destroyed).
    pub fn resident_count(&self) -> usize {
        self.records.iter().filter(|slot| slot.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn raw(captured_len: u32, timestamp_us: i64) -> RawRecord {
        RawRecord {
            timestamp_us,
            captured_len,
            original_len: captured_len,
            link_type: 1,
            file_offset: 0,
            data: Bytes::new(),
        }
    }

    #[test]
    fn test_append_numbering_and_cumulative() {
        let mut store = FrameStore::new(Retention::RetainAll);

        assert_eq!(store.append(&raw(100, 0)), 1);
        assert_eq!(store.append(&raw(50, 0)), 2);
        assert_eq!(store.append(&raw(25, 0)), 3);

        assert_eq!(store.total_appended(), 3);
        assert_eq!(store.cumulative_bytes(), 175);
        assert_eq!(store.get(1).unwrap().cumulative_bytes, 100);
        assert_eq!(store.get(2).unwrap().cumulative_bytes, 150);
        assert_eq!(store.get(3).unwrap().cumulative_bytes, 175);
    }

    #[test]
    fn test_get_out_of_range() {
        let store = FrameStore::new(Retention::RetainAll);
        assert!(store.get(0).is_none());
        assert!(store.get(1).is_none());
    }

    #[test]
    fn test_destroy_one_keeps_numbering() {
        let mut store = FrameStore::new(Retention::Streaming);
        store.append(&raw(10, 0));
        store.append(&raw(10, 0));

        store.destroy_one(1);
        assert!(store.get(1).is_none());
        assert!(store.get(2).is_some());
        assert_eq!(store.resident_count(), 1);
        // The monotonic counter is unaffected by disposal.
        assert_eq!(store.append(&raw(10, 0)), 3);
        assert_eq!(store.total_appended(), 3);
    }

    #[test]
    fn test_find_after_seal() {
        let mut store = FrameStore::new(Retention::RetainAll);
        store.append(&raw(10, 5));
        store.seal();
        assert!(store.is_sealed());
        assert_eq!(store.find(1).unwrap().number, 1);
        assert!(store.find(2).is_none());
    }

    #[test]
    fn test_anchor_update_rules() {
        let mut anchors = TimeAnchors::new();
        anchors.set_reference(1, 1_000);
        anchors.observe_captured(1, 1_000);

        // A record that fails its filter moves prev_captured only.
        anchors.observe_captured(2, 2_000);
        assert_eq!(anchors.prev_captured, Some((2, 2_000)));
        assert_eq!(anchors.prev_displayed, None);

        anchors.observe_displayed(3, 3_000);
        anchors.observe_captured(3, 3_000);
        assert_eq!(anchors.prev_displayed, Some((3, 3_000)));

        anchors.reset();
        assert_eq!(anchors, TimeAnchors::default());
    }

    #[test]
    fn test_fix_times() {
        let mut anchors = TimeAnchors::new();
        anchors.set_reference(1, 1_000_000);
        anchors.observe_captured(2, 1_500_000);
        anchors.observe_displayed(1, 1_000_000);

        let mut record = FrameRecord::new(3, 0, 60, 60, 2_000_000);
        record.fix_times(&anchors);

        assert_eq!(record.rel_time_us, 1_000_000);
        assert_eq!(record.delta_captured_us, 500_000);
        assert_eq!(record.delta_displayed_us, 1_000_000);
    }

    #[test]
    fn test_fix_times_without_anchors() {
        let mut record = FrameRecord::new(1, 0, 60, 60, 42);
        record.fix_times(&TimeAnchors::new());
        assert_eq!(record.rel_time_us, 0);
        assert_eq!(record.delta_captured_us, 0);
        assert_eq!(record.delta_displayed_us, 0);
    }
}
