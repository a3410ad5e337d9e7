use super::timestamp::Timestamp;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// One timetrack slot: when the sample happened and where its row lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimetrackEntry {
    pub timestamp: Timestamp,
    /// Index into the owning row store
    pub row: usize,
}

/// Ordered index mapping logical position -> (timestamp, row).
///
/// Positions are expected to be non-decreasing in time. Range lookups use
/// binary search and may miss rows if a caller appended out of order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Timetrack {
    entries: Vec<TimetrackEntry>,
}

impl Timetrack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a timetrack whose position `i` points at row `i`
    pub fn from_timeline<I>(timeline: I) -> Self
    where
        I: IntoIterator<Item = Timestamp>,
    {
        let entries = timeline
            .into_iter()
            .enumerate()
            .map(|(row, timestamp)| TimetrackEntry { timestamp, row })
            .collect();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, position: usize) -> Option<&TimetrackEntry> {
        self.entries.get(position)
    }

    pub fn first(&self) -> Option<&TimetrackEntry> {
        self.entries.first()
    }

    pub fn last(&self) -> Option<&TimetrackEntry> {
        self.entries.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TimetrackEntry> {
        self.entries.iter()
    }

    pub fn push(&mut self, timestamp: Timestamp, row: usize) {
        self.entries.push(TimetrackEntry { timestamp, row });
    }

    /// Positions whose timestamp lies in `[start, end]`
    pub fn range(&self, start: Timestamp, end: Timestamp) -> Range<usize> {
        let lo = self.entries.partition_point(|e| e.timestamp < start);
        if start > end {
            return lo..lo;
        }
        let hi = self.entries.partition_point(|e| e.timestamp <= end);
        lo..hi.max(lo)
    }

    /// Whether every timestamp is >= the one before it
    pub fn is_ordered(&self) -> bool {
        self.entries
            .windows(2)
            .all(|pair| pair[0].timestamp <= pair[1].timestamp)
    }

    /// Keep the entries matching `keep`, then renumber rows contiguously from
    /// zero in their original row order.
    ///
    /// Returns a mask over the old row store telling which rows survive.
    pub(crate) fn retain<F>(&mut self, row_count: usize, keep: F) -> Vec<bool>
    where
        F: Fn(Timestamp) -> bool,
    {
        let mut kept_rows = vec![false; row_count];
        self.entries.retain(|e| {
            let retained = keep(e.timestamp);
            if retained {
                kept_rows[e.row] = true;
            }
            retained
        });

        let mut remap = vec![0; row_count];
        let mut next = 0;
        for (old, kept) in kept_rows.iter().enumerate() {
            if *kept {
                remap[old] = next;
                next += 1;
            }
        }
        for entry in &mut self.entries {
            entry.row = remap[entry.row];
        }

        kept_rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(values: &[i64]) -> Timetrack {
        Timetrack::from_timeline(values.iter().map(|s| Timestamp::from_secs(*s)))
    }

    #[test]
    fn test_range_inclusive_bounds() {
        let track = secs(&[0, 1, 2, 3, 4, 5]);
        assert_eq!(track.range(Timestamp::from_secs(1), Timestamp::from_secs(3)), 1..4);
        assert_eq!(track.range(Timestamp::from_secs(6), Timestamp::from_secs(9)), 6..6);
        assert!(track
            .range(Timestamp::from_secs(3), Timestamp::from_secs(1))
            .is_empty());
    }

    #[test]
    fn test_range_with_duplicates() {
        let track = secs(&[1, 2, 2, 2, 3]);
        assert_eq!(track.range(Timestamp::from_secs(2), Timestamp::from_secs(2)), 1..4);
    }

    #[test]
    fn test_retain_reindexes() {
        let mut track = secs(&[0, 1, 2, 3]);
        let mask = track.retain(4, |t| t >= Timestamp::from_secs(2));

        assert_eq!(mask, vec![false, false, true, true]);
        assert_eq!(track.len(), 2);
        assert_eq!(track.get(0).map(|e| e.row), Some(0));
        assert_eq!(track.get(1).map(|e| e.row), Some(1));
        assert_eq!(track.get(0).map(|e| e.timestamp), Some(Timestamp::from_secs(2)));
    }

    #[test]
    fn test_is_ordered() {
        assert!(secs(&[0, 0, 1]).is_ordered());
        assert!(!secs(&[0, 2, 1]).is_ordered());
    }
}
