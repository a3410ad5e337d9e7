//! One timeline across several streams

use super::stream::StreamError;
use super::timestamp::Timestamp;
use super::timetrack::Timetrack;
use std::ops::Range;

/// Half-open slice of the timeline, `start <= t < end`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl Window {
    pub fn contains(&self, t: Timestamp) -> bool {
        self.start <= t && t < self.end
    }
}

/// Split `[start, end]` into consecutive windows of `size`.
///
/// The last window is cut just past `end` so a sample at exactly `end`
/// still falls inside it. A zero-length range yields one window.
pub fn windows(start: Timestamp, end: Timestamp, size: Timestamp) -> Result<Vec<Window>, StreamError> {
    if size <= Timestamp::ZERO {
        return Err(StreamError::InvalidWindow(size));
    }
    if start > end {
        return Err(StreamError::InvalidRange { start, end });
    }

    let span = end.as_micros() - start.as_micros();
    let step = size.as_micros();
    let count = (span / step + i64::from(span % step != 0)).max(1);
    let stop = end.as_micros().saturating_add(1);

    Ok((0..count)
        .map(|i| {
            let lo = start.as_micros() + i * step;
            let hi = if i + 1 == count { stop } else { lo + step };
            Window {
                start: Timestamp::from_micros(lo),
                end: Timestamp::from_micros(hi),
            }
        })
        .collect())
}

/// A row of one member stream, placed on the shared timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalEntry {
    pub timestamp: Timestamp,
    /// Index into [`GlobalTimetrack::streams`]
    pub stream: usize,
    /// Position inside that stream
    pub position: usize,
}

/// Every row of a set of streams merged in time order.
///
/// Rows with equal timestamps keep member order, then position order.
#[derive(Debug, Clone, Default)]
pub struct GlobalTimetrack {
    streams: Vec<String>,
    entries: Vec<GlobalEntry>,
}

impl GlobalTimetrack {
    pub fn new<'a, I>(members: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a Timetrack)>,
    {
        let mut streams = Vec::new();
        let mut entries = Vec::new();
        for (stream, (name, timetrack)) in members.into_iter().enumerate() {
            streams.push(name.to_string());
            entries.extend(timetrack.iter().enumerate().map(|(position, e)| GlobalEntry {
                timestamp: e.timestamp,
                stream,
                position,
            }));
        }
        entries.sort_by_key(|e| e.timestamp);

        Self { streams, entries }
    }

    /// Member stream names, in the order given at construction
    pub fn streams(&self) -> &[String] {
        &self.streams
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GlobalEntry> {
        self.entries.iter()
    }

    /// Earliest and latest timestamp across all members
    pub fn time_range(&self) -> Option<(Timestamp, Timestamp)> {
        Some((self.entries.first()?.timestamp, self.entries.last()?.timestamp))
    }

    /// Entries with `start <= timestamp < end`
    pub fn range(&self, start: Timestamp, end: Timestamp) -> &[GlobalEntry] {
        &self.entries[self.bounds(start, end)]
    }

    fn bounds(&self, start: Timestamp, end: Timestamp) -> Range<usize> {
        if start >= end {
            return 0..0;
        }
        let lo = self.entries.partition_point(|e| e.timestamp < start);
        let hi = self.entries.partition_point(|e| e.timestamp < end);
        lo..hi
    }

    /// Windows of `size` covering the merged timeline, optionally clipped
    /// to `start`/`end`. An empty timeline has no windows.
    pub fn windows(
        &self,
        size: Timestamp,
        start: Option<Timestamp>,
        end: Option<Timestamp>,
    ) -> Result<Vec<Window>, StreamError> {
        let Some((first, last)) = self.time_range() else {
            if size <= Timestamp::ZERO {
                return Err(StreamError::InvalidWindow(size));
            }
            return Ok(Vec::new());
        };
        windows(start.unwrap_or(first), end.unwrap_or(last), size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(secs: &[i64]) -> Timetrack {
        Timetrack::from_timeline(secs.iter().map(|s| Timestamp::from_secs(*s)))
    }

    #[test]
    fn test_merges_in_time_order() {
        let a = track(&[0, 2, 4]);
        let b = track(&[1, 2, 3]);
        let global = GlobalTimetrack::new([("a", &a), ("b", &b)]);

        assert_eq!(global.len(), 6);
        assert_eq!(global.streams(), ["a", "b"]);
        let order: Vec<_> = global.iter().map(|e| (e.stream, e.position)).collect();
        assert_eq!(order, vec![(0, 0), (1, 0), (0, 1), (1, 1), (1, 2), (0, 2)]);
        assert_eq!(
            global.time_range(),
            Some((Timestamp::ZERO, Timestamp::from_secs(4)))
        );
    }

    #[test]
    fn test_range_is_half_open() {
        let a = track(&[0, 1, 2, 3]);
        let global = GlobalTimetrack::new([("a", &a)]);

        let hit = global.range(Timestamp::from_secs(1), Timestamp::from_secs(3));
        assert_eq!(hit.iter().map(|e| e.position).collect::<Vec<_>>(), vec![1, 2]);
        assert!(global.range(Timestamp::from_secs(3), Timestamp::from_secs(1)).is_empty());
    }

    #[test]
    fn test_windows_cover_the_end_sample() {
        let got = windows(Timestamp::ZERO, Timestamp::from_secs(6), Timestamp::from_secs(4)).unwrap();
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].end, Timestamp::from_secs(4));
        assert_eq!(got[1].start, Timestamp::from_secs(4));
        assert!(got[1].contains(Timestamp::from_secs(6)));
        assert!(!got[1].contains(Timestamp::from_secs(7)));

        // Exact multiples still reach the last sample
        let got = windows(Timestamp::ZERO, Timestamp::from_secs(6), Timestamp::from_secs(3)).unwrap();
        assert_eq!(got.len(), 2);
        assert!(got[1].contains(Timestamp::from_secs(6)));

        let single = windows(Timestamp::from_secs(5), Timestamp::from_secs(5), Timestamp::from_secs(1)).unwrap();
        assert_eq!(single.len(), 1);
        assert!(single[0].contains(Timestamp::from_secs(5)));
    }

    #[test]
    fn test_invalid_windows() {
        assert!(matches!(
            windows(Timestamp::ZERO, Timestamp::from_secs(1), Timestamp::ZERO),
            Err(StreamError::InvalidWindow(_))
        ));
        assert!(matches!(
            windows(Timestamp::from_secs(2), Timestamp::from_secs(1), Timestamp::from_secs(1)),
            Err(StreamError::InvalidRange { .. })
        ));
        assert!(GlobalTimetrack::default()
            .windows(Timestamp::from_secs(1), None, None)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_clipped_windows() {
        let a = track(&[0, 10]);
        let global = GlobalTimetrack::new([("a", &a)]);
        let got = global
            .windows(Timestamp::from_secs(2), Some(Timestamp::from_secs(4)), None)
            .unwrap();
        assert_eq!(got.len(), 3);
        assert_eq!(got[0].start, Timestamp::from_secs(4));
        assert!(got[2].contains(Timestamp::from_secs(10)));
    }
}
