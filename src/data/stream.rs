use super::timestamp::Timestamp;
use super::timetrack::Timetrack;

/// Boxed error raised by external collaborators (transform stages, frame decoders)
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A borrowed view of one row together with where it sits on the timeline
#[derive(Debug)]
pub struct Sample<'a, R> {
    pub position: usize,
    pub timestamp: Timestamp,
    pub data: &'a R,
}

impl<R> Clone for Sample<'_, R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R> Copy for Sample<'_, R> {}

/// Trims registered ahead of time and applied together
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrimWindow {
    /// Rows strictly before this time are dropped
    pub before: Option<Timestamp>,
    /// Rows at or after this time are dropped
    pub after: Option<Timestamp>,
}

/// Timestamp-addressed sequence of rows.
///
/// The row store and the timetrack always have the same length; every
/// mutation goes through `append` or one of the trims.
#[derive(Debug, Clone)]
pub struct DataStream<R> {
    name: String,
    rows: Vec<R>,
    timetrack: Timetrack,
    trim_window: TrimWindow,
}

impl<R> DataStream<R> {
    /// Empty stream, ready for incremental appends
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rows: Vec::new(),
            timetrack: Timetrack::new(),
            trim_window: TrimWindow::default(),
        }
    }

    /// Build a stream from rows and their timeline, position `i` -> row `i`
    pub fn from_parts(
        name: impl Into<String>,
        timeline: Vec<Timestamp>,
        rows: Vec<R>,
    ) -> Result<Self, StreamError> {
        if timeline.len() != rows.len() {
            return Err(StreamError::LengthMismatch {
                timestamps: timeline.len(),
                rows: rows.len(),
            });
        }

        let timetrack = Timetrack::from_timeline(timeline);
        if !timetrack.is_ordered() {
            tracing::warn!("stream built with out-of-order timeline; range reads may miss rows");
        }

        Ok(Self {
            name: name.into(),
            rows,
            timetrack,
            trim_window: TrimWindow::default(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.timetrack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timetrack.is_empty()
    }

    pub fn timetrack(&self) -> &Timetrack {
        &self.timetrack
    }

    /// All rows with `start <= timestamp <= end`, in timestamp order
    pub fn get(&self, start: Timestamp, end: Timestamp) -> Vec<Sample<'_, R>> {
        self.timetrack
            .range(start, end)
            .filter_map(|position| self.get_by_position(position))
            .collect()
    }

    pub fn get_by_position(&self, position: usize) -> Option<Sample<'_, R>> {
        let entry = self.timetrack.get(position)?;
        let data = self.rows.get(entry.row)?;
        Some(Sample {
            position,
            timestamp: entry.timestamp,
            data,
        })
    }

    pub fn first(&self) -> Option<Sample<'_, R>> {
        self.get_by_position(0)
    }

    pub fn last(&self) -> Option<Sample<'_, R>> {
        self.len()
            .checked_sub(1)
            .and_then(|position| self.get_by_position(position))
    }

    /// Samples in position order
    pub fn iter(&self) -> impl Iterator<Item = Sample<'_, R>> + '_ {
        (0..self.len()).filter_map(move |position| self.get_by_position(position))
    }

    /// Time span covered by the stream, `None` when empty
    pub fn time_range(&self) -> Option<(Timestamp, Timestamp)> {
        Some((self.timetrack.first()?.timestamp, self.timetrack.last()?.timestamp))
    }

    /// Add one row at the end. Ordering is not checked: callers must append
    /// with non-decreasing timestamps.
    pub fn append(&mut self, timestamp: Timestamp, row: R) {
        let index = self.rows.len();
        self.rows.push(row);
        self.timetrack.push(timestamp, index);
    }

    /// Drop every row earlier than `t`. Returns the number of rows removed.
    pub fn trim_before(&mut self, t: Timestamp) -> usize {
        self.retain_by_time(|ts| ts >= t)
    }

    /// Drop every row at or after `t`. Returns the number of rows removed.
    pub fn trim_after(&mut self, t: Timestamp) -> usize {
        self.retain_by_time(|ts| ts < t)
    }

    pub fn trim_window(&self) -> TrimWindow {
        self.trim_window
    }

    pub fn set_trim_window(&mut self, before: Option<Timestamp>, after: Option<Timestamp>) {
        self.trim_window = TrimWindow { before, after };
    }

    /// Apply the registered trims and clear them
    pub fn apply_trim_window(&mut self) -> usize {
        let TrimWindow { before, after } = std::mem::take(&mut self.trim_window);
        let mut removed = 0;
        if let Some(t) = before {
            removed += self.trim_before(t);
        }
        if let Some(t) = after {
            removed += self.trim_after(t);
        }
        removed
    }

    fn retain_by_time<F>(&mut self, keep: F) -> usize
    where
        F: Fn(Timestamp) -> bool,
    {
        let before = self.len();
        let kept_rows = self.timetrack.retain(self.rows.len(), keep);
        let rows = std::mem::take(&mut self.rows);
        self.rows = rows
            .into_iter()
            .zip(kept_rows)
            .filter_map(|(row, kept)| kept.then_some(row))
            .collect();
        before - self.len()
    }
}

impl<R> DataStream<R>
where
    R: Clone,
{
    /// Owned copies of the rows in `[start, end]`
    pub fn get_owned(&self, start: Timestamp, end: Timestamp) -> Vec<(Timestamp, R)> {
        self.get(start, end)
            .into_iter()
            .map(|sample| (sample.timestamp, sample.data.clone()))
            .collect()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("transform has no declared output name")]
    MissingCapability,

    #[error("row {position} has no usable value in time field '{field}'")]
    MissingTimestamp { position: usize, field: String },

    #[error("timeline has {timestamps} timestamps but {rows} rows")]
    LengthMismatch { timestamps: usize, rows: usize },

    #[error("frame rate must be positive, got {0}")]
    InvalidFrameRate(f64),

    #[error("window size must be positive, got {0}")]
    InvalidWindow(Timestamp),

    #[error("start {start} is after end {end}")]
    InvalidRange { start: Timestamp, end: Timestamp },

    #[error("image buffer holds {actual} bytes, expected {expected}")]
    InvalidImage { expected: usize, actual: usize },

    #[error("transform '{stage}' failed at position {position}: {source}")]
    Transform {
        stage: String,
        position: usize,
        #[source]
        source: BoxError,
    },

    #[error("failed to decode frame {index}: {source}")]
    Decode {
        index: usize,
        #[source]
        source: BoxError,
    },
}
