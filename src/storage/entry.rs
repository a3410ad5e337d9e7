use super::config::SessionConfig;
use super::manifest::{
    frame_key, EntryKind, EntryManifest, PayloadKind, TimetrackLine, FORMAT_VERSION, MANIFEST_KEY,
    ROWS_KEY, TIMETRACK_KEY,
};
use super::persistence::{encode_frame, FileBackend, PersistenceBackend, PersistenceError};
use super::reader::{is_entry_dir, read_entry, PersistedStream};
use super::session::SessionError;
use crate::data::{Image, ImageDataStream, Record, Sample, TabularDataStream, Timestamp};
use std::path::Path;

/// The stream held by an entry
#[derive(Debug, Clone)]
pub enum EntryStream {
    Tabular(TabularDataStream),
    Image(ImageDataStream),
}

impl EntryStream {
    pub fn name(&self) -> &str {
        match self {
            EntryStream::Tabular(s) => s.name(),
            EntryStream::Image(s) => s.name(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            EntryStream::Tabular(s) => s.len(),
            EntryStream::Image(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn payload(&self) -> PayloadKind {
        match self {
            EntryStream::Tabular(_) => PayloadKind::Tabular,
            EntryStream::Image(_) => PayloadKind::Image,
        }
    }

    pub fn get_by_position(&self, position: usize) -> Option<EntrySample<'_>> {
        match self {
            EntryStream::Tabular(s) => s.get_by_position(position).map(EntrySample::Tabular),
            EntryStream::Image(s) => s.get_by_position(position).map(EntrySample::Image),
        }
    }

    pub fn last(&self) -> Option<EntrySample<'_>> {
        self.len()
            .checked_sub(1)
            .and_then(|position| self.get_by_position(position))
    }

    pub fn as_tabular(&self) -> Option<&TabularDataStream> {
        match self {
            EntryStream::Tabular(s) => Some(s),
            EntryStream::Image(_) => None,
        }
    }

    pub fn as_image(&self) -> Option<&ImageDataStream> {
        match self {
            EntryStream::Image(s) => Some(s),
            EntryStream::Tabular(_) => None,
        }
    }
}

impl From<TabularDataStream> for EntryStream {
    fn from(stream: TabularDataStream) -> Self {
        EntryStream::Tabular(stream)
    }
}

impl From<ImageDataStream> for EntryStream {
    fn from(stream: ImageDataStream) -> Self {
        EntryStream::Image(stream)
    }
}

/// A borrowed row of either payload type
#[derive(Debug, Clone, Copy)]
pub enum EntrySample<'a> {
    Tabular(Sample<'a, Record>),
    Image(Sample<'a, Image>),
}

impl<'a> EntrySample<'a> {
    pub fn timestamp(&self) -> Timestamp {
        match self {
            EntrySample::Tabular(s) => s.timestamp,
            EntrySample::Image(s) => s.timestamp,
        }
    }

    pub fn as_record(&self) -> Option<&'a Record> {
        match self {
            EntrySample::Tabular(s) => Some(s.data),
            EntrySample::Image(_) => None,
        }
    }

    pub fn as_image(&self) -> Option<&'a Image> {
        match self {
            EntrySample::Image(s) => Some(s.data),
            EntrySample::Tabular(_) => None,
        }
    }
}

/// One sample handed to a point entry
#[derive(Debug, Clone)]
pub enum PointSample {
    Tabular(Record),
    Image(Image),
}

impl PointSample {
    pub fn kind(&self) -> EntryKind {
        match self {
            PointSample::Tabular(_) => EntryKind::Tabular,
            PointSample::Image(_) => EntryKind::Image,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Active,
    Closed,
}

/// A named, durably backed stream owned by a session.
///
/// Point entries grow one sample at a time and buffer rows until the next
/// flush; stream entries are written whole by their first flush.
pub struct Entry {
    name: String,
    kind: EntryKind,
    stream: EntryStream,
    backend: FileBackend,
    config: SessionConfig,
    /// Rows already written to disk
    persisted: usize,
    timetrack_bytes: u64,
    rows_bytes: u64,
    manifest_dirty: bool,
    created_at: i64,
    state: EntryState,
}

impl Entry {
    /// Start a point entry from its first sample, which fixes the entry kind.
    ///
    /// An entry already committed under `name` in `session_dir` is resumed:
    /// its rows are loaded and new samples continue after them.
    pub(crate) fn point(
        session_dir: &Path,
        name: &str,
        first: PointSample,
        timestamp: Option<Timestamp>,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        let kind = first.kind();
        let mut entry = if is_entry_dir(&session_dir.join(name)) {
            Self::resume(session_dir, name, kind, config)?
        } else {
            let stream = match kind {
                EntryKind::Image => EntryStream::Image(ImageDataStream::new(name)),
                _ => EntryStream::Tabular(TabularDataStream::empty(name)),
            };
            Self::open(session_dir, name, kind, stream, config)?
        };

        entry.append(timestamp, first)?;
        Ok(entry)
    }

    fn resume(
        session_dir: &Path,
        name: &str,
        kind: EntryKind,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        let dir = session_dir.join(name);
        let (manifest, persisted) = read_entry(&dir)?;
        if manifest.dtype != kind {
            return Err(SessionError::TypeMismatch {
                name: name.to_string(),
                expected: manifest.dtype,
                found: kind,
            });
        }

        let backend = FileBackend::new(dir, config.sync_on_flush)?;
        backend.truncate(TIMETRACK_KEY, manifest.timetrack_bytes)?;
        backend.truncate(ROWS_KEY, manifest.rows_bytes)?;

        let stream = match persisted {
            PersistedStream::Tabular(s) => EntryStream::Tabular(s),
            PersistedStream::Image(s) => EntryStream::Image(s),
        };
        tracing::info!(entry = name, rows = manifest.rows, "resumed entry");

        Ok(Self {
            name: name.to_string(),
            kind,
            stream,
            backend,
            config,
            persisted: manifest.rows,
            timetrack_bytes: manifest.timetrack_bytes,
            rows_bytes: manifest.rows_bytes,
            manifest_dirty: true,
            created_at: manifest.created_at,
            state: EntryState::Active,
        })
    }

    /// Wrap a finished stream; nothing is written until the first flush
    pub(crate) fn from_stream(
        session_dir: &Path,
        stream: EntryStream,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        let name = stream.name().to_string();
        Self::open(session_dir, &name, EntryKind::Stream, stream, config)
    }

    fn open(
        session_dir: &Path,
        name: &str,
        kind: EntryKind,
        stream: EntryStream,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        let backend = FileBackend::new(session_dir.join(name), config.sync_on_flush)?;
        // Leftovers of an entry that never committed a manifest
        backend.truncate(TIMETRACK_KEY, 0)?;
        backend.truncate(ROWS_KEY, 0)?;
        tracing::debug!(entry = name, %kind, "opened entry");

        Ok(Self {
            name: name.to_string(),
            kind,
            stream,
            backend,
            config,
            persisted: 0,
            timetrack_bytes: 0,
            rows_bytes: 0,
            manifest_dirty: true,
            created_at: chrono::Utc::now().timestamp_millis(),
            state: EntryState::Active,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    pub fn state(&self) -> EntryState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == EntryState::Closed
    }

    pub fn dir(&self) -> &Path {
        self.backend.root()
    }

    pub fn stream(&self) -> &EntryStream {
        &self.stream
    }

    pub fn len(&self) -> usize {
        self.stream.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stream.is_empty()
    }

    /// Rows held in memory but not yet on disk
    pub fn pending(&self) -> usize {
        self.stream.len() - self.persisted
    }

    pub fn last_sample(&self) -> Option<EntrySample<'_>> {
        self.stream.last()
    }

    /// Append one sample to a point entry.
    ///
    /// A missing timestamp reuses the previous sample's time (zero for the
    /// first sample). Timestamps are not checked for ordering.
    pub(crate) fn append(
        &mut self,
        timestamp: Option<Timestamp>,
        sample: PointSample,
    ) -> Result<(), SessionError> {
        if self.is_closed() {
            return Err(SessionError::EntryClosed(self.name.clone()));
        }
        if sample.kind() != self.kind {
            return Err(SessionError::TypeMismatch {
                name: self.name.clone(),
                expected: self.kind,
                found: sample.kind(),
            });
        }

        let previous = self.stream.last().map(|s| s.timestamp());
        let timestamp = timestamp.or(previous).unwrap_or(Timestamp::ZERO);
        if previous.is_some_and(|prev| timestamp < prev) {
            tracing::warn!(
                entry = %self.name,
                %timestamp,
                "sample appended out of time order"
            );
        }

        match (&mut self.stream, sample) {
            (EntryStream::Tabular(stream), PointSample::Tabular(record)) => {
                stream.append(timestamp, record)
            }
            (EntryStream::Image(stream), PointSample::Image(image)) => {
                stream.append(timestamp, image)
            }
            (_, sample) => {
                return Err(SessionError::TypeMismatch {
                    name: self.name.clone(),
                    expected: self.kind,
                    found: sample.kind(),
                })
            }
        }
        self.manifest_dirty = true;

        let threshold = self.config.flush_threshold;
        if threshold > 0 && self.pending() >= threshold {
            self.flush()?;
        }
        Ok(())
    }

    /// Write every pending row plus the manifest.
    ///
    /// Frames are written first, then rows, then the timetrack. A failure
    /// cuts both jsonl files back to their committed length, so a retry
    /// starts from the same state.
    pub fn flush(&mut self) -> Result<(), SessionError> {
        if self.pending() == 0 && !self.manifest_dirty {
            return Ok(());
        }

        let first = self.persisted;
        let last = self.stream.len();
        let mut timetrack = Vec::new();
        let mut rows = Vec::new();

        for position in first..last {
            let Some(sample) = self.stream.get_by_position(position) else {
                break;
            };
            let line = TimetrackLine {
                position,
                timestamp_us: sample.timestamp(),
                row: position,
            };
            write_json_line(&mut timetrack, &line)?;

            match sample {
                EntrySample::Tabular(s) => write_json_line(&mut rows, s.data)?,
                EntrySample::Image(s) => {
                    let frame = encode_frame(s.data, self.config.frame_compression);
                    self.backend.write(&frame_key(position), &frame)?;
                }
            }
        }

        if let Err(err) = self.append_batch(&rows, &timetrack) {
            self.rollback();
            return Err(err.into());
        }

        self.persisted = last;
        self.rows_bytes += rows.len() as u64;
        self.timetrack_bytes += timetrack.len() as u64;
        self.manifest_dirty = true;
        self.write_manifest()?;

        tracing::debug!(entry = %self.name, rows = last - first, total = last, "flushed entry");
        Ok(())
    }

    fn append_batch(&self, rows: &[u8], timetrack: &[u8]) -> Result<(), PersistenceError> {
        if !rows.is_empty() {
            self.backend.append(ROWS_KEY, rows)?;
        }
        if !timetrack.is_empty() {
            self.backend.append(TIMETRACK_KEY, timetrack)?;
        }
        if self.config.sync_on_flush {
            self.backend.sync()?;
        }
        Ok(())
    }

    fn rollback(&self) {
        for (key, len) in [(ROWS_KEY, self.rows_bytes), (TIMETRACK_KEY, self.timetrack_bytes)] {
            if let Err(err) = self.backend.truncate(key, len) {
                tracing::warn!(entry = %self.name, key, %err, "could not roll back partial flush");
            }
        }
    }

    /// Flush, mark the entry closed and release its write channels.
    /// Closing twice is a no-op.
    pub fn close(&mut self) -> Result<(), SessionError> {
        if self.is_closed() {
            return Ok(());
        }

        self.flush()?;
        self.state = EntryState::Closed;
        self.write_manifest()?;
        self.backend.release()?;

        tracing::debug!(entry = %self.name, rows = self.persisted, "closed entry");
        Ok(())
    }

    pub fn manifest(&self) -> EntryManifest {
        let (columns, time_field) = match &self.stream {
            EntryStream::Tabular(s) => (s.schema().clone(), s.time_field().map(str::to_string)),
            EntryStream::Image(_) => Default::default(),
        };

        EntryManifest {
            name: self.name.clone(),
            dtype: self.kind,
            payload: self.stream.payload(),
            rows: self.persisted,
            timetrack_bytes: self.timetrack_bytes,
            rows_bytes: self.rows_bytes,
            columns,
            time_field,
            frame_compression: self.config.frame_compression,
            created_at: self.created_at,
            closed: self.is_closed(),
            format_version: FORMAT_VERSION,
        }
    }

    fn write_manifest(&mut self) -> Result<(), SessionError> {
        let bytes = serde_json::to_vec_pretty(&self.manifest())
            .map_err(|e| PersistenceError::Serialization(e.to_string()))?;
        self.backend.write(MANIFEST_KEY, &bytes)?;
        self.manifest_dirty = false;
        Ok(())
    }
}

impl std::fmt::Debug for Entry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entry")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("rows", &self.stream.len())
            .field("persisted", &self.persisted)
            .field("state", &self.state)
            .finish()
    }
}

fn write_json_line<T>(buf: &mut Vec<u8>, value: &T) -> Result<(), PersistenceError>
where
    T: serde::Serialize + ?Sized,
{
    serde_json::to_writer(&mut *buf, value)
        .map_err(|e| PersistenceError::Serialization(e.to_string()))?;
    buf.push(b'\n');
    Ok(())
}
