use super::config::SessionConfig;
use super::entry::{Entry, EntrySample, EntryStream, PointSample};
use super::manifest::EntryKind;
use super::persistence::PersistenceError;
use super::reader::is_entry_dir;
use crate::data::{Image, Record, StreamError, Timestamp};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("entry '{name}' holds {expected} data, got {found}")]
    TypeMismatch {
        name: String,
        expected: EntryKind,
        found: EntryKind,
    },

    #[error("name '{0}' is already used in this session")]
    DuplicateName(String),

    #[error("no entry named '{0}'")]
    UnknownEntry(String),

    #[error("entry '{0}' is closed")]
    EntryClosed(String),

    #[error("session at {} is closed", .0.display())]
    SessionClosed(PathBuf),

    #[error("invalid entry name '{0}'")]
    InvalidName(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// A directory of named entries plus a tree of child sessions.
///
/// Each entry lives in `<dir>/<name>/`, each subsession in `<dir>/<name>/`
/// as well, so the two share one namespace.
pub struct Session {
    dir: PathBuf,
    config: SessionConfig,
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
    subsessions: Vec<Session>,
    closed: bool,
}

impl Session {
    /// Open a session rooted at `dir`, creating the directory if needed
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, SessionError> {
        Self::with_config(dir, SessionConfig::default())
    }

    pub fn with_config(dir: impl Into<PathBuf>, config: SessionConfig) -> Result<Self, SessionError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        tracing::info!(dir = %dir.display(), "opened session");

        Ok(Self {
            dir,
            config,
            entries: Vec::new(),
            index: HashMap::new(),
            subsessions: Vec::new(),
            closed: false,
        })
    }

    /// Open `<log_dir>/<name>` with the environment-adjusted default config
    pub fn open_experiment(log_dir: impl AsRef<Path>, name: &str) -> Result<Self, SessionError> {
        validate_name(name)?;
        Self::with_config(log_dir.as_ref().join(name), SessionConfig::default().from_env())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn config(&self) -> SessionConfig {
        self.config
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Record one tabular sample under `name`.
    ///
    /// The first call for a name creates a tabular point entry; a `None`
    /// timestamp reuses the entry's previous timestamp.
    pub fn add_tabular(
        &mut self,
        name: &str,
        record: Record,
        timestamp: Option<Timestamp>,
    ) -> Result<(), SessionError> {
        self.add_point(name, PointSample::Tabular(record), timestamp)
    }

    /// Record one image under `name`
    pub fn add_image(
        &mut self,
        name: &str,
        image: Image,
        timestamp: Option<Timestamp>,
    ) -> Result<(), SessionError> {
        self.add_point(name, PointSample::Image(image), timestamp)
    }

    fn add_point(
        &mut self,
        name: &str,
        sample: PointSample,
        timestamp: Option<Timestamp>,
    ) -> Result<(), SessionError> {
        if let Some(&i) = self.index.get(name) {
            return self.entries[i].append(timestamp, sample);
        }

        self.check_new_name(name)?;
        let path = self.dir.join(name);
        if !is_entry_dir(&path) && has_contents(&path) {
            return Err(SessionError::DuplicateName(name.to_string()));
        }
        let entry = Entry::point(&self.dir, name, sample, timestamp, self.config)?;
        self.insert(entry);
        Ok(())
    }

    /// Register a finished stream as an entry named after the stream.
    /// It is written in full by the next flush. Names already present on
    /// disk are refused rather than overwritten.
    pub fn create_stream(&mut self, stream: impl Into<EntryStream>) -> Result<&Entry, SessionError> {
        let stream = stream.into();
        self.check_new_name(stream.name())?;
        if has_contents(&self.dir.join(stream.name())) {
            return Err(SessionError::DuplicateName(stream.name().to_string()));
        }

        let entry = Entry::from_stream(&self.dir, stream, self.config)?;
        let i = self.insert(entry);
        Ok(&self.entries[i])
    }

    fn insert(&mut self, entry: Entry) -> usize {
        let i = self.entries.len();
        self.index.insert(entry.name().to_string(), i);
        self.entries.push(entry);
        i
    }

    fn check_new_name(&self, name: &str) -> Result<(), SessionError> {
        if self.closed {
            return Err(SessionError::SessionClosed(self.dir.clone()));
        }
        validate_name(name)?;
        if self.index.contains_key(name) || self.subsession(name).is_some() {
            return Err(SessionError::DuplicateName(name.to_string()));
        }
        Ok(())
    }

    /// Most recent sample of the named entry, `None` if the entry is empty
    pub fn get_last_sample(&self, name: &str) -> Result<Option<EntrySample<'_>>, SessionError> {
        self.entry(name)
            .map(Entry::last_sample)
            .ok_or_else(|| SessionError::UnknownEntry(name.to_string()))
    }

    pub fn entry(&self, name: &str) -> Option<&Entry> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    /// Entries in creation order
    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter()
    }

    pub fn entry_names(&self) -> Vec<&str> {
        self.entries.iter().map(Entry::name).collect()
    }

    /// Create a child session at `<dir>/<name>`, sharing this session's config
    pub fn create_subsession(&mut self, name: &str) -> Result<&mut Session, SessionError> {
        self.check_new_name(name)?;
        if is_entry_dir(&self.dir.join(name)) {
            return Err(SessionError::DuplicateName(name.to_string()));
        }

        let child = Session::with_config(self.dir.join(name), self.config)?;
        self.subsessions.push(child);
        let last = self.subsessions.len() - 1;
        Ok(&mut self.subsessions[last])
    }

    pub fn subsession(&self, name: &str) -> Option<&Session> {
        self.subsessions.iter().find(|s| s.name() == Some(name))
    }

    pub fn subsession_mut(&mut self, name: &str) -> Option<&mut Session> {
        self.subsessions.iter_mut().find(|s| s.name() == Some(name))
    }

    pub fn subsessions(&self) -> &[Session] {
        &self.subsessions
    }

    fn name(&self) -> Option<&str> {
        self.dir.file_name().and_then(|n| n.to_str())
    }

    /// Rows buffered across this session's own entries
    pub fn pending(&self) -> usize {
        self.entries.iter().map(Entry::pending).sum()
    }

    /// Write pending rows of this session's own entries. Subsessions are
    /// flushed separately.
    pub fn flush(&mut self) -> Result<(), SessionError> {
        for entry in &mut self.entries {
            entry.flush()?;
        }
        Ok(())
    }

    /// Flush, close every entry, then close subsessions depth-first.
    /// Closing twice is a no-op.
    pub fn close(&mut self) -> Result<(), SessionError> {
        if self.closed {
            return Ok(());
        }

        self.flush()?;
        for entry in &mut self.entries {
            entry.close()?;
        }
        for child in &mut self.subsessions {
            child.close()?;
        }

        self.closed = true;
        tracing::info!(
            dir = %self.dir.display(),
            entries = self.entries.len(),
            subsessions = self.subsessions.len(),
            "closed session"
        );
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.closed && self.pending() > 0 {
            tracing::warn!(
                dir = %self.dir.display(),
                pending = self.pending(),
                "session dropped without close, buffered rows were not written"
            );
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("dir", &self.dir)
            .field("entries", &self.entries)
            .field("subsessions", &self.subsessions)
            .field("closed", &self.closed)
            .finish()
    }
}

fn has_contents(dir: &Path) -> bool {
    std::fs::read_dir(dir)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

fn validate_name(name: &str) -> Result<(), SessionError> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(SessionError::InvalidName(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ImageDataStream, TabularDataStream, Value};
    use crate::storage::reader::{read_entry, read_session, PersistedStream};
    use tempfile::TempDir;

    fn row(field: &str, value: impl Into<Value>) -> Record {
        let mut record = Record::new();
        record.insert(field.to_string(), value.into());
        record
    }

    fn unbuffered(dir: &Path) -> Session {
        Session::with_config(dir, SessionConfig::new().with_flush_threshold(0)).unwrap()
    }

    #[test]
    fn test_creates_nested_directories() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("a").join("b");
        let session = Session::new(&dir).unwrap();
        assert!(dir.is_dir());
        drop(session);

        // Reopening an existing directory is fine
        Session::new(&dir).unwrap();
    }

    #[test]
    fn test_type_mismatch_keeps_first_record() {
        let temp = TempDir::new().unwrap();
        let mut session = Session::new(temp.path()).unwrap();

        session.add_tabular("x", row("v", 1i64), None).unwrap();
        let result = session.add_image("x", Image::filled(2, 2, 1, 0), None);
        assert!(matches!(
            result,
            Err(SessionError::TypeMismatch {
                expected: EntryKind::Tabular,
                found: EntryKind::Image,
                ..
            })
        ));

        let last = session.get_last_sample("x").unwrap().unwrap();
        assert_eq!(last.as_record().unwrap()["v"], Value::Int64(1));
        assert_eq!(session.entry("x").unwrap().len(), 1);
    }

    #[test]
    fn test_get_last_sample() {
        let temp = TempDir::new().unwrap();
        let mut session = Session::new(temp.path()).unwrap();

        assert!(matches!(
            session.get_last_sample("missing"),
            Err(SessionError::UnknownEntry(_))
        ));

        for i in 0..5i64 {
            session
                .add_tabular("imu", row("acc", i as f64 * 0.5), Some(Timestamp::from_millis(i * 10)))
                .unwrap();
        }
        let last = session.get_last_sample("imu").unwrap().unwrap();
        assert_eq!(last.timestamp(), Timestamp::from_millis(40));
        assert_eq!(last.as_record().unwrap()["acc"], Value::Float64(2.0));

        session.create_stream(TabularDataStream::empty("idle")).unwrap();
        assert!(session.get_last_sample("idle").unwrap().is_none());
    }

    #[test]
    fn test_close_without_flush_is_durable() {
        let temp = TempDir::new().unwrap();
        let mut session = unbuffered(temp.path());

        for i in 0..3i64 {
            session
                .add_tabular("speed", row("v", i), Some(Timestamp::from_secs(i)))
                .unwrap();
        }
        session.close().unwrap();

        let (manifest, stream) = read_entry(&temp.path().join("speed")).unwrap();
        assert!(manifest.closed);
        assert_eq!(manifest.rows, 3);
        match stream {
            PersistedStream::Tabular(stream) => {
                assert_eq!(stream.len(), 3);
                let last = stream.last().unwrap();
                assert_eq!(last.timestamp, Timestamp::from_secs(2));
                assert_eq!(last.data["v"], Value::Int64(2));
            }
            other => panic!("expected tabular stream, got {:?}", other),
        }
    }

    #[test]
    fn test_flush_does_not_recurse() {
        let temp = TempDir::new().unwrap();
        let mut session = unbuffered(temp.path());
        session.add_tabular("top", row("v", 1i64), None).unwrap();

        let child = session.create_subsession("trial_1").unwrap();
        child.add_tabular("inner", row("v", 2i64), None).unwrap();

        session.flush().unwrap();
        assert_eq!(session.pending(), 0);
        assert_eq!(session.subsession("trial_1").unwrap().pending(), 1);

        session.close().unwrap();
        assert_eq!(session.subsession("trial_1").unwrap().pending(), 0);
    }

    #[test]
    fn test_close_cascades_to_subsessions() {
        let temp = TempDir::new().unwrap();
        let mut session = Session::new(temp.path()).unwrap();
        {
            let child = session.create_subsession("run").unwrap();
            child.add_tabular("loss", row("value", 0.25), None).unwrap();
            child.create_subsession("nested").unwrap();
        }

        session.close().unwrap();
        session.close().unwrap();

        let child = session.subsession_mut("run").unwrap();
        assert!(child.is_closed());
        assert!(child.subsession("nested").unwrap().is_closed());
        assert!(child.entry("loss").unwrap().is_closed());
        assert!(matches!(
            child.add_tabular("loss", row("value", 0.1), None),
            Err(SessionError::EntryClosed(_))
        ));
        assert!(matches!(
            child.add_tabular("other", row("value", 0.1), None),
            Err(SessionError::SessionClosed(_))
        ));

        let snapshot = read_session(temp.path()).unwrap();
        assert_eq!(snapshot.subsessions.len(), 1);
        assert!(snapshot.subsessions[0].entries.contains_key("loss"));
    }

    #[test]
    fn test_duplicate_and_invalid_names() {
        let temp = TempDir::new().unwrap();
        let mut session = Session::new(temp.path()).unwrap();

        session.add_tabular("a", row("v", 1i64), None).unwrap();
        assert!(matches!(
            session.create_stream(TabularDataStream::empty("a")),
            Err(SessionError::DuplicateName(_))
        ));
        assert!(matches!(
            session.create_subsession("a"),
            Err(SessionError::DuplicateName(_))
        ));

        session.create_subsession("sub").unwrap();
        assert!(matches!(
            session.add_tabular("sub", row("v", 1i64), None),
            Err(SessionError::DuplicateName(_))
        ));

        for bad in ["", ".", "..", "a/b"] {
            assert!(matches!(
                session.add_tabular(bad, row("v", 1i64), None),
                Err(SessionError::InvalidName(_))
            ));
        }
    }

    #[test]
    fn test_auto_flush_at_threshold() {
        let temp = TempDir::new().unwrap();
        let config = SessionConfig::new().with_flush_threshold(2).with_sync_on_flush(false);
        let mut session = Session::with_config(temp.path(), config).unwrap();

        session.add_tabular("t", row("v", 1i64), None).unwrap();
        assert_eq!(session.pending(), 1);
        session.add_tabular("t", row("v", 2i64), None).unwrap();
        assert_eq!(session.pending(), 0);

        let (manifest, _) = read_entry(&temp.path().join("t")).unwrap();
        assert_eq!(manifest.rows, 2);
        assert!(!manifest.closed);
    }

    #[test]
    fn test_images_persist() {
        let temp = TempDir::new().unwrap();
        let mut session = Session::new(temp.path()).unwrap();

        for i in 0..3u8 {
            session
                .add_image("cam", Image::filled(4, 3, 3, i * 10), Some(Timestamp::from_millis(i as i64 * 33)))
                .unwrap();
        }
        let mut clip = ImageDataStream::new("clip");
        clip.append(Timestamp::ZERO, Image::filled(2, 2, 1, 255));
        session.create_stream(clip).unwrap();
        session.close().unwrap();

        let snapshot = read_session(temp.path()).unwrap();
        match &snapshot.entries["cam"] {
            PersistedStream::Image(stream) => {
                assert_eq!(stream.len(), 3);
                assert_eq!(stream.frame_size(), Some((4, 3)));
                let last = stream.last().unwrap();
                assert_eq!(last.timestamp, Timestamp::from_millis(66));
                assert_eq!(*last.data, Image::filled(4, 3, 3, 20));
            }
            other => panic!("expected image stream, got {:?}", other),
        }
        assert_eq!(snapshot.entries["clip"].len(), 1);
        assert_eq!(
            session.entry("clip").unwrap().kind(),
            EntryKind::Stream
        );
    }

    #[test]
    fn test_reopened_session_continues_entry() {
        let temp = TempDir::new().unwrap();
        {
            let mut first = Session::new(temp.path()).unwrap();
            first.add_tabular("x", row("v", 1i64), Some(Timestamp::from_secs(1))).unwrap();
            first.add_image("cam", Image::filled(2, 2, 1, 10), Some(Timestamp::ZERO)).unwrap();
            first.close().unwrap();
        }

        let mut second = Session::new(temp.path()).unwrap();
        second.add_tabular("x", row("v", 2i64), Some(Timestamp::from_secs(2))).unwrap();
        second.add_tabular("x", row("v", 3i64), None).unwrap();
        second.add_image("cam", Image::filled(2, 2, 1, 20), Some(Timestamp::from_secs(1))).unwrap();
        assert_eq!(second.entry("x").unwrap().len(), 3);
        second.close().unwrap();

        let (manifest, stream) = read_entry(&temp.path().join("x")).unwrap();
        assert_eq!(manifest.rows, 3);
        let PersistedStream::Tabular(stream) = stream else {
            panic!("expected tabular stream");
        };
        let values: Vec<_> = stream.iter().map(|s| (s.timestamp, s.data["v"].clone())).collect();
        assert_eq!(
            values,
            vec![
                (Timestamp::from_secs(1), Value::Int64(1)),
                (Timestamp::from_secs(2), Value::Int64(2)),
                (Timestamp::from_secs(2), Value::Int64(3)),
            ]
        );

        let (_, frames) = read_entry(&temp.path().join("cam")).unwrap();
        let PersistedStream::Image(frames) = frames else {
            panic!("expected image stream");
        };
        assert_eq!(frames.len(), 2);
        assert_eq!(*frames.get_by_position(0).unwrap().data, Image::filled(2, 2, 1, 10));
        assert_eq!(*frames.get_by_position(1).unwrap().data, Image::filled(2, 2, 1, 20));
    }

    #[test]
    fn test_reopened_entry_keeps_its_kind() {
        let temp = TempDir::new().unwrap();
        {
            let mut first = Session::new(temp.path()).unwrap();
            first.add_tabular("x", row("v", 1i64), None).unwrap();
            first.close().unwrap();
        }

        let mut second = Session::new(temp.path()).unwrap();
        assert!(matches!(
            second.add_image("x", Image::filled(1, 1, 1, 0), None),
            Err(SessionError::TypeMismatch {
                expected: EntryKind::Tabular,
                found: EntryKind::Image,
                ..
            })
        ));
        assert!(second.entry("x").is_none());
        second.close().unwrap();

        let (manifest, _) = read_entry(&temp.path().join("x")).unwrap();
        assert_eq!(manifest.rows, 1);
        assert!(manifest.closed);
    }

    #[test]
    fn test_names_on_disk_are_reserved() {
        let temp = TempDir::new().unwrap();
        {
            let mut first = Session::new(temp.path()).unwrap();
            first.add_tabular("x", row("v", 1i64), None).unwrap();
            first
                .create_subsession("trial")
                .unwrap()
                .add_tabular("loss", row("v", 0.5), None)
                .unwrap();
            first.close().unwrap();
        }

        let mut second = Session::new(temp.path()).unwrap();
        assert!(matches!(
            second.create_stream(TabularDataStream::empty("x")),
            Err(SessionError::DuplicateName(_))
        ));
        assert!(matches!(
            second.create_subsession("x"),
            Err(SessionError::DuplicateName(_))
        ));
        assert!(matches!(
            second.add_tabular("trial", row("v", 1i64), None),
            Err(SessionError::DuplicateName(_))
        ));

        // Subsessions reopen like sessions do
        let trial = second.create_subsession("trial").unwrap();
        trial.add_tabular("loss", row("v", 0.25), None).unwrap();
        second.close().unwrap();

        let (manifest, _) = read_entry(&temp.path().join("trial").join("loss")).unwrap();
        assert_eq!(manifest.rows, 2);
    }

    #[test]
    fn test_failed_flush_can_be_retried() {
        for blocked in ["rows.jsonl", "timetrack.jsonl"] {
            let temp = TempDir::new().unwrap();
            let mut session = Session::with_config(
                temp.path(),
                SessionConfig::new().with_flush_threshold(0).with_sync_on_flush(false),
            )
            .unwrap();

            session.add_tabular("x", row("v", 0i64), Some(Timestamp::ZERO)).unwrap();
            session.add_tabular("x", row("v", 1i64), Some(Timestamp::from_secs(1))).unwrap();

            // A directory where the file should be makes the write fail
            let blocker = temp.path().join("x").join(blocked);
            std::fs::create_dir(&blocker).unwrap();
            assert!(session.flush().is_err());
            assert_eq!(session.pending(), 2);

            std::fs::remove_dir(&blocker).unwrap();
            session.flush().unwrap();
            session.add_tabular("x", row("v", 2i64), Some(Timestamp::from_secs(2))).unwrap();
            session.close().unwrap();

            let (manifest, stream) = read_entry(&temp.path().join("x")).unwrap();
            assert_eq!(manifest.rows, 3, "blocked {}", blocked);
            let PersistedStream::Tabular(stream) = stream else {
                panic!("expected tabular stream");
            };
            let pairs: Vec<_> = stream.iter().map(|s| (s.timestamp, s.data["v"].clone())).collect();
            assert_eq!(
                pairs,
                vec![
                    (Timestamp::ZERO, Value::Int64(0)),
                    (Timestamp::from_secs(1), Value::Int64(1)),
                    (Timestamp::from_secs(2), Value::Int64(2)),
                ],
                "blocked {}",
                blocked
            );
        }
    }

    #[test]
    fn test_open_experiment() {
        let temp = TempDir::new().unwrap();
        let mut session = Session::open_experiment(temp.path(), "exp_01").unwrap();
        assert_eq!(session.dir(), temp.path().join("exp_01"));
        session.add_tabular("loss", row("v", 0.1), None).unwrap();
        session.close().unwrap();

        let snapshot = read_session(temp.path()).unwrap();
        assert!(snapshot.subsession("exp_01").unwrap().entries.contains_key("loss"));

        assert!(matches!(
            Session::open_experiment(temp.path(), "../escape"),
            Err(SessionError::InvalidName(_))
        ));
    }
}
