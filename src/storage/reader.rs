//! Rebuild streams from entry and session directories

use super::manifest::{frame_key, EntryManifest, PayloadKind, TimetrackLine, MANIFEST_KEY, ROWS_KEY, TIMETRACK_KEY};
use super::persistence::{decode_frame, FileBackend, PersistenceBackend, PersistenceError};
use super::entry::EntrySample;
use crate::data::{DataStream, ImageDataStream, Record, TabularDataStream, Timestamp, Timetrack};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// A stream read back from disk
#[derive(Debug, Clone)]
pub enum PersistedStream {
    Tabular(TabularDataStream),
    Image(ImageDataStream),
}

impl PersistedStream {
    pub fn name(&self) -> &str {
        match self {
            PersistedStream::Tabular(s) => s.name(),
            PersistedStream::Image(s) => s.name(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            PersistedStream::Tabular(s) => s.len(),
            PersistedStream::Image(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn time_range(&self) -> Option<(Timestamp, Timestamp)> {
        match self {
            PersistedStream::Tabular(s) => s.as_stream().time_range(),
            PersistedStream::Image(s) => s.time_range(),
        }
    }

    pub fn timetrack(&self) -> &Timetrack {
        match self {
            PersistedStream::Tabular(s) => s.as_stream().timetrack(),
            PersistedStream::Image(s) => s.timetrack(),
        }
    }

    pub fn get_by_position(&self, position: usize) -> Option<EntrySample<'_>> {
        match self {
            PersistedStream::Tabular(s) => s.get_by_position(position).map(EntrySample::Tabular),
            PersistedStream::Image(s) => s.get_by_position(position).map(EntrySample::Image),
        }
    }
}

/// Every entry and subsession found under a session directory
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub dir: PathBuf,
    pub entries: BTreeMap<String, PersistedStream>,
    pub subsessions: Vec<SessionSnapshot>,
}

impl SessionSnapshot {
    pub fn name(&self) -> &str {
        self.dir
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }

    pub fn subsession(&self, name: &str) -> Option<&SessionSnapshot> {
        self.subsessions.iter().find(|s| s.name() == name)
    }

    /// Every stream in this snapshot and below, keyed by its path relative
    /// to this session (`trial_1/imu`)
    pub fn streams(&self) -> Vec<(String, &PersistedStream)> {
        let mut out = Vec::new();
        self.collect_streams("", &mut out);
        out
    }

    fn collect_streams<'a>(&'a self, prefix: &str, out: &mut Vec<(String, &'a PersistedStream)>) {
        for (name, stream) in &self.entries {
            out.push((format!("{}{}", prefix, name), stream));
        }
        for child in &self.subsessions {
            child.collect_streams(&format!("{}{}/", prefix, child.name()), out);
        }
    }
}

pub fn is_entry_dir(dir: &Path) -> bool {
    dir.join(MANIFEST_KEY).is_file()
}

/// Read one entry directory.
///
/// Only the first `manifest.rows` lines are used, so rows appended after the
/// last manifest write are ignored.
pub fn read_entry(dir: &Path) -> Result<(EntryManifest, PersistedStream), PersistenceError> {
    if !is_entry_dir(dir) {
        return Err(PersistenceError::NotAnEntry(dir.to_path_buf()));
    }

    let backend = FileBackend::new(dir, false)?;
    let manifest: EntryManifest = match backend.read(MANIFEST_KEY)? {
        Some(bytes) => serde_json::from_slice(&bytes)
            .map_err(|e| PersistenceError::Deserialization(e.to_string()))?,
        None => return Err(PersistenceError::NotAnEntry(dir.to_path_buf())),
    };

    let lines: Vec<TimetrackLine> = read_lines(&backend, TIMETRACK_KEY, manifest.rows)?;
    if lines.len() < manifest.rows {
        return Err(PersistenceError::Corrupted(format!(
            "entry '{}' lists {} rows but its timetrack has {}",
            manifest.name,
            manifest.rows,
            lines.len()
        )));
    }
    let timeline: Vec<Timestamp> = lines.iter().map(|line| line.timestamp_us).collect();

    let stream = match manifest.payload {
        PayloadKind::Tabular => {
            let rows: Vec<Record> = read_lines(&backend, ROWS_KEY, manifest.rows)?;
            let stream = TabularDataStream::from_timeline(&manifest.name, timeline, rows)
                .map_err(|e| PersistenceError::Corrupted(e.to_string()))?
                .with_time_field(manifest.time_field.clone());
            PersistedStream::Tabular(stream)
        }
        PayloadKind::Image => {
            let mut frames = Vec::with_capacity(lines.len());
            for line in &lines {
                let key = frame_key(line.row);
                let bytes = backend
                    .read(&key)?
                    .ok_or_else(|| PersistenceError::Corrupted(format!("missing {}", key)))?;
                frames.push(decode_frame(&bytes)?);
            }
            let stream = DataStream::from_parts(&manifest.name, timeline, frames)
                .map_err(|e| PersistenceError::Corrupted(e.to_string()))?;
            PersistedStream::Image(stream)
        }
    };

    tracing::debug!(entry = %manifest.name, rows = manifest.rows, "read entry");
    Ok((manifest, stream))
}

/// Read a session directory recursively. Subdirectories holding an
/// `entry.json` are entries, every other subdirectory is a subsession.
pub fn read_session(dir: &Path) -> Result<SessionSnapshot, PersistenceError> {
    let mut children: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_dir())
        .collect();
    children.sort();

    let mut entries = BTreeMap::new();
    let mut subsessions = Vec::new();
    for child in children {
        if is_entry_dir(&child) {
            let (manifest, stream) = read_entry(&child)?;
            entries.insert(manifest.name, stream);
        } else {
            subsessions.push(read_session(&child)?);
        }
    }

    Ok(SessionSnapshot {
        dir: dir.to_path_buf(),
        entries,
        subsessions,
    })
}

fn read_lines<T: DeserializeOwned>(
    backend: &FileBackend,
    key: &str,
    limit: usize,
) -> Result<Vec<T>, PersistenceError> {
    let Some(bytes) = backend.read(key)? else {
        return Ok(Vec::new());
    };

    bytes
        .split(|b| *b == b'\n')
        .filter(|line| !line.is_empty())
        .take(limit)
        .map(|line| {
            serde_json::from_slice(line).map_err(|e| PersistenceError::Deserialization(e.to_string()))
        })
        .collect()
}
