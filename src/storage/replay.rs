//! Windowed playback of a recorded session on one shared timeline

use super::entry::EntrySample;
use super::reader::{PersistedStream, SessionSnapshot};
use crate::data::{GlobalTimetrack, StreamError, Timestamp, Window};
use std::collections::BTreeMap;

/// Rows of every stream that fall inside one window
#[derive(Debug, Clone)]
pub struct Chunk<'a> {
    pub index: usize,
    pub window: Window,
    /// One list per stream, empty when the stream has nothing in the window
    pub samples: BTreeMap<&'a str, Vec<EntrySample<'a>>>,
}

impl Chunk<'_> {
    pub fn len(&self) -> usize {
        self.samples.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Streams of a snapshot merged into one timeline and cut into windows
pub struct Replay<'a> {
    streams: Vec<&'a PersistedStream>,
    global: GlobalTimetrack,
    windows: Vec<Window>,
}

impl<'a> Replay<'a> {
    /// Cover the whole recording with windows of `size`
    pub fn new(snapshot: &'a SessionSnapshot, size: Timestamp) -> Result<Self, StreamError> {
        Self::with_bounds(snapshot, size, None, None)
    }

    /// Like [`Replay::new`], skipping time before `start` and after `end`
    pub fn with_bounds(
        snapshot: &'a SessionSnapshot,
        size: Timestamp,
        start: Option<Timestamp>,
        end: Option<Timestamp>,
    ) -> Result<Self, StreamError> {
        let members = snapshot.streams();
        let global = GlobalTimetrack::new(
            members
                .iter()
                .map(|(name, stream)| (name.as_str(), stream.timetrack())),
        );
        let windows = global.windows(size, start, end)?;
        tracing::debug!(
            streams = members.len(),
            rows = global.len(),
            windows = windows.len(),
            "built replay"
        );

        Ok(Self {
            streams: members.into_iter().map(|(_, stream)| stream).collect(),
            global,
            windows,
        })
    }

    pub fn global(&self) -> &GlobalTimetrack {
        &self.global
    }

    pub fn windows(&self) -> &[Window] {
        &self.windows
    }

    /// Number of windows
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    pub fn chunk(&self, index: usize) -> Option<Chunk<'_>> {
        let window = *self.windows.get(index)?;
        let mut samples: BTreeMap<&str, Vec<EntrySample<'_>>> = self
            .global
            .streams()
            .iter()
            .map(|name| (name.as_str(), Vec::new()))
            .collect();

        for entry in self.global.range(window.start, window.end) {
            let name = self.global.streams()[entry.stream].as_str();
            if let Some(sample) = self.streams[entry.stream].get_by_position(entry.position) {
                samples.entry(name).or_default().push(sample);
            }
        }

        Some(Chunk {
            index,
            window,
            samples,
        })
    }

    /// Chunks in window order
    pub fn iter(&self) -> impl Iterator<Item = Chunk<'_>> + '_ {
        (0..self.windows.len()).filter_map(move |index| self.chunk(index))
    }
}
