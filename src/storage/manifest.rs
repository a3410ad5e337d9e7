//! Per-entry metadata and file naming

use super::persistence::FrameCompression;
use crate::data::{DataType, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const MANIFEST_KEY: &str = "entry.json";
pub const TIMETRACK_KEY: &str = "timetrack.jsonl";
pub const ROWS_KEY: &str = "rows.jsonl";
pub const FORMAT_VERSION: u32 = 1;

pub fn frame_key(row: usize) -> String {
    format!("frames/{:08}.frame", row)
}

/// How an entry came to be, fixed at its first write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// Built one image at a time
    Image,
    /// Built one record at a time
    Tabular,
    /// Registered whole from a finished stream
    Stream,
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryKind::Image => write!(f, "image"),
            EntryKind::Tabular => write!(f, "tabular"),
            EntryKind::Stream => write!(f, "stream"),
        }
    }
}

/// Row type stored by an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadKind {
    Tabular,
    Image,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryManifest {
    pub name: String,
    pub dtype: EntryKind,
    pub payload: PayloadKind,
    /// Rows durably written so far
    pub rows: usize,
    /// Committed length of `timetrack.jsonl`; bytes past it are a torn write
    pub timetrack_bytes: u64,
    /// Committed length of `rows.jsonl`
    pub rows_bytes: u64,
    #[serde(default)]
    pub columns: BTreeMap<String, DataType>,
    #[serde(default)]
    pub time_field: Option<String>,
    #[serde(default)]
    pub frame_compression: FrameCompression,
    /// Creation time, epoch milliseconds
    pub created_at: i64,
    pub closed: bool,
    pub format_version: u32,
}

/// One line of `timetrack.jsonl`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimetrackLine {
    pub position: usize,
    pub timestamp_us: Timestamp,
    pub row: usize,
}
