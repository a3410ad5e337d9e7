//! Durable storage for entries
//!
//! Every entry owns one backend rooted at its own directory. Keys are
//! relative paths inside that directory (`rows.jsonl`, `frames/00000003.frame`).

pub mod file;
pub mod frames;

pub use file::FileBackend;
pub use frames::{decode_frame, encode_frame, FrameCompression};

/// Trait for persistence backends
pub trait PersistenceBackend: Send + Sync {
    /// Replace the content stored under `key`
    fn write(&self, key: &str, data: &[u8]) -> Result<(), PersistenceError>;

    /// Add `data` at the end of `key`, creating it if needed
    fn append(&self, key: &str, data: &[u8]) -> Result<(), PersistenceError>;

    /// Read the content stored under `key`
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, PersistenceError>;

    /// Length in bytes of the content under `key` (0 when absent)
    fn size(&self, key: &str) -> Result<u64, PersistenceError>;

    /// Cut the content under `key` back to `len` bytes
    fn truncate(&self, key: &str, len: u64) -> Result<(), PersistenceError>;

    /// Force buffered writes to disk
    fn sync(&self) -> Result<(), PersistenceError>;

    /// Sync and drop every open write channel
    fn release(&self) -> Result<(), PersistenceError>;
}

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Corrupted data: {0}")]
    Corrupted(String),

    #[error("Compression error: {0}")]
    Compression(String),

    #[error("Not an entry directory: {}", .0.display())]
    NotAnEntry(std::path::PathBuf),
}
