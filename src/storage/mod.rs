pub mod config;
pub mod entry;
pub mod manifest;
pub mod persistence;
pub mod reader;
pub mod replay;
pub mod session;

pub use config::SessionConfig;
pub use entry::{Entry, EntrySample, EntryState, EntryStream, PointSample};
pub use manifest::{EntryKind, EntryManifest, PayloadKind};
pub use persistence::{FileBackend, FrameCompression, PersistenceBackend, PersistenceError};
pub use reader::{read_entry, read_session, PersistedStream, SessionSnapshot};
pub use replay::{Chunk, Replay};
pub use session::{Session, SessionError};
