//! Chronoscope: timestamp-indexed sensor streams with durable sessions
//!
//! Records heterogeneous, irregularly sampled data (tabular records and
//! image frames) on a shared timeline, derives new streams from existing
//! ones, and persists everything into a directory tree of sessions.
//!
//! # Features
//!
//! - **Timetrack Index**: O(log n) time-range lookups over any row type
//! - **Trimming**: Drop rows before/after a time, or register a window up front
//! - **Derivation**: Map a stream through a `Transform` into a new tabular stream
//! - **Stage Registry**: Named transforms sharing one pipeline clock
//! - **Sessions**: Buffered point entries, whole-stream entries and nested subsessions
//! - **Frame Storage**: LZ4-compressed image frames, memory-mapped on read
//! - **Replay**: Walk a recorded session window by window across all streams
//!
//! # Example
//!
//! ```no_run
//! use chronoscope::data::{Record, Timestamp, Value};
//! use chronoscope::storage::{read_session, Session};
//!
//! let mut session = Session::new("/tmp/run-01").unwrap();
//!
//! let mut row = Record::new();
//! row.insert("speed".to_string(), Value::Float64(3.2));
//! session.add_tabular("odometry", row, Some(Timestamp::from_millis(20))).unwrap();
//! session.close().unwrap();
//!
//! let snapshot = read_session(session.dir()).unwrap();
//! println!("Entries: {:?}", snapshot.entries.keys().collect::<Vec<_>>());
//! ```

pub mod data;
pub mod pipeline;
pub mod storage;

// Re-export commonly used types
pub use data::{derive, DataStream, GlobalTimetrack, ImageDataStream, Record, TabularDataStream, Timestamp, Transform, Value};
pub use pipeline::StageRegistry;
pub use storage::{Replay, Session, SessionConfig, SessionError};
