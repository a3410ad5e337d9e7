//! Groups of named transformation stages sharing one pipeline clock.

pub mod registry;

pub use registry::{RegistryError, StageHandle, StageRegistry};
