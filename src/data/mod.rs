pub mod derive;
pub mod global;
pub mod image;
pub mod stream;
pub mod tabular;
pub mod timestamp;
pub mod timetrack;
pub mod value;

pub use derive::{derive, FnTransform, Identity, Output, Transform, SCALAR_FIELD};
pub use global::{windows, GlobalEntry, GlobalTimetrack, Window};
pub use image::{FrameSource, Image, ImageDataStream};
pub use stream::{BoxError, DataStream, Sample, StreamError, TrimWindow};
pub use tabular::{TabularDataStream, DEFAULT_TIME_FIELD};
pub use timestamp::{DurationOutOfRange, Timestamp};
pub use timetrack::{Timetrack, TimetrackEntry};
pub use value::{flatten_json, DataType, Record, Value};
