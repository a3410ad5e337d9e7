//! Building new streams by replaying a transform over an existing one.

use super::stream::{BoxError, DataStream, Sample, StreamError};
use super::tabular::TabularDataStream;
use super::timestamp::Timestamp;
use super::value::{Record, Value};

/// Field that holds scalar transform outputs
pub const SCALAR_FIELD: &str = "data";

/// What a transform produced for one input sample
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    /// Nothing for this timestamp; the sample is skipped
    Empty,
    Scalar(Value),
    Record(Record),
}

impl From<Value> for Output {
    fn from(value: Value) -> Self {
        Output::Scalar(value)
    }
}

impl From<Record> for Output {
    fn from(record: Record) -> Self {
        Output::Record(record)
    }
}

impl<T> From<Option<T>> for Output
where
    T: Into<Output>,
{
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Output::Empty)
    }
}

/// A per-sample processing stage
pub trait Transform<R> {
    /// Name of the stream this stage produces. Required for [`derive`].
    fn output_name(&self) -> Option<&str>;

    /// Update the stage's notion of the current pipeline time
    fn set_time(&mut self, _time: Timestamp) {}

    fn step(&mut self, sample: Sample<'_, R>) -> Result<Output, BoxError>;
}

/// Replay `transform` over every sample of `source` in position order.
///
/// Empty outputs are skipped, scalars land in [`SCALAR_FIELD`], records
/// contribute one column per field. Each emitted row keeps the timestamp of
/// the sample that produced it. A failing step aborts the whole derivation.
pub fn derive<R, T>(transform: &mut T, source: &DataStream<R>) -> Result<TabularDataStream, StreamError>
where
    T: Transform<R> + ?Sized,
{
    let name = transform
        .output_name()
        .ok_or(StreamError::MissingCapability)?
        .to_string();

    let mut derived = TabularDataStream::empty(name.clone());
    let mut skipped = 0;
    for sample in source.iter() {
        let output = transform
            .step(sample)
            .map_err(|err| StreamError::Transform {
                stage: name.clone(),
                position: sample.position,
                source: err,
            })?;

        match output {
            Output::Empty => skipped += 1,
            Output::Scalar(value) => {
                let mut row = Record::with_capacity(1);
                row.insert(SCALAR_FIELD.to_string(), value);
                derived.append(sample.timestamp, row);
            }
            Output::Record(row) => derived.append(sample.timestamp, row),
        }
    }

    tracing::debug!(
        source = source.name(),
        output = %name,
        rows = derived.len(),
        skipped,
        "derived stream"
    );
    Ok(derived)
}

/// Stage that forwards each record unchanged
#[derive(Debug, Clone)]
pub struct Identity {
    output: String,
}

impl Identity {
    pub fn new(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
        }
    }
}

impl Transform<Record> for Identity {
    fn output_name(&self) -> Option<&str> {
        Some(&self.output)
    }

    fn step(&mut self, sample: Sample<'_, Record>) -> Result<Output, BoxError> {
        Ok(Output::Record(sample.data.clone()))
    }
}

/// Stage built from a closure
pub struct FnTransform<F> {
    output: Option<String>,
    time: Timestamp,
    step: F,
}

impl<F> FnTransform<F> {
    pub fn new(output: impl Into<String>, step: F) -> Self {
        Self {
            output: Some(output.into()),
            time: Timestamp::ZERO,
            step,
        }
    }

    /// Closure stage without a declared output name
    pub fn anonymous(step: F) -> Self {
        Self {
            output: None,
            time: Timestamp::ZERO,
            step,
        }
    }

    /// Last time handed to the stage by its pipeline
    pub fn time(&self) -> Timestamp {
        self.time
    }
}

impl<R, F> Transform<R> for FnTransform<F>
where
    F: FnMut(Sample<'_, R>) -> Result<Output, BoxError>,
{
    fn output_name(&self) -> Option<&str> {
        self.output.as_deref()
    }

    fn set_time(&mut self, time: Timestamp) {
        self.time = time;
    }

    fn step(&mut self, sample: Sample<'_, R>) -> Result<Output, BoxError> {
        (self.step)(sample)
    }
}
