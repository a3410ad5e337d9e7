use super::stream::{DataStream, Sample, StreamError};
use super::timestamp::Timestamp;
use super::value::{DataType, Record, Value};
use std::collections::BTreeMap;

/// Field name used for timestamps when a stream has no designated time field
pub const DEFAULT_TIME_FIELD: &str = "time";

/// Data stream of named-field records.
///
/// Tracks the union of every field seen so far along with its merged type.
/// Records missing a field simply leave it absent.
#[derive(Debug, Clone)]
pub struct TabularDataStream {
    stream: DataStream<Record>,
    schema: BTreeMap<String, DataType>,
    time_field: Option<String>,
}

impl TabularDataStream {
    /// Empty stream, ready for incremental appends
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            stream: DataStream::new(name),
            schema: BTreeMap::new(),
            time_field: None,
        }
    }

    /// Build a stream from in-memory rows, reading each row's timestamp from
    /// `time_field`
    pub fn from_records(
        name: impl Into<String>,
        rows: Vec<Record>,
        time_field: &str,
    ) -> Result<Self, StreamError> {
        let timeline = rows
            .iter()
            .enumerate()
            .map(|(position, row)| {
                row.get(time_field)
                    .and_then(Timestamp::from_value)
                    .ok_or_else(|| StreamError::MissingTimestamp {
                        position,
                        field: time_field.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut stream = Self::from_timeline(name, timeline, rows)?;
        stream.time_field = Some(time_field.to_string());
        Ok(stream)
    }

    /// Build a stream whose timestamps are kept only in the timetrack
    pub fn from_timeline(
        name: impl Into<String>,
        timeline: Vec<Timestamp>,
        rows: Vec<Record>,
    ) -> Result<Self, StreamError> {
        let mut schema = BTreeMap::new();
        for row in &rows {
            merge_schema(&mut schema, row);
        }
        Ok(Self {
            stream: DataStream::from_parts(name, timeline, rows)?,
            schema,
            time_field: None,
        })
    }

    pub(crate) fn with_time_field(mut self, time_field: Option<String>) -> Self {
        self.time_field = time_field;
        self
    }

    pub fn name(&self) -> &str {
        self.stream.name()
    }

    pub fn len(&self) -> usize {
        self.stream.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stream.is_empty()
    }

    /// Read-only access to the underlying stream
    pub fn as_stream(&self) -> &DataStream<Record> {
        &self.stream
    }

    /// Field names present in the rows currently held, sorted
    pub fn columns(&self) -> Vec<&str> {
        self.schema.keys().map(String::as_str).collect()
    }

    pub fn schema(&self) -> &BTreeMap<String, DataType> {
        &self.schema
    }

    pub fn time_field(&self) -> Option<&str> {
        self.time_field.as_deref()
    }

    pub fn get(&self, start: Timestamp, end: Timestamp) -> Vec<Sample<'_, Record>> {
        self.stream.get(start, end)
    }

    pub fn get_by_position(&self, position: usize) -> Option<Sample<'_, Record>> {
        self.stream.get_by_position(position)
    }

    pub fn last(&self) -> Option<Sample<'_, Record>> {
        self.stream.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = Sample<'_, Record>> + '_ {
        self.stream.iter()
    }

    pub fn append(&mut self, timestamp: Timestamp, record: Record) {
        merge_schema(&mut self.schema, &record);
        self.stream.append(timestamp, record);
    }

    pub fn trim_before(&mut self, t: Timestamp) -> usize {
        let removed = self.stream.trim_before(t);
        self.rebuild_schema(removed);
        removed
    }

    pub fn trim_after(&mut self, t: Timestamp) -> usize {
        let removed = self.stream.trim_after(t);
        self.rebuild_schema(removed);
        removed
    }

    pub fn set_trim_window(&mut self, before: Option<Timestamp>, after: Option<Timestamp>) {
        self.stream.set_trim_window(before, after);
    }

    pub fn apply_trim_window(&mut self) -> usize {
        let removed = self.stream.apply_trim_window();
        self.rebuild_schema(removed);
        removed
    }

    /// Trims can drop the last row carrying a field, so the schema is
    /// recomputed from the rows that remain
    fn rebuild_schema(&mut self, removed: usize) {
        if removed == 0 {
            return;
        }
        self.schema.clear();
        for sample in self.stream.iter() {
            merge_schema(&mut self.schema, sample.data);
        }
    }

    /// Rows in position order with the timestamp written into the time field
    pub fn to_rows(&self) -> Vec<Record> {
        let field = self.time_field().unwrap_or(DEFAULT_TIME_FIELD);
        self.stream
            .iter()
            .map(|sample| {
                let mut row = sample.data.clone();
                row.insert(field.to_string(), Value::from(sample.timestamp));
                row
            })
            .collect()
    }
}

fn merge_schema(schema: &mut BTreeMap<String, DataType>, record: &Record) {
    for (name, value) in record {
        let value_type = DataType::from_value(value);
        schema
            .entry(name.clone())
            .and_modify(|t| *t = t.merge(&value_type))
            .or_insert(value_type);
    }
}
