use crate::data::{derive, DataStream, StreamError, TabularDataStream, Timestamp, Transform};
use parking_lot::Mutex;
use std::sync::Arc;

/// Shared handle to a registered stage
pub type StageHandle<R> = Arc<Mutex<dyn Transform<R> + Send>>;

/// Explicit registry of named stages, iterated in registration order
pub struct StageRegistry<R> {
    stages: Vec<(String, StageHandle<R>)>,
    time: Timestamp,
}

impl<R: 'static> StageRegistry<R> {
    pub fn new() -> Self {
        Self {
            stages: Vec::new(),
            time: Timestamp::ZERO,
        }
    }

    /// Register `stage` under `name`. The stage starts at the registry's
    /// current time. The returned handle keeps the concrete stage type.
    pub fn register<T>(&mut self, name: impl Into<String>, stage: T) -> Result<Arc<Mutex<T>>, RegistryError>
    where
        T: Transform<R> + Send + 'static,
    {
        let name = name.into();
        if self.stages.iter().any(|(existing, _)| *existing == name) {
            return Err(RegistryError::DuplicateStage(name));
        }

        let handle = Arc::new(Mutex::new(stage));
        handle.lock().set_time(self.time);
        tracing::debug!(stage = %name, "registered stage");
        let shared: StageHandle<R> = handle.clone();
        self.stages.push((name, shared));
        Ok(handle)
    }

    pub fn get(&self, name: &str) -> Option<StageHandle<R>> {
        self.stages
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, handle)| Arc::clone(handle))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &StageHandle<R>)> {
        self.stages
            .iter()
            .map(|(name, handle)| (name.as_str(), handle))
    }

    pub fn names(&self) -> Vec<&str> {
        self.stages.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn time(&self) -> Timestamp {
        self.time
    }

    /// Move the pipeline clock and hand the new time to every stage
    pub fn set_time(&mut self, time: Timestamp) {
        self.time = time;
        for (_, stage) in &self.stages {
            stage.lock().set_time(time);
        }
    }

    /// Derive one stream per stage from `source`, in registration order
    pub fn derive_all(&self, source: &DataStream<R>) -> Result<Vec<TabularDataStream>, StreamError> {
        let mut derived = Vec::with_capacity(self.stages.len());
        for (_, stage) in &self.stages {
            let mut guard = stage.lock();
            derived.push(derive(&mut *guard, source)?);
        }
        Ok(derived)
    }
}

impl<R: 'static> Default for StageRegistry<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> std::fmt::Debug for StageRegistry<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageRegistry")
            .field("stages", &self.stages.iter().map(|(n, _)| n).collect::<Vec<_>>())
            .field("time", &self.time)
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Stage already registered: {0}")]
    DuplicateStage(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{BoxError, FnTransform, Identity, Output, Record, Sample, Value};

    struct Flag(&'static str);

    impl Transform<Record> for Flag {
        fn output_name(&self) -> Option<&str> {
            Some(self.0)
        }

        fn step(&mut self, _: Sample<'_, Record>) -> Result<Output, BoxError> {
            Ok(Output::Scalar(Value::Bool(true)))
        }
    }

    #[test]
    fn test_register_and_get() {
        let mut registry: StageRegistry<Record> = StageRegistry::new();
        registry.register("copy", Identity::new("copy")).unwrap();
        registry.register("flag", Flag("flag")).unwrap();

        assert_eq!(registry.names(), vec!["copy", "flag"]);
        assert!(registry.get("copy").is_some());
        assert!(registry.get("missing").is_none());
        assert_eq!(
            registry.get("flag").unwrap().lock().output_name(),
            Some("flag")
        );
    }

    #[test]
    fn test_duplicate_stage_rejected() {
        let mut registry: StageRegistry<Record> = StageRegistry::new();
        registry.register("copy", Identity::new("a")).unwrap();
        let result = registry.register("copy", Identity::new("b"));
        assert!(matches!(result, Err(RegistryError::DuplicateStage(name)) if name == "copy"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_set_time_reaches_every_stage() {
        let mut registry: StageRegistry<Record> = StageRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        struct Recorder {
            seen: Arc<Mutex<Vec<Timestamp>>>,
        }
        impl Transform<Record> for Recorder {
            fn output_name(&self) -> Option<&str> {
                Some("recorder")
            }
            fn set_time(&mut self, time: Timestamp) {
                self.seen.lock().push(time);
            }
            fn step(&mut self, _: Sample<'_, Record>) -> Result<Output, BoxError> {
                Ok(Output::Empty)
            }
        }

        registry
            .register("a", Recorder { seen: Arc::clone(&seen) })
            .unwrap();
        registry
            .register("b", Recorder { seen: Arc::clone(&seen) })
            .unwrap();
        registry.set_time(Timestamp::from_secs(3));

        assert_eq!(registry.time(), Timestamp::from_secs(3));
        let seen = seen.lock();
        assert_eq!(seen.len(), 4);
        assert_eq!(&seen[2..], &[Timestamp::from_secs(3), Timestamp::from_secs(3)]);
    }

    #[test]
    fn test_closure_stage_follows_pipeline_clock() {
        let mut registry: StageRegistry<Record> = StageRegistry::new();
        registry.set_time(Timestamp::from_secs(1));

        let stage = registry
            .register(
                "double",
                FnTransform::new("double", |s: Sample<'_, Record>| -> Result<Output, BoxError> {
                    Ok(Output::Scalar(Value::Int64(s.data["x"].as_i64().unwrap_or_default() * 2)))
                }),
            )
            .unwrap();
        assert_eq!(stage.lock().time(), Timestamp::from_secs(1));

        registry.set_time(Timestamp::from_millis(2_500));
        assert_eq!(stage.lock().time(), Timestamp::from_millis(2_500));
        assert_eq!(registry.get("double").unwrap().lock().output_name(), Some("double"));
    }

    #[test]
    fn test_derive_all_in_registration_order() {
        let mut source = DataStream::new("sensor");
        for i in 0..4 {
            let mut row = Record::new();
            row.insert("x".to_string(), Value::Int64(i));
            source.append(Timestamp::from_secs(i), row);
        }

        let mut registry: StageRegistry<Record> = StageRegistry::new();
        registry.register("copy", Identity::new("copy")).unwrap();
        registry.register("flag", Flag("flag")).unwrap();

        let derived = registry.derive_all(&source).unwrap();
        assert_eq!(derived.len(), 2);
        assert_eq!(derived[0].name(), "copy");
        assert_eq!(derived[1].name(), "flag");
        assert_eq!(derived[1].len(), 4);
    }
}
