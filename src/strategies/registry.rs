use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use super::algorithm::{Algorithm, AlgorithmError};
use super::options::Options;

/// Name → algorithm lookup. `Default` is uninitialized; use `new()` for an empty registry.
#[derive(Default)]
pub struct AlgorithmRegistry {
    algorithms: Option<HashMap<String, Arc<dyn Algorithm>>>,
}

impl AlgorithmRegistry {
    pub fn new() -> Self {
        Self {
            algorithms: Some(HashMap::new()),
        }
    }

    /// Register under `algorithm.name()`, replacing any previous entry.
    pub fn add(&mut self, algorithm: Arc<dyn Algorithm>) {
        self.algorithms
            .get_or_insert_with(HashMap::new)
            .insert(algorithm.name().to_string(), algorithm);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Algorithm>, AlgorithmError> {
        let algorithms = self
            .algorithms
            .as_ref()
            .ok_or(AlgorithmError::RegistryNotInitialized)?;
        algorithms
            .get(name)
            .cloned()
            .ok_or_else(|| AlgorithmError::NotFound(name.to_string()))
    }

    pub fn has(&self, name: &str) -> bool {
        self.algorithms
            .as_ref()
            .is_some_and(|m| m.contains_key(name))
    }

    /// Default options of every registered algorithm, by name.
    pub fn describe(&self) -> BTreeMap<String, Options> {
        self.algorithms
            .iter()
            .flatten()
            .map(|(name, algo)| (name.clone(), algo.options()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Campaign, TickerEvent};
    use crate::signals::Timeseries;
    use async_trait::async_trait;

    struct Fixed(&'static str, i64);

    #[async_trait]
    impl Algorithm for Fixed {
        fn name(&self) -> &str {
            self.0
        }

        fn options(&self) -> Options {
            Options::new().with("level", self.1)
        }

        async fn buy(&self, _: &TickerEvent, _: &mut Campaign, _: &Timeseries) -> Result<(), AlgorithmError> {
            Ok(())
        }

        async fn sell(&self, _: &TickerEvent, _: &mut Campaign, _: &Timeseries) -> Result<(), AlgorithmError> {
            Ok(())
        }
    }

    #[test]
    fn test_uninitialized_registry() {
        let registry = AlgorithmRegistry::default();
        assert!(matches!(registry.get("trend"), Err(AlgorithmError::RegistryNotInitialized)));
        assert!(!registry.has("trend"));
        assert!(registry.describe().is_empty());
    }

    #[test]
    fn test_get_and_not_found() {
        let mut registry = AlgorithmRegistry::new();
        registry.add(Arc::new(Fixed("trend", 1)));

        assert!(registry.has("trend"));
        assert_eq!(registry.get("trend").unwrap().name(), "trend");
        assert!(matches!(registry.get("grid"), Err(AlgorithmError::NotFound(n)) if n == "grid"));
    }

    #[test]
    fn test_add_replaces_by_name() {
        let mut registry = AlgorithmRegistry::new();
        registry.add(Arc::new(Fixed("trend", 1)));
        registry.add(Arc::new(Fixed("trend", 2)));

        assert_eq!(registry.get("trend").unwrap().options().get_int("level"), 2);
        assert_eq!(registry.describe().len(), 1);
    }

    #[test]
    fn test_add_initializes_default_registry() {
        let mut registry = AlgorithmRegistry::default();
        registry.add(Arc::new(Fixed("trend", 1)));
        assert!(registry.get("trend").is_ok());
    }
}
