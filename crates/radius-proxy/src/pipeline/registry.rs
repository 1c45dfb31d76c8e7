//! Module registry: name to factory

use super::{Module, Pipeline, PipelineError};
use crate::config::ModuleDescriptor;
use crate::loadbalance::LoadBalancer;
use crate::modules;
use crate::state::AuthStateStore;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Shared services a module may hold on to
#[derive(Clone)]
pub struct ModuleServices {
    /// Listener whose pipeline is being built
    pub listener: String,
    pub router: Arc<LoadBalancer>,
    pub state: Arc<AuthStateStore>,
    /// Shared secret, for modules that sign replies
    pub secret: Arc<[u8]>,
}

/// Builds a module from its opaque configuration
pub type ModuleFactory =
    Arc<dyn Fn(&Value, &ModuleServices) -> Result<Arc<dyn Module>, PipelineError> + Send + Sync>;

/// Known module names and how to build them
#[derive(Clone, Default)]
pub struct ModuleRegistry {
    factories: BTreeMap<String, ModuleFactory>,
}

impl ModuleRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding `eap`, `proxy`, `log` and `respond`
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(modules::eap::NAME, Arc::new(modules::eap::EapModule::build));
        registry.register(modules::proxy::NAME, Arc::new(modules::proxy::ProxyModule::build));
        registry.register(modules::log::NAME, Arc::new(modules::log::LogModule::build));
        registry.register(modules::respond::NAME, Arc::new(modules::respond::RespondModule::build));
        registry
    }

    /// Register a factory, replacing any previous one of the same name
    pub fn register(&mut self, name: impl Into<String>, factory: ModuleFactory) {
        self.factories.insert(name.into(), factory);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Build the pipeline for one listener, preserving descriptor order
    pub fn build(
        &self,
        descriptors: &[ModuleDescriptor],
        services: &ModuleServices,
    ) -> Result<Pipeline, PipelineError> {
        let modules = descriptors
            .iter()
            .map(|descriptor| {
                let factory = self
                    .factories
                    .get(&descriptor.name)
                    .ok_or_else(|| PipelineError::UnknownModule(descriptor.name.clone()))?;
                factory(&descriptor.config, services)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Pipeline::new(services.listener.clone(), modules))
    }
}

/// Decode a module's typed configuration; a missing config means defaults
pub fn parse_module_config<T>(module: &str, config: &Value) -> Result<T, PipelineError>
where
    T: DeserializeOwned + Default,
{
    if config.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(config.clone()).map_err(|e| PipelineError::invalid_config(module, e))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::tests::scenario_load_balance;
    use crate::counters::NoopCounters;
    use crate::state::MemoryStateBackend;
    use serde_json::json;
    use std::time::Duration;

    pub(crate) fn services(listener: &str) -> ModuleServices {
        let router = LoadBalancer::new(&scenario_load_balance(), ["port1812", listener]).unwrap();
        let state = AuthStateStore::new(
            Arc::new(MemoryStateBackend::new()),
            Duration::from_secs(10),
            Arc::new(NoopCounters),
        );
        ModuleServices {
            listener: listener.to_string(),
            router: Arc::new(router),
            state: Arc::new(state),
            secret: Arc::from(&b"123456"[..]),
        }
    }

    #[test]
    fn test_builtins_registered() {
        let registry = ModuleRegistry::with_builtins();
        let names: Vec<_> = registry.names().collect();
        assert_eq!(names, vec!["eap", "log", "proxy", "respond"]);
    }

    #[test]
    fn test_build_preserves_order() {
        let registry = ModuleRegistry::with_builtins();
        let descriptors = vec![
            ModuleDescriptor::new("log", Value::Null),
            ModuleDescriptor::new("eap", json!({ "maxRounds": 10 })),
            ModuleDescriptor::new("proxy", json!({ "timeoutMs": 500 })),
            ModuleDescriptor::new("respond", json!({})),
        ];

        let pipeline = registry.build(&descriptors, &services("auth")).unwrap();
        assert_eq!(pipeline.module_names(), vec!["log", "eap", "proxy", "respond"]);
    }

    #[test]
    fn test_unknown_module_rejected() {
        let registry = ModuleRegistry::with_builtins();
        let descriptors = vec![ModuleDescriptor::new("ldap", Value::Null)];

        assert!(matches!(
            registry.build(&descriptors, &services("auth")),
            Err(PipelineError::UnknownModule(name)) if name == "ldap"
        ));
    }

    #[test]
    fn test_invalid_module_config_rejected() {
        let registry = ModuleRegistry::with_builtins();

        for descriptor in [
            ModuleDescriptor::new("eap", json!({ "maxRounds": "many" })),
            ModuleDescriptor::new("eap", json!({ "maxRounds": 0 })),
            ModuleDescriptor::new("proxy", json!({ "timeoutMs": 0 })),
            ModuleDescriptor::new("log", json!({ "level": "loud" })),
            ModuleDescriptor::new("log", json!({ "fields": ["Not-An-Attribute"] })),
        ] {
            assert!(matches!(
                registry.build(&[descriptor], &services("auth")),
                Err(PipelineError::InvalidConfig { .. })
            ));
        }
    }

    #[test]
    fn test_custom_factory() {
        let mut registry = ModuleRegistry::new();
        registry.register(
            "respond_twice",
            Arc::new(|config: &Value, services: &ModuleServices| {
                modules::respond::RespondModule::build(config, services)
            }),
        );

        assert!(registry.contains("respond_twice"));
        assert!(!registry.contains("respond"));
        let descriptors = vec![ModuleDescriptor::new("respond_twice", Value::Null)];
        assert_eq!(registry.build(&descriptors, &services("auth")).unwrap().len(), 1);
    }
}
