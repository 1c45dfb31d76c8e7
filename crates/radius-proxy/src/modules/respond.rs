//! `respond` module

use crate::pipeline::registry::parse_module_config;
use crate::pipeline::{Module, ModuleError, ModuleOutcome, ModuleServices, PipelineError, RequestContext};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

pub const NAME: &str = "respond";

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RespondModuleConfig {}

/// Ends the chain with the response already held by the context
#[derive(Debug)]
pub struct RespondModule;

impl RespondModule {
    pub fn build(config: &Value, _services: &ModuleServices) -> Result<Arc<dyn Module>, PipelineError> {
        let RespondModuleConfig {} = parse_module_config(NAME, config)?;
        Ok(Arc::new(RespondModule))
    }
}

#[async_trait]
impl Module for RespondModule {
    fn name(&self) -> &str {
        NAME
    }

    async fn process(&self, ctx: &mut RequestContext) -> Result<ModuleOutcome, ModuleError> {
        if ctx.response.is_some() {
            Ok(ModuleOutcome::Respond)
        } else {
            Ok(ModuleOutcome::Continue)
        }
    }
}
