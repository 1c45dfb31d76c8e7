//! `log` module

use crate::pipeline::registry::parse_module_config;
use crate::pipeline::{Module, ModuleError, ModuleOutcome, ModuleServices, PipelineError, RequestContext};
use async_trait::async_trait;
use radius_proto::{AttributeSource, AttributeType};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

pub const NAME: &str = "log";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct LogModuleConfig {
    #[serde(default)]
    level: LogLevel,
    /// Attribute names to include, e.g. `User-Name`
    #[serde(default)]
    fields: Vec<String>,
}

/// Emits one structured event per request
pub struct LogModule {
    level: LogLevel,
    fields: Vec<AttributeType>,
}

impl LogModule {
    pub fn build(config: &Value, _services: &ModuleServices) -> Result<Arc<dyn Module>, PipelineError> {
        let config: LogModuleConfig = parse_module_config(NAME, config)?;
        let fields = config
            .fields
            .iter()
            .map(|name| {
                AttributeType::from_name(name)
                    .ok_or_else(|| PipelineError::invalid_config(NAME, format!("unknown attribute '{}'", name)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Arc::new(LogModule {
            level: config.level,
            fields,
        }))
    }

    fn attributes(&self, ctx: &RequestContext) -> String {
        self.fields
            .iter()
            .map(|attr| {
                format!(
                    "{}={}",
                    attr.name(),
                    String::from_utf8_lossy(ctx.attribute_value(*attr))
                )
            })
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[async_trait]
impl Module for LogModule {
    fn name(&self) -> &str {
        NAME
    }

    async fn process(&self, ctx: &mut RequestContext) -> Result<ModuleOutcome, ModuleError> {
        let request = ctx.request();
        let (routing, tier) = ctx
            .selection
            .as_ref()
            .map(|s| (s.routing.as_str(), s.tier.as_str()))
            .unwrap_or(("-", "-"));
        let attributes = self.attributes(ctx);

        macro_rules! emit {
            ($level:ident) => {
                $level!(
                    listener = %ctx.listener(),
                    source = %ctx.source(),
                    code = %request.code,
                    identifier = request.identifier,
                    session_key = %ctx.session_key(),
                    routing = routing,
                    tier = tier,
                    attributes = %attributes,
                    "RADIUS request"
                )
            };
        }

        match self.level {
            LogLevel::Trace => emit!(trace),
            LogLevel::Debug => emit!(debug),
            LogLevel::Info => emit!(info),
            LogLevel::Warn => emit!(warn),
        }

        Ok(ModuleOutcome::Continue)
    }
}
