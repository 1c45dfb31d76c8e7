//! Per-listener module pipeline
//!
//! Each listener runs every request through an ordered chain of modules
//! built from its `modules` configuration. Modules run strictly in declared
//! order; any of them may stop the chain.
//!
//! # Example
//!
//! ```rust,ignore
//! let registry = ModuleRegistry::with_builtins();
//! let pipeline = registry.build(&listener_config.modules, &services)?;
//!
//! let mut ctx = RequestContext::decode("auth", source, datagram)?;
//! match pipeline.run(&mut ctx).await {
//!     PipelineOutcome::Respond => { /* send ctx.response */ }
//!     PipelineOutcome::Reject(reason) => { /* send Access-Reject */ }
//!     PipelineOutcome::Drop => {}
//! }
//! ```

pub mod context;
pub mod error;
pub mod registry;

pub use context::{RequestContext, Response};
pub use error::{ErrorAction, ModuleError, PipelineError};
pub use registry::{ModuleFactory, ModuleRegistry, ModuleServices};

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// What a module asks the pipeline to do next
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleOutcome {
    /// Run the next module
    Continue,
    /// Stop and send the response held by the context
    Respond,
    /// Stop and reject the request
    Reject(String),
    /// Stop silently
    Drop,
}

/// A protocol-processing step of a pipeline
#[async_trait]
pub trait Module: Send + Sync {
    /// Registry name of the module
    fn name(&self) -> &str;

    async fn process(&self, ctx: &mut RequestContext) -> Result<ModuleOutcome, ModuleError>;
}

/// Final disposition of a request after the pipeline ran
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// Send `ctx.response`
    Respond,
    Reject(String),
    Drop,
}

/// An ordered chain of modules
pub struct Pipeline {
    listener: String,
    modules: Vec<Arc<dyn Module>>,
}

impl Pipeline {
    pub fn new(listener: impl Into<String>, modules: Vec<Arc<dyn Module>>) -> Self {
        Pipeline {
            listener: listener.into(),
            modules,
        }
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn module_names(&self) -> Vec<&str> {
        self.modules.iter().map(|module| module.name()).collect()
    }

    /// Run the request through every module in order
    ///
    /// A chain that runs to completion responds if some module stored a
    /// response, and drops the request otherwise.
    pub async fn run(&self, ctx: &mut RequestContext) -> PipelineOutcome {
        for (position, module) in self.modules.iter().enumerate() {
            match module.process(ctx).await {
                Ok(ModuleOutcome::Continue) => continue,
                Ok(ModuleOutcome::Respond) => {
                    if ctx.response.is_some() {
                        return PipelineOutcome::Respond;
                    }
                    warn!(
                        listener = %self.listener,
                        position = position,
                        "Module asked to respond without a response"
                    );
                    return PipelineOutcome::Drop;
                }
                Ok(ModuleOutcome::Reject(reason)) => {
                    debug!(listener = %self.listener, position = position, reason = %reason, "Request rejected");
                    return PipelineOutcome::Reject(reason);
                }
                Ok(ModuleOutcome::Drop) => {
                    debug!(listener = %self.listener, position = position, "Request dropped");
                    return PipelineOutcome::Drop;
                }
                Err(e) => match e.action {
                    ErrorAction::Abort => {
                        warn!(
                            listener = %self.listener,
                            position = position,
                            session_key = %ctx.session_key(),
                            error = %e,
                            "Pipeline aborted"
                        );
                        return PipelineOutcome::Reject(e.message);
                    }
                    ErrorAction::Continue => {
                        warn!(
                            listener = %self.listener,
                            position = position,
                            session_key = %ctx.session_key(),
                            error = %e,
                            "Module failed, continuing"
                        );
                    }
                },
            }
        }

        if ctx.response.is_some() {
            PipelineOutcome::Respond
        } else {
            PipelineOutcome::Drop
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use radius_proto::{Code, Packet};
    use std::sync::Mutex;

    pub(crate) fn context() -> RequestContext {
        let packet = Packet::new(Code::AccessRequest, 7, [1u8; 16]);
        let raw = packet.encode().unwrap();
        RequestContext::new("auth", "127.0.0.1:5000".parse().unwrap(), raw, packet)
    }

    /// Records its label and returns a fixed result
    pub(crate) struct Step {
        label: &'static str,
        result: fn() -> Result<ModuleOutcome, ModuleError>,
        trail: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Step {
        pub(crate) fn new(
            label: &'static str,
            result: fn() -> Result<ModuleOutcome, ModuleError>,
            trail: &Arc<Mutex<Vec<&'static str>>>,
        ) -> Arc<dyn Module> {
            Arc::new(Step {
                label,
                result,
                trail: Arc::clone(trail),
            })
        }
    }

    #[async_trait]
    impl Module for Step {
        fn name(&self) -> &str {
            self.label
        }

        async fn process(&self, _ctx: &mut RequestContext) -> Result<ModuleOutcome, ModuleError> {
            self.trail.lock().unwrap().push(self.label);
            (self.result)()
        }
    }

    struct StoreResponse;

    #[async_trait]
    impl Module for StoreResponse {
        fn name(&self) -> &str {
            "store"
        }

        async fn process(&self, ctx: &mut RequestContext) -> Result<ModuleOutcome, ModuleError> {
            let reply = Packet::new(Code::AccessAccept, ctx.request().identifier, [0u8; 16]);
            ctx.response = Some(Response::from_packet(reply).unwrap());
            Ok(ModuleOutcome::Continue)
        }
    }

    fn cont() -> Result<ModuleOutcome, ModuleError> {
        Ok(ModuleOutcome::Continue)
    }

    #[tokio::test]
    async fn test_modules_run_in_order() {
        let trail = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::new(
            "auth",
            vec![
                Step::new("a", cont, &trail),
                Step::new("b", cont, &trail),
                Step::new("c", cont, &trail),
            ],
        );

        assert_eq!(pipeline.run(&mut context()).await, PipelineOutcome::Drop);
        assert_eq!(*trail.lock().unwrap(), vec!["a", "b", "c"]);
        assert_eq!(pipeline.module_names(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_reject_short_circuits() {
        let trail = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::new(
            "auth",
            vec![
                Step::new("a", cont, &trail),
                Step::new("b", || Ok(ModuleOutcome::Reject("no".into())), &trail),
                Step::new("c", cont, &trail),
            ],
        );

        assert_eq!(
            pipeline.run(&mut context()).await,
            PipelineOutcome::Reject("no".into())
        );
        assert_eq!(*trail.lock().unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_drop_short_circuits() {
        let trail = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::new(
            "auth",
            vec![
                Step::new("a", || Ok(ModuleOutcome::Drop), &trail),
                Step::new("b", cont, &trail),
            ],
        );

        assert_eq!(pipeline.run(&mut context()).await, PipelineOutcome::Drop);
        assert_eq!(*trail.lock().unwrap(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_abort_error_rejects() {
        let trail = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::new(
            "auth",
            vec![
                Step::new("a", || Err(ModuleError::abort("upstream timeout")), &trail),
                Step::new("b", cont, &trail),
            ],
        );

        assert_eq!(
            pipeline.run(&mut context()).await,
            PipelineOutcome::Reject("upstream timeout".into())
        );
        assert_eq!(*trail.lock().unwrap(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_continue_error_runs_next_module() {
        let trail = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::new(
            "auth",
            vec![
                Step::new("a", || Err(ModuleError::continue_with("best effort")), &trail),
                Step::new("b", cont, &trail),
            ],
        );

        pipeline.run(&mut context()).await;
        assert_eq!(*trail.lock().unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_completed_chain_with_response_responds() {
        let trail = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::new(
            "auth",
            vec![Arc::new(StoreResponse) as Arc<dyn Module>, Step::new("after", cont, &trail)],
        );

        let mut ctx = context();
        assert_eq!(pipeline.run(&mut ctx).await, PipelineOutcome::Respond);
        assert_eq!(ctx.response.unwrap().packet.code, Code::AccessAccept);
        assert_eq!(*trail.lock().unwrap(), vec!["after"]);
    }

    #[tokio::test]
    async fn test_respond_without_response_drops() {
        let trail = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::new("auth", vec![Step::new("a", || Ok(ModuleOutcome::Respond), &trail)]);
        assert_eq!(pipeline.run(&mut context()).await, PipelineOutcome::Drop);
    }

    #[tokio::test]
    async fn test_empty_pipeline_drops() {
        let pipeline = Pipeline::new("auth", Vec::new());
        assert!(pipeline.is_empty());
        assert_eq!(pipeline.run(&mut context()).await, PipelineOutcome::Drop);
    }
}
