//! Built-in pipeline modules
//!
//! - `eap`: follows multi-round EAP exchanges in the state store
//! - `proxy`: forwards the request to an upstream host picked by the router
//! - `log`: one structured event per request
//! - `respond`: ends the chain once a response is available

pub mod eap;
pub mod log;
pub mod proxy;
pub mod respond;

pub use eap::EapModule;
pub use log::LogModule;
pub use proxy::{ProxyError, ProxyModule};
pub use respond::RespondModule;
