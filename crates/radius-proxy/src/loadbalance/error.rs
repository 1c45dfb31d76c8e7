//! Routing error types

use thiserror::Error;

/// Errors raised while selecting an upstream host
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RoutingError {
    /// The listener was not configured when the router was built
    #[error("Listener not known to the router: {0}")]
    UnknownListener(String),

    /// A route names a tier the router does not hold
    #[error("Service tier not found: {0}")]
    UnknownTier(String),
}
