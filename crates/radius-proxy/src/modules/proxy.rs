//! `proxy` module
//!
//! Forwards the request, as received, to an upstream host picked by the
//! tier router and stores the upstream reply in the context. The NAS, this
//! proxy and every upstream tier share one secret, so the reply can be
//! relayed byte for byte.

use crate::loadbalance::{LoadBalancer, RoutingError};
use crate::pipeline::registry::parse_module_config;
use crate::pipeline::{
    Module, ModuleError, ModuleOutcome, ModuleServices, PipelineError, RequestContext, Response,
};
use async_trait::async_trait;
use radius_proto::{Packet, PacketError, verify_response_authenticator};
use serde::Deserialize;
use serde_json::Value;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::{UdpSocket, lookup_host};
use tokio::time::timeout;
use tracing::{debug, warn};

pub const NAME: &str = "proxy";

const DEFAULT_UPSTREAM_PORT: u16 = 1812;

/// Errors raised while forwarding a request upstream
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Packet error: {0}")]
    Packet(#[from] PacketError),

    #[error("Routing error: {0}")]
    Routing(#[from] RoutingError),

    #[error("Cannot resolve upstream host '{0}'")]
    Resolve(String),

    #[error("No reply from {host} after {attempts} attempts")]
    Timeout { host: String, attempts: u32 },
}

impl From<ProxyError> for ModuleError {
    fn from(err: ProxyError) -> Self {
        ModuleError::abort(err.to_string())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ProxyModuleConfig {
    /// Time to wait for a reply to each attempt
    #[serde(default = "default_timeout_ms")]
    timeout_ms: u64,
    /// Retransmissions after the first attempt
    #[serde(default = "default_retries")]
    retries: u8,
}

fn default_timeout_ms() -> u64 {
    3000
}

fn default_retries() -> u8 {
    2
}

impl Default for ProxyModuleConfig {
    fn default() -> Self {
        ProxyModuleConfig {
            timeout_ms: default_timeout_ms(),
            retries: default_retries(),
        }
    }
}

pub struct ProxyModule {
    listener: String,
    router: Arc<LoadBalancer>,
    secret: Arc<[u8]>,
    timeout: Duration,
    retries: u8,
}

impl ProxyModule {
    pub fn build(config: &Value, services: &ModuleServices) -> Result<Arc<dyn Module>, PipelineError> {
        let config: ProxyModuleConfig = parse_module_config(NAME, config)?;
        if config.timeout_ms == 0 {
            return Err(PipelineError::invalid_config(NAME, "timeoutMs must be greater than zero"));
        }

        Ok(Arc::new(ProxyModule {
            listener: services.listener.clone(),
            router: Arc::clone(&services.router),
            secret: Arc::clone(&services.secret),
            timeout: Duration::from_millis(config.timeout_ms),
            retries: config.retries,
        }))
    }

    /// Forward `ctx`'s datagram to `host` and wait for the matching reply
    async fn forward(&self, ctx: &RequestContext, host: &str) -> Result<Vec<u8>, ProxyError> {
        let upstream = resolve(host).await?;

        let local: IpAddr = if upstream.is_ipv4() {
            Ipv4Addr::UNSPECIFIED.into()
        } else {
            Ipv6Addr::UNSPECIFIED.into()
        };
        let socket = UdpSocket::bind(SocketAddr::new(local, 0)).await?;
        socket.connect(upstream).await?;

        let request = ctx.request();
        let attempts = u32::from(self.retries) + 1;

        for attempt in 1..=attempts {
            socket.send(ctx.raw_request()).await?;

            match timeout(self.timeout, self.await_reply(&socket, request)).await {
                Ok(result) => return result,
                Err(_) => {
                    debug!(
                        listener = %self.listener,
                        upstream = %upstream,
                        identifier = request.identifier,
                        attempt = attempt,
                        "No reply from upstream"
                    );
                }
            }
        }

        Err(ProxyError::Timeout {
            host: host.to_string(),
            attempts,
        })
    }

    /// Receive until a reply to `request` arrives
    ///
    /// Replies with another identifier or a bad authenticator are discarded.
    async fn await_reply(&self, socket: &UdpSocket, request: &Packet) -> Result<Vec<u8>, ProxyError> {
        let mut buf = vec![0u8; Packet::MAX_PACKET_SIZE];
        loop {
            let len = socket.recv(&mut buf).await?;
            let data = &buf[..len];

            let reply = match Packet::decode(data) {
                Ok(reply) => reply,
                Err(e) => {
                    warn!(listener = %self.listener, error = %e, "Discarding malformed upstream reply");
                    continue;
                }
            };

            if reply.identifier != request.identifier {
                debug!(
                    listener = %self.listener,
                    expected = request.identifier,
                    received = reply.identifier,
                    "Discarding upstream reply for another request"
                );
                continue;
            }

            if !verify_response_authenticator(&reply, &request.authenticator, &self.secret) {
                warn!(
                    listener = %self.listener,
                    identifier = reply.identifier,
                    "Discarding upstream reply with invalid authenticator"
                );
                continue;
            }

            return Ok(data.to_vec());
        }
    }
}

/// Resolve `host` or `host:port`, defaulting to the RADIUS authentication port
async fn resolve(host: &str) -> Result<SocketAddr, ProxyError> {
    if let Ok(addr) = host.parse::<SocketAddr>() {
        return Ok(addr);
    }
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, DEFAULT_UPSTREAM_PORT));
    }

    let target = if host.contains(':') {
        host.to_string()
    } else {
        format!("{}:{}", host, DEFAULT_UPSTREAM_PORT)
    };

    lookup_host(target.as_str())
        .await?
        .next()
        .ok_or_else(|| ProxyError::Resolve(host.to_string()))
}

#[async_trait]
impl Module for ProxyModule {
    fn name(&self) -> &str {
        NAME
    }

    async fn process(&self, ctx: &mut RequestContext) -> Result<ModuleOutcome, ModuleError> {
        let selection = self.router.select(&self.listener).map_err(ProxyError::from)?;

        debug!(
            listener = %self.listener,
            session_key = %ctx.session_key(),
            routing = %selection.routing,
            tier = %selection.tier,
            host = %selection.host,
            "Forwarding request upstream"
        );

        let host = selection.host.clone();
        ctx.selection = Some(selection);

        let reply = self.forward(ctx, &host).await?;
        ctx.response = Some(Response::from_bytes(reply).map_err(ProxyError::from)?);

        Ok(ModuleOutcome::Continue)
    }
}
