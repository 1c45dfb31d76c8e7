//! UDP listener
//!
//! One listener per configured `udp` listener. Each datagram is handled on
//! its own task: decode, server-wide filters, the listener's pipeline, then
//! the reply (if any) goes back to the sender.

use crate::counters::{CounterSink, Operation};
use crate::filter::FilterChain;
use crate::pipeline::{Pipeline, PipelineOutcome, RequestContext};
use crate::server::ServerError;
use radius_proto::{AttributeType, Code, Packet, PacketError, calculate_response_authenticator};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

const OP_REQUEST: &str = "radius_request";

/// Everything a request task needs, shared across tasks of one listener
struct Shared {
    name: String,
    socket: UdpSocket,
    pipeline: Pipeline,
    filters: FilterChain,
    secret: Arc<[u8]>,
    counters: Arc<dyn CounterSink>,
}

pub struct Listener {
    shared: Arc<Shared>,
}

impl Listener {
    /// Bind `address` for the listener `name`
    pub async fn bind(
        name: impl Into<String>,
        address: SocketAddr,
        pipeline: Pipeline,
        filters: FilterChain,
        secret: Arc<[u8]>,
        counters: Arc<dyn CounterSink>,
    ) -> Result<Self, ServerError> {
        let name = name.into();
        let socket = UdpSocket::bind(address)
            .await
            .map_err(|source| ServerError::Bind {
                listener: name.clone(),
                address,
                source,
            })?;

        info!(
            listener = %name,
            address = %socket.local_addr()?,
            modules = ?pipeline.module_names(),
            "Listener bound"
        );

        Ok(Listener {
            shared: Arc::new(Shared {
                name,
                socket,
                pipeline,
                filters,
                secret,
                counters,
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.shared.socket.local_addr()?)
    }

    /// Receive loop; returns only if the socket fails
    pub async fn run(&self) -> Result<(), ServerError> {
        let mut buf = vec![0u8; Packet::MAX_PACKET_SIZE];

        loop {
            let (len, source) = self.shared.socket.recv_from(&mut buf).await?;
            let data = buf[..len].to_vec();

            let shared = Arc::clone(&self.shared);
            tokio::spawn(async move {
                handle_request(&shared, data, source).await;
            });
        }
    }
}

async fn handle_request(shared: &Shared, data: Vec<u8>, source: SocketAddr) {
    let op = Operation::new(OP_REQUEST).with_tag("listener", shared.name.clone());
    shared.counters.start(&op);

    let mut ctx = match RequestContext::decode(shared.name.as_str(), source, data) {
        Ok(ctx) => ctx,
        Err(e) => {
            warn!(listener = %shared.name, source = %source, error = %e, "Failed to decode packet");
            shared.counters.failure(&op, "decode_error");
            return;
        }
    };

    if !ctx.request().code.is_request() {
        debug!(
            listener = %shared.name,
            source = %source,
            code = %ctx.request().code,
            "Ignoring non-request packet"
        );
        shared.counters.failure(&op, "not_a_request");
        return;
    }

    if let Some(filter) = shared.filters.check(source, ctx.request()) {
        debug!(listener = %shared.name, source = %source, filter = filter, "Request filtered");
        shared.counters.failure(&op, "filtered");
        return;
    }

    let reply = match shared.pipeline.run(&mut ctx).await {
        PipelineOutcome::Respond => match ctx.response.take() {
            Some(response) => response.raw,
            None => {
                shared.counters.failure(&op, "dropped");
                return;
            }
        },
        PipelineOutcome::Reject(reason) => {
            if ctx.request().code != Code::AccessRequest {
                debug!(listener = %shared.name, reason = %reason, "Dropping rejected non-access request");
                shared.counters.failure(&op, "rejected");
                return;
            }
            match build_reject(ctx.request(), &shared.secret) {
                Ok(reply) => {
                    info!(
                        listener = %shared.name,
                        source = %source,
                        identifier = ctx.request().identifier,
                        session_key = %ctx.session_key(),
                        reason = %reason,
                        "Sending Access-Reject"
                    );
                    reply
                }
                Err(e) => {
                    warn!(listener = %shared.name, error = %e, "Failed to build Access-Reject");
                    shared.counters.failure(&op, "rejected");
                    return;
                }
            }
        }
        PipelineOutcome::Drop => {
            shared.counters.failure(&op, "dropped");
            return;
        }
    };

    match shared.socket.send_to(&reply, source).await {
        Ok(_) => {
            debug!(listener = %shared.name, source = %source, bytes = reply.len(), "Reply sent");
            shared.counters.success(&op);
        }
        Err(e) => {
            warn!(listener = %shared.name, source = %source, error = %e, "Failed to send reply");
            shared.counters.failure(&op, "send_error");
        }
    }
}

/// Access-Reject for `request`, signed with the shared secret
///
/// Proxy-State attributes are copied unmodified (RFC 2865 Section 5.33).
pub fn build_reject(request: &Packet, secret: &[u8]) -> Result<Vec<u8>, PacketError> {
    let mut reply = Packet::new(Code::AccessReject, request.identifier, [0u8; 16]);
    for attr in request.find_all_attributes(AttributeType::ProxyState.as_u8()) {
        reply.add_attribute(attr.clone());
    }
    reply.authenticator = calculate_response_authenticator(&reply, &request.authenticator, secret)?;
    reply.encode()
}
