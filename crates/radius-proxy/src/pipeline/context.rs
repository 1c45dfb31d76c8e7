//! Per-request context shared by the modules of a pipeline

use crate::loadbalance::Selection;
use crate::session::SessionKey;
use radius_proto::{AttributeSource, AttributeType, Packet, PacketError};
use std::net::SocketAddr;

/// A reply ready to be sent back to the NAS
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub packet: Packet,
    /// Bytes sent on the wire, kept as received when relaying upstream replies
    pub raw: Vec<u8>,
}

impl Response {
    /// Decode a reply received from upstream
    pub fn from_bytes(raw: Vec<u8>) -> Result<Self, PacketError> {
        let packet = Packet::decode(&raw)?;
        Ok(Response { packet, raw })
    }

    /// Encode a locally built reply
    pub fn from_packet(packet: Packet) -> Result<Self, PacketError> {
        let raw = packet.encode()?;
        Ok(Response { packet, raw })
    }
}

/// Mutable state of one request as it moves through the pipeline
#[derive(Debug)]
pub struct RequestContext {
    listener: String,
    source: SocketAddr,
    raw: Vec<u8>,
    request: Packet,
    session_key: SessionKey,
    /// Upstream chosen by the router, once a module asked for one
    pub selection: Option<Selection>,
    /// Reply to send back, once a module produced one
    pub response: Option<Response>,
}

impl RequestContext {
    pub fn new(listener: impl Into<String>, source: SocketAddr, raw: Vec<u8>, request: Packet) -> Self {
        let session_key = SessionKey::derive(&request);
        RequestContext {
            listener: listener.into(),
            source,
            raw,
            request,
            session_key,
            selection: None,
            response: None,
        }
    }

    /// Decode a datagram into a fresh context
    pub fn decode(listener: impl Into<String>, source: SocketAddr, raw: Vec<u8>) -> Result<Self, PacketError> {
        let request = Packet::decode(&raw)?;
        Ok(Self::new(listener, source, raw, request))
    }

    pub fn listener(&self) -> &str {
        &self.listener
    }

    pub fn source(&self) -> SocketAddr {
        self.source
    }

    pub fn request(&self) -> &Packet {
        &self.request
    }

    /// The datagram as received from the NAS
    pub fn raw_request(&self) -> &[u8] {
        &self.raw
    }

    pub fn session_key(&self) -> &SessionKey {
        &self.session_key
    }
}

impl AttributeSource for RequestContext {
    fn attribute_value(&self, attr_type: AttributeType) -> &[u8] {
        self.request.attribute_value(attr_type)
    }
}
