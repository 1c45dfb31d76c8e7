//! RADIUS Protocol Types
//!
//! The decoded packet abstraction consumed by the edge proxy core, as defined
//! in RFC 2865, together with the pieces of RFC 3579 (EAP over RADIUS) the
//! proxy needs to follow an EAP exchange.
//!
//! # Features
//!
//! - Packet encoding and decoding
//! - Attribute lookup by type ([`AttributeSource`])
//! - EAP header parsing from reassembled EAP-Message attributes
//! - Response Authenticator calculation for locally generated replies
//!
//! # Example
//!
//! ```rust
//! use radius_proto::{Attribute, AttributeSource, AttributeType, Code, Packet};
//! use radius_proto::auth::generate_request_authenticator;
//!
//! let mut packet = Packet::new(Code::AccessRequest, 1, generate_request_authenticator());
//! packet.add_attribute(
//!     Attribute::string(AttributeType::CallingStationId as u8, "AA-BB-CC-DD-EE-FF").unwrap()
//! );
//!
//! assert_eq!(packet.attribute_value(AttributeType::CallingStationId), b"AA-BB-CC-DD-EE-FF");
//! assert!(packet.attribute_value(AttributeType::CalledStationId).is_empty());
//!
//! let bytes = packet.encode().unwrap();
//! let decoded = Packet::decode(&bytes).unwrap();
//! assert_eq!(decoded.identifier, 1);
//! ```

pub mod attributes;
pub mod auth;
pub mod eap;
pub mod packet;

pub use attributes::{Attribute, AttributeSource, AttributeType};
pub use auth::{
    calculate_response_authenticator, generate_request_authenticator,
    verify_response_authenticator,
};
pub use eap::{EapCode, EapError, EapPacket, EapType};
pub use packet::{Code, Packet, PacketError};
