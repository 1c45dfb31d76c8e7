//! RADIUS attributes (RFC 2865 Section 5)

mod attribute;
mod types;

pub use attribute::Attribute;
pub use types::AttributeType;

/// Attribute lookup by type on a decoded packet.
///
/// This is the only view of a packet the proxy core relies on directly.
pub trait AttributeSource {
    /// Raw value of the first attribute of `attr_type`, or an empty slice when
    /// the attribute is absent.
    fn attribute_value(&self, attr_type: AttributeType) -> &[u8];
}
