//! Session key derivation
//!
//! Identifies the device behind an EAP exchange. RADIUS itself carries no
//! session identifier for an in-progress authentication, so the pair of
//! station ids stands in for one: one concurrent EAP flow per device.

use radius_proto::{AttributeSource, AttributeType};
use std::fmt;

const NAMESPACE: &str = "eap";
const SEPARATOR: &str = "__";

/// Stable per-device key for the EAP state store
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionKey(String);

impl SessionKey {
    /// Derive the key from Calling-Station-Id and Called-Station-Id
    ///
    /// Missing attributes contribute empty components.
    pub fn derive<S: AttributeSource + ?Sized>(packet: &S) -> Self {
        let calling = String::from_utf8_lossy(packet.attribute_value(AttributeType::CallingStationId));
        let called = String::from_utf8_lossy(packet.attribute_value(AttributeType::CalledStationId));
        SessionKey(format!(
            "{NAMESPACE}{SEPARATOR}{calling}{SEPARATOR}{called}"
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SessionKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
