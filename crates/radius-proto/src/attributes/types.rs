macro_rules! attribute_types {
    ($( $(#[$doc:meta])* $variant:ident = $value:literal => $name:literal, )+) => {
        /// RADIUS Attribute Types as defined in RFC 2865 and related RFCs
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum AttributeType {
            $( $(#[$doc])* $variant = $value, )+
        }

        impl AttributeType {
            pub fn from_u8(value: u8) -> Option<Self> {
                match value {
                    $( $value => Some(AttributeType::$variant), )+
                    _ => None,
                }
            }

            /// Look up an attribute by dictionary name, ignoring ASCII case
            pub fn from_name(name: &str) -> Option<Self> {
                $( if name.eq_ignore_ascii_case($name) { return Some(AttributeType::$variant); } )+
                None
            }

            /// Dictionary name of the attribute (e.g. `Calling-Station-Id`)
            pub fn name(self) -> &'static str {
                match self {
                    $( AttributeType::$variant => $name, )+
                }
            }
        }
    };
}

attribute_types! {
    /// User-Name (1) - RFC 2865
    UserName = 1 => "User-Name",
    /// User-Password (2) - RFC 2865
    UserPassword = 2 => "User-Password",
    /// CHAP-Password (3) - RFC 2865
    ChapPassword = 3 => "CHAP-Password",
    /// NAS-IP-Address (4) - RFC 2865
    NasIpAddress = 4 => "NAS-IP-Address",
    /// NAS-Port (5) - RFC 2865
    NasPort = 5 => "NAS-Port",
    /// Service-Type (6) - RFC 2865
    ServiceType = 6 => "Service-Type",
    /// Framed-IP-Address (8) - RFC 2865
    FramedIpAddress = 8 => "Framed-IP-Address",
    /// Filter-Id (11) - RFC 2865
    FilterId = 11 => "Filter-Id",
    /// Reply-Message (18) - RFC 2865
    ReplyMessage = 18 => "Reply-Message",
    /// State (24) - RFC 2865
    State = 24 => "State",
    /// Class (25) - RFC 2865
    Class = 25 => "Class",
    /// Vendor-Specific (26) - RFC 2865
    VendorSpecific = 26 => "Vendor-Specific",
    /// Session-Timeout (27) - RFC 2865
    SessionTimeout = 27 => "Session-Timeout",
    /// Idle-Timeout (28) - RFC 2865
    IdleTimeout = 28 => "Idle-Timeout",
    /// Called-Station-Id (30) - RFC 2865
    /// Access point MAC and SSID on WiFi deployments
    CalledStationId = 30 => "Called-Station-Id",
    /// Calling-Station-Id (31) - RFC 2865
    /// Subscriber device MAC on WiFi deployments
    CallingStationId = 31 => "Calling-Station-Id",
    /// NAS-Identifier (32) - RFC 2865
    NasIdentifier = 32 => "NAS-Identifier",
    /// Proxy-State (33) - RFC 2865
    ProxyState = 33 => "Proxy-State",
    /// Acct-Status-Type (40) - RFC 2866
    AcctStatusType = 40 => "Acct-Status-Type",
    /// Acct-Session-Id (44) - RFC 2866
    AcctSessionId = 44 => "Acct-Session-Id",
    /// Acct-Multi-Session-Id (50) - RFC 2866
    AcctMultiSessionId = 50 => "Acct-Multi-Session-Id",
    /// NAS-Port-Type (61) - RFC 2865
    NasPortType = 61 => "NAS-Port-Type",
    /// EAP-Message (79) - RFC 3579
    /// Encapsulates EAP packets for transport over RADIUS
    EapMessage = 79 => "EAP-Message",
    /// Message-Authenticator (80) - RFC 3579
    MessageAuthenticator = 80 => "Message-Authenticator",
}

impl AttributeType {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl std::fmt::Display for AttributeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
