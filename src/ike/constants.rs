//! IKEv2 protocol constants (RFC 7296, TS 24.502)

/// IKE version byte (major 2, minor 0)
pub const IKE_VERSION: u8 = 0x20;

/// IKE header size (28 bytes)
pub const IKE_HEADER_SIZE: usize = 28;

/// Generic payload header size (4 bytes)
pub const PAYLOAD_HEADER_SIZE: usize = 4;

/// Maximum IKE message size accepted by the codec
pub const MAX_IKE_MESSAGE_SIZE: u32 = 65535;

/// UDP port for initial IKE exchanges
pub const IKE_PORT: u16 = 500;

/// UDP port after NAT-T float (4-byte non-ESP marker handled by transport)
pub const NAT_T_PORT: u16 = 4500;

/// Exchange Types (RFC 7296 Section 3.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ExchangeType {
    /// IKE_SA_INIT (34)
    IkeSaInit = 34,
    /// IKE_AUTH (35)
    IkeAuth = 35,
    /// CREATE_CHILD_SA (36)
    CreateChildSa = 36,
    /// INFORMATIONAL (37)
    Informational = 37,
}

impl ExchangeType {
    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            34 => Some(ExchangeType::IkeSaInit),
            35 => Some(ExchangeType::IkeAuth),
            36 => Some(ExchangeType::CreateChildSa),
            37 => Some(ExchangeType::Informational),
            _ => None,
        }
    }

    /// Convert to u8
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

/// IKE header flags (RFC 7296 Section 3.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IkeFlags(u8);

impl IkeFlags {
    /// Response flag (bit 5)
    pub const RESPONSE: u8 = 0x20;
    /// Version flag (bit 4)
    pub const VERSION: u8 = 0x10;
    /// Initiator flag (bit 3)
    pub const INITIATOR: u8 = 0x08;

    /// Wrap a raw flags byte, masking reserved bits
    pub fn new(value: u8) -> Self {
        IkeFlags(value & 0x38)
    }

    /// Flags for a request we originate (responder role, so no I bit)
    pub fn request() -> Self {
        IkeFlags(0)
    }

    /// Flags for a response to a peer-initiated exchange
    pub fn response() -> Self {
        IkeFlags(Self::RESPONSE)
    }

    /// Check the response bit
    pub fn is_response(self) -> bool {
        (self.0 & Self::RESPONSE) != 0
    }

    /// Check the initiator bit
    pub fn is_initiator(self) -> bool {
        (self.0 & Self::INITIATOR) != 0
    }

    /// Raw value
    pub fn value(self) -> u8 {
        self.0
    }
}

/// Payload Types (RFC 7296 Section 3.2)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PayloadType {
    /// No next payload (0)
    None = 0,
    /// Security Association (33)
    SA = 33,
    /// Key Exchange (34)
    KE = 34,
    /// Identification - Initiator (35)
    IDi = 35,
    /// Identification - Responder (36)
    IDr = 36,
    /// Certificate (37)
    CERT = 37,
    /// Certificate Request (38)
    CERTREQ = 38,
    /// Authentication (39)
    AUTH = 39,
    /// Nonce (40)
    Nonce = 40,
    /// Notify (41)
    N = 41,
    /// Delete (42)
    D = 42,
    /// Vendor ID (43)
    V = 43,
    /// Traffic Selector - Initiator (44)
    TSi = 44,
    /// Traffic Selector - Responder (45)
    TSr = 45,
    /// Encrypted and Authenticated (46)
    SK = 46,
    /// Configuration (47)
    CP = 47,
    /// Extensible Authentication (48)
    EAP = 48,
}

impl PayloadType {
    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(PayloadType::None),
            33 => Some(PayloadType::SA),
            34 => Some(PayloadType::KE),
            35 => Some(PayloadType::IDi),
            36 => Some(PayloadType::IDr),
            37 => Some(PayloadType::CERT),
            38 => Some(PayloadType::CERTREQ),
            39 => Some(PayloadType::AUTH),
            40 => Some(PayloadType::Nonce),
            41 => Some(PayloadType::N),
            42 => Some(PayloadType::D),
            43 => Some(PayloadType::V),
            44 => Some(PayloadType::TSi),
            45 => Some(PayloadType::TSr),
            46 => Some(PayloadType::SK),
            47 => Some(PayloadType::CP),
            48 => Some(PayloadType::EAP),
            _ => None,
        }
    }

    /// Convert to u8
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

/// Protocol IDs used in proposals, notifies and deletes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ProtocolId {
    /// IKE SA (1)
    Ike = 1,
    /// Authentication Header (2), unused in this profile
    Ah = 2,
    /// Encapsulating Security Payload (3)
    Esp = 3,
}

impl ProtocolId {
    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(ProtocolId::Ike),
            2 => Some(ProtocolId::Ah),
            3 => Some(ProtocolId::Esp),
            _ => None,
        }
    }

    /// Convert to u8
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

/// Notify Message Types used by the responder
///
/// The 55xxx range is 3GPP-private (TS 24.502 Section 9.3).
pub mod notify {
    /// INVALID_IKE_SPI
    pub const INVALID_IKE_SPI: u16 = 4;
    /// INVALID_MAJOR_VERSION
    pub const INVALID_MAJOR_VERSION: u16 = 5;
    /// INVALID_KE_PAYLOAD (data: chosen group, 2 bytes)
    pub const INVALID_KE_PAYLOAD: u16 = 17;
    /// AUTHENTICATION_FAILED
    pub const AUTHENTICATION_FAILED: u16 = 24;
    /// NO_PROPOSAL_CHOSEN
    pub const NO_PROPOSAL_CHOSEN: u16 = 14;
    /// NAT_DETECTION_SOURCE_IP (data: 20-byte SHA-1)
    pub const NAT_DETECTION_SOURCE_IP: u16 = 16388;
    /// NAT_DETECTION_DESTINATION_IP (data: 20-byte SHA-1)
    pub const NAT_DETECTION_DESTINATION_IP: u16 = 16389;
    /// 5G_QOS_INFO (3GPP)
    pub const QOS_INFO_5G: u16 = 55501;
    /// NAS_IP4_ADDRESS (3GPP)
    pub const NAS_IP4_ADDRESS: u16 = 55502;
    /// UP_IP4_ADDRESS (3GPP)
    pub const UP_IP4_ADDRESS: u16 = 55504;
    /// NAS_TCP_PORT (3GPP)
    pub const NAS_TCP_PORT: u16 = 55506;
}

/// Identification payload types (RFC 7296 Section 3.5)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum IdType {
    /// ID_IPV4_ADDR (1)
    Ipv4Addr = 1,
    /// ID_FQDN (2)
    Fqdn = 2,
    /// ID_RFC822_ADDR (3)
    Rfc822Addr = 3,
    /// ID_KEY_ID (11)
    KeyId = 11,
}

impl IdType {
    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(IdType::Ipv4Addr),
            2 => Some(IdType::Fqdn),
            3 => Some(IdType::Rfc822Addr),
            11 => Some(IdType::KeyId),
            _ => None,
        }
    }

    /// Convert to u8
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

/// Authentication methods (RFC 7296 Section 3.8)
pub mod auth_method {
    /// RSA digital signature
    pub const RSA_DIGITAL_SIGNATURE: u8 = 1;
    /// Shared key message integrity code
    pub const SHARED_KEY_MIC: u8 = 2;
}

/// Certificate encodings (RFC 7296 Section 3.6)
pub mod cert_encoding {
    /// X.509 Certificate - Signature
    pub const X509_SIGNATURE: u8 = 4;
}

/// Configuration payload constants (RFC 7296 Section 3.15)
pub mod cfg {
    /// CFG_REQUEST
    pub const REQUEST: u8 = 1;
    /// CFG_REPLY
    pub const REPLY: u8 = 2;
    /// INTERNAL_IP4_ADDRESS attribute
    pub const INTERNAL_IP4_ADDRESS: u16 = 1;
    /// INTERNAL_IP4_NETMASK attribute
    pub const INTERNAL_IP4_NETMASK: u16 = 2;
}

/// Traffic selector constants (RFC 7296 Section 3.13)
pub mod ts {
    /// TS_IPV4_ADDR_RANGE selector type
    pub const IPV4_ADDR_RANGE: u8 = 7;
    /// IP protocol wildcard
    pub const IP_PROTOCOL_ALL: u8 = 0;
}

/// EAP constants (RFC 3748) and the 3GPP EAP-5G method (TS 24.502)
pub mod eap {
    /// EAP Request code
    pub const CODE_REQUEST: u8 = 1;
    /// EAP Response code
    pub const CODE_RESPONSE: u8 = 2;
    /// EAP Success code
    pub const CODE_SUCCESS: u8 = 3;
    /// EAP Failure code
    pub const CODE_FAILURE: u8 = 4;
    /// Expanded EAP type
    pub const TYPE_EXPANDED: u8 = 254;
    /// 3GPP vendor id
    pub const VENDOR_ID_3GPP: u32 = 10415;
    /// EAP-5G vendor type
    pub const VENDOR_TYPE_EAP_5G: u32 = 3;
    /// EAP-5G message id: 5G-Start
    pub const MSG_5G_START: u8 = 1;
    /// EAP-5G message id: 5G-NAS
    pub const MSG_5G_NAS: u8 = 2;
    /// EAP-5G message id: 5G-Stop
    pub const MSG_5G_STOP: u8 = 4;
}
