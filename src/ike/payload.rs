//! IKEv2 payload codec (RFC 7296 Sections 3.2 - 3.16)
//!
//! The payload set is closed: every payload the responder understands is one
//! variant of [`IkePayload`], and the state machine matches on the variants.
//! Unknown payloads survive decoding as raw bytes unless their critical bit
//! is set, in which case the whole message is rejected.
//!
//! Length fields are validated against the enclosing slice before any body
//! parsing happens; all integers are network byte order.

use std::net::Ipv4Addr;

use super::constants::{cfg, IdType, PayloadType, ProtocolId, PAYLOAD_HEADER_SIZE};
use super::eap5g::EapPayload;
use super::proposal::SaPayload;
use super::{Error, Result};

/// Generic payload header (4 bytes)
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// | Next Payload  |C|  RESERVED   |         Payload Length        |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadHeader {
    /// Type of the payload following this one
    pub next_payload: u8,

    /// Critical bit
    pub critical: bool,

    /// Total payload length including this header
    pub length: u16,
}

impl PayloadHeader {
    /// Parse a payload header, validating the length lower bound
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < PAYLOAD_HEADER_SIZE {
            return Err(Error::BufferTooShort {
                required: PAYLOAD_HEADER_SIZE,
                available: data.len(),
            });
        }

        let length = u16::from_be_bytes([data[2], data[3]]);
        if (length as usize) < PAYLOAD_HEADER_SIZE {
            return Err(Error::InvalidLength {
                expected: PAYLOAD_HEADER_SIZE,
                actual: length as usize,
            });
        }

        Ok(PayloadHeader {
            next_payload: data[0],
            critical: (data[1] & 0x80) != 0,
            length,
        })
    }

    /// Serialize the header
    pub fn to_bytes(&self) -> [u8; PAYLOAD_HEADER_SIZE] {
        let mut bytes = [0u8; PAYLOAD_HEADER_SIZE];
        bytes[0] = self.next_payload;
        bytes[1] = if self.critical { 0x80 } else { 0x00 };
        bytes[2..4].copy_from_slice(&self.length.to_be_bytes());
        bytes
    }
}

/// Key Exchange payload (RFC 7296 Section 3.4)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KePayload {
    /// Diffie-Hellman group number
    pub dh_group: u16,

    /// Peer public value
    pub key_data: Vec<u8>,
}

impl KePayload {
    /// Parse from payload body
    pub fn from_payload_data(data: &[u8]) -> Result<Self> {
        if data.len() < 4 {
            return Err(Error::BufferTooShort {
                required: 4,
                available: data.len(),
            });
        }
        Ok(KePayload {
            dh_group: u16::from_be_bytes([data[0], data[1]]),
            key_data: data[4..].to_vec(),
        })
    }

    /// Serialize payload body
    pub fn to_payload_data(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(4 + self.key_data.len());
        data.extend_from_slice(&self.dh_group.to_be_bytes());
        data.extend_from_slice(&[0u8, 0u8]);
        data.extend_from_slice(&self.key_data);
        data
    }
}

/// Nonce payload (RFC 7296 Section 3.9)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoncePayload {
    /// Nonce bytes
    pub nonce: Vec<u8>,
}

impl NoncePayload {
    /// Minimum nonce size per RFC
    pub const MIN_SIZE: usize = 16;
    /// Maximum nonce size per RFC
    pub const MAX_SIZE: usize = 256;

    /// Create, enforcing RFC size bounds
    pub fn new(nonce: Vec<u8>) -> Result<Self> {
        if nonce.len() < Self::MIN_SIZE || nonce.len() > Self::MAX_SIZE {
            return Err(Error::InvalidPayload(format!(
                "nonce length {} outside [{}, {}]",
                nonce.len(),
                Self::MIN_SIZE,
                Self::MAX_SIZE
            )));
        }
        Ok(NoncePayload { nonce })
    }

    /// Parse from payload body
    pub fn from_payload_data(data: &[u8]) -> Result<Self> {
        Self::new(data.to_vec())
    }

    /// Serialize payload body
    pub fn to_payload_data(&self) -> Vec<u8> {
        self.nonce.clone()
    }
}

/// Identification payload, initiator or responder (RFC 7296 Section 3.5)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdPayload {
    /// Identification type
    pub id_type: IdType,

    /// Identification data (FQDN bytes, address octets, ...)
    pub data: Vec<u8>,
}

impl IdPayload {
    /// FQDN identity
    pub fn fqdn(name: &str) -> Self {
        IdPayload {
            id_type: IdType::Fqdn,
            data: name.as_bytes().to_vec(),
        }
    }

    /// Parse from payload body
    pub fn from_payload_data(data: &[u8]) -> Result<Self> {
        if data.len() < 4 {
            return Err(Error::BufferTooShort {
                required: 4,
                available: data.len(),
            });
        }
        let id_type = IdType::from_u8(data[0])
            .ok_or_else(|| Error::InvalidPayload(format!("unknown ID type {}", data[0])))?;
        Ok(IdPayload {
            id_type,
            data: data[4..].to_vec(),
        })
    }

    /// Serialize payload body
    ///
    /// This is also the "ID body" that enters the signed-octets MAC: the ID
    /// payload minus its 4-byte generic header, exactly.
    pub fn to_payload_data(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.data.len());
        out.push(self.id_type.to_u8());
        out.extend_from_slice(&[0u8; 3]);
        out.extend_from_slice(&self.data);
        out
    }
}

/// Certificate payload (RFC 7296 Section 3.6)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertPayload {
    /// Certificate encoding (4 = X.509 signature)
    pub encoding: u8,

    /// Certificate data (DER)
    pub data: Vec<u8>,
}

impl CertPayload {
    /// Parse from payload body
    pub fn from_payload_data(data: &[u8]) -> Result<Self> {
        if data.is_empty() {
            return Err(Error::BufferTooShort {
                required: 1,
                available: 0,
            });
        }
        Ok(CertPayload {
            encoding: data[0],
            data: data[1..].to_vec(),
        })
    }

    /// Serialize payload body
    pub fn to_payload_data(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + self.data.len());
        out.push(self.encoding);
        out.extend_from_slice(&self.data);
        out
    }
}

/// Certificate Request payload (RFC 7296 Section 3.7)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertReqPayload {
    /// Requested certificate encoding
    pub encoding: u8,

    /// Concatenated SHA-1 hashes of acceptable certification authorities
    pub authority: Vec<u8>,
}

impl CertReqPayload {
    /// Parse from payload body
    pub fn from_payload_data(data: &[u8]) -> Result<Self> {
        if data.is_empty() {
            return Err(Error::BufferTooShort {
                required: 1,
                available: 0,
            });
        }
        Ok(CertReqPayload {
            encoding: data[0],
            authority: data[1..].to_vec(),
        })
    }

    /// Serialize payload body
    pub fn to_payload_data(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + self.authority.len());
        out.push(self.encoding);
        out.extend_from_slice(&self.authority);
        out
    }
}

/// Authentication payload (RFC 7296 Section 3.8)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthPayload {
    /// Authentication method
    pub method: u8,

    /// Authentication data (signature or MAC)
    pub data: Vec<u8>,
}

impl AuthPayload {
    /// Parse from payload body
    pub fn from_payload_data(data: &[u8]) -> Result<Self> {
        if data.len() < 4 {
            return Err(Error::BufferTooShort {
                required: 4,
                available: data.len(),
            });
        }
        Ok(AuthPayload {
            method: data[0],
            data: data[4..].to_vec(),
        })
    }

    /// Serialize payload body
    pub fn to_payload_data(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.data.len());
        out.push(self.method);
        out.extend_from_slice(&[0u8; 3]);
        out.extend_from_slice(&self.data);
        out
    }
}

/// Notify payload (RFC 7296 Section 3.10)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyPayload {
    /// Protocol this notification concerns (0 when none)
    pub protocol_id: u8,

    /// SPI of the concerned SA, empty when none
    pub spi: Vec<u8>,

    /// Notify message type
    pub notify_type: u16,

    /// Notification data
    pub data: Vec<u8>,
}

impl NotifyPayload {
    /// Status/error notification without SPI
    pub fn new(notify_type: u16, data: Vec<u8>) -> Self {
        NotifyPayload {
            protocol_id: 0,
            spi: Vec::new(),
            notify_type,
            data,
        }
    }

    /// Parse from payload body
    pub fn from_payload_data(data: &[u8]) -> Result<Self> {
        if data.len() < 4 {
            return Err(Error::BufferTooShort {
                required: 4,
                available: data.len(),
            });
        }
        let spi_size = data[1] as usize;
        if data.len() < 4 + spi_size {
            return Err(Error::BufferTooShort {
                required: 4 + spi_size,
                available: data.len(),
            });
        }
        Ok(NotifyPayload {
            protocol_id: data[0],
            notify_type: u16::from_be_bytes([data[2], data[3]]),
            spi: data[4..4 + spi_size].to_vec(),
            data: data[4 + spi_size..].to_vec(),
        })
    }

    /// Serialize payload body
    pub fn to_payload_data(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.spi.len() + self.data.len());
        out.push(self.protocol_id);
        out.push(self.spi.len() as u8);
        out.extend_from_slice(&self.notify_type.to_be_bytes());
        out.extend_from_slice(&self.spi);
        out.extend_from_slice(&self.data);
        out
    }
}

/// Delete payload (RFC 7296 Section 3.11)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletePayload {
    /// Protocol of the SAs being deleted
    pub protocol_id: ProtocolId,

    /// Deleted ESP SPIs; empty for an IKE SA delete
    pub spis: Vec<u32>,
}

impl DeletePayload {
    /// Delete the IKE SA itself
    pub fn ike() -> Self {
        DeletePayload {
            protocol_id: ProtocolId::Ike,
            spis: Vec::new(),
        }
    }

    /// Delete ESP Child SAs by inbound SPI
    pub fn esp(spis: Vec<u32>) -> Self {
        DeletePayload {
            protocol_id: ProtocolId::Esp,
            spis,
        }
    }

    /// Parse from payload body
    pub fn from_payload_data(data: &[u8]) -> Result<Self> {
        if data.len() < 4 {
            return Err(Error::BufferTooShort {
                required: 4,
                available: data.len(),
            });
        }
        let protocol_id = ProtocolId::from_u8(data[0])
            .ok_or_else(|| Error::InvalidPayload(format!("unknown protocol {}", data[0])))?;
        let spi_size = data[1] as usize;
        let num_spis = u16::from_be_bytes([data[2], data[3]]) as usize;

        if protocol_id == ProtocolId::Ike {
            return Ok(DeletePayload {
                protocol_id,
                spis: Vec::new(),
            });
        }
        if spi_size != 4 {
            return Err(Error::InvalidPayload(format!(
                "ESP delete with SPI size {}",
                spi_size
            )));
        }
        if data.len() < 4 + num_spis * 4 {
            return Err(Error::BufferTooShort {
                required: 4 + num_spis * 4,
                available: data.len(),
            });
        }

        let spis = (0..num_spis)
            .map(|i| {
                let off = 4 + i * 4;
                u32::from_be_bytes(data[off..off + 4].try_into().expect("4 bytes"))
            })
            .collect();

        Ok(DeletePayload { protocol_id, spis })
    }

    /// Serialize payload body
    pub fn to_payload_data(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.spis.len() * 4);
        out.push(self.protocol_id.to_u8());
        out.push(if self.protocol_id == ProtocolId::Ike { 0 } else { 4 });
        out.extend_from_slice(&(self.spis.len() as u16).to_be_bytes());
        for spi in &self.spis {
            out.extend_from_slice(&spi.to_be_bytes());
        }
        out
    }
}

/// One individual traffic selector (RFC 7296 Section 3.13.1), IPv4 only
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrafficSelector {
    /// IP protocol this selector matches (0 = all)
    pub ip_protocol: u8,

    /// Start of the port range
    pub start_port: u16,

    /// End of the port range
    pub end_port: u16,

    /// First address of the range
    pub start_addr: Ipv4Addr,

    /// Last address of the range
    pub end_addr: Ipv4Addr,
}

impl TrafficSelector {
    /// Wire size of one IPv4 range selector
    pub const SIZE: usize = 16;

    /// A /32 selector covering one host, all protocols, all ports
    pub fn host(addr: Ipv4Addr) -> Self {
        TrafficSelector {
            ip_protocol: super::constants::ts::IP_PROTOCOL_ALL,
            start_port: 0,
            end_port: 65535,
            start_addr: addr,
            end_addr: addr,
        }
    }
}

/// Traffic selector payload, initiator or responder side
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TsPayload {
    /// Selectors in offer order
    pub selectors: Vec<TrafficSelector>,
}

impl TsPayload {
    /// Single-selector payload
    pub fn single(selector: TrafficSelector) -> Self {
        TsPayload {
            selectors: vec![selector],
        }
    }

    /// Parse from payload body
    pub fn from_payload_data(data: &[u8]) -> Result<Self> {
        if data.len() < 4 {
            return Err(Error::BufferTooShort {
                required: 4,
                available: data.len(),
            });
        }
        let count = data[0] as usize;
        let mut selectors = Vec::with_capacity(count);
        let mut offset = 4;

        for _ in 0..count {
            if data.len() < offset + 8 {
                return Err(Error::BufferTooShort {
                    required: offset + 8,
                    available: data.len(),
                });
            }
            let ts_type = data[offset];
            let selector_len =
                u16::from_be_bytes([data[offset + 2], data[offset + 3]]) as usize;
            if ts_type != super::constants::ts::IPV4_ADDR_RANGE {
                return Err(Error::InvalidPayload(format!(
                    "unsupported traffic selector type {}",
                    ts_type
                )));
            }
            if selector_len != TrafficSelector::SIZE || data.len() < offset + selector_len {
                return Err(Error::InvalidLength {
                    expected: TrafficSelector::SIZE,
                    actual: selector_len,
                });
            }

            let s = &data[offset..offset + selector_len];
            selectors.push(TrafficSelector {
                ip_protocol: s[1],
                start_port: u16::from_be_bytes([s[4], s[5]]),
                end_port: u16::from_be_bytes([s[6], s[7]]),
                start_addr: Ipv4Addr::new(s[8], s[9], s[10], s[11]),
                end_addr: Ipv4Addr::new(s[12], s[13], s[14], s[15]),
            });
            offset += selector_len;
        }

        Ok(TsPayload { selectors })
    }

    /// Serialize payload body
    pub fn to_payload_data(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.selectors.len() * TrafficSelector::SIZE);
        out.push(self.selectors.len() as u8);
        out.extend_from_slice(&[0u8; 3]);
        for sel in &self.selectors {
            out.push(super::constants::ts::IPV4_ADDR_RANGE);
            out.push(sel.ip_protocol);
            out.extend_from_slice(&(TrafficSelector::SIZE as u16).to_be_bytes());
            out.extend_from_slice(&sel.start_port.to_be_bytes());
            out.extend_from_slice(&sel.end_port.to_be_bytes());
            out.extend_from_slice(&sel.start_addr.octets());
            out.extend_from_slice(&sel.end_addr.octets());
        }
        out
    }
}

/// One configuration attribute (RFC 7296 Section 3.15.1)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigAttribute {
    /// Attribute type (15-bit)
    pub attr_type: u16,

    /// Attribute value; empty in a request
    pub value: Vec<u8>,
}

/// Configuration payload (RFC 7296 Section 3.15)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPayload {
    /// CFG_REQUEST or CFG_REPLY
    pub cfg_type: u8,

    /// Attributes in wire order
    pub attributes: Vec<ConfigAttribute>,
}

impl ConfigPayload {
    /// An empty CFG_REPLY to fill with attributes
    pub fn reply() -> Self {
        ConfigPayload {
            cfg_type: cfg::REPLY,
            attributes: Vec::new(),
        }
    }

    /// Append an attribute
    pub fn push(&mut self, attr_type: u16, value: Vec<u8>) {
        self.attributes.push(ConfigAttribute { attr_type, value });
    }

    /// Parse from payload body
    pub fn from_payload_data(data: &[u8]) -> Result<Self> {
        if data.len() < 4 {
            return Err(Error::BufferTooShort {
                required: 4,
                available: data.len(),
            });
        }
        let cfg_type = data[0];
        let mut attributes = Vec::new();
        let mut offset = 4;

        while offset < data.len() {
            if data.len() < offset + 4 {
                return Err(Error::BufferTooShort {
                    required: offset + 4,
                    available: data.len(),
                });
            }
            let attr_type = u16::from_be_bytes([data[offset], data[offset + 1]]) & 0x7fff;
            let len = u16::from_be_bytes([data[offset + 2], data[offset + 3]]) as usize;
            if data.len() < offset + 4 + len {
                return Err(Error::BufferTooShort {
                    required: offset + 4 + len,
                    available: data.len(),
                });
            }
            attributes.push(ConfigAttribute {
                attr_type,
                value: data[offset + 4..offset + 4 + len].to_vec(),
            });
            offset += 4 + len;
        }

        Ok(ConfigPayload {
            cfg_type,
            attributes,
        })
    }

    /// Serialize payload body
    pub fn to_payload_data(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.push(self.cfg_type);
        out.extend_from_slice(&[0u8; 3]);
        for attr in &self.attributes {
            out.extend_from_slice(&attr.attr_type.to_be_bytes());
            out.extend_from_slice(&(attr.value.len() as u16).to_be_bytes());
            out.extend_from_slice(&attr.value);
        }
        out
    }
}

/// Encrypted (SK) payload, carried opaque until `sk::open` runs
///
/// `next_payload` records the type of the first inner payload, taken from
/// (or written into) the SK generic header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkPayload {
    /// First inner payload type
    pub next_payload: u8,

    /// IV | ciphertext | ICV
    pub data: Vec<u8>,
}

/// The closed payload set
#[derive(Debug, Clone, PartialEq)]
pub enum IkePayload {
    /// Security Association
    SecurityAssociation(SaPayload),
    /// Key Exchange
    KeyExchange(KePayload),
    /// Initiator identification
    IdInitiator(IdPayload),
    /// Responder identification
    IdResponder(IdPayload),
    /// Certificate
    Certificate(CertPayload),
    /// Certificate request
    CertificateRequest(CertReqPayload),
    /// Authentication
    Authentication(AuthPayload),
    /// Nonce
    Nonce(NoncePayload),
    /// Notification
    Notify(NotifyPayload),
    /// Delete
    Delete(DeletePayload),
    /// Initiator traffic selectors
    TsInitiator(TsPayload),
    /// Responder traffic selectors
    TsResponder(TsPayload),
    /// Encrypted and authenticated
    Encrypted(SkPayload),
    /// Configuration
    Configuration(ConfigPayload),
    /// Extensible authentication
    Eap(EapPayload),
    /// Payload the responder does not interpret (non-critical)
    Unknown {
        /// Raw payload type byte
        payload_type: u8,
        /// Raw body bytes
        data: Vec<u8>,
    },
}

impl IkePayload {
    /// Wire type code of this payload
    pub fn type_code(&self) -> u8 {
        match self {
            IkePayload::SecurityAssociation(_) => PayloadType::SA.to_u8(),
            IkePayload::KeyExchange(_) => PayloadType::KE.to_u8(),
            IkePayload::IdInitiator(_) => PayloadType::IDi.to_u8(),
            IkePayload::IdResponder(_) => PayloadType::IDr.to_u8(),
            IkePayload::Certificate(_) => PayloadType::CERT.to_u8(),
            IkePayload::CertificateRequest(_) => PayloadType::CERTREQ.to_u8(),
            IkePayload::Authentication(_) => PayloadType::AUTH.to_u8(),
            IkePayload::Nonce(_) => PayloadType::Nonce.to_u8(),
            IkePayload::Notify(_) => PayloadType::N.to_u8(),
            IkePayload::Delete(_) => PayloadType::D.to_u8(),
            IkePayload::TsInitiator(_) => PayloadType::TSi.to_u8(),
            IkePayload::TsResponder(_) => PayloadType::TSr.to_u8(),
            IkePayload::Encrypted(_) => PayloadType::SK.to_u8(),
            IkePayload::Configuration(_) => PayloadType::CP.to_u8(),
            IkePayload::Eap(_) => PayloadType::EAP.to_u8(),
            IkePayload::Unknown { payload_type, .. } => *payload_type,
        }
    }

    /// Parse a payload body given its type code
    fn parse(type_code: u8, critical: bool, body: &[u8]) -> Result<Self> {
        let payload = match PayloadType::from_u8(type_code) {
            Some(PayloadType::SA) => {
                IkePayload::SecurityAssociation(SaPayload::from_payload_data(body)?)
            }
            Some(PayloadType::KE) => IkePayload::KeyExchange(KePayload::from_payload_data(body)?),
            Some(PayloadType::IDi) => IkePayload::IdInitiator(IdPayload::from_payload_data(body)?),
            Some(PayloadType::IDr) => IkePayload::IdResponder(IdPayload::from_payload_data(body)?),
            Some(PayloadType::CERT) => {
                IkePayload::Certificate(CertPayload::from_payload_data(body)?)
            }
            Some(PayloadType::CERTREQ) => {
                IkePayload::CertificateRequest(CertReqPayload::from_payload_data(body)?)
            }
            Some(PayloadType::AUTH) => {
                IkePayload::Authentication(AuthPayload::from_payload_data(body)?)
            }
            Some(PayloadType::Nonce) => IkePayload::Nonce(NoncePayload::from_payload_data(body)?),
            Some(PayloadType::N) => IkePayload::Notify(NotifyPayload::from_payload_data(body)?),
            Some(PayloadType::D) => IkePayload::Delete(DeletePayload::from_payload_data(body)?),
            Some(PayloadType::TSi) => IkePayload::TsInitiator(TsPayload::from_payload_data(body)?),
            Some(PayloadType::TSr) => IkePayload::TsResponder(TsPayload::from_payload_data(body)?),
            Some(PayloadType::CP) => {
                IkePayload::Configuration(ConfigPayload::from_payload_data(body)?)
            }
            Some(PayloadType::EAP) => IkePayload::Eap(EapPayload::from_payload_data(body)?),
            Some(PayloadType::SK) => unreachable!("SK handled by the chain walker"),
            Some(PayloadType::None) | Some(PayloadType::V) | None => {
                if critical {
                    return Err(Error::InvalidPayload(format!(
                        "unknown critical payload type {}",
                        type_code
                    )));
                }
                IkePayload::Unknown {
                    payload_type: type_code,
                    data: body.to_vec(),
                }
            }
        };
        Ok(payload)
    }

    /// Serialize this payload's body
    pub fn encode_data(&self) -> Vec<u8> {
        match self {
            IkePayload::SecurityAssociation(p) => p.to_payload_data(),
            IkePayload::KeyExchange(p) => p.to_payload_data(),
            IkePayload::IdInitiator(p) | IkePayload::IdResponder(p) => p.to_payload_data(),
            IkePayload::Certificate(p) => p.to_payload_data(),
            IkePayload::CertificateRequest(p) => p.to_payload_data(),
            IkePayload::Authentication(p) => p.to_payload_data(),
            IkePayload::Nonce(p) => p.to_payload_data(),
            IkePayload::Notify(p) => p.to_payload_data(),
            IkePayload::Delete(p) => p.to_payload_data(),
            IkePayload::TsInitiator(p) | IkePayload::TsResponder(p) => p.to_payload_data(),
            IkePayload::Encrypted(p) => p.data.clone(),
            IkePayload::Configuration(p) => p.to_payload_data(),
            IkePayload::Eap(p) => p.to_payload_data(),
            IkePayload::Unknown { data, .. } => data.clone(),
        }
    }
}

/// Decode a payload chain starting at `first` type
pub fn decode_payloads(first: u8, data: &[u8]) -> Result<Vec<IkePayload>> {
    let mut payloads = Vec::new();
    let mut next = first;
    let mut offset = 0usize;

    while next != PayloadType::None.to_u8() {
        let header = PayloadHeader::from_bytes(&data[offset..])?;
        let end = offset + header.length as usize;
        if end > data.len() {
            return Err(Error::BufferTooShort {
                required: end,
                available: data.len(),
            });
        }
        let body = &data[offset + PAYLOAD_HEADER_SIZE..end];
        let current = next;

        if current == PayloadType::SK.to_u8() {
            // SK is always last; its next-payload names the first inner
            // payload, not a sibling.
            payloads.push(IkePayload::Encrypted(SkPayload {
                next_payload: header.next_payload,
                data: body.to_vec(),
            }));
            offset = end;
            break;
        }

        payloads.push(IkePayload::parse(current, header.critical, body)?);
        next = header.next_payload;
        offset = end;
    }

    if offset != data.len() {
        return Err(Error::InvalidMessage(format!(
            "{} bytes left after payload chain",
            data.len() - offset
        )));
    }

    Ok(payloads)
}

/// Encode a payload sequence, chaining each generic header to the next
pub fn encode_payloads(payloads: &[IkePayload]) -> Vec<u8> {
    let mut out = Vec::new();
    for (i, p) in payloads.iter().enumerate() {
        let next_payload = match p {
            IkePayload::Encrypted(sk) => sk.next_payload,
            _ => payloads
                .get(i + 1)
                .map(IkePayload::type_code)
                .unwrap_or(PayloadType::None.to_u8()),
        };
        let body = p.encode_data();
        let header = PayloadHeader {
            next_payload,
            critical: false,
            length: (PAYLOAD_HEADER_SIZE + body.len()) as u16,
        };
        out.extend_from_slice(&header.to_bytes());
        out.extend_from_slice(&body);
    }
    out
}

/// Type code of the first payload in a sequence, 0 for none
pub fn first_payload_type(payloads: &[IkePayload]) -> u8 {
    payloads
        .first()
        .map(IkePayload::type_code)
        .unwrap_or(PayloadType::None.to_u8())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ike::constants::notify;

    #[test]
    fn test_payload_header_roundtrip() {
        let header = PayloadHeader {
            next_payload: PayloadType::Nonce.to_u8(),
            critical: true,
            length: 100,
        };
        let parsed = PayloadHeader::from_bytes(&header.to_bytes()).unwrap();
        assert_eq!(header, parsed);
    }

    #[test]
    fn test_payload_header_length_below_minimum() {
        let data = [33, 0, 0, 2];
        assert!(matches!(
            PayloadHeader::from_bytes(&data),
            Err(Error::InvalidLength { .. })
        ));
    }

    #[test]
    fn test_notify_roundtrip() {
        let n = NotifyPayload {
            protocol_id: ProtocolId::Esp.to_u8(),
            spi: vec![0xde, 0xad, 0xbe, 0xef],
            notify_type: notify::NAT_DETECTION_SOURCE_IP,
            data: vec![0x11; 20],
        };
        let parsed = NotifyPayload::from_payload_data(&n.to_payload_data()).unwrap();
        assert_eq!(n, parsed);
    }

    #[test]
    fn test_invalid_ke_notify_carries_group() {
        let n = NotifyPayload::new(notify::INVALID_KE_PAYLOAD, 14u16.to_be_bytes().to_vec());
        assert_eq!(n.to_payload_data()[4..6], [0x00, 0x0e]);
    }

    #[test]
    fn test_delete_roundtrip() {
        let ike = DeletePayload::ike();
        assert_eq!(
            DeletePayload::from_payload_data(&ike.to_payload_data()).unwrap(),
            ike
        );

        let esp = DeletePayload::esp(vec![0x01020304, 0x0a0b0c0d]);
        assert_eq!(
            DeletePayload::from_payload_data(&esp.to_payload_data()).unwrap(),
            esp
        );
    }

    #[test]
    fn test_traffic_selector_roundtrip() {
        let ts = TsPayload::single(TrafficSelector::host(Ipv4Addr::new(10, 0, 0, 5)));
        let parsed = TsPayload::from_payload_data(&ts.to_payload_data()).unwrap();
        assert_eq!(ts, parsed);
        assert_eq!(parsed.selectors[0].start_addr, parsed.selectors[0].end_addr);
    }

    #[test]
    fn test_config_roundtrip() {
        let mut cp = ConfigPayload::reply();
        cp.push(cfg::INTERNAL_IP4_ADDRESS, vec![10, 0, 0, 9]);
        cp.push(cfg::INTERNAL_IP4_NETMASK, vec![255, 255, 255, 0]);
        let parsed = ConfigPayload::from_payload_data(&cp.to_payload_data()).unwrap();
        assert_eq!(cp, parsed);
    }

    #[test]
    fn test_id_body_excludes_generic_header() {
        let id = IdPayload::fqdn("n3iwf.operator.example");
        let body = id.to_payload_data();
        assert_eq!(body[0], IdType::Fqdn.to_u8());
        assert_eq!(&body[4..], "n3iwf.operator.example".as_bytes());
    }

    #[test]
    fn test_chain_decode_multiple() {
        let payloads = vec![
            IkePayload::Nonce(NoncePayload::new(vec![0x22; 32]).unwrap()),
            IkePayload::Notify(NotifyPayload::new(notify::NO_PROPOSAL_CHOSEN, Vec::new())),
        ];
        let wire = encode_payloads(&payloads);
        let parsed = decode_payloads(first_payload_type(&payloads), &wire).unwrap();
        assert_eq!(payloads, parsed);
    }

    #[test]
    fn test_chain_decode_unknown_critical_rejected() {
        // Vendor ID payload (43) with the critical bit set
        let wire = [0u8, 0x80, 0, 8, 1, 2, 3, 4];
        let result = decode_payloads(43, &wire);
        assert!(matches!(result, Err(Error::InvalidPayload(_))));
    }

    #[test]
    fn test_chain_decode_unknown_noncritical_kept() {
        let wire = [0u8, 0x00, 0, 8, 1, 2, 3, 4];
        let parsed = decode_payloads(43, &wire).unwrap();
        assert!(matches!(parsed[0], IkePayload::Unknown { payload_type: 43, .. }));
    }

    #[test]
    fn test_chain_decode_truncated() {
        let payloads = vec![IkePayload::Nonce(NoncePayload::new(vec![0x22; 32]).unwrap())];
        let wire = encode_payloads(&payloads);
        let result = decode_payloads(first_payload_type(&payloads), &wire[..wire.len() - 1]);
        assert!(matches!(result, Err(Error::BufferTooShort { .. })));
    }

    #[test]
    fn test_sk_terminates_chain() {
        let payloads = vec![IkePayload::Encrypted(SkPayload {
            next_payload: PayloadType::IDi.to_u8(),
            data: vec![0xaa; 48],
        })];
        let wire = encode_payloads(&payloads);
        let parsed = decode_payloads(PayloadType::SK.to_u8(), &wire).unwrap();
        match &parsed[0] {
            IkePayload::Encrypted(sk) => {
                assert_eq!(sk.next_payload, PayloadType::IDi.to_u8());
                assert_eq!(sk.data.len(), 48);
            }
            other => panic!("expected SK payload, got {:?}", other),
        }
    }
}
