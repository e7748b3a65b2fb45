//! IKE message framing (RFC 7296 Section 3.1)
//!
//! An IKE message is a 28-byte header followed by a chain of payloads, each
//! pointing at the type of the next. The header is parsed and validated
//! before any payload is touched; the version byte is carried through raw so
//! the state machine can answer INVALID_MAJOR_VERSION itself instead of the
//! codec dropping the datagram.

use super::constants::{
    ExchangeType, IkeFlags, PayloadType, IKE_HEADER_SIZE, IKE_VERSION, MAX_IKE_MESSAGE_SIZE,
};
use super::payload::{self, IkePayload};
use super::{Error, Result};

/// IKE message header (28 bytes)
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                       IKE SA Initiator's SPI                  |
/// |                                                               |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                       IKE SA Responder's SPI                  |
/// |                                                               |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |  Next Payload | MjVer | MnVer | Exchange Type |     Flags     |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                          Message ID                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                            Length                             |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IkeHeader {
    /// Initiator's SPI
    pub initiator_spi: u64,

    /// Responder's SPI (zero in the first IKE_SA_INIT request)
    pub responder_spi: u64,

    /// Type of the first payload
    pub next_payload: u8,

    /// Raw version byte (high nibble = major, low nibble = minor)
    pub version: u8,

    /// Exchange type
    pub exchange_type: ExchangeType,

    /// Message flags
    pub flags: IkeFlags,

    /// Message ID
    pub message_id: u32,

    /// Total message length including this header
    pub length: u32,
}

impl IkeHeader {
    /// Major version carried in the raw version byte
    pub fn major_version(&self) -> u8 {
        (self.version & 0xf0) >> 4
    }

    /// Parse a header from the first 28 bytes of a datagram
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < IKE_HEADER_SIZE {
            return Err(Error::BufferTooShort {
                required: IKE_HEADER_SIZE,
                available: data.len(),
            });
        }

        let initiator_spi = u64::from_be_bytes(data[0..8].try_into().expect("8 bytes"));
        let responder_spi = u64::from_be_bytes(data[8..16].try_into().expect("8 bytes"));
        let next_payload = data[16];
        let version = data[17];

        let exchange_type = ExchangeType::from_u8(data[18])
            .ok_or(Error::UnsupportedExchangeType(data[18]))?;

        let flags = IkeFlags::new(data[19]);
        let message_id = u32::from_be_bytes(data[20..24].try_into().expect("4 bytes"));
        let length = u32::from_be_bytes(data[24..28].try_into().expect("4 bytes"));

        if length > MAX_IKE_MESSAGE_SIZE {
            return Err(Error::InvalidMessage(format!(
                "declared length {} exceeds maximum",
                length
            )));
        }
        if (length as usize) < IKE_HEADER_SIZE {
            return Err(Error::InvalidLength {
                expected: IKE_HEADER_SIZE,
                actual: length as usize,
            });
        }

        Ok(IkeHeader {
            initiator_spi,
            responder_spi,
            next_payload,
            version,
            exchange_type,
            flags,
            message_id,
            length,
        })
    }

    /// Serialize the header
    pub fn to_bytes(&self) -> [u8; IKE_HEADER_SIZE] {
        let mut bytes = [0u8; IKE_HEADER_SIZE];
        bytes[0..8].copy_from_slice(&self.initiator_spi.to_be_bytes());
        bytes[8..16].copy_from_slice(&self.responder_spi.to_be_bytes());
        bytes[16] = self.next_payload;
        bytes[17] = self.version;
        bytes[18] = self.exchange_type.to_u8();
        bytes[19] = self.flags.value();
        bytes[20..24].copy_from_slice(&self.message_id.to_be_bytes());
        bytes[24..28].copy_from_slice(&self.length.to_be_bytes());
        bytes
    }
}

/// A complete IKE message: header plus payload chain
#[derive(Debug, Clone, PartialEq)]
pub struct IkeMessage {
    /// Message header; `next_payload` and `length` are recomputed on encode
    pub header: IkeHeader,

    /// Payloads in wire order
    pub payloads: Vec<IkePayload>,
}

impl IkeMessage {
    /// Create an empty message with the given header fields
    pub fn new(
        initiator_spi: u64,
        responder_spi: u64,
        exchange_type: ExchangeType,
        flags: IkeFlags,
        message_id: u32,
    ) -> Self {
        IkeMessage {
            header: IkeHeader {
                initiator_spi,
                responder_spi,
                next_payload: PayloadType::None.to_u8(),
                version: IKE_VERSION,
                exchange_type,
                flags,
                message_id,
                length: IKE_HEADER_SIZE as u32,
            },
            payloads: Vec::new(),
        }
    }

    /// Decode a full message from a datagram
    ///
    /// The declared header length must fit inside the datagram; trailing
    /// bytes beyond it are rejected to keep one datagram = one message.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let header = IkeHeader::from_bytes(data)?;

        let total = header.length as usize;
        if data.len() < total {
            return Err(Error::BufferTooShort {
                required: total,
                available: data.len(),
            });
        }
        if data.len() > total {
            return Err(Error::InvalidMessage(format!(
                "{} trailing bytes after declared message end",
                data.len() - total
            )));
        }

        let payloads = payload::decode_payloads(header.next_payload, &data[IKE_HEADER_SIZE..total])?;

        Ok(IkeMessage { header, payloads })
    }

    /// Encode the message, fixing up next-payload chain and length
    pub fn to_bytes(&self) -> Vec<u8> {
        let body = payload::encode_payloads(&self.payloads);

        let mut header = self.header.clone();
        header.next_payload = payload::first_payload_type(&self.payloads);
        header.length = (IKE_HEADER_SIZE + body.len()) as u32;

        let mut out = Vec::with_capacity(header.length as usize);
        out.extend_from_slice(&header.to_bytes());
        out.extend_from_slice(&body);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ike::payload::NoncePayload;

    #[test]
    fn test_header_roundtrip() {
        let header = IkeHeader {
            initiator_spi: 0x0102030405060708,
            responder_spi: 0x090a0b0c0d0e0f10,
            next_payload: PayloadType::SA.to_u8(),
            version: IKE_VERSION,
            exchange_type: ExchangeType::IkeSaInit,
            flags: IkeFlags::response(),
            message_id: 42,
            length: 28,
        };

        let parsed = IkeHeader::from_bytes(&header.to_bytes()).unwrap();
        assert_eq!(header, parsed);
        assert_eq!(parsed.major_version(), 2);
    }

    #[test]
    fn test_header_too_short() {
        let result = IkeHeader::from_bytes(&[0u8; 27]);
        assert!(matches!(result, Err(Error::BufferTooShort { .. })));
    }

    #[test]
    fn test_header_unknown_exchange() {
        let mut data = [0u8; 28];
        data[17] = IKE_VERSION;
        data[18] = 99;
        data[24..28].copy_from_slice(&28u32.to_be_bytes());

        let result = IkeHeader::from_bytes(&data);
        assert!(matches!(result, Err(Error::UnsupportedExchangeType(99))));
    }

    #[test]
    fn test_header_length_too_small() {
        let mut data = [0u8; 28];
        data[17] = IKE_VERSION;
        data[18] = 34;
        data[24..28].copy_from_slice(&20u32.to_be_bytes());

        let result = IkeHeader::from_bytes(&data);
        assert!(matches!(result, Err(Error::InvalidLength { .. })));
    }

    #[test]
    fn test_message_roundtrip() {
        let mut msg = IkeMessage::new(
            0x1111111111111111,
            0,
            ExchangeType::IkeSaInit,
            IkeFlags::new(IkeFlags::INITIATOR),
            0,
        );
        msg.payloads
            .push(IkePayload::Nonce(NoncePayload::new(vec![0xab; 32]).unwrap()));

        let bytes = msg.to_bytes();
        let parsed = IkeMessage::from_bytes(&bytes).unwrap();

        assert_eq!(parsed.header.initiator_spi, 0x1111111111111111);
        assert_eq!(parsed.payloads.len(), 1);
        assert_eq!(bytes.len() as u32, parsed.header.length);
    }

    #[test]
    fn test_message_trailing_garbage_rejected() {
        let msg = IkeMessage::new(1, 2, ExchangeType::Informational, IkeFlags::response(), 7);
        let mut bytes = msg.to_bytes();
        bytes.push(0x00);

        let result = IkeMessage::from_bytes(&bytes);
        assert!(matches!(result, Err(Error::InvalidMessage(_))));
    }

    #[test]
    fn test_message_truncated_rejected() {
        let mut msg = IkeMessage::new(1, 2, ExchangeType::IkeSaInit, IkeFlags::response(), 0);
        msg.payloads
            .push(IkePayload::Nonce(NoncePayload::new(vec![0xab; 32]).unwrap()));
        let bytes = msg.to_bytes();

        let result = IkeMessage::from_bytes(&bytes[..bytes.len() - 4]);
        assert!(matches!(result, Err(Error::BufferTooShort { .. })));
    }
}
