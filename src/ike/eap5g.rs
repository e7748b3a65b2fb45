//! EAP payload and the 3GPP EAP-5G method (RFC 3748, TS 24.502)
//!
//! EAP-5G rides in an EAP-Expanded type with the 3GPP vendor id. The
//! responder never interprets the vendor data beyond its first byte (the
//! EAP-5G message id, checked for 5G-Stop); everything else is relayed
//! opaquely to the NGAP subsystem.
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |     Code      |  Identifier   |            Length             |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |  Type = 254   |          Vendor-Id = 10415 (3GPP)             |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                     Vendor-Type = 3 (EAP-5G)                  |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |  Message-Id   |     Spare     |          Vendor data ...      |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```

use super::constants::eap;
use super::{Error, Result};

/// EAP-Expanded body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EapExpanded {
    /// SMI vendor id (24-bit on the wire)
    pub vendor_id: u32,

    /// Vendor type
    pub vendor_type: u32,

    /// Opaque vendor data
    pub vendor_data: Vec<u8>,
}

impl EapExpanded {
    /// EAP-5G message id, when any vendor data is present
    pub fn eap5g_message_id(&self) -> Option<u8> {
        self.vendor_data.first().copied()
    }

    /// Whether this is the 3GPP EAP-5G method
    pub fn is_eap5g(&self) -> bool {
        self.vendor_id == eap::VENDOR_ID_3GPP && self.vendor_type == eap::VENDOR_TYPE_EAP_5G
    }
}

/// Typed EAP body after the code/identifier/length prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EapTypeData {
    /// EAP-Expanded (type 254)
    Expanded(EapExpanded),

    /// Any other EAP type, kept raw
    Other {
        /// EAP method type
        eap_type: u8,
        /// Raw type data
        data: Vec<u8>,
    },
}

/// EAP payload carried in an IKE EAP payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EapPayload {
    /// EAP code (Request/Response/Success/Failure)
    pub code: u8,

    /// EAP identifier matching requests to responses
    pub identifier: u8,

    /// Type data; absent for Success and Failure
    pub type_data: Option<EapTypeData>,
}

impl EapPayload {
    /// EAP-Success
    pub fn success(identifier: u8) -> Self {
        EapPayload {
            code: eap::CODE_SUCCESS,
            identifier,
            type_data: None,
        }
    }

    /// EAP-Failure
    pub fn failure(identifier: u8) -> Self {
        EapPayload {
            code: eap::CODE_FAILURE,
            identifier,
            type_data: None,
        }
    }

    /// EAP-Request carrying an EAP-5G 5G-Start message
    pub fn eap5g_start(identifier: u8) -> Self {
        Self::eap5g_request(identifier, vec![eap::MSG_5G_START, 0x00])
    }

    /// EAP-Request carrying a NAS PDU inside an EAP-5G 5G-NAS message
    ///
    /// Vendor data is message-id, spare, 2-byte NAS length, NAS PDU.
    pub fn eap5g_nas(identifier: u8, nas_pdu: &[u8]) -> Self {
        let mut vendor_data = Vec::with_capacity(4 + nas_pdu.len());
        vendor_data.push(eap::MSG_5G_NAS);
        vendor_data.push(0x00);
        vendor_data.extend_from_slice(&(nas_pdu.len() as u16).to_be_bytes());
        vendor_data.extend_from_slice(nas_pdu);
        Self::eap5g_request(identifier, vendor_data)
    }

    fn eap5g_request(identifier: u8, vendor_data: Vec<u8>) -> Self {
        EapPayload {
            code: eap::CODE_REQUEST,
            identifier,
            type_data: Some(EapTypeData::Expanded(EapExpanded {
                vendor_id: eap::VENDOR_ID_3GPP,
                vendor_type: eap::VENDOR_TYPE_EAP_5G,
                vendor_data,
            })),
        }
    }

    /// The expanded body, when this payload carries one
    pub fn expanded(&self) -> Option<&EapExpanded> {
        match &self.type_data {
            Some(EapTypeData::Expanded(e)) => Some(e),
            _ => None,
        }
    }

    /// Parse from the IKE EAP payload body
    pub fn from_payload_data(data: &[u8]) -> Result<Self> {
        if data.len() < 4 {
            return Err(Error::BufferTooShort {
                required: 4,
                available: data.len(),
            });
        }
        let code = data[0];
        let identifier = data[1];
        let length = u16::from_be_bytes([data[2], data[3]]) as usize;
        if length != data.len() {
            return Err(Error::InvalidLength {
                expected: length,
                actual: data.len(),
            });
        }

        if matches!(code, c if c == eap::CODE_SUCCESS || c == eap::CODE_FAILURE) {
            if length != 4 {
                return Err(Error::InvalidPayload(
                    "EAP Success/Failure with type data".into(),
                ));
            }
            return Ok(EapPayload {
                code,
                identifier,
                type_data: None,
            });
        }

        if length < 5 {
            return Err(Error::InvalidPayload("EAP Request/Response without type".into()));
        }
        let eap_type = data[4];

        let type_data = if eap_type == eap::TYPE_EXPANDED {
            if length < 12 {
                return Err(Error::BufferTooShort {
                    required: 12,
                    available: length,
                });
            }
            let vendor_id = u32::from_be_bytes([0, data[5], data[6], data[7]]);
            let vendor_type = u32::from_be_bytes([data[8], data[9], data[10], data[11]]);
            EapTypeData::Expanded(EapExpanded {
                vendor_id,
                vendor_type,
                vendor_data: data[12..].to_vec(),
            })
        } else {
            EapTypeData::Other {
                eap_type,
                data: data[5..].to_vec(),
            }
        };

        Ok(EapPayload {
            code,
            identifier,
            type_data: Some(type_data),
        })
    }

    /// Serialize to the IKE EAP payload body
    pub fn to_payload_data(&self) -> Vec<u8> {
        let mut out = vec![self.code, self.identifier, 0, 0];
        match &self.type_data {
            None => {}
            Some(EapTypeData::Expanded(e)) => {
                out.push(eap::TYPE_EXPANDED);
                out.extend_from_slice(&e.vendor_id.to_be_bytes()[1..]);
                out.extend_from_slice(&e.vendor_type.to_be_bytes());
                out.extend_from_slice(&e.vendor_data);
            }
            Some(EapTypeData::Other { eap_type, data }) => {
                out.push(*eap_type);
                out.extend_from_slice(data);
            }
        }
        let length = out.len() as u16;
        out[2..4].copy_from_slice(&length.to_be_bytes());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_failure_roundtrip() {
        for p in [EapPayload::success(7), EapPayload::failure(8)] {
            let parsed = EapPayload::from_payload_data(&p.to_payload_data()).unwrap();
            assert_eq!(p, parsed);
            assert!(parsed.type_data.is_none());
        }
    }

    #[test]
    fn test_5g_start_wire_format() {
        let p = EapPayload::eap5g_start(0x5c);
        let wire = p.to_payload_data();

        assert_eq!(wire[0], eap::CODE_REQUEST);
        assert_eq!(wire[1], 0x5c);
        assert_eq!(u16::from_be_bytes([wire[2], wire[3]]) as usize, wire.len());
        assert_eq!(wire[4], eap::TYPE_EXPANDED);
        // 24-bit vendor id 10415 = 0x0028af
        assert_eq!(&wire[5..8], &[0x00, 0x28, 0xaf]);
        assert_eq!(&wire[8..12], &eap::VENDOR_TYPE_EAP_5G.to_be_bytes());
        assert_eq!(wire[12], eap::MSG_5G_START);
        assert_eq!(wire[13], 0x00);
    }

    #[test]
    fn test_5g_nas_carries_length_prefixed_pdu() {
        let nas = [0x7e, 0x00, 0x56, 0x01];
        let p = EapPayload::eap5g_nas(3, &nas);

        let e = p.expanded().unwrap();
        assert!(e.is_eap5g());
        assert_eq!(e.eap5g_message_id(), Some(eap::MSG_5G_NAS));
        assert_eq!(&e.vendor_data[2..4], &(nas.len() as u16).to_be_bytes());
        assert_eq!(&e.vendor_data[4..], &nas);

        let parsed = EapPayload::from_payload_data(&p.to_payload_data()).unwrap();
        assert_eq!(p, parsed);
    }

    #[test]
    fn test_expanded_roundtrip_preserves_vendor_data() {
        let p = EapPayload {
            code: eap::CODE_RESPONSE,
            identifier: 9,
            type_data: Some(EapTypeData::Expanded(EapExpanded {
                vendor_id: eap::VENDOR_ID_3GPP,
                vendor_type: eap::VENDOR_TYPE_EAP_5G,
                vendor_data: vec![eap::MSG_5G_STOP, 0x00, 0xde, 0xad],
            })),
        };
        let parsed = EapPayload::from_payload_data(&p.to_payload_data()).unwrap();
        assert_eq!(p, parsed);
        assert_eq!(parsed.expanded().unwrap().eap5g_message_id(), Some(eap::MSG_5G_STOP));
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let mut wire = EapPayload::success(1).to_payload_data();
        wire.push(0x00);
        assert!(matches!(
            EapPayload::from_payload_data(&wire),
            Err(Error::InvalidLength { .. })
        ));
    }

    #[test]
    fn test_non_expanded_type_kept_raw() {
        // EAP Identity response
        let wire = [eap::CODE_RESPONSE, 1, 0, 9, 1, b'u', b'e', b'0', b'1'];
        let parsed = EapPayload::from_payload_data(&wire).unwrap();
        match parsed.type_data {
            Some(EapTypeData::Other { eap_type: 1, ref data }) => {
                assert_eq!(data, b"ue01")
            }
            ref other => panic!("unexpected type data: {:?}", other),
        }
        assert!(parsed.expanded().is_none());
    }
}
