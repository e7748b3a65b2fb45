//! SA payload, proposals and transform negotiation (RFC 7296 Section 3.3)
//!
//! # Structure
//!
//! ```text
//! SA Payload
//!   └── Proposal(s)        (protocol, SPI, transforms)
//!         └── Transform(s) (ENCR / PRF / INTEG / D-H / ESN)
//! ```
//!
//! Two acceptance tables exist: what the IKE SA itself negotiates, and what
//! the kernel can install for ESP Child SAs. Selection is deterministic:
//! proposals are walked in receive order and, within a proposal, transforms
//! in receive order; the first fully-supported combination wins.

use super::constants::ProtocolId;
use super::{Error, Result};

/// Transform types (RFC 7296 Section 3.3.2)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TransformType {
    /// Encryption algorithm
    Encr = 1,
    /// Pseudo-random function
    Prf = 2,
    /// Integrity algorithm
    Integ = 3,
    /// Diffie-Hellman group
    Dh = 4,
    /// Extended sequence numbers
    Esn = 5,
}

impl TransformType {
    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(TransformType::Encr),
            2 => Some(TransformType::Prf),
            3 => Some(TransformType::Integ),
            4 => Some(TransformType::Dh),
            5 => Some(TransformType::Esn),
            _ => None,
        }
    }

    /// Convert to u8
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

/// Transform IDs used by the two acceptance tables
pub mod transform_id {
    /// ENCR_DES
    pub const ENCR_DES: u16 = 2;
    /// ENCR_3DES
    pub const ENCR_3DES: u16 = 3;
    /// ENCR_CAST
    pub const ENCR_CAST: u16 = 6;
    /// ENCR_BLOWFISH
    pub const ENCR_BLOWFISH: u16 = 7;
    /// ENCR_NULL
    pub const ENCR_NULL: u16 = 11;
    /// ENCR_AES_CBC
    pub const ENCR_AES_CBC: u16 = 12;
    /// ENCR_AES_CTR
    pub const ENCR_AES_CTR: u16 = 13;
    /// PRF_HMAC_MD5
    pub const PRF_HMAC_MD5: u16 = 1;
    /// PRF_HMAC_SHA1
    pub const PRF_HMAC_SHA1: u16 = 2;
    /// AUTH_HMAC_MD5_96
    pub const AUTH_HMAC_MD5_96: u16 = 1;
    /// AUTH_HMAC_SHA1_96
    pub const AUTH_HMAC_SHA1_96: u16 = 2;
    /// AUTH_AES_XCBC_96
    pub const AUTH_AES_XCBC_96: u16 = 5;
    /// 1024-bit MODP group
    pub const DH_1024_MODP: u16 = 2;
    /// 2048-bit MODP group
    pub const DH_2048_MODP: u16 = 14;
    /// No extended sequence numbers
    pub const ESN_NO: u16 = 0;
    /// Extended sequence numbers required
    pub const ESN_NEED: u16 = 1;
}

/// Key Length attribute type (TV format)
pub const ATTRIBUTE_KEY_LENGTH: u16 = 14;

/// One transform: type, ID and the optional key-length attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transform {
    /// Transform type
    pub transform_type: TransformType,

    /// Transform ID within that type's registry
    pub transform_id: u16,

    /// Key length attribute in bits, when present
    pub key_length: Option<u16>,
}

impl Transform {
    /// Plain transform without attributes
    pub fn new(transform_type: TransformType, transform_id: u16) -> Self {
        Transform {
            transform_type,
            transform_id,
            key_length: None,
        }
    }

    /// AES-CBC encryption transform with an explicit key length
    pub fn encr_aes_cbc(key_bits: u16) -> Self {
        Transform {
            transform_type: TransformType::Encr,
            transform_id: transform_id::ENCR_AES_CBC,
            key_length: Some(key_bits),
        }
    }

    fn from_bytes(data: &[u8]) -> Result<(Self, bool, usize)> {
        if data.len() < 8 {
            return Err(Error::BufferTooShort {
                required: 8,
                available: data.len(),
            });
        }
        let more = match data[0] {
            0 => false,
            3 => true,
            other => {
                return Err(Error::InvalidPayload(format!(
                    "bad transform substructure marker {}",
                    other
                )))
            }
        };
        let length = u16::from_be_bytes([data[2], data[3]]) as usize;
        if length < 8 || length > data.len() {
            return Err(Error::InvalidLength {
                expected: 8,
                actual: length,
            });
        }
        let transform_type = TransformType::from_u8(data[4])
            .ok_or_else(|| Error::InvalidPayload(format!("unknown transform type {}", data[4])))?;
        let transform_id = u16::from_be_bytes([data[6], data[7]]);

        // Attributes: only the Key Length TV attribute is interpreted.
        let mut key_length = None;
        let mut offset = 8;
        while offset < length {
            if length < offset + 4 {
                return Err(Error::BufferTooShort {
                    required: offset + 4,
                    available: length,
                });
            }
            let attr_head = u16::from_be_bytes([data[offset], data[offset + 1]]);
            if attr_head & 0x8000 != 0 {
                // TV format: value lives in the length field
                let attr_type = attr_head & 0x7fff;
                let value = u16::from_be_bytes([data[offset + 2], data[offset + 3]]);
                if attr_type == ATTRIBUTE_KEY_LENGTH {
                    key_length = Some(value);
                }
                offset += 4;
            } else {
                // TLV format: skip over the value
                let attr_len = u16::from_be_bytes([data[offset + 2], data[offset + 3]]) as usize;
                if length < offset + 4 + attr_len {
                    return Err(Error::BufferTooShort {
                        required: offset + 4 + attr_len,
                        available: length,
                    });
                }
                offset += 4 + attr_len;
            }
        }

        Ok((
            Transform {
                transform_type,
                transform_id,
                key_length,
            },
            more,
            length,
        ))
    }

    fn to_bytes(&self, last: bool) -> Vec<u8> {
        let attr_len = if self.key_length.is_some() { 4 } else { 0 };
        let length = 8 + attr_len;
        let mut out = Vec::with_capacity(length);
        out.push(if last { 0 } else { 3 });
        out.push(0);
        out.extend_from_slice(&(length as u16).to_be_bytes());
        out.push(self.transform_type.to_u8());
        out.push(0);
        out.extend_from_slice(&self.transform_id.to_be_bytes());
        if let Some(bits) = self.key_length {
            out.extend_from_slice(&(0x8000 | ATTRIBUTE_KEY_LENGTH).to_be_bytes());
            out.extend_from_slice(&bits.to_be_bytes());
        }
        out
    }
}

/// One proposal inside an SA payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proposal {
    /// Proposal number as offered
    pub proposal_num: u8,

    /// Protocol this proposal negotiates
    pub protocol_id: ProtocolId,

    /// SPI: empty for the IKE SA in IKE_SA_INIT, 4 bytes for ESP
    pub spi: Vec<u8>,

    /// Transforms in offer order
    pub transforms: Vec<Transform>,
}

impl Proposal {
    /// New proposal with no transforms yet
    pub fn new(proposal_num: u8, protocol_id: ProtocolId) -> Self {
        Proposal {
            proposal_num,
            protocol_id,
            spi: Vec::new(),
            transforms: Vec::new(),
        }
    }

    /// Builder-style transform append
    pub fn add_transform(mut self, transform: Transform) -> Self {
        self.transforms.push(transform);
        self
    }

    /// Builder-style SPI
    pub fn with_spi(mut self, spi: Vec<u8>) -> Self {
        self.spi = spi;
        self
    }

    /// Transforms of one type, in offer order
    pub fn transforms_of(&self, t: TransformType) -> impl Iterator<Item = &Transform> {
        self.transforms.iter().filter(move |tr| tr.transform_type == t)
    }

    /// First transform of one type
    pub fn get_transform(&self, t: TransformType) -> Option<&Transform> {
        self.transforms_of(t).next()
    }

    /// ESP SPI as u32, when the proposal carries one
    pub fn spi_u32(&self) -> Option<u32> {
        if self.spi.len() == 4 {
            Some(u32::from_be_bytes(self.spi[..4].try_into().expect("4 bytes")))
        } else {
            None
        }
    }

    fn from_bytes(data: &[u8]) -> Result<(Self, bool, usize)> {
        if data.len() < 8 {
            return Err(Error::BufferTooShort {
                required: 8,
                available: data.len(),
            });
        }
        let more = match data[0] {
            0 => false,
            2 => true,
            other => {
                return Err(Error::InvalidPayload(format!(
                    "bad proposal substructure marker {}",
                    other
                )))
            }
        };
        let length = u16::from_be_bytes([data[2], data[3]]) as usize;
        if length < 8 || length > data.len() {
            return Err(Error::InvalidLength {
                expected: 8,
                actual: length,
            });
        }
        let proposal_num = data[4];
        let protocol_id = ProtocolId::from_u8(data[5])
            .ok_or_else(|| Error::InvalidPayload(format!("unknown protocol {}", data[5])))?;
        let spi_size = data[6] as usize;
        let num_transforms = data[7] as usize;
        if length < 8 + spi_size {
            return Err(Error::BufferTooShort {
                required: 8 + spi_size,
                available: length,
            });
        }
        let spi = data[8..8 + spi_size].to_vec();

        let mut transforms = Vec::with_capacity(num_transforms);
        let mut offset = 8 + spi_size;
        for i in 0..num_transforms {
            let (transform, more_transforms, consumed) = Transform::from_bytes(&data[offset..length])?;
            transforms.push(transform);
            offset += consumed;
            if more_transforms != (i + 1 < num_transforms) {
                return Err(Error::InvalidPayload(
                    "transform chain marker disagrees with transform count".into(),
                ));
            }
        }
        if offset != length {
            return Err(Error::InvalidLength {
                expected: length,
                actual: offset,
            });
        }

        Ok((
            Proposal {
                proposal_num,
                protocol_id,
                spi,
                transforms,
            },
            more,
            length,
        ))
    }

    fn to_bytes(&self, last: bool) -> Vec<u8> {
        let mut body = Vec::new();
        for (i, t) in self.transforms.iter().enumerate() {
            body.extend_from_slice(&t.to_bytes(i + 1 == self.transforms.len()));
        }
        let length = 8 + self.spi.len() + body.len();

        let mut out = Vec::with_capacity(length);
        out.push(if last { 0 } else { 2 });
        out.push(0);
        out.extend_from_slice(&(length as u16).to_be_bytes());
        out.push(self.proposal_num);
        out.push(self.protocol_id.to_u8());
        out.push(self.spi.len() as u8);
        out.push(self.transforms.len() as u8);
        out.extend_from_slice(&self.spi);
        out.extend_from_slice(&body);
        out
    }
}

/// Security Association payload: a list of proposals
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaPayload {
    /// Proposals in offer order
    pub proposals: Vec<Proposal>,
}

impl SaPayload {
    /// SA payload with a single proposal
    pub fn single(proposal: Proposal) -> Self {
        SaPayload {
            proposals: vec![proposal],
        }
    }

    /// Parse from payload body
    pub fn from_payload_data(data: &[u8]) -> Result<Self> {
        let mut proposals = Vec::new();
        let mut offset = 0;
        let mut more = !data.is_empty();
        while more {
            let (proposal, more_proposals, consumed) = Proposal::from_bytes(&data[offset..])?;
            proposals.push(proposal);
            offset += consumed;
            more = more_proposals;
        }
        if offset != data.len() {
            return Err(Error::InvalidMessage(format!(
                "{} bytes left after proposal chain",
                data.len() - offset
            )));
        }
        Ok(SaPayload { proposals })
    }

    /// Serialize payload body
    pub fn to_payload_data(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for (i, p) in self.proposals.iter().enumerate() {
            out.extend_from_slice(&p.to_bytes(i + 1 == self.proposals.len()));
        }
        out
    }
}

/// Acceptance table for the IKE SA itself
///
/// ENCR_AES_CBC (128/192/256), PRF_HMAC_MD5/SHA1, AUTH_HMAC_MD5_96/SHA1_96,
/// MODP groups 2 and 14. Everything else is refused.
pub fn is_ike_supported(t: &Transform) -> bool {
    use transform_id::*;
    match t.transform_type {
        TransformType::Encr => match t.transform_id {
            ENCR_AES_CBC => matches!(t.key_length, Some(128) | Some(192) | Some(256)),
            _ => false,
        },
        TransformType::Prf => matches!(t.transform_id, PRF_HMAC_MD5 | PRF_HMAC_SHA1),
        TransformType::Integ => {
            matches!(t.transform_id, AUTH_HMAC_MD5_96 | AUTH_HMAC_SHA1_96)
        }
        TransformType::Dh => matches!(t.transform_id, DH_1024_MODP | DH_2048_MODP),
        TransformType::Esn => false,
    }
}

/// Acceptance table for kernel-installable ESP transforms
///
/// Mirrors what the XFRM stack accepts; DH (PFS) is never offered for ESP.
pub fn is_kernel_supported(t: &Transform) -> bool {
    use transform_id::*;
    match t.transform_type {
        TransformType::Encr => match t.transform_id {
            ENCR_DES | ENCR_3DES | ENCR_BLOWFISH | ENCR_NULL => true,
            ENCR_CAST => t.key_length == Some(128),
            ENCR_AES_CBC | ENCR_AES_CTR => {
                matches!(t.key_length, Some(128) | Some(192) | Some(256))
            }
            _ => false,
        },
        TransformType::Prf => false,
        TransformType::Integ => matches!(
            t.transform_id,
            AUTH_HMAC_MD5_96 | AUTH_HMAC_SHA1_96 | AUTH_AES_XCBC_96
        ),
        TransformType::Dh => false,
        TransformType::Esn => matches!(t.transform_id, ESN_NO | ESN_NEED),
    }
}

/// Select the IKE SA quadruple from the peer's IKE_SA_INIT offer
///
/// For each proposal in receive order, pick the first supported transform of
/// each of ENCR/PRF/INTEG/DH; all four are mandatory. ESN offers are ignored
/// (sequence numbering is an ESP concern) and never echoed. Returns the
/// chosen single-transform-per-type proposal, or `None` when nothing is
/// acceptable.
pub fn select_ike_proposal(sa: &SaPayload) -> Option<Proposal> {
    for proposal in &sa.proposals {
        let encr = proposal
            .transforms_of(TransformType::Encr)
            .find(|t| is_ike_supported(t));
        let prf = proposal
            .transforms_of(TransformType::Prf)
            .find(|t| is_ike_supported(t));
        let integ = proposal
            .transforms_of(TransformType::Integ)
            .find(|t| is_ike_supported(t));
        let dh = proposal
            .transforms_of(TransformType::Dh)
            .find(|t| is_ike_supported(t));

        match (encr, prf, integ, dh) {
            (Some(encr), Some(prf), Some(integ), Some(dh)) => {
                return Some(Proposal {
                    proposal_num: proposal.proposal_num,
                    protocol_id: proposal.protocol_id,
                    spi: Vec::new(),
                    transforms: vec![encr.clone(), prf.clone(), integ.clone(), dh.clone()],
                });
            }
            _ => continue,
        }
    }
    None
}

/// Select the ESP proposal from an IKE_AUTH offer against the kernel table
///
/// ENCR and ESN are mandatory; INTEG is optional but must be supported when
/// offered; any PRF or DH offer disqualifies the proposal (neither is used
/// by ESP here). The peer's 32-bit SPI is carried through on the chosen
/// proposal.
pub fn select_esp_proposal(sa: &SaPayload) -> Option<Proposal> {
    for proposal in &sa.proposals {
        if proposal.spi.len() != 4 {
            continue;
        }
        let encr = match proposal
            .transforms_of(TransformType::Encr)
            .find(|t| is_kernel_supported(t))
        {
            Some(t) => t,
            None => continue,
        };
        if proposal.transforms_of(TransformType::Prf).next().is_some() {
            continue;
        }
        let mut integ = None;
        if proposal.transforms_of(TransformType::Integ).next().is_some() {
            integ = proposal
                .transforms_of(TransformType::Integ)
                .find(|t| is_kernel_supported(t));
            if integ.is_none() {
                continue;
            }
        }
        if proposal.transforms_of(TransformType::Dh).next().is_some() {
            continue;
        }
        let esn = match proposal
            .transforms_of(TransformType::Esn)
            .find(|t| is_kernel_supported(t))
        {
            Some(t) => t,
            None => continue,
        };

        let mut transforms = vec![encr.clone(), esn.clone()];
        if let Some(integ) = integ {
            transforms.insert(1, integ.clone());
        }
        return Some(Proposal {
            proposal_num: proposal.proposal_num,
            protocol_id: proposal.protocol_id,
            spi: proposal.spi.clone(),
            transforms,
        });
    }
    None
}

#[cfg(test)]
mod tests {
    use super::transform_id::*;
    use super::*;

    fn full_ike_proposal() -> Proposal {
        Proposal::new(1, ProtocolId::Ike)
            .add_transform(Transform::encr_aes_cbc(256))
            .add_transform(Transform::new(TransformType::Prf, PRF_HMAC_SHA1))
            .add_transform(Transform::new(TransformType::Integ, AUTH_HMAC_SHA1_96))
            .add_transform(Transform::new(TransformType::Dh, DH_2048_MODP))
    }

    #[test]
    fn test_sa_payload_roundtrip() {
        let sa = SaPayload::single(full_ike_proposal());
        let parsed = SaPayload::from_payload_data(&sa.to_payload_data()).unwrap();
        assert_eq!(sa, parsed);
    }

    #[test]
    fn test_sa_payload_roundtrip_with_spi() {
        let proposal = Proposal::new(1, ProtocolId::Esp)
            .with_spi(vec![1, 2, 3, 4])
            .add_transform(Transform::encr_aes_cbc(128))
            .add_transform(Transform::new(TransformType::Esn, ESN_NO));
        let sa = SaPayload::single(proposal);
        let parsed = SaPayload::from_payload_data(&sa.to_payload_data()).unwrap();
        assert_eq!(sa, parsed);
        assert_eq!(parsed.proposals[0].spi_u32(), Some(0x01020304));
    }

    #[test]
    fn test_key_length_attribute_roundtrip() {
        let t = Transform::encr_aes_cbc(192);
        let bytes = t.to_bytes(true);
        let (parsed, more, consumed) = Transform::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, t);
        assert!(!more);
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn test_select_ike_first_supported_wins() {
        // Two ENCR offers; the first supported one (192) must be chosen even
        // though 256 follows.
        let proposal = Proposal::new(1, ProtocolId::Ike)
            .add_transform(Transform::encr_aes_cbc(192))
            .add_transform(Transform::encr_aes_cbc(256))
            .add_transform(Transform::new(TransformType::Prf, PRF_HMAC_SHA1))
            .add_transform(Transform::new(TransformType::Integ, AUTH_HMAC_MD5_96))
            .add_transform(Transform::new(TransformType::Dh, DH_1024_MODP));
        let chosen = select_ike_proposal(&SaPayload::single(proposal)).unwrap();

        assert_eq!(chosen.get_transform(TransformType::Encr).unwrap().key_length, Some(192));
        assert_eq!(chosen.transforms.len(), 4);
    }

    #[test]
    fn test_select_ike_ignores_esn_offers() {
        let proposal = full_ike_proposal()
            .add_transform(Transform::new(TransformType::Esn, ESN_NO))
            .add_transform(Transform::new(TransformType::Esn, ESN_NEED));
        let chosen = select_ike_proposal(&SaPayload::single(proposal)).unwrap();
        assert_eq!(chosen.transforms.len(), 4);
        assert!(chosen.get_transform(TransformType::Esn).is_none());
    }

    #[test]
    fn test_select_ike_rejects_missing_type() {
        let proposal = Proposal::new(1, ProtocolId::Ike)
            .add_transform(Transform::encr_aes_cbc(256))
            .add_transform(Transform::new(TransformType::Prf, PRF_HMAC_SHA1));
        assert!(select_ike_proposal(&SaPayload::single(proposal)).is_none());
    }

    #[test]
    fn test_select_ike_unsupported_encr() {
        // 3DES is not in the IKE table
        let proposal = Proposal::new(1, ProtocolId::Ike)
            .add_transform(Transform::new(TransformType::Encr, ENCR_3DES))
            .add_transform(Transform::new(TransformType::Prf, PRF_HMAC_SHA1))
            .add_transform(Transform::new(TransformType::Integ, AUTH_HMAC_SHA1_96))
            .add_transform(Transform::new(TransformType::Dh, DH_2048_MODP));
        assert!(select_ike_proposal(&SaPayload::single(proposal)).is_none());
    }

    #[test]
    fn test_select_ike_second_proposal() {
        let bad = Proposal::new(1, ProtocolId::Ike)
            .add_transform(Transform::new(TransformType::Encr, ENCR_3DES))
            .add_transform(Transform::new(TransformType::Prf, PRF_HMAC_SHA1))
            .add_transform(Transform::new(TransformType::Integ, AUTH_HMAC_SHA1_96))
            .add_transform(Transform::new(TransformType::Dh, DH_2048_MODP));
        let good = full_ike_proposal();
        let sa = SaPayload {
            proposals: vec![bad, Proposal { proposal_num: 2, ..good }],
        };
        let chosen = select_ike_proposal(&sa).unwrap();
        assert_eq!(chosen.proposal_num, 2);
    }

    #[test]
    fn test_select_esp_optional_integrity() {
        let proposal = Proposal::new(1, ProtocolId::Esp)
            .with_spi(vec![0, 0, 0, 9])
            .add_transform(Transform::encr_aes_cbc(256))
            .add_transform(Transform::new(TransformType::Esn, ESN_NO));
        let chosen = select_esp_proposal(&SaPayload::single(proposal)).unwrap();
        assert!(chosen.get_transform(TransformType::Integ).is_none());
        assert_eq!(chosen.spi_u32(), Some(9));
    }

    #[test]
    fn test_select_esp_requires_esn() {
        let proposal = Proposal::new(1, ProtocolId::Esp)
            .with_spi(vec![0, 0, 0, 9])
            .add_transform(Transform::encr_aes_cbc(256));
        assert!(select_esp_proposal(&SaPayload::single(proposal)).is_none());
    }

    #[test]
    fn test_select_esp_rejects_bad_spi_size() {
        let proposal = Proposal::new(1, ProtocolId::Esp)
            .with_spi(vec![0, 9])
            .add_transform(Transform::encr_aes_cbc(256))
            .add_transform(Transform::new(TransformType::Esn, ESN_NO));
        assert!(select_esp_proposal(&SaPayload::single(proposal)).is_none());
    }

    #[test]
    fn test_select_esp_kernel_table() {
        // 3DES is fine for the kernel even though IKE refuses it
        let proposal = Proposal::new(1, ProtocolId::Esp)
            .with_spi(vec![0, 0, 0, 1])
            .add_transform(Transform::new(TransformType::Encr, ENCR_3DES))
            .add_transform(Transform::new(TransformType::Integ, AUTH_AES_XCBC_96))
            .add_transform(Transform::new(TransformType::Esn, ESN_NEED));
        let chosen = select_esp_proposal(&SaPayload::single(proposal)).unwrap();
        assert_eq!(
            chosen.get_transform(TransformType::Integ).unwrap().transform_id,
            AUTH_AES_XCBC_96
        );
    }
}
