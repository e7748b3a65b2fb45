//! SK (Encrypted and Authenticated) payload procedures (RFC 7296 Section 3.14)
//!
//! Encrypt-then-MAC with the negotiated AES-CBC cipher and truncated-96
//! HMAC. The integrity checksum covers the entire IKE message except the
//! checksum field itself, so sealing happens in two passes: encrypt and
//! encode with a zeroed checksum, then MAC the encoded bytes and patch the
//! tail. Opening verifies the checksum before any decryption.
//!
//! ```text
//! SK payload data:  [ IV | ciphertext( inner payloads | padding | pad-len ) | ICV ]
//! ```

use super::crypto::cipher::CHECKSUM_LEN;
use super::crypto::{EncrAlgorithm, IntegAlgorithm, RandomSource};
use super::message::IkeMessage;
use super::payload::{self, IkePayload, SkPayload};
use super::sa::IkeSa;
use super::{Error, Result};

/// Seal `inner` payloads into `message` with explicit keys
///
/// `message.payloads` is replaced by the single SK payload; the returned
/// buffer is the complete wire message with the checksum filled in.
pub fn seal_with(
    encr: EncrAlgorithm,
    integ: IntegAlgorithm,
    sk_e: &[u8],
    sk_a: &[u8],
    rng: &dyn RandomSource,
    message: &mut IkeMessage,
    inner: &[IkePayload],
) -> Result<Vec<u8>> {
    let block = encr.block_len();
    let mut plaintext = payload::encode_payloads(inner);

    // Pad so plaintext | padding | pad-length fills whole blocks
    let rem = (plaintext.len() + 1) % block;
    let pad_len = if rem == 0 { 0 } else { block - rem };
    plaintext.resize(plaintext.len() + pad_len, 0);
    plaintext.push(pad_len as u8);

    let iv = rng.bytes(block);
    let ciphertext = encr.encrypt(sk_e, &iv, &plaintext)?;

    let mut sk_data = Vec::with_capacity(iv.len() + ciphertext.len() + CHECKSUM_LEN);
    sk_data.extend_from_slice(&iv);
    sk_data.extend_from_slice(&ciphertext);
    sk_data.extend_from_slice(&[0u8; CHECKSUM_LEN]);

    message.payloads = vec![IkePayload::Encrypted(SkPayload {
        next_payload: payload::first_payload_type(inner),
        data: sk_data,
    })];

    let mut bytes = message.to_bytes();
    let mac_end = bytes.len() - CHECKSUM_LEN;
    let checksum = integ.compute(sk_a, &bytes[..mac_end]);
    bytes[mac_end..].copy_from_slice(&checksum);

    // Keep the in-memory message identical to the wire bytes
    message.header.next_payload = super::constants::PayloadType::SK.to_u8();
    message.header.length = bytes.len() as u32;
    if let Some(IkePayload::Encrypted(sk)) = message.payloads.last_mut() {
        let tail = sk.data.len() - CHECKSUM_LEN;
        sk.data[tail..].copy_from_slice(&checksum);
    }

    Ok(bytes)
}

/// Seal a responder message under the SA's outbound keys (SK_er / SK_ar)
pub fn seal(
    sa: &IkeSa,
    rng: &dyn RandomSource,
    message: &mut IkeMessage,
    inner: &[IkePayload],
) -> Result<Vec<u8>> {
    seal_with(
        sa.crypto.encr,
        sa.crypto.integ,
        &sa.keys.sk_er,
        &sa.keys.sk_ar,
        rng,
        message,
        inner,
    )
}

/// Open an SK payload with explicit keys
///
/// `message_bytes` is the exact datagram as received; the checksum is
/// verified over it before anything is decrypted.
pub fn open_with(
    encr: EncrAlgorithm,
    integ: IntegAlgorithm,
    sk_e: &[u8],
    sk_a: &[u8],
    message_bytes: &[u8],
    sk: &SkPayload,
) -> Result<Vec<IkePayload>> {
    let block = encr.block_len();
    if sk.data.len() < block + CHECKSUM_LEN || message_bytes.len() < CHECKSUM_LEN {
        return Err(Error::BufferTooShort {
            required: block + CHECKSUM_LEN,
            available: sk.data.len(),
        });
    }

    let mac_end = message_bytes.len() - CHECKSUM_LEN;
    let checksum = &message_bytes[mac_end..];
    if !integ.verify(sk_a, &message_bytes[..mac_end], checksum) {
        return Err(Error::ChecksumFailed);
    }

    let iv = &sk.data[..block];
    let ciphertext = &sk.data[block..sk.data.len() - CHECKSUM_LEN];
    let padded = encr.decrypt(sk_e, iv, ciphertext)?;

    let pad_len = *padded.last().ok_or(Error::Crypto("empty plaintext".into()))? as usize;
    if pad_len >= block {
        return Err(Error::Crypto(format!(
            "pad length {} not below block size {}",
            pad_len, block
        )));
    }
    if padded.len() < pad_len + 1 {
        return Err(Error::Crypto("padding exceeds plaintext".into()));
    }
    let plaintext = &padded[..padded.len() - pad_len - 1];

    payload::decode_payloads(sk.next_payload, plaintext)
}

/// Open a peer message under the SA's inbound keys (SK_ei / SK_ai)
pub fn open(sa: &IkeSa, message_bytes: &[u8], sk: &SkPayload) -> Result<Vec<IkePayload>> {
    open_with(
        sa.crypto.encr,
        sa.crypto.integ,
        &sa.keys.sk_ei,
        &sa.keys.sk_ai,
        message_bytes,
        sk,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ike::constants::{notify, ExchangeType, IkeFlags};
    use crate::ike::crypto::OsRandom;
    use crate::ike::payload::{NoncePayload, NotifyPayload};

    fn keys() -> (Vec<u8>, Vec<u8>) {
        (vec![0x11; 32], vec![0x22; 20])
    }

    fn sample_inner() -> Vec<IkePayload> {
        vec![
            IkePayload::Nonce(NoncePayload::new(vec![0x33; 32]).unwrap()),
            IkePayload::Notify(NotifyPayload::new(notify::NO_PROPOSAL_CHOSEN, Vec::new())),
        ]
    }

    fn seal_sample(inner: &[IkePayload]) -> (IkeMessage, Vec<u8>) {
        let (sk_e, sk_a) = keys();
        let mut msg = IkeMessage::new(1, 2, ExchangeType::IkeAuth, IkeFlags::response(), 1);
        let bytes = seal_with(
            EncrAlgorithm::AesCbc256,
            IntegAlgorithm::HmacSha1_96,
            &sk_e,
            &sk_a,
            &OsRandom,
            &mut msg,
            inner,
        )
        .unwrap();
        (msg, bytes)
    }

    fn open_sample(bytes: &[u8]) -> Result<Vec<IkePayload>> {
        let (sk_e, sk_a) = keys();
        let msg = IkeMessage::from_bytes(bytes)?;
        let sk = match &msg.payloads[0] {
            IkePayload::Encrypted(sk) => sk.clone(),
            other => panic!("expected SK payload, got {:?}", other),
        };
        open_with(
            EncrAlgorithm::AesCbc256,
            IntegAlgorithm::HmacSha1_96,
            &sk_e,
            &sk_a,
            bytes,
            &sk,
        )
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let inner = sample_inner();
        let (_, bytes) = seal_sample(&inner);
        let opened = open_sample(&bytes).unwrap();
        assert_eq!(opened, inner);
    }

    #[test]
    fn test_sealed_message_parses_as_single_sk() {
        let (msg, bytes) = seal_sample(&sample_inner());
        assert_eq!(msg.payloads.len(), 1);
        let reparsed = IkeMessage::from_bytes(&bytes).unwrap();
        assert_eq!(reparsed, msg);
    }

    #[test]
    fn test_corrupted_checksum_fails_closed() {
        let (_, mut bytes) = seal_sample(&sample_inner());
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        assert!(matches!(open_sample(&bytes), Err(Error::ChecksumFailed)));
    }

    #[test]
    fn test_corrupted_ciphertext_fails_checksum_before_decrypt() {
        let (_, mut bytes) = seal_sample(&sample_inner());
        // Flip a ciphertext byte (inside SK, before the ICV)
        let target = bytes.len() - CHECKSUM_LEN - 1;
        bytes[target] ^= 0xff;
        assert!(matches!(open_sample(&bytes), Err(Error::ChecksumFailed)));
    }

    #[test]
    fn test_wrong_integrity_key_rejected() {
        let (_, bytes) = seal_sample(&sample_inner());
        let msg = IkeMessage::from_bytes(&bytes).unwrap();
        let sk = match &msg.payloads[0] {
            IkePayload::Encrypted(sk) => sk.clone(),
            _ => unreachable!(),
        };
        let result = open_with(
            EncrAlgorithm::AesCbc256,
            IntegAlgorithm::HmacSha1_96,
            &vec![0x11; 32],
            &vec![0x99; 20],
            &bytes,
            &sk,
        );
        assert!(matches!(result, Err(Error::ChecksumFailed)));
    }

    #[test]
    fn test_empty_inner_payloads_roundtrip() {
        // DPD messages carry an SK payload with no inner payloads
        let (_, bytes) = seal_sample(&[]);
        let opened = open_sample(&bytes).unwrap();
        assert!(opened.is_empty());
    }

    #[test]
    fn test_bad_padding_rejected() {
        // Build an SK whose plaintext claims a pad length >= block size
        let (sk_e, sk_a) = keys();
        let encr = EncrAlgorithm::AesCbc256;
        let integ = IntegAlgorithm::HmacSha1_96;

        let mut plaintext = vec![0u8; 16];
        plaintext[15] = 16; // pad length == block size

        let iv = vec![0u8; 16];
        let ct = encr.encrypt(&sk_e, &iv, &plaintext).unwrap();

        let mut sk_data = iv.clone();
        sk_data.extend_from_slice(&ct);
        sk_data.extend_from_slice(&[0u8; CHECKSUM_LEN]);

        let mut msg = IkeMessage::new(1, 2, ExchangeType::Informational, IkeFlags::response(), 0);
        msg.payloads = vec![IkePayload::Encrypted(SkPayload {
            next_payload: 0,
            data: sk_data,
        })];
        let mut bytes = msg.to_bytes();
        let mac_end = bytes.len() - CHECKSUM_LEN;
        let checksum = integ.compute(&sk_a, &bytes[..mac_end]);
        bytes[mac_end..].copy_from_slice(&checksum);

        let msg = IkeMessage::from_bytes(&bytes).unwrap();
        let sk = match &msg.payloads[0] {
            IkePayload::Encrypted(sk) => sk.clone(),
            _ => unreachable!(),
        };
        let result = open_with(encr, integ, &sk_e, &sk_a, &bytes, &sk);
        assert!(matches!(result, Err(Error::Crypto(_))));
    }
}
