//! SK payload ciphers and integrity (RFC 7296 Section 3.14)
//!
//! The IKE SA negotiates AES-CBC with HMAC-MD5-96 or HMAC-SHA1-96; both
//! truncate the MAC to 12 bytes. The cipher layer works on whole blocks;
//! RFC padding (pad bytes + pad-length octet) is the SK layer's job.

use aes::{Aes128, Aes192, Aes256};
use cbc::{Decryptor, Encryptor};
use cipher::block_padding::NoPadding;
use cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use md5::Md5;
use sha1::Sha1;
use subtle::ConstantTimeEq;

use crate::ike::proposal::{transform_id, Transform, TransformType};
use crate::ike::{Error, Result};

/// Truncated MAC length shared by both negotiated integrity transforms
pub const CHECKSUM_LEN: usize = 12;

/// Encryption algorithm negotiated for SK payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncrAlgorithm {
    /// ENCR_AES_CBC, 128-bit key
    AesCbc128,
    /// ENCR_AES_CBC, 192-bit key
    AesCbc192,
    /// ENCR_AES_CBC, 256-bit key
    AesCbc256,
}

impl EncrAlgorithm {
    /// Map a negotiated ENCR transform to an algorithm
    pub fn from_transform(t: &Transform) -> Option<Self> {
        if t.transform_type != TransformType::Encr
            || t.transform_id != transform_id::ENCR_AES_CBC
        {
            return None;
        }
        match t.key_length {
            Some(128) => Some(EncrAlgorithm::AesCbc128),
            Some(192) => Some(EncrAlgorithm::AesCbc192),
            Some(256) => Some(EncrAlgorithm::AesCbc256),
            _ => None,
        }
    }

    /// Key length in bytes
    pub fn key_len(self) -> usize {
        match self {
            EncrAlgorithm::AesCbc128 => 16,
            EncrAlgorithm::AesCbc192 => 24,
            EncrAlgorithm::AesCbc256 => 32,
        }
    }

    /// Cipher block (and IV) size in bytes
    pub fn block_len(self) -> usize {
        16
    }

    /// CBC-encrypt `plaintext`, which must already be block-aligned
    pub fn encrypt(self, key: &[u8], iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        self.check_args(key, iv)?;
        if plaintext.len() % self.block_len() != 0 {
            return Err(Error::Crypto(format!(
                "plaintext length {} not block-aligned",
                plaintext.len()
            )));
        }
        let out = match self {
            EncrAlgorithm::AesCbc128 => Encryptor::<Aes128>::new_from_slices(key, iv)
                .map_err(|_| Error::Crypto("CBC encryptor init failed".into()))?
                .encrypt_padded_vec_mut::<NoPadding>(plaintext),
            EncrAlgorithm::AesCbc192 => Encryptor::<Aes192>::new_from_slices(key, iv)
                .map_err(|_| Error::Crypto("CBC encryptor init failed".into()))?
                .encrypt_padded_vec_mut::<NoPadding>(plaintext),
            EncrAlgorithm::AesCbc256 => Encryptor::<Aes256>::new_from_slices(key, iv)
                .map_err(|_| Error::Crypto("CBC encryptor init failed".into()))?
                .encrypt_padded_vec_mut::<NoPadding>(plaintext),
        };
        Ok(out)
    }

    /// CBC-decrypt `ciphertext`, which must be block-aligned
    pub fn decrypt(self, key: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
        self.check_args(key, iv)?;
        if ciphertext.is_empty() || ciphertext.len() % self.block_len() != 0 {
            return Err(Error::Crypto(format!(
                "ciphertext length {} not block-aligned",
                ciphertext.len()
            )));
        }
        let out = match self {
            EncrAlgorithm::AesCbc128 => Decryptor::<Aes128>::new_from_slices(key, iv)
                .map_err(|_| Error::Crypto("CBC decryptor init failed".into()))?
                .decrypt_padded_vec_mut::<NoPadding>(ciphertext),
            EncrAlgorithm::AesCbc192 => Decryptor::<Aes192>::new_from_slices(key, iv)
                .map_err(|_| Error::Crypto("CBC decryptor init failed".into()))?
                .decrypt_padded_vec_mut::<NoPadding>(ciphertext),
            EncrAlgorithm::AesCbc256 => Decryptor::<Aes256>::new_from_slices(key, iv)
                .map_err(|_| Error::Crypto("CBC decryptor init failed".into()))?
                .decrypt_padded_vec_mut::<NoPadding>(ciphertext),
        };
        out.map_err(|_| Error::Crypto("CBC unpad failed".into()))
    }

    fn check_args(self, key: &[u8], iv: &[u8]) -> Result<()> {
        if key.len() != self.key_len() {
            return Err(Error::Crypto(format!(
                "bad encryption key length {}, expected {}",
                key.len(),
                self.key_len()
            )));
        }
        if iv.len() != self.block_len() {
            return Err(Error::Crypto(format!(
                "bad IV length {}, expected {}",
                iv.len(),
                self.block_len()
            )));
        }
        Ok(())
    }
}

/// Integrity algorithm negotiated for SK payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegAlgorithm {
    /// AUTH_HMAC_MD5_96
    HmacMd5_96,
    /// AUTH_HMAC_SHA1_96
    HmacSha1_96,
}

impl IntegAlgorithm {
    /// Map a negotiated INTEG transform to an algorithm
    pub fn from_transform_id(id: u16) -> Option<Self> {
        match id {
            transform_id::AUTH_HMAC_MD5_96 => Some(IntegAlgorithm::HmacMd5_96),
            transform_id::AUTH_HMAC_SHA1_96 => Some(IntegAlgorithm::HmacSha1_96),
            _ => None,
        }
    }

    /// Key length in bytes
    pub fn key_len(self) -> usize {
        match self {
            IntegAlgorithm::HmacMd5_96 => 16,
            IntegAlgorithm::HmacSha1_96 => 20,
        }
    }

    /// Truncated checksum length
    pub fn checksum_len(self) -> usize {
        CHECKSUM_LEN
    }

    /// Compute the truncated MAC over `data`
    pub fn compute(self, key: &[u8], data: &[u8]) -> Vec<u8> {
        let mut full = match self {
            IntegAlgorithm::HmacMd5_96 => {
                let mut mac =
                    Hmac::<Md5>::new_from_slice(key).expect("HMAC accepts any key size");
                mac.update(data);
                mac.finalize().into_bytes().to_vec()
            }
            IntegAlgorithm::HmacSha1_96 => {
                let mut mac =
                    Hmac::<Sha1>::new_from_slice(key).expect("HMAC accepts any key size");
                mac.update(data);
                mac.finalize().into_bytes().to_vec()
            }
        };
        full.truncate(CHECKSUM_LEN);
        full
    }

    /// Constant-time checksum verification
    pub fn verify(self, key: &[u8], data: &[u8], checksum: &[u8]) -> bool {
        if checksum.len() != CHECKSUM_LEN {
            return false;
        }
        let expected = self.compute(key, data);
        expected.ct_eq(checksum).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encr_from_transform() {
        assert_eq!(
            EncrAlgorithm::from_transform(&Transform::encr_aes_cbc(256)),
            Some(EncrAlgorithm::AesCbc256)
        );
        assert_eq!(
            EncrAlgorithm::from_transform(&Transform::encr_aes_cbc(512)),
            None
        );
        assert_eq!(
            EncrAlgorithm::from_transform(&Transform::new(
                TransformType::Encr,
                transform_id::ENCR_3DES
            )),
            None
        );
    }

    #[test]
    fn test_cbc_roundtrip_all_key_sizes() {
        let iv = [0x42u8; 16];
        let plaintext = [0x5au8; 48];
        for alg in [
            EncrAlgorithm::AesCbc128,
            EncrAlgorithm::AesCbc192,
            EncrAlgorithm::AesCbc256,
        ] {
            let key = vec![0x17u8; alg.key_len()];
            let ct = alg.encrypt(&key, &iv, &plaintext).unwrap();
            assert_eq!(ct.len(), plaintext.len());
            assert_ne!(&ct[..], &plaintext[..]);
            let pt = alg.decrypt(&key, &iv, &ct).unwrap();
            assert_eq!(&pt[..], &plaintext[..]);
        }
    }

    #[test]
    fn test_cbc_rejects_unaligned() {
        let alg = EncrAlgorithm::AesCbc128;
        let key = [0u8; 16];
        let iv = [0u8; 16];
        assert!(alg.encrypt(&key, &iv, &[0u8; 15]).is_err());
        assert!(alg.decrypt(&key, &iv, &[0u8; 17]).is_err());
    }

    #[test]
    fn test_cbc_rejects_bad_key() {
        let alg = EncrAlgorithm::AesCbc256;
        assert!(alg.encrypt(&[0u8; 16], &[0u8; 16], &[0u8; 16]).is_err());
    }

    #[test]
    fn test_integ_compute_and_verify() {
        let key = [0x0bu8; 20];
        for alg in [IntegAlgorithm::HmacMd5_96, IntegAlgorithm::HmacSha1_96] {
            let sum = alg.compute(&key, b"some authenticated bytes");
            assert_eq!(sum.len(), CHECKSUM_LEN);
            assert!(alg.verify(&key, b"some authenticated bytes", &sum));
            assert!(!alg.verify(&key, b"some tampered bytes", &sum));
        }
    }

    #[test]
    fn test_integ_verify_rejects_wrong_length() {
        let alg = IntegAlgorithm::HmacSha1_96;
        let sum = alg.compute(&[0u8; 20], b"data");
        assert!(!alg.verify(&[0u8; 20], b"data", &sum[..8]));
    }

    #[test]
    fn test_integ_sha1_96_is_truncated_sha1() {
        let key = [0x0bu8; 20];
        let full = PrfTruncationCheck::hmac_sha1(&key, b"Hi There");
        let trunc = IntegAlgorithm::HmacSha1_96.compute(&key, b"Hi There");
        assert_eq!(&full[..12], &trunc[..]);
    }

    struct PrfTruncationCheck;

    impl PrfTruncationCheck {
        fn hmac_sha1(key: &[u8], data: &[u8]) -> Vec<u8> {
            let mut mac = Hmac::<Sha1>::new_from_slice(key).unwrap();
            mac.update(data);
            mac.finalize().into_bytes().to_vec()
        }
    }
}
