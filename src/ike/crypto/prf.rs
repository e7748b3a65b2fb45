//! PRFs and the IKEv2 key schedule (RFC 7296 Sections 2.13 / 2.14 / 2.17)
//!
//! The negotiated PRFs are HMAC-MD5 and HMAC-SHA1. `prf+` is the standard
//! iterated expansion:
//!
//! ```text
//! prf+ (K,S) = T1 | T2 | T3 | ...
//!
//! T1 = prf (K, S | 0x01)
//! Ti = prf (K, T(i-1) | S | i)
//! ```
//!
//! Key derivation:
//!
//! ```text
//! SKEYSEED = prf(Ni | Nr, g^ir)
//! {SK_d | SK_ai | SK_ar | SK_ei | SK_er | SK_pi | SK_pr}
//!     = prf+ (SKEYSEED, Ni | Nr | SPIi | SPIr)
//! KEYMAT (Child SA) = prf+ (SK_d, Ni | Nr)
//! ```

use hmac::{Hmac, Mac};
use md5::Md5;
use sha1::Sha1;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::ike::proposal::transform_id;

/// PRF algorithm negotiated for the IKE SA
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrfAlgorithm {
    /// PRF_HMAC_MD5
    HmacMd5,
    /// PRF_HMAC_SHA1
    HmacSha1,
}

impl PrfAlgorithm {
    /// Map the transform ID to a supported PRF
    pub fn from_transform_id(id: u16) -> Option<Self> {
        match id {
            transform_id::PRF_HMAC_MD5 => Some(PrfAlgorithm::HmacMd5),
            transform_id::PRF_HMAC_SHA1 => Some(PrfAlgorithm::HmacSha1),
            _ => None,
        }
    }

    /// PRF output length in bytes
    pub fn output_len(self) -> usize {
        match self {
            PrfAlgorithm::HmacMd5 => 16,
            PrfAlgorithm::HmacSha1 => 20,
        }
    }

    /// Preferred key length (equals the output length for HMAC PRFs)
    pub fn key_len(self) -> usize {
        self.output_len()
    }

    /// Compute prf(key, data)
    pub fn compute(self, key: &[u8], data: &[u8]) -> Vec<u8> {
        match self {
            PrfAlgorithm::HmacMd5 => {
                let mut mac =
                    Hmac::<Md5>::new_from_slice(key).expect("HMAC accepts any key size");
                mac.update(data);
                mac.finalize().into_bytes().to_vec()
            }
            PrfAlgorithm::HmacSha1 => {
                let mut mac =
                    Hmac::<Sha1>::new_from_slice(key).expect("HMAC accepts any key size");
                mac.update(data);
                mac.finalize().into_bytes().to_vec()
            }
        }
    }

    /// Compute prf+(key, seed) expanded to `output_len` bytes
    pub fn prf_plus(self, key: &[u8], seed: &[u8], output_len: usize) -> Vec<u8> {
        let mut output = Vec::with_capacity(output_len);
        let mut t: Vec<u8> = Vec::new();
        let mut counter: u8 = 1;

        while output.len() < output_len {
            let mut input = Vec::with_capacity(t.len() + seed.len() + 1);
            input.extend_from_slice(&t);
            input.extend_from_slice(seed);
            input.push(counter);

            t = self.compute(key, &input);
            output.extend_from_slice(&t);
            counter += 1;
        }

        output.truncate(output_len);
        output
    }
}

/// The seven keys derived at IKE_SA_INIT
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct IkeSaKeys {
    /// SK_d, seed for Child SA keying material
    pub sk_d: Vec<u8>,
    /// SK_ai, initiator integrity key
    pub sk_ai: Vec<u8>,
    /// SK_ar, responder integrity key
    pub sk_ar: Vec<u8>,
    /// SK_ei, initiator encryption key
    pub sk_ei: Vec<u8>,
    /// SK_er, responder encryption key
    pub sk_er: Vec<u8>,
    /// SK_pi, initiator AUTH key
    pub sk_pi: Vec<u8>,
    /// SK_pr, responder AUTH key
    pub sk_pr: Vec<u8>,
}

impl std::fmt::Debug for IkeSaKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Key material stays out of logs
        f.debug_struct("IkeSaKeys").finish_non_exhaustive()
    }
}

impl IkeSaKeys {
    /// Derive all IKE SA keys
    ///
    /// `concatenated_nonce` is Ni | Nr exactly as exchanged; the slice
    /// lengths follow the negotiated transforms.
    pub fn derive(
        prf: PrfAlgorithm,
        concatenated_nonce: &[u8],
        shared_secret: &[u8],
        initiator_spi: u64,
        responder_spi: u64,
        encr_key_len: usize,
        integ_key_len: usize,
    ) -> Self {
        let skeyseed = prf.compute(concatenated_nonce, shared_secret);

        let mut seed = Vec::with_capacity(concatenated_nonce.len() + 16);
        seed.extend_from_slice(concatenated_nonce);
        seed.extend_from_slice(&initiator_spi.to_be_bytes());
        seed.extend_from_slice(&responder_spi.to_be_bytes());

        let prf_len = prf.output_len();
        let total = prf_len + 2 * integ_key_len + 2 * encr_key_len + 2 * prf_len;
        let keymat = prf.prf_plus(&skeyseed, &seed, total);

        let mut offset = 0;
        let mut take = |len: usize| {
            let slice = keymat[offset..offset + len].to_vec();
            offset += len;
            slice
        };

        IkeSaKeys {
            sk_d: take(prf_len),
            sk_ai: take(integ_key_len),
            sk_ar: take(integ_key_len),
            sk_ei: take(encr_key_len),
            sk_er: take(encr_key_len),
            sk_pi: take(prf_len),
            sk_pr: take(prf_len),
        }
    }
}

/// Directional keys for one ESP Child SA
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ChildSaKeys {
    /// Initiator-to-responder encryption key
    pub encr_init: Vec<u8>,
    /// Initiator-to-responder integrity key
    pub auth_init: Vec<u8>,
    /// Responder-to-initiator encryption key
    pub encr_resp: Vec<u8>,
    /// Responder-to-initiator integrity key
    pub auth_resp: Vec<u8>,
}

impl std::fmt::Debug for ChildSaKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChildSaKeys").finish_non_exhaustive()
    }
}

impl ChildSaKeys {
    /// Derive Child SA keying material from SK_d
    ///
    /// `concatenated_nonce` is the Ni | Nr pair in effect for this exchange:
    /// the IKE_SA_INIT nonces for the first Child SA, fresh nonces for a
    /// CREATE_CHILD_SA.
    pub fn derive(
        prf: PrfAlgorithm,
        sk_d: &[u8],
        concatenated_nonce: &[u8],
        encr_key_len: usize,
        integ_key_len: usize,
    ) -> Self {
        let total = 2 * encr_key_len + 2 * integ_key_len;
        let keymat = prf.prf_plus(sk_d, concatenated_nonce, total);

        let mut offset = 0;
        let mut take = |len: usize| {
            let slice = keymat[offset..offset + len].to_vec();
            offset += len;
            slice
        };

        ChildSaKeys {
            encr_init: take(encr_key_len),
            auth_init: take(integ_key_len),
            encr_resp: take(encr_key_len),
            auth_resp: take(integ_key_len),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prf_output_lengths() {
        assert_eq!(PrfAlgorithm::HmacMd5.output_len(), 16);
        assert_eq!(PrfAlgorithm::HmacSha1.output_len(), 20);
    }

    #[test]
    fn test_prf_from_transform_id() {
        assert_eq!(PrfAlgorithm::from_transform_id(1), Some(PrfAlgorithm::HmacMd5));
        assert_eq!(PrfAlgorithm::from_transform_id(2), Some(PrfAlgorithm::HmacSha1));
        assert_eq!(PrfAlgorithm::from_transform_id(5), None);
    }

    #[test]
    fn test_prf_hmac_sha1_rfc2202_vector() {
        // RFC 2202 test case 1
        let key = [0x0b; 20];
        let out = PrfAlgorithm::HmacSha1.compute(&key, b"Hi There");
        assert_eq!(
            hex::encode(out),
            "b617318655057264e28bc0b6fb378c8ef146be00"
        );
    }

    #[test]
    fn test_prf_hmac_md5_rfc2202_vector() {
        // RFC 2202 test case 2
        let out = PrfAlgorithm::HmacMd5.compute(b"Jefe", b"what do ya want for nothing?");
        assert_eq!(hex::encode(out), "750c783e6ab0b503eaa86e310a5db738");
    }

    #[test]
    fn test_prf_plus_structure() {
        let key = b"secret key";
        let seed = b"seed";

        // First block is prf(K, S | 0x01)
        let mut input = seed.to_vec();
        input.push(0x01);
        let t1 = PrfAlgorithm::HmacSha1.compute(key, &input);

        let out = PrfAlgorithm::HmacSha1.prf_plus(key, seed, 48);
        assert_eq!(out.len(), 48);
        assert_eq!(&out[..20], &t1[..]);

        // Second block is prf(K, T1 | S | 0x02)
        let mut input = t1.clone();
        input.extend_from_slice(seed);
        input.push(0x02);
        let t2 = PrfAlgorithm::HmacSha1.compute(key, &input);
        assert_eq!(&out[20..40], &t2[..]);
    }

    #[test]
    fn test_prf_plus_prefix_stability() {
        let short = PrfAlgorithm::HmacSha1.prf_plus(b"k", b"s", 16);
        let long = PrfAlgorithm::HmacSha1.prf_plus(b"k", b"s", 64);
        assert_eq!(&short[..], &long[..16]);
    }

    #[test]
    fn test_ike_sa_key_lengths() {
        let nonce = [0x01u8; 64];
        let secret = [0x02u8; 256];
        let keys = IkeSaKeys::derive(PrfAlgorithm::HmacSha1, &nonce, &secret, 1, 2, 32, 20);

        assert_eq!(keys.sk_d.len(), 20);
        assert_eq!(keys.sk_ai.len(), 20);
        assert_eq!(keys.sk_ar.len(), 20);
        assert_eq!(keys.sk_ei.len(), 32);
        assert_eq!(keys.sk_er.len(), 32);
        assert_eq!(keys.sk_pi.len(), 20);
        assert_eq!(keys.sk_pr.len(), 20);

        assert_ne!(keys.sk_ei, keys.sk_er);
        assert_ne!(keys.sk_ai, keys.sk_ar);
    }

    #[test]
    fn test_ike_sa_keys_match_manual_expansion() {
        let nonce = [0x5au8; 48];
        let secret = [0x3cu8; 128];
        let prf = PrfAlgorithm::HmacSha1;

        let keys = IkeSaKeys::derive(prf, &nonce, &secret, 0x1111, 0x2222, 16, 20);

        let skeyseed = prf.compute(&nonce, &secret);
        let mut seed = nonce.to_vec();
        seed.extend_from_slice(&0x1111u64.to_be_bytes());
        seed.extend_from_slice(&0x2222u64.to_be_bytes());
        let keymat = prf.prf_plus(&skeyseed, &seed, 20 + 2 * 20 + 2 * 16 + 2 * 20);

        assert_eq!(keys.sk_d, &keymat[..20]);
        assert_eq!(keys.sk_ei, &keymat[60..76]);
        assert_eq!(keys.sk_pr, &keymat[112..132]);
    }

    #[test]
    fn test_child_sa_key_derivation() {
        let sk_d = [0x11u8; 20];
        let nonce = [0x22u8; 64];
        let keys = ChildSaKeys::derive(PrfAlgorithm::HmacSha1, &sk_d, &nonce, 32, 20);

        assert_eq!(keys.encr_init.len(), 32);
        assert_eq!(keys.auth_init.len(), 20);
        assert_eq!(keys.encr_resp.len(), 32);
        assert_eq!(keys.auth_resp.len(), 20);

        let keymat = PrfAlgorithm::HmacSha1.prf_plus(&sk_d, &nonce, 104);
        assert_eq!(keys.encr_init, &keymat[..32]);
        assert_eq!(keys.auth_resp, &keymat[84..104]);
    }

    #[test]
    fn test_child_sa_keys_no_integrity() {
        let keys = ChildSaKeys::derive(PrfAlgorithm::HmacSha1, &[0x11; 20], &[0x22; 32], 32, 0);
        assert!(keys.auth_init.is_empty());
        assert!(keys.auth_resp.is_empty());
    }
}
