//! MODP Diffie-Hellman groups 2 and 14 (RFC 2409 / RFC 3526)
//!
//! Both groups use generator 2; exponentiation runs over `crypto-bigint`
//! constant-time residues. Public and shared values are fixed-width
//! big-endian, left-padded to the group size as the wire format requires.

use crypto_bigint::modular::constant_mod::{self, ResidueParams};
use crypto_bigint::{const_residue, impl_modulus, Encoding, U1024, U2048};
use zeroize::Zeroizing;

use super::random::RandomSource;
use crate::ike::proposal::transform_id;
use crate::ike::{Error, Result};

impl_modulus!(
    DhModulus1024,
    U1024,
    "FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD129024E088A67CC74020BBEA63B139B22514A08798E3404DDEF9519B3CD3A431B302B0A6DF25F14374FE1356D6D51C245E485B576625E7EC6F44C42E9A637ED6B0BFF5CB6F406B7EDEE386BFB5A899FA5AE9F24117C4B1FE649286651ECE65381FFFFFFFFFFFFFFFF"
);

impl_modulus!(
    DhModulus2048,
    U2048,
    "FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD129024E088A67CC74020BBEA63B139B22514A08798E3404DDEF9519B3CD3A431B302B0A6DF25F14374FE1356D6D51C245E485B576625E7EC6F44C42E9A637ED6B0BFF5CB6F406B7EDEE386BFB5A899FA5AE9F24117C4B1FE649286651ECE45B3DC2007CB8A163BF0598DA48361C55D39A69163FA8FD24CF5F83655D23DCA3AD961C62F356208552BB9ED529077096966D670C354E4ABC9804F1746C08CA18217C32905E462E36CE3BE39E772C180E86039B2783A2EC07A28FB5C55DF06F4C52C9DE2BCBF6955817183995497CEA956AE515D2261898FA051015728E5A8AACAA68FFFFFFFFFFFFFFFF"
);

const DH_GENERATOR_1024: U1024 = U1024::from_u8(2);
const DH_RESIDUE_1024: constant_mod::Residue<DhModulus1024, { U1024::LIMBS }> =
    const_residue!(DH_GENERATOR_1024, DhModulus1024);

const DH_GENERATOR_2048: U2048 = U2048::from_u8(2);
const DH_RESIDUE_2048: constant_mod::Residue<DhModulus2048, { U2048::LIMBS }> =
    const_residue!(DH_GENERATOR_2048, DhModulus2048);

/// Supported MODP groups
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DhGroup {
    /// Group 2, 1024-bit MODP
    Modp1024,
    /// Group 14, 2048-bit MODP
    Modp2048,
}

impl DhGroup {
    /// Map an IANA group number to a supported group
    pub fn from_group_number(group: u16) -> Option<Self> {
        match group {
            transform_id::DH_1024_MODP => Some(DhGroup::Modp1024),
            transform_id::DH_2048_MODP => Some(DhGroup::Modp2048),
            _ => None,
        }
    }

    /// IANA group number
    pub fn group_number(self) -> u16 {
        match self {
            DhGroup::Modp1024 => transform_id::DH_1024_MODP,
            DhGroup::Modp2048 => transform_id::DH_2048_MODP,
        }
    }

    /// Public value / shared secret length in bytes
    pub fn key_len(self) -> usize {
        match self {
            DhGroup::Modp1024 => 1024 / 8,
            DhGroup::Modp2048 => 2048 / 8,
        }
    }
}

/// An ephemeral DH key pair bound to one IKE SA
pub enum DhKeyExchange {
    /// Group 2 state
    Modp1024 {
        /// Private exponent
        private: Zeroizing<U1024>,
        /// g^x mod p
        public: U1024,
    },
    /// Group 14 state
    Modp2048 {
        /// Private exponent
        private: Zeroizing<U2048>,
        /// g^x mod p
        public: U2048,
    },
}

impl DhKeyExchange {
    /// Generate a fresh key pair for `group`
    pub fn generate(group: DhGroup, rng: &dyn RandomSource) -> Self {
        match group {
            DhGroup::Modp1024 => {
                let mut bytes = Zeroizing::new([0u8; 128]);
                rng.fill_bytes(bytes.as_mut());
                let private = Zeroizing::new(U1024::from_be_slice(bytes.as_ref()));
                let public = DH_RESIDUE_1024.pow(&private).retrieve();
                DhKeyExchange::Modp1024 { private, public }
            }
            DhGroup::Modp2048 => {
                let mut bytes = Zeroizing::new([0u8; 256]);
                rng.fill_bytes(bytes.as_mut());
                let private = Zeroizing::new(U2048::from_be_slice(bytes.as_ref()));
                let public = DH_RESIDUE_2048.pow(&private).retrieve();
                DhKeyExchange::Modp2048 { private, public }
            }
        }
    }

    /// Group of this key pair
    pub fn group(&self) -> DhGroup {
        match self {
            DhKeyExchange::Modp1024 { .. } => DhGroup::Modp1024,
            DhKeyExchange::Modp2048 { .. } => DhGroup::Modp2048,
        }
    }

    /// Public value, fixed-width big-endian
    pub fn public_value(&self) -> Vec<u8> {
        match self {
            DhKeyExchange::Modp1024 { public, .. } => public.to_be_bytes().to_vec(),
            DhKeyExchange::Modp2048 { public, .. } => public.to_be_bytes().to_vec(),
        }
    }

    /// Compute g^ir from the peer's public value
    ///
    /// The peer value must be exactly the group size; anything else is a
    /// malformed KE payload.
    pub fn compute_shared(&self, peer_public: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        if peer_public.len() != self.group().key_len() {
            return Err(Error::InvalidPayload(format!(
                "KE data length {} does not match group {}",
                peer_public.len(),
                self.group().group_number()
            )));
        }
        let shared = match self {
            DhKeyExchange::Modp1024 { private, .. } => {
                let peer = U1024::from_be_slice(peer_public);
                let residue = const_residue!(peer, DhModulus1024);
                residue.pow(private).retrieve().to_be_bytes().to_vec()
            }
            DhKeyExchange::Modp2048 { private, .. } => {
                let peer = U2048::from_be_slice(peer_public);
                let residue = const_residue!(peer, DhModulus2048);
                residue.pow(private).retrieve().to_be_bytes().to_vec()
            }
        };
        Ok(Zeroizing::new(shared))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ike::crypto::random::{OsRandom, ScriptedRandom};

    #[test]
    fn test_group_numbers() {
        assert_eq!(DhGroup::from_group_number(2), Some(DhGroup::Modp1024));
        assert_eq!(DhGroup::from_group_number(14), Some(DhGroup::Modp2048));
        assert_eq!(DhGroup::from_group_number(19), None);
        assert_eq!(DhGroup::Modp2048.key_len(), 256);
    }

    #[test]
    fn test_shared_secret_agreement_modp2048() {
        let rng = OsRandom;
        let a = DhKeyExchange::generate(DhGroup::Modp2048, &rng);
        let b = DhKeyExchange::generate(DhGroup::Modp2048, &rng);

        let ab = a.compute_shared(&b.public_value()).unwrap();
        let ba = b.compute_shared(&a.public_value()).unwrap();
        assert_eq!(*ab, *ba);
        assert_eq!(ab.len(), 256);
    }

    #[test]
    fn test_shared_secret_agreement_modp1024() {
        let rng = OsRandom;
        let a = DhKeyExchange::generate(DhGroup::Modp1024, &rng);
        let b = DhKeyExchange::generate(DhGroup::Modp1024, &rng);

        let ab = a.compute_shared(&b.public_value()).unwrap();
        let ba = b.compute_shared(&a.public_value()).unwrap();
        assert_eq!(*ab, *ba);
        assert_eq!(ab.len(), 128);
    }

    #[test]
    fn test_deterministic_with_scripted_rng() {
        let a1 = DhKeyExchange::generate(DhGroup::Modp2048, &ScriptedRandom::new(vec![7; 16]));
        let a2 = DhKeyExchange::generate(DhGroup::Modp2048, &ScriptedRandom::new(vec![7; 16]));
        assert_eq!(a1.public_value(), a2.public_value());
    }

    #[test]
    fn test_wrong_peer_length_rejected() {
        let a = DhKeyExchange::generate(DhGroup::Modp2048, &OsRandom);
        let result = a.compute_shared(&[0u8; 128]);
        assert!(matches!(result, Err(Error::InvalidPayload(_))));
    }
}
