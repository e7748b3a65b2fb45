//! Responder authentication signature
//!
//! The responder proves its identity with RSA-PKCS1-v1_5 over the SHA-1
//! digest of its signed octets; the UE in turn is verified through the
//! shared-key MIC construction in the handler, so only signing lives here.

use rsa::{Pkcs1v15Sign, RsaPrivateKey};
use sha1::{Digest, Sha1};

use crate::ike::{Error, Result};

/// Sign `data` with RSA-PKCS1-v1_5 over SHA-1
pub fn sign_pkcs1_sha1(key: &RsaPrivateKey, data: &[u8]) -> Result<Vec<u8>> {
    let digest = Sha1::digest(data);
    key.sign(Pkcs1v15Sign::new::<Sha1>(), &digest)
        .map_err(|e| Error::Crypto(format!("RSA signing failed: {}", e)))
}

/// SHA-1 digest helper for certification-authority comparison
pub fn sha1_digest(data: &[u8]) -> [u8; 20] {
    let mut out = [0u8; 20];
    out.copy_from_slice(&Sha1::digest(data));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs1v15::VerifyingKey;
    use rsa::signature::Verifier;
    use rsa::RsaPublicKey;

    fn test_key() -> RsaPrivateKey {
        let mut rng = rand::thread_rng();
        RsaPrivateKey::new(&mut rng, 1024).expect("generate RSA key")
    }

    #[test]
    fn test_sign_verifies_against_public_key() {
        let key = test_key();
        let public = RsaPublicKey::from(&key);

        let signature = sign_pkcs1_sha1(&key, b"responder signed octets").unwrap();

        let verifying: VerifyingKey<Sha1> = VerifyingKey::new(public);
        let sig = rsa::pkcs1v15::Signature::try_from(signature.as_slice()).unwrap();
        assert!(verifying.verify(b"responder signed octets", &sig).is_ok());
    }

    #[test]
    fn test_signature_depends_on_data() {
        let key = test_key();
        let a = sign_pkcs1_sha1(&key, b"octets A").unwrap();
        let b = sign_pkcs1_sha1(&key, b"octets B").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_sha1_digest_len() {
        assert_eq!(sha1_digest(b"ca certificate der").len(), 20);
    }
}
