//! Cryptographic primitives for the IKE responder
//!
//! Covers the negotiated transform set: AES-CBC for SK payloads,
//! HMAC-MD5/SHA1 PRFs and truncated-96 integrity, MODP Diffie-Hellman
//! groups 2 and 14, and RSA-PKCS1-v1_5 responder signatures. Key material
//! is zeroized on drop. All randomness flows through [`RandomSource`] so
//! exchanges can be reproduced bit-for-bit in tests.

pub mod cipher;
pub mod dh;
pub mod prf;
pub mod random;
pub mod sign;

pub use cipher::{EncrAlgorithm, IntegAlgorithm};
pub use dh::{DhGroup, DhKeyExchange};
pub use prf::{ChildSaKeys, IkeSaKeys, PrfAlgorithm};
pub use random::{OsRandom, RandomSource, ScriptedRandom};
