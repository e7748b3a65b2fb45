//! NAT-T detection (RFC 3948, RFC 7296 Section 2.23)
//!
//! During IKE_SA_INIT both sides exchange NAT_DETECTION_SOURCE_IP and
//! NAT_DETECTION_DESTINATION_IP notifications carrying
//! `SHA-1(SPIi | SPIr | IP | Port)`. A received hash that differs from the
//! locally computed one means the corresponding address was rewritten in
//! flight:
//!
//! ```text
//! peer NAT_DETECTION_SOURCE_IP      ≠ sha1(SPIs | UE addr)    → UE is behind NAT
//! peer NAT_DETECTION_DESTINATION_IP ≠ sha1(SPIs | N3IWF addr) → N3IWF is behind NAT
//! ```
//!
//! When either flag ends up set, Child SAs are installed with UDP
//! encapsulation on port 4500.

use std::net::SocketAddrV4;

use sha1::{Digest, Sha1};

/// Compute a NAT detection hash: SHA-1 over SPIi | SPIr | IPv4 | port
pub fn detection_hash(initiator_spi: u64, responder_spi: u64, addr: SocketAddrV4) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hasher.update(initiator_spi.to_be_bytes());
    hasher.update(responder_spi.to_be_bytes());
    hasher.update(addr.ip().octets());
    hasher.update(addr.port().to_be_bytes());

    let mut out = [0u8; 20];
    out.copy_from_slice(&hasher.finalize());
    out
}

/// NAT presence flags for one IKE SA
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NatFlags {
    /// The UE's source address was rewritten on the way here
    pub ue_behind_nat: bool,

    /// Our address as seen by the UE differs from the configured one
    pub n3iwf_behind_nat: bool,
}

impl NatFlags {
    /// Whether Child SAs need UDP encapsulation
    pub fn encapsulation_needed(self) -> bool {
        self.ue_behind_nat || self.n3iwf_behind_nat
    }

    /// Account for one received NAT_DETECTION_SOURCE_IP notification
    ///
    /// SPIs are taken from the message header as received (responder SPI is
    /// still zero in the first request), matching what the peer hashed.
    pub fn observe_source_hash(
        &mut self,
        initiator_spi: u64,
        responder_spi: u64,
        ue_addr: SocketAddrV4,
        received: &[u8],
    ) {
        let local = detection_hash(initiator_spi, responder_spi, ue_addr);
        if received != local {
            self.ue_behind_nat = true;
        }
    }

    /// Account for one received NAT_DETECTION_DESTINATION_IP notification
    pub fn observe_destination_hash(
        &mut self,
        initiator_spi: u64,
        responder_spi: u64,
        n3iwf_addr: SocketAddrV4,
        received: &[u8],
    ) {
        let local = detection_hash(initiator_spi, responder_spi, n3iwf_addr);
        if received != local {
            self.n3iwf_behind_nat = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn addr(d: u8, port: u16) -> SocketAddrV4 {
        SocketAddrV4::new(Ipv4Addr::new(192, 0, 2, d), port)
    }

    #[test]
    fn test_detection_hash_is_deterministic() {
        let a = detection_hash(0x1111, 0x2222, addr(1, 500));
        let b = detection_hash(0x1111, 0x2222, addr(1, 500));
        assert_eq!(a, b);
        assert_eq!(a.len(), 20);
    }

    #[test]
    fn test_detection_hash_covers_every_input() {
        let base = detection_hash(0x1111, 0x2222, addr(1, 500));
        assert_ne!(base, detection_hash(0x1112, 0x2222, addr(1, 500)));
        assert_ne!(base, detection_hash(0x1111, 0x2223, addr(1, 500)));
        assert_ne!(base, detection_hash(0x1111, 0x2222, addr(2, 500)));
        assert_ne!(base, detection_hash(0x1111, 0x2222, addr(1, 4500)));
    }

    #[test]
    fn test_matching_hashes_leave_flags_clear() {
        let ue = addr(7, 500);
        let mut flags = NatFlags::default();
        let received = detection_hash(0xaaaa, 0, ue);
        flags.observe_source_hash(0xaaaa, 0, ue, &received);
        assert!(!flags.ue_behind_nat);
        assert!(!flags.encapsulation_needed());
    }

    #[test]
    fn test_mismatched_source_hash_sets_ue_flag() {
        // The UE hashed its private address; we hash the NATed one we saw.
        let mut flags = NatFlags::default();
        let behind_nat = detection_hash(0xaaaa, 0, addr(50, 4500));
        flags.observe_source_hash(0xaaaa, 0, addr(7, 500), &behind_nat);
        assert!(flags.ue_behind_nat);
        assert!(!flags.n3iwf_behind_nat);
        assert!(flags.encapsulation_needed());
    }

    #[test]
    fn test_mismatched_destination_hash_sets_n3iwf_flag() {
        let mut flags = NatFlags::default();
        let other = detection_hash(0xaaaa, 0, addr(60, 500));
        flags.observe_destination_hash(0xaaaa, 0, addr(8, 500), &other);
        assert!(flags.n3iwf_behind_nat);
    }
}
