//! Shared SA stores and allocators
//!
//! Three keyed maps back the responder: IKE SAs by local SPI, inbound ESP
//! SPIs by owner, and the local-SPI to RAN-NGAP-id mapping the NGAP
//! subsystem addresses us by. Each IKE SA sits behind its own async mutex
//! so handlers serialize per SA while distinct SAs progress concurrently;
//! the outer maps use short plain locks that are never held across awaits.

use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, RwLock};

use tokio::sync::Mutex as AsyncMutex;

use super::crypto::RandomSource;
use super::sa::IkeSa;
use super::{Error, Result};

/// Live IKE SAs keyed by local SPI
#[derive(Default)]
pub struct IkeSaStore {
    sas: RwLock<HashMap<u64, Arc<AsyncMutex<IkeSa>>>>,
}

impl IkeSaStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Draw a random local SPI unused by any live SA
    pub fn allocate_spi(&self, rng: &dyn RandomSource) -> u64 {
        let sas = self.sas.read().expect("sa store lock");
        loop {
            let spi = rng.next_u64();
            if spi != 0 && !sas.contains_key(&spi) {
                return spi;
            }
        }
    }

    /// Insert a freshly created SA
    pub fn insert(&self, sa: IkeSa) -> Arc<AsyncMutex<IkeSa>> {
        let spi = sa.local_spi;
        let handle = Arc::new(AsyncMutex::new(sa));
        self.sas
            .write()
            .expect("sa store lock")
            .insert(spi, handle.clone());
        handle
    }

    /// Look up an SA by local SPI
    pub fn get(&self, local_spi: u64) -> Option<Arc<AsyncMutex<IkeSa>>> {
        self.sas.read().expect("sa store lock").get(&local_spi).cloned()
    }

    /// Remove an SA, returning its handle when it existed
    pub fn remove(&self, local_spi: u64) -> Option<Arc<AsyncMutex<IkeSa>>> {
        self.sas.write().expect("sa store lock").remove(&local_spi)
    }

    /// Whether an SA is still live
    pub fn contains(&self, local_spi: u64) -> bool {
        self.sas.read().expect("sa store lock").contains_key(&local_spi)
    }
}

/// Allocated inbound ESP SPIs, each mapped to the owning IKE SA
#[derive(Default)]
pub struct ChildSpiIndex {
    spis: RwLock<HashMap<u32, u64>>,
}

impl ChildSpiIndex {
    /// Empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Draw a random inbound SPI unused across all live Child SAs
    pub fn allocate(&self, rng: &dyn RandomSource, owner_local_spi: u64) -> u32 {
        let mut spis = self.spis.write().expect("child spi lock");
        loop {
            let spi = rng.next_u32();
            if spi != 0 && !spis.contains_key(&spi) {
                spis.insert(spi, owner_local_spi);
                return spi;
            }
        }
    }

    /// Whether an inbound SPI is currently allocated
    pub fn contains(&self, spi: u32) -> bool {
        self.spis.read().expect("child spi lock").contains_key(&spi)
    }

    /// Owner of an inbound SPI
    pub fn owner(&self, spi: u32) -> Option<u64> {
        self.spis.read().expect("child spi lock").get(&spi).copied()
    }

    /// Release one inbound SPI
    pub fn release(&self, spi: u32) {
        self.spis.write().expect("child spi lock").remove(&spi);
    }

    /// Release every SPI owned by one IKE SA
    pub fn release_owner(&self, owner_local_spi: u64) {
        self.spis
            .write()
            .expect("child spi lock")
            .retain(|_, owner| *owner != owner_local_spi);
    }
}

/// Local SPI to RAN NGAP id mapping
///
/// Append-only for a given SA's lifetime; removed with the SA.
#[derive(Default)]
pub struct NgapIdMap {
    map: RwLock<HashMap<u64, i64>>,
}

impl NgapIdMap {
    /// Empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a local SPI to its RAN NGAP id
    pub fn bind(&self, local_spi: u64, ran_ngap_id: i64) {
        self.map.write().expect("ngap id lock").insert(local_spi, ran_ngap_id);
    }

    /// RAN NGAP id for a local SPI
    pub fn get(&self, local_spi: u64) -> Option<i64> {
        self.map.read().expect("ngap id lock").get(&local_spi).copied()
    }

    /// Drop the mapping together with its SA
    pub fn remove(&self, local_spi: u64) {
        self.map.write().expect("ngap id lock").remove(&local_spi);
    }
}

/// Inner IPv4 allocator for UE addresses
///
/// Hands out host addresses from the IPsec subnet, skipping the network
/// and broadcast addresses and the gateway itself.
pub struct IpPool {
    network: u32,
    prefix: u8,
    gateway: Ipv4Addr,
    state: Mutex<IpPoolState>,
}

struct IpPoolState {
    next_offset: u32,
    allocated: HashSet<Ipv4Addr>,
}

impl IpPool {
    /// Pool over `subnet/prefix` with the gateway excluded
    pub fn new(subnet: Ipv4Addr, prefix: u8, gateway: Ipv4Addr) -> Result<Self> {
        if prefix >= 31 {
            return Err(Error::InvalidConfig(format!(
                "IPsec subnet /{} leaves no assignable UE addresses",
                prefix
            )));
        }
        let mask = u32::MAX << (32 - prefix);
        Ok(IpPool {
            network: u32::from(subnet) & mask,
            prefix,
            gateway,
            state: Mutex::new(IpPoolState {
                next_offset: 1,
                allocated: HashSet::new(),
            }),
        })
    }

    /// Netmask of the pool's subnet
    pub fn netmask(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::MAX << (32 - self.prefix))
    }

    /// Allocate one address
    pub fn allocate(&self) -> Result<Ipv4Addr> {
        let host_count = (1u32 << (32 - self.prefix)) - 2;
        let mut state = self.state.lock().expect("ip pool lock");

        for _ in 0..host_count {
            let offset = state.next_offset;
            state.next_offset = offset % host_count + 1;

            let addr = Ipv4Addr::from(self.network + offset);
            if addr != self.gateway && !state.allocated.contains(&addr) {
                state.allocated.insert(addr);
                return Ok(addr);
            }
        }
        Err(Error::IpPoolExhausted)
    }

    /// Return an address to the pool
    pub fn release(&self, addr: Ipv4Addr) {
        self.state.lock().expect("ip pool lock").allocated.remove(&addr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ike::crypto::{OsRandom, ScriptedRandom};
    use crate::ike::crypto::{IkeSaKeys, PrfAlgorithm};
    use crate::ike::nat::NatFlags;
    use crate::ike::proposal::Proposal;
    use crate::ike::sa::IkeSaCrypto;

    fn sample_sa(local_spi: u64) -> IkeSa {
        let crypto = IkeSaCrypto {
            encr: crate::ike::crypto::EncrAlgorithm::AesCbc256,
            integ: crate::ike::crypto::IntegAlgorithm::HmacSha1_96,
            prf: PrfAlgorithm::HmacSha1,
            dh_group: crate::ike::crypto::DhGroup::Modp2048,
        };
        let keys = IkeSaKeys::derive(PrfAlgorithm::HmacSha1, &[1; 64], &[2; 256], 1, 2, 32, 20);
        IkeSa::new(
            local_spi,
            0xfeed,
            crypto,
            Proposal::new(1, crate::ike::constants::ProtocolId::Ike),
            vec![0; 64],
            keys,
            0,
            NatFlags::default(),
        )
    }

    #[test]
    fn test_ike_sa_store_lifecycle() {
        let store = IkeSaStore::new();
        let spi = store.allocate_spi(&OsRandom);
        assert_ne!(spi, 0);

        store.insert(sample_sa(spi));
        assert!(store.contains(spi));
        assert!(store.get(spi).is_some());

        assert!(store.remove(spi).is_some());
        assert!(!store.contains(spi));
        assert!(store.get(spi).is_none());
    }

    #[test]
    fn test_child_spi_collision_retry() {
        let index = ChildSpiIndex::new();
        // Script yields the same SPI twice, then a different one
        let rng = ScriptedRandom::new(vec![
            0xaa, 0xaa, 0xaa, 0xaa, // first draw
            0xaa, 0xaa, 0xaa, 0xaa, // collides
            0xbb, 0xbb, 0xbb, 0xbb, // next free
        ]);

        let first = index.allocate(&rng, 1);
        assert_eq!(first, 0xaaaaaaaa);
        let second = index.allocate(&rng, 2);
        assert_eq!(second, 0xbbbbbbbb);

        assert_eq!(index.owner(first), Some(1));
        index.release_owner(1);
        assert!(!index.contains(first));
        assert!(index.contains(second));
    }

    #[test]
    fn test_ngap_id_map() {
        let map = NgapIdMap::new();
        map.bind(0x1234, 77);
        assert_eq!(map.get(0x1234), Some(77));
        map.remove(0x1234);
        assert_eq!(map.get(0x1234), None);
    }

    #[test]
    fn test_ip_pool_skips_gateway() {
        let pool = IpPool::new(
            Ipv4Addr::new(10, 0, 0, 0),
            24,
            Ipv4Addr::new(10, 0, 0, 1),
        )
        .unwrap();
        assert_eq!(pool.netmask(), Ipv4Addr::new(255, 255, 255, 0));

        let first = pool.allocate().unwrap();
        assert_eq!(first, Ipv4Addr::new(10, 0, 0, 2));
        let second = pool.allocate().unwrap();
        assert_ne!(second, first);
    }

    #[test]
    fn test_ip_pool_release_and_reuse() {
        let pool = IpPool::new(
            Ipv4Addr::new(10, 0, 0, 0),
            30,
            Ipv4Addr::new(10, 0, 0, 1),
        )
        .unwrap();

        // /30 has two hosts; one is the gateway
        let only = pool.allocate().unwrap();
        assert_eq!(only, Ipv4Addr::new(10, 0, 0, 2));
        assert!(matches!(pool.allocate(), Err(Error::IpPoolExhausted)));

        pool.release(only);
        assert_eq!(pool.allocate().unwrap(), only);
    }

    #[test]
    fn test_ip_pool_rejects_tiny_subnet() {
        let result = IpPool::new(Ipv4Addr::new(10, 0, 0, 0), 31, Ipv4Addr::new(10, 0, 0, 1));
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }
}
