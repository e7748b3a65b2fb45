//! Kernel XFRM binder
//!
//! The kernel IPsec subsystem is a collaborator, not part of this crate:
//! [`XfrmDriver`] is the seam a netlink-backed implementation plugs into,
//! and everything above it only describes *what* to install. A completed
//! Child SA turns into a matched pair of policy and state entries on a
//! virtual XFRM interface; NAT-T encapsulation ports are honoured only when
//! NAT was detected during IKE_SA_INIT.
//!
//! Interface layout follows the deployment profile: the signalling Child SA
//! rides the default interface, every PDU session past the first gets its
//! own interface with id `base + offset` to keep SPD entries apart.

use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};

use tracing::debug;

use super::sa::ChildSa;
use super::Result;

/// Which side initiated the exchange that produced the Child SA
///
/// Decides how the directional keys map onto inbound/outbound kernel state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeRole {
    /// The N3IWF initiated (CREATE_CHILD_SA for a PDU session)
    Initiator,
    /// The UE initiated (IKE_AUTH signalling SA)
    Responder,
}

/// Driver seam towards the kernel
pub trait XfrmDriver: Send + Sync {
    /// Install the inbound/outbound policy and state pair for a Child SA
    fn apply(&self, role: ExchangeRole, iface_id: u32, child: &ChildSa) -> Result<()>;

    /// Remove the policy and state pair of a Child SA
    fn remove(&self, child: &ChildSa) -> Result<()>;

    /// Create a virtual XFRM interface
    fn setup_iface(
        &self,
        name: &str,
        parent: &str,
        iface_id: u32,
        addr: Ipv4Addr,
        prefix: u8,
    ) -> Result<()>;
}

/// Interface bookkeeping above the driver
pub struct XfrmManager {
    driver: Arc<dyn XfrmDriver>,
    iface_name: String,
    parent_iface: String,
    base_iface_id: u32,
    gateway: Ipv4Addr,
    prefix: u8,
    state: Mutex<IfaceState>,
}

struct IfaceState {
    ifaces: Vec<u32>,
    up_offset: u32,
}

impl XfrmManager {
    /// Build over a driver with the configured interface parameters
    pub fn new(
        driver: Arc<dyn XfrmDriver>,
        iface_name: String,
        parent_iface: String,
        base_iface_id: u32,
        gateway: Ipv4Addr,
        prefix: u8,
    ) -> Self {
        XfrmManager {
            driver,
            iface_name,
            parent_iface,
            base_iface_id,
            gateway,
            prefix,
            state: Mutex::new(IfaceState {
                ifaces: Vec::new(),
                up_offset: 0,
            }),
        }
    }

    /// Id of the default (signalling) interface
    pub fn default_iface_id(&self) -> u32 {
        self.base_iface_id
    }

    /// Create the default interface; idempotent
    pub fn ensure_default_iface(&self) -> Result<()> {
        let mut state = self.state.lock().expect("xfrm iface lock");
        if state.ifaces.contains(&self.base_iface_id) {
            return Ok(());
        }
        let name = self.iface_id_name(self.base_iface_id);
        self.driver.setup_iface(
            &name,
            &self.parent_iface,
            self.base_iface_id,
            self.gateway,
            self.prefix,
        )?;
        state.ifaces.push(self.base_iface_id);
        debug!(iface = %name, iface_id = self.base_iface_id, "default XFRM interface up");
        Ok(())
    }

    /// Allocate and create a fresh user-plane interface: id = base + offset
    pub fn allocate_up_iface(&self) -> Result<u32> {
        let mut state = self.state.lock().expect("xfrm iface lock");
        state.up_offset += 1;
        let iface_id = self.base_iface_id + state.up_offset;

        let name = self.iface_id_name(iface_id);
        self.driver.setup_iface(
            &name,
            &self.parent_iface,
            iface_id,
            self.gateway,
            self.prefix,
        )?;
        state.ifaces.push(iface_id);
        debug!(iface = %name, iface_id, "user-plane XFRM interface up");
        Ok(iface_id)
    }

    /// Whether an interface id is known
    pub fn iface_exists(&self, iface_id: u32) -> bool {
        self.state.lock().expect("xfrm iface lock").ifaces.contains(&iface_id)
    }

    /// Install kernel state for a Child SA on the given interface
    pub fn apply(&self, role: ExchangeRole, iface_id: u32, child: &ChildSa) -> Result<()> {
        debug!(
            iface_id,
            inbound_spi = format_args!("0x{:08x}", child.inbound_spi),
            outbound_spi = format_args!("0x{:08x}", child.outbound_spi),
            encapsulate = child.encapsulate,
            "installing Child SA into XFRM"
        );
        self.driver.apply(role, iface_id, child)
    }

    /// Remove kernel state for a Child SA
    pub fn remove(&self, child: &ChildSa) -> Result<()> {
        self.driver.remove(child)
    }

    fn iface_id_name(&self, iface_id: u32) -> String {
        format!("{}-{}", self.iface_name, iface_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ike::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingDriver {
        applies: AtomicUsize,
        setups: Mutex<Vec<(String, u32)>>,
        fail_apply: bool,
    }

    impl XfrmDriver for CountingDriver {
        fn apply(&self, _role: ExchangeRole, _iface_id: u32, _child: &ChildSa) -> Result<()> {
            if self.fail_apply {
                return Err(Error::Xfrm("injected".into()));
            }
            self.applies.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn remove(&self, _child: &ChildSa) -> Result<()> {
            Ok(())
        }

        fn setup_iface(
            &self,
            name: &str,
            _parent: &str,
            iface_id: u32,
            _addr: Ipv4Addr,
            _prefix: u8,
        ) -> Result<()> {
            self.setups
                .lock()
                .unwrap()
                .push((name.to_string(), iface_id));
            Ok(())
        }
    }

    fn manager(driver: Arc<CountingDriver>) -> XfrmManager {
        XfrmManager::new(
            driver,
            "ipsec".into(),
            "eth0".into(),
            7,
            Ipv4Addr::new(10, 0, 0, 1),
            24,
        )
    }

    #[test]
    fn test_default_iface_idempotent() {
        let driver = Arc::new(CountingDriver::default());
        let mgr = manager(driver.clone());

        mgr.ensure_default_iface().unwrap();
        mgr.ensure_default_iface().unwrap();

        let setups = driver.setups.lock().unwrap();
        assert_eq!(setups.len(), 1);
        assert_eq!(setups[0], ("ipsec-7".to_string(), 7));
        assert!(mgr.iface_exists(7));
    }

    #[test]
    fn test_up_iface_ids_increment_from_base() {
        let driver = Arc::new(CountingDriver::default());
        let mgr = manager(driver.clone());

        assert_eq!(mgr.allocate_up_iface().unwrap(), 8);
        assert_eq!(mgr.allocate_up_iface().unwrap(), 9);

        let setups = driver.setups.lock().unwrap();
        assert_eq!(setups[1].0, "ipsec-9");
    }

    #[test]
    fn test_apply_failure_surfaces() {
        let driver = Arc::new(CountingDriver {
            fail_apply: true,
            ..Default::default()
        });
        let mgr = manager(driver);
        let child = sample_child();
        assert!(matches!(
            mgr.apply(ExchangeRole::Responder, 7, &child),
            Err(Error::Xfrm(_))
        ));
    }

    fn sample_child() -> ChildSa {
        use crate::ike::proposal::Transform;
        use crate::ike::sa::SelectedIpProtocol;
        ChildSa {
            inbound_spi: 1,
            outbound_spi: 2,
            encr_transform: Transform::encr_aes_cbc(256),
            integ_transform: None,
            keys: None,
            ip_protocol: SelectedIpProtocol::Tcp,
            local_ts: Ipv4Addr::new(10, 0, 0, 1),
            remote_ts: Ipv4Addr::new(10, 0, 0, 2),
            peer_public_addr: Ipv4Addr::new(192, 0, 2, 1),
            local_public_addr: Ipv4Addr::new(198, 51, 100, 1),
            encapsulate: false,
            local_port: 0,
            nat_port: 0,
            xfrm_iface_id: 7,
            pdu_session_id: None,
        }
    }
}
