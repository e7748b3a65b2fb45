//! UDP receive loop and event dispatch
//!
//! The receive loop multiplexes datagrams from the IKE socket with events
//! from the NGAP subsystem. Each datagram is handed to a spawned worker
//! that owns the corresponding IKE SA for the duration of that message:
//! the per-SA mutex serializes handling within one SA while distinct SAs
//! progress concurrently, so one UE waiting on an NGAP round-trip or a
//! kernel XFRM call never stalls another UE's exchange. DPD tasks go
//! through the same per-SA locks.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;

use tokio::net::UdpSocket;
use tracing::{debug, error, info, warn};

use super::config::N3iwfConfig;
use super::constants::ExchangeType;
use super::crypto::RandomSource;
use super::event::{IkeEventRx, NgapEventTx};
use super::handler;
use super::message::IkeMessage;
use super::sa::UdpPath;
use super::store::{ChildSpiIndex, IkeSaStore, IpPool, NgapIdMap};
use super::xfrm::{XfrmDriver, XfrmManager};
use super::{Error, Result};

/// Shared state every handler works against
pub struct IkeContext {
    /// Responder configuration
    pub config: N3iwfConfig,

    /// Live IKE SAs
    pub ike_sas: IkeSaStore,

    /// Allocated inbound ESP SPIs
    pub child_spis: ChildSpiIndex,

    /// Local SPI to RAN NGAP id
    pub ngap_ids: NgapIdMap,

    /// Inner UE address pool
    pub ip_pool: IpPool,

    /// Kernel binder
    pub xfrm: XfrmManager,

    /// Channel towards the NGAP subsystem
    pub ngap_tx: NgapEventTx,

    /// Random source for every protocol-visible random value
    pub rng: Arc<dyn RandomSource>,

    /// The IKE UDP socket
    pub socket: Arc<UdpSocket>,
}

impl IkeContext {
    /// Send one datagram to a peer
    pub async fn send_to(&self, peer: SocketAddrV4, bytes: &[u8]) -> Result<()> {
        self.socket
            .send_to(bytes, SocketAddr::V4(peer))
            .await
            .map_err(|e| Error::Io(e.to_string()))?;
        Ok(())
    }

    /// Release every kernel and pool resource an SA holds
    ///
    /// Call with the SA lock held; store removal is the caller's move.
    pub fn cleanup_sa_resources(&self, sa: &mut super::sa::IkeSa) {
        if let Some(ue) = sa.ike_ue.as_mut() {
            for (_, child) in ue.child_sas.drain() {
                if let Err(err) = self.xfrm.remove(&child) {
                    warn!(error = %err, "failed to remove Child SA from XFRM");
                }
            }
            if let Some(inner_ip) = ue.inner_ip.take() {
                self.ip_pool.release(inner_ip);
            }
        }
        self.child_spis.release_owner(sa.local_spi);
    }

    /// Tear an SA down from outside a handler (DPD exhaustion)
    pub async fn release_ike_sa(&self, local_spi: u64) {
        if let Some(handle) = self.ike_sas.remove(local_spi) {
            let mut sa = handle.lock().await;
            self.cleanup_sa_resources(&mut sa);
        }
        self.ngap_ids.remove(local_spi);
    }
}

/// The IKE responder server
pub struct IkeServer {
    ctx: Arc<IkeContext>,
    event_rx: IkeEventRx,
}

impl IkeServer {
    /// Bind the IKE socket and assemble the shared context
    pub async fn bind(
        config: N3iwfConfig,
        ngap_tx: NgapEventTx,
        event_rx: IkeEventRx,
        xfrm_driver: Arc<dyn XfrmDriver>,
        rng: Arc<dyn RandomSource>,
    ) -> Result<Self> {
        config.validate()?;

        let socket = UdpSocket::bind(SocketAddr::V4(config.ike_bind_addr)).await?;
        let local_addr = match socket.local_addr()? {
            SocketAddr::V4(addr) => addr,
            SocketAddr::V6(addr) => {
                return Err(Error::InvalidConfig(format!(
                    "IKE socket bound to IPv6 address {}",
                    addr
                )))
            }
        };

        let ip_pool = IpPool::new(
            config.ipsec_subnet,
            config.ipsec_prefix,
            config.ipsec_gateway,
        )?;
        let xfrm = XfrmManager::new(
            xfrm_driver,
            config.xfrm_iface_name.clone(),
            config.xfrm_parent_iface.clone(),
            config.xfrm_iface_id,
            config.ipsec_gateway,
            config.ipsec_prefix,
        );
        xfrm.ensure_default_iface()?;

        // Rebind to the actual port so NAT hashes match what peers see
        let mut config = config;
        config.ike_bind_addr = local_addr;

        info!(bind = %local_addr, "IKE responder listening");

        Ok(IkeServer {
            ctx: Arc::new(IkeContext {
                config,
                ike_sas: IkeSaStore::new(),
                child_spis: ChildSpiIndex::new(),
                ngap_ids: NgapIdMap::new(),
                ip_pool,
                xfrm,
                ngap_tx,
                rng,
                socket: Arc::new(socket),
            }),
            event_rx,
        })
    }

    /// Shared context handle, for DPD tasks and tests
    pub fn context(&self) -> Arc<IkeContext> {
        self.ctx.clone()
    }

    /// Local socket address the server listens on
    pub fn local_addr(&self) -> SocketAddrV4 {
        self.ctx.config.ike_bind_addr
    }

    /// Run the receive and event loops until the event channel closes
    pub async fn run(mut self) -> Result<()> {
        let mut buf = vec![0u8; 65536];
        loop {
            tokio::select! {
                received = self.ctx.socket.recv_from(&mut buf) => {
                    let (len, peer) = received.map_err(|e| Error::Io(e.to_string()))?;
                    let peer = match peer {
                        SocketAddr::V4(peer) => peer,
                        SocketAddr::V6(peer) => {
                            debug!(%peer, "dropping datagram from IPv6 peer");
                            continue;
                        }
                    };
                    let path = UdpPath {
                        local: self.ctx.config.ike_bind_addr,
                        peer,
                    };
                    // One worker per datagram; the SA's own lock serializes
                    // handling so other SAs keep moving while this one waits.
                    let ctx = self.ctx.clone();
                    let datagram = buf[..len].to_vec();
                    tokio::spawn(async move {
                        dispatch_datagram(&ctx, path, &datagram).await;
                    });
                }
                event = self.event_rx.recv() => {
                    match event {
                        Some(event) => {
                            if let Err(err) = handler::handle_event(&self.ctx, event).await {
                                error!(error = %err, "IKE event handling failed");
                            }
                        }
                        None => {
                            info!("event channel closed, IKE server stopping");
                            return Ok(());
                        }
                    }
                }
            }
        }
    }
}

/// Decode one datagram and route it by exchange type
///
/// Parse failures drop the datagram without a response.
pub async fn dispatch_datagram(ctx: &Arc<IkeContext>, path: UdpPath, datagram: &[u8]) {
    let message = match IkeMessage::from_bytes(datagram) {
        Ok(message) => message,
        Err(err) => {
            debug!(peer = %path.peer, error = %err, "dropping unparseable datagram");
            return;
        }
    };

    let result = match message.header.exchange_type {
        ExchangeType::IkeSaInit => {
            handler::handle_ike_sa_init(ctx, path, &message, datagram).await
        }
        ExchangeType::IkeAuth => handler::handle_ike_auth(ctx, path, &message, datagram).await,
        ExchangeType::CreateChildSa => {
            handler::handle_create_child_sa(ctx, path, &message, datagram).await
        }
        ExchangeType::Informational => {
            handler::handle_informational(ctx, path, &message, datagram).await
        }
    };

    if let Err(err) = result {
        error!(
            peer = %path.peer,
            exchange = ?message.header.exchange_type,
            error = %err,
            "exchange handling failed"
        );
    }
}

/// Convenience default bind address for examples and tests
pub fn loopback_bind() -> SocketAddrV4 {
    SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0)
}
