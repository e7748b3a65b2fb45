//! Dead Peer Detection (RFC 3706 style, INFORMATIONAL-based)
//!
//! One background task per established IKE SA. After an idle interval it
//! sends an INFORMATIONAL request with an empty encrypted payload and
//! retransmits on a shorter timer; any matching reply resets the retry
//! counter through the [`DpdHandle`] parked on the SA. Exhausting the retry
//! bound tears the SA down exactly as a received Delete(IKE) would.
//!
//! ```text
//! idle ──► probe ──► wait ──► reply?  ─yes─► idle
//!                     │ timeout × N
//!                     └──► tear down SA
//! ```

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::constants::{ExchangeType, IkeFlags};
use super::event::{send_ngap, NgapEvent};
use super::message::IkeMessage;
use super::server::IkeContext;
use super::sk;

/// Default idle interval before a probe
pub const DEFAULT_DPD_INTERVAL: Duration = Duration::from_secs(30);

/// Default wait for a probe reply
pub const DEFAULT_DPD_TIMEOUT: Duration = Duration::from_secs(10);

/// Default retransmission bound
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// DPD tuning knobs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DpdConfig {
    /// Run DPD at all
    pub enabled: bool,

    /// Idle time before sending a probe
    pub interval: Duration,

    /// Time to wait for a reply before retransmitting
    pub timeout: Duration,

    /// Retransmissions before the peer is declared dead
    pub max_retries: u32,
}

impl Default for DpdConfig {
    fn default() -> Self {
        DpdConfig {
            enabled: true,
            interval: DEFAULT_DPD_INTERVAL,
            timeout: DEFAULT_DPD_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl DpdConfig {
    /// DPD switched off
    pub fn disabled() -> Self {
        DpdConfig {
            enabled: false,
            ..Default::default()
        }
    }
}

/// Outstanding-probe state parked on the IKE SA
///
/// The INFORMATIONAL handler acknowledges through this handle; the DPD task
/// holds the matching ends of both fields.
#[derive(Debug, Clone)]
pub struct DpdHandle {
    notify: Arc<Notify>,
    retries: Arc<AtomicU32>,
}

impl DpdHandle {
    /// Fresh handle with a zero retry counter
    pub fn new() -> Self {
        DpdHandle {
            notify: Arc::new(Notify::new()),
            retries: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Record a matching reply: reset the counter, wake the prober
    pub fn acknowledge(&self) {
        self.retries.store(0, Ordering::SeqCst);
        self.notify.notify_one();
    }

    /// Current retry count
    pub fn retry_count(&self) -> u32 {
        self.retries.load(Ordering::SeqCst)
    }

    fn bump(&self) -> u32 {
        self.retries.fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn acknowledged(&self) {
        self.notify.notified().await;
    }
}

impl Default for DpdHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Start the DPD loop for one IKE SA
pub fn spawn(ctx: Arc<IkeContext>, local_spi: u64) -> JoinHandle<()> {
    tokio::spawn(run(ctx, local_spi))
}

async fn run(ctx: Arc<IkeContext>, local_spi: u64) {
    let cfg = ctx.config.dpd.clone();
    if !cfg.enabled {
        return;
    }
    debug!(local_spi = format_args!("0x{:016x}", local_spi), "DPD loop started");

    loop {
        tokio::time::sleep(cfg.interval).await;

        let sa = match ctx.ike_sas.get(local_spi) {
            Some(sa) => sa,
            None => return,
        };

        let handle = DpdHandle::new();

        // Build and send the probe under the SA lock, then wait outside it
        // so the INFORMATIONAL handler can acknowledge.
        let (probe, peer) = {
            let mut sa = sa.lock().await;
            let path = match sa.path {
                Some(path) => path,
                None => continue,
            };
            let mut message = IkeMessage::new(
                sa.remote_spi,
                sa.local_spi,
                ExchangeType::Informational,
                IkeFlags::request(),
                sa.responder_message_id,
            );
            let probe = match sk::seal(&sa, ctx.rng.as_ref(), &mut message, &[]) {
                Ok(bytes) => bytes,
                Err(err) => {
                    warn!(error = %err, "failed to build DPD probe");
                    continue;
                }
            };
            sa.dpd = Some(handle.clone());
            (probe, path.peer)
        };

        if let Err(err) = ctx.send_to(peer, &probe).await {
            warn!(error = %err, "failed to send DPD probe");
        }

        let mut alive = false;
        loop {
            tokio::select! {
                _ = handle.acknowledged() => {
                    alive = true;
                    break;
                }
                _ = tokio::time::sleep(cfg.timeout) => {
                    let retries = handle.bump();
                    if retries > cfg.max_retries {
                        break;
                    }
                    debug!(
                        local_spi = format_args!("0x{:016x}", local_spi),
                        retries, "retransmitting DPD probe"
                    );
                    if let Err(err) = ctx.send_to(peer, &probe).await {
                        warn!(error = %err, "failed to retransmit DPD probe");
                    }
                }
            }
        }

        if !alive {
            info!(
                local_spi = format_args!("0x{:016x}", local_spi),
                "peer dead after {} DPD retransmissions, releasing SA", cfg.max_retries
            );
            let ran_ngap_id = ctx.ngap_ids.get(local_spi);
            ctx.release_ike_sa(local_spi).await;
            if let Some(ran_ngap_id) = ran_ngap_id {
                let _ = send_ngap(
                    &ctx.ngap_tx,
                    NgapEvent::SendUeContextReleaseComplete { ran_ngap_id },
                );
            }
            return;
        }

        // Probe answered: clear the handle and account the completed exchange
        let mut sa = sa.lock().await;
        sa.dpd = None;
        sa.responder_message_id += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let cfg = DpdConfig::default();
        assert!(cfg.enabled);
        assert_eq!(cfg.interval, DEFAULT_DPD_INTERVAL);
        assert_eq!(cfg.max_retries, DEFAULT_MAX_RETRIES);

        assert!(!DpdConfig::disabled().enabled);
    }

    #[tokio::test]
    async fn test_acknowledge_resets_and_wakes() {
        let handle = DpdHandle::new();
        assert_eq!(handle.bump(), 1);
        assert_eq!(handle.retry_count(), 1);

        handle.acknowledge();
        assert_eq!(handle.retry_count(), 0);

        // The stored permit makes the next wait return immediately
        tokio::time::timeout(Duration::from_millis(50), handle.acknowledged())
            .await
            .expect("acknowledge must wake the waiter");
    }

    #[test]
    fn test_handle_clone_shares_counter() {
        let a = DpdHandle::new();
        let b = a.clone();
        a.bump();
        assert_eq!(b.retry_count(), 1);
    }
}
