//! Typed events between the IKE core and the NGAP subsystem
//!
//! The two subsystems never call into each other: each direction is a
//! bounded mpsc channel of typed messages, which keeps the per-SA
//! serialization discipline intact and either side testable with a plain
//! channel pair. Every NGAP-to-IKE event carries the local SPI so the
//! handler can re-locate the SA (and drop the event if the SA died while
//! the request was in flight).

use tokio::sync::mpsc;

use super::{Error, Result};

/// Channel depth for both directions
pub const EVENT_CHANNEL_DEPTH: usize = 64;

/// One PDU session pending Child SA establishment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PduSession {
    /// PDU session id
    pub id: u8,

    /// QoS flow identifiers for the 5G_QOS_INFO notify
    pub qfi_list: Vec<u8>,

    /// Whether the session asked for ESP integrity protection
    pub integrity_protected: bool,
}

/// Per-session outcome recorded while walking the setup list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupOutcome {
    /// Child SA request sent (or installed)
    Ok,
    /// Could not build or send the request
    TransportResourceUnavailable,
}

/// PDU sessions handed over by NGAP for Child SA setup
#[derive(Debug, Clone, Default)]
pub struct PduSessionSetupData {
    /// Sessions still waiting for a Child SA
    pub unactivated: Vec<PduSession>,

    /// Walk position into `unactivated`
    pub index: usize,

    /// Outcome per attempted session
    pub outcomes: Vec<SetupOutcome>,
}

impl PduSessionSetupData {
    /// Next session to set up, when any remains
    pub fn current(&self) -> Option<&PduSession> {
        self.unactivated.get(self.index)
    }
}

/// Events the IKE core sends to the NGAP subsystem
#[derive(Debug, Clone)]
pub enum NgapEvent {
    /// Relay an opaque EAP-5G vendor payload for unmarshalling
    UnmarshalEap5GData {
        /// IKE SA local SPI
        local_spi: u64,
        /// Raw EAP-5G vendor data
        eap5g_data: Vec<u8>,
        /// Whether a UE context already exists for this SA
        ue_context_exists: bool,
        /// RAN NGAP id, zero before the UE context exists
        ran_ngap_id: i64,
    },

    /// First NAS message towards the AMF after EAP-5G unmarshalling
    SendInitialUeMessage {
        /// RAN NGAP id
        ran_ngap_id: i64,
        /// UE outer IPv4 address
        ue_addr: std::net::Ipv4Addr,
        /// UE outer port
        ue_port: u16,
        /// NAS PDU
        nas_pdu: Vec<u8>,
    },

    /// Ask NGAP for its per-UE context (PDU session setup data)
    GetNgapContext {
        /// RAN NGAP id
        ran_ngap_id: i64,
    },

    /// Signalling Child SA is up; NAS moves to inner TCP
    StartTcpSignalNas {
        /// RAN NGAP id
        ran_ngap_id: i64,
    },

    /// IKE SA torn down after a Delete(IKE)
    SendUeContextReleaseComplete {
        /// RAN NGAP id
        ran_ngap_id: i64,
    },

    /// Child SA torn down after a Delete(ESP)
    SendPduSessionResourceReleaseRes {
        /// RAN NGAP id
        ran_ngap_id: i64,
    },

    /// Every pending PDU session has been walked
    SendPduSessionResourceSetupRes {
        /// RAN NGAP id
        ran_ngap_id: i64,
    },

    /// Forward a NAS message now that its Child SA is installed
    SendNasMsg {
        /// RAN NGAP id
        ran_ngap_id: i64,
    },
}

/// Events the NGAP subsystem sends into the IKE core
#[derive(Debug, Clone)]
pub enum IkeEvent {
    /// EAP-5G payload unmarshalled; create/refresh the UE binding
    UnmarshalEap5GDataResponse {
        /// IKE SA local SPI
        local_spi: u64,
        /// RAN NGAP id assigned to the UE
        ran_ngap_id: i64,
        /// NAS PDU extracted from the EAP-5G message
        nas_pdu: Vec<u8>,
    },

    /// EAP-5G failed upstream; answer the UE with EAP-Failure
    SendEap5GFailureMsg {
        /// IKE SA local SPI
        local_spi: u64,
    },

    /// Authentication succeeded; send EAP-Success
    SendEapSuccessMsg {
        /// IKE SA local SPI
        local_spi: u64,
        /// EAP-derived master key
        kn3iwf: Option<Vec<u8>>,
        /// Number of PDU sessions the AMF announced
        pdu_session_count: usize,
    },

    /// Forward a NAS message inside EAP-5G
    SendEapNasMsg {
        /// IKE SA local SPI
        local_spi: u64,
        /// NAS PDU
        nas_pdu: Vec<u8>,
    },

    /// Start Child SA establishment for newly accepted PDU sessions
    CreatePduSession {
        /// IKE SA local SPI
        local_spi: u64,
        /// Sessions to set up
        setup_data: PduSessionSetupData,
        /// Updated PDU session count
        pdu_session_count: usize,
    },

    /// Tear the IKE SA down via an INFORMATIONAL Delete(IKE) request
    IkeDeleteRequest {
        /// IKE SA local SPI
        local_spi: u64,
    },

    /// Delete the Child SAs of the given PDU sessions
    SendChildSaDeleteRequest {
        /// IKE SA local SPI
        local_spi: u64,
        /// PDU session ids being released
        release_ids: Vec<u8>,
    },

    /// Refresh the UE's Kn3iwf after a key change
    IkeContextUpdate {
        /// IKE SA local SPI
        local_spi: u64,
        /// New master key, when rotated
        kn3iwf: Option<Vec<u8>>,
    },

    /// Answer to `GetNgapContext`
    GetNgapContextResponse {
        /// IKE SA local SPI
        local_spi: u64,
        /// PDU session setup data snapshot
        setup_data: PduSessionSetupData,
    },
}

/// Sender half towards NGAP
pub type NgapEventTx = mpsc::Sender<NgapEvent>;

/// Receiver half the NGAP subsystem drains
pub type NgapEventRx = mpsc::Receiver<NgapEvent>;

/// Sender half the NGAP subsystem uses towards IKE
pub type IkeEventTx = mpsc::Sender<IkeEvent>;

/// Receiver half the IKE server drains
pub type IkeEventRx = mpsc::Receiver<IkeEvent>;

/// Create the NGAP-bound channel
pub fn ngap_channel() -> (NgapEventTx, NgapEventRx) {
    mpsc::channel(EVENT_CHANNEL_DEPTH)
}

/// Create the IKE-bound channel
pub fn ike_channel() -> (IkeEventTx, IkeEventRx) {
    mpsc::channel(EVENT_CHANNEL_DEPTH)
}

/// Queue an event towards NGAP without ever blocking the caller
pub fn send_ngap(tx: &NgapEventTx, event: NgapEvent) -> Result<()> {
    tx.try_send(event)
        .map_err(|e| Error::EventChannel(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_data_walk() {
        let mut data = PduSessionSetupData {
            unactivated: vec![
                PduSession {
                    id: 1,
                    qfi_list: vec![1],
                    integrity_protected: false,
                },
                PduSession {
                    id: 2,
                    qfi_list: vec![2],
                    integrity_protected: true,
                },
            ],
            index: 0,
            outcomes: Vec::new(),
        };

        assert_eq!(data.current().unwrap().id, 1);
        data.index += 1;
        assert_eq!(data.current().unwrap().id, 2);
        data.index += 1;
        assert!(data.current().is_none());
    }

    #[tokio::test]
    async fn test_ngap_channel_delivery() {
        let (tx, mut rx) = ngap_channel();
        send_ngap(
            &tx,
            NgapEvent::GetNgapContext { ran_ngap_id: 42 },
        )
        .unwrap();

        match rx.recv().await.unwrap() {
            NgapEvent::GetNgapContext { ran_ngap_id } => assert_eq!(ran_ngap_id, 42),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_send_ngap_full_channel_errors() {
        let (tx, _rx) = mpsc::channel(1);
        send_ngap(&tx, NgapEvent::StartTcpSignalNas { ran_ngap_id: 1 }).unwrap();
        let result = send_ngap(&tx, NgapEvent::StartTcpSignalNas { ran_ngap_id: 2 });
        assert!(matches!(result, Err(Error::EventChannel(_))));
    }
}
