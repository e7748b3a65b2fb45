//! IKE SA, UE context and Child SA data model
//!
//! An [`IkeSa`] exists from IKE_SA_INIT until a Delete(IKE) or DPD
//! exhaustion. It gains an [`IkeUe`] when the first EAP-5G response comes
//! back from NGAP, and the UE context in turn owns the Child SAs (half-open
//! ones keyed by the exchange message id, completed ones by inbound SPI).

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddrV4};

use zeroize::Zeroizing;

use super::crypto::{DhGroup, EncrAlgorithm, IkeSaKeys, IntegAlgorithm, PrfAlgorithm};
use super::dpd::DpdHandle;
use super::nat::NatFlags;
use super::payload::{IdPayload, TsPayload};
use super::proposal::{Proposal, SaPayload, Transform, TransformType};
use super::{Error, Result};

/// Responder progress through the IKE_AUTH / CREATE_CHILD_SA flow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IkeState {
    /// IKE_SA_INIT answered, first IKE_AUTH round pending
    PreSignalling,
    /// EAP-5G running between UE and AMF
    EapSignalling,
    /// EAP done, final AUTH round pending
    PostSignalling,
    /// Signalling Child SA installed
    EndSignalling,
    /// CREATE_CHILD_SA continuation pending NGAP context
    HandleCreateChildSa,
}

impl IkeState {
    /// Step to the next state in the fixed progression
    pub fn advance(&mut self) {
        *self = match self {
            IkeState::PreSignalling => IkeState::EapSignalling,
            IkeState::EapSignalling => IkeState::PostSignalling,
            IkeState::PostSignalling => IkeState::EndSignalling,
            IkeState::EndSignalling | IkeState::HandleCreateChildSa => {
                IkeState::HandleCreateChildSa
            }
        }
    }
}

/// The UDP four-tuple an SA's traffic flows over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpPath {
    /// Our address and port
    pub local: SocketAddrV4,

    /// The UE's outer address and port
    pub peer: SocketAddrV4,
}

/// Parsed CREATE_CHILD_SA request parked while NGAP context is fetched
#[derive(Debug, Clone)]
pub struct PendingChildSaRequest {
    /// Peer's SA offer
    pub sa: SaPayload,

    /// Peer TSi
    pub ts_initiator: TsPayload,

    /// Peer TSr
    pub ts_responder: TsPayload,
}

/// IP protocol selected for a Child SA's traffic selectors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectedIpProtocol {
    /// NAS signalling inner transport
    Tcp,
    /// User-plane inner transport (fixed by the 3GPP profile, not
    /// negotiated in IKE)
    Gre,
}

impl SelectedIpProtocol {
    /// IANA protocol number
    pub fn protocol_number(self) -> u8 {
        match self {
            SelectedIpProtocol::Tcp => 6,
            SelectedIpProtocol::Gre => 47,
        }
    }
}

/// One ESP Child SA, complete once the peer SPI and keys are known
#[derive(Debug, Clone)]
pub struct ChildSa {
    /// SPI we receive on
    pub inbound_spi: u32,

    /// SPI the peer receives on
    pub outbound_spi: u32,

    /// Negotiated encryption transform
    pub encr_transform: Transform,

    /// Negotiated integrity transform, when any
    pub integ_transform: Option<Transform>,

    /// Directional keys, derived after completion
    pub keys: Option<super::crypto::ChildSaKeys>,

    /// Inner IP protocol this SA carries
    pub ip_protocol: SelectedIpProtocol,

    /// Local-side /32 traffic selector
    pub local_ts: Ipv4Addr,

    /// Remote-side /32 traffic selector
    pub remote_ts: Ipv4Addr,

    /// UE outer address
    pub peer_public_addr: Ipv4Addr,

    /// Our outer address
    pub local_public_addr: Ipv4Addr,

    /// UDP-encapsulate ESP (NAT-T)
    pub encapsulate: bool,

    /// Our encapsulation port
    pub local_port: u16,

    /// UE-side encapsulation port
    pub nat_port: u16,

    /// XFRM interface this SA attaches to
    pub xfrm_iface_id: u32,

    /// PDU session this SA serves; `None` for the signalling SA
    pub pdu_session_id: Option<u8>,
}

/// Half-open Child SA: inbound SPI allocated, peer SPI pending
#[derive(Debug, Clone, Copy)]
pub struct HalfChildSa {
    /// Allocated inbound SPI
    pub inbound_spi: u32,

    /// PDU session the SA will serve
    pub pdu_session_id: Option<u8>,
}

/// Authenticated UE bound to an IKE SA
pub struct IkeUe {
    /// EAP-derived master key from the AMF
    pub kn3iwf: Option<Zeroizing<Vec<u8>>>,

    /// Allocated inner IPv4 address
    pub inner_ip: Option<Ipv4Addr>,

    /// Number of PDU sessions the AMF announced
    pub pdu_session_count: usize,

    /// Half-open Child SAs keyed by the exchange message id that opened them
    pub half_child_sas: HashMap<u32, HalfChildSa>,

    /// Completed Child SAs keyed by inbound SPI
    pub child_sas: HashMap<u32, ChildSa>,
}

impl IkeUe {
    /// Fresh UE context
    pub fn new() -> Self {
        IkeUe {
            kn3iwf: None,
            inner_ip: None,
            pdu_session_count: 0,
            half_child_sas: HashMap::new(),
            child_sas: HashMap::new(),
        }
    }

    /// Record a half-open Child SA under the exchange message id
    pub fn create_half_child_sa(
        &mut self,
        msg_id: u32,
        inbound_spi: u32,
        pdu_session_id: Option<u8>,
    ) {
        self.half_child_sas.insert(
            msg_id,
            HalfChildSa {
                inbound_spi,
                pdu_session_id,
            },
        );
    }

    /// Complete a half-open Child SA with the peer SPI and the chosen
    /// proposal's transforms
    pub fn complete_child_sa(
        &mut self,
        msg_id: u32,
        outbound_spi: u32,
        chosen: &Proposal,
    ) -> Result<ChildSa> {
        let half = self
            .half_child_sas
            .remove(&msg_id)
            .ok_or_else(|| Error::InvalidState(format!("no half Child SA for message {}", msg_id)))?;

        let encr_transform = chosen
            .get_transform(TransformType::Encr)
            .cloned()
            .ok_or(Error::MissingPayload("ESP encryption transform"))?;
        let integ_transform = chosen.get_transform(TransformType::Integ).cloned();

        let child = ChildSa {
            inbound_spi: half.inbound_spi,
            outbound_spi,
            encr_transform,
            integ_transform,
            keys: None,
            ip_protocol: SelectedIpProtocol::Tcp,
            local_ts: Ipv4Addr::UNSPECIFIED,
            remote_ts: Ipv4Addr::UNSPECIFIED,
            peer_public_addr: Ipv4Addr::UNSPECIFIED,
            local_public_addr: Ipv4Addr::UNSPECIFIED,
            encapsulate: false,
            local_port: 0,
            nat_port: 0,
            xfrm_iface_id: 0,
            pdu_session_id: half.pdu_session_id,
        };
        Ok(child)
    }
}

impl Default for IkeUe {
    fn default() -> Self {
        Self::new()
    }
}

/// Negotiated IKE SA algorithms, resolved from the chosen proposal
#[derive(Debug, Clone, Copy)]
pub struct IkeSaCrypto {
    /// SK payload cipher
    pub encr: EncrAlgorithm,

    /// SK payload integrity
    pub integ: IntegAlgorithm,

    /// Key-schedule PRF
    pub prf: PrfAlgorithm,

    /// Key exchange group
    pub dh_group: DhGroup,
}

/// One IKE Security Association, responder side
pub struct IkeSa {
    /// Our SPI, the store key
    pub local_spi: u64,

    /// Peer (initiator) SPI
    pub remote_spi: u64,

    /// Responder state
    pub state: IkeState,

    /// Negotiated algorithms
    pub crypto: IkeSaCrypto,

    /// The chosen IKE proposal, echoed in the IKE_SA_INIT response
    pub chosen_proposal: Proposal,

    /// Ni | Nr, set once at IKE_SA_INIT and replaced wholesale on
    /// CREATE_CHILD_SA rekeys
    pub concatenated_nonce: Vec<u8>,

    /// Session keys
    pub keys: IkeSaKeys,

    /// Octets the initiator signs (RealMessage1 | Nr | prf(SK_pi, IDi))
    pub initiator_signed_octets: Vec<u8>,

    /// Octets we sign (RealMessage2 | Ni | prf(SK_pr, IDr))
    pub responder_signed_octets: Vec<u8>,

    /// Identifier of the last EAP message we sent
    pub last_eap_identifier: u8,

    /// Peer identity from IKE_AUTH
    pub peer_id: Option<IdPayload>,

    /// Peer certificate, when one was supplied
    pub peer_certificate: Option<Vec<u8>>,

    /// Message id of the last peer-initiated exchange
    pub initiator_message_id: u32,

    /// Message id for the next exchange we initiate
    pub responder_message_id: u32,

    /// NAT detection outcome
    pub nat: NatFlags,

    /// Cached UDP four-tuple for NGAP-driven sends
    pub path: Option<UdpPath>,

    /// Responder ESP SA stored between the PreSignalling and
    /// PostSignalling rounds
    pub auth_response_sa: Option<SaPayload>,

    /// Traffic selectors in effect for the signalling Child SA
    pub ts_initiator: Option<TsPayload>,

    /// See `ts_initiator`
    pub ts_responder: Option<TsPayload>,

    /// CREATE_CHILD_SA parse result awaiting NGAP context
    pub pending_child_sa: Option<PendingChildSaRequest>,

    /// Outstanding DPD probe state
    pub dpd: Option<DpdHandle>,

    /// UE context once EAP-5G has produced one
    pub ike_ue: Option<IkeUe>,
}

impl IkeSa {
    /// Create an SA right after IKE_SA_INIT negotiation and key derivation
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        local_spi: u64,
        remote_spi: u64,
        crypto: IkeSaCrypto,
        chosen_proposal: Proposal,
        concatenated_nonce: Vec<u8>,
        keys: IkeSaKeys,
        initiator_message_id: u32,
        nat: NatFlags,
    ) -> Self {
        IkeSa {
            local_spi,
            remote_spi,
            state: IkeState::PreSignalling,
            crypto,
            chosen_proposal,
            concatenated_nonce,
            keys,
            initiator_signed_octets: Vec::new(),
            responder_signed_octets: Vec::new(),
            last_eap_identifier: 0,
            peer_id: None,
            peer_certificate: None,
            initiator_message_id,
            responder_message_id: 0,
            nat,
            path: None,
            auth_response_sa: None,
            ts_initiator: None,
            ts_responder: None,
            pending_child_sa: None,
            dpd: None,
            ike_ue: None,
        }
    }
}
