//! The IKEv2 responder state machine
//!
//! One handler per exchange type plus the NGAP event handler. Handlers run
//! under the SA's lock, so everything observable about one SA is
//! linearizable; errors bubble to the dispatcher which logs and drops (the
//! peer retransmits, nothing here retries).
//!
//! Error policy: parse failures drop the datagram silently; unknown SPIs
//! and version mismatches get plaintext INFORMATIONAL notifies; negotiation
//! and authentication failures get the matching notify; crypto and kernel
//! failures abort the exchange without a response.

use std::sync::Arc;

use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};

use super::constants::{auth_method, cert_encoding, cfg, eap, notify, ExchangeType, IkeFlags};
use super::crypto::{sign, ChildSaKeys, DhGroup, DhKeyExchange, EncrAlgorithm, IntegAlgorithm, PrfAlgorithm};
use super::eap5g::EapPayload;
use super::event::{send_ngap, IkeEvent, NgapEvent, PduSessionSetupData, SetupOutcome};
use super::message::IkeMessage;
use super::nat::NatFlags;
use super::payload::{
    AuthPayload, CertPayload, ConfigPayload, DeletePayload, IdPayload, IkePayload, KePayload,
    NoncePayload, NotifyPayload, TrafficSelector, TsPayload,
};
use super::proposal::{self, transform_id, SaPayload, Transform, TransformType};
use super::sa::{
    IkeSa, IkeSaCrypto, IkeState, IkeUe, PendingChildSaRequest, SelectedIpProtocol, UdpPath,
};
use super::server::IkeContext;
use super::xfrm::ExchangeRole;
use super::{dpd, sk, Error, Result};

/// Exchange message-id index of the signalling Child SA half-entry
const SIGNALLING_CHILD_INDEX: u32 = 0x01;

/// Key pad string of the shared-key MIC construction (RFC 7296 Section 2.15)
const KEY_PAD: &[u8] = b"Key Pad for IKEv2";

// ---------------------------------------------------------------------------
// IKE_SA_INIT
// ---------------------------------------------------------------------------

/// Handle an IKE_SA_INIT request; no SA exists yet
pub async fn handle_ike_sa_init(
    ctx: &Arc<IkeContext>,
    path: UdpPath,
    message: &IkeMessage,
    raw: &[u8],
) -> Result<()> {
    info!(peer = %path.peer, "handle IKE_SA_INIT");

    if message.header.major_version() > 2 {
        return reply_invalid_major_version(ctx, path, message).await;
    }

    let mut sa_offer = None;
    let mut key_exchange = None;
    let mut nonce = None;
    let mut notifications = Vec::new();

    for payload in &message.payloads {
        match payload {
            IkePayload::SecurityAssociation(p) => sa_offer = Some(p),
            IkePayload::KeyExchange(p) => key_exchange = Some(p),
            IkePayload::Nonce(p) => nonce = Some(p),
            IkePayload::Notify(p) => notifications.push(p),
            other => debug!(
                payload_type = other.type_code(),
                "payload not handled in IKE_SA_INIT"
            ),
        }
    }

    let sa_offer = sa_offer.ok_or(Error::MissingPayload("SA"))?;

    let chosen = match proposal::select_ike_proposal(sa_offer) {
        Some(chosen) => chosen,
        None => {
            warn!("no proposal chosen");
            return reply_plain_notify(
                ctx,
                path,
                message.header.initiator_spi,
                message.header.responder_spi,
                ExchangeType::IkeSaInit,
                message.header.message_id,
                notify::NO_PROPOSAL_CHOSEN,
                Vec::new(),
            )
            .await;
        }
    };

    let key_exchange = key_exchange.ok_or(Error::MissingPayload("KE"))?;
    let chosen_group_id = chosen
        .get_transform(TransformType::Dh)
        .expect("chosen proposal carries a DH transform")
        .transform_id;
    if key_exchange.dh_group != chosen_group_id {
        warn!(
            offered = key_exchange.dh_group,
            chosen = chosen_group_id,
            "KE payload group does not match chosen proposal"
        );
        return reply_plain_notify(
            ctx,
            path,
            message.header.initiator_spi,
            message.header.responder_spi,
            ExchangeType::IkeSaInit,
            message.header.message_id,
            notify::INVALID_KE_PAYLOAD,
            chosen_group_id.to_be_bytes().to_vec(),
        )
        .await;
    }

    let nonce = nonce.ok_or(Error::MissingPayload("Nonce"))?;

    let dh_group = DhGroup::from_group_number(chosen_group_id)
        .expect("chosen DH group is in the supported table");
    let dh = DhKeyExchange::generate(dh_group, ctx.rng.as_ref());
    let shared_secret = dh.compute_shared(&key_exchange.key_data)?;

    let local_nonce = ctx.rng.bytes(32);
    let mut concatenated_nonce = nonce.nonce.clone();
    concatenated_nonce.extend_from_slice(&local_nonce);

    let mut nat = NatFlags::default();
    for notification in notifications {
        match notification.notify_type {
            notify::NAT_DETECTION_SOURCE_IP => nat.observe_source_hash(
                message.header.initiator_spi,
                message.header.responder_spi,
                path.peer,
                &notification.data,
            ),
            notify::NAT_DETECTION_DESTINATION_IP => nat.observe_destination_hash(
                message.header.initiator_spi,
                message.header.responder_spi,
                path.local,
                &notification.data,
            ),
            _ => {}
        }
    }

    let crypto = resolve_ike_crypto(&chosen)?;
    let local_spi = ctx.ike_sas.allocate_spi(ctx.rng.as_ref());
    let remote_spi = message.header.initiator_spi;

    let keys = super::crypto::IkeSaKeys::derive(
        crypto.prf,
        &concatenated_nonce,
        &shared_secret,
        remote_spi,
        local_spi,
        crypto.encr.key_len(),
        crypto.integ.key_len(),
    );

    // Response: SA, KEr, Nr, then the two NAT-DETECTION notifies computed
    // over our own view of the addresses.
    let mut response = IkeMessage::new(
        remote_spi,
        local_spi,
        ExchangeType::IkeSaInit,
        IkeFlags::response(),
        message.header.message_id,
    );
    response
        .payloads
        .push(IkePayload::SecurityAssociation(SaPayload::single(chosen.clone())));
    response.payloads.push(IkePayload::KeyExchange(KePayload {
        dh_group: chosen_group_id,
        key_data: dh.public_value(),
    }));
    response
        .payloads
        .push(IkePayload::Nonce(NoncePayload::new(local_nonce.clone())?));
    response.payloads.push(IkePayload::Notify(NotifyPayload::new(
        notify::NAT_DETECTION_SOURCE_IP,
        super::nat::detection_hash(remote_spi, local_spi, path.local).to_vec(),
    )));
    response.payloads.push(IkePayload::Notify(NotifyPayload::new(
        notify::NAT_DETECTION_DESTINATION_IP,
        super::nat::detection_hash(remote_spi, local_spi, path.peer).to_vec(),
    )));

    let response_bytes = response.to_bytes();

    let mut sa = IkeSa::new(
        local_spi,
        remote_spi,
        crypto,
        chosen,
        concatenated_nonce,
        keys,
        message.header.message_id,
        nat,
    );

    // InitiatorSignedOctets = RealMessage1 | Nr; prf(SK_pi, IDi) joins in
    // IKE_AUTH. ResponderSignedOctets = RealMessage2 | Ni | prf(SK_pr, IDr).
    sa.initiator_signed_octets = [raw, &local_nonce].concat();
    sa.responder_signed_octets = [&response_bytes[..], &nonce.nonce].concat();
    let id_r = IdPayload::fqdn(&ctx.config.fqdn);
    let maced_id_r = sa.crypto.prf.compute(&sa.keys.sk_pr, &id_r.to_payload_data());
    sa.responder_signed_octets.extend_from_slice(&maced_id_r);

    sa.path = Some(path);
    ctx.ike_sas.insert(sa);

    debug!(
        local_spi = format_args!("0x{:016x}", local_spi),
        ue_behind_nat = nat.ue_behind_nat,
        n3iwf_behind_nat = nat.n3iwf_behind_nat,
        "IKE SA created"
    );

    ctx.send_to(path.peer, &response_bytes).await
}

// ---------------------------------------------------------------------------
// IKE_AUTH
// ---------------------------------------------------------------------------

/// Handle an IKE_AUTH request; dispatches on the SA's signalling state
pub async fn handle_ike_auth(
    ctx: &Arc<IkeContext>,
    path: UdpPath,
    message: &IkeMessage,
    raw: &[u8],
) -> Result<()> {
    debug!(peer = %path.peer, "handle IKE_AUTH");

    if message.header.major_version() > 2 {
        return reply_invalid_major_version(ctx, path, message).await;
    }

    let local_spi = message.header.responder_spi;
    let sa_handle = match ctx.ike_sas.get(local_spi) {
        Some(handle) => handle,
        None => {
            warn!("unrecognized SPI on IKE_AUTH");
            return reply_plain_notify(
                ctx,
                path,
                message.header.initiator_spi,
                0,
                ExchangeType::Informational,
                message.header.message_id,
                notify::INVALID_IKE_SPI,
                Vec::new(),
            )
            .await;
        }
    };
    let mut sa = sa_handle.lock().await;

    let decrypted = open_sk(&sa, message, raw)?;

    let mut initiator_id = None;
    let mut cert_request = None;
    let mut certificate = None;
    let mut sa_offer = None;
    let mut ts_initiator = None;
    let mut ts_responder = None;
    let mut eap_payload = None;
    let mut authentication = None;
    let mut configuration = None;

    for payload in &decrypted {
        match payload {
            IkePayload::IdInitiator(p) => initiator_id = Some(p),
            IkePayload::CertificateRequest(p) => cert_request = Some(p),
            IkePayload::Certificate(p) => certificate = Some(p),
            IkePayload::SecurityAssociation(p) => sa_offer = Some(p),
            IkePayload::TsInitiator(p) => ts_initiator = Some(p),
            IkePayload::TsResponder(p) => ts_responder = Some(p),
            IkePayload::Eap(p) => eap_payload = Some(p),
            IkePayload::Authentication(p) => authentication = Some(p),
            IkePayload::Configuration(p) => configuration = Some(p),
            other => debug!(
                payload_type = other.type_code(),
                "payload not handled in IKE_AUTH"
            ),
        }
    }

    sa.initiator_message_id = message.header.message_id;

    match sa.state {
        IkeState::PreSignalling => {
            let initiator_id = initiator_id.ok_or(Error::MissingPayload("IDi"))?;
            sa.peer_id = Some(initiator_id.clone());

            // prf(SK_pi, IDi body) completes the initiator's signed octets
            let maced_id_i = sa
                .crypto
                .prf
                .compute(&sa.keys.sk_pi, &initiator_id.to_payload_data());
            sa.initiator_signed_octets.extend_from_slice(&maced_id_i);

            if let Some(cert_request) = cert_request {
                if certreq_matches_ca(ctx, cert_request.encoding, &cert_request.authority) {
                    info!("certificate request from UE matches our CA");
                }
            }
            if let Some(certificate) = certificate {
                info!("UE supplied a certificate");
                sa.peer_certificate = Some(certificate.data.clone());
            }

            let sa_offer = sa_offer.ok_or(Error::MissingPayload("SA"))?;
            let esp_chosen = match proposal::select_esp_proposal(sa_offer) {
                Some(chosen) => chosen,
                None => {
                    warn!("no ESP proposal chosen");
                    let inner = [IkePayload::Notify(NotifyPayload::new(
                        notify::NO_PROPOSAL_CHOSEN,
                        Vec::new(),
                    ))];
                    return reply_encrypted(
                        ctx,
                        &mut sa,
                        path,
                        ExchangeType::IkeAuth,
                        message.header.message_id,
                        &inner,
                    )
                    .await;
                }
            };
            sa.auth_response_sa = Some(SaPayload::single(esp_chosen));
            sa.ts_initiator = Some(ts_initiator.ok_or(Error::MissingPayload("TSi"))?.clone());
            sa.ts_responder = Some(ts_responder.ok_or(Error::MissingPayload("TSr"))?.clone());

            let id_r = IdPayload::fqdn(&ctx.config.fqdn);
            let auth_data = sign::sign_pkcs1_sha1(
                &ctx.config.private_key,
                &sa.responder_signed_octets,
            )?;
            let identifier = fresh_eap_identifier(&mut sa, ctx);

            let inner = [
                IkePayload::IdResponder(id_r),
                IkePayload::Certificate(CertPayload {
                    encoding: cert_encoding::X509_SIGNATURE,
                    data: ctx.config.certificate.clone(),
                }),
                IkePayload::Authentication(AuthPayload {
                    method: auth_method::RSA_DIGITAL_SIGNATURE,
                    data: auth_data,
                }),
                IkePayload::Eap(EapPayload::eap5g_start(identifier)),
            ];
            reply_encrypted(
                ctx,
                &mut sa,
                path,
                ExchangeType::IkeAuth,
                message.header.message_id,
                &inner,
            )
            .await?;
            sa.state.advance();
            Ok(())
        }

        IkeState::EapSignalling => {
            let eap_payload = eap_payload.ok_or(Error::MissingPayload("EAP"))?;
            if eap_payload.code != eap::CODE_RESPONSE {
                return Err(Error::InvalidPayload("EAP code is not Response".into()));
            }
            if eap_payload.identifier != sa.last_eap_identifier {
                return Err(Error::InvalidPayload("EAP identifier mismatch".into()));
            }
            let expanded = eap_payload
                .expanded()
                .ok_or_else(|| Error::InvalidPayload("EAP type is not Expanded".into()))?;
            if !expanded.is_eap5g() {
                return Err(Error::InvalidPayload(
                    "EAP expanded vendor is not 3GPP EAP-5G".into(),
                ));
            }

            if expanded.eap5g_message_id() == Some(eap::MSG_5G_STOP) {
                // UE aborts; answer EAP-Failure and await its Delete
                info!("EAP-5G Stop received, replying EAP-Failure");
                let identifier = ctx.rng.next_u8();
                let inner = [IkePayload::Eap(EapPayload::failure(identifier))];
                return reply_encrypted(
                    ctx,
                    &mut sa,
                    path,
                    ExchangeType::IkeAuth,
                    message.header.message_id,
                    &inner,
                )
                .await;
            }

            let ran_ngap_id = ctx.ngap_ids.get(sa.local_spi).unwrap_or(0);
            send_ngap(
                &ctx.ngap_tx,
                NgapEvent::UnmarshalEap5GData {
                    local_spi: sa.local_spi,
                    eap5g_data: expanded.vendor_data.clone(),
                    ue_context_exists: sa.ike_ue.is_some(),
                    ran_ngap_id,
                },
            )?;

            sa.path = Some(path);
            Ok(())
        }

        IkeState::PostSignalling => {
            let kn3iwf = sa
                .ike_ue
                .as_ref()
                .and_then(|ue| ue.kn3iwf.clone())
                .ok_or_else(|| Error::InvalidState("no Kn3iwf for AUTH verification".into()))?;

            // Shared-key MIC: prf(prf(Kn3iwf, "Key Pad for IKEv2"), octets)
            let prf = sa.crypto.prf;
            let secret = prf.compute(&kn3iwf, KEY_PAD);
            let verified = match authentication {
                Some(auth) => {
                    let expected = prf.compute(&secret, &sa.initiator_signed_octets);
                    bool::from(auth.data.ct_eq(&expected))
                }
                None => false,
            };
            if !verified {
                warn!("peer authentication failed");
                let inner = [IkePayload::Notify(NotifyPayload::new(
                    notify::AUTHENTICATION_FAILED,
                    Vec::new(),
                ))];
                return reply_encrypted(
                    ctx,
                    &mut sa,
                    path,
                    ExchangeType::IkeAuth,
                    message.header.message_id,
                    &inner,
                )
                .await;
            }
            debug!("peer authentication success");

            let addr_requested = configuration
                .map(|cp| {
                    cp.cfg_type == cfg::REQUEST
                        && cp
                            .attributes
                            .iter()
                            .any(|attr| attr.attr_type == cfg::INTERNAL_IP4_ADDRESS)
                })
                .unwrap_or(false);
            if !addr_requested {
                return Err(Error::MissingPayload("INTERNAL_IP4_ADDRESS request"));
            }

            let local_auth = prf.compute(&secret, &sa.responder_signed_octets);

            let ue_ip = ctx.ip_pool.allocate()?;
            if let Some(ue) = sa.ike_ue.as_mut() {
                ue.inner_ip = Some(ue_ip);
            }

            let mut cp_reply = ConfigPayload::reply();
            cp_reply.push(cfg::INTERNAL_IP4_ADDRESS, ue_ip.octets().to_vec());
            cp_reply.push(
                cfg::INTERNAL_IP4_NETMASK,
                ctx.ip_pool.netmask().octets().to_vec(),
            );

            let ts_i = TsPayload::single(TrafficSelector::host(ue_ip));
            let ts_r = TsPayload::single(TrafficSelector::host(ctx.config.ipsec_gateway));
            sa.ts_initiator = Some(ts_i.clone());
            sa.ts_responder = Some(ts_r.clone());

            // The stored ESP SA still carries the peer's SPI; swap in our
            // freshly allocated inbound SPI before echoing it back.
            let inbound_spi = ctx.child_spis.allocate(ctx.rng.as_ref(), sa.local_spi);
            let mut response_sa = sa
                .auth_response_sa
                .clone()
                .ok_or(Error::MissingPayload("stored ESP SA"))?;
            let outbound_spi = response_sa.proposals[0]
                .spi_u32()
                .ok_or_else(|| Error::InvalidPayload("stored ESP SA without SPI".into()))?;
            response_sa.proposals[0].spi = inbound_spi.to_be_bytes().to_vec();
            sa.auth_response_sa = Some(response_sa.clone());
            debug!(
                inbound_spi = format_args!("0x{:08x}", inbound_spi),
                outbound_spi = format_args!("0x{:08x}", outbound_spi),
                "signalling Child SA SPIs"
            );

            let chosen_proposal = response_sa.proposals[0].clone();
            let prf_alg = sa.crypto.prf;
            let sk_d = sa.keys.sk_d.clone();
            let concatenated_nonce = sa.concatenated_nonce.clone();
            let nat = sa.nat;

            let ue = sa
                .ike_ue
                .as_mut()
                .ok_or_else(|| Error::InvalidState("no UE context in PostSignalling".into()))?;
            ue.create_half_child_sa(SIGNALLING_CHILD_INDEX, inbound_spi, None);
            let mut child =
                ue.complete_child_sa(SIGNALLING_CHILD_INDEX, outbound_spi, &chosen_proposal)?;

            child.ip_protocol = SelectedIpProtocol::Tcp;
            child.local_ts = ctx.config.ipsec_gateway;
            child.remote_ts = ue_ip;
            child.peer_public_addr = *path.peer.ip();
            child.local_public_addr = *ctx.config.ike_bind_addr.ip();
            child.keys = Some(derive_child_keys(
                prf_alg,
                &sk_d,
                &concatenated_nonce,
                &child,
            )?);
            if nat.encapsulation_needed() {
                child.encapsulate = true;
                child.local_port = path.local.port();
                child.nat_port = path.peer.port();
            }
            child.xfrm_iface_id = ctx.xfrm.default_iface_id();

            let inner = [
                IkePayload::Authentication(AuthPayload {
                    method: auth_method::SHARED_KEY_MIC,
                    data: local_auth,
                }),
                IkePayload::Configuration(cp_reply),
                IkePayload::SecurityAssociation(response_sa),
                IkePayload::TsInitiator(ts_i),
                IkePayload::TsResponder(ts_r),
                notify_nas_ip4_address(ctx.config.ipsec_gateway),
                notify_nas_tcp_port(ctx.config.nas_tcp_port),
            ];

            // Seal first, install second: an XFRM failure must abort the
            // exchange before anything reaches the wire.
            let response_bytes = seal_response(
                &mut sa,
                ctx,
                ExchangeType::IkeAuth,
                message.header.message_id,
                &inner,
            )?;

            ctx.xfrm.ensure_default_iface()?;
            ctx.xfrm
                .apply(ExchangeRole::Responder, child.xfrm_iface_id, &child)?;
            if let Some(ue) = sa.ike_ue.as_mut() {
                ue.child_sas.insert(child.inbound_spi, child);
            }

            ctx.send_to(path.peer, &response_bytes).await?;

            let ran_ngap_id = ctx
                .ngap_ids
                .get(sa.local_spi)
                .ok_or_else(|| Error::InvalidState("no RAN NGAP id for SA".into()))?;

            sa.state.advance();

            send_ngap(&ctx.ngap_tx, NgapEvent::StartTcpSignalNas { ran_ngap_id })?;
            send_ngap(&ctx.ngap_tx, NgapEvent::GetNgapContext { ran_ngap_id })?;
            Ok(())
        }

        state => {
            warn!(?state, "IKE_AUTH in unexpected state");
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// CREATE_CHILD_SA
// ---------------------------------------------------------------------------

/// Handle a CREATE_CHILD_SA message from the UE
///
/// The parse result is parked on the SA and the NGAP context fetched; the
/// continuation runs from [`handle_event`] once the context arrives.
pub async fn handle_create_child_sa(
    ctx: &Arc<IkeContext>,
    path: UdpPath,
    message: &IkeMessage,
    raw: &[u8],
) -> Result<()> {
    debug!(peer = %path.peer, "handle CREATE_CHILD_SA");

    if message.header.major_version() > 2 {
        return reply_invalid_major_version(ctx, path, message).await;
    }

    let local_spi = message.header.responder_spi;
    let sa_handle = match ctx.ike_sas.get(local_spi) {
        Some(handle) => handle,
        None => {
            warn!("unrecognized SPI on CREATE_CHILD_SA");
            return reply_plain_notify(
                ctx,
                path,
                0,
                message.header.responder_spi,
                ExchangeType::Informational,
                message.header.message_id,
                notify::INVALID_IKE_SPI,
                Vec::new(),
            )
            .await;
        }
    };
    let mut sa = sa_handle.lock().await;

    let decrypted = open_sk(&sa, message, raw)?;

    let mut sa_offer = None;
    let mut nonce = None;
    let mut ts_initiator = None;
    let mut ts_responder = None;
    for payload in &decrypted {
        match payload {
            IkePayload::SecurityAssociation(p) => sa_offer = Some(p),
            IkePayload::Nonce(p) => nonce = Some(p),
            IkePayload::TsInitiator(p) => ts_initiator = Some(p),
            IkePayload::TsResponder(p) => ts_responder = Some(p),
            other => debug!(
                payload_type = other.type_code(),
                "payload not handled in CREATE_CHILD_SA"
            ),
        }
    }

    let sa_offer = sa_offer.ok_or(Error::MissingPayload("SA"))?;
    let ts_initiator = ts_initiator.ok_or(Error::MissingPayload("TSi"))?;
    let ts_responder = ts_responder.ok_or(Error::MissingPayload("TSr"))?;
    let nonce = nonce.ok_or(Error::MissingPayload("Nonce"))?;

    // The peer nonce joins the one we sent with the request
    sa.concatenated_nonce.extend_from_slice(&nonce.nonce);

    sa.pending_child_sa = Some(PendingChildSaRequest {
        sa: sa_offer.clone(),
        ts_initiator: ts_initiator.clone(),
        ts_responder: ts_responder.clone(),
    });

    let ran_ngap_id = ctx
        .ngap_ids
        .get(sa.local_spi)
        .ok_or_else(|| Error::InvalidState("no RAN NGAP id for SA".into()))?;
    send_ngap(&ctx.ngap_tx, NgapEvent::GetNgapContext { ran_ngap_id })?;
    Ok(())
}

/// Continuation of the CREATE_CHILD_SA response once NGAP context arrived
async fn continue_create_child_sa(
    ctx: &Arc<IkeContext>,
    sa: &mut IkeSa,
    mut setup_data: PduSessionSetupData,
) -> Result<()> {
    if setup_data.unactivated.is_empty() {
        return Err(Error::InvalidState("no unactivated PDU session".into()));
    }

    let pending = sa
        .pending_child_sa
        .take()
        .ok_or_else(|| Error::InvalidState("no pending CREATE_CHILD_SA".into()))?;
    let path = sa.path.ok_or_else(|| Error::InvalidState("no cached UDP path".into()))?;

    let outbound_spi = pending.sa.proposals[0]
        .spi_u32()
        .ok_or_else(|| Error::InvalidPayload("peer ESP SA without 32-bit SPI".into()))?;

    let msg_id = sa.responder_message_id;
    let prf_alg = sa.crypto.prf;
    let sk_d = sa.keys.sk_d.clone();
    let concatenated_nonce = sa.concatenated_nonce.clone();
    let nat = sa.nat;

    let gateway = ctx.config.ipsec_gateway;
    let ue_ip = sa
        .ike_ue
        .as_ref()
        .and_then(|ue| ue.inner_ip)
        .ok_or_else(|| Error::InvalidState("UE has no inner address".into()))?;
    let pdu_session_count = sa.ike_ue.as_ref().map(|ue| ue.pdu_session_count).unwrap_or(0);

    let ue = sa
        .ike_ue
        .as_mut()
        .ok_or_else(|| Error::InvalidState("no UE context".into()))?;
    let mut child = ue.complete_child_sa(msg_id, outbound_spi, &pending.sa.proposals[0])?;

    // Absent traffic selectors collapse to the /32 profile defaults
    let ts_local = pending
        .ts_initiator
        .selectors
        .first()
        .map(|sel| sel.start_addr)
        .unwrap_or(gateway);
    let ts_remote = pending
        .ts_responder
        .selectors
        .first()
        .map(|sel| sel.start_addr)
        .unwrap_or(ue_ip);

    child.ip_protocol = SelectedIpProtocol::Gre;
    child.local_ts = ts_local;
    child.remote_ts = ts_remote;
    child.peer_public_addr = *path.peer.ip();
    child.local_public_addr = *ctx.config.ike_bind_addr.ip();
    child.keys = Some(derive_child_keys(
        prf_alg,
        &sk_d,
        &concatenated_nonce,
        &child,
    )?);
    if nat.encapsulation_needed() {
        child.encapsulate = true;
        child.local_port = path.local.port();
        child.nat_port = path.peer.port();
    }

    // PDU sessions past the first get their own XFRM interface to keep
    // SPD entries apart.
    let iface_id = if pdu_session_count > 1 {
        ctx.xfrm.allocate_up_iface()?
    } else {
        ctx.xfrm.ensure_default_iface()?;
        ctx.xfrm.default_iface_id()
    };
    child.xfrm_iface_id = iface_id;

    ctx.xfrm.apply(ExchangeRole::Initiator, iface_id, &child)?;
    if let Some(ue) = sa.ike_ue.as_mut() {
        ue.child_sas.insert(child.inbound_spi, child);
    }

    if let Some(ran_ngap_id) = ctx.ngap_ids.get(sa.local_spi) {
        send_ngap(&ctx.ngap_tx, NgapEvent::SendNasMsg { ran_ngap_id })?;
    }

    setup_data.outcomes.push(SetupOutcome::Ok);
    sa.responder_message_id += 1;

    create_pdu_session_child_sa(ctx, sa, setup_data).await
}

/// Send the next CREATE_CHILD_SA request, one per pending PDU session
pub async fn create_pdu_session_child_sa(
    ctx: &Arc<IkeContext>,
    sa: &mut IkeSa,
    mut setup_data: PduSessionSetupData,
) -> Result<()> {
    let ran_ngap_id = ctx
        .ngap_ids
        .get(sa.local_spi)
        .ok_or_else(|| Error::InvalidState("no RAN NGAP id for SA".into()))?;

    loop {
        let session = match setup_data.current() {
            Some(session) => session.clone(),
            None => {
                send_ngap(
                    &ctx.ngap_tx,
                    NgapEvent::SendPduSessionResourceSetupRes { ran_ngap_id },
                )?;
                return Ok(());
            }
        };
        setup_data.index += 1;

        let path = sa.path.ok_or_else(|| Error::InvalidState("no cached UDP path".into()))?;
        let ue_ip = sa
            .ike_ue
            .as_ref()
            .and_then(|ue| ue.inner_ip)
            .ok_or_else(|| Error::InvalidState("UE has no inner address".into()))?;

        let inbound_spi = ctx.child_spis.allocate(ctx.rng.as_ref(), sa.local_spi);
        let msg_id = sa.responder_message_id;

        let mut esp_proposal = super::proposal::Proposal::new(1, super::constants::ProtocolId::Esp)
            .with_spi(inbound_spi.to_be_bytes().to_vec())
            .add_transform(Transform::encr_aes_cbc(256));
        if session.integrity_protected {
            esp_proposal = esp_proposal.add_transform(Transform::new(
                TransformType::Integ,
                transform_id::AUTH_HMAC_SHA1_96,
            ));
        }
        esp_proposal =
            esp_proposal.add_transform(Transform::new(TransformType::Esn, transform_id::ESN_NO));

        if let Some(ue) = sa.ike_ue.as_mut() {
            ue.create_half_child_sa(msg_id, inbound_spi, Some(session.id));
        }

        // Fresh nonce replaces Ni | Nr for this exchange's key derivation;
        // the peer's nonce is appended when the response arrives.
        let local_nonce = ctx.rng.bytes(32);
        sa.concatenated_nonce = local_nonce.clone();

        let inner = [
            IkePayload::SecurityAssociation(SaPayload::single(esp_proposal)),
            IkePayload::Nonce(NoncePayload::new(local_nonce)?),
            IkePayload::TsInitiator(TsPayload::single(TrafficSelector::host(
                ctx.config.ipsec_gateway,
            ))),
            IkePayload::TsResponder(TsPayload::single(TrafficSelector::host(ue_ip))),
            notify_5g_qos_info(session.id, &session.qfi_list, true),
            notify_up_ip4_address(ctx.config.ipsec_gateway),
        ];

        let mut request = IkeMessage::new(
            sa.remote_spi,
            sa.local_spi,
            ExchangeType::CreateChildSa,
            IkeFlags::request(),
            msg_id,
        );
        let bytes = match sk::seal(sa, ctx.rng.as_ref(), &mut request, &inner) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(error = %err, session = session.id, "failed to build CREATE_CHILD_SA");
                setup_data
                    .outcomes
                    .push(SetupOutcome::TransportResourceUnavailable);
                continue;
            }
        };
        setup_data.outcomes.push(SetupOutcome::Ok);

        info!(
            session = session.id,
            inbound_spi = format_args!("0x{:08x}", inbound_spi),
            "requesting Child SA for PDU session"
        );
        return ctx.send_to(path.peer, &bytes).await;
    }
}

// ---------------------------------------------------------------------------
// INFORMATIONAL
// ---------------------------------------------------------------------------

/// Handle an INFORMATIONAL message: DPD replies and Delete notifications
pub async fn handle_informational(
    ctx: &Arc<IkeContext>,
    path: UdpPath,
    message: &IkeMessage,
    raw: &[u8],
) -> Result<()> {
    debug!(peer = %path.peer, "handle INFORMATIONAL");

    let local_spi = message.header.responder_spi;
    let sa_handle = match ctx.ike_sas.get(local_spi) {
        Some(handle) => handle,
        None => {
            warn!("unrecognized SPI on INFORMATIONAL");
            return reply_plain_notify(
                ctx,
                path,
                0,
                message.header.responder_spi,
                ExchangeType::Informational,
                message.header.message_id,
                notify::INVALID_IKE_SPI,
                Vec::new(),
            )
            .await;
        }
    };
    let mut sa = sa_handle.lock().await;

    let decrypted = open_sk(&sa, message, raw)?;

    // Any authenticated INFORMATIONAL proves the peer alive
    if let Some(handle) = sa.dpd.take() {
        handle.acknowledge();
    }

    if decrypted.is_empty() {
        debug!("DPD reply");
        return Ok(());
    }

    for payload in &decrypted {
        match payload {
            IkePayload::Delete(delete) => {
                let ran_ngap_id = ctx
                    .ngap_ids
                    .get(sa.local_spi)
                    .ok_or_else(|| Error::InvalidState("no RAN NGAP id for SA".into()))?;

                match delete.protocol_id {
                    super::constants::ProtocolId::Ike => {
                        info!("Delete(IKE) received, releasing SA");
                        ctx.cleanup_sa_resources(&mut sa);
                        ctx.ike_sas.remove(sa.local_spi);
                        ctx.ngap_ids.remove(sa.local_spi);
                        send_ngap(
                            &ctx.ngap_tx,
                            NgapEvent::SendUeContextReleaseComplete { ran_ngap_id },
                        )?;
                    }
                    super::constants::ProtocolId::Esp => {
                        info!(spis = ?delete.spis, "Delete(ESP) received");
                        if let Some(ue) = sa.ike_ue.as_mut() {
                            for spi in &delete.spis {
                                if let Some(child) = ue.child_sas.remove(spi) {
                                    let _ = ctx.xfrm.remove(&child);
                                    ctx.child_spis.release(*spi);
                                }
                            }
                        }
                        send_ngap(
                            &ctx.ngap_tx,
                            NgapEvent::SendPduSessionResourceReleaseRes { ran_ngap_id },
                        )?;
                    }
                    super::constants::ProtocolId::Ah => {
                        warn!("Delete for unsupported AH protocol");
                    }
                }
            }
            other => debug!(
                payload_type = other.type_code(),
                "payload not handled in INFORMATIONAL"
            ),
        }
    }

    sa.responder_message_id += 1;
    Ok(())
}

// ---------------------------------------------------------------------------
// NGAP-originated events
// ---------------------------------------------------------------------------

/// Handle one event from the NGAP subsystem
///
/// Every event carries the local SPI; a missing SA means it was deleted
/// while the event was in flight, and the event is dropped without side
/// effects.
pub async fn handle_event(ctx: &Arc<IkeContext>, event: IkeEvent) -> Result<()> {
    match event {
        IkeEvent::UnmarshalEap5GDataResponse {
            local_spi,
            ran_ngap_id,
            nas_pdu,
        } => {
            let sa_handle = require_sa(ctx, local_spi)?;
            let mut sa = sa_handle.lock().await;

            if sa.ike_ue.is_none() {
                sa.ike_ue = Some(IkeUe::new());
            }
            ctx.ngap_ids.bind(local_spi, ran_ngap_id);

            let path = sa.path.ok_or_else(|| Error::InvalidState("no cached UDP path".into()))?;
            send_ngap(
                &ctx.ngap_tx,
                NgapEvent::SendInitialUeMessage {
                    ran_ngap_id,
                    ue_addr: *path.peer.ip(),
                    ue_port: path.peer.port(),
                    nas_pdu,
                },
            )?;
            Ok(())
        }

        IkeEvent::SendEap5GFailureMsg { local_spi } => {
            let sa_handle = require_sa(ctx, local_spi)?;
            let mut sa = sa_handle.lock().await;
            warn!(
                local_spi = format_args!("0x{:016x}", local_spi),
                "EAP-5G failure from NGAP"
            );

            let path = sa.path.ok_or_else(|| Error::InvalidState("no cached UDP path".into()))?;
            let identifier = ctx.rng.next_u8();
            let inner = [IkePayload::Eap(EapPayload::failure(identifier))];
            let message_id = sa.initiator_message_id;
            reply_encrypted(ctx, &mut sa, path, ExchangeType::IkeAuth, message_id, &inner).await
        }

        IkeEvent::SendEapSuccessMsg {
            local_spi,
            kn3iwf,
            pdu_session_count,
        } => {
            let sa_handle = require_sa(ctx, local_spi)?;
            let mut sa = sa_handle.lock().await;

            if let Some(ue) = sa.ike_ue.as_mut() {
                if let Some(kn3iwf) = kn3iwf {
                    ue.kn3iwf = Some(zeroize::Zeroizing::new(kn3iwf));
                }
                ue.pdu_session_count = pdu_session_count;
            }

            let path = sa.path.ok_or_else(|| Error::InvalidState("no cached UDP path".into()))?;
            let identifier = fresh_eap_identifier(&mut sa, ctx);
            let inner = [IkePayload::Eap(EapPayload::success(identifier))];
            let message_id = sa.initiator_message_id;
            reply_encrypted(ctx, &mut sa, path, ExchangeType::IkeAuth, message_id, &inner).await?;
            sa.state.advance();
            Ok(())
        }

        IkeEvent::SendEapNasMsg { local_spi, nas_pdu } => {
            let sa_handle = require_sa(ctx, local_spi)?;
            let mut sa = sa_handle.lock().await;

            let path = sa.path.ok_or_else(|| Error::InvalidState("no cached UDP path".into()))?;
            let identifier = fresh_eap_identifier(&mut sa, ctx);
            let inner = [IkePayload::Eap(EapPayload::eap5g_nas(identifier, &nas_pdu))];
            let message_id = sa.initiator_message_id;
            reply_encrypted(ctx, &mut sa, path, ExchangeType::IkeAuth, message_id, &inner).await
        }

        IkeEvent::CreatePduSession {
            local_spi,
            setup_data,
            pdu_session_count,
        } => {
            let sa_handle = require_sa(ctx, local_spi)?;
            let mut sa = sa_handle.lock().await;
            if let Some(ue) = sa.ike_ue.as_mut() {
                ue.pdu_session_count = pdu_session_count;
            }
            create_pdu_session_child_sa(ctx, &mut sa, setup_data).await
        }

        IkeEvent::IkeDeleteRequest { local_spi } => {
            let sa_handle = require_sa(ctx, local_spi)?;
            let mut sa = sa_handle.lock().await;
            send_informational_delete(ctx, &mut sa, DeletePayload::ike()).await
        }

        IkeEvent::SendChildSaDeleteRequest {
            local_spi,
            release_ids,
        } => {
            let sa_handle = require_sa(ctx, local_spi)?;
            let mut sa = sa_handle.lock().await;

            let spis: Vec<u32> = sa
                .ike_ue
                .as_ref()
                .map(|ue| {
                    ue.child_sas
                        .values()
                        .filter(|child| {
                            child
                                .pdu_session_id
                                .map(|id| release_ids.contains(&id))
                                .unwrap_or(false)
                        })
                        .map(|child| child.inbound_spi)
                        .collect()
                })
                .unwrap_or_default();
            if spis.is_empty() {
                debug!("no Child SAs match the release list");
                return Ok(());
            }
            send_informational_delete(ctx, &mut sa, DeletePayload::esp(spis)).await
        }

        IkeEvent::IkeContextUpdate { local_spi, kn3iwf } => {
            let sa_handle = require_sa(ctx, local_spi)?;
            let mut sa = sa_handle.lock().await;
            if let (Some(ue), Some(kn3iwf)) = (sa.ike_ue.as_mut(), kn3iwf) {
                ue.kn3iwf = Some(zeroize::Zeroizing::new(kn3iwf));
            }
            Ok(())
        }

        IkeEvent::GetNgapContextResponse {
            local_spi,
            setup_data,
        } => {
            let sa_handle = require_sa(ctx, local_spi)?;
            let mut sa = sa_handle.lock().await;
            match sa.state {
                IkeState::EndSignalling => {
                    create_pdu_session_child_sa(ctx, &mut sa, setup_data).await?;
                    sa.state.advance();
                    dpd::spawn(ctx.clone(), local_spi);
                    Ok(())
                }
                IkeState::HandleCreateChildSa => {
                    continue_create_child_sa(ctx, &mut sa, setup_data).await
                }
                state => {
                    debug!(?state, "NGAP context response in unexpected state, dropped");
                    Ok(())
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn require_sa(
    ctx: &Arc<IkeContext>,
    local_spi: u64,
) -> Result<Arc<tokio::sync::Mutex<IkeSa>>> {
    ctx.ike_sas.get(local_spi).ok_or(Error::SaNotFound(local_spi))
}

fn open_sk(sa: &IkeSa, message: &IkeMessage, raw: &[u8]) -> Result<Vec<IkePayload>> {
    let sk_payload = message
        .payloads
        .iter()
        .find_map(|p| match p {
            IkePayload::Encrypted(sk) => Some(sk),
            _ => None,
        })
        .ok_or(Error::MissingPayload("SK"))?;
    sk::open(sa, raw, sk_payload)
}

fn resolve_ike_crypto(chosen: &super::proposal::Proposal) -> Result<IkeSaCrypto> {
    let encr = chosen
        .get_transform(TransformType::Encr)
        .and_then(EncrAlgorithm::from_transform)
        .ok_or_else(|| Error::Crypto("chosen encryption transform unusable".into()))?;
    let integ = chosen
        .get_transform(TransformType::Integ)
        .and_then(|t| IntegAlgorithm::from_transform_id(t.transform_id))
        .ok_or_else(|| Error::Crypto("chosen integrity transform unusable".into()))?;
    let prf = chosen
        .get_transform(TransformType::Prf)
        .and_then(|t| PrfAlgorithm::from_transform_id(t.transform_id))
        .ok_or_else(|| Error::Crypto("chosen PRF transform unusable".into()))?;
    let dh_group = chosen
        .get_transform(TransformType::Dh)
        .and_then(|t| DhGroup::from_group_number(t.transform_id))
        .ok_or_else(|| Error::Crypto("chosen DH group unusable".into()))?;
    Ok(IkeSaCrypto {
        encr,
        integ,
        prf,
        dh_group,
    })
}

/// ESP encryption key length in bytes for a kernel-accepted transform
fn esp_encr_key_len(t: &Transform) -> Result<usize> {
    use transform_id::*;
    match t.transform_id {
        ENCR_DES => Ok(8),
        ENCR_3DES => Ok(24),
        ENCR_CAST | ENCR_BLOWFISH => Ok(16),
        ENCR_NULL => Ok(0),
        ENCR_AES_CBC | ENCR_AES_CTR => t
            .key_length
            .map(|bits| bits as usize / 8)
            .ok_or_else(|| Error::Crypto("AES transform without key length".into())),
        other => Err(Error::Crypto(format!("unsupported ESP cipher {}", other))),
    }
}

/// ESP integrity key length in bytes
fn esp_integ_key_len(t: &Transform) -> usize {
    use transform_id::*;
    match t.transform_id {
        AUTH_HMAC_MD5_96 | AUTH_AES_XCBC_96 => 16,
        AUTH_HMAC_SHA1_96 => 20,
        _ => 0,
    }
}

fn derive_child_keys(
    prf: PrfAlgorithm,
    sk_d: &[u8],
    concatenated_nonce: &[u8],
    child: &super::sa::ChildSa,
) -> Result<ChildSaKeys> {
    let encr_len = esp_encr_key_len(&child.encr_transform)?;
    let integ_len = child
        .integ_transform
        .as_ref()
        .map(esp_integ_key_len)
        .unwrap_or(0);
    Ok(ChildSaKeys::derive(
        prf,
        sk_d,
        concatenated_nonce,
        encr_len,
        integ_len,
    ))
}

fn fresh_eap_identifier(sa: &mut IkeSa, ctx: &Arc<IkeContext>) -> u8 {
    loop {
        let identifier = ctx.rng.next_u8();
        if identifier != sa.last_eap_identifier {
            sa.last_eap_identifier = identifier;
            return identifier;
        }
    }
}

fn certreq_matches_ca(ctx: &Arc<IkeContext>, encoding: u8, authority: &[u8]) -> bool {
    let ca = match &ctx.config.ca_certificate {
        Some(ca) => ca,
        None => return false,
    };
    if encoding != cert_encoding::X509_SIGNATURE {
        return false;
    }
    let digest = sign::sha1_digest(ca);
    authority.chunks(20).any(|chunk| chunk == digest)
}

fn notify_nas_ip4_address(addr: std::net::Ipv4Addr) -> IkePayload {
    IkePayload::Notify(NotifyPayload::new(
        notify::NAS_IP4_ADDRESS,
        addr.octets().to_vec(),
    ))
}

fn notify_up_ip4_address(addr: std::net::Ipv4Addr) -> IkePayload {
    IkePayload::Notify(NotifyPayload::new(
        notify::UP_IP4_ADDRESS,
        addr.octets().to_vec(),
    ))
}

fn notify_nas_tcp_port(port: u16) -> IkePayload {
    IkePayload::Notify(NotifyPayload::new(
        notify::NAS_TCP_PORT,
        port.to_be_bytes().to_vec(),
    ))
}

/// 5G_QOS_INFO notify data: length, PDU session id, QFI count, QFIs, flags
fn notify_5g_qos_info(pdu_session_id: u8, qfi_list: &[u8], is_default: bool) -> IkePayload {
    let mut data = vec![0u8];
    data.push(pdu_session_id);
    data.push(qfi_list.len() as u8);
    data.extend_from_slice(qfi_list);
    data.push(if is_default { 0x01 } else { 0x00 });
    data[0] = data.len() as u8;
    IkePayload::Notify(NotifyPayload::new(notify::QOS_INFO_5G, data))
}

async fn reply_invalid_major_version(
    ctx: &Arc<IkeContext>,
    path: UdpPath,
    message: &IkeMessage,
) -> Result<()> {
    warn!("received IKE message with higher major version");
    reply_plain_notify(
        ctx,
        path,
        message.header.initiator_spi,
        message.header.responder_spi,
        ExchangeType::Informational,
        message.header.message_id,
        notify::INVALID_MAJOR_VERSION,
        Vec::new(),
    )
    .await
}

#[allow(clippy::too_many_arguments)]
async fn reply_plain_notify(
    ctx: &Arc<IkeContext>,
    path: UdpPath,
    initiator_spi: u64,
    responder_spi: u64,
    exchange_type: ExchangeType,
    message_id: u32,
    notify_type: u16,
    data: Vec<u8>,
) -> Result<()> {
    let mut response = IkeMessage::new(
        initiator_spi,
        responder_spi,
        exchange_type,
        IkeFlags::response(),
        message_id,
    );
    response
        .payloads
        .push(IkePayload::Notify(NotifyPayload::new(notify_type, data)));
    ctx.send_to(path.peer, &response.to_bytes()).await
}

fn seal_response(
    sa: &mut IkeSa,
    ctx: &Arc<IkeContext>,
    exchange_type: ExchangeType,
    message_id: u32,
    inner: &[IkePayload],
) -> Result<Vec<u8>> {
    let mut response = IkeMessage::new(
        sa.remote_spi,
        sa.local_spi,
        exchange_type,
        IkeFlags::response(),
        message_id,
    );
    sk::seal(sa, ctx.rng.as_ref(), &mut response, inner)
}

async fn reply_encrypted(
    ctx: &Arc<IkeContext>,
    sa: &mut IkeSa,
    path: UdpPath,
    exchange_type: ExchangeType,
    message_id: u32,
    inner: &[IkePayload],
) -> Result<()> {
    let bytes = seal_response(sa, ctx, exchange_type, message_id, inner)?;
    ctx.send_to(path.peer, &bytes).await
}

async fn send_informational_delete(
    ctx: &Arc<IkeContext>,
    sa: &mut IkeSa,
    delete: DeletePayload,
) -> Result<()> {
    let path = sa.path.ok_or_else(|| Error::InvalidState("no cached UDP path".into()))?;
    let mut request = IkeMessage::new(
        sa.remote_spi,
        sa.local_spi,
        ExchangeType::Informational,
        IkeFlags::request(),
        sa.responder_message_id,
    );
    let inner = [IkePayload::Delete(delete)];
    let bytes = sk::seal(sa, ctx.rng.as_ref(), &mut request, &inner)?;
    ctx.send_to(path.peer, &bytes).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ike::constants::ProtocolId;
    use crate::ike::proposal::Proposal;

    #[test]
    fn test_qos_info_notify_layout() {
        let payload = notify_5g_qos_info(5, &[1, 2], true);
        let data = match payload {
            IkePayload::Notify(n) => {
                assert_eq!(n.notify_type, notify::QOS_INFO_5G);
                n.data
            }
            other => panic!("expected notify, got {:?}", other),
        };
        // length byte, session id, QFI count, QFIs, flags
        assert_eq!(data, vec![6, 5, 2, 1, 2, 0x01]);
        assert_eq!(data[0] as usize, data.len());
    }

    #[test]
    fn test_esp_key_lengths() {
        assert_eq!(esp_encr_key_len(&Transform::encr_aes_cbc(256)).unwrap(), 32);
        assert_eq!(
            esp_encr_key_len(&Transform::new(TransformType::Encr, transform_id::ENCR_3DES))
                .unwrap(),
            24
        );
        assert_eq!(
            esp_encr_key_len(&Transform::new(TransformType::Encr, transform_id::ENCR_NULL))
                .unwrap(),
            0
        );
        assert!(esp_encr_key_len(&Transform::new(
            TransformType::Encr,
            transform_id::ENCR_AES_CBC
        ))
        .is_err());

        assert_eq!(
            esp_integ_key_len(&Transform::new(
                TransformType::Integ,
                transform_id::AUTH_HMAC_SHA1_96
            )),
            20
        );
        assert_eq!(
            esp_integ_key_len(&Transform::new(
                TransformType::Integ,
                transform_id::AUTH_AES_XCBC_96
            )),
            16
        );
    }

    #[test]
    fn test_resolve_ike_crypto_from_chosen_quadruple() {
        let chosen = Proposal::new(1, ProtocolId::Ike)
            .add_transform(Transform::encr_aes_cbc(192))
            .add_transform(Transform::new(TransformType::Prf, transform_id::PRF_HMAC_MD5))
            .add_transform(Transform::new(
                TransformType::Integ,
                transform_id::AUTH_HMAC_MD5_96,
            ))
            .add_transform(Transform::new(TransformType::Dh, transform_id::DH_1024_MODP));

        let crypto = resolve_ike_crypto(&chosen).unwrap();
        assert_eq!(crypto.encr, EncrAlgorithm::AesCbc192);
        assert_eq!(crypto.integ, IntegAlgorithm::HmacMd5_96);
        assert_eq!(crypto.prf, PrfAlgorithm::HmacMd5);
        assert_eq!(crypto.dh_group, DhGroup::Modp1024);
    }

    #[test]
    fn test_resolve_ike_crypto_rejects_incomplete() {
        let chosen = Proposal::new(1, ProtocolId::Ike)
            .add_transform(Transform::encr_aes_cbc(256));
        assert!(matches!(resolve_ike_crypto(&chosen), Err(Error::Crypto(_))));
    }
}
