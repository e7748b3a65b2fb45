//! IKEv2 responder core (RFC 7296, profiled for 5G untrusted access)
//!
//! This module implements the N3IWF side of the IKEv2 control plane:
//!
//! - **IKE_SA_INIT** - transform negotiation, Diffie-Hellman, NAT detection
//! - **IKE_AUTH** - multi-round exchange carrying EAP-5G towards the AMF
//! - **CREATE_CHILD_SA** - one ESP Child SA per PDU session
//! - **INFORMATIONAL** - DPD and Delete handling
//!
//! # Architecture
//!
//! ```text
//! UDP 500/4500                      NGAP subsystem
//!   │ datagram                        ▲   │ IkeEvent
//!   ▼                                 │   ▼
//! server ──► handler (state machine) ─┴─► event channel
//!                 │
//!                 ├──► sk / crypto (keys, seal/open)
//!                 └──► xfrm driver (kernel SA + policy)
//! ```
//!
//! Each inbound datagram is handled under its IKE SA's lock, so state
//! transitions for one SA are linearizable while distinct SAs progress
//! concurrently. NGAP-originated events re-enter through the same lock.
//!
//! # References
//!
//! - [RFC 7296](https://datatracker.ietf.org/doc/html/rfc7296) - IKEv2
//! - [RFC 3948](https://datatracker.ietf.org/doc/html/rfc3948) - NAT-T
//! - 3GPP TS 24.502 - EAP-5G and the 3GPP-private notify types

pub mod config;
pub mod constants;
pub mod crypto;
pub mod dpd;
pub mod eap5g;
pub mod error;
pub mod event;
pub mod handler;
pub mod message;
pub mod nat;
pub mod payload;
pub mod proposal;
pub mod sa;
pub mod server;
pub mod sk;
pub mod store;
pub mod xfrm;

pub use config::N3iwfConfig;
pub use error::{Error, Result};
pub use server::IkeServer;
