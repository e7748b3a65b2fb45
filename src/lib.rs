//! # n3iwf-ike
//!
//! IKEv2 responder core for a 5G Non-3GPP Interworking Function (N3IWF).
//!
//! This crate terminates untrusted-access IPsec tunnels from 5G UEs: it runs
//! the IKEv2 responder state machine, relays the EAP-5G authentication
//! exchange towards the AMF-facing (NGAP) subsystem, negotiates ESP Child SAs
//! for NAS signalling and user-plane PDU sessions, and hands the resulting
//! keys to the kernel XFRM subsystem through a driver trait.
//!
//! The NGAP subsystem and the kernel XFRM driver are collaborators reached
//! through typed events and a trait seam; they are not implemented here.

#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod ike;

pub use ike::{Error, Result};
