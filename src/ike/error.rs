//! Error types for the IKE responder core
//!
//! One unified error type covers wire parsing, negotiation, cryptography and
//! the kernel-driver seam. Handlers propagate with `?`; the dispatcher
//! decides per the error-handling policy whether a notification goes back to
//! the peer or the datagram is dropped silently.

use std::fmt;

/// Result type for IKE operations
pub type Result<T> = std::result::Result<T, Error>;

/// IKE responder errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Malformed IKE message
    InvalidMessage(String),

    /// Malformed or unexpected payload
    InvalidPayload(String),

    /// Peer major version is above 2
    UnsupportedVersion(u8),

    /// Unknown exchange type byte
    UnsupportedExchangeType(u8),

    /// No acceptable proposal in the peer's SA payload
    NoProposalChosen,

    /// KE payload group differs from the chosen DH group; carries the
    /// chosen group number for the INVALID_KE_PAYLOAD notify
    InvalidKePayload(u16),

    /// Peer AUTH verification failed
    AuthenticationFailed,

    /// No IKE SA for the given local SPI
    SaNotFound(u64),

    /// No Child SA for the given inbound SPI
    ChildSaNotFound(u32),

    /// Cryptographic operation failed
    Crypto(String),

    /// Integrity checksum mismatch on an SK payload
    ChecksumFailed,

    /// Required payload missing from an exchange
    MissingPayload(&'static str),

    /// Buffer too short while parsing
    BufferTooShort {
        /// Bytes required
        required: usize,
        /// Bytes available
        available: usize,
    },

    /// Length field inconsistent with the enclosing slice
    InvalidLength {
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// Exchange arrived in a state that cannot accept it
    InvalidState(String),

    /// Kernel XFRM driver reported a failure
    Xfrm(String),

    /// Inner IPv4 pool exhausted
    IpPoolExhausted,

    /// NGAP event channel is closed or full
    EventChannel(String),

    /// Configuration is invalid
    InvalidConfig(String),

    /// I/O error
    Io(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidMessage(msg) => write!(f, "invalid IKE message: {}", msg),
            Error::InvalidPayload(msg) => write!(f, "invalid IKE payload: {}", msg),
            Error::UnsupportedVersion(v) => write!(f, "unsupported IKE major version: {}", v),
            Error::UnsupportedExchangeType(t) => write!(f, "unsupported exchange type: {}", t),
            Error::NoProposalChosen => write!(f, "no acceptable proposal"),
            Error::InvalidKePayload(group) => {
                write!(f, "KE payload group mismatch, chosen group {}", group)
            }
            Error::AuthenticationFailed => write!(f, "peer authentication failed"),
            Error::SaNotFound(spi) => write!(f, "no IKE SA for local SPI 0x{:016x}", spi),
            Error::ChildSaNotFound(spi) => write!(f, "no Child SA for inbound SPI 0x{:08x}", spi),
            Error::Crypto(msg) => write!(f, "cryptographic error: {}", msg),
            Error::ChecksumFailed => write!(f, "SK payload checksum verification failed"),
            Error::MissingPayload(name) => write!(f, "required payload missing: {}", name),
            Error::BufferTooShort {
                required,
                available,
            } => write!(f, "buffer too short: need {}, have {}", required, available),
            Error::InvalidLength { expected, actual } => {
                write!(f, "invalid length: expected {}, got {}", expected, actual)
            }
            Error::InvalidState(msg) => write!(f, "invalid state: {}", msg),
            Error::Xfrm(msg) => write!(f, "XFRM driver error: {}", msg),
            Error::IpPoolExhausted => write!(f, "inner IPv4 address pool exhausted"),
            Error::EventChannel(msg) => write!(f, "event channel error: {}", msg),
            Error::InvalidConfig(msg) => write!(f, "invalid configuration: {}", msg),
            Error::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::SaNotFound(0x1122334455667788);
        assert_eq!(err.to_string(), "no IKE SA for local SPI 0x1122334455667788");

        let err = Error::InvalidKePayload(14);
        assert!(err.to_string().contains("chosen group 14"));

        let err = Error::BufferTooShort {
            required: 28,
            available: 4,
        };
        assert!(err.to_string().contains("need 28"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::AddrInUse, "address in use");
        let err: Error = io_err.into();
        match err {
            Error::Io(msg) => assert!(msg.contains("address in use")),
            _ => panic!("expected Io error"),
        }
    }
}
