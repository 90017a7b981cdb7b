//! A dedicated error for everything that can go wrong building or parsing a
//! DNS message: buffer exhaustion, malformed wire input, and the handful of
//! system-level failures (address parsing, formatting) the crate has to let
//! through. Unrecognized record types are not an error at all — the
//! registry falls back to opaque rdata for those (see `rr.rs`).
use std::fmt;
use std::net::AddrParseError;

#[derive(Debug)]
pub enum DnsError {
    /// An append or write would exceed the buffer's capacity.
    BufferExhausted,
    /// The wire data violates a format invariant (bad length, reserved
    /// label bits, pointer loop, truncated record).
    Malformed(&'static str),
    /// A name exceeds the 255-octet wire limit or 63-octet label limit.
    NameTooLong,
    /// A host-level failure: address parsing, formatting, I/O.
    System(String),
}

pub type DnsResult<T> = Result<T, DnsError>;

impl DnsError {
    pub fn malformed(reason: &'static str) -> Self {
        DnsError::Malformed(reason)
    }
}

impl fmt::Display for DnsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DnsError::BufferExhausted => write!(f, "buffer exhausted"),
            DnsError::Malformed(reason) => write!(f, "malformed DNS data: {}", reason),
            DnsError::NameTooLong => write!(f, "domain name too long"),
            DnsError::System(msg) => write!(f, "system error: {}", msg),
        }
    }
}

impl std::error::Error for DnsError {}

impl From<AddrParseError> for DnsError {
    fn from(err: AddrParseError) -> Self {
        DnsError::System(err.to_string())
    }
}

impl From<fmt::Error> for DnsError {
    fn from(err: fmt::Error) -> Self {
        DnsError::System(err.to_string())
    }
}
