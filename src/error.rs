//! Error types
//!
//! Only RTP header parsing can fail. Classification and caching degrade to
//! "nothing detected" instead of returning errors.

use std::fmt;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// RTP packet could not be parsed
    Rtp(RtpError),
}

/// RTP header parsing errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RtpError {
    /// Fewer bytes than the 12-byte fixed header
    TooShort(usize),
    /// Version field is not 2
    UnsupportedVersion(u8),
    /// CSRC list runs past the end of the packet
    TruncatedCsrc { count: u8, len: usize },
    /// Header extension runs past the end of the packet
    TruncatedExtension { needed: usize, len: usize },
    /// Padding count is zero or larger than the remaining payload
    InvalidPadding(u8),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Rtp(e) => write!(f, "RTP error: {}", e),
        }
    }
}

impl fmt::Display for RtpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RtpError::TooShort(len) => write!(f, "packet too short: {} bytes", len),
            RtpError::UnsupportedVersion(v) => write!(f, "unsupported RTP version: {}", v),
            RtpError::TruncatedCsrc { count, len } => {
                write!(f, "CSRC list of {} entries truncated at {} bytes", count, len)
            }
            RtpError::TruncatedExtension { needed, len } => {
                write!(f, "header extension needs {} bytes, packet has {}", needed, len)
            }
            RtpError::InvalidPadding(n) => write!(f, "invalid padding length: {}", n),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Rtp(e) => Some(e),
        }
    }
}

impl std::error::Error for RtpError {}

impl From<RtpError> for Error {
    fn from(e: RtpError) -> Self {
        Error::Rtp(e)
    }
}
