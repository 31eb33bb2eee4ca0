//! Error type.

use std::fmt;
use std::io;

/// The various errors that can be returned by the plugin.
#[derive(Debug)]
pub enum Error {
    /// The hardware key module is not present on this device.
    Unsupported,
    /// The stream ended in the middle of a stanza.
    IncompleteStanza,
    /// A stanza header or body was malformed.
    InvalidStanza,
    /// A Bech32 string failed to decode.
    InvalidEncoding,
    /// A Bech32 string decoded with a prefix that is not valid where it was used.
    UnknownHrp(String),
    /// Key agreement, sealing or opening failed.
    CryptoFailure,
    /// An I/O error occurred while talking to the client.
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Unsupported => write!(f, "Secure Enclave not supported on this device"),
            Error::IncompleteStanza => write!(f, "Incomplete stanza"),
            Error::InvalidStanza => write!(f, "Invalid stanza"),
            Error::InvalidEncoding => write!(f, "Invalid Bech32 encoding"),
            Error::UnknownHrp(hrp) => write!(f, "Unknown HRP: {}", hrp),
            Error::CryptoFailure => write!(f, "Cryptographic operation failed"),
            Error::Io(e) => e.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(inner) => Some(inner),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<bech32::Error> for Error {
    fn from(_: bech32::Error) -> Self {
        Error::InvalidEncoding
    }
}

impl From<chacha20poly1305::aead::Error> for Error {
    fn from(_: chacha20poly1305::aead::Error) -> Self {
        Error::CryptoFailure
    }
}
