//! age plugin for P-256 keys held in a hardware security module.
//!
//! # Keys
//!
//! Recipients are encoded using Bech32 with the HRP "age1applese"; the data is the
//! compressed SEC1 encoding of a NIST P-256 public key. Identities are encoded using
//! Bech32 with the HRP "AGE-PLUGIN-APPLESE-"; the data is an opaque reference to a
//! private key, understood only by the [`KeyProvider`] that created it.
//!
//! # Protocol
//!
//! The plugin speaks the age plugin protocol on stdin/stdout. Every message is a
//! stanza:
//!
//! ```text
//! -> TAG ARG1 ARG2 ...
//! Base64(first 48 bytes of body)
//! Base64(next 48 bytes of body)
//! Base64(last chunk of body, shorter than 48 bytes and possibly empty)
//! ```
//!
//! Two state machines are supported, selected by `--age-plugin=NAME`.
//!
//! ## recipient-v1
//!
//! The client sends any number of `add-recipient RECIPIENT`, `add-identity IDENTITY`
//! and `wrap-file-key` (body: the file key) stanzas, followed by `done`. The plugin then
//! wraps every file key to every recipient and identity, and replies with:
//!
//! - `recipient-stanza FILE_INDEX piv-p256 Base64(TAG) Base64(EPK)` with the sealed
//!   file key as its body, once per (file key, recipient) pair.
//! - `error recipient INDEX` for a recipient or identity that could not be parsed.
//! - `error internal` if a file key could not be sealed.
//!
//! ## identity-v1
//!
//! The client sends any number of `add-identity IDENTITY` and `recipient-stanza`
//! stanzas, followed by `done`. The plugin replies with `file-key FILE_INDEX` (body:
//! the unwrapped file key) at most once per file index, and `error identity INDEX` for
//! identities that could not be loaded.
//!
//! In both state machines the client acknowledges every response with `ok`, and the
//! plugin ends the exchange with `done`.
//!
//! ## Key wrapping
//!
//! ```text
//! ESK, EPK = P256.generate()
//! SHARED = ECDH(ESK, PK)
//! KEY = HKDF-SHA-256(ikm = SHARED, salt = EPK || PK, info = "piv-p256")
//! BODY = ChaCha20-Poly1305(key = KEY, nonce = 0, plaintext = FILE_KEY)
//! TAG = SHA-256(PK)[..4]
//! ```
//!
//! Every wrap uses a fresh ephemeral key, so the derived key is never reused.

#![deny(missing_docs)]

use std::fmt;
use std::str::FromStr;

mod connection;
pub mod encoding;
mod error;
mod format;
pub mod identity;
pub mod keygen;
mod piv;
mod primitives;
pub mod provider;
pub mod recipient;

pub use connection::Connection;
pub use error::Error;
pub use format::Stanza;
pub use primitives::p256::PublicKey;
pub use provider::{AccessPolicy, KeyProvider};

/// The HRP for recipient strings.
pub const RECIPIENT_HRP: &str = "age1applese";

/// The HRP for identity strings.
pub const IDENTITY_HRP: &str = "AGE-PLUGIN-APPLESE-";

const RECIPIENT_V1: &str = "recipient-v1";
const IDENTITY_V1: &str = "identity-v1";

/// The plugin state machines that an age client can ask for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StateMachine {
    /// Wrap file keys to recipients.
    RecipientV1,
    /// Unwrap file keys with identities.
    IdentityV1,
}

impl FromStr for StateMachine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            RECIPIENT_V1 => Ok(StateMachine::RecipientV1),
            IDENTITY_V1 => Ok(StateMachine::IdentityV1),
            _ => Err(format!("Unknown state machine: {}", s)),
        }
    }
}

impl fmt::Display for StateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateMachine::RecipientV1 => write!(f, "{}", RECIPIENT_V1),
            StateMachine::IdentityV1 => write!(f, "{}", IDENTITY_V1),
        }
    }
}

/// Runs the given state machine against an age client on stdin/stdout.
///
/// Returns once the plugin has sent its final `done` stanza. An error is returned if
/// the client closes the connection early or sends a malformed stanza.
pub fn run_state_machine<P: KeyProvider>(
    state_machine: StateMachine,
    provider: &P,
) -> Result<(), Error> {
    let mut conn = Connection::stdio();
    match state_machine {
        StateMachine::RecipientV1 => recipient::run(provider, &mut conn),
        StateMachine::IdentityV1 => identity::run(provider, &mut conn),
    }
}
