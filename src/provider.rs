//! Access to private keys held in hardware.
//!
//! A private key never leaves its [`KeyProvider`]. The plugin only ever sees an opaque
//! serialization of it, which it stores inside identity strings and hands back to the
//! provider when it needs a key agreement.

use secrecy::SecretVec;
use std::fmt;
use std::str::FromStr;

use crate::{error::Error, primitives::p256::PublicKey};

mod enclave;
pub mod software;

pub use enclave::SecureEnclave;

/// A source of P-256 private keys.
pub trait KeyProvider {
    /// Returns `true` if the hardware module backing this provider is present.
    fn is_available(&self) -> bool;

    /// Generates a new key pair whose private key is gated by `policy`.
    ///
    /// Returns the public key and the opaque serialization of the private key.
    fn generate(&self, policy: AccessPolicy) -> Result<(PublicKey, SecretVec<u8>), Error>;

    /// Performs ECDH between the private key serialized in `private_key` and `peer`,
    /// returning the x-coordinate of the shared point.
    ///
    /// This may block while the user is asked to authorize the use of the key.
    fn agree(&self, private_key: &[u8], peer: &PublicKey) -> Result<SecretVec<u8>, Error>;

    /// Returns the public key for the private key serialized in `private_key`.
    fn public_key_from(&self, private_key: &[u8]) -> Result<PublicKey, Error>;
}

/// What the user must do before a private key can be used.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessPolicy {
    /// No user interaction is required.
    None,
    /// The device passcode.
    Passcode,
    /// Any enrolled biometry.
    AnyBiometry,
    /// Any enrolled biometry, falling back to the device passcode.
    AnyBiometryOrPasscode,
    /// Any enrolled biometry, and the device passcode.
    AnyBiometryAndPasscode,
    /// Biometry enrolled at the time the key was generated.
    CurrentBiometry,
    /// Biometry enrolled at the time the key was generated, and the device passcode.
    CurrentBiometryAndPasscode,
}

const POLICIES: &[(AccessPolicy, &str, &str)] = &[
    (AccessPolicy::None, "none", "none"),
    (AccessPolicy::Passcode, "passcode", "passcode"),
    (AccessPolicy::AnyBiometry, "any-biometry", "any biometry"),
    (
        AccessPolicy::AnyBiometryOrPasscode,
        "any-biometry-or-passcode",
        "any biometry or passcode",
    ),
    (
        AccessPolicy::AnyBiometryAndPasscode,
        "any-biometry-and-passcode",
        "any biometry and passcode",
    ),
    (
        AccessPolicy::CurrentBiometry,
        "current-biometry",
        "current biometry",
    ),
    (
        AccessPolicy::CurrentBiometryAndPasscode,
        "current-biometry-and-passcode",
        "current biometry and passcode",
    ),
];

impl AccessPolicy {
    fn entry(&self) -> &'static (AccessPolicy, &'static str, &'static str) {
        POLICIES
            .iter()
            .find(|(policy, _, _)| policy == self)
            .expect("every policy is listed")
    }

    /// Returns a description of this policy for use in comments.
    pub fn description(&self) -> &'static str {
        self.entry().2
    }
}

impl Default for AccessPolicy {
    fn default() -> Self {
        AccessPolicy::AnyBiometryOrPasscode
    }
}

impl FromStr for AccessPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        POLICIES
            .iter()
            .find(|(_, name, _)| *name == s)
            .map(|(policy, _, _)| *policy)
            .ok_or_else(|| format!("Unknown access control: {}", s))
    }
}

impl fmt::Display for AccessPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.entry().1)
    }
}
