use secrecy::SecretVec;

use super::{AccessPolicy, KeyProvider};
use crate::{error::Error, primitives::p256::PublicKey};

/// The platform key provider.
///
/// This build has no binding to a hardware key module, so it always reports itself as
/// unavailable and every key operation fails with [`Error::Unsupported`]. Recipients can
/// still be wrapped to, since that needs no private key.
// TODO: Bind CryptoKit's SecureEnclave.P256.KeyAgreement through a Swift shim on macOS.
#[derive(Clone, Copy, Debug, Default)]
pub struct SecureEnclave;

impl KeyProvider for SecureEnclave {
    fn is_available(&self) -> bool {
        false
    }

    fn generate(&self, _: AccessPolicy) -> Result<(PublicKey, SecretVec<u8>), Error> {
        Err(Error::Unsupported)
    }

    fn agree(&self, _: &[u8], _: &PublicKey) -> Result<SecretVec<u8>, Error> {
        Err(Error::Unsupported)
    }

    fn public_key_from(&self, _: &[u8]) -> Result<PublicKey, Error> {
        Err(Error::Unsupported)
    }
}
