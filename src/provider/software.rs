//! An in-memory key provider.
//!
//! The opaque private key serialization is the raw P-256 scalar, so keys from this
//! provider have none of the protection of a hardware module. It exists so that the
//! protocol engines can be exercised deterministically without one.

use log::debug;
use p256::{ecdh::diffie_hellman, SecretKey};
use rand::rngs::OsRng;
use secrecy::{Secret, SecretVec};

use super::{AccessPolicy, KeyProvider};
use crate::{error::Error, primitives::p256::PublicKey};

/// A [`KeyProvider`] that keeps private keys in memory.
#[derive(Clone, Copy, Debug, Default)]
pub struct SoftwareProvider;

fn secret_key(private_key: &[u8]) -> Result<SecretKey, Error> {
    SecretKey::from_slice(private_key).map_err(|_| Error::CryptoFailure)
}

impl KeyProvider for SoftwareProvider {
    fn is_available(&self) -> bool {
        true
    }

    fn generate(&self, policy: AccessPolicy) -> Result<(PublicKey, SecretVec<u8>), Error> {
        debug!("Ignoring access control '{}' for software key", policy);
        let sk = SecretKey::random(&mut OsRng);
        Ok((
            PublicKey::from_pubkey(sk.public_key()),
            Secret::new(sk.to_bytes().to_vec()),
        ))
    }

    fn agree(&self, private_key: &[u8], peer: &PublicKey) -> Result<SecretVec<u8>, Error> {
        let sk = secret_key(private_key)?;
        let shared_secret = diffie_hellman(sk.to_nonzero_scalar(), peer.as_pubkey().as_affine());
        Ok(Secret::new(shared_secret.raw_secret_bytes().to_vec()))
    }

    fn public_key_from(&self, private_key: &[u8]) -> Result<PublicKey, Error> {
        secret_key(private_key).map(|sk| PublicKey::from_pubkey(sk.public_key()))
    }
}
