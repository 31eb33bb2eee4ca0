//! The `piv-p256` recipient type.

use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};
use p256::ecdh::EphemeralSecret;
use rand::rngs::OsRng;
use secrecy::{ExposeSecret, Secret, SecretVec};
use sha2::{Digest, Sha256};

use crate::{
    error::Error,
    format::{Stanza, CMD_RECIPIENT_STANZA},
    primitives::{aead_decrypt, aead_encrypt, hkdf, p256::PublicKey},
    provider::KeyProvider,
};

pub(crate) const PIV_RECIPIENT_TAG: &str = "piv-p256";
const PIV_RECIPIENT_KEY_LABEL: &[u8] = b"piv-p256";

pub(crate) const TAG_BYTES: usize = 4;

pub(crate) fn piv_tag(pk: &PublicKey) -> [u8; TAG_BYTES] {
    let tag = Sha256::digest(pk.as_bytes());
    (&tag[0..TAG_BYTES]).try_into().expect("length is correct")
}

fn wrapping_key(epk: &PublicKey, pk: &PublicKey, shared_secret: &[u8]) -> Secret<[u8; 32]> {
    let mut salt = vec![];
    salt.extend_from_slice(epk.as_bytes());
    salt.extend_from_slice(pk.as_bytes());

    hkdf(&salt, PIV_RECIPIENT_KEY_LABEL, shared_secret)
}

/// A file key wrapped to a single P-256 public key.
#[derive(Debug)]
pub(crate) struct RecipientLine {
    pub(crate) tag: [u8; TAG_BYTES],
    epk: PublicKey,
    encrypted_file_key: Vec<u8>,
}

impl RecipientLine {
    /// Parses a `recipient-stanza`, returning its file index alongside the wrapped key.
    ///
    /// Returns `None` for stanzas of other recipient types, or with malformed arguments.
    pub(crate) fn from_stanza(stanza: &Stanza) -> Option<(&str, Self)> {
        let (file_index, algorithm, tag, epk) = match &stanza.args[..] {
            [file_index, algorithm, tag, epk] => (file_index, algorithm, tag, epk),
            _ => return None,
        };
        if algorithm != PIV_RECIPIENT_TAG {
            return None;
        }

        let tag = STANDARD_NO_PAD.decode(tag).ok()?.as_slice().try_into().ok()?;
        let epk = PublicKey::from_bytes(&STANDARD_NO_PAD.decode(epk).ok()?)?;

        Some((
            file_index.as_str(),
            RecipientLine {
                tag,
                epk,
                encrypted_file_key: stanza.body.clone(),
            },
        ))
    }

    /// Wraps `file_key` to `pk` under a freshly-generated ephemeral key.
    pub(crate) fn wrap_file_key(file_key: &SecretVec<u8>, pk: &PublicKey) -> Result<Self, Error> {
        let esk = EphemeralSecret::random(&mut OsRng);
        let epk = PublicKey::from_pubkey(esk.public_key());

        let shared_secret = esk.diffie_hellman(pk.as_pubkey());
        let enc_key = wrapping_key(&epk, pk, shared_secret.raw_secret_bytes());

        let encrypted_file_key = aead_encrypt(enc_key.expose_secret(), file_key.expose_secret())?;

        Ok(RecipientLine {
            tag: piv_tag(pk),
            epk,
            encrypted_file_key,
        })
    }

    /// Attempts to unwrap this line with a private key held by `provider`.
    ///
    /// `pk` must be the public key of `private_key`; it is bound into the wrapping key.
    pub(crate) fn unwrap_file_key<P: KeyProvider>(
        &self,
        provider: &P,
        private_key: &[u8],
        pk: &PublicKey,
    ) -> Result<SecretVec<u8>, Error> {
        let shared_secret = provider.agree(private_key, &self.epk)?;
        let enc_key = wrapping_key(&self.epk, pk, shared_secret.expose_secret());

        aead_decrypt(enc_key.expose_secret(), &self.encrypted_file_key)
            .map(Secret::new)
            .map_err(Error::from)
    }

    pub(crate) fn to_stanza(&self, file_index: usize) -> Stanza {
        Stanza::new(
            CMD_RECIPIENT_STANZA,
            vec![
                file_index.to_string(),
                PIV_RECIPIENT_TAG.to_owned(),
                STANDARD_NO_PAD.encode(self.tag),
                STANDARD_NO_PAD.encode(self.epk.as_bytes()),
            ],
            self.encrypted_file_key.clone(),
        )
    }
}
