//! Bech32 encoding of recipients and identities.

use bech32::{FromBase32, ToBase32, Variant};
use secrecy::{Secret, SecretVec};

use crate::{error::Error, primitives::p256::PublicKey, IDENTITY_HRP, RECIPIENT_HRP};

/// Encodes `data` as a Bech32 string with the given human-readable prefix.
///
/// The output is lowercase regardless of the case of `hrp`.
pub fn encode(hrp: &str, data: &[u8]) -> Result<String, Error> {
    bech32::encode(hrp, data.to_base32(), Variant::Bech32).map_err(Error::from)
}

/// Decodes a Bech32 string into its lowercased human-readable prefix and data.
///
/// Fails with [`Error::InvalidEncoding`] if the checksum does not verify, the string
/// is malformed or mixed-case, or it uses the Bech32m checksum.
pub fn decode(s: &str) -> Result<(String, Vec<u8>), Error> {
    let (hrp, data, variant) = bech32::decode(s)?;
    if let Variant::Bech32m = variant {
        return Err(Error::InvalidEncoding);
    }
    let data = Vec::<u8>::from_base32(&data)?;
    Ok((hrp, data))
}

/// Decodes a Bech32 string, requiring its prefix to be `expected`.
///
/// Prefixes are compared ignoring case, as Bech32 strings are case-insensitive.
pub fn decode_with_hrp(s: &str, expected: &str) -> Result<Vec<u8>, Error> {
    let (hrp, data) = decode(s)?;
    if hrp.eq_ignore_ascii_case(expected) {
        Ok(data)
    } else {
        Err(Error::UnknownHrp(hrp))
    }
}

/// Parses an `age1applese` recipient string.
pub fn parse_recipient(s: &str) -> Result<PublicKey, Error> {
    let data = decode_with_hrp(s, RECIPIENT_HRP)?;
    PublicKey::from_bytes(&data).ok_or(Error::InvalidEncoding)
}

/// Parses an `AGE-PLUGIN-APPLESE-` identity string into its opaque private key.
pub fn parse_identity(s: &str) -> Result<SecretVec<u8>, Error> {
    decode_with_hrp(s, IDENTITY_HRP).map(Secret::new)
}

/// Serializes a public key as a recipient string.
pub fn recipient_to_string(pk: &PublicKey) -> String {
    encode(RECIPIENT_HRP, pk.as_bytes()).expect("HRP is valid")
}

/// Serializes an opaque private key as an identity string.
pub fn identity_to_string(private_key: &[u8]) -> String {
    encode(IDENTITY_HRP, private_key)
        .expect("HRP is valid")
        .to_uppercase()
}
