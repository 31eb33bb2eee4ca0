//! Creation of new identities, and conversion of identities to recipients.

use chrono::{DateTime, SecondsFormat, Utc};
use log::debug;
use secrecy::{ExposeSecret, SecretString};

use crate::{
    encoding::{identity_to_string, parse_identity, recipient_to_string},
    error::Error,
    provider::{AccessPolicy, KeyProvider},
};

/// Generates a new identity gated by `policy`.
///
/// Returns the contents of an identity file, and the corresponding recipient:
///
/// ```text
/// # created: 2023-01-01T00:00:00Z
/// # access control: any biometry or passcode
/// # public key: age1applese1...
/// AGE-PLUGIN-APPLESE-1...
/// ```
pub fn generate<P: KeyProvider>(
    provider: &P,
    policy: AccessPolicy,
    now: DateTime<Utc>,
) -> Result<(SecretString, String), Error> {
    if !provider.is_available() {
        return Err(Error::Unsupported);
    }

    let (public_key, private_key) = provider.generate(policy)?;
    let recipient = recipient_to_string(&public_key);
    let identity = identity_to_string(private_key.expose_secret());

    let contents = format!(
        "# created: {}\n# access control: {}\n# public key: {}\n{}\n",
        now.to_rfc3339_opts(SecondsFormat::Secs, true),
        policy.description(),
        recipient,
        identity,
    );

    Ok((SecretString::new(contents), recipient))
}

/// Returns the recipient for every identity in an identity file.
///
/// Blank lines and `#` comments are skipped. Any other line must be a valid identity.
pub fn recipients<P: KeyProvider>(provider: &P, identities: &str) -> Result<Vec<String>, Error> {
    identities
        .lines()
        .map(str::trim)
        .filter(|line| !(line.is_empty() || line.starts_with('#')))
        .map(|line| -> Result<String, Error> {
            let private_key = parse_identity(line)?;
            let public_key = provider.public_key_from(private_key.expose_secret())?;
            let recipient = recipient_to_string(&public_key);
            debug!("Converted identity to {}", recipient);
            Ok(recipient)
        })
        .collect()
}
