//! The `identity-v1` state machine.
//!
//! The age client hands the plugin its identities and every recipient stanza from the
//! file header; the plugin answers with each file key it manages to unwrap.

use log::{debug, warn};
use secrecy::{ExposeSecret, SecretVec};
use std::collections::HashSet;
use std::io::{BufRead, Write};

use crate::{
    connection::Connection,
    encoding::parse_identity,
    error::Error,
    format::{
        Stanza, CMD_ADD_IDENTITY, CMD_DONE, CMD_RECIPIENT_STANZA, ERR_IDENTITY, RSP_FILE_KEY,
    },
    piv::{piv_tag, RecipientLine, TAG_BYTES},
    primitives::p256::PublicKey,
    provider::KeyProvider,
};

/// Everything the client sent during the first phase.
#[derive(Debug, Default)]
pub struct IdentityState {
    /// Identity strings, in the order they were added.
    pub identities: Vec<String>,
    /// Recipient stanzas from the file header, in order.
    pub recipient_stanzas: Vec<Stanza>,
}

/// An identity whose private key is available through the provider.
struct HeldIdentity {
    private_key: SecretVec<u8>,
    public_key: PublicKey,
    tag: [u8; TAG_BYTES],
}

impl HeldIdentity {
    fn load<P: KeyProvider>(identity: &str, provider: &P) -> Result<Self, Error> {
        let private_key = parse_identity(identity)?;
        let public_key = provider.public_key_from(private_key.expose_secret())?;
        Ok(HeldIdentity {
            tag: piv_tag(&public_key),
            private_key,
            public_key,
        })
    }
}

/// Reads stanzas from the client until it sends `done`.
pub fn collect<R: BufRead, W: Write>(conn: &mut Connection<R, W>) -> Result<IdentityState, Error> {
    let mut state = IdentityState::default();
    loop {
        let stanza = conn.read_stanza()?;
        match stanza.tag.as_str() {
            CMD_ADD_IDENTITY => match stanza.args.first() {
                Some(identity) => state.identities.push(identity.clone()),
                None => debug!("Ignoring {} without an argument", stanza.tag),
            },
            CMD_RECIPIENT_STANZA => state.recipient_stanzas.push(stanza),
            CMD_DONE => break Ok(state),
            _ => debug!("Ignoring unknown stanza {}", stanza.tag),
        }
    }
}

/// Attempts to unwrap every recipient stanza in `state` with its identities.
///
/// Returns an `error` stanza for each identity that could not be loaded, followed by at
/// most one `file-key` stanza per file index. Stanzas that no identity can unwrap are
/// not reported; most of them are for other recipients.
pub fn resolve<P: KeyProvider>(state: &IdentityState, provider: &P) -> Vec<Stanza> {
    let mut responses = vec![];

    let mut held = vec![];
    for (index, identity) in state.identities.iter().enumerate() {
        match HeldIdentity::load(identity, provider) {
            Ok(identity) => held.push(identity),
            Err(e) => {
                warn!("Skipping identity {}: {}", index, e);
                responses.push(Stanza::error(
                    ERR_IDENTITY,
                    vec![index.to_string()],
                    &e.to_string(),
                ));
            }
        }
    }

    let mut handled_files = HashSet::new();
    for stanza in &state.recipient_stanzas {
        let (file_index, line) = match RecipientLine::from_stanza(stanza) {
            Some(parsed) => parsed,
            None => continue,
        };
        if handled_files.contains(file_index) {
            continue;
        }

        let file_key = held
            .iter()
            .filter(|identity| identity.tag == line.tag)
            .find_map(|identity| {
                line.unwrap_file_key(
                    provider,
                    identity.private_key.expose_secret(),
                    &identity.public_key,
                )
                .map_err(|e| debug!("Trial decryption of file {} failed: {}", file_index, e))
                .ok()
            });

        if let Some(file_key) = file_key {
            responses.push(Stanza::new(
                RSP_FILE_KEY,
                vec![file_index.to_owned()],
                file_key.expose_secret().clone(),
            ));
            handled_files.insert(file_index);
        }
    }

    responses
}

/// Runs the `identity-v1` state machine over `conn`.
pub fn run<P: KeyProvider, R: BufRead, W: Write>(
    provider: &P,
    conn: &mut Connection<R, W>,
) -> Result<(), Error> {
    let state = collect(conn)?;
    let responses = resolve(&state, provider);
    conn.send_all(&responses)
}
