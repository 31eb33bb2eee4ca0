//! The `recipient-v1` state machine.
//!
//! The age client hands the plugin every recipient, identity and file key up front;
//! the plugin wraps every file key to every recipient it can parse, and reports the
//! recipients it cannot.

use log::{debug, warn};
use secrecy::{ExposeSecret, Secret, SecretVec};
use std::io::{BufRead, Write};
use std::mem;

use crate::{
    connection::Connection,
    encoding::{parse_identity, parse_recipient},
    error::Error,
    format::{
        Stanza, CMD_ADD_IDENTITY, CMD_ADD_RECIPIENT, CMD_DONE, CMD_WRAP_FILE_KEY, ERR_INTERNAL,
        ERR_RECIPIENT,
    },
    piv::RecipientLine,
    primitives::p256::PublicKey,
    provider::KeyProvider,
};

/// Everything the client sent during the first phase.
#[derive(Default)]
pub struct RecipientState {
    /// Recipient strings, in the order they were added.
    pub recipients: Vec<String>,
    /// Identity strings whose public keys should also receive the file keys.
    pub identities: Vec<String>,
    /// The file keys to wrap, indexed by their position.
    pub file_keys: Vec<SecretVec<u8>>,
}

fn push_first_arg(list: &mut Vec<String>, stanza: &Stanza) {
    match stanza.args.first() {
        Some(arg) => list.push(arg.clone()),
        None => debug!("Ignoring {} without an argument", stanza.tag),
    }
}

/// Reads stanzas from the client until it sends `done`.
pub fn collect<R: BufRead, W: Write>(conn: &mut Connection<R, W>) -> Result<RecipientState, Error> {
    let mut state = RecipientState::default();
    loop {
        let mut stanza = conn.read_stanza()?;
        match stanza.tag.as_str() {
            CMD_ADD_RECIPIENT => push_first_arg(&mut state.recipients, &stanza),
            CMD_ADD_IDENTITY => push_first_arg(&mut state.identities, &stanza),
            CMD_WRAP_FILE_KEY => state
                .file_keys
                .push(Secret::new(mem::take(&mut stanza.body))),
            CMD_DONE => break Ok(state),
            _ => debug!("Ignoring unknown stanza {}", stanza.tag),
        }
    }
}

fn identity_public_key<P: KeyProvider>(identity: &str, provider: &P) -> Result<PublicKey, Error> {
    let private_key = parse_identity(identity)?;
    provider.public_key_from(private_key.expose_secret())
}

/// Wraps every file key to every recipient and identity in `state`.
///
/// Returns the responses in the order they should be sent: an `error` stanza for each
/// recipient or identity that could not be used, then one `recipient-stanza` per
/// (file key, public key) pair.
pub fn resolve<P: KeyProvider>(state: &RecipientState, provider: &P) -> Vec<Stanza> {
    let recipients = state
        .recipients
        .iter()
        .map(|recipient| parse_recipient(recipient));
    let identities = state
        .identities
        .iter()
        .map(|identity| identity_public_key(identity, provider));

    let mut responses = vec![];
    let mut targets = vec![];
    for (index, result) in recipients
        .enumerate()
        .chain(identities.enumerate())
    {
        match result {
            Ok(pk) => targets.push(pk),
            Err(e) => {
                warn!("Skipping recipient {}: {}", index, e);
                responses.push(Stanza::error(
                    ERR_RECIPIENT,
                    vec![index.to_string()],
                    &e.to_string(),
                ));
            }
        }
    }

    for (file_index, file_key) in state.file_keys.iter().enumerate() {
        for pk in &targets {
            responses.push(match RecipientLine::wrap_file_key(file_key, pk) {
                Ok(line) => line.to_stanza(file_index),
                Err(e) => {
                    warn!("Failed to wrap file key {}: {}", file_index, e);
                    Stanza::error(ERR_INTERNAL, vec![], &e.to_string())
                }
            });
        }
    }

    responses
}

/// Runs the `recipient-v1` state machine over `conn`.
pub fn run<P: KeyProvider, R: BufRead, W: Write>(
    provider: &P,
    conn: &mut Connection<R, W>,
) -> Result<(), Error> {
    let state = collect(conn)?;
    let responses = resolve(&state, provider);
    conn.send_all(&responses)
}

#[cfg(test)]
mod tests {
    use secrecy::{ExposeSecret, Secret};
    use std::io::Cursor;

    use super::{collect, resolve, run, RecipientState};
    use crate::{
        connection::Connection,
        encoding::{identity_to_string, recipient_to_string},
        error::Error,
        format::Stanza,
        identity,
        provider::{software::SoftwareProvider, AccessPolicy, KeyProvider},
    };

    fn wire(stanzas: &[Stanza]) -> Vec<u8> {
        let mut out = vec![];
        let mut conn = Connection::new(Cursor::new(vec![]), &mut out);
        for s in stanzas {
            conn.write_stanza(s).unwrap();
        }
        drop(conn);
        out
    }

    fn read_all(bytes: Vec<u8>) -> Vec<Stanza> {
        let mut conn = Connection::new(Cursor::new(bytes), vec![]);
        let mut stanzas = vec![];
        loop {
            match conn.read_stanza() {
                Ok(s) => stanzas.push(s),
                Err(Error::IncompleteStanza) => break stanzas,
                Err(e) => panic!("{}", e),
            }
        }
    }

    fn cmd(tag: &str, arg: Option<&str>, body: &[u8]) -> Stanza {
        Stanza::new(tag, arg.into_iter().map(str::to_owned).collect(), body.to_vec())
    }

    #[test]
    fn collect_preserves_order_and_skips_unknown() {
        let input = wire(&[
            cmd("add-recipient", Some("r0"), b""),
            cmd("extension-foo", Some("x"), b"ignored"),
            cmd("wrap-file-key", None, &[1; 16]),
            cmd("add-identity", Some("i0"), b""),
            cmd("add-recipient", Some("r1"), b""),
            cmd("wrap-file-key", None, &[2; 32]),
            cmd("done", None, b""),
            cmd("add-recipient", Some("after-done"), b""),
        ]);

        let mut conn = Connection::new(Cursor::new(input), vec![]);
        let state = collect(&mut conn).unwrap();
        assert_eq!(state.recipients, vec!["r0", "r1"]);
        assert_eq!(state.identities, vec!["i0"]);
        assert_eq!(state.file_keys.len(), 2);
        assert_eq!(state.file_keys[0].expose_secret(), &vec![1; 16]);
        assert_eq!(state.file_keys[1].expose_secret(), &vec![2; 32]);
    }

    #[test]
    fn collect_fails_if_client_hangs_up() {
        let input = wire(&[cmd("add-recipient", Some("r0"), b"")]);
        let mut conn = Connection::new(Cursor::new(input), vec![]);
        assert!(matches!(collect(&mut conn), Err(Error::IncompleteStanza)));
    }

    #[test]
    fn partial_failure() {
        let (pk, _) = SoftwareProvider.generate(AccessPolicy::None).unwrap();
        let state = RecipientState {
            recipients: vec!["badstring".to_owned(), recipient_to_string(&pk)],
            identities: vec![],
            file_keys: vec![Secret::new(vec![0x55; 16])],
        };

        let responses = resolve(&state, &SoftwareProvider);
        assert_eq!(responses.len(), 2);

        assert_eq!(responses[0].tag, "error");
        assert_eq!(responses[0].args, vec!["recipient", "0"]);
        assert!(!responses[0].body.is_empty());

        assert_eq!(responses[1].tag, "recipient-stanza");
        assert_eq!(responses[1].args[0], "0");
        assert_eq!(responses[1].args[1], "piv-p256");
    }

    #[test]
    fn identities_are_wrapped_to_and_errors_keep_their_index() {
        let provider = SoftwareProvider;
        let (pk, _) = provider.generate(AccessPolicy::None).unwrap();
        let (_, sk) = provider.generate(AccessPolicy::None).unwrap();

        let state = RecipientState {
            recipients: vec![recipient_to_string(&pk)],
            identities: vec![
                recipient_to_string(&pk),
                identity_to_string(sk.expose_secret()),
            ],
            file_keys: vec![Secret::new(vec![1; 16]), Secret::new(vec![2; 16])],
        };

        let responses = resolve(&state, &provider);
        let tags: Vec<_> = responses.iter().map(|s| s.tag.as_str()).collect();
        assert_eq!(
            tags,
            vec![
                "error",
                "recipient-stanza",
                "recipient-stanza",
                "recipient-stanza",
                "recipient-stanza",
            ]
        );
        assert_eq!(responses[0].args, vec!["recipient", "0"]);
        assert!(String::from_utf8_lossy(&responses[0].body).contains("Unknown HRP"));

        let file_indices: Vec<_> = responses[1..].iter().map(|s| s.args[0].as_str()).collect();
        assert_eq!(file_indices, vec!["0", "0", "1", "1"]);
    }

    #[test]
    fn every_wrap_uses_a_new_ephemeral_key() {
        let (pk, _) = SoftwareProvider.generate(AccessPolicy::None).unwrap();
        let recipient = recipient_to_string(&pk);
        let state = RecipientState {
            recipients: vec![recipient.clone(), recipient],
            identities: vec![],
            file_keys: vec![Secret::new(vec![1; 16]), Secret::new(vec![1; 16])],
        };

        let responses = resolve(&state, &SoftwareProvider);
        let mut epks: Vec<_> = responses.iter().map(|s| s.args[3].clone()).collect();
        assert_eq!(epks.len(), 4);
        epks.sort();
        epks.dedup();
        assert_eq!(epks.len(), 4);
    }

    #[test]
    fn no_recipients_only_done() {
        let input = wire(&[cmd("wrap-file-key", None, &[1; 16]), cmd("done", None, b"")]);
        let mut output = vec![];
        run(
            &SoftwareProvider,
            &mut Connection::new(Cursor::new(input), &mut output),
        )
        .unwrap();
        assert_eq!(output, b"-> done\n\n");
    }

    #[test]
    fn full_exchange_round_trips_through_identity_engine() {
        let provider = SoftwareProvider;
        let (pk, sk) = provider.generate(AccessPolicy::None).unwrap();
        let file_key = [0x2a; 16];

        let mut input = wire(&[
            cmd("add-recipient", Some("badstring"), b""),
            cmd("add-recipient", Some(recipient_to_string(&pk).as_str()), b""),
            cmd("wrap-file-key", None, &file_key),
            cmd("done", None, b""),
        ]);
        input.extend(wire(&[cmd("ok", None, b""), cmd("ok", None, b"")]));

        let mut output = vec![];
        run(&provider, &mut Connection::new(Cursor::new(input), &mut output)).unwrap();

        let responses = read_all(output);
        assert_eq!(responses.len(), 3);
        assert_eq!(responses[0].tag, "error");
        assert_eq!(responses[0].args, vec!["recipient", "0"]);
        assert_eq!(responses[1].tag, "recipient-stanza");
        assert_eq!(responses[2].tag, "done");

        let state = identity::IdentityState {
            identities: vec![identity_to_string(sk.expose_secret())],
            recipient_stanzas: vec![responses[1].clone()],
        };
        let unwrapped = identity::resolve(&state, &provider);
        assert_eq!(unwrapped.len(), 1);
        assert_eq!(unwrapped[0].tag, "file-key");
        assert_eq!(unwrapped[0].args, vec!["0"]);
        assert_eq!(unwrapped[0].body, file_key);
    }
}
