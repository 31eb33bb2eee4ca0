use zeroize::Zeroize;

pub(crate) const CMD_ADD_RECIPIENT: &str = "add-recipient";
pub(crate) const CMD_ADD_IDENTITY: &str = "add-identity";
pub(crate) const CMD_WRAP_FILE_KEY: &str = "wrap-file-key";
pub(crate) const CMD_RECIPIENT_STANZA: &str = "recipient-stanza";
pub(crate) const CMD_DONE: &str = "done";

pub(crate) const RSP_OK: &str = "ok";
pub(crate) const RSP_ERROR: &str = "error";
pub(crate) const RSP_FILE_KEY: &str = "file-key";

pub(crate) const ERR_RECIPIENT: &str = "recipient";
pub(crate) const ERR_IDENTITY: &str = "identity";
pub(crate) const ERR_INTERNAL: &str = "internal";

const STANZA_PREFIX: &str = "->";

/// Body lines carry at most this many bytes; a shorter line ends the body.
const BODY_CHUNK_BYTES: usize = 48;

/// A single message of the age plugin protocol.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Stanza {
    /// The message type.
    pub tag: String,
    /// Whitespace-free arguments that follow the type on the header line.
    pub args: Vec<String>,
    /// The binary payload, which may be empty.
    pub body: Vec<u8>,
}

impl Stanza {
    /// Constructs a stanza.
    pub fn new<S: Into<String>>(tag: S, args: Vec<String>, body: Vec<u8>) -> Self {
        Stanza {
            tag: tag.into(),
            args,
            body,
        }
    }

    /// Constructs an `error` stanza reporting a failure of a single item.
    pub fn error(category: &str, args: Vec<String>, message: &str) -> Self {
        let mut all_args = Vec::with_capacity(args.len() + 1);
        all_args.push(category.to_owned());
        all_args.extend(args);
        Stanza::new(RSP_ERROR, all_args, message.as_bytes().to_vec())
    }

    pub(crate) fn done() -> Self {
        Stanza::new(CMD_DONE, vec![], vec![])
    }
}

impl Drop for Stanza {
    fn drop(&mut self) {
        // Bodies carry file keys in both directions.
        self.body.zeroize();
    }
}

pub(crate) mod read {
    use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};
    use nom::{
        bytes::streaming::{tag, take_while, take_while1},
        character::streaming::newline,
        combinator::{map, map_opt, map_res},
        multi::many0,
        sequence::{pair, preceded, terminated},
        IResult,
    };

    use super::{Stanza, BODY_CHUNK_BYTES, STANZA_PREFIX};

    fn is_arbitrary_char(c: u8) -> bool {
        (33..=126).contains(&c)
    }

    fn is_base64_char(c: u8) -> bool {
        c.is_ascii_alphanumeric() || c == b'+' || c == b'/'
    }

    fn arbitrary_string(input: &[u8]) -> IResult<&[u8], String> {
        map(
            map_res(take_while1(is_arbitrary_char), std::str::from_utf8),
            str::to_owned,
        )(input)
    }

    fn header(input: &[u8]) -> IResult<&[u8], (String, Vec<String>)> {
        preceded(
            pair(tag(STANZA_PREFIX), tag(" ")),
            terminated(
                pair(arbitrary_string, many0(preceded(tag(" "), arbitrary_string))),
                newline,
            ),
        )(input)
    }

    fn body_chunk(input: &[u8]) -> IResult<&[u8], Vec<u8>> {
        terminated(
            map_opt(take_while(is_base64_char), |line: &[u8]| {
                STANDARD_NO_PAD
                    .decode(line)
                    .ok()
                    .filter(|chunk| chunk.len() <= BODY_CHUNK_BYTES)
            }),
            newline,
        )(input)
    }

    fn body(mut input: &[u8]) -> IResult<&[u8], Vec<u8>> {
        let mut body = vec![];
        loop {
            let (rest, chunk) = body_chunk(input)?;
            input = rest;
            body.extend_from_slice(&chunk);
            if chunk.len() < BODY_CHUNK_BYTES {
                break Ok((input, body));
            }
        }
    }

    /// Parses a complete stanza.
    ///
    /// Returns `nom::Err::Incomplete` until the terminating body line has been seen.
    pub(crate) fn stanza(input: &[u8]) -> IResult<&[u8], Stanza> {
        map(pair(header, body), |((tag, args), body)| Stanza {
            tag,
            args,
            body,
        })(input)
    }

    #[cfg(test)]
    mod tests {
        use super::stanza;

        #[test]
        fn parse_header_and_empty_body() {
            let (rest, s) = stanza(b"-> done\n\n").unwrap();
            assert!(rest.is_empty());
            assert_eq!(s.tag, "done");
            assert!(s.args.is_empty());
            assert!(s.body.is_empty());
        }

        #[test]
        fn parse_args_and_body() {
            let (_, s) = stanza(b"-> add-recipient age1applese1foo bar\nAAEC\n").unwrap();
            assert_eq!(s.tag, "add-recipient");
            assert_eq!(s.args, vec!["age1applese1foo", "bar"]);
            assert_eq!(s.body, vec![0, 1, 2]);
        }

        #[test]
        fn body_requires_terminating_chunk() {
            let full = "A".repeat(64);
            let partial = format!("-> wrap-file-key\n{}\n", full);
            assert!(matches!(
                stanza(partial.as_bytes()),
                Err(nom::Err::Incomplete(_))
            ));

            let complete = format!("{}\n", partial);
            let (_, s) = stanza(complete.as_bytes()).unwrap();
            assert_eq!(s.body, vec![0; 48]);
        }

        #[test]
        fn reject_malformed_headers() {
            for input in &[
                &b"->\n\n"[..],
                b"-> \n\n",
                b"=> done\n\n",
                b"-> done  extra\n\n",
                b"done\n\n",
            ] {
                assert!(
                    matches!(stanza(input), Err(nom::Err::Error(_))),
                    "{:?}",
                    String::from_utf8_lossy(input)
                );
            }
        }

        #[test]
        fn reject_malformed_bodies() {
            let oversized = format!("-> wrap-file-key\n{}\n", "A".repeat(68));
            for input in &[
                &b"-> wrap-file-key\nAAEC==\n"[..],
                b"-> wrap-file-key\nA\n",
                b"-> wrap-file-key\nAA_-\n",
                oversized.as_bytes(),
            ] {
                assert!(
                    matches!(stanza(input), Err(nom::Err::Error(_))),
                    "{:?}",
                    String::from_utf8_lossy(input)
                );
            }
        }
    }
}

pub(crate) mod write {
    use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};
    use cookie_factory::{
        combinator::string,
        sequence::{pair, tuple},
        SerializeFn, WriteContext,
    };
    use std::io::Write;

    use super::{Stanza, BODY_CHUNK_BYTES, STANZA_PREFIX};

    fn header<'a, W: 'a + Write>(tag: &'a str, args: &'a [String]) -> impl SerializeFn<W> + 'a {
        move |mut w: WriteContext<W>| {
            w = tuple((string(STANZA_PREFIX), string(" "), string(tag)))(w)?;
            for arg in args {
                w = pair(string(" "), string(arg))(w)?;
            }
            string("\n")(w)
        }
    }

    fn encoded_line<'a, W: 'a + Write>(chunk: &'a [u8]) -> impl SerializeFn<W> + 'a {
        pair(string(STANDARD_NO_PAD.encode(chunk)), string("\n"))
    }

    /// Writes the body as full chunks followed by one short chunk, which is empty when
    /// the body length is a multiple of the chunk size.
    fn wrapped_body<'a, W: 'a + Write>(body: &'a [u8]) -> impl SerializeFn<W> + 'a {
        move |mut w: WriteContext<W>| {
            let full = body.len() - body.len() % BODY_CHUNK_BYTES;
            for chunk in body[..full].chunks(BODY_CHUNK_BYTES) {
                w = encoded_line(chunk)(w)?;
            }
            encoded_line(&body[full..])(w)
        }
    }

    pub(crate) fn stanza<'a, W: 'a + Write>(s: &'a Stanza) -> impl SerializeFn<W> + 'a {
        pair(header(&s.tag, &s.args), wrapped_body(&s.body))
    }
}
