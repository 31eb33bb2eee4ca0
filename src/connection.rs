//! Connection handler.

use log::{debug, warn};
use std::io::{self, BufRead, Write};
use zeroize::Zeroize;

use crate::{
    error::Error,
    format::{read, write, Stanza, RSP_OK},
};

/// A connection to an age client.
///
/// The plugin never pipelines: every response it writes is acknowledged by the client
/// before the next one is sent.
pub struct Connection<R, W> {
    input: R,
    output: W,
    buffer: String,
}

impl Connection<io::BufReader<io::Stdin>, io::Stdout> {
    /// Opens a connection over stdin and stdout.
    pub fn stdio() -> Self {
        Connection::new(io::BufReader::new(io::stdin()), io::stdout())
    }
}

impl<R: BufRead, W: Write> Connection<R, W> {
    /// Opens a connection over the given streams.
    pub fn new(input: R, output: W) -> Self {
        Connection {
            input,
            output,
            buffer: String::new(),
        }
    }

    /// Reads the next stanza from the client.
    ///
    /// Fails with [`Error::IncompleteStanza`] if the client closes the stream before the
    /// stanza is complete, and with [`Error::InvalidStanza`] if it is malformed.
    pub fn read_stanza(&mut self) -> Result<Stanza, Error> {
        // We are finished with any prior stanza.
        self.buffer.zeroize();

        loop {
            let parsed = match read::stanza(self.buffer.as_bytes()) {
                Ok((_, stanza)) => Some(stanza),
                Err(nom::Err::Incomplete(_)) => None,
                Err(_) => return Err(Error::InvalidStanza),
            };

            match parsed {
                Some(stanza) => break Ok(stanza),
                None => {
                    if self.input.read_line(&mut self.buffer)? == 0 {
                        break Err(Error::IncompleteStanza);
                    }
                }
            }
        }
    }

    /// Writes a stanza to the client.
    pub fn write_stanza(&mut self, stanza: &Stanza) -> Result<(), Error> {
        cookie_factory::gen_simple(write::stanza(stanza), &mut self.output)
            .map_err(|e| {
                io::Error::new(
                    io::ErrorKind::Other,
                    format!("failed to write stanza: {:?}", e),
                )
            })?
            .flush()
            .map_err(Error::from)
    }

    /// Writes a response and waits for the client to acknowledge it.
    pub fn send(&mut self, stanza: &Stanza) -> Result<(), Error> {
        self.write_stanza(stanza)?;
        let ack = self.read_stanza()?;
        if ack.tag == RSP_OK {
            Ok(())
        } else {
            warn!("Expected '{}', client sent '{}'", RSP_OK, ack.tag);
            Err(Error::InvalidStanza)
        }
    }

    /// Sends every response in order, then ends the exchange with `done`.
    pub fn send_all(&mut self, responses: &[Stanza]) -> Result<(), Error> {
        for stanza in responses {
            debug!("Sending {} {:?}", stanza.tag, stanza.args);
            self.send(stanza)?;
        }
        self.write_stanza(&Stanza::done())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::Connection;
    use crate::{error::Error, format::Stanza};

    fn stanza(tag: &str, args: &[&str], body: &[u8]) -> Stanza {
        Stanza::new(tag, args.iter().map(|s| s.to_string()).collect(), body.to_vec())
    }

    #[test]
    fn write_then_read() {
        let sent = vec![
            stanza("add-recipient", &["age1applese1abc"], b""),
            stanza("wrap-file-key", &[], &[0x42; 48]),
            stanza("wrap-file-key", &[], &[0x17; 100]),
            stanza("done", &[], b""),
        ];

        let mut wire = vec![];
        {
            let mut conn = Connection::new(Cursor::new(vec![]), &mut wire);
            for s in &sent {
                conn.write_stanza(s).unwrap();
            }
        }

        let mut conn = Connection::new(Cursor::new(wire), vec![]);
        for s in &sent {
            assert_eq!(&conn.read_stanza().unwrap(), s);
        }
        assert!(matches!(conn.read_stanza(), Err(Error::IncompleteStanza)));
    }

    #[test]
    fn truncated_body_is_incomplete() {
        let input = format!("-> wrap-file-key\n{}\n", "A".repeat(64));
        let mut conn = Connection::new(Cursor::new(input.into_bytes()), vec![]);
        assert!(matches!(conn.read_stanza(), Err(Error::IncompleteStanza)));
    }

    #[test]
    fn malformed_header_is_invalid() {
        let mut conn = Connection::new(Cursor::new(b"-> \n\n".to_vec()), vec![]);
        assert!(matches!(conn.read_stanza(), Err(Error::InvalidStanza)));
    }

    #[test]
    fn send_requires_ok() {
        let mut output = vec![];
        let mut conn = Connection::new(Cursor::new(b"-> ok\n\n-> nope\n\n".to_vec()), &mut output);
        let response = stanza("file-key", &["0"], &[1; 16]);
        conn.send(&response).unwrap();
        assert!(matches!(conn.send(&response), Err(Error::InvalidStanza)));
    }

    #[test]
    fn send_all_ends_with_done() {
        let mut output = vec![];
        {
            let mut conn =
                Connection::new(Cursor::new(b"-> ok\n\n-> ok\n\n".to_vec()), &mut output);
            conn.send_all(&[
                stanza("error", &["recipient", "0"], b"bad"),
                stanza("file-key", &["0"], &[]),
            ])
            .unwrap();
        }
        assert_eq!(
            String::from_utf8(output).unwrap(),
            "-> error recipient 0\nYmFk\n-> file-key 0\n\n-> done\n\n"
        );
    }
}
