//! Transport layer for protocol messages.
//!
//! Outgoing messages are always framed with a `Content-Length` header. Incoming messages
//! are either framed the same way or, for recorded sessions, one JSON document per line.

use std::io::{self, BufRead, StdinLock, Stdout, Write};

/// A bidirectional message channel.
pub trait Transport {
    /// Reads the next message, `None` once the input is exhausted.
    fn read_message(&mut self) -> io::Result<Option<String>>;

    /// Writes one message.
    fn write_message(&mut self, message: &str) -> io::Result<()>;
}

/// How incoming messages are delimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// `Content-Length: N\r\n\r\n` followed by `N` bytes of JSON.
    ContentLength,
    /// One JSON message per line; blank lines and lines starting with `#` are skipped.
    Lines,
}

/// A transport over any buffered reader and writer.
#[derive(Debug)]
pub struct StreamTransport<R, W> {
    reader: R,
    writer: W,
    framing: Framing,
}

/// Standard I/O transport (stdin/stdout).
pub type StdioTransport = StreamTransport<StdinLock<'static>, Stdout>;

impl StdioTransport {
    /// Reads messages from stdin and writes framed ones to stdout.
    #[must_use]
    pub fn stdio(framing: Framing) -> Self {
        Self::new(io::stdin().lock(), io::stdout(), framing)
    }
}

impl<R: BufRead, W: Write> StreamTransport<R, W> {
    /// Frames messages over `reader` and `writer`.
    pub fn new(reader: R, writer: W, framing: Framing) -> Self {
        Self {
            reader,
            writer,
            framing,
        }
    }

    /// Gives the writer back, e.g. to inspect what was sent.
    pub fn into_writer(self) -> W {
        self.writer
    }

    fn read_framed(&mut self) -> io::Result<Option<String>> {
        let mut content_length = None;
        loop {
            let mut header = String::new();
            if self.reader.read_line(&mut header)? == 0 {
                return if content_length.is_none() {
                    Ok(None)
                } else {
                    Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "input ended inside a message header",
                    ))
                };
            }
            let header = header.trim();
            if header.is_empty() {
                if content_length.is_some() {
                    break;
                }
                continue;
            }
            if let Some(length) = header.strip_prefix("Content-Length:") {
                content_length = Some(length.trim().parse::<usize>().map_err(|_| {
                    io::Error::new(io::ErrorKind::InvalidData, "Invalid Content-Length")
                })?);
            }
        }

        let mut body = vec![0u8; content_length.unwrap_or_default()];
        self.reader.read_exact(&mut body)?;
        String::from_utf8(body)
            .map(Some)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    fn read_line(&mut self) -> io::Result<Option<String>> {
        loop {
            let mut line = String::new();
            if self.reader.read_line(&mut line)? == 0 {
                return Ok(None);
            }
            let line = line.trim();
            if !line.is_empty() && !line.starts_with('#') {
                return Ok(Some(line.to_owned()));
            }
        }
    }
}

impl<R: BufRead, W: Write> Transport for StreamTransport<R, W> {
    fn read_message(&mut self) -> io::Result<Option<String>> {
        match self.framing {
            Framing::ContentLength => self.read_framed(),
            Framing::Lines => self.read_line(),
        }
    }

    fn write_message(&mut self, message: &str) -> io::Result<()> {
        write!(
            self.writer,
            "Content-Length: {}\r\n\r\n{}",
            message.len(),
            message
        )?;
        self.writer.flush()
    }
}

/// Splits a `Content-Length` framed byte stream into its message bodies.
pub fn split_frames(mut output: &str) -> io::Result<Vec<String>> {
    let mut frames = Vec::new();
    while !output.is_empty() {
        let (header, rest) = output.split_once("\r\n\r\n").ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidData, "Missing header terminator")
        })?;
        let length: usize = header
            .trim()
            .strip_prefix("Content-Length:")
            .and_then(|length| length.trim().parse().ok())
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "Missing Content-Length"))?;
        let body = rest.get(..length).ok_or_else(|| {
            io::Error::new(io::ErrorKind::UnexpectedEof, "Truncated message body")
        })?;
        frames.push(body.to_owned());
        output = &rest[length..];
    }
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use std::io::Cursor;

    #[test]
    fn reads_framed_messages_until_eof() {
        let input = "Content-Length: 2\r\n\r\n{}Content-Length: 4\r\n\r\nnull";
        let mut transport = StreamTransport::new(Cursor::new(input), Vec::new(), Framing::ContentLength);
        assert_eq!(transport.read_message().unwrap().as_deref(), Some("{}"));
        assert_eq!(transport.read_message().unwrap().as_deref(), Some("null"));
        assert_eq!(transport.read_message().unwrap(), None);
    }

    #[test]
    fn rejects_garbage_length() {
        let input = "Content-Length: lots\r\n\r\n{}";
        let mut transport = StreamTransport::new(Cursor::new(input), Vec::new(), Framing::ContentLength);
        let err = transport.read_message().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn reads_line_delimited_sessions() {
        let input = indoc! {r#"
            # comment
            {"a": 1}

            {"b": 2}
        "#};
        let mut transport = StreamTransport::new(Cursor::new(input), Vec::new(), Framing::Lines);
        assert_eq!(transport.read_message().unwrap().as_deref(), Some(r#"{"a": 1}"#));
        assert_eq!(transport.read_message().unwrap().as_deref(), Some(r#"{"b": 2}"#));
        assert_eq!(transport.read_message().unwrap(), None);
    }

    #[test]
    fn written_frames_split_back() {
        let mut transport = StreamTransport::new(Cursor::new(""), Vec::new(), Framing::Lines);
        transport.write_message(r#"{"seq":1}"#).unwrap();
        transport.write_message("[]").unwrap();
        let output = String::from_utf8(transport.into_writer()).unwrap();
        assert_eq!(split_frames(&output).unwrap(), [r#"{"seq":1}"#, "[]"]);
    }
}
