//! Bounded line framing for inbound client traffic.
//!
//! Lines are `\n`-terminated; a trailing `\r` is dropped. Bytes are decoded
//! lossily, so invalid UTF-8 shows up as `U+FFFD` instead of failing the
//! connection.
//!
//! The decoder never buffers more than `max_length + 1` bytes of an
//! unterminated line. As soon as a line is known to be too long it yields
//! [`Frame::TooLong`] and discards everything up to the next newline.

use std::io;

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;

use crate::DEFAULT_MAX_LINE_LENGTH;

/// One decoded unit of client input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A complete line, terminator stripped.
    Line(String),

    /// A line exceeded the length limit and was dropped.
    TooLong,
}

/// Decoder producing [`Frame`]s from a byte stream.
#[derive(Debug, Clone)]
pub struct LineCodec {
    max_length: usize,
    /// Bytes already scanned for `\n` in the current buffer.
    next_index: usize,
    /// Inside an oversized line, dropping input until its newline.
    discarding: bool,
}

impl LineCodec {
    pub fn new(max_length: usize) -> Self {
        Self {
            max_length,
            next_index: 0,
            discarding: false,
        }
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    fn frame(&self, line: &[u8]) -> Frame {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.len() > self.max_length {
            return Frame::TooLong;
        }
        Frame::Line(String::from_utf8_lossy(line).into_owned())
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINE_LENGTH)
    }
}

impl Decoder for LineCodec {
    type Item = Frame;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Frame>, io::Error> {
        loop {
            let newline = buf
                .get(self.next_index..)
                .and_then(|unscanned| unscanned.iter().position(|b| *b == b'\n'));

            match newline {
                Some(offset) => {
                    let end = self.next_index + offset;
                    self.next_index = 0;
                    let line = buf.split_to(end + 1);

                    if self.discarding {
                        self.discarding = false;
                        continue;
                    }
                    return Ok(Some(self.frame(line.get(..end).unwrap_or_default())));
                }
                None if self.discarding => {
                    buf.advance(buf.len());
                    self.next_index = 0;
                    return Ok(None);
                }
                // Room for the longest allowed line plus a trailing '\r'.
                None if buf.len() > self.max_length + 1 => {
                    buf.advance(buf.len());
                    self.next_index = 0;
                    self.discarding = true;
                    return Ok(Some(Frame::TooLong));
                }
                None => {
                    self.next_index = buf.len();
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Frame>, io::Error> {
        if let Some(frame) = self.decode(buf)? {
            return Ok(Some(frame));
        }

        self.next_index = 0;
        if buf.is_empty() || self.discarding {
            buf.advance(buf.len());
            self.discarding = false;
            return Ok(None);
        }

        let line = buf.split_to(buf.len());
        Ok(Some(self.frame(&line)))
    }
}
