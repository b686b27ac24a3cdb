//! Chunked transfer-coding decoder
//!
//! A sans-IO state machine: callers feed it whatever bytes they have and it
//! reports how many it consumed, appending chunk payloads to the body buffer.
//! It never reads past the end of the trailer section, so bytes that belong
//! to a pipelined request stay with the caller.

use bytes::BytesMut;

use crate::error::{BodyError, FramingError};

/// Maximum length of a chunk size line including extensions and CRLF.
pub const MAX_SIZE_LINE: usize = 128;

/// Maximum total length of the trailer section.
pub const MAX_TRAILERS: usize = 8 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    ReadSize,
    ReadPayload { size: u64, remaining: u64 },
    ReadFooter { seen_cr: bool },
    ReadTrailers,
    Done,
    Failed(FramingError),
}

/// Decoder for a single chunked body
#[derive(Debug)]
pub struct ChunkedDecoder {
    state: State,
    /// Partial size line or trailer line carried between `decode` calls
    line: Vec<u8>,
    trailer_bytes: usize,
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkedDecoder {
    pub const fn new() -> Self {
        Self {
            state: State::ReadSize,
            line: Vec::new(),
            trailer_bytes: 0,
        }
    }

    /// Whether the terminating chunk and trailer section have been consumed
    pub const fn is_done(&self) -> bool {
        matches!(self.state, State::Done)
    }

    /// Decode as much of `input` as possible
    ///
    /// Payload bytes are appended to `body`. Returns the number of input
    /// bytes consumed, which is less than `input.len()` only once the body
    /// is complete. After a framing error every call returns the same error.
    pub fn decode(&mut self, input: &[u8], body: &mut BytesMut) -> Result<usize, FramingError> {
        let mut consumed = 0;

        loop {
            if let State::Failed(err) = &self.state {
                return Err(err.clone());
            }
            if self.is_done() || consumed == input.len() {
                return Ok(consumed);
            }

            let rest = &input[consumed..];
            let step = match self.state {
                State::ReadSize => self.read_size(rest),
                State::ReadPayload { size, remaining } => {
                    Ok(self.read_payload(rest, size, remaining, body))
                }
                State::ReadFooter { seen_cr } => self.read_footer(rest, seen_cr),
                State::ReadTrailers => self.read_trailers(rest),
                State::Done | State::Failed(_) => Ok(0),
            };

            match step {
                Ok(n) => consumed += n,
                Err(err) => {
                    self.state = State::Failed(err.clone());
                    return Err(err);
                }
            }
        }
    }

    /// Signal end of input
    ///
    /// Ending inside the trailer section is accepted; ending anywhere else
    /// before the terminating chunk means the peer went away mid-body.
    pub fn finish(&mut self) -> Result<(), BodyError> {
        match self.state {
            State::Done => Ok(()),
            State::ReadTrailers => {
                self.state = State::Done;
                Ok(())
            }
            State::ReadPayload { size, remaining } => Err(BodyError::Truncated {
                expected: size,
                received: size - remaining,
            }),
            State::ReadSize | State::ReadFooter { .. } => Err(BodyError::TruncatedFraming),
            State::Failed(ref err) => Err(BodyError::Framing(err.clone())),
        }
    }

    fn read_size(&mut self, input: &[u8]) -> Result<usize, FramingError> {
        let (taken, complete) = take_line(&mut self.line, input);
        if self.line.len() > MAX_SIZE_LINE {
            return Err(FramingError::SizeLineTooLong(MAX_SIZE_LINE));
        }
        if !complete {
            return Ok(taken);
        }

        let size = parse_size_line(&self.line)?;
        self.line.clear();
        self.state = if size == 0 {
            State::ReadTrailers
        } else {
            State::ReadPayload {
                size,
                remaining: size,
            }
        };
        Ok(taken)
    }

    fn read_payload(&mut self, input: &[u8], size: u64, remaining: u64, body: &mut BytesMut) -> usize {
        let n = usize::try_from(remaining).map_or(input.len(), |r| r.min(input.len()));
        body.extend_from_slice(&input[..n]);

        let remaining = remaining - n as u64;
        self.state = if remaining == 0 {
            State::ReadFooter { seen_cr: false }
        } else {
            State::ReadPayload { size, remaining }
        };
        n
    }

    fn read_footer(&mut self, input: &[u8], mut seen_cr: bool) -> Result<usize, FramingError> {
        let mut taken = 0;
        for &byte in input {
            taken += 1;
            match (seen_cr, byte) {
                (false, b'\r') => seen_cr = true,
                (true, b'\n') => {
                    self.state = State::ReadSize;
                    return Ok(taken);
                }
                (_, other) => return Err(FramingError::InvalidChunkFooter(other)),
            }
        }
        self.state = State::ReadFooter { seen_cr };
        Ok(taken)
    }

    /// Skip trailer fields up to the blank line that ends the body
    fn read_trailers(&mut self, input: &[u8]) -> Result<usize, FramingError> {
        let (taken, complete) = take_line(&mut self.line, input);
        self.trailer_bytes += taken;
        if self.trailer_bytes > MAX_TRAILERS {
            return Err(FramingError::TrailersTooLong(MAX_TRAILERS));
        }
        if complete {
            if matches!(self.line.as_slice(), b"\r\n" | b"\n") {
                self.state = State::Done;
            }
            self.line.clear();
        }
        Ok(taken)
    }
}

/// Append `input` up to and including the first LF to `line`
fn take_line(line: &mut Vec<u8>, input: &[u8]) -> (usize, bool) {
    match input.iter().position(|&b| b == b'\n') {
        Some(end) => {
            line.extend_from_slice(&input[..=end]);
            (end + 1, true)
        }
        None => {
            line.extend_from_slice(input);
            (input.len(), false)
        }
    }
}

fn parse_size_line(line: &[u8]) -> Result<u64, FramingError> {
    let invalid = || {
        FramingError::InvalidChunkSize(String::from_utf8_lossy(line).trim_end().to_string())
    };

    // httparse reads an empty size as zero
    if !line.first().is_some_and(u8::is_ascii_hexdigit) {
        return Err(invalid());
    }

    match httparse::parse_chunk_size(line) {
        Ok(httparse::Status::Complete((_, size))) => Ok(size),
        _ => Err(invalid()),
    }
}
