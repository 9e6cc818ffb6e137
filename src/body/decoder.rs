use bytes::{Bytes, BytesMut};

use crate::body::chunked::ChunkedDecoder;
use crate::body::error::BodyError;
use crate::common::{ParseResult, atou};
use crate::headers::HeaderMap;
use crate::headers::standard::{CONTENT_LENGTH, TRANSFER_ENCODING};

/// Response message body framing.
#[derive(Debug)]
pub struct BodyDecoder {
    coding: Coding,
}

#[derive(Clone, Debug)]
pub enum Coding {
    /// Body exhausted, or message does not carry a body.
    Empty,
    Chunked(ChunkedDecoder),
    ContentLength(u64),
    /// Delimited by connection close.
    UntilClose,
}

impl BodyDecoder {
    /// Decoder for a message without body.
    pub const fn empty() -> Self {
        Self { coding: Coding::Empty }
    }

    /// Select the framing of a response body from its headers.
    pub fn new(headers: &HeaderMap) -> Result<Self, BodyError> {
        let mut content_lengths = headers.get_all(CONTENT_LENGTH).peekable();
        let mut transfer_encodings = headers.get_all(TRANSFER_ENCODING).peekable();

        let coding = match (content_lengths.peek().is_some(), transfer_encodings.peek().is_some()) {
            (false, false) => Coding::UntilClose,
            (false, true) => {
                // chunked frames the body only as the final coding, other codings are left to
                // the caller
                let last = transfer_encodings
                    .flat_map(|e| e.as_bytes().split(|&b| b == b','))
                    .map(<[u8]>::trim_ascii)
                    .filter(|e| !e.is_empty())
                    .last();
                match last {
                    Some(coding) if coding.eq_ignore_ascii_case(b"chunked") => {
                        Coding::Chunked(ChunkedDecoder::new())
                    }
                    _ => Coding::UntilClose,
                }
            }
            (true, false) => {
                let mut length = None;
                for value in content_lengths {
                    // identical duplicates are tolerated
                    match (atou(value.as_bytes().trim_ascii()), length) {
                        (Some(len), None) => length = Some(len),
                        (Some(len), Some(prev)) if len == prev => {}
                        _ => return Err(BodyError::InvalidContentLength),
                    }
                }
                match length {
                    Some(0) => Coding::Empty,
                    Some(len) => Coding::ContentLength(len),
                    None => return Err(BodyError::InvalidContentLength),
                }
            }
            (true, true) => return Err(BodyError::InvalidCodings),
        };
        Ok(Self { coding })
    }

    /// Returns `true` if the body is delimited by connection close.
    #[inline]
    pub fn is_close_delimited(&self) -> bool {
        matches!(self.coding, Coding::UntilClose)
    }

    /// Decode the next body chunk.
    ///
    /// Returns `Ok(None)` once the body is complete, and `Pending` if more data read is required.
    pub(crate) fn decode_chunk(
        &mut self,
        buffer: &mut BytesMut,
    ) -> ParseResult<Option<Bytes>, BodyError> {
        match &mut self.coding {
            Coding::Empty => ParseResult::Ok(None),
            Coding::Chunked(decoder) => match decoder.decode_chunk(buffer) {
                ParseResult::Ok(None) => {
                    self.coding = Coding::Empty;
                    ParseResult::Ok(None)
                }
                result => result,
            },
            Coding::UntilClose => {
                if buffer.is_empty() {
                    return ParseResult::Pending;
                }
                ParseResult::Ok(Some(buffer.split().freeze()))
            }
            Coding::ContentLength(remaining_mut) => {
                if buffer.is_empty() {
                    return ParseResult::Pending;
                }
                let remaining = *remaining_mut;
                match remaining.checked_sub(buffer.len() as u64) {
                    // buffer contains exact or larger than expected content
                    None | Some(0) => {
                        self.coding = Coding::Empty;
                        #[allow(
                            clippy::cast_possible_truncation,
                            reason = "remaining <= buffer.len() which is usize"
                        )]
                        ParseResult::Ok(Some(buffer.split_to(remaining as usize).freeze()))
                    }
                    // buffer does not contains all expected content
                    Some(leftover) => {
                        *remaining_mut = leftover;
                        ParseResult::Ok(Some(buffer.split().freeze()))
                    }
                }
            }
        }
    }

    /// Signal end of input, returns `true` if the body is complete.
    pub(crate) fn finish(&mut self) -> bool {
        match self.coding {
            Coding::Empty => true,
            Coding::UntilClose => {
                self.coding = Coding::Empty;
                true
            }
            Coding::Chunked(_) | Coding::ContentLength(_) => false,
        }
    }
}
