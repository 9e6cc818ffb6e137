use bytes::{Buf, Bytes, BytesMut};

use crate::body::error::BodyError;
use crate::common::{ParseResult, ready};

const MAX_CHUNKED_SIZE: u64 = u64::MAX >> 1;

/// Limit of a single chunk-size or trailer line.
const MAX_LINE: usize = 8 * 1024;

/// Chunked transfer coding decoder.
///
/// [httpwg](https://httpwg.org/specs/rfc9112.html#chunked.encoding)
#[derive(Clone, Debug)]
pub struct ChunkedDecoder {
    phase: Phase,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    /// chunk-size [ chunk-ext ] CRLF
    Header,
    /// chunk-data with remaining length
    Chunk(u64),
    /// CRLF after chunk-data
    ChunkEnd,
    /// trailer-section CRLF
    Trailer,
    Eof,
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkedDecoder {
    pub(crate) fn new() -> Self {
        Self { phase: Phase::Header }
    }

    /// Decode the next chunk data, returns `Ok(None)` if end of chunks found.
    pub(crate) fn decode_chunk(
        &mut self,
        buffer: &mut BytesMut,
    ) -> ParseResult<Option<Bytes>, BodyError> {
        loop {
            match self.phase {
                Phase::Eof => return ParseResult::Ok(None),
                Phase::Header => {
                    let line = ready!(take_line(buffer));
                    let digits_len = line
                        .iter()
                        .position(|e| !e.is_ascii_hexdigit())
                        .unwrap_or(line.len());

                    // extension or trailing whitespace
                    if !matches!(line.get(digits_len), None | Some(b';' | b' ' | b'\t')) {
                        return ParseResult::Err(BodyError::InvalidChunked);
                    }

                    // SAFETY: `is_ascii_hexdigit` is subset of ASCII
                    let digits = unsafe { std::str::from_utf8_unchecked(&line[..digits_len]) };
                    let Ok(chunk_len) = u64::from_str_radix(digits, 16) else {
                        return ParseResult::Err(if digits_len == 0 {
                            BodyError::InvalidChunked
                        } else {
                            BodyError::ChunkTooLarge
                        });
                    };
                    if chunk_len > MAX_CHUNKED_SIZE {
                        return ParseResult::Err(BodyError::ChunkTooLarge);
                    }

                    self.phase = match chunk_len {
                        0 => Phase::Trailer,
                        len => Phase::Chunk(len),
                    };
                }
                Phase::Chunk(remaining) => {
                    if buffer.is_empty() {
                        return ParseResult::Pending;
                    }
                    let chunk = match remaining.checked_sub(buffer.len() as u64) {
                        // buffer contains less than or equal to the remaining chunk
                        Some(leftover) => {
                            self.phase = match leftover {
                                0 => Phase::ChunkEnd,
                                _ => Phase::Chunk(leftover),
                            };
                            buffer.split()
                        }
                        // buffer contains larger than the remaining chunk
                        None => {
                            self.phase = Phase::ChunkEnd;
                            #[allow(
                                clippy::cast_possible_truncation,
                                reason = "remaining < buffer.len() which is usize"
                            )]
                            buffer.split_to(remaining as usize)
                        }
                    };
                    return ParseResult::Ok(Some(chunk.freeze()));
                }
                Phase::ChunkEnd => match buffer.first_chunk::<2>() {
                    Some(b"\r\n") => {
                        buffer.advance(2);
                        self.phase = Phase::Header;
                    }
                    Some([b'\n', _]) => {
                        buffer.advance(1);
                        self.phase = Phase::Header;
                    }
                    Some(_) => return ParseResult::Err(BodyError::InvalidChunked),
                    None if buffer.first() == Some(&b'\n') => {
                        buffer.advance(1);
                        self.phase = Phase::Header;
                    }
                    None => return ParseResult::Pending,
                },
                Phase::Trailer => {
                    let line = ready!(take_line(buffer));
                    // trailer fields are discarded
                    if line.is_empty() {
                        self.phase = Phase::Eof;
                    }
                }
            }
        }
    }
}

/// Split one line off the buffer, without its CRLF or LF terminator.
fn take_line(buffer: &mut BytesMut) -> ParseResult<BytesMut, BodyError> {
    let Some(lf) = buffer.iter().position(|&e| e == b'\n') else {
        if buffer.len() > MAX_LINE {
            return ParseResult::Err(BodyError::InvalidChunked);
        }
        return ParseResult::Pending;
    };
    let mut line = buffer.split_to(lf + 1);
    line.truncate(lf);
    if line.last() == Some(&b'\r') {
        line.truncate(lf - 1);
    }
    ParseResult::Ok(line)
}

#[cfg(test)]
mod test {
    use bytes::BytesMut;

    use super::ChunkedDecoder;
    use crate::body::error::BodyError;
    use crate::common::ParseResult;

    fn decode_all(dec: &mut ChunkedDecoder, buf: &mut BytesMut) -> Result<(Vec<u8>, bool), BodyError> {
        let mut out = Vec::new();
        loop {
            match dec.decode_chunk(buf) {
                ParseResult::Ok(Some(chunk)) => out.extend_from_slice(&chunk),
                ParseResult::Ok(None) => return Ok((out, true)),
                ParseResult::Pending => return Ok((out, false)),
                ParseResult::Err(err) => return Err(err),
            }
        }
    }

    #[test]
    fn chunked_whole() {
        let mut dec = ChunkedDecoder::new();
        let mut buf = BytesMut::from(&b"4\r\nWiki\r\n5;ext=1\r\npedia\r\n0\r\nX-Trailer: a\r\n\r\nNEXT"[..]);
        let (body, done) = decode_all(&mut dec, &mut buf).unwrap();
        assert_eq!(body, b"Wikipedia");
        assert!(done);
        assert!(matches!(dec.decode_chunk(&mut buf), ParseResult::Ok(None)));
        assert_eq!(&buf[..], b"NEXT");
    }

    #[test]
    fn chunked_split_bytewise() {
        let input = b"a\r\n0123456789\r\n3\r\nabc\r\n0\r\n\r\n";
        let mut dec = ChunkedDecoder::new();
        let mut buf = BytesMut::new();
        let mut body = Vec::new();
        let mut done = false;
        for b in input {
            buf.extend_from_slice(&[*b]);
            let (chunk, eof) = decode_all(&mut dec, &mut buf).unwrap();
            body.extend_from_slice(&chunk);
            done |= eof;
        }
        assert!(done);
        assert_eq!(body, b"0123456789abc");
    }

    #[test]
    fn chunked_invalid() {
        let mut dec = ChunkedDecoder::new();
        let mut buf = BytesMut::from(&b"zz\r\n"[..]);
        assert_eq!(decode_all(&mut dec, &mut buf), Err(BodyError::InvalidChunked));

        let mut dec = ChunkedDecoder::new();
        let mut buf = BytesMut::from(&b"2\r\nabXY"[..]);
        assert_eq!(decode_all(&mut dec, &mut buf), Err(BodyError::InvalidChunked));

        let mut dec = ChunkedDecoder::new();
        let mut buf = BytesMut::from(&b"fffffffffffffffff\r\n"[..]);
        assert_eq!(decode_all(&mut dec, &mut buf), Err(BodyError::ChunkTooLarge));
    }
}
