//! HTTP Response Parser
use bytes::{Buf, Bytes, BytesMut};

use crate::body::BodyDecoder;
use crate::common::{ParseResult, ready};
use crate::headers::standard::{CONNECTION, SET_COOKIE, WWW_AUTHENTICATE};
use crate::headers::{HeaderMap, HeaderName, HeaderValue, is_token};
use crate::http::{Method, Version};
use crate::log::trace;
use crate::proto::error::ParseError;
use crate::response::Head;

/// Response head size limit.
const MAX_HEAD_SIZE: usize = 64 * 1024;

const MAX_HEADERS: usize = 128;

// ===== Status Line =====

/// Result of [`parse_status_line`].
#[derive(Debug, PartialEq, Eq)]
pub struct StatusLineRef<'a> {
    pub version: Version,
    pub status: u16,
    pub reason: &'a str,
}

/// Parse HTTP Status line, without its line terminator.
pub fn parse_status_line(line: &[u8]) -> Result<StatusLineRef<'_>, ParseError> {
    const VERSION_SIZE: usize = b"HTTP/1.1".len();

    let Some((version, rest)) = line.split_first_chunk::<VERSION_SIZE>() else {
        return Err(ParseError::InvalidStatusLine);
    };
    if !version.starts_with(b"HTTP/") {
        return Err(ParseError::InvalidStatusLine);
    }
    let Some(version) = Version::from_bytes(version) else {
        return Err(ParseError::UnsupportedVersion);
    };

    let Some((b' ', rest)) = rest.split_first() else {
        return Err(ParseError::InvalidStatusLine);
    };

    let status = match rest.split_first_chunk::<3>() {
        Some((digits, tail)) if digits.iter().all(u8::is_ascii_digit) => {
            if !matches!(tail.first(), None | Some(b' ')) {
                return Err(ParseError::InvalidStatus);
            }
            digits.iter().fold(0u16, |acc, d| acc * 10 + u16::from(d - b'0'))
        }
        _ => return Err(ParseError::InvalidStatus),
    };

    // reason-phrase is informational, tolerate non UTF-8
    let reason = match rest.get(4..) {
        Some(reason) => std::str::from_utf8(reason).unwrap_or(""),
        None => "",
    };

    Ok(StatusLineRef {
        version,
        status,
        reason,
    })
}

// ===== Header =====

/// Result of [`parse_header`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderRef<'a> {
    pub name: &'a [u8],
    pub value: &'a [u8],
}

/// Parse HTTP Header line, without its line terminator.
///
/// Leading and trailing whitespace of the value is trimmed.
pub fn parse_header(line: &[u8]) -> Result<HeaderRef<'_>, ParseError> {
    let Some(colon) = line.iter().position(|e| e == &b':') else {
        return Err(ParseError::InvalidHeader);
    };
    let name = &line[..colon];
    if name.is_empty() || !name.iter().all(|&e| is_token(e)) {
        return Err(ParseError::InvalidHeader);
    }
    let value = line[colon + 1..].trim_ascii();
    if value.iter().any(|&e| e == b'\r' || e == b'\0') {
        return Err(ParseError::InvalidHeader);
    }
    Ok(HeaderRef { name, value })
}

/// Find the end of a message head in `bytes`, starting at `from`.
///
/// Returns the length of the head including its terminating empty line.
fn find_head_end(bytes: &[u8], from: usize) -> Option<usize> {
    let mut i = from;
    while let Some(lf) = bytes[i..].iter().position(|e| e == &b'\n') {
        let at = i + lf;
        match &bytes[at + 1..] {
            [b'\n', ..] => return Some(at + 2),
            [b'\r', b'\n', ..] => return Some(at + 3),
            _ => i = at + 1,
        }
    }
    None
}

/// Iterate lines without their CRLF or LF terminator.
fn lines(head: &[u8]) -> impl Iterator<Item = &[u8]> {
    head.split(|e| e == &b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
}

// ===== Parser =====

/// Event emitted by [`ResponseParser`].
#[derive(Debug)]
pub enum Event {
    /// Response head is complete.
    Head {
        head: Head,
        /// Every `Set-Cookie` value, excluded from [`Head::headers`].
        set_cookie: Vec<String>,
    },
    /// A chunk of the response body.
    Data(Bytes),
    /// Response message is complete.
    Complete,
}

/// Outcome of connection close for the message in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eof {
    /// No message was in progress.
    Idle,
    /// A close-delimited message is now complete.
    Complete,
    /// Message is truncated.
    Partial,
}

#[derive(Debug)]
enum State {
    /// Waiting for the status line, `scanned` bytes are known not to contain the head end.
    Head { scanned: usize },
    Body(BodyDecoder),
    Failed,
}

/// Incremental HTTP/1.x response parser.
///
/// Bytes are appended with [`feed`][ResponseParser::feed], and events are pulled with
/// [`poll`][ResponseParser::poll] until it returns `Pending`.
#[derive(Debug)]
pub struct ResponseParser {
    buffer: BytesMut,
    state: State,
}

impl Default for ResponseParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseParser {
    /// Create new [`ResponseParser`].
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::new(),
            state: State::Head { scanned: 0 },
        }
    }

    /// Append received bytes.
    #[inline]
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Returns `true` if no message is in progress and no bytes are buffered.
    #[inline]
    pub fn is_idle(&self) -> bool {
        matches!(self.state, State::Head { .. }) && self.buffer.is_empty()
    }

    /// Poll the next event.
    ///
    /// `method` is the method of the request this response answers, a response to `HEAD` never
    /// carries a body.
    pub fn poll(&mut self, method: Method) -> ParseResult<Event, ParseError> {
        match &mut self.state {
            State::Failed => ParseResult::Pending,
            State::Head { .. } => match self.poll_head(method) {
                ParseResult::Err(err) => self.fail(err),
                result => result,
            },
            State::Body(decoder) => match decoder.decode_chunk(&mut self.buffer) {
                ParseResult::Ok(Some(data)) => ParseResult::Ok(Event::Data(data)),
                ParseResult::Ok(None) => {
                    self.state = State::Head { scanned: 0 };
                    ParseResult::Ok(Event::Complete)
                }
                ParseResult::Pending => ParseResult::Pending,
                ParseResult::Err(err) => self.fail(err.into()),
            },
        }
    }

    /// Signal that the connection is closed.
    pub fn eof(&mut self) -> Eof {
        match &mut self.state {
            State::Head { .. } if self.buffer.is_empty() => Eof::Idle,
            State::Head { .. } | State::Failed => Eof::Partial,
            State::Body(decoder) => {
                if decoder.finish() {
                    self.state = State::Head { scanned: 0 };
                    Eof::Complete
                } else {
                    Eof::Partial
                }
            }
        }
    }

    fn fail(&mut self, err: ParseError) -> ParseResult<Event, ParseError> {
        trace!("response parse error: {err}");
        self.state = State::Failed;
        self.buffer.clear();
        ParseResult::Err(err)
    }

    fn poll_head(&mut self, method: Method) -> ParseResult<Event, ParseError> {
        loop {
            let head_len = ready!(self.find_head());
            let head = self.buffer.split_to(head_len).freeze();

            let (head, set_cookie) = match parse_head(&head) {
                Ok(ok) => ok,
                Err(err) => return ParseResult::Err(err),
            };

            // interim response
            if (100..200).contains(&head.status) && head.status != 101 {
                trace!("skipping interim response {}", head.status);
                continue;
            }

            let no_body = method == Method::HEAD
                || matches!(head.status, 101 | 204 | 304);

            let decoder = if no_body {
                BodyDecoder::empty()
            } else {
                match BodyDecoder::new(&head.headers) {
                    Ok(ok) => ok,
                    Err(err) => return ParseResult::Err(err.into()),
                }
            };

            let mut head = head;
            if decoder.is_close_delimited() {
                head.keep_alive = false;
            }

            self.state = State::Body(decoder);
            return ParseResult::Ok(Event::Head { head, set_cookie });
        }
    }

    fn find_head(&mut self) -> ParseResult<usize, ParseError> {
        let State::Head { scanned } = &mut self.state else {
            return ParseResult::Pending;
        };

        // tolerate empty lines preceding the status line
        while let [b'\r' | b'\n', ..] = &self.buffer[..] {
            self.buffer.advance(1);
            *scanned = 0;
        }

        // search can resume at most 2 bytes before the previous end
        match find_head_end(&self.buffer, scanned.saturating_sub(2)) {
            Some(len) => {
                *scanned = 0;
                ParseResult::Ok(len)
            }
            None if self.buffer.len() > MAX_HEAD_SIZE => ParseResult::Err(ParseError::TooLarge),
            None => {
                *scanned = self.buffer.len();
                ParseResult::Pending
            }
        }
    }
}

/// Parse a complete message head, including its terminating empty line.
fn parse_head(bytes: &[u8]) -> Result<(Head, Vec<String>), ParseError> {
    let mut lines = lines(bytes);

    let line = lines.next().ok_or(ParseError::InvalidStatusLine)?;
    let StatusLineRef { version, status, reason } = parse_status_line(line)?;

    let mut headers = HeaderMap::with_capacity(16);
    let mut set_cookie = Vec::new();
    let mut count = 0;
    // (name, value) of the last field, kept unflushed to accumulate obsolete line folding
    let mut last: Option<(HeaderName, Vec<u8>)> = None;

    for line in lines {
        if line.is_empty() {
            continue;
        }

        // obs-fold
        if let [b' ' | b'\t', ..] = line {
            let Some((_, value)) = &mut last else {
                return Err(ParseError::InvalidHeader);
            };
            value.push(b' ');
            value.extend_from_slice(line.trim_ascii());
            continue;
        }

        count += 1;
        if count > MAX_HEADERS {
            return Err(ParseError::TooManyHeaders);
        }

        if let Some((name, value)) = last.take() {
            flush_header(&mut headers, &mut set_cookie, name, value)?;
        }

        let HeaderRef { name, value } = parse_header(line)?;
        let name = HeaderName::from_bytes(name).map_err(|_| ParseError::InvalidHeader)?;
        last = Some((name, value.to_vec()));
    }

    if let Some((name, value)) = last.take() {
        flush_header(&mut headers, &mut set_cookie, name, value)?;
    }

    let keep_alive = connection_keep_alive(&headers).unwrap_or(version.is_keep_alive_default());
    let challenges = headers
        .get_all(WWW_AUTHENTICATE)
        .map(|e| e.as_str_lossy().into_owned())
        .collect();

    let head = Head {
        version,
        status,
        reason: reason.to_owned(),
        headers,
        keep_alive,
        challenges,
    };
    Ok((head, set_cookie))
}

fn flush_header(
    headers: &mut HeaderMap,
    set_cookie: &mut Vec<String>,
    name: HeaderName,
    value: Vec<u8>,
) -> Result<(), ParseError> {
    if name == SET_COOKIE {
        set_cookie.push(String::from_utf8_lossy(&value).into_owned());
        return Ok(());
    }
    let value = HeaderValue::from_bytes(value).map_err(|_| ParseError::InvalidHeader)?;
    headers.append(name, value);
    Ok(())
}

/// Keep-alive as stated by `Connection` header, `None` if not stated.
///
/// `close` wins over `keep-alive`.
fn connection_keep_alive(headers: &HeaderMap) -> Option<bool> {
    let mut result = None;
    for value in headers.get_all(CONNECTION) {
        for token in value.as_bytes().split(|e| e == &b',').map(<[u8]>::trim_ascii) {
            if token.eq_ignore_ascii_case(b"close") {
                return Some(false);
            }
            if token.eq_ignore_ascii_case(b"keep-alive") {
                result = Some(true);
            }
        }
    }
    result
}
