//! Incremental HTTP/1.1 request parser.
//!
//! The parser is a byte-at-a-time state machine over a growable read
//! buffer. Each call to `parse` consumes input from the current cursor
//! position and returns at most one token; `Ok(None)` means the caller has
//! to read more bytes before calling again. Feeding the same request one
//! byte at a time yields exactly the same token sequence as feeding it as a
//! single block.

use token::{Token, TokenKind};

/// Largest accepted `Content-Length` value (8 MiB)
pub const DEFAULT_MAX_CONTENT_LENGTH: u64 = 8 << 20;
/// Largest accepted non-body token: header names, values, the target (8 KiB)
pub const DEFAULT_MAX_TOKEN_LENGTH: usize = 8 << 10;
/// Largest accepted number of headers in one request
pub const DEFAULT_MAX_HEADERS: u32 = 127;

const CONTENT_LENGTH: &'static [u8] = b"content-length";
const TRANSFER_ENCODING: &'static [u8] = b"transfer-encoding";
const CHUNKED: &'static [u8] = b"chunked";

quick_error! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum ParseError {
        BadRequest {
            description("malformed request")
        }
        PayloadTooLarge {
            description("declared body length is too large")
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum State {
    Method,
    Target,
    Version,
    HeaderKey,
    HeaderValue,
    HeaderEnd,
    Body,
    ChunkSize,
    ChunkExtn,
    ChunkBody,
    ChunkBodyEnd,
    Failed(ParseError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Sub {
    None,
    Lws,
    Cr,
    Crlf,
    CrlfCr,
}

/// Cursor of the request parser.
///
/// Holds the machine state, the scan position, and the bounds configured
/// for this connection. Reset between keep-alive requests, keeping the
/// bounds.
#[derive(Debug)]
pub struct Parser {
    pub(crate) state: State,
    pub(crate) sub: Sub,
    pub(crate) cursor: usize,
    pub(crate) token_start: usize,
    pub(crate) token_len: usize,
    pub(crate) content_length: u64,
    pub(crate) body_start: usize,
    pub(crate) header_count: u32,
    pub(crate) content_length_i: usize,
    pub(crate) transfer_encoding_i: usize,
    pub(crate) seen_content_length: bool,
    pub(crate) seen_transfer_encoding: bool,
    pub(crate) chunked: bool,
    pub(crate) max_token_length: usize,
    pub(crate) max_content_length: u64,
    pub(crate) max_headers: u32,
}

// Case-insensitive prefix match against a header literal. Any deviation
// zeroes the progress counter; the literal counts as recognized only when
// the whole token matched it (checked at the delimiter).
fn advance_match(counter: &mut usize, literal: &'static [u8], c: u8) {
    if *counter < literal.len() && literal[*counter].eq_ignore_ascii_case(&c) {
        *counter += 1;
    } else if literal[0].eq_ignore_ascii_case(&c) {
        *counter = 1;
    } else {
        *counter = 0;
    }
}

impl Parser {
    /// Create a parser with the default bounds.
    pub fn new() -> Parser {
        Parser::with_limits(DEFAULT_MAX_TOKEN_LENGTH,
                            DEFAULT_MAX_CONTENT_LENGTH,
                            DEFAULT_MAX_HEADERS)
    }

    /// Create a parser with explicit bounds (usually taken from `Config`).
    pub fn with_limits(max_token_length: usize, max_content_length: u64,
        max_headers: u32)
        -> Parser
    {
        Parser {
            state: State::Method,
            sub: Sub::None,
            cursor: 0,
            token_start: 0,
            token_len: 0,
            content_length: 0,
            body_start: 0,
            header_count: 0,
            content_length_i: 0,
            transfer_encoding_i: 0,
            seen_content_length: false,
            seen_transfer_encoding: false,
            chunked: false,
            max_token_length: max_token_length,
            max_content_length: max_content_length,
            max_headers: max_headers,
        }
    }

    /// Reset for the next keep-alive request, keeping the bounds.
    pub fn reset(&mut self) {
        *self = Parser::with_limits(self.max_token_length,
                                    self.max_content_length,
                                    self.max_headers);
    }

    /// Whether the request declared `Transfer-Encoding: chunked`.
    pub fn is_chunked(&self) -> bool {
        self.chunked
    }

    /// Consume bytes from the cursor position and return the next token.
    ///
    /// `Ok(None)` means more input is needed. On `Err` the parser is
    /// terminal for this request and keeps returning the same error.
    /// The cursor never moves past `buf.len()`.
    pub fn parse(&mut self, buf: &[u8]) -> Result<Option<Token>, ParseError> {
        if let State::Failed(err) = self.state {
            return Err(err);
        }
        while self.cursor < buf.len() {
            let i = self.cursor;
            let c = buf[i];
            match self.state {
                State::Method => {
                    self.cursor = i + 1;
                    if c == b' ' {
                        let token = self.take_token(TokenKind::Method, i + 1);
                        self.state = State::Target;
                        return Ok(Some(token));
                    }
                    self.bump_token_len()?;
                }
                State::Target => {
                    self.cursor = i + 1;
                    if c == b' ' {
                        let token = self.take_token(TokenKind::Target, i + 1);
                        self.state = State::Version;
                        return Ok(Some(token));
                    }
                    self.bump_token_len()?;
                }
                State::Version => {
                    self.cursor = i + 1;
                    if self.sub == Sub::Cr {
                        if c != b'\n' {
                            return Err(self.fail(ParseError::BadRequest));
                        }
                        self.sub = Sub::None;
                        self.state = State::HeaderKey;
                        self.token_start = i + 1;
                        self.token_len = 0;
                    } else if c == b'\r' {
                        self.sub = Sub::Cr;
                        return Ok(Some(Token {
                            start: self.token_start,
                            len: self.token_len,
                            kind: TokenKind::Version,
                        }));
                    } else {
                        self.bump_token_len()?;
                    }
                }
                State::HeaderKey => {
                    self.cursor = i + 1;
                    if self.token_len == 0 && c == b'\r' {
                        // an empty line instead of a header: end of headers
                        self.state = State::HeaderEnd;
                        self.sub = Sub::CrlfCr;
                        continue;
                    }
                    if c == b':' {
                        let token_len = self.token_len;
                        let matched = |len: usize, counter: usize| {
                            len == counter && token_len == len
                        };
                        self.seen_content_length =
                            matched(CONTENT_LENGTH.len(), self.content_length_i);
                        self.seen_transfer_encoding =
                            matched(TRANSFER_ENCODING.len(), self.transfer_encoding_i);
                        self.content_length_i = 0;
                        self.transfer_encoding_i = 0;
                        let token = self.take_token(TokenKind::HeaderKey, i + 1);
                        self.state = State::HeaderValue;
                        self.sub = Sub::Lws;
                        return Ok(Some(token));
                    }
                    advance_match(&mut self.content_length_i, CONTENT_LENGTH, c);
                    advance_match(&mut self.transfer_encoding_i, TRANSFER_ENCODING, c);
                    self.bump_token_len()?;
                }
                State::HeaderValue => {
                    self.cursor = i + 1;
                    if self.sub == Sub::Lws {
                        match c {
                            b' ' | b'\t' | b'\r' | b'\n' => {}
                            _ => {
                                self.sub = Sub::None;
                                self.token_start = i;
                                self.token_len = 0;
                                self.value_byte(c)?;
                                self.bump_token_len()?;
                            }
                        }
                    } else if c == b'\r' {
                        if self.seen_transfer_encoding
                            && self.token_len == CHUNKED.len()
                            && self.transfer_encoding_i == CHUNKED.len()
                        {
                            self.chunked = true;
                        }
                        self.seen_content_length = false;
                        self.seen_transfer_encoding = false;
                        self.transfer_encoding_i = 0;
                        if self.header_count == self.max_headers {
                            return Err(self.fail(ParseError::BadRequest));
                        }
                        self.header_count += 1;
                        let token = Token {
                            start: self.token_start,
                            len: self.token_len,
                            kind: TokenKind::HeaderValue,
                        };
                        self.state = State::HeaderEnd;
                        self.sub = Sub::Cr;
                        return Ok(Some(token));
                    } else {
                        self.value_byte(c)?;
                        self.bump_token_len()?;
                    }
                }
                State::HeaderEnd => {
                    match self.sub {
                        Sub::Cr => {
                            self.cursor = i + 1;
                            if c != b'\n' {
                                return Err(self.fail(ParseError::BadRequest));
                            }
                            self.sub = Sub::Crlf;
                        }
                        Sub::Crlf => {
                            if c == b'\r' {
                                self.cursor = i + 1;
                                self.sub = Sub::CrlfCr;
                            } else {
                                // next header begins; the byte is reparsed
                                // as part of the key
                                self.state = State::HeaderKey;
                                self.sub = Sub::None;
                                self.token_start = i;
                                self.token_len = 0;
                            }
                        }
                        Sub::CrlfCr => {
                            self.cursor = i + 1;
                            if c != b'\n' {
                                return Err(self.fail(ParseError::BadRequest));
                            }
                            self.sub = Sub::None;
                            self.state = State::Body;
                            self.body_start = i + 1;
                            self.token_start = i + 1;
                            let token = if self.chunked {
                                Token {
                                    start: self.body_start,
                                    len: 0,
                                    kind: TokenKind::Body { chunked: true },
                                }
                            } else {
                                Token {
                                    start: self.body_start,
                                    len: self.content_length as usize,
                                    kind: TokenKind::Body { chunked: false },
                                }
                            };
                            return Ok(Some(token));
                        }
                        Sub::None | Sub::Lws => {
                            return Err(self.fail(ParseError::BadRequest));
                        }
                    }
                }
                State::Body => {
                    // body bytes are not tokenized, the session tracks
                    // completion through the body token
                    self.cursor = buf.len();
                    return Ok(None);
                }
                State::ChunkSize | State::ChunkExtn
                | State::ChunkBody | State::ChunkBodyEnd => {
                    // chunked bodies are driven through parse_chunk()
                    return Ok(None);
                }
                State::Failed(err) => return Err(err),
            }
        }
        Ok(None)
    }

    fn take_token(&mut self, kind: TokenKind, next_start: usize) -> Token {
        let token = Token {
            start: self.token_start,
            len: self.token_len,
            kind: kind,
        };
        self.token_start = next_start;
        self.token_len = 0;
        token
    }

    fn value_byte(&mut self, c: u8) -> Result<(), ParseError> {
        if self.seen_content_length {
            if c < b'0' || c > b'9' {
                return Err(self.fail(ParseError::BadRequest));
            }
            let digit = (c - b'0') as u64;
            let value = self.content_length.checked_mul(10)
                .and_then(|v| v.checked_add(digit));
            match value {
                Some(v) if v <= self.max_content_length => {
                    self.content_length = v;
                }
                _ => return Err(self.fail(ParseError::PayloadTooLarge)),
            }
        } else if self.seen_transfer_encoding {
            advance_match(&mut self.transfer_encoding_i, CHUNKED, c);
        }
        Ok(())
    }

    fn bump_token_len(&mut self) -> Result<(), ParseError> {
        self.token_len += 1;
        if self.token_len > self.max_token_length {
            return Err(self.fail(ParseError::BadRequest));
        }
        Ok(())
    }

    pub(crate) fn fail(&mut self, err: ParseError) -> ParseError {
        self.state = State::Failed(err);
        err
    }
}
