//! Chunked transfer-encoding body parser.
//!
//! Runs over the same cursor as the header parser, picking up right after
//! the body token. Unlike the header machine it mutates the buffer: when a
//! call ends without producing a token, the partial token at the end of the
//! buffer is shifted back to the start of the body so the next socket read
//! overwrites chunk bytes that were already consumed. This keeps memory
//! bounded for arbitrarily long chunked uploads.

use buffer::Buffer;
use parser::{ParseError, Parser, State};
use token::{Token, TokenKind};

fn hex_digit(c: u8) -> Option<u64> {
    match c {
        b'0'..=b'9' => Some((c - b'0') as u64),
        b'a'..=b'f' => Some((c - b'a' + 10) as u64),
        b'A'..=b'F' => Some((c - b'A' + 10) as u64),
        _ => None,
    }
}

impl Parser {
    /// Prime the cursor for reading a chunked body. Called once, after the
    /// body token of a chunked request was emitted.
    pub fn start_chunk_mode(&mut self) {
        self.token_start = self.cursor;
        self.content_length = 0;
        self.state = State::ChunkSize;
    }

    /// Consume buffered body bytes and return the next chunk, if a whole
    /// one is available.
    ///
    /// A chunk of declared length zero is returned as a normal zero-length
    /// `ChunkBody` token and means the body is complete.
    pub fn parse_chunk(&mut self, buf: &mut Buffer)
        -> Result<Option<Token>, ParseError>
    {
        if let State::Failed(err) = self.state {
            return Err(err);
        }
        let n = buf.len();
        while self.cursor < n {
            let i = self.cursor;
            let c = buf.as_slice()[i];
            match self.state {
                State::ChunkSize => {
                    self.cursor = i + 1;
                    match c {
                        b';' => self.state = State::ChunkExtn,
                        b'\r' => {}
                        b'\n' => {
                            self.token_start = i + 1;
                            if n - (i + 1) >= self.content_length as usize {
                                return Ok(Some(self.chunk_body_token()));
                            }
                            self.state = State::ChunkBody;
                        }
                        _ => {
                            if let Some(digit) = hex_digit(c) {
                                self.accumulate_hex(digit)?;
                            }
                        }
                    }
                }
                State::ChunkExtn => {
                    self.cursor = i + 1;
                    if c == b'\n' {
                        self.token_start = i + 1;
                        if n - (i + 1) >= self.content_length as usize {
                            return Ok(Some(self.chunk_body_token()));
                        }
                        self.state = State::ChunkBody;
                    }
                }
                State::ChunkBody => {
                    if n - self.token_start >= self.content_length as usize {
                        return Ok(Some(self.chunk_body_token()));
                    }
                    self.cursor = n;
                }
                State::ChunkBodyEnd => {
                    self.cursor = i + 1;
                    if c == b'\n' {
                        self.state = State::ChunkSize;
                        self.content_length = 0;
                        self.token_start = i + 1;
                    }
                }
                _ => return Ok(None),
            }
        }
        // End of buffered input with no token. Shift the partial token down
        // to the body start so consumed chunk bytes get overwritten by the
        // next read instead of growing the buffer.
        if self.token_start > self.body_start {
            let partial = n - self.token_start;
            buf.recycle(self.token_start, self.body_start);
            self.token_start = self.body_start;
            self.cursor = self.body_start + partial;
        }
        Ok(None)
    }

    fn chunk_body_token(&mut self) -> Token {
        let len = self.content_length as usize;
        let token = Token {
            start: self.token_start,
            len: len,
            kind: TokenKind::ChunkBody,
        };
        self.cursor = self.token_start + len;
        self.state = State::ChunkBodyEnd;
        token
    }

    fn accumulate_hex(&mut self, digit: u64) -> Result<(), ParseError> {
        let value = self.content_length.checked_mul(16)
            .and_then(|v| v.checked_add(digit));
        match value {
            Some(v) if v <= self.max_content_length => {
                self.content_length = v;
                Ok(())
            }
            _ => Err(self.fail(ParseError::PayloadTooLarge)),
        }
    }
}

#[cfg(test)]
mod test {
    use buffer::{Buffer, MemCounter};
    use parser::Parser;
    use token::TokenKind;

    fn chunk_parser(buf: &mut Buffer, headers: &[u8]) -> Parser {
        let mut parser = Parser::new();
        buf.read_from(&mut &headers[..]);
        loop {
            match parser.parse(buf.as_slice()).unwrap() {
                Some(token) => {
                    if token.kind == (TokenKind::Body { chunked: true }) {
                        break;
                    }
                }
                None => panic!("header section is incomplete"),
            }
        }
        parser.start_chunk_mode();
        parser
    }

    const HEAD: &'static [u8] =
        b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n";

    #[test]
    fn single_chunk() {
        let counter = MemCounter::new();
        let mut buf = Buffer::with_capacity(1024, &counter);
        let mut parser = chunk_parser(&mut buf, HEAD);

        buf.read_from(&mut &b"5\r\nhello\r\n"[..]);
        let token = parser.parse_chunk(&mut buf).unwrap().unwrap();
        assert_eq!(token.kind, TokenKind::ChunkBody);
        assert_eq!(&buf.as_slice()[token.start..token.end()], b"hello");

        buf.read_from(&mut &b"0\r\n\r\n"[..]);
        let token = parser.parse_chunk(&mut buf).unwrap().unwrap();
        assert_eq!(token.len, 0);
    }

    #[test]
    fn chunk_extension_is_ignored() {
        let counter = MemCounter::new();
        let mut buf = Buffer::with_capacity(1024, &counter);
        let mut parser = chunk_parser(&mut buf, HEAD);

        buf.read_from(&mut &b"3;meta=1\r\nabc\r\n"[..]);
        let token = parser.parse_chunk(&mut buf).unwrap().unwrap();
        assert_eq!(&buf.as_slice()[token.start..token.end()], b"abc");
    }

    #[test]
    fn round_trip_reassembles_body() {
        let counter = MemCounter::new();
        let mut buf = Buffer::with_capacity(1024, &counter);
        let mut parser = chunk_parser(&mut buf, HEAD);

        let wire: &[u8] = b"5\r\nhello\r\n1\r\n \r\n5\r\nworld\r\n0\r\n\r\n";
        buf.read_from(&mut &wire[..]);
        let mut body = Vec::new();
        loop {
            let token = parser.parse_chunk(&mut buf).unwrap().unwrap();
            if token.len == 0 {
                break;
            }
            body.extend_from_slice(&buf.as_slice()[token.start..token.end()]);
        }
        assert_eq!(body, b"hello world");
    }

    #[test]
    fn split_chunk_arrives_in_pieces() {
        let counter = MemCounter::new();
        let mut buf = Buffer::with_capacity(1024, &counter);
        let mut parser = chunk_parser(&mut buf, HEAD);

        buf.read_from(&mut &b"a\r\n01234"[..]);
        assert_eq!(parser.parse_chunk(&mut buf).unwrap(), None);
        buf.read_from(&mut &b"56789\r\n"[..]);
        let token = parser.parse_chunk(&mut buf).unwrap().unwrap();
        assert_eq!(&buf.as_slice()[token.start..token.end()], b"0123456789");
    }

    #[test]
    fn recycling_bounds_the_buffer() {
        // many chunks, each smaller than the initial buffer, must never
        // grow the buffer beyond twice its starting capacity
        let counter = MemCounter::new();
        let mut buf = Buffer::with_capacity(256, &counter);
        let mut parser = chunk_parser(&mut buf, HEAD);
        let initial = buf.capacity();

        let mut body = Vec::new();
        for round in 0..64 {
            let payload = [b'a' + (round % 26) as u8; 100];
            let mut wire = format!("{:x}\r\n", payload.len()).into_bytes();
            wire.extend_from_slice(&payload);
            wire.extend_from_slice(b"\r\n");
            // trickle so the parser sees plenty of partial states
            for piece in wire.chunks(7) {
                buf.read_from(&mut &piece[..]);
                match parser.parse_chunk(&mut buf).unwrap() {
                    Some(token) => {
                        body.extend_from_slice(
                            &buf.as_slice()[token.start..token.end()]);
                    }
                    None => {}
                }
            }
            assert!(buf.capacity() <= initial * 2,
                    "buffer grew to {} bytes", buf.capacity());
        }
        assert_eq!(body.len(), 64 * 100);
    }
}
