extern crate ev_http;

use ev_http::{Buffer, MemCounter, ParseError, Parser, Token, TokenKind};

fn tokenize(input: &[u8]) -> Vec<Token> {
    let mut parser = Parser::new();
    let mut tokens = Vec::new();
    loop {
        match parser.parse(input).expect("well-formed input") {
            Some(token) => {
                let body = match token.kind {
                    TokenKind::Body { .. } => true,
                    _ => false,
                };
                tokens.push(token);
                if body {
                    return tokens;
                }
            }
            None => return tokens,
        }
    }
}

#[test]
fn tokens_cover_the_head_without_overlap() {
    // every byte up to the body belongs to exactly one token or to the
    // delimiters between them; tokens are in increasing positions
    let input: &[u8] = b"GET /path HTTP/1.1\r\n\
                         Host: example.com\r\n\
                         Accept: */*\r\n\r\n";
    let tokens = tokenize(input);
    let mut last_end = 0;
    for token in &tokens {
        assert!(token.start >= last_end,
                "token {:?} overlaps the previous one", token);
        assert!(token.end() <= input.len());
        last_end = token.end();
    }
    assert_eq!(tokens.last().unwrap().kind,
               TokenKind::Body { chunked: false });
}

#[test]
fn byte_at_a_time_equals_single_block() {
    let input: &[u8] = b"POST /p?x=2 HTTP/1.1\r\n\
                         Host: example.com\r\n\
                         Content-Length: 5\r\n\
                         X-Empty-Ish:   padded value\r\n\r\nabcde";
    let block = tokenize(input);

    let mut parser = Parser::new();
    let mut dribble = Vec::new();
    'outer: for n in 1..input.len() + 1 {
        loop {
            match parser.parse(&input[..n]).expect("well-formed input") {
                Some(token) => {
                    let body = match token.kind {
                        TokenKind::Body { .. } => true,
                        _ => false,
                    };
                    dribble.push(token);
                    if body {
                        break 'outer;
                    }
                }
                None => break,
            }
        }
    }
    assert_eq!(block, dribble);
}

#[test]
fn never_reads_past_the_given_length() {
    // bytes past `n` must not influence parsing
    let full: &[u8] = b"GET / HTTP/1.1\r\nHost: x\r\n\r\n";
    let mut parser = Parser::new();
    let mut count = 0;
    loop {
        match parser.parse(&full[..15]).unwrap() {
            Some(_) => count += 1,
            None => break,
        }
    }
    // "GET / HTTP/1.1\r" holds exactly three finished tokens
    assert_eq!(count, 3);
}

#[test]
fn parse_errors_are_terminal_and_bounded() {
    let inputs: &[&[u8]] = &[
        b"GET / HTTP/1.1\r\nContent-Length: 99999999999999\r\n\r\n",
        b"GET / HTTP/1.1\r\nContent-Length: 1x\r\n\r\n",
        b"GET / HTTP/1.1\rmangled\r\n\r\n",
    ];
    for input in inputs {
        let mut parser = Parser::new();
        let err = loop {
            match parser.parse(input) {
                Ok(Some(_)) => {}
                Ok(None) => panic!("{:?} should not parse",
                                   String::from_utf8_lossy(input)),
                Err(e) => break e,
            }
        };
        match err {
            ParseError::BadRequest | ParseError::PayloadTooLarge => {}
        }
        // stays failed on the next call
        assert_eq!(parser.parse(input).unwrap_err(), err);
    }
}

#[test]
fn specials_match_any_case() {
    for name in &["transfer-encoding", "Transfer-Encoding",
                  "TRANSFER-ENCODING", "tRaNsFeR-eNcOdInG"] {
        let input = format!("POST / HTTP/1.1\r\n{}: chunked\r\n\r\n", name);
        let tokens = tokenize(input.as_bytes());
        assert_eq!(tokens.last().unwrap().kind,
                   TokenKind::Body { chunked: true },
                   "header name {} was not recognized", name);
    }
}

#[test]
fn chunked_round_trip() {
    let head: &[u8] =
        b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n";
    let counter = MemCounter::new();
    let mut buf = Buffer::with_capacity(1024, &counter);
    buf.read_from(&mut &head[..]);

    let mut parser = Parser::new();
    loop {
        match parser.parse(buf.as_slice()).unwrap() {
            Some(token) => {
                if token.kind == (TokenKind::Body { chunked: true }) {
                    break;
                }
            }
            None => panic!("incomplete head"),
        }
    }
    parser.start_chunk_mode();

    let encoded: &[u8] =
        b"4\r\nWiki\r\n7\r\npedia i\r\nb\r\nn chunks.\r\n\r\n0\r\n\r\n";
    buf.read_from(&mut &encoded[..]);
    let mut decoded = Vec::new();
    loop {
        let token = parser.parse_chunk(&mut buf).unwrap()
            .expect("chunk is buffered");
        if token.len == 0 {
            break;
        }
        decoded.extend_from_slice(&buf.as_slice()[token.start..token.end()]);
    }
    assert_eq!(decoded, b"Wikipedia in chunks.\r\n".to_vec());
}

#[test]
fn chunked_recycling_keeps_memory_bounded() {
    let head: &[u8] =
        b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n";
    let counter = MemCounter::new();
    let mut buf = Buffer::with_capacity(1024, &counter);
    buf.read_from(&mut &head[..]);

    let mut parser = Parser::new();
    loop {
        match parser.parse(buf.as_slice()).unwrap() {
            Some(token) => {
                if token.kind == (TokenKind::Body { chunked: true }) {
                    break;
                }
            }
            None => panic!("incomplete head"),
        }
    }
    parser.start_chunk_mode();

    // one megabyte of body in chunks no larger than the initial buffer
    let mut total = 0usize;
    for i in 0..2048 {
        let payload = vec![b'x'; 512];
        let mut wire = format!("{:x};n={}\r\n", payload.len(), i).into_bytes();
        wire.extend_from_slice(&payload);
        wire.extend_from_slice(b"\r\n");
        for piece in wire.chunks(300) {
            buf.read_from(&mut &piece[..]);
            match parser.parse_chunk(&mut buf).unwrap() {
                Some(token) => total += token.len,
                None => {}
            }
        }
        assert!(buf.capacity() <= 2 * 1024,
                "read buffer grew to {}", buf.capacity());
    }
    assert_eq!(total, 2048 * 512);
}
