//! Assembly of responses into wire bytes.
//!
//! Everything is written straight into the output vector that later
//! becomes the session's write buffer.

use std::io::Write;

use enums::reason_phrase;
use super::response::Response;

/// Buffer a complete fixed-length response: status line, `Date`,
/// `Connection`, application headers, `Content-Length`, body.
pub fn render_response(out: &mut Vec<u8>, response: &Response, date: &str,
    keep_alive: bool)
{
    render_head(out, response, date, keep_alive, false);
    out.extend_from_slice(response.body_bytes());
}

/// Buffer the header section of a chunked response. No `Content-Length`;
/// `Transfer-Encoding: chunked` instead, and the body follows as chunks.
pub fn render_chunked_head(out: &mut Vec<u8>, response: &Response,
    date: &str, keep_alive: bool)
{
    render_head(out, response, date, keep_alive, true);
}

/// Buffer one body chunk: `<hex-size>CRLF <bytes> CRLF`.
pub fn render_chunk(out: &mut Vec<u8>, data: &[u8]) {
    write!(out, "{:x}\r\n", data.len()).unwrap();
    out.extend_from_slice(data);
    out.extend_from_slice(b"\r\n");
}

/// Buffer the terminating chunk with an optional trailer section.
pub fn render_last_chunk(out: &mut Vec<u8>, trailers: &[(String, String)]) {
    out.extend_from_slice(b"0\r\n");
    for &(ref key, ref value) in trailers {
        write!(out, "{}: {}\r\n", key, value).unwrap();
    }
    out.extend_from_slice(b"\r\n");
}

fn render_head(out: &mut Vec<u8>, response: &Response, date: &str,
    keep_alive: bool, chunked: bool)
{
    let status = response.status_code();
    write!(out, "HTTP/1.1 {} {}\r\n", status, reason_phrase(status)).unwrap();
    write!(out, "Date: {}\r\n", date).unwrap();
    if keep_alive {
        out.extend_from_slice(b"Connection: keep-alive\r\n");
    } else {
        out.extend_from_slice(b"Connection: close\r\n");
    }
    if chunked {
        out.extend_from_slice(b"Transfer-Encoding: chunked\r\n");
    }
    for &(ref key, ref value) in response.header_list() {
        write!(out, "{}: {}\r\n", key, value).unwrap();
    }
    if !chunked {
        write!(out, "Content-Length: {}\r\n",
               response.body_bytes().len()).unwrap();
    }
    out.extend_from_slice(b"\r\n");
}

#[cfg(test)]
mod test {
    use server::Response;
    use super::{render_chunk, render_chunked_head, render_last_chunk,
                render_response};

    const DATE: &'static str = "Sun Jun 20 23:21:05 1993";

    #[test]
    fn simple_response() {
        let mut response = Response::new();
        response.body("hi");
        let mut out = Vec::new();
        render_response(&mut out, &response, DATE, true);
        assert_eq!(String::from_utf8(out).unwrap(),
            "HTTP/1.1 200 OK\r\n\
             Date: Sun Jun 20 23:21:05 1993\r\n\
             Connection: keep-alive\r\n\
             Content-Length: 2\r\n\r\nhi");
    }

    #[test]
    fn close_and_headers() {
        let mut response = Response::new();
        response.status(404)
            .header("Content-Type", "text/plain")
            .body("gone");
        let mut out = Vec::new();
        render_response(&mut out, &response, DATE, false);
        assert_eq!(String::from_utf8(out).unwrap(),
            "HTTP/1.1 404 Not Found\r\n\
             Date: Sun Jun 20 23:21:05 1993\r\n\
             Connection: close\r\n\
             Content-Type: text/plain\r\n\
             Content-Length: 4\r\n\r\ngone");
    }

    #[test]
    fn unknown_reason_is_empty() {
        let mut response = Response::new();
        response.status(218);
        let mut out = Vec::new();
        render_response(&mut out, &response, DATE, true);
        assert!(out.starts_with(b"HTTP/1.1 218 \r\n"));
    }

    #[test]
    fn chunked_stream() {
        let mut response = Response::new();
        response.body("a");
        let mut out = Vec::new();
        render_chunked_head(&mut out, &response, DATE, true);
        render_chunk(&mut out, response.body_bytes());
        render_chunk(&mut out, b"bc");
        render_last_chunk(&mut out, &[]);
        assert_eq!(String::from_utf8(out).unwrap(),
            "HTTP/1.1 200 OK\r\n\
             Date: Sun Jun 20 23:21:05 1993\r\n\
             Connection: keep-alive\r\n\
             Transfer-Encoding: chunked\r\n\r\n\
             1\r\na\r\n2\r\nbc\r\n0\r\n\r\n");
    }

    #[test]
    fn trailers() {
        let mut out = Vec::new();
        render_last_chunk(&mut out, &[
            ("X-Checksum".to_string(), "abc123".to_string()),
        ]);
        assert_eq!(String::from_utf8(out).unwrap(),
                   "0\r\nX-Checksum: abc123\r\n\r\n");
    }
}
