//! Value types produced by the request parser.

/// A parsed element of an HTTP request, addressed as a region of the
/// session's read buffer.
///
/// Tokens carry offsets rather than slices because the buffer may be
/// reallocated (or recycled, for chunked bodies) while the request is still
/// being read. Consumers must copy the bytes out or keep indices, never
/// pointers into the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    /// Offset of the first byte of the token in the read buffer
    pub start: usize,
    /// Number of bytes the token spans
    pub len: usize,
    pub kind: TokenKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Request method, emitted on the first space of the request line
    Method,
    /// Request target, everything between the two spaces
    Target,
    /// HTTP version as written, e.g. `HTTP/1.1`
    Version,
    /// A header name, without the colon
    HeaderKey,
    /// A header value, leading whitespace stripped
    HeaderValue,
    /// End of the header section. For a fixed-length body `len` is the
    /// declared content length; for a chunked body `len` is zero and the
    /// body must be read through the chunked parser.
    Body { chunked: bool },
    /// One chunk of a chunked request body. A zero-length chunk marks the
    /// end of the body.
    ChunkBody,
}

impl Token {
    /// End offset of the token (one past the last byte).
    pub fn end(&self) -> usize {
        self.start + self.len
    }
}
