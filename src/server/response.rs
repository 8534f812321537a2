//! Response builder.

use enums::normalize_status;

/// A response under construction.
///
/// Built by the application handler and consumed by one of the `respond*`
/// operations, which move the assembled bytes into the session's write
/// buffer. Body bytes are copied in, so the source may be freed right after
/// the `body` call.
#[derive(Debug)]
pub struct Response {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Response {
    pub fn new() -> Response {
        Response {
            status: 200,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Set the response status.
    ///
    /// Accepts values between 100 and 599 inclusive; anything else maps
    /// to 500.
    pub fn status(&mut self, status: u16) -> &mut Self {
        self.status = normalize_status(status);
        self
    }

    /// Add a response header.
    ///
    /// For `respond_chunk_end` the headers become trailers.
    pub fn header(&mut self, key: &str, value: &str) -> &mut Self {
        self.headers.push((key.to_string(), value.to_string()));
        self
    }

    /// Set the response body; in a chunked response, the body of one chunk.
    pub fn body<B: AsRef<[u8]>>(&mut self, body: B) -> &mut Self {
        self.body = body.as_ref().to_vec();
        self
    }

    pub(crate) fn status_code(&self) -> u16 {
        self.status
    }

    pub(crate) fn header_list(&self) -> &[(String, String)] {
        &self.headers
    }

    pub(crate) fn body_bytes(&self) -> &[u8] {
        &self.body
    }
}

#[cfg(test)]
mod test {
    use super::Response;

    #[test]
    fn status_is_normalized() {
        let mut response = Response::new();
        assert_eq!(response.status_code(), 200);
        response.status(418);
        assert_eq!(response.status_code(), 418);
        response.status(0);
        assert_eq!(response.status_code(), 500);
        response.status(999);
        assert_eq!(response.status_code(), 500);
    }

    #[test]
    fn chaining() {
        let mut response = Response::new();
        response.status(201)
            .header("Content-Type", "text/plain")
            .body("created");
        assert_eq!(response.header_list().len(), 1);
        assert_eq!(response.body_bytes(), b"created");
    }
}
