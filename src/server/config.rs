use std::rc::Rc;

use parser;
use server::{self, Config};

impl Config {
    /// Create a config with defaults
    pub fn new() -> Config {
        Config {
            request_buf_size: server::DEFAULT_REQUEST_BUF_SIZE,
            response_buf_size: server::DEFAULT_RESPONSE_BUF_SIZE,
            request_timeout: server::DEFAULT_REQUEST_TIMEOUT,
            keep_alive_timeout: server::DEFAULT_KEEP_ALIVE_TIMEOUT,
            max_content_length: parser::DEFAULT_MAX_CONTENT_LENGTH,
            max_token_length: parser::DEFAULT_MAX_TOKEN_LENGTH,
            max_headers: parser::DEFAULT_MAX_HEADERS,
            max_total_mem_usage: server::DEFAULT_MAX_TOTAL_MEM_USAGE,
        }
    }
    /// Initial size of the per-connection read buffer
    ///
    /// The buffer grows automatically when its capacity is reached, but in
    /// certain environments it may be optimal to change the initial value.
    pub fn request_buf_size(&mut self, value: usize) -> &mut Self {
        self.request_buf_size = value;
        self
    }
    /// Initial size of the response assembly buffer
    pub fn response_buf_size(&mut self, value: usize) -> &mut Self {
        self.response_buf_size = value;
        self
    }
    /// Seconds to wait for socket activity mid-request before closing
    pub fn request_timeout(&mut self, seconds: u32) -> &mut Self {
        self.request_timeout = seconds;
        self
    }
    /// Seconds to hold an idle keep-alive connection open
    pub fn keep_alive_timeout(&mut self, seconds: u32) -> &mut Self {
        self.keep_alive_timeout = seconds;
        self
    }
    /// Largest accepted request body, in bytes
    ///
    /// The body is read into memory in full, so a large limit means a lot
    /// of allocation; chunked uploads are the better fit for big payloads.
    pub fn max_content_length(&mut self, bytes: u64) -> &mut Self {
        self.max_content_length = bytes;
        self
    }
    /// Largest accepted non-body token: header names, values, the target
    pub fn max_token_length(&mut self, bytes: usize) -> &mut Self {
        self.max_token_length = bytes;
        self
    }
    /// Largest accepted number of headers per request
    pub fn max_headers(&mut self, count: u32) -> &mut Self {
        self.max_headers = count;
        self
    }
    /// Buffer-memory ceiling across all sessions; new requests past it
    /// receive 503 responses
    pub fn max_total_mem_usage(&mut self, bytes: u64) -> &mut Self {
        self.max_total_mem_usage = bytes;
        self
    }
    /// Create a Rc'd config clone to pass to the constructor
    ///
    /// This is just a convenience method.
    pub fn done(&mut self) -> Rc<Config> {
        Rc::new(self.clone())
    }
}

#[cfg(test)]
mod test {
    use super::Config;

    #[test]
    fn defaults() {
        let cfg = Config::new().done();
        assert_eq!(cfg.request_buf_size, 1024);
        assert_eq!(cfg.response_buf_size, 512);
        assert_eq!(cfg.request_timeout, 20);
        assert_eq!(cfg.keep_alive_timeout, 120);
        assert_eq!(cfg.max_content_length, 8 << 20);
        assert_eq!(cfg.max_token_length, 8 << 10);
        assert_eq!(cfg.max_headers, 127);
        assert_eq!(cfg.max_total_mem_usage, 4 << 30);
    }

    #[test]
    fn builder() {
        let cfg = Config::new()
            .request_timeout(1)
            .max_total_mem_usage(2048)
            .done();
        assert_eq!(cfg.request_timeout, 1);
        assert_eq!(cfg.max_total_mem_usage, 2048);
        assert_eq!(cfg.request_buf_size, 1024);
    }
}
