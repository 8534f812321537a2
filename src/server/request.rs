//! Application-facing request handle.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use reactor::SessionId;
use token::TokenKind;
use super::response::Response;
use super::session::{self, KeepAliveMode, Session};
use super::ServerCore;

/// Directive for `Request::connection`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connection {
    KeepAlive,
    Close,
}

/// Handle to an in-flight request.
///
/// Passed to the request handler and to chunk callbacks. Clones are cheap
/// and all refer to the same connection, so a handler may stash one away
/// and respond later from the event loop. All accessors return owned
/// copies: the underlying buffer moves around (growth, chunk recycling,
/// response installation), so borrowed views are never handed out.
#[derive(Clone)]
pub struct Request {
    core: Rc<ServerCore>,
    id: SessionId,
    session: Rc<RefCell<Session>>,
}

impl Request {
    pub(crate) fn new(core: Rc<ServerCore>, id: SessionId,
        session: Rc<RefCell<Session>>)
        -> Request
    {
        Request {
            core: core,
            id: id,
            session: session,
        }
    }

    fn token_bytes(&self, kind: TokenKind) -> Vec<u8> {
        let s = self.session.borrow();
        match s.find_token(kind) {
            Some(token) => s.token_slice(&token).to_vec(),
            None => Vec::new(),
        }
    }

    /// The request method, as read from the request line.
    pub fn method(&self) -> Vec<u8> {
        self.token_bytes(TokenKind::Method)
    }

    /// The full request target, as read from the request line.
    pub fn target(&self) -> Vec<u8> {
        self.token_bytes(TokenKind::Target)
    }

    /// The request body; empty when none was sent. Chunked bodies are not
    /// available here, read them with `read_chunk`.
    pub fn body(&self) -> Vec<u8> {
        let s = self.session.borrow();
        match s.body_token() {
            Some(token) => s.token_slice(&token).to_vec(),
            None => Vec::new(),
        }
    }

    /// Header value for the given key; the lookup is case insensitive.
    pub fn header(&self, name: &str) -> Option<Vec<u8>> {
        let s = self.session.borrow();
        s.header_value(name.as_bytes()).map(|v| v.to_vec())
    }

    /// All headers of the request, in wire order.
    pub fn headers(&self) -> Vec<(Vec<u8>, Vec<u8>)> {
        let s = self.session.borrow();
        let mut out = Vec::new();
        let mut iter = s.tokens.iter().peekable();
        while let Some(token) = iter.next() {
            if token.kind == TokenKind::HeaderKey {
                if let Some(&&value) = iter.peek() {
                    if value.kind == TokenKind::HeaderValue {
                        out.push((s.token_slice(token).to_vec(),
                                  s.token_slice(&value).to_vec()));
                    }
                }
            }
        }
        out
    }

    /// Retrieve the opaque application data attached to this connection.
    pub fn userdata(&self) -> Option<Rc<dyn Any>> {
        self.session.borrow().userdata.clone()
    }

    /// Attach opaque application data to this connection. Not touched by
    /// the library in any way; survives keep-alive request boundaries.
    pub fn set_userdata(&self, data: Rc<dyn Any>) {
        self.session.borrow_mut().userdata = Some(data);
    }

    /// Pin the connection-reuse decision instead of letting the server
    /// inspect the `Connection` header and HTTP version.
    pub fn connection(&self, directive: Connection) {
        let mut s = self.session.borrow_mut();
        s.mode = match directive {
            Connection::KeepAlive => KeepAliveMode::PinnedKeepAlive,
            Connection::Close => KeepAliveMode::PinnedClose,
        };
    }

    /// Release the request buffer before responding.
    ///
    /// Useful for long-running requests that no longer need the request
    /// data; every accessor returns empty afterwards.
    pub fn free_buffer(&self) {
        let mut s = self.session.borrow_mut();
        s.buf = None;
        s.tokens.clear();
    }

    /// The current chunk of the request body. Valid until the next
    /// `read_chunk` call; a zero-length chunk means the body is complete.
    pub fn chunk(&self) -> Vec<u8> {
        let s = self.session.borrow();
        match s.current {
            Some(ref token) if token.kind == TokenKind::ChunkBody => {
                s.token_slice(token).to_vec()
            }
            _ => Vec::new(),
        }
    }

    /// Ask for the next chunk of a chunked request body.
    ///
    /// The callback runs as soon as a whole chunk is available, possibly
    /// before this call returns. Call again from the callback until a
    /// zero-length chunk arrives, then respond.
    pub fn read_chunk<F>(&self, callback: F)
        where F: Fn(Request) + 'static
    {
        session::begin_read_chunk(&self.core, self.id, &self.session,
                                  Rc::new(callback));
    }

    /// Send a complete response and consume the builder.
    ///
    /// May be called from inside the handler or later from the event loop.
    ///
    /// # Panics
    ///
    /// When a response was already sent for this request.
    pub fn respond(&self, response: Response) {
        session::respond(&self.core, self.id, &self.session, response);
    }

    /// Send one chunk of a chunked response.
    ///
    /// The first call sends the status line and headers along with the
    /// chunk; later calls ignore everything but the body. The callback
    /// fires when the chunk has been flushed and the next one may be sent.
    pub fn respond_chunk<F>(&self, response: Response, callback: F)
        where F: Fn(Request) + 'static
    {
        session::respond_chunk(&self.core, self.id, &self.session, response,
                               Rc::new(callback));
    }

    /// Terminate a chunked response. Headers set on the builder are sent
    /// as trailers.
    pub fn respond_chunk_end(&self, response: Response) {
        session::respond_chunk_end(&self.core, self.id, &self.session,
                                   response);
    }
}
