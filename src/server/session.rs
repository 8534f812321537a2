//! Per-connection session state machine.
//!
//! This is the heart of the request logic: everything that happens when a
//! readiness event arrives for a connection. A session interleaves socket
//! reads, parsing, the application handler, and response writes without
//! ever blocking; it suspends only by returning to the reactor.

use std::any::Any;
use std::cell::RefCell;
use std::net::Shutdown;
use std::rc::Rc;

use mio::net::TcpStream;

use buffer::{Buffer, ReadOutcome, WriteOutcome};
use enums::Version;
use headers;
use parser::{ParseError, Parser};
use reactor::SessionId;
use token::{Token, TokenKind};
use super::request::Request;
use super::response::Response;
use super::serializer;
use super::ServerCore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SessionState {
    Init,
    ReadHeaders,
    ReadBody,
    Write,
    ReadChunk,
    Nop,
}

/// Whether the application pinned the keep-alive decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum KeepAliveMode {
    Auto,
    PinnedKeepAlive,
    PinnedClose,
}

pub(crate) struct Session {
    pub stream: TcpStream,
    pub state: SessionState,
    pub parser: Parser,
    pub tokens: Vec<Token>,
    /// The most recent body or chunk token
    pub current: Option<Token>,
    /// Read buffer while receiving, write buffer while responding
    pub buf: Option<Buffer>,
    /// Seconds of inactivity left before the session is destroyed
    pub timeout: u32,
    pub mode: KeepAliveMode,
    pub keep_alive: bool,
    pub response_ready: bool,
    pub response_paused: bool,
    pub chunked_response: bool,
    /// The socket interest was switched to writable by a blocked write
    pub armed_writable: bool,
    pub dead: bool,
    pub chunk_cb: Option<Rc<dyn Fn(Request)>>,
    pub userdata: Option<Rc<dyn Any>>,
}

impl Session {
    pub fn new(stream: TcpStream, config: &super::Config) -> Session {
        Session {
            stream: stream,
            state: SessionState::Init,
            parser: Parser::with_limits(config.max_token_length,
                                        config.max_content_length,
                                        config.max_headers),
            tokens: Vec::new(),
            current: None,
            buf: None,
            timeout: config.request_timeout,
            mode: KeepAliveMode::Auto,
            keep_alive: false,
            response_ready: false,
            response_paused: false,
            chunked_response: false,
            armed_writable: false,
            dead: false,
            chunk_cb: None,
            userdata: None,
        }
    }

    fn reset(&mut self) {
        self.parser.reset();
        self.tokens.clear();
        self.current = None;
        self.buf = None;
        self.mode = KeepAliveMode::Auto;
        self.keep_alive = false;
        self.response_ready = false;
        self.response_paused = false;
        self.chunked_response = false;
        self.chunk_cb = None;
    }

    /// Bytes of a token, clamped against the live buffer. Empty once the
    /// buffer was freed or replaced by a response.
    pub fn token_slice(&self, token: &Token) -> &[u8] {
        match self.buf {
            Some(ref buf) => {
                buf.as_slice().get(token.start..token.end()).unwrap_or(b"")
            }
            None => b"",
        }
    }

    pub fn find_token(&self, kind: TokenKind) -> Option<Token> {
        self.tokens.iter().find(|t| t.kind == kind).cloned()
    }

    pub fn body_token(&self) -> Option<Token> {
        self.tokens.iter()
            .find(|t| matches!(t.kind, TokenKind::Body { .. }))
            .cloned()
    }

    /// Case-insensitive header lookup over the token list.
    pub fn header_value(&self, name: &[u8]) -> Option<&[u8]> {
        for (i, token) in self.tokens.iter().enumerate() {
            if token.kind == TokenKind::HeaderKey
                && token.len == name.len()
                && self.token_slice(token).eq_ignore_ascii_case(name)
            {
                if let Some(value) = self.tokens.get(i + 1) {
                    if value.kind == TokenKind::HeaderValue {
                        return Some(self.token_slice(value));
                    }
                }
            }
        }
        None
    }
}

enum Next {
    Stay,
    Destroy,
    Error(u16, &'static str),
    WaitBody,
    Chunked,
    Handle,
    Chunk,
    NextResponseChunk,
}

/// Drive the state machine once for a readiness event.
pub(crate) fn run(core: &Rc<ServerCore>, id: SessionId,
    session: &Rc<RefCell<Session>>)
{
    loop {
        let state = {
            let s = session.borrow();
            if s.dead {
                return;
            }
            s.state
        };
        match state {
            SessionState::Init => {
                {
                    let mut s = session.borrow_mut();
                    s.reset();
                    s.state = SessionState::ReadHeaders;
                }
                if core.memused.get() > core.config.max_total_mem_usage {
                    error_response(core, id, session,
                                   503, "Service Unavailable");
                    return;
                }
            }
            SessionState::ReadHeaders => {
                return read_headers(core, id, session);
            }
            SessionState::ReadBody => {
                return read_body(core, id, session);
            }
            SessionState::ReadChunk => {
                return read_chunk(core, id, session);
            }
            SessionState::Write => {
                return write_response(core, id, session);
            }
            SessionState::Nop => return,
        }
    }
}

fn read_headers(core: &Rc<ServerCore>, id: SessionId,
    session: &Rc<RefCell<Session>>)
{
    let next = {
        let mut s = session.borrow_mut();
        if read_socket(core, &mut s) == ReadOutcome::Closed {
            Next::Destroy
        } else {
            s.timeout = core.config.request_timeout;
            match parse_tokens(&mut s) {
                Err(err) => parse_error(err),
                Ok(()) => {
                    if reading_body(&s) {
                        Next::WaitBody
                    } else {
                        match s.current.map(|t| t.kind) {
                            Some(TokenKind::Body { chunked: true }) => {
                                Next::Chunked
                            }
                            Some(TokenKind::Body { chunked: false }) => {
                                Next::Handle
                            }
                            _ => Next::Stay,
                        }
                    }
                }
            }
        }
    };
    step(core, id, session, next);
}

fn read_body(core: &Rc<ServerCore>, id: SessionId,
    session: &Rc<RefCell<Session>>)
{
    let next = {
        let mut s = session.borrow_mut();
        if read_socket(core, &mut s) == ReadOutcome::Closed {
            Next::Destroy
        } else {
            s.timeout = core.config.request_timeout;
            if reading_body(&s) {
                Next::Stay
            } else {
                Next::Handle
            }
        }
    };
    step(core, id, session, next);
}

fn read_chunk(core: &Rc<ServerCore>, id: SessionId,
    session: &Rc<RefCell<Session>>)
{
    let next = {
        let mut s = session.borrow_mut();
        if read_socket(core, &mut s) == ReadOutcome::Closed {
            Next::Destroy
        } else {
            s.timeout = core.config.request_timeout;
            match parse_chunk_once(&mut s) {
                Err(_) => Next::Destroy,
                Ok(Some(token)) => {
                    s.current = Some(token);
                    s.state = SessionState::Nop;
                    Next::Chunk
                }
                Ok(None) => Next::Stay,
            }
        }
    };
    step(core, id, session, next);
}

fn step(core: &Rc<ServerCore>, id: SessionId,
    session: &Rc<RefCell<Session>>, next: Next)
{
    match next {
        Next::Stay => {}
        Next::Destroy => destroy(core, id, session),
        Next::Error(status, reason) => {
            error_response(core, id, session, status, reason);
        }
        Next::WaitBody => {
            session.borrow_mut().state = SessionState::ReadBody;
        }
        Next::Chunked => {
            {
                let mut s = session.borrow_mut();
                s.state = SessionState::Nop;
                s.parser.start_chunk_mode();
            }
            exec_handler(core, id, session);
        }
        Next::Handle => {
            // park the session: further socket events must not re-invoke
            // the handler while the response is pending
            session.borrow_mut().state = SessionState::Nop;
            exec_handler(core, id, session);
        }
        Next::Chunk => invoke_chunk_cb(core, id, session),
        Next::NextResponseChunk => exec_chunk_handler(core, id, session),
    }
}

fn parse_error(err: ParseError) -> Next {
    match err {
        ParseError::BadRequest => Next::Error(400, "Bad Request"),
        ParseError::PayloadTooLarge => Next::Error(413, "Payload Too Large"),
    }
}

fn read_socket(core: &Rc<ServerCore>, s: &mut Session) -> ReadOutcome {
    if s.buf.is_none() {
        s.buf = Some(Buffer::with_capacity(core.config.request_buf_size,
                                           &core.memused));
        s.tokens.reserve(32);
    }
    let Session { ref mut buf, ref mut stream, .. } = *s;
    match *buf {
        Some(ref mut buf) => buf.read_from(stream),
        None => ReadOutcome::Open,
    }
}

fn parse_tokens(s: &mut Session) -> Result<(), ParseError> {
    let Session {
        ref mut parser, ref mut tokens, ref mut current, ref buf, ..
    } = *s;
    let buf = match *buf {
        Some(ref buf) => buf,
        None => return Ok(()),
    };
    loop {
        match parser.parse(buf.as_slice())? {
            Some(token) => {
                *current = Some(token);
                tokens.push(token);
                if let TokenKind::Body { chunked: true } = token.kind {
                    return Ok(());
                }
            }
            None => return Ok(()),
        }
    }
}

fn parse_chunk_once(s: &mut Session)
    -> Result<Option<Token>, ParseError>
{
    let Session { ref mut parser, ref mut buf, .. } = *s;
    match *buf {
        Some(ref mut buf) => parser.parse_chunk(buf),
        None => Ok(None),
    }
}

// The body is incomplete: a fixed-length body was declared and fewer bytes
// than declared are buffered so far.
fn reading_body(s: &Session) -> bool {
    match s.current {
        Some(Token { start, len, kind: TokenKind::Body { chunked: false } })
            if len > 0 =>
        {
            let filled = s.buf.as_ref().map(|b| b.len()).unwrap_or(0);
            filled < start + len
        }
        _ => false,
    }
}

/// Invoke the application request handler and route around whether it
/// responded synchronously.
fn exec_handler(core: &Rc<ServerCore>, id: SessionId,
    session: &Rc<RefCell<Session>>)
{
    (core.handler)(Request::new(core.clone(), id, session.clone()));
    after_handler(core, id, session);
}

/// Invoke the chunked-response continuation the same way.
fn exec_chunk_handler(core: &Rc<ServerCore>, id: SessionId,
    session: &Rc<RefCell<Session>>)
{
    let cb = session.borrow().chunk_cb.clone();
    if let Some(cb) = cb {
        cb(Request::new(core.clone(), id, session.clone()));
        after_handler(core, id, session);
    }
}

/// Invoke the chunk-ready callback. No ready-check here: the response
/// pause flag set when the request handler returned still routes a later
/// `respond` back into the machine.
pub(crate) fn invoke_chunk_cb(core: &Rc<ServerCore>, id: SessionId,
    session: &Rc<RefCell<Session>>)
{
    let cb = session.borrow().chunk_cb.clone();
    if let Some(cb) = cb {
        cb(Request::new(core.clone(), id, session.clone()));
    }
}

fn after_handler(core: &Rc<ServerCore>, id: SessionId,
    session: &Rc<RefCell<Session>>)
{
    let ready = {
        let s = session.borrow();
        if s.dead {
            return;
        }
        s.response_ready
    };
    if ready {
        write_response(core, id, session);
    } else {
        session.borrow_mut().response_paused = true;
    }
}

pub(crate) fn write_response(core: &Rc<ServerCore>, id: SessionId,
    session: &Rc<RefCell<Session>>)
{
    let next = {
        let mut s = session.borrow_mut();
        if s.dead {
            return;
        }
        let outcome = {
            let Session { ref mut buf, ref mut stream, .. } = *s;
            match *buf {
                Some(ref mut buf) => buf.write_to(stream),
                None => WriteOutcome::Flushed,
            }
        };
        match outcome {
            WriteOutcome::Closed => Next::Destroy,
            WriteOutcome::Partial => {
                s.state = SessionState::Write;
                s.timeout = core.config.request_timeout;
                arm_writable(core, id, &mut s);
                Next::Stay
            }
            WriteOutcome::Flushed => {
                if s.chunked_response {
                    // the chunk went out; ask the application for the next
                    s.state = SessionState::Write;
                    s.timeout = core.config.request_timeout;
                    s.buf = None;
                    s.response_ready = false;
                    Next::NextResponseChunk
                } else if s.keep_alive {
                    s.state = SessionState::Init;
                    s.buf = None;
                    s.timeout = core.config.keep_alive_timeout;
                    rearm_readable(core, id, &mut s);
                    Next::Stay
                } else {
                    Next::Destroy
                }
            }
        }
    };
    step(core, id, session, next);
}

fn arm_writable(core: &Rc<ServerCore>, id: SessionId, s: &mut Session) {
    let result = {
        let Session { ref mut stream, .. } = *s;
        core.reactor.borrow_mut().rearm_writable(stream, id)
    };
    s.armed_writable = true;
    if let Err(e) = result {
        debug!("session {}: cannot arm writable: {}", id, e);
    }
}

// Restore read interest after the socket had been switched to writable.
pub(crate) fn rearm_readable(core: &Rc<ServerCore>, id: SessionId,
    s: &mut Session)
{
    if !s.armed_writable {
        return;
    }
    let result = {
        let Session { ref mut stream, .. } = *s;
        core.reactor.borrow_mut().register_readable(stream, id)
    };
    s.armed_writable = false;
    if let Err(e) = result {
        debug!("session {}: cannot restore read interest: {}", id, e);
    }
}

fn error_response(core: &Rc<ServerCore>, id: SessionId,
    session: &Rc<RefCell<Session>>, status: u16, message: &'static str)
{
    let mut response = Response::new();
    response.status(status);
    response.header("Content-Type", "text/plain");
    response.body(message);
    respond(core, id, session, response);
    write_response(core, id, session);
}

/// Buffer a complete response and hand it to the write side.
pub(crate) fn respond(core: &Rc<ServerCore>, id: SessionId,
    session: &Rc<RefCell<Session>>, response: Response)
{
    let payload = {
        let mut s = session.borrow_mut();
        if s.dead {
            warn!("session {}: respond() on a closed connection", id);
            return;
        }
        if s.response_ready {
            panic!("respond() called twice for one request");
        }
        if s.chunked_response {
            panic!("respond() called during a chunked response");
        }
        let keep_alive = decide_keep_alive(&mut s);
        let mut out = Vec::with_capacity(core.config.response_buf_size);
        serializer::render_response(&mut out, &response,
                                    &core.date.borrow(), keep_alive);
        out
    };
    install(core, id, session, payload);
}

/// Buffer one response chunk; the first call also buffers the header
/// section with `Transfer-Encoding: chunked`.
pub(crate) fn respond_chunk(core: &Rc<ServerCore>, id: SessionId,
    session: &Rc<RefCell<Session>>, response: Response,
    callback: Rc<dyn Fn(Request)>)
{
    let payload = {
        let mut s = session.borrow_mut();
        if s.dead {
            warn!("session {}: respond_chunk() on a closed connection", id);
            return;
        }
        let mut out = Vec::with_capacity(core.config.response_buf_size);
        if !s.chunked_response {
            s.chunked_response = true;
            let keep_alive = decide_keep_alive(&mut s);
            serializer::render_chunked_head(&mut out, &response,
                                            &core.date.borrow(), keep_alive);
        }
        s.chunk_cb = Some(callback);
        serializer::render_chunk(&mut out, response.body_bytes());
        out
    };
    install(core, id, session, payload);
}

/// Buffer the terminating chunk; the response's headers become trailers.
pub(crate) fn respond_chunk_end(core: &Rc<ServerCore>, id: SessionId,
    session: &Rc<RefCell<Session>>, response: Response)
{
    let payload = {
        let mut s = session.borrow_mut();
        if s.dead {
            return;
        }
        if !s.chunked_response {
            panic!("respond_chunk_end() without a chunked response");
        }
        s.chunked_response = false;
        let mut out = Vec::with_capacity(core.config.response_buf_size);
        serializer::render_last_chunk(&mut out, response.header_list());
        out
    };
    install(core, id, session, payload);
}

/// Application request for the next chunk of a chunked body.
pub(crate) fn begin_read_chunk(core: &Rc<ServerCore>, id: SessionId,
    session: &Rc<RefCell<Session>>, callback: Rc<dyn Fn(Request)>)
{
    {
        let mut s = session.borrow_mut();
        if s.dead {
            return;
        }
        s.chunk_cb = Some(callback);
    }
    // maybe the next chunk is already buffered
    match try_take_chunk(session) {
        Err(()) => return destroy(core, id, session),
        Ok(true) => return invoke_chunk_cb(core, id, session),
        Ok(false) => {}
    }
    // no; maybe it is sitting in the kernel buffer
    let closed = {
        let mut s = session.borrow_mut();
        read_socket(core, &mut s) == ReadOutcome::Closed
    };
    if closed {
        return destroy(core, id, session);
    }
    match try_take_chunk(session) {
        Err(()) => destroy(core, id, session),
        Ok(true) => invoke_chunk_cb(core, id, session),
        Ok(false) => {
            // wait for socket input
            let mut s = session.borrow_mut();
            s.state = SessionState::ReadChunk;
            s.timeout = core.config.request_timeout;
            rearm_readable(core, id, &mut s);
        }
    }
}

fn try_take_chunk(session: &Rc<RefCell<Session>>) -> Result<bool, ()> {
    let mut s = session.borrow_mut();
    match parse_chunk_once(&mut s) {
        Err(_) => Err(()),
        Ok(Some(token)) => {
            s.current = Some(token);
            s.state = SessionState::Nop;
            Ok(true)
        }
        Ok(None) => Ok(false),
    }
}

// Keep-alive resolution happens once, when the header section of the
// response is buffered.
fn decide_keep_alive(s: &mut Session) -> bool {
    let keep = match s.mode {
        KeepAliveMode::PinnedKeepAlive => true,
        KeepAliveMode::PinnedClose => false,
        KeepAliveMode::Auto => {
            let version = s.find_token(TokenKind::Version)
                .and_then(|t| Version::parse(s.token_slice(&t)));
            headers::should_keep_alive(version, s.header_value(b"connection"))
        }
    };
    s.keep_alive = keep;
    keep
}

// Move the assembled bytes into the session's write buffer and re-enter
// the machine if a deferred respond was awaited.
fn install(core: &Rc<ServerCore>, id: SessionId,
    session: &Rc<RefCell<Session>>, payload: Vec<u8>)
{
    let paused = {
        let mut s = session.borrow_mut();
        s.buf = Some(Buffer::from_vec(payload, &core.memused));
        s.state = SessionState::Write;
        s.response_ready = true;
        let paused = s.response_paused;
        s.response_paused = false;
        paused
    };
    if paused {
        write_response(core, id, session);
    }
}

pub(crate) fn destroy(core: &Rc<ServerCore>, id: SessionId,
    session: &Rc<RefCell<Session>>)
{
    {
        let mut s = session.borrow_mut();
        if s.dead {
            return;
        }
        s.dead = true;
        {
            let Session { ref mut stream, .. } = *s;
            if let Err(e) = core.reactor.borrow_mut().unregister(stream) {
                debug!("session {}: deregister failed: {}", id, e);
            }
        }
        let _ = s.stream.shutdown(Shutdown::Both);
        s.buf = None;
        s.chunk_cb = None;
        s.userdata = None;
    }
    core.sessions.borrow_mut().remove(&id);
    debug!("session {}: closed", id);
}
