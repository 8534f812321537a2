//! HTTP server: lifecycle, admission control, and the embedding API.
//!
mod config;
mod request;
mod response;
mod serializer;
mod session;

pub use self::request::{Connection, Request};
pub use self::response::Response;

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::rc::Rc;

use mio::net::TcpListener;
use socket2::{Domain, Protocol, Socket, Type};
use time::{Month, OffsetDateTime, Weekday};

use buffer::MemCounter;
use error::Error;
use reactor::{MioReactor, Reactor, SessionId, Wakeup};
use self::session::Session;

pub const DEFAULT_REQUEST_BUF_SIZE: usize = 1024;
pub const DEFAULT_RESPONSE_BUF_SIZE: usize = 512;
/// Seconds a connection may sit idle mid-request
pub const DEFAULT_REQUEST_TIMEOUT: u32 = 20;
/// Seconds an idle keep-alive connection is held open
pub const DEFAULT_KEEP_ALIVE_TIMEOUT: u32 = 120;
/// Total read/write buffer space across all sessions before new requests
/// are shed with 503 responses (4 GiB)
pub const DEFAULT_MAX_TOTAL_MEM_USAGE: u64 = 4 << 30;

/// Fine-grained configuration of the HTTP server
#[derive(Debug, Clone)]
pub struct Config {
    pub(crate) request_buf_size: usize,
    pub(crate) response_buf_size: usize,
    pub(crate) request_timeout: u32,
    pub(crate) keep_alive_timeout: u32,
    pub(crate) max_content_length: u64,
    pub(crate) max_token_length: usize,
    pub(crate) max_headers: u32,
    pub(crate) max_total_mem_usage: u64,
}

pub(crate) struct ServerCore {
    pub config: Rc<Config>,
    pub port: u16,
    pub listener: RefCell<Option<TcpListener>>,
    pub reactor: RefCell<Box<dyn Reactor>>,
    pub handler: Box<dyn Fn(Request)>,
    pub memused: MemCounter,
    pub date: RefCell<String>,
    pub sessions: RefCell<HashMap<SessionId, Rc<RefCell<Session>>>>,
    pub next_id: Cell<SessionId>,
}

/// A single-threaded event-driven HTTP/1.1 server.
///
/// The server owns every live connection; all callbacks run on the thread
/// that drives `listen` or `poll`. The type is deliberately not `Send`.
pub struct Server {
    core: Rc<ServerCore>,
}

impl Server {
    /// Create a server with the default configuration.
    ///
    /// The handler is called once per request, after the headers (and for
    /// non-chunked requests, the whole body) have been read. It must
    /// eventually answer through one of the `respond*` operations of the
    /// `Request` handle, synchronously or not.
    pub fn init<F>(port: u16, handler: F) -> Result<Server, Error>
        where F: Fn(Request) + 'static
    {
        Server::with_config(port, &Config::new().done(), handler)
    }

    /// Create a server with an explicit configuration.
    pub fn with_config<F>(port: u16, config: &Rc<Config>, handler: F)
        -> Result<Server, Error>
        where F: Fn(Request) + 'static
    {
        let reactor = MioReactor::new()?;
        Ok(Server {
            core: Rc::new(ServerCore {
                config: config.clone(),
                port: port,
                listener: RefCell::new(None),
                reactor: RefCell::new(Box::new(reactor)),
                handler: Box::new(handler),
                memused: MemCounter::new(),
                date: RefCell::new(http_date()),
                sessions: RefCell::new(HashMap::new()),
                next_id: Cell::new(0),
            }),
        })
    }

    /// Bind the listen socket and run the event loop.
    ///
    /// Does not return during normal operation.
    pub fn listen(&self) -> Result<(), Error> {
        self.bind()?;
        let mut wakeups = Vec::new();
        loop {
            self.core.reactor.borrow_mut().poll(&mut wakeups, true)?;
            for wakeup in wakeups.drain(..) {
                dispatch(&self.core, wakeup);
            }
        }
    }

    /// Bind the listen socket without entering a loop.
    ///
    /// Use together with `poll` to embed the server into an application
    /// that already has an update loop.
    pub fn listen_poll(&self) -> Result<(), Error> {
        self.bind()
    }

    /// Dispatch pending events without blocking.
    ///
    /// Returns the number of events handled; call in a loop until it
    /// returns zero.
    pub fn poll(&self) -> Result<usize, Error> {
        let mut wakeups = Vec::new();
        self.core.reactor.borrow_mut().poll(&mut wakeups, false)?;
        let count = wakeups.len();
        for wakeup in wakeups {
            dispatch(&self.core, wakeup);
        }
        Ok(count)
    }

    /// Address the listen socket is bound to, once listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.core.listener.borrow().as_ref()
            .and_then(|l| l.local_addr().ok())
    }

    /// Current buffer-memory estimate across all live sessions.
    pub fn memory_used(&self) -> u64 {
        self.core.memused.get()
    }

    fn bind(&self) -> Result<(), Error> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.core.port));
        let socket = Socket::new(Domain::IPV4, Type::STREAM,
                                 Some(Protocol::TCP))
            .map_err(Error::Bind)?;
        // allow quick restarts while old connections drain in TIME_WAIT
        socket.set_reuse_address(true).map_err(Error::Bind)?;
        socket.set_nonblocking(true).map_err(Error::Bind)?;
        socket.bind(&addr.into()).map_err(Error::Bind)?;
        socket.listen(128).map_err(Error::Bind)?;
        let mut listener = TcpListener::from_std(socket.into());
        self.core.reactor.borrow_mut().register_acceptable(&mut listener)?;
        info!("listening on {}", listener.local_addr().map_err(Error::Io)?);
        *self.core.listener.borrow_mut() = Some(listener);
        Ok(())
    }
}

fn dispatch(core: &Rc<ServerCore>, wakeup: Wakeup) {
    match wakeup {
        Wakeup::Acceptable => accept_connections(core),
        Wakeup::Socket(id) => {
            let session = core.sessions.borrow().get(&id).cloned();
            if let Some(session) = session {
                session::run(core, id, &session);
            }
        }
        Wakeup::Tick => tick(core),
    }
}

fn accept_connections(core: &Rc<ServerCore>) {
    loop {
        let accepted = match *core.listener.borrow() {
            Some(ref listener) => listener.accept(),
            None => return,
        };
        match accepted {
            Ok((mut stream, peer)) => {
                let id = core.next_id.get();
                core.next_id.set(id.wrapping_add(1));
                debug!("session {}: accepted connection from {}", id, peer);
                if let Err(e) = core.reactor.borrow_mut()
                    .register_readable(&mut stream, id)
                {
                    error!("cannot register accepted socket: {}", e);
                    continue;
                }
                let session = Rc::new(RefCell::new(
                    Session::new(stream, &core.config)));
                core.sessions.borrow_mut().insert(id, session.clone());
                session::run(core, id, &session);
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => {
                error!("accept error: {}", e);
                return;
            }
        }
    }
}

// One tick drives both the date header refresh and every per-session
// inactivity countdown.
fn tick(core: &Rc<ServerCore>) {
    *core.date.borrow_mut() = http_date();
    let sessions: Vec<(SessionId, Rc<RefCell<Session>>)> = core.sessions
        .borrow().iter().map(|(&id, s)| (id, s.clone())).collect();
    for (id, session) in sessions {
        let expired = {
            let mut s = session.borrow_mut();
            s.timeout = s.timeout.saturating_sub(1);
            s.timeout == 0
        };
        if expired {
            debug!("session {}: timed out", id);
            session::destroy(core, id, &session);
        }
    }
}

// The Date header value, asctime form, 24 characters. Only the tick writes
// it; everything else reads the shared copy.
fn http_date() -> String {
    let now = OffsetDateTime::now_utc();
    let weekday = match now.weekday() {
        Weekday::Monday => "Mon",
        Weekday::Tuesday => "Tue",
        Weekday::Wednesday => "Wed",
        Weekday::Thursday => "Thu",
        Weekday::Friday => "Fri",
        Weekday::Saturday => "Sat",
        Weekday::Sunday => "Sun",
    };
    let month = match now.month() {
        Month::January => "Jan",
        Month::February => "Feb",
        Month::March => "Mar",
        Month::April => "Apr",
        Month::May => "May",
        Month::June => "Jun",
        Month::July => "Jul",
        Month::August => "Aug",
        Month::September => "Sep",
        Month::October => "Oct",
        Month::November => "Nov",
        Month::December => "Dec",
    };
    format!("{} {} {:2} {:02}:{:02}:{:02} {}",
            weekday, month, now.day(), now.hour(), now.minute(),
            now.second(), now.year())
}

#[cfg(test)]
mod test {
    use super::http_date;

    #[test]
    fn date_is_asctime_shaped() {
        let date = http_date();
        assert_eq!(date.len(), 24);
        // "Sun Jun 20 23:21:05 1993"
        assert_eq!(date.as_bytes()[3], b' ');
        assert_eq!(date.as_bytes()[13], b':');
        assert_eq!(date.as_bytes()[16], b':');
    }
}
