//! Event-loop integration: readiness registration and the periodic tick.
//!
//! The server core consumes readiness through the `Reactor` trait so the
//! demultiplexing mechanism stays swappable (epoll, kqueue, a test double).
//! Events come back as tagged `Wakeup` values dispatched by match, and the
//! reactor guarantees that wakeups are delivered one at a time on the one
//! thread everything runs on.

use std::io;
use std::time::{Duration, Instant};

use mio;
use mio::net::{TcpListener, TcpStream};

/// Identifier of a session within the server's session table.
pub type SessionId = usize;

/// A single readiness notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wakeup {
    /// The listen socket has pending connections
    Acceptable,
    /// A session socket became readable or writable
    Socket(SessionId),
    /// One second of wall time elapsed
    Tick,
}

/// The readiness facility the server runs on.
///
/// Registrations are edge-triggered (or may be); the core compensates by
/// draining reads until they would block. `poll` must also emit `Tick`
/// once per elapsed second: ticks drive the shared date header and the
/// per-session inactivity countdowns.
pub trait Reactor {
    fn register_acceptable(&mut self, listener: &mut TcpListener)
        -> io::Result<()>;
    fn register_readable(&mut self, stream: &mut TcpStream, id: SessionId)
        -> io::Result<()>;
    fn rearm_writable(&mut self, stream: &mut TcpStream, id: SessionId)
        -> io::Result<()>;
    fn unregister(&mut self, stream: &mut TcpStream) -> io::Result<()>;
    /// Collect pending wakeups, blocking until at least one arrives when
    /// `block` is set. Returns the number of wakeups pushed.
    fn poll(&mut self, wakeups: &mut Vec<Wakeup>, block: bool)
        -> io::Result<usize>;
}

const LISTENER: mio::Token = mio::Token(usize::max_value());

/// The default reactor, backed by `mio::Poll`.
pub struct MioReactor {
    poll: mio::Poll,
    events: mio::Events,
    next_tick: Instant,
}

impl MioReactor {
    pub fn new() -> io::Result<MioReactor> {
        Ok(MioReactor {
            poll: mio::Poll::new()?,
            events: mio::Events::with_capacity(256),
            next_tick: Instant::now() + Duration::from_secs(1),
        })
    }

    fn arm(&mut self, stream: &mut TcpStream, id: SessionId,
        interest: mio::Interest)
        -> io::Result<()>
    {
        let registry = self.poll.registry();
        match registry.register(stream, mio::Token(id), interest) {
            Err(ref e) if e.kind() == io::ErrorKind::AlreadyExists => {
                registry.reregister(stream, mio::Token(id), interest)
            }
            other => other,
        }
    }
}

impl Reactor for MioReactor {
    fn register_acceptable(&mut self, listener: &mut TcpListener)
        -> io::Result<()>
    {
        self.poll.registry()
            .register(listener, LISTENER, mio::Interest::READABLE)
    }

    fn register_readable(&mut self, stream: &mut TcpStream, id: SessionId)
        -> io::Result<()>
    {
        self.arm(stream, id, mio::Interest::READABLE)
    }

    fn rearm_writable(&mut self, stream: &mut TcpStream, id: SessionId)
        -> io::Result<()>
    {
        self.arm(stream, id, mio::Interest::WRITABLE)
    }

    fn unregister(&mut self, stream: &mut TcpStream) -> io::Result<()> {
        self.poll.registry().deregister(stream)
    }

    fn poll(&mut self, wakeups: &mut Vec<Wakeup>, block: bool)
        -> io::Result<usize>
    {
        let timeout = if block {
            let now = Instant::now();
            if self.next_tick > now {
                self.next_tick - now
            } else {
                Duration::from_millis(0)
            }
        } else {
            Duration::from_millis(0)
        };
        match self.poll.poll(&mut self.events, Some(timeout)) {
            Ok(()) => {}
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
        let before = wakeups.len();
        for event in self.events.iter() {
            match event.token() {
                LISTENER => wakeups.push(Wakeup::Acceptable),
                mio::Token(id) => wakeups.push(Wakeup::Socket(id)),
            }
        }
        let now = Instant::now();
        while now >= self.next_tick {
            wakeups.push(Wakeup::Tick);
            self.next_tick += Duration::from_secs(1);
        }
        Ok(wakeups.len() - before)
    }
}
