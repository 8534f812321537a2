//! A single-threaded event-driven HTTP/1.1 server library
//!
//! An application registers a request handler and a port; the library
//! accepts connections, parses requests incrementally, and drives response
//! writes back through the handler's `Request` handle. Everything runs on
//! one thread on top of kernel readiness notification; no socket operation
//! ever blocks and there are no worker pools.
extern crate mio;
extern crate socket2;
extern crate time;
#[macro_use(quick_error)] extern crate quick_error;
#[macro_use] extern crate matches;
#[macro_use] extern crate log;

mod buffer;
mod chunked;
mod enums;
mod error;
mod headers;
mod parser;
mod token;
pub mod reactor;
pub mod server;

pub use buffer::{Buffer, MemCounter};
pub use enums::Version;
pub use error::Error;
pub use parser::{ParseError, Parser};
pub use server::{Config, Connection, Request, Response, Server};
pub use token::{Token, TokenKind};
