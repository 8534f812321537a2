//! Session read/write buffer with process-wide memory accounting.

use std::cell::Cell;
use std::io::{self, Read, Write};
use std::rc::Rc;

/// Running estimate of the buffer memory held by all live sessions.
///
/// The counter is plain `Cell` state: the whole library runs on one thread
/// by contract, so no synchronization is involved. It is compared against
/// the configured ceiling for admission control.
#[derive(Debug, Clone)]
pub struct MemCounter(Rc<Cell<u64>>);

impl MemCounter {
    pub fn new() -> MemCounter {
        MemCounter(Rc::new(Cell::new(0)))
    }
    pub fn get(&self) -> u64 {
        self.0.get()
    }
    fn add(&self, bytes: usize) {
        self.0.set(self.0.get() + bytes as u64);
    }
    fn sub(&self, bytes: usize) {
        self.0.set(self.0.get().saturating_sub(bytes as u64));
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    /// The socket would block; wait for the next readable event
    Open,
    /// The peer closed the connection
    Closed,
}

#[derive(Debug, PartialEq, Eq)]
pub enum WriteOutcome {
    /// All pending bytes were written
    Flushed,
    /// The socket would block; wait for the next writable event
    Partial,
    /// The peer is gone
    Closed,
}

/// A flat per-session byte buffer.
///
/// The same structure backs both the request being read and the response
/// being written; a session holds at most one at a time. Capacity doubles
/// when a read fills the buffer, and every capacity change is reflected in
/// the shared `MemCounter` (including on drop).
#[derive(Debug)]
pub struct Buffer {
    data: Vec<u8>,
    filled: usize,
    written: usize,
    counter: MemCounter,
}

impl Buffer {
    pub fn with_capacity(capacity: usize, counter: &MemCounter) -> Buffer {
        counter.add(capacity);
        Buffer {
            data: vec![0; capacity],
            filled: 0,
            written: 0,
            counter: counter.clone(),
        }
    }

    /// Adopt an assembled response as the session's write buffer.
    pub fn from_vec(data: Vec<u8>, counter: &MemCounter) -> Buffer {
        counter.add(data.capacity());
        let filled = data.len();
        Buffer {
            data: data,
            filled: filled,
            written: 0,
            counter: counter.clone(),
        }
    }

    /// Bytes buffered so far.
    pub fn len(&self) -> usize {
        self.filled
    }

    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.filled]
    }

    /// Fill the buffer from a non-blocking source until it would block or
    /// the peer closes. The buffer doubles whenever it runs full.
    pub fn read_from<R: Read>(&mut self, sock: &mut R) -> ReadOutcome {
        loop {
            if self.filled == self.data.len() {
                self.grow();
            }
            match sock.read(&mut self.data[self.filled..]) {
                Ok(0) => return ReadOutcome::Closed,
                Ok(n) => self.filled += n,
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return ReadOutcome::Open;
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                // transient failure; the timeout reaps the session if the
                // socket never recovers
                Err(_) => return ReadOutcome::Open,
            }
        }
    }

    /// Write the `[written..filled)` window out until it would block.
    pub fn write_to<W: Write>(&mut self, sock: &mut W) -> WriteOutcome {
        while self.written < self.filled {
            match sock.write(&self.data[self.written..self.filled]) {
                Ok(0) => return WriteOutcome::Partial,
                Ok(n) => self.written += n,
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return WriteOutcome::Partial;
                }
                Err(ref e) if e.kind() == io::ErrorKind::BrokenPipe => {
                    return WriteOutcome::Closed;
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(_) => return WriteOutcome::Partial,
            }
        }
        WriteOutcome::Flushed
    }

    /// Shift the partial token `[from..filled)` down to `to`, so the next
    /// read overwrites consumed chunk bytes instead of growing the buffer.
    pub fn recycle(&mut self, from: usize, to: usize) {
        debug_assert!(to <= from && from <= self.filled);
        let filled = self.filled;
        self.data.copy_within(from..filled, to);
        self.filled = to + (filled - from);
    }

    fn grow(&mut self) {
        self.counter.sub(self.data.capacity());
        let target = self.data.len() * 2;
        self.data.resize(target, 0);
        self.counter.add(self.data.capacity());
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        self.counter.sub(self.data.capacity());
    }
}
