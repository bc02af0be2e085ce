//! Blocking admin-protocol connection to the managed cache server.
//!
//! One connection per controller lifetime segment: any failure here
//! bubbles up to the control loop, which drops the connection, resets
//! its state, and reconnects. Only connection establishment carries a
//! timeout; an established connection reads until the server answers.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::trace;

use crate::protocol::{self, Request, StatLine};
use crate::stats::Snapshot;

/// Errors surfaced by the admin connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot resolve address: {0}")]
    Resolve(String),

    #[error("connection closed by server")]
    Closed,
}

/// A buffered connection to the server's admin port.
pub struct Connection {
    reader: BufReader<TcpStream>,
    line: String,
}

impl Connection {
    /// Establish a connection, failing fast on the connect timeout.
    pub fn connect(target: &str, timeout: Duration) -> Result<Self, ConnectionError> {
        let addr = target
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| ConnectionError::Resolve(target.to_string()))?;
        let stream = TcpStream::connect_timeout(&addr, timeout)?;
        stream.set_nodelay(true)?;
        Ok(Self {
            reader: BufReader::new(stream),
            line: String::new(),
        })
    }

    fn send(&mut self, request: Request) -> Result<(), ConnectionError> {
        let mut buf = Vec::with_capacity(32);
        request.encode(&mut buf);
        self.reader.get_mut().write_all(&buf)?;
        Ok(())
    }

    fn read_line(&mut self) -> Result<&str, ConnectionError> {
        self.line.clear();
        if self.reader.read_line(&mut self.line)? == 0 {
            return Err(ConnectionError::Closed);
        }
        Ok(self.line.trim_end())
    }

    /// Issue a stats request and fold every well-formed `STAT` line
    /// into `apply`. Anything else before the sentinel is skipped.
    fn read_stats<F>(&mut self, request: Request, mut apply: F) -> Result<(), ConnectionError>
    where
        F: FnMut(StatLine),
    {
        self.send(request)?;
        loop {
            self.line.clear();
            if self.reader.read_line(&mut self.line)? == 0 {
                return Err(ConnectionError::Closed);
            }
            let line = self.line.trim_end();
            if line == protocol::END {
                return Ok(());
            }
            if let Some(stat) = protocol::parse_stat_line(line) {
                apply(stat);
            }
        }
    }

    /// Fetch a complete snapshot: global stats plus per-class slab and
    /// item stats merged by class id.
    pub fn fetch_snapshot(&mut self) -> Result<Snapshot, ConnectionError> {
        let mut snapshot = Snapshot::default();

        self.read_stats(Request::Stats, |stat| {
            if stat.class.is_none() {
                snapshot.global.record(stat.key, stat.value);
            }
        })?;
        self.read_stats(Request::StatsSlabs, |stat| {
            if let Some(sid) = stat.class {
                snapshot
                    .classes
                    .entry(sid)
                    .or_default()
                    .record(stat.key, stat.value);
            }
        })?;
        self.read_stats(Request::StatsItems, |stat| {
            if let Some(sid) = stat.class {
                snapshot
                    .classes
                    .entry(sid)
                    .or_default()
                    .record(stat.key, stat.value);
            }
        })?;

        Ok(snapshot)
    }

    /// Move one page from `src` to `dst` (0 = global pool). The
    /// single-line ack is logged and otherwise discarded.
    pub fn reassign(&mut self, src: u16, dst: u16) -> Result<(), ConnectionError> {
        self.send(Request::Reassign { src, dst })?;
        let ack = self.read_line()?;
        trace!(src, dst, ack, "slabs reassign");
        Ok(())
    }

    /// Tell the server how many free chunks a class should hold.
    /// Fire-and-forget: the ack is read and discarded.
    pub fn set_free_target(&mut self, class: u16, chunks: u64) -> Result<(), ConnectionError> {
        self.send(Request::FreeTarget { class, chunks })?;
        let ack = self.read_line()?;
        trace!(class, chunks, ack, "free-chunk target");
        Ok(())
    }
}
