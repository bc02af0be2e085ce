//! Command encoding and stat-line parsing for the cache server's ASCII
//! admin protocol.
//!
//! Requests are single `\r\n`-terminated lines. Stats responses are a
//! sequence of `STAT <name> <value>` lines terminated by a sentinel
//! `END` line; command responses are a single line.

use std::io::Write;

/// Sentinel line terminating a multi-line stats response.
pub const END: &str = "END";

/// A request builder for encoding admin commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    /// Global statistics: `stats\r\n`
    Stats,
    /// Per-class slab statistics: `stats slabs\r\n`
    StatsSlabs,
    /// Per-class item statistics: `stats items\r\n`
    StatsItems,
    /// Page reassignment: `slabs reassign <src> <dst>\r\n`
    Reassign { src: u16, dst: u16 },
    /// Desired free chunks for a class: `slabs freechunks <class> <chunks>\r\n`
    FreeTarget { class: u16, chunks: u64 },
}

impl Request {
    /// Encode this request onto the end of a buffer.
    pub fn encode(&self, buf: &mut Vec<u8>) {
        match self {
            Request::Stats => buf.extend_from_slice(b"stats\r\n"),
            Request::StatsSlabs => buf.extend_from_slice(b"stats slabs\r\n"),
            Request::StatsItems => buf.extend_from_slice(b"stats items\r\n"),
            Request::Reassign { src, dst } => {
                // Vec<u8> writes are infallible
                let _ = write!(buf, "slabs reassign {src} {dst}\r\n");
            }
            Request::FreeTarget { class, chunks } => {
                let _ = write!(buf, "slabs freechunks {class} {chunks}\r\n");
            }
        }
    }
}

/// A single parsed `STAT` line.
///
/// `class` is `None` for global stats. Class-scoped stats arrive either
/// as `<class>:<key>` (slab stats) or `items:<class>:<key>` (item
/// stats); both parse to the same shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatLine<'a> {
    pub class: Option<u16>,
    pub key: &'a str,
    pub value: &'a str,
}

/// Parse one line of a stats response.
///
/// Returns `None` for anything that is not a well-formed `STAT` line;
/// callers skip such lines rather than treating them as errors.
pub fn parse_stat_line(line: &str) -> Option<StatLine<'_>> {
    let rest = line.strip_prefix("STAT ")?;
    let (name, value) = rest.split_once(' ')?;
    if name.is_empty() || value.is_empty() {
        return None;
    }

    let name = name.strip_prefix("items:").unwrap_or(name);
    match name.split_once(':') {
        Some((class, key)) => {
            let class = class.parse::<u16>().ok()?;
            if key.is_empty() {
                return None;
            }
            Some(StatLine {
                class: Some(class),
                key,
                value,
            })
        }
        None => Some(StatLine {
            class: None,
            key: name,
            value,
        }),
    }
}
