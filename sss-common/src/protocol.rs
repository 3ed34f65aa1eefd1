//! # Record Format
//!
//! Purpose: Define the bytes the server writes into the shared store besides
//! raw client uploads.
//!
//! Client uploads are appended verbatim. A line terminator anywhere in a
//! received chunk ends that connection's upload; the terminator is stored too.
//! The timer appends one line per tick:
//!
//! ```text
//! timestamp:Fri, 07 Oct 2022 06:59:23 +0000\n
//! ```

use chrono::{DateTime, TimeZone};

/// Byte that ends a client upload.
pub const LINE_TERMINATOR: u8 = b'\n';

/// Prefix of every record written by the timer.
pub const TIMESTAMP_PREFIX: &str = "timestamp:";

/// strftime pattern for the RFC 2822 style date in a timestamp record.
pub const TIMESTAMP_FORMAT: &str = "%a, %d %b %Y %T %z";

/// Returns true if the chunk contains the upload terminator.
pub fn contains_terminator(chunk: &[u8]) -> bool {
    chunk.contains(&LINE_TERMINATOR)
}

/// Renders a timestamp record, terminator included.
pub fn timestamp_record<Tz>(at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    format!("{}{}\n", TIMESTAMP_PREFIX, at.format(TIMESTAMP_FORMAT))
}

/// Returns true if `line` (with or without its terminator) is a well-formed
/// timestamp record.
pub fn is_timestamp_record(line: &str) -> bool {
    let line = line.strip_suffix('\n').unwrap_or(line);
    match line.strip_prefix(TIMESTAMP_PREFIX) {
        Some(date) => DateTime::parse_from_str(date, TIMESTAMP_FORMAT).is_ok(),
        None => false,
    }
}
