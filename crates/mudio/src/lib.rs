//! `mudio`: telnet byte-stream helpers for the minimud host.
//!
//! Sync and allocation-light on purpose; the host owns the sockets and feeds
//! raw chunks in:
//! - IAC stripping with negotiation replies, plus NAWS window-size decoding,
//! - CR/LF/CRLF/CRNUL line splitting over a growable buffer.

pub mod line;
pub mod telnet;
