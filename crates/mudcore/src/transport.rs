use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TermSize {
    pub cols: u16,
    pub rows: u16,
}

impl Default for TermSize {
    fn default() -> Self {
        Self { cols: 80, rows: 24 }
    }
}

/// Per-connection channel supplied by the host.
///
/// Every method must return immediately. `send` is fire-and-forget; if the
/// peer is gone the host drops the text and reports `is_active() == false`.
pub trait Transport {
    fn send(&mut self, text: &str);

    /// Next complete input line, without its terminator.
    fn next_line(&mut self) -> Option<String>;

    fn is_active(&self) -> bool;

    /// Mark the connection for closing. The host notices on its side and
    /// eventually calls `World::disconnect`.
    fn deactivate(&mut self);

    /// Time since the peer last sent anything.
    fn idle(&self) -> Duration;

    fn term_size(&self) -> TermSize;

    fn request_term_size(&mut self);
}
