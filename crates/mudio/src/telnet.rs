//! Telnet IAC parsing.
//!
//! Strips IAC sequences from the byte stream and answers negotiation:
//! - `IAC DO <opt>`   => `IAC WONT <opt>`
//! - `IAC WILL <opt>` => `IAC DONT <opt>`, except NAWS which is accepted
//!
//! Subnegotiation blocks (`IAC SB ... IAC SE`) are stripped; a NAWS block is
//! decoded into a [`TelnetEvent::WindowSize`].

pub const IAC: u8 = 255;
pub const DONT: u8 = 254;
pub const DO: u8 = 253;
pub const WONT: u8 = 252;
pub const WILL: u8 = 251;
pub const SB: u8 = 250;
pub const SE: u8 = 240;

/// Negotiate About Window Size (RFC 1073).
pub const OPT_NAWS: u8 = 31;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelnetEvent {
    WindowSize { cols: u16, rows: u16 },
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Parsed {
    /// The stream with IAC sequences removed.
    pub data: Vec<u8>,
    /// Bytes to write back to the telnet peer (may be empty).
    pub replies: Vec<u8>,
    pub events: Vec<TelnetEvent>,
}

#[derive(Debug, Default)]
pub struct IacParser {
    state: State,
    naws_requested: bool,
    naws_enabled: bool,
}

#[derive(Debug, Default)]
enum State {
    #[default]
    Data,
    Iac,
    Negotiate {
        cmd: u8,
    },
    Subneg {
        opt: Option<u8>,
        iac_seen: bool,
        buf: Vec<u8>,
    },
}

impl IacParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn naws_enabled(&self) -> bool {
        self.naws_enabled
    }

    /// Bytes asking the peer to report (or re-report) its window size.
    ///
    /// Sending `DO NAWS` again after the option is on makes most clients
    /// resend their current size.
    pub fn request_window_size(&mut self) -> [u8; 3] {
        self.naws_requested = true;
        [IAC, DO, OPT_NAWS]
    }

    pub fn parse(&mut self, chunk: &[u8]) -> Parsed {
        let mut out = Parsed {
            data: Vec::with_capacity(chunk.len()),
            ..Parsed::default()
        };

        for &b in chunk {
            match &mut self.state {
                State::Data => {
                    if b == IAC {
                        self.state = State::Iac;
                    } else {
                        out.data.push(b);
                    }
                }
                State::Iac => match b {
                    // Escaped 0xff => literal 0xff.
                    IAC => {
                        out.data.push(IAC);
                        self.state = State::Data;
                    }
                    DO | DONT | WILL | WONT => {
                        self.state = State::Negotiate { cmd: b };
                    }
                    SB => {
                        self.state = State::Subneg {
                            opt: None,
                            iac_seen: false,
                            buf: Vec::new(),
                        };
                    }
                    // NOP, GA and friends.
                    _ => self.state = State::Data,
                },
                State::Negotiate { cmd } => {
                    let cmd = *cmd;
                    self.state = State::Data;
                    self.negotiate(cmd, b, &mut out.replies);
                }
                State::Subneg { opt, iac_seen, buf } => {
                    let Some(o) = *opt else {
                        *opt = Some(b);
                        continue;
                    };

                    if *iac_seen {
                        *iac_seen = false;
                        match b {
                            SE => {
                                if o == OPT_NAWS && buf.len() >= 4 {
                                    let cols = u16::from_be_bytes([buf[0], buf[1]]);
                                    let rows = u16::from_be_bytes([buf[2], buf[3]]);
                                    out.events.push(TelnetEvent::WindowSize { cols, rows });
                                }
                                self.state = State::Data;
                            }
                            IAC => buf.push(IAC),
                            // Unknown IAC within SB; ignore.
                            _ => {}
                        }
                        continue;
                    }

                    if b == IAC {
                        *iac_seen = true;
                    } else {
                        buf.push(b);
                    }
                }
            }
        }

        out
    }

    fn negotiate(&mut self, cmd: u8, opt: u8, replies: &mut Vec<u8>) {
        match (cmd, opt) {
            (WILL, OPT_NAWS) => {
                // Only answer if the peer offered first; answering our own
                // request again would loop.
                if !self.naws_requested && !self.naws_enabled {
                    replies.extend_from_slice(&[IAC, DO, OPT_NAWS]);
                }
                self.naws_enabled = true;
            }
            (WONT, OPT_NAWS) => self.naws_enabled = false,
            (DO, _) => replies.extend_from_slice(&[IAC, WONT, opt]),
            (WILL, _) => replies.extend_from_slice(&[IAC, DONT, opt]),
            _ => {}
        }
    }
}
