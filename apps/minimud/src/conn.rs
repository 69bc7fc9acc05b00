//! Per-connection tasks and the transport the world sees.
//!
//! Each connection gets a reader task (telnet parsing, line splitting, window
//! size) and a writer task. The world talks to both through [`NetTransport`],
//! whose methods never block.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use bytes::Bytes;
use mudcore::{TermSize, Transport};
use mudio::line::LineBuffer;
use mudio::telnet::{IacParser, TelnetEvent};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

#[derive(Debug)]
enum Ctl {
    RequestSize,
    Close,
}

#[derive(Debug)]
struct Shared {
    active: AtomicBool,
    born: Instant,
    last_input_ms: AtomicU64,
    // cols << 16 | rows
    size: AtomicU32,
}

impl Shared {
    fn new() -> Self {
        let d = TermSize::default();
        Self {
            active: AtomicBool::new(true),
            born: Instant::now(),
            last_input_ms: AtomicU64::new(0),
            size: AtomicU32::new(pack(d)),
        }
    }

    fn touch(&self) {
        let ms = self.born.elapsed().as_millis() as u64;
        self.last_input_ms.store(ms, Ordering::Relaxed);
    }

    fn idle(&self) -> Duration {
        let last = Duration::from_millis(self.last_input_ms.load(Ordering::Relaxed));
        self.born.elapsed().saturating_sub(last)
    }
}

fn pack(s: TermSize) -> u32 {
    (u32::from(s.cols) << 16) | u32::from(s.rows)
}

fn unpack(v: u32) -> TermSize {
    TermSize {
        cols: (v >> 16) as u16,
        rows: (v & 0xffff) as u16,
    }
}

pub struct NetTransport {
    shared: Arc<Shared>,
    lines: mpsc::UnboundedReceiver<String>,
    out: mpsc::UnboundedSender<Bytes>,
    ctl: mpsc::UnboundedSender<Ctl>,
}

impl Transport for NetTransport {
    fn send(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let _ = self.out.send(Bytes::copy_from_slice(text.as_bytes()));
    }

    fn next_line(&mut self) -> Option<String> {
        self.lines.try_recv().ok()
    }

    fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::Relaxed)
    }

    fn deactivate(&mut self) {
        self.shared.active.store(false, Ordering::Relaxed);
        let _ = self.ctl.send(Ctl::Close);
    }

    fn idle(&self) -> Duration {
        self.shared.idle()
    }

    fn term_size(&self) -> TermSize {
        unpack(self.shared.size.load(Ordering::Relaxed))
    }

    fn request_term_size(&mut self) {
        let _ = self.ctl.send(Ctl::RequestSize);
    }
}

/// Start the reader and writer tasks for one connection.
///
/// The writer drains queued output until the transport is dropped, then shuts
/// the socket down, so text sent just before a disconnect still arrives.
pub fn spawn<S>(stream: S, peer: String) -> NetTransport
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (rd, mut wr) = tokio::io::split(stream);
    let shared = Arc::new(Shared::new());
    let (lines_tx, lines_rx) = mpsc::unbounded_channel::<String>();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Bytes>();
    let (ctl_tx, ctl_rx) = mpsc::unbounded_channel::<Ctl>();

    let writer_peer = peer.clone();
    tokio::spawn(async move {
        while let Some(b) = out_rx.recv().await {
            if wr.write_all(&b[..]).await.is_err() {
                break;
            }
        }
        let _ = wr.shutdown().await;
        debug!(peer = %writer_peer, "writer closed");
    });

    tokio::spawn(read_loop(
        rd,
        peer,
        shared.clone(),
        lines_tx,
        out_tx.clone(),
        ctl_rx,
    ));

    NetTransport {
        shared,
        lines: lines_rx,
        out: out_tx,
        ctl: ctl_tx,
    }
}

async fn read_loop<R>(
    mut rd: R,
    peer: String,
    shared: Arc<Shared>,
    lines_tx: mpsc::UnboundedSender<String>,
    write_tx: mpsc::UnboundedSender<Bytes>,
    mut ctl_rx: mpsc::UnboundedReceiver<Ctl>,
) where
    R: AsyncRead + Unpin,
{
    let mut iac = IacParser::new();
    let mut linebuf = LineBuffer::new();
    let mut buf = [0u8; 4096];

    'read: loop {
        let n = tokio::select! {
            res = rd.read(&mut buf) => match res {
                Ok(n) => n,
                Err(e) => {
                    debug!(peer = %peer, err = %e, "read failed");
                    0
                }
            },
            ctl = ctl_rx.recv() => match ctl {
                Some(Ctl::RequestSize) => {
                    let req = iac.request_window_size();
                    let _ = write_tx.send(Bytes::copy_from_slice(&req));
                    continue 'read;
                }
                Some(Ctl::Close) | None => break 'read,
            },
        };
        if n == 0 {
            break;
        }
        shared.touch();

        let parsed = iac.parse(&buf[..n]);
        if !parsed.replies.is_empty() {
            let _ = write_tx.send(Bytes::from(parsed.replies));
        }
        for ev in parsed.events {
            match ev {
                TelnetEvent::WindowSize { cols, rows } => {
                    if cols == 0 || rows == 0 {
                        continue;
                    }
                    shared
                        .size
                        .store(pack(TermSize { cols, rows }), Ordering::Relaxed);
                    debug!(peer = %peer, cols, rows, "window size");
                }
            }
        }

        linebuf.push(&parsed.data);
        while let Some(line) = linebuf.pop_line() {
            match line {
                Ok(line) => {
                    if lines_tx.send(line).is_err() {
                        break 'read;
                    }
                }
                Err(e) => {
                    warn!(peer = %peer, err = %e, "dropping input");
                    let _ = write_tx.send(Bytes::from_static(b"Line too long; ignored.\r\n"));
                }
            }
        }
    }

    shared.active.store(false, Ordering::Relaxed);
    debug!(peer = %peer, "reader closed");
}
