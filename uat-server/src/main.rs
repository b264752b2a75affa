//! uat-server: fan decoded message lines out to TCP clients.
//!
//! Reads lines from standard input (normally piped from `uat-ec`) and
//! broadcasts each complete line to every connected client. The server
//! is write-only: anything a client sends is drained and discarded.
//!
//! Single-threaded by design. The stdin read is the only blocking
//! point; the listener and every client socket are nonblocking, so a
//! slow client loses lines rather than stalling the pipeline.

use std::io::{self, BufRead, ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

/// Maximum simultaneous client connections.
const MAX_CONNECTIONS: usize = 10;

/// Wait between bind attempts while the port is still in TIME_WAIT
/// from a previous run.
const BIND_RETRY: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(
    name = "uat-server",
    version,
    about = "Write-only TCP fan-out for decoded UAT message lines"
)]
struct Cli {
    /// TCP port to listen on
    #[arg(short, long, default_value_t = 3333)]
    port: u16,
}

// ---------------------------------------------------------------------------
// Fan-out state
// ---------------------------------------------------------------------------

struct FanOut {
    listener: TcpListener,
    clients: Vec<TcpStream>,
}

impl FanOut {
    fn new(listener: TcpListener) -> Result<Self> {
        listener.set_nonblocking(true)?;
        Ok(FanOut {
            listener,
            clients: Vec::new(),
        })
    }

    /// Accept every connection currently pending.
    fn accept_pending(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    if self.clients.len() >= MAX_CONNECTIONS {
                        warn!("refusing {peer}: connection limit reached");
                        continue;
                    }
                    if let Err(err) = stream.set_nonblocking(true) {
                        warn!("dropping {peer}: {err}");
                        continue;
                    }
                    info!("client connected: {peer}");
                    self.clients.push(stream);
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => break,
                Err(err) => {
                    warn!("accept failed: {err}");
                    break;
                }
            }
        }
    }

    /// Drain and discard anything clients sent; reap the disconnected.
    fn reap(&mut self) {
        let mut scratch = [0u8; 512];
        self.clients.retain_mut(|client| loop {
            match client.read(&mut scratch) {
                Ok(0) => {
                    info!("client disconnected");
                    break false;
                }
                Ok(_) => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => break true,
                Err(err) => {
                    info!("client dropped: {err}");
                    break false;
                }
            }
        });
    }

    /// Send one complete line to every client. A client whose socket
    /// buffer is full simply loses the rest of the line; a client whose
    /// socket errors is removed.
    fn broadcast(&mut self, line: &[u8]) {
        self.clients.retain_mut(|client| {
            let mut at = 0;
            loop {
                match client.write(&line[at..]) {
                    Ok(0) => break false,
                    Ok(n) => {
                        at += n;
                        if at == line.len() {
                            break true;
                        }
                    }
                    // Buffer full: drop the remainder rather than stall.
                    Err(err) if err.kind() == ErrorKind::WouldBlock => break true,
                    Err(err) => {
                        info!("client dropped: {err}");
                        break false;
                    }
                }
            }
        });
    }
}

// ---------------------------------------------------------------------------
// Main loop
// ---------------------------------------------------------------------------

fn bind_with_retry(port: u16) -> Result<TcpListener> {
    loop {
        match TcpListener::bind(("0.0.0.0", port)) {
            Ok(listener) => return Ok(listener),
            Err(err) if err.kind() == ErrorKind::AddrInUse => {
                warn!("port {port} busy, retrying in {}s", BIND_RETRY.as_secs());
                std::thread::sleep(BIND_RETRY);
            }
            Err(err) => return Err(err).with_context(|| format!("cannot bind port {port}")),
        }
    }
}

fn run(fanout: &mut FanOut, input: &mut impl BufRead) -> Result<()> {
    // Clients only ever see whole lines: if we attached mid-stream,
    // everything up to the first newline is discarded.
    let mut first_line = true;
    let mut line = String::new();

    loop {
        line.clear();
        let n = input.read_line(&mut line)?;
        if n == 0 || !line.ends_with('\n') {
            return Ok(()); // EOF; an unterminated tail is never sent
        }
        fanout.accept_pending();
        fanout.reap();
        if first_line {
            first_line = false;
            continue;
        }
        fanout.broadcast(line.as_bytes());
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    info!("starting server on port {}", cli.port);
    let mut fanout = FanOut::new(bind_with_retry(cli.port)?)?;
    run(&mut fanout, &mut io::stdin().lock())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::net::TcpStream;

    fn fanout_on_ephemeral_port() -> (FanOut, u16) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        (FanOut::new(listener).unwrap(), port)
    }

    fn read_available(stream: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 256];
        loop {
            match stream.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => buf.extend_from_slice(&chunk[..n]),
                Err(err) if err.kind() == ErrorKind::WouldBlock => break,
                Err(err) => panic!("read: {err}"),
            }
        }
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_accept_and_broadcast() {
        let (mut fanout, port) = fanout_on_ephemeral_port();
        let mut client = TcpStream::connect(("127.0.0.1", port)).unwrap();
        client.set_nonblocking(true).unwrap();

        fanout.accept_pending();
        assert_eq!(fanout.clients.len(), 1);

        fanout.broadcast(b"+38f1;rs=0/00;ss=1.00/-30.3;t=1.000\n");
        // Give the loopback a moment to deliver.
        std::thread::sleep(Duration::from_millis(50));
        let got = read_available(&mut client);
        assert!(got.ends_with(";t=1.000\n"));
    }

    #[test]
    fn test_disconnected_client_is_reaped() {
        let (mut fanout, port) = fanout_on_ephemeral_port();
        let client = TcpStream::connect(("127.0.0.1", port)).unwrap();
        fanout.accept_pending();
        assert_eq!(fanout.clients.len(), 1);

        drop(client);
        std::thread::sleep(Duration::from_millis(50));
        fanout.reap();
        assert!(fanout.clients.is_empty());
    }

    #[test]
    fn test_connection_limit() {
        let (mut fanout, port) = fanout_on_ephemeral_port();
        let mut held = Vec::new();
        for _ in 0..MAX_CONNECTIONS + 2 {
            held.push(TcpStream::connect(("127.0.0.1", port)).unwrap());
        }
        std::thread::sleep(Duration::from_millis(50));
        fanout.accept_pending();
        assert_eq!(fanout.clients.len(), MAX_CONNECTIONS);
    }

    #[test]
    fn test_run_skips_partial_first_line_and_stops_at_eof() {
        let (mut fanout, port) = fanout_on_ephemeral_port();
        let mut client = TcpStream::connect(("127.0.0.1", port)).unwrap();
        client.set_nonblocking(true).unwrap();

        // The first (possibly partial) line is sacrificed; the
        // unterminated tail is never sent.
        let mut input = Cursor::new(&b"partial-line\n-second\n+third\ntail-without-newline"[..]);
        run(&mut fanout, &mut input).unwrap();

        std::thread::sleep(Duration::from_millis(50));
        let got = read_available(&mut client);
        assert_eq!(got, "-second\n+third\n");
    }
}
