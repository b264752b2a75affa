//! uat-demod: capture FIS-B and ADS-B packets from a raw SDR stream.
//!
//! Reads CS16 IQ samples at 2,083,334 samples/s (2 samples per UAT bit)
//! from standard input, demodulates, and writes each sync-matched packet
//! to standard output as a 36-byte attribute header followed by the
//! frame samples as little-endian i32, ready for `uat-ec`.
//!
//! Typical use:
//!
//! `<sdr-program 2083334 CS16> | uat-demod | uat-ec`

use std::io::{self, Read, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use clap::Parser;
use tracing::debug;

use uat_core::demod::{Demodulator, SyncMatch, DEFAULT_THRESHOLD};
use uat_core::frame::{arrival_time, FrameHeader};
use uat_core::types::SAMPLE_RATE;

/// Input buffer refills per second. Sets the buffer to 1/10 s of
/// samples, which also bounds how stale the refill wall clock can be.
const READS_PER_SECOND: usize = 10;

/// Read buffer size in bytes: 1/10 s of 4-byte IQ pairs (~800 KB).
const SAMPLE_BUFFER_BYTES: usize = (SAMPLE_RATE as usize / READS_PER_SECOND) * 4;

#[derive(Parser)]
#[command(
    name = "uat-demod",
    version,
    about = "UAT 978 MHz demodulator: CS16 IQ in, packet frames out"
)]
struct Cli {
    /// Capture FIS-B uplink packets only
    #[arg(long, conflicts_with = "adsb_only")]
    fisb_only: bool,

    /// Capture ADS-B packets only
    #[arg(long)]
    adsb_only: bool,

    /// Signal gate: skip sync search below this level, in millionths
    /// (0.9 means a running level of 900000). Set 0 to disable.
    #[arg(short, long, default_value_t = DEFAULT_THRESHOLD as f64 / 1e6)]
    level: f64,

    /// Input is a replayed capture file: stamp packets with a synthetic
    /// millisecond counter so their times stay unique and sortable
    #[arg(short = 'x', long)]
    replay_time: bool,
}

// ---------------------------------------------------------------------------
// Block reader
// ---------------------------------------------------------------------------

/// Buffered IQ reader that remembers the wall clock of each refill.
///
/// One `read` per refill, like the pipe partner expects; a bare partial
/// IQ pair is carried into the next refill so pairing never drifts, and
/// a partial pair at EOF is an error rather than silent truncation.
struct BlockReader<R: Read> {
    input: R,
    buf: Vec<u8>,
    len: usize,
    pos: usize,
    refill_secs: i64,
    refill_usecs: i64,
}

impl<R: Read> BlockReader<R> {
    fn new(input: R) -> Self {
        Self::with_capacity(input, SAMPLE_BUFFER_BYTES)
    }

    fn with_capacity(input: R, capacity: usize) -> Self {
        BlockReader {
            input,
            buf: vec![0u8; capacity],
            len: 0,
            pos: 0,
            refill_secs: 0,
            refill_usecs: 0,
        }
    }

    fn refill(&mut self) -> Result<bool> {
        let carry = self.len - self.pos;
        if carry > 0 {
            self.buf.copy_within(self.len - carry..self.len, 0);
        }

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .context("system clock before epoch")?;
        self.refill_secs = now.as_secs() as i64;
        self.refill_usecs = now.subsec_micros() as i64;

        let n = self.input.read(&mut self.buf[carry..])?;
        if n == 0 {
            if carry > 0 {
                bail!("input ended inside an IQ pair ({carry} trailing bytes)");
            }
            return Ok(false);
        }
        self.len = carry + n;
        self.pos = 0;
        Ok(true)
    }

    /// Next IQ pair, or `None` on clean EOF.
    fn next_pair(&mut self) -> Result<Option<(i16, i16)>> {
        while self.pos + 4 > self.len {
            if !self.refill()? {
                return Ok(None);
            }
        }
        let mut at = &self.buf[self.pos..self.pos + 4];
        let i = at.read_i16::<LittleEndian>()?;
        let q = at.read_i16::<LittleEndian>()?;
        self.pos += 4;
        Ok(Some((i, q)))
    }

    /// Pair index (within the current buffer) of the pair most recently
    /// returned. Drives the arrival-time offset from the refill clock.
    fn pair_index(&self) -> usize {
        (self.pos.saturating_sub(4)) / 4
    }

    fn refill_time(&self) -> (i64, i64) {
        (self.refill_secs, self.refill_usecs)
    }
}

// ---------------------------------------------------------------------------
// Replay clock
// ---------------------------------------------------------------------------

/// Synthetic millisecond counter used instead of sample timing when the
/// input is a file replay. Wraps at one second, keeping per-packet
/// timestamps unique and sortable within the wrap window.
#[derive(Default)]
struct ReplayClock {
    counter: i64,
}

impl ReplayClock {
    fn next_usecs(&mut self) -> i64 {
        let usecs = self.counter * 1000;
        self.counter += 1;
        if self.counter == 1000 {
            self.counter = 0;
        }
        usecs
    }
}

// ---------------------------------------------------------------------------
// Main loop
// ---------------------------------------------------------------------------

fn emit_packet<R: Read, W: Write>(
    reader: &mut BlockReader<R>,
    demod: &mut Demodulator,
    out: &mut W,
    matched: SyncMatch,
    replay: Option<&mut ReplayClock>,
) -> Result<()> {
    let (refill_secs, refill_usecs) = reader.refill_time();
    let (secs, usecs) = match replay {
        Some(clock) => (refill_secs, clock.next_usecs()),
        None => arrival_time(refill_secs, refill_usecs, reader.pair_index()),
    };

    let header = FrameHeader {
        secs,
        usecs,
        packet_type: matched.packet_type,
        level: demod.level(),
        sync_errors: matched.sync_errors,
    };
    out.write_all(&header.encode())?;

    // The frame samples continue the demodulation stream; sync search
    // stays suspended until the whole frame has been written.
    for _ in 0..matched.packet_type.frame_samples() {
        let (i, q) = match reader.next_pair()? {
            Some(pair) => pair,
            None => bail!("input ended inside a packet frame"),
        };
        out.write_i32::<LittleEndian>(demod.demod_sample(i, q))?;
    }
    out.flush()?;
    debug!(
        packet = %header.packet_type.type_char(),
        level = header.level,
        sync_errors = header.sync_errors,
        "packet emitted"
    );
    Ok(())
}

fn run(cli: &Cli) -> Result<()> {
    if cli.level < 0.0 {
        bail!("--level must not be negative");
    }
    let threshold = (cli.level * 1e6) as u32;
    let (fisb, adsb) = if cli.fisb_only {
        (true, false)
    } else if cli.adsb_only {
        (false, true)
    } else {
        (true, true)
    };

    let mut demod = Demodulator::new(fisb, adsb, threshold);
    let mut reader = BlockReader::new(io::stdin().lock());
    let mut out = io::BufWriter::new(io::stdout().lock());
    let mut replay = cli.replay_time.then(ReplayClock::default);

    while let Some((i, q)) = reader.next_pair()? {
        let (_, matched) = demod.process(i, q);
        if let Some(matched) = matched {
            emit_packet(&mut reader, &mut demod, &mut out, matched, replay.as_mut())?;
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(io::stderr)
        .init();
    run(&Cli::parse())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
