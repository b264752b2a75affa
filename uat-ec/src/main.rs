//! uat-ec: error-correct FIS-B and ADS-B packet frames.
//!
//! Reads the frames `uat-demod` writes — a 36-byte attribute header
//! followed by the frame samples as little-endian i32 — and emits one
//! hex line per packet that survives Reed-Solomon correction. Failed
//! packets are silent unless `--fail-fisb` / `--fail-adsb` is given, in
//! which case they appear as `#FAILED-…` comment lines and can also be
//! captured to disk for later `--replay`.

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use byteorder::{ByteOrder, LittleEndian};
use clap::Parser;
use tracing::info;

use uat_core::fec::{AdsbOutcome, Corrector, CorrectorOptions, FisbOutcome};
use uat_core::frame::{FrameHeader, ATTRIBUTE_LEN};
use uat_core::report;
use uat_core::schedule::parse_schedule;
use uat_core::types::{hex_decode, PacketType, UatError};
use uat_core::uplink::PREFIX_BYTES;

#[derive(Parser)]
#[command(
    name = "uat-ec",
    version,
    about = "Error-correct demodulated UAT packet frames into hex payload lines"
)]
struct Cli {
    /// Report failed FIS-B packets as comment lines
    #[arg(long)]
    fail_fisb: bool,

    /// Report failed ADS-B packets as comment lines
    #[arg(long)]
    fail_adsb: bool,

    /// Report each new lowest decoded signal level per packet type
    #[arg(long)]
    lowest_levels: bool,

    /// Save failed frames here for later --replay (needs --fail-fisb
    /// and/or --fail-adsb to select the types)
    #[arg(long, value_name = "DIR")]
    save_failed: Option<PathBuf>,

    /// Save every incoming frame here as <epoch>.<ms>.<type>.i32
    #[arg(long, value_name = "DIR")]
    save_raw: Option<PathBuf>,

    /// Reprocess saved .i32 frames from this directory instead of stdin
    #[arg(long, value_name = "DIR")]
    replay: Option<PathBuf>,

    /// Shift schedule override: comma-separated signed percents
    /// (positive = toward the earlier sample, negative = later)
    #[arg(long, value_name = "LIST")]
    schedule: Option<String>,

    /// Disable the trailing-zero tail repair
    #[arg(long)]
    no_zero_tail: bool,

    /// Disable the block-0 fixed-bit repair
    #[arg(long)]
    no_fixed_bits: bool,

    /// Known ground-station identity: first six uplink header bytes as
    /// 12 hex digits. Repeatable; overlaid in order on undecodable
    /// block 0
    #[arg(long, value_name = "HEX12")]
    station_prefix: Vec<String>,

    /// Treat packets that only decoded through a station prefix overlay
    /// as failures instead of trusting the overlay
    #[arg(long)]
    reject_overlay_decodes: bool,

    /// Legacy output format: rs=<sync>/<errs>/<attempts> and a bare
    /// ss=<level>
    #[arg(long)]
    compat978: bool,
}

// ---------------------------------------------------------------------------
// Frame input
// ---------------------------------------------------------------------------

/// Read one attribute header. `None` means clean EOF at a frame
/// boundary; EOF inside the header is an error.
fn read_header(input: &mut impl Read) -> Result<Option<[u8; ATTRIBUTE_LEN]>> {
    let mut buf = [0u8; ATTRIBUTE_LEN];
    let mut filled = 0;
    while filled < ATTRIBUTE_LEN {
        let n = input.read(&mut buf[filled..])?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            bail!(UatError::TruncatedFrame {
                expected: ATTRIBUTE_LEN,
                actual: filled,
            });
        }
        filled += n;
    }
    Ok(Some(buf))
}

/// Read the frame payload the header promised and unpack the samples.
fn read_samples(input: &mut impl Read, packet_type: PacketType) -> Result<(Vec<u8>, Vec<i32>)> {
    let mut raw = vec![0u8; packet_type.frame_bytes()];
    input
        .read_exact(&mut raw)
        .context("input ended inside a packet frame")?;
    let mut samples = vec![0i32; packet_type.frame_samples()];
    LittleEndian::read_i32_into(&raw, &mut samples);
    Ok((raw, samples))
}

// ---------------------------------------------------------------------------
// Per-packet processing
// ---------------------------------------------------------------------------

struct Runner {
    corrector: Corrector,
    fail_fisb: bool,
    fail_adsb: bool,
    lowest_levels: bool,
    compat978: bool,
    save_failed: Option<PathBuf>,
    save_raw: Option<PathBuf>,
    lowest_fisb: f64,
    lowest_adsb: f64,
}

impl Runner {
    fn new(cli: &Cli) -> Result<Self> {
        let mut opts = CorrectorOptions {
            zero_tail_repair: !cli.no_zero_tail,
            fixed_bit_repair: !cli.no_fixed_bits,
            reject_overlay_decodes: cli.reject_overlay_decodes,
            ..CorrectorOptions::default()
        };
        if let Some(spec) = &cli.schedule {
            opts.schedule = parse_schedule(spec)?;
        }
        for prefix in &cli.station_prefix {
            let bytes = hex_decode(prefix)
                .filter(|b| b.len() == PREFIX_BYTES)
                .with_context(|| format!("--station-prefix {prefix:?} is not 12 hex digits"))?;
            let mut fixed = [0u8; PREFIX_BYTES];
            fixed.copy_from_slice(&bytes);
            opts.station_prefixes.push(fixed);
        }

        if cli.save_failed.is_some() && !cli.fail_fisb && !cli.fail_adsb {
            bail!("--save-failed needs --fail-fisb and/or --fail-adsb to select packet types");
        }
        for dir in [&cli.save_failed, &cli.save_raw].into_iter().flatten() {
            fs::create_dir_all(dir)
                .with_context(|| format!("cannot create {}", dir.display()))?;
        }

        Ok(Runner {
            corrector: Corrector::new(opts),
            fail_fisb: cli.fail_fisb,
            fail_adsb: cli.fail_adsb,
            lowest_levels: cli.lowest_levels,
            compat978: cli.compat978,
            save_failed: cli.save_failed.clone(),
            save_raw: cli.save_raw.clone(),
            lowest_fisb: f64::INFINITY,
            lowest_adsb: f64::INFINITY,
        })
    }

    fn note_lowest(&mut self, header: &FrameHeader) {
        if !self.lowest_levels {
            return;
        }
        let level = header.level_millionths();
        let (slot, name) = match header.packet_type {
            PacketType::Fisb => (&mut self.lowest_fisb, "FIS-B"),
            PacketType::Adsb => (&mut self.lowest_adsb, "ADS-B"),
        };
        if level < *slot {
            *slot = level;
            info!("lowest {name} signal: {level:.2}");
        }
    }

    /// Correct one frame and write its result line. Failures never
    /// terminate the run.
    fn process(
        &mut self,
        header: &FrameHeader,
        raw: &[u8],
        samples: &[i32],
        out: &mut impl Write,
    ) -> Result<()> {
        if let Some(dir) = &self.save_raw {
            let name = format!(
                "{}.{:03}.{}.i32",
                header.secs,
                header.usecs / 1000,
                header.packet_type.type_char()
            );
            fs::write(dir.join(name), raw)?;
        }

        match header.packet_type {
            PacketType::Fisb => match self.corrector.correct_fisb(samples) {
                FisbOutcome::Decoded(decode) => {
                    self.note_lowest(header);
                    writeln!(out, "{}", report::fisb_line(&decode, header, self.compat978))?;
                    out.flush()?;
                }
                FisbOutcome::Failed { block_errors } => {
                    if self.fail_fisb {
                        writeln!(
                            out,
                            "{}",
                            report::fisb_fail_line(&block_errors, header, self.compat978)
                        )?;
                        out.flush()?;
                        self.save_failed(header, raw, Some(&block_errors))?;
                    }
                }
            },
            PacketType::Adsb => match self.corrector.correct_adsb(samples) {
                AdsbOutcome::Decoded(decode) => {
                    self.note_lowest(header);
                    writeln!(out, "{}", report::adsb_line(&decode, header, self.compat978))?;
                    out.flush()?;
                }
                AdsbOutcome::Failed => {
                    if self.fail_adsb {
                        writeln!(out, "{}", report::adsb_fail_line(header, self.compat978))?;
                        out.flush()?;
                        self.save_failed(header, raw, None)?;
                    }
                }
            },
        }
        Ok(())
    }

    fn save_failed(
        &self,
        header: &FrameHeader,
        raw: &[u8],
        block_errors: Option<&[u8; 6]>,
    ) -> Result<()> {
        let Some(dir) = &self.save_failed else {
            return Ok(());
        };
        let name = match block_errors {
            Some(errors) => format!(
                "{}.{}.i32",
                header.attr_str(),
                report::block_errors_str(errors)
            ),
            None => format!("{}.i32", header.attr_str()),
        };
        fs::write(dir.join(name), raw)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Input loops
// ---------------------------------------------------------------------------

fn run_stream(runner: &mut Runner, input: &mut impl Read, out: &mut impl Write) -> Result<()> {
    while let Some(raw_header) = read_header(input)? {
        let header = FrameHeader::parse(&raw_header)?;
        let (raw, samples) = read_samples(input, header.packet_type)?;
        runner.process(&header, &raw, &samples, out)?;
    }
    Ok(())
}

/// Reprocess saved `.i32` frames; the attribute fields come from the
/// filenames. Failure reporting is forced on and nothing is re-saved.
fn run_replay(runner: &mut Runner, dir: &Path, out: &mut impl Write) -> Result<()> {
    runner.fail_fisb = true;
    runner.fail_adsb = true;
    runner.save_failed = None;
    runner.save_raw = None;

    let mut paths: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("cannot read {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "i32"))
        .collect();
    paths.sort();

    for path in paths {
        let Some(stem) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let header = match FrameHeader::parse_fields(stem) {
            Ok(header) => header,
            Err(err) => {
                info!("skipping {stem:?}: {err}");
                continue;
            }
        };
        let raw = fs::read(&path)?;
        if raw.len() != header.packet_type.frame_bytes() {
            info!("skipping {stem:?}: wrong frame length {}", raw.len());
            continue;
        }
        let mut samples = vec![0i32; header.packet_type.frame_samples()];
        LittleEndian::read_i32_into(&raw, &mut samples);
        runner.process(&header, &raw, &samples, out)?;
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

    let cli = Cli::parse();
    let mut runner = Runner::new(&cli)?;
    let mut out = io::BufWriter::new(io::stdout().lock());

    match &cli.replay {
        Some(dir) => run_replay(&mut runner, dir, &mut out),
        None => run_stream(&mut runner, &mut io::stdin().lock(), &mut out),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::WriteBytesExt;
    use std::io::Cursor;

    fn frame_bytes(header: &FrameHeader, samples: &[i32]) -> Vec<u8> {
        let mut bytes = header.encode().to_vec();
        for &s in samples {
            bytes.write_i32::<LittleEndian>(s).unwrap();
        }
        bytes
    }

    fn adsb_header() -> FrameHeader {
        FrameHeader {
            secs: 1700000000,
            usecs: 123456,
            packet_type: PacketType::Adsb,
            level: 2500000,
            sync_errors: 0,
        }
    }

    #[test]
    fn test_read_header_clean_eof() {
        let mut input = Cursor::new(Vec::new());
        assert!(read_header(&mut input).unwrap().is_none());
    }

    #[test]
    fn test_read_header_mid_eof_is_fatal() {
        let mut input = Cursor::new(vec![b'1'; 10]);
        assert!(read_header(&mut input).is_err());
    }

    #[test]
    fn test_frame_roundtrip() {
        let header = adsb_header();
        let samples: Vec<i32> = (0..771).map(|i| i * 17 - 6000).collect();
        let bytes = frame_bytes(&header, &samples);

        let mut input = Cursor::new(bytes);
        let raw = read_header(&mut input).unwrap().unwrap();
        let parsed = FrameHeader::parse(&raw).unwrap();
        assert_eq!(parsed, header);
        let (_, read) = read_samples(&mut input, parsed.packet_type).unwrap();
        assert_eq!(read, samples);
        assert!(read_header(&mut input).unwrap().is_none());
    }

    #[test]
    fn test_truncated_payload_is_fatal() {
        let header = adsb_header();
        let samples = vec![0i32; 100]; // far short of 771
        let mut input = Cursor::new(frame_bytes(&header, &samples));
        let raw = read_header(&mut input).unwrap().unwrap();
        let parsed = FrameHeader::parse(&raw).unwrap();
        assert!(read_samples(&mut input, parsed.packet_type).is_err());
    }

    #[test]
    fn test_runner_silent_on_failed_packet_by_default() {
        let cli = Cli::parse_from(["uat-ec"]);
        let mut runner = Runner::new(&cli).unwrap();
        let header = adsb_header();
        let samples = vec![100i32; 771]; // all-ones bits: uncorrectable
        let raw: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        let mut out = Vec::new();
        runner.process(&header, &raw, &samples, &mut out).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_runner_reports_failures_when_asked() {
        let cli = Cli::parse_from(["uat-ec", "--fail-adsb"]);
        let mut runner = Runner::new(&cli).unwrap();
        let header = adsb_header();
        let samples = vec![100i32; 771];
        let raw: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        let mut out = Vec::new();
        runner.process(&header, &raw, &samples, &mut out).unwrap();
        let line = String::from_utf8(out).unwrap();
        assert!(line.starts_with("#FAILED-ADS-B 0/98 "));
        assert!(line.ends_with("1700000000.123456.A.02500000.0\n"));
    }

    #[test]
    fn test_cli_rejects_save_failed_without_fail_flags() {
        let cli = Cli::parse_from(["uat-ec", "--save-failed", "/tmp/x"]);
        assert!(Runner::new(&cli).is_err());
    }

    #[test]
    fn test_cli_rejects_bad_prefix() {
        let cli = Cli::parse_from(["uat-ec", "--station-prefix", "123"]);
        assert!(Runner::new(&cli).is_err());
        let cli = Cli::parse_from(["uat-ec", "--station-prefix", "38f18185534c"]);
        assert!(Runner::new(&cli).is_ok());
    }
}
