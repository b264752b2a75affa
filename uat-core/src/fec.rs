//! Packet error correction: bit slicing, the shift search, and the
//! repair strategies.
//!
//! A packet frame carries one sample before the payload and two after
//! it, so three parallel bit lanes exist over every block:
//!
//! - `current`: the samples the sync word aligned to
//! - `before` / `after`: the neighbor samples either side
//!
//! When the current lane fails Reed-Solomon, the lanes are mixed at the
//! percentages in the shift schedule to move the effective slice point,
//! and the whole search is retried one sample later. FIS-B block 0 gets
//! two extra repairs: forcing the known-constant uplink header bits and
//! overlaying configured station identity prefixes.

use tracing::debug;

use crate::rs::RsCodec;
use crate::schedule::{Shift, DEFAULT_SCHEDULE};
use crate::types::PacketType;
use crate::uplink;

/// Interleaved Reed-Solomon blocks per FIS-B packet.
pub const FISB_BLOCKS: usize = 6;

/// Bytes per FIS-B block codeword (72 data + 20 parity).
pub const FISB_BLOCK_BYTES: usize = 92;

/// Data bytes per FIS-B block.
pub const FISB_DATA_BYTES: usize = 72;

/// Long ADS-B codeword (34 data + 14 parity).
pub const ADSB_LONG_BYTES: usize = 48;
pub const ADSB_LONG_DATA: usize = 34;

/// Short ADS-B codeword (18 data + 12 parity).
pub const ADSB_SHORT_BYTES: usize = 30;
pub const ADSB_SHORT_DATA: usize = 18;

/// Block error sentinel: every strategy was tried and failed.
pub const ERR_FAILED: u8 = 98;

/// Block error sentinel: the block was never attempted (zero-filled by
/// the empty-frame shortcut).
pub const ERR_NOT_TRIED: u8 = 99;

/// Shortest trailing near-zero run the tail repair will touch.
const ZERO_TAIL_MIN_RUN: usize = 8;

// ---------------------------------------------------------------------------
// Options and results
// ---------------------------------------------------------------------------

pub struct CorrectorOptions {
    /// Shift schedule to walk, front to back.
    pub schedule: Vec<Shift>,
    /// Snap trailing near-zero runs and retry (FIS-B).
    pub zero_tail_repair: bool,
    /// Force known-constant uplink header bits on block 0 and retry.
    pub fixed_bit_repair: bool,
    /// Station identity prefixes to overlay on block 0, tried in order.
    pub station_prefixes: Vec<[u8; uplink::PREFIX_BYTES]>,
    /// Treat packets that only decoded through a prefix overlay as
    /// failures instead of trusting the overlay.
    pub reject_overlay_decodes: bool,
}

impl Default for CorrectorOptions {
    fn default() -> Self {
        CorrectorOptions {
            schedule: DEFAULT_SCHEDULE.to_vec(),
            zero_tail_repair: true,
            fixed_bit_repair: true,
            station_prefixes: Vec::new(),
            reject_overlay_decodes: false,
        }
    }
}

/// A successfully corrected FIS-B packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FisbDecode {
    /// 432 data bytes: block 0 ‖ … ‖ block 5.
    pub data: Vec<u8>,
    /// Corrected bytes per block, or the 98/99 sentinels.
    pub block_errors: [u8; FISB_BLOCKS],
    /// Reed-Solomon attempts spent, +500 when the one-sample-later pass
    /// was needed.
    pub attempts: u32,
    /// True when the decode only succeeded via a station prefix overlay.
    pub used_overlay: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FisbOutcome {
    Decoded(FisbDecode),
    Failed { block_errors: [u8; FISB_BLOCKS] },
}

/// A successfully corrected ADS-B packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdsbDecode {
    /// 18 (short) or 34 (long) data bytes.
    pub data: Vec<u8>,
    pub errors: u8,
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdsbOutcome {
    Decoded(AdsbDecode),
    Failed,
}

// ---------------------------------------------------------------------------
// Bit lanes
// ---------------------------------------------------------------------------

struct Lanes {
    current: Vec<i32>,
    before: Vec<i32>,
    after: Vec<i32>,
}

/// Extract the three bit lanes for one FIS-B block, deinterleaving as it
/// goes: transmitted byte `k` belongs to block `k mod 6` at index
/// `k div 6`, so consecutive bytes of a block sit 96 samples apart.
fn fisb_block_lanes(samples: &[i32], offset: usize, block: usize) -> Lanes {
    let bits = FISB_BLOCK_BYTES * 8;
    let mut current = Vec::with_capacity(bits);
    let mut before = Vec::with_capacity(bits);
    let mut after = Vec::with_capacity(bits);

    let mut at = offset + block * 16;
    for _ in 0..FISB_BLOCK_BYTES {
        for k in 0..8 {
            let idx = at + 2 * k;
            current.push(samples[idx]);
            before.push(samples[idx - 1]);
            after.push(samples[idx + 1]);
        }
        at += 96; // skip the other five blocks' interleaved bytes
    }
    Lanes {
        current,
        before,
        after,
    }
}

/// Extract the three bit lanes for an ADS-B codeword (no interleaving).
fn adsb_lanes(samples: &[i32], offset: usize, n_bytes: usize) -> Lanes {
    let bits = n_bytes * 8;
    let mut current = Vec::with_capacity(bits);
    let mut before = Vec::with_capacity(bits);
    let mut after = Vec::with_capacity(bits);
    for k in 0..bits {
        let idx = offset + 2 * k;
        current.push(samples[idx]);
        before.push(samples[idx - 1]);
        after.push(samples[idx + 1]);
    }
    Lanes {
        current,
        before,
        after,
    }
}

// ---------------------------------------------------------------------------
// Slicing
// ---------------------------------------------------------------------------

fn pack<I: Iterator<Item = bool>>(bits: I) -> Vec<u8> {
    let mut out = Vec::new();
    let mut acc = 0u8;
    let mut n = 0;
    for bit in bits {
        acc = (acc << 1) | bit as u8;
        n += 1;
        if n == 8 {
            out.push(acc);
            acc = 0;
            n = 0;
        }
    }
    out
}

fn pack_straight(current: &[i32]) -> Vec<u8> {
    pack(current.iter().map(|&s| s > 0))
}

fn pack_mixed(current: &[i32], neighbor: &[i32], percent: u8) -> Vec<u8> {
    let weight = percent as f64 / 100.0;
    pack(
        current
            .iter()
            .zip(neighbor)
            .map(|(&c, &n)| (c as f64 + n as f64 * weight) / 2.0 > 0.0),
    )
}

fn pack_shifted(lanes: &Lanes, shift: Shift) -> Vec<u8> {
    match shift {
        Shift::Straight => pack_straight(&lanes.current),
        Shift::Before(p) => pack_mixed(&lanes.current, &lanes.before, p),
        Shift::After(p) => pack_mixed(&lanes.current, &lanes.after, p),
    }
}

/// Snap a trailing run of near-zero samples to the block's zero average
/// and re-slice. Weak transmitter tails dither around zero and slice
/// randomly; the block-wide average of the near-zero samples recovers
/// the dominant side. Returns `None` when there is no qualifying run.
fn zero_tail_repair(current: &[i32]) -> Option<Vec<u8>> {
    let mean_abs =
        current.iter().map(|s| s.unsigned_abs() as u64).sum::<u64>() / current.len() as u64;
    let near = (mean_abs / 4) as i64;

    let run = current
        .iter()
        .rev()
        .take_while(|s| (s.unsigned_abs() as i64) <= near)
        .count();
    if run < ZERO_TAIL_MIN_RUN || run == current.len() {
        return None;
    }

    let (sum, n) = current
        .iter()
        .filter(|s| (s.unsigned_abs() as i64) <= near)
        .fold((0i64, 0i64), |(sum, n), &v| (sum + v as i64, n + 1));
    let snap = (sum / n) as i32;

    let mut fixed = current.to_vec();
    let tail = fixed.len() - run;
    for v in &mut fixed[tail..] {
        *v = snap;
    }
    Some(pack_straight(&fixed))
}

// ---------------------------------------------------------------------------
// Corrector
// ---------------------------------------------------------------------------

pub struct Corrector {
    rs_fisb: RsCodec,
    rs_adsb_long: RsCodec,
    rs_adsb_short: RsCodec,
    opts: CorrectorOptions,
}

impl Corrector {
    pub fn new(opts: CorrectorOptions) -> Self {
        Corrector {
            rs_fisb: RsCodec::new(FISB_DATA_BYTES, FISB_BLOCK_BYTES - FISB_DATA_BYTES),
            rs_adsb_long: RsCodec::new(ADSB_LONG_DATA, ADSB_LONG_BYTES - ADSB_LONG_DATA),
            rs_adsb_short: RsCodec::new(ADSB_SHORT_DATA, ADSB_SHORT_BYTES - ADSB_SHORT_DATA),
            opts,
        }
    }

    /// Walk the shift schedule over one codeword's lanes. `hint` is the
    /// shift that decoded the previous block and is tried first; a
    /// success reports which shift worked so the caller can propagate
    /// the hint.
    fn try_shifts(
        &self,
        rs: &RsCodec,
        lanes: &Lanes,
        hint: Option<Shift>,
        attempts: &mut u32,
    ) -> Option<(Vec<u8>, usize, Shift)> {
        if let Some(shift) = hint {
            *attempts += 1;
            if let Some((data, count)) = rs.decode(&pack_shifted(lanes, shift)) {
                return Some((data, count, shift));
            }
        }
        for &shift in &self.opts.schedule {
            if Some(shift) == hint {
                continue;
            }
            *attempts += 1;
            if let Some((data, count)) = rs.decode(&pack_shifted(lanes, shift)) {
                return Some((data, count, shift));
            }
        }
        None
    }

    /// Attempt a full FIS-B packet: 8835 frame samples in, 432 data
    /// bytes out.
    pub fn correct_fisb(&self, samples: &[i32]) -> FisbOutcome {
        debug_assert_eq!(samples.len(), PacketType::Fisb.frame_samples());

        let mut blocks: [Option<Vec<u8>>; FISB_BLOCKS] = Default::default();
        let mut errors = [ERR_NOT_TRIED; FISB_BLOCKS];
        let mut attempts: u32 = 0;
        let mut second_pass = false;

        for offset in [1usize, 2] {
            if blocks.iter().all(|b| b.is_some()) {
                break;
            }
            second_pass = offset == 2;
            let mut hint = None;
            for block in 0..FISB_BLOCKS {
                if blocks[block].is_some() {
                    continue;
                }
                let lanes = fisb_block_lanes(samples, offset, block);
                if let Some((data, count, shift)) =
                    self.try_shifts(&self.rs_fisb, &lanes, hint, &mut attempts)
                {
                    errors[block] = count as u8;
                    blocks[block] = Some(data);
                    hint = Some(shift);
                }
                // Empty uplinks are common: as soon as the decoded
                // prefix shows the frame chain terminating, the rest of
                // the packet is known zero-fill.
                if fill_after_end(&mut blocks) {
                    return self.finish_fisb(blocks, errors, attempts, second_pass, false);
                }
            }
        }

        if blocks.iter().all(|b| b.is_some()) {
            return self.finish_fisb(blocks, errors, attempts, second_pass, false);
        }

        // Repair pass over whatever is still missing.
        let mut used_overlay = false;
        for block in 0..FISB_BLOCKS {
            if blocks[block].is_some() {
                continue;
            }
            let lanes = fisb_block_lanes(samples, 1, block);

            let mut fixed = None;
            if self.opts.zero_tail_repair {
                if let Some(bytes) = zero_tail_repair(&lanes.current) {
                    attempts += 1;
                    fixed = self.rs_fisb.decode(&bytes);
                    if fixed.is_some() {
                        debug!(block, "zero-tail repair decoded");
                    }
                }
            }
            if fixed.is_none() && block == 0 && self.opts.fixed_bit_repair {
                let mut bytes = pack_straight(&lanes.current);
                uplink::apply_fixed_bits(&mut bytes);
                attempts += 1;
                fixed = self.rs_fisb.decode(&bytes);
                if fixed.is_none() {
                    for prefix in &self.opts.station_prefixes {
                        let mut candidate = bytes.clone();
                        uplink::apply_prefix(&mut candidate, prefix);
                        attempts += 1;
                        if let Some(hit) = self.rs_fisb.decode(&candidate) {
                            debug!("station prefix overlay decoded block 0");
                            fixed = Some(hit);
                            used_overlay = true;
                            break;
                        }
                    }
                }
            }

            match fixed {
                Some((data, count)) => {
                    errors[block] = count as u8;
                    blocks[block] = Some(data);
                    if fill_after_end(&mut blocks) {
                        return self.finish_fisb(blocks, errors, attempts, second_pass, used_overlay);
                    }
                }
                None => errors[block] = ERR_FAILED,
            }
        }

        if blocks.iter().all(|b| b.is_some()) {
            return self.finish_fisb(blocks, errors, attempts, second_pass, used_overlay);
        }
        FisbOutcome::Failed {
            block_errors: errors,
        }
    }

    fn finish_fisb(
        &self,
        blocks: [Option<Vec<u8>>; FISB_BLOCKS],
        block_errors: [u8; FISB_BLOCKS],
        attempts: u32,
        second_pass: bool,
        used_overlay: bool,
    ) -> FisbOutcome {
        if used_overlay && self.opts.reject_overlay_decodes {
            debug!("rejecting overlay-assisted decode by policy");
            return FisbOutcome::Failed { block_errors };
        }
        let mut data = Vec::with_capacity(FISB_BLOCKS * FISB_DATA_BYTES);
        for block in blocks.into_iter().flatten() {
            data.extend_from_slice(&block);
        }
        FisbOutcome::Decoded(FisbDecode {
            data,
            block_errors,
            attempts: attempts + if second_pass { 500 } else { 0 },
            used_overlay,
        })
    }

    /// Attempt an ADS-B packet: 771 frame samples in, 18 or 34 data
    /// bytes out.
    ///
    /// Short packets open with five zero bits. The sliced guess only
    /// orders the attempts; a decode is accepted only when the decoded
    /// leading bits agree with the code that produced it.
    pub fn correct_adsb(&self, samples: &[i32]) -> AdsbOutcome {
        debug_assert_eq!(samples.len(), PacketType::Adsb.frame_samples());

        let mut attempts: u32 = 0;
        let short_guess = (0..5).all(|k| samples[1 + 2 * k] <= 0);
        let plan = [
            (short_guess, 1usize, 0u32),
            (!short_guess, 1, 0),
            (!short_guess, 2, 500),
            (short_guess, 2, 500),
        ];

        for (is_short, offset, bonus) in plan {
            let rs = if is_short {
                &self.rs_adsb_short
            } else {
                &self.rs_adsb_long
            };
            let lanes = adsb_lanes(samples, offset, rs.block_len());
            if let Some((data, count, _)) = self.try_shifts(rs, &lanes, None, &mut attempts) {
                let leading = data[0] >> 3;
                if is_short != (leading == 0) {
                    debug!(is_short, leading, "decode disagrees with payload type bits");
                    continue;
                }
                return AdsbOutcome::Decoded(AdsbDecode {
                    data,
                    errors: count as u8,
                    attempts: attempts + bonus,
                });
            }
        }
        AdsbOutcome::Failed
    }
}

/// If the decoded consecutive prefix shows the information-frame chain
/// terminating, zero-fill every block past the terminator (their error
/// slots keep the not-attempted sentinel) and report the packet
/// complete.
fn fill_after_end(blocks: &mut [Option<Vec<u8>>; FISB_BLOCKS]) -> bool {
    if blocks[0].is_none() {
        return false;
    }
    let mut data = Vec::with_capacity(FISB_BLOCKS * FISB_DATA_BYTES);
    for block in blocks.iter() {
        match block {
            Some(bytes) => data.extend_from_slice(bytes),
            None => break,
        }
    }
    match uplink::app_data_end_block(&data) {
        Some(end_block) => {
            for block in blocks.iter_mut().skip(end_block + 1) {
                if block.is_none() {
                    *block = Some(vec![0u8; FISB_DATA_BYTES]);
                }
            }
            true
        }
        None => false,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
