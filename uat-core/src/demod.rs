//! IQ demodulation and dual-phase sync detection.
//!
//! Pipeline, per IQ pair:
//! 1. Differential demodulation: `s[n] = I[n-2]·Q[n] − I[n]·Q[n-2]`
//! 2. Running signal level: sliding |s| sum over one sync duration
//! 3. Sync search: two 36-bit comparators fed from alternating samples
//!
//! The demodulation is a two-sample differential of the instantaneous
//! phase, done entirely in integer math. Normalizing by `I² + Q²` buys a
//! handful of shift-free decodes and is skipped; the shift search in the
//! corrector recovers those packets anyway.
//!
//! Two comparator phases are needed because a sync word lands on either
//! the even-sample or the odd-sample stream with equal probability, and
//! both must be examined before any further input is consumed.

use crate::types::{PacketType, MAX_SYNC_ERRORS, SYNC_ADSB, SYNC_BITS, SYNC_FISB, SYNC_MASK};

/// Samples in the running-level window: one sync word at 2 samples/bit.
pub const RUNNING_WINDOW: usize = SYNC_BITS * 2;

/// Default signal gate. Below this running level the comparators emit
/// almost exclusively noise matches, so the sync check is skipped
/// entirely. Users supply this in millionths (`--level 0.9`).
pub const DEFAULT_THRESHOLD: u32 = 900_000;

/// A sync word accepted by one of the comparators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncMatch {
    pub packet_type: PacketType,
    pub sync_errors: u8,
}

/// Demodulator state: rolling IQ registers, level window, and the two
/// sync comparators. One instance per input stream; all state lives
/// here, nothing is global.
pub struct Demodulator {
    i_n1: i32,
    q_n1: i32,
    i_n2: i32,
    q_n2: i32,
    window: [u32; RUNNING_WINDOW],
    window_at: usize,
    window_sum: u64,
    sync_a: u64,
    sync_b: u64,
    feed_b: bool,
    threshold: u32,
    fisb: bool,
    adsb: bool,
}

impl Demodulator {
    pub fn new(fisb: bool, adsb: bool, threshold: u32) -> Self {
        Demodulator {
            i_n1: 0,
            q_n1: 0,
            i_n2: 0,
            q_n2: 0,
            window: [0; RUNNING_WINDOW],
            window_at: 0,
            window_sum: 0,
            sync_a: 0,
            sync_b: 0,
            feed_b: false,
            threshold,
            fisb,
            adsb,
        }
    }

    /// Demodulate one IQ pair without touching the sync comparators.
    /// Used while a packet frame is being streamed out; the level window
    /// keeps tracking so the gate state is current when search resumes.
    pub fn demod_sample(&mut self, i: i16, q: i16) -> i32 {
        let (i, q) = (i as i32, q as i32);
        // Widen before the subtract: each product reaches ±2^30 and the
        // difference approaches ±2^31 at full-scale input.
        let wide = self.i_n2 as i64 * q as i64 - i as i64 * self.q_n2 as i64;
        let sample = wide.clamp(i32::MIN as i64, i32::MAX as i64) as i32;

        self.i_n2 = self.i_n1;
        self.q_n2 = self.q_n1;
        self.i_n1 = i;
        self.q_n1 = q;

        let mag = sample.unsigned_abs();
        self.window_sum = self.window_sum - self.window[self.window_at] as u64 + mag as u64;
        self.window[self.window_at] = mag;
        self.window_at += 1;
        if self.window_at == RUNNING_WINDOW {
            self.window_at = 0;
        }

        sample
    }

    /// Demodulate one IQ pair and search for a sync word.
    ///
    /// On a match both comparators are cleared and the caller is expected
    /// to stream the packet frame through [`demod_sample`] before
    /// resuming — search never continues inside a matched packet.
    ///
    /// [`demod_sample`]: Demodulator::demod_sample
    pub fn process(&mut self, i: i16, q: i16) -> (i32, Option<SyncMatch>) {
        let sample = self.demod_sample(i, q);

        let reg = if self.feed_b {
            self.sync_b = (self.sync_b << 1) | (sample > 0) as u64;
            self.sync_b
        } else {
            self.sync_a = (self.sync_a << 1) | (sample > 0) as u64;
            self.sync_a
        };
        self.feed_b = !self.feed_b;

        if self.level() <= self.threshold {
            return (sample, None);
        }

        let matched = self.check(reg);
        if matched.is_some() {
            self.sync_a = 0;
            self.sync_b = 0;
            self.feed_b = false;
        }
        (sample, matched)
    }

    fn check(&self, reg: u64) -> Option<SyncMatch> {
        let candidate = reg & SYNC_MASK;
        if self.fisb {
            let errors = (candidate ^ SYNC_FISB).count_ones();
            if errors <= MAX_SYNC_ERRORS {
                return Some(SyncMatch {
                    packet_type: PacketType::Fisb,
                    sync_errors: errors as u8,
                });
            }
        }
        if self.adsb {
            let errors = (candidate ^ SYNC_ADSB).count_ones();
            if errors <= MAX_SYNC_ERRORS {
                return Some(SyncMatch {
                    packet_type: PacketType::Adsb,
                    sync_errors: errors as u8,
                });
            }
        }
        None
    }

    /// Current running level: average |s| over the last 72 samples.
    pub fn level(&self) -> u32 {
        (self.window_sum / RUNNING_WINDOW as u64).min(u32::MAX as u64) as u32
    }

    /// True when the running level is above the gate and sync words are
    /// being checked.
    pub fn gate_open(&self) -> bool {
        self.level() > self.threshold
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
