//! Synthetic signal construction shared by the unit tests.

use crate::fec::{FISB_BLOCKS, FISB_DATA_BYTES};
use crate::rs::RsCodec;
use crate::types::SYNC_BITS;

/// MSB-first bits of a sync word.
pub fn sync_bits(word: u64) -> Vec<u8> {
    (0..SYNC_BITS)
        .rev()
        .map(|k| ((word >> k) & 1) as u8)
        .collect()
}

/// MSB-first bits of a byte slice.
pub fn bits_of(bytes: &[u8]) -> Vec<u8> {
    let mut bits = Vec::with_capacity(bytes.len() * 8);
    for &b in bytes {
        for k in (0..8).rev() {
            bits.push((b >> k) & 1);
        }
    }
    bits
}

/// Column-major byte interleaving of six FIS-B block codewords:
/// transmitted byte `k` is block `k mod 6`, index `k div 6`.
pub fn interleave(blocks: &[Vec<u8>]) -> Vec<u8> {
    assert_eq!(blocks.len(), FISB_BLOCKS);
    let total: usize = blocks.iter().map(|b| b.len()).sum();
    (0..total)
        .map(|k| blocks[k % FISB_BLOCKS][k / FISB_BLOCKS])
        .collect()
}

/// Build a packet sample frame straight in the slice domain: one leading
/// sample, two identical samples per bit, two trailing samples.
pub fn frame_from_bits(bits: &[u8], amp: i32) -> Vec<i32> {
    let mut frame = Vec::with_capacity(bits.len() * 2 + 3);
    frame.push(-amp);
    for &b in bits {
        let v = if b != 0 { amp } else { -amp };
        frame.push(v);
        frame.push(v);
    }
    frame.push(-amp);
    frame.push(-amp);
    frame
}

/// Encode a 432-byte FIS-B payload into a full 8835-sample frame.
pub fn fisb_frame(rs: &RsCodec, payload: &[u8], amp: i32) -> Vec<i32> {
    let blocks: Vec<Vec<u8>> = payload
        .chunks(FISB_DATA_BYTES)
        .map(|data| rs.encode(data))
        .collect();
    frame_from_bits(&bits_of(&interleave(&blocks)), amp)
}

/// Synthesize FM samples for a bit stream: per bit, a 75° then a 15°
/// phase step in the bit's direction. The uneven split keeps every slice
/// sample — including the ones straddling a bit transition — on the
/// bit's own side of zero.
pub fn synth_iq(bits: &[u8], amp: f64) -> Vec<(i16, i16)> {
    let mut phi: f64 = 0.0;
    let mut out = Vec::with_capacity(bits.len() * 2);
    for &b in bits {
        let dir = if b != 0 { 1.0 } else { -1.0 };
        for step in [75.0_f64, 15.0] {
            phi += dir * step.to_radians();
            out.push(((amp * phi.cos()) as i16, (amp * phi.sin()) as i16));
        }
    }
    out
}
