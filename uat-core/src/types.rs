//! Shared types, error enum, and wire constants for uat-core.

use thiserror::Error;

/// All errors produced by uat-core.
#[derive(Debug, Error)]
pub enum UatError {
    #[error("malformed attribute header: {0}")]
    MalformedHeader(String),
    #[error("unknown packet type byte: {0:?}")]
    UnknownPacketType(char),
    #[error("truncated frame: expected {expected} bytes, got {actual}")]
    TruncatedFrame { expected: usize, actual: usize },
    #[error("bad argument: {0}")]
    BadArgument(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, UatError>;

// ---------------------------------------------------------------------------
// Wire constants
// ---------------------------------------------------------------------------

/// UAT bits are sampled twice. The slicing and shift-search code assumes
/// exactly this value; do not change.
pub const SAMPLES_PER_BIT: usize = 2;

/// Samples per second: 2 × 1,041,667 bit/s.
pub const SAMPLE_RATE: u32 = 2_083_334;

/// Wall-clock duration of one sample (the bit rate is 0.96 µs/bit).
pub const SAMPLE_TIME_USECS: f64 = 0.48;

/// 36-bit sync word opening every FIS-B ground uplink.
pub const SYNC_FISB: u64 = 0x1_5322_5B1D;

/// 36-bit sync word opening every ADS-B transmission (bit inversion of
/// the FIS-B word).
pub const SYNC_ADSB: u64 = 0xE_ACDD_A4E2;

/// Low 36 bits of the sync shift registers.
pub const SYNC_MASK: u64 = 0xF_FFFF_FFFF;

/// Length of a sync word in bits.
pub const SYNC_BITS: usize = 36;

/// A sync candidate may differ from the sync word in at most this many
/// bit positions.
pub const MAX_SYNC_ERRORS: u32 = 4;

/// FIS-B payload bits following the sync word (552 interleaved bytes).
pub const FISB_PAYLOAD_BITS: usize = 4416;

/// ADS-B payload bits following the sync word. Short packets occupy a
/// 240-bit prefix of this; the frame is always sized for long.
pub const ADSB_PAYLOAD_BITS: usize = 384;

// ---------------------------------------------------------------------------
// Packet type
// ---------------------------------------------------------------------------

/// The two UAT packet families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    Fisb,
    Adsb,
}

impl PacketType {
    /// Header type byte: `F` or `A`.
    pub fn type_char(self) -> char {
        match self {
            PacketType::Fisb => 'F',
            PacketType::Adsb => 'A',
        }
    }

    /// Output line sigil: `+` for FIS-B, `-` for ADS-B.
    pub fn sigil(self) -> char {
        match self {
            PacketType::Fisb => '+',
            PacketType::Adsb => '-',
        }
    }

    pub fn from_char(c: char) -> Result<Self> {
        match c {
            'F' => Ok(PacketType::Fisb),
            'A' => Ok(PacketType::Adsb),
            other => Err(UatError::UnknownPacketType(other)),
        }
    }

    pub fn sync_word(self) -> u64 {
        match self {
            PacketType::Fisb => SYNC_FISB,
            PacketType::Adsb => SYNC_ADSB,
        }
    }

    pub fn payload_bits(self) -> usize {
        match self {
            PacketType::Fisb => FISB_PAYLOAD_BITS,
            PacketType::Adsb => ADSB_PAYLOAD_BITS,
        }
    }

    /// Samples per emitted frame: one leading sample, two per payload
    /// bit, and two trailing samples for the shifted-window retries.
    pub fn frame_samples(self) -> usize {
        self.payload_bits() * SAMPLES_PER_BIT + 3
    }

    /// Frame size on the wire (i32 LE samples).
    pub fn frame_bytes(self) -> usize {
        self.frame_samples() * 4
    }
}

// ---------------------------------------------------------------------------
// Hex utilities
// ---------------------------------------------------------------------------

const HEX_CHARS: &[u8; 16] = b"0123456789abcdef";

/// Encode bytes as lowercase hex.
pub fn hex_encode(data: &[u8]) -> String {
    let mut s = String::with_capacity(data.len() * 2);
    for &b in data {
        s.push(HEX_CHARS[(b >> 4) as usize] as char);
        s.push(HEX_CHARS[(b & 0x0F) as usize] as char);
    }
    s
}

/// Decode a hex string into bytes. Case-insensitive, must be even length.
pub fn hex_decode(hex: &str) -> Option<Vec<u8>> {
    let hex = hex.trim();
    if hex.len() % 2 != 0 {
        return None;
    }
    let mut bytes = Vec::with_capacity(hex.len() / 2);
    for chunk in hex.as_bytes().chunks(2) {
        let high = hex_digit(chunk[0])?;
        let low = hex_digit(chunk[1])?;
        bytes.push((high << 4) | low);
    }
    Some(bytes)
}

fn hex_digit(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
