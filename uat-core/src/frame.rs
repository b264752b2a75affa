//! The attribute header framing packets between the demodulator and the
//! error corrector, plus arrival-time arithmetic.
//!
//! Every packet on the inter-process pipe is a fixed 36-byte ASCII header
//! followed by the frame samples the header's type byte implies:
//!
//! `SSSSSSSSSS.UUUUUU.T.LLLLLLLL.E` (right-padded with spaces to 36)
//!
//! - seconds past epoch, zero-padded to 10
//! - microseconds within the second, width 6
//! - `F` (FIS-B) or `A` (ADS-B)
//! - running signal level, width 8, clamped to 99999999
//! - sync bit errors 0-4

use crate::types::{PacketType, Result, UatError, SAMPLE_TIME_USECS, SYNC_BITS};

/// Exact header length on the wire. A header of any other length is a
/// framing error and fatal to the corrector.
pub const ATTRIBUTE_LEN: usize = 36;

/// Largest level value the 8-character field can carry.
pub const LEVEL_MAX: u32 = 99_999_999;

/// Full-scale reference for RSSI: the slice value produced by two
/// full-scale CS16 samples (32768²). Kept verbatim for output
/// compatibility with dump978-fa style dBFS readings.
const RSSI_FULL_SCALE: f64 = (1u64 << 30) as f64;

/// Parsed form of the 36-byte attribute header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub secs: i64,
    pub usecs: i64,
    pub packet_type: PacketType,
    pub level: u32,
    pub sync_errors: u8,
}

impl FrameHeader {
    /// Render the fixed-width wire form.
    pub fn encode(&self) -> [u8; ATTRIBUTE_LEN] {
        let core = format!(
            "{:010}.{:06}.{}.{:08}.{}",
            self.secs,
            self.usecs,
            self.packet_type.type_char(),
            self.level.min(LEVEL_MAX),
            self.sync_errors
        );
        let mut out = [b' '; ATTRIBUTE_LEN];
        out[..core.len()].copy_from_slice(core.as_bytes());
        out
    }

    /// Dot-separated field form without the space padding. Used in
    /// failure lines and capture filenames.
    pub fn attr_str(&self) -> String {
        let raw = self.encode();
        String::from_utf8_lossy(&raw).trim_end().to_string()
    }

    /// Parse a wire header. The input must be exactly [`ATTRIBUTE_LEN`]
    /// bytes; trailing padding is ignored.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        if raw.len() != ATTRIBUTE_LEN {
            return Err(UatError::MalformedHeader(format!(
                "length {} != {ATTRIBUTE_LEN}",
                raw.len()
            )));
        }
        let text = std::str::from_utf8(raw)
            .map_err(|_| UatError::MalformedHeader("not ASCII".into()))?
            .trim_end();
        Self::parse_fields(text)
    }

    /// Parse the dot-separated fields (also used on capture filenames,
    /// which append extra dot-separated fields after the first five).
    pub fn parse_fields(text: &str) -> Result<Self> {
        let bad = |why: &str| UatError::MalformedHeader(format!("{why}: {text:?}"));

        let mut fields = text.split('.');
        let secs = fields
            .next()
            .and_then(|f| f.parse::<i64>().ok())
            .ok_or_else(|| bad("seconds"))?;
        let usecs = fields
            .next()
            .and_then(|f| f.parse::<i64>().ok())
            .ok_or_else(|| bad("microseconds"))?;
        let type_field = fields.next().ok_or_else(|| bad("type"))?;
        let mut chars = type_field.chars();
        let type_char = chars.next().ok_or_else(|| bad("type"))?;
        if chars.next().is_some() {
            return Err(bad("type"));
        }
        let packet_type = PacketType::from_char(type_char)?;
        let level = fields
            .next()
            .and_then(|f| f.parse::<u32>().ok())
            .ok_or_else(|| bad("level"))?;
        let sync_errors = fields
            .next()
            .and_then(|f| f.parse::<u8>().ok())
            .ok_or_else(|| bad("sync errors"))?;
        if sync_errors > 4 {
            return Err(bad("sync errors"));
        }

        Ok(FrameHeader {
            secs,
            usecs,
            packet_type,
            level,
            sync_errors,
        })
    }

    /// Signal level in millionths (the unit users see: 900000 → 0.9).
    pub fn level_millionths(&self) -> f64 {
        self.level as f64 / 1_000_000.0
    }

    /// Received signal strength as dBFS against the CS16 full-scale
    /// product reference.
    pub fn rssi_db(&self) -> f64 {
        10.0 * (self.level.max(1) as f64 / RSSI_FULL_SCALE).log10()
    }
}

// ---------------------------------------------------------------------------
// Arrival time
// ---------------------------------------------------------------------------

/// Compute a packet's arrival time from the wall clock recorded at the
/// last input-buffer refill.
///
/// `sample_index` is the matched sample's pair index within that buffer.
/// The sync match fires on the last sync sample, so the start of the sync
/// word lies one sync duration (72 samples) earlier. Microsecond over-
/// or underflow rolls into the seconds field.
pub fn arrival_time(refill_secs: i64, refill_usecs: i64, sample_index: usize) -> (i64, i64) {
    let window = (SYNC_BITS * 2) as f64;
    let offset = sample_index as f64 * SAMPLE_TIME_USECS - window * SAMPLE_TIME_USECS;
    let mut secs = refill_secs;
    let mut usecs = refill_usecs + offset as i64;
    if usecs >= 1_000_000 {
        secs += 1;
        usecs -= 1_000_000;
    } else if usecs < 0 {
        secs -= 1;
        usecs += 1_000_000;
    }
    (secs, usecs)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> FrameHeader {
        FrameHeader {
            secs: 1638556942,
            usecs: 209000,
            packet_type: PacketType::Fisb,
            level: 5182170,
            sync_errors: 1,
        }
    }

    #[test]
    fn test_encode_layout() {
        let raw = header().encode();
        assert_eq!(raw.len(), ATTRIBUTE_LEN);
        assert_eq!(&raw[..30], b"1638556942.209000.F.05182170.1");
        assert_eq!(&raw[30..], b"      ");
    }

    #[test]
    fn test_roundtrip() {
        let h = header();
        assert_eq!(FrameHeader::parse(&h.encode()).unwrap(), h);
    }

    #[test]
    fn test_attr_str_trims_padding() {
        assert_eq!(header().attr_str(), "1638556942.209000.F.05182170.1");
    }

    #[test]
    fn test_parse_rejects_wrong_length() {
        assert!(FrameHeader::parse(b"1638556942.209000.F.05182170.1").is_err());
    }

    #[test]
    fn test_parse_rejects_unknown_type() {
        let mut raw = header().encode();
        raw[18] = b'X';
        assert!(FrameHeader::parse(&raw).is_err());
    }

    #[test]
    fn test_parse_rejects_garbage_fields() {
        let raw = *b"163855694x.209000.F.05182170.1      ";
        assert!(FrameHeader::parse(&raw).is_err());
        let raw = *b"1638556942.209000.F.05182170.9      ";
        assert!(FrameHeader::parse(&raw).is_err());
    }

    #[test]
    fn test_level_clamped_on_encode() {
        let mut h = header();
        h.level = 1_000_000_000;
        let parsed = FrameHeader::parse(&h.encode()).unwrap();
        assert_eq!(parsed.level, LEVEL_MAX);
    }

    #[test]
    fn test_level_millionths() {
        assert!((header().level_millionths() - 5.18217).abs() < 1e-9);
    }

    #[test]
    fn test_rssi_is_negative_dbfs() {
        let db = header().rssi_db();
        assert!(db < -20.0 && db > -30.0, "rssi {db}");
    }

    #[test]
    fn test_arrival_time_mid_buffer() {
        // 100 samples in: 48.0 µs after refill, minus the 34.56 µs sync
        // walk-back.
        let (secs, usecs) = arrival_time(1000, 500_000, 100);
        assert_eq!(secs, 1000);
        assert_eq!(usecs, 500_013);
    }

    #[test]
    fn test_arrival_time_rolls_forward() {
        let (secs, usecs) = arrival_time(1000, 999_990, 100);
        assert_eq!(secs, 1001);
        assert_eq!(usecs, 3);
    }

    #[test]
    fn test_arrival_time_rolls_backward() {
        let (secs, usecs) = arrival_time(1000, 10, 0);
        assert_eq!(secs, 999);
        assert_eq!(usecs, 999_976);
    }

    #[test]
    fn test_arrival_never_after_refill_plus_buffer() {
        // Arrival always refers back to the start of the sync word.
        let (secs, usecs) = arrival_time(2000, 0, 72);
        assert_eq!((secs, usecs), (2000, 0));
    }
}
