//! Decoded-output line construction.
//!
//! One line per corrected packet:
//!
//! `+<hex>;rs=<syncE>/<e0:..:e5>;ss=<level>/<rssi>;t=<epoch>.<ms>`  (FIS-B)
//! `-<hex>;rs=<syncE>/<errs>;ss=<level>/<rssi>;t=<epoch>.<ms>`      (ADS-B)
//!
//! Failure comments (opt-in) start with `#FAILED-FIS-B` / `#FAILED-ADS-B`
//! and carry the original attribute string for archival.
//!
//! The legacy-compatible format (`--compat978`) mimics the decoder this
//! one replaced: a bare `ss=` level and an attempt counter appended to
//! the `rs=` field.

use crate::fec::{AdsbDecode, FisbDecode, FISB_BLOCKS};
use crate::frame::FrameHeader;
use crate::types::hex_encode;

/// Render the per-block error counts: six two-digit values joined by
/// colons (98 = uncorrectable, 99 = not attempted).
pub fn block_errors_str(errors: &[u8; FISB_BLOCKS]) -> String {
    let parts: Vec<String> = errors.iter().map(|e| format!("{e:02}")).collect();
    parts.join(":")
}

fn time_str(header: &FrameHeader) -> String {
    format!("t={}.{:03}", header.secs, header.usecs / 1000)
}

fn signal_str(header: &FrameHeader, compat978: bool) -> String {
    if compat978 {
        format!("ss={:.2}", header.level_millionths())
    } else {
        format!(
            "ss={:.2}/{:.1}",
            header.level_millionths(),
            header.rssi_db()
        )
    }
}

/// Success line for a FIS-B packet.
pub fn fisb_line(decode: &FisbDecode, header: &FrameHeader, compat978: bool) -> String {
    let rs = if compat978 {
        format!(
            "rs={}/{}/{:03}",
            header.sync_errors,
            block_errors_str(&decode.block_errors),
            decode.attempts
        )
    } else {
        format!(
            "rs={}/{}",
            header.sync_errors,
            block_errors_str(&decode.block_errors)
        )
    };
    format!(
        "+{};{};{};{}",
        hex_encode(&decode.data),
        rs,
        signal_str(header, compat978),
        time_str(header)
    )
}

/// Success line for an ADS-B packet.
pub fn adsb_line(decode: &AdsbDecode, header: &FrameHeader, compat978: bool) -> String {
    let rs = if compat978 {
        format!(
            "rs={}/{}/{:03}",
            header.sync_errors, decode.errors, decode.attempts
        )
    } else {
        format!("rs={}/{}", header.sync_errors, decode.errors)
    };
    format!(
        "-{};{};{};{}",
        hex_encode(&decode.data),
        rs,
        signal_str(header, compat978),
        time_str(header)
    )
}

/// Failure comment for a FIS-B packet.
pub fn fisb_fail_line(
    block_errors: &[u8; FISB_BLOCKS],
    header: &FrameHeader,
    compat978: bool,
) -> String {
    format!(
        "#FAILED-FIS-B {}/{} {} {} {}",
        header.sync_errors,
        block_errors_str(block_errors),
        signal_str(header, compat978),
        time_str(header),
        header.attr_str()
    )
}

/// Failure comment for an ADS-B packet.
pub fn adsb_fail_line(header: &FrameHeader, compat978: bool) -> String {
    format!(
        "#FAILED-ADS-B {}/98 {} {} {}",
        header.sync_errors,
        signal_str(header, compat978),
        time_str(header),
        header.attr_str()
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PacketType;

    fn header(packet_type: PacketType) -> FrameHeader {
        FrameHeader {
            secs: 1638556942,
            usecs: 209471,
            packet_type,
            level: 5182170,
            sync_errors: 1,
        }
    }

    fn fisb_decode() -> FisbDecode {
        FisbDecode {
            data: vec![0xAB; 432],
            block_errors: [0, 0, 3, 0, 99, 99],
            attempts: 12,
            used_overlay: false,
        }
    }

    #[test]
    fn test_block_errors_str() {
        assert_eq!(
            block_errors_str(&[0, 10, 98, 99, 4, 0]),
            "00:10:98:99:04:00"
        );
    }

    #[test]
    fn test_fisb_line() {
        let line = fisb_line(&fisb_decode(), &header(PacketType::Fisb), false);
        assert!(line.starts_with("+abab"));
        assert_eq!(line.len(), 1 + 864 + ";rs=1/00:00:03:00:99:99".len() + ";ss=5.18/-23.2".len() + ";t=1638556942.209".len());
        assert!(line.contains(";rs=1/00:00:03:00:99:99;"));
        assert!(line.contains(";ss=5.18/-23.2;"));
        assert!(line.ends_with(";t=1638556942.209"));
    }

    #[test]
    fn test_fisb_line_compat978() {
        let line = fisb_line(&fisb_decode(), &header(PacketType::Fisb), true);
        assert!(line.contains(";rs=1/00:00:03:00:99:99/012;"));
        assert!(line.contains(";ss=5.18;"));
    }

    #[test]
    fn test_adsb_line() {
        let decode = AdsbDecode {
            data: vec![0x1A; 34],
            errors: 2,
            attempts: 3,
        };
        let line = adsb_line(&decode, &header(PacketType::Adsb), false);
        assert!(line.starts_with("-1a1a"));
        assert_eq!(&line[1..69], &"1a".repeat(34));
        assert!(line.contains(";rs=1/2;"));
        assert!(line.ends_with(";t=1638556942.209"));
    }

    #[test]
    fn test_fail_lines_carry_attributes() {
        let line = fisb_fail_line(&[98, 0, 98, 98, 98, 98], &header(PacketType::Fisb), false);
        assert!(line.starts_with("#FAILED-FIS-B 1/98:00:98:98:98:98 "));
        assert!(line.ends_with(" 1638556942.209471.F.05182170.1"));

        let line = adsb_fail_line(&header(PacketType::Adsb), false);
        assert!(line.starts_with("#FAILED-ADS-B 1/98 "));
        assert!(line.ends_with(" 1638556942.209471.A.05182170.1"));
    }
}
