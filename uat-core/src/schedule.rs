//! The slice-point shift schedule.
//!
//! At two samples per bit the slice points rarely land on the eye
//! centers. Each schedule entry rebuilds the bit stream as a weighted
//! average of the nominal sample and one of its neighbors, moving the
//! effective slice point earlier (`Before`) or later (`After`). The
//! default order was measured on large off-air captures: each entry is
//! the mix most likely to decode the packets the entries before it
//! missed, so walking the table front to back converges fastest.

use crate::types::{Result, UatError};

/// One slice-point relocation: leave the samples alone, or mix a
/// percentage of a neighbor sample in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shift {
    Straight,
    /// Mix toward the earlier sample by this percentage (1-99).
    Before(u8),
    /// Mix toward the later sample by this percentage (1-99).
    After(u8),
}

impl std::fmt::Display for Shift {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Shift::Straight => write!(f, "0"),
            Shift::Before(p) => write!(f, "{p}"),
            Shift::After(p) => write!(f, "-{p}"),
        }
    }
}

/// Empirically ordered default schedule. Granularity below 5% was found
/// not to matter.
pub const DEFAULT_SCHEDULE: [Shift; 37] = [
    Shift::Straight,
    Shift::After(75),
    Shift::Before(75),
    Shift::After(50),
    Shift::Before(50),
    Shift::After(25),
    Shift::Before(25),
    Shift::After(85),
    Shift::Before(40),
    Shift::Before(65),
    Shift::After(30),
    Shift::Before(80),
    Shift::After(5),
    Shift::Before(5),
    Shift::After(90),
    Shift::Before(90),
    Shift::After(10),
    Shift::Before(10),
    Shift::Before(85),
    Shift::After(15),
    Shift::Before(15),
    Shift::After(80),
    Shift::After(65),
    Shift::After(35),
    Shift::Before(35),
    Shift::After(70),
    Shift::Before(70),
    Shift::Before(30),
    Shift::After(40),
    Shift::After(60),
    Shift::Before(60),
    Shift::After(20),
    Shift::Before(20),
    Shift::After(45),
    Shift::Before(45),
    Shift::After(55),
    Shift::Before(55),
];

/// Parse a comma-separated schedule of signed percentages: positive
/// mixes toward the earlier sample, negative toward the later one, `0`
/// is the unshifted stream. Example: `0,-75,75,-50,50`.
pub fn parse_schedule(spec: &str) -> Result<Vec<Shift>> {
    let mut out = Vec::new();
    for field in spec.split(',') {
        let field = field.trim();
        let value: i32 = field
            .parse()
            .map_err(|_| UatError::BadArgument(format!("bad shift value {field:?}")))?;
        let shift = match value {
            0 => Shift::Straight,
            1..=99 => Shift::Before(value as u8),
            -99..=-1 => Shift::After(-value as u8),
            _ => {
                return Err(UatError::BadArgument(format!(
                    "shift percentage {value} out of range"
                )))
            }
        };
        out.push(shift);
    }
    if out.is_empty() {
        return Err(UatError::BadArgument("empty shift schedule".into()));
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
