//! uat-core: demodulation and error correction for 978 MHz UAT.
//!
//! No I/O policy lives here — `uat-demod` and `uat-ec` own the pipes.
//! This crate is the shared algorithm layer: differential demodulation
//! and sync detection, the inter-process frame header, bit slicing with
//! the shift search, and the Reed-Solomon decode strategies.

pub mod demod;
pub mod fec;
pub mod frame;
pub mod report;
pub mod rs;
pub mod schedule;
pub mod types;
pub mod uplink;

#[cfg(test)]
pub(crate) mod testutil;

// Re-export the types the binaries touch on every packet.
pub use demod::{Demodulator, SyncMatch};
pub use fec::{AdsbOutcome, Corrector, CorrectorOptions, FisbOutcome};
pub use frame::FrameHeader;
pub use types::{PacketType, Result, UatError};
