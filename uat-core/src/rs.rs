//! Reed-Solomon codec wrapper.
//!
//! UAT uses three shortened GF(2^8) codes: RS(92,72) per FIS-B block,
//! RS(48,34) for long ADS-B, RS(30,18) for short ADS-B. The primitive
//! itself is an external collaborator — this wrapper only fixes the
//! interface the correction strategies need: decoded data plus a
//! corrected-byte count, or nothing.

use reed_solomon::{Decoder, Encoder};

pub struct RsCodec {
    encoder: Encoder,
    decoder: Decoder,
    data_len: usize,
    ecc_len: usize,
}

impl RsCodec {
    pub fn new(data_len: usize, ecc_len: usize) -> Self {
        RsCodec {
            encoder: Encoder::new(ecc_len),
            decoder: Decoder::new(ecc_len),
            data_len,
            ecc_len,
        }
    }

    pub fn data_len(&self) -> usize {
        self.data_len
    }

    /// Codeword length: data plus parity.
    pub fn block_len(&self) -> usize {
        self.data_len + self.ecc_len
    }

    /// Errors this code can correct per block (half the parity bytes).
    pub fn max_errors(&self) -> usize {
        self.ecc_len / 2
    }

    /// Attempt to decode one codeword. Returns the data bytes and the
    /// number of codeword bytes that had to be corrected, or `None` when
    /// the block is uncorrectable.
    pub fn decode(&self, block: &[u8]) -> Option<(Vec<u8>, usize)> {
        debug_assert_eq!(block.len(), self.block_len());
        let mut scratch = block.to_vec();
        match self.decoder.correct(&mut scratch, None) {
            Ok(fixed) => {
                let corrected = block
                    .iter()
                    .zip(fixed.iter())
                    .filter(|(a, b)| a != b)
                    .count();
                Some((fixed.data().to_vec(), corrected))
            }
            Err(_) => None,
        }
    }

    /// Append parity to a data slice. The correction strategies never
    /// encode; this exists for loopback tests and synthetic captures.
    pub fn encode(&self, data: &[u8]) -> Vec<u8> {
        debug_assert_eq!(data.len(), self.data_len);
        let encoded = self.encoder.encode(data);
        let mut out = data.to_vec();
        out.extend_from_slice(encoded.ecc());
        out
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
