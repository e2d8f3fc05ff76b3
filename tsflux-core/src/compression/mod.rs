//! Gorilla compression for time-series data
//!
//! Implements the compression algorithm from Facebook's paper:
//! "Gorilla: A Fast, Scalable, In-Memory Time Series Database"
//!
//! Timestamps are stored as delta-of-delta, values as XOR against the
//! previous value. Used as the byte layout of compressed chunks.

mod bitstream;
mod decoder;
mod encoder;

pub use bitstream::{BitReader, BitWriter};
pub use decoder::GorillaDecoder;
pub use encoder::{GorillaEncoder, MAX_SAMPLE_BITS};

use crate::{Result, Sample};

/// Encode an ordered run of samples
pub fn encode_samples(samples: &[Sample], capacity: usize) -> GorillaEncoder {
    let mut encoder = GorillaEncoder::with_capacity(capacity);
    for sample in samples {
        encoder.encode(*sample);
    }
    encoder
}

/// Decode every sample held by an encoder
pub fn decode_samples(encoder: &GorillaEncoder) -> Result<Vec<Sample>> {
    GorillaDecoder::new(encoder.as_bytes(), encoder.count()).decode_all()
}
