//! Gorilla encoder for time-series compression

use super::bitstream::BitWriter;
use crate::{Sample, Timestamp};

/// Worst-case encoded size of one sample after the first, in bits:
/// `1111` + 64-bit delta-of-delta, then `11` + 5 + 6 + 64 value bits.
pub const MAX_SAMPLE_BITS: usize = 4 + 64 + 2 + 5 + 6 + 64;

/// Gorilla encoder for time-series data
#[derive(Debug, Clone, Default)]
pub struct GorillaEncoder {
    writer: BitWriter,
    count: usize,

    // Timestamp state
    first_timestamp: Timestamp,
    prev_timestamp: Timestamp,
    prev_timestamp_delta: i64,

    // Value state
    prev_value_bits: u64,
    prev_leading_zeros: u32,
    prev_trailing_zeros: u32,
}

impl GorillaEncoder {
    /// Create a new encoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with a byte capacity hint
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            writer: BitWriter::with_capacity(capacity),
            ..Self::default()
        }
    }

    /// Encode a sample; samples must arrive in timestamp order
    pub fn encode(&mut self, sample: Sample) {
        if self.count == 0 {
            self.encode_first(sample);
        } else {
            self.encode_timestamp(sample.timestamp);
            self.encode_value(sample.value);
        }
        self.count += 1;
    }

    /// Number of encoded samples
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn first_timestamp(&self) -> Timestamp {
        self.first_timestamp
    }

    pub fn last_timestamp(&self) -> Timestamp {
        self.prev_timestamp
    }

    /// Encoded stream
    pub fn as_bytes(&self) -> &[u8] {
        self.writer.as_bytes()
    }

    /// Encoded size in bytes
    pub fn size_bytes(&self) -> usize {
        self.writer.len()
    }

    /// Allocated buffer size in bytes
    pub fn capacity(&self) -> usize {
        self.writer.capacity()
    }

    /// Bits written so far
    pub fn bit_len(&self) -> usize {
        self.writer.bit_len()
    }

    fn encode_first(&mut self, sample: Sample) {
        self.first_timestamp = sample.timestamp;
        self.prev_timestamp = sample.timestamp;
        self.prev_timestamp_delta = 0;

        self.writer.write_bits(sample.timestamp, 64);

        let value_bits = sample.value.to_bits();
        self.writer.write_bits(value_bits, 64);
        self.prev_value_bits = value_bits;
    }

    fn encode_timestamp(&mut self, timestamp: Timestamp) {
        let delta = timestamp.wrapping_sub(self.prev_timestamp) as i64;
        let delta_of_delta = delta.wrapping_sub(self.prev_timestamp_delta);

        if delta_of_delta == 0 {
            self.writer.write_bit(false);
        } else if (-63..=64).contains(&delta_of_delta) {
            self.writer.write_bits(0b10, 2);
            self.writer.write_bits((delta_of_delta + 63) as u64, 7);
        } else if (-255..=256).contains(&delta_of_delta) {
            self.writer.write_bits(0b110, 3);
            self.writer.write_bits((delta_of_delta + 255) as u64, 9);
        } else if (-2047..=2048).contains(&delta_of_delta) {
            self.writer.write_bits(0b1110, 4);
            self.writer.write_bits((delta_of_delta + 2047) as u64, 12);
        } else {
            self.writer.write_bits(0b1111, 4);
            self.writer.write_bits(delta_of_delta as u64, 64);
        }

        self.prev_timestamp_delta = delta;
        self.prev_timestamp = timestamp;
    }

    fn encode_value(&mut self, value: f64) {
        let value_bits = value.to_bits();
        let xor = value_bits ^ self.prev_value_bits;

        if xor == 0 {
            self.writer.write_bit(false);
        } else {
            self.writer.write_bit(true);

            // 5-bit field, so the window never starts past bit 31
            let leading_zeros = xor.leading_zeros().min(31);
            let trailing_zeros = xor.trailing_zeros();

            if leading_zeros >= self.prev_leading_zeros
                && trailing_zeros >= self.prev_trailing_zeros
            {
                self.writer.write_bit(false);
                let meaningful_bits = 64 - self.prev_leading_zeros - self.prev_trailing_zeros;
                let shifted = xor >> self.prev_trailing_zeros;
                self.writer.write_bits(shifted, meaningful_bits as usize);
            } else {
                self.writer.write_bit(true);
                self.writer.write_bits(leading_zeros as u64, 5);

                // 64 meaningful bits is stored as 0
                let meaningful_bits = 64 - leading_zeros - trailing_zeros;
                self.writer.write_bits((meaningful_bits & 0x3F) as u64, 6);

                let shifted = xor >> trailing_zeros;
                self.writer.write_bits(shifted, meaningful_bits as usize);

                self.prev_leading_zeros = leading_zeros;
                self.prev_trailing_zeros = trailing_zeros;
            }
        }

        self.prev_value_bits = value_bits;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoder_single_point() {
        let mut encoder = GorillaEncoder::new();
        encoder.encode(Sample::new(1_000_000_000, 23.5));

        assert_eq!(encoder.count(), 1);
        assert_eq!(encoder.first_timestamp(), 1_000_000_000);
        assert_eq!(encoder.last_timestamp(), 1_000_000_000);
        assert_eq!(encoder.size_bytes(), 16);
    }

    #[test]
    fn test_encoder_constant_delta() {
        let mut encoder = GorillaEncoder::new();

        for i in 0..100u64 {
            encoder.encode(Sample::new(1_000_000 + i * 10_000, 23.5));
        }

        assert_eq!(encoder.count(), 100);

        // Constant delta and value: ~2 bits per point after the header
        let bytes_per_point = encoder.size_bytes() as f64 / 100.0;
        assert!(
            bytes_per_point < 2.0,
            "Expected < 2 bytes/point for constant data, got {}",
            bytes_per_point
        );
    }

    #[test]
    fn test_encoder_growth_stays_under_worst_case() {
        let mut encoder = GorillaEncoder::new();
        encoder.encode(Sample::new(0, 0.0));

        let mut ts = 0u64;
        for i in 1..200u64 {
            let before = encoder.bit_len();
            ts += i * i * 977;
            encoder.encode(Sample::new(ts, (i as f64).sqrt() * -1.0e17));
            assert!(encoder.bit_len() - before <= MAX_SAMPLE_BITS);
        }
    }
}
