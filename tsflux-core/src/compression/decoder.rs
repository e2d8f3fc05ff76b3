//! Gorilla decoder for time-series decompression

use super::bitstream::BitReader;
use crate::{Result, Sample, Timestamp, TsError};

/// Gorilla decoder for time-series data
pub struct GorillaDecoder<'a> {
    reader: BitReader<'a>,
    count: usize,
    decoded: usize,

    // Timestamp state
    prev_timestamp: Timestamp,
    prev_timestamp_delta: i64,

    // Value state
    prev_value_bits: u64,
    prev_leading_zeros: u32,
    prev_trailing_zeros: u32,
}

fn unexpected_end() -> TsError {
    TsError::Compression("Unexpected end of data".into())
}

impl<'a> GorillaDecoder<'a> {
    /// Create a decoder over `count` encoded samples
    pub fn new(data: &'a [u8], count: usize) -> Self {
        Self {
            reader: BitReader::new(data),
            count,
            decoded: 0,
            prev_timestamp: 0,
            prev_timestamp_delta: 0,
            prev_value_bits: 0,
            prev_leading_zeros: 0,
            prev_trailing_zeros: 0,
        }
    }

    /// Decode all remaining samples
    pub fn decode_all(&mut self) -> Result<Vec<Sample>> {
        let mut samples = Vec::with_capacity(self.count - self.decoded);

        while let Some(sample) = self.decode_next()? {
            samples.push(sample);
        }

        Ok(samples)
    }

    /// Decode the next sample
    pub fn decode_next(&mut self) -> Result<Option<Sample>> {
        if self.decoded >= self.count {
            return Ok(None);
        }

        if self.decoded == 0 {
            return self.decode_first().map(Some);
        }

        let timestamp = self.decode_timestamp()?;
        let value = self.decode_value()?;
        self.decoded += 1;

        Ok(Some(Sample::new(timestamp, value)))
    }

    fn read_bit(&mut self) -> Result<bool> {
        self.reader.read_bit().ok_or_else(unexpected_end)
    }

    fn read_bits(&mut self, num_bits: usize) -> Result<u64> {
        self.reader.read_bits(num_bits).ok_or_else(unexpected_end)
    }

    fn decode_first(&mut self) -> Result<Sample> {
        let timestamp = self.read_bits(64)?;
        let value_bits = self.read_bits(64)?;

        self.prev_timestamp = timestamp;
        self.prev_value_bits = value_bits;
        self.decoded = 1;

        Ok(Sample::new(timestamp, f64::from_bits(value_bits)))
    }

    fn decode_timestamp(&mut self) -> Result<Timestamp> {
        let delta_of_delta = if !self.read_bit()? {
            0
        } else if !self.read_bit()? {
            self.read_bits(7)? as i64 - 63
        } else if !self.read_bit()? {
            self.read_bits(9)? as i64 - 255
        } else if !self.read_bit()? {
            self.read_bits(12)? as i64 - 2047
        } else {
            self.read_bits(64)? as i64
        };

        let delta = self.prev_timestamp_delta.wrapping_add(delta_of_delta);
        let timestamp = self.prev_timestamp.wrapping_add(delta as u64);

        self.prev_timestamp_delta = delta;
        self.prev_timestamp = timestamp;

        Ok(timestamp)
    }

    fn decode_value(&mut self) -> Result<f64> {
        if !self.read_bit()? {
            return Ok(f64::from_bits(self.prev_value_bits));
        }

        let (leading_zeros, meaningful_bits) = if !self.read_bit()? {
            let meaningful_bits = 64 - self.prev_leading_zeros - self.prev_trailing_zeros;
            (self.prev_leading_zeros, meaningful_bits)
        } else {
            let leading = self.read_bits(5)? as u32;
            let meaningful = match self.read_bits(6)? as u32 {
                0 => 64,
                n => n,
            };
            if leading + meaningful > 64 {
                return Err(TsError::Compression(format!(
                    "Invalid value window: {} leading, {} meaningful",
                    leading, meaningful
                )));
            }

            self.prev_leading_zeros = leading;
            self.prev_trailing_zeros = 64 - leading - meaningful;

            (leading, meaningful)
        };

        let meaningful_value = self.read_bits(meaningful_bits as usize)?;
        let trailing_zeros = 64 - leading_zeros - meaningful_bits;
        let value_bits = self.prev_value_bits ^ (meaningful_value << trailing_zeros);

        self.prev_value_bits = value_bits;

        Ok(f64::from_bits(value_bits))
    }
}

impl Iterator for GorillaDecoder<'_> {
    type Item = Result<Sample>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.decode_next() {
            Ok(Some(sample)) => Some(Ok(sample)),
            Ok(None) => None,
            Err(e) => {
                // Stop after the first error
                self.decoded = self.count;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::GorillaEncoder;

    #[test]
    fn test_decode_irregular_series() {
        let mut encoder = GorillaEncoder::new();

        let mut ts = 5u64;
        let samples: Vec<Sample> = (0..500u64)
            .map(|i| {
                ts += match i % 4 {
                    0 => 1,
                    1 => 200,
                    2 => 3_000,
                    _ => 9_000_000_000,
                };
                Sample::new(ts, (i as f64 * 0.37).sin() * 1.0e6 - i as f64)
            })
            .collect();

        for sample in &samples {
            encoder.encode(*sample);
        }

        let mut decoder = GorillaDecoder::new(encoder.as_bytes(), encoder.count());
        let decoded = decoder.decode_all().unwrap();
        assert_eq!(decoded, samples);
    }

    #[test]
    fn test_decode_special_values() {
        let mut encoder = GorillaEncoder::new();
        let values = [0.0, -0.0, f64::MAX, f64::MIN_POSITIVE, 1.0, f64::INFINITY, 42.0, 42.0];
        for (i, v) in values.iter().enumerate() {
            encoder.encode(Sample::new(u64::MAX - 100 + i as u64, *v));
        }

        let decoded: Vec<Sample> = GorillaDecoder::new(encoder.as_bytes(), encoder.count())
            .collect::<Result<_>>()
            .unwrap();
        let bits: Vec<u64> = decoded.iter().map(|s| s.value.to_bits()).collect();
        let expected: Vec<u64> = values.iter().map(|v| v.to_bits()).collect();
        assert_eq!(bits, expected);
        assert_eq!(decoded[0].timestamp, u64::MAX - 100);
    }

    #[test]
    fn test_truncated_stream_is_an_error() {
        let mut encoder = GorillaEncoder::new();
        encoder.encode(Sample::new(1, 1.0));
        encoder.encode(Sample::new(2, 2.0));

        let bytes = &encoder.as_bytes()[..10];
        let mut decoder = GorillaDecoder::new(bytes, 2);
        assert!(matches!(decoder.next(), Some(Err(TsError::Compression(_)))));
        assert!(decoder.next().is_none());
    }
}
