//! Wire codec for accelerometer datagrams.
//!
//! Layout (little-endian):
//!
//! ```text
//! offset 0: u16 sequence
//! offset 2: u16 count          // number of (x, y, z) triplets
//! offset 4: count * (i16 x, i16 y, i16 z)
//! ```

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};
use std::io::Cursor;

use crate::error::{PacketFault, VibrationError};

pub const HEADER_SIZE: usize = 4;
pub const SAMPLE_SIZE: usize = 6;

/// ADXL345 in +/-4g full resolution mode.
pub const LSB_TO_G: f64 = 0.0078;
pub const G_TO_MS2: f64 = 9.80665;
pub const SAMPLE_RATE_HZ: f64 = 800.0;

/// Batch size the sensing node firmware sends per datagram.
pub const NODE_BATCH_SIZE: u16 = 16;

/// Size of the largest datagram `decode` accepts for a given `max_batch`.
pub fn max_datagram_len(max_batch: u16) -> usize {
    HEADER_SIZE + max_batch as usize * SAMPLE_SIZE
}

/// One raw accelerometer reading in LSB counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Sample {
    pub x: i16,
    pub y: i16,
    pub z: i16,
}

impl Sample {
    pub fn new(x: i16, y: i16, z: i16) -> Self {
        Sample { x, y, z }
    }

    pub fn axes(&self) -> [i16; 3] {
        [self.x, self.y, self.z]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleBatch {
    pub sequence: u16,
    pub count: u16,
    pub samples: Vec<Sample>,
}

impl SampleBatch {
    /// Build a batch whose declared count matches `samples`.
    /// Anything past `u16::MAX` samples is dropped.
    pub fn new(sequence: u16, mut samples: Vec<Sample>) -> Self {
        samples.truncate(u16::MAX as usize);
        let count = samples.len() as u16;
        SampleBatch { sequence, count, samples }
    }

    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.samples.len() * SAMPLE_SIZE
    }
}

/// Decode one datagram. `max_batch` bounds the declared count.
pub fn decode(buf: &[u8], max_batch: u16) -> Result<SampleBatch, VibrationError> {
    if buf.len() < HEADER_SIZE {
        return Err(PacketFault::TooShort { len: buf.len() }.into());
    }

    let mut rdr = Cursor::new(buf);
    // Length was checked above, header reads cannot fail
    let sequence = rdr.read_u16::<LittleEndian>().unwrap_or_default();
    let count = rdr.read_u16::<LittleEndian>().unwrap_or_default();

    if count == 0 {
        return Err(PacketFault::EmptyBatch.into());
    }
    if count > max_batch {
        return Err(PacketFault::CountTooLarge { count, max: max_batch }.into());
    }

    let expected = HEADER_SIZE + count as usize * SAMPLE_SIZE;
    if buf.len() != expected {
        return Err(PacketFault::LengthMismatch { expected, actual: buf.len() }.into());
    }

    let mut samples = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let x = rdr.read_i16::<LittleEndian>();
        let y = rdr.read_i16::<LittleEndian>();
        let z = rdr.read_i16::<LittleEndian>();
        match (x, y, z) {
            (Ok(x), Ok(y), Ok(z)) => samples.push(Sample { x, y, z }),
            _ => return Err(PacketFault::LengthMismatch { expected, actual: buf.len() }.into()),
        }
    }

    Ok(SampleBatch { sequence, count, samples })
}

pub fn encode(batch: &SampleBatch) -> Vec<u8> {
    let mut buf = Vec::with_capacity(batch.encoded_len());
    // Writes into a Vec are infallible
    let _ = buf.write_u16::<LittleEndian>(batch.sequence);
    let _ = buf.write_u16::<LittleEndian>(batch.count);
    for s in &batch.samples {
        let _ = buf.write_i16::<LittleEndian>(s.x);
        let _ = buf.write_i16::<LittleEndian>(s.y);
        let _ = buf.write_i16::<LittleEndian>(s.z);
    }
    buf
}
