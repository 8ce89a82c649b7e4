use thiserror::Error;

/// Reasons a datagram fails to decode as a sample batch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PacketFault {
    #[error("datagram of {len} bytes is shorter than the 4-byte header")]
    TooShort { len: usize },

    #[error("declared count is zero")]
    EmptyBatch,

    #[error("declared count {count} exceeds maximum batch size {max}")]
    CountTooLarge { count: u16, max: u16 },

    #[error("length {actual} does not match 4 + 6*count = {expected}")]
    LengthMismatch { expected: usize, actual: usize },
}

/// Domain errors raised by the acquisition and analysis pipeline.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VibrationError {
    #[error("malformed packet: {0}")]
    MalformedPacket(#[from] PacketFault),

    #[error("calibration incomplete: {captured}/{required} samples captured")]
    CalibrationIncomplete { captured: usize, required: usize },

    #[error("invalid filter band: fmin={fmin}Hz fmax={fmax}Hz nyquist={nyquist}Hz")]
    InvalidFilterBand { fmin: f64, fmax: f64, nyquist: f64 },

    #[error("unknown ISO 10816 machine group: {0}")]
    UnknownGroup(String),

    #[error("insufficient data: need {needed}, have {available}")]
    InsufficientData { needed: usize, available: usize },
}
