use serde::{Deserialize, Serialize};

use crate::calibration::CalibrationState;
use crate::health::HealthState;
use crate::metrics::IsoZone;
use crate::spectrum::SpectrumResult;

/// One velocity sample in mm/s, stamped with stream time.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct VelocitySample {
    /// Seconds since the first accepted sample (`sample_index / fs`)
    pub t: f64,
    pub v: [f64; 3],
}

/// Cumulative counters since start-up.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub batches_accepted: u64,
    pub malformed_datagrams: u64,
    pub sequence_gaps: u64,
    pub missing_packets: u64,
    pub samples_processed: u64,
}

/// Owned copy of the pipeline state handed to consumers.
///
/// Consumers (dashboards, loggers) read these and never touch the pipeline
/// internals. Everything here is a copy taken under the pipeline lock.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PipelineSnapshot {
    // ========================================================================
    // Signal buffers
    // ========================================================================
    /// Most recent velocity samples, oldest first
    pub velocity_window: Vec<VelocitySample>,

    /// Acceleration vector magnitude (m/s^2) per sample, oldest first
    pub accel_magnitude: Vec<f64>,

    /// One RMS value (mm/s) per processed batch, oldest first
    pub rms_history: Vec<f64>,

    // ========================================================================
    // Derived metrics
    // ========================================================================
    pub latest_spectrum: Option<SpectrumResult>,
    pub latest_rms: Option<f64>,
    pub peak_frequency: Option<f64>,

    /// Zone of `latest_rms` for the configured machine group
    pub iso_zone: Option<IsoZone>,

    // ========================================================================
    // Component state
    // ========================================================================
    pub link: HealthState,
    pub calibration: CalibrationState,
    /// Offset currently subtracted from velocity (mm/s), if any
    pub calibration_offset: Option<[f64; 3]>,
    /// Per-axis Kalman bias estimate (m/s^2)
    pub kalman_bias: Option<[f64; 3]>,

    pub stats: PipelineStats,

    /// Wall-clock time of the last processed batch (Unix ms)
    pub updated_ms: i64,
    /// Increments on every processed batch
    pub generation: u64,
}

impl Default for PipelineSnapshot {
    fn default() -> Self {
        PipelineSnapshot {
            velocity_window: Vec::new(),
            accel_magnitude: Vec::new(),
            rms_history: Vec::new(),

            latest_spectrum: None,
            latest_rms: None,
            peak_frequency: None,
            iso_zone: None,

            link: HealthState::Nominal,
            calibration: CalibrationState::Idle,
            calibration_offset: None,
            kalman_bias: None,

            stats: PipelineStats::default(),
            updated_ms: 0,
            generation: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_default() {
        let snap = PipelineSnapshot::default();
        assert!(snap.velocity_window.is_empty());
        assert!(snap.latest_spectrum.is_none());
        assert_eq!(snap.link, HealthState::Nominal);
        assert_eq!(snap.calibration, CalibrationState::Idle);
        assert_eq!(snap.stats, PipelineStats::default());
        assert_eq!(snap.generation, 0);
    }

    #[test]
    fn test_snapshot_serde_roundtrip() {
        let mut snap = PipelineSnapshot::default();
        snap.velocity_window.push(VelocitySample { t: 0.5, v: [1.0, -2.0, 0.25] });
        snap.latest_rms = Some(3.2);
        snap.iso_zone = Some(IsoZone::B);
        snap.link = HealthState::Stale;
        snap.stats.sequence_gaps = 4;
        snap.latest_spectrum = Some(SpectrumResult {
            freqs: vec![0.0, 400.0],
            amps: vec![[0.1, 0.2, 0.3], [0.0, 0.0, 0.0]],
        });

        let json = serde_json::to_string(&snap).expect("serialize failed");
        let restored: PipelineSnapshot = serde_json::from_str(&json).expect("deserialize failed");

        assert_eq!(restored.velocity_window, snap.velocity_window);
        assert_eq!(restored.iso_zone, Some(IsoZone::B));
        assert_eq!(restored.link, HealthState::Stale);
        assert_eq!(restored.stats.sequence_gaps, 4);
        assert!((restored.latest_rms.unwrap() - 3.2).abs() < f64::EPSILON);
        assert_eq!(restored.latest_spectrum, snap.latest_spectrum);
    }
}
