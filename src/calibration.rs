use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::VibrationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CalibrationState {
    Idle,
    Capturing,
    Complete,
}

/// Captures a fixed-length velocity window and yields its mean as an offset.
#[derive(Debug)]
pub struct CalibrationUnit {
    required: usize,
    samples: Vec<[f64; 3]>,
    state: CalibrationState,
}

impl CalibrationUnit {
    pub fn new(duration_s: f64, sample_rate_hz: f64) -> Self {
        let required = (duration_s * sample_rate_hz).round().max(1.0) as usize;
        CalibrationUnit {
            required,
            samples: Vec::with_capacity(required),
            state: CalibrationState::Idle,
        }
    }

    pub fn state(&self) -> CalibrationState {
        self.state
    }

    pub fn required(&self) -> usize {
        self.required
    }

    pub fn captured(&self) -> usize {
        self.samples.len()
    }

    pub fn is_capturing(&self) -> bool {
        self.state == CalibrationState::Capturing
    }

    pub fn is_complete(&self) -> bool {
        self.state == CalibrationState::Complete
    }

    pub fn start_capture(&mut self) {
        self.samples.clear();
        self.state = CalibrationState::Capturing;
        info!("[Calibration] Capturing {} samples...", self.required);
    }

    /// Append a sample while capturing. Ignored in any other state.
    pub fn add_sample(&mut self, v: [f64; 3]) {
        if self.state != CalibrationState::Capturing {
            return;
        }
        self.samples.push(v);
        if self.samples.len() >= self.required {
            self.state = CalibrationState::Complete;
            debug!("[Calibration] Window full ({} samples)", self.samples.len());
        }
    }

    /// Captured window, for diagnostics before the offset is consumed.
    pub fn window(&self) -> &[[f64; 3]] {
        &self.samples
    }

    /// Mean of the captured window. Resets the unit to `Idle`.
    pub fn compute_offset(&mut self) -> Result<[f64; 3], VibrationError> {
        if self.state != CalibrationState::Complete {
            return Err(VibrationError::CalibrationIncomplete {
                captured: self.samples.len(),
                required: self.required,
            });
        }

        let n = self.samples.len() as f64;
        let mut sum = [0.0; 3];
        for s in &self.samples {
            for axis in 0..3 {
                sum[axis] += s[axis];
            }
        }
        let offset = [sum[0] / n, sum[1] / n, sum[2] / n];

        self.samples.clear();
        self.state = CalibrationState::Idle;
        Ok(offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_required_samples_from_duration() {
        let cal = CalibrationUnit::new(2.0, 800.0);
        assert_eq!(cal.required(), 1600);
        assert_eq!(cal.state(), CalibrationState::Idle);
    }

    #[test]
    fn test_samples_ignored_when_idle() {
        let mut cal = CalibrationUnit::new(0.01, 800.0);
        cal.add_sample([1.0, 2.0, 3.0]);
        assert_eq!(cal.captured(), 0);
        assert_eq!(cal.state(), CalibrationState::Idle);
    }

    #[test]
    fn test_offset_before_completion_fails() {
        let mut cal = CalibrationUnit::new(0.01, 800.0); // 8 samples
        assert_eq!(
            cal.compute_offset(),
            Err(VibrationError::CalibrationIncomplete { captured: 0, required: 8 })
        );

        cal.start_capture();
        for _ in 0..7 {
            cal.add_sample([1.0, 1.0, 1.0]);
        }
        assert!(cal.is_capturing());
        assert_eq!(
            cal.compute_offset(),
            Err(VibrationError::CalibrationIncomplete { captured: 7, required: 8 })
        );
    }

    #[test]
    fn test_exact_window_completes_and_offset_is_mean() {
        let mut cal = CalibrationUnit::new(0.01, 800.0);
        cal.start_capture();
        for i in 0..8 {
            cal.add_sample([i as f64, 2.0 * i as f64, -1.0]);
        }
        assert!(cal.is_complete());

        // intake stops once complete
        cal.add_sample([100.0, 100.0, 100.0]);
        assert_eq!(cal.captured(), 8);

        let offset = cal.compute_offset().unwrap();
        assert_relative_eq!(offset[0], 3.5);
        assert_relative_eq!(offset[1], 7.0);
        assert_relative_eq!(offset[2], -1.0);

        assert_eq!(cal.state(), CalibrationState::Idle);
        assert_eq!(cal.captured(), 0);
    }

    #[test]
    fn test_restart_clears_previous_window() {
        let mut cal = CalibrationUnit::new(0.01, 800.0);
        cal.start_capture();
        for _ in 0..5 {
            cal.add_sample([9.0, 9.0, 9.0]);
        }
        cal.start_capture();
        assert_eq!(cal.captured(), 0);
        assert!(cal.is_capturing());
    }
}
