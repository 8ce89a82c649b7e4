//! Single-sided magnitude spectrum using rustfft.
//!
//! For an N-sample window the result has `N/2 + 1` bins at `k * fs / N`.
//! Amplitudes are scaled by `2/N` except DC and, for even N, the Nyquist bin,
//! which have no mirrored counterpart and are scaled by `1/N`.

use rustfft::num_complex::Complex64;
use rustfft::{Fft, FftPlanner};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::VibrationError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectrumResult {
    /// Bin frequencies in Hz, ascending.
    pub freqs: Vec<f64>,
    /// Per-axis magnitude for each bin, same length as `freqs`.
    pub amps: Vec<[f64; 3]>,
}

impl SpectrumResult {
    pub fn len(&self) -> usize {
        self.freqs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.freqs.is_empty()
    }

    pub fn resolution(&self) -> f64 {
        if self.freqs.len() > 1 { self.freqs[1] - self.freqs[0] } else { 0.0 }
    }

    /// Frequency of the largest magnitude across all axes.
    pub fn peak_frequency(&self) -> Option<f64> {
        self.freqs
            .iter()
            .zip(self.amps.iter())
            .map(|(&f, a)| (f, a[0].max(a[1]).max(a[2])))
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(f, _)| f)
    }

    /// Index and magnitude of the largest bin on one axis.
    pub fn axis_peak(&self, axis: usize) -> Option<(usize, f64)> {
        self.amps
            .iter()
            .map(|a| a[axis])
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(&b.1))
    }
}

/// Caches FFT plans by window length.
pub struct SpectrumAnalyzer {
    planner: FftPlanner<f64>,
    plans: HashMap<usize, Arc<dyn Fft<f64>>>,
}

impl SpectrumAnalyzer {
    pub fn new() -> Self {
        SpectrumAnalyzer {
            planner: FftPlanner::new(),
            plans: HashMap::new(),
        }
    }

    fn plan(&mut self, n: usize) -> Arc<dyn Fft<f64>> {
        let planner = &mut self.planner;
        self.plans
            .entry(n)
            .or_insert_with(|| planner.plan_fft_forward(n))
            .clone()
    }

    pub fn fft_magnitude(&mut self, signal: &[[f64; 3]], fs: f64) -> Result<SpectrumResult, VibrationError> {
        let n = signal.len();
        if n == 0 {
            return Err(VibrationError::InsufficientData { needed: 1, available: 0 });
        }

        let fft = self.plan(n);
        let bins = n / 2 + 1;
        let nf = n as f64;

        let freqs: Vec<f64> = (0..bins).map(|k| k as f64 * fs / nf).collect();
        let mut amps = vec![[0.0; 3]; bins];

        let mut buffer = vec![Complex64::new(0.0, 0.0); n];
        for axis in 0..3 {
            for (b, s) in buffer.iter_mut().zip(signal) {
                *b = Complex64::new(s[axis], 0.0);
            }
            fft.process(&mut buffer);

            for (k, amp) in amps.iter_mut().enumerate() {
                let unmirrored = k == 0 || (n % 2 == 0 && k == n / 2);
                let scale = if unmirrored { 1.0 / nf } else { 2.0 / nf };
                amp[axis] = buffer[k].norm() * scale;
            }
        }

        Ok(SpectrumResult { freqs, amps })
    }
}

impl Default for SpectrumAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

/// One-shot helper that plans its own FFT.
pub fn fft_magnitude(signal: &[[f64; 3]], fs: f64) -> Result<SpectrumResult, VibrationError> {
    SpectrumAnalyzer::new().fft_magnitude(signal, fs)
}
