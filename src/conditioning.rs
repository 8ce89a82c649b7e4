//! Spectral preparation: Butterworth bandpass (zero-phase) and Hann window.
//!
//! The bandpass is designed digitally from the analog Butterworth prototype:
//! 1. Prototype poles on the left half of the unit circle
//! 2. Lowpass-to-bandpass transform around the pre-warped band edges
//! 3. Bilinear transform into the z-plane
//! 4. Conjugate poles grouped into second-order sections (biquads)
//!
//! Filtering runs forward then backward over an odd-extended copy of the
//! signal, each pass starting from the steady-state of its first sample, so
//! the result has no phase shift and minimal edge transients.

use log::debug;
use rustfft::num_complex::Complex64;
use std::f64::consts::PI;

use crate::error::VibrationError;

pub const DEFAULT_FMIN_HZ: f64 = 5.0;
pub const DEFAULT_FMAX_HZ: f64 = 400.0;
pub const DEFAULT_ORDER: usize = 4;

// fmax at or above Nyquist is pulled just under it
const NYQUIST_CLAMP: f64 = 0.999;
const REAL_POLE_TOL: f64 = 1e-12;

/// One second-order section, `a[0] == 1`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Biquad {
    b: [f64; 3],
    a: [f64; 3],
}

impl Biquad {
    fn from_poles(p1: Complex64, p2: Complex64, b: [f64; 3]) -> Self {
        let sum = p1 + p2;
        let prod = p1 * p2;
        Biquad {
            b,
            a: [1.0, -sum.re, prod.re],
        }
    }

    fn dc_gain(&self) -> f64 {
        (self.b[0] + self.b[1] + self.b[2]) / (self.a[0] + self.a[1] + self.a[2])
    }
}

#[derive(Debug, Clone)]
pub struct ButterworthBandpass {
    sections: Vec<Biquad>,
    low_hz: f64,
    high_hz: f64,
}

impl ButterworthBandpass {
    pub fn design(fs: f64, fmin: f64, fmax: f64, order: usize) -> Result<Self, VibrationError> {
        let nyq = 0.5 * fs;
        let fmax = if fmax >= nyq { nyq * NYQUIST_CLAMP } else { fmax };

        let low = fmin / nyq;
        let high = fmax / nyq;
        if !(low > 0.0 && low < high && high < 1.0) || order == 0 {
            return Err(VibrationError::InvalidFilterBand { fmin, fmax, nyquist: nyq });
        }

        // Work at a normalised sample rate of 2 (Nyquist = 1)
        let fs2 = 4.0;
        let wl = fs2 * (PI * low / 2.0).tan();
        let wh = fs2 * (PI * high / 2.0).tan();
        let bw = wh - wl;
        let w0_sq = wl * wh;

        let n = order as i32;
        let mut analog_poles = Vec::with_capacity(2 * order);
        for k in 0..n {
            let m = (2 * k - n + 1) as f64;
            let proto = -Complex64::from_polar(1.0, PI * m / (2.0 * n as f64));
            let half = proto * (bw / 2.0);
            let disc = (half * half - w0_sq).sqrt();
            analog_poles.push(half + disc);
            analog_poles.push(half - disc);
        }

        // Bilinear transform. Zeros: `order` at s=0 -> z=1, `order` at s=inf -> z=-1.
        let fs2c = Complex64::new(fs2, 0.0);
        let digital_poles: Vec<Complex64> = analog_poles
            .iter()
            .map(|&p| (fs2c + p) / (fs2c - p))
            .collect();
        let denom = analog_poles
            .iter()
            .fold(Complex64::new(1.0, 0.0), |acc, &p| acc * (fs2c - p));
        // Poles come in conjugate pairs, so the ratio is real
        let gain = (Complex64::new((bw * fs2).powi(n), 0.0) / denom).re;

        let sections = group_sections(&digital_poles, gain);
        debug!(
            "[Bandpass] order={} band={:.2}-{:.2}Hz sections={}",
            order, fmin, fmax, sections.len()
        );

        Ok(ButterworthBandpass {
            sections,
            low_hz: fmin,
            high_hz: fmax,
        })
    }

    pub fn band(&self) -> (f64, f64) {
        (self.low_hz, self.high_hz)
    }

    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    /// Zero-phase filtering of a single channel.
    pub fn filtfilt(&self, x: &[f64]) -> Vec<f64> {
        if x.is_empty() {
            return Vec::new();
        }

        let ntaps = 2 * self.sections.len() + 1;
        let padlen = (3 * ntaps).min(x.len() - 1);
        let ext = odd_extend(x, padlen);
        let zi = self.steady_state();

        let mut y = self.run(&ext, &zi, ext[0]);
        y.reverse();
        let y0 = y[0];
        let mut y = self.run(&y, &zi, y0);
        y.reverse();

        y[padlen..padlen + x.len()].to_vec()
    }

    /// Filter each axis independently.
    pub fn apply(&self, signal: &[[f64; 3]]) -> Vec<[f64; 3]> {
        let mut out = vec![[0.0; 3]; signal.len()];
        for axis in 0..3 {
            let channel: Vec<f64> = signal.iter().map(|s| s[axis]).collect();
            for (o, v) in out.iter_mut().zip(self.filtfilt(&channel)) {
                o[axis] = v;
            }
        }
        out
    }

    /// Per-section transposed direct-form II state for a unit step input.
    fn steady_state(&self) -> Vec<[f64; 2]> {
        let mut scale = 1.0;
        let mut zi = Vec::with_capacity(self.sections.len());
        for s in &self.sections {
            let g = s.dc_gain();
            let z1 = s.b[2] - s.a[2] * g;
            let z0 = g - s.b[0];
            zi.push([z0 * scale, z1 * scale]);
            scale *= g;
        }
        zi
    }

    fn run(&self, x: &[f64], zi: &[[f64; 2]], x0: f64) -> Vec<f64> {
        let mut state: Vec<[f64; 2]> = zi.iter().map(|z| [z[0] * x0, z[1] * x0]).collect();
        x.iter()
            .map(|&input| {
                let mut v = input;
                for (s, z) in self.sections.iter().zip(state.iter_mut()) {
                    let y = s.b[0] * v + z[0];
                    z[0] = s.b[1] * v - s.a[1] * y + z[1];
                    z[1] = s.b[2] * v - s.a[2] * y;
                    v = y;
                }
                v
            })
            .collect()
    }
}

fn group_sections(poles: &[Complex64], gain: f64) -> Vec<Biquad> {
    // Every section carries one zero at z=1 and one at z=-1
    let numerator = [1.0, 0.0, -1.0];

    let mut sections = Vec::with_capacity(poles.len() / 2);
    let mut real: Vec<f64> = Vec::new();
    for &p in poles {
        if p.im > REAL_POLE_TOL {
            sections.push(Biquad::from_poles(p, p.conj(), numerator));
        } else if p.im.abs() <= REAL_POLE_TOL {
            real.push(p.re);
        }
    }
    real.sort_by(|a, b| a.total_cmp(b));
    for pair in real.chunks(2) {
        let p1 = Complex64::new(pair[0], 0.0);
        let p2 = Complex64::new(*pair.get(1).unwrap_or(&0.0), 0.0);
        sections.push(Biquad::from_poles(p1, p2, numerator));
    }

    if let Some(first) = sections.first_mut() {
        for c in first.b.iter_mut() {
            *c *= gain;
        }
    }
    sections
}

fn odd_extend(x: &[f64], padlen: usize) -> Vec<f64> {
    let n = x.len();
    let first = x[0];
    let last = x[n - 1];
    let mut ext = Vec::with_capacity(n + 2 * padlen);
    for i in (1..=padlen).rev() {
        ext.push(2.0 * first - x[i]);
    }
    ext.extend_from_slice(x);
    for i in 1..=padlen {
        ext.push(2.0 * last - x[n - 1 - i]);
    }
    ext
}

/// Design and apply a bandpass in one call.
pub fn bandpass(
    signal: &[[f64; 3]],
    fs: f64,
    fmin: f64,
    fmax: f64,
    order: usize,
) -> Result<Vec<[f64; 3]>, VibrationError> {
    let filter = ButterworthBandpass::design(fs, fmin, fmax, order)?;
    Ok(filter.apply(signal))
}

/// Periodic Hann taper, `0.5 - 0.5 cos(2 pi k / N)`, applied per axis.
pub fn hann_window(signal: &[[f64; 3]]) -> Vec<[f64; 3]> {
    let n = signal.len() as f64;
    signal
        .iter()
        .enumerate()
        .map(|(k, s)| {
            let w = 0.5 - 0.5 * (2.0 * PI * k as f64 / n).cos();
            [s[0] * w, s[1] * w, s[2] * w]
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn tone(freq: f64, fs: f64, n: usize) -> Vec<f64> {
        (0..n).map(|i| (2.0 * PI * freq * i as f64 / fs).sin()).collect()
    }

    fn rms(x: &[f64]) -> f64 {
        (x.iter().map(|v| v * v).sum::<f64>() / x.len() as f64).sqrt()
    }

    #[test]
    fn test_invalid_bands_rejected() {
        assert!(matches!(
            ButterworthBandpass::design(800.0, 0.0, 100.0, 4),
            Err(VibrationError::InvalidFilterBand { .. })
        ));
        assert!(matches!(
            ButterworthBandpass::design(800.0, 200.0, 100.0, 4),
            Err(VibrationError::InvalidFilterBand { .. })
        ));
        assert!(matches!(
            ButterworthBandpass::design(800.0, 450.0, 500.0, 4),
            Err(VibrationError::InvalidFilterBand { .. })
        ));
        assert!(matches!(
            ButterworthBandpass::design(0.0, 5.0, 400.0, 4),
            Err(VibrationError::InvalidFilterBand { .. })
        ));
    }

    #[test]
    fn test_fmax_at_nyquist_is_clamped() {
        let f = ButterworthBandpass::design(800.0, 5.0, 400.0, 4).unwrap();
        let (lo, hi) = f.band();
        assert_relative_eq!(lo, 5.0);
        assert_relative_eq!(hi, 399.6, epsilon = 1e-9);
    }

    #[test]
    fn test_sections_are_stable() {
        let f = ButterworthBandpass::design(800.0, 5.0, 400.0, 4).unwrap();
        assert_eq!(f.section_count(), 4);
        for s in &f.sections {
            // |p|^2 of the conjugate pair
            assert!(s.a[2] < 1.0 && s.a[2] > 0.0);
        }
    }

    #[test]
    fn test_passband_tone_preserved() {
        let fs = 800.0;
        let x = tone(50.0, fs, 1600);
        let f = ButterworthBandpass::design(fs, 20.0, 100.0, 4).unwrap();
        let y = f.filtfilt(&x);
        assert_eq!(y.len(), x.len());

        let mid = &y[400..1200];
        let ratio = rms(mid) / rms(&x[400..1200]);
        assert!((ratio - 1.0).abs() < 0.05, "passband ratio {}", ratio);
    }

    #[test]
    fn test_stopband_tone_attenuated() {
        let fs = 800.0;
        let x = tone(300.0, fs, 1600);
        let f = ButterworthBandpass::design(fs, 20.0, 100.0, 4).unwrap();
        let y = f.filtfilt(&x);
        assert!(rms(&y[400..1200]) < 0.02);
    }

    #[test]
    fn test_dc_removed() {
        let x = vec![3.0; 1024];
        let y = ButterworthBandpass::design(800.0, 5.0, 400.0, 4).unwrap().filtfilt(&x);
        assert!(y.iter().all(|v| v.abs() < 1e-6));
    }

    #[test]
    fn test_zero_phase() {
        let fs = 800.0;
        let x = tone(40.0, fs, 1600);
        let y = ButterworthBandpass::design(fs, 10.0, 150.0, 4).unwrap().filtfilt(&x);
        // Peak positions line up with the input
        let peak_in = (600..620).max_by(|&a, &b| x[a].total_cmp(&x[b])).unwrap();
        let peak_out = (600..620).max_by(|&a, &b| y[a].total_cmp(&y[b])).unwrap();
        assert_eq!(peak_in, peak_out);
    }

    #[test]
    fn test_apply_filters_each_axis() {
        let fs = 800.0;
        let x = tone(50.0, fs, 800);
        let signal: Vec<[f64; 3]> = x.iter().map(|&v| [v, 0.0, 2.0]).collect();
        let out = bandpass(&signal, fs, 20.0, 100.0, 4).unwrap();
        assert!(out[400][0].abs() > 0.0);
        assert!(out.iter().all(|s| s[1] == 0.0));
        assert!(out.iter().all(|s| s[2].abs() < 1e-6));
    }

    #[test]
    fn test_short_signal_does_not_panic() {
        let f = ButterworthBandpass::design(800.0, 5.0, 400.0, 4).unwrap();
        assert!(f.filtfilt(&[]).is_empty());
        assert_eq!(f.filtfilt(&[1.0]).len(), 1);
        assert_eq!(f.filtfilt(&[1.0, 2.0, 3.0]).len(), 3);
    }

    #[test]
    fn test_hann_window_shape() {
        let signal = vec![[1.0, 2.0, -1.0]; 8];
        let w = hann_window(&signal);
        assert_relative_eq!(w[0][0], 0.0);
        assert_relative_eq!(w[4][0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(w[4][1], 2.0, epsilon = 1e-12);
        assert_relative_eq!(w[2][2], -0.5, epsilon = 1e-12);
        assert_relative_eq!(w[6][0], w[2][0], epsilon = 1e-12);
    }
}
