//! Synthetic sensor node.
//!
//! Produces encoded datagrams with the same layout the node firmware sends:
//! a sine tone on every axis plus a fixed per-axis bias and Gaussian noise,
//! all in LSB counts.

use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;
use std::time::{Duration, Instant};

use crate::config::SimulatorConfig;
use crate::packet::{encode, Sample, SampleBatch};
use crate::traits::SampleSource;

pub struct SimulatedSource {
    config: SimulatorConfig,
    sample_rate_hz: f64,
    rng: StdRng,
    /// Sleep so batches arrive at the nominal sample rate
    paced: bool,
    next_due: Option<Instant>,
    seq: u16,
    sample_index: u64,
}

impl SimulatedSource {
    pub fn new(config: SimulatorConfig, sample_rate_hz: f64) -> Self {
        SimulatedSource {
            config,
            sample_rate_hz,
            rng: StdRng::from_os_rng(),
            paced: true,
            next_due: None,
            seq: 0,
            sample_index: 0,
        }
    }

    /// Unpaced and reproducible, for tests and offline runs.
    pub fn seeded(config: SimulatorConfig, sample_rate_hz: f64, seed: u64) -> Self {
        SimulatedSource {
            rng: StdRng::seed_from_u64(seed),
            paced: false,
            ..Self::new(config, sample_rate_hz)
        }
    }

    pub fn batch_period(&self) -> Duration {
        Duration::from_secs_f64(self.config.batch_size as f64 / self.sample_rate_hz)
    }

    fn gaussian(&mut self) -> f64 {
        // Box-Muller; u1 in (0, 1] keeps ln() finite
        let u1: f64 = 1.0 - self.rng.random::<f64>();
        let u2: f64 = self.rng.random();
        (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
    }

    fn to_count(v: f64) -> i16 {
        v.round().clamp(i16::MIN as f64, i16::MAX as f64) as i16
    }

    /// Build the next batch and advance the sequence counter.
    pub fn next_batch(&mut self) -> SampleBatch {
        if let Some(n) = self.config.drop_every.filter(|&n| n > 0) {
            if self.seq % n == n - 1 {
                self.seq = self.seq.wrapping_add(1);
            }
        }

        let cfg = &self.config;
        let (n, amp, freq, noise, bias) =
            (cfg.batch_size, cfg.amplitude_lsb, cfg.tone_hz, cfg.noise_lsb, cfg.bias_lsb);
        let mut samples = Vec::with_capacity(n as usize);

        for _ in 0..n {
            let t = self.sample_index as f64 / self.sample_rate_hz;
            let tone = amp * (2.0 * PI * freq * t).sin();
            let mut axes = [0i16; 3];
            for (axis, out) in axes.iter_mut().enumerate() {
                *out = Self::to_count(tone + bias[axis] + noise * self.gaussian());
            }
            samples.push(Sample::new(axes[0], axes[1], axes[2]));
            self.sample_index += 1;
        }

        let batch = SampleBatch::new(self.seq, samples);
        self.seq = self.seq.wrapping_add(1);
        batch
    }
}

impl SampleSource for SimulatedSource {
    fn setup(&mut self) -> Result<()> {
        log::info!(
            "Simulated node: {} Hz tone, {} LSB, batches of {} at {} Hz",
            self.config.tone_hz, self.config.amplitude_lsb, self.config.batch_size, self.sample_rate_hz
        );
        self.next_due = None;
        Ok(())
    }

    fn receive_batch(&mut self) -> Result<Option<Vec<u8>>> {
        if self.config.batch_size == 0 {
            return Ok(None);
        }

        if self.paced {
            let now = Instant::now();
            let due = self.next_due.unwrap_or(now);
            if due > now {
                std::thread::sleep(due - now);
            }
            self.next_due = Some(due + self.batch_period());
        }

        Ok(Some(encode(&self.next_batch())))
    }
}
