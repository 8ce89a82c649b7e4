//! Per-datagram processing and the shared pipeline handle.
//!
//! A datagram goes through: decode, sequence check, LSB to m/s^2, Kalman
//! bias removal, trapezoidal integration to mm/s, calibration offset, then
//! the ring buffers and RMS. Once a full FFT window of velocity is buffered
//! the window is bandpassed, Hann-tapered and transformed.

use anyhow::Result;
use log::{debug, info, warn};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::calibration::CalibrationUnit;
use crate::conditioning::{hann_window, ButterworthBandpass};
use crate::config::{ResolvedAnalysis, SystemConfig};
use crate::error::VibrationError;
use crate::health::{HealthEvent, LinkHealthMonitor};
use crate::integration::{counts_to_ms2, integrate, to_mm_per_s, Scale};
use crate::kalman::TriAxisKalman;
use crate::metrics::{magnitude, offset_stats, rms, MachineGroup};
use crate::packet::{self, SampleBatch};
use crate::sequence::{SequenceGap, SequenceTracker};
use crate::spectrum::{SpectrumAnalyzer, SpectrumResult};
use crate::status::{PipelineSnapshot, PipelineStats, VelocitySample};

/// What happened to one accepted datagram.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestReport {
    pub sequence: u16,
    pub samples: usize,
    pub gap: Option<SequenceGap>,
    /// Set when this batch completed a calibration capture.
    pub calibrated: Option<[f64; 3]>,
}

pub struct Pipeline {
    // Fixed parameters
    fs: f64,
    scale: Scale,
    max_batch: u16,
    group: MachineGroup,
    filter: ButterworthBandpass,
    fft_window: usize,
    rms_window: usize,
    velocity_cap: usize,
    accel_cap: usize,
    rms_cap: usize,

    // Components
    sequence: SequenceTracker,
    health: LinkHealthMonitor,
    calibration: CalibrationUnit,
    kalman: Option<TriAxisKalman>,
    analyzer: SpectrumAnalyzer,
    offset: Option<[f64; 3]>,

    // Buffers and derived values
    velocity: VecDeque<VelocitySample>,
    accel_magnitude: VecDeque<f64>,
    rms_history: VecDeque<f64>,
    latest_spectrum: Option<SpectrumResult>,
    latest_rms: Option<f64>,
    peak_frequency: Option<f64>,

    stats: PipelineStats,
    sample_index: u64,
    updated_ms: i64,
    generation: u64,
}

impl Pipeline {
    pub fn new(config: &SystemConfig, resolved: ResolvedAnalysis) -> Self {
        let fs = config.sensor.sample_rate_hz;
        let a = &config.analysis;
        let k = &config.kalman;

        Pipeline {
            fs,
            scale: Scale {
                lsb_to_g: config.sensor.lsb_to_g,
                g_to_ms2: config.sensor.g_to_ms2,
            },
            max_batch: config.acquisition.max_batch,
            group: resolved.group,
            filter: resolved.filter,
            fft_window: a.fft_window,
            rms_window: a.rms_window,
            velocity_cap: a.velocity_history,
            accel_cap: a.accel_history,
            rms_cap: a.rms_history,

            sequence: SequenceTracker::new(),
            health: LinkHealthMonitor::new(Duration::from_millis(config.health.timeout_ms)),
            calibration: CalibrationUnit::new(config.calibration.duration_s, fs),
            kalman: k.enabled.then(|| TriAxisKalman::new(k.q_signal, k.q_bias, k.r_measure)),
            analyzer: SpectrumAnalyzer::new(),
            offset: None,

            velocity: VecDeque::with_capacity(a.velocity_history),
            accel_magnitude: VecDeque::with_capacity(a.accel_history),
            rms_history: VecDeque::with_capacity(a.rms_history),
            latest_spectrum: None,
            latest_rms: None,
            peak_frequency: None,

            stats: PipelineStats::default(),
            sample_index: 0,
            updated_ms: 0,
            generation: 0,
        }
    }

    /// Validate `config` and build a pipeline from it.
    pub fn from_config(config: &SystemConfig) -> Result<Self> {
        let resolved = config.validate()?;
        Ok(Self::new(config, resolved))
    }

    /// Decode and process one datagram received at `now`.
    ///
    /// Malformed datagrams are counted and rejected without touching any
    /// other state.
    pub fn ingest_datagram(&mut self, buf: &[u8], now: Instant) -> Result<IngestReport, VibrationError> {
        let batch = match packet::decode(buf, self.max_batch) {
            Ok(b) => b,
            Err(e) => {
                self.stats.malformed_datagrams += 1;
                warn!("[Pipeline] Dropping datagram ({} bytes): {}", buf.len(), e);
                return Err(e);
            }
        };

        self.health.record_arrival(now);
        let gap = self.sequence.observe(batch.sequence);
        self.stats.sequence_gaps = self.sequence.gap_count();
        self.stats.missing_packets = self.sequence.missing_count();

        let calibrated = self.process_batch(&batch);
        Ok(IngestReport {
            sequence: batch.sequence,
            samples: batch.samples.len(),
            gap,
            calibrated,
        })
    }

    fn process_batch(&mut self, batch: &SampleBatch) -> Option<[f64; 3]> {
        let dt = 1.0 / self.fs;

        let accel: Vec<[f64; 3]> = batch
            .samples
            .iter()
            .map(|s| counts_to_ms2(s, self.scale))
            .collect();
        for a in &accel {
            push_bounded(&mut self.accel_magnitude, magnitude(*a), self.accel_cap);
        }

        let corrected: Vec<[f64; 3]> = match self.kalman.as_mut() {
            Some(kf) => accel.iter().map(|&a| kf.update(a)).collect(),
            None => accel,
        };

        let mut vel = integrate(&corrected, dt);
        to_mm_per_s(&mut vel);

        let mut calibrated = None;
        for v in vel {
            if self.calibration.is_capturing() {
                self.calibration.add_sample(v);
                if self.calibration.is_complete() {
                    calibrated = self.finish_calibration();
                }
            }

            let v = match self.offset {
                Some(o) => [v[0] - o[0], v[1] - o[1], v[2] - o[2]],
                None => v,
            };
            let t = self.sample_index as f64 / self.fs;
            self.sample_index += 1;
            push_bounded(&mut self.velocity, VelocitySample { t, v }, self.velocity_cap);
        }

        let recent: Vec<f64> = self
            .velocity
            .iter()
            .rev()
            .take(self.rms_window)
            .map(|s| magnitude(s.v))
            .collect();
        let current = rms(&recent);
        self.latest_rms = Some(current);
        push_bounded(&mut self.rms_history, current, self.rms_cap);

        if self.velocity.len() >= self.fft_window {
            self.update_spectrum();
        }

        self.stats.batches_accepted += 1;
        self.stats.samples_processed += batch.samples.len() as u64;
        self.updated_ms = chrono::Utc::now().timestamp_millis();
        self.generation += 1;

        debug!(
            "[Pipeline] seq={} n={} rms={:.3}mm/s peak={:?}",
            batch.sequence,
            batch.samples.len(),
            current,
            self.peak_frequency
        );
        calibrated
    }

    fn finish_calibration(&mut self) -> Option<[f64; 3]> {
        let stats = offset_stats(self.calibration.window());
        match self.calibration.compute_offset() {
            Ok(offset) => {
                info!(
                    "[Calibration] Offset = [{:.4}, {:.4}, {:.4}] mm/s, residual rms = [{:.4}, {:.4}, {:.4}]",
                    offset[0], offset[1], offset[2],
                    stats.residual_rms[0], stats.residual_rms[1], stats.residual_rms[2]
                );
                self.offset = Some(offset);
                Some(offset)
            }
            Err(e) => {
                warn!("[Calibration] {}", e);
                None
            }
        }
    }

    fn update_spectrum(&mut self) {
        let start = self.velocity.len() - self.fft_window;
        let window: Vec<[f64; 3]> = self.velocity.iter().skip(start).map(|s| s.v).collect();

        let conditioned = hann_window(&self.filter.apply(&window));
        match self.analyzer.fft_magnitude(&conditioned, self.fs) {
            Ok(spec) => {
                self.peak_frequency = spec.peak_frequency();
                self.latest_spectrum = Some(spec);
            }
            Err(e) => warn!("[Pipeline] Spectrum skipped: {}", e),
        }
    }

    /// Begin a calibration capture. Restarts one already in progress.
    pub fn request_calibration(&mut self) {
        self.calibration.start_capture();
    }

    pub fn check_link_health(&mut self, now: Instant) -> Option<HealthEvent> {
        self.health.check(now)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    pub fn snapshot(&self) -> PipelineSnapshot {
        PipelineSnapshot {
            velocity_window: self.velocity.iter().copied().collect(),
            accel_magnitude: self.accel_magnitude.iter().copied().collect(),
            rms_history: self.rms_history.iter().copied().collect(),
            latest_spectrum: self.latest_spectrum.clone(),
            latest_rms: self.latest_rms,
            peak_frequency: self.peak_frequency,
            iso_zone: self.latest_rms.map(|r| self.group.classify(r)),
            link: self.health.state(),
            calibration: self.calibration.state(),
            calibration_offset: self.offset,
            kalman_bias: self.kalman.as_ref().map(|k| k.bias()),
            stats: self.stats,
            updated_ms: self.updated_ms,
            generation: self.generation,
        }
    }
}

fn push_bounded<T>(buf: &mut VecDeque<T>, value: T, cap: usize) {
    if cap == 0 {
        return;
    }
    while buf.len() >= cap {
        buf.pop_front();
    }
    buf.push_back(value);
}

struct Shared {
    pipeline: Mutex<Pipeline>,
    updated: Condvar,
}

/// Cloneable handle shared by the acquisition loop, the health thread and
/// any readers.
#[derive(Clone)]
pub struct PipelineHandle {
    shared: Arc<Shared>,
}

impl PipelineHandle {
    pub fn new(pipeline: Pipeline) -> Self {
        PipelineHandle {
            shared: Arc::new(Shared {
                pipeline: Mutex::new(pipeline),
                updated: Condvar::new(),
            }),
        }
    }

    pub fn from_config(config: &SystemConfig) -> Result<Self> {
        Ok(Self::new(Pipeline::from_config(config)?))
    }

    fn lock(&self) -> MutexGuard<'_, Pipeline> {
        // Poisoned lock: keep serving the last consistent state
        self.shared.pipeline.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn ingest_datagram(&self, buf: &[u8]) -> Result<IngestReport, VibrationError> {
        self.ingest_datagram_at(buf, Instant::now())
    }

    pub fn ingest_datagram_at(&self, buf: &[u8], now: Instant) -> Result<IngestReport, VibrationError> {
        let result = self.lock().ingest_datagram(buf, now);
        if result.is_ok() {
            self.shared.updated.notify_all();
        }
        result
    }

    pub fn snapshot(&self) -> PipelineSnapshot {
        self.lock().snapshot()
    }

    pub fn request_calibration(&self) {
        self.lock().request_calibration();
    }

    pub fn check_link_health(&self) -> Option<HealthEvent> {
        self.check_link_health_at(Instant::now())
    }

    pub fn check_link_health_at(&self, now: Instant) -> Option<HealthEvent> {
        self.lock().check_link_health(now)
    }

    /// Check the link every `interval` until `running` is cleared. Returns
    /// the number of state changes seen.
    pub fn run_link_watchdog(&self, running: &AtomicBool, interval: Duration) -> u64 {
        let mut transitions = 0;
        while running.load(Ordering::SeqCst) {
            std::thread::sleep(interval);
            if let Some(event) = self.check_link_health() {
                debug!("[Link] {:?}", event);
                transitions += 1;
            }
        }
        transitions
    }

    pub fn stats(&self) -> PipelineStats {
        self.lock().stats()
    }

    /// Block until a batch newer than `since_generation` has been processed.
    /// Returns `None` if `timeout` expires first.
    pub fn wait_for_update(&self, since_generation: u64, timeout: Duration) -> Option<PipelineSnapshot> {
        let guard = self.lock();
        let (guard, result) = self
            .shared
            .updated
            .wait_timeout_while(guard, timeout, |p| p.generation() <= since_generation)
            .unwrap_or_else(PoisonError::into_inner);

        if result.timed_out() && guard.generation() <= since_generation {
            None
        } else {
            Some(guard.snapshot())
        }
    }
}
