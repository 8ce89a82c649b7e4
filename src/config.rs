use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::conditioning::{ButterworthBandpass, DEFAULT_FMAX_HZ, DEFAULT_FMIN_HZ, DEFAULT_ORDER};
use crate::metrics::MachineGroup;
use crate::packet::{G_TO_MS2, LSB_TO_G, NODE_BATCH_SIZE, SAMPLE_RATE_HZ};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub acquisition: AcquisitionConfig,
    pub sensor: SensorConfig,
    pub health: HealthConfig,
    pub calibration: CalibrationConfig,
    pub kalman: KalmanConfig,
    pub analysis: AnalysisConfig,
    pub simulator: SimulatorConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Live,
    Simulated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    pub source: SourceKind,
    pub bind_addr: String,
    pub port: u16,
    pub recv_timeout_ms: u64,
    pub max_batch: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    pub sample_rate_hz: f64,
    pub lsb_to_g: f64,
    pub g_to_ms2: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub check_interval_ms: u64,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub duration_s: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KalmanConfig {
    pub enabled: bool,
    pub q_signal: f64,
    pub q_bias: f64,
    pub r_measure: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub fft_window: usize,
    pub rms_window: usize,
    pub velocity_history: usize,
    pub accel_history: usize,
    pub rms_history: usize,
    pub iso_group: String,
    pub filter_fmin_hz: f64,
    pub filter_fmax_hz: f64,
    pub filter_order: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    pub batch_size: u16,
    pub tone_hz: f64,
    pub amplitude_lsb: f64,
    pub noise_lsb: f64,
    pub bias_lsb: [f64; 3],
    /// Skip every Nth sequence number to exercise gap detection.
    pub drop_every: Option<u16>,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        AcquisitionConfig {
            source: SourceKind::Live,
            bind_addr: "0.0.0.0".to_string(),
            port: 9000,
            recv_timeout_ms: 200,
            max_batch: 256,
        }
    }
}

impl Default for SensorConfig {
    fn default() -> Self {
        SensorConfig {
            sample_rate_hz: SAMPLE_RATE_HZ,
            lsb_to_g: LSB_TO_G,
            g_to_ms2: G_TO_MS2,
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        HealthConfig {
            check_interval_ms: 1000,
            timeout_ms: 2000,
        }
    }
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        CalibrationConfig { duration_s: 2.0 }
    }
}

impl Default for KalmanConfig {
    fn default() -> Self {
        KalmanConfig {
            enabled: true,
            q_signal: 1e-3,
            q_bias: 1e-5,
            r_measure: 5e-3,
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            fft_window: 1024,
            rms_window: 1024,
            velocity_history: 5 * SAMPLE_RATE_HZ as usize,
            accel_history: 1024,
            rms_history: 1024,
            iso_group: "G1".to_string(),
            filter_fmin_hz: DEFAULT_FMIN_HZ,
            filter_fmax_hz: DEFAULT_FMAX_HZ,
            filter_order: DEFAULT_ORDER,
        }
    }
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        SimulatorConfig {
            batch_size: NODE_BATCH_SIZE,
            tone_hz: 30.0,
            amplitude_lsb: 128.0,
            noise_lsb: 3.0,
            bias_lsb: [20.0, -10.0, 5.0],
            drop_every: None,
        }
    }
}

/// Settings derived once at start-up from a validated config.
#[derive(Debug, Clone)]
pub struct ResolvedAnalysis {
    pub filter: ButterworthBandpass,
    pub group: MachineGroup,
}

impl SystemConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: SystemConfig = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Check the config and design the derived analysis pieces.
    pub fn validate(&self) -> Result<ResolvedAnalysis> {
        let a = &self.analysis;
        if self.sensor.sample_rate_hz <= 0.0 {
            anyhow::bail!("sensor.sample_rate_hz must be positive");
        }
        if a.fft_window == 0 || a.rms_window == 0 {
            anyhow::bail!("analysis.fft_window and analysis.rms_window must be non-zero");
        }
        if a.velocity_history < a.fft_window.max(a.rms_window) {
            anyhow::bail!(
                "analysis.velocity_history ({}) must hold at least one FFT/RMS window ({})",
                a.velocity_history,
                a.fft_window.max(a.rms_window)
            );
        }
        if self.acquisition.max_batch == 0 {
            anyhow::bail!("acquisition.max_batch must be non-zero");
        }
        if self.calibration.duration_s <= 0.0 {
            anyhow::bail!("calibration.duration_s must be positive");
        }
        if self.health.check_interval_ms == 0 {
            anyhow::bail!("health.check_interval_ms must be non-zero");
        }
        if self.simulator.batch_size > self.acquisition.max_batch {
            anyhow::bail!(
                "simulator.batch_size ({}) exceeds acquisition.max_batch ({})",
                self.simulator.batch_size,
                self.acquisition.max_batch
            );
        }

        let filter = ButterworthBandpass::design(
            self.sensor.sample_rate_hz,
            a.filter_fmin_hz,
            a.filter_fmax_hz,
            a.filter_order,
        )
        .context("Invalid bandpass configuration")?;
        let group: MachineGroup = a.iso_group.parse().context("Invalid ISO group")?;

        Ok(ResolvedAnalysis { filter, group })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_node_firmware() {
        let config = SystemConfig::default();
        assert_eq!(config.acquisition.port, 9000);
        assert_eq!(config.acquisition.source, SourceKind::Live);
        assert_eq!(config.sensor.sample_rate_hz, 800.0);
        assert_eq!(config.analysis.velocity_history, 4000);
        assert_eq!(config.analysis.iso_group, "G1");
        assert!(config.kalman.enabled);
        assert_eq!(config.simulator.batch_size, 16);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "acquisition": {{ "port": 9100, "source": "simulated" }}, "analysis": {{ "iso_group": "G2" }} }}"#
        )
        .unwrap();

        let config = SystemConfig::load(file.path()).unwrap();
        assert_eq!(config.acquisition.port, 9100);
        assert_eq!(config.acquisition.source, SourceKind::Simulated);
        assert_eq!(config.acquisition.bind_addr, "0.0.0.0");
        assert_eq!(config.analysis.iso_group, "G2");
        assert_eq!(config.analysis.fft_window, 1024);
        assert_eq!(config.health.timeout_ms, 2000);

        let resolved = config.validate().unwrap();
        assert_eq!(resolved.group, MachineGroup::G2);
    }

    #[test]
    fn test_serde_roundtrip() {
        let mut config = SystemConfig::default();
        config.simulator.drop_every = Some(7);
        config.kalman.enabled = false;

        let json = serde_json::to_string(&config).expect("serialize failed");
        let restored: SystemConfig = serde_json::from_str(&json).expect("deserialize failed");
        assert_eq!(restored.simulator.drop_every, Some(7));
        assert!(!restored.kalman.enabled);
        assert_eq!(restored.simulator.bias_lsb, [20.0, -10.0, 5.0]);
    }

    #[test]
    fn test_invalid_band_rejected() {
        let mut config = SystemConfig::default();
        config.analysis.filter_fmin_hz = 500.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_health_interval_rejected() {
        let mut config = SystemConfig::default();
        config.health.check_interval_ms = 0;
        let err = config.validate().unwrap_err();
        assert!(format!("{:#}", err).contains("check_interval_ms"));
    }

    #[test]
    fn test_simulator_batch_larger_than_max_rejected() {
        let mut config = SystemConfig::default();
        config.acquisition.max_batch = 8;
        let err = config.validate().unwrap_err();
        assert!(format!("{:#}", err).contains("batch_size (16)"));

        config.simulator.batch_size = 8;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_group_rejected() {
        let mut config = SystemConfig::default();
        config.analysis.iso_group = "G7".to_string();
        let err = config.validate().unwrap_err();
        assert!(format!("{:#}", err).contains("G7"));
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = SystemConfig::load(Path::new("/nonexistent/vibrosense.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/vibrosense.json"));
    }

    #[test]
    fn test_garbage_file_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(SystemConfig::load(file.path()).is_err());
    }
}
