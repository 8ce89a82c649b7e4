//! RMS aggregation and ISO 10816 severity zones.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::VibrationError;

pub fn rms(x: &[f64]) -> f64 {
    if x.is_empty() {
        return 0.0;
    }
    (x.iter().map(|v| v * v).sum::<f64>() / x.len() as f64).sqrt()
}

pub fn rms_per_axis(signal: &[[f64; 3]]) -> [f64; 3] {
    if signal.is_empty() {
        return [0.0; 3];
    }
    let n = signal.len() as f64;
    let mut acc = [0.0; 3];
    for s in signal {
        for axis in 0..3 {
            acc[axis] += s[axis] * s[axis];
        }
    }
    [(acc[0] / n).sqrt(), (acc[1] / n).sqrt(), (acc[2] / n).sqrt()]
}

pub fn magnitude(v: [f64; 3]) -> f64 {
    (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
}

/// Mean and residual RMS about the mean of a captured window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OffsetStats {
    pub mean: [f64; 3],
    pub residual_rms: [f64; 3],
}

pub fn offset_stats(window: &[[f64; 3]]) -> OffsetStats {
    if window.is_empty() {
        return OffsetStats { mean: [0.0; 3], residual_rms: [0.0; 3] };
    }
    let n = window.len() as f64;
    let mut mean = [0.0; 3];
    for s in window {
        for axis in 0..3 {
            mean[axis] += s[axis] / n;
        }
    }
    let centred: Vec<[f64; 3]> = window
        .iter()
        .map(|s| [s[0] - mean[0], s[1] - mean[1], s[2] - mean[2]])
        .collect();
    OffsetStats {
        mean,
        residual_rms: rms_per_axis(&centred),
    }
}

/// ISO 10816-3 machine groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MachineGroup {
    /// Large machines, 300 kW to 50 MW
    G1,
    /// Medium machines, 15 kW to 300 kW
    G2,
}

impl MachineGroup {
    /// Upper-exclusive zone boundaries in mm/s: A|B, B|C, C|D.
    pub fn thresholds(&self) -> [f64; 3] {
        match self {
            MachineGroup::G1 => [1.8, 4.5, 7.1],
            MachineGroup::G2 => [2.8, 7.1, 11.0],
        }
    }

    pub fn classify(&self, rms_mm_s: f64) -> IsoZone {
        let [ab, bc, cd] = self.thresholds();
        if rms_mm_s < ab {
            IsoZone::A
        } else if rms_mm_s < bc {
            IsoZone::B
        } else if rms_mm_s < cd {
            IsoZone::C
        } else {
            IsoZone::D
        }
    }
}

impl FromStr for MachineGroup {
    type Err = VibrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "G1" => Ok(MachineGroup::G1),
            "G2" => Ok(MachineGroup::G2),
            _ => Err(VibrationError::UnknownGroup(s.to_string())),
        }
    }
}

impl fmt::Display for MachineGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MachineGroup::G1 => write!(f, "G1"),
            MachineGroup::G2 => write!(f, "G2"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IsoZone {
    A,
    B,
    C,
    D,
}

impl IsoZone {
    pub fn description(&self) -> &'static str {
        match self {
            IsoZone::A => "newly commissioned",
            IsoZone::B => "unrestricted long-term operation",
            IsoZone::C => "restricted operation",
            IsoZone::D => "damage may occur",
        }
    }
}

impl fmt::Display for IsoZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IsoZone::A => "A",
            IsoZone::B => "B",
            IsoZone::C => "C",
            IsoZone::D => "D",
        };
        write!(f, "{}", s)
    }
}

pub fn iso_zone(rms_mm_s: f64, group: &str) -> Result<IsoZone, VibrationError> {
    Ok(group.parse::<MachineGroup>()?.classify(rms_mm_s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_rms_of_constant() {
        assert_relative_eq!(rms(&[3.0, -3.0, 3.0, -3.0]), 3.0);
        assert_eq!(rms(&[]), 0.0);
    }

    #[test]
    fn test_rms_of_sine_is_amplitude_over_root_two() {
        let x: Vec<f64> = (0..800)
            .map(|i| 2.0 * (2.0 * std::f64::consts::PI * 10.0 * i as f64 / 800.0).sin())
            .collect();
        assert_relative_eq!(rms(&x), 2.0 / 2f64.sqrt(), epsilon = 1e-9);
    }

    #[test]
    fn test_rms_per_axis_and_magnitude() {
        let r = rms_per_axis(&[[1.0, 0.0, 2.0], [-1.0, 0.0, -2.0]]);
        assert_eq!(r, [1.0, 0.0, 2.0]);
        assert_relative_eq!(magnitude([3.0, 4.0, 0.0]), 5.0);
    }

    #[test]
    fn test_offset_stats() {
        let stats = offset_stats(&[[1.0, 5.0, 0.0], [3.0, 5.0, 0.0]]);
        assert_eq!(stats.mean, [2.0, 5.0, 0.0]);
        assert_relative_eq!(stats.residual_rms[0], 1.0);
        assert_eq!(stats.residual_rms[1], 0.0);
    }

    #[test]
    fn test_iso_zone_group1() {
        assert_eq!(iso_zone(1.0, "G1").unwrap(), IsoZone::A);
        assert_eq!(iso_zone(5.0, "G1").unwrap(), IsoZone::C);
        assert_eq!(iso_zone(8.0, "G1").unwrap(), IsoZone::D);
    }

    #[test]
    fn test_iso_zone_boundaries_are_upper_exclusive() {
        assert_eq!(iso_zone(1.8, "G1").unwrap(), IsoZone::B);
        assert_eq!(iso_zone(4.5, "G1").unwrap(), IsoZone::C);
        assert_eq!(iso_zone(7.1, "G1").unwrap(), IsoZone::D);
        assert_eq!(iso_zone(7.1, "G2").unwrap(), IsoZone::C);
        assert_eq!(iso_zone(11.0, "G2").unwrap(), IsoZone::D);
    }

    #[test]
    fn test_unknown_group() {
        assert_eq!(
            iso_zone(1.0, "G9"),
            Err(VibrationError::UnknownGroup("G9".to_string()))
        );
        assert_eq!("g2".parse::<MachineGroup>().unwrap(), MachineGroup::G2);
    }

    #[test]
    fn test_zone_display() {
        assert_eq!(IsoZone::C.to_string(), "C");
        assert_eq!(MachineGroup::G1.to_string(), "G1");
    }
}
