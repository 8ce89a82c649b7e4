use crate::packet::Sample;

pub const M_S_TO_MM_S: f64 = 1000.0;

/// Physical scale applied to raw LSB counts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scale {
    pub lsb_to_g: f64,
    pub g_to_ms2: f64,
}

pub fn counts_to_ms2(sample: &Sample, scale: Scale) -> [f64; 3] {
    let k = scale.lsb_to_g * scale.g_to_ms2;
    sample.axes().map(|c| c as f64 * k)
}

/// Cumulative trapezoidal integration, seeded with zero velocity.
///
/// No drift correction happens here; bias is handled upstream by the Kalman
/// stage and downstream by the calibration offset.
pub fn integrate(accel: &[[f64; 3]], dt: f64) -> Vec<[f64; 3]> {
    let mut vel = Vec::with_capacity(accel.len());
    if accel.is_empty() {
        return vel;
    }
    vel.push([0.0; 3]);
    for n in 1..accel.len() {
        let prev = vel[n - 1];
        let mut v = [0.0; 3];
        for axis in 0..3 {
            v[axis] = prev[axis] + 0.5 * (accel[n][axis] + accel[n - 1][axis]) * dt;
        }
        vel.push(v);
    }
    vel
}

pub fn to_mm_per_s(vel_ms: &mut [[f64; 3]]) {
    for v in vel_ms.iter_mut() {
        for c in v.iter_mut() {
            *c *= M_S_TO_MM_S;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{G_TO_MS2, LSB_TO_G};
    use approx::assert_relative_eq;

    #[test]
    fn test_constant_acceleration_is_linear() {
        let a = 2.5;
        let dt = 1.0 / 800.0;
        let accel = vec![[a, -a, 0.0]; 100];
        let vel = integrate(&accel, dt);

        assert_eq!(vel.len(), 100);
        for (n, v) in vel.iter().enumerate() {
            assert_relative_eq!(v[0], a * n as f64 * dt, epsilon = 1e-12);
            assert_relative_eq!(v[1], -a * n as f64 * dt, epsilon = 1e-12);
            assert_eq!(v[2], 0.0);
        }
    }

    #[test]
    fn test_first_sample_is_exactly_zero() {
        let accel: Vec<[f64; 3]> = (0..64)
            .map(|i| {
                let s = (i as f64 * 0.3).sin();
                [s, -s, 0.5 * s]
            })
            .collect();
        let vel = integrate(&accel, 0.001);
        assert_eq!(vel[0], [0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_empty_input() {
        assert!(integrate(&[], 0.01).is_empty());
    }

    #[test]
    fn test_trapezoid_step() {
        let vel = integrate(&[[0.0; 3], [2.0, 4.0, 6.0]], 0.5);
        assert_eq!(vel[1], [0.5, 1.0, 1.5]);
    }

    #[test]
    fn test_scaling_chain() {
        let scale = Scale { lsb_to_g: LSB_TO_G, g_to_ms2: G_TO_MS2 };
        let a = counts_to_ms2(&Sample::new(128, -128, 0), scale);
        assert_relative_eq!(a[0], 128.0 * 0.0078 * 9.80665, epsilon = 1e-12);
        assert_relative_eq!(a[1], -a[0]);
        assert_eq!(a[2], 0.0);
    }

    #[test]
    fn test_axes_keep_their_order() {
        let scale = Scale { lsb_to_g: 1.0, g_to_ms2: 1.0 };
        assert_eq!(counts_to_ms2(&Sample::new(1, -2, 3), scale), [1.0, -2.0, 3.0]);
    }

    #[test]
    fn test_mm_per_s() {
        let mut v = vec![[0.001, -0.002, 0.0]];
        to_mm_per_s(&mut v);
        assert_relative_eq!(v[0][0], 1.0);
        assert_relative_eq!(v[0][1], -2.0);
    }
}
