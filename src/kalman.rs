//! Two-state (signal, bias) Kalman filter for slow drift removal.
//!
//! The measurement is the sum of the true signal and a slowly wandering bias
//! (`H = [1, 1]`). The bias process noise is kept much smaller than the signal
//! process noise, so fast content lands in `signal` and slow offsets are
//! absorbed into `bias`.

use nalgebra::{Matrix2, RowVector2, Vector2};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KalmanEstimate {
    pub signal: f64,
    pub bias: f64,
}

#[derive(Debug, Clone)]
pub struct BiasKalman {
    x: Vector2<f64>,
    p: Matrix2<f64>,
    q: Matrix2<f64>,
    h: RowVector2<f64>,
    r: f64,
}

impl BiasKalman {
    pub fn new(q_signal: f64, q_bias: f64, r_measure: f64) -> Self {
        BiasKalman {
            x: Vector2::zeros(),
            p: Matrix2::identity(),
            q: Matrix2::new(q_signal, 0.0, 0.0, q_bias),
            h: RowVector2::new(1.0, 1.0),
            r: r_measure,
        }
    }

    pub fn update(&mut self, z: f64) -> KalmanEstimate {
        // Predict: F = I, state carries over
        self.p += self.q;

        let s = (self.h * self.p * self.h.transpose())[(0, 0)] + self.r;
        let k: Vector2<f64> = self.p * self.h.transpose() / s;

        let innovation = z - (self.h * self.x)[(0, 0)];
        self.x += k * innovation;
        self.p = (Matrix2::identity() - k * self.h) * self.p;

        self.estimate()
    }

    pub fn estimate(&self) -> KalmanEstimate {
        KalmanEstimate {
            signal: self.x[0],
            bias: self.x[1],
        }
    }

    pub fn covariance(&self) -> Matrix2<f64> {
        self.p
    }
}

/// Independent filters for the x, y and z axes.
#[derive(Debug, Clone)]
pub struct TriAxisKalman {
    axes: [BiasKalman; 3],
}

impl TriAxisKalman {
    pub fn new(q_signal: f64, q_bias: f64, r_measure: f64) -> Self {
        let f = BiasKalman::new(q_signal, q_bias, r_measure);
        TriAxisKalman {
            axes: [f.clone(), f.clone(), f],
        }
    }

    /// Filter one 3-axis measurement, returning the corrected signal.
    pub fn update(&mut self, z: [f64; 3]) -> [f64; 3] {
        let mut out = [0.0; 3];
        for (axis, filter) in self.axes.iter_mut().enumerate() {
            out[axis] = filter.update(z[axis]).signal;
        }
        out
    }

    pub fn bias(&self) -> [f64; 3] {
        [
            self.axes[0].estimate().bias,
            self.axes[1].estimate().bias,
            self.axes[2].estimate().bias,
        ]
    }
}
