//! Reference problems: the linear oscillator, the Kepler two-body problem in
//! the reduced one-body frame, and the scalar test equation `y' = λy`.

use crate::error::{CauchyError, Result};
use crate::traits::DynamicalSystem;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OscillatorConfig {
    pub omega: f64,
}

impl Default for OscillatorConfig {
    fn default() -> Self {
        Self { omega: 1.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeplerConfig {
    /// Gravitational parameter of the central body.
    pub mu: f64,
}

impl Default for KeplerConfig {
    fn default() -> Self {
        Self { mu: 1.0 }
    }
}

fn require_positive(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(CauchyError::invalid(format!(
            "{name} must be finite and positive, got {value}."
        )));
    }
    Ok(())
}

/// `x'' = −ω² x` written as the first-order system `(x, v)`.
#[derive(Debug, Clone, Copy)]
pub struct LinearOscillator {
    omega: f64,
}

impl LinearOscillator {
    pub fn new(config: OscillatorConfig) -> Result<Self> {
        require_positive("omega", config.omega)?;
        Ok(Self {
            omega: config.omega,
        })
    }

    pub fn omega(&self) -> f64 {
        self.omega
    }

    pub fn energy(&self, y: &[f64]) -> f64 {
        0.5 * y[1] * y[1] + 0.5 * self.omega * self.omega * y[0] * y[0]
    }
}

impl DynamicalSystem for LinearOscillator {
    fn dimension(&self) -> usize {
        2
    }

    fn apply(&self, _t: f64, y: &[f64], out: &mut [f64]) {
        out[0] = y[1];
        out[1] = -self.omega * self.omega * y[0];
    }

    fn jacobian(&self, _t: f64, _y: &[f64]) -> Option<DMatrix<f64>> {
        Some(DMatrix::from_row_slice(
            2,
            2,
            &[0.0, 1.0, -self.omega * self.omega, 0.0],
        ))
    }

    fn configuration_dimension(&self) -> Option<usize> {
        Some(1)
    }

    fn exact_solution(&self, t0: f64, y0: &[f64], t: f64) -> Option<Vec<f64>> {
        let w = self.omega;
        let (s, c) = (w * (t - t0)).sin_cos();
        Some(vec![
            y0[0] * c + y0[1] / w * s,
            -y0[0] * w * s + y0[1] * c,
        ])
    }
}

/// Planar two-body problem reduced to one body orbiting a fixed centre.
/// State layout is `(x, y, vx, vy)`.
#[derive(Debug, Clone, Copy)]
pub struct KeplerProblem {
    mu: f64,
}

impl KeplerProblem {
    pub fn new(config: KeplerConfig) -> Result<Self> {
        require_positive("mu", config.mu)?;
        Ok(Self { mu: config.mu })
    }

    pub fn mu(&self) -> f64 {
        self.mu
    }

    /// Specific orbital energy `½|v|² − μ/r`.
    pub fn energy(&self, state: &[f64]) -> f64 {
        let r = state[0].hypot(state[1]);
        let v2 = state[2] * state[2] + state[3] * state[3];
        0.5 * v2 - self.mu / r
    }

    /// Specific angular momentum (z component).
    pub fn angular_momentum(&self, state: &[f64]) -> f64 {
        state[0] * state[3] - state[1] * state[2]
    }

    /// Initial state of a counter-clockwise circular orbit of radius `radius`
    /// starting on the positive x axis.
    pub fn circular_orbit(&self, radius: f64) -> Result<Vec<f64>> {
        require_positive("radius", radius)?;
        Ok(vec![radius, 0.0, 0.0, (self.mu / radius).sqrt()])
    }

    pub fn period(&self, semi_major_axis: f64) -> Result<f64> {
        require_positive("semi-major axis", semi_major_axis)?;
        Ok(2.0 * PI * (semi_major_axis.powi(3) / self.mu).sqrt())
    }
}

impl DynamicalSystem for KeplerProblem {
    fn dimension(&self) -> usize {
        4
    }

    fn apply(&self, _t: f64, state: &[f64], out: &mut [f64]) {
        let (x, y) = (state[0], state[1]);
        let r = x.hypot(y);
        let factor = -self.mu / (r * r * r);
        out[0] = state[2];
        out[1] = state[3];
        out[2] = factor * x;
        out[3] = factor * y;
    }

    fn configuration_dimension(&self) -> Option<usize> {
        Some(2)
    }
}

/// Dahlquist test equation `y' = λy` with real `λ`.
#[derive(Debug, Clone, Copy)]
pub struct ScalarLinear {
    pub lambda: f64,
}

impl DynamicalSystem for ScalarLinear {
    fn dimension(&self) -> usize {
        1
    }

    fn apply(&self, _t: f64, y: &[f64], out: &mut [f64]) {
        out[0] = self.lambda * y[0];
    }

    fn jacobian(&self, _t: f64, _y: &[f64]) -> Option<DMatrix<f64>> {
        Some(DMatrix::from_element(1, 1, self.lambda))
    }

    fn exact_solution(&self, t0: f64, y0: &[f64], t: f64) -> Option<Vec<f64>> {
        Some(vec![y0[0] * (self.lambda * (t - t0)).exp()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn oscillator_rhs_and_jacobian_agree() {
        let osc = LinearOscillator::new(OscillatorConfig { omega: 2.0 }).expect("valid omega");
        let mut out = [0.0; 2];
        osc.apply(0.0, &[0.5, -1.0], &mut out);
        assert_eq!(out, [-1.0, -2.0]);

        let jac = osc.jacobian(0.0, &[0.5, -1.0]).expect("analytic jacobian");
        let product = &jac * nalgebra::DVector::from_column_slice(&[0.5, -1.0]);
        assert!((product[0] - out[0]).abs() < 1e-15);
        assert!((product[1] - out[1]).abs() < 1e-15);
    }

    #[test]
    fn oscillator_exact_solution_conserves_energy() {
        let osc = LinearOscillator::new(OscillatorConfig { omega: 3.0 }).expect("valid omega");
        let y0 = [1.0, 0.5];
        let y = osc.exact_solution(0.0, &y0, 1.7).expect("closed form");
        assert!((osc.energy(&y) - osc.energy(&y0)).abs() < 1e-12);
        let back = osc.exact_solution(1.7, &y, 0.0).expect("closed form");
        assert!((back[0] - y0[0]).abs() < 1e-12);
        assert!((back[1] - y0[1]).abs() < 1e-12);
    }

    #[test]
    fn kepler_circular_orbit_invariants() {
        let kepler = KeplerProblem::new(KeplerConfig { mu: 4.0 }).expect("valid mu");
        let state = kepler.circular_orbit(2.0).expect("valid radius");
        assert_eq!(state, vec![2.0, 0.0, 0.0, 2.0_f64.sqrt()]);
        // Circular orbit: E = −μ / (2a)
        assert!((kepler.energy(&state) + 1.0).abs() < 1e-12);
        assert!((kepler.angular_momentum(&state) - 2.0 * 2.0_f64.sqrt()).abs() < 1e-12);

        let mut out = [0.0; 4];
        kepler.apply(0.0, &state, &mut out);
        assert!((out[2] + 1.0).abs() < 1e-12);
        assert_eq!(out[3], 0.0);

        let period = kepler.period(2.0).expect("valid axis");
        assert!((period - 2.0 * PI * (8.0_f64 / 4.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn constructors_reject_bad_constants() {
        for omega in [0.0, -1.0, f64::NAN] {
            let err = LinearOscillator::new(OscillatorConfig { omega }).expect_err("rejected");
            assert_eq!(err.kind(), ErrorKind::InvalidConfiguration);
        }
        let err = KeplerProblem::new(KeplerConfig { mu: f64::INFINITY }).expect_err("rejected");
        assert_eq!(err.kind(), ErrorKind::InvalidConfiguration);
        let kepler = KeplerProblem::new(KeplerConfig::default()).expect("default mu");
        assert!(kepler.circular_orbit(0.0).is_err());
    }
}
