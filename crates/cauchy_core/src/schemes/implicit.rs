//! Implicit one-step schemes. Each step builds its residual equation as a
//! closure and hands it, with the matching Jacobian, to the Newton solver.

use super::Steppable;
use crate::error::Result;
use crate::newton::{finite_difference_jacobian, newton_raphson, NewtonSettings};
use crate::traits::DynamicalSystem;
use nalgebra::DMatrix;

/// ∂f/∂y at (t, y): analytic when the system provides it, else forward differences.
fn rhs_jacobian(system: &impl DynamicalSystem, t: f64, y: &[f64]) -> DMatrix<f64> {
    system.jacobian(t, y).unwrap_or_else(|| {
        finite_difference_jacobian(|x: &[f64], out: &mut [f64]| system.apply(t, x, out), y)
    })
}

/// I − c·∂f/∂y, the Jacobian of residuals of the form Y − (…) − c·f(t, Y).
fn shifted_identity(system: &impl DynamicalSystem, t: f64, y: &[f64], c: f64) -> DMatrix<f64> {
    let dim = y.len();
    DMatrix::identity(dim, dim) - rhs_jacobian(system, t, y) * c
}

/// Backward (inverse) Euler: solves y_{n+1} − y_n − h f(t_{n+1}, y_{n+1}) = 0.
pub struct InverseEuler {
    newton: NewtonSettings,
}

impl InverseEuler {
    pub fn new(_dim: usize, newton: NewtonSettings) -> Self {
        Self { newton }
    }
}

impl Steppable for InverseEuler {
    fn step(
        &mut self,
        system: &impl DynamicalSystem,
        t: f64,
        state: &[f64],
        h: f64,
        next: &mut [f64],
    ) -> Result<()> {
        let t_next = t + h;
        let residual = |y: &[f64], out: &mut [f64]| {
            system.apply(t_next, y, out);
            for i in 0..y.len() {
                out[i] = y[i] - state[i] - h * out[i];
            }
        };
        let jacobian = |y: &[f64]| shifted_identity(system, t_next, y, h);

        let solution = newton_raphson(residual, jacobian, state, &self.newton)?;
        next.copy_from_slice(&solution.root);
        Ok(())
    }
}

/// Trapezoidal rule: solves y_{n+1} − y_n − h/2 (f_n + f(t_{n+1}, y_{n+1})) = 0,
/// starting Newton from a forward Euler predictor.
pub struct CrankNicolson {
    newton: NewtonSettings,
    f_start: Vec<f64>,
    guess: Vec<f64>,
}

impl CrankNicolson {
    pub fn new(dim: usize, newton: NewtonSettings) -> Self {
        Self {
            newton,
            f_start: vec![0.0; dim],
            guess: vec![0.0; dim],
        }
    }
}

impl Steppable for CrankNicolson {
    fn step(
        &mut self,
        system: &impl DynamicalSystem,
        t: f64,
        state: &[f64],
        h: f64,
        next: &mut [f64],
    ) -> Result<()> {
        let t_next = t + h;
        let half = 0.5 * h;

        system.apply(t, state, &mut self.f_start);
        for i in 0..state.len() {
            self.guess[i] = state[i] + h * self.f_start[i];
        }

        let f_start = &self.f_start;
        let residual = |y: &[f64], out: &mut [f64]| {
            system.apply(t_next, y, out);
            for i in 0..y.len() {
                out[i] = y[i] - state[i] - half * (f_start[i] + out[i]);
            }
        };
        let jacobian = |y: &[f64]| shifted_identity(system, t_next, y, half);

        let solution = newton_raphson(residual, jacobian, &self.guess, &self.newton)?;
        next.copy_from_slice(&solution.root);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{CrankNicolson, InverseEuler};
    use crate::error::{CauchyError, ErrorKind};
    use crate::newton::NewtonSettings;
    use crate::schemes::Steppable;
    use crate::systems::{KeplerConfig, KeplerProblem, ScalarLinear};
    use crate::traits::DynamicalSystem;

    #[test]
    fn inverse_euler_solves_stiff_decay_in_one_step() {
        let system = ScalarLinear { lambda: -1000.0 };
        let mut stepper = InverseEuler::new(1, NewtonSettings::default());
        let mut next = [0.0];
        stepper
            .step(&system, 0.0, &[1.0], 0.1, &mut next)
            .expect("implicit step");
        assert!((next[0] - 1.0 / 101.0).abs() < 1e-14);
    }

    #[test]
    fn crank_nicolson_satisfies_trapezoidal_residual_on_kepler() {
        // Kepler has no analytic Jacobian, so this exercises the difference quotient.
        let kepler = KeplerProblem::new(KeplerConfig::default()).expect("default mu");
        let state = kepler.circular_orbit(1.0).expect("valid radius");
        let h = 0.05;
        let mut stepper = CrankNicolson::new(4, NewtonSettings::default());
        let mut next = [0.0; 4];
        stepper
            .step(&kepler, 0.0, &state, h, &mut next)
            .expect("implicit step");

        let mut f0 = [0.0; 4];
        let mut f1 = [0.0; 4];
        kepler.apply(0.0, &state, &mut f0);
        kepler.apply(h, &next, &mut f1);
        for i in 0..4 {
            let r = next[i] - state[i] - 0.5 * h * (f0[i] + f1[i]);
            assert!(r.abs() < 1e-11, "component {i}: residual {r}");
        }
    }

    #[test]
    fn inverse_euler_surfaces_newton_failure() {
        // With h = 1/λ the Jacobian 1 − hλ vanishes.
        let system = ScalarLinear { lambda: 2.0 };
        let mut stepper = InverseEuler::new(1, NewtonSettings::default());
        let mut next = [0.0];
        let err = stepper
            .step(&system, 0.0, &[1.0], 0.5, &mut next)
            .expect_err("singular step");
        assert!(matches!(err, CauchyError::SingularJacobian { .. }));

        let strict = NewtonSettings {
            max_iter: 1,
            ..NewtonSettings::default()
        };
        let kepler = KeplerProblem::new(KeplerConfig::default()).expect("default mu");
        let state = kepler.circular_orbit(1.0).expect("valid radius");
        let mut stepper = InverseEuler::new(4, strict);
        let mut next = [0.0; 4];
        let err = stepper
            .step(&kepler, 0.0, &state, 0.1, &mut next)
            .expect_err("one Newton update is not enough for a nonlinear residual");
        assert_eq!(err.kind(), ErrorKind::NonConvergence);
    }
}
