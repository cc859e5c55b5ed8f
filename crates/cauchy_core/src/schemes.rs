//! Fixed-step stepping schemes.
//!
//! A [`Scheme`] is a plain identifier from a closed set. Stepping goes through
//! a [`Stepper`] built from it, which owns only scratch buffers; no value is
//! carried from one step to the next. Every scheme also exposes how it
//! amplifies the scalar test equation `y' = λy`, which the stability mapper
//! consumes.

mod explicit;
mod implicit;
mod leapfrog;

pub use explicit::{ExplicitEuler, RK4};
pub use implicit::{CrankNicolson, InverseEuler};
pub use leapfrog::LeapFrog;

use crate::error::{CauchyError, Result};
use crate::newton::NewtonSettings;
use crate::traits::DynamicalSystem;
use num_complex::Complex;
use num_traits::One;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scheme {
    ExplicitEuler,
    InverseEuler,
    #[serde(rename = "leapfrog")]
    LeapFrog,
    CrankNicolson,
    Rk4,
}

/// How a scheme's linear stability is decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StabilityRule {
    /// One-step scalar map `y_{n+1} = R(z) y_n`.
    Amplification,
    /// Two-term recurrence classified by the magnitudes of its characteristic roots.
    CharacteristicRoots,
}

impl Scheme {
    pub const ALL: [Scheme; 5] = [
        Scheme::ExplicitEuler,
        Scheme::InverseEuler,
        Scheme::LeapFrog,
        Scheme::CrankNicolson,
        Scheme::Rk4,
    ];

    pub fn identifier(self) -> &'static str {
        match self {
            Scheme::ExplicitEuler => "explicit_euler",
            Scheme::InverseEuler => "inverse_euler",
            Scheme::LeapFrog => "leapfrog",
            Scheme::CrankNicolson => "crank_nicolson",
            Scheme::Rk4 => "rk4",
        }
    }

    /// Theoretical order of the global error.
    pub fn order(self) -> u32 {
        match self {
            Scheme::ExplicitEuler | Scheme::InverseEuler => 1,
            Scheme::LeapFrog | Scheme::CrankNicolson => 2,
            Scheme::Rk4 => 4,
        }
    }

    pub fn is_implicit(self) -> bool {
        matches!(self, Scheme::InverseEuler | Scheme::CrankNicolson)
    }

    pub fn is_symplectic(self) -> bool {
        matches!(self, Scheme::LeapFrog)
    }

    pub fn stability_rule(self) -> StabilityRule {
        match self {
            Scheme::LeapFrog => StabilityRule::CharacteristicRoots,
            _ => StabilityRule::Amplification,
        }
    }

    /// `R(z)` with `z = hλ`, for schemes that have a scalar amplification factor.
    pub fn amplification_factor(self, z: Complex<f64>) -> Option<Complex<f64>> {
        let one = Complex::<f64>::one();
        match self {
            Scheme::ExplicitEuler => Some(one + z),
            Scheme::InverseEuler => Some(one / (one - z)),
            Scheme::CrankNicolson => Some((one + z * 0.5) / (one - z * 0.5)),
            // Horner form of 1 + z + z²/2 + z³/6 + z⁴/24
            Scheme::Rk4 => Some(one + z * (one + z * (0.5 + z * (1.0 / 6.0 + z / 24.0)))),
            Scheme::LeapFrog => None,
        }
    }

    /// Roots of the LeapFrog recurrence applied to `x'' = λ²x`:
    /// `ξ² − (2 + z²)ξ + 1 = 0`.
    pub fn characteristic_roots(self, z: Complex<f64>) -> Option<[Complex<f64>; 2]> {
        match self {
            Scheme::LeapFrog => {
                let b = z * z + 2.0;
                let disc = (b * b - 4.0).sqrt();
                Some([(b + disc) * 0.5, (b - disc) * 0.5])
            }
            _ => None,
        }
    }

    /// Worst-case per-step growth `|R(z)|` or `max |ξ(z)|`. Undefined values
    /// (poles) count as unbounded growth.
    pub fn growth_factor(self, z: Complex<f64>) -> f64 {
        let growth = match self.stability_rule() {
            StabilityRule::Amplification => self
                .amplification_factor(z)
                .map_or(f64::INFINITY, |r| r.norm()),
            StabilityRule::CharacteristicRoots => self
                .characteristic_roots(z)
                .map_or(f64::INFINITY, |[a, b]| a.norm().max(b.norm())),
        };
        if growth.is_nan() {
            f64::INFINITY
        } else {
            growth
        }
    }

    /// Checks that `system` can be stepped by this scheme.
    pub fn check_system(self, system: &impl DynamicalSystem) -> Result<()> {
        let dim = system.dimension();
        if dim == 0 {
            return Err(CauchyError::invalid("System has zero dimension."));
        }
        if self == Scheme::LeapFrog {
            match system.configuration_dimension() {
                Some(n) if n > 0 && 2 * n == dim => {}
                _ => {
                    return Err(CauchyError::invalid(
                        "LeapFrog requires a state laid out as positions followed by velocities.",
                    ))
                }
            }
        }
        Ok(())
    }

    pub fn build(self, dim: usize, newton: NewtonSettings) -> Stepper {
        match self {
            Scheme::ExplicitEuler => Stepper::ExplicitEuler(ExplicitEuler::new(dim)),
            Scheme::InverseEuler => Stepper::InverseEuler(InverseEuler::new(dim, newton)),
            Scheme::LeapFrog => Stepper::LeapFrog(LeapFrog::new(dim)),
            Scheme::CrankNicolson => Stepper::CrankNicolson(CrankNicolson::new(dim, newton)),
            Scheme::Rk4 => Stepper::Rk4(RK4::new(dim)),
        }
    }

    /// Single application of the step operator Φ(y, t, h, f).
    pub fn step(
        self,
        system: &impl DynamicalSystem,
        t: f64,
        state: &[f64],
        h: f64,
        newton: &NewtonSettings,
    ) -> Result<Vec<f64>> {
        self.check_system(system)?;
        if state.len() != system.dimension() {
            return Err(CauchyError::invalid(format!(
                "State dimension mismatch. Expected {}, got {}.",
                system.dimension(),
                state.len()
            )));
        }
        let mut next = vec![0.0; state.len()];
        self.build(state.len(), *newton)
            .step(system, t, state, h, &mut next)?;
        Ok(next)
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.identifier())
    }
}

impl FromStr for Scheme {
    type Err = CauchyError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        Scheme::ALL
            .into_iter()
            .find(|scheme| scheme.identifier().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| CauchyError::invalid(format!("Unknown scheme identifier: {s}")))
    }
}

/// A solver that can advance a system by one step.
pub trait Steppable {
    /// Computes the state at `t + h` from `state` at `t` into `next`.
    fn step(
        &mut self,
        system: &impl DynamicalSystem,
        t: f64,
        state: &[f64],
        h: f64,
        next: &mut [f64],
    ) -> Result<()>;
}

pub enum Stepper {
    ExplicitEuler(ExplicitEuler),
    InverseEuler(InverseEuler),
    LeapFrog(LeapFrog),
    CrankNicolson(CrankNicolson),
    Rk4(RK4),
}

impl Steppable for Stepper {
    fn step(
        &mut self,
        system: &impl DynamicalSystem,
        t: f64,
        state: &[f64],
        h: f64,
        next: &mut [f64],
    ) -> Result<()> {
        match self {
            Stepper::ExplicitEuler(s) => s.step(system, t, state, h, next),
            Stepper::InverseEuler(s) => s.step(system, t, state, h, next),
            Stepper::LeapFrog(s) => s.step(system, t, state, h, next),
            Stepper::CrankNicolson(s) => s.step(system, t, state, h, next),
            Stepper::Rk4(s) => s.step(system, t, state, h, next),
        }
    }
}
