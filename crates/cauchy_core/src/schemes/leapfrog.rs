//! Velocity-form leap frog (kick-drift-kick). Second order and symplectic
//! for separable systems whose acceleration depends on positions only.

use super::Steppable;
use crate::error::{CauchyError, Result};
use crate::traits::DynamicalSystem;

pub struct LeapFrog {
    deriv: Vec<f64>,
    half_velocity: Vec<f64>,
}

impl LeapFrog {
    pub fn new(dim: usize) -> Self {
        Self {
            deriv: vec![0.0; dim],
            half_velocity: vec![0.0; dim / 2],
        }
    }

    /// Velocity at the staggered half step `t + h/2` of the last step taken.
    pub fn half_velocity(&self) -> &[f64] {
        &self.half_velocity
    }
}

impl Steppable for LeapFrog {
    fn step(
        &mut self,
        system: &impl DynamicalSystem,
        t: f64,
        state: &[f64],
        h: f64,
        next: &mut [f64],
    ) -> Result<()> {
        let n = match system.configuration_dimension() {
            Some(n) if n > 0 && 2 * n == state.len() => n,
            _ => {
                return Err(CauchyError::invalid(
                    "LeapFrog requires a state laid out as positions followed by velocities.",
                ))
            }
        };
        let half = 0.5 * h;

        // kick: v_{n+1/2} = v_n + h/2 a(x_n)
        system.apply(t, state, &mut self.deriv);
        for i in 0..n {
            self.half_velocity[i] = state[n + i] + half * self.deriv[n + i];
        }

        // drift: x_{n+1} = x_n + h v_{n+1/2}
        for i in 0..n {
            next[i] = state[i] + h * self.half_velocity[i];
            next[n + i] = self.half_velocity[i];
        }

        // kick: v_{n+1} = v_{n+1/2} + h/2 a(x_{n+1})
        system.apply(t + h, next, &mut self.deriv);
        for i in 0..n {
            next[n + i] = self.half_velocity[i] + half * self.deriv[n + i];
        }
        Ok(())
    }
}
