use super::Steppable;
use crate::error::Result;
use crate::traits::DynamicalSystem;

/// Forward Euler: y_{n+1} = y_n + h f(t_n, y_n)
pub struct ExplicitEuler {
    deriv: Vec<f64>,
}

impl ExplicitEuler {
    pub fn new(dim: usize) -> Self {
        Self {
            deriv: vec![0.0; dim],
        }
    }
}

impl Steppable for ExplicitEuler {
    fn step(
        &mut self,
        system: &impl DynamicalSystem,
        t: f64,
        state: &[f64],
        h: f64,
        next: &mut [f64],
    ) -> Result<()> {
        system.apply(t, state, &mut self.deriv);
        for i in 0..state.len() {
            next[i] = state[i] + h * self.deriv[i];
        }
        Ok(())
    }
}

/// Classic Runge-Kutta 4th Order Solver
pub struct RK4 {
    k1: Vec<f64>,
    k2: Vec<f64>,
    k3: Vec<f64>,
    k4: Vec<f64>,
    tmp: Vec<f64>,
}

impl RK4 {
    pub fn new(dim: usize) -> Self {
        Self {
            k1: vec![0.0; dim],
            k2: vec![0.0; dim],
            k3: vec![0.0; dim],
            k4: vec![0.0; dim],
            tmp: vec![0.0; dim],
        }
    }
}

impl Steppable for RK4 {
    fn step(
        &mut self,
        system: &impl DynamicalSystem,
        t: f64,
        state: &[f64],
        h: f64,
        next: &mut [f64],
    ) -> Result<()> {
        let half = 0.5 * h;

        // k1 = f(t, y)
        system.apply(t, state, &mut self.k1);

        // k2 = f(t + h/2, y + h*k1/2)
        for i in 0..state.len() {
            self.tmp[i] = state[i] + half * self.k1[i];
        }
        system.apply(t + half, &self.tmp, &mut self.k2);

        // k3 = f(t + h/2, y + h*k2/2)
        for i in 0..state.len() {
            self.tmp[i] = state[i] + half * self.k2[i];
        }
        system.apply(t + half, &self.tmp, &mut self.k3);

        // k4 = f(t + h, y + h*k3)
        for i in 0..state.len() {
            self.tmp[i] = state[i] + h * self.k3[i];
        }
        system.apply(t + h, &self.tmp, &mut self.k4);

        // y_next = y + h/6 * (k1 + 2k2 + 2k3 + k4)
        let sixth = h / 6.0;
        for i in 0..state.len() {
            next[i] = state[i]
                + sixth * (self.k1[i] + 2.0 * self.k2[i] + 2.0 * self.k3[i] + self.k4[i]);
        }
        Ok(())
    }
}
