use nalgebra::DMatrix;

/// Right-hand side of an autonomous or time-dependent ODE `dy/dt = f(t, y)`.
///
/// Implementations must be deterministic and free of side effects; the
/// steppers call `apply` several times per step and in parallel across
/// independent runs.
pub trait DynamicalSystem {
    /// Returns the dimension of the state space.
    fn dimension(&self) -> usize;

    /// Evaluates the vector field.
    /// t: current time
    /// y: current state
    /// out: buffer to write dy/dt into
    fn apply(&self, t: f64, y: &[f64], out: &mut [f64]);

    /// Analytic Jacobian `∂f/∂y` at `(t, y)`, when one is available.
    /// Implicit schemes fall back to finite differences otherwise.
    fn jacobian(&self, _t: f64, _y: &[f64]) -> Option<DMatrix<f64>> {
        None
    }

    /// Number of position coordinates when the state is laid out as
    /// `[q; p]` with `dq/dt = p`. Required by the LeapFrog scheme.
    fn configuration_dimension(&self) -> Option<usize> {
        None
    }

    /// Closed-form solution at `t` for the initial condition `(t0, y0)`.
    fn exact_solution(&self, _t0: f64, _y0: &[f64], _t: f64) -> Option<Vec<f64>> {
        None
    }
}
