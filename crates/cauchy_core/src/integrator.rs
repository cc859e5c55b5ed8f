use crate::error::{CauchyError, Result};
use crate::newton::NewtonSettings;
use crate::parallel::{map_cancellable, CancelToken};
use crate::schemes::{Scheme, Steppable};
use crate::traits::DynamicalSystem;
use serde::{Deserialize, Serialize};

/// Uniform grid `t_i = t0 + i·h`, `i = 0..=steps`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeGrid {
    pub t0: f64,
    pub h: f64,
    pub steps: usize,
}

impl TimeGrid {
    pub fn new(t0: f64, h: f64, steps: usize) -> Result<Self> {
        let grid = Self { t0, h, steps };
        grid.validate()?;
        Ok(grid)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.t0.is_finite() {
            return Err(CauchyError::invalid("Initial time must be finite."));
        }
        if !self.h.is_finite() || self.h <= 0.0 {
            return Err(CauchyError::invalid("Step size h must be positive."));
        }
        if self.steps == 0 {
            return Err(CauchyError::invalid(
                "Integration requires at least one step.",
            ));
        }
        Ok(())
    }

    pub fn time(&self, index: usize) -> f64 {
        self.t0 + index as f64 * self.h
    }

    pub fn end(&self) -> f64 {
        self.time(self.steps)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrationSettings {
    pub newton: NewtonSettings,
    /// Largest accepted ‖y‖∞ before a run is declared divergent.
    pub divergence_limit: f64,
}

impl Default for IntegrationSettings {
    fn default() -> Self {
        Self {
            newton: NewtonSettings::default(),
            divergence_limit: 1e10,
        }
    }
}

impl IntegrationSettings {
    pub fn validate(&self) -> Result<()> {
        self.newton.validate()?;
        if !(self.divergence_limit > 0.0) {
            return Err(CauchyError::invalid("divergence_limit must be positive."));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    pub times: Vec<f64>,
    pub states: Vec<Vec<f64>>,
}

impl Trajectory {
    pub fn starting_at(t0: f64, y0: Vec<f64>) -> Self {
        Self {
            times: vec![t0],
            states: vec![y0],
        }
    }

    fn with_capacity(capacity: usize) -> Self {
        Self {
            times: Vec::with_capacity(capacity),
            states: Vec::with_capacity(capacity),
        }
    }

    fn push(&mut self, t: f64, state: Vec<f64>) {
        self.times.push(t);
        self.states.push(state);
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.states.first().map_or(0, Vec::len)
    }

    pub fn get(&self, index: usize) -> Option<(f64, &[f64])> {
        Some((*self.times.get(index)?, self.states.get(index)?.as_slice()))
    }

    pub fn final_time(&self) -> Option<f64> {
        self.times.last().copied()
    }

    pub fn final_state(&self) -> Option<&[f64]> {
        self.states.last().map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, &[f64])> + '_ {
        self.times
            .iter()
            .copied()
            .zip(self.states.iter().map(Vec::as_slice))
    }

    /// Values of one state component along the trajectory.
    pub fn component(&self, index: usize) -> Vec<f64> {
        self.states.iter().map(|s| s[index]).collect()
    }
}

/// Integrates with default settings over `steps` steps of size `h`.
pub fn integrate(
    system: &impl DynamicalSystem,
    scheme: Scheme,
    y0: &[f64],
    t0: f64,
    h: f64,
    steps: usize,
) -> Result<Trajectory> {
    let grid = TimeGrid::new(t0, h, steps)?;
    integrate_with(system, scheme, y0, &grid, &IntegrationSettings::default())
}

pub fn integrate_with(
    system: &impl DynamicalSystem,
    scheme: Scheme,
    y0: &[f64],
    grid: &TimeGrid,
    settings: &IntegrationSettings,
) -> Result<Trajectory> {
    grid.validate()?;
    run(system, scheme, y0, grid.t0, grid.h, grid.steps, settings)
}

/// Integrates backwards in time from `(t_end, y_end)` by stepping with `−h`.
/// Times in the returned trajectory decrease.
pub fn integrate_reverse(
    system: &impl DynamicalSystem,
    scheme: Scheme,
    y_end: &[f64],
    t_end: f64,
    h: f64,
    steps: usize,
    settings: &IntegrationSettings,
) -> Result<Trajectory> {
    let grid = TimeGrid::new(t_end, h, steps)?;
    run(system, scheme, y_end, grid.t0, -grid.h, grid.steps, settings)
}

/// Runs one trajectory per initial state in parallel. Results keep the order
/// of `initial_states`; runs not started before `cancel` fires report
/// `Cancelled`.
pub fn integrate_batch<S>(
    system: &S,
    scheme: Scheme,
    initial_states: &[Vec<f64>],
    grid: &TimeGrid,
    settings: &IntegrationSettings,
    cancel: &CancelToken,
) -> Vec<Result<Trajectory>>
where
    S: DynamicalSystem + Sync,
{
    map_cancellable(initial_states, cancel, |y0| {
        integrate_with(system, scheme, y0, grid, settings)
    })
}

fn run(
    system: &impl DynamicalSystem,
    scheme: Scheme,
    y0: &[f64],
    t0: f64,
    h: f64,
    steps: usize,
    settings: &IntegrationSettings,
) -> Result<Trajectory> {
    settings.validate()?;
    scheme.check_system(system)?;
    let dim = system.dimension();
    if y0.len() != dim {
        return Err(CauchyError::invalid(format!(
            "Initial state dimension mismatch. Expected {}, got {}.",
            dim,
            y0.len()
        )));
    }
    if let Some(norm) = divergence(y0, settings.divergence_limit) {
        return Err(CauchyError::NumericalDivergence { time: t0, norm });
    }

    let mut stepper = scheme.build(dim, settings.newton);
    let mut trajectory = Trajectory::with_capacity(steps + 1);
    trajectory.push(t0, y0.to_vec());

    for i in 0..steps {
        let t = t0 + i as f64 * h;
        let t_next = t0 + (i + 1) as f64 * h;
        let mut next = vec![0.0; dim];
        let outcome = stepper
            .step(system, t, &trajectory.states[i], h, &mut next)
            .and_then(|()| match divergence(&next, settings.divergence_limit) {
                Some(norm) => Err(CauchyError::NumericalDivergence { time: t_next, norm }),
                None => Ok(()),
            });
        if let Err(source) = outcome {
            log::warn!(
                "{} integration aborted at step {} (t = {}): {}",
                scheme,
                i + 1,
                t_next,
                source
            );
            return Err(CauchyError::StepFailed {
                step: i + 1,
                time: t_next,
                source: Box::new(source),
                partial: Box::new(trajectory),
            });
        }
        trajectory.push(t_next, next);
    }

    Ok(trajectory)
}

fn divergence(state: &[f64], limit: f64) -> Option<f64> {
    if state.iter().any(|v| v.is_nan()) {
        return Some(f64::NAN);
    }
    let norm = state.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
    (!norm.is_finite() || norm > limit).then_some(norm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::systems::{
        KeplerConfig, KeplerProblem, LinearOscillator, OscillatorConfig, ScalarLinear,
    };
    use std::f64::consts::PI;

    fn oscillator() -> LinearOscillator {
        LinearOscillator::new(OscillatorConfig::default()).expect("default omega")
    }

    fn assert_err_contains<T: std::fmt::Debug>(result: Result<T>, needle: &str) {
        let err = result.expect_err("expected error");
        let message = format!("{err}");
        assert!(
            message.contains(needle),
            "expected error to contain \"{needle}\", got \"{message}\""
        );
    }

    #[test]
    fn trajectory_has_uniform_grid() {
        let traj = integrate(&oscillator(), Scheme::Rk4, &[1.0, 0.0], 2.0, 0.1, 25)
            .expect("integration succeeds");
        assert_eq!(traj.len(), 26);
        assert_eq!(traj.dimension(), 2);
        for (i, (t, _)) in traj.iter().enumerate() {
            assert_eq!(t, 2.0 + i as f64 * 0.1);
        }
        assert_eq!(traj.get(0), Some((2.0, &[1.0, 0.0][..])));
        assert_eq!(traj.component(0).len(), 26);
    }

    #[test]
    fn rejects_invalid_inputs() {
        let osc = oscillator();
        assert_err_contains(
            integrate(&osc, Scheme::Rk4, &[1.0, 0.0], 0.0, 0.0, 10),
            "h must be positive",
        );
        assert_err_contains(
            integrate(&osc, Scheme::Rk4, &[1.0, 0.0], 0.0, -0.1, 10),
            "h must be positive",
        );
        assert_err_contains(
            integrate(&osc, Scheme::Rk4, &[1.0, 0.0], 0.0, 0.1, 0),
            "at least one step",
        );
        assert_err_contains(
            integrate(&osc, Scheme::Rk4, &[1.0], 0.0, 0.1, 10),
            "dimension mismatch",
        );
        let settings = IntegrationSettings {
            newton: NewtonSettings {
                max_iter: 0,
                ..NewtonSettings::default()
            },
            ..IntegrationSettings::default()
        };
        let grid = TimeGrid::new(0.0, 0.1, 10).expect("valid grid");
        assert_err_contains(
            integrate_with(&osc, Scheme::InverseEuler, &[1.0, 0.0], &grid, &settings),
            "max_iter",
        );
    }

    #[test]
    fn identical_calls_are_bit_identical() {
        let kepler = KeplerProblem::new(KeplerConfig::default()).expect("default mu");
        let y0 = [1.0, 0.0, 0.0, 1.2];
        for scheme in Scheme::ALL {
            let a = integrate(&kepler, scheme, &y0, 0.0, 0.01, 200).expect("first run");
            let b = integrate(&kepler, scheme, &y0, 0.0, 0.01, 200).expect("second run");
            assert_eq!(a, b, "{scheme}");
        }
    }

    #[test]
    fn crank_nicolson_is_time_reversible() {
        let osc = oscillator();
        let y0 = [1.0, 0.0];
        let (h, steps) = (0.05, 200);
        let settings = IntegrationSettings::default();
        let forward = integrate(&osc, Scheme::CrankNicolson, &y0, 0.0, h, steps)
            .expect("forward run");
        let end = forward.final_state().expect("non-empty");
        let t_end = forward.final_time().expect("non-empty");
        let backward =
            integrate_reverse(&osc, Scheme::CrankNicolson, end, t_end, h, steps, &settings)
                .expect("backward run");
        let back = backward.final_state().expect("non-empty");
        assert!((backward.final_time().expect("non-empty") - 0.0).abs() < 1e-12);
        for i in 0..2 {
            assert!((back[i] - y0[i]).abs() < 1e-8, "component {i}: {}", back[i]);
        }
    }

    #[test]
    fn unstable_explicit_run_reports_divergence_with_partial_result() {
        // |1 + hλ| = 3: explicit Euler blows up geometrically.
        let system = ScalarLinear { lambda: -40.0 };
        let result = integrate(&system, Scheme::ExplicitEuler, &[1.0], 0.0, 0.1, 100);
        let err = result.expect_err("divergent run");
        assert_eq!(err.kind(), ErrorKind::NumericalDivergence);
        let step = err.failed_step().expect("step index");
        // 3^21 > 1e10 > 3^20
        assert_eq!(step, 21);
        let partial = err.partial_trajectory().expect("partial result");
        assert_eq!(partial.len(), step);
        assert_eq!(partial.states[1][0], -3.0);
    }

    #[test]
    fn overflow_to_infinity_diverges_without_a_limit() {
        let settings = IntegrationSettings {
            divergence_limit: f64::INFINITY,
            ..IntegrationSettings::default()
        };
        let grid = TimeGrid::new(0.0, 10.0, 3).expect("valid grid");
        let system = ScalarLinear { lambda: 1e308 };
        let err = integrate_with(&system, Scheme::ExplicitEuler, &[1.0], &grid, &settings)
            .expect_err("infinite state");
        assert_eq!(err.kind(), ErrorKind::NumericalDivergence);
        assert_eq!(err.failed_step(), Some(1));
        assert_eq!(err.partial_trajectory().map(Trajectory::len), Some(1));
        assert_eq!(divergence(&[1.0, f64::NEG_INFINITY], f64::INFINITY), Some(f64::INFINITY));
        assert_eq!(divergence(&[1.0, -2.0], f64::INFINITY), None);
    }

    #[test]
    fn implicit_failure_aborts_at_failing_step() {
        // For y' = 2y with h = 0.5 the backward Euler Jacobian 1 − hλ is zero.
        let system = ScalarLinear { lambda: 2.0 };
        let err = integrate(&system, Scheme::InverseEuler, &[1.0], 0.0, 0.5, 4)
            .expect_err("singular step");
        assert_eq!(err.kind(), ErrorKind::SingularJacobian);
        assert_eq!(err.failed_step(), Some(1));
        assert_eq!(err.partial_trajectory().map(Trajectory::len), Some(1));
    }

    #[test]
    fn leapfrog_rejects_systems_without_position_velocity_split() {
        let err = integrate(&ScalarLinear { lambda: -1.0 }, Scheme::LeapFrog, &[1.0], 0.0, 0.1, 5)
            .expect_err("no split");
        assert_eq!(err.kind(), ErrorKind::InvalidConfiguration);
    }

    #[test]
    fn kepler_leapfrog_conserves_invariants_over_one_period() {
        let kepler = KeplerProblem::new(KeplerConfig::default()).expect("default mu");
        let y0 = kepler.circular_orbit(1.0).expect("valid radius");
        let steps = 10_000;
        let h = 2.0 * PI / steps as f64;
        let traj = integrate(&kepler, Scheme::LeapFrog, &y0, 0.0, h, steps).expect("leapfrog run");

        let e0 = kepler.energy(&y0);
        let l0 = kepler.angular_momentum(&y0);
        for (_, state) in traj.iter() {
            assert!(((kepler.energy(state) - e0) / e0).abs() < 1e-6);
            assert!(((kepler.angular_momentum(state) - l0) / l0).abs() < 1e-6);
        }
    }

    #[test]
    fn kepler_explicit_euler_energy_drifts_monotonically() {
        let kepler = KeplerProblem::new(KeplerConfig::default()).expect("default mu");
        let y0 = kepler.circular_orbit(1.0).expect("valid radius");
        let steps = 10_000;
        let h = 2.0 * PI / steps as f64;
        let traj =
            integrate(&kepler, Scheme::ExplicitEuler, &y0, 0.0, h, steps).expect("euler run");

        let energies: Vec<f64> = traj.states.iter().map(|s| kepler.energy(s)).collect();
        for pair in energies.windows(2) {
            assert!(pair[1] > pair[0]);
        }
        let e0 = energies[0];
        let drift = ((energies[steps] - e0) / e0).abs();
        assert!(drift > 1e-3, "drift {drift}");
    }

    #[test]
    fn batch_runs_match_individual_runs() {
        let osc = oscillator();
        let grid = TimeGrid::new(0.0, 0.05, 40).expect("valid grid");
        let settings = IntegrationSettings::default();
        let initial: Vec<Vec<f64>> = (0..8).map(|k| vec![k as f64 * 0.25, 1.0]).collect();
        let batch = integrate_batch(
            &osc,
            Scheme::CrankNicolson,
            &initial,
            &grid,
            &settings,
            &CancelToken::new(),
        );
        assert_eq!(batch.len(), initial.len());
        for (y0, result) in initial.iter().zip(batch) {
            let single = integrate_with(&osc, Scheme::CrankNicolson, y0, &grid, &settings)
                .expect("single run");
            assert_eq!(result.expect("batch run"), single);
        }

        let token = CancelToken::new();
        token.cancel();
        let cancelled = integrate_batch(&osc, Scheme::Rk4, &initial, &grid, &settings, &token);
        assert!(cancelled
            .iter()
            .all(|r| r.as_ref().is_err_and(|e| e.kind() == ErrorKind::Cancelled)));
    }
}
