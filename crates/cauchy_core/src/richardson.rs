//! Global-error and convergence-order estimation by Richardson extrapolation.
//!
//! The same problem is integrated over the same span at step sizes `h`,
//! `h/r` and `h/r²`. With the scheme's nominal order `p` the two coarsest
//! levels give the extrapolated value
//!
//! ```text
//! y* = (r^p · y_{h/r} − y_h) / (r^p − 1)
//! ```
//!
//! and the error estimate of the base run `‖y_h − y_{h/r}‖ / (1 − r^{−p})`.
//! The empirical order comes from comparing errors across levels, against the
//! closed-form solution when the system has one and against the finest run
//! otherwise.

use crate::error::{CauchyError, Result};
use crate::integrator::{integrate_with, IntegrationSettings, TimeGrid, Trajectory};
use crate::parallel::{map_cancellable, CancelToken};
use crate::schemes::Scheme;
use crate::traits::DynamicalSystem;
use serde::{Deserialize, Serialize};

const REFINEMENT_LEVELS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RichardsonSettings {
    /// Refinement ratio between consecutive levels.
    pub ratio: f64,
    /// Accepted |p_est − p| before the estimate is flagged.
    pub order_tolerance: f64,
    pub integration: IntegrationSettings,
}

impl Default for RichardsonSettings {
    fn default() -> Self {
        Self {
            ratio: 2.0,
            order_tolerance: 0.3,
            integration: IntegrationSettings::default(),
        }
    }
}

impl RichardsonSettings {
    pub fn validate(&self) -> Result<()> {
        if !self.ratio.is_finite() || self.ratio <= 1.0 {
            return Err(CauchyError::invalid("Refinement ratio r must be greater than 1."));
        }
        if !(self.order_tolerance >= 0.0) {
            return Err(CauchyError::invalid("order_tolerance must be non-negative."));
        }
        self.integration.validate()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    Analytic,
    FinestRun,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelResult {
    pub step_size: f64,
    pub steps: usize,
    pub final_state: Vec<f64>,
    /// Distance of `final_state` from the reference solution.
    pub error: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RichardsonReport {
    pub scheme: Scheme,
    pub nominal_order: u32,
    pub estimated_order: f64,
    /// Order estimates from each consecutive pair of levels.
    pub pairwise_orders: Vec<f64>,
    pub extrapolated: Vec<f64>,
    /// Estimated global error of the base (step `h`) run.
    pub error_estimate: f64,
    pub levels: Vec<LevelResult>,
    pub reference: ReferenceKind,
    pub order_within_tolerance: bool,
}

impl RichardsonReport {
    pub fn per_level_errors(&self) -> Vec<f64> {
        self.levels.iter().map(|level| level.error).collect()
    }
}

pub fn richardson<S>(
    system: &S,
    scheme: Scheme,
    y0: &[f64],
    t0: f64,
    span: f64,
    h: f64,
    settings: &RichardsonSettings,
) -> Result<RichardsonReport>
where
    S: DynamicalSystem + Sync,
{
    richardson_cancellable(system, scheme, y0, t0, span, h, settings, &CancelToken::new())
}

#[allow(clippy::too_many_arguments)]
pub fn richardson_cancellable<S>(
    system: &S,
    scheme: Scheme,
    y0: &[f64],
    t0: f64,
    span: f64,
    h: f64,
    settings: &RichardsonSettings,
    cancel: &CancelToken,
) -> Result<RichardsonReport>
where
    S: DynamicalSystem + Sync,
{
    settings.validate()?;
    let r = settings.ratio;
    let base_steps = steps_for_span(span, h)?;
    let level_steps = (0..REFINEMENT_LEVELS)
        .map(|k| refined_steps(base_steps, r.powi(k as i32)))
        .collect::<Result<Vec<_>>>()?;

    let runs = run_levels(system, scheme, y0, t0, span, &level_steps, settings, cancel)?;
    let finals: Vec<&[f64]> = runs
        .iter()
        .map(|traj| traj.final_state().unwrap_or(&[]))
        .collect();

    let p = scheme.order();
    let rp = r.powi(p as i32);
    let extrapolated: Vec<f64> = finals[0]
        .iter()
        .zip(finals[1])
        .map(|(coarse, fine)| (rp * fine - coarse) / (rp - 1.0))
        .collect();
    let error_estimate = l2_distance(finals[0], finals[1]) / (1.0 - 1.0 / rp);

    let exact = system.exact_solution(t0, y0, t0 + span);
    let (reference, errors, pairwise_orders) = match exact {
        Some(exact) => {
            let errors: Vec<f64> = finals.iter().map(|y| l2_distance(y, &exact)).collect();
            let orders: Vec<f64> = errors
                .windows(2)
                .map(|pair| observed_order(pair[0], pair[1], r))
                .collect();
            (ReferenceKind::Analytic, errors, orders)
        }
        None => {
            let finest = finals[finals.len() - 1];
            let errors: Vec<f64> = finals.iter().map(|y| l2_distance(y, finest)).collect();
            let differences: Vec<f64> = finals
                .windows(2)
                .map(|pair| l2_distance(pair[0], pair[1]))
                .collect();
            let orders: Vec<f64> = differences
                .windows(2)
                .map(|pair| observed_order(pair[0], pair[1], r))
                .collect();
            (ReferenceKind::FinestRun, errors, orders)
        }
    };
    let estimated_order = pairwise_orders.first().copied().unwrap_or(f64::NAN);
    let order_within_tolerance = (estimated_order - p as f64).abs() <= settings.order_tolerance;
    if !order_within_tolerance {
        log::warn!(
            "{} observed order {:.3} deviates from nominal order {} by more than {}",
            scheme,
            estimated_order,
            p,
            settings.order_tolerance
        );
    }

    let levels = level_steps
        .iter()
        .zip(finals)
        .zip(errors)
        .map(|((&steps, state), error)| LevelResult {
            step_size: span / steps as f64,
            steps,
            final_state: state.to_vec(),
            error,
        })
        .collect();

    Ok(RichardsonReport {
        scheme,
        nominal_order: p,
        estimated_order,
        pairwise_orders,
        extrapolated,
        error_estimate,
        levels,
        reference,
        order_within_tolerance,
    })
}

/// Richardson estimate of the global error of the step-`h` run at every
/// coarse grid time:
///
/// ```text
/// E(t_n) = (U_h(t_n) − U_{h/r}(t_{r·n})) / (1 − r^{−p})
/// ```
///
/// `settings.ratio` must be an integer so both grids share the coarse times.
pub fn error_history<S>(
    system: &S,
    scheme: Scheme,
    y0: &[f64],
    t0: f64,
    span: f64,
    h: f64,
    settings: &RichardsonSettings,
) -> Result<Trajectory>
where
    S: DynamicalSystem + Sync,
{
    settings.validate()?;
    let r = settings.ratio;
    if (r - r.round()).abs() > 1e-12 {
        return Err(CauchyError::invalid(
            "Error history needs an integer refinement ratio.",
        ));
    }
    let stride = r.round() as usize;
    let base_steps = steps_for_span(span, h)?;
    let fine_steps = (r < usize::MAX as f64)
        .then(|| base_steps.checked_mul(stride))
        .flatten()
        .filter(|steps| steps.checked_add(1).is_some())
        .ok_or_else(|| CauchyError::invalid("Refined step count overflows usize."))?;
    let level_steps = [base_steps, fine_steps];
    let runs = run_levels(
        system,
        scheme,
        y0,
        t0,
        span,
        &level_steps,
        settings,
        &CancelToken::new(),
    )?;
    let (coarse, fine) = (&runs[0], &runs[1]);

    let denom = 1.0 - r.powi(-(scheme.order() as i32));
    let states = coarse
        .states
        .iter()
        .enumerate()
        .map(|(n, u1)| {
            let u2 = &fine.states[n * stride];
            u1.iter().zip(u2).map(|(a, b)| (a - b) / denom).collect()
        })
        .collect();

    Ok(Trajectory {
        times: coarse.times.clone(),
        states,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergencePoint {
    pub steps: usize,
    pub log10_steps: f64,
    /// log10 ‖U_N(T) − U_2N(T)‖
    pub log10_error: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceStudy {
    pub scheme: Scheme,
    pub points: Vec<ConvergencePoint>,
    /// Negated least-squares slope of log10 error against log10 N.
    pub order: f64,
}

/// Convergence curve over `N_k = base_steps · 2^k`, `k = 0..levels`.
#[allow(clippy::too_many_arguments)]
pub fn convergence_study<S>(
    system: &S,
    scheme: Scheme,
    y0: &[f64],
    t0: f64,
    span: f64,
    base_steps: usize,
    levels: usize,
    settings: &IntegrationSettings,
) -> Result<ConvergenceStudy>
where
    S: DynamicalSystem + Sync,
{
    if base_steps == 0 {
        return Err(CauchyError::invalid("base_steps must be at least 1."));
    }
    if levels < 2 {
        return Err(CauchyError::invalid(
            "A convergence study needs at least two levels.",
        ));
    }
    if !span.is_finite() || span <= 0.0 {
        return Err(CauchyError::invalid("Time span must be positive."));
    }
    let step_counts = (0..=levels)
        .map(|k| {
            u32::try_from(k)
                .ok()
                .and_then(|k| 2usize.checked_pow(k))
                .and_then(|factor| base_steps.checked_mul(factor))
                .ok_or_else(|| CauchyError::invalid("Requested step counts overflow usize."))
        })
        .collect::<Result<Vec<_>>>()?;

    let richardson_settings = RichardsonSettings {
        integration: *settings,
        ..RichardsonSettings::default()
    };
    let runs = run_levels(
        system,
        scheme,
        y0,
        t0,
        span,
        &step_counts,
        &richardson_settings,
        &CancelToken::new(),
    )?;

    let points: Vec<ConvergencePoint> = runs
        .windows(2)
        .zip(&step_counts)
        .map(|(pair, &steps)| {
            let coarse = pair[0].final_state().unwrap_or(&[]);
            let fine = pair[1].final_state().unwrap_or(&[]);
            ConvergencePoint {
                steps,
                log10_steps: (steps as f64).log10(),
                log10_error: l2_distance(coarse, fine).log10(),
            }
        })
        .collect();

    let order = -least_squares_slope(
        points
            .iter()
            .filter(|p| p.log10_error.is_finite())
            .map(|p| (p.log10_steps, p.log10_error)),
    );

    Ok(ConvergenceStudy {
        scheme,
        points,
        order,
    })
}

#[allow(clippy::too_many_arguments)]
fn run_levels<S>(
    system: &S,
    scheme: Scheme,
    y0: &[f64],
    t0: f64,
    span: f64,
    level_steps: &[usize],
    settings: &RichardsonSettings,
    cancel: &CancelToken,
) -> Result<Vec<Trajectory>>
where
    S: DynamicalSystem + Sync,
{
    map_cancellable(level_steps, cancel, |&steps| {
        let grid = TimeGrid::new(t0, span / steps as f64, steps)?;
        let traj = integrate_with(system, scheme, y0, &grid, &settings.integration)?;
        log::debug!("{} level with {} steps finished", scheme, steps);
        Ok(traj)
    })
    .into_iter()
    .collect()
}

fn steps_for_span(span: f64, h: f64) -> Result<usize> {
    if !span.is_finite() || span <= 0.0 {
        return Err(CauchyError::invalid("Time span must be positive."));
    }
    if !h.is_finite() || h <= 0.0 {
        return Err(CauchyError::invalid("Step size h must be positive."));
    }
    whole_steps(span / h).ok_or_else(|| {
        CauchyError::invalid(format!(
            "Span {span} is not a whole number of steps of size {h}."
        ))
    })
}

fn refined_steps(base_steps: usize, factor: f64) -> Result<usize> {
    whole_steps(base_steps as f64 * factor).ok_or_else(|| {
        CauchyError::invalid(format!(
            "{base_steps} steps refined by {factor} is not a whole number of steps."
        ))
    })
}

fn whole_steps(count: f64) -> Option<usize> {
    let rounded = count.round();
    if rounded < 1.0 || rounded > usize::MAX as f64 {
        return None;
    }
    ((count - rounded).abs() <= 1e-9 * rounded).then_some(rounded as usize)
}

fn observed_order(coarse_error: f64, fine_error: f64, ratio: f64) -> f64 {
    (coarse_error / fine_error).ln() / ratio.ln()
}

fn l2_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

fn least_squares_slope(points: impl Iterator<Item = (f64, f64)>) -> f64 {
    let points: Vec<(f64, f64)> = points.collect();
    if points.len() < 2 {
        return f64::NAN;
    }
    let n = points.len() as f64;
    let mean_x = points.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = points.iter().map(|p| p.1).sum::<f64>() / n;
    let sxy: f64 = points.iter().map(|p| (p.0 - mean_x) * (p.1 - mean_y)).sum();
    let sxx: f64 = points.iter().map(|p| (p.0 - mean_x).powi(2)).sum();
    sxy / sxx
}
