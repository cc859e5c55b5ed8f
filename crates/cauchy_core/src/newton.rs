use crate::error::{CauchyError, Result};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewtonSettings {
    pub max_iter: usize,
    /// Absolute tolerance on the Newton update ‖x_{k+1} − x_k‖₂.
    pub tolerance: f64,
    /// Smallest accepted ratio between the extreme LU pivots before the
    /// Jacobian is treated as singular.
    pub singular_pivot_ratio: f64,
}

impl Default for NewtonSettings {
    fn default() -> Self {
        Self {
            max_iter: 50,
            tolerance: 1e-12,
            singular_pivot_ratio: 1e-14,
        }
    }
}

impl NewtonSettings {
    pub fn validate(&self) -> Result<()> {
        if self.max_iter == 0 {
            return Err(CauchyError::invalid("max_iter must be at least 1."));
        }
        if !self.tolerance.is_finite() || self.tolerance <= 0.0 {
            return Err(CauchyError::invalid("tolerance must be positive."));
        }
        if !(self.singular_pivot_ratio >= 0.0) {
            return Err(CauchyError::invalid(
                "singular_pivot_ratio must be non-negative.",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootSolution {
    pub root: Vec<f64>,
    pub iterations: usize,
    /// Norm of the last accepted update.
    pub step_norm: f64,
}

/// Newton-Raphson on a vector residual.
///
/// `residual(x, out)` writes g(x) into `out`; `jacobian(x)` returns Dg(x).
/// Iterates until the update norm drops below `settings.tolerance`. A
/// Jacobian that cannot be factorised is reported as `SingularJacobian`, and
/// running out of iterations (or producing a non-finite iterate) as
/// `NonConvergence`.
pub fn newton_raphson<G, J>(
    residual: G,
    jacobian: J,
    x0: &[f64],
    settings: &NewtonSettings,
) -> Result<RootSolution>
where
    G: Fn(&[f64], &mut [f64]),
    J: Fn(&[f64]) -> DMatrix<f64>,
{
    settings.validate()?;
    let dim = x0.len();
    if dim == 0 {
        return Err(CauchyError::invalid("Initial guess must be non-empty."));
    }

    let mut x = x0.to_vec();
    let mut g = vec![0.0; dim];
    let mut step_norm = f64::INFINITY;

    for iteration in 0..settings.max_iter {
        residual(&x, &mut g);
        let jac = jacobian(&x);
        if jac.nrows() != dim || jac.ncols() != dim {
            return Err(CauchyError::invalid(format!(
                "Jacobian shape {}x{} does not match dimension {}.",
                jac.nrows(),
                jac.ncols(),
                dim
            )));
        }
        let delta = solve_linear_system(jac, &g, settings.singular_pivot_ratio)
            .ok_or(CauchyError::SingularJacobian { iteration })?;

        for i in 0..dim {
            x[i] -= delta[i];
        }
        step_norm = delta.norm();

        if !step_norm.is_finite() || x.iter().any(|v| !v.is_finite()) {
            return Err(CauchyError::NonConvergence {
                iterations: iteration + 1,
                step_norm,
            });
        }
        if step_norm < settings.tolerance {
            log::debug!(
                "Newton converged in {} iterations (‖Δx‖ = {:e}).",
                iteration + 1,
                step_norm
            );
            return Ok(RootSolution {
                root: x,
                iterations: iteration + 1,
                step_norm,
            });
        }
    }

    Err(CauchyError::NonConvergence {
        iterations: settings.max_iter,
        step_norm,
    })
}

/// Newton-Raphson with a forward-difference Jacobian of `residual`.
pub fn newton_raphson_fd<G>(
    residual: G,
    x0: &[f64],
    settings: &NewtonSettings,
) -> Result<RootSolution>
where
    G: Fn(&[f64], &mut [f64]),
{
    newton_raphson(
        &residual,
        |x: &[f64]| finite_difference_jacobian(&residual, x),
        x0,
        settings,
    )
}

/// Forward-difference approximation of the Jacobian of `func` at `x`.
pub fn finite_difference_jacobian<F>(func: F, x: &[f64]) -> DMatrix<f64>
where
    F: Fn(&[f64], &mut [f64]),
{
    let dim = x.len();
    let sqrt_eps = f64::EPSILON.sqrt();
    let mut base = vec![0.0; dim];
    func(x, &mut base);

    let mut jac = DMatrix::zeros(dim, dim);
    let mut shifted = x.to_vec();
    let mut out = vec![0.0; dim];
    for j in 0..dim {
        let step = sqrt_eps * x[j].abs().max(1.0);
        shifted[j] = x[j] + step;
        func(&shifted, &mut out);
        for i in 0..dim {
            jac[(i, j)] = (out[i] - base[i]) / step;
        }
        shifted[j] = x[j];
    }
    jac
}

fn solve_linear_system(
    jacobian: DMatrix<f64>,
    rhs: &[f64],
    singular_pivot_ratio: f64,
) -> Option<DVector<f64>> {
    let lu = jacobian.lu();
    let u = lu.u();
    let pivots = u.diagonal().map(f64::abs);
    let max_pivot = pivots.max();
    let min_pivot = pivots.min();
    if !lu.is_invertible() || max_pivot == 0.0 || min_pivot / max_pivot < singular_pivot_ratio {
        return None;
    }
    lu.solve(&DVector::from_column_slice(rhs))
}
