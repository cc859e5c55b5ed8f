//! Error types shared by every layer of the engine.
//!
//! Failures are values: the root solver reports them to the scheme step, the
//! step hands them to the driver unchanged, and the driver wraps them with the
//! index of the state it could not produce.

use crate::integrator::Trajectory;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CauchyError>;

#[derive(Debug, Error)]
pub enum CauchyError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Newton iteration did not converge in {iterations} iterations (last ‖Δx‖ = {step_norm:e}).")]
    NonConvergence { iterations: usize, step_norm: f64 },

    #[error("Jacobian is singular at Newton iteration {iteration}.")]
    SingularJacobian { iteration: usize },

    #[error("Numerical divergence at t = {time}: ‖y‖∞ = {norm:e}.")]
    NumericalDivergence { time: f64, norm: f64 },

    #[error("Integration aborted at step {step} (t = {time}): {source}")]
    StepFailed {
        step: usize,
        time: f64,
        source: Box<CauchyError>,
        partial: Box<Trajectory>,
    },

    #[error("Computation was cancelled.")]
    Cancelled,
}

/// Root failure category, independent of where in the stack it surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidConfiguration,
    NonConvergence,
    SingularJacobian,
    NumericalDivergence,
    Cancelled,
}

impl CauchyError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        CauchyError::InvalidConfiguration(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CauchyError::InvalidConfiguration(_) => ErrorKind::InvalidConfiguration,
            CauchyError::NonConvergence { .. } => ErrorKind::NonConvergence,
            CauchyError::SingularJacobian { .. } => ErrorKind::SingularJacobian,
            CauchyError::NumericalDivergence { .. } => ErrorKind::NumericalDivergence,
            CauchyError::StepFailed { source, .. } => source.kind(),
            CauchyError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Index of the state that could not be produced, if the failure came
    /// from an integration run.
    pub fn failed_step(&self) -> Option<usize> {
        match self {
            CauchyError::StepFailed { step, .. } => Some(*step),
            _ => None,
        }
    }

    /// States computed before the failing step. They remain valid.
    pub fn partial_trajectory(&self) -> Option<&Trajectory> {
        match self {
            CauchyError::StepFailed { partial, .. } => Some(partial),
            _ => None,
        }
    }
}
