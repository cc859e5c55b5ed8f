//! The `cauchy_core` crate is the numerical engine behind the Cauchy error
//! studies: it advances initial-value problems on fixed grids and measures how
//! well each stepping scheme does it.
//!
//! Key components:
//! - **Traits**: `DynamicalSystem` (RHS, optional Jacobian, phase-space layout).
//! - **Systems**: linear oscillator, Kepler two-body problem, scalar test equation.
//! - **Newton**: Newton-Raphson root solver used by the implicit schemes.
//! - **Schemes**: ExplicitEuler, InverseEuler, LeapFrog, CrankNicolson, RK4.
//! - **Integrator**: fixed-step driver producing trajectories.
//! - **Richardson**: extrapolation, global error and convergence-order estimates.
//! - **Stability**: stability masks and boundaries in the complex `hλ` plane.

pub mod error;
pub mod integrator;
pub mod newton;
pub mod parallel;
pub mod richardson;
pub mod schemes;
pub mod stability;
pub mod systems;
pub mod traits;

pub use error::{CauchyError, ErrorKind, Result};
pub use integrator::{
    integrate, integrate_batch, integrate_reverse, integrate_with, IntegrationSettings,
    TimeGrid, Trajectory,
};
pub use newton::{newton_raphson, newton_raphson_fd, NewtonSettings, RootSolution};
pub use parallel::{CancelToken, WorkerPool};
pub use richardson::{richardson, RichardsonReport, RichardsonSettings};
pub use schemes::Scheme;
pub use stability::{stability_region, Resolution, StabilityBounds, StabilityMask};
pub use traits::DynamicalSystem;
