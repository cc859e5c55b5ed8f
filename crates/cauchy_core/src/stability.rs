//! Linear stability regions in the complex `z = hλ` plane.
//!
//! Every sample point is classified by the scheme's worst-case per-step growth,
//! `|R(z)|` for one-step schemes or the largest characteristic-root magnitude
//! for LeapFrog. The `|growth| = 1` contour is traced with marching squares.

use crate::error::{CauchyError, Result};
use crate::parallel::CancelToken;
use crate::schemes::Scheme;
use num_complex::Complex;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Slack on `growth ≤ 1` so that points exactly on a boundary such as the
/// imaginary axis for Crank-Nicolson are not lost to rounding.
const STABILITY_EPS: f64 = 1e-12;
/// Growth values are clipped here before contouring so poles stay finite.
const CONTOUR_CLIP: f64 = 1e6;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StabilityBounds {
    pub re_min: f64,
    pub re_max: f64,
    pub im_min: f64,
    pub im_max: f64,
}

impl Default for StabilityBounds {
    fn default() -> Self {
        Self {
            re_min: -3.0,
            re_max: 1.0,
            im_min: -2.0,
            im_max: 2.0,
        }
    }
}

/// Number of samples along the real (`nx`) and imaginary (`ny`) axes,
/// both bounds included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub nx: usize,
    pub ny: usize,
}

impl Default for Resolution {
    fn default() -> Self {
        Self { nx: 200, ny: 200 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundarySegment {
    pub start: Complex<f64>,
    pub end: Complex<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StabilityMask {
    pub scheme: Scheme,
    pub bounds: StabilityBounds,
    pub resolution: Resolution,
    /// Growth factor per sample, row-major with the real axis varying fastest.
    pub growth: Vec<f64>,
    pub stable: Vec<bool>,
}

impl StabilityMask {
    fn step_re(&self) -> f64 {
        (self.bounds.re_max - self.bounds.re_min) / (self.resolution.nx - 1) as f64
    }

    fn step_im(&self) -> f64 {
        (self.bounds.im_max - self.bounds.im_min) / (self.resolution.ny - 1) as f64
    }

    fn index(&self, ix: usize, iy: usize) -> usize {
        ix + iy * self.resolution.nx
    }

    pub fn point(&self, ix: usize, iy: usize) -> Complex<f64> {
        Complex::new(
            self.bounds.re_min + self.step_re() * ix as f64,
            self.bounds.im_min + self.step_im() * iy as f64,
        )
    }

    pub fn is_stable(&self, ix: usize, iy: usize) -> bool {
        self.stable[self.index(ix, iy)]
    }

    pub fn growth_at(&self, ix: usize, iy: usize) -> f64 {
        self.growth[self.index(ix, iy)]
    }

    pub fn stable_count(&self) -> usize {
        self.stable.iter().filter(|&&s| s).count()
    }

    pub fn stable_fraction(&self) -> f64 {
        self.stable_count() as f64 / self.stable.len() as f64
    }

    /// Piecewise-linear trace of the `growth = 1` contour.
    pub fn boundary(&self) -> Vec<BoundarySegment> {
        let (nx, ny) = (self.resolution.nx, self.resolution.ny);
        if nx < 2 || ny < 2 || nx.checked_mul(ny) != Some(self.growth.len()) {
            return Vec::new();
        }
        let level = |ix: usize, iy: usize| self.growth_at(ix, iy).min(CONTOUR_CLIP) - 1.0;

        let mut segments = Vec::new();
        for iy in 0..ny - 1 {
            for ix in 0..nx - 1 {
                let v = [
                    level(ix, iy),
                    level(ix + 1, iy),
                    level(ix + 1, iy + 1),
                    level(ix, iy + 1),
                ];
                let mut case_index = 0u8;
                for (bit, value) in v.iter().enumerate() {
                    if *value >= 0.0 {
                        case_index |= 1 << bit;
                    }
                }
                let lower = self.point(ix, iy);
                let upper = self.point(ix + 1, iy + 1);
                for &(edge_a, edge_b) in marching_squares_edge_pairs(case_index) {
                    segments.push(BoundarySegment {
                        start: interpolate_square_edge(edge_a, lower, upper, &v),
                        end: interpolate_square_edge(edge_b, lower, upper, &v),
                    });
                }
            }
        }
        segments
    }
}

pub fn stability_region(
    scheme: Scheme,
    bounds: &StabilityBounds,
    resolution: &Resolution,
) -> Result<StabilityMask> {
    stability_region_cancellable(scheme, bounds, resolution, &CancelToken::new())
}

pub fn stability_region_cancellable(
    scheme: Scheme,
    bounds: &StabilityBounds,
    resolution: &Resolution,
    cancel: &CancelToken,
) -> Result<StabilityMask> {
    let finite = [bounds.re_min, bounds.re_max, bounds.im_min, bounds.im_max]
        .iter()
        .all(|v| v.is_finite());
    if !finite || bounds.re_max <= bounds.re_min || bounds.im_max <= bounds.im_min {
        return Err(CauchyError::invalid(
            "Stability bounds must be finite with max > min on both axes.",
        ));
    }
    if resolution.nx < 2 || resolution.ny < 2 {
        return Err(CauchyError::invalid(
            "Stability grid needs at least 2 samples per axis.",
        ));
    }
    let cells = resolution
        .nx
        .checked_mul(resolution.ny)
        .ok_or_else(|| CauchyError::invalid("Stability grid is too large."))?;

    let nx = resolution.nx;
    let step_re = (bounds.re_max - bounds.re_min) / (nx - 1) as f64;
    let step_im = (bounds.im_max - bounds.im_min) / (resolution.ny - 1) as f64;
    let growth = (0..cells)
        .into_par_iter()
        .map(|idx| {
            cancel.check()?;
            let (ix, iy) = (idx % nx, idx / nx);
            let z = Complex::new(
                bounds.re_min + step_re * ix as f64,
                bounds.im_min + step_im * iy as f64,
            );
            Ok(scheme.growth_factor(z))
        })
        .collect::<Result<Vec<f64>>>()?;
    let stable = growth.iter().map(|&g| g <= 1.0 + STABILITY_EPS).collect();

    Ok(StabilityMask {
        scheme,
        bounds: *bounds,
        resolution: *resolution,
        growth,
        stable,
    })
}

// Corners are numbered counter-clockwise from (x0, y0); edge k joins corner k
// and corner k + 1.
fn marching_squares_edge_pairs(case_index: u8) -> &'static [(u8, u8)] {
    match case_index {
        1 | 14 => &[(3, 0)],
        2 | 13 => &[(0, 1)],
        3 | 12 => &[(3, 1)],
        4 | 11 => &[(1, 2)],
        5 => &[(3, 2), (0, 1)],
        6 | 9 => &[(0, 2)],
        7 | 8 => &[(2, 3)],
        10 => &[(0, 3), (1, 2)],
        _ => &[],
    }
}

fn interpolate_square_edge(
    edge: u8,
    lower: Complex<f64>,
    upper: Complex<f64>,
    v: &[f64; 4],
) -> Complex<f64> {
    let (x0, y0, x1, y1) = (lower.re, lower.im, upper.re, upper.im);
    match edge {
        0 => Complex::new(x0 + (x1 - x0) * interpolate_factor(v[0], v[1]), y0),
        1 => Complex::new(x1, y0 + (y1 - y0) * interpolate_factor(v[1], v[2])),
        2 => Complex::new(x1 + (x0 - x1) * interpolate_factor(v[2], v[3]), y1),
        _ => Complex::new(x0, y1 + (y0 - y1) * interpolate_factor(v[3], v[0])),
    }
}

fn interpolate_factor(v0: f64, v1: f64) -> f64 {
    let denominator = v0 - v1;
    if denominator.abs() <= 1e-12 {
        0.5
    } else {
        (v0 / denominator).clamp(0.0, 1.0)
    }
}
