//! # Density Estimator
//!
//! Gaussian 2-D kernel density evaluated at every input point, used as a
//! color channel for scatter plots (grade vs speed).
//!
//! The kernel covariance is the sample covariance scaled by a bandwidth factor
//! (Scott's rule by default). Points are whitened with the Cholesky factor of
//! that covariance so the kernel becomes isotropic, then loaded into an R-tree.
//! Each evaluation only visits neighbors within `cutoff_sigmas` kernel standard
//! deviations; farther points contribute less than `exp(-cutoff²/2)` each.
//!
//! Degenerate input (fewer than two finite points, a constant coordinate, or
//! perfectly correlated coordinates) yields a uniform weight of `1.0` instead
//! of an error. Points with a non-finite coordinate always get weight `0.0`.

use std::f64::consts::PI;
use std::time::Instant;

use log::{debug, warn};
use rstar::{PointDistance, RTree, RTreeObject, AABB};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::TrackError;

/// Weight given to every finite point when the density is undefined.
pub const UNIFORM_WEIGHT: f64 = 1.0;

/// Kernel bandwidth selection.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum Bandwidth {
    /// Scott's rule, `n^(-1/6)` in two dimensions. Silverman's rule gives the
    /// same factor for d = 2.
    #[default]
    Scott,
    /// Fixed factor applied to the sample covariance's standard deviations.
    Fixed(f64),
}

/// Configuration for density estimation.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct DensityConfig {
    /// Bandwidth rule.
    /// Default: Scott
    pub bandwidth: Bandwidth,

    /// Neighbors farther than this many kernel standard deviations are ignored.
    /// Default: 5.0
    pub cutoff_sigmas: f64,
}

impl Default for DensityConfig {
    fn default() -> Self {
        Self {
            bandwidth: Bandwidth::Scott,
            cutoff_sigmas: 5.0,
        }
    }
}

/// A point in whitened kernel space.
#[derive(Debug, Clone, Copy)]
struct WhitenedPoint {
    z: [f64; 2],
}

impl RTreeObject for WhitenedPoint {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.z)
    }
}

impl PointDistance for WhitenedPoint {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let d0 = self.z[0] - point[0];
        let d1 = self.z[1] - point[1];
        d0 * d0 + d1 * d1
    }
}

/// Lower-triangular Cholesky factor `[[a, 0], [b, c]]` of the kernel covariance,
/// plus the sample mean.
#[derive(Debug, Clone, Copy)]
struct Whitening {
    mean: [f64; 2],
    a: f64,
    b: f64,
    c: f64,
}

impl Whitening {
    /// `None` when the covariance is singular.
    fn fit(points: &[[f64; 2]], bandwidth: Bandwidth) -> Option<Self> {
        let n = points.len();
        if n < 2 {
            return None;
        }
        let nf = n as f64;
        let mean = [
            points.iter().map(|p| p[0]).sum::<f64>() / nf,
            points.iter().map(|p| p[1]).sum::<f64>() / nf,
        ];

        let (mut sxx, mut syy, mut sxy) = (0.0, 0.0, 0.0);
        for p in points {
            let dx = p[0] - mean[0];
            let dy = p[1] - mean[1];
            sxx += dx * dx;
            syy += dy * dy;
            sxy += dx * dy;
        }
        sxx /= nf - 1.0;
        syy /= nf - 1.0;
        sxy /= nf - 1.0;

        let factor = match bandwidth {
            Bandwidth::Fixed(f) if f.is_finite() && f > 0.0 => f,
            Bandwidth::Fixed(f) => {
                warn!("[Density] Ignoring invalid bandwidth factor {}, using Scott", f);
                nf.powf(-1.0 / 6.0)
            }
            Bandwidth::Scott => nf.powf(-1.0 / 6.0),
        };
        let f2 = factor * factor;
        let (kxx, kyy, kxy) = (sxx * f2, syy * f2, sxy * f2);

        if !(kxx > 0.0) || !(kyy > 0.0) {
            return None;
        }
        let a = kxx.sqrt();
        let b = kxy / a;
        let c2 = kyy - b * b;
        // Relative test so scale does not matter
        if !(c2 > kyy * 1e-12) {
            return None;
        }
        Some(Self { mean, a, b, c: c2.sqrt() })
    }

    fn apply(&self, p: [f64; 2]) -> [f64; 2] {
        let z0 = (p[0] - self.mean[0]) / self.a;
        let z1 = (p[1] - self.mean[1] - self.b * z0) / self.c;
        [z0, z1]
    }

    /// `2π · sqrt(det(H))`
    fn kernel_norm(&self) -> f64 {
        2.0 * PI * self.a * self.c
    }
}

/// Kernel density at each `(x[i], y[i])` against the full point set.
///
/// Fails only when `x` and `y` differ in length. The result has one weight
/// per input point, in input order.
pub fn density_weights(x: &[f64], y: &[f64], config: &DensityConfig) -> Result<Vec<f64>, TrackError> {
    if x.len() != y.len() {
        return Err(TrackError::LengthMismatch { left: x.len(), right: y.len() });
    }
    if x.is_empty() {
        return Ok(Vec::new());
    }

    let start = Instant::now();
    let finite: Vec<(usize, [f64; 2])> = x
        .iter()
        .zip(y)
        .enumerate()
        .filter(|(_, (a, b))| a.is_finite() && b.is_finite())
        .map(|(i, (&a, &b))| (i, [a, b]))
        .collect();

    let mut weights = vec![0.0; x.len()];
    let points: Vec<[f64; 2]> = finite.iter().map(|&(_, p)| p).collect();

    let Some(whitening) = Whitening::fit(&points, config.bandwidth) else {
        debug!(
            "[Density] Degenerate input ({} finite of {}), using uniform weights",
            points.len(),
            x.len()
        );
        for &(i, _) in &finite {
            weights[i] = UNIFORM_WEIGHT;
        }
        return Ok(weights);
    };

    let whitened: Vec<[f64; 2]> = points.iter().map(|&p| whitening.apply(p)).collect();
    let tree = RTree::bulk_load(whitened.iter().map(|&z| WhitenedPoint { z }).collect());
    let cutoff = if config.cutoff_sigmas > 0.0 { config.cutoff_sigmas } else { 5.0 };
    let cutoff_2 = cutoff * cutoff;
    let norm = points.len() as f64 * whitening.kernel_norm();

    let evaluate = |z: &[f64; 2]| -> f64 {
        let sum: f64 = tree
            .locate_within_distance(*z, cutoff_2)
            .map(|q| (-0.5 * q.distance_2(z)).exp())
            .sum();
        sum / norm
    };

    #[cfg(feature = "parallel")]
    let values: Vec<f64> = whitened.par_iter().map(evaluate).collect();

    #[cfg(not(feature = "parallel"))]
    let values: Vec<f64> = whitened.iter().map(evaluate).collect();

    for (&(i, _), value) in finite.iter().zip(values) {
        weights[i] = value;
    }

    debug!(
        "[Density] Evaluated {} points in {}ms",
        points.len(),
        start.elapsed().as_millis()
    );
    Ok(weights)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
        (a - b).abs() < epsilon
    }

    #[test]
    fn test_length_mismatch() {
        let result = density_weights(&[1.0, 2.0], &[1.0], &DensityConfig::default());
        assert!(matches!(result, Err(TrackError::LengthMismatch { left: 2, right: 1 })));
    }

    #[test]
    fn test_empty_input() {
        assert!(density_weights(&[], &[], &DensityConfig::default()).unwrap().is_empty());
    }

    #[test]
    fn test_degenerate_inputs_are_uniform() {
        let config = DensityConfig::default();
        assert_eq!(density_weights(&[3.0], &[4.0], &config).unwrap(), vec![1.0]);

        // Constant x
        let w = density_weights(&[2.0; 5], &[1.0, 2.0, 3.0, 4.0, 5.0], &config).unwrap();
        assert_eq!(w, vec![1.0; 5]);

        // y = 2x lies on a line
        let x = [1.0, 2.0, 3.0, 4.0];
        let y = [2.0, 4.0, 6.0, 8.0];
        assert_eq!(density_weights(&x, &y, &config).unwrap(), vec![1.0; 4]);
    }

    #[test]
    fn test_non_finite_points_get_zero() {
        let x = [0.0, 1.0, f64::NAN, 0.0, 2.0];
        let y = [0.0, 0.0, 1.0, 1.0, f64::INFINITY];
        let w = density_weights(&x, &y, &DensityConfig::default()).unwrap();
        assert_eq!(w.len(), 5);
        assert_eq!(w[2], 0.0);
        assert_eq!(w[4], 0.0);
        assert!(w[0] > 0.0 && w[1] > 0.0 && w[3] > 0.0);
    }

    #[test]
    fn test_triangle_matches_closed_form() {
        // Covariance [[1/3, -1/6], [-1/6, 1/3]], every pair has Mahalanobis² = 4
        let x = [0.0, 1.0, 0.0];
        let y = [0.0, 0.0, 1.0];
        let w = density_weights(&x, &y, &DensityConfig::default()).unwrap();

        let f2 = 3f64.powf(-1.0 / 3.0);
        let det_sqrt = (1.0f64 / 12.0).sqrt() * f2;
        let expected = (1.0 + 2.0 * (-0.5 * 4.0 / f2).exp()) / (3.0 * 2.0 * PI * det_sqrt);
        for v in w {
            assert!(approx_eq(v, expected, 1e-12), "{} vs {}", v, expected);
        }
    }

    #[test]
    fn test_cluster_denser_than_outlier() {
        let mut x: Vec<f64> = (0..50).map(|i| (i % 7) as f64 * 0.1).collect();
        let mut y: Vec<f64> = (0..50).map(|i| (i % 5) as f64 * 0.1).collect();
        x.push(3.0);
        y.push(-2.0);
        let w = density_weights(&x, &y, &DensityConfig::default()).unwrap();
        let outlier = w[50];
        assert!(w[..50].iter().all(|&v| v > outlier));
    }

    #[test]
    fn test_fixed_bandwidth_uses_sample_covariance() {
        let x = [0.0, 1.0, 0.0];
        let y = [0.0, 0.0, 1.0];
        let config = DensityConfig { bandwidth: Bandwidth::Fixed(1.0), ..Default::default() };
        let w = density_weights(&x, &y, &config).unwrap();

        let expected = (1.0 + 2.0 * (-2.0f64).exp()) / (3.0 * 2.0 * PI * (1.0f64 / 12.0).sqrt());
        for v in w {
            assert!(approx_eq(v, expected, 1e-12));
        }
    }

    #[test]
    fn test_invalid_fixed_bandwidth_falls_back() {
        let x = [0.0, 1.0, 0.0];
        let y = [0.0, 0.0, 1.0];
        let scott = density_weights(&x, &y, &DensityConfig::default()).unwrap();
        let bad = density_weights(
            &x,
            &y,
            &DensityConfig { bandwidth: Bandwidth::Fixed(-1.0), ..Default::default() },
        )
        .unwrap();
        assert_eq!(scott, bad);
    }
}
