//! # Geographic Utilities
//!
//! Distance computation between track samples, plus bounding helpers used by
//! map collaborators.
//!
//! ## Overview
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`flat_distance`] | Surface distance between two samples (geodesic or haversine) |
//! | [`sample_distance`] | Surface distance combined with the elevation delta |
//! | [`compute_bounds`] | Bounding box of a set of samples |
//! | [`compute_center`] | Centroid of a set of samples |
//!
//! ## Example
//!
//! ```rust
//! use chrono::{TimeZone, Utc};
//! use track_analytics::{DistanceModel, Sample, geo_utils};
//!
//! let t = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
//! let a = Sample::new(t, 51.5074, -0.1278, 10.0);
//! let b = Sample::new(t, 51.5084, -0.1278, 25.0);
//!
//! let flat = geo_utils::flat_distance(&a, &b, DistanceModel::Geodesic);
//! let full = geo_utils::sample_distance(&a, &b, DistanceModel::Geodesic);
//! assert!(full > flat);
//! ```
//!
//! ## Algorithm Notes
//!
//! The surface distance ignores elevation. The elevation delta is then folded in
//! with a planar right-triangle approximation:
//! `sqrt(flat_distance² + elevation_delta²)`. Over the few meters separating
//! consecutive GPS samples the curvature error of this approximation is
//! negligible.
//!
//! [`DistanceModel::Geodesic`] uses the WGS84 ellipsoid (Karney's algorithm) and
//! is the default. [`DistanceModel::Haversine`] assumes a spherical Earth and is
//! faster but up to ~0.3% off.

use geo::{Distance, Geodesic, Haversine, Point};
use crate::Sample;

/// Surface distance model used for a whole series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum DistanceModel {
    /// Ellipsoidal WGS84 geodesic
    #[default]
    Geodesic,
    /// Great-circle distance on a sphere
    Haversine,
}

// =============================================================================
// Distance Functions
// =============================================================================

/// Calculate the surface distance in meters between two samples, ignoring elevation.
///
/// Samples at identical latitude/longitude are exactly 0 apart under every model.
/// Non-finite coordinates propagate as NaN.
#[inline]
pub fn flat_distance(a: &Sample, b: &Sample, model: DistanceModel) -> f64 {
    if a.latitude == b.latitude && a.longitude == b.longitude {
        return 0.0;
    }

    let point1 = Point::new(a.longitude, a.latitude);
    let point2 = Point::new(b.longitude, b.latitude);

    match model {
        DistanceModel::Geodesic => Geodesic::distance(point1, point2),
        DistanceModel::Haversine => Haversine::distance(point1, point2),
    }
}

/// Calculate the distance in meters between two samples, including elevation change.
///
/// # Example
///
/// ```rust
/// use chrono::{TimeZone, Utc};
/// use track_analytics::{DistanceModel, Sample, sample_distance};
///
/// let t = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
/// let low = Sample::new(t, 46.0, 7.0, 100.0);
/// let high = Sample::new(t, 46.0, 7.0, 103.0);
///
/// // Same position, only the elevation differs
/// assert_eq!(sample_distance(&low, &high, DistanceModel::Haversine), 3.0);
/// ```
#[inline]
pub fn sample_distance(a: &Sample, b: &Sample, model: DistanceModel) -> f64 {
    let flat = flat_distance(a, b, model);
    let elevation_delta = b.elevation - a.elevation;
    (flat * flat + elevation_delta * elevation_delta).sqrt()
}

// =============================================================================
// Bounding Box Functions
// =============================================================================

/// Bounding box of a set of samples.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Get the center of the bounds as (latitude, longitude).
    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lng + self.max_lng) / 2.0,
        )
    }
}

/// Compute the bounding box of a set of coordinates.
///
/// Returns `None` for empty input.
pub fn compute_bounds<I>(coords: I) -> Option<Bounds>
where
    I: IntoIterator<Item = (f64, f64)>,
{
    let mut iter = coords.into_iter().peekable();
    iter.peek()?;

    let mut min_lat = f64::MAX;
    let mut max_lat = f64::MIN;
    let mut min_lng = f64::MAX;
    let mut max_lng = f64::MIN;

    for (lat, lng) in iter {
        min_lat = min_lat.min(lat);
        max_lat = max_lat.max(lat);
        min_lng = min_lng.min(lng);
        max_lng = max_lng.max(lng);
    }

    Some(Bounds { min_lat, max_lat, min_lng, max_lng })
}

/// Compute the centroid (arithmetic mean of latitude and longitude) of a set of coordinates.
///
/// Suitable for the small areas a single track covers. Returns `None` for empty input.
pub fn compute_center<I>(coords: I) -> Option<(f64, f64)>
where
    I: IntoIterator<Item = (f64, f64)>,
{
    let (sum_lat, sum_lng, n) = coords
        .into_iter()
        .fold((0.0, 0.0, 0usize), |(la, ln, n), (lat, lng)| (la + lat, ln + lng, n + 1));

    if n == 0 {
        return None;
    }
    Some((sum_lat / n as f64, sum_lng / n as f64))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
        (a - b).abs() < epsilon
    }

    fn sample(lat: f64, lng: f64, ele: f64) -> Sample {
        let t = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        Sample::new(t, lat, lng, ele)
    }

    #[test]
    fn test_distance_same_sample() {
        let p = sample(51.5074, -0.1278, 30.0);
        assert_eq!(sample_distance(&p, &p, DistanceModel::Geodesic), 0.0);
        assert_eq!(sample_distance(&p, &p, DistanceModel::Haversine), 0.0);
    }

    #[test]
    fn test_distance_known_value() {
        // London to Paris is approximately 344 km
        let london = sample(51.5074, -0.1278, 0.0);
        let paris = sample(48.8566, 2.3522, 0.0);
        let geodesic = flat_distance(&london, &paris, DistanceModel::Geodesic);
        let haversine = flat_distance(&london, &paris, DistanceModel::Haversine);
        assert!(approx_eq(geodesic, 343_900.0, 5000.0));
        assert!(approx_eq(haversine, 343_560.0, 5000.0));
    }

    #[test]
    fn test_elevation_only_distance() {
        let a = sample(46.0, 7.0, 100.0);
        let b = sample(46.0, 7.0, 96.0);
        assert_eq!(sample_distance(&a, &b, DistanceModel::Geodesic), 4.0);
    }

    #[test]
    fn test_elevation_combines_with_flat_distance() {
        let a = sample(46.0, 7.0, 100.0);
        let b = sample(46.001, 7.0, 150.0);
        let flat = flat_distance(&a, &b, DistanceModel::Geodesic);
        let full = sample_distance(&a, &b, DistanceModel::Geodesic);
        assert!(approx_eq(full, (flat * flat + 2500.0).sqrt(), 1e-9));
        assert!(full > flat);
    }

    #[test]
    fn test_nan_propagates() {
        let a = sample(46.0, 7.0, 100.0);
        let b = sample(46.0, 7.0, f64::NAN);
        assert!(sample_distance(&a, &b, DistanceModel::Geodesic).is_nan());
    }

    #[test]
    fn test_compute_bounds() {
        let coords = vec![(51.50, -0.13), (51.51, -0.12), (51.505, -0.125)];
        let bounds = compute_bounds(coords).unwrap();
        assert_eq!(bounds.min_lat, 51.50);
        assert_eq!(bounds.max_lat, 51.51);
        assert_eq!(bounds.min_lng, -0.13);
        assert_eq!(bounds.max_lng, -0.12);
    }

    #[test]
    fn test_compute_bounds_empty() {
        assert!(compute_bounds(Vec::<(f64, f64)>::new()).is_none());
    }

    #[test]
    fn test_compute_center() {
        let center = compute_center(vec![(51.50, -0.10), (51.52, -0.12)]).unwrap();
        assert!(approx_eq(center.0, 51.51, 0.001));
        assert!(approx_eq(center.1, -0.11, 0.001));
        assert!(compute_center(Vec::<(f64, f64)>::new()).is_none());
    }
}
