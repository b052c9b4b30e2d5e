//! Outlier-robust filtering of noisy derived signals.
//!
//! Two independent policies:
//! - **Quantile trim** drops rows whose value in a column falls outside an
//!   inclusive quantile range. Suppresses GPS and time-gap artifacts before
//!   scatter rendering.
//! - **Adaptive grade threshold** smooths grade over a trailing window, then
//!   lowers a threshold from ±50% in fixed steps until at least a minimum number
//!   of rows exceed it. Rows above the final threshold are treated as spikes.
//!
//! The threshold search is bounded: it never steps to a non-positive
//! threshold and never takes more than [`MAX_THRESHOLD_STEPS`] steps, so a
//! track with too few spikes simply exhausts the search.

use log::{debug, info};

use crate::series::{rolling_mean, TrackColumn, TrackSeries};

// ============================================================================
// Quantile Trim
// ============================================================================

/// Inclusive pair of quantile levels in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct QuantileRange {
    lower: f64,
    upper: f64,
}

impl QuantileRange {
    /// p0.0 to p99.5, for speed
    pub const SPEED: QuantileRange = QuantileRange { lower: 0.0, upper: 0.995 };
    /// p0.1 to p99.5, for grade
    pub const GRADE: QuantileRange = QuantileRange { lower: 0.001, upper: 0.995 };
    /// Keeps every defined value
    pub const ALL: QuantileRange = QuantileRange { lower: 0.0, upper: 1.0 };

    /// Levels are clamped to `[0, 1]`. A NaN level leaves that side untrimmed.
    pub fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }.sanitized()
    }

    pub fn lower(&self) -> f64 {
        self.lower
    }

    pub fn upper(&self) -> f64 {
        self.upper
    }

    /// Deserialized ranges skip `new`, so levels are checked again before use.
    fn sanitized(self) -> Self {
        let level = |q: f64, untrimmed: f64| if q.is_nan() { untrimmed } else { q.clamp(0.0, 1.0) };
        Self {
            lower: level(self.lower, 0.0),
            upper: level(self.upper, 1.0),
        }
    }
}

/// Quantile of already-sorted values with linear interpolation between closest ranks.
fn quantile_sorted(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Quantile `q` of `values`, ignoring NaN. `None` when no value remains.
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    sorted.sort_by(f64::total_cmp);
    quantile_sorted(&sorted, q)
}

/// Lower and upper bound values for `range` over `values`.
pub fn quantile_bounds(values: &[f64], range: QuantileRange) -> Option<(f64, f64)> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    sorted.sort_by(f64::total_cmp);
    let range = range.sanitized();
    Some((quantile_sorted(&sorted, range.lower)?, quantile_sorted(&sorted, range.upper)?))
}

/// Keep the rows whose `column` value lies within the inclusive quantile range.
///
/// Rows where the column is undefined are dropped. Quantiles are computed over
/// the defined values only.
pub fn quantile_trim(series: &TrackSeries, column: TrackColumn, range: QuantileRange) -> TrackSeries {
    let values: Vec<f64> = series.iter().filter_map(|r| column.value(r)).collect();
    let Some((low, high)) = quantile_bounds(&values, range) else {
        return TrackSeries::default();
    };

    let trimmed = series.filter(|r| column.value(r).is_some_and(|v| v >= low && v <= high));
    debug!(
        "[Outliers] Quantile trim on {}: [{:.3}, {:.3}] kept {}/{}",
        column.name(),
        low,
        high,
        trimmed.len(),
        series.len()
    );
    trimmed
}

// ============================================================================
// Adaptive Grade Threshold
// ============================================================================

/// Upper bound on threshold steps, whatever the configured start and step.
pub const MAX_THRESHOLD_STEPS: usize = 10_000;

/// Configuration for the adaptive grade-threshold search.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct GradeFilterConfig {
    /// Trailing window for the smoothed grade.
    /// Default: 20 rows
    pub window: usize,

    /// Initial threshold as a ratio (0.5 = ±50% grade).
    /// Default: 0.5
    pub start_threshold: f64,

    /// Amount the threshold is lowered per step.
    /// Default: 0.02
    pub step: f64,

    /// Search stops once at least this many rows exceed the threshold.
    /// Default: 15
    pub min_outliers: usize,
}

impl Default for GradeFilterConfig {
    fn default() -> Self {
        Self {
            window: 20,
            start_threshold: 0.5,
            step: 0.02,
            min_outliers: 15,
        }
    }
}

/// Smoothed grade at one row.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct SmoothedGrade {
    /// Row index in the source series
    pub index: usize,
    /// Trailing mean of the distance bucket key (km), the chart's x position
    pub distance_bucket: f64,
    /// `mean(elevation_gain) / mean(distance)` as a ratio. Undefined until the
    /// window fills or when the window covered no distance.
    pub grade: Option<f64>,
}

impl SmoothedGrade {
    /// Grade as a percentage.
    pub fn percent(&self) -> Option<f64> {
        self.grade.map(|g| 100.0 * g)
    }
}

/// Outcome of the threshold search.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct GradeThreshold {
    /// Final threshold as a ratio, always > 0 unless the start was already ≤ 0
    pub threshold: f64,
    /// Rows whose |grade| exceeds `threshold`
    pub outlier_count: usize,
    /// Number of times the threshold was lowered
    pub steps: usize,
    /// True when the search ran out of steps before reaching `min_outliers`
    pub exhausted: bool,
}

impl GradeThreshold {
    pub fn is_outlier(&self, grade: f64) -> bool {
        grade.abs() > self.threshold
    }
}

/// Result of the adaptive grade filter.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct GradeFilterResult {
    pub threshold: GradeThreshold,
    /// Defined smoothed grades within the threshold, in row order
    pub profile: Vec<SmoothedGrade>,
}

/// Smoothed grade for every row of `series`.
pub fn smoothed_grades(series: &TrackSeries, window: usize) -> Vec<SmoothedGrade> {
    let gains: Vec<f64> = series.iter().map(|r| r.elevation_gain).collect();
    let distances: Vec<f64> = series.iter().map(|r| r.distance).collect();
    let buckets: Vec<f64> = series.iter().map(|r| r.distance_bucket).collect();

    let gain_mean = rolling_mean(&gains, window);
    let distance_mean = rolling_mean(&distances, window);
    let bucket_mean = rolling_mean(&buckets, window);

    (0..series.len())
        .map(|i| {
            let grade = match (gain_mean[i], distance_mean[i]) {
                (Some(g), Some(d)) if d > 0.0 => Some(g / d),
                _ => None,
            };
            SmoothedGrade {
                index: i,
                distance_bucket: bucket_mean[i].unwrap_or(buckets[i]),
                grade,
            }
        })
        .collect()
}

/// Find the narrowest threshold that isolates at least `min_outliers` grades.
///
/// Starting at `start_threshold`, the threshold is lowered by `step` while fewer
/// than `min_outliers` values have `|grade| > threshold`. The search stops
/// before the threshold would reach zero, when a step no longer lowers it, or
/// after [`MAX_THRESHOLD_STEPS`]. A non-finite or non-positive start or step is
/// not searched at all.
pub fn find_grade_threshold(grades: &[f64], config: &GradeFilterConfig) -> GradeThreshold {
    let mut magnitudes: Vec<f64> = grades.iter().filter(|g| !g.is_nan()).map(|g| g.abs()).collect();
    magnitudes.sort_by(f64::total_cmp);
    let count_above = |t: f64| magnitudes.len() - magnitudes.partition_point(|&m| m <= t);

    let start = config.start_threshold;
    let step = config.step;
    let max_steps = if start.is_finite() && start > 0.0 && step.is_finite() && step > 0.0 {
        ((start / step).ceil() as usize).min(MAX_THRESHOLD_STEPS)
    } else {
        0
    };

    let mut threshold = start;
    let mut outlier_count = count_above(threshold);
    let mut steps = 0;
    let mut exhausted = false;

    while outlier_count < config.min_outliers {
        // Derived from the step count so repeated subtraction cannot drift
        let next = start - (steps + 1) as f64 * step;
        if steps >= max_steps || next <= 0.0 || next >= threshold {
            exhausted = true;
            break;
        }
        steps += 1;
        threshold = next;
        outlier_count = count_above(threshold);
    }

    debug!(
        "[Outliers] Grade threshold {:.2} after {} steps: {} outliers (exhausted: {})",
        threshold, steps, outlier_count, exhausted
    );

    GradeThreshold { threshold, outlier_count, steps, exhausted }
}

/// Run the adaptive grade filter and return the smoothed profile with spikes removed.
pub fn filter_grade_outliers(series: &TrackSeries, config: &GradeFilterConfig) -> GradeFilterResult {
    let smoothed = smoothed_grades(series, config.window);
    let defined: Vec<f64> = smoothed.iter().filter_map(|s| s.grade).collect();
    let threshold = find_grade_threshold(&defined, config);

    let profile: Vec<SmoothedGrade> = smoothed
        .into_iter()
        .filter(|s| s.grade.is_some_and(|g| !threshold.is_outlier(g)))
        .collect();

    info!(
        "[Outliers] Grade filter kept {}/{} smoothed points at ±{:.0}%",
        profile.len(),
        series.len(),
        100.0 * threshold.threshold
    );

    GradeFilterResult { threshold, profile }
}

/// New series without the rows whose smoothed grade exceeds the adaptive threshold.
///
/// Rows with an undefined smoothed grade are kept: they cannot be judged.
pub fn drop_grade_outliers(series: &TrackSeries, config: &GradeFilterConfig) -> TrackSeries {
    let smoothed = smoothed_grades(series, config.window);
    let defined: Vec<f64> = smoothed.iter().filter_map(|s| s.grade).collect();
    let threshold = find_grade_threshold(&defined, config);

    let keep: Vec<usize> = smoothed
        .iter()
        .filter(|s| !s.grade.is_some_and(|g| threshold.is_outlier(g)))
        .map(|s| s.index)
        .collect();
    series.select(&keep)
}
