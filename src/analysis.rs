//! One-call computation of every dashboard view of a track.
//!
//! The passes are independent pure functions over the same immutable series.
//! With the `parallel` feature they run as `rayon::join` tasks; otherwise they
//! run in sequence. Both paths produce identical results.

use std::time::Instant;

use log::info;

use crate::density::{density_weights, DensityConfig};
use crate::intervals::{aggregate_intervals, grade_frequencies, GradeFrequency, IntervalBucket, Partition};
use crate::outliers::{filter_grade_outliers, quantile_trim, GradeFilterConfig, GradeFilterResult, QuantileRange};
use crate::series::{ClimbPoint, TrackColumn, TrackSeries, TrackSummary};
use crate::TrackError;

/// Configuration for [`analyze_track`].
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct AnalysisConfig {
    /// Adaptive grade-threshold search
    pub grade_filter: GradeFilterConfig,

    /// Speed trim applied before the scatter.
    /// Default: p0.0 to p99.5
    pub speed_trim: QuantileRange,

    /// Grade trim applied before the scatter, after the speed trim.
    /// Default: p0.1 to p99.5
    pub grade_trim: QuantileRange,

    /// Scatter density estimation
    pub density: DensityConfig,

    /// Grade bands in percent.
    /// Default: -inf, -10, -8, ..., 10, +inf
    pub grade_partition: Partition,

    /// Speed bands in km/h.
    /// Default: -inf, 5, 10, ..., 50, +inf
    pub speed_partition: Partition,

    /// Grade histogram keeps values seen more than this many times.
    /// Default: 10
    pub histogram_min_count: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            grade_filter: GradeFilterConfig::default(),
            speed_trim: QuantileRange::SPEED,
            grade_trim: QuantileRange::GRADE,
            density: DensityConfig::default(),
            grade_partition: Partition::grade_default(),
            speed_partition: Partition::speed_default(),
            histogram_min_count: 10,
        }
    }
}

/// One point of the grade/speed scatter.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct ScatterPoint {
    /// Percent
    pub grade: f64,
    /// km/h
    pub speed: f64,
    /// Kernel density at this point
    pub weight: f64,
}

/// Every derived view of a track.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct TrackAnalysis {
    pub summary: TrackSummary,
    /// Smoothed grade with spikes removed, plus the threshold that was used
    pub grade_filter: GradeFilterResult,
    pub grade_intervals: Vec<IntervalBucket>,
    pub speed_intervals: Vec<IntervalBucket>,
    pub grade_frequencies: Vec<GradeFrequency>,
    pub scatter: Vec<ScatterPoint>,
    /// Last row of each distance bucket
    pub bucket_summary: TrackSeries,
    pub climb_profile: Vec<ClimbPoint>,
}

impl TrackAnalysis {
    /// Serialize the whole analysis as JSON.
    #[cfg(feature = "serialize")]
    pub fn to_json(&self) -> Result<String, TrackError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Quantile-trimmed grade/speed pairs weighted by local density.
pub fn grade_speed_scatter(series: &TrackSeries, config: &AnalysisConfig) -> Result<Vec<ScatterPoint>, TrackError> {
    let by_speed = quantile_trim(series, TrackColumn::Speed, config.speed_trim);
    let trimmed = quantile_trim(&by_speed, TrackColumn::Grade, config.grade_trim);

    // The grade trim leaves only rows with a defined grade
    let (grades, speeds): (Vec<f64>, Vec<f64>) = trimmed
        .iter()
        .filter_map(|r| Some((r.grade?, r.speed)))
        .unzip();
    let weights = density_weights(&grades, &speeds, &config.density)?;

    Ok(grades
        .into_iter()
        .zip(speeds)
        .zip(weights)
        .map(|((grade, speed), weight)| ScatterPoint { grade, speed, weight })
        .collect())
}

type IntervalViews = (Vec<IntervalBucket>, Vec<IntervalBucket>, Vec<GradeFrequency>);

fn interval_views(series: &TrackSeries, config: &AnalysisConfig) -> IntervalViews {
    (
        aggregate_intervals(series, TrackColumn::Grade, &config.grade_partition),
        aggregate_intervals(series, TrackColumn::Speed, &config.speed_partition),
        grade_frequencies(series, config.histogram_min_count),
    )
}

/// Compute every dashboard view of `series`.
///
/// Fails with [`TrackError::EmptyTrack`] on an empty series.
pub fn analyze_track(series: &TrackSeries, config: &AnalysisConfig) -> Result<TrackAnalysis, TrackError> {
    let start = Instant::now();
    let summary = series.summary().ok_or(TrackError::EmptyTrack)?;

    #[cfg(feature = "parallel")]
    let ((grade_filter, scatter), (intervals, (bucket_summary, climb_profile))) = rayon::join(
        || {
            rayon::join(
                || filter_grade_outliers(series, &config.grade_filter),
                || grade_speed_scatter(series, config),
            )
        },
        || {
            rayon::join(
                || interval_views(series, config),
                || (series.bucket_summary(), series.climb_profile()),
            )
        },
    );

    #[cfg(not(feature = "parallel"))]
    let ((grade_filter, scatter), (intervals, (bucket_summary, climb_profile))) = (
        (
            filter_grade_outliers(series, &config.grade_filter),
            grade_speed_scatter(series, config),
        ),
        (
            interval_views(series, config),
            (series.bucket_summary(), series.climb_profile()),
        ),
    );

    let (grade_intervals, speed_intervals, grade_frequencies) = intervals;
    let scatter = scatter?;

    info!(
        "[Analysis] {} rows: {} grade bands, {} speed bands, {} scatter points in {}ms",
        series.len(),
        grade_intervals.len(),
        speed_intervals.len(),
        scatter.len(),
        start.elapsed().as_millis()
    );

    Ok(TrackAnalysis {
        summary,
        grade_filter,
        grade_intervals,
        speed_intervals,
        grade_frequencies,
        scatter,
        bucket_summary,
        climb_profile,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Sample, SeriesConfig};
    use chrono::{Duration, TimeZone, Utc};

    /// Longitude holds planar kilometers.
    fn planar(a: &Sample, b: &Sample) -> f64 {
        (b.longitude - a.longitude).abs() * 1000.0
    }

    /// Rolling hills: 400 samples, 2 s apart, 6-9 m per step.
    fn hilly_track() -> TrackSeries {
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        let mut x = 0.0;
        let samples: Vec<Sample> = (0..400)
            .map(|i| {
                x += 6.0 + (i % 4) as f64;
                let elevation = 200.0 + 15.0 * (i as f64 / 25.0).sin();
                Sample::new(t0 + Duration::seconds(i * 2), 0.0, x / 1000.0, elevation)
            })
            .collect();
        TrackSeries::from_segments_with(&[samples], planar, &SeriesConfig::default()).unwrap()
    }

    #[test]
    fn test_empty_series_is_error() {
        let result = analyze_track(&TrackSeries::default(), &AnalysisConfig::default());
        assert!(matches!(result, Err(TrackError::EmptyTrack)));
    }

    #[test]
    fn test_matches_individual_passes() {
        let series = hilly_track();
        let config = AnalysisConfig::default();
        let analysis = analyze_track(&series, &config).unwrap();

        assert_eq!(analysis.summary, series.summary().unwrap());
        assert_eq!(analysis.grade_filter, filter_grade_outliers(&series, &config.grade_filter));
        assert_eq!(
            analysis.grade_intervals,
            aggregate_intervals(&series, TrackColumn::Grade, &config.grade_partition)
        );
        assert_eq!(
            analysis.speed_intervals,
            aggregate_intervals(&series, TrackColumn::Speed, &config.speed_partition)
        );
        assert_eq!(analysis.bucket_summary, series.bucket_summary());
        assert_eq!(analysis.climb_profile, series.climb_profile());
        assert_eq!(analysis.scatter, grade_speed_scatter(&series, &config).unwrap());
    }

    #[test]
    fn test_scatter_is_trimmed_and_weighted() {
        let series = hilly_track();
        let scatter = grade_speed_scatter(&series, &AnalysisConfig::default()).unwrap();

        // First row has no grade and the trims drop the extremes
        assert!(!scatter.is_empty());
        assert!(scatter.len() < series.len());
        assert!(scatter.iter().all(|p| p.weight > 0.0 && p.weight.is_finite()));

        let max_speed = series.iter().map(|r| r.speed).fold(0.0, f64::max);
        assert!(scatter.iter().all(|p| p.speed <= max_speed));
    }

    #[test]
    fn test_interval_totals_cover_track() {
        let series = hilly_track();
        let analysis = analyze_track(&series, &AnalysisConfig::default()).unwrap();

        // Both default partitions are open-ended, so every moving row is counted once
        let grade_total: f64 = analysis.grade_intervals.iter().map(|b| b.distance).sum();
        let speed_total: f64 = analysis.speed_intervals.iter().map(|b| b.distance).sum();
        let track_total = analysis.summary.total_distance;
        assert!((grade_total - track_total).abs() < 1e-6);
        assert!((speed_total - track_total).abs() < 1e-6);
    }

    #[cfg(feature = "serialize")]
    #[test]
    fn test_to_json() {
        let analysis = analyze_track(&hilly_track(), &AnalysisConfig::default()).unwrap();
        let json = analysis.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["summary"]["point_count"], 400);
        assert!(value["scatter"].as_array().is_some());
    }
}
