//! # Track Analytics
//!
//! Kinematic and terrain analytics for GPS tracks.
//!
//! This library provides:
//! - A derived per-sample table (distance, speed, grade, running totals)
//! - Outlier-robust filtering of noisy derived signals
//! - Grade and speed interval summaries
//! - Kernel density weights for scatter rendering
//! - A sortable, paged view over any tabular source
//!
//! ## Features
//!
//! - **`parallel`** - Run independent analytics passes with rayon
//! - **`serialize`** - Serde support and JSON export
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use chrono::{TimeZone, Utc};
//! use track_analytics::{Sample, SeriesConfig, TrackSeries};
//!
//! let start = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
//! let samples: Vec<Sample> = (0..30)
//!     .map(|i| Sample::new(
//!         start + chrono::Duration::seconds(i * 5),
//!         51.5074 + i as f64 * 0.0002,
//!         -0.1278,
//!         20.0 + i as f64 * 0.5,
//!     ))
//!     .collect();
//!
//! let series = TrackSeries::from_samples(&samples, &SeriesConfig::default()).unwrap();
//! let last = series.last().unwrap();
//! println!("{:.0}m in {:.0}s, avg {:.1} km/h", last.total_distance, last.total_time, last.avg_speed);
//! ```

use chrono::{DateTime, Utc};

// Distance engine and bounding helpers
pub mod geo_utils;
pub use geo_utils::{Bounds, DistanceModel, sample_distance};

// Series builder and kinematics
pub mod series;
pub use series::{
    ClimbPoint, SeriesConfig, TrackColumn, TrackRow, TrackSeries, TrackSummary,
};

// Quantile and adaptive grade filtering
pub mod outliers;
pub use outliers::{
    GradeFilterConfig, GradeFilterResult, GradeThreshold, QuantileRange, SmoothedGrade,
    drop_grade_outliers, filter_grade_outliers, quantile_trim,
};

// Interval bucketing
pub mod intervals;
pub use intervals::{
    GradeFrequency, IntervalBucket, Partition, aggregate_intervals, grade_frequencies,
    grade_intervals, speed_intervals,
};

// Scatter density
pub mod density;
pub use density::{Bandwidth, DensityConfig, density_weights};

// Tabular sources and the paged view
pub mod table;
pub use table::{CellValue, Field, FieldKind, Projection, Schema, Table};

pub mod paging;
pub use paging::{PagedView, SortOrder};

// One-call dashboard computation
pub mod analysis;
pub use analysis::{
    AnalysisConfig, ScatterPoint, TrackAnalysis, analyze_track, grade_speed_scatter,
};

// ============================================================================
// Core Types
// ============================================================================

/// One raw geotagged, timestamped track point as produced by a track reader.
///
/// # Example
/// ```
/// use chrono::{TimeZone, Utc};
/// use track_analytics::Sample;
///
/// let t = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
/// let sample = Sample::new(t, 51.5074, -0.1278, 35.0);
/// assert!(sample.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Sample {
    pub time: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    /// Elevation in meters
    pub elevation: f64,
}

impl Sample {
    /// Create a new sample.
    pub fn new(time: DateTime<Utc>, latitude: f64, longitude: f64, elevation: f64) -> Self {
        Self { time, latitude, longitude, elevation }
    }

    /// Check if the sample has usable coordinates and elevation.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.elevation.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// Errors surfaced by series construction and tabular lookups.
///
/// Zero time deltas, degenerate statistics and out-of-range paging requests
/// are not errors; they resolve to documented fallbacks.
#[derive(Debug, thiserror::Error)]
pub enum TrackError {
    #[error("track contains no samples")]
    EmptyTrack,

    #[error("sample {index} is earlier than its predecessor")]
    NonMonotonicTime { index: usize },

    #[error("sample {index} has an invalid coordinate or elevation")]
    InvalidCoordinate { index: usize },

    #[error("column not found: {0}")]
    ColumnNotFound(String),

    #[error("input columns differ in length ({left} vs {right})")]
    LengthMismatch { left: usize, right: usize },

    #[error("partition cut points must be strictly ascending and not NaN")]
    InvalidPartition,

    #[cfg(feature = "serialize")]
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_sample_validation() {
        let t = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        assert!(Sample::new(t, 51.5074, -0.1278, 12.0).is_valid());
        assert!(!Sample::new(t, 91.0, 0.0, 12.0).is_valid());
        assert!(!Sample::new(t, 0.0, 181.0, 12.0).is_valid());
        assert!(!Sample::new(t, f64::NAN, 0.0, 12.0).is_valid());
        assert!(!Sample::new(t, 0.0, 0.0, f64::INFINITY).is_valid());
    }

    #[test]
    fn test_error_messages() {
        let err = TrackError::ColumnNotFound("Pace".to_string());
        assert_eq!(err.to_string(), "column not found: Pace");

        let err = TrackError::NonMonotonicTime { index: 4 };
        assert!(err.to_string().contains("sample 4"));
    }
}
