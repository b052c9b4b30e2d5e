//! Interval bucketing of a track series.
//!
//! Rows are assigned to right-closed intervals `(lower, upper]` of a
//! [`Partition`] by the value of a metric column (grade or speed). Each
//! populated interval sums distance, time and elevation gain and derives the
//! resulting average speed. Intervals that covered no distance are dropped.
//!
//! ## Example
//!
//! ```rust
//! use chrono::{Duration, TimeZone, Utc};
//! use track_analytics::{Partition, Sample, SeriesConfig, TrackColumn, TrackSeries, aggregate_intervals};
//!
//! let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
//! let samples: Vec<Sample> = (0..50)
//!     .map(|i| Sample::new(t0 + Duration::seconds(i * 4), 46.0 + i as f64 * 1e-4, 7.0, 500.0 + i as f64 * 0.4))
//!     .collect();
//! let series = TrackSeries::from_samples(&samples, &SeriesConfig::default()).unwrap();
//!
//! let buckets = aggregate_intervals(&series, TrackColumn::Grade, &Partition::grade_default());
//! assert_eq!(buckets.len(), 1);
//! assert_eq!((buckets[0].lower, buckets[0].upper), (2.0, 4.0));
//! ```

use std::collections::BTreeMap;
use std::sync::OnceLock;

use log::debug;

use crate::series::{speed_kmh, TrackColumn, TrackSeries};
use crate::table::{CellValue, Field, FieldKind, Schema, Table};
use crate::TrackError;

/// Ordered cut points splitting the real line into right-closed intervals.
///
/// Serialized as a list of cuts with open ends written as `null`, since JSON
/// has no infinity. Deserialized lists go through [`Partition::new`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serialize", serde(try_from = "Vec<Option<f64>>", into = "Vec<Option<f64>>"))]
pub struct Partition {
    cuts: Vec<f64>,
}

impl Partition {
    /// Build from strictly ascending cut points. Infinite ends are allowed.
    pub fn new(cuts: Vec<f64>) -> Result<Self, TrackError> {
        if cuts.len() < 2 || cuts.iter().any(|c| c.is_nan()) || cuts.windows(2).any(|w| w[0] >= w[1]) {
            return Err(TrackError::InvalidPartition);
        }
        Ok(Self { cuts })
    }

    /// Cuts every `step` from `start` to `end` inclusive, optionally opened to ±infinity.
    pub fn uniform(start: f64, end: f64, step: f64, open_ends: bool) -> Result<Self, TrackError> {
        if !(step > 0.0) || !(end > start) {
            return Err(TrackError::InvalidPartition);
        }
        let count = ((end - start) / step).round() as usize;
        let mut cuts = Vec::with_capacity(count + 3);
        if open_ends {
            cuts.push(f64::NEG_INFINITY);
        }
        cuts.extend((0..=count).map(|i| start + i as f64 * step));
        if open_ends {
            cuts.push(f64::INFINITY);
        }
        Self::new(cuts)
    }

    /// Grade bands in percent: `-inf, -10, -8, ..., 8, 10, +inf`.
    pub fn grade_default() -> Self {
        Self::fixed(-10.0, 10.0, 2.0)
    }

    /// Speed bands in km/h: `-inf, 5, 10, ..., 45, 50, +inf`.
    pub fn speed_default() -> Self {
        Self::fixed(5.0, 50.0, 5.0)
    }

    fn fixed(start: f64, end: f64, step: f64) -> Self {
        let count = ((end - start) / step).round() as usize;
        let mut cuts = vec![f64::NEG_INFINITY];
        cuts.extend((0..=count).map(|i| start + i as f64 * step));
        cuts.push(f64::INFINITY);
        Self { cuts }
    }

    pub fn cuts(&self) -> &[f64] {
        &self.cuts
    }

    pub fn interval_count(&self) -> usize {
        self.cuts.len() - 1
    }

    /// Bounds of interval `index`.
    pub fn interval(&self, index: usize) -> Option<(f64, f64)> {
        Some((*self.cuts.get(index)?, *self.cuts.get(index + 1)?))
    }

    /// Interval containing `value`, i.e. `cuts[i] < value <= cuts[i + 1]`.
    pub fn locate(&self, value: f64) -> Option<usize> {
        if value.is_nan() {
            return None;
        }
        let idx = self.cuts.partition_point(|&c| c < value);
        if idx == 0 || idx == self.cuts.len() {
            None
        } else {
            Some(idx - 1)
        }
    }
}

impl From<Partition> for Vec<Option<f64>> {
    fn from(partition: Partition) -> Self {
        partition.cuts.into_iter().map(|c| c.is_finite().then_some(c)).collect()
    }
}

impl TryFrom<Vec<Option<f64>>> for Partition {
    type Error = TrackError;

    /// A missing first cut is `-inf` and a missing last cut is `+inf`.
    fn try_from(cuts: Vec<Option<f64>>) -> Result<Self, Self::Error> {
        let last = cuts.len().saturating_sub(1);
        let cuts = cuts
            .into_iter()
            .enumerate()
            .map(|(i, cut)| match cut {
                Some(c) => Ok(c),
                None if i == 0 => Ok(f64::NEG_INFINITY),
                None if i == last => Ok(f64::INFINITY),
                None => Err(TrackError::InvalidPartition),
            })
            .collect::<Result<Vec<f64>, _>>()?;
        Self::new(cuts)
    }
}

/// Totals for one populated interval.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct IntervalBucket {
    pub lower: f64,
    pub upper: f64,
    /// Rows assigned to this interval
    pub row_count: usize,
    /// Meters
    pub distance: f64,
    /// Seconds
    pub delta_time: f64,
    /// Net elevation change in meters
    pub elevation_gain: f64,
    /// km/h over the summed distance and time
    pub speed: f64,
}

impl IntervalBucket {
    fn empty(lower: f64, upper: f64) -> Self {
        Self {
            lower,
            upper,
            row_count: 0,
            distance: 0.0,
            delta_time: 0.0,
            elevation_gain: 0.0,
            speed: 0.0,
        }
    }
}

/// Group rows of `series` by the interval of `metric` and sum per group.
///
/// Rows with an undefined metric, or a value outside every interval, are not
/// counted. The result is ordered by lower bound.
pub fn aggregate_intervals(
    series: &TrackSeries,
    metric: TrackColumn,
    partition: &Partition,
) -> Vec<IntervalBucket> {
    let mut buckets: Vec<IntervalBucket> = (0..partition.interval_count())
        .filter_map(|i| partition.interval(i))
        .map(|(lower, upper)| IntervalBucket::empty(lower, upper))
        .collect();

    for row in series {
        let Some(index) = metric.value(row).and_then(|v| partition.locate(v)) else {
            continue;
        };
        let bucket = &mut buckets[index];
        bucket.row_count += 1;
        bucket.distance += row.distance;
        bucket.delta_time += row.delta_time;
        bucket.elevation_gain += row.elevation_gain;
    }

    let populated: Vec<IntervalBucket> = buckets
        .into_iter()
        .filter(|b| b.distance > 0.0)
        .map(|mut b| {
            b.speed = speed_kmh(b.distance, b.delta_time);
            b
        })
        .collect();

    debug!(
        "[Intervals] {} rows by {} into {}/{} populated intervals",
        series.len(),
        metric.name(),
        populated.len(),
        partition.interval_count()
    );
    populated
}

/// Per-grade-band summary.
pub fn grade_intervals(series: &TrackSeries, partition: &Partition) -> Vec<IntervalBucket> {
    aggregate_intervals(series, TrackColumn::Grade, partition)
}

/// Per-speed-band summary.
pub fn speed_intervals(series: &TrackSeries, partition: &Partition) -> Vec<IntervalBucket> {
    aggregate_intervals(series, TrackColumn::Speed, partition)
}

// ============================================================================
// Grade Histogram
// ============================================================================

/// How often a grade value (rounded to 0.1%) occurs.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct GradeFrequency {
    /// Grade in percent, rounded to one decimal
    pub grade: f64,
    pub count: usize,
}

/// Frequencies of per-row grade rounded to 0.1%, keeping values seen more than
/// `min_count` times. Ordered by grade.
pub fn grade_frequencies(series: &TrackSeries, min_count: usize) -> Vec<GradeFrequency> {
    let mut counts: BTreeMap<i64, usize> = BTreeMap::new();
    for grade in series.iter().filter_map(|r| r.grade).filter(|g| g.is_finite()) {
        *counts.entry((grade * 10.0).round_ties_even() as i64).or_insert(0) += 1;
    }

    counts
        .into_iter()
        .filter(|&(_, count)| count > min_count)
        .map(|(key, count)| GradeFrequency { grade: key as f64 / 10.0, count })
        .collect()
}

// ============================================================================
// Table Access
// ============================================================================

const BUCKET_COLUMNS: [(&str, FieldKind); 7] = [
    ("lower", FieldKind::Float),
    ("upper", FieldKind::Float),
    ("row_count", FieldKind::Float),
    ("distance", FieldKind::Float),
    ("delta_time", FieldKind::Seconds),
    ("elevation_gain", FieldKind::Float),
    ("speed", FieldKind::Float),
];

fn bucket_schema() -> &'static Schema {
    static SCHEMA: OnceLock<Schema> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        Schema::new(BUCKET_COLUMNS.iter().map(|&(n, k)| Field::new(n, k)).collect())
    })
}

impl Table for [IntervalBucket] {
    fn schema(&self) -> &Schema {
        bucket_schema()
    }

    fn row_count(&self) -> usize {
        self.len()
    }

    fn cell(&self, row: usize, column: usize) -> CellValue {
        let Some(b) = self.get(row) else {
            return CellValue::Missing;
        };
        let value = match column {
            0 => b.lower,
            1 => b.upper,
            2 => b.row_count as f64,
            3 => b.distance,
            4 => b.delta_time,
            5 => b.elevation_gain,
            6 => b.speed,
            _ => return CellValue::Missing,
        };
        CellValue::Float(value)
    }
}
