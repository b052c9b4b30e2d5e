//! # Track Series
//!
//! Builds the derived per-sample table from an ordered sample sequence.
//!
//! Construction runs in two stages:
//! 1. **Series builder** - one linear pass computing per-row deltas
//!    (`distance`, `delta_time`, `elevation_gain`) and running totals.
//!    The first row of every segment gets an explicit zero distance, and the
//!    first row of the series also gets zero `delta_time` and `elevation_gain`.
//! 2. **Kinematics deriver** - adds instantaneous speed, a trailing rolling-mean
//!    speed, cumulative average speed, per-row grade and the distance bucket key.
//!
//! A [`TrackSeries`] is immutable once built. Filtering, bucketing and
//! summarising all return new values.

use std::sync::OnceLock;
use std::time::Instant;

use chrono::{DateTime, Utc};
use log::{debug, info};

use crate::geo_utils::{self, Bounds, DistanceModel};
use crate::table::{CellValue, Field, FieldKind, Schema, Table};
use crate::{Sample, TrackError};

/// m/s to km/h
pub(crate) const MS_TO_KMH: f64 = 3.6;

/// Per-row distances are rounded to this many decimal places before accumulation.
const DISTANCE_DECIMALS: i32 = 5;

/// Configuration for series construction.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct SeriesConfig {
    /// Surface distance model, fixed for the whole series.
    /// Default: Geodesic (WGS84)
    pub distance_model: DistanceModel,

    /// Number of trailing rows averaged into `speed_rollmean`.
    /// Default: 20
    pub rollmean_window: usize,

    /// Width of one distance bucket in meters. The bucket key is expressed in km.
    /// Default: 100.0 (0.1 km labels)
    pub bucket_size_m: f64,
}

impl Default for SeriesConfig {
    fn default() -> Self {
        Self {
            distance_model: DistanceModel::Geodesic,
            rollmean_window: 20,
            bucket_size_m: 100.0,
        }
    }
}

/// One row of the derived track table.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct TrackRow {
    pub time: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub elevation: f64,
    /// Meters from the previous row (0 on the first row of a segment)
    pub distance: f64,
    /// Seconds since the previous row (0 on the first row)
    pub delta_time: f64,
    /// Elevation minus the previous row's elevation (0 on the first row)
    pub elevation_gain: f64,
    /// `100 * elevation_gain / distance`, undefined when `distance` is 0
    pub grade: Option<f64>,
    /// Running sum of `distance`
    pub total_distance: f64,
    /// Seconds elapsed since the first row
    pub total_time: f64,
    /// Instantaneous speed in km/h
    pub speed: f64,
    /// Trailing mean of `speed`, undefined until the window is full
    pub speed_rollmean: Option<f64>,
    /// `total_distance / total_time` in km/h
    pub avg_speed: f64,
    /// Coarse distance key in km, one step per bucket
    pub distance_bucket: f64,
}

impl TrackRow {
    fn from_sample(sample: &Sample) -> Self {
        Self {
            time: sample.time,
            latitude: sample.latitude,
            longitude: sample.longitude,
            elevation: sample.elevation,
            distance: 0.0,
            delta_time: 0.0,
            elevation_gain: 0.0,
            grade: None,
            total_distance: 0.0,
            total_time: 0.0,
            speed: 0.0,
            speed_rollmean: None,
            avg_speed: 0.0,
            distance_bucket: 0.0,
        }
    }
}

/// Point of the climb-over-time profile.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct ClimbPoint {
    /// Seconds since the first row
    pub total_time: f64,
    /// Sum of positive elevation gains up to and including this row
    pub cumulative_gain: f64,
}

/// Whole-track totals.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct TrackSummary {
    pub point_count: usize,
    /// Meters
    pub total_distance: f64,
    /// Seconds
    pub total_time: f64,
    /// Seconds spent in rows with a non-zero speed
    pub moving_time: f64,
    /// km/h over the whole duration
    pub average_speed: f64,
    /// km/h over moving time only
    pub moving_speed: f64,
    /// Highest smoothed speed in km/h, falling back to the instantaneous maximum
    /// for tracks too short to fill the rolling window
    pub max_speed: f64,
    pub ascent: f64,
    pub descent: f64,
    pub min_elevation: f64,
    pub max_elevation: f64,
}

// ============================================================================
// Columns
// ============================================================================

/// Named columns of a [`TrackSeries`], in schema order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum TrackColumn {
    Time,
    Latitude,
    Longitude,
    Elevation,
    Distance,
    DeltaTime,
    ElevationGain,
    Grade,
    TotalDistance,
    TotalTime,
    Speed,
    SpeedRollmean,
    AvgSpeed,
    DistanceBucket,
}

impl TrackColumn {
    pub const ALL: [TrackColumn; 14] = [
        TrackColumn::Time,
        TrackColumn::Latitude,
        TrackColumn::Longitude,
        TrackColumn::Elevation,
        TrackColumn::Distance,
        TrackColumn::DeltaTime,
        TrackColumn::ElevationGain,
        TrackColumn::Grade,
        TrackColumn::TotalDistance,
        TrackColumn::TotalTime,
        TrackColumn::Speed,
        TrackColumn::SpeedRollmean,
        TrackColumn::AvgSpeed,
        TrackColumn::DistanceBucket,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TrackColumn::Time => "time",
            TrackColumn::Latitude => "latitude",
            TrackColumn::Longitude => "longitude",
            TrackColumn::Elevation => "elevation",
            TrackColumn::Distance => "distance",
            TrackColumn::DeltaTime => "delta_time",
            TrackColumn::ElevationGain => "elevation_gain",
            TrackColumn::Grade => "grade",
            TrackColumn::TotalDistance => "total_distance",
            TrackColumn::TotalTime => "total_time",
            TrackColumn::Speed => "speed",
            TrackColumn::SpeedRollmean => "speed_rollmean",
            TrackColumn::AvgSpeed => "avg_speed",
            TrackColumn::DistanceBucket => "distance_bucket",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }

    fn kind(self) -> FieldKind {
        match self {
            TrackColumn::Time => FieldKind::Timestamp,
            TrackColumn::DeltaTime | TrackColumn::TotalTime => FieldKind::Seconds,
            _ => FieldKind::Float,
        }
    }

    /// Numeric value of this column for a row. Timestamps map to Unix seconds.
    pub fn value(self, row: &TrackRow) -> Option<f64> {
        match self {
            TrackColumn::Time => Some(epoch_seconds(row.time)),
            TrackColumn::Latitude => Some(row.latitude),
            TrackColumn::Longitude => Some(row.longitude),
            TrackColumn::Elevation => Some(row.elevation),
            TrackColumn::Distance => Some(row.distance),
            TrackColumn::DeltaTime => Some(row.delta_time),
            TrackColumn::ElevationGain => Some(row.elevation_gain),
            TrackColumn::Grade => row.grade,
            TrackColumn::TotalDistance => Some(row.total_distance),
            TrackColumn::TotalTime => Some(row.total_time),
            TrackColumn::Speed => Some(row.speed),
            TrackColumn::SpeedRollmean => row.speed_rollmean,
            TrackColumn::AvgSpeed => Some(row.avg_speed),
            TrackColumn::DistanceBucket => Some(row.distance_bucket),
        }
    }

    fn cell(self, row: &TrackRow) -> CellValue {
        match self {
            TrackColumn::Time => CellValue::Time(row.time),
            _ => self.value(row).map_or(CellValue::Missing, CellValue::Float),
        }
    }
}

fn track_schema() -> &'static Schema {
    static SCHEMA: OnceLock<Schema> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        Schema::new(
            TrackColumn::ALL
                .iter()
                .map(|c| Field::new(c.name(), c.kind()))
                .collect(),
        )
    })
}

// ============================================================================
// Track Series
// ============================================================================

/// The derived per-sample table, in input (time) order.
///
/// # Example
/// ```
/// use chrono::{TimeZone, Utc};
/// use track_analytics::{Sample, SeriesConfig, TrackSeries};
///
/// let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
/// let samples = vec![
///     Sample::new(t0, 46.0, 7.0, 500.0),
///     Sample::new(t0 + chrono::Duration::seconds(10), 46.0005, 7.0, 503.0),
/// ];
///
/// let series = TrackSeries::from_samples(&samples, &SeriesConfig::default()).unwrap();
/// assert_eq!(series.len(), 2);
/// assert_eq!(series.rows()[0].distance, 0.0);
/// assert!(series.rows()[1].speed > 0.0);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct TrackSeries {
    rows: Vec<TrackRow>,
}

impl TrackSeries {
    /// Build a series from one continuous segment.
    pub fn from_samples(samples: &[Sample], config: &SeriesConfig) -> Result<Self, TrackError> {
        Self::from_segments(&[samples], config)
    }

    /// Build a series from several segments using the configured distance model.
    ///
    /// Empty segments are skipped. Fails with [`TrackError::EmptyTrack`] when no
    /// segment has samples.
    pub fn from_segments<S>(segments: &[S], config: &SeriesConfig) -> Result<Self, TrackError>
    where
        S: AsRef<[Sample]>,
    {
        let model = config.distance_model;
        Self::from_segments_with(
            segments,
            |a, b| geo_utils::sample_distance(a, b, model),
            config,
        )
    }

    /// Build a series from several segments with a caller-supplied distance function.
    ///
    /// `distance_fn(previous, current)` must return meters. It is only called for
    /// consecutive samples within a segment.
    pub fn from_segments_with<S, F>(
        segments: &[S],
        distance_fn: F,
        config: &SeriesConfig,
    ) -> Result<Self, TrackError>
    where
        S: AsRef<[Sample]>,
        F: Fn(&Sample, &Sample) -> f64,
    {
        let start = Instant::now();
        let base = build_base_rows(segments, distance_fn)?;
        let rows = derive_kinematics(base, config);

        info!(
            "[Series] Built {} rows from {} segments in {}ms",
            rows.len(),
            segments.len(),
            start.elapsed().as_millis()
        );

        Ok(Self { rows })
    }

    /// Wrap rows that already carry derived values, such as a filtered subset.
    pub fn from_rows(rows: Vec<TrackRow>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[TrackRow] {
        &self.rows
    }

    pub fn get(&self, index: usize) -> Option<&TrackRow> {
        self.rows.get(index)
    }

    pub fn first(&self) -> Option<&TrackRow> {
        self.rows.first()
    }

    pub fn last(&self) -> Option<&TrackRow> {
        self.rows.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TrackRow> {
        self.rows.iter()
    }

    /// Values of one column in row order.
    pub fn column(&self, column: TrackColumn) -> Vec<Option<f64>> {
        self.rows.iter().map(|r| column.value(r)).collect()
    }

    /// New series with the rows matching `predicate`, order preserved.
    pub fn filter<P>(&self, mut predicate: P) -> Self
    where
        P: FnMut(&TrackRow) -> bool,
    {
        Self {
            rows: self.rows.iter().filter(|r| predicate(r)).cloned().collect(),
        }
    }

    /// New series with the rows at `indices`. Out-of-range indices are skipped.
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            rows: indices.iter().filter_map(|&i| self.rows.get(i)).cloned().collect(),
        }
    }

    /// Last row of every distance bucket: the reading taken just before each
    /// bucket boundary is crossed.
    pub fn bucket_summary(&self) -> Self {
        let rows = self
            .rows
            .iter()
            .enumerate()
            .filter(|(i, row)| {
                self.rows
                    .get(i + 1)
                    .map_or(true, |next| next.distance_bucket != row.distance_bucket)
            })
            .map(|(_, row)| row.clone())
            .collect();
        Self { rows }
    }

    /// Cumulative positive elevation gain over time, one point per climbing row.
    pub fn climb_profile(&self) -> Vec<ClimbPoint> {
        let mut cumulative_gain = 0.0;
        self.rows
            .iter()
            .filter(|r| r.elevation_gain > 0.0)
            .map(|r| {
                cumulative_gain += r.elevation_gain;
                ClimbPoint { total_time: r.total_time, cumulative_gain }
            })
            .collect()
    }

    /// Whole-track totals. Returns `None` for an empty series.
    pub fn summary(&self) -> Option<TrackSummary> {
        let last = self.rows.last()?;

        let mut moving_time = 0.0;
        let mut ascent = 0.0;
        let mut descent = 0.0;
        let mut max_speed = 0.0f64;
        let mut max_instant = 0.0f64;
        let mut min_elevation = f64::INFINITY;
        let mut max_elevation = f64::NEG_INFINITY;

        for row in &self.rows {
            if row.speed > 0.0 {
                moving_time += row.delta_time;
            }
            if row.elevation_gain > 0.0 {
                ascent += row.elevation_gain;
            } else {
                descent -= row.elevation_gain;
            }
            if let Some(s) = row.speed_rollmean {
                max_speed = max_speed.max(s);
            }
            max_instant = max_instant.max(row.speed);
            min_elevation = min_elevation.min(row.elevation);
            max_elevation = max_elevation.max(row.elevation);
        }

        if self.rows.iter().all(|r| r.speed_rollmean.is_none()) {
            max_speed = max_instant;
        }

        Some(TrackSummary {
            point_count: self.rows.len(),
            total_distance: last.total_distance,
            total_time: last.total_time,
            moving_time,
            average_speed: last.avg_speed,
            moving_speed: speed_kmh(last.total_distance, moving_time),
            max_speed,
            ascent,
            descent,
            min_elevation,
            max_elevation,
        })
    }

    /// Bounding box of all rows.
    pub fn bounds(&self) -> Option<Bounds> {
        geo_utils::compute_bounds(self.rows.iter().map(|r| (r.latitude, r.longitude)))
    }

    /// Centroid of all rows as (latitude, longitude).
    pub fn center(&self) -> Option<(f64, f64)> {
        geo_utils::compute_center(self.rows.iter().map(|r| (r.latitude, r.longitude)))
    }

    /// Serialize the rows as a JSON array.
    #[cfg(feature = "serialize")]
    pub fn to_json(&self) -> Result<String, TrackError> {
        Ok(serde_json::to_string(&self.rows)?)
    }
}

impl<'a> IntoIterator for &'a TrackSeries {
    type Item = &'a TrackRow;
    type IntoIter = std::slice::Iter<'a, TrackRow>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

impl Table for TrackSeries {
    fn schema(&self) -> &Schema {
        track_schema()
    }

    fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn cell(&self, row: usize, column: usize) -> CellValue {
        match (self.rows.get(row), TrackColumn::ALL.get(column)) {
            (Some(r), Some(c)) => c.cell(r),
            _ => CellValue::Missing,
        }
    }
}

// ============================================================================
// Construction Stages
// ============================================================================

/// `3.6 * meters / seconds`, or 0 when no time has elapsed.
#[inline]
pub(crate) fn speed_kmh(distance: f64, seconds: f64) -> f64 {
    if seconds > 0.0 {
        MS_TO_KMH * distance / seconds
    } else {
        0.0
    }
}

/// Trailing mean over exactly `window` values. Positions before the window
/// fills are `None`; there is no partial-window averaging.
///
/// Each window is summed afresh, so no error accumulates along long tracks.
pub(crate) fn rolling_mean(values: &[f64], window: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if window == 0 || values.len() < window {
        return out;
    }
    for (i, w) in values.windows(window).enumerate() {
        out[i + window - 1] = Some(w.iter().sum::<f64>() / window as f64);
    }
    out
}

fn round_distance(meters: f64) -> f64 {
    let scale = 10f64.powi(DISTANCE_DECIMALS);
    (meters * scale).round() / scale
}

fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    let delta = to - from;
    delta.num_seconds() as f64 + delta.subsec_nanos() as f64 * 1e-9
}

/// Seconds since the Unix epoch, keeping sub-second precision.
pub(crate) fn epoch_seconds(time: DateTime<Utc>) -> f64 {
    time.timestamp() as f64 + time.timestamp_subsec_nanos() as f64 * 1e-9
}

/// Series builder stage: deltas and running totals.
fn build_base_rows<S, F>(segments: &[S], distance_fn: F) -> Result<Vec<TrackRow>, TrackError>
where
    S: AsRef<[Sample]>,
    F: Fn(&Sample, &Sample) -> f64,
{
    let capacity = segments.iter().map(|s| s.as_ref().len()).sum();
    let mut rows: Vec<TrackRow> = Vec::with_capacity(capacity);
    let mut first_time: Option<DateTime<Utc>> = None;
    let mut total_distance = 0.0;
    let mut skipped = 0;

    for segment in segments {
        let samples = segment.as_ref();
        if samples.is_empty() {
            skipped += 1;
            continue;
        }

        for (i, sample) in samples.iter().enumerate() {
            let index = rows.len();
            if !sample.is_valid() {
                return Err(TrackError::InvalidCoordinate { index });
            }

            let mut row = TrackRow::from_sample(sample);

            if let Some(prev) = rows.last() {
                if sample.time < prev.time {
                    return Err(TrackError::NonMonotonicTime { index });
                }
                row.delta_time = seconds_between(prev.time, sample.time);
                row.elevation_gain = sample.elevation - prev.elevation;
            }
            // No distance is bridged across a segment gap
            if i > 0 {
                row.distance = round_distance(distance_fn(&samples[i - 1], sample));
            }

            total_distance += row.distance;
            row.total_distance = total_distance;
            let origin = *first_time.get_or_insert(sample.time);
            row.total_time = seconds_between(origin, sample.time);

            rows.push(row);
        }
    }

    if rows.is_empty() {
        return Err(TrackError::EmptyTrack);
    }
    if skipped > 0 {
        debug!("[Series] Skipped {} empty segments", skipped);
    }

    Ok(rows)
}

/// Kinematics deriver stage: speeds, grade and distance bucket.
fn derive_kinematics(mut rows: Vec<TrackRow>, config: &SeriesConfig) -> Vec<TrackRow> {
    let buckets_per_km = 1000.0 / config.bucket_size_m;

    for row in rows.iter_mut() {
        row.speed = speed_kmh(row.distance, row.delta_time);
        row.avg_speed = speed_kmh(row.total_distance, row.total_time);
        row.grade = if row.distance > 0.0 {
            Some(100.0 * row.elevation_gain / row.distance)
        } else {
            None
        };
        row.distance_bucket = (row.total_distance / config.bucket_size_m).floor() / buckets_per_km;
    }

    let speeds: Vec<f64> = rows.iter().map(|r| r.speed).collect();
    for (row, mean) in rows.iter_mut().zip(rolling_mean(&speeds, config.rollmean_window)) {
        row.speed_rollmean = mean;
    }

    rows
}

// ============================================================================
// Tests
// ============================================================================
