//! Basic example of analysing a synthetic ride.
//!
//! Run with: cargo run --example basic_analysis

use chrono::{Duration, TimeZone, Utc};
use track_analytics::{analyze_track, AnalysisConfig, Sample, SeriesConfig, TrackSeries};

fn main() {
    // A 20 minute ride north out of London with two climbs
    let start = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
    let samples: Vec<Sample> = (0..600)
        .map(|i| {
            let lat = 51.5074 + i as f64 * 0.00004;
            let lng = -0.1278 + (i as f64 / 40.0).sin() * 0.0005;
            let elevation = 25.0 + 18.0 * (i as f64 / 90.0).sin().max(0.0);
            Sample::new(start + Duration::seconds(i * 2), lat, lng, elevation)
        })
        .collect();

    let series = TrackSeries::from_samples(&samples, &SeriesConfig::default()).unwrap();
    let analysis = analyze_track(&series, &AnalysisConfig::default()).unwrap();
    let summary = &analysis.summary;

    println!("Track Analysis Example\n");
    println!("Summary:");
    println!("  {} points, {:.0}m in {:.0}s", summary.point_count, summary.total_distance, summary.total_time);
    println!("  Average {:.1} km/h, moving {:.1} km/h, max {:.1} km/h",
        summary.average_speed, summary.moving_speed, summary.max_speed);
    println!("  Ascent {:.1}m, descent {:.1}m, elevation {:.0}-{:.0}m\n",
        summary.ascent, summary.descent, summary.min_elevation, summary.max_elevation);

    println!("Grade bands:");
    for band in &analysis.grade_intervals {
        println!("  ({:>5}, {:>5}]%  {:>7.0}m  {:>5.1} km/h  {:>+6.1}m",
            band.lower, band.upper, band.distance, band.speed, band.elevation_gain);
    }

    println!("\nSpeed bands:");
    for band in &analysis.speed_intervals {
        println!("  ({:>4}, {:>4}] km/h  {:>7.0}m  {:>5.0}s",
            band.lower, band.upper, band.distance, band.delta_time);
    }

    let threshold = &analysis.grade_filter.threshold;
    println!("\nGrade filter: ±{:.0}% after {} steps, {} spikes, {} profile points",
        100.0 * threshold.threshold, threshold.steps, threshold.outlier_count,
        analysis.grade_filter.profile.len());

    println!("\nEvery 100m:");
    for row in analysis.bucket_summary.iter().take(5) {
        println!("  {:.1} km  {:>6.1} km/h avg  {:>5.1}m", row.distance_bucket, row.avg_speed, row.elevation);
    }

    if let Some(top) = analysis.climb_profile.last() {
        println!("\nClimbed {:.1}m in total, last gain at {:.0}s", top.cumulative_gain, top.total_time);
    }
    println!("Scatter: {} weighted points", analysis.scatter.len());
}
