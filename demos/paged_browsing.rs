//! Example of browsing a long track one page at a time.
//!
//! Run with: cargo run --example paged_browsing

use chrono::{Duration, TimeZone, Utc};
use track_analytics::{
    CellValue, PagedView, Projection, Sample, SeriesConfig, SortOrder, Table, TrackSeries,
};

fn print_page<T: Table>(view: &PagedView<T>, columns: &[&str]) {
    println!("  page {}/{} rows {:?}", view.current_page() + 1, view.page_count(), view.row_range());
    for row in 0..view.row_count().min(3) {
        let cells: Vec<String> = columns
            .iter()
            .map(|name| match view.lookup(row, name) {
                Ok(CellValue::Float(v)) => format!("{:>10.3}", v),
                Ok(CellValue::Time(t)) => t.format("%H:%M:%S").to_string(),
                Ok(CellValue::Missing) | Err(_) => format!("{:>10}", "-"),
            })
            .collect();
        println!("    {}", cells.join("  "));
    }
}

fn main() {
    let start = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
    let samples: Vec<Sample> = (0..1234)
        .map(|i| {
            let lat = 46.2044 + i as f64 * 0.00003;
            let lng = 6.1432 + (i as f64 / 60.0).cos() * 0.0004;
            Sample::new(start + Duration::seconds(i * 3), lat, lng, 375.0 + (i % 80) as f64 * 0.2)
        })
        .collect();
    let series = TrackSeries::from_samples(&samples, &SeriesConfig::default()).unwrap();

    // The browser hides per-row deltas
    let table = Projection::without(&series, &["delta_time", "elevation_gain"]).unwrap();
    println!("Paged Browsing Example\n");
    println!("Columns: {}\n", table.schema().names().collect::<Vec<_>>().join(", "));

    let columns = ["time", "speed", "total_distance"];
    let mut view = PagedView::with_source(&table, 100);

    println!("Input order:");
    print_page(&view, &columns);

    view.last_page();
    println!("\nLast page:");
    print_page(&view, &columns);

    // Out of range, ignored
    let moved = view.set_current_page(view.page_count() + 5);
    println!("\nJump past the end accepted: {}", moved);

    view.first_page();
    view.sort_by_name("speed", SortOrder::Descending).unwrap();
    println!("\nFastest rows first:");
    print_page(&view, &columns);

    // Coordinates of the visible rows, as a map marker would need them
    let lats = view.page_column("latitude").unwrap();
    let lngs = view.page_column("longitude").unwrap();
    if let (Some(lat), Some(lng)) = (lats[0].as_f64(), lngs[0].as_f64()) {
        println!("\nFastest point at ({:.5}, {:.5})", lat, lng);
    }

    match view.lookup(0, "pace") {
        Ok(_) => println!("Unexpected column"),
        Err(e) => println!("Lookup failed as expected: {}", e),
    }

    view.set_page_size(500);
    println!("\nAfter resizing to 500 rows per page:");
    print_page(&view, &columns);
}
