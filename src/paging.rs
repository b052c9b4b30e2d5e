//! # Paged Table View
//!
//! A read-only, sortable window over any [`Table`].
//!
//! The view keeps only its own state: page size, current page, the active sort
//! and the position-to-row permutation that sort produces. Cell reads always go
//! straight to the source through the current row range, so a view never
//! holds stale row data.
//!
//! ## Contract
//!
//! - `row_range = [page * page_size, min((page + 1) * page_size, total_rows))`,
//!   expressed in positions of the sorted order.
//! - Requests that would not change anything, or that point outside the
//!   source, are ignored and leave the view untouched. They are not errors.
//! - Unknown column names are errors ([`TrackError::ColumnNotFound`]).
//!
//! ## Example
//!
//! ```rust
//! use chrono::{Duration, TimeZone, Utc};
//! use track_analytics::{PagedView, Sample, SeriesConfig, SortOrder, TrackSeries};
//!
//! let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
//! let samples: Vec<Sample> = (0..120)
//!     .map(|i| Sample::new(t0 + Duration::seconds(i), 46.0 + i as f64 * 1e-4, 7.0, 500.0))
//!     .collect();
//! let series = TrackSeries::from_samples(&samples, &SeriesConfig::default()).unwrap();
//!
//! let mut view = PagedView::with_source(&series, 50);
//! assert_eq!(view.row_range(), 0..50);
//!
//! view.set_current_page(2);
//! assert_eq!(view.row_range(), 100..120);
//!
//! // Out of bounds: ignored
//! view.set_current_page(3);
//! assert_eq!(view.current_page(), 2);
//!
//! view.sort_by_name("time", SortOrder::Descending).unwrap();
//! // Page 2 of the descending order starts at the 20th sample
//! let first = view.lookup(0, "time").unwrap();
//! assert_eq!(first.as_time(), Some(t0 + Duration::seconds(19)));
//! ```

use std::ops::Range;

use log::debug;

use crate::table::{CellValue, Table};
use crate::TrackError;

/// Sort direction for [`PagedView::sort`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// Windowed, sortable projection over a table source.
#[derive(Debug, Clone)]
pub struct PagedView<T> {
    source: Option<T>,
    page_size: usize,
    current_page: usize,
    sort: Option<(usize, SortOrder)>,
    /// Sorted position -> source row. Empty means input order.
    order: Vec<usize>,
    row_range: Range<usize>,
}

impl<T: Table> PagedView<T> {
    /// Create an unbound view. Page sizes below 1 are raised to 1.
    pub fn new(page_size: usize) -> Self {
        Self {
            source: None,
            page_size: page_size.max(1),
            current_page: 0,
            sort: None,
            order: Vec::new(),
            row_range: 0..0,
        }
    }

    /// Create a view bound to `source`, showing page 0.
    pub fn with_source(source: T, page_size: usize) -> Self {
        let mut view = Self::new(page_size);
        view.set_source(source);
        view
    }

    /// Rebind to a new source. Resets to page 0 in input order.
    pub fn set_source(&mut self, source: T) {
        self.source = Some(source);
        self.current_page = 0;
        self.sort = None;
        self.order.clear();
        self.refresh_range();
        debug!(
            "[Paging] Bound source with {} rows, {} columns",
            self.total_rows(),
            self.source.as_ref().map_or(0, |s| s.column_count())
        );
    }

    /// Unbind the source. The row range becomes empty.
    pub fn clear_source(&mut self) -> Option<T> {
        self.current_page = 0;
        self.sort = None;
        self.order.clear();
        self.row_range = 0..0;
        self.source.take()
    }

    pub fn source(&self) -> Option<&T> {
        self.source.as_ref()
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    pub fn row_range(&self) -> Range<usize> {
        self.row_range.clone()
    }

    pub fn sort_state(&self) -> Option<(usize, SortOrder)> {
        self.sort
    }

    /// Rows in the source, 0 when unbound.
    pub fn total_rows(&self) -> usize {
        self.source.as_ref().map_or(0, |s| s.row_count())
    }

    /// Rows on the current page.
    pub fn row_count(&self) -> usize {
        self.row_range.len()
    }

    /// Number of pages needed to show every row.
    pub fn page_count(&self) -> usize {
        self.total_rows().div_ceil(self.page_size)
    }

    /// Change the page size.
    ///
    /// Ignored when `page_size` is 0, unchanged, or would cover every row
    /// (paging only applies when it reduces the visible set). Returns whether
    /// the view changed.
    pub fn set_page_size(&mut self, page_size: usize) -> bool {
        if page_size == 0 || page_size == self.page_size || page_size >= self.total_rows() {
            return false;
        }
        self.page_size = page_size;
        self.refresh_range();
        debug!("[Paging] Page size {} -> range {:?}", page_size, self.row_range);
        true
    }

    /// Move to `page`. Ignored when unchanged or when the page starts past the
    /// last row. Returns whether the view changed.
    pub fn set_current_page(&mut self, page: usize) -> bool {
        if page == self.current_page {
            return false;
        }
        let in_bounds = page
            .checked_mul(self.page_size)
            .is_some_and(|first| first < self.total_rows());
        if !in_bounds {
            return false;
        }
        self.current_page = page;
        self.refresh_range();
        true
    }

    pub fn first_page(&mut self) -> bool {
        self.set_current_page(0)
    }

    pub fn last_page(&mut self) -> bool {
        match self.page_count() {
            0 => false,
            n => self.set_current_page(n - 1),
        }
    }

    pub fn next_page(&mut self) -> bool {
        self.set_current_page(self.current_page + 1)
    }

    pub fn previous_page(&mut self) -> bool {
        match self.current_page.checked_sub(1) {
            Some(page) => self.set_current_page(page),
            None => false,
        }
    }

    /// Reorder rows by `column`. Ignored when unbound or when the column offset
    /// is out of range. Missing values sort last in either direction; ties keep
    /// input order.
    pub fn sort(&mut self, column: usize, order: SortOrder) -> bool {
        let Some(source) = self.source.as_ref() else {
            return false;
        };
        if column >= source.column_count() {
            return false;
        }

        let keys: Vec<CellValue> = (0..source.row_count())
            .map(|row| source.cell(row, column))
            .collect();
        let mut positions: Vec<usize> = (0..keys.len()).collect();
        positions.sort_by(|&a, &b| {
            let (ka, kb) = (&keys[a], &keys[b]);
            match (ka.is_missing(), kb.is_missing()) {
                (true, true) => std::cmp::Ordering::Equal,
                (true, false) => std::cmp::Ordering::Greater,
                (false, true) => std::cmp::Ordering::Less,
                (false, false) => match order {
                    SortOrder::Ascending => ka.compare(kb),
                    SortOrder::Descending => kb.compare(ka),
                },
            }
        });

        self.order = positions;
        self.sort = Some((column, order));
        self.refresh_range();
        debug!("[Paging] Sorted by column {} {:?}", column, order);
        true
    }

    /// Reorder rows by a named column.
    pub fn sort_by_name(&mut self, name: &str, order: SortOrder) -> Result<(), TrackError> {
        let column = self.column_index(name)?;
        self.sort(column, order);
        Ok(())
    }

    /// Return to input order.
    pub fn clear_sort(&mut self) {
        self.sort = None;
        self.order.clear();
        self.refresh_range();
    }

    /// Whether the row at sorted position `position` is on the current page.
    pub fn is_visible(&self, position: usize) -> bool {
        self.row_range.contains(&position)
    }

    /// Source row indices of the current page, in display order.
    pub fn visible_rows(&self) -> impl Iterator<Item = usize> + '_ {
        self.row_range.clone().map(move |p| self.source_row(p))
    }

    /// Cell at a page-relative row and column offset. Missing outside the page.
    pub fn value(&self, page_row: usize, column: usize) -> CellValue {
        let Some(source) = self.source.as_ref() else {
            return CellValue::Missing;
        };
        if page_row >= self.row_range.len() {
            return CellValue::Missing;
        }
        source.cell(self.source_row(self.row_range.start + page_row), column)
    }

    /// Cell at a page-relative row and named column.
    pub fn lookup(&self, page_row: usize, column_name: &str) -> Result<CellValue, TrackError> {
        let column = self.column_index(column_name)?;
        Ok(self.value(page_row, column))
    }

    /// All values of a named column on the current page, in display order.
    pub fn page_column(&self, column_name: &str) -> Result<Vec<CellValue>, TrackError> {
        let column = self.column_index(column_name)?;
        Ok((0..self.row_range.len()).map(|r| self.value(r, column)).collect())
    }

    fn column_index(&self, name: &str) -> Result<usize, TrackError> {
        match self.source.as_ref() {
            Some(source) => source.schema().index_of(name),
            None => Err(TrackError::ColumnNotFound(name.to_string())),
        }
    }

    fn source_row(&self, position: usize) -> usize {
        self.order.get(position).copied().unwrap_or(position)
    }

    fn refresh_range(&mut self) {
        let total = self.total_rows();
        let first = self.current_page.saturating_mul(self.page_size).min(total);
        let last = self
            .current_page
            .saturating_add(1)
            .saturating_mul(self.page_size)
            .min(total);
        self.row_range = first..last;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{Field, FieldKind, Schema};

    /// Single-column table holding `values`.
    struct Column {
        schema: Schema,
        values: Vec<Option<f64>>,
    }

    impl Column {
        fn new(values: Vec<Option<f64>>) -> Self {
            Self {
                schema: Schema::new(vec![
                    Field::new("id", FieldKind::Float),
                    Field::new("value", FieldKind::Float),
                ]),
                values,
            }
        }

        fn sequential(n: usize) -> Self {
            Self::new((0..n).map(|i| Some(i as f64)).collect())
        }
    }

    impl Table for Column {
        fn schema(&self) -> &Schema {
            &self.schema
        }

        fn row_count(&self) -> usize {
            self.values.len()
        }

        fn cell(&self, row: usize, column: usize) -> CellValue {
            match (self.values.get(row), column) {
                (Some(_), 0) => CellValue::Float(row as f64),
                (Some(Some(v)), 1) => CellValue::Float(*v),
                _ => CellValue::Missing,
            }
        }
    }

    #[test]
    fn test_pages_of_fifty() {
        let mut view = PagedView::with_source(Column::sequential(120), 50);
        assert_eq!(view.row_range(), 0..50);
        assert!(view.set_current_page(1));
        assert_eq!(view.row_range(), 50..100);
        assert!(view.set_current_page(2));
        assert_eq!(view.row_range(), 100..120);

        assert!(!view.set_current_page(3));
        assert_eq!(view.current_page(), 2);
        assert_eq!(view.row_range(), 100..120);
        assert_eq!(view.page_count(), 3);
    }

    #[test]
    fn test_range_invariants() {
        for total in [0usize, 1, 7, 50, 51, 120] {
            for size in [1usize, 3, 50, 200] {
                let mut view = PagedView::new(size);
                view.set_source(Column::sequential(total));
                for page in 0..(total / size + 3) {
                    view.set_current_page(page);
                    let range = view.row_range();
                    assert!(range.len() <= view.page_size());
                    let past_end = view.current_page() * view.page_size() >= total;
                    assert_eq!(range.is_empty(), past_end);
                }
            }
        }
    }

    #[test]
    fn test_unbound_view_is_empty() {
        let mut view: PagedView<Column> = PagedView::new(10);
        assert_eq!(view.row_range(), 0..0);
        assert!(!view.set_current_page(1));
        assert!(!view.sort(0, SortOrder::Ascending));
        assert!(matches!(view.lookup(0, "value"), Err(TrackError::ColumnNotFound(_))));
    }

    #[test]
    fn test_empty_source() {
        let view = PagedView::with_source(Column::sequential(0), 10);
        assert_eq!(view.row_range(), 0..0);
        assert_eq!(view.page_count(), 0);
    }

    #[test]
    fn test_zero_page_size_clamped() {
        let view: PagedView<Column> = PagedView::new(0);
        assert_eq!(view.page_size(), 1);
    }

    #[test]
    fn test_set_page_size_rules() {
        let mut view = PagedView::with_source(Column::sequential(120), 50);
        assert!(!view.set_page_size(0));
        assert!(!view.set_page_size(50));
        assert!(!view.set_page_size(120));
        assert!(!view.set_page_size(500));
        assert_eq!(view.page_size(), 50);

        assert!(view.set_page_size(20));
        assert_eq!(view.row_range(), 0..20);

        view.set_current_page(5);
        assert_eq!(view.row_range(), 100..120);

        // Current page kept under the new size, even past the end
        assert!(view.set_page_size(100));
        assert_eq!(view.current_page(), 5);
        assert_eq!(view.row_range(), 120..120);
    }

    #[test]
    fn test_set_source_resets_page() {
        let mut view = PagedView::with_source(Column::sequential(120), 50);
        view.set_current_page(2);
        view.sort(1, SortOrder::Descending);
        view.set_source(Column::sequential(30));
        assert_eq!(view.current_page(), 0);
        assert_eq!(view.sort_state(), None);
        assert_eq!(view.row_range(), 0..30);
    }

    #[test]
    fn test_navigation() {
        let mut view = PagedView::with_source(Column::sequential(120), 50);
        assert!(!view.previous_page());
        assert!(view.next_page());
        assert!(view.next_page());
        assert!(!view.next_page());
        assert_eq!(view.current_page(), 2);
        assert!(view.first_page());
        assert!(view.last_page());
        assert_eq!(view.row_range(), 100..120);
    }

    #[test]
    fn test_sort_descending_reads_sorted_source() {
        let mut view = PagedView::with_source(Column::sequential(120), 50);
        view.set_current_page(1);
        assert!(view.sort(1, SortOrder::Descending));
        assert_eq!(view.current_page(), 1);
        assert_eq!(view.row_range(), 50..100);
        assert_eq!(view.lookup(0, "value").unwrap(), CellValue::Float(69.0));
        assert_eq!(view.visible_rows().next(), Some(69));

        view.clear_sort();
        assert_eq!(view.lookup(0, "value").unwrap(), CellValue::Float(50.0));
    }

    #[test]
    fn test_sort_missing_last() {
        let source = Column::new(vec![Some(3.0), None, Some(1.0), Some(2.0)]);
        let mut view = PagedView::with_source(source, 10);

        view.sort(1, SortOrder::Ascending);
        assert_eq!(view.visible_rows().collect::<Vec<_>>(), vec![2, 3, 0, 1]);

        view.sort(1, SortOrder::Descending);
        assert_eq!(view.visible_rows().collect::<Vec<_>>(), vec![0, 3, 2, 1]);
    }

    #[test]
    fn test_sort_out_of_range_column_ignored() {
        let mut view = PagedView::with_source(Column::sequential(5), 2);
        assert!(!view.sort(9, SortOrder::Ascending));
        assert_eq!(view.sort_state(), None);
    }

    #[test]
    fn test_lookup_unknown_column() {
        let mut view = PagedView::with_source(Column::sequential(5), 2);
        assert!(matches!(
            view.lookup(0, "Latitude"),
            Err(TrackError::ColumnNotFound(name)) if name == "Latitude"
        ));
        assert!(view.sort_by_name("Latitude", SortOrder::Ascending).is_err());
        assert_eq!(view.sort_state(), None);
    }

    #[test]
    fn test_lookup_outside_page_is_missing() {
        let mut view = PagedView::with_source(Column::sequential(120), 50);
        view.set_current_page(2);
        assert_eq!(view.lookup(19, "value").unwrap(), CellValue::Float(119.0));
        assert_eq!(view.lookup(20, "value").unwrap(), CellValue::Missing);
        assert!(view.is_visible(100));
        assert!(!view.is_visible(99));
    }

    #[test]
    fn test_page_column() {
        let mut view = PagedView::with_source(Column::sequential(7), 3);
        view.set_current_page(2);
        assert_eq!(view.page_column("id").unwrap(), vec![CellValue::Float(6.0)]);
    }
}
