//! Read-only tabular sources.
//!
//! A [`Table`] exposes ordered rows and a [`Schema`] of named, typed columns.
//! Column names are resolved to integer offsets once, through
//! [`Schema::index_of`], and cells are then read by position.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::TrackError;

/// How a column's values should be interpreted by display collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum FieldKind {
    Timestamp,
    /// Durations carried as fractional seconds
    Seconds,
    Float,
}

/// A named, typed column.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Field {
    pub name: String,
    pub kind: FieldKind,
}

impl Field {
    pub fn new(name: &str, kind: FieldKind) -> Self {
        Self { name: name.to_string(), kind }
    }
}

/// Ordered list of fields with a name index.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    fields: Vec<Field>,
    by_name: HashMap<String, usize>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Self {
        let by_name = fields
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name.clone(), i))
            .collect();
        Self { fields, by_name }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, index: usize) -> Option<&Field> {
        self.fields.get(index)
    }

    /// Resolve a column name to its offset.
    pub fn index_of(&self, name: &str) -> Result<usize, TrackError> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| TrackError::ColumnNotFound(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

/// A single cell. No display formatting is applied.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum CellValue {
    Time(DateTime<Utc>),
    Float(f64),
    Missing,
}

impl CellValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Float(v) => Some(*v),
            CellValue::Time(t) => Some(crate::series::epoch_seconds(*t)),
            CellValue::Missing => None,
        }
    }

    pub fn as_time(&self) -> Option<DateTime<Utc>> {
        match self {
            CellValue::Time(t) => Some(*t),
            _ => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, CellValue::Missing) || matches!(self, CellValue::Float(v) if v.is_nan())
    }

    /// Ordering between present values. Missing and NaN values compare equal to
    /// each other and are placed by the caller.
    pub(crate) fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (CellValue::Time(a), CellValue::Time(b)) => a.cmp(b),
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
                _ => Ordering::Equal,
            },
        }
    }
}

/// A read-only source of ordered rows with named columns.
pub trait Table {
    fn schema(&self) -> &Schema;

    fn row_count(&self) -> usize;

    /// Cell at `(row, column)`, or [`CellValue::Missing`] when out of range.
    fn cell(&self, row: usize, column: usize) -> CellValue;

    fn column_count(&self) -> usize {
        self.schema().len()
    }
}

impl<T: Table + ?Sized> Table for &T {
    fn schema(&self) -> &Schema {
        (**self).schema()
    }

    fn row_count(&self) -> usize {
        (**self).row_count()
    }

    fn cell(&self, row: usize, column: usize) -> CellValue {
        (**self).cell(row, column)
    }
}

impl<T: Table + ?Sized> Table for Arc<T> {
    fn schema(&self) -> &Schema {
        (**self).schema()
    }

    fn row_count(&self) -> usize {
        (**self).row_count()
    }

    fn cell(&self, row: usize, column: usize) -> CellValue {
        (**self).cell(row, column)
    }
}

// ============================================================================
// Projection
// ============================================================================

/// A table exposing a named subset of another table's columns, in the order given.
///
/// # Example
/// ```
/// use chrono::{TimeZone, Utc};
/// use track_analytics::{Projection, Sample, SeriesConfig, Table, TrackSeries};
///
/// let t = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
/// let series = TrackSeries::from_samples(&[Sample::new(t, 46.0, 7.0, 500.0)], &SeriesConfig::default()).unwrap();
///
/// let view = Projection::new(&series, &["latitude", "longitude"]).unwrap();
/// assert_eq!(view.column_count(), 2);
/// assert!(Projection::new(&series, &["pace"]).is_err());
/// ```
#[derive(Debug, Clone)]
pub struct Projection<T> {
    source: T,
    columns: Vec<usize>,
    schema: Schema,
}

impl<T: Table> Projection<T> {
    pub fn new(source: T, names: &[&str]) -> Result<Self, TrackError> {
        let columns = names
            .iter()
            .map(|name| source.schema().index_of(name))
            .collect::<Result<Vec<_>, _>>()?;
        let schema = Self::sub_schema(&source, &columns);
        Ok(Self { source, columns, schema })
    }

    /// All columns except `names`. Unknown names are an error.
    pub fn without(source: T, names: &[&str]) -> Result<Self, TrackError> {
        let hidden = names
            .iter()
            .map(|name| source.schema().index_of(name))
            .collect::<Result<Vec<_>, _>>()?;
        let columns: Vec<usize> = (0..source.column_count())
            .filter(|c| !hidden.contains(c))
            .collect();
        let schema = Self::sub_schema(&source, &columns);
        Ok(Self { source, columns, schema })
    }

    fn sub_schema(source: &T, columns: &[usize]) -> Schema {
        Schema::new(
            columns
                .iter()
                .filter_map(|&c| source.schema().field(c).cloned())
                .collect(),
        )
    }

    pub fn source(&self) -> &T {
        &self.source
    }
}

impl<T: Table> Table for Projection<T> {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn row_count(&self) -> usize {
        self.source.row_count()
    }

    fn cell(&self, row: usize, column: usize) -> CellValue {
        match self.columns.get(column) {
            Some(&c) => self.source.cell(row, c),
            None => CellValue::Missing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal in-memory table for exercising the trait.
    struct Grid {
        schema: Schema,
        cells: Vec<Vec<f64>>,
    }

    impl Table for Grid {
        fn schema(&self) -> &Schema {
            &self.schema
        }

        fn row_count(&self) -> usize {
            self.cells.len()
        }

        fn cell(&self, row: usize, column: usize) -> CellValue {
            self.cells
                .get(row)
                .and_then(|r| r.get(column))
                .map_or(CellValue::Missing, |&v| CellValue::Float(v))
        }
    }

    fn grid() -> Grid {
        Grid {
            schema: Schema::new(vec![
                Field::new("a", FieldKind::Float),
                Field::new("b", FieldKind::Float),
                Field::new("c", FieldKind::Seconds),
            ]),
            cells: vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]],
        }
    }

    #[test]
    fn test_index_of() {
        let g = grid();
        assert_eq!(g.schema().index_of("b").unwrap(), 1);
        assert!(matches!(
            g.schema().index_of("z"),
            Err(TrackError::ColumnNotFound(name)) if name == "z"
        ));
    }

    #[test]
    fn test_projection_reorders() {
        let g = grid();
        let p = Projection::new(&g, &["c", "a"]).unwrap();
        assert_eq!(p.schema().names().collect::<Vec<_>>(), vec!["c", "a"]);
        assert_eq!(p.cell(1, 0), CellValue::Float(6.0));
        assert_eq!(p.cell(1, 1), CellValue::Float(4.0));
        assert_eq!(p.cell(1, 2), CellValue::Missing);
        assert_eq!(p.row_count(), 2);
    }

    #[test]
    fn test_projection_without() {
        let g = grid();
        let p = Projection::without(&g, &["b"]).unwrap();
        assert_eq!(p.schema().names().collect::<Vec<_>>(), vec!["a", "c"]);
        assert_eq!(p.schema().field(1).unwrap().kind, FieldKind::Seconds);
        assert!(Projection::without(&g, &["nope"]).is_err());
    }

    #[test]
    fn test_time_cell_keeps_subsecond() {
        use chrono::TimeZone;
        let t = Utc.timestamp_opt(1_700_000_000, 250_000).unwrap();
        let seconds = CellValue::Time(t).as_f64().unwrap();
        assert!((seconds - 1_700_000_000.00025).abs() < 1e-6);
    }

    #[test]
    fn test_cell_compare() {
        assert_eq!(CellValue::Float(1.0).compare(&CellValue::Float(2.0)), Ordering::Less);
        assert_eq!(CellValue::Missing.compare(&CellValue::Float(2.0)), Ordering::Equal);
        assert!(CellValue::Float(f64::NAN).is_missing());
        assert!(!CellValue::Float(0.0).is_missing());
    }
}
