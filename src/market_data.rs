use chrono::{DateTime, Utc};
use polars::prelude::{Column, DataFrame, PolarsResult};

pub const OPEN: &str = "Open";
pub const HIGH: &str = "High";
pub const LOW: &str = "Low";
pub const CLOSE: &str = "Close";
pub const VOLUME: &str = "Volume";
pub const MARKET_CAP: &str = "Market_Cap";

/// Timestamp-ordered table of named numeric columns.
///
/// Undefined cells (missing quotes, indicator warm-up, shift boundaries) are
/// stored as `NaN`. Tables are treated as values: every transformation
/// returns a new table.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TimeSeriesTable {
    timestamps: Vec<DateTime<Utc>>,
    names: Vec<String>,
    columns: Vec<Vec<f64>>,
}

impl TimeSeriesTable {
    pub fn new(timestamps: Vec<DateTime<Utc>>) -> Self {
        Self {
            timestamps,
            names: Vec::new(),
            columns: Vec::new(),
        }
    }

    pub fn from_columns(timestamps: Vec<DateTime<Utc>>, columns: Vec<(&str, Vec<f64>)>) -> Self {
        columns
            .into_iter()
            .fold(Self::new(timestamps), |table, (name, values)| {
                table.with_column(name, values)
            })
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|idx| self.columns[idx].as_slice())
    }

    /// Add a column, replacing any existing column of the same name in place
    /// of its original position.
    ///
    /// # Panics
    /// Panics if `values` does not have one entry per row.
    pub fn with_column(mut self, name: impl Into<String>, values: Vec<f64>) -> Self {
        let name = name.into();
        assert_eq!(
            values.len(),
            self.len(),
            "column '{}' has {} values for {} rows",
            name,
            values.len(),
            self.len()
        );

        match self.names.iter().position(|n| *n == name) {
            Some(idx) => self.columns[idx] = values,
            None => {
                self.names.push(name);
                self.columns.push(values);
            }
        }
        self
    }

    pub fn without_column(mut self, name: &str) -> Self {
        if let Some(idx) = self.names.iter().position(|n| n == name) {
            self.names.remove(idx);
            self.columns.remove(idx);
        }
        self
    }

    /// Rename `from` to `to`, keeping its position. An existing column named
    /// `to` is dropped.
    pub fn rename_column(self, from: &str, to: &str) -> Self {
        if from == to || !self.has_column(from) {
            return self;
        }
        let mut renamed = self.without_column(to);
        if let Some(idx) = renamed.names.iter().position(|n| n == from) {
            renamed.names[idx] = to.to_string();
        }
        renamed
    }

    /// Values of every column at row `idx`, in column order.
    pub fn row(&self, idx: usize) -> Vec<f64> {
        self.columns.iter().map(|col| col[idx]).collect()
    }

    /// Keep the rows whose flag in `keep` is set.
    pub fn filter_rows(&self, keep: &[bool]) -> Self {
        let indices: Vec<usize> = keep
            .iter()
            .enumerate()
            .filter_map(|(i, &k)| k.then_some(i))
            .collect();
        self.take_rows(&indices)
    }

    /// Build a table from the given row indices, in the given order.
    pub fn take_rows(&self, indices: &[usize]) -> Self {
        Self {
            timestamps: indices.iter().map(|&i| self.timestamps[i]).collect(),
            names: self.names.clone(),
            columns: self
                .columns
                .iter()
                .map(|col| indices.iter().map(|&i| col[i]).collect())
                .collect(),
        }
    }

    /// Rows `start..end`, clamped to the table length.
    pub fn slice_rows(&self, start: usize, end: usize) -> Self {
        let end = end.min(self.len());
        let start = start.min(end);
        let indices: Vec<usize> = (start..end).collect();
        self.take_rows(&indices)
    }

    pub fn row_is_defined(&self, idx: usize) -> bool {
        self.columns.iter().all(|col| !col[idx].is_nan())
    }

    /// Drop every row holding an undefined value in any column.
    pub fn drop_undefined(&self) -> Self {
        let keep: Vec<bool> = (0..self.len()).map(|i| self.row_is_defined(i)).collect();
        self.filter_rows(&keep)
    }

    pub fn count_undefined(&self) -> usize {
        self.columns
            .iter()
            .map(|col| col.iter().filter(|v| v.is_nan()).count())
            .sum()
    }

    /// Stable sort of all rows by timestamp.
    pub fn sorted_by_time(&self) -> Self {
        let mut indices: Vec<usize> = (0..self.len()).collect();
        indices.sort_by_key(|&i| self.timestamps[i]);
        self.take_rows(&indices)
    }

    /// Timestamps strictly increasing, i.e. sorted with no duplicates.
    pub fn is_strictly_increasing(&self) -> bool {
        self.timestamps.windows(2).all(|w| w[0] < w[1])
    }

    /// Export as a polars frame with a leading `timestamp` column.
    pub fn to_polars(&self) -> PolarsResult<DataFrame> {
        let dates: Vec<String> = self
            .timestamps
            .iter()
            .map(|ts| ts.format("%Y-%m-%d %H:%M:%S").to_string())
            .collect();

        let mut columns = Vec::with_capacity(self.names.len() + 1);
        columns.push(Column::new("timestamp".into(), dates));
        for (name, values) in self.names.iter().zip(self.columns.iter()) {
            columns.push(Column::new(name.as_str().into(), values.as_slice()));
        }
        DataFrame::new(columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn days(n: usize) -> Vec<DateTime<Utc>> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        (0..n).map(|i| start + Duration::days(i as i64)).collect()
    }

    #[test]
    fn test_with_column_replaces_existing() {
        let table = TimeSeriesTable::new(days(3))
            .with_column(CLOSE, vec![1.0, 2.0, 3.0])
            .with_column(VOLUME, vec![10.0, 20.0, 30.0])
            .with_column(CLOSE, vec![4.0, 5.0, 6.0]);

        assert_eq!(table.column_names(), &["Close".to_string(), "Volume".to_string()]);
        assert_eq!(table.column(CLOSE).unwrap(), &[4.0, 5.0, 6.0]);
    }

    #[test]
    #[should_panic]
    fn test_with_column_rejects_wrong_length() {
        let _ = TimeSeriesTable::new(days(3)).with_column(CLOSE, vec![1.0]);
    }

    #[test]
    fn test_rename_column_keeps_position() {
        let table = TimeSeriesTable::from_columns(
            days(2),
            vec![("price", vec![1.0, 2.0]), ("volume", vec![3.0, 4.0])],
        );
        let renamed = table.rename_column("price", CLOSE);
        assert_eq!(renamed.column_names(), &[CLOSE.to_string(), "volume".to_string()]);
        assert_eq!(renamed.column(CLOSE).unwrap(), &[1.0, 2.0]);
        assert_eq!(renamed.clone().rename_column("missing", "x"), renamed);
    }

    #[test]
    fn test_drop_undefined_removes_nan_rows() {
        let table = TimeSeriesTable::from_columns(
            days(4),
            vec![
                (CLOSE, vec![1.0, f64::NAN, 3.0, 4.0]),
                (VOLUME, vec![1.0, 2.0, 3.0, f64::NAN]),
            ],
        );

        let clean = table.drop_undefined();
        assert_eq!(clean.len(), 2);
        assert_eq!(clean.column(CLOSE).unwrap(), &[1.0, 3.0]);
        assert_eq!(clean.count_undefined(), 0);
    }

    #[test]
    fn test_sorted_by_time() {
        let mut ts = days(3);
        ts.reverse();
        let table = TimeSeriesTable::from_columns(ts, vec![(CLOSE, vec![3.0, 2.0, 1.0])]);

        assert!(!table.is_strictly_increasing());
        let sorted = table.sorted_by_time();
        assert!(sorted.is_strictly_increasing());
        assert_eq!(sorted.column(CLOSE).unwrap(), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_to_polars_shape() {
        let table = TimeSeriesTable::from_columns(
            days(2),
            vec![(CLOSE, vec![1.0, 2.0]), (VOLUME, vec![5.0, 6.0])],
        );
        let df = table.to_polars().unwrap();
        assert_eq!(df.shape(), (2, 3));
    }
}
