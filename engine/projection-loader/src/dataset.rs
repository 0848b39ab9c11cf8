//! Scraped tabular data: named columns over dynamically typed rows

use projection_store::{Row, Value};
use serde::{Deserialize, Serialize};

/// A table of scraped rows.
///
/// Columns are kept in first-seen order and may exist even when every row
/// holds `Null` for them. A row without an entry for a column reads as `Null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl Dataset {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut dataset = Self::default();
        for column in columns {
            dataset.ensure_column(column.into());
        }
        dataset
    }

    /// Build from rows; columns are the union of the rows' keys
    pub fn from_rows(rows: Vec<Row>) -> Self {
        let mut dataset = Self::default();
        for row in rows {
            dataset.push_row(row);
        }
        dataset
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn rows_mut(&mut self) -> &mut [Row] {
        &mut self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    pub fn ensure_column(&mut self, column: impl Into<String>) {
        let column = column.into();
        if !self.has_column(&column) {
            self.columns.push(column);
        }
    }

    pub fn push_row(&mut self, row: Row) {
        for key in row.keys() {
            if !self.has_column(key) {
                self.columns.push(key.clone());
            }
        }
        self.rows.push(row);
    }

    /// Value of `column` in row `index`, `Null` when absent
    pub fn value(&self, index: usize, column: &str) -> &Value {
        static NULL: Value = Value::Null;
        self.rows.get(index).and_then(|r| r.get(column)).unwrap_or(&NULL)
    }

    /// Keep only `columns` that exist, in the order given
    pub fn select(&self, columns: &[&str]) -> Dataset {
        let kept: Vec<String> =
            columns.iter().filter(|c| self.has_column(c)).map(|c| c.to_string()).collect();
        let rows = self
            .rows
            .iter()
            .map(|row| {
                row.iter()
                    .filter(|(k, _)| kept.contains(k))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .collect();
        Dataset { columns: kept, rows }
    }

    /// Drop `columns`, keeping everything else
    pub fn without(&self, columns: &[&str]) -> Dataset {
        let kept: Vec<&str> =
            self.columns.iter().map(String::as_str).filter(|c| !columns.contains(c)).collect();
        self.select(&kept)
    }

    /// Keep rows matching `keep`; returns how many were removed
    pub fn retain<F>(&mut self, mut keep: F) -> usize
    where
        F: FnMut(&Row) -> bool,
    {
        let before = self.rows.len();
        self.rows.retain(|row| keep(row));
        before - self.rows.len()
    }

    /// Remove rows whose `column` is null; returns how many were removed
    pub fn drop_null(&mut self, column: &str) -> usize {
        self.retain(|row| row.get(column).is_some_and(|v| !v.is_null()))
    }

    /// Distinct values of `column`, in first-seen order
    pub fn distinct(&self, column: &str) -> Vec<Value> {
        let mut seen: Vec<Value> = Vec::new();
        for index in 0..self.rows.len() {
            let value = self.value(index, column);
            if !seen.contains(value) {
                seen.push(value.clone());
            }
        }
        seen
    }

    /// Split into one dataset per distinct key, in first-seen order.
    ///
    /// `key` maps each row to its group and may reject the row.
    pub fn group_by<K, E, F>(&self, mut key: F) -> Result<Vec<(K, Dataset)>, E>
    where
        K: PartialEq,
        F: FnMut(&Row) -> Result<K, E>,
    {
        let mut groups: Vec<(K, Dataset)> = Vec::new();
        for row in &self.rows {
            let row_key = key(row)?;
            let position = match groups.iter().position(|(k, _)| *k == row_key) {
                Some(position) => position,
                None => {
                    let empty = Dataset { columns: self.columns.clone(), rows: Vec::new() };
                    groups.push((row_key, empty));
                    groups.len() - 1
                }
            };
            groups[position].1.rows.push(row.clone());
        }
        Ok(groups)
    }
}
