//! Experimental row mapping helpers.
//!
//! Enabled with the `row-map` feature.

use crate::Value;

/// Lightweight row view for name-based access helpers.
#[derive(Debug)]
pub struct RowRef<'a> {
    /// Column names from [`Rows::columns`](crate::Rows::columns).
    pub columns: &'a [String],
    /// Row values aligned with `columns`.
    pub values: &'a [Value],
}

impl<'a> RowRef<'a> {
    pub fn new(columns: &'a [String], values: &'a [Value]) -> Self {
        Self { columns, values }
    }

    /// Returns a value by case-insensitive column name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        let idx = self
            .columns
            .iter()
            .position(|col| col.eq_ignore_ascii_case(name))?;
        self.values.get(idx)
    }

    /// Returns an integer value by column name.
    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name)?.as_i64()
    }

    /// Returns an unsigned value by column name.
    pub fn get_u64(&self, name: &str) -> Option<u64> {
        self.get(name)?.as_u64()
    }

    /// Returns a float value by column name.
    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.get(name)?.as_f64()
    }

    /// Returns a text value by column name.
    pub fn get_text(&self, name: &str) -> Option<&str> {
        self.get(name)?.as_str()
    }
}
