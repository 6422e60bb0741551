use std::mem;

use crate::{Col, Result, TarantoolError, Value};

/// Forward-only cursor over the tuples of an SQL query result.
///
/// Owns the rows moved out of the [`Response`](crate::Response).
#[derive(Debug)]
pub struct Rows {
    data: Vec<Value>,
    columns: Vec<String>,
    position: usize,
    closed: bool,
}

impl Rows {
    pub fn new(data: Vec<Value>, meta: Vec<Col>) -> Self {
        Self {
            data,
            columns: meta.into_iter().map(|col| col.name).collect(),
            position: 0,
            closed: false,
        }
    }

    /// Column names in the order the server declared them.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Copies the next row into `dest`.
    ///
    /// Returns `Ok(false)` once the cursor is closed or exhausted, and keeps
    /// returning it on every later call. A row that is not an array fails with
    /// [`TarantoolError::NotATuple`]; the cursor still moves past it.
    pub fn next_row(&mut self, dest: &mut Vec<Value>) -> Result<bool> {
        if self.closed || self.position >= self.data.len() {
            return Ok(false);
        }

        let row = mem::replace(&mut self.data[self.position], Value::Null);
        self.position += 1;

        match row {
            Value::Array(items) => {
                dest.clear();
                dest.extend(items);
                Ok(true)
            }
            _ => Err(TarantoolError::NotATuple),
        }
    }

    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Rows not yet read.
    pub fn remaining(&self) -> usize {
        if self.closed {
            0
        } else {
            self.data.len() - self.position
        }
    }
}

impl Iterator for Rows {
    type Item = Result<Vec<Value>>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut row = Vec::new();
        match self.next_row(&mut row) {
            Ok(true) => Some(Ok(row)),
            Ok(false) => None,
            Err(err) => Some(Err(err)),
        }
    }
}
