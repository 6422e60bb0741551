use crate::{Result, TarantoolError};

/// Result-set column described by SQL metadata.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Col {
    pub name: String,
    pub type_name: String,
}

/// Outcome of a mutating SQL statement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExecResult {
    affected_row_count: u64,
}

impl ExecResult {
    pub fn new(affected_row_count: u64) -> Self {
        Self { affected_row_count }
    }

    pub fn rows_affected(&self) -> u64 {
        self.affected_row_count
    }

    /// Tarantool SQL responses carry no last insert id.
    pub fn last_insert_id(&self) -> Result<i64> {
        Err(TarantoolError::Unsupported("last insert id"))
    }
}
