use std::collections::HashMap;
use std::fmt;

use serde::de::DeserializeOwned;

use crate::{
    decode::{decode_body, decode_body_typed, decode_header},
    wire::OK_CODE,
    Col, ExecResult, Result, Rows, Value,
};

/// Correlation id and status code of one response.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Header {
    /// Id of the request this response answers.
    pub sync: u32,
    /// Status code; error responses carry [`ERROR_CODE_BIT`](crate::ERROR_CODE_BIT).
    pub code: u32,
}

/// Decoded server reply.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Response {
    /// Id of the request this response answers.
    pub sync: u32,
    /// Status code as received; error responses keep [`ERROR_CODE_BIT`](crate::ERROR_CODE_BIT) set.
    pub code: u32,
    /// Error message sent with a failing status.
    pub error: Option<String>,
    /// Untyped data payload of generic requests.
    pub data: Vec<Value>,
    /// SQL result-set columns in server declaration order.
    pub meta: Vec<Col>,
    /// Rows changed by a mutating SQL statement.
    pub sql_row_count: Option<u64>,
}

impl Response {
    /// Decodes a whole packet (header followed by body).
    pub fn decode(packet: &[u8]) -> Result<Self> {
        let mut rd = packet;
        let header = decode_header(&mut rd)?;
        decode_body(header, rd)
    }

    /// Decodes a packet, deserializing its data payload into `dest`.
    pub fn decode_typed<T: DeserializeOwned>(packet: &[u8], dest: &mut T) -> Result<Header> {
        let mut rd = packet;
        let header = decode_header(&mut rd)?;
        decode_body_typed(header, rd, dest)?;
        Ok(header)
    }

    pub fn header(&self) -> Header {
        Header {
            sync: self.sync,
            code: self.code,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == OK_CODE
    }

    /// Returns the declared type of a result-set column.
    pub fn column_type(&self, name: &str) -> Option<&str> {
        self.meta
            .iter()
            .find(|col| col.name == name)
            .map(|col| col.type_name.as_str())
    }

    /// Column name to column type mapping.
    pub fn meta_map(&self) -> HashMap<&str, &str> {
        self.meta
            .iter()
            .map(|col| (col.name.as_str(), col.type_name.as_str()))
            .collect()
    }

    /// Normalizes `data` into tuples, wrapping scalar elements.
    ///
    /// `eval` and `call` return bare values where `select` returns tuples.
    pub fn tuples(&self) -> Vec<Vec<Value>> {
        self.data
            .iter()
            .map(|item| match item {
                Value::Array(items) => items.clone(),
                other => vec![other.clone()],
            })
            .collect()
    }

    /// Moves the data payload into a row cursor.
    pub fn into_rows(self) -> Rows {
        Rows::new(self.data, self.meta)
    }

    pub fn exec_result(&self) -> ExecResult {
        ExecResult::new(self.sql_row_count.unwrap_or_default())
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ok() {
            write!(f, "<{} OK {}>", self.sync, Value::Array(self.data.clone()))
        } else {
            write!(
                f,
                "<{} ERR 0x{:x} {}>",
                self.sync,
                self.code,
                self.error.as_deref().unwrap_or_default()
            )
        }
    }
}
