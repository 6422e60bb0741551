use crate::{Params, Value};

pub(crate) const KEY_CODE: i64 = 0x00;
pub(crate) const KEY_SYNC: i64 = 0x01;

pub(crate) const KEY_DATA: i64 = 0x30;
pub(crate) const KEY_ERROR: i64 = 0x31;
pub(crate) const KEY_METADATA: i64 = 0x32;
pub(crate) const KEY_SQL_INFO: i64 = 0x42;

pub(crate) const FIELD_NAME: u64 = 0x00;
pub(crate) const FIELD_TYPE: u64 = 0x01;

pub(crate) const SQL_INFO_ROW_COUNT: u64 = 0x00;

/// Status code of a successful response.
pub const OK_CODE: u32 = 0;
/// Bit set in the status code of every error response.
pub const ERROR_CODE_BIT: u32 = 0x8000;

/// Request handed to a [`Transport`](crate::Transport).
///
/// Encoding and framing belong to the transport.
#[derive(Clone, Debug, PartialEq)]
pub enum Request<'a> {
    /// SQL statement with bound parameters.
    Execute { sql: &'a str, params: &'a Params },
    /// Stored function call.
    Call { function: &'a str, args: &'a [Value] },
    /// Lua expression evaluation.
    Eval { expr: &'a str, args: &'a [Value] },
}
