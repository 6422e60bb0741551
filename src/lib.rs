//! `tarantool-sql` decodes Tarantool IPROTO responses and exposes SQL results
//! through a forward-only row cursor.
//!
//! The decoder works on packets already read by a transport:
//! - [`Response::decode`] for generic and SQL requests
//! - [`Response::decode_typed`] to deserialize the data payload into a caller type
//!
//! [`Connection`] routes queries to replicas and statements to the primary
//! through a caller-provided [`Transport`].

mod connection;
mod decode;
mod error;
mod options;
mod params;
mod response;
mod rows;
mod types;
mod value;
mod wire;

#[cfg(feature = "row-map")]
pub mod row_map;

pub use connection::{Connection, Connector, Driver, Transport, DSN_ENV};
pub use decode::{decode_body, decode_body_typed, decode_header};
pub use error::TarantoolError;
pub use options::ClientOptions;
pub use params::Params;
pub use response::{Header, Response};
pub use rows::Rows;
pub use types::{Col, ExecResult};
pub use value::Value;
pub use wire::{Request, ERROR_CODE_BIT, OK_CODE};

pub type Result<T> = std::result::Result<T, TarantoolError>;
