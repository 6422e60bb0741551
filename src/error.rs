/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum TarantoolError {
    /// Malformed or truncated wire data, or a payload with an unexpected shape.
    #[error("decode error: {0}")]
    Decode(String),
    /// Response whose status code signals failure.
    #[error("server error 0x{code:x}: {message}")]
    Server {
        /// Status code with the error bit cleared.
        code: u32,
        /// Error message sent by the server.
        message: String,
    },
    /// Result row that is not an array.
    #[error("is not a tuple")]
    NotATuple,
    /// Operation the protocol does not provide.
    #[error("{0} is not implemented")]
    Unsupported(&'static str),
    /// No usable connection for the requested operation.
    #[error("bad connection")]
    BadConnection,
    /// Request parameters the caller supplied in an unusable form.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    /// Connection string without any address.
    #[error("connection string is empty")]
    EmptyDsn,
    /// Failure reported by the transport.
    #[error("transport error: {0}")]
    Transport(Box<dyn std::error::Error + Send + Sync>),
    /// One or more transports failed to close.
    #[error("close failed: {}", .errors.join("\n"))]
    Close { errors: Vec<String> },
}

impl TarantoolError {
    pub(crate) fn decode(err: impl std::fmt::Display) -> Self {
        Self::Decode(err.to_string())
    }

    /// Wraps any transport failure.
    pub fn transport(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Transport(err.into())
    }
}
