use std::fmt;

/// Settings handed to the [`Connector`](crate::Connector) for every address.
#[derive(Clone, Eq, PartialEq)]
pub struct ClientOptions {
    /// User to authenticate as.
    pub user: String,
    /// Password, `None` for passwordless users such as `guest`.
    pub password: Option<String>,
    /// Connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Per-request timeout in milliseconds.
    pub request_timeout_ms: u64,
}

impl ClientOptions {
    pub fn with_user(mut self, user: impl Into<String>, password: Option<String>) -> Self {
        self.user = user.into();
        self.password = password;
        self
    }
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            user: "guest".to_owned(),
            password: None,
            connect_timeout_ms: 5_000,
            request_timeout_ms: 10_000,
        }
    }
}

impl fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientOptions")
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .finish()
    }
}
