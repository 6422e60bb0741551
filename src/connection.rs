use std::fmt;
use std::future::Future;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use serde::de::DeserializeOwned;

use crate::{
    ClientOptions, ExecResult, Header, Params, Request, Response, Result, Rows, TarantoolError,
    Value,
};

/// Environment variable read by [`Driver::open_from_env`].
pub const DSN_ENV: &str = "TARANTOOL_DSN";

/// Sends one request and returns the response packet (header and body,
/// without the length prefix).
pub trait Transport: Send + Sync {
    fn send(&self, request: Request<'_>) -> impl Future<Output = Result<Vec<u8>>> + Send;

    /// Whether the transport can currently carry requests.
    fn is_connected(&self) -> bool {
        true
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Establishes transports for the addresses of a connection string.
pub trait Connector: Send + Sync {
    type Transport: Transport;

    fn connect(
        &self,
        addr: &str,
        options: &ClientOptions,
    ) -> impl Future<Output = Result<Self::Transport>> + Send;
}

/// Opens [`Connection`]s from comma-separated address lists.
#[derive(Debug)]
pub struct Driver<C> {
    connector: C,
    options: ClientOptions,
}

impl<C: Connector> Driver<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            options: ClientOptions::default(),
        }
    }

    /// Applies options passed to the connector for every address.
    pub fn with_options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }

    /// Opens a connection from `primary[,replica...]`.
    ///
    /// A single address serves both writes and reads, and its connect error
    /// is returned as is. With several addresses the first one is the
    /// primary and the rest are read replicas; replicas that fail to connect
    /// are dropped, and the call only fails when nothing connected.
    pub async fn open(&self, dsn: &str) -> Result<Connection<C::Transport>> {
        let addrs: Vec<&str> = dsn
            .split(',')
            .map(str::trim)
            .filter(|addr| !addr.is_empty())
            .collect();
        let (first, rest) = addrs.split_first().ok_or(TarantoolError::EmptyDsn)?;

        let primary = self.connector.connect(first, &self.options).await;
        if rest.is_empty() {
            return primary.map(Connection::single);
        }

        let mut replicas = Vec::with_capacity(rest.len());
        for addr in rest {
            match self.connector.connect(addr, &self.options).await {
                Ok(transport) => replicas.push(transport),
                Err(_err) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(addr = %addr, error = %_err, "replica connect failed");
                }
            }
        }

        let primary = match primary {
            Ok(transport) => Some(transport),
            Err(_err) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(addr = %first, error = %_err, "primary connect failed");
                None
            }
        };

        if primary.is_none() && replicas.is_empty() {
            return Err(TarantoolError::BadConnection);
        }
        Ok(Connection::new(primary, replicas))
    }

    /// Opens a connection from the `TARANTOOL_DSN` environment variable.
    pub async fn open_from_env(&self) -> Result<Connection<C::Transport>> {
        let dsn = std::env::var(DSN_ENV).map_err(|_| TarantoolError::EmptyDsn)?;
        self.open(&dsn).await
    }
}

/// Primary transport for statements plus round-robin replicas for queries.
pub struct Connection<T> {
    primary: Option<Arc<T>>,
    replicas: Vec<Arc<T>>,
    next_replica: AtomicUsize,
}

impl<T> fmt::Debug for Connection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("primary", &self.primary.is_some())
            .field("replicas", &self.replicas.len())
            .field("next_replica", &self.next_replica.load(Ordering::Relaxed))
            .finish()
    }
}

impl<T: Transport> Connection<T> {
    pub fn new(primary: Option<T>, replicas: Vec<T>) -> Self {
        Self {
            primary: primary.map(Arc::new),
            replicas: replicas.into_iter().map(Arc::new).collect(),
            next_replica: AtomicUsize::new(0),
        }
    }

    /// Uses one transport for both statements and queries.
    pub fn single(transport: T) -> Self {
        let transport = Arc::new(transport);
        Self {
            primary: Some(Arc::clone(&transport)),
            replicas: vec![transport],
            next_replica: AtomicUsize::new(0),
        }
    }

    pub fn replica_count(&self) -> usize {
        self.replicas.len()
    }

    /// Runs a row-returning SQL query on the next replica.
    ///
    /// An unavailable replica fails the call with
    /// [`TarantoolError::BadConnection`]; the next call moves on to the
    /// following replica.
    pub async fn query<P: Into<Params>>(&self, sql: &str, params: P) -> Result<Rows> {
        let transport = self.select_replica()?;
        let params = params.into();
        let packet = transport.send(Request::Execute { sql, params: &params }).await?;
        Ok(Response::decode(&packet)?.into_rows())
    }

    /// Runs a mutating SQL statement on the primary.
    pub async fn execute<P: Into<Params>>(&self, sql: &str, params: P) -> Result<ExecResult> {
        let transport = self.primary()?;
        let params = params.into();
        let packet = transport.send(Request::Execute { sql, params: &params }).await?;
        Ok(Response::decode(&packet)?.exec_result())
    }

    /// Calls a stored function on the primary.
    pub async fn call(&self, function: &str, args: &[Value]) -> Result<Response> {
        let packet = self.primary()?.send(Request::Call { function, args }).await?;
        Response::decode(&packet)
    }

    /// Calls a stored function, deserializing its result into `dest`.
    pub async fn call_typed<R: DeserializeOwned>(
        &self,
        function: &str,
        args: &[Value],
        dest: &mut R,
    ) -> Result<Header> {
        let packet = self.primary()?.send(Request::Call { function, args }).await?;
        Response::decode_typed(&packet, dest)
    }

    /// Evaluates a Lua expression on the primary.
    pub async fn eval(&self, expr: &str, args: &[Value]) -> Result<Response> {
        let packet = self.primary()?.send(Request::Eval { expr, args }).await?;
        Response::decode(&packet)
    }

    /// Prepared statements are not supported.
    pub fn prepare(&self, _sql: &str) -> Result<()> {
        Err(TarantoolError::Unsupported("prepare"))
    }

    /// Transactions are not supported.
    pub fn begin(&self) -> Result<()> {
        Err(TarantoolError::Unsupported("transactions"))
    }

    pub fn commit(&self) -> Result<()> {
        Err(TarantoolError::Unsupported("transactions"))
    }

    pub fn rollback(&self) -> Result<()> {
        Err(TarantoolError::Unsupported("transactions"))
    }

    /// Closes the primary and every replica, reporting all failures together.
    pub fn close(&self) -> Result<()> {
        let mut errors = Vec::new();

        if let Some(primary) = &self.primary {
            if let Err(err) = primary.close() {
                errors.push(err.to_string());
            }
        }

        for replica in &self.replicas {
            let shared = self
                .primary
                .as_ref()
                .is_some_and(|primary| Arc::ptr_eq(primary, replica));
            if shared {
                continue;
            }
            if let Err(err) = replica.close() {
                errors.push(err.to_string());
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(TarantoolError::Close { errors })
        }
    }

    fn primary(&self) -> Result<&T> {
        match &self.primary {
            Some(primary) if primary.is_connected() => Ok(&**primary),
            _ => Err(TarantoolError::BadConnection),
        }
    }

    fn select_replica(&self) -> Result<&T> {
        let len = self.replicas.len();
        if len == 0 {
            return Err(TarantoolError::BadConnection);
        }

        let index = match self
            .next_replica
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |i| Some((i + 1) % len))
        {
            Ok(index) | Err(index) => index,
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(replica = index, "selected replica for query");

        match self.replicas.get(index) {
            Some(replica) if replica.is_connected() => Ok(&**replica),
            _ => Err(TarantoolError::BadConnection),
        }
    }
}
