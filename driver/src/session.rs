//! Caller-facing query sessions.
//!
//! A [`Session`] binds connection defaults and a liveness token to query
//! executions. Closing the session cancels any query that is still polling
//! and makes later queries fail with [`ExecutionError::ConnectionClosed`].

use crate::config::{ConfigError, ConnectionConfig};
use crate::query::{
    ExecutionError, NamedArg, ParameterError, QueryExecutor, QueryParameters, ResultSet,
};
use crate::service::{CloudWatchLogsService, QueryService};
use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Deadline offset used when a timeout is too large to add to the current instant.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Operations a relational caller may ask for that the service cannot do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Statement preparation.
    Prepare,
    /// Transactions.
    Begin,
    /// Write statements.
    Execute,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Prepare => write!(f, "prepared statement"),
            Self::Begin => write!(f, "transaction"),
            Self::Execute => write!(f, "exec statement"),
        }
    }
}

/// Errors returned by a [`Session`].
#[derive(Debug, Error)]
pub enum SessionError {
    /// The operation is not supported by CloudWatch Logs Insights.
    #[error("{0} not supported")]
    NotSupported(Operation),

    /// The connection string could not be parsed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A query argument was invalid or missing.
    #[error(transparent)]
    Parameter(#[from] ParameterError),

    /// The query could not be executed.
    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

/// One logical connection to CloudWatch Logs Insights.
///
/// Queries on a session run one at a time. A session can be shared between
/// tasks behind an `Arc`; `close` may be called from any of them.
pub struct Session {
    config: ConnectionConfig,
    executor: QueryExecutor,
    alive: CancellationToken,
    active: Mutex<()>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Creates a session over an existing query service.
    #[must_use]
    pub fn new(config: ConnectionConfig, service: Arc<dyn QueryService>) -> Self {
        let executor = QueryExecutor::new(service, config.polling);
        Self {
            config,
            executor,
            alive: CancellationToken::new(),
            active: Mutex::new(()),
        }
    }

    /// Creates a session backed by the AWS SDK.
    pub async fn connect(config: ConnectionConfig) -> Self {
        let service = CloudWatchLogsService::from_config(&config).await;
        Self::new(config, Arc::new(service))
    }

    /// Parses `dsn` and connects with the AWS SDK.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Config`] if the connection string is invalid.
    pub async fn open(dsn: &str) -> Result<Self, SessionError> {
        let config = ConnectionConfig::parse(dsn)?;
        Ok(Self::connect(config).await)
    }

    /// Returns the session's connection defaults.
    #[must_use]
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Runs a Logs Insights query and returns its rows.
    ///
    /// Arguments are resolved against the session defaults, then the query
    /// runs with a deadline of now plus the configured timeout. Concurrent
    /// calls on one session wait for each other.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Parameter`] for invalid arguments (before any
    /// service call) and [`SessionError::Execution`] if the query fails, times
    /// out, or the session is closed.
    ///
    /// # Example
    ///
    /// ```
    /// use driver::config::ConnectionConfig;
    /// use driver::query::NamedArg;
    /// use driver::service::ScriptedQueryService;
    /// use driver::session::Session;
    /// use std::sync::Arc;
    ///
    /// # #[tokio::main]
    /// # async fn main() {
    /// let session = Session::new(
    ///     ConnectionConfig::default().with_log_group_names(["app"]),
    ///     Arc::new(ScriptedQueryService::new("q-1").then_complete(vec![])),
    /// );
    ///
    /// let args = [NamedArg::new("start_time", "2020-01-01T00:00:00Z")];
    /// let result = session.query("fields @message", &args).await.unwrap();
    /// assert!(result.is_empty());
    /// # }
    /// ```
    pub async fn query(&self, query: &str, args: &[NamedArg]) -> Result<ResultSet, SessionError> {
        if self.is_closed() {
            return Err(ExecutionError::ConnectionClosed.into());
        }

        let params = QueryParameters::resolve(query, args, &self.config, Utc::now())?;

        let _active = self.active.lock().await;
        let now = Instant::now();
        let deadline = now
            .checked_add(self.config.timeout)
            .unwrap_or_else(|| now + FAR_FUTURE);
        tracing::debug!(
            query = %params.query_string,
            start_time = %params.start_time,
            end_time = %params.end_time,
            "running query"
        );
        Ok(self.executor.execute(&params, deadline, &self.alive).await?)
    }

    /// Closes the session.
    ///
    /// A query that is still polling returns
    /// [`ExecutionError::ConnectionClosed`] and its remote query is stopped.
    /// Closing twice has no further effect.
    pub fn close(&self) {
        if !self.alive.is_cancelled() {
            tracing::debug!("closing session");
            self.alive.cancel();
        }
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.alive.is_cancelled()
    }

    /// Prepared statements are not supported.
    ///
    /// # Errors
    ///
    /// Always returns [`SessionError::NotSupported`].
    pub fn prepare(&self, _query: &str) -> Result<(), SessionError> {
        Err(SessionError::NotSupported(Operation::Prepare))
    }

    /// Transactions are not supported.
    ///
    /// # Errors
    ///
    /// Always returns [`SessionError::NotSupported`].
    pub fn begin(&self) -> Result<(), SessionError> {
        Err(SessionError::NotSupported(Operation::Begin))
    }

    /// Write statements are not supported.
    ///
    /// # Errors
    ///
    /// Always returns [`SessionError::NotSupported`].
    pub fn execute(&self, _query: &str, _args: &[NamedArg]) -> Result<u64, SessionError> {
        Err(SessionError::NotSupported(Operation::Execute))
    }
}
