//! Remote query service abstraction.
//!
//! The `QueryService` trait is the narrow interface the executor consumes:
//! start a query, fetch its status and results, stop it. Two
//! implementations are provided:
//!
//! - [`CloudWatchLogsService`] talks to CloudWatch Logs Insights through the AWS SDK.
//! - [`ScriptedQueryService`] replays scripted replies from memory, for tests
//!   and offline development.

mod aws;
mod scripted;

pub use aws::CloudWatchLogsService;
pub use scripted::ScriptedQueryService;

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

/// Errors returned by a remote query service.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The per-call deadline elapsed before the service answered.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// The service rejected or failed the request.
    #[error("{operation} failed: {message}")]
    Request {
        /// Name of the remote operation.
        operation: &'static str,
        /// Error message reported by the service or transport.
        message: String,
    },

    /// The service answered without a field the driver depends on.
    #[error("{operation} response is missing {field}")]
    MissingField {
        /// Name of the remote operation.
        operation: &'static str,
        /// Name of the missing field.
        field: &'static str,
    },
}

/// Opaque identifier of one remote query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryId(String);

impl QueryId {
    /// Wraps a raw query identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Status of a remote query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryStatus {
    /// Accepted but not yet running.
    Scheduled,
    /// Running.
    Running,
    /// Finished; results are available.
    Complete,
    /// Finished with an error.
    Failed,
    /// Stopped before finishing.
    Cancelled,
    /// Stopped by the service after running too long.
    Timeout,
    /// Status not known to this driver.
    Unknown,
}

impl QueryStatus {
    /// Returns `true` if no further progress can occur, so stopping is unnecessary.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Complete | Self::Failed | Self::Cancelled | Self::Timeout
        )
    }
}

impl fmt::Display for QueryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scheduled => write!(f, "scheduled"),
            Self::Running => write!(f, "running"),
            Self::Complete => write!(f, "complete"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Timeout => write!(f, "timeout"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// One field of one result row, as returned by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultField {
    /// Field name, e.g. `@timestamp`.
    pub field: String,
    /// Field value as text.
    pub value: String,
}

impl ResultField {
    /// Creates a result field.
    #[must_use]
    pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }
}

/// Scan statistics reported alongside query results.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct QueryStatistics {
    /// Number of log events that matched the query.
    pub records_matched: f64,
    /// Number of log events scanned.
    pub records_scanned: f64,
    /// Number of bytes scanned.
    pub bytes_scanned: f64,
}

/// Reply to a status fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResults {
    /// Current status of the query.
    pub status: QueryStatus,
    /// Result rows; only meaningful when `status` is `Complete`.
    pub results: Vec<Vec<ResultField>>,
    /// Scan statistics, if reported.
    pub statistics: Option<QueryStatistics>,
}

impl QueryResults {
    /// Creates a reply with the given status and no rows.
    #[must_use]
    pub fn with_status(status: QueryStatus) -> Self {
        Self {
            status,
            results: Vec::new(),
            statistics: None,
        }
    }

    /// Creates a `Complete` reply carrying the given rows.
    #[must_use]
    pub fn complete(results: Vec<Vec<ResultField>>) -> Self {
        Self {
            status: QueryStatus::Complete,
            results,
            statistics: None,
        }
    }
}

/// Log groups a query runs against.
///
/// A query names either one group or several, never both forms at once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogGroups {
    /// Exactly one log group, sent in the single-name field.
    Single(String),
    /// Two or more log groups, sent in the multi-name field.
    Multiple(Vec<String>),
}

impl LogGroups {
    /// Builds the selector from a resolved list of names.
    ///
    /// Returns `None` for an empty list.
    #[must_use]
    pub fn from_names(mut names: Vec<String>) -> Option<Self> {
        match names.len() {
            0 => None,
            1 => names.pop().map(Self::Single),
            _ => Some(Self::Multiple(names)),
        }
    }

    /// Returns the single-name field, if this selector uses it.
    #[must_use]
    pub fn log_group_name(&self) -> Option<&str> {
        match self {
            Self::Single(name) => Some(name),
            Self::Multiple(_) => None,
        }
    }

    /// Returns the multi-name field; empty if this selector uses the single-name field.
    #[must_use]
    pub fn log_group_names(&self) -> &[String] {
        match self {
            Self::Single(_) => &[],
            Self::Multiple(names) => names,
        }
    }
}

/// Request to start a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartQueryRequest {
    /// The search expression; `None` when empty.
    pub query_string: Option<String>,
    /// Start of the time range, in seconds since the Unix epoch.
    pub start_time: i64,
    /// End of the time range, in seconds since the Unix epoch.
    pub end_time: i64,
    /// Maximum number of rows to return.
    pub limit: Option<i32>,
    /// Log groups to search.
    pub log_groups: LogGroups,
}

/// The remote query service consumed by the executor.
///
/// Each operation is independently fallible and is never retried by the driver.
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait QueryService: Send + Sync {
    /// Starts a query and returns its identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the service rejects the query or cannot be reached.
    async fn start_query(&self, request: &StartQueryRequest) -> Result<QueryId, ServiceError>;

    /// Fetches the current status of a query, with its rows once complete.
    ///
    /// # Errors
    ///
    /// Returns an error if the service cannot be reached or does not know the query.
    async fn get_query_results(&self, query_id: &QueryId) -> Result<QueryResults, ServiceError>;

    /// Requests that a running query be stopped.
    ///
    /// Returns whether the service reports the stop as successful.
    ///
    /// # Errors
    ///
    /// Returns an error if the service cannot be reached or refuses the request.
    async fn stop_query(&self, query_id: &QueryId) -> Result<bool, ServiceError>;
}
