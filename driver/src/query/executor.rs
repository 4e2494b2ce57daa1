//! Query execution engine.
//!
//! Drives one remote query through submit, poll and terminate, honouring the
//! caller's deadline and the session's cancellation token.

use super::params::QueryParameters;
use super::result::{materialize, ResultSet};
use crate::service::{QueryId, QueryResults, QueryService, QueryStatus, ServiceError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, timeout_at, Instant};
use tokio_util::sync::CancellationToken;

/// Errors that can occur during query execution.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// Submitting the query failed or did not finish before the deadline.
    #[error("start query: {0}")]
    StartQuery(#[source] ServiceError),

    /// Fetching the query status failed.
    #[error("get query results: {0}")]
    GetQueryResults(#[source] ServiceError),

    /// The service reported the query as failed.
    #[error("query failed: {query_id}")]
    QueryFailed {
        /// Identifier of the failed query.
        query_id: QueryId,
    },

    /// The deadline elapsed while the query was still running.
    #[error("deadline exceeded waiting for query {query_id}")]
    DeadlineExceeded {
        /// Identifier of the abandoned query.
        query_id: QueryId,
    },

    /// The session was closed before the query finished.
    #[error("connection closed")]
    ConnectionClosed,
}

/// Runs queries against a [`QueryService`], polling on a fixed interval.
#[derive(Clone)]
pub struct QueryExecutor {
    service: Arc<dyn QueryService>,
    polling: Duration,
}

impl std::fmt::Debug for QueryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryExecutor")
            .field("polling", &self.polling)
            .finish_non_exhaustive()
    }
}

impl QueryExecutor {
    /// Creates an executor that waits `polling` between status fetches.
    #[must_use]
    pub fn new(service: Arc<dyn QueryService>, polling: Duration) -> Self {
        Self { service, polling }
    }

    /// Executes a query and materializes its results.
    ///
    /// The query is submitted once, then its status is fetched immediately
    /// and again every polling interval until it completes or fails. Polling
    /// stops early when `deadline` passes or `cancel` fires.
    ///
    /// Once the service has accepted the query, every exit other than
    /// `Complete` re-checks the status and stops the query if it is still
    /// running. That cleanup never changes the returned error. If the
    /// returned future is dropped mid-flight, the cleanup is spawned onto the
    /// current runtime instead.
    ///
    /// # Errors
    ///
    /// Returns an error if submitting or polling fails, if the query fails,
    /// if the deadline passes, or if `cancel` fires.
    pub async fn execute(
        &self,
        params: &QueryParameters,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<ResultSet, ExecutionError> {
        if cancel.is_cancelled() {
            return Err(ExecutionError::ConnectionClosed);
        }

        let started = Instant::now();
        let request = params.to_request();
        let query_id = match timeout_at(deadline, self.service.start_query(&request)).await {
            Ok(Ok(query_id)) => query_id,
            Ok(Err(err)) => return Err(ExecutionError::StartQuery(err)),
            Err(_) => return Err(ExecutionError::StartQuery(ServiceError::DeadlineExceeded)),
        };
        tracing::debug!(query_id = %query_id, "query started");

        let mut guard = StopOnDrop::new(Arc::clone(&self.service), query_id.clone());
        match self.poll(&query_id, deadline, cancel).await {
            Ok(results) => {
                guard.disarm();
                let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                let stats = results.statistics.unwrap_or_default();
                tracing::debug!(
                    query_id = %query_id,
                    elapsed_ms,
                    rows = results.results.len(),
                    records_matched = stats.records_matched,
                    records_scanned = stats.records_scanned,
                    bytes_scanned = stats.bytes_scanned,
                    "query complete"
                );
                Ok(materialize(results.results))
            }
            Err(err) => {
                tracing::debug!(query_id = %query_id, error = %err, "query did not complete");
                if let Some(cleanup) = guard.hand_off() {
                    if let Err(join_err) = cleanup.await {
                        tracing::error!(query_id = %query_id, error = %join_err, "stop task failed");
                    }
                }
                Err(err)
            }
        }
    }

    async fn poll(
        &self,
        query_id: &QueryId,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<QueryResults, ExecutionError> {
        loop {
            let results = self
                .service
                .get_query_results(query_id)
                .await
                .map_err(ExecutionError::GetQueryResults)?;

            match results.status {
                QueryStatus::Complete => return Ok(results),
                QueryStatus::Failed => {
                    return Err(ExecutionError::QueryFailed {
                        query_id: query_id.clone(),
                    })
                }
                status => tracing::trace!(query_id = %query_id, %status, "query in progress"),
            }

            tokio::select! {
                biased;
                () = sleep_until(deadline) => {
                    return Err(ExecutionError::DeadlineExceeded {
                        query_id: query_id.clone(),
                    });
                }
                () = cancel.cancelled() => return Err(ExecutionError::ConnectionClosed),
                () = sleep(self.polling) => {}
            }
        }
    }
}

/// Stops `query_id` unless the service already reports it as finished.
async fn stop_if_running(service: &dyn QueryService, query_id: &QueryId) {
    match service.get_query_results(query_id).await {
        Ok(results) if results.status.is_terminal() => {
            tracing::debug!(query_id = %query_id, status = %results.status, "query already finished");
            return;
        }
        Ok(_) => {}
        Err(err) => {
            tracing::debug!(query_id = %query_id, error = %err, "failed to re-check query status");
        }
    }

    match service.stop_query(query_id).await {
        Ok(true) => tracing::debug!(query_id = %query_id, "query stopped"),
        Ok(false) => tracing::debug!(query_id = %query_id, "stop query reported no success"),
        Err(err) => tracing::error!(query_id = %query_id, error = %err, "failed to stop query"),
    }
}

async fn stop_task(service: Arc<dyn QueryService>, query_id: QueryId) {
    stop_if_running(service.as_ref(), &query_id).await;
}

/// Owns the compensating stop for one query.
///
/// The stop runs at most once: either through [`StopOnDrop::hand_off`] or,
/// if the guard is dropped while still armed, from a task spawned in `drop`.
struct StopOnDrop {
    service: Arc<dyn QueryService>,
    query_id: Option<QueryId>,
}

impl StopOnDrop {
    fn new(service: Arc<dyn QueryService>, query_id: QueryId) -> Self {
        Self {
            service,
            query_id: Some(query_id),
        }
    }

    fn disarm(&mut self) {
        self.query_id = None;
    }

    /// Disarms the guard and runs the stop as a runtime task.
    ///
    /// The task keeps running if the caller stops awaiting the handle.
    fn hand_off(&mut self) -> Option<JoinHandle<()>> {
        let query_id = self.query_id.take()?;
        Some(tokio::spawn(stop_task(Arc::clone(&self.service), query_id)))
    }
}

impl Drop for StopOnDrop {
    fn drop(&mut self) {
        let Some(query_id) = self.query_id.take() else {
            return;
        };

        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(stop_task(Arc::clone(&self.service), query_id));
            }
            Err(_) => {
                tracing::warn!(query_id = %query_id, "no runtime to stop abandoned query");
            }
        }
    }
}
