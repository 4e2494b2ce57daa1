//! In-memory query service that replays scripted replies.

use super::{
    QueryId, QueryResults, QueryService, QueryStatus, ResultField, ServiceError,
    StartQueryRequest,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug, Clone)]
enum FetchReply {
    Results(QueryResults),
    Error(String),
}

#[derive(Debug, Default)]
struct Script {
    start_error: Option<String>,
    stop_error: Option<String>,
    stop_success: bool,
    fetch_delay: Option<Duration>,
    stop_delay: Option<Duration>,
    replies: VecDeque<FetchReply>,
    last_reply: Option<FetchReply>,
    start_requests: Vec<StartQueryRequest>,
    fetched: Vec<QueryId>,
    stopped: Vec<QueryId>,
}

/// Query service that answers from a script instead of the network.
///
/// Status fetches consume the scripted replies in order; once the script is
/// exhausted the last reply is repeated (or `Running` if nothing was
/// scripted). Every call is recorded so tests can assert on call counts and
/// requests.
///
/// **Note:** This is intended for tests and offline development.
///
/// # Example
///
/// ```
/// use driver::service::{QueryId, QueryService, QueryStatus, ScriptedQueryService};
///
/// # #[tokio::main]
/// # async fn main() {
/// let service = ScriptedQueryService::new("query-1")
///     .then_status(QueryStatus::Running)
///     .then_status(QueryStatus::Complete);
///
/// let id = QueryId::new("query-1");
/// assert_eq!(service.get_query_results(&id).await.unwrap().status, QueryStatus::Running);
/// assert_eq!(service.get_query_results(&id).await.unwrap().status, QueryStatus::Complete);
/// assert_eq!(service.get_query_results(&id).await.unwrap().status, QueryStatus::Complete);
/// assert_eq!(service.get_query_results_calls(), 3);
/// # }
/// ```
#[derive(Debug)]
pub struct ScriptedQueryService {
    query_id: QueryId,
    script: Mutex<Script>,
}

impl ScriptedQueryService {
    /// Creates a service whose `start_query` returns `query_id`.
    #[must_use]
    pub fn new(query_id: impl Into<String>) -> Self {
        Self {
            query_id: QueryId::new(query_id),
            script: Mutex::new(Script {
                stop_success: true,
                ..Script::default()
            }),
        }
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push_reply(self, reply: FetchReply) -> Self {
        self.script().replies.push_back(reply);
        self
    }

    /// Appends a status-only reply.
    #[must_use]
    pub fn then_status(self, status: QueryStatus) -> Self {
        self.push_reply(FetchReply::Results(QueryResults::with_status(status)))
    }

    /// Appends a `Complete` reply carrying `rows`.
    #[must_use]
    pub fn then_complete(self, rows: Vec<Vec<ResultField>>) -> Self {
        self.push_reply(FetchReply::Results(QueryResults::complete(rows)))
    }

    /// Appends an arbitrary reply.
    #[must_use]
    pub fn then_results(self, results: QueryResults) -> Self {
        self.push_reply(FetchReply::Results(results))
    }

    /// Appends a failing status fetch.
    #[must_use]
    pub fn then_fetch_error(self, message: impl Into<String>) -> Self {
        self.push_reply(FetchReply::Error(message.into()))
    }

    /// Makes `start_query` fail with `message`.
    #[must_use]
    pub fn fail_start(self, message: impl Into<String>) -> Self {
        self.script().start_error = Some(message.into());
        self
    }

    /// Makes `stop_query` fail with `message`.
    #[must_use]
    pub fn fail_stop(self, message: impl Into<String>) -> Self {
        self.script().stop_error = Some(message.into());
        self
    }

    /// Sets the `success` flag reported by `stop_query`.
    #[must_use]
    pub fn with_stop_success(self, success: bool) -> Self {
        self.script().stop_success = success;
        self
    }

    /// Delays every status fetch, to simulate network latency.
    #[must_use]
    pub fn with_fetch_delay(self, delay: Duration) -> Self {
        self.script().fetch_delay = Some(delay);
        self
    }

    /// Delays every stop request after recording it.
    #[must_use]
    pub fn with_stop_delay(self, delay: Duration) -> Self {
        self.script().stop_delay = Some(delay);
        self
    }

    /// Returns the number of `start_query` calls.
    #[must_use]
    pub fn start_query_calls(&self) -> usize {
        self.script().start_requests.len()
    }

    /// Returns the number of `get_query_results` calls.
    #[must_use]
    pub fn get_query_results_calls(&self) -> usize {
        self.script().fetched.len()
    }

    /// Returns the number of `stop_query` calls.
    #[must_use]
    pub fn stop_query_calls(&self) -> usize {
        self.script().stopped.len()
    }

    /// Returns every request passed to `start_query`, in call order.
    #[must_use]
    pub fn start_requests(&self) -> Vec<StartQueryRequest> {
        self.script().start_requests.clone()
    }

    /// Returns the query ids passed to `stop_query`, in call order.
    #[must_use]
    pub fn stopped_queries(&self) -> Vec<QueryId> {
        self.script().stopped.clone()
    }
}

#[async_trait]
impl QueryService for ScriptedQueryService {
    async fn start_query(&self, request: &StartQueryRequest) -> Result<QueryId, ServiceError> {
        let mut script = self.script();
        script.start_requests.push(request.clone());
        match &script.start_error {
            Some(message) => Err(ServiceError::Request {
                operation: "StartQuery",
                message: message.clone(),
            }),
            None => Ok(self.query_id.clone()),
        }
    }

    async fn get_query_results(&self, query_id: &QueryId) -> Result<QueryResults, ServiceError> {
        let (reply, delay) = {
            let mut script = self.script();
            script.fetched.push(query_id.clone());
            let reply = match script.replies.pop_front() {
                Some(reply) => {
                    script.last_reply = Some(reply.clone());
                    reply
                }
                None => script.last_reply.clone().unwrap_or_else(|| {
                    FetchReply::Results(QueryResults::with_status(QueryStatus::Running))
                }),
            };
            (reply, script.fetch_delay)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        match reply {
            FetchReply::Results(results) => Ok(results),
            FetchReply::Error(message) => Err(ServiceError::Request {
                operation: "GetQueryResults",
                message,
            }),
        }
    }

    async fn stop_query(&self, query_id: &QueryId) -> Result<bool, ServiceError> {
        let (outcome, delay) = {
            let mut script = self.script();
            script.stopped.push(query_id.clone());
            let outcome = match &script.stop_error {
                Some(message) => Err(ServiceError::Request {
                    operation: "StopQuery",
                    message: message.clone(),
                }),
                None => Ok(script.stop_success),
            };
            (outcome, script.stop_delay)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        outcome
    }
}
