//! CloudWatch Logs Insights service backed by the AWS SDK.

use super::{
    QueryId, QueryResults, QueryService, QueryStatistics, QueryStatus, ResultField, ServiceError,
    StartQueryRequest,
};
use crate::config::ConnectionConfig;
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_cloudwatchlogs as cloudwatchlogs;
use aws_sdk_cloudwatchlogs::error::DisplayErrorContext;
use aws_sdk_cloudwatchlogs::types;

/// Query service that talks to CloudWatch Logs Insights.
#[derive(Debug, Clone)]
pub struct CloudWatchLogsService {
    client: cloudwatchlogs::Client,
}

impl CloudWatchLogsService {
    /// Wraps an existing SDK client.
    #[must_use]
    pub fn new(client: cloudwatchlogs::Client) -> Self {
        Self { client }
    }

    /// Builds a client from the default AWS configuration chain.
    ///
    /// The region from `config` takes precedence over the chain's region.
    pub async fn from_config(config: &ConnectionConfig) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = config.region.clone() {
            loader = loader.region(Region::new(region));
        }
        let sdk_config = loader.load().await;

        tracing::debug!(
            region = ?sdk_config.region().map(ToString::to_string),
            "CloudWatch Logs client configured"
        );

        Self::new(cloudwatchlogs::Client::new(&sdk_config))
    }
}

fn request_error<E>(operation: &'static str, err: &E) -> ServiceError
where
    E: std::error::Error,
{
    ServiceError::Request {
        operation,
        message: DisplayErrorContext(err).to_string(),
    }
}

fn convert_status(status: Option<&types::QueryStatus>) -> QueryStatus {
    match status {
        Some(types::QueryStatus::Scheduled) => QueryStatus::Scheduled,
        Some(types::QueryStatus::Running) => QueryStatus::Running,
        Some(types::QueryStatus::Complete) => QueryStatus::Complete,
        Some(types::QueryStatus::Failed) => QueryStatus::Failed,
        Some(types::QueryStatus::Cancelled) => QueryStatus::Cancelled,
        Some(types::QueryStatus::Timeout) => QueryStatus::Timeout,
        _ => QueryStatus::Unknown,
    }
}

fn convert_row(row: Vec<types::ResultField>) -> Vec<ResultField> {
    row.into_iter()
        .map(|field| ResultField {
            field: field.field.unwrap_or_default(),
            value: field.value.unwrap_or_default(),
        })
        .collect()
}

#[async_trait]
impl QueryService for CloudWatchLogsService {
    async fn start_query(&self, request: &StartQueryRequest) -> Result<QueryId, ServiceError> {
        let names = request.log_groups.log_group_names();
        let output = self
            .client
            .start_query()
            .set_query_string(request.query_string.clone())
            .start_time(request.start_time)
            .end_time(request.end_time)
            .set_limit(request.limit)
            .set_log_group_name(request.log_groups.log_group_name().map(str::to_string))
            .set_log_group_names((!names.is_empty()).then(|| names.to_vec()))
            .send()
            .await
            .map_err(|e| request_error("StartQuery", &e))?;

        output
            .query_id
            .map(QueryId::new)
            .ok_or(ServiceError::MissingField {
                operation: "StartQuery",
                field: "queryId",
            })
    }

    async fn get_query_results(&self, query_id: &QueryId) -> Result<QueryResults, ServiceError> {
        let output = self
            .client
            .get_query_results()
            .query_id(query_id.as_str())
            .send()
            .await
            .map_err(|e| request_error("GetQueryResults", &e))?;

        Ok(QueryResults {
            status: convert_status(output.status.as_ref()),
            results: output
                .results
                .unwrap_or_default()
                .into_iter()
                .map(convert_row)
                .collect(),
            statistics: output.statistics.map(|stats| QueryStatistics {
                records_matched: stats.records_matched,
                records_scanned: stats.records_scanned,
                bytes_scanned: stats.bytes_scanned,
            }),
        })
    }

    async fn stop_query(&self, query_id: &QueryId) -> Result<bool, ServiceError> {
        let output = self
            .client
            .stop_query()
            .query_id(query_id.as_str())
            .send()
            .await
            .map_err(|e| request_error("StopQuery", &e))?;

        Ok(output.success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_status() {
        assert_eq!(
            convert_status(Some(&types::QueryStatus::Running)),
            QueryStatus::Running
        );
        assert_eq!(
            convert_status(Some(&types::QueryStatus::Complete)),
            QueryStatus::Complete
        );
        assert_eq!(
            convert_status(Some(&types::QueryStatus::Timeout)),
            QueryStatus::Timeout
        );
        assert_eq!(convert_status(None), QueryStatus::Unknown);
    }

    #[test]
    fn test_convert_row_defaults_missing_parts() {
        let row = vec![
            types::ResultField::builder()
                .field("@message")
                .value("hi")
                .build(),
            types::ResultField::builder().field("@empty").build(),
        ];

        assert_eq!(
            convert_row(row),
            vec![ResultField::new("@message", "hi"), ResultField::new("@empty", "")]
        );
    }
}
