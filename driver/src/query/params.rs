//! Named query arguments and their resolution against session defaults.

use crate::config::ConnectionConfig;
use crate::service::{LogGroups, StartQueryRequest};
use crate::util::none_if_default;
use chrono::{DateTime, FixedOffset, TimeDelta, Utc};
use thiserror::Error;

/// How far back, in minutes, the time range reaches when no `start_time` is given.
pub const DEFAULT_LOOKBACK_MINUTES: i64 = 15;

/// Argument name for the start of the time range.
pub const START_TIME: &str = "start_time";
/// Argument name for the end of the time range.
pub const END_TIME: &str = "end_time";
/// Argument name for one log group; may be repeated.
pub const LOG_GROUP_NAME: &str = "log_group_name";
/// Argument name for several log groups, as a list or comma-separated text.
pub const LOG_GROUP_NAMES: &str = "log_group_names";
/// Argument name for the maximum number of result rows.
pub const LIMIT: &str = "limit";

/// Errors that can occur while resolving query arguments.
#[derive(Debug, Error)]
pub enum ParameterError {
    /// No log group was given and the session has no default.
    #[error("log_group_name is required")]
    LogGroupRequired,

    /// A time argument was text that is not RFC 3339.
    #[error("{name} cannot be parsed: {source}")]
    InvalidTime {
        /// The argument name.
        name: &'static str,
        /// The underlying parse error.
        #[source]
        source: chrono::ParseError,
    },

    /// An argument had a value of the wrong kind.
    #[error("{name} must be {expected}")]
    InvalidType {
        /// The argument name.
        name: &'static str,
        /// Human-readable description of the accepted kinds.
        expected: &'static str,
    },

    /// The `limit` argument does not fit the service's limit field.
    #[error("limit out of range: {0}")]
    LimitOutOfRange(i64),
}

/// Value of a named query argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgValue {
    /// An instant.
    Time(DateTime<FixedOffset>),
    /// Text.
    Text(String),
    /// A list of text values.
    List(Vec<String>),
    /// An integer.
    Int(i64),
}

impl From<DateTime<FixedOffset>> for ArgValue {
    fn from(value: DateTime<FixedOffset>) -> Self {
        Self::Time(value)
    }
}

impl From<DateTime<Utc>> for ArgValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Time(value.fixed_offset())
    }
}

impl From<&str> for ArgValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<String>> for ArgValue {
    fn from(value: Vec<String>) -> Self {
        Self::List(value)
    }
}

impl From<Vec<&str>> for ArgValue {
    fn from(value: Vec<&str>) -> Self {
        Self::List(value.into_iter().map(str::to_string).collect())
    }
}

impl From<i64> for ArgValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for ArgValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u32> for ArgValue {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

/// A named query argument.
///
/// # Example
///
/// ```
/// use driver::query::{ArgValue, NamedArg};
///
/// let arg = NamedArg::new("log_group_names", "a,b");
/// assert_eq!(arg.name, "log_group_names");
/// assert_eq!(arg.value, ArgValue::Text("a,b".to_string()));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedArg {
    /// Argument name.
    pub name: String,
    /// Argument value.
    pub value: ArgValue,
}

impl NamedArg {
    /// Creates a named argument.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<ArgValue>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Fully resolved parameters of one query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryParameters {
    /// The search expression, passed through untouched.
    pub query_string: String,
    /// Start of the time range (inclusive).
    pub start_time: DateTime<Utc>,
    /// End of the time range (inclusive).
    pub end_time: DateTime<Utc>,
    /// Log groups to search.
    pub log_groups: LogGroups,
    /// Maximum number of result rows.
    pub limit: Option<i32>,
}

impl QueryParameters {
    /// Resolves named arguments against session defaults.
    ///
    /// - `start_time` / `end_time` accept an instant or RFC 3339 text and
    ///   default to `now - 15 minutes` and `now`.
    /// - `log_group_name` and `log_group_names` both append to the group list
    ///   in argument order; with none given the session's groups are used.
    /// - `limit` overrides the session's limit.
    /// - Unknown argument names are ignored.
    ///
    /// # Errors
    ///
    /// Returns a `ParameterError` if an argument has the wrong kind, a time
    /// cannot be parsed, the limit is out of range, or no log group is known.
    pub fn resolve(
        query: &str,
        args: &[NamedArg],
        defaults: &ConnectionConfig,
        now: DateTime<Utc>,
    ) -> Result<Self, ParameterError> {
        let mut end_time = now;
        let mut start_time = now - TimeDelta::minutes(DEFAULT_LOOKBACK_MINUTES);
        let mut log_group_names: Vec<String> = Vec::new();
        let mut limit = defaults.limit;

        for arg in args {
            match arg.name.as_str() {
                START_TIME => start_time = parse_time(START_TIME, &arg.value)?,
                END_TIME => end_time = parse_time(END_TIME, &arg.value)?,
                LOG_GROUP_NAME => match &arg.value {
                    ArgValue::Text(name) => log_group_names.push(name.clone()),
                    _ => {
                        return Err(ParameterError::InvalidType {
                            name: LOG_GROUP_NAME,
                            expected: "text",
                        })
                    }
                },
                LOG_GROUP_NAMES => match &arg.value {
                    ArgValue::List(names) => log_group_names.extend(names.iter().cloned()),
                    ArgValue::Text(names) => {
                        log_group_names.extend(names.split(',').map(str::to_string));
                    }
                    _ => {
                        return Err(ParameterError::InvalidType {
                            name: LOG_GROUP_NAMES,
                            expected: "a list or comma-separated text",
                        })
                    }
                },
                LIMIT => match &arg.value {
                    ArgValue::Int(value) => {
                        let value = i32::try_from(*value)
                            .map_err(|_| ParameterError::LimitOutOfRange(*value))?;
                        limit = Some(value);
                    }
                    _ => {
                        return Err(ParameterError::InvalidType {
                            name: LIMIT,
                            expected: "an integer",
                        })
                    }
                },
                other => tracing::trace!(argument = other, "Ignoring unknown query argument"),
            }
        }

        if log_group_names.is_empty() {
            log_group_names.clone_from(&defaults.log_group_names);
        }
        let log_groups =
            LogGroups::from_names(log_group_names).ok_or(ParameterError::LogGroupRequired)?;

        Ok(Self {
            query_string: query.to_string(),
            start_time,
            end_time,
            log_groups,
            limit,
        })
    }

    /// Builds the service request for these parameters.
    ///
    /// Times are truncated to whole seconds since the Unix epoch and an empty
    /// search expression is sent as absent.
    #[must_use]
    pub fn to_request(&self) -> StartQueryRequest {
        StartQueryRequest {
            query_string: none_if_default(self.query_string.clone()),
            start_time: self.start_time.timestamp(),
            end_time: self.end_time.timestamp(),
            limit: self.limit,
            log_groups: self.log_groups.clone(),
        }
    }
}

fn parse_time(name: &'static str, value: &ArgValue) -> Result<DateTime<Utc>, ParameterError> {
    match value {
        ArgValue::Time(time) => Ok(time.with_timezone(&Utc)),
        ArgValue::Text(text) => DateTime::parse_from_rfc3339(text)
            .map(|time| time.with_timezone(&Utc))
            .map_err(|source| ParameterError::InvalidTime { name, source }),
        _ => Err(ParameterError::InvalidType {
            name,
            expected: "a time or RFC 3339 text",
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2022, 9, 16, 12, 0, 0).unwrap()
    }

    fn defaults() -> ConnectionConfig {
        ConnectionConfig::default()
    }

    #[test]
    fn test_defaults_for_time_range() {
        let params = QueryParameters::resolve(
            "fields @message",
            &[NamedArg::new(LOG_GROUP_NAME, "g")],
            &defaults(),
            now(),
        )
        .unwrap();

        assert_eq!(params.end_time, now());
        assert_eq!(params.start_time, now() - TimeDelta::minutes(15));
        assert_eq!(params.limit, None);
    }

    #[test]
    fn test_rfc3339_text_and_instant_arguments() {
        let start = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let params = QueryParameters::resolve(
            "fields @message",
            &[
                NamedArg::new(START_TIME, start),
                NamedArg::new(END_TIME, "2020-01-01T23:59:59+09:00"),
                NamedArg::new(LOG_GROUP_NAME, "g"),
            ],
            &defaults(),
            now(),
        )
        .unwrap();

        assert_eq!(params.start_time, start);
        assert_eq!(params.end_time.timestamp(), 1_577_890_799);
    }

    #[test]
    fn test_invalid_time_arguments() {
        let err = QueryParameters::resolve(
            "q",
            &[NamedArg::new(START_TIME, "yesterday")],
            &defaults(),
            now(),
        )
        .unwrap_err();
        assert!(matches!(err, ParameterError::InvalidTime { name: START_TIME, .. }));
        assert!(err.to_string().starts_with("start_time cannot be parsed"));

        let err = QueryParameters::resolve("q", &[NamedArg::new(END_TIME, 5)], &defaults(), now())
            .unwrap_err();
        assert!(matches!(err, ParameterError::InvalidType { name: END_TIME, .. }));
    }

    #[test]
    fn test_single_log_group_name_accumulates() {
        let params = QueryParameters::resolve(
            "q",
            &[
                NamedArg::new(LOG_GROUP_NAME, "a"),
                NamedArg::new(LOG_GROUP_NAME, "b"),
            ],
            &defaults(),
            now(),
        )
        .unwrap();

        assert_eq!(
            params.log_groups,
            LogGroups::Multiple(vec!["a".to_string(), "b".to_string()])
        );
    }

    #[test]
    fn test_single_and_plural_arguments_both_append() {
        let params = QueryParameters::resolve(
            "q",
            &[
                NamedArg::new(LOG_GROUP_NAME, "a"),
                NamedArg::new(LOG_GROUP_NAMES, "b,c"),
                NamedArg::new(LOG_GROUP_NAMES, vec!["d"]),
            ],
            &defaults(),
            now(),
        )
        .unwrap();

        assert_eq!(params.log_groups.log_group_names(), ["a", "b", "c", "d"]);
    }

    #[test]
    fn test_session_default_log_groups() {
        let config = defaults().with_log_group_names(["default-group"]);
        let params = QueryParameters::resolve("q", &[], &config, now()).unwrap();
        assert_eq!(params.log_groups, LogGroups::Single("default-group".to_string()));

        // Explicit arguments replace the defaults instead of extending them.
        let params = QueryParameters::resolve(
            "q",
            &[NamedArg::new(LOG_GROUP_NAME, "explicit")],
            &config,
            now(),
        )
        .unwrap();
        assert_eq!(params.log_groups, LogGroups::Single("explicit".to_string()));
    }

    #[test]
    fn test_log_group_required() {
        let err = QueryParameters::resolve("q", &[], &defaults(), now()).unwrap_err();
        assert!(matches!(err, ParameterError::LogGroupRequired));
        assert_eq!(err.to_string(), "log_group_name is required");
    }

    #[test]
    fn test_log_group_argument_kinds() {
        let err = QueryParameters::resolve(
            "q",
            &[NamedArg::new(LOG_GROUP_NAME, 1)],
            &defaults(),
            now(),
        )
        .unwrap_err();
        assert!(matches!(err, ParameterError::InvalidType { name: LOG_GROUP_NAME, .. }));

        let err = QueryParameters::resolve(
            "q",
            &[NamedArg::new(LOG_GROUP_NAMES, 1)],
            &defaults(),
            now(),
        )
        .unwrap_err();
        assert!(matches!(err, ParameterError::InvalidType { name: LOG_GROUP_NAMES, .. }));
    }

    #[test]
    fn test_limit_precedence() {
        let config = defaults().with_log_group_names(["g"]).with_limit(100);

        let params = QueryParameters::resolve("q", &[], &config, now()).unwrap();
        assert_eq!(params.limit, Some(100));

        let params =
            QueryParameters::resolve("q", &[NamedArg::new(LIMIT, 5)], &config, now()).unwrap();
        assert_eq!(params.limit, Some(5));

        let err = QueryParameters::resolve(
            "q",
            &[NamedArg::new(LIMIT, i64::from(i32::MAX) + 1)],
            &config,
            now(),
        )
        .unwrap_err();
        assert!(matches!(err, ParameterError::LimitOutOfRange(_)));

        let err = QueryParameters::resolve("q", &[NamedArg::new(LIMIT, "5")], &config, now())
            .unwrap_err();
        assert!(matches!(err, ParameterError::InvalidType { name: LIMIT, .. }));
    }

    #[test]
    fn test_unknown_arguments_are_ignored() {
        let config = defaults().with_log_group_names(["g"]);
        let params =
            QueryParameters::resolve("q", &[NamedArg::new("mode", "fast")], &config, now())
                .unwrap();
        assert_eq!(params.log_groups, LogGroups::Single("g".to_string()));
    }

    #[test]
    fn test_to_request() {
        let params = QueryParameters::resolve(
            "",
            &[
                NamedArg::new(START_TIME, "2020-01-01T00:00:00+09:00"),
                NamedArg::new(END_TIME, "2020-01-01T23:59:59+09:00"),
                NamedArg::new(LOG_GROUP_NAME, "g"),
                NamedArg::new(LIMIT, 10),
            ],
            &defaults(),
            now(),
        )
        .unwrap();

        let request = params.to_request();
        assert_eq!(request.query_string, None);
        assert_eq!(request.start_time, 1_577_804_400);
        assert_eq!(request.end_time, 1_577_890_799);
        assert_eq!(request.limit, Some(10));
        assert_eq!(request.log_groups.log_group_name(), Some("g"));
        assert!(request.log_groups.log_group_names().is_empty());
    }
}
