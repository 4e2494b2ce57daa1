//! Connection configuration.
//!
//! A session is configured from a connection string (DSN) of the form
//!
//! ```text
//! cloudwatch://?region=ap-northeast-1&timeout=10s&polling=100ms&limit=100&log_group_names=/aws/lambda/a,/aws/lambda/b
//! ```
//!
//! `log_group_name` may be used instead of `log_group_names` for a single
//! group, but not both at the same time.

mod duration;

pub use duration::{format_duration, parse_duration, DurationError};

use crate::util::none_if_default;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// The only scheme accepted in a connection string.
pub const SCHEME: &str = "cloudwatch";

/// Default overall deadline for one query.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default interval between two status polls.
pub const DEFAULT_POLLING: Duration = Duration::from_millis(100);

/// Environment variable consulted when the DSN carries no region.
pub const REGION_ENV: &str = "AWS_REGION";

/// Errors that can occur while parsing a connection string.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The connection string is empty.
    #[error("dsn is empty")]
    Empty,

    /// The connection string is not a valid URL.
    #[error("invalid dsn: {0}")]
    Parse(#[from] url::ParseError),

    /// The scheme is not `cloudwatch`.
    #[error("invalid scheme: expected 'cloudwatch', found '{0}'")]
    InvalidScheme(String),

    /// A host was given.
    #[error("can not set host")]
    HostNotAllowed,

    /// User information was given.
    #[error("can not set user")]
    UserNotAllowed,

    /// A path was given.
    #[error("can not set path")]
    PathNotAllowed,

    /// A duration parameter could not be parsed.
    #[error("invalid {key}: {source}")]
    InvalidDuration {
        /// The query-string key holding the duration.
        key: &'static str,
        /// The underlying parse error.
        #[source]
        source: DurationError,
    },

    /// The limit is not an unsigned 32-bit integer or exceeds `i32::MAX`.
    #[error("invalid limit: '{0}'")]
    InvalidLimit(String),

    /// Both `log_group_name` and `log_group_names` were given.
    #[error("can not set log_group_name and log_group_names at the same time")]
    ConflictingLogGroups,
}

/// Resolved connection configuration.
///
/// # Example
///
/// ```
/// use driver::config::ConnectionConfig;
/// use std::time::Duration;
///
/// let config: ConnectionConfig =
///     "cloudwatch://?log_group_names=/aws/lambda/a,/aws/lambda/b&limit=100&polling=1s&region=ap-northeast-1"
///         .parse()
///         .unwrap();
///
/// assert_eq!(config.region.as_deref(), Some("ap-northeast-1"));
/// assert_eq!(config.timeout, Duration::from_secs(10));
/// assert_eq!(config.polling, Duration::from_secs(1));
/// assert_eq!(config.limit, Some(100));
/// assert_eq!(config.log_group_names, ["/aws/lambda/a", "/aws/lambda/b"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// AWS region used to build the service client.
    pub region: Option<String>,

    /// Overall deadline for one query, from submit to completion.
    pub timeout: Duration,

    /// Interval between two status polls.
    pub polling: Duration,

    /// Default log groups used when a query names none.
    pub log_group_names: Vec<String>,

    /// Default maximum number of result rows.
    pub limit: Option<i32>,

    /// Query-string parameters this driver does not interpret.
    ///
    /// They are preserved so that serializing the configuration writes them back.
    pub extra_params: BTreeMap<String, Vec<String>>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            region: None,
            timeout: DEFAULT_TIMEOUT,
            polling: DEFAULT_POLLING,
            log_group_names: Vec::new(),
            limit: None,
            extra_params: BTreeMap::new(),
        }
    }
}

impl ConnectionConfig {
    /// Parses a connection string, reading the region from `AWS_REGION` when
    /// the string does not carry one.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the string is empty, is not a valid URL, has
    /// a scheme other than `cloudwatch`, carries a host, user or path, holds an
    /// unparsable `timeout`, `polling` or `limit`, or sets both log group keys.
    pub fn parse(dsn: &str) -> Result<Self, ConfigError> {
        Self::parse_with_region_fallback(dsn, std::env::var(REGION_ENV).ok())
    }

    /// Parses a connection string with an explicit region fallback instead of
    /// the environment.
    ///
    /// # Errors
    ///
    /// See [`ConnectionConfig::parse`].
    pub fn parse_with_region_fallback(
        dsn: &str,
        region_fallback: Option<String>,
    ) -> Result<Self, ConfigError> {
        if dsn.is_empty() {
            return Err(ConfigError::Empty);
        }

        let url = Url::parse(dsn)?;
        if url.scheme() != SCHEME {
            return Err(ConfigError::InvalidScheme(url.scheme().to_string()));
        }
        if url.host_str().is_some_and(|host| !host.is_empty()) || url.port().is_some() {
            return Err(ConfigError::HostNotAllowed);
        }
        if !url.username().is_empty() || url.password().is_some() {
            return Err(ConfigError::UserNotAllowed);
        }
        if !url.path().is_empty() {
            return Err(ConfigError::PathNotAllowed);
        }

        let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (key, value) in url.query_pairs() {
            params
                .entry(key.into_owned())
                .or_default()
                .push(value.into_owned());
        }

        let mut config = Self::default();

        match take_first(&mut params, "region") {
            Some(region) => config.region = Some(region),
            None => config.region = region_fallback.and_then(none_if_default),
        }

        if let Some(timeout) = take_first(&mut params, "timeout") {
            config.timeout = parse_duration(&timeout)
                .map_err(|source| ConfigError::InvalidDuration { key: "timeout", source })?;
        }

        if let Some(polling) = take_first(&mut params, "polling") {
            config.polling = parse_duration(&polling)
                .map_err(|source| ConfigError::InvalidDuration { key: "polling", source })?;
        }

        if let Some(limit) = take_first(&mut params, "limit") {
            let parsed = limit
                .parse::<u32>()
                .ok()
                .and_then(|v| i32::try_from(v).ok())
                .ok_or_else(|| ConfigError::InvalidLimit(limit.clone()))?;
            config.limit = none_if_default(parsed);
        }

        if let Some(names) = take_first(&mut params, "log_group_names") {
            config.log_group_names = names.split(',').map(str::to_string).collect();
        }

        if let Some(name) = take_first(&mut params, "log_group_name") {
            if !config.log_group_names.is_empty() {
                return Err(ConfigError::ConflictingLogGroups);
            }
            config.log_group_names = vec![name];
        }

        config.extra_params = params;
        Ok(config)
    }

    /// Returns the value of an uninterpreted query-string parameter.
    #[must_use]
    pub fn extra_param(&self, key: &str) -> Option<&str> {
        self.extra_params
            .get(key)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Returns a copy with the given default log groups.
    #[must_use]
    pub fn with_log_group_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.log_group_names = names.into_iter().map(Into::into).collect();
        self
    }

    /// Returns a copy with the given region.
    #[must_use]
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Returns a copy with the given overall query timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns a copy with the given polling interval.
    #[must_use]
    pub fn with_polling(mut self, polling: Duration) -> Self {
        self.polling = polling;
        self
    }

    /// Returns a copy with the given default result limit.
    #[must_use]
    pub fn with_limit(mut self, limit: i32) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Removes a key and returns its first non-empty value.
///
/// An empty value counts as absent, and the key is then left in place.
fn take_first(params: &mut BTreeMap<String, Vec<String>>, key: &str) -> Option<String> {
    let value = params
        .get(key)
        .and_then(|values| values.first())
        .filter(|value| !value.is_empty())
        .cloned()?;
    params.remove(key);
    Some(value)
}

impl FromStr for ConnectionConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut values = self.extra_params.clone();
        let mut set = |key: &str, value: String| {
            values.insert(key.to_string(), vec![value]);
        };

        if let Some(region) = self.region.as_ref().filter(|r| !r.is_empty()) {
            set("region", region.clone());
        }
        if !self.timeout.is_zero() {
            set("timeout", format_duration(self.timeout));
        }
        if !self.polling.is_zero() {
            set("polling", format_duration(self.polling));
        }
        if let Some(limit) = self.limit {
            set("limit", limit.to_string());
        }
        match self.log_group_names.as_slice() {
            [] => {}
            [single] => set("log_group_name", single.clone()),
            names => set("log_group_names", names.join(",")),
        }

        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (key, entries) in &values {
            for value in entries {
                serializer.append_pair(key, value);
            }
        }
        write!(f, "{SCHEME}://?{}", serializer.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(dsn: &str) -> Result<ConnectionConfig, ConfigError> {
        ConnectionConfig::parse_with_region_fallback(dsn, None)
    }

    #[test]
    fn test_parse_defaults() {
        let config = parse("cloudwatch://").unwrap();
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
        assert_eq!(config.polling, DEFAULT_POLLING);
        assert_eq!(config.limit, None);
        assert_eq!(config.region, None);
        assert!(config.log_group_names.is_empty());
        assert!(config.extra_params.is_empty());
    }

    #[test]
    fn test_parse_full_dsn() {
        let config = parse(
            "cloudwatch://?log_group_names=/aws/lambda/hoge,/aws/lambda/bar&limit=100&polling=1s&timeout=30s&region=ap-northeast-1",
        )
        .unwrap();

        assert_eq!(config.region.as_deref(), Some("ap-northeast-1"));
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.polling, Duration::from_secs(1));
        assert_eq!(config.limit, Some(100));
        assert_eq!(
            config.log_group_names,
            vec!["/aws/lambda/hoge".to_string(), "/aws/lambda/bar".to_string()]
        );
    }

    #[test]
    fn test_parse_single_log_group() {
        let config = parse("cloudwatch://?log_group_name=test-log-group").unwrap();
        assert_eq!(config.log_group_names, vec!["test-log-group".to_string()]);
    }

    #[test]
    fn test_region_fallback() {
        let config =
            ConnectionConfig::parse_with_region_fallback("cloudwatch://", Some("eu-west-1".into()))
                .unwrap();
        assert_eq!(config.region.as_deref(), Some("eu-west-1"));

        let config = ConnectionConfig::parse_with_region_fallback(
            "cloudwatch://?region=us-east-1",
            Some("eu-west-1".into()),
        )
        .unwrap();
        assert_eq!(config.region.as_deref(), Some("us-east-1"));

        let config =
            ConnectionConfig::parse_with_region_fallback("cloudwatch://", Some(String::new()))
                .unwrap();
        assert_eq!(config.region, None);
    }

    #[test]
    fn test_zero_limit_is_unset() {
        let config = parse("cloudwatch://?limit=0").unwrap();
        assert_eq!(config.limit, None);
    }

    #[test]
    fn test_extra_params_are_preserved() {
        let config = parse("cloudwatch://?mock=success_case&log_group_name=g").unwrap();
        assert_eq!(config.extra_param("mock"), Some("success_case"));
        assert_eq!(config.extra_param("log_group_name"), None);
        assert!(config.to_string().contains("mock=success_case"));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(parse(""), Err(ConfigError::Empty)));
        assert!(matches!(
            parse("mysql://?region=x"),
            Err(ConfigError::InvalidScheme(ref s)) if s == "mysql"
        ));
        assert!(matches!(
            parse("cloudwatch://example.com?region=x"),
            Err(ConfigError::HostNotAllowed)
        ));
        assert!(matches!(
            parse("cloudwatch://user@?region=x"),
            Err(ConfigError::UserNotAllowed) | Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            parse("cloudwatch:///logs?region=x"),
            Err(ConfigError::PathNotAllowed)
        ));
        assert!(matches!(
            parse("cloudwatch://?timeout=soon"),
            Err(ConfigError::InvalidDuration { key: "timeout", .. })
        ));
        assert!(matches!(
            parse("cloudwatch://?polling=5"),
            Err(ConfigError::InvalidDuration { key: "polling", .. })
        ));
        assert!(matches!(
            parse("cloudwatch://?limit=-1"),
            Err(ConfigError::InvalidLimit(_))
        ));
        assert!(matches!(
            parse("cloudwatch://?limit=4294967295"),
            Err(ConfigError::InvalidLimit(_))
        ));
    }

    #[test]
    fn test_out_of_range_timeout_is_rejected() {
        let err = parse("cloudwatch://?timeout=5000000000000000h").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidDuration {
                key: "timeout",
                source: DurationError::Overflow(_)
            }
        ));
    }

    #[test]
    fn test_conflicting_log_group_keys() {
        assert!(matches!(
            parse("cloudwatch://?log_group_names=a,b&log_group_name=c"),
            Err(ConfigError::ConflictingLogGroups)
        ));
        // An empty plural key yields no entries, so the singular key is accepted.
        let config = parse("cloudwatch://?log_group_names=&log_group_name=c").unwrap();
        assert_eq!(config.log_group_names, vec!["c".to_string()]);
    }

    #[test]
    fn test_to_string_then_parse_reproduces_values() {
        let config = ConnectionConfig::default()
            .with_log_group_names(["log-group-name", "log-group-name-2"])
            .with_region("region")
            .with_timeout(Duration::from_secs(10))
            .with_polling(Duration::from_millis(100));

        let dsn = config.to_string();
        assert!(dsn.starts_with("cloudwatch://?"));

        let parsed = parse(&dsn).unwrap();
        assert_eq!(parsed.region, config.region);
        assert_eq!(parsed.timeout, config.timeout);
        assert_eq!(parsed.polling, config.polling);
        assert_eq!(parsed.limit, config.limit);
        assert_eq!(parsed.log_group_names, config.log_group_names);
    }

    #[test]
    fn test_to_string_single_group_and_limit() {
        let config = ConnectionConfig::default()
            .with_log_group_names(["/aws/lambda/app"])
            .with_limit(50);

        let dsn = config.to_string();
        assert_eq!(
            dsn,
            "cloudwatch://?limit=50&log_group_name=%2Faws%2Flambda%2Fapp&polling=100ms&timeout=10s"
        );
        assert_eq!(parse(&dsn).unwrap(), config);
    }
}
