//! Query execution for CloudWatch Logs Insights.
//!
//! This module resolves caller arguments into [`QueryParameters`], runs them
//! through the [`QueryExecutor`] polling loop and materializes the raw
//! field/value rows into a [`ResultSet`].
//!
//! # Named arguments
//!
//! | name              | value                                   |
//! |-------------------|-----------------------------------------|
//! | `start_time`      | instant or RFC3339 text (default: 15 minutes ago) |
//! | `end_time`        | instant or RFC3339 text (default: now)  |
//! | `log_group_name`  | one log group, repeatable               |
//! | `log_group_names` | comma-separated text or a list          |
//! | `limit`           | integer result ceiling                  |
//!
//! # Example
//!
//! ```
//! use driver::query::{materialize, Value};
//! use driver::service::ResultField;
//!
//! let result = materialize(vec![vec![
//!     ResultField::new("@timestamp", "2020-01-01 00:00:01.000"),
//!     ResultField::new("@message", "hi"),
//!     ResultField::new("@ptr", "abc"),
//! ]]);
//!
//! assert_eq!(result.columns(), ["@timestamp", "@message"]);
//! assert!(result.row(0).unwrap()[0].as_timestamp().is_some());
//! assert_eq!(result.row(0).unwrap()[1], Value::Text("hi".to_string()));
//! ```

mod executor;
mod params;
mod result;

pub use executor::{ExecutionError, QueryExecutor};
pub use params::{
    ArgValue, NamedArg, ParameterError, QueryParameters, DEFAULT_LOOKBACK_MINUTES, END_TIME,
    LIMIT, LOG_GROUP_NAME, LOG_GROUP_NAMES, START_TIME,
};
pub use result::{
    materialize, ResultSet, Rows, RowsError, Value, POINTER_FIELD, TIMESTAMP_FIELD,
    TIMESTAMP_FORMAT,
};
