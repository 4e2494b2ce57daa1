//! cwinsights driver
//!
//! This crate turns the asynchronous CloudWatch Logs Insights API
//! (start query, poll results, stop query) into cancellable, tabular query
//! sessions.
//!
//! # Modules
//!
//! - [`config`] - Connection string (DSN) parsing and serialization
//! - [`service`] - The remote query service trait and its implementations
//! - [`query`] - Parameter resolution, the polling executor and result sets
//! - [`session`] - Caller-facing sessions with close-based cancellation
//!
//! # Example
//!
//! ```
//! use driver::config::ConnectionConfig;
//! use driver::query::{NamedArg, Value};
//! use driver::service::{QueryStatus, ResultField, ScriptedQueryService};
//! use driver::session::Session;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let service = ScriptedQueryService::new("query-1")
//!     .then_status(QueryStatus::Running)
//!     .then_complete(vec![vec![ResultField::new("@message", "hello")]]);
//!
//! let config: ConnectionConfig = "cloudwatch://?log_group_name=app&polling=1ms".parse()?;
//! let session = Session::new(config, Arc::new(service));
//!
//! let result = session
//!     .query("fields @message | limit 1", &[NamedArg::new("limit", 1)])
//!     .await?;
//! assert_eq!(result.columns(), ["@message"]);
//! assert_eq!(result.row(0)?, [Value::Text("hello".to_string())]);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod query;
pub mod service;
pub mod session;
mod util;

/// Re-export common dependencies for convenience.
pub use chrono;
pub use tokio_util::sync::CancellationToken;
