//! cwinsights CLI
//!
//! Command-line interface for running CloudWatch Logs Insights queries.
//!
//! # Usage
//!
//! ```bash
//! cwinsights --help
//! cwinsights --dsn 'cloudwatch://?region=us-east-1&log_group_name=app' query 'fields @message | limit 10'
//! cwinsights query 'stats count(*)' --log-group-name app --start-time 2024-01-01T00:00:00Z --format json
//! cwinsights --dsn 'cloudwatch://?timeout=30s&log_group_names=a,b' dsn
//! ```

#![deny(unsafe_code)]

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use driver::config::ConnectionConfig;
use driver::query::{
    NamedArg, ResultSet, END_TIME, LIMIT, LOG_GROUP_NAME, LOG_GROUP_NAMES, START_TIME,
};
use driver::session::Session;
use std::sync::Arc;

/// cwinsights - CloudWatch Logs Insights from the command line
#[derive(Parser)]
#[command(name = "cwinsights")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Connection string
    #[arg(
        short,
        long,
        env = "CLOUDWATCH_INSIGHTS_DSN",
        default_value = "cloudwatch://"
    )]
    dsn: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a query and print its rows
    Query(QueryArgs),
    /// Print the normalized connection string
    Dsn,
}

#[derive(Args)]
struct QueryArgs {
    /// Logs Insights query
    search: String,

    /// Start of the time range (RFC 3339), defaults to 15 minutes ago
    #[arg(long)]
    start_time: Option<String>,

    /// End of the time range (RFC 3339), defaults to now
    #[arg(long)]
    end_time: Option<String>,

    /// Log group to search, may be repeated
    #[arg(long = "log-group-name")]
    log_group_names: Vec<String>,

    /// Comma-separated log groups to search
    #[arg(long = "log-group-names")]
    log_group_list: Option<String>,

    /// Maximum number of rows to return
    #[arg(long)]
    limit: Option<i64>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

impl QueryArgs {
    fn named_args(&self) -> Vec<NamedArg> {
        let mut args = Vec::new();
        if let Some(start_time) = &self.start_time {
            args.push(NamedArg::new(START_TIME, start_time.as_str()));
        }
        if let Some(end_time) = &self.end_time {
            args.push(NamedArg::new(END_TIME, end_time.as_str()));
        }
        for name in &self.log_group_names {
            args.push(NamedArg::new(LOG_GROUP_NAME, name.as_str()));
        }
        if let Some(names) = &self.log_group_list {
            args.push(NamedArg::new(LOG_GROUP_NAMES, names.as_str()));
        }
        if let Some(limit) = self.limit {
            args.push(NamedArg::new(LIMIT, limit));
        }
        args
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Renders a result set as a left-aligned text table.
fn render_table(result: &ResultSet) -> String {
    let cells: Vec<Vec<String>> = result
        .rows()
        .iter()
        .map(|row| row.iter().map(ToString::to_string).collect())
        .collect();

    let mut widths: Vec<usize> = result.columns().iter().map(|c| c.chars().count()).collect();
    for row in &cells {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = format_line(result.columns().iter().map(String::as_str), &widths);
    let rule: Vec<String> = widths.iter().map(|width| "-".repeat(*width)).collect();
    out.push_str(&format_line(rule.iter().map(String::as_str), &widths));
    for row in &cells {
        out.push_str(&format_line(row.iter().map(String::as_str), &widths));
    }
    out
}

fn format_line<'a>(values: impl Iterator<Item = &'a str>, widths: &[usize]) -> String {
    let line = values
        .zip(widths)
        .map(|(value, &width)| format!("{value:<width$}"))
        .collect::<Vec<_>>()
        .join("  ");
    format!("{}\n", line.trim_end())
}

async fn run_query(dsn: &str, args: QueryArgs) -> Result<()> {
    let config = ConnectionConfig::parse(dsn).context("Invalid connection string")?;
    let session = Arc::new(Session::connect(config).await);

    let closer = Arc::clone(&session);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, closing session");
            closer.close();
        }
    });

    let result = session
        .query(&args.search, &args.named_args())
        .await
        .context("Query failed")?;
    session.close();

    match args.format {
        OutputFormat::Table => print!("{}", render_table(&result)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
    }
    tracing::info!(rows = result.len(), "Query finished");

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Some(Commands::Query(args)) => run_query(&cli.dsn, args).await?,
        Some(Commands::Dsn) => {
            let config =
                ConnectionConfig::parse(&cli.dsn).context("Invalid connection string")?;
            println!("{config}");
        }
        None => {
            println!("cwinsights CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Use --help for usage information");
        }
    }

    Ok(())
}
