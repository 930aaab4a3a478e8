//! Command-line interface.
//!
//! Every pipeline stage is a standalone subcommand over a result table, and
//! `run` drives them all in sequence.

mod commands;
mod progress;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::{parse_request_params, ConfigError, ConfigFile};

#[derive(Parser)]
#[command(name = "sqlport")]
#[command(about = "Convert SQL files into Databricks notebooks with a language model")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery of sqlport.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Result store database file
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Scan input files into a new result table
    Analyze(AnalyzeArgs),

    /// Convert every target that has no converted content yet
    Convert {
        /// Result table (catalog.schema.table)
        table: String,
        #[command(flatten)]
        endpoint: EndpointArgs,
    },

    /// Run static checks over converted targets
    Validate {
        /// Result table (catalog.schema.table)
        table: String,
        /// Number of concurrent workers
        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// Send erroring targets back to the endpoint once
    Fix {
        /// Result table (catalog.schema.table)
        table: String,
        #[command(flatten)]
        endpoint: EndpointArgs,
    },

    /// Write one notebook per row
    Export {
        /// Result table (catalog.schema.table)
        table: String,
        #[command(flatten)]
        output: OutputArgs,
    },

    /// Analyze, convert, validate and fix, then export
    Run {
        #[command(flatten)]
        analyze: AnalyzeArgs,
        /// Reuse an existing result table instead of analyzing inputs
        #[arg(long)]
        existing_result_table: Option<String>,
        #[command(flatten)]
        endpoint: EndpointArgs,
        /// Maximum number of fix attempts (0 disables fixing)
        #[arg(long)]
        max_fix_attempts: Option<usize>,
        #[command(flatten)]
        output: OutputArgs,
    },

    /// Mark rows for conversion again
    Retarget {
        /// Result table (catalog.schema.table)
        table: String,
        /// File numbers to retarget
        #[arg(long, value_delimiter = ',')]
        files: Vec<i32>,
        /// Retarget every row whose input path contains this text
        #[arg(long)]
        path_contains: Option<String>,
    },

    /// Show the row census of one or all result tables
    Status {
        /// Result table (catalog.schema.table); all tables when omitted
        table: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Clone, Default)]
struct AnalyzeArgs {
    /// Directory of SQL files to convert
    #[arg(short, long)]
    input_dir: Option<PathBuf>,
    /// Catalog part of the result table name
    #[arg(long)]
    result_catalog: Option<String>,
    /// Schema part of the result table name
    #[arg(long)]
    result_schema: Option<String>,
    /// Prefix of the result table name
    #[arg(long)]
    result_table_prefix: Option<String>,
    /// Files above this many tokens (comments stripped) are not converted
    #[arg(long)]
    token_count_threshold: Option<usize>,
}

impl AnalyzeArgs {
    fn layer(&self) -> ConfigFile {
        ConfigFile {
            input_dir: self.input_dir.clone(),
            result_catalog: self.result_catalog.clone(),
            result_schema: self.result_schema.clone(),
            result_table_prefix: self.result_table_prefix.clone(),
            token_count_threshold: self.token_count_threshold,
            ..Default::default()
        }
    }
}

#[derive(Args, Clone, Default)]
struct EndpointArgs {
    /// Model serving endpoint name
    #[arg(short, long)]
    endpoint_name: Option<String>,
    /// Endpoint used by fix attempts (defaults to --endpoint-name)
    #[arg(long)]
    fix_endpoint_name: Option<String>,
    /// Workspace host, OpenAI-compatible /v1 base, or full invocation URL
    #[arg(long)]
    endpoint_url: Option<String>,
    /// SQL dialect of the input files
    #[arg(long)]
    sql_dialect: Option<String>,
    /// Language for comments in the generated notebooks (English or Japanese)
    #[arg(long)]
    comment_lang: Option<String>,
    /// Extra request body fields as a JSON object
    #[arg(long)]
    request_params: Option<String>,
    /// Number of concurrent requests
    #[arg(short, long)]
    workers: Option<usize>,
    /// Per-request timeout in seconds
    #[arg(long)]
    request_timeout_secs: Option<u64>,
}

impl EndpointArgs {
    fn layer(&self) -> Result<ConfigFile, ConfigError> {
        Ok(ConfigFile {
            endpoint_name: self.endpoint_name.clone(),
            fix_endpoint_name: self.fix_endpoint_name.clone(),
            endpoint_url: self.endpoint_url.clone(),
            sql_dialect: self.sql_dialect.clone(),
            comment_lang: self.comment_lang.clone(),
            request_params: self
                .request_params
                .as_deref()
                .map(parse_request_params)
                .transpose()?,
            workers: self.workers,
            request_timeout_secs: self.request_timeout_secs,
            ..Default::default()
        })
    }
}

#[derive(Args, Clone, Default)]
struct OutputArgs {
    /// Directory notebooks are written to
    #[arg(short, long)]
    output_dir: Option<PathBuf>,
    /// Also write the per-file export results as JSON to this path
    #[arg(long)]
    report: Option<PathBuf>,
}

fn table_layer(table: String) -> ConfigFile {
    ConfigFile {
        existing_result_table: Some(table),
        ..Default::default()
    }
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // File, then environment, then global flags
    let base = ConfigFile::load(cli.config.as_deref())
        .await?
        .merge(ConfigFile::from_env())
        .merge(ConfigFile {
            database: cli.database,
            ..Default::default()
        });

    match cli.command {
        Commands::Analyze(args) => commands::analyze::cmd_analyze(base.merge(args.layer())).await,
        Commands::Convert { table, endpoint } => {
            let layer = base.merge(table_layer(table)).merge(endpoint.layer()?);
            commands::convert::cmd_convert(layer).await
        }
        Commands::Validate { table, workers } => {
            let layer = base.merge(table_layer(table)).merge(ConfigFile {
                workers,
                ..Default::default()
            });
            commands::validate::cmd_validate(layer).await
        }
        Commands::Fix { table, endpoint } => {
            let layer = base.merge(table_layer(table)).merge(endpoint.layer()?);
            commands::convert::cmd_fix(layer).await
        }
        Commands::Export { table, output } => {
            let layer = base.merge(table_layer(table)).merge(ConfigFile {
                output_dir: output.output_dir,
                ..Default::default()
            });
            commands::export::cmd_export(layer, output.report.as_deref()).await
        }
        Commands::Run {
            analyze,
            existing_result_table,
            endpoint,
            max_fix_attempts,
            output,
        } => {
            let layer = base
                .merge(analyze.layer())
                .merge(endpoint.layer()?)
                .merge(ConfigFile {
                    existing_result_table,
                    max_fix_attempts,
                    output_dir: output.output_dir,
                    ..Default::default()
                });
            commands::run::cmd_run(layer, output.report.as_deref()).await
        }
        Commands::Retarget {
            table,
            files,
            path_contains,
        } => {
            commands::retarget::cmd_retarget(
                base.merge(table_layer(table)),
                &files,
                path_contains.as_deref(),
            )
            .await
        }
        Commands::Status { table, json } => {
            let layer = match table {
                Some(table) => base.merge(table_layer(table)),
                None => base,
            };
            commands::status::cmd_status(layer, json).await
        }
    }
}
