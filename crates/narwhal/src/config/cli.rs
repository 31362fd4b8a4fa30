//! Command line and environment surface.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use url::Url;

use super::{RunOptions, Settings};

/// Ingest a batch of queue records into lakehouse tables as an upsert.
///
/// Every flag can also be supplied through the environment variable shown.
#[derive(Parser, Debug)]
#[command(version)]
pub struct CliArgs {
    /// Record envelope to ingest (`-` reads stdin)
    #[arg(short, long, env = "EVENT_FILE", default_value = "-")]
    pub event: PathBuf,

    /// AWS region
    #[arg(long, env = "REGION")]
    pub region: Option<String>,

    /// Deployment environment name, substituted for `{env}` in references
    #[arg(long, env = "ENV")]
    pub environment: String,

    /// Data-lake database name or parameter reference
    #[arg(long, env = "DATALAKEHOUSE_NAME")]
    pub database: String,

    /// Catalog name (used for logging)
    #[arg(long, env = "CATALOG_NAME", default_value = "default")]
    pub catalog_name: String,

    /// Warehouse root URI holding `{database}.db/{table}` tables
    #[arg(long, env = "WAREHOUSE_URI")]
    pub warehouse: Url,

    /// Storage option for the table format, as KEY=VALUE (repeatable)
    #[arg(long = "storage-option", value_parser = parse_key_value)]
    pub storage_options: Vec<(String, String)>,

    /// Inline JSON mapping of table identifiers to table definitions
    #[arg(long, env = "TABLE_DEFINITIONS")]
    pub table_definitions: Option<String>,

    /// Table definitions collection (.yaml, .yml or .json)
    #[arg(long, env = "TABLE_DEFINITIONS_FILE", requires = "table_id")]
    pub table_definitions_file: Option<PathBuf>,

    /// Table identifier selected from the definitions file
    #[arg(long, env = "TABLE_ID")]
    pub table_id: Option<String>,

    /// Resolve references from this YAML/JSON map instead of the AWS parameter store
    #[arg(long, env = "PARAMETERS_FILE")]
    pub parameters_file: Option<PathBuf>,

    /// Per-table timeout in seconds
    #[arg(long, env = "TABLE_TIMEOUT_SECS", default_value_t = 300)]
    pub table_timeout_secs: u64,

    /// Maximum number of tables processed concurrently
    #[arg(long, env = "MAX_CONCURRENT_TABLES", default_value_t = 1)]
    pub max_concurrent_tables: usize,

    /// Emit logs as JSON lines
    #[arg(long, env = "JSON_LOGS")]
    pub json_logs: bool,

    /// Print Prometheus metrics to stderr when the run completes
    #[arg(long)]
    pub print_metrics: bool,
}

impl CliArgs {
    /// Process-level settings from the parsed arguments.
    pub fn settings(&self) -> Settings {
        Settings {
            region: self.region.clone(),
            environment: self.environment.clone(),
            database: self.database.clone(),
            catalog_name: self.catalog_name.clone(),
            warehouse: self.warehouse.clone(),
            storage_options: self.storage_options.iter().cloned().collect::<HashMap<_, _>>(),
            run: RunOptions {
                table_timeout: Duration::from_secs(self.table_timeout_secs),
                max_concurrent_tables: self.max_concurrent_tables.max(1),
            },
        }
    }
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))?;
    Ok((key.to_string(), value.to_string()))
}
