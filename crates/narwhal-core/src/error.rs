//! Common error types shared across narwhal crates.

use snafu::prelude::*;

// ============ Config Errors ============

/// Errors that can occur while loading startup configuration.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// Failed to read a configuration file.
    #[snafu(display("Failed to read {}: {source}", path.display()))]
    ReadFile {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    /// Failed to parse YAML.
    #[snafu(display("Failed to parse YAML: {source}"))]
    YamlParse { source: serde_yaml::Error },

    /// Failed to parse JSON.
    #[snafu(display("Failed to parse JSON: {source}"))]
    JsonParse { source: serde_json::Error },

    /// Unsupported definitions file format.
    #[snafu(display("Unsupported format for {}: expected .yaml, .yml or .json", path.display()))]
    UnsupportedFormat { path: std::path::PathBuf },

    /// No table definitions were supplied.
    #[snafu(display(
        "No table definitions configured (set TABLE_DEFINITIONS or TABLE_DEFINITIONS_FILE with TABLE_ID)"
    ))]
    MissingTableDefinitions,

    /// The selected table identifier does not exist in the definitions file.
    #[snafu(display("Table '{table}' not found in {}", path.display()))]
    UnknownTable {
        table: String,
        path: std::path::PathBuf,
    },
}

// ============ Metrics Errors ============

/// Errors that can occur during metrics initialization.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum MetricsError {
    /// Failed to initialize the Prometheus recorder.
    #[snafu(display("Failed to initialize Prometheus recorder"))]
    PrometheusInit {
        source: metrics_exporter_prometheus::BuildError,
    },

    /// Recorder already installed.
    #[snafu(display("Metrics recorder already initialized"))]
    AlreadyInitialized,

    /// Recorder accessed before installation.
    #[snafu(display("Metrics recorder not initialized"))]
    NotInitialized,
}
