//! narwhal-core: ambient components shared by the narwhal binaries.
//!
//! - `config/` - Definitions file loading (YAML or JSON by extension)
//! - `metrics/` - `InternalEvent` trait, `emit!` macro and Prometheus recorder
//! - `tracing` - Subscriber initialization
//! - `error` - Common error types

pub mod config;
pub mod error;
pub mod metrics;
pub mod tracing;

pub use config::{is_yaml_file, load_definitions_file, parse_definitions};
pub use error::{ConfigError, MetricsError};
pub use self::metrics::{MetricsController, init_recorder};
pub use self::tracing::{LogFormat, init_tracing};
