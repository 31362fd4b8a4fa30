//! narwhal CLI: ingest one record envelope into the configured lakehouse tables.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use snafu::ResultExt;
use tracing::info;

use narwhal::error::ReadSnafu;
use narwhal::pipeline::STATUS_OK;
use narwhal::{
    CliArgs, DeltaCatalog, EnvelopeError, IngestionOrchestrator, LogFormat, MetricsController,
    ParameterResolver, ParameterStore, RecordEnvelope, SsmParameterStore, StaticParameterStore,
    TableConfigRegistry, init_recorder, init_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    let args = CliArgs::parse();

    init_tracing(if args.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Text
    });

    if args.print_metrics {
        if let Err(e) = init_recorder() {
            eprintln!("Failed to install metrics recorder: {e}");
            return ExitCode::FAILURE;
        }
    }

    let settings = args.settings();

    let registry = match TableConfigRegistry::load(
        args.table_definitions.as_deref(),
        args.table_definitions_file.as_deref(),
        args.table_id.as_deref(),
    ) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Failed to load table definitions: {e}");
            return ExitCode::FAILURE;
        }
    };

    let store: Arc<dyn ParameterStore> = match &args.parameters_file {
        Some(path) => match StaticParameterStore::from_file(path) {
            Ok(s) => Arc::new(s),
            Err(e) => {
                eprintln!("Failed to load parameters: {e}");
                return ExitCode::FAILURE;
            }
        },
        None => Arc::new(SsmParameterStore::from_env(settings.region.as_deref()).await),
    };

    let envelope = match read_envelope(&args.event) {
        Ok(e) => e,
        Err(e) => {
            eprintln!("Invalid input: {e}");
            return ExitCode::FAILURE;
        }
    };

    info!(
        "Starting narwhal with {} table(s) and {} record(s)",
        registry.len(),
        envelope.len()
    );

    let catalog = Arc::new(DeltaCatalog::new(
        settings.catalog_name.clone(),
        settings.warehouse.clone(),
        settings.effective_storage_options(),
    ));
    let orchestrator = IngestionOrchestrator::new(
        ParameterResolver::new(store, settings.environment.clone()),
        catalog,
        registry,
        settings.database.clone(),
    )
    .with_options(settings.run.clone());

    let outcome = match orchestrator.run(envelope.into_records()).await {
        Ok(o) => o,
        Err(e) => {
            eprintln!("Invocation failed: {e}");
            return ExitCode::FAILURE;
        }
    };

    let response = outcome.into_response();
    match serde_json::to_string(&response) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            eprintln!("Failed to serialize response: {e}");
            return ExitCode::FAILURE;
        }
    }

    if args.print_metrics {
        if let Ok(controller) = MetricsController::get() {
            eprintln!("{}", controller.render());
        }
    }

    if response.status_code == STATUS_OK {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Read the envelope from a file, or stdin for `-`.
fn read_envelope(path: &Path) -> Result<RecordEnvelope, EnvelopeError> {
    if path == Path::new("-") {
        return RecordEnvelope::from_reader(std::io::stdin().lock());
    }
    let file = File::open(path).context(ReadSnafu)?;
    RecordEnvelope::from_reader(BufReader::new(file))
}
