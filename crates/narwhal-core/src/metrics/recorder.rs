//! Prometheus recorder with singleton-based initialization.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use snafu::prelude::*;
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use tracing::info;

use crate::error::{AlreadyInitializedSnafu, MetricsError, NotInitializedSnafu, PrometheusInitSnafu};

/// Histogram buckets for duration metrics (in seconds).
const DURATION_BUCKETS: &[f64] = &[
    0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 300.0,
];

/// How long a losing test thread waits for the winner to publish.
const TEST_INIT_WAIT: Duration = Duration::from_secs(5);

static CONTROLLER: OnceLock<MetricsController> = OnceLock::new();

/// Handle to the installed recorder.
pub struct MetricsController {
    handle: PrometheusHandle,
}

fn build_controller() -> Result<MetricsController, MetricsError> {
    let handle = PrometheusBuilder::new()
        .set_buckets(DURATION_BUCKETS)
        .context(PrometheusInitSnafu)?
        .install_recorder()
        .context(PrometheusInitSnafu)?;
    Ok(MetricsController { handle })
}

/// Install the global Prometheus recorder.
///
/// # Errors
///
/// Returns an error if a recorder is already installed or the recorder
/// fails to build.
pub fn init_recorder() -> Result<&'static MetricsController, MetricsError> {
    ensure!(CONTROLLER.get().is_none(), AlreadyInitializedSnafu);

    let controller = build_controller()?;
    CONTROLLER
        .set(controller)
        .map_err(|_| AlreadyInitializedSnafu.build())?;

    info!("Metrics recorder installed");
    MetricsController::get()
}

/// Install the recorder for tests.
///
/// Safe to call from several test threads: losers of the installation race
/// wait until the winner has published the controller.
///
/// # Panics
///
/// Panics if the recorder fails to build, or if the global recorder is taken
/// but no controller shows up in time (a recorder installed elsewhere).
pub fn init_test() {
    match init_recorder() {
        Ok(_) => {}
        Err(MetricsError::AlreadyInitialized) => {}
        Err(MetricsError::PrometheusInit {
            source: BuildError::FailedToSetGlobalRecorder(_),
        }) => {
            if wait_for(&CONTROLLER, TEST_INIT_WAIT).is_none() {
                panic!("global recorder is set but no metrics controller was published");
            }
        }
        Err(e) => panic!("failed to install test metrics recorder: {e}"),
    }
}

/// Poll `cell` until it is set or `timeout` elapses.
fn wait_for<T>(cell: &OnceLock<T>, timeout: Duration) -> Option<&T> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(value) = cell.get() {
            return Some(value);
        }
        if Instant::now() >= deadline {
            return None;
        }
        std::thread::yield_now();
    }
}

impl MetricsController {
    /// Get the global controller.
    ///
    /// # Errors
    ///
    /// Returns an error if the recorder has not been installed.
    pub fn get() -> Result<&'static Self, MetricsError> {
        CONTROLLER.get().context(NotInitializedSnafu)
    }

    /// Render all metrics in Prometheus text format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}
