//! Metrics infrastructure.
//!
//! - `events`: the `InternalEvent` trait implemented by every metric event
//! - `recorder`: Prometheus recorder installation and rendering
//!
//! A run is a bounded batch, so there is no scrape endpoint: the recorder is
//! installed once at startup and rendered after the run completes. Without an
//! installed recorder all emitted metrics are no-ops.

pub mod events;
mod recorder;

pub use events::InternalEvent;
pub use recorder::{MetricsController, init_recorder, init_test};

/// Macro for emitting metric events.
///
/// Calls `InternalEvent::emit()` on the given event.
///
/// ```ignore
/// use narwhal_core::emit;
///
/// emit!(RecordsUpserted { table: "orders".into(), count: 3 });
/// ```
#[macro_export]
macro_rules! emit {
    ($event:expr) => {
        $crate::metrics::events::InternalEvent::emit($event)
    };
}
