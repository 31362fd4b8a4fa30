//! Metrics for the ingestion pipeline.
//!
//! Events are emitted with `narwhal_core::emit!` and carry a `table` label
//! where they concern one logical table.

pub mod events;

pub use events::*;
