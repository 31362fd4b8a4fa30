//! Trait for internal events that map onto metrics.
//!
//! Each event struct represents a measurable occurrence. Crates define their
//! own event structs and implement `InternalEvent` to record the
//! corresponding counter, gauge or histogram.

/// Trait for internal events that can be emitted as metrics.
pub trait InternalEvent {
    /// Emit this event as a metric.
    fn emit(self);
}
