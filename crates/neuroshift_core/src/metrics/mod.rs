//! Per-job classification metrics and the registry that tracks them.

pub mod accumulator;
pub mod registry;

pub use accumulator::{CompositeKey, ConfusionCounts, MetricsAccumulator};
pub use registry::MetricsRegistry;
