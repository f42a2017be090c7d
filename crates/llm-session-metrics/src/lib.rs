pub mod aggregator;
pub mod collector;
pub mod types;

pub use aggregator::{aggregate, MetricsSummary};
pub use collector::MetricsCollector;
pub use types::{GenerationMetrics, ImageMetrics, SubmissionRecord, SubmissionStatus};
