pub mod cancellation;
pub mod comment_filter;
pub mod completer;
pub mod error;
pub mod json_extractor;
pub mod pipeline;
pub mod pricing;
pub mod telemetry;
pub mod types;
pub mod worker_pool;

pub use pipeline::Pipeline;
