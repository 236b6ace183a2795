//! The observability port. Each stage reports its token usage, cost, and
//! a handful of example rows for at-a-glance review; the default adapter
//! renders that as structured `tracing` events. No metrics database, no
//! span exporter — this crate's ambient observability is structured logs
//! only.

use serde_json::Value;

use crate::types::{Money, TokenUsage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageName {
    Taxonomy,
    Claims,
    Sort,
    Crux,
}

impl StageName {
    fn as_str(&self) -> &'static str {
        match self {
            StageName::Taxonomy => "taxonomy",
            StageName::Claims => "claims",
            StageName::Sort => "sort",
            StageName::Crux => "crux",
        }
    }
}

pub trait Telemetry: Send + Sync {
    fn record_stage(&self, stage: StageName, usage: TokenUsage, cost: Money, example_rows: &[Value]);
}

/// Bounds how many example rows get logged per stage call, so a large
/// claim tree doesn't flood the log sink.
const MAX_LOGGED_EXAMPLES: usize = 3;

pub struct TracingTelemetry;

impl Telemetry for TracingTelemetry {
    fn record_stage(&self, stage: StageName, usage: TokenUsage, cost: Money, example_rows: &[Value]) {
        tracing::info!(
            stage = stage.as_str(),
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            total_tokens = usage.total_tokens,
            cost = cost.0,
            "stage completed"
        );
        for row in example_rows.iter().take(MAX_LOGGED_EXAMPLES) {
            tracing::debug!(stage = stage.as_str(), example = %row, "stage example row");
        }
    }
}

/// An in-memory sink useful for tests: records every call it receives
/// rather than writing to the tracing subscriber.
#[cfg(test)]
pub mod test_support {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Clone)]
    pub struct RecordedCall {
        pub stage: StageName,
        pub usage: TokenUsage,
        pub cost: Money,
    }

    #[derive(Default)]
    pub struct RecordingTelemetry {
        pub calls: Mutex<Vec<RecordedCall>>,
    }

    impl Telemetry for RecordingTelemetry {
        fn record_stage(&self, stage: StageName, usage: TokenUsage, cost: Money, _example_rows: &[Value]) {
            self.calls.lock().unwrap().push(RecordedCall { stage, usage, cost });
        }
    }
}
