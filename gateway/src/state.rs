use std::sync::Arc;

use deliberation_core::comment_filter::CommentFilterConfig;
use deliberation_core::completer::Completer;
use deliberation_core::telemetry::{TracingTelemetry, Telemetry};
use deliberation_core::Pipeline;

use crate::config::{Config, LlmBackend};
use crate::llm::{OllamaCompleter, OpenAiCompatibleCompleter};

/// Shared, request-independent state. A `Pipeline` is built fresh per
/// request because the LLM model (and, for the cloud backend, the API
/// key) varies with the request body and headers.
pub struct AppState {
    pub config: Config,
    pub telemetry: Arc<dyn Telemetry>,
    /// Set only by `for_testing`; lets integration tests drive the HTTP
    /// handlers without a real LLM backend on the other end.
    test_completer: Option<Arc<dyn Completer>>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        AppState {
            config,
            telemetry: Arc::new(TracingTelemetry),
            test_completer: None,
        }
    }

    pub fn for_testing(config: Config, completer: Arc<dyn Completer>) -> Self {
        AppState {
            config,
            telemetry: Arc::new(TracingTelemetry),
            test_completer: Some(completer),
        }
    }

    /// Builds a `Completer` for the given request's model name, resolving
    /// cloud model names to a local equivalent when the Ollama backend is
    /// active.
    pub fn build_completer(&self, requested_model: &str, api_key: Option<String>) -> Arc<dyn Completer> {
        if let Some(completer) = &self.test_completer {
            return completer.clone();
        }
        let model = self.config.resolve_model_name(requested_model);
        match self.config.backend {
            LlmBackend::Ollama => {
                Arc::new(OllamaCompleter::new(self.config.ollama.base_url.clone(), model))
            }
            LlmBackend::OpenAiCompatible => Arc::new(OpenAiCompatibleCompleter::new(
                api_key.unwrap_or_default(),
                model,
            )),
        }
    }

    pub fn build_pipeline(&self, requested_model: &str, api_key: Option<String>) -> Pipeline {
        Pipeline::new(
            self.build_completer(requested_model, api_key),
            self.telemetry.clone(),
            CommentFilterConfig::default(),
            self.config.worker_pool_size,
            self.config.supports_json_mode(),
        )
    }
}
