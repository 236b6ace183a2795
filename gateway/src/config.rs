use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    OpenAiCompatible,
    Ollama,
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        HttpConfig {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub base_url: String,
    pub default_model: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        OllamaConfig {
            base_url: "http://localhost:11434".to_string(),
            default_model: "llama3.2:latest".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub http: HttpConfig,
    pub backend: LlmBackend,
    pub ollama: OllamaConfig,
    pub worker_pool_size: usize,
    pub model_mapping: HashMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            http: HttpConfig::default(),
            backend: LlmBackend::Ollama,
            ollama: OllamaConfig::default(),
            worker_pool_size: 4,
            model_mapping: default_model_mapping(),
        }
    }
}

/// Coerces a subset of cloud model names to a default local equivalent
/// when the Ollama backend is active. Names with no mapping pass through
/// to `Config.ollama.default_model`.
fn default_model_mapping() -> HashMap<String, String> {
    let mut m = HashMap::new();
    m.insert("gpt-4o".to_string(), "llama3.2:latest".to_string());
    m.insert("gpt-4o-mini".to_string(), "llama3.2:latest".to_string());
    m.insert("gpt-4-turbo".to_string(), "llama3.1:70b".to_string());
    m
}

impl Config {
    /// Loads configuration from environment variables, falling back to
    /// the defaults above for anything unset.
    pub fn from_env() -> Self {
        let mut config = Config::default();

        if let Ok(port) = std::env::var("PORT") {
            if let Ok(parsed) = port.parse() {
                config.http.port = parsed;
            }
        }
        if let Ok(base_url) = std::env::var("OLLAMA_BASE_URL") {
            config.ollama.base_url = base_url;
        }
        if let Ok(model) = std::env::var("OLLAMA_DEFAULT_MODEL") {
            config.ollama.default_model = model;
        }
        if let Ok(use_ollama) = std::env::var("USE_OLLAMA") {
            config.backend = if use_ollama.eq_ignore_ascii_case("true") || use_ollama == "1" {
                LlmBackend::Ollama
            } else {
                LlmBackend::OpenAiCompatible
            };
        }
        if let Ok(size) = std::env::var("WORKER_POOL_SIZE") {
            if let Ok(parsed) = size.parse() {
                config.worker_pool_size = parsed;
            }
        }

        config
    }

    /// Maps a cloud model name to its local equivalent when the Ollama
    /// backend is active; returns the name unchanged otherwise.
    pub fn resolve_model_name(&self, requested: &str) -> String {
        if self.backend != LlmBackend::Ollama {
            return requested.to_string();
        }
        self.model_mapping
            .get(requested)
            .cloned()
            .unwrap_or_else(|| self.ollama.default_model.clone())
    }

    pub fn supports_json_mode(&self) -> bool {
        matches!(self.backend, LlmBackend::OpenAiCompatible)
    }
}
