pub mod ollama_client;
pub mod openai_client;

pub use ollama_client::OllamaCompleter;
pub use openai_client::OpenAiCompatibleCompleter;
