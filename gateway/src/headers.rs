use actix_web::HttpRequest;

pub const OPENAI_API_KEY_HEADER: &str = "X-OpenAI-API-Key";

/// Reads the per-request LLM credential. Never logged — callers must not
/// pass this through `tracing` fields or debug-format the request.
pub fn extract_api_key(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get(OPENAI_API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}
