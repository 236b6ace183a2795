//! Stage 1: derive a two-level topic/subtopic taxonomy from all comments
//! in a single LLM call.

use std::sync::Arc;

use crate::cancellation::{run_cancellable, CancellationToken};
use crate::comment_filter::{is_meaningful, CommentFilterConfig};
use crate::completer::Completer;
use crate::error::PipelineResult;
use crate::json_extractor;
use crate::pricing::token_cost;
use crate::types::{Comment, CompletionOptions, LlmConfig, StageResult, Topic, Taxonomy};

/// Builds the user message sent to the model: the caller's prompt
/// followed by every meaningful comment's text, one per line.
fn build_user_message(user_prompt: &str, comments: &[Comment], filter: &CommentFilterConfig) -> String {
    let mut lines = vec![user_prompt.to_string()];
    for comment in comments {
        if is_meaningful(&comment.text, filter) {
            lines.push(comment.text.clone());
        }
    }
    lines.join("\n")
}

/// Normalizes a raw extracted JSON value into a `Taxonomy`:
/// - coerces anything that isn't `{"taxonomy": [...]}` into an empty taxonomy;
/// - synthesizes a "General <topic>" subtopic for any topic without one.
pub fn normalize(value: &serde_json::Value) -> Taxonomy {
    let mut taxonomy: Taxonomy = match value.get("taxonomy").and_then(|t| t.as_array()) {
        Some(_) => serde_json::from_value(value.clone()).unwrap_or_default(),
        None => Taxonomy::default(),
    };
    for topic in &mut taxonomy.taxonomy {
        if topic.subtopics.is_empty() {
            topic.subtopics.push(crate::types::Subtopic {
                name: format!("General {}", topic.name),
                description: format!("General aspects of {}", topic.name.to_lowercase()),
            });
        }
    }
    taxonomy
}

pub async fn run(
    completer: &Arc<dyn Completer>,
    comments: &[Comment],
    llm: &LlmConfig,
    filter: &CommentFilterConfig,
    supports_json_mode: bool,
    token: &CancellationToken,
) -> PipelineResult<StageResult<Vec<Topic>>> {
    let user_message = build_user_message(&llm.user_prompt, comments, filter);
    let options = CompletionOptions {
        json_mode: supports_json_mode,
        thinking: false,
    };
    let response = run_cancellable(
        token,
        completer.complete(&llm.system_prompt, &user_message, options),
    )
    .await??;

    let taxonomy = match json_extractor::extract(&response.text) {
        Ok(value) => normalize(&value),
        Err(_) => {
            tracing::warn!("taxonomy extraction failed, falling back to empty taxonomy");
            Taxonomy::default()
        }
    };

    let cost = token_cost(
        &llm.model_name,
        response.usage.prompt_tokens,
        response.usage.completion_tokens,
    );

    Ok(StageResult {
        data: taxonomy.taxonomy,
        usage: response.usage,
        cost,
    })
}
