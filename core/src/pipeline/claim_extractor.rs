//! Stage 2: one LLM call per meaningful comment, extracting atomic
//! claims and placing each under a (topic, subtopic) pair of the taxonomy
//! produced by Stage 1.

use std::sync::Arc;

use serde::Deserialize;

use crate::cancellation::CancellationToken;
use crate::comment_filter::{is_meaningful, CommentFilterConfig};
use crate::completer::Completer;
use crate::error::PipelineResult;
use crate::json_extractor;
use crate::pricing::token_cost;
use crate::types::{
    Claim, ClaimTree, Comment, CompletionOptions, LlmConfig, StageResult, Taxonomy,
    GENERAL_SUBTOPIC, NONE_SUBTOPIC,
};
use crate::worker_pool::WorkerPool;

/// The subset of fields expected straight off a claim object returned by
/// the model, before `commentId`/`speaker` are injected.
#[derive(Debug, Clone, Deserialize)]
struct RawClaimObj {
    #[serde(default)]
    claim: String,
    #[serde(default)]
    quote: String,
    #[serde(rename = "topicName", default)]
    topic_name: Option<String>,
    #[serde(rename = "subtopicName", default)]
    subtopic_name: Option<String>,
    #[serde(default, flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

/// Coerces an extracted JSON value into a list of raw claim objects.
/// Accepts either `{"claims": [...]}` or a bare `[...]` array.
fn coerce_claims_array(value: &serde_json::Value) -> Vec<RawClaimObj> {
    let array = match value {
        serde_json::Value::Array(arr) => arr.clone(),
        serde_json::Value::Object(_) => match value.get("claims") {
            Some(serde_json::Value::Array(arr)) => arr.clone(),
            _ => Vec::new(),
        },
        _ => Vec::new(),
    };
    array
        .into_iter()
        .filter_map(|v| serde_json::from_value(v).ok())
        .collect()
}

fn build_prompt(user_prompt: &str, tree_json: &str, comment_text: &str) -> String {
    format!(
        "{}\n{}\nAnd then here is the comment:\n{}",
        user_prompt, tree_json, comment_text
    )
}

async fn extract_claims_for_comment(
    completer: &Arc<dyn Completer>,
    llm: &LlmConfig,
    tree_json: &str,
    comment: &Comment,
    supports_json_mode: bool,
) -> PipelineResult<(Vec<Claim>, crate::types::TokenUsage)> {
    let user_message = build_prompt(&llm.user_prompt, tree_json, &comment.text);
    let options = CompletionOptions {
        json_mode: supports_json_mode,
        thinking: false,
    };
    let response = completer
        .complete(&llm.system_prompt, &user_message, options)
        .await?;

    let raw_claims = match json_extractor::extract(&response.text) {
        Ok(value) => coerce_claims_array(&value),
        Err(_) => {
            tracing::warn!(comment_id = %comment.id, "claim extraction failed for comment, skipping");
            Vec::new()
        }
    };

    let claims = raw_claims
        .into_iter()
        .map(|raw| Claim {
            text: raw.claim,
            quote: raw.quote,
            topic_name: raw.topic_name.unwrap_or_default(),
            subtopic_name: raw.subtopic_name.unwrap_or_default(),
            comment_id: comment.id.clone(),
            speaker: comment.speaker.clone(),
            duplicates: Vec::new(),
            duplicated: false,
            extra: raw.extra,
        })
        .collect();

    Ok((claims, response.usage))
}

/// Reassigns a claim missing `topicName`/`subtopicName` per §4.3: the
/// first topic/subtopic of the taxonomy, or drops it if the taxonomy is
/// empty. Returns `None` to signal the claim should be dropped.
fn reconcile_placement(mut claim: Claim, taxonomy: &[crate::types::Topic]) -> Option<Claim> {
    if !claim.topic_name.is_empty() {
        return Some(claim);
    }
    match taxonomy.first() {
        Some(first_topic) => {
            claim.topic_name = first_topic.name.clone();
            claim.subtopic_name = first_topic
                .subtopics
                .first()
                .map(|s| s.name.clone())
                .unwrap_or_else(|| GENERAL_SUBTOPIC.to_string());
            Some(claim)
        }
        None => None,
    }
}

fn accumulate(tree: &mut ClaimTree, claim: Claim) {
    let topic_bucket = tree.entry(claim.topic_name.clone()).or_default();
    topic_bucket.total += 1;
    topic_bucket.speakers.insert(claim.speaker.clone());

    let subtopic_bucket = topic_bucket
        .subtopics
        .entry(claim.subtopic_name.clone())
        .or_default();
    subtopic_bucket.total += 1;
    subtopic_bucket.speakers.insert(claim.speaker.clone());
    subtopic_bucket.claims.push(claim);
}

/// Ensures every (topic, subtopic) pair in the input taxonomy appears in
/// the tree, even with zero claims, and that a topic with no claims at
/// all gets a placeholder "None" subtopic.
fn ensure_taxonomy_coverage(tree: &mut ClaimTree, taxonomy: &[crate::types::Topic]) {
    for topic in taxonomy {
        let bucket = tree.entry(topic.name.clone()).or_default();
        if topic.subtopics.is_empty() {
            bucket.subtopics.entry(NONE_SUBTOPIC.to_string()).or_default();
        } else {
            for subtopic in &topic.subtopics {
                bucket.subtopics.entry(subtopic.name.clone()).or_default();
            }
        }
    }
}

pub async fn run(
    completer: &Arc<dyn Completer>,
    comments: &[Comment],
    llm: &LlmConfig,
    taxonomy: &Taxonomy,
    filter: &CommentFilterConfig,
    pool: &WorkerPool,
    supports_json_mode: bool,
    token: &CancellationToken,
) -> PipelineResult<StageResult<ClaimTree>> {
    let tree_json = serde_json::to_string(taxonomy).unwrap_or_default();

    let meaningful: Vec<Comment> = comments
        .iter()
        .filter(|c| is_meaningful(&c.text, filter))
        .cloned()
        .collect();

    let completer = completer.clone();
    let llm = llm.clone();

    let results = pool
        .map(meaningful, token, move |_idx, comment| {
            let completer = completer.clone();
            let llm = llm.clone();
            let tree_json = tree_json.clone();
            async move { extract_claims_for_comment(&completer, &llm, &tree_json, &comment, supports_json_mode).await }
        })
        .await?;

    let mut tree: ClaimTree = ClaimTree::new();
    let mut total_usage = crate::types::TokenUsage::default();

    for result in results {
        let (claims, usage) = result?;
        total_usage += usage;
        for claim in claims {
            if let Some(claim) = reconcile_placement(claim, &taxonomy.taxonomy) {
                accumulate(&mut tree, claim);
            }
        }
    }

    ensure_taxonomy_coverage(&mut tree, &taxonomy.taxonomy);

    let cost = token_cost(&llm.model_name, total_usage.prompt_tokens, total_usage.completion_tokens);

    Ok(StageResult {
        data: tree,
        usage: total_usage,
        cost,
    })
}
