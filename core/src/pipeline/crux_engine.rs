//! Stage 4: per-subtopic crux synthesis, speaker anonymization, and the
//! controversy matrix / top-K ranking across generated cruxes.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;

use crate::cancellation::CancellationToken;
use crate::completer::Completer;
use crate::error::PipelineResult;
use crate::json_extractor;
use crate::pricing::token_cost;
use crate::types::{
    ClaimTree, CompletionOptions, ControversyMatrix, CruxReport, CruxRow, LlmConfig, SpeakerMap,
    TokenUsage, TopCrux, Topic,
};
use crate::worker_pool::WorkerPool;

const NO_FURTHER_DETAILS: &str = "No further details";

fn build_topic_desc(topics: &[Topic]) -> HashMap<String, String> {
    let mut desc = HashMap::new();
    for topic in topics {
        desc.insert(topic.name.clone(), topic.description.clone());
        for subtopic in &topic.subtopics {
            desc.insert(subtopic.name.clone(), subtopic.description.clone());
        }
    }
    desc
}

struct SubtopicUnit {
    topic_name: String,
    subtopic_name: String,
    anonymized_claims: Vec<String>,
}

fn collect_eligible_subtopics(tree: &ClaimTree, speaker_map: &SpeakerMap) -> Vec<SubtopicUnit> {
    let mut units = Vec::new();
    for (topic_name, topic_bucket) in tree {
        for (subtopic_name, subtopic_bucket) in &topic_bucket.subtopics {
            let distinct_speakers: std::collections::HashSet<&str> =
                subtopic_bucket.claims.iter().map(|c| c.speaker.as_str()).collect();
            if subtopic_bucket.claims.len() < 2 || distinct_speakers.len() < 2 {
                continue;
            }
            let anonymized = subtopic_bucket
                .claims
                .iter()
                .filter_map(|c| speaker_map.id_of(&c.speaker).map(|id| format!("{id}:{}", c.text)))
                .collect();
            units.push(SubtopicUnit {
                topic_name: topic_name.clone(),
                subtopic_name: subtopic_name.clone(),
                anonymized_claims: anonymized,
            });
        }
    }
    units
}

fn build_prompt(user_prompt: &str, title: &str, description: &str, claims: &[String]) -> String {
    format!(
        "{user_prompt}\nTopic: {title}\nDescription: {description}\nClaims:\n{}",
        claims.join("\n")
    )
}

#[derive(Debug, Deserialize)]
struct FlatCrux {
    #[serde(rename = "cruxClaim")]
    crux_claim: String,
    #[serde(default)]
    agree: Vec<String>,
    #[serde(default)]
    disagree: Vec<String>,
    #[serde(default)]
    explanation: String,
}

/// Accepts either `{"crux": {...}}` or a bare `{cruxClaim, agree, disagree,
/// explanation}` object; anything else yields `None` and a warning.
fn parse_crux_row(value: &serde_json::Value) -> Option<CruxRow> {
    let candidate = value.get("crux").unwrap_or(value);
    let flat: FlatCrux = serde_json::from_value(candidate.clone()).ok()?;
    Some(CruxRow {
        crux_claim: flat.crux_claim,
        agree: normalize_ids(flat.agree),
        disagree: normalize_ids(flat.disagree),
        explanation: flat.explanation,
    })
}

/// `agree`/`disagree` entries may come back as `"<id>:<claimText>"`;
/// normalize to just the id (the part before the first `:`).
fn normalize_ids(entries: Vec<String>) -> Vec<String> {
    entries
        .into_iter()
        .map(|e| e.split(':').next().unwrap_or("").to_string())
        .collect()
}

async fn generate_crux(
    completer: &Arc<dyn Completer>,
    llm: &LlmConfig,
    topic_desc: &HashMap<String, String>,
    unit: &SubtopicUnit,
    supports_json_mode: bool,
) -> PipelineResult<(Option<CruxRow>, TokenUsage)> {
    let title = format!("{}, {}", unit.topic_name, unit.subtopic_name);
    let description = topic_desc
        .get(&unit.subtopic_name)
        .cloned()
        .unwrap_or_else(|| NO_FURTHER_DETAILS.to_string());

    let user_message = build_prompt(&llm.user_prompt, &title, &description, &unit.anonymized_claims);
    let options = CompletionOptions {
        json_mode: supports_json_mode,
        thinking: false,
    };
    let response = completer
        .complete(&llm.system_prompt, &user_message, options)
        .await?;

    let crux = match json_extractor::extract(&response.text) {
        Ok(value) => match parse_crux_row(&value) {
            Some(row) => Some(row),
            None => {
                tracing::warn!(subtopic = %unit.subtopic_name, "crux response had an unrecognized shape, skipping");
                None
            }
        },
        Err(_) => {
            tracing::warn!(subtopic = %unit.subtopic_name, "crux extraction failed, skipping subtopic");
            None
        }
    };

    Ok((crux, response.usage))
}

/// For each (crux, speaker) pair: 1 if the speaker agrees, 0.5 if they
/// disagree, 0 if unknown.
fn opinion_score(row: &CruxRow, speaker_id: &str) -> f64 {
    if row.agree.iter().any(|a| a == speaker_id) {
        1.0
    } else if row.disagree.iter().any(|d| d == speaker_id) {
        0.5
    } else {
        0.0
    }
}

fn build_controversy_matrix(cruxes: &[CruxRow], speaker_ids: &[String]) -> ControversyMatrix {
    let n = cruxes.len();
    let mut matrix = ControversyMatrix::zeros(n);

    let scores: Vec<Vec<f64>> = cruxes
        .iter()
        .map(|row| speaker_ids.iter().map(|id| opinion_score(row, id)).collect())
        .collect();

    for i in 0..n {
        for j in (i + 1)..n {
            let mut accumulated = 0.0;
            for s in 0..speaker_ids.len() {
                let a = scores[i][s];
                let b = scores[j][s];
                if (a - b).abs() < f64::EPSILON {
                    // equal opinions: no controversy
                } else if a == 0.0 || b == 0.0 {
                    accumulated += 0.5;
                } else {
                    accumulated += 1.0;
                }
            }
            matrix.set_symmetric(i, j, accumulated);
        }
    }

    matrix
}

fn top_k_cruxes(cruxes: &[CruxRow], matrix: &ControversyMatrix, top_k: usize) -> Vec<TopCrux> {
    let n = cruxes.len();
    let k = if top_k == 0 {
        ((n as f64).sqrt().ceil() as usize).min(10)
    } else {
        top_k
    };

    let mut entries: Vec<(f64, usize, usize)> = Vec::new();
    for i in 0..n {
        for j in (i + 1)..n {
            entries.push((matrix.get(i, j), i, j));
        }
    }
    entries.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

    entries
        .into_iter()
        .take(k)
        .map(|(score, i, j)| TopCrux {
            score,
            crux_a: cruxes[i].clone(),
            crux_b: cruxes[j].clone(),
        })
        .collect()
}

pub async fn run(
    completer: &Arc<dyn Completer>,
    crux_tree: &ClaimTree,
    llm: &LlmConfig,
    topics: &[Topic],
    top_k: usize,
    pool: &WorkerPool,
    supports_json_mode: bool,
    token: &CancellationToken,
) -> PipelineResult<CruxReport> {
    let topic_desc = build_topic_desc(topics);
    let speaker_map = SpeakerMap::from_claim_tree(crux_tree);
    let speaker_ids = speaker_map.sorted_ids();

    let units = collect_eligible_subtopics(crux_tree, &speaker_map);

    let completer = completer.clone();
    let llm = llm.clone();
    let topic_desc_arc = Arc::new(topic_desc);

    let results = pool
        .map(units, token, move |_idx, unit| {
            let completer = completer.clone();
            let llm = llm.clone();
            let topic_desc = topic_desc_arc.clone();
            async move { generate_crux(&completer, &llm, &topic_desc, &unit, supports_json_mode).await }
        })
        .await?;

    let mut crux_claims = Vec::new();
    let mut total_usage = TokenUsage::default();
    for result in results {
        let (maybe_crux, usage) = result?;
        total_usage += usage;
        if let Some(crux) = maybe_crux {
            crux_claims.push(crux);
        }
    }

    let matrix = build_controversy_matrix(&crux_claims, &speaker_ids);
    let top_cruxes = top_k_cruxes(&crux_claims, &matrix, top_k);

    let cost = token_cost(&llm.model_name, total_usage.prompt_tokens, total_usage.completion_tokens);

    Ok(CruxReport {
        crux_claims,
        controversy_matrix: matrix,
        top_cruxes,
        usage: total_usage,
        cost,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crux(claim: &str, agree: &[&str], disagree: &[&str]) -> CruxRow {
        CruxRow {
            crux_claim: claim.to_string(),
            agree: agree.iter().map(|s| s.to_string()).collect(),
            disagree: disagree.iter().map(|s| s.to_string()).collect(),
            explanation: "because".to_string(),
        }
    }

    #[test]
    fn controversy_matrix_symmetric_and_zero_diagonal() {
        let cruxes = vec![
            crux("c1", &["0"], &["1"]),
            crux("c2", &["1"], &["0"]),
        ];
        let speakers = vec!["0".to_string(), "1".to_string(), "2".to_string()];
        let matrix = build_controversy_matrix(&cruxes, &speakers);
        assert_eq!(matrix.get(0, 1), matrix.get(1, 0));
        assert_eq!(matrix.get(0, 0), 0.0);
        assert_eq!(matrix.get(1, 1), 0.0);
    }

    #[test]
    fn controversy_matrix_matches_worked_example() {
        // Speaker 0: crux0 agree (1.0), crux1 disagree (0.5)
        // Speaker 1: crux0 disagree (0.5), crux1 agree (1.0)
        // Speaker 2: crux0 unknown (0.0), crux1 unknown (0.0)
        let cruxes = vec![crux("c1", &["0"], &["1"]), crux("c2", &["1"], &["0"])];
        let speakers = vec!["0".to_string(), "1".to_string(), "2".to_string()];
        let matrix = build_controversy_matrix(&cruxes, &speakers);
        assert_eq!(matrix.get(0, 1), 2.0);
    }

    #[test]
    fn top_k_zero_uses_sqrt_bound() {
        let cruxes: Vec<CruxRow> = (0..5).map(|i| crux(&format!("c{i}"), &[], &[])).collect();
        let speakers = vec!["0".to_string()];
        let matrix = build_controversy_matrix(&cruxes, &speakers);
        let top = top_k_cruxes(&cruxes, &matrix, 0);
        // N=5 pairs -> C(5,2)=10 possible; sqrt(5).ceil()=3, min(3,10)=3
        assert!(top.len() <= 3);
    }

    #[test]
    fn top_k_respects_explicit_bound() {
        let cruxes: Vec<CruxRow> = (0..5).map(|i| crux(&format!("c{i}"), &[], &[])).collect();
        let speakers = vec!["0".to_string()];
        let matrix = build_controversy_matrix(&cruxes, &speakers);
        let top = top_k_cruxes(&cruxes, &matrix, 2);
        assert_eq!(top.len(), 2);
    }

    #[test]
    fn parses_flat_and_wrapped_crux_shapes() {
        let flat = serde_json::json!({"cruxClaim": "x", "agree": [], "disagree": [], "explanation": "e"});
        assert!(parse_crux_row(&flat).is_some());

        let wrapped = serde_json::json!({"crux": {"cruxClaim": "x", "agree": [], "disagree": [], "explanation": "e"}});
        assert!(parse_crux_row(&wrapped).is_some());

        let bogus = serde_json::json!({"unexpected": "shape"});
        assert!(parse_crux_row(&bogus).is_none());
    }

    #[test]
    fn normalizes_agree_disagree_ids_from_id_colon_text() {
        let value = serde_json::json!({
            "cruxClaim": "x",
            "agree": ["0:cats are great"],
            "disagree": ["1:dogs are better"],
            "explanation": "e"
        });
        let row = parse_crux_row(&value).unwrap();
        assert_eq!(row.agree, vec!["0".to_string()]);
        assert_eq!(row.disagree, vec!["1".to_string()]);
    }

    #[test]
    fn crux_skipped_for_single_speaker_subtopic() {
        use crate::types::{Claim, ClaimTree, SubtopicBucket, TopicBucket};

        let mut tree = ClaimTree::new();
        let mut bucket = SubtopicBucket::default();
        for text in ["a", "b"] {
            bucket.claims.push(Claim {
                text: text.to_string(),
                quote: text.to_string(),
                topic_name: "T".to_string(),
                subtopic_name: "S".to_string(),
                comment_id: "c1".to_string(),
                speaker: "Alice".to_string(),
                duplicates: vec![],
                duplicated: false,
                extra: Default::default(),
            });
        }
        bucket.speakers.insert("Alice".to_string());
        let mut topic_bucket = TopicBucket::default();
        topic_bucket.subtopics.insert("S".to_string(), bucket);
        tree.insert("T".to_string(), topic_bucket);

        let speaker_map = SpeakerMap::from_claim_tree(&tree);
        let units = collect_eligible_subtopics(&tree, &speaker_map);
        assert!(units.is_empty());
    }

    #[tokio::test]
    async fn cancelled_token_fails_fast_without_generating_cruxes() {
        use crate::completer::test_support::FakeCompleter;
        use crate::types::{Claim, ClaimTree, SubtopicBucket, TopicBucket};

        let mut tree = ClaimTree::new();
        let mut bucket = SubtopicBucket::default();
        for (text, speaker) in [("a", "Alice"), ("b", "Bob")] {
            bucket.claims.push(Claim {
                text: text.to_string(),
                quote: text.to_string(),
                topic_name: "T".to_string(),
                subtopic_name: "S".to_string(),
                comment_id: "c1".to_string(),
                speaker: speaker.to_string(),
                duplicates: vec![],
                duplicated: false,
                extra: Default::default(),
            });
            bucket.speakers.insert(speaker.to_string());
        }
        let mut topic_bucket = TopicBucket::default();
        topic_bucket.subtopics.insert("S".to_string(), bucket);
        tree.insert("T".to_string(), topic_bucket);

        let completer: Arc<dyn Completer> = Arc::new(FakeCompleter::new(vec!["unused"]));
        let llm = LlmConfig {
            model_name: "gpt-4o-mini".to_string(),
            system_prompt: "system".to_string(),
            user_prompt: "cruxes".to_string(),
        };
        let pool = WorkerPool::new(2);
        let token = CancellationToken::new();
        token.cancel();

        let result = run(&completer, &tree, &llm, &[], 0, &pool, true, &token).await;
        assert!(matches!(result, Err(crate::error::PipelineError::Cancelled)));
    }
}
