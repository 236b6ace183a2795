//! Stage 3: per-subtopic duplicate detection and folding, then a
//! popularity sort of the resulting tree.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::cancellation::CancellationToken;
use crate::completer::Completer;
use crate::error::{PipelineError, PipelineResult};
use crate::json_extractor;
use crate::pricing::token_cost;
use crate::types::{
    Claim, ClaimTree, CompletionOptions, Counts, LlmConfig, SortKey, SortedTree, StageResult,
    SubtopicRecord, TokenUsage, TopicRecord,
};
use crate::worker_pool::WorkerPool;

fn build_prompt(user_prompt: &str, claims: &[Claim]) -> String {
    let mut lines = vec![user_prompt.to_string()];
    for (k, claim) in claims.iter().enumerate() {
        lines.push(format!("claimId{k}: {}", claim.text));
    }
    lines.join("\n")
}

/// Parses the numeric index out of a `"claimId<k>"` string by splitting
/// on the literal `Id`.
fn parse_claim_index(key: &str) -> Option<usize> {
    key.split("Id").nth(1)?.parse().ok()
}

/// Closes a possibly-asymmetric, possibly-partial nesting map into
/// symmetric equivalence classes: for each key with a non-empty value
/// list, the union `{k} ∪ V` is turned into a fully connected neighbor
/// set.
fn close_equivalence_classes(nesting: &HashMap<usize, Vec<usize>>) -> HashMap<usize, HashSet<usize>> {
    let mut dupe_map: HashMap<usize, HashSet<usize>> = HashMap::new();
    for (k, values) in nesting {
        if values.is_empty() {
            continue;
        }
        let mut set: HashSet<usize> = values.iter().copied().collect();
        set.insert(*k);
        for &e in &set {
            let entry = dupe_map.entry(e).or_default();
            for &other in &set {
                if other != e {
                    entry.insert(other);
                }
            }
        }
    }
    dupe_map
}

/// Folds duplicates in original claim order, producing canonical claims
/// each carrying its folded duplicates, sorted by duplicate count
/// descending (stable).
fn fold_duplicates(claims: &[Claim], dupe_map: &HashMap<usize, HashSet<usize>>) -> Vec<Claim> {
    let mut visited: HashSet<usize> = HashSet::new();
    let mut canonicals = Vec::new();

    for k in 0..claims.len() {
        if visited.contains(&k) {
            continue;
        }
        let mut canonical = claims[k].canonical_copy();
        if let Some(neighbors) = dupe_map.get(&k) {
            let mut neighbor_indices: Vec<usize> = neighbors.iter().copied().collect();
            neighbor_indices.sort_unstable();
            for m in neighbor_indices {
                if !visited.contains(&m) {
                    canonical.duplicates.push(claims[m].as_duplicate());
                    visited.insert(m);
                }
            }
        }
        visited.insert(k);
        canonicals.push(canonical);
    }

    canonicals.sort_by(|a, b| b.duplicates.len().cmp(&a.duplicates.len()));
    canonicals
}

async fn dedup_subtopic(
    completer: &Arc<dyn Completer>,
    llm: &LlmConfig,
    claims: &[Claim],
    supports_json_mode: bool,
) -> PipelineResult<(Vec<Claim>, TokenUsage)> {
    if claims.len() <= 1 {
        return Ok((claims.to_vec(), TokenUsage::default()));
    }

    let user_message = build_prompt(&llm.user_prompt, claims);
    let options = CompletionOptions {
        json_mode: supports_json_mode,
        thinking: false,
    };
    let response = completer
        .complete(&llm.system_prompt, &user_message, options)
        .await?;

    let nesting_value = match json_extractor::extract(&response.text) {
        Ok(value) => value,
        Err(_) => {
            tracing::warn!("dedup extraction failed for subtopic, treating as no duplicates");
            serde_json::json!({"nesting": {}})
        }
    };

    let mut nesting: HashMap<usize, Vec<usize>> = HashMap::new();
    if let Some(obj) = nesting_value.get("nesting").and_then(|v| v.as_object()) {
        for (key, values) in obj {
            if let Some(k) = parse_claim_index(key) {
                let parsed: Vec<usize> = values
                    .as_array()
                    .map(|arr| {
                        arr.iter()
                            .filter_map(|v| v.as_str().and_then(parse_claim_index))
                            .collect()
                    })
                    .unwrap_or_default();
                nesting.insert(k, parsed);
            }
        }
    }

    let dupe_map = close_equivalence_classes(&nesting);
    let canonicals = fold_duplicates(claims, &dupe_map);

    Ok((canonicals, response.usage))
}

fn sort_key_value(key: SortKey, counts: &Counts) -> usize {
    match key {
        SortKey::NumPeople => counts.speakers,
        SortKey::NumClaims => counts.claims,
    }
}

pub async fn run(
    completer: &Arc<dyn Completer>,
    tree: &ClaimTree,
    llm: &LlmConfig,
    sort: &str,
    pool: &WorkerPool,
    supports_json_mode: bool,
    token: &CancellationToken,
) -> PipelineResult<StageResult<SortedTree>> {
    let sort_key: SortKey = sort
        .parse()
        .map_err(|_| PipelineError::InputInvalid(format!("unrecognized sort key: {sort}")))?;

    // Flatten (topic, subtopic) pairs for bounded-concurrency dispatch,
    // keeping a stable dispatch index per subtopic so ordering among
    // subtopics doesn't matter but the claims within each stay in
    // original comment-iteration order.
    struct Unit {
        topic_name: String,
        subtopic_name: String,
        claims: Vec<Claim>,
        total: usize,
        speakers: std::collections::BTreeSet<String>,
    }

    let mut units = Vec::new();
    for (topic_name, topic_bucket) in tree {
        for (subtopic_name, subtopic_bucket) in &topic_bucket.subtopics {
            units.push(Unit {
                topic_name: topic_name.clone(),
                subtopic_name: subtopic_name.clone(),
                claims: subtopic_bucket.claims.clone(),
                total: subtopic_bucket.total,
                speakers: subtopic_bucket.speakers.clone(),
            });
        }
    }

    let completer = completer.clone();
    let llm = llm.clone();

    let results = pool
        .map(units, token, move |_idx, unit| {
            let completer = completer.clone();
            let llm = llm.clone();
            async move {
                let dedup_result = dedup_subtopic(&completer, &llm, &unit.claims, supports_json_mode).await;
                (unit, dedup_result)
            }
        })
        .await?;

    let mut total_usage = TokenUsage::default();
    let mut by_topic: indexmap::IndexMap<String, Vec<(String, SubtopicRecord)>> = indexmap::IndexMap::new();
    let mut topic_speakers: HashMap<String, std::collections::BTreeSet<String>> = HashMap::new();
    let mut topic_total: HashMap<String, usize> = HashMap::new();

    for (unit, dedup_result) in results {
        let (canonicals, usage) = dedup_result?;
        total_usage += usage;

        let mut speaker_list: Vec<String> = unit.speakers.iter().cloned().collect();
        speaker_list.sort();

        let record = SubtopicRecord {
            claims: canonicals,
            speakers: speaker_list,
            counts: Counts {
                claims: unit.total,
                speakers: unit.speakers.len(),
            },
        };

        topic_speakers
            .entry(unit.topic_name.clone())
            .or_default()
            .extend(unit.speakers.iter().cloned());
        *topic_total.entry(unit.topic_name.clone()).or_default() += unit.total;

        by_topic
            .entry(unit.topic_name.clone())
            .or_default()
            .push((unit.subtopic_name.clone(), record));
    }

    let mut sorted_tree: SortedTree = Vec::new();
    for (topic_name, mut subtopic_records) in by_topic {
        subtopic_records.sort_by(|a, b| {
            let ka = sort_key_value(sort_key, &a.1.counts);
            let kb = sort_key_value(sort_key, &b.1.counts);
            kb.cmp(&ka)
        });

        let speakers = topic_speakers.remove(&topic_name).unwrap_or_default();
        let mut speaker_list: Vec<String> = speakers.iter().cloned().collect();
        speaker_list.sort();

        let topic_record = TopicRecord {
            topics: subtopic_records,
            speakers: speaker_list,
            counts: Counts {
                claims: *topic_total.get(&topic_name).unwrap_or(&0),
                speakers: speakers.len(),
            },
        };
        sorted_tree.push((topic_name, topic_record));
    }

    sorted_tree.sort_by(|a, b| {
        let ka = sort_key_value(sort_key, &a.1.counts);
        let kb = sort_key_value(sort_key, &b.1.counts);
        kb.cmp(&ka)
    });

    let cost = token_cost(&llm.model_name, total_usage.prompt_tokens, total_usage.completion_tokens);

    Ok(StageResult {
        data: sorted_tree,
        usage: total_usage,
        cost,
    })
}
