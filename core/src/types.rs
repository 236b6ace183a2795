use std::collections::BTreeSet;
use std::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};

/// The reserved subtopic name used as a fallback when a claim's taxonomy
/// placement cannot be resolved to a real subtopic.
pub const GENERAL_SUBTOPIC: &str = "General";

/// Placeholder subtopic key for a topic that Stage 2 never actually placed
/// a claim under. Preserved for compatibility with the system this was
/// distilled from even though the key is a little ambiguous.
pub const NONE_SUBTOPIC: &str = "None";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub text: String,
    pub speaker: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subtopic {
    #[serde(rename = "subtopicName")]
    pub name: String,
    #[serde(rename = "subtopicShortDescription")]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topic {
    #[serde(rename = "topicName")]
    pub name: String,
    #[serde(rename = "topicShortDescription")]
    pub description: String,
    pub subtopics: Vec<Subtopic>,
}

/// Wrapper matching the object shape a taxonomy-producing model call
/// returns: `{"taxonomy": [...]}`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Taxonomy {
    pub taxonomy: Vec<Topic>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claim {
    pub text: String,
    pub quote: String,
    #[serde(rename = "topicName")]
    pub topic_name: String,
    #[serde(rename = "subtopicName")]
    pub subtopic_name: String,
    #[serde(rename = "commentId")]
    pub comment_id: String,
    pub speaker: String,
    #[serde(default)]
    pub duplicates: Vec<Claim>,
    #[serde(default)]
    pub duplicated: bool,
    /// Fields present in the model's claim object that this crate doesn't
    /// model explicitly. Preserved verbatim so a round-trip to JSON doesn't
    /// silently drop data the caller may rely on.
    #[serde(default, flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Claim {
    pub fn canonical_copy(&self) -> Claim {
        Claim {
            duplicates: Vec::new(),
            duplicated: false,
            ..self.clone()
        }
    }

    pub fn as_duplicate(&self) -> Claim {
        Claim {
            duplicates: Vec::new(),
            duplicated: true,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SubtopicBucket {
    pub claims: Vec<Claim>,
    pub total: usize,
    pub speakers: BTreeSet<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TopicBucket {
    pub subtopics: indexmap::IndexMap<String, SubtopicBucket>,
    pub total: usize,
    pub speakers: BTreeSet<String>,
}

pub type ClaimTree = indexmap::IndexMap<String, TopicBucket>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Counts {
    pub claims: usize,
    pub speakers: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtopicRecord {
    pub claims: Vec<Claim>,
    pub speakers: Vec<String>,
    pub counts: Counts,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicRecord {
    pub topics: Vec<(String, SubtopicRecord)>,
    pub speakers: Vec<String>,
    pub counts: Counts,
}

pub type SortedTree = Vec<(String, TopicRecord)>;

/// Deterministic bijection between speaker names and stringified numeric
/// ids, used to anonymize prompts sent during crux analysis.
#[derive(Debug, Clone, Default)]
pub struct SpeakerMap {
    name_to_id: indexmap::IndexMap<String, String>,
}

impl SpeakerMap {
    pub fn from_claim_tree(tree: &ClaimTree) -> Self {
        let mut speakers = BTreeSet::new();
        for topic in tree.values() {
            for subtopic in topic.subtopics.values() {
                for claim in &subtopic.claims {
                    speakers.insert(claim.speaker.clone());
                }
            }
        }
        let mut name_to_id = indexmap::IndexMap::new();
        for (i, name) in speakers.into_iter().enumerate() {
            name_to_id.insert(name, i.to_string());
        }
        SpeakerMap { name_to_id }
    }

    pub fn id_of(&self, speaker: &str) -> Option<&str> {
        self.name_to_id.get(speaker).map(|s| s.as_str())
    }

    pub fn sorted_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.name_to_id.values().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.name_to_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.name_to_id.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CruxRow {
    #[serde(rename = "cruxClaim")]
    pub crux_claim: String,
    pub agree: Vec<String>,
    pub disagree: Vec<String>,
    pub explanation: String,
}

/// Symmetric, zero-diagonal matrix of pairwise controversy scores.
/// Serializes as a bare 2D array, not `{"rows": [...]}` .
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ControversyMatrix {
    pub rows: Vec<Vec<f64>>,
}

impl ControversyMatrix {
    pub fn zeros(n: usize) -> Self {
        ControversyMatrix {
            rows: vec![vec![0.0; n]; n],
        }
    }

    pub fn set_symmetric(&mut self, i: usize, j: usize, value: f64) {
        self.rows[i][j] = value;
        self.rows[j][i] = value;
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.rows[i][j]
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopCrux {
    pub score: f64,
    #[serde(rename = "cruxA")]
    pub crux_a: CruxRow,
    #[serde(rename = "cruxB")]
    pub crux_b: CruxRow,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(rename = "modelName")]
    pub model_name: String,
    #[serde(rename = "systemPrompt")]
    pub system_prompt: String,
    #[serde(rename = "userPrompt")]
    pub user_prompt: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CompletionOptions {
    pub json_mode: bool,
    pub thinking: bool,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        TokenUsage {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

impl Add for TokenUsage {
    type Output = TokenUsage;
    fn add(self, rhs: TokenUsage) -> TokenUsage {
        TokenUsage {
            prompt_tokens: self.prompt_tokens + rhs.prompt_tokens,
            completion_tokens: self.completion_tokens + rhs.completion_tokens,
            total_tokens: self.total_tokens + rhs.total_tokens,
        }
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: TokenUsage) {
        *self = *self + rhs;
    }
}

/// Newtype so a bare `f64` cost never gets conflated with an arbitrary
/// float in a function signature.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, PartialOrd)]
pub struct Money(pub f64);

impl Add for Money {
    type Output = Money;
    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        self.0 += rhs.0;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult<T> {
    pub data: T,
    pub usage: TokenUsage,
    pub cost: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CruxReport {
    #[serde(rename = "cruxClaims")]
    pub crux_claims: Vec<CruxRow>,
    #[serde(rename = "controversyMatrix")]
    pub controversy_matrix: ControversyMatrix,
    #[serde(rename = "topCruxes")]
    pub top_cruxes: Vec<TopCrux>,
    pub usage: TokenUsage,
    pub cost: Money,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    NumPeople,
    NumClaims,
}

impl std::str::FromStr for SortKey {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "numPeople" => Ok(SortKey::NumPeople),
            "numClaims" => Ok(SortKey::NumClaims),
            _ => Err(()),
        }
    }
}
