//! Deterministic consensus scoring by token overlap.
//!
//! Positions are reduced to sets of content words and compared with Jaccard
//! similarity. Responses are grouped greedily: each joins the first cluster
//! whose representative it resembles and whose members share its stance tag.
//! Agreement blends the share of the largest cluster with the mean pairwise
//! similarity, minus a penalty for spread-out confidences.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;

use super::{
    ConsensusAssessment, ConsensusStrategy, ConsensusStrategyError, DisagreementPoint, Stance,
};
use crate::debate::types::AgentResponse;

/// Similarity at which two positions are considered the same.
const CLUSTER_THRESHOLD: f64 = 0.5;

/// Weight of the largest cluster's share.
const CLUSTER_WEIGHT: f64 = 0.6;

/// Weight of the mean pairwise similarity.
const SIMILARITY_WEIGHT: f64 = 0.4;

/// Multiplier for the confidence variance (at most 0.25 for values in [0, 1]).
const CONFIDENCE_PENALTY_WEIGHT: f64 = 0.4;

/// Maximum number of shared themes reported.
const MAX_THEMES: usize = 5;

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "all", "any", "can", "had", "her", "was",
    "one", "our", "out", "has", "have", "its", "into", "than", "that", "then", "them", "they",
    "this", "these", "those", "with", "will", "would", "should", "could", "from", "there",
    "their", "what", "when", "which", "while", "who", "whom", "why", "how", "been", "being",
    "also", "more", "most", "some", "such", "very", "just", "over", "only", "own", "same", "too",
    "about", "because", "does", "did", "doing", "each", "few", "both", "other", "were", "your",
    "may", "might", "must", "shall", "yet",
];

/// Token-overlap consensus strategy.
#[derive(Debug, Clone, Default)]
pub struct HeuristicStrategy;

impl HeuristicStrategy {
    pub fn new() -> Self {
        Self
    }

    /// Scores agreement among `responses`. Infallible.
    pub fn analyze(&self, responses: &[AgentResponse]) -> ConsensusAssessment {
        let n = responses.len();
        if n < 2 {
            return ConsensusAssessment {
                agreement_level: if n == 1 { 1.0 } else { 0.0 },
                common_points: responses.iter().map(|r| r.position.clone()).collect(),
                disagreement_points: Vec::new(),
                summary: format!("{} response(s); nothing to compare", n),
            };
        }

        let tokens: Vec<HashSet<String>> = responses.iter().map(|r| tokenize(&r.position)).collect();
        let similarity = |i: usize, j: usize| pair_similarity(&responses[i], &responses[j], &tokens[i], &tokens[j]);

        let clusters = cluster(responses, &similarity);
        let majority = largest_cluster(&clusters);
        let largest = clusters[majority].len();

        let mut pair_total = 0.0;
        let mut pairs = 0usize;
        for i in 0..n {
            for j in (i + 1)..n {
                pair_total += similarity(i, j);
                pairs += 1;
            }
        }
        let mean_similarity = pair_total / pairs as f64;
        let cluster_share = (largest - 1) as f64 / (n - 1) as f64;

        let agreement_level = (CLUSTER_WEIGHT * cluster_share + SIMILARITY_WEIGHT * mean_similarity
            - CONFIDENCE_PENALTY_WEIGHT * confidence_variance(responses))
        .clamp(0.0, 1.0);

        let mut common_points = Vec::new();
        if largest * 2 > n {
            let representative = &responses[clusters[majority][0]];
            common_points.push(format!(
                "{} of {} participants agree: {}",
                largest, n, representative.position
            ));
        }
        common_points.extend(
            shared_themes(&tokens)
                .into_iter()
                .map(|term| format!("Shared theme: {}", term)),
        );

        let representative = &responses[clusters[majority][0]];
        let disagreement_points: Vec<DisagreementPoint> = clusters
            .iter()
            .enumerate()
            .filter(|(index, _)| *index != majority)
            .map(|(_, members)| {
                let dissenters: Vec<&AgentResponse> = members.iter().map(|&m| &responses[m]).collect();
                let names: Vec<&str> = dissenters.iter().map(|r| r.agent_name.as_str()).collect();
                let mut stances = vec![Stance::of(representative)];
                stances.extend(dissenters.iter().map(|r| Stance::of(r)));
                DisagreementPoint {
                    description: format!(
                        "{} diverge{} from the position held by {}",
                        names.join(", "),
                        if names.len() == 1 { "s" } else { "" },
                        representative.agent_name
                    ),
                    stances,
                }
            })
            .collect();

        let summary = format!(
            "{} of {} participants share the leading position; {} divergent group(s); mean similarity {:.2}",
            largest,
            n,
            disagreement_points.len(),
            mean_similarity
        );

        ConsensusAssessment {
            agreement_level,
            common_points,
            disagreement_points,
            summary,
        }
    }
}

#[async_trait]
impl ConsensusStrategy for HeuristicStrategy {
    fn name(&self) -> &str {
        "heuristic"
    }

    async fn assess(
        &self,
        _topic: &str,
        responses: &[AgentResponse],
    ) -> Result<ConsensusAssessment, ConsensusStrategyError> {
        Ok(self.analyze(responses))
    }
}

/// Lowercased content words of at least three characters.
pub fn tokenize(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| word.chars().count() >= 3 && !STOPWORDS.contains(word))
        .map(str::to_string)
        .collect()
}

/// Jaccard similarity of two token sets. Two empty sets are identical.
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    intersection as f64 / union as f64
}

fn stances_conflict(a: &AgentResponse, b: &AgentResponse) -> bool {
    matches!((&a.stance, &b.stance), (Some(x), Some(y)) if x != y)
}

fn pair_similarity(
    a: &AgentResponse,
    b: &AgentResponse,
    tokens_a: &HashSet<String>,
    tokens_b: &HashSet<String>,
) -> f64 {
    if stances_conflict(a, b) {
        return 0.0;
    }
    if tokens_a.is_empty() && tokens_b.is_empty() {
        let same = a.position.trim().eq_ignore_ascii_case(b.position.trim());
        return if same { 1.0 } else { 0.0 };
    }
    jaccard(tokens_a, tokens_b)
}

/// Greedy clustering in participant order.
fn cluster<F>(responses: &[AgentResponse], similarity: &F) -> Vec<Vec<usize>>
where
    F: Fn(usize, usize) -> f64,
{
    let mut clusters: Vec<Vec<usize>> = Vec::new();

    for i in 0..responses.len() {
        let home = clusters.iter().position(|members| {
            similarity(members[0], i) >= CLUSTER_THRESHOLD
                && members
                    .iter()
                    .all(|&m| !stances_conflict(&responses[m], &responses[i]))
        });

        match home {
            Some(index) => clusters[index].push(i),
            None => clusters.push(vec![i]),
        }
    }

    clusters
}

/// Index of the largest cluster; the earliest wins ties.
fn largest_cluster(clusters: &[Vec<usize>]) -> usize {
    let mut best = 0;
    for (index, members) in clusters.iter().enumerate() {
        if members.len() > clusters[best].len() {
            best = index;
        }
    }
    best
}

fn confidence_variance(responses: &[AgentResponse]) -> f64 {
    let n = responses.len() as f64;
    let mean = responses.iter().map(|r| r.confidence).sum::<f64>() / n;
    responses
        .iter()
        .map(|r| (r.confidence - mean).powi(2))
        .sum::<f64>()
        / n
}

/// Terms present in a strict majority of positions, most frequent first.
fn shared_themes(tokens: &[HashSet<String>]) -> Vec<String> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for set in tokens {
        for term in set {
            *counts.entry(term.as_str()).or_insert(0) += 1;
        }
    }

    let mut themes: Vec<(&str, usize)> = counts
        .into_iter()
        .filter(|(_, count)| count * 2 > tokens.len())
        .collect();
    themes.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
    themes
        .into_iter()
        .take(MAX_THEMES)
        .map(|(term, _)| term.to_string())
        .collect()
}
