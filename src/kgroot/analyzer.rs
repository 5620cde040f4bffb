//! Root-cause pattern matching and ranking.
//!
//! Matches the graph's event-type sequence against the failure-pattern
//! library, ranks root causes by temporal and graph proximity to the alarm
//! event, and assembles recommendations.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

use super::correlation::RelationKind;
use super::event::KgEvent;
use super::fpg::FaultPropagationGraph;
use super::patterns::{FailurePattern, FAILURE_PATTERNS, TYPE_RECOMMENDATIONS};
use crate::domain::ports::{ChatMessage, CompletionRequest, LlmClient};

/// Similarity below which a pattern match is discarded.
const MATCH_THRESHOLD: f64 = 0.3;
/// Similarity below which the analyzer asks the LLM to verify the match.
const LLM_VERIFY_THRESHOLD: f64 = 0.7;
/// Ranking weights: time proximity and graph distance, equally weighted.
const TIME_WEIGHT: f64 = 0.5;
const DISTANCE_WEIGHT: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMethod {
    HybridHeuristic,
    HybridLlm,
}

/// Result of matching the FPG against one library pattern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternMatch {
    pub pattern_name: String,
    pub similarity: f64,
    pub matched_by: String,
    pub reasoning: String,
}

/// One root cause with its ranking breakdown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedCause {
    pub event: KgEvent,
    pub rank_score: f64,
    pub time_rank: f64,
    pub distance_rank: f64,
    /// Strongest outgoing causal-edge confidence; tie-break key.
    pub confidence: f64,
    pub reasoning: String,
}

/// Final analyzer output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootCauseReport {
    pub ranked_causes: Vec<RankedCause>,
    pub propagation_chain: Vec<KgEvent>,
    pub matched_pattern: Option<PatternMatch>,
    pub recommendations: Vec<String>,
    pub confidence: f64,
    pub method: AnalysisMethod,
}

pub struct RootCauseAnalyzer {
    llm: Option<Arc<dyn LlmClient>>,
    model: String,
}

impl RootCauseAnalyzer {
    pub fn heuristic_only() -> Self {
        Self { llm: None, model: String::new() }
    }

    pub fn new(llm: Arc<dyn LlmClient>, model: impl Into<String>) -> Self {
        Self { llm: Some(llm), model: model.into() }
    }

    /// Analyze a built FPG. `chat_history` is the investigation transcript,
    /// forwarded to the LLM verification step for context.
    pub async fn analyze(&self, fpg: &FaultPropagationGraph, chat_history: Option<&str>) -> RootCauseReport {
        let structural = match_by_structure(fpg);
        let mut method = AnalysisMethod::HybridHeuristic;

        let best_match = match structural.first() {
            Some(best) if best.similarity > LLM_VERIFY_THRESHOLD => Some(best.clone()),
            Some(best) => {
                if let Some(llm) = &self.llm {
                    method = AnalysisMethod::HybridLlm;
                    match self.verify_with_llm(llm.as_ref(), fpg, best, chat_history).await {
                        Ok(Some(verified)) => Some(verified),
                        _ => Some(best.clone()),
                    }
                } else {
                    Some(best.clone())
                }
            }
            None => None,
        };

        let ranked_causes = rank_root_causes(fpg);
        let propagation_chain = primary_chain(fpg);
        let recommendations = build_recommendations(best_match.as_ref(), &ranked_causes);
        let confidence = best_match.as_ref().map_or(0.5, |m| m.similarity);

        RootCauseReport {
            ranked_causes,
            propagation_chain,
            matched_pattern: best_match,
            recommendations,
            confidence,
            method,
        }
    }

    /// Ask the LLM whether the low-confidence structural match actually
    /// fits. Bounded to one structured call; any failure falls back to the
    /// structural match.
    async fn verify_with_llm(
        &self,
        llm: &dyn LlmClient,
        fpg: &FaultPropagationGraph,
        candidate: &PatternMatch,
        chat_history: Option<&str>,
    ) -> Result<Option<PatternMatch>, crate::domain::ports::LlmError> {
        let sequence = event_type_sequence(fpg).join(" -> ");
        let mut prompt = format!(
            "Observed Kubernetes failure sequence: {sequence}\n\
             Candidate pattern: {} (structural similarity {:.2})\n\
             Does the candidate pattern explain the observed sequence?",
            candidate.pattern_name, candidate.similarity,
        );
        if let Some(history) = chat_history {
            prompt.push_str("\n\nInvestigation context:\n");
            prompt.push_str(history);
        }

        let schema = serde_json::json!({
            "type": "object",
            "properties": {
                "matches": { "type": "boolean" },
                "confidence": { "type": "number", "minimum": 0.0, "maximum": 1.0 },
                "reasoning": { "type": "string" }
            },
            "required": ["matches", "confidence", "reasoning"],
            "additionalProperties": false
        });

        let request = CompletionRequest::new(
            self.model.clone(),
            vec![
                ChatMessage::system(
                    "You verify whether a Kubernetes failure pattern explains an observed \
                     event sequence.",
                ),
                ChatMessage::user(prompt),
            ],
        )
        .with_temperature(0.1);

        let value = llm.complete_structured(request, "pattern_verification", schema).await?;
        let matches = value.get("matches").and_then(serde_json::Value::as_bool).unwrap_or(false);
        if !matches {
            return Ok(None);
        }
        let confidence = value
            .get("confidence")
            .and_then(serde_json::Value::as_f64)
            .unwrap_or(candidate.similarity);
        let reasoning = value
            .get("reasoning")
            .and_then(|v| v.as_str())
            .unwrap_or("LLM verified")
            .to_string();
        Ok(Some(PatternMatch {
            pattern_name: candidate.pattern_name.clone(),
            similarity: confidence.clamp(0.0, 1.0),
            matched_by: "llm".to_string(),
            reasoning,
        }))
    }
}

/// First chain of maximal length, matching insertion order on ties.
fn longest_chain(chains: Vec<Vec<&KgEvent>>) -> Option<Vec<&KgEvent>> {
    let mut longest: Option<Vec<&KgEvent>> = None;
    for chain in chains {
        if longest.as_ref().map_or(true, |l| chain.len() > l.len()) {
            longest = Some(chain);
        }
    }
    longest
}

/// The event-type sequence to match: the longest causal chain. Only an
/// empty graph (no chains at all) falls back to the full node list; a
/// singleton chain still stands for itself.
fn event_type_sequence(fpg: &FaultPropagationGraph) -> Vec<String> {
    match longest_chain(fpg.causal_chains()) {
        Some(chain) => chain.iter().map(|e| e.abstract_type.clone()).collect(),
        None => fpg.nodes.iter().map(|e| e.abstract_type.clone()).collect(),
    }
}

/// Jaccard similarity over abstract-type sets.
fn sequence_similarity(a: &[String], b: &[&str]) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let set_a: HashSet<&str> = a.iter().map(String::as_str).collect();
    let set_b: HashSet<&str> = b.iter().copied().collect();
    let overlap = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    if union == 0 { 0.0 } else { overlap as f64 / union as f64 }
}

fn match_by_structure(fpg: &FaultPropagationGraph) -> Vec<PatternMatch> {
    let sequence = event_type_sequence(fpg);
    let mut matches: Vec<PatternMatch> = FAILURE_PATTERNS
        .iter()
        .filter_map(|pattern: &FailurePattern| {
            let similarity = sequence_similarity(&sequence, pattern.event_sequence);
            if similarity > MATCH_THRESHOLD {
                Some(PatternMatch {
                    pattern_name: pattern.name.to_string(),
                    similarity,
                    matched_by: "structure".to_string(),
                    reasoning: format!("Event sequence overlap: {similarity:.2}"),
                })
            } else {
                None
            }
        })
        .collect();
    matches.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
    matches
}

/// Rank root causes by `0.5 * time_rank + 0.5 * distance_rank` against the
/// alarm event (latest node). Ties break by descending edge confidence,
/// then earliest timestamp.
fn rank_root_causes(fpg: &FaultPropagationGraph) -> Vec<RankedCause> {
    let Some(alarm) = fpg.nodes.iter().max_by_key(|e| e.timestamp) else {
        return Vec::new();
    };

    let mut ranked: Vec<RankedCause> = fpg
        .root_causes
        .iter()
        .filter_map(|id| fpg.node(id))
        .map(|event| {
            let time_diff =
                (alarm.timestamp - event.timestamp).num_milliseconds().abs() as f64 / 1000.0;
            let time_rank = 1.0 / (1.0 + time_diff);

            let distance = fpg
                .shortest_path_len(&event.id, &alarm.id)
                .map_or(999.0, |d| d as f64);
            let distance_rank = 1.0 / (1.0 + distance);

            let confidence = fpg
                .outgoing_edges(&event.id)
                .filter(|e| e.relation == RelationKind::Causal)
                .map(|e| e.confidence)
                .fold(0.0_f64, f64::max);

            RankedCause {
                event: event.clone(),
                rank_score: TIME_WEIGHT * time_rank + DISTANCE_WEIGHT * distance_rank,
                time_rank,
                distance_rank,
                confidence,
                reasoning: format!("Time diff: {time_diff:.1}s, graph distance: {distance:.0}"),
            }
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.rank_score
            .total_cmp(&a.rank_score)
            .then_with(|| b.confidence.total_cmp(&a.confidence))
            .then_with(|| a.event.timestamp.cmp(&b.event.timestamp))
    });
    ranked
}

fn primary_chain(fpg: &FaultPropagationGraph) -> Vec<KgEvent> {
    longest_chain(fpg.causal_chains())
        .map(|chain| chain.into_iter().cloned().collect())
        .unwrap_or_default()
}

/// Pattern recommendations first, then abstract-type fallbacks for the top
/// cause, then generic guidance. Never empty.
fn build_recommendations(
    pattern_match: Option<&PatternMatch>,
    ranked: &[RankedCause],
) -> Vec<String> {
    let mut recommendations: Vec<String> = Vec::new();

    if let Some(matched) = pattern_match {
        if let Some(pattern) = FAILURE_PATTERNS.iter().find(|p| p.name == matched.pattern_name) {
            recommendations.extend(pattern.recommendations.iter().map(|r| (*r).to_string()));
        }
    }

    if let Some(top) = ranked.first() {
        for (event_type, recommendation) in TYPE_RECOMMENDATIONS {
            if *event_type == top.event.abstract_type
                && !recommendations.iter().any(|r| r == recommendation)
            {
                recommendations.push((*recommendation).to_string());
            }
        }
    }

    if recommendations.is_empty() {
        recommendations.push("Review pod logs and events for more details".to_string());
        recommendations.push("Check resource quotas and node capacity".to_string());
    }

    recommendations
}
