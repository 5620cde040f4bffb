//! Hybrid event correlation engine.
//!
//! Classifies the relationship between two chronologically ordered events
//! through three tiers: the curated pattern library, temporal/location
//! heuristics, and LLM escalation for low-confidence pairs. The pattern and
//! heuristic tiers are pure; given the same inputs and thresholds they always
//! return the same result.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::event::KgEvent;
use super::patterns::CAUSAL_PATTERNS;
use crate::domain::ports::{ChatMessage, CompletionRequest, LlmClient};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationKind {
    Causal,
    Sequential,
    None,
}

impl RelationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Causal => "causal",
            Self::Sequential => "sequential",
            Self::None => "none",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "causal" => Some(Self::Causal),
            "sequential" => Some(Self::Sequential),
            "none" => Some(Self::None),
            _ => None,
        }
    }
}

/// Which tier produced a classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Heuristic,
    Pattern,
    Llm,
}

/// Result of classifying one event pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Correlation {
    pub relation: RelationKind,
    pub confidence: f64,
    pub reasoning: String,
    pub method: Method,
    pub time_diff_secs: f64,
    pub same_location: bool,
}

#[derive(Debug, Clone)]
pub struct CorrelationConfig {
    /// Below this confidence the engine escalates to the LLM.
    pub llm_escalation_threshold: f64,
    /// Same-location gap treated as immediate causation.
    pub immediate_causation_secs: i64,
    /// Same-location gap treated as a sequential relation.
    pub short_term_causation_secs: i64,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            llm_escalation_threshold: 0.6,
            immediate_causation_secs: 5,
            short_term_causation_secs: 30,
        }
    }
}

/// Schema for the LLM's constrained relationship response.
fn relationship_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "relationship": { "type": "string", "enum": ["causal", "sequential", "none"] },
            "confidence": { "type": "number", "minimum": 0.0, "maximum": 1.0 },
            "reasoning": { "type": "string" }
        },
        "required": ["relationship", "confidence", "reasoning"],
        "additionalProperties": false
    })
}

pub struct CorrelationEngine {
    llm: Option<Arc<dyn LlmClient>>,
    model: String,
    config: CorrelationConfig,
}

impl CorrelationEngine {
    /// Heuristic-only engine; never escalates to an LLM.
    pub fn heuristic_only(config: CorrelationConfig) -> Self {
        Self { llm: None, model: String::new(), config }
    }

    pub fn new(llm: Arc<dyn LlmClient>, model: impl Into<String>, config: CorrelationConfig) -> Self {
        Self { llm: Some(llm), model: model.into(), config }
    }

    /// Classify the relation between `a` (earlier) and `b` (later).
    pub async fn classify(&self, a: &KgEvent, b: &KgEvent, context: &[KgEvent]) -> Correlation {
        let time_diff = (b.timestamp - a.timestamp).num_milliseconds() as f64 / 1000.0;
        let same_location = a.location == b.location;

        // Identical signatures at the same instant can never be causal; a
        // self-edge here would manufacture a cycle out of duplicate
        // observations.
        if time_diff == 0.0 && same_location && a.abstract_type == b.abstract_type {
            return Correlation {
                relation: RelationKind::None,
                confidence: 0.9,
                reasoning: "Identical event signature at the same instant".to_string(),
                method: Method::Heuristic,
                time_diff_secs: time_diff,
                same_location,
            };
        }

        let heuristic = self.apply_rules(a, b, time_diff, same_location);
        if heuristic.confidence >= self.config.llm_escalation_threshold {
            return heuristic;
        }

        if let Some(llm) = &self.llm {
            match self.classify_with_llm(llm.as_ref(), a, b, context).await {
                Ok(result) => return result,
                Err(err) => {
                    tracing::warn!(error = %err, "LLM classification failed, using heuristic result");
                }
            }
        }

        heuristic
    }

    /// Tiers 1 and 2. The pattern library is consulted first so that a
    /// specific known relation beats the generic temporal rule.
    fn apply_rules(&self, a: &KgEvent, b: &KgEvent, time_diff: f64, same_location: bool) -> Correlation {
        for pattern in CAUSAL_PATTERNS {
            if pattern.from_event == a.abstract_type
                && pattern.to_event == b.abstract_type
                && time_diff <= pattern.max_time_diff_secs as f64
                && (!pattern.same_location || same_location)
            {
                return Correlation {
                    relation: RelationKind::Causal,
                    confidence: pattern.confidence,
                    reasoning: format!("Matched known pattern: {}", pattern.name),
                    method: Method::Pattern,
                    time_diff_secs: time_diff,
                    same_location,
                };
            }
        }

        if same_location {
            if time_diff <= self.config.immediate_causation_secs as f64 {
                return Correlation {
                    relation: RelationKind::Causal,
                    confidence: 0.75,
                    reasoning: format!(
                        "Same location, immediate succession (<{}s)",
                        self.config.immediate_causation_secs
                    ),
                    method: Method::Heuristic,
                    time_diff_secs: time_diff,
                    same_location,
                };
            }
            if time_diff <= self.config.short_term_causation_secs as f64 {
                return Correlation {
                    relation: RelationKind::Sequential,
                    confidence: 0.6,
                    reasoning: format!(
                        "Same location, short time gap (<{}s)",
                        self.config.short_term_causation_secs
                    ),
                    method: Method::Heuristic,
                    time_diff_secs: time_diff,
                    same_location,
                };
            }
        }

        Correlation {
            relation: RelationKind::None,
            confidence: 0.4,
            reasoning: "No heuristic match found".to_string(),
            method: Method::Heuristic,
            time_diff_secs: time_diff,
            same_location,
        }
    }

    async fn classify_with_llm(
        &self,
        llm: &dyn LlmClient,
        a: &KgEvent,
        b: &KgEvent,
        context: &[KgEvent],
    ) -> Result<Correlation, crate::domain::ports::LlmError> {
        let time_diff = (b.timestamp - a.timestamp).num_milliseconds() as f64 / 1000.0;
        let same_location = a.location == b.location;

        tracing::debug!(
            from = %a.abstract_type,
            to = %b.abstract_type,
            "escalating relationship classification to LLM"
        );

        let prompt = build_relationship_prompt(a, b, context);
        let request = CompletionRequest::new(
            self.model.clone(),
            vec![
                ChatMessage::system(
                    "You are a Kubernetes fault analysis expert. Classify the relationship \
                     between two cluster events as causal, sequential, or none.",
                ),
                ChatMessage::user(prompt),
            ],
        )
        .with_temperature(0.1);

        let value = llm
            .complete_structured(request, "event_relationship", relationship_schema())
            .await?;

        let relation = value
            .get("relationship")
            .and_then(|v| v.as_str())
            .and_then(RelationKind::from_str)
            .unwrap_or(RelationKind::None);
        let confidence = value.get("confidence").and_then(serde_json::Value::as_f64).unwrap_or(0.5);
        let reasoning = value
            .get("reasoning")
            .and_then(|v| v.as_str())
            .unwrap_or("LLM classification")
            .to_string();

        Ok(Correlation {
            relation,
            confidence: confidence.clamp(0.0, 1.0),
            reasoning,
            method: Method::Llm,
            time_diff_secs: time_diff,
            same_location,
        })
    }
}

fn build_relationship_prompt(a: &KgEvent, b: &KgEvent, context: &[KgEvent]) -> String {
    let time_diff = (b.timestamp - a.timestamp).num_milliseconds() as f64 / 1000.0;
    let mut prompt = format!(
        "Event A (earlier):\n\
         - Type: {}\n- Time: {}\n- Location: {}\n- Message: {}\n\n\
         Event B (later):\n\
         - Type: {}\n- Time: {}\n- Location: {}\n- Message: {}\n\n\
         Time difference: {:.1} seconds\nSame location: {}\n\n\
         Classify the relationship:\n\
         1. causal: Event A directly caused Event B to occur\n\
         2. sequential: Event A happened before B, but did not cause it\n\
         3. none: No meaningful relationship\n\n\
         Consider temporal proximity, shared location, known Kubernetes \
         failure patterns, and whether A can realistically cause B.",
        a.abstract_type,
        a.timestamp.to_rfc3339(),
        a.location,
        a.raw_message.as_deref().unwrap_or("-"),
        b.abstract_type,
        b.timestamp.to_rfc3339(),
        b.location,
        b.raw_message.as_deref().unwrap_or("-"),
        time_diff,
        a.location == b.location,
    );
    if !context.is_empty() {
        let types: Vec<&str> = context.iter().map(|e| e.abstract_type.as_str()).collect();
        prompt.push_str(&format!("\n\nSurrounding events: {}", types.join(", ")));
    }
    prompt
}
