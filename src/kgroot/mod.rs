//! KGroot root-cause analysis pipeline.
//!
//! Event extraction from cluster resources, hybrid pairwise correlation,
//! fault-propagation-graph construction, and pattern-based root-cause
//! ranking.

pub mod analyzer;
pub mod correlation;
pub mod event;
pub mod extractor;
pub mod fpg;
pub mod patterns;
pub mod taxonomy;

pub use analyzer::{AnalysisMethod, PatternMatch, RankedCause, RootCauseAnalyzer, RootCauseReport};
pub use correlation::{Correlation, CorrelationConfig, CorrelationEngine, Method, RelationKind};
pub use event::{dedup_and_sort, KgEvent, Severity};
pub use extractor::EventExtractor;
pub use fpg::{FaultPropagationGraph, FpgBuilder, FpgEdge};
pub use patterns::{CausalPattern, FailurePattern, CAUSAL_PATTERNS, FAILURE_PATTERNS};
