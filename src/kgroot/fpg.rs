//! Fault propagation graph construction.
//!
//! Implements the incremental FPG build: events are inserted in chronological
//! order, each classified against a bounded set of candidate predecessors,
//! and the best relation above the edge threshold becomes an edge. Root
//! causes are the nodes with no incoming causal edge.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

use super::correlation::{Correlation, CorrelationEngine, RelationKind};
use super::event::KgEvent;

/// Minimum classification confidence for an edge to be recorded.
const EDGE_CONFIDENCE_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FpgEdge {
    pub source: String,
    pub target: String,
    pub relation: RelationKind,
    /// Classifier confidence, kept for root-cause tie-breaking.
    pub confidence: f64,
}

/// Directed graph of fault propagation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FaultPropagationGraph {
    /// Insertion-ordered nodes (chronological, since the builder sorts).
    pub nodes: Vec<KgEvent>,
    pub edges: Vec<FpgEdge>,
    /// Ids of nodes with no incoming causal edge.
    pub root_causes: Vec<String>,
}

impl FaultPropagationGraph {
    pub fn node(&self, id: &str) -> Option<&KgEvent> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn incoming_edges<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a FpgEdge> + 'a {
        self.edges.iter().filter(move |e| e.target == id)
    }

    pub fn outgoing_edges<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a FpgEdge> + 'a {
        self.edges.iter().filter(move |e| e.source == id)
    }

    /// Recompute root causes: in-degree on causal edges equals zero.
    pub fn compute_root_causes(&mut self) {
        let causal_targets: HashSet<&str> = self
            .edges
            .iter()
            .filter(|e| e.relation == RelationKind::Causal)
            .map(|e| e.target.as_str())
            .collect();
        self.root_causes = self
            .nodes
            .iter()
            .filter(|n| !causal_targets.contains(n.id.as_str()))
            .map(|n| n.id.clone())
            .collect();
    }

    /// Causal chains from each root cause, following the first causal edge
    /// at each step.
    pub fn causal_chains(&self) -> Vec<Vec<&KgEvent>> {
        self.root_causes
            .iter()
            .filter_map(|root| {
                let chain = self.chain_from(root, &mut HashSet::new());
                if chain.is_empty() { None } else { Some(chain) }
            })
            .collect()
    }

    fn chain_from<'a>(&'a self, id: &str, visited: &mut HashSet<String>) -> Vec<&'a KgEvent> {
        if !visited.insert(id.to_string()) {
            return Vec::new();
        }
        let Some(node) = self.node(id) else {
            return Vec::new();
        };
        let mut chain = vec![node];
        if let Some(next) = self
            .outgoing_edges(id)
            .find(|e| e.relation == RelationKind::Causal)
            .map(|e| e.target.clone())
        {
            chain.extend(self.chain_from(&next, visited));
        }
        chain
    }

    /// Length of the longest causal path, in nodes.
    pub fn depth(&self) -> usize {
        self.root_causes
            .iter()
            .map(|root| self.path_length_from(root, &mut HashSet::new()))
            .max()
            .unwrap_or(0)
    }

    fn path_length_from(&self, id: &str, visited: &mut HashSet<String>) -> usize {
        if !visited.insert(id.to_string()) {
            return 0;
        }
        let children: Vec<&str> = self
            .outgoing_edges(id)
            .filter(|e| e.relation == RelationKind::Causal)
            .map(|e| e.target.as_str())
            .collect();
        if children.is_empty() {
            return 1;
        }
        1 + children
            .into_iter()
            .map(|child| self.path_length_from(child, &mut visited.clone()))
            .max()
            .unwrap_or(0)
    }

    /// Shortest path length in edges from `source` to `target` (BFS over all
    /// outgoing edges). `None` when unreachable.
    pub fn shortest_path_len(&self, source: &str, target: &str) -> Option<usize> {
        if source == target {
            return Some(0);
        }
        let adjacency: HashMap<&str, Vec<&str>> = self.edges.iter().fold(HashMap::new(), |mut acc, e| {
            acc.entry(e.source.as_str()).or_default().push(e.target.as_str());
            acc
        });
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([(source, 0usize)]);
        while let Some((current, distance)) = queue.pop_front() {
            if current == target {
                return Some(distance);
            }
            if !visited.insert(current) {
                continue;
            }
            for next in adjacency.get(current).into_iter().flatten() {
                if !visited.contains(next) {
                    queue.push_back((next, distance + 1));
                }
            }
        }
        None
    }
}

/// Builds an FPG from a set of events using the correlation engine.
pub struct FpgBuilder {
    engine: CorrelationEngine,
    /// Maximum candidate predecessors considered per inserted event.
    max_candidates: usize,
}

impl FpgBuilder {
    pub fn new(engine: CorrelationEngine) -> Self {
        Self { engine, max_candidates: 5 }
    }

    pub fn with_max_candidates(mut self, max_candidates: usize) -> Self {
        self.max_candidates = max_candidates.max(1);
        self
    }

    /// Build the graph. At most `N * max_candidates` classifications run.
    pub async fn build(&self, events: Vec<KgEvent>) -> FaultPropagationGraph {
        let mut sorted = events;
        sorted.sort_by_key(|e| e.timestamp);

        let mut fpg = FaultPropagationGraph::default();

        for event in sorted {
            if !fpg.is_empty() {
                if let Some((source_id, correlation)) = self.best_relation(&event, &fpg).await {
                    fpg.edges.push(FpgEdge {
                        source: source_id,
                        target: event.id.clone(),
                        relation: correlation.relation,
                        confidence: correlation.confidence,
                    });
                }
            }
            fpg.nodes.push(event);
        }

        fpg.compute_root_causes();
        fpg
    }

    /// Classify the new event against its candidates, keep the single
    /// highest-confidence result across all of them, then materialize an
    /// edge only when that best result is an actual relation above the
    /// threshold. A high-confidence `none` verdict therefore suppresses
    /// weaker causal candidates instead of being skipped over.
    async fn best_relation(
        &self,
        event: &KgEvent,
        fpg: &FaultPropagationGraph,
    ) -> Option<(String, Correlation)> {
        let candidates = self.candidates(event, fpg);
        let mut best: Option<(String, Correlation)> = None;

        for candidate in candidates {
            let result = self.engine.classify(candidate, event, &fpg.nodes).await;
            let better = best.as_ref().map_or(true, |(_, b)| result.confidence > b.confidence);
            if better {
                best = Some((candidate.id.clone(), result));
            }
        }

        best.filter(|(_, c)| {
            c.relation != RelationKind::None && c.confidence > EDGE_CONFIDENCE_THRESHOLD
        })
    }

    /// Candidate predecessors: strictly earlier events, same location first,
    /// then nearest in time, truncated to `max_candidates`.
    fn candidates<'a>(&self, event: &KgEvent, fpg: &'a FaultPropagationGraph) -> Vec<&'a KgEvent> {
        let mut earlier: Vec<&KgEvent> =
            fpg.nodes.iter().filter(|e| e.timestamp < event.timestamp).collect();
        earlier.sort_by_key(|e| {
            let delta = (event.timestamp - e.timestamp).num_milliseconds().abs();
            (e.location != event.location, delta)
        });
        earlier.truncate(self.max_candidates);
        earlier
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kgroot::correlation::CorrelationConfig;
    use crate::kgroot::event::test_event;

    fn builder() -> FpgBuilder {
        FpgBuilder::new(CorrelationEngine::heuristic_only(CorrelationConfig::default()))
    }

    #[tokio::test]
    async fn test_oom_cascade_scenario() {
        // MEMORY_PRESSURE -> OOM_KILLED -> POD_CRASH_LOOP on one pod
        let events = vec![
            test_event("MEMORY_PRESSURE", "pod:api-1", 0),
            test_event("OOM_KILLED", "pod:api-1", 3),
            test_event("POD_CRASH_LOOP", "pod:api-1", 5),
        ];
        let fpg = builder().build(events).await;

        assert_eq!(fpg.nodes.len(), 3);

        let edge1 = fpg
            .edges
            .iter()
            .find(|e| e.source.starts_with("MEMORY_PRESSURE") && e.target.starts_with("OOM_KILLED"))
            .expect("MEMORY_PRESSURE -> OOM_KILLED edge");
        assert_eq!(edge1.relation, RelationKind::Causal);
        assert!((edge1.confidence - 0.95).abs() < f64::EPSILON);

        let edge2 = fpg
            .edges
            .iter()
            .find(|e| e.source.starts_with("OOM_KILLED") && e.target.starts_with("POD_CRASH_LOOP"))
            .expect("OOM_KILLED -> POD_CRASH_LOOP edge");
        assert_eq!(edge2.relation, RelationKind::Causal);
        assert!((edge2.confidence - 0.98).abs() < f64::EPSILON);

        // Root cause is the memory pressure event only
        assert_eq!(fpg.root_causes.len(), 1);
        assert!(fpg.root_causes[0].starts_with("MEMORY_PRESSURE"));
    }

    #[tokio::test]
    async fn test_image_pull_scenario() {
        let events = vec![
            test_event("INVALID_IMAGE_NAME", "pod:x", 0),
            test_event("IMAGE_PULL_FAILURE", "pod:x", 1),
            test_event("POD_CRASH_LOOP", "pod:x", 2),
        ];
        let fpg = builder().build(events).await;

        let causal_count =
            fpg.edges.iter().filter(|e| e.relation == RelationKind::Causal).count();
        assert_eq!(causal_count, 2);
        assert_eq!(fpg.root_causes.len(), 1);
        assert!(fpg.root_causes[0].starts_with("INVALID_IMAGE_NAME"));
    }

    #[tokio::test]
    async fn test_root_cause_iff_no_incoming_causal() {
        let events = vec![
            test_event("MEMORY_PRESSURE", "pod:a", 0),
            test_event("OOM_KILLED", "pod:a", 3),
            test_event("SCHEDULING_FAILURE", "pod:unrelated", 500),
        ];
        let fpg = builder().build(events).await;

        for node in &fpg.nodes {
            let has_incoming_causal =
                fpg.incoming_edges(&node.id).any(|e| e.relation == RelationKind::Causal);
            assert_eq!(
                fpg.root_causes.contains(&node.id),
                !has_incoming_causal,
                "node {}",
                node.id
            );
        }
    }

    #[tokio::test]
    async fn test_empty_input() {
        let fpg = builder().build(Vec::new()).await;
        assert!(fpg.is_empty());
        assert!(fpg.root_causes.is_empty());
        assert_eq!(fpg.depth(), 0);
    }

    #[tokio::test]
    async fn test_depth_and_chains() {
        let events = vec![
            test_event("MEMORY_PRESSURE", "pod:api-1", 0),
            test_event("OOM_KILLED", "pod:api-1", 3),
            test_event("POD_CRASH_LOOP", "pod:api-1", 5),
        ];
        let fpg = builder().build(events).await;
        assert_eq!(fpg.depth(), 3);

        let chains = fpg.causal_chains();
        assert_eq!(chains.len(), 1);
        let types: Vec<&str> = chains[0].iter().map(|e| e.abstract_type.as_str()).collect();
        assert_eq!(types, vec!["MEMORY_PRESSURE", "OOM_KILLED", "POD_CRASH_LOOP"]);
    }

    #[tokio::test]
    async fn test_candidate_cap_bounds_work() {
        // 10 events at distinct far-apart locations: each insertion
        // considers at most K candidates, and no edges appear since nothing
        // correlates.
        let events: Vec<KgEvent> =
            (0..10).map(|i| test_event("UNRELATED", &format!("pod:p{i}"), i64::from(i) * 600)).collect();
        let fpg = FpgBuilder::new(CorrelationEngine::heuristic_only(CorrelationConfig::default()))
            .with_max_candidates(3)
            .build(events)
            .await;
        assert!(fpg.edges.is_empty());
        assert_eq!(fpg.root_causes.len(), 10);
    }

    #[tokio::test]
    async fn test_high_confidence_none_suppresses_weaker_edge() {
        // The incoming event has two candidate predecessors: an
        // identical-signature observation a few hundred microseconds
        // earlier (classified none at 0.9) and a genuine DNS_FAILURE
        // pattern match at 0.80. The none verdict wins on confidence, so
        // the event gets no edge at all rather than the weaker causal one.
        let dns = test_event("DNS_FAILURE", "pod:dns", 0);
        let first = test_event("HEALTH_CHECK_FAILURE", "pod:x", 5);
        let mut repeat = test_event("HEALTH_CHECK_FAILURE", "pod:x", 5);
        repeat.id = format!("{}-repeat", repeat.id);
        repeat.timestamp = repeat.timestamp + chrono::Duration::microseconds(300);

        let repeat_id = repeat.id.clone();
        let fpg = builder().build(vec![dns, first, repeat]).await;

        assert!(
            fpg.edges.iter().all(|e| e.target != repeat_id),
            "edges: {:?}",
            fpg.edges
        );
        assert!(fpg.root_causes.contains(&repeat_id));

        // Sanity: the earlier observation did get its DNS pattern edge
        assert!(fpg
            .edges
            .iter()
            .any(|e| e.source.starts_with("DNS_FAILURE") && e.relation == RelationKind::Causal));
    }

    #[tokio::test]
    async fn test_shortest_path() {
        let events = vec![
            test_event("MEMORY_PRESSURE", "pod:api-1", 0),
            test_event("OOM_KILLED", "pod:api-1", 3),
            test_event("POD_CRASH_LOOP", "pod:api-1", 5),
        ];
        let fpg = builder().build(events).await;
        let root = fpg.root_causes[0].clone();
        let leaf = fpg.nodes.last().unwrap().id.clone();
        assert_eq!(fpg.shortest_path_len(&root, &leaf), Some(2));
        assert_eq!(fpg.shortest_path_len(&leaf, &root), None);
        assert_eq!(fpg.shortest_path_len(&root, &root), Some(0));
    }
}
