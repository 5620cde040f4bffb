//! Full KGroot pipeline scenarios: raw Kubernetes events through extraction,
//! graph construction, and root-cause ranking.

use async_trait::async_trait;
use proptest::prelude::*;
use std::sync::Arc;

use faultline::domain::errors::DomainResult;
use faultline::domain::ports::ClusterApi;
use faultline::kgroot::{
    dedup_and_sort, CorrelationConfig, CorrelationEngine, EventExtractor, FpgBuilder, KgEvent,
    RelationKind, RootCauseAnalyzer, Severity,
};

fn k8s_event(name: &str, kind: &str, reason: &str, message: &str, ts: &str) -> serde_json::Value {
    serde_json::json!({
        "metadata": { "name": format!("{name}.{reason}") },
        "involvedObject": { "kind": kind, "name": name, "namespace": "default" },
        "reason": reason,
        "message": message,
        "type": "Warning",
        "lastTimestamp": ts,
    })
}

/// Image pull failure cascade on one pod.
struct ImagePullCluster;

#[async_trait]
impl ClusterApi for ImagePullCluster {
    async fn list_warning_events(
        &self,
        _cluster_context: &str,
        _namespace: &str,
        kind: &str,
        name: &str,
    ) -> DomainResult<Vec<serde_json::Value>> {
        if kind != "Pod" || name != "web-1" {
            return Ok(vec![]);
        }
        Ok(vec![
            k8s_event("web-1", "Pod", "InvalidImageName", "couldn't parse image reference", "2024-06-01T09:00:00Z"),
            k8s_event("web-1", "Pod", "ErrImagePull", "Failed to pull image \"web:latst\"", "2024-06-01T09:00:01Z"),
            k8s_event("web-1", "Pod", "BackOff", "Back-off restarting failed container", "2024-06-01T09:00:02Z"),
        ])
    }

    async fn get_resource(
        &self,
        _cluster_context: &str,
        _namespace: &str,
        _kind: &str,
        _name: &str,
    ) -> DomainResult<Option<serde_json::Value>> {
        Ok(None)
    }
}

fn heuristic_builder() -> FpgBuilder {
    FpgBuilder::new(CorrelationEngine::heuristic_only(CorrelationConfig::default()))
}

#[tokio::test]
async fn test_image_pull_cascade_end_to_end() {
    let extractor = EventExtractor::new(Arc::new(ImagePullCluster));
    let events = extractor
        .extract_from_resource("pods", "web-1", "default", "prod")
        .await
        .unwrap();

    // Raw reasons were normalized into the abstract taxonomy
    let types: Vec<&str> = events.iter().map(|e| e.abstract_type.as_str()).collect();
    assert_eq!(types, vec!["INVALID_IMAGE_NAME", "IMAGE_PULL_FAILURE", "POD_CRASH_LOOP"]);
    assert!(events.iter().all(|e| e.severity == Severity::Critical));

    let fpg = heuristic_builder().build(events).await;

    // Two causal edges chain the cascade together
    let causal: Vec<_> = fpg.edges.iter().filter(|e| e.relation == RelationKind::Causal).collect();
    assert_eq!(causal.len(), 2);
    assert_eq!(fpg.root_causes.len(), 1);
    assert!(fpg.root_causes[0].contains("InvalidImageName"));

    let report = RootCauseAnalyzer::heuristic_only().analyze(&fpg, None).await;
    assert_eq!(report.ranked_causes[0].event.abstract_type, "INVALID_IMAGE_NAME");
    assert!(
        report
            .recommendations
            .iter()
            .any(|r| r.to_lowercase().contains("image")),
        "recommendations: {:?}",
        report.recommendations
    );
    assert!(report.matched_pattern.is_some());
}

#[tokio::test]
async fn test_zero_events_completes_with_generic_recommendation() {
    let fpg = heuristic_builder().build(Vec::new()).await;
    let report = RootCauseAnalyzer::heuristic_only().analyze(&fpg, None).await;
    assert!(report.ranked_causes.is_empty());
    assert!(report.propagation_chain.is_empty());
    assert!(!report.recommendations.is_empty());
}

// ============================================================================
// Property-style invariants
// ============================================================================

fn arbitrary_event(seed: (u8, u8, u8)) -> KgEvent {
    use chrono::TimeZone;
    let (type_idx, loc_idx, offset) = seed;
    let types = ["OOM_KILLED", "POD_CRASH_LOOP", "MEMORY_PRESSURE", "SCHEDULING_FAILURE", "DNS_FAILURE"];
    let locations = ["pod:a", "pod:b", "node:w1"];
    let base = chrono::Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    KgEvent {
        id: format!("e-{type_idx}-{loc_idx}-{offset}"),
        timestamp: base + chrono::Duration::seconds(i64::from(offset)),
        raw_type: types[type_idx as usize % types.len()].to_string(),
        abstract_type: types[type_idx as usize % types.len()].to_string(),
        location: locations[loc_idx as usize % locations.len()].to_string(),
        severity: Severity::Warning,
        details: Default::default(),
        raw_message: None,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Dedup keys are unique after dedup_and_sort, and output is sorted.
    #[test]
    fn prop_dedup_unique_and_sorted(seeds in proptest::collection::vec((0u8..5, 0u8..3, 0u8..60), 0..24)) {
        let events: Vec<KgEvent> = seeds.into_iter().map(arbitrary_event).collect();
        let out = dedup_and_sort(events);

        let mut keys = std::collections::HashSet::new();
        for event in &out {
            prop_assert!(keys.insert(event.dedup_key()), "duplicate key {}", event.dedup_key());
        }
        for pair in out.windows(2) {
            prop_assert!(pair[0].timestamp <= pair[1].timestamp);
        }
    }

    /// Ranking the same graph twice yields the same order, and a node is a
    /// root cause exactly when it has no incoming causal edge.
    #[test]
    fn prop_ranking_stable_and_roots_consistent(
        seeds in proptest::collection::vec((0u8..5, 0u8..3, 0u8..60), 1..12)
    ) {
        let events: Vec<KgEvent> = seeds.into_iter().map(arbitrary_event).collect();
        let events = dedup_and_sort(events);

        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        runtime.block_on(async {
            let fpg = heuristic_builder().build(events).await;

            for node in &fpg.nodes {
                let has_incoming_causal = fpg
                    .incoming_edges(&node.id)
                    .any(|e| e.relation == RelationKind::Causal);
                assert_eq!(fpg.root_causes.contains(&node.id), !has_incoming_causal);
            }

            let analyzer = RootCauseAnalyzer::heuristic_only();
            let first = analyzer.analyze(&fpg, None).await;
            let second = analyzer.analyze(&fpg, None).await;
            let ids = |report: &faultline::kgroot::RootCauseReport| {
                report.ranked_causes.iter().map(|c| c.event.id.clone()).collect::<Vec<_>>()
            };
            assert_eq!(ids(&first), ids(&second));
        });
    }
}
