use experts::{ExpertKind, TaskKind, TriageSource};
use extract::testing::ScriptedCompletion;
use extract::{CompletionError, ContentCache, ExtractionEngine, RetryPolicy};
use ingest::DocumentText;
use pipeline::{ExpertStatus, Orchestrator, PipelineConfig, PipelineError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

const AU_PARAGRAPH: &str = "Sample AX-12 assayed 3.4 ppm Au near Location Zeta";

const TRIAGE: &str = "experienced analyst of geological reports";
const SPATIAL: &str = "GIS specialist";
const GEOCHEM: &str = "You are a geochemist";
const TEXTUAL: &str = "Extract entities and relationships";
const METADATA: &str = "bibliographic metadata";

const SPATIAL_REPLY: &str = r#"```json
{"spatial_features": [{"name": "Location Zeta", "geometry_type": "Point", "coordinates": "-7.1, 30.2", "confidence_score": 0.8}]}
```"#;

const GEOCHEM_REPLY: &str = r#"{"geochemical_conclusions": [{
    "conclusion_text": "Gold mineralization near Location Zeta",
    "rock_type": "quartz vein",
    "geochemical_affinity": "auriferous",
    "supporting_evidence": [{"element": "Au", "value": "3.4", "unit": "ppm", "sample_id": "AX-12"}],
    "confidence_score": 0.85
}]}"#;

const TEXTUAL_REPLY: &str = r#"{"entities": [
    {"id": "E1", "name": "AX-12", "type": "SAMPLE"},
    {"id": "E2", "name": "Location Zeta", "type": "LOCATION"}
], "relations": [{"source": "E1", "target": "E2", "relation": "collected near"}]}"#;

const METADATA_REPLY: &str = r#"{"title": null, "authors": [], "publication_year": null}"#;

fn scripted() -> ScriptedCompletion {
    ScriptedCompletion::new()
        .when(SPATIAL, SPATIAL_REPLY)
        .when(TEXTUAL, TEXTUAL_REPLY)
        .when(METADATA, METADATA_REPLY)
}

fn orchestrator(service: Arc<ScriptedCompletion>, config: &PipelineConfig) -> Orchestrator {
    let engine = ExtractionEngine::new(
        service,
        Some(Arc::new(ContentCache::in_memory())),
        RetryPolicy::immediate(),
    );
    Orchestrator::new(engine, config)
}

fn au_document() -> DocumentText {
    DocumentText::from_text("zeta.txt", AU_PARAGRAPH.to_string())
}

#[tokio::test]
async fn test_au_paragraph_end_to_end() {
    // No triage rule: the model classification fails and the heuristic takes over
    let service = Arc::new(scripted().when(GEOCHEM, GEOCHEM_REPLY));
    let knowledge = orchestrator(service.clone(), &PipelineConfig::default())
        .run(&au_document())
        .await;

    assert_eq!(knowledge.triage_source, TriageSource::Heuristic);
    assert!(knowledge
        .content_index
        .units
        .iter()
        .any(|u| u.has_keyword("geochemistry")));
    assert!(knowledge.tasks.iter().any(|t| t.kind == TaskKind::Geochemical));

    let evidence = &knowledge.geochemical.conclusions[0].evidence;
    assert_eq!(evidence.len(), 1);
    assert_eq!(evidence[0].element, "Au");
    assert_eq!(evidence[0].value.as_number(), Some(3.4));

    assert!(knowledge.validation.domain_consistency.is_valid);
    assert_eq!(knowledge.spatial.features[0].coordinates, Some(vec![[-7.1, 30.2]]));
    // "quartz vein - auriferous" shares no token with "Location Zeta"; only the text relation links
    assert_eq!(knowledge.summary.graph_edges, 1);
    assert_eq!(
        knowledge.run_for(ExpertKind::Tabular).unwrap().status,
        ExpertStatus::NotRequested
    );
    assert_eq!(
        knowledge.run_for(ExpertKind::Geochemical).unwrap().status,
        ExpertStatus::Succeeded
    );
    assert_eq!(service.calls_matching(TRIAGE), PipelineConfig::default().extraction.max_attempts);
}

#[tokio::test]
async fn test_empty_document_yields_empty_knowledge() {
    let service = Arc::new(scripted());
    let doc = DocumentText::from_text("blank.txt", " \n\n\t ".to_string());

    let knowledge = orchestrator(service.clone(), &PipelineConfig::default())
        .run(&doc)
        .await;

    assert_eq!(service.call_count(), 0);
    assert_eq!(knowledge.overall_confidence, 0.0);
    assert!(knowledge.tasks.is_empty());
    assert!(knowledge.spatial.features.is_empty());
    assert!(knowledge.geochemical.conclusions.is_empty());
    assert!(knowledge.tabular.tables.is_empty());
    assert!(knowledge.records.is_empty());
    assert!(knowledge.metadata.is_none());
}

#[tokio::test]
async fn test_failing_expert_does_not_block_siblings() {
    let service = Arc::new(
        scripted().when_error(GEOCHEM, CompletionError::Transport("connection reset".to_string())),
    );

    let knowledge = orchestrator(service, &PipelineConfig::default())
        .run(&au_document())
        .await;

    let geochem = knowledge.run_for(ExpertKind::Geochemical).unwrap();
    assert_eq!(geochem.status, ExpertStatus::Failed);
    assert!(geochem.detail.as_deref().unwrap().contains("connection reset"));
    assert!(knowledge.geochemical.conclusions.is_empty());

    assert_eq!(knowledge.run_for(ExpertKind::Spatial).unwrap().status, ExpertStatus::Succeeded);
    assert_eq!(knowledge.spatial.features.len(), 1);
    assert_eq!(knowledge.textual.entities.len(), 2);
    assert!(!knowledge.validation.domain_consistency.is_valid);
    assert!(knowledge.overall_confidence > 0.0);
}

#[tokio::test]
async fn test_timed_out_expert_does_not_block_siblings() {
    let mut config = PipelineConfig::default();
    config.concurrency.expert_timeout_secs = 1;
    let service = Arc::new(scripted().when_slow(GEOCHEM, GEOCHEM_REPLY, Duration::from_secs(30)));

    let started = Instant::now();
    let knowledge = orchestrator(service, &config).run(&au_document()).await;

    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(
        knowledge.run_for(ExpertKind::Geochemical).unwrap().status,
        ExpertStatus::TimedOut
    );
    assert_eq!(knowledge.spatial.features.len(), 1);
    assert_eq!(knowledge.textual.relations.len(), 1);
}

#[tokio::test]
async fn test_cancellation_aborts_in_flight_experts() {
    let service = Arc::new(scripted().when_slow(GEOCHEM, GEOCHEM_REPLY, Duration::from_secs(30)));
    let orchestrator = orchestrator(service, &PipelineConfig::default());
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let result = orchestrator.run_with_cancellation(&au_document(), &cancel).await;

    assert!(matches!(result, Err(PipelineError::Cancelled)));
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn test_second_run_served_from_cache() {
    let service = Arc::new(scripted().when(GEOCHEM, GEOCHEM_REPLY).when(
        TRIAGE,
        r#"{"content_units": [{"page_number": 1, "content_type": "text",
            "description": "Assay result near Location Zeta",
            "keywords": ["geochemistry", "location"], "confidence_score": 0.9}]}"#,
    ));
    let orchestrator = orchestrator(service.clone(), &PipelineConfig::default());
    let doc = au_document();

    let first = orchestrator.run(&doc).await;
    let calls_after_first = service.call_count();
    let second = orchestrator.run(&doc).await;

    assert!(calls_after_first > 0);
    assert_eq!(service.call_count(), calls_after_first);
    assert_eq!(first.triage_source, TriageSource::Model);
    assert_ne!(first.knowledge_id, second.knowledge_id);
    assert_eq!(
        serde_json::to_value(&first.records).unwrap(),
        serde_json::to_value(&second.records).unwrap()
    );
}

#[tokio::test]
async fn test_unreadable_document_is_fatal() {
    let service = Arc::new(scripted());
    let dir = tempfile::tempdir().unwrap();

    let result = orchestrator(service, &PipelineConfig::default())
        .run_file(&dir.path().join("missing.txt"))
        .await;

    assert!(matches!(result, Err(PipelineError::DocumentUnavailable { .. })));
}
