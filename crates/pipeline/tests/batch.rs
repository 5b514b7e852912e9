use extract::testing::ScriptedCompletion;
use extract::{ExtractionEngine, RetryPolicy};
use pipeline::{run_batch, Orchestrator, PipelineConfig};
use std::sync::Arc;

#[tokio::test]
async fn test_batch_records_per_file_outcomes() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    std::fs::write(
        input.path().join("a.txt"),
        "Sample AX-12 assayed 3.4 ppm Au near Location Zeta",
    )
    .unwrap();
    std::fs::write(input.path().join("b.txt"), [0xff, 0xfe, 0x00, 0xc3]).unwrap();
    std::fs::write(input.path().join("notes.pdf"), "skipped").unwrap();

    // Every call fails; a.txt still yields low-confidence knowledge
    let service = Arc::new(ScriptedCompletion::new());
    let engine = ExtractionEngine::new(service, None, RetryPolicy::immediate());
    let orchestrator = Orchestrator::new(engine, &PipelineConfig::default());

    let report = run_batch(&orchestrator, input.path(), output.path())
        .await
        .unwrap();

    assert_eq!(report.total_files, 2);
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(report.success_rate, 0.5);

    let failed = report.files.iter().find(|f| !f.succeeded).unwrap();
    assert!(failed.file.ends_with("b.txt"));
    assert!(failed.error.is_some());

    assert!(output.path().join("a_knowledge.json").exists());
    assert!(output.path().join("a_records.json").exists());
    assert!(!output.path().join("b_knowledge.json").exists());

    let saved: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(output.path().join("batch_report.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(saved["total_files"], 2);
}
