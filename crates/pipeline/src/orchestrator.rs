use experts::{
    extract_metadata, required_experts, AnalysisTask, ContentIndex, ExpertError, ExpertFinding,
    ExpertKind, Experts, Librarian,
};
use extract::{CompletionService, ContentCache, ExtractionEngine, GeminiClient, OllamaClient};
use ingest::DocumentText;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use synthesis::{ExpertRun, ExpertStatus, SynthesisInput, SynthesizedKnowledge, Synthesizer};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::{PipelineConfig, Provider};
use crate::error::PipelineError;

enum ExpertOutcome {
    Finished(Result<ExpertFinding, ExpertError>),
    TimedOut,
}

/// Runs the three phases over one document.
///
/// Holds no per-run state; one instance can serve many documents, and a
/// credential change means building a new instance.
#[derive(Clone)]
pub struct Orchestrator {
    engine: ExtractionEngine,
    librarian: Librarian,
    experts: Experts,
    synthesizer: Synthesizer,
    max_attempts: usize,
    expert_timeout: Duration,
    max_concurrent_experts: usize,
}

impl Orchestrator {
    pub fn new(engine: ExtractionEngine, config: &PipelineConfig) -> Self {
        Self {
            librarian: Librarian::new(engine.clone(), config.triage_settings()),
            experts: Experts::new(engine.clone(), config.expert_settings()),
            synthesizer: Synthesizer::new(),
            engine,
            max_attempts: config.extraction.max_attempts,
            expert_timeout: config.expert_timeout(),
            max_concurrent_experts: config.concurrency.max_concurrent_experts.max(1),
        }
    }

    /// Build the completion client and cache the config asks for.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, PipelineError> {
        let completion = &config.completion;
        let service: Arc<dyn CompletionService> = match completion.provider {
            Provider::Ollama => Arc::new(OllamaClient::new(
                completion.base_url.clone(),
                completion.model.clone(),
                completion.request_timeout(),
            )),
            Provider::Gemini => {
                let api_key = completion
                    .resolve_api_key()
                    .ok_or(PipelineError::MissingApiKey)?;
                Arc::new(GeminiClient::new(
                    completion.base_url.clone(),
                    completion.model.clone(),
                    api_key,
                    completion.request_timeout(),
                ))
            }
        };

        let cache = if config.cache.enabled {
            Some(Arc::new(ContentCache::open(&config.cache.dir)?))
        } else {
            None
        };

        info!(
            provider = service.name(),
            model = %completion.model,
            cache = config.cache.enabled,
            mode = ?config.mode,
            "Orchestrator ready"
        );

        let engine = ExtractionEngine::new(service, cache, config.retry_policy());
        Ok(Self::new(engine, config))
    }

    pub fn engine(&self) -> &ExtractionEngine {
        &self.engine
    }

    /// Read a document and run it. Failing to read is the one fatal error.
    pub async fn run_file(&self, path: &Path) -> Result<SynthesizedKnowledge, PipelineError> {
        let doc = ingest::ingest_file(path)
            .await
            .map_err(|source| PipelineError::DocumentUnavailable {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(self.run(&doc).await)
    }

    /// Like [`run`](Self::run), but stops as soon as `cancel` fires.
    ///
    /// Dropping the run aborts the Phase 2 tasks and any completion calls in
    /// flight. Cache entries already written stay valid.
    pub async fn run_with_cancellation(
        &self,
        doc: &DocumentText,
        cancel: &CancellationToken,
    ) -> Result<SynthesizedKnowledge, PipelineError> {
        tokio::select! {
            knowledge = self.run(doc) => Ok(knowledge),
            _ = cancel.cancelled() => {
                warn!(source = %doc.source, "Pipeline run cancelled");
                Err(PipelineError::Cancelled)
            }
        }
    }

    /// Always returns knowledge; failures only lower its confidence.
    pub async fn run(&self, doc: &DocumentText) -> SynthesizedKnowledge {
        let started = Instant::now();
        info!(source = %doc.source, chunks = doc.chunks.len(), "Pipeline run starting");
        if doc.is_blank() {
            warn!(source = %doc.source, "Document has no text");
        }

        // Phase 1
        let triage = self.librarian.triage(doc).await;
        let required = required_experts(&triage.tasks);
        info!(
            source = ?triage.index.source,
            tasks = triage.tasks.len(),
            experts = ?required,
            "Phase 1 complete"
        );

        // Phase 2
        let (findings, runs) = self
            .run_experts(doc, &triage.index, &triage.tasks, &required)
            .await;

        // Phase 3
        let metadata = extract_metadata(&self.engine, doc, self.max_attempts).await;
        let knowledge = self.synthesizer.synthesize(SynthesisInput {
            source_document: doc.source.clone(),
            triage,
            findings,
            runs,
            metadata,
        });

        info!(
            source = %doc.source,
            knowledge_id = %knowledge.knowledge_id,
            overall_confidence = knowledge.overall_confidence,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Pipeline run complete"
        );
        knowledge
    }

    /// Run every required expert concurrently, each under its own timeout.
    ///
    /// Returns one finding and one run record per expert kind, in kind
    /// order, whatever order the tasks finished in.
    async fn run_experts(
        &self,
        doc: &DocumentText,
        index: &ContentIndex,
        tasks: &[AnalysisTask],
        required: &[ExpertKind],
    ) -> (Vec<ExpertFinding>, Vec<ExpertRun>) {
        let doc = Arc::new(doc.clone());
        let index = Arc::new(index.clone());
        let tasks: Arc<[AnalysisTask]> = tasks.into();
        let permits = Arc::new(Semaphore::new(self.max_concurrent_experts));

        let mut join_set = JoinSet::new();
        for &kind in required {
            let experts = self.experts.clone();
            let doc = Arc::clone(&doc);
            let index = Arc::clone(&index);
            let tasks = Arc::clone(&tasks);
            let permits = Arc::clone(&permits);
            let timeout = self.expert_timeout;

            join_set.spawn(async move {
                let _permit = permits.acquire_owned().await;
                let started = Instant::now();
                info!(expert = %kind, "Expert starting");

                let outcome =
                    match tokio::time::timeout(timeout, experts.analyze(kind, &doc, &index, &tasks))
                        .await
                    {
                        Ok(result) => ExpertOutcome::Finished(result),
                        Err(_) => ExpertOutcome::TimedOut,
                    };
                (kind, outcome, started.elapsed())
            });
        }

        let mut slots: BTreeMap<ExpertKind, (ExpertFinding, ExpertRun)> = BTreeMap::new();
        while let Some(joined) = join_set.join_next().await {
            let (kind, outcome, elapsed) = match joined {
                Ok(done) => done,
                Err(e) => {
                    error!(error = %e, "Expert task aborted");
                    continue;
                }
            };
            slots.insert(kind, settle(kind, outcome, elapsed));
        }

        let mut findings = Vec::new();
        let mut runs = Vec::new();
        for kind in ExpertKind::ALL {
            let (finding, run) = match slots.remove(&kind) {
                Some(slot) => slot,
                None if required.contains(&kind) => (
                    ExpertFinding::empty(kind),
                    ExpertRun {
                        expert: kind,
                        status: ExpertStatus::Failed,
                        detail: Some("expert task aborted".to_string()),
                        elapsed_ms: 0,
                    },
                ),
                None => {
                    runs.push(ExpertRun::not_requested(kind));
                    continue;
                }
            };
            findings.push(finding);
            runs.push(run);
        }

        (findings, runs)
    }
}

/// Turn a finished (or abandoned) expert task into its finding and run record.
fn settle(kind: ExpertKind, outcome: ExpertOutcome, elapsed: Duration) -> (ExpertFinding, ExpertRun) {
    let elapsed_ms = elapsed.as_millis() as u64;
    let run = |status, detail| ExpertRun {
        expert: kind,
        status,
        detail,
        elapsed_ms,
    };

    match outcome {
        ExpertOutcome::Finished(Ok(finding)) => {
            let status = if finding.is_empty() {
                ExpertStatus::Empty
            } else {
                ExpertStatus::Succeeded
            };
            info!(expert = %kind, status = ?status, elapsed_ms, "Expert finished");
            (finding, run(status, None))
        }
        ExpertOutcome::Finished(Err(e)) => {
            warn!(expert = %kind, error = %e, elapsed_ms, "Expert failed, continuing without it");
            (ExpertFinding::empty(kind), run(ExpertStatus::Failed, Some(e.to_string())))
        }
        ExpertOutcome::TimedOut => {
            warn!(expert = %kind, elapsed_ms, "Expert timed out, continuing without it");
            (
                ExpertFinding::empty(kind),
                run(ExpertStatus::TimedOut, Some(format!("timed out after {} ms", elapsed_ms))),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use extract::testing::ScriptedCompletion;
    use extract::RetryPolicy;
    use experts::SpatialFinding;

    #[test]
    fn test_settle_statuses() {
        let elapsed = Duration::from_millis(12);

        let (_, run) = settle(
            ExpertKind::Spatial,
            ExpertOutcome::Finished(Ok(ExpertFinding::Spatial(SpatialFinding::default()))),
            elapsed,
        );
        assert_eq!(run.status, ExpertStatus::Empty);

        let (finding, run) = settle(ExpertKind::Tabular, ExpertOutcome::TimedOut, elapsed);
        assert_eq!(run.status, ExpertStatus::TimedOut);
        assert_eq!(run.elapsed_ms, 12);
        assert!(finding.is_empty());

        let (_, run) = settle(
            ExpertKind::Geochemical,
            ExpertOutcome::Finished(Err(ExpertError::AllCallsFailed {
                expert: ExpertKind::Geochemical,
                calls: 2,
                last_error: "completion service unreachable".to_string(),
            })),
            elapsed,
        );
        assert_eq!(run.status, ExpertStatus::Failed);
        assert!(run.detail.unwrap().contains("all 2 extraction calls failed"));
    }

    #[tokio::test]
    async fn test_no_required_experts_all_not_requested() {
        let service = Arc::new(ScriptedCompletion::new());
        let engine = ExtractionEngine::new(service.clone(), None, RetryPolicy::immediate());
        let orchestrator = Orchestrator::new(engine, &PipelineConfig::default());
        let doc = DocumentText::from_text("blank.txt", "   \n\n  ".to_string());

        let knowledge = orchestrator.run(&doc).await;

        assert_eq!(service.call_count(), 0);
        assert_eq!(knowledge.expert_runs.len(), ExpertKind::ALL.len());
        assert!(knowledge
            .expert_runs
            .iter()
            .all(|r| r.status == ExpertStatus::NotRequested));
    }

    #[test]
    fn test_from_config_without_cache() {
        let config = PipelineConfig {
            cache: crate::config::CacheConfig {
                enabled: false,
                ..crate::config::CacheConfig::default()
            },
            ..PipelineConfig::default()
        };

        let orchestrator = Orchestrator::from_config(&config).unwrap();
        assert!(orchestrator.engine().cache().is_none());
    }

    #[test]
    fn test_blank_api_key_rejected() {
        let config = PipelineConfig {
            completion: crate::config::CompletionConfig {
                api_key: Some("  ".to_string()),
                ..crate::config::CompletionConfig::gemini()
            },
            ..PipelineConfig::default()
        };

        assert!(matches!(
            Orchestrator::from_config(&config),
            Err(PipelineError::MissingApiKey)
        ));
    }
}
