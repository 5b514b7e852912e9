use extract::{ContextItem, ExtractionEngine, ExtractionRequest, ExtractionResult, Schema};
use ingest::DocumentText;
use std::collections::BTreeSet;
use tracing::{debug, warn};

use crate::error::ExpertError;
use crate::types::{AnalysisTask, ExpertKind};

/// A chunk picked for analysis, with its 0-based position in the document.
#[derive(Debug, Clone, PartialEq)]
pub struct Passage {
    pub index: usize,
    pub text: String,
}

/// Chunks an expert should look at: those its tasks point to, plus those
/// the `signal` predicate flags. Task locations claim the `cap` first and
/// signal chunks fill what is left. Returned in document order.
pub fn select_passages(
    doc: &DocumentText,
    tasks: &[AnalysisTask],
    expert: ExpertKind,
    signal: fn(&str) -> bool,
    cap: usize,
) -> Vec<Passage> {
    let mut picked: BTreeSet<usize> = BTreeSet::new();

    let located = tasks
        .iter()
        .filter(|t| t.target == expert)
        .flat_map(|t| t.locations.iter())
        .filter_map(|loc| loc.checked_sub(1))
        .filter(|i| *i < doc.chunks.len());
    let flagged = doc
        .chunks
        .iter()
        .enumerate()
        .filter(|(_, chunk)| signal(chunk))
        .map(|(i, _)| i);

    for i in located.chain(flagged) {
        if picked.len() >= cap {
            break;
        }
        picked.insert(i);
    }

    picked
        .into_iter()
        .map(|i| Passage {
            index: i,
            text: doc.chunks[i].clone(),
        })
        .collect()
}

/// Run one extraction per passage.
///
/// Individual failures are skipped; only a run where every call failed is an
/// error. No passages means no calls and an empty result.
pub async fn extract_each<S: Schema>(
    engine: &ExtractionEngine,
    expert: ExpertKind,
    prompt: &str,
    passages: &[Passage],
    max_attempts: usize,
) -> Result<Vec<(usize, S)>, ExpertError> {
    let mut replies = Vec::new();
    let mut last_error = None;

    for passage in passages {
        let request = ExtractionRequest::new(prompt, vec![ContextItem::text(passage.text.clone())]);

        match engine.extract::<S>(&request, max_attempts).await {
            ExtractionResult::Success { value, from_cache, .. } => {
                debug!(expert = %expert, passage = passage.index, from_cache, "Passage extracted");
                replies.push((passage.index, value));
            }
            ExtractionResult::Failed { attempts, last_error: error } => {
                warn!(expert = %expert, passage = passage.index, attempts, error = %error, "Skipping passage");
                last_error = Some(error);
            }
        }
    }

    match last_error {
        Some(last_error) if replies.is_empty() => Err(ExpertError::AllCallsFailed {
            expert,
            calls: passages.len(),
            last_error,
        }),
        _ => Ok(replies),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TaskKind;

    fn task(target: ExpertKind, locations: Vec<usize>) -> AnalysisTask {
        AnalysisTask {
            task_id: "task_001".to_string(),
            kind: TaskKind::Spatial,
            target,
            priority: 1,
            unit_ids: Vec::new(),
            locations,
            instructions: String::new(),
        }
    }

    #[test]
    fn test_union_of_task_locations_and_signal() {
        let text = "First paragraph with nothing special.\n\n\
                    Second paragraph mentions a fault line.\n\n\
                    Third paragraph is plain prose again.";
        let doc = DocumentText::from_text("d.txt", text.to_string());
        let tasks = vec![task(ExpertKind::Spatial, vec![3, 99])];

        let picked = select_passages(&doc, &tasks, ExpertKind::Spatial, |t| t.contains("fault"), 10);
        let indices: Vec<usize> = picked.iter().map(|p| p.index).collect();

        assert_eq!(indices, vec![1, 2]);
    }

    #[test]
    fn test_other_experts_tasks_ignored_and_cap() {
        let text = "alpha paragraph number one here\n\nalpha paragraph number two here";
        let doc = DocumentText::from_text("d.txt", text.to_string());
        let tasks = vec![task(ExpertKind::Tabular, vec![1])];

        assert!(select_passages(&doc, &tasks, ExpertKind::Spatial, |_| false, 10).is_empty());
        assert_eq!(select_passages(&doc, &[], ExpertKind::Spatial, |_| true, 1).len(), 1);
    }

    #[test]
    fn test_task_locations_claim_the_cap_first() {
        let text = "A fault crosses the first paragraph.\n\n\
                    A fault crosses the second paragraph.\n\n\
                    The third paragraph holds the assay table.";
        let doc = DocumentText::from_text("d.txt", text.to_string());
        let tasks = vec![task(ExpertKind::Spatial, vec![3])];

        let picked = select_passages(&doc, &tasks, ExpertKind::Spatial, |t| t.contains("fault"), 2);
        let indices: Vec<usize> = picked.iter().map(|p| p.index).collect();

        assert_eq!(indices, vec![0, 2]);
    }
}
