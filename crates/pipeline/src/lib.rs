pub mod batch;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod output;

pub use batch::{run_batch, BatchReport, FileOutcome};
pub use config::{OperationMode, PipelineConfig, Provider};
pub use error::PipelineError;
pub use orchestrator::Orchestrator;
pub use output::{save_results, SavedResults};

pub use synthesis::{ExpertStatus, SynthesizedKnowledge};
