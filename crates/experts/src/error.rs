use thiserror::Error;

use crate::types::ExpertKind;

#[derive(Debug, Clone, Error)]
pub enum ExpertError {
    /// Every extraction the expert attempted came back as a failure
    #[error("{expert} expert: all {calls} extraction calls failed, last error: {last_error}")]
    AllCallsFailed {
        expert: ExpertKind,
        calls: usize,
        last_error: String,
    },
}
