//! Shared analysis errors.
//!
//! `InsufficientData` is non-fatal by contract: the caller is expected to
//! retry once more history is available. Detector-specific rejections and
//! no-signal outcomes live with their modules — only genuinely shared
//! failures belong here.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalysisError {
    /// Fewer bars supplied than the analysis window requires.
    #[error("insufficient data: need {needed} bars, got {got}")]
    InsufficientData { needed: usize, got: usize },
}
