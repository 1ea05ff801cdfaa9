// src/error.rs

use std::path::PathBuf;

use polars::error::PolarsError;
use thiserror::Error;

use crate::models::Strand;

pub type Result<T, E = OffTargetError> = std::result::Result<T, E>;

/// Every way a pipeline run can fail or degrade.
///
/// `InvalidInput` and `SearchUnavailable` abort a run. `IntersectionUnavailable`
/// and `AnnotationUnavailable` are normally absorbed by the pipeline (pairwise
/// fallback, unannotated output) and only escape when nothing else can be done.
#[derive(Debug, Error)]
pub enum OffTargetError {
    #[error("invalid input: {constraint}")]
    InvalidInput { constraint: String },

    #[error("search unavailable for {strand} strand query {query} after {attempts} attempt(s): {cause}")]
    SearchUnavailable {
        strand: Strand,
        query: String,
        attempts: u32,
        cause: String,
    },

    #[error("interval intersection unavailable: {cause}")]
    IntersectionUnavailable { cause: String },

    #[error("annotation unavailable: {cause}")]
    AnnotationUnavailable { cause: String },

    #[error("invalid configuration in {path:?}: {cause}")]
    Config { path: PathBuf, cause: String },

    #[error("failed to export table: {0}")]
    Export(#[from] PolarsError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl OffTargetError {
    pub fn invalid_input(constraint: impl Into<String>) -> Self {
        OffTargetError::InvalidInput {
            constraint: constraint.into(),
        }
    }

    pub fn intersection(cause: impl std::fmt::Display) -> Self {
        OffTargetError::IntersectionUnavailable {
            cause: cause.to_string(),
        }
    }

    pub fn annotation(cause: impl std::fmt::Display) -> Self {
        OffTargetError::AnnotationUnavailable {
            cause: cause.to_string(),
        }
    }

    /// Fatal errors abort the run; the rest degrade the output.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            OffTargetError::IntersectionUnavailable { .. }
                | OffTargetError::AnnotationUnavailable { .. }
        )
    }

    /// Pipeline stage the error belongs to, used in user-facing reports.
    pub fn stage(&self) -> &'static str {
        match self {
            OffTargetError::InvalidInput { .. } => "sequence preparation",
            OffTargetError::SearchUnavailable { .. } => "candidate search",
            OffTargetError::IntersectionUnavailable { .. } => "overlap resolution",
            OffTargetError::AnnotationUnavailable { .. } => "annotation join",
            OffTargetError::Config { .. } => "configuration",
            OffTargetError::Export(_) | OffTargetError::Io(_) => "export",
        }
    }
}
