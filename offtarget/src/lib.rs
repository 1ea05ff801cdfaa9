//! Off-target candidate resolution for CRISPR-Cas9 guides.
//!
//! A guide is searched genome-wide (full guide+PAM and seed+PAM, both
//! strands), hits without an exact PAM are discarded, and full-length hits
//! are kept only where a seed hit lands on the same locus. The genome search
//! and the interval intersection are injected through [`SearchCapability`]
//! and [`IntervalEngine`].

pub mod analysis;
pub mod config;
pub mod error;
pub mod export;
pub mod filtering;
pub mod helper_functions;
pub mod intervals;
pub mod models;
pub mod pipeline;
pub mod search;
pub mod sequence_prep;

pub use analysis::{AnnotationReference, CandidateRow, CandidateTable};
pub use config::PipelineConfig;
pub use error::{OffTargetError, Result};
pub use intervals::{BedtoolsEngine, IntervalEngine, PairwiseEngine};
pub use models::{AnnotatedCandidate, CandidateSet, OffTargetCandidate, SearchHit, Strand};
pub use pipeline::{Pipeline, PipelineOutcome, PipelineRequest, RunStatus, StageCounts};
pub use search::{GgGenomeClient, LocalGenome, SearchCapability};
pub use sequence_prep::SequenceSpec;
