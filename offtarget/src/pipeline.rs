// src/pipeline.rs

use std::path::PathBuf;

use serde::Serialize;
use tracing::{info, warn};

use crate::analysis::{annotate, combine, AnnotationReference, CandidateTable};
use crate::error::{OffTargetError, Result};
use crate::filtering::{filter_pam, OverlapResolver, PamWindow};
use crate::intervals::{IntervalEngine, PairwiseEngine};
use crate::models::{AnnotatedCandidate, Strand};
use crate::search::{
    CandidateSearch, RetryPolicy, SearchCapability, DEFAULT_FULL_MISMATCHES,
    DEFAULT_SEED_MISMATCHES,
};
use crate::sequence_prep::{SequenceSpec, DEFAULT_PAM, DEFAULT_SEED_LENGTH};

/// Inputs of one off-target run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineRequest {
    pub spacer: String,
    pub seed_length: usize,
    pub pam: String,
    pub genome_assembly: String,
    pub full_mismatch_budget: u8,
    pub seed_mismatch_budget: u8,
}

impl PipelineRequest {
    /// SpCas9 defaults against hg38.
    pub fn new(spacer: impl Into<String>) -> Self {
        Self {
            spacer: spacer.into(),
            seed_length: DEFAULT_SEED_LENGTH,
            pam: DEFAULT_PAM.to_string(),
            genome_assembly: "hg38".to_string(),
            full_mismatch_budget: DEFAULT_FULL_MISMATCHES,
            seed_mismatch_budget: DEFAULT_SEED_MISMATCHES,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "count", rename_all = "snake_case")]
pub enum RunStatus {
    Candidates(usize),
    NoCandidates,
}

/// Record counts after each stage, per strand where it applies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StageCounts {
    pub plus_full_hits: usize,
    pub minus_full_hits: usize,
    pub plus_seed_hits: usize,
    pub minus_seed_hits: usize,
    pub plus_full_pam: usize,
    pub minus_full_pam: usize,
    pub plus_seed_pam: usize,
    pub minus_seed_pam: usize,
    pub plus_resolved: usize,
    pub minus_resolved: usize,
    pub candidates: usize,
    pub annotated_rows: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub spec: SequenceSpec,
    pub table: CandidateTable,
    /// `None` when annotation was not configured or could not be produced.
    pub annotated: Option<Vec<AnnotatedCandidate>>,
    pub status: RunStatus,
    pub counts: StageCounts,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone)]
enum AnnotationInput {
    Files { exons: PathBuf, introns: PathBuf },
    Loaded(AnnotationReference),
}

/// Wires the search capability, the interval engine and the optional
/// annotation reference into a single run.
pub struct Pipeline<'a> {
    search: &'a dyn SearchCapability,
    engine: &'a dyn IntervalEngine,
    annotation: Option<AnnotationInput>,
    retry: RetryPolicy,
    parallel: bool,
    fallback: PairwiseEngine,
    notes: Vec<String>,
}

impl<'a> Pipeline<'a> {
    pub fn new(search: &'a dyn SearchCapability, engine: &'a dyn IntervalEngine) -> Self {
        Self {
            search,
            engine,
            annotation: None,
            retry: RetryPolicy::default(),
            parallel: true,
            fallback: PairwiseEngine::default(),
            notes: Vec::new(),
        }
    }

    pub fn with_annotation_files(mut self, exons: PathBuf, introns: PathBuf) -> Self {
        self.annotation = Some(AnnotationInput::Files { exons, introns });
        self
    }

    pub fn with_annotation_reference(mut self, reference: AnnotationReference) -> Self {
        self.annotation = Some(AnnotationInput::Loaded(reference));
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn pairwise_limit(mut self, max_comparisons: u64) -> Self {
        self.fallback = PairwiseEngine { max_comparisons };
        self
    }

    /// Records a condition noticed while assembling the run (e.g. a
    /// replaced interval engine); it is reported with the outcome warnings.
    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.notes.push(warning.into());
        self
    }

    pub fn run(&self, request: &PipelineRequest) -> Result<PipelineOutcome> {
        let spec = SequenceSpec::new(&request.spacer, request.seed_length, &request.pam)?;
        let search = CandidateSearch::new(
            self.search,
            &request.genome_assembly,
            request.full_mismatch_budget,
            request.seed_mismatch_budget,
        )?
        .with_retry(self.retry)
        .parallel(self.parallel);

        let set = search.collect(&spec)?;
        let mut counts = StageCounts {
            plus_full_hits: set.plus_full.len(),
            minus_full_hits: set.minus_full.len(),
            plus_seed_hits: set.plus_seed.len(),
            minus_seed_hits: set.minus_seed.len(),
            ..StageCounts::default()
        };

        let full_window = PamWindow::SpacerAware(spec.spacer_length());
        let seed_window = PamWindow::SpacerAware(spec.seed_length());
        let resolver = OverlapResolver::new(self.engine, self.fallback);
        let mut warnings = self.notes.clone();
        let mut resolved = Vec::with_capacity(2);

        for strand in Strand::BOTH {
            let full = filter_pam(set.full(strand), spec.pam(), full_window);
            let seed = filter_pam(set.seed(strand), spec.pam(), seed_window);
            let resolution = resolver.resolve(&full, &seed)?;
            if let Some(reason) = resolution.fallback_reason {
                warnings.push(format!(
                    "{} strand overlap used pairwise fallback: {reason}",
                    strand.label()
                ));
            }
            match strand {
                Strand::Plus => {
                    counts.plus_full_pam = full.len();
                    counts.plus_seed_pam = seed.len();
                    counts.plus_resolved = resolution.hits.len();
                }
                Strand::Minus => {
                    counts.minus_full_pam = full.len();
                    counts.minus_seed_pam = seed.len();
                    counts.minus_resolved = resolution.hits.len();
                }
            }
            resolved.push(resolution.hits);
        }

        let table = combine(&resolved[0], &resolved[1]);
        counts.candidates = table.len();
        let status = if table.is_empty() {
            info!("No off-target candidates found for {}", spec.spacer());
            RunStatus::NoCandidates
        } else {
            RunStatus::Candidates(table.len())
        };

        let annotated = match self.annotate_table(&table) {
            Ok(rows) => rows,
            Err(err) => {
                warn!("Continuing without annotation: {}", err);
                warnings.push(err.to_string());
                None
            }
        };
        counts.annotated_rows = annotated.as_ref().map(Vec::len);

        Ok(PipelineOutcome {
            spec,
            table,
            annotated,
            status,
            counts,
            warnings,
        })
    }

    fn annotate_table(&self, table: &CandidateTable) -> Result<Option<Vec<AnnotatedCandidate>>> {
        let Some(input) = &self.annotation else {
            info!("No annotation reference configured; skipping annotation");
            return Ok(None);
        };
        let loaded;
        let reference = match input {
            AnnotationInput::Loaded(reference) => reference,
            AnnotationInput::Files { exons, introns } => {
                loaded = AnnotationReference::load(exons, introns)?;
                &loaded
            }
        };
        let rows = annotate(table, reference, self.engine, self.fallback).map_err(|err| match err {
            err @ OffTargetError::AnnotationUnavailable { .. } => err,
            other => OffTargetError::annotation(other),
        })?;
        let unannotated = table.len() - unique_ids(&rows);
        if unannotated > 0 {
            info!(
                "{} candidate(s) overlap no exon or intron and are absent from the annotated table",
                unannotated
            );
        }
        Ok(Some(rows))
    }
}

fn unique_ids(rows: &[AnnotatedCandidate]) -> usize {
    let mut ids: Vec<u32> = rows.iter().map(|row| row.id).collect();
    ids.sort_unstable();
    ids.dedup();
    ids.len()
}
