// src/analysis/combiner.rs

use std::collections::HashSet;

use serde::Serialize;
use tracing::info;

use crate::models::{OffTargetCandidate, SearchHit, Strand};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateRow {
    pub id: u32,
    #[serde(flatten)]
    pub candidate: OffTargetCandidate,
}

/// Final, ordered off-target table. Ids are 1-based and follow row order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateTable {
    rows: Vec<CandidateRow>,
}

impl CandidateTable {
    pub fn rows(&self) -> &[CandidateRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CandidateRow> {
        self.rows.iter()
    }
}

/// Merges the resolved plus- and minus-strand hits into one table sorted by
/// mismatch count, then chromosome, then start.
///
/// The two inputs come from independent strand searches, so a locus can only
/// repeat within one input; repeats are dropped before ids are assigned.
pub fn combine(plus: &[SearchHit], minus: &[SearchHit]) -> CandidateTable {
    let mut seen = HashSet::new();
    let mut candidates: Vec<OffTargetCandidate> = plus
        .iter()
        .map(|hit| (hit, Strand::Plus))
        .chain(minus.iter().map(|hit| (hit, Strand::Minus)))
        .filter(|(hit, _)| seen.insert(hit.locus_key()))
        .map(|(hit, source)| OffTargetCandidate::from_hit(hit, source))
        .collect();

    candidates.sort_by(|a, b| {
        a.mismatch_count
            .cmp(&b.mismatch_count)
            .then_with(|| a.chrom.cmp(&b.chrom))
            .then_with(|| a.start.cmp(&b.start))
    });

    let rows: Vec<CandidateRow> = candidates
        .into_iter()
        .zip(1u32..)
        .map(|(candidate, id)| CandidateRow { id, candidate })
        .collect();

    info!(
        "Combined {} plus and {} minus candidate(s) into {} row(s)",
        plus.len(),
        minus.len(),
        rows.len()
    );
    CandidateTable { rows }
}
