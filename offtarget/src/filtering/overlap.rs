// src/filtering/overlap.rs

use std::collections::{BTreeSet, HashSet};

use tracing::{debug, warn};

use crate::error::{OffTargetError, Result};
use crate::intervals::{BedRecord, IntervalEngine, PairwiseEngine};
use crate::models::SearchHit;

/// Outcome of resolving one strand.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub hits: Vec<SearchHit>,
    /// Set when the configured engine failed and the pairwise engine was used.
    pub fallback_reason: Option<String>,
}

/// Keeps full-sequence hits that overlap a seed hit at the same locus.
pub struct OverlapResolver<'a> {
    engine: &'a dyn IntervalEngine,
    fallback: PairwiseEngine,
}

impl<'a> OverlapResolver<'a> {
    pub fn new(engine: &'a dyn IntervalEngine, fallback: PairwiseEngine) -> Self {
        Self { engine, fallback }
    }

    /// Returns the `full` hits overlapping at least one `seed` hit on the same
    /// chromosome and strand, in `full` order, one record per
    /// chrom/start/end/strand.
    pub fn resolve(&self, full: &[SearchHit], seed: &[SearchHit]) -> Result<Resolution> {
        if full.is_empty() || seed.is_empty() {
            return Ok(Resolution::default());
        }

        let a: Vec<BedRecord> = full
            .iter()
            .enumerate()
            .map(|(i, hit)| BedRecord::from_hit(hit, format!("full_{i}")))
            .collect();
        let b: Vec<BedRecord> = seed
            .iter()
            .enumerate()
            .map(|(j, hit)| BedRecord::from_hit(hit, format!("seed_{j}")))
            .collect();

        let mut fallback_reason = None;
        let pairs = match self.engine.intersect(&a, &b, true) {
            Ok(pairs) => pairs,
            Err(err @ OffTargetError::IntersectionUnavailable { .. }) => {
                warn!(
                    "{} engine unavailable ({}); falling back to pairwise comparison",
                    self.engine.name(),
                    err
                );
                fallback_reason = Some(err.to_string());
                self.fallback.intersect(&a, &b, true)?
            }
            Err(err) => return Err(err),
        };

        // Engines are trusted for indices only; chromosome and strand are
        // re-checked against the original records.
        let matched: BTreeSet<usize> = pairs
            .into_iter()
            .filter(|&(i, j)| full[i].chrom == seed[j].chrom && full[i].strand == seed[j].strand)
            .map(|(i, _)| i)
            .collect();

        let mut seen = HashSet::new();
        let hits: Vec<SearchHit> = matched
            .into_iter()
            .map(|i| &full[i])
            .filter(|hit| seen.insert(hit.locus_key()))
            .cloned()
            .collect();

        debug!(
            "Overlap resolution kept {} of {} full hit(s) against {} seed hit(s)",
            hits.len(),
            full.len(),
            seed.len()
        );
        Ok(Resolution {
            hits,
            fallback_reason,
        })
    }
}
