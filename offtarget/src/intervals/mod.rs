// src/intervals/mod.rs

pub mod bedtools_integration;

use std::collections::HashMap;

use crate::error::{OffTargetError, Result};
use crate::models::SearchHit;

pub use bedtools_integration::BedtoolsEngine;

pub const DEFAULT_PAIRWISE_LIMIT: u64 = 50_000_000;

/// Half-open, 0-based BED6 record as exchanged with an interval engine.
/// Columns after `end` are carried as text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BedRecord {
    pub chrom: String,
    pub start: u64,
    pub end: u64,
    pub name: String,
    pub score: String,
    pub strand: String,
}

impl BedRecord {
    pub fn from_hit(hit: &SearchHit, name: String) -> Self {
        Self {
            chrom: hit.chrom.clone(),
            start: hit.start,
            end: hit.end,
            name,
            score: hit.mismatch_count.to_string(),
            strand: hit.strand.to_string(),
        }
    }
}

#[inline]
pub fn intervals_overlap(a_start: u64, a_end: u64, b_start: u64, b_end: u64) -> bool {
    a_start < b_end && b_start < a_end
}

/// "Given two sets of genomic intervals, return the pairs that overlap."
///
/// Results are index pairs `(i, j)` into `a` and `b`, so callers always map
/// back to their own records.
pub trait IntervalEngine: Send + Sync {
    fn name(&self) -> &str;

    fn intersect(
        &self,
        a: &[BedRecord],
        b: &[BedRecord],
        same_strand: bool,
    ) -> Result<Vec<(usize, usize)>>;
}

/// Direct comparison of every `a` against every `b` on the same chromosome.
#[derive(Debug, Clone, Copy)]
pub struct PairwiseEngine {
    pub max_comparisons: u64,
}

impl Default for PairwiseEngine {
    fn default() -> Self {
        Self {
            max_comparisons: DEFAULT_PAIRWISE_LIMIT,
        }
    }
}

impl IntervalEngine for PairwiseEngine {
    fn name(&self) -> &str {
        "pairwise"
    }

    fn intersect(
        &self,
        a: &[BedRecord],
        b: &[BedRecord],
        same_strand: bool,
    ) -> Result<Vec<(usize, usize)>> {
        let mut b_by_chrom: HashMap<&str, Vec<usize>> = HashMap::new();
        for (j, record) in b.iter().enumerate() {
            b_by_chrom.entry(record.chrom.as_str()).or_default().push(j);
        }

        let comparisons: u64 = a
            .iter()
            .map(|record| b_by_chrom.get(record.chrom.as_str()).map_or(0, |v| v.len() as u64))
            .sum();
        if comparisons > self.max_comparisons {
            return Err(OffTargetError::intersection(format!(
                "pairwise comparison needs {comparisons} checks, limit is {}",
                self.max_comparisons
            )));
        }

        let mut pairs = Vec::new();
        for (i, left) in a.iter().enumerate() {
            let Some(candidates) = b_by_chrom.get(left.chrom.as_str()) else {
                continue;
            };
            for &j in candidates {
                let right = &b[j];
                if same_strand && left.strand != right.strand {
                    continue;
                }
                if intervals_overlap(left.start, left.end, right.start, right.end) {
                    pairs.push((i, j));
                }
            }
        }
        Ok(pairs)
    }
}
