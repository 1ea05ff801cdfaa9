// src/models.rs

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::OffTargetError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Strand {
    #[serde(rename = "+")]
    Plus,
    #[serde(rename = "-")]
    Minus,
}

impl Strand {
    pub const BOTH: [Strand; 2] = [Strand::Plus, Strand::Minus];

    pub fn symbol(self) -> char {
        match self {
            Strand::Plus => '+',
            Strand::Minus => '-',
        }
    }

    /// Name used in the `source` column of the output table.
    pub fn label(self) -> &'static str {
        match self {
            Strand::Plus => "plus",
            Strand::Minus => "minus",
        }
    }
}

impl fmt::Display for Strand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

impl FromStr for Strand {
    type Err = OffTargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "+" | "plus" => Ok(Strand::Plus),
            "-" | "minus" => Ok(Strand::Minus),
            other => Err(OffTargetError::invalid_input(format!(
                "strand must be '+' or '-', got '{other}'"
            ))),
        }
    }
}

/// One normalized row from the genome search capability.
/// Coordinates are 0-based, end exclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub chrom: String,
    pub strand: Strand,
    pub start: u64,
    pub end: u64,
    pub matched_sequence: String,
    pub mismatch_count: u32,
    pub insertions: u32,
    pub deletions: u32,
}

impl SearchHit {
    pub fn locus_key(&self) -> (&str, u64, u64, Strand) {
        (self.chrom.as_str(), self.start, self.end, self.strand)
    }
}

/// The four hit collections gathered for one guide.
#[derive(Debug, Clone, Default)]
pub struct CandidateSet {
    pub plus_full: Vec<SearchHit>,
    pub minus_full: Vec<SearchHit>,
    pub plus_seed: Vec<SearchHit>,
    pub minus_seed: Vec<SearchHit>,
}

impl CandidateSet {
    pub fn full(&self, strand: Strand) -> &[SearchHit] {
        match strand {
            Strand::Plus => &self.plus_full,
            Strand::Minus => &self.minus_full,
        }
    }

    pub fn seed(&self, strand: Strand) -> &[SearchHit] {
        match strand {
            Strand::Plus => &self.plus_seed,
            Strand::Minus => &self.minus_seed,
        }
    }

    pub fn total_hits(&self) -> usize {
        self.plus_full.len() + self.minus_full.len() + self.plus_seed.len() + self.minus_seed.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OffTargetCandidate {
    pub chrom: String,
    pub start: u64,
    pub end: u64,
    pub strand: Strand,
    pub matched_sequence: String,
    pub mismatch_count: u32,
    pub source: Strand,
}

impl OffTargetCandidate {
    pub fn from_hit(hit: &SearchHit, source: Strand) -> Self {
        Self {
            chrom: hit.chrom.clone(),
            start: hit.start,
            end: hit.end,
            strand: hit.strand,
            matched_sequence: hit.matched_sequence.clone(),
            mismatch_count: hit.mismatch_count,
            source,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureType {
    Exon,
    Intron,
}

impl FeatureType {
    pub fn as_str(self) -> &'static str {
        match self {
            FeatureType::Exon => "exon",
            FeatureType::Intron => "intron",
        }
    }
}

impl fmt::Display for FeatureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeatureType {
    type Err = OffTargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exon" => Ok(FeatureType::Exon),
            "intron" => Ok(FeatureType::Intron),
            other => Err(OffTargetError::annotation(format!(
                "unknown feature type '{other}'"
            ))),
        }
    }
}

/// A resolved candidate joined with one overlapping exon or intron.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnnotatedCandidate {
    pub id: u32,
    pub candidate: OffTargetCandidate,
    pub gene_symbol: String,
    pub feature_type: FeatureType,
    pub feature_index: u32,
}
