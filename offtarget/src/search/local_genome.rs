// src/search/local_genome.rs
//
// Offline search capability: ungapped mismatch scan over a FASTA genome held
// in memory. Responses use the same tabular layout as the remote service so
// both share one parser.

use std::fmt::Write as _;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::info;

use super::response::GGGENOME_HEADER_LINES;
use super::{CapabilityError, SearchCapability, SearchQuery};
use crate::helper_functions::{open_text_reader, pattern_base_matches, reverse_complement};
use crate::models::Strand;

const SNIPPET_FLANK: usize = 10;

struct Contig {
    name: String,
    sequence: Vec<u8>,
}

pub struct LocalGenome {
    source: PathBuf,
    contigs: Vec<Contig>,
}

impl LocalGenome {
    /// Loads every record of a FASTA file (`.gz` accepted). Sequence is
    /// upper-cased; whitespace is ignored.
    pub fn load(path: &Path) -> io::Result<Self> {
        let reader = open_text_reader(path)?;
        let genome = Self::from_reader(reader, path.to_path_buf())?;
        info!(
            "Loaded {} contig(s), {} bp from {}",
            genome.contigs.len(),
            genome.total_length(),
            path.display()
        );
        Ok(genome)
    }

    pub fn from_reader<R: BufRead>(reader: R, source: PathBuf) -> io::Result<Self> {
        let mut contigs = Vec::new();
        let mut current: Option<Contig> = None;

        for line in reader.lines() {
            let line = line?;
            if let Some(header) = line.strip_prefix('>') {
                if let Some(contig) = current.take() {
                    contigs.push(contig);
                }
                let name = header
                    .split_whitespace()
                    .next()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("contig_{}", contigs.len() + 1));
                current = Some(Contig {
                    name,
                    sequence: Vec::new(),
                });
                continue;
            }
            let contig = current.get_or_insert_with(|| Contig {
                name: format!("contig_{}", contigs.len() + 1),
                sequence: Vec::new(),
            });
            contig.sequence.extend(
                line.bytes()
                    .filter(|b| !b.is_ascii_whitespace())
                    .map(|b| b.to_ascii_uppercase()),
            );
        }
        if let Some(contig) = current {
            contigs.push(contig);
        }

        if contigs.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("no FASTA records in {}", source.display()),
            ));
        }
        Ok(Self { source, contigs })
    }

    pub fn total_length(&self) -> usize {
        self.contigs.iter().map(|c| c.sequence.len()).sum()
    }
}

impl SearchCapability for LocalGenome {
    fn name(&self) -> &str {
        "local FASTA scan"
    }

    fn search(&self, query: &SearchQuery<'_>) -> Result<String, CapabilityError> {
        if query.sequence.is_empty() {
            return Err(CapabilityError::Permanent("empty query sequence".to_string()));
        }
        // Minus strand matches are found by scanning the forward strand for the
        // reverse complement of the query, and reported in forward orientation.
        let pattern: Vec<u8> = match query.strand {
            Strand::Plus => query.sequence.to_ascii_uppercase().into_bytes(),
            Strand::Minus => reverse_complement(&query.sequence.to_ascii_uppercase()).into_bytes(),
        };
        let budget = u32::from(query.mismatches);

        let hits: Vec<(&Contig, usize, u32)> = self
            .contigs
            .par_iter()
            .flat_map_iter(|contig| {
                scan_contig(&contig.sequence, &pattern, budget)
                    .into_iter()
                    .map(move |(pos, mismatches)| (contig, pos, mismatches))
            })
            .collect();

        let mut body = String::new();
        let _ = writeln!(body, "# [ offtarget | {} ]", self.name());
        let _ = writeln!(body, "# database:\t{}", self.source.display());
        let _ = writeln!(body, "# query:\t{}", query.sequence);
        debug_assert_eq!(body.lines().count(), GGGENOME_HEADER_LINES);

        for (contig, pos, mismatches) in hits {
            let end = pos + pattern.len();
            let window = &contig.sequence[pos..end];
            let snippet_start = pos.saturating_sub(SNIPPET_FLANK);
            let snippet_end = (end + SNIPPET_FLANK).min(contig.sequence.len());
            let align: String = pattern
                .iter()
                .zip(window)
                .map(|(&p, &g)| if pattern_base_matches(p, g) { '|' } else { 'X' })
                .collect();
            let _ = writeln!(
                body,
                "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t0\t0",
                contig.name,
                query.strand,
                pos + 1,
                end,
                String::from_utf8_lossy(&contig.sequence[snippet_start..snippet_end]),
                snippet_start + 1,
                snippet_end,
                query.sequence,
                String::from_utf8_lossy(window),
                align,
                mismatches,
                pattern.len() as u32 - mismatches,
                mismatches,
            );
        }
        Ok(body)
    }
}

/// Every window of `pattern.len()` bases with at most `budget` mismatches.
fn scan_contig(sequence: &[u8], pattern: &[u8], budget: u32) -> Vec<(usize, u32)> {
    if pattern.is_empty() || sequence.len() < pattern.len() {
        return Vec::new();
    }
    let mut hits = Vec::new();
    'windows: for pos in 0..=sequence.len() - pattern.len() {
        let mut mismatches = 0u32;
        for (&p, &g) in pattern.iter().zip(&sequence[pos..]) {
            if !pattern_base_matches(p, g) {
                mismatches += 1;
                if mismatches > budget {
                    continue 'windows;
                }
            }
        }
        hits.push((pos, mismatches));
    }
    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::response::parse_search_response;
    use std::io::Cursor;

    fn genome(fasta: &str) -> LocalGenome {
        LocalGenome::from_reader(Cursor::new(fasta.to_string()), PathBuf::from("test.fa")).unwrap()
    }

    #[test]
    fn scan_respects_mismatch_budget_and_wildcards() {
        let hits = scan_contig(b"AACGTTGGAA", b"ACGTNGG", 0);
        assert_eq!(hits, vec![(1, 0)]);
        assert!(scan_contig(b"AACCTTGGAA", b"ACGTNGG", 0).is_empty());
        assert_eq!(scan_contig(b"AACCTTGGAA", b"ACGTNGG", 1), vec![(1, 1)]);
    }

    #[test]
    fn genomic_n_is_a_mismatch() {
        assert!(scan_contig(b"ACGNAGG", b"ACGTNGG", 0).is_empty());
    }

    #[test]
    fn plus_and_minus_hits_round_trip_through_parser() {
        // chr1 carries the target on the forward strand, chr2 on the reverse.
        let target = "GCTGAAGCACTGCACGCCGTAGG";
        let reverse = reverse_complement(target);
        let fasta = format!(">chr1 test\nTTTT{target}TTTT\n>chr2\nAAAA\n{reverse}\nAAAA\n");
        let genome = genome(&fasta);

        let query = |strand| SearchQuery {
            assembly: "test",
            mismatches: 0,
            strand,
            sequence: "GCTGAAGCACTGCACGCCGTNGG",
        };

        let plus = parse_search_response(
            &genome.search(&query(Strand::Plus)).unwrap(),
            genome.header_lines(),
        );
        assert_eq!(plus.dropped_rows, 0);
        assert_eq!(plus.hits.len(), 1);
        assert_eq!(plus.hits[0].chrom, "chr1");
        assert_eq!(plus.hits[0].start, 4);
        assert_eq!(plus.hits[0].end, 27);
        assert_eq!(plus.hits[0].matched_sequence, target);

        let minus = parse_search_response(
            &genome.search(&query(Strand::Minus)).unwrap(),
            genome.header_lines(),
        );
        assert_eq!(minus.hits.len(), 1);
        assert_eq!(minus.hits[0].chrom, "chr2");
        assert_eq!(minus.hits[0].strand, Strand::Minus);
        assert_eq!(minus.hits[0].start, 4);
        assert!(minus.hits[0].matched_sequence.starts_with("CCT"));
    }

    #[test]
    fn empty_fasta_is_rejected() {
        assert!(LocalGenome::from_reader(Cursor::new(String::new()), PathBuf::from("x.fa")).is_err());
    }
}
