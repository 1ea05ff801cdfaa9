// src/analysis/annotation.rs

use std::io::BufRead;
use std::path::Path;

use csv::ReaderBuilder;
use tracing::{debug, info, warn};

use super::combiner::CandidateTable;
use crate::error::{OffTargetError, Result};
use crate::helper_functions::open_text_reader;
use crate::intervals::{BedRecord, IntervalEngine, PairwiseEngine};
use crate::models::{AnnotatedCandidate, FeatureType};

/// One exon or intron interval from a reference BED file:
/// `chrom start end gene_symbol feature_type feature_index`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationFeature {
    pub chrom: String,
    pub start: u64,
    pub end: u64,
    pub gene_symbol: String,
    pub feature_type: FeatureType,
    pub feature_index: u32,
}

impl AnnotationFeature {
    fn to_bed(&self) -> BedRecord {
        BedRecord {
            chrom: self.chrom.clone(),
            start: self.start,
            end: self.end,
            name: self.gene_symbol.clone(),
            score: self.feature_type.to_string(),
            strand: ".".to_string(),
        }
    }
}

/// Exon and intron intervals the candidate table is joined against.
#[derive(Debug, Clone, Default)]
pub struct AnnotationReference {
    features: Vec<AnnotationFeature>,
}

impl AnnotationReference {
    /// Loads both reference files; `.gz` files are inflated on the fly.
    pub fn load(exons: &Path, introns: &Path) -> Result<Self> {
        let mut features = read_feature_bed(exons, FeatureType::Exon)?;
        features.extend(read_feature_bed(introns, FeatureType::Intron)?);
        info!(
            "Loaded {} annotation feature(s) from {} and {}",
            features.len(),
            exons.display(),
            introns.display()
        );
        Ok(Self { features })
    }

    pub fn from_features(features: Vec<AnnotationFeature>) -> Self {
        Self { features }
    }

    pub fn features(&self) -> &[AnnotationFeature] {
        &self.features
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

fn read_feature_bed(path: &Path, default_type: FeatureType) -> Result<Vec<AnnotationFeature>> {
    let reader = open_text_reader(path).map_err(|e| {
        OffTargetError::annotation(format!("cannot open {}: {e}", path.display()))
    })?;
    parse_feature_bed(reader, default_type)
        .map_err(|e| OffTargetError::annotation(format!("reading {}: {e}", path.display())))
}

/// Column 5 names the feature type; when it is not `exon`/`intron` the
/// file's own type is used. Rows without a numeric feature index are skipped.
fn parse_feature_bed<R: BufRead>(
    reader: R,
    default_type: FeatureType,
) -> std::result::Result<Vec<AnnotationFeature>, csv::Error> {
    let mut rdr = ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .comment(Some(b'#'))
        .from_reader(reader);

    let mut features = Vec::new();
    let mut skipped = 0usize;
    for result in rdr.records() {
        let record = result?;
        let first = record.get(0).unwrap_or("").trim();
        if first.is_empty() || first.starts_with("track") || first.starts_with("browser") {
            continue;
        }
        if record.len() < 6 {
            skipped += 1;
            continue;
        }

        let start = record[1].trim().parse::<u64>();
        let end = record[2].trim().parse::<u64>();
        let index = record[5].trim().parse::<u32>();
        let (Ok(start), Ok(end), Ok(feature_index)) = (start, end, index) else {
            skipped += 1;
            continue;
        };
        if end <= start {
            skipped += 1;
            continue;
        }

        features.push(AnnotationFeature {
            chrom: first.to_string(),
            start,
            end,
            gene_symbol: record[3].trim().to_string(),
            feature_type: record[4].parse().unwrap_or(default_type),
            feature_index,
        });
    }
    if skipped > 0 {
        debug!("Skipped {} malformed annotation row(s)", skipped);
    }
    Ok(features)
}

/// Joins every candidate with every overlapping feature, ignoring strand.
///
/// Candidates that overlap no feature are absent from the result; the input
/// table is left untouched for callers that need every candidate.
pub fn annotate(
    table: &CandidateTable,
    reference: &AnnotationReference,
    engine: &dyn IntervalEngine,
    fallback: PairwiseEngine,
) -> Result<Vec<AnnotatedCandidate>> {
    if table.is_empty() || reference.is_empty() {
        return Ok(Vec::new());
    }

    let a: Vec<BedRecord> = table
        .iter()
        .map(|row| BedRecord {
            chrom: row.candidate.chrom.clone(),
            start: row.candidate.start,
            end: row.candidate.end,
            name: format!("OT{}", row.id),
            score: row.candidate.mismatch_count.to_string(),
            strand: row.candidate.strand.to_string(),
        })
        .collect();
    let b: Vec<BedRecord> = reference.features.iter().map(AnnotationFeature::to_bed).collect();

    let mut pairs = match engine.intersect(&a, &b, false) {
        Ok(pairs) => pairs,
        Err(OffTargetError::IntersectionUnavailable { cause }) => {
            warn!(
                "{} engine unavailable for annotation ({}); falling back to pairwise comparison",
                engine.name(),
                cause
            );
            fallback
                .intersect(&a, &b, false)
                .map_err(OffTargetError::annotation)?
        }
        Err(err) => return Err(OffTargetError::annotation(err)),
    };
    pairs.sort_unstable();
    pairs.dedup();

    let rows = table.rows();
    let annotated: Vec<AnnotatedCandidate> = pairs
        .into_iter()
        .filter(|&(i, j)| rows[i].candidate.chrom == reference.features[j].chrom)
        .map(|(i, j)| {
            let feature = &reference.features[j];
            AnnotatedCandidate {
                id: rows[i].id,
                candidate: rows[i].candidate.clone(),
                gene_symbol: feature.gene_symbol.clone(),
                feature_type: feature.feature_type,
                feature_index: feature.feature_index,
            }
        })
        .collect();

    info!(
        "Annotation produced {} row(s) for {} candidate(s)",
        annotated.len(),
        table.len()
    );
    Ok(annotated)
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Write};

    use flate2::write::GzEncoder;
    use flate2::Compression;

    use super::*;
    use crate::analysis::combiner::combine;
    use crate::models::{SearchHit, Strand};

    fn hit(chrom: &str, start: u64, strand: Strand) -> SearchHit {
        SearchHit {
            chrom: chrom.to_string(),
            strand,
            start,
            end: start + 23,
            matched_sequence: "GCTGAAGCACTGCACGCCGTAGG".to_string(),
            mismatch_count: 1,
            insertions: 0,
            deletions: 0,
        }
    }

    fn feature(chrom: &str, start: u64, end: u64, gene: &str, kind: FeatureType, idx: u32) -> AnnotationFeature {
        AnnotationFeature {
            chrom: chrom.to_string(),
            start,
            end,
            gene_symbol: gene.to_string(),
            feature_type: kind,
            feature_index: idx,
        }
    }

    #[test]
    fn parses_reference_rows_and_skips_noise() {
        let text = "track name=exons\n\
                    # comment\n\
                    chr1\t100\t200\tTP53\texon\t3\n\
                    chr1\t200\t300\tTP53\t.\t4\n\
                    chr1\t300\t400\tTP53\n\
                    chr1\tx\t400\tTP53\texon\t5\n";
        let features = parse_feature_bed(Cursor::new(text), FeatureType::Intron).unwrap();
        assert_eq!(features.len(), 2);
        assert_eq!(features[0].feature_type, FeatureType::Exon);
        assert_eq!(features[0].feature_index, 3);
        assert_eq!(features[1].feature_type, FeatureType::Intron);
    }

    #[test]
    fn loads_gzipped_reference() {
        let dir = tempfile::tempdir().unwrap();
        let exons = dir.path().join("exons.bed.gz");
        let mut enc = GzEncoder::new(std::fs::File::create(&exons).unwrap(), Compression::default());
        enc.write_all(b"chr2\t10\t50\tBRCA2\texon\t1\n").unwrap();
        enc.finish().unwrap();
        let introns = dir.path().join("introns.bed");
        std::fs::write(&introns, "chr2\t50\t90\tBRCA2\tintron\t1\n").unwrap();

        let reference = AnnotationReference::load(&exons, &introns).unwrap();
        assert_eq!(reference.len(), 2);
        assert_eq!(reference.features()[0].gene_symbol, "BRCA2");
    }

    #[test]
    fn missing_reference_is_annotation_unavailable() {
        let err = AnnotationReference::load(Path::new("/no/exons.bed"), Path::new("/no/introns.bed"))
            .unwrap_err();
        assert!(matches!(err, OffTargetError::AnnotationUnavailable { .. }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn unannotated_candidates_are_dropped() {
        let table = combine(
            &[hit("chr1", 150, Strand::Plus), hit("chr1", 5000, Strand::Plus)],
            &[hit("chr2", 40, Strand::Minus)],
        );
        let reference = AnnotationReference::from_features(vec![
            feature("chr1", 100, 200, "TP53", FeatureType::Exon, 2),
            feature("chr2", 0, 45, "BRCA2", FeatureType::Exon, 1),
            feature("chr2", 45, 90, "BRCA2", FeatureType::Intron, 1),
        ]);
        let engine = PairwiseEngine::default();
        let annotated = annotate(&table, &reference, &engine, engine).unwrap();

        assert_eq!(annotated.len(), 3);
        let ids: Vec<u32> = annotated.iter().map(|a| a.id).collect();
        assert!(!ids.contains(&table.rows()[1].id));
        let brca2: Vec<_> = annotated.iter().filter(|a| a.gene_symbol == "BRCA2").collect();
        assert_eq!(brca2.len(), 2);
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn empty_reference_annotates_nothing() {
        let table = combine(&[hit("chr1", 150, Strand::Plus)], &[]);
        let engine = PairwiseEngine::default();
        let annotated = annotate(&table, &AnnotationReference::default(), &engine, engine).unwrap();
        assert!(annotated.is_empty());
    }
}
