// src/export.rs

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::analysis::CandidateTable;
use crate::error::Result;
use crate::models::{AnnotatedCandidate, OffTargetCandidate};
use crate::pipeline::{PipelineOutcome, PipelineRequest, RunStatus, StageCounts};

pub const PRIMER_BLAST_URL: &str = "https://www.ncbi.nlm.nih.gov/tools/primer-blast/index.cgi";
pub const DEFAULT_PRIMER_FLANK: u64 = 250;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Csv,
    Tsv,
}

impl OutputFormat {
    pub fn separator(self) -> u8 {
        match self {
            OutputFormat::Csv => b',',
            OutputFormat::Tsv => b'\t',
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Tsv => "tsv",
        }
    }
}

/// Output settings; also the `output` section of the configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    pub format: OutputFormat,
    pub primer_flank: u64,
    pub bed_track: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            format: OutputFormat::Csv,
            primer_flank: DEFAULT_PRIMER_FLANK,
            bed_track: true,
        }
    }
}

fn organism(assembly: &str) -> Option<&'static str> {
    match assembly {
        "hg38" | "hg19" => Some("Homo sapiens"),
        "mm10" | "mm39" => Some("Mus musculus"),
        _ => None,
    }
}

/// GRCh38 RefSeq accessions for the primary chromosomes.
fn hg38_accession(chrom: &str) -> Option<&'static str> {
    let accession = match chrom.trim_start_matches("chr") {
        "1" => "NC_000001.11",
        "2" => "NC_000002.12",
        "3" => "NC_000003.12",
        "4" => "NC_000004.12",
        "5" => "NC_000005.10",
        "6" => "NC_000006.12",
        "7" => "NC_000007.14",
        "8" => "NC_000008.11",
        "9" => "NC_000009.12",
        "10" => "NC_000010.11",
        "11" => "NC_000011.10",
        "12" => "NC_000012.12",
        "13" => "NC_000013.11",
        "14" => "NC_000014.9",
        "15" => "NC_000015.10",
        "16" => "NC_000016.10",
        "17" => "NC_000017.11",
        "18" => "NC_000018.10",
        "19" => "NC_000019.10",
        "20" => "NC_000020.11",
        "21" => "NC_000021.9",
        "22" => "NC_000022.11",
        "X" => "NC_000023.11",
        "Y" => "NC_000024.10",
        "M" | "MT" => "NC_012920.1",
        _ => return None,
    };
    Some(accession)
}

/// Primer-BLAST link with forward primers constrained to the `flank` bases
/// upstream of the site and reverse primers to the `flank` bases downstream.
/// Positions in the link are 1-based.
pub fn primer_blast_url(candidate: &OffTargetCandidate, assembly: &str, flank: u64) -> String {
    let template = match assembly {
        "hg38" => hg38_accession(&candidate.chrom).unwrap_or(candidate.chrom.as_str()),
        _ => candidate.chrom.as_str(),
    };
    let primer5_end = candidate.start.max(1);
    let primer5_start = candidate.start.saturating_sub(flank).max(1).min(primer5_end);
    let primer3_start = candidate.end + 1;
    let primer3_end = candidate.end + flank.max(1);

    let mut url = format!(
        "{PRIMER_BLAST_URL}?INPUT_SEQUENCE={template}\
         &PRIMER5_START={primer5_start}&PRIMER5_END={primer5_end}\
         &PRIMER3_START={primer3_start}&PRIMER3_END={primer3_end}"
    );
    if let Some(organism) = organism(assembly) {
        url.push_str("&ORGANISM=");
        url.push_str(&organism.replace(' ', "%20"));
    }
    url
}

fn candidate_columns<'a, I>(candidates: I, assembly: &str, flank: u64) -> Vec<Column>
where
    I: Iterator<Item = (u32, &'a OffTargetCandidate)> + Clone,
{
    let ids: Vec<u32> = candidates.clone().map(|(id, _)| id).collect();
    let chroms: Vec<&str> = candidates.clone().map(|(_, c)| c.chrom.as_str()).collect();
    let starts: Vec<u64> = candidates.clone().map(|(_, c)| c.start).collect();
    let ends: Vec<u64> = candidates.clone().map(|(_, c)| c.end).collect();
    let strands: Vec<String> = candidates.clone().map(|(_, c)| c.strand.to_string()).collect();
    let sources: Vec<&str> = candidates.clone().map(|(_, c)| c.source.label()).collect();
    let sequences: Vec<&str> = candidates
        .clone()
        .map(|(_, c)| c.matched_sequence.as_str())
        .collect();
    let mismatches: Vec<u32> = candidates.clone().map(|(_, c)| c.mismatch_count).collect();
    let urls: Vec<String> = candidates
        .map(|(_, c)| primer_blast_url(c, assembly, flank))
        .collect();

    vec![
        Series::new(PlSmallStr::from("id"), ids).into(),
        Series::new(PlSmallStr::from("chrom"), chroms).into(),
        Series::new(PlSmallStr::from("start"), starts).into(),
        Series::new(PlSmallStr::from("end"), ends).into(),
        Series::new(PlSmallStr::from("strand"), strands).into(),
        Series::new(PlSmallStr::from("source"), sources).into(),
        Series::new(PlSmallStr::from("matched_sequence"), sequences).into(),
        Series::new(PlSmallStr::from("mismatch_count"), mismatches).into(),
        Series::new(PlSmallStr::from("primer_blast_url"), urls).into(),
    ]
}

pub fn candidate_frame(table: &CandidateTable, assembly: &str, flank: u64) -> PolarsResult<DataFrame> {
    let rows = table.rows().iter().map(|row| (row.id, &row.candidate));
    DataFrame::new(candidate_columns(rows, assembly, flank))
}

pub fn annotated_frame(
    rows: &[AnnotatedCandidate],
    assembly: &str,
    flank: u64,
) -> PolarsResult<DataFrame> {
    let mut columns = candidate_columns(
        rows.iter().map(|row| (row.id, &row.candidate)),
        assembly,
        flank,
    );
    let genes: Vec<&str> = rows.iter().map(|r| r.gene_symbol.as_str()).collect();
    let types: Vec<&str> = rows.iter().map(|r| r.feature_type.as_str()).collect();
    let indices: Vec<u32> = rows.iter().map(|r| r.feature_index).collect();
    columns.push(Series::new(PlSmallStr::from("gene_symbol"), genes).into());
    columns.push(Series::new(PlSmallStr::from("feature_type"), types).into());
    columns.push(Series::new(PlSmallStr::from("feature_index"), indices).into());
    DataFrame::new(columns)
}

pub fn write_frame<W: Write>(df: &mut DataFrame, writer: W, format: OutputFormat) -> Result<()> {
    CsvWriter::new(writer)
        .include_header(true)
        .with_separator(format.separator())
        .finish(df)?;
    Ok(())
}

/// BED6 track for genome browsers; name is `OT<id>`, score the mismatch count.
pub fn write_bed_track<W: Write>(table: &CandidateTable, track_name: &str, mut writer: W) -> Result<()> {
    writeln!(
        writer,
        "track name=\"{track_name}\" description=\"CRISPR off-target candidates ({} sites)\"",
        table.len()
    )?;
    for row in table.iter() {
        let c = &row.candidate;
        writeln!(
            writer,
            "{}\t{}\t{}\tOT{}\t{}\t{}",
            c.chrom, c.start, c.end, row.id, c.mismatch_count, c.strand
        )?;
    }
    writer.flush()?;
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary<'a> {
    pub spacer: &'a str,
    pub pam: &'a str,
    pub seed_length: usize,
    pub full_sequence: String,
    pub seed_sequence: String,
    pub genome_assembly: &'a str,
    pub full_mismatch_budget: u8,
    pub seed_mismatch_budget: u8,
    #[serde(flatten)]
    pub status: RunStatus,
    pub counts: &'a StageCounts,
    pub warnings: &'a [String],
}

impl<'a> RunSummary<'a> {
    pub fn new(request: &'a PipelineRequest, outcome: &'a PipelineOutcome) -> Self {
        Self {
            spacer: outcome.spec.spacer(),
            pam: outcome.spec.pam(),
            seed_length: outcome.spec.seed_length(),
            full_sequence: outcome.spec.full_sequence(),
            seed_sequence: outcome.spec.seed_sequence(),
            genome_assembly: &request.genome_assembly,
            full_mismatch_budget: request.full_mismatch_budget,
            seed_mismatch_budget: request.seed_mismatch_budget,
            status: outcome.status,
            counts: &outcome.counts,
            warnings: &outcome.warnings,
        }
    }
}

fn with_suffix(prefix: &Path, suffix: &str) -> PathBuf {
    let mut name = prefix.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

/// Writes every artifact of a run next to `prefix` and returns the paths.
///
/// `PREFIX.candidates.<ext>` is always written, even when empty.
/// `PREFIX.annotated.<ext>` only when annotation produced a table.
pub fn write_outputs(
    prefix: &Path,
    request: &PipelineRequest,
    outcome: &PipelineOutcome,
    options: &ExportOptions,
) -> Result<Vec<PathBuf>> {
    let ext = options.format.extension();
    let assembly = request.genome_assembly.as_str();
    let mut written = Vec::new();

    let path = with_suffix(prefix, &format!(".candidates.{ext}"));
    let mut df = candidate_frame(&outcome.table, assembly, options.primer_flank)?;
    write_frame(&mut df, BufWriter::new(File::create(&path)?), options.format)?;
    written.push(path);

    if let Some(rows) = &outcome.annotated {
        let path = with_suffix(prefix, &format!(".annotated.{ext}"));
        let mut df = annotated_frame(rows, assembly, options.primer_flank)?;
        write_frame(&mut df, BufWriter::new(File::create(&path)?), options.format)?;
        written.push(path);
    }

    if options.bed_track {
        let path = with_suffix(prefix, ".bed");
        let track = format!("offtarget_{}", outcome.spec.spacer());
        write_bed_track(&outcome.table, &track, BufWriter::new(File::create(&path)?))?;
        written.push(path);
    }

    let path = with_suffix(prefix, ".summary.json");
    let summary = RunSummary::new(request, outcome);
    serde_json::to_writer_pretty(BufWriter::new(File::create(&path)?), &summary)
        .map_err(std::io::Error::from)?;
    written.push(path);

    for path in &written {
        info!("Wrote {}", path.display());
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::combine;
    use crate::models::{FeatureType, SearchHit, Strand};

    fn hit(chrom: &str, start: u64, strand: Strand, mismatches: u32) -> SearchHit {
        SearchHit {
            chrom: chrom.to_string(),
            strand,
            start,
            end: start + 23,
            matched_sequence: "GCTGAAGCACTGCACGCCGTAGG".to_string(),
            mismatch_count: mismatches,
            insertions: 0,
            deletions: 0,
        }
    }

    fn table() -> CandidateTable {
        combine(
            &[hit("chr1", 1000, Strand::Plus, 2)],
            &[hit("chr7", 500, Strand::Minus, 0)],
        )
    }

    #[test]
    fn primer_blast_link_for_hg38() {
        let table = table();
        let candidate = &table.rows()[1].candidate;
        let url = primer_blast_url(candidate, "hg38", 250);
        assert!(url.starts_with(PRIMER_BLAST_URL));
        assert!(url.contains("INPUT_SEQUENCE=NC_000001.11"));
        assert!(url.contains("PRIMER5_START=750&PRIMER5_END=1000"));
        assert!(url.contains("PRIMER3_START=1024&PRIMER3_END=1273"));
        assert!(url.ends_with("ORGANISM=Homo%20sapiens"));
    }

    #[test]
    fn primer_blast_link_without_known_organism() {
        let table = table();
        let candidate = &table.rows()[0].candidate;
        let url = primer_blast_url(candidate, "danRer11", 100);
        assert!(url.contains("INPUT_SEQUENCE=chr7"));
        assert!(!url.contains("ORGANISM"));
    }

    #[test]
    fn candidate_csv_has_expected_columns() {
        let mut df = candidate_frame(&table(), "hg38", 250).unwrap();
        assert_eq!(df.height(), 2);
        let mut buf = Vec::new();
        write_frame(&mut df, &mut buf, OutputFormat::Csv).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "id,chrom,start,end,strand,source,matched_sequence,mismatch_count,primer_blast_url"
        );
        assert!(lines.next().unwrap().starts_with("1,chr7,500,523,-,minus,"));
    }

    #[test]
    fn empty_table_still_has_header() {
        let mut df = candidate_frame(&CandidateTable::default(), "hg38", 250).unwrap();
        let mut buf = Vec::new();
        write_frame(&mut df, &mut buf, OutputFormat::Tsv).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text.lines().count(), 1);
        assert!(text.starts_with("id\tchrom\tstart"));
    }

    #[test]
    fn annotated_frame_adds_feature_columns() {
        let table = table();
        let rows = vec![AnnotatedCandidate {
            id: 1,
            candidate: table.rows()[0].candidate.clone(),
            gene_symbol: "EGFR".to_string(),
            feature_type: FeatureType::Intron,
            feature_index: 4,
        }];
        let df = annotated_frame(&rows, "hg38", 250).unwrap();
        assert_eq!(df.width(), 12);
        assert_eq!(df.height(), 1);
        let names: Vec<&str> = df.get_column_names().into_iter().map(|n| n.as_str()).collect();
        assert_eq!(&names[9..], &["gene_symbol", "feature_type", "feature_index"]);
    }

    #[test]
    fn bed_track_rows() {
        let mut buf = Vec::new();
        write_bed_track(&table(), "offtarget_test", &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("track name=\"offtarget_test\""));
        assert_eq!(lines[1], "chr7\t500\t523\tOT1\t0\t-");
        assert_eq!(lines[2], "chr1\t1000\t1023\tOT2\t2\t+");
    }
}
