// src/search/response.rs
//
// Parser for the tabular text returned by the genome search service.
// Layout: a fixed block of `#` metadata lines, optionally more `#` lines
// (column names, "no items found"), then one row per hit with the columns
//   name strand start end snippet snippet_pos snippet_end query sbjct align edit match mis del ins
// Coordinates in the response are 1-based inclusive.

use csv::{ReaderBuilder, StringRecord};
use tracing::debug;

use crate::models::{SearchHit, Strand};

/// Metadata lines every response starts with (banner, database, query).
pub const GGGENOME_HEADER_LINES: usize = 3;

pub const COLUMN_COUNT: usize = 15;

const COL_CHROM: usize = 0;
const COL_STRAND: usize = 1;
const COL_START: usize = 2;
const COL_END: usize = 3;
const COL_SNIPPET_POS: usize = 5;
const COL_SNIPPET_END: usize = 6;
const COL_SBJCT: usize = 8;
const COL_EDIT: usize = 10;
const COL_MATCH: usize = 11;
const COL_MIS: usize = 12;
const COL_DEL: usize = 13;
const COL_INS: usize = 14;

pub const COLUMN_NAMES: [&str; COLUMN_COUNT] = [
    "name",
    "strand",
    "start",
    "end",
    "snippet",
    "snippet_pos",
    "snippet_end",
    "query",
    "sbjct",
    "align",
    "edit",
    "match",
    "mis",
    "del",
    "ins",
];

#[derive(Debug, Default)]
pub struct ParsedResponse {
    pub hits: Vec<SearchHit>,
    pub dropped_rows: usize,
}

/// Splits a raw response into `SearchHit`s. Malformed rows are dropped and
/// counted; they never fail the whole response.
pub fn parse_search_response(body: &str, header_lines: usize) -> ParsedResponse {
    let data: Vec<&str> = body
        .lines()
        .skip(header_lines)
        .filter(|line| !line.trim().is_empty() && !line.starts_with('#'))
        .collect();

    let mut parsed = ParsedResponse::default();
    let Some(first) = data.first() else {
        return parsed;
    };
    let delimiter = if first.contains('\t') { b'\t' } else { b',' };

    let joined = data.join("\n");
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(joined.as_bytes());

    for (row, record) in reader.records().enumerate() {
        let hit = match record {
            Ok(record) => parse_row(&record),
            Err(e) => Err(format!("unreadable row: {e}")),
        };
        match hit {
            Ok(hit) => parsed.hits.push(hit),
            Err(reason) => {
                debug!("Dropping search response row {}: {}", row + 1, reason);
                parsed.dropped_rows += 1;
            }
        }
    }
    parsed
}

fn parse_row(record: &StringRecord) -> Result<SearchHit, String> {
    if record.len() < COLUMN_COUNT {
        return Err(format!(
            "expected {COLUMN_COUNT} columns, found {}",
            record.len()
        ));
    }
    let field = |idx: usize| record.get(idx).unwrap_or("").trim();
    let integer = |idx: usize| -> Result<u64, String> {
        field(idx)
            .parse::<u64>()
            .map_err(|_| format!("column '{}' is not an integer: '{}'", COLUMN_NAMES[idx], field(idx)))
    };

    let strand: Strand = field(COL_STRAND)
        .parse()
        .map_err(|_| format!("bad strand '{}'", field(COL_STRAND)))?;
    let start_one_based = integer(COL_START)?;
    let end = integer(COL_END)?;
    if start_one_based == 0 || end < start_one_based {
        return Err(format!("bad interval {start_one_based}-{end}"));
    }

    for idx in [COL_SNIPPET_POS, COL_SNIPPET_END, COL_MATCH, COL_MIS] {
        integer(idx)?;
    }

    let chrom = field(COL_CHROM);
    if chrom.is_empty() {
        return Err("empty chromosome name".to_string());
    }

    Ok(SearchHit {
        chrom: chrom.to_string(),
        strand,
        start: start_one_based - 1,
        end,
        matched_sequence: field(COL_SBJCT).to_ascii_uppercase(),
        mismatch_count: integer(COL_EDIT)? as u32,
        insertions: integer(COL_INS)? as u32,
        deletions: integer(COL_DEL)? as u32,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESPONSE: &str = "\
# [ GGGenome | 2024-05-01 10:00:00 ]
# database:\tHuman genome, GRCh38/hg38 (Dec, 2013)
# query:\tGCTGAAGCACTGCACGCCGTNGG
# count:\t2
# name\tstrand\tstart\tend\tsnippet\tsnippet_pos\tsnippet_end\tquery\tsbjct\talign\tedit\tmatch\tmis\tdel\tins
chr1\t+\t101\t123\tAAGCTGAAGCACTGCACGCCGTTGGAA\t99\t125\tGCTGAAGCACTGCACGCCGTNGG\tgctgaagcactgcacgccgttgg\t|||||||||||||||||||||||\t0\t23\t0\t0\t0
chr7\t+\t5001\t5023\tx\t4999\t5025\tGCTGAAGCACTGCACGCCGTNGG\tGCTGAAGCACTGCACGCCATTGG\t||||||||||||||||||X||||\t1\t22\t1\t0\t0
";

    #[test]
    fn skips_header_and_normalizes_coordinates() {
        let parsed = parse_search_response(RESPONSE, GGGENOME_HEADER_LINES);
        assert_eq!(parsed.dropped_rows, 0);
        assert_eq!(parsed.hits.len(), 2);
        let first = &parsed.hits[0];
        assert_eq!(first.chrom, "chr1");
        assert_eq!(first.strand, Strand::Plus);
        assert_eq!(first.start, 100);
        assert_eq!(first.end, 123);
        assert_eq!(first.matched_sequence, "GCTGAAGCACTGCACGCCGTTGG");
        assert_eq!(parsed.hits[1].mismatch_count, 1);
        assert_eq!(parsed.hits[1].insertions, 0);
    }

    #[test]
    fn no_items_found_is_an_empty_result() {
        let body = "# [ GGGenome ]\n# database:\thg38\n# query:\tACGT\n### No items found. ###\n";
        let parsed = parse_search_response(body, GGGENOME_HEADER_LINES);
        assert!(parsed.hits.is_empty());
        assert_eq!(parsed.dropped_rows, 0);
    }

    #[test]
    fn malformed_rows_are_dropped_individually() {
        let body = "\
# a
# b
# c
chr2,-,10,32,s,8,34,q,CCAGCTGAAGCACTGCACGCCGT,a,2,21,2,0,0
chr2,-,ten,32,s,8,34,q,CCAGCTGAAGCACTGCACGCCGT,a,2,21,2,0,0
chr3,+,1,23
";
        let parsed = parse_search_response(body, GGGENOME_HEADER_LINES);
        assert_eq!(parsed.hits.len(), 1);
        assert_eq!(parsed.dropped_rows, 2);
        assert_eq!(parsed.hits[0].strand, Strand::Minus);
        assert_eq!(parsed.hits[0].start, 9);
    }

    #[test]
    fn non_integer_count_columns_drop_the_row() {
        let body = "\
# a
# b
# c
chr4\t+\t10\t32\ts\tNOTNUM\t34\tq\tGCTGAAGCACTGCACGCCGTAGG\ta\t0\t23\t0\t0\t0
chr4\t+\t90\t112\ts\t88\t114\tq\tGCTGAAGCACTGCACGCCGTAGG\ta\t0\tXX\tYY\t0\t0
chr4\t+\t200\t222\ts\t198\t224\tq\tGCTGAAGCACTGCACGCCGTAGG\ta\t0\t23\t0\t0\t0
";
        let parsed = parse_search_response(body, GGGENOME_HEADER_LINES);
        assert_eq!(parsed.dropped_rows, 2);
        assert_eq!(parsed.hits.len(), 1);
        assert_eq!(parsed.hits[0].start, 199);
    }
}
