// src/helper_functions.rs

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use flate2::read::MultiGzDecoder;

/// Reverse complements a DNA sequence or pattern. Wildcards (anything that is
/// not A/C/G/T) are kept as they are, so `N` maps to `N`.
pub fn reverse_complement(seq: &str) -> String {
    seq.chars()
        .rev()
        .map(|c| match c {
            'A' | 'a' => 'T',
            'T' | 't' => 'A',
            'G' | 'g' => 'C',
            'C' | 'c' => 'G',
            'N' | 'n' => 'N',
            other => other,
        })
        .collect()
}

#[inline]
pub fn is_concrete_base(b: u8) -> bool {
    matches!(b.to_ascii_uppercase(), b'A' | b'C' | b'G' | b'T')
}

/// A pattern position matches a genomic base when the pattern position is a
/// wildcard, or both are the same concrete base.
#[inline]
pub fn pattern_base_matches(pattern: u8, base: u8) -> bool {
    if !is_concrete_base(pattern) {
        return true;
    }
    pattern.eq_ignore_ascii_case(&base)
}

/// Opens a text file for buffered reading, transparently inflating `.gz`.
pub fn open_text_reader(path: &Path) -> io::Result<Box<dyn BufRead>> {
    let file = File::open(path)?;
    let gzipped = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("gz"))
        .unwrap_or(false);
    if gzipped {
        Ok(Box::new(BufReader::with_capacity(
            1 << 20,
            MultiGzDecoder::new(file),
        )))
    } else {
        Ok(Box::new(BufReader::with_capacity(1 << 20, file)))
    }
}
