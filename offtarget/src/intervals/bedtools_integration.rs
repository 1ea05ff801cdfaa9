// src/intervals/bedtools_integration.rs

use std::env;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Command;

use csv::WriterBuilder;
use tracing::{debug, info};

use super::{BedRecord, IntervalEngine};
use crate::error::{OffTargetError, Result};

pub const BEDTOOLS_ENV: &str = "OFFTARGET_BEDTOOLS";

/// `bedtools intersect -wa -wb` driven through temporary BED files.
#[derive(Debug, Clone)]
pub struct BedtoolsEngine {
    executable: PathBuf,
}

impl BedtoolsEngine {
    /// Resolves the executable: explicit path, then `$OFFTARGET_BEDTOOLS`,
    /// then `bedtools` on `PATH`. Bare names in either of the first two are
    /// looked up on `PATH` as well.
    pub fn locate(explicit: Option<&Path>) -> Result<Self> {
        let executable = match explicit {
            Some(path) => resolve_executable(path.as_os_str())?,
            None => match env::var_os(BEDTOOLS_ENV) {
                Some(value) => resolve_executable(&value)?,
                None => which::which("bedtools").map_err(|e| {
                    OffTargetError::intersection(format!("bedtools not found on PATH: {e}"))
                })?,
            },
        };
        info!("Using bedtools at {}", executable.display());
        Ok(Self { executable })
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }
}

fn resolve_executable(candidate: &OsStr) -> Result<PathBuf> {
    which::which(candidate).map_err(|e| {
        OffTargetError::intersection(format!(
            "bedtools executable not found at '{}': {e}",
            Path::new(candidate).display()
        ))
    })
}

/// Writes records as BED6 with the record index as name, so output rows can
/// be mapped back without trusting any other column.
fn write_indexed_bed(path: &Path, records: &[BedRecord]) -> Result<()> {
    let mut wtr = WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .from_path(path)
        .map_err(|e| OffTargetError::intersection(format!("writing {}: {e}", path.display())))?;
    for (idx, record) in records.iter().enumerate() {
        let strand = match record.strand.as_str() {
            "+" | "-" => record.strand.as_str(),
            _ => ".",
        };
        let start = record.start.to_string();
        let end = record.end.to_string();
        let name = idx.to_string();
        wtr.write_record([
            record.chrom.as_str(),
            start.as_str(),
            end.as_str(),
            name.as_str(),
            record.score.as_str(),
            strand,
        ])
        .map_err(|e| OffTargetError::intersection(format!("writing {}: {e}", path.display())))?;
    }
    wtr.flush()?;
    Ok(())
}

/// Parses `-wa -wb` output: columns 4 and 10 hold the A and B indices.
pub(crate) fn parse_intersect_output(
    stdout: &str,
    a_len: usize,
    b_len: usize,
) -> Result<Vec<(usize, usize)>> {
    let mut pairs = Vec::new();
    for line in stdout.lines().filter(|l| !l.trim().is_empty()) {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 12 {
            return Err(OffTargetError::intersection(format!(
                "unexpected bedtools output line: '{line}'"
            )));
        }
        let index = |field: &str, len: usize| -> Result<usize> {
            field
                .parse::<usize>()
                .ok()
                .filter(|&i| i < len)
                .ok_or_else(|| OffTargetError::intersection(format!("bad record index '{field}'")))
        };
        pairs.push((index(fields[3], a_len)?, index(fields[9], b_len)?));
    }
    Ok(pairs)
}

impl IntervalEngine for BedtoolsEngine {
    fn name(&self) -> &str {
        "bedtools"
    }

    fn intersect(
        &self,
        a: &[BedRecord],
        b: &[BedRecord],
        same_strand: bool,
    ) -> Result<Vec<(usize, usize)>> {
        if a.is_empty() || b.is_empty() {
            return Ok(Vec::new());
        }

        let workdir = tempfile::tempdir()
            .map_err(|e| OffTargetError::intersection(format!("creating temp dir: {e}")))?;
        let a_path = workdir.path().join("a.bed");
        let b_path = workdir.path().join("b.bed");
        write_indexed_bed(&a_path, a)?;
        write_indexed_bed(&b_path, b)?;

        let mut command = Command::new(&self.executable);
        command
            .arg("intersect")
            .arg("-a")
            .arg(&a_path)
            .arg("-b")
            .arg(&b_path)
            .arg("-wa")
            .arg("-wb");
        if same_strand {
            command.arg("-s");
        }
        debug!("Executing command: {:?}", command);

        let output = command
            .output()
            .map_err(|e| OffTargetError::intersection(format!("failed to run bedtools: {e}")))?;
        if !output.status.success() {
            return Err(OffTargetError::intersection(format!(
                "bedtools intersect exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let pairs = parse_intersect_output(&String::from_utf8_lossy(&output.stdout), a.len(), b.len())?;
        debug!("bedtools reported {} overlapping pair(s)", pairs.len());
        Ok(pairs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wa_wb_rows() {
        let out = "chr1\t100\t123\t0\t0\t+\tchr1\t111\t126\t2\t1\t+\n\
                   chr1\t100\t123\t0\t0\t+\tchr1\t110\t125\t0\t0\t+\n";
        let pairs = parse_intersect_output(out, 1, 3).unwrap();
        assert_eq!(pairs, vec![(0, 2), (0, 0)]);
    }

    #[test]
    fn rejects_indices_outside_inputs() {
        let out = "chr1\t100\t123\t5\t0\t+\tchr1\t111\t126\t0\t1\t+\n";
        assert!(parse_intersect_output(out, 1, 1).is_err());
    }

    #[test]
    fn missing_executable_is_intersection_unavailable() {
        let err = BedtoolsEngine::locate(Some(Path::new("/nonexistent/bedtools"))).unwrap_err();
        assert!(!err.is_fatal());
    }

    #[test]
    fn indexed_bed_uses_record_positions_as_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.bed");
        let records = vec![BedRecord {
            chrom: "chr1".into(),
            start: 5,
            end: 28,
            name: "GENE".into(),
            score: "exon".into(),
            strand: "3".into(),
        }];
        write_indexed_bed(&path, &records).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "chr1\t5\t28\t0\texon\t.\n");
    }

    #[test]
    fn bare_command_names_resolve_through_path() {
        let resolved = resolve_executable(OsStr::new("sh")).unwrap();
        assert!(resolved.is_absolute());
        assert!(resolved.exists());
        assert!(resolve_executable(OsStr::new("offtarget-no-such-tool")).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn intersect_runs_the_executable_with_wa_wb() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("bedtools");
        std::fs::write(
            &script,
            "#!/bin/sh\n\
             printf '%s\\n' \"$@\" > \"$(dirname \"$0\")/args.txt\"\n\
             printf 'chr1\\t100\\t123\\t1\\t0\\t+\\tchr1\\t111\\t126\\t0\\t0\\t+\\n'\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let record = |start: u64| BedRecord {
            chrom: "chr1".into(),
            start,
            end: start + 23,
            name: String::new(),
            score: "0".into(),
            strand: "+".into(),
        };
        let a = vec![record(10), record(100)];
        let b = vec![record(111)];

        let engine = BedtoolsEngine::locate(Some(&script)).unwrap();
        assert_eq!(engine.intersect(&a, &b, true).unwrap(), vec![(1, 0)]);
        let args = std::fs::read_to_string(dir.path().join("args.txt")).unwrap();
        let args: Vec<&str> = args.lines().collect();
        assert_eq!(args[0], "intersect");
        assert!(args.ends_with(&["-wa", "-wb", "-s"]));
        assert!(args[2].ends_with("a.bed") && args[4].ends_with("b.bed"));

        engine.intersect(&a, &b, false).unwrap();
        let args = std::fs::read_to_string(dir.path().join("args.txt")).unwrap();
        assert!(!args.lines().any(|arg| arg == "-s"));
        assert_eq!(args.lines().last(), Some("-wb"));
    }
}
