// src/sequence_prep.rs

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::error::{OffTargetError, Result};

pub const SPACER_LENGTH: usize = 20;
pub const MIN_SEED_LENGTH: usize = 8;
pub const MAX_SEED_LENGTH: usize = 12;
pub const DEFAULT_SEED_LENGTH: usize = 12;
pub const DEFAULT_PAM: &str = "NGG";

static ACGT_ONLY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[ACGTacgt]+$").expect("literal spacer pattern compiles"));

/// A validated guide: 20-nt spacer, PAM pattern and seed length.
///
/// Construction is the only place the input constraints are checked; once a
/// `SequenceSpec` exists every derived query is well formed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SequenceSpec {
    spacer: String,
    pam: String,
    seed_length: usize,
}

impl SequenceSpec {
    pub fn new(spacer: &str, seed_length: usize, pam: &str) -> Result<Self> {
        let spacer = spacer.trim();
        if spacer.chars().count() != SPACER_LENGTH {
            return Err(OffTargetError::invalid_input(format!(
                "spacer must be exactly {SPACER_LENGTH} bases, got {}",
                spacer.chars().count()
            )));
        }
        if !ACGT_ONLY.is_match(spacer) {
            let offending: String = spacer
                .chars()
                .filter(|c| !matches!(c.to_ascii_uppercase(), 'A' | 'C' | 'G' | 'T'))
                .collect();
            return Err(OffTargetError::invalid_input(format!(
                "spacer may only contain A/C/G/T, found '{offending}'"
            )));
        }
        if !(MIN_SEED_LENGTH..=MAX_SEED_LENGTH).contains(&seed_length) {
            return Err(OffTargetError::invalid_input(format!(
                "seed length must be within {MIN_SEED_LENGTH}..={MAX_SEED_LENGTH}, got {seed_length}"
            )));
        }

        let pam = pam.trim();
        if pam.is_empty() {
            return Err(OffTargetError::invalid_input("PAM pattern must not be empty"));
        }
        if !pam.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(OffTargetError::invalid_input(format!(
                "PAM pattern may only contain letters, got '{pam}'"
            )));
        }

        Ok(Self {
            spacer: spacer.to_ascii_uppercase(),
            pam: pam.to_ascii_uppercase(),
            seed_length,
        })
    }

    pub fn spacer(&self) -> &str {
        &self.spacer
    }

    pub fn pam(&self) -> &str {
        &self.pam
    }

    pub fn seed_length(&self) -> usize {
        self.seed_length
    }

    pub fn spacer_length(&self) -> usize {
        self.spacer.len()
    }

    /// Spacer followed by the PAM; the broad, high-mismatch query.
    pub fn full_sequence(&self) -> String {
        format!("{}{}", self.spacer, self.pam)
    }

    /// The PAM-proximal `seed_length` spacer bases followed by the PAM.
    pub fn seed_sequence(&self) -> String {
        let seed = &self.spacer[self.spacer.len() - self.seed_length..];
        format!("{}{}", seed, self.pam)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GUIDE: &str = "GCTGAAGCACTGCACGCCGT";

    #[test]
    fn derives_full_and_seed_queries() {
        let spec = SequenceSpec::new(GUIDE, 12, "NGG").unwrap();
        assert_eq!(spec.full_sequence(), "GCTGAAGCACTGCACGCCGTNGG");
        assert_eq!(spec.full_sequence().len(), 23);
        assert_eq!(spec.seed_sequence(), "ACTGCACGCCGTNGG");
        assert_eq!(spec.seed_sequence().len(), 15);
    }

    #[test]
    fn seed_length_plus_pam_for_every_valid_seed() {
        for seed_length in MIN_SEED_LENGTH..=MAX_SEED_LENGTH {
            for pam in ["NGG", "NAG", "NNGRRT"] {
                let spec = SequenceSpec::new(GUIDE, seed_length, pam).unwrap();
                let seed = spec.seed_sequence();
                assert_eq!(seed.len(), seed_length + pam.len());
                assert!(seed.ends_with(pam));
                assert!(GUIDE.ends_with(&seed[..seed_length]));
            }
        }
    }

    #[test]
    fn seed_extraction_is_repeatable() {
        let spec = SequenceSpec::new(GUIDE, 10, "NGG").unwrap();
        assert_eq!(spec.seed_sequence(), spec.seed_sequence());
        let again = SequenceSpec::new(GUIDE, 10, "NGG").unwrap();
        assert_eq!(spec.seed_sequence(), again.seed_sequence());
    }

    #[test]
    fn lowercase_input_is_normalized() {
        let spec = SequenceSpec::new(&GUIDE.to_lowercase(), 8, "ngg").unwrap();
        assert_eq!(spec.spacer(), GUIDE);
        assert_eq!(spec.pam(), "NGG");
    }

    #[test]
    fn rejects_malformed_guides() {
        let too_short = SequenceSpec::new("GCTGAAGCACTGCACGCCG", 12, "NGG").unwrap_err();
        assert!(too_short.to_string().contains("exactly 20"));

        let bad_base = SequenceSpec::new("GCTGAAGCACTGCACGCCGN", 12, "NGG").unwrap_err();
        assert!(bad_base.to_string().contains("'N'"));

        assert!(SequenceSpec::new(GUIDE, 7, "NGG").is_err());
        assert!(SequenceSpec::new(GUIDE, 13, "NGG").is_err());
        assert!(SequenceSpec::new(GUIDE, 12, "").is_err());
        assert!(SequenceSpec::new(GUIDE, 12, "N-G").is_err());
    }

    #[test]
    fn validation_is_stable_across_repeated_construction() {
        let mixed = "gctgAAGCACtgcacgccGT";
        for _ in 0..3 {
            assert_eq!(SequenceSpec::new(mixed, 12, "NGG").unwrap().spacer(), GUIDE);
            let err = SequenceSpec::new("GCTGAAGCACTGCACGCCGU", 12, "NGG").unwrap_err();
            assert!(matches!(err, OffTargetError::InvalidInput { .. }));
            assert!(err.to_string().contains("'U'"));
        }
    }

    #[test]
    fn invalid_input_is_fatal() {
        let err = SequenceSpec::new("ACGT", 12, "NGG").unwrap_err();
        assert!(matches!(err, OffTargetError::InvalidInput { .. }));
        assert!(err.is_fatal());
    }
}
