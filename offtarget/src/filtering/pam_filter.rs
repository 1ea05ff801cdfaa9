// src/filtering/pam_filter.rs

use tracing::debug;

use crate::helper_functions::{pattern_base_matches, reverse_complement};
use crate::models::{SearchHit, Strand};

/// Where the PAM sits inside a plus-strand `matched_sequence`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PamWindow {
    /// PAM starts right after the first `n` bases (the spacer or seed part).
    /// Falls back to the trailing bases when the match is too short.
    SpacerAware(usize),
    /// PAM is the trailing `len(pam)` bases.
    FromEnd,
}

/// Keeps the hits whose PAM bases match `pam` exactly; wildcard positions
/// accept any base.
///
/// Minus-strand matches come back in forward-strand orientation, so their PAM
/// is the leading `len(pam)` bases, checked against the reverse-complemented
/// pattern.
pub fn filter_pam(hits: &[SearchHit], pam: &str, window: PamWindow) -> Vec<SearchHit> {
    let pam = pam.to_ascii_uppercase();
    let pam_minus = reverse_complement(&pam);

    let kept: Vec<SearchHit> = hits
        .iter()
        .filter(|hit| {
            let pattern = match hit.strand {
                Strand::Plus => pam.as_str(),
                Strand::Minus => pam_minus.as_str(),
            };
            pam_matches(hit, pattern, window)
        })
        .cloned()
        .collect();

    debug!(
        "PAM filter ({}) kept {} of {} hit(s)",
        pam,
        kept.len(),
        hits.len()
    );
    kept
}

/// `pattern` must already be oriented for the hit's strand.
pub fn pam_matches(hit: &SearchHit, pattern: &str, window: PamWindow) -> bool {
    let seq = hit.matched_sequence.as_bytes();
    let pam_len = pattern.len();
    if pam_len == 0 || seq.len() < pam_len {
        return false;
    }

    let bases = match hit.strand {
        Strand::Minus => &seq[..pam_len],
        Strand::Plus => match window {
            PamWindow::SpacerAware(prefix) if seq.len() >= prefix + pam_len => {
                &seq[prefix..prefix + pam_len]
            }
            _ => &seq[seq.len() - pam_len..],
        },
    };

    pattern
        .bytes()
        .zip(bases.iter())
        .all(|(p, &b)| pattern_base_matches(p, b))
}
