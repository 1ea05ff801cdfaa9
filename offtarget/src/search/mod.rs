// src/search/mod.rs

pub mod gggenome_integration;
pub mod local_genome;
pub mod response;

use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::error::{OffTargetError, Result};
use crate::models::{CandidateSet, SearchHit, Strand};
use crate::sequence_prep::SequenceSpec;

pub use gggenome_integration::GgGenomeClient;
pub use local_genome::LocalGenome;
pub use response::{parse_search_response, ParsedResponse, GGGENOME_HEADER_LINES};

pub const MAX_MISMATCH_BUDGET: u8 = 3;
pub const DEFAULT_FULL_MISMATCHES: u8 = 3;
pub const DEFAULT_SEED_MISMATCHES: u8 = 1;

/// One request against the search capability. Searches are always ungapped.
#[derive(Debug, Clone, Copy)]
pub struct SearchQuery<'a> {
    pub assembly: &'a str,
    pub mismatches: u8,
    pub strand: Strand,
    pub sequence: &'a str,
}

#[derive(Debug, Error)]
pub enum CapabilityError {
    /// Worth another attempt (network hiccup, 5xx, rate limit).
    #[error("{cause}")]
    Transient {
        cause: String,
        retry_after: Option<Duration>,
    },
    /// Retrying will not help (bad request, unknown assembly, ...).
    #[error("{0}")]
    Permanent(String),
}

impl CapabilityError {
    pub fn transient(cause: impl Into<String>) -> Self {
        CapabilityError::Transient {
            cause: cause.into(),
            retry_after: None,
        }
    }
}

/// "Given a DNA sequence, a strand and a mismatch budget, return every genomic
/// interval matching within that budget", answered in the tabular text format
/// understood by [`parse_search_response`].
pub trait SearchCapability: Send + Sync {
    fn name(&self) -> &str;

    fn search(&self, query: &SearchQuery<'_>) -> Result<String, CapabilityError>;

    /// Metadata lines preceding the data rows in this capability's responses.
    fn header_lines(&self) -> usize {
        GGGENOME_HEADER_LINES
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
    /// Upper bound for server-requested waits (`Retry-After`).
    pub max_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(500),
            max_wait: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Full,
    Seed,
}

impl QueryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            QueryKind::Full => "full",
            QueryKind::Seed => "seed",
        }
    }
}

/// Issues the four searches (full/seed x plus/minus) for one guide.
pub struct CandidateSearch<'a> {
    capability: &'a dyn SearchCapability,
    retry: RetryPolicy,
    assembly: &'a str,
    full_mismatches: u8,
    seed_mismatches: u8,
    parallel: bool,
}

impl<'a> CandidateSearch<'a> {
    pub fn new(
        capability: &'a dyn SearchCapability,
        assembly: &'a str,
        full_mismatches: u8,
        seed_mismatches: u8,
    ) -> Result<Self> {
        for (label, budget) in [("full", full_mismatches), ("seed", seed_mismatches)] {
            if budget > MAX_MISMATCH_BUDGET {
                return Err(OffTargetError::invalid_input(format!(
                    "{label} mismatch budget must be within 0..={MAX_MISMATCH_BUDGET}, got {budget}"
                )));
            }
        }
        if assembly.trim().is_empty() {
            return Err(OffTargetError::invalid_input("genome assembly must not be empty"));
        }
        Ok(Self {
            capability,
            retry: RetryPolicy::default(),
            assembly,
            full_mismatches,
            seed_mismatches,
            parallel: true,
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Runs all four searches. Any exhausted search fails the whole set so a
    /// strand is never silently missing.
    pub fn collect(&self, spec: &SequenceSpec) -> Result<CandidateSet> {
        let full = spec.full_sequence();
        let seed = spec.seed_sequence();
        info!(
            "Searching {} via {} (full {} up to {} mm, seed {} up to {} mm)",
            self.assembly,
            self.capability.name(),
            full,
            self.full_mismatches,
            seed,
            self.seed_mismatches
        );

        let run = |strand: Strand, kind: QueryKind| -> Result<Vec<SearchHit>> {
            let (sequence, mismatches) = match kind {
                QueryKind::Full => (full.as_str(), self.full_mismatches),
                QueryKind::Seed => (seed.as_str(), self.seed_mismatches),
            };
            self.search_once(kind, &SearchQuery {
                assembly: self.assembly,
                mismatches,
                strand,
                sequence,
            })
        };

        let (plus_full, plus_seed, minus_full, minus_seed) = if self.parallel {
            let ((plus_full, plus_seed), (minus_full, minus_seed)) = rayon::join(
                || rayon::join(|| run(Strand::Plus, QueryKind::Full), || run(Strand::Plus, QueryKind::Seed)),
                || rayon::join(|| run(Strand::Minus, QueryKind::Full), || run(Strand::Minus, QueryKind::Seed)),
            );
            (plus_full?, plus_seed?, minus_full?, minus_seed?)
        } else {
            // stops at the first exhausted search
            (
                run(Strand::Plus, QueryKind::Full)?,
                run(Strand::Plus, QueryKind::Seed)?,
                run(Strand::Minus, QueryKind::Full)?,
                run(Strand::Minus, QueryKind::Seed)?,
            )
        };

        Ok(CandidateSet {
            plus_full,
            minus_full,
            plus_seed,
            minus_seed,
        })
    }

    fn search_once(&self, kind: QueryKind, query: &SearchQuery<'_>) -> Result<Vec<SearchHit>> {
        let body = search_with_retry(self.capability, query, &self.retry)?;
        let parsed = parse_search_response(&body, self.capability.header_lines());
        if parsed.dropped_rows > 0 {
            warn!(
                "Dropped {} unparsable row(s) from the {} {} strand response",
                parsed.dropped_rows,
                kind.as_str(),
                query.strand
            );
        }
        debug!(
            "{} search on {} strand returned {} hit(s)",
            kind.as_str(),
            query.strand,
            parsed.hits.len()
        );
        Ok(parsed.hits)
    }
}

/// Calls the capability until it answers, gives up permanently, or the
/// attempt budget is spent.
pub fn search_with_retry(
    capability: &dyn SearchCapability,
    query: &SearchQuery<'_>,
    retry: &RetryPolicy,
) -> Result<String> {
    let max_attempts = retry.max_attempts.max(1);
    let mut attempts = 0;

    loop {
        attempts += 1;
        match capability.search(query) {
            Ok(body) => return Ok(body),
            Err(CapabilityError::Permanent(cause)) => {
                return Err(unavailable(query, attempts, cause));
            }
            Err(CapabilityError::Transient { cause, retry_after }) => {
                if attempts >= max_attempts {
                    return Err(unavailable(query, attempts, cause));
                }
                let wait = retry_after
                    .map(|requested| requested.min(retry.max_wait))
                    .unwrap_or(retry.backoff);
                warn!(
                    "Search attempt {}/{} for {} ({} strand) failed: {}. Retrying in {:?}",
                    attempts, max_attempts, query.sequence, query.strand, cause, wait
                );
                thread::sleep(wait);
            }
        }
    }
}

fn unavailable(query: &SearchQuery<'_>, attempts: u32, cause: String) -> OffTargetError {
    OffTargetError::SearchUnavailable {
        strand: query.strand,
        query: query.sequence.to_string(),
        attempts,
        cause,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    const GUIDE: &str = "GCTGAAGCACTGCACGCCGT";

    struct Flaky {
        failures_before_success: u32,
        calls: AtomicU32,
    }

    impl SearchCapability for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }

        fn search(&self, _query: &SearchQuery<'_>) -> Result<String, CapabilityError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures_before_success {
                Err(CapabilityError::transient("connection reset"))
            } else {
                Ok("# a\n# b\n# c\n".to_string())
            }
        }
    }

    struct Recording {
        queries: Mutex<Vec<(Strand, String, u8)>>,
    }

    impl SearchCapability for Recording {
        fn name(&self) -> &str {
            "recording"
        }

        fn search(&self, query: &SearchQuery<'_>) -> Result<String, CapabilityError> {
            self.queries
                .lock()
                .unwrap()
                .push((query.strand, query.sequence.to_string(), query.mismatches));
            Ok(String::new())
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            backoff: Duration::from_millis(1),
            max_wait: Duration::from_millis(1),
        }
    }

    fn query() -> SearchQuery<'static> {
        SearchQuery {
            assembly: "hg38",
            mismatches: 3,
            strand: Strand::Plus,
            sequence: "GCTGAAGCACTGCACGCCGTNGG",
        }
    }

    #[test]
    fn transient_failures_are_retried() {
        let cap = Flaky {
            failures_before_success: 2,
            calls: AtomicU32::new(0),
        };
        assert!(search_with_retry(&cap, &query(), &fast_retry()).is_ok());
        assert_eq!(cap.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn exhausted_retries_surface_search_unavailable() {
        let cap = Flaky {
            failures_before_success: 10,
            calls: AtomicU32::new(0),
        };
        let err = search_with_retry(&cap, &query(), &fast_retry()).unwrap_err();
        match err {
            OffTargetError::SearchUnavailable { attempts, strand, .. } => {
                assert_eq!(attempts, 3);
                assert_eq!(strand, Strand::Plus);
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(cap.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn issues_four_queries_with_budgets() {
        let cap = Recording {
            queries: Mutex::new(Vec::new()),
        };
        let spec = SequenceSpec::new(GUIDE, 12, "NGG").unwrap();
        let set = CandidateSearch::new(&cap, "hg38", 3, 1)
            .unwrap()
            .parallel(false)
            .collect(&spec)
            .unwrap();
        assert_eq!(set.total_hits(), 0);

        let queries = cap.queries.lock().unwrap().clone();
        assert_eq!(queries.len(), 4);
        assert!(queries.contains(&(Strand::Plus, spec.full_sequence(), 3)));
        assert!(queries.contains(&(Strand::Minus, spec.full_sequence(), 3)));
        assert!(queries.contains(&(Strand::Plus, spec.seed_sequence(), 1)));
        assert!(queries.contains(&(Strand::Minus, spec.seed_sequence(), 1)));
    }

    #[test]
    fn parallel_collection_joins_all_queries() {
        let cap = Recording {
            queries: Mutex::new(Vec::new()),
        };
        let spec = SequenceSpec::new(GUIDE, 8, "NGG").unwrap();
        CandidateSearch::new(&cap, "hg38", 2, 0)
            .unwrap()
            .collect(&spec)
            .unwrap();
        assert_eq!(cap.queries.lock().unwrap().len(), 4);
    }

    #[test]
    fn rejects_budget_above_three() {
        let cap = Recording {
            queries: Mutex::new(Vec::new()),
        };
        assert!(CandidateSearch::new(&cap, "hg38", 4, 1).is_err());
        assert!(CandidateSearch::new(&cap, "", 3, 1).is_err());
    }
}
