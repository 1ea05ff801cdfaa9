use std::io;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use offtarget::config::{AnnotationConfig, IntersectionBackend, PipelineConfig, SearchBackend};
use offtarget::export::{self, OutputFormat};
use offtarget::{
    BedtoolsEngine, GgGenomeClient, IntervalEngine, LocalGenome, PairwiseEngine, Pipeline,
    PipelineRequest, RunStatus, SearchCapability,
};

#[derive(Parser, Debug)]
#[command(version, about = "Find and annotate CRISPR-Cas9 off-target candidates", long_about = None)]
struct Cli {
    /// 20-nt spacer (guide without PAM)
    #[arg(long, value_name = "SEQ")]
    spacer: String,

    #[arg(long, value_name = "PATTERN", help = "PAM pattern, N is a wildcard [default: NGG]")]
    pam: Option<String>,

    #[arg(long, value_name = "N", help = "Seed length, 8..=12 [default: 12]")]
    seed_length: Option<usize>,

    #[arg(long, value_name = "NAME", help = "Genome assembly [default: hg38]")]
    assembly: Option<String>,

    #[arg(long, value_name = "N", help = "Mismatch budget of the full-length search [default: 3]")]
    full_mismatches: Option<u8>,

    #[arg(long, value_name = "N", help = "Mismatch budget of the seed search [default: 1]")]
    seed_mismatches: Option<u8>,

    /// Search a local FASTA (plain or .gz) instead of GGGenome
    #[arg(long, value_name = "FASTA", conflicts_with = "gggenome_url")]
    genome: Option<PathBuf>,

    #[arg(long, value_name = "URL")]
    gggenome_url: Option<String>,

    /// bedtools executable (defaults to $OFFTARGET_BEDTOOLS, then PATH)
    #[arg(long, value_name = "PATH", conflicts_with = "pairwise")]
    bedtools: Option<PathBuf>,

    /// Skip bedtools and compare intervals in process
    #[arg(long)]
    pairwise: bool,

    #[arg(long, value_name = "BED", requires = "introns")]
    exons: Option<PathBuf>,

    #[arg(long, value_name = "BED", requires = "exons")]
    introns: Option<PathBuf>,

    /// Output prefix; without it the candidate table goes to stdout
    #[arg(short, long, value_name = "PREFIX")]
    output: Option<PathBuf>,

    #[arg(long, value_enum)]
    format: Option<OutputFormat>,

    /// JSON configuration file; flags override its values
    #[arg(long, value_name = "JSON")]
    config: Option<PathBuf>,

    /// Write the effective configuration to this path
    #[arg(long, value_name = "PATH")]
    write_config: Option<PathBuf>,

    /// Run the four genome searches one after another
    #[arg(long)]
    sequential: bool,

    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn effective_config(&self) -> Result<PipelineConfig> {
        let mut cfg = match &self.config {
            Some(path) => PipelineConfig::load(path)
                .with_context(|| format!("loading configuration {}", path.display()))?,
            None => PipelineConfig::default(),
        };

        if let Some(pam) = &self.pam {
            cfg.pam = pam.clone();
        }
        if let Some(seed_length) = self.seed_length {
            cfg.seed_length = seed_length;
        }
        if let Some(assembly) = &self.assembly {
            cfg.assembly = assembly.clone();
        }
        if let Some(n) = self.full_mismatches {
            cfg.full_mismatches = n;
        }
        if let Some(n) = self.seed_mismatches {
            cfg.seed_mismatches = n;
        }
        if let Some(path) = &self.genome {
            cfg.search = SearchBackend::LocalFasta { path: path.clone() };
        } else if let Some(url) = &self.gggenome_url {
            let timeout_secs = match &cfg.search {
                SearchBackend::Gggenome { timeout_secs, .. } => *timeout_secs,
                SearchBackend::LocalFasta { .. } => 60,
            };
            cfg.search = SearchBackend::Gggenome {
                base_url: url.clone(),
                timeout_secs,
            };
        }
        if self.pairwise {
            cfg.intersection = IntersectionBackend::Pairwise;
        } else if let Some(path) = &self.bedtools {
            cfg.intersection = IntersectionBackend::Bedtools {
                executable: Some(path.clone()),
            };
        }
        if let (Some(exons), Some(introns)) = (&self.exons, &self.introns) {
            cfg.annotation = Some(AnnotationConfig {
                exons: exons.clone(),
                introns: introns.clone(),
            });
        }
        if let Some(format) = self.format {
            cfg.output.format = format;
        }
        if self.sequential {
            cfg.parallel_search = false;
        }
        Ok(cfg)
    }

    fn request(&self, cfg: &PipelineConfig) -> PipelineRequest {
        PipelineRequest {
            spacer: self.spacer.clone(),
            seed_length: cfg.seed_length,
            pam: cfg.pam.clone(),
            genome_assembly: cfg.assembly.clone(),
            full_mismatch_budget: cfg.full_mismatches,
            seed_mismatch_budget: cfg.seed_mismatches,
        }
    }
}

fn search_capability(cfg: &PipelineConfig) -> Result<Box<dyn SearchCapability>> {
    match &cfg.search {
        SearchBackend::Gggenome {
            base_url,
            timeout_secs,
        } => {
            let client = GgGenomeClient::new(base_url, Duration::from_secs(*timeout_secs))
                .context("building GGGenome HTTP client")?;
            Ok(Box::new(client))
        }
        SearchBackend::LocalFasta { path } => {
            let genome = LocalGenome::load(path)
                .with_context(|| format!("loading genome {}", path.display()))?;
            Ok(Box::new(genome))
        }
    }
}

/// The configured engine, plus a warning when bedtools had to be replaced.
fn interval_engine(cfg: &PipelineConfig) -> (Box<dyn IntervalEngine>, Option<String>) {
    let pairwise = PairwiseEngine {
        max_comparisons: cfg.pairwise_limit,
    };
    match &cfg.intersection {
        IntersectionBackend::Pairwise => (Box::new(pairwise), None),
        IntersectionBackend::Bedtools { executable } => {
            match BedtoolsEngine::locate(executable.as_deref()) {
                Ok(engine) => (Box::new(engine), None),
                Err(err) => (
                    Box::new(pairwise),
                    Some(format!("{err}; using pairwise interval comparison")),
                ),
            }
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let cfg = cli.effective_config()?;
    if let Some(path) = &cli.write_config {
        cfg.write(path)
            .with_context(|| format!("writing configuration {}", path.display()))?;
        info!("Wrote effective configuration to {}", path.display());
    }

    let request = cli.request(&cfg);
    let search = search_capability(&cfg)?;
    let (engine, engine_warning) = interval_engine(&cfg);

    let mut pipeline = Pipeline::new(search.as_ref(), engine.as_ref())
        .with_retry(cfg.retry.into())
        .parallel(cfg.parallel_search)
        .pairwise_limit(cfg.pairwise_limit);
    if let Some(warning) = engine_warning {
        pipeline = pipeline.with_warning(warning);
    }
    if let Some(annotation) = &cfg.annotation {
        pipeline = pipeline.with_annotation_files(annotation.exons.clone(), annotation.introns.clone());
    }

    let outcome = match pipeline.run(&request) {
        Ok(outcome) => outcome,
        Err(err) => {
            error!("Pipeline failed during {}: {}", err.stage(), err);
            return Err(anyhow::Error::new(err).context("off-target search failed"));
        }
    };

    for warning in &outcome.warnings {
        warn!("{}", warning);
    }
    match outcome.status {
        RunStatus::Candidates(n) => info!("Found {} off-target candidate(s)", n),
        RunStatus::NoCandidates => info!("No off-target candidates found"),
    }

    let options = cfg.output;
    match &cli.output {
        Some(prefix) => {
            export::write_outputs(prefix, &request, &outcome, &options)
                .context("writing results")?;
        }
        None => {
            let mut df = export::candidate_frame(&outcome.table, &request.genome_assembly, options.primer_flank)
                .context("building candidate table")?;
            export::write_frame(&mut df, io::stdout().lock(), options.format)
                .context("writing candidate table to stdout")?;
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(io::stderr)
        .init();

    info!("Starting off-target search for {}", cli.spacer);
    run(&cli)
}
