//! # Configuration Logic
//!
//! CLI argument parsing and validation using clap derive.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{PangeneError, Result};
use crate::io::vcf::GenotypingMode;
use crate::model::GenotypingOptions;

/// Pangene: pangenome-guided variant calling for sequencing reads
#[derive(Parser, Debug, Clone)]
#[command(name = "pangene")]
#[command(version = "0.1.0")]
#[command(about = "Pangenome-guided variant calling and de novo discovery", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable debug logging
    #[arg(long, global = true, default_value = "false")]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Sketch a PRG collection and persist the minimizer index
    Index(IndexArgs),
    /// Map reads to the PRG collection and call variants for one sample
    Map(MapArgs),
    /// Genotype several samples against one PRG collection
    Compare(CompareArgs),
}

#[derive(Args, Debug, Clone)]
pub struct SketchParams {
    /// Window size for the minimizer sketch
    #[arg(long = "w", default_value = "14")]
    pub w: u32,

    /// K-mer size for the minimizer sketch
    #[arg(long = "k", default_value = "15")]
    pub k: u32,

    /// Number of worker threads
    #[arg(long, default_value = "1")]
    pub threads: usize,
}

#[derive(Args, Debug, Clone)]
pub struct GenotypingParams {
    /// Expected rate of sequencing errors
    #[arg(long = "error-rate", default_value = "0.11")]
    pub error_rate: f64,

    /// Genotype model: from the max-likelihood path or from coverages
    #[arg(long, value_enum, default_value = "max-likelihood")]
    pub genotype: GenotypeBy,

    /// Minimum mean coverage for an allele to be believable
    #[arg(long = "min-covg", default_value = "0")]
    pub min_allele_covg: u32,

    /// Fraction of expected depth an allele must reach
    #[arg(long = "min-fraction-covg", default_value = "0.0")]
    pub min_fraction_allele_covg: f64,

    /// Per-base coverage below which a base counts as a gap
    #[arg(long = "min-kmer-covg", default_value = "1")]
    pub min_kmer_covg: u32,

    /// Minimum confidence for a coverage-based genotype call
    #[arg(long = "gt-conf", default_value = "1.0")]
    pub confidence_threshold: f64,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenotypeBy {
    /// Report the genotype implied by the max-likelihood path
    MaxLikelihood,
    /// Report the coverage-based genotype
    Coverage,
}

impl GenotypeBy {
    pub fn mode(self) -> GenotypingMode {
        match self {
            GenotypeBy::MaxLikelihood => GenotypingMode::MaxLikelihoodPath,
            GenotypeBy::Coverage => GenotypingMode::Coverage,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct IndexArgs {
    /// FASTA of PRG strings, one record per locus
    pub prg_file: PathBuf,

    #[command(flatten)]
    pub sketch: SketchParams,

    /// Output directory for per-locus kmer graphs
    #[arg(long, default_value = "pangene")]
    pub outdir: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct MapArgs {
    /// FASTA of PRG strings, one record per locus
    pub prg_file: PathBuf,

    /// Reads to map (FASTA or FASTQ, optionally gzipped)
    pub read_file: PathBuf,

    #[command(flatten)]
    pub sketch: SketchParams,

    #[command(flatten)]
    pub genotyping: GenotypingParams,

    /// Sample name for the VCF column
    #[arg(long = "sample-name", default_value = "sample")]
    pub sample_name: String,

    /// Output directory
    #[arg(long, default_value = "pangene")]
    pub outdir: PathBuf,

    /// Write per-locus kmer coverage GFAs
    #[arg(long = "output-covgs", default_value = "false")]
    pub output_covgs: bool,

    /// Discover novel alleles in poorly covered regions
    #[arg(long, default_value = "false")]
    pub discover: bool,

    /// K-mer size for the local assembly graph
    #[arg(long = "kmer", default_value = "11")]
    pub denovo_kmer_size: usize,

    /// Maximum number of paths per candidate region
    #[arg(long = "max-paths", default_value = "10")]
    pub max_nb_paths: usize,

    /// Maximum insertion size considered in candidate regions
    #[arg(long = "max-insertion", default_value = "15")]
    pub max_insertion_size: u32,

    /// Minimum k-mer abundance kept in the assembly graph
    #[arg(long = "min-dbg-abundance", default_value = "1")]
    pub min_dbg_abundance: u32,
}

#[derive(Args, Debug, Clone)]
pub struct CompareArgs {
    /// FASTA of PRG strings, one record per locus
    pub prg_file: PathBuf,

    /// Tab-separated file of sample name and read file, one per line
    pub sample_index: PathBuf,

    #[command(flatten)]
    pub sketch: SketchParams,

    #[command(flatten)]
    pub genotyping: GenotypingParams,

    /// Output directory
    #[arg(long, default_value = "pangene")]
    pub outdir: PathBuf,
}

impl Cli {
    /// Parse command line arguments and validate
    pub fn parse_and_validate() -> Result<Self> {
        let cli = Self::parse();
        cli.validate()?;
        Ok(cli)
    }

    pub fn validate(&self) -> Result<()> {
        match &self.command {
            Command::Index(args) => {
                require_file(&args.prg_file)?;
                args.sketch.validate()
            }
            Command::Map(args) => {
                require_file(&args.prg_file)?;
                require_file(&args.read_file)?;
                args.sketch.validate()?;
                args.genotyping.validate()
            }
            Command::Compare(args) => {
                require_file(&args.prg_file)?;
                require_file(&args.sample_index)?;
                args.sketch.validate()?;
                args.genotyping.validate()
            }
        }
    }
}

impl SketchParams {
    pub fn validate(&self) -> Result<()> {
        if self.k == 0 || self.k > 32 {
            return Err(PangeneError::config("k must be in 1..=32"));
        }
        if self.w == 0 {
            return Err(PangeneError::config("w must be positive"));
        }
        Ok(())
    }

    /// Worker count, falling back to the machine's parallelism.
    pub fn threads(&self) -> usize {
        if self.threads > 0 {
            self.threads
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        }
    }
}

impl GenotypingParams {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.error_rate) {
            return Err(PangeneError::config("error rate must be in [0, 1)"));
        }
        if !(0.0..=1.0).contains(&self.min_fraction_allele_covg) {
            return Err(PangeneError::config(
                "min fraction allele coverage must be in [0, 1]",
            ));
        }
        Ok(())
    }

    /// Materialize shared genotyping options for the given per-sample
    /// expected depths.
    pub fn to_options(&self, exp_depths: Vec<u32>) -> Arc<GenotypingOptions> {
        Arc::new(GenotypingOptions {
            sample_index_to_exp_depth_covg: exp_depths,
            error_rate: self.error_rate,
            min_allele_covg: self.min_allele_covg,
            min_fraction_allele_covg: self.min_fraction_allele_covg,
            min_kmer_covg: self.min_kmer_covg,
            min_site_total_covg: 0,
            min_site_diff_covg: 0,
            confidence_threshold: self.confidence_threshold,
        })
    }
}

fn require_file(path: &PathBuf) -> Result<()> {
    if !path.exists() {
        return Err(PangeneError::FileNotFound { path: path.clone() });
    }
    Ok(())
}
