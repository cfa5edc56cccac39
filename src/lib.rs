//! # Pangene Library
//!
//! Pangenome-guided variant calling and de novo discovery for short and
//! long sequencing reads.
//!
//! ## Modules
//! - `config`: CLI argument parsing and validation
//! - `data`: intervals, paths, hashing and minimizer records
//! - `error`: error types and result aliases
//! - `io`: FASTA/FASTQ ingestion, the minimizer index, VCF output
//! - `model`: local graphs, kmer graphs, coverage inference, genotyping
//! - `pipelines`: high-level workflow orchestration
//! - `utils`: cancellation, thread pools, numerical helpers

pub mod config;
pub mod data;
pub mod error;
pub mod io;
pub mod model;
pub mod pipelines;
pub mod utils;

// Re-export commonly used types
pub use config::{Cli, Command};
pub use data::{Interval, MiniRecord, Minimizer, PrgPath, Seq};
pub use error::{PangeneError, Result};
pub use io::{GenotypingMode, Index, SaveFilters, Vcf, VcfRecord};
pub use model::{
    GenotypingOptions, KmerGraph, KmerGraphWithCoverage, LocalGraph, LocalPrg, PanGraph,
    SampleInfo, ScoringModel,
};
