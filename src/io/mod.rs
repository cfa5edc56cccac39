//! # I/O Module
//!
//! File formats: FASTA/FASTQ ingestion, the minimizer index, and the
//! VCF record set with its aligned-FASTA writer.

pub mod fastaq;
pub mod index;
pub mod vcf;

pub use index::Index;
pub use vcf::{GenotypingMode, SaveFilters, Vcf, VcfRecord};
