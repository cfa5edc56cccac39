//! # Model Module
//!
//! The graph stack: local sequence graphs parsed from PRG strings, the
//! kmer graphs sketched over them, coverage overlays with the
//! max-likelihood path inference, per-sample genotyping state, and the
//! cross-locus read graph feeding de novo discovery.

pub mod assembly;
pub mod coverage;
pub mod denovo;
pub mod kmer_graph;
pub mod local_graph;
pub mod local_prg;
pub mod pan_graph;
pub mod sample_info;

pub use coverage::{KmerGraphWithCoverage, ScoringModel};
pub use kmer_graph::{KmerGraph, KmerNode};
pub use local_graph::{LocalGraph, LocalNode};
pub use local_prg::LocalPrg;
pub use pan_graph::{MinimizerHit, PanGraph, PanNode};
pub use sample_info::{GenotypingOptions, SampleInfo};
