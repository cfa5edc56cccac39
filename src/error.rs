//! # Centralized Error Handling
//!
//! Unified error types for the entire crate using `thiserror`.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for pangene operations
#[derive(Error, Debug)]
pub enum PangeneError {
    /// I/O errors (file missing, permission denied, read/write failures)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse errors in index, GFA or VCF files
    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    /// Invalid data errors (malformed PRG, mismatched coverage shape)
    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    /// Algorithm errors (runaway path reconstruction, walk explosion)
    #[error("Algorithm error: {message}")]
    Algorithm { message: String },

    /// Configuration errors (invalid CLI arguments)
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// File not found errors
    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    /// The max-likelihood DP could not reach the sink
    #[error("no feasible path through kmer graph for sample {sample}")]
    NoFeasiblePath { sample: String },

    /// Local assembly found more paths than the configured budget
    #[error("local assembly exceeded {max_paths} paths")]
    TooManyPaths { max_paths: usize },

    /// A local-assembly anchor k-mer is absent from the de Bruijn graph
    #[error("no path: anchor k-mer {kmer} absent from assembly graph")]
    NoPath { kmer: String },

    /// Cooperative cancellation was requested
    #[error("operation cancelled")]
    Cancelled,
}

/// Type alias for Results using PangeneError
pub type Result<T> = std::result::Result<T, PangeneError>;

impl PangeneError {
    /// Create a parse error with a line number
    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            line,
            message: message.into(),
        }
    }

    /// Create an invalid data error
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    /// Create an algorithm error
    pub fn algorithm(message: impl Into<String>) -> Self {
        Self::Algorithm {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}
