//! # Minimizer records
//!
//! The two "minimizer source" records: `Minimizer` for a k-mer sketched out
//! of a read, `MiniRecord` for a k-mer position inside an indexed PRG.

use std::fmt;
use std::str::FromStr;

use crate::data::{Interval, PrgPath};
use crate::error::PangeneError;

/// A minimizer sourced from a read.
///
/// Ordered by `(hash, pos, strand)` so sketches are ordered sets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Minimizer {
    /// Canonical hash of the k-mer.
    pub hash: u64,
    /// Position of the k-mer in the read.
    pub pos: Interval,
    /// Strand of the canonical representative.
    pub strand: bool,
}

impl Minimizer {
    pub fn new(hash: u64, start: u32, end: u32, strand: bool) -> Self {
        Self {
            hash,
            pos: Interval::new(start, end),
            strand,
        }
    }
}

impl fmt::Display for Minimizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({} {} {})", self.hash, self.pos, self.strand as u8)
    }
}

/// Records that a minimizer hash occurs at `path` in PRG `prg_id`, as
/// kmer-graph node `knode_id`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MiniRecord {
    pub prg_id: u32,
    pub path: PrgPath,
    pub knode_id: u32,
    pub strand: bool,
}

impl MiniRecord {
    pub fn new(prg_id: u32, path: PrgPath, knode_id: u32, strand: bool) -> Self {
        Self {
            prg_id,
            path,
            knode_id,
            strand,
        }
    }
}

impl fmt::Display for MiniRecord {
    /// `<prg_id>,<knode_id>,<path>,<strand>`, the index record encoding.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{}",
            self.prg_id, self.knode_id, self.path, self.strand as u8
        )
    }
}

impl FromStr for MiniRecord {
    type Err = PangeneError;

    /// The path component carries its own commas, but it is the only
    /// variable-length field: ids sit at the front and strand at the back.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').collect();
        if parts.len() < 4 {
            return Err(PangeneError::invalid_data(format!(
                "bad index record: {s:?}"
            )));
        }
        let prg_id = parts[0]
            .parse::<u32>()
            .map_err(|_| PangeneError::invalid_data(format!("bad prg id in record: {s:?}")))?;
        let knode_id = parts[1]
            .parse::<u32>()
            .map_err(|_| PangeneError::invalid_data(format!("bad knode id in record: {s:?}")))?;
        let strand = match *parts.last().expect("len checked above") {
            "0" => false,
            "1" => true,
            other => {
                return Err(PangeneError::invalid_data(format!(
                    "bad strand {other:?} in record: {s:?}"
                )))
            }
        };
        let path: PrgPath = parts[2..parts.len() - 1].join(",").parse()?;
        Ok(Self {
            prg_id,
            path,
            knode_id,
            strand,
        })
    }
}
