//! # Local assembly
//!
//! A minimal de Bruijn graph over a pileup of reads, and the bounded DFS
//! that enumerates sequences between two anchor k-mers. The graph is an
//! external collaborator as far as the callers are concerned; anything
//! answering `contains` and `abundance` would do.

use std::collections::HashMap;
use std::io::Write;

use crate::data::hash::reverse_complement;
use crate::error::{PangeneError, Result};
use crate::utils::CancelFlag;

/// DFS cancellation checkpoint cadence, in node expansions.
const CANCEL_STRIDE: usize = 4096;

/// K-mer abundance map over a read pileup. Both strands of every read are
/// indexed, so a walk stays on one strand and anchors can be given in
/// either orientation.
#[derive(Clone, Debug)]
pub struct ReadDbg {
    k: usize,
    kmers: HashMap<String, u32>,
}

impl ReadDbg {
    /// Build from reads, dropping k-mers below `min_abundance`.
    pub fn build(reads: &[String], k: usize, min_abundance: u32) -> Self {
        assert!(k > 0, "k must be positive");
        let mut kmers: HashMap<String, u32> = HashMap::new();
        for read in reads {
            if read.len() < k {
                continue;
            }
            for seq in [read.clone(), reverse_complement(read)] {
                for i in 0..=seq.len() - k {
                    let kmer = &seq[i..i + k];
                    if kmer.bytes().all(|b| matches!(b, b'A' | b'C' | b'G' | b'T')) {
                        *kmers.entry(kmer.to_string()).or_insert(0) += 1;
                    }
                }
            }
        }
        kmers.retain(|_, &mut count| count >= min_abundance);
        Self { k, kmers }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn num_nodes(&self) -> usize {
        self.kmers.len()
    }

    pub fn contains(&self, kmer: &str) -> bool {
        self.kmers.contains_key(kmer)
    }

    pub fn abundance(&self, kmer: &str) -> u32 {
        self.kmers.get(kmer).copied().unwrap_or(0)
    }

    /// Forward extensions of a k-mer present in the graph.
    fn successors(&self, kmer: &str) -> Vec<(String, u8)> {
        let suffix = &kmer[1..];
        [b'A', b'C', b'G', b'T']
            .iter()
            .filter_map(|&base| {
                let mut next = String::with_capacity(self.k);
                next.push_str(suffix);
                next.push(base as char);
                if self.contains(&next) {
                    Some((next, base))
                } else {
                    None
                }
            })
            .collect()
    }
}

/// Enumerate up to `max_paths` sequences of length at most `max_len`
/// connecting `start_kmer` to `end_kmer` through the graph.
///
/// Both anchors must be present (`NoPath` otherwise); exceeding the path
/// budget is `TooManyPaths`, so callers can skip the region rather than
/// drown in alternatives.
pub fn get_paths_between(
    dbg: &ReadDbg,
    start_kmer: &str,
    end_kmer: &str,
    max_len: usize,
    max_paths: usize,
    cancel: &CancelFlag,
) -> Result<Vec<String>> {
    for anchor in [start_kmer, end_kmer] {
        if !dbg.contains(anchor) {
            return Err(PangeneError::NoPath {
                kmer: anchor.to_string(),
            });
        }
    }
    if max_len < start_kmer.len() {
        return Ok(Vec::new());
    }

    let mut paths: Vec<String> = Vec::new();
    // (current kmer, sequence accumulated so far)
    let mut stack: Vec<(String, String)> = vec![(start_kmer.to_string(), start_kmer.to_string())];
    let mut expansions = 0usize;

    while let Some((kmer, seq)) = stack.pop() {
        if expansions % CANCEL_STRIDE == 0 {
            cancel.checkpoint()?;
        }
        expansions += 1;

        // a walk ends the moment it reaches the far anchor
        if kmer == end_kmer && seq.len() > dbg.k() {
            if paths.len() == max_paths {
                return Err(PangeneError::TooManyPaths { max_paths });
            }
            paths.push(seq);
            continue;
        }
        if seq.len() >= max_len {
            continue;
        }
        for (next, base) in dbg.successors(&kmer) {
            let mut extended = seq.clone();
            extended.push(base as char);
            stack.push((next, extended));
        }
    }

    paths.sort();
    Ok(paths)
}

/// Write assembled paths as FASTA, wrapping sequence lines at
/// `line_width` columns.
pub fn write_paths_to_fasta(
    writer: &mut impl Write,
    region_name: &str,
    paths: &[String],
    line_width: usize,
) -> Result<()> {
    for (i, path) in paths.iter().enumerate() {
        writeln!(writer, ">{}.path{}", region_name, i)?;
        let bytes = path.as_bytes();
        for chunk in bytes.chunks(line_width.max(1)) {
            writer.write_all(chunk)?;
            writeln!(writer)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dbg_from(reads: &[&str], k: usize) -> ReadDbg {
        let reads: Vec<String> = reads.iter().map(|s| s.to_string()).collect();
        ReadDbg::build(&reads, k, 1)
    }

    #[test]
    fn test_build_indexes_both_strands() {
        let dbg = dbg_from(&["AACCG"], 3);
        assert!(dbg.contains("AAC"));
        assert!(dbg.contains("GTT")); // from the reverse strand
        assert_eq!(dbg.abundance("AAC"), dbg.abundance("GTT"));
    }

    #[test]
    fn test_min_abundance_prunes() {
        let reads: Vec<String> = vec!["AACCG".to_string(), "AACTG".to_string()];
        let dbg = ReadDbg::build(&reads, 3, 2);
        assert!(dbg.contains("AAC")); // seen in both reads
        assert!(!dbg.contains("ACC")); // once only
    }

    #[test]
    fn test_get_paths_between_linear() {
        let dbg = dbg_from(&["AACGTT"], 3);
        let paths =
            get_paths_between(&dbg, "AAC", "GTT", 20, 10, &CancelFlag::new()).unwrap();
        assert_eq!(paths, vec!["AACGTT".to_string()]);
    }

    #[test]
    fn test_missing_anchor_is_no_path() {
        let dbg = dbg_from(&["AACGTT"], 3);
        let err =
            get_paths_between(&dbg, "GGG", "GTT", 20, 10, &CancelFlag::new()).unwrap_err();
        assert!(matches!(err, PangeneError::NoPath { .. }));
    }

    #[test]
    fn test_branching_pileup_yields_both_paths() {
        let dbg = dbg_from(&["AACGTT", "AACTGTT"], 3);
        let paths =
            get_paths_between(&dbg, "AAC", "GTT", 20, 10, &CancelFlag::new()).unwrap();
        assert!(paths.contains(&"AACGTT".to_string()));
        assert!(paths.contains(&"AACTGTT".to_string()));
    }

    #[test]
    fn test_too_many_paths_is_reported() {
        let dbg = dbg_from(&["AACGTT", "AACTGTT"], 3);
        let result = get_paths_between(&dbg, "AAC", "GTT", 20, 1, &CancelFlag::new());
        assert!(matches!(
            result,
            Err(PangeneError::TooManyPaths { max_paths: 1 })
        ));
    }

    #[test]
    fn test_max_len_bounds_results() {
        let dbg = dbg_from(&["AACGTT", "AACTGTT"], 3);
        let paths =
            get_paths_between(&dbg, "AAC", "GTT", 6, 10, &CancelFlag::new()).unwrap();
        assert_eq!(paths, vec!["AACGTT".to_string()]); // the 7-base route is cut
    }

    #[test]
    fn test_cancellation_stops_search() {
        let dbg = dbg_from(&["AACGTT"], 3);
        let cancel = CancelFlag::new();
        cancel.cancel();
        let result = get_paths_between(&dbg, "AAC", "GTT", 20, 10, &cancel);
        assert!(matches!(result, Err(PangeneError::Cancelled)));
    }

    #[test]
    fn test_write_paths_to_fasta_wraps_lines() {
        let paths = vec!["ACGTACGTAC".to_string()];
        let mut buf = Vec::new();
        write_paths_to_fasta(&mut buf, "region", &paths, 4).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec![">region.path0", "ACGT", "ACGT", "AC"]);
    }
}
