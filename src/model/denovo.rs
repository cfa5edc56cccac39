//! # De novo candidate regions
//!
//! Finds stretches of the chosen max-likelihood path that the sample's
//! reads fail to support, extracts the reads overlapping each stretch,
//! and hands the pileup to local assembly to propose novel alleles.

use std::collections::BTreeMap;

use tracing::debug;

use crate::data::hash::reverse_complement;
use crate::data::{Interval, Seq};
use crate::error::Result;
use crate::model::assembly::{get_paths_between, ReadDbg};
use crate::model::local_graph::LocalGraph;
use crate::model::pan_graph::PanNode;
use crate::utils::CancelFlag;

/// Maximal runs of positions with coverage at or below `threshold`, kept
/// when at least `min_length` long.
pub fn identify_regions(covgs: &[u32], threshold: u32, min_length: usize) -> Vec<Interval> {
    let mut regions = Vec::new();
    let mut run_start: Option<usize> = None;
    for (i, &covg) in covgs.iter().enumerate() {
        match (covg <= threshold, run_start) {
            (true, None) => run_start = Some(i),
            (false, Some(start)) => {
                if i - start >= min_length {
                    regions.push(Interval::new(start as u32, i as u32));
                }
                run_start = None;
            }
            _ => {}
        }
    }
    if let Some(start) = run_start {
        if covgs.len() - start >= min_length {
            regions.push(Interval::new(start as u32, covgs.len() as u32));
        }
    }
    regions
}

/// Widen an interval by `buff` on both sides, saturating at zero.
pub fn apply_buffer_to_interval(interval: Interval, buff: u32) -> Interval {
    Interval::new(interval.start.saturating_sub(buff), interval.end + buff)
}

/// The sub-path of `lmp` (a local-node walk) whose sequence covers the
/// buffered `interval` of the walk's concatenated sequence.
pub fn find_interval_in_localpath(
    interval: Interval,
    graph: &LocalGraph,
    lmp: &[u32],
    buff: u32,
) -> Vec<u32> {
    let padded = apply_buffer_to_interval(interval, buff);
    let mut out = Vec::new();
    let mut covered = 0u32;
    for &id in lmp {
        let len = graph.node(id).seq.len() as u32;
        let node_span = Interval::new(covered, covered + len);
        let overlaps = padded.start < node_span.end && node_span.start < padded.end;
        if overlaps || (len == 0 && padded.contains(node_span.start)) {
            out.push(id);
        }
        covered += len;
    }
    out
}

/// Where a read overlaps a locus sub-path, in read coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct ReadCoordinate {
    pub id: u32,
    pub start: u32,
    pub end: u32,
    pub strand: bool,
}

/// Project the hits a locus collected onto a sub-path of its local graph
/// and report, per read, the read-coordinate span of the overlap. The
/// strand is the majority strand of the contributing hits.
pub fn get_read_overlap_coordinates(
    node: &PanNode,
    graph: &LocalGraph,
    sub_path: &[u32],
) -> Vec<ReadCoordinate> {
    let spans: Vec<Interval> = sub_path
        .iter()
        .map(|&id| graph.node(id).pos)
        .filter(|pos| !pos.is_empty())
        .collect();

    // read id -> (min start, max end, fwd votes, total votes)
    let mut per_read: BTreeMap<u32, (u32, u32, usize, usize)> = BTreeMap::new();
    for hit in &node.hits {
        let overlaps = hit.prg_path.intervals().iter().any(|hi| {
            spans
                .iter()
                .any(|span| hi.start < span.end && span.start < hi.end)
        });
        if !overlaps {
            continue;
        }
        let entry = per_read
            .entry(hit.read_id)
            .or_insert((u32::MAX, 0, 0, 0));
        entry.0 = entry.0.min(hit.read_interval.start);
        entry.1 = entry.1.max(hit.read_interval.end);
        entry.2 += hit.strand as usize;
        entry.3 += 1;
    }

    per_read
        .into_iter()
        .map(|(id, (start, end, fwd, total))| ReadCoordinate {
            id,
            start,
            end,
            strand: fwd * 2 >= total,
        })
        .collect()
}

/// A low-coverage stretch of a locus targeted for reassembly.
#[derive(Clone, Debug)]
pub struct CandidateRegion {
    pub name: String,
    /// Span in max-likelihood-sequence coordinates.
    pub interval: Interval,
    pub start_kmer: String,
    pub end_kmer: String,
    pub pileup: Vec<String>,
    pub candidate_paths: Vec<String>,
}

impl CandidateRegion {
    /// Anchor a region on the ML sequence: flanking k-mers just outside
    /// the interval. `None` when a flank does not fit.
    pub fn from_ml_sequence(
        locus_name: &str,
        interval: Interval,
        ml_sequence: &str,
        kmer_size: usize,
    ) -> Option<Self> {
        let k = kmer_size as u32;
        if interval.start < k || interval.end + k > ml_sequence.len() as u32 {
            return None;
        }
        let start_kmer =
            ml_sequence[(interval.start - k) as usize..interval.start as usize].to_string();
        let end_kmer = ml_sequence[interval.end as usize..(interval.end + k) as usize].to_string();
        Some(Self {
            name: format!("{}.{}-{}", locus_name, interval.start, interval.end),
            interval,
            start_kmer,
            end_kmer,
            pileup: Vec::new(),
            candidate_paths: Vec::new(),
        })
    }

    /// Collect the read substrings overlapping the region, oriented to
    /// the graph strand.
    pub fn load_pileup(&mut self, coordinates: &[ReadCoordinate], reads: &[Seq]) {
        for coord in coordinates {
            let Some(read) = reads.iter().find(|r| r.id == coord.id) else {
                continue;
            };
            let end = (coord.end as usize).min(read.seq.len());
            let start = (coord.start as usize).min(end);
            let piece = &read.seq[start..end];
            if piece.is_empty() {
                continue;
            }
            if coord.strand {
                self.pileup.push(piece.to_string());
            } else {
                self.pileup.push(reverse_complement(piece));
            }
        }
    }
}

/// Local-assembly driver for candidate regions.
#[derive(Clone, Debug)]
pub struct DenovoDiscovery {
    pub kmer_size: usize,
    pub read_error_rate: f64,
    pub max_nb_paths: usize,
    pub max_insertion_size: u32,
    pub min_dbg_abundance: u32,
}

impl DenovoDiscovery {
    pub fn new(
        kmer_size: usize,
        read_error_rate: f64,
        max_nb_paths: usize,
        max_insertion_size: u32,
        min_dbg_abundance: u32,
    ) -> Self {
        Self {
            kmer_size,
            read_error_rate,
            max_nb_paths,
            max_insertion_size,
            min_dbg_abundance,
        }
    }

    /// Expected k-mer coverage of a reference of `ref_length` bases under
    /// `read_covg` read coverage.
    pub fn calculate_kmer_coverage(&self, read_covg: u32, ref_length: u32) -> f64 {
        if ref_length == 0 {
            return 0.0;
        }
        let k = self.kmer_size as u32;
        if ref_length < k {
            return 0.0;
        }
        read_covg as f64 * (ref_length - k + 1) as f64 / ref_length as f64
    }

    /// Assemble the region's pileup and store any paths found between the
    /// anchors. `NoPath` and `TooManyPaths` propagate so the caller can
    /// log and skip the region.
    pub fn find_paths_through_candidate_region(
        &self,
        region: &mut CandidateRegion,
        cancel: &CancelFlag,
    ) -> Result<()> {
        let dbg = ReadDbg::build(&region.pileup, self.kmer_size, self.min_dbg_abundance);
        let max_len = region.interval.length() as usize
            + self.max_insertion_size as usize
            + 2 * self.kmer_size;
        let paths = get_paths_between(
            &dbg,
            &region.start_kmer,
            &region.end_kmer,
            max_len,
            self.max_nb_paths,
            cancel,
        )?;
        debug!(
            region = %region.name,
            nodes = dbg.num_nodes(),
            paths = paths.len(),
            "assembled candidate region"
        );
        region.candidate_paths = paths;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::PrgPath;
    use crate::error::PangeneError;
    use crate::model::pan_graph::MinimizerHit;

    #[test]
    fn test_identify_regions_finds_low_coverage_runs() {
        let regions = identify_regions(&[0, 0, 3, 0, 0], 2, 2);
        assert_eq!(
            regions,
            vec![Interval::new(0, 2), Interval::new(3, 5)]
        );
    }

    #[test]
    fn test_identify_regions_drops_short_runs() {
        let regions = identify_regions(&[0, 5, 5, 0, 0, 0], 0, 2);
        assert_eq!(regions, vec![Interval::new(3, 6)]);
    }

    #[test]
    fn test_identify_regions_threshold_zero_default_behavior() {
        let regions = identify_regions(&[1, 0, 0, 1], 0, 1);
        assert_eq!(regions, vec![Interval::new(1, 3)]);
    }

    #[test]
    fn test_apply_buffer_saturates_at_zero() {
        assert_eq!(
            apply_buffer_to_interval(Interval::new(1, 4), 3),
            Interval::new(0, 7)
        );
    }

    #[test]
    fn test_find_interval_in_localpath() {
        // three nodes of 3 bases each along the path
        let mut g = LocalGraph::new();
        g.add_node(0, "AAA", Interval::new(0, 3));
        g.add_node(1, "CCC", Interval::new(5, 8));
        g.add_node(2, "GGG", Interval::new(10, 13));
        g.add_edge(0, 1);
        g.add_edge(1, 2);

        let picked = find_interval_in_localpath(Interval::new(4, 5), &g, &[0, 1, 2], 0);
        assert_eq!(picked, vec![1]);

        let padded = find_interval_in_localpath(Interval::new(4, 5), &g, &[0, 1, 2], 2);
        assert_eq!(padded, vec![0, 1, 2]);
    }

    #[test]
    fn test_read_coordinate_ordering() {
        let a = ReadCoordinate { id: 0, start: 3, end: 9, strand: true };
        let b = ReadCoordinate { id: 0, start: 4, end: 8, strand: true };
        let c = ReadCoordinate { id: 1, start: 0, end: 2, strand: false };
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn test_get_read_overlap_coordinates() {
        let mut g = LocalGraph::new();
        g.add_node(0, "AAAA", Interval::new(0, 4));
        g.add_node(1, "CCCC", Interval::new(6, 10));
        g.add_edge(0, 1);

        let mut node = crate::model::pan_graph::PanNode::new(0, "locus");
        let path_in: PrgPath = "6,10".parse().unwrap();
        let path_out: PrgPath = "0,4".parse().unwrap();
        node.add_hits([
            MinimizerHit::new(7, Interval::new(10, 14), 0, path_in.clone(), 1, true),
            MinimizerHit::new(7, Interval::new(13, 17), 0, path_in, 1, true),
            MinimizerHit::new(9, Interval::new(2, 6), 0, path_out, 1, false),
        ]);

        // only the sub-path over node 1 counts
        let coords = get_read_overlap_coordinates(&node, &g, &[1]);
        assert_eq!(
            coords,
            vec![ReadCoordinate { id: 7, start: 10, end: 17, strand: true }]
        );
    }

    #[test]
    fn test_candidate_region_anchors() {
        let ml = "AAACCCGGGTTT";
        let region =
            CandidateRegion::from_ml_sequence("locus", Interval::new(4, 8), ml, 3).unwrap();
        assert_eq!(region.start_kmer, "AAC");
        assert_eq!(region.end_kmer, "GTT");
        assert_eq!(region.name, "locus.4-8");

        // not enough flank
        assert!(CandidateRegion::from_ml_sequence("locus", Interval::new(1, 8), ml, 3).is_none());
    }

    #[test]
    fn test_calculate_kmer_coverage() {
        let d = DenovoDiscovery::new(4, 0.01, 10, 15, 1);
        let expected = 8.0 * (10.0 - 4.0 + 1.0) / 10.0;
        assert!((d.calculate_kmer_coverage(8, 10) - expected).abs() < 1e-9);
        assert_eq!(d.calculate_kmer_coverage(8, 2), 0.0);
    }

    #[test]
    fn test_find_paths_through_candidate_region() {
        let ml = "AAACGTTTT";
        let mut region =
            CandidateRegion::from_ml_sequence("locus", Interval::new(4, 6), ml, 3).unwrap();
        assert_eq!(region.start_kmer, "AAC");
        assert_eq!(region.end_kmer, "TTT");
        // reads support a different middle than the ML sequence
        region.pileup = vec!["AAACTGTTTT".to_string(), "AAACTGTTTT".to_string()];

        let discovery = DenovoDiscovery::new(3, 0.01, 10, 15, 1);
        discovery
            .find_paths_through_candidate_region(&mut region, &CancelFlag::new())
            .unwrap();
        assert!(region
            .candidate_paths
            .contains(&"AACTGTTT".to_string()));
    }

    #[test]
    fn test_empty_pileup_is_no_path() {
        let ml = "AAACGTTTT";
        let mut region =
            CandidateRegion::from_ml_sequence("locus", Interval::new(4, 6), ml, 3).unwrap();
        let discovery = DenovoDiscovery::new(3, 0.01, 10, 15, 1);
        let err = discovery
            .find_paths_through_candidate_region(&mut region, &CancelFlag::new())
            .unwrap_err();
        assert!(matches!(err, PangeneError::NoPath { .. }));
    }
}
