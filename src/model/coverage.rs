//! # Coverage overlay and max-likelihood paths
//!
//! `KmerGraphWithCoverage` layers per-sample, strand-separated read counts
//! over an immutable `KmerGraph` and finds the source-to-sink walk that
//! maximises the per-node mean log-likelihood under one of three scoring
//! models. Ties prefer the longer walk, which keeps the result
//! deterministic.

use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use rand::Rng;

use crate::data::PrgPath;
use crate::error::{PangeneError, Result};
use crate::model::kmer_graph::KmerGraph;
use crate::utils::maths::{log_trinomial, negative_binomial_log_pmf};
use crate::utils::CancelFlag;

/// Default per-node mean score a walk must beat at the sink boundary.
const DEFAULT_THRESH: f64 = -25.0;

/// Mean-score comparisons treat differences below this as ties.
const TIE_EPS: f64 = 1e-6;

/// Reconstruction aborts beyond this many nodes (runaway guard for the
/// linear model's unbounded negative scores).
const MAX_PATH_NODES: usize = 1_000_000;

/// Cancellation checkpoint cadence in DP node visits.
const CANCEL_STRIDE: usize = 4096;

/// Scoring model for the per-node log-likelihood.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScoringModel {
    /// Binomial-with-error model (the default genotyping model).
    BinomialWithError,
    /// Negative binomial with `(nb_p, nb_r)` fitted externally.
    NegativeBinomial,
    /// `log(covg / num_reads)`; used for rough coverage ranking.
    Linear,
}

/// Per-sample strand-separated coverage over a borrowed kmer graph.
#[derive(Debug)]
pub struct KmerGraphWithCoverage<'a> {
    pub kmer_prg: &'a KmerGraph,
    /// `covg[node_id][sample_id] = (fwd, rev)`
    covgs: Vec<Vec<(u32, u32)>>,
    pub num_reads: u32,
    pub exp_depth_covg: u32,
    pub thresh: f64,
    p: f64,
    nb_p: f64,
    nb_r: f64,
}

impl<'a> KmerGraphWithCoverage<'a> {
    pub fn new(kmer_prg: &'a KmerGraph, num_samples: usize) -> Self {
        Self {
            kmer_prg,
            covgs: vec![vec![(0, 0); num_samples]; kmer_prg.len()],
            num_reads: 0,
            exp_depth_covg: 1,
            thresh: DEFAULT_THRESH,
            p: 1.0,
            nb_p: 0.015,
            nb_r: 2.0,
        }
    }

    pub fn covg(&self, node_id: u32, sample_id: usize) -> (u32, u32) {
        self.covgs[node_id as usize][sample_id]
    }

    pub fn total_covg(&self, node_id: u32, sample_id: usize) -> u32 {
        let (fwd, rev) = self.covg(node_id, sample_id);
        fwd + rev
    }

    pub fn increment_covg(&mut self, node_id: u32, sample_id: usize, strand: bool) {
        let entry = &mut self.covgs[node_id as usize][sample_id];
        if strand {
            entry.0 += 1;
        } else {
            entry.1 += 1;
        }
    }

    pub fn set_covg(&mut self, node_id: u32, sample_id: usize, fwd: u32, rev: u32) {
        self.covgs[node_id as usize][sample_id] = (fwd, rev);
    }

    pub fn set_num_reads(&mut self, num_reads: u32) {
        self.num_reads = num_reads;
    }

    pub fn set_exp_depth_covg(&mut self, exp_depth_covg: u32) {
        self.exp_depth_covg = exp_depth_covg;
    }

    /// Fix the binomial success parameter from the read error rate:
    /// `p = 1 / exp(e * k)`.
    pub fn set_binomial_parameter(&mut self, e_rate: f64) {
        let k = self.kmer_prg.k();
        assert!(k != 0, "cannot set p before the graph has kmers");
        self.p = 1.0 / (e_rate * k as f64).exp();
    }

    pub fn set_negative_binomial_parameters(&mut self, nb_p: f64, nb_r: f64) {
        self.nb_p = nb_p;
        self.nb_r = nb_r;
    }

    fn is_terminus(&self, node_id: u32) -> bool {
        self.kmer_prg.node(node_id).path.length() == 0
    }

    /// Binomial-with-error log-likelihood of node `j` for one sample.
    pub fn prob(&self, node_id: u32, sample_id: usize) -> f64 {
        if self.is_terminus(node_id) {
            return 0.0;
        }
        let (fwd, rev) = self.covg(node_id, sample_id);
        let c = fwd + rev;
        let n = self.num_reads;
        if c > n {
            // more hits than reads; score it as if every read were a hit
            log_trinomial(c, fwd, rev) + c as f64 * (self.p / 2.0).ln()
        } else {
            log_trinomial(n, fwd, rev)
                + c as f64 * (self.p / 2.0).ln()
                + (n - c) as f64 * (1.0 - self.p).ln()
        }
    }

    /// Negative-binomial log-likelihood of node `j` for one sample.
    pub fn nb_prob(&self, node_id: u32, sample_id: usize) -> f64 {
        if self.is_terminus(node_id) {
            return 0.0;
        }
        let c = self.total_covg(node_id, sample_id);
        let ret = negative_binomial_log_pmf(self.nb_r, self.nb_p, c);
        ret.max(f64::MIN / 1000.0)
    }

    /// Linear log-likelihood `log(covg / num_reads)`.
    pub fn lin_prob(&self, node_id: u32, sample_id: usize) -> f64 {
        if self.is_terminus(node_id) {
            return 0.0;
        }
        (self.total_covg(node_id, sample_id) as f64 / self.num_reads as f64).ln()
    }

    fn score(&self, model: ScoringModel, node_id: u32, sample_id: usize) -> f64 {
        match model {
            ScoringModel::BinomialWithError => self.prob(node_id, sample_id),
            ScoringModel::NegativeBinomial => self.nb_prob(node_id, sample_id),
            ScoringModel::Linear => self.lin_prob(node_id, sample_id),
        }
    }

    /// Maximum-likelihood source-to-sink walk for one sample.
    ///
    /// Returns the mean per-node log-likelihood of the best walk and its
    /// interior nodes (source and sink excluded). A sample with no
    /// coverage anywhere returns `(f64::MIN, [])` and the caller skips the
    /// locus.
    pub fn find_max_path(
        &self,
        sample_id: usize,
        model: ScoringModel,
        cancel: &CancelFlag,
    ) -> Result<(f64, Vec<u32>)> {
        let n = self.kmer_prg.len();
        if n < 2 {
            return Err(PangeneError::algorithm("kmer graph has no terminals"));
        }
        if self.num_reads == 0
            || (0..n as u32).all(|id| self.total_covg(id, sample_id) == 0)
        {
            return Ok((f64::MIN, Vec::new()));
        }

        // Strict reverse topological order: sorted_nodes from the back.
        let mut sorted = self.kmer_prg.clone_sorted_ids();
        let sink = *sorted.last().expect("graph checked non-empty");
        let source = sorted[0];
        sorted.pop(); // the sink itself is never updated

        let mut m = vec![0.0f64; n];
        let mut len = vec![0u32; n];
        let mut prev: Vec<Option<u32>> = vec![None; n];

        for (visited, &u) in sorted.iter().rev().enumerate() {
            if visited % CANCEL_STRIDE == 0 {
                cancel.checkpoint()?;
            }
            let mut max_mean = f64::MIN;
            let mut max_len = 0u32;
            for &v in &self.kmer_prg.node(u).out_nodes {
                let vi = v as usize;
                let v_is_sink = v == sink;
                let v_mean = if len[vi] > 0 {
                    m[vi] / len[vi] as f64
                } else {
                    f64::MIN
                };
                let update = (v_is_sink && self.thresh > max_mean + TIE_EPS)
                    || (!v_is_sink && len[vi] > 0 && v_mean > max_mean + TIE_EPS)
                    || (!v_is_sink
                        && len[vi] > 0
                        && (v_mean - max_mean).abs() <= TIE_EPS
                        && len[vi] > max_len);
                if update {
                    // the source bears no score and adds no length, so the
                    // returned mean is over interior nodes only
                    let own = if u == source { 0 } else { 1 };
                    m[u as usize] = self.score(model, u, sample_id) + m[vi];
                    len[u as usize] = own + len[vi];
                    prev[u as usize] = Some(v);
                    if v_is_sink {
                        max_mean = self.thresh;
                        max_len = 0;
                    } else {
                        max_mean = v_mean;
                        max_len = len[vi];
                    }
                }
            }
        }

        let Some(mut node) = prev[source as usize] else {
            return Err(PangeneError::algorithm(
                "max-path DP never reached the source",
            ));
        };
        if node == sink {
            // source wired straight to sink; nothing to walk
            return Ok((f64::MIN, Vec::new()));
        }

        let mut path = Vec::new();
        while node != sink {
            path.push(node);
            if path.len() > MAX_PATH_NODES {
                return Err(PangeneError::algorithm(
                    "runaway path reconstruction in max-path DP",
                ));
            }
            node = prev[node as usize].ok_or_else(|| {
                PangeneError::algorithm("max-path walk broke before the sink")
            })?;
        }

        let score = m[source as usize] / len[source as usize] as f64;
        Ok((score, path))
    }

    /// Uniform random source-to-sink walk; source and sink excluded.
    pub fn find_random_path(&self, rng: &mut impl Rng) -> Result<Vec<u32>> {
        let sorted = self.kmer_prg.clone_sorted_ids();
        let sink = *sorted
            .last()
            .ok_or_else(|| PangeneError::algorithm("kmer graph is empty"))?;
        let mut node = sorted[0];
        let mut path = Vec::new();
        loop {
            let outs = &self.kmer_prg.node(node).out_nodes;
            if outs.is_empty() {
                return Err(PangeneError::algorithm("random walk hit a dead end"));
            }
            node = outs[rng.gen_range(0..outs.len())];
            if node == sink {
                break;
            }
            path.push(node);
        }
        Ok(path)
    }

    /// Write the kmer graph with coverage as GFA; coverages are summed
    /// over samples.
    pub fn save_gfa(&self, writer: &mut impl Write) -> Result<()> {
        writeln!(writer, "H\tVN:Z:1.0\tbn:Z:--linear --singlearr")?;
        for node in self.kmer_prg.nodes() {
            let (fwd, rev) = self.covgs[node.id as usize]
                .iter()
                .fold((0u32, 0u32), |acc, &(f, r)| (acc.0 + f, acc.1 + r));
            writeln!(
                writer,
                "S\t{}\t{}\tFC:i:{}\tRC:i:{}\t{}",
                node.id, node.path, fwd, rev, node.num_at
            )?;
        }
        for node in self.kmer_prg.nodes() {
            for &to in &node.out_nodes {
                writeln!(writer, "L\t{}\t+\t{}\t+\t0M", node.id, to)?;
            }
        }
        Ok(())
    }

    pub fn save_gfa_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut writer = BufWriter::new(std::fs::File::create(path)?);
        self.save_gfa(&mut writer)
    }
}

/// A kmer graph and its single-sample coverage as loaded from GFA.
#[derive(Debug)]
pub struct LoadedKmerGraph {
    pub graph: KmerGraph,
    /// `(fwd, rev)` per node id.
    pub covgs: Vec<(u32, u32)>,
}

impl LoadedKmerGraph {
    /// Rebuild a coverage view over the loaded graph, placing the file's
    /// coverage in `sample_id` of a `num_samples`-wide overlay.
    pub fn coverage_view(&self, sample_id: usize, num_samples: usize) -> KmerGraphWithCoverage<'_> {
        let mut view = KmerGraphWithCoverage::new(&self.graph, num_samples);
        for (id, &(fwd, rev)) in self.covgs.iter().enumerate() {
            view.set_covg(id as u32, sample_id, fwd, rev);
        }
        view
    }
}

/// Load a kmer graph from GFA. Two passes: the first counts segments and
/// sniffs the id order, the second populates the arena so that
/// `nodes[i].id == i` holds even for files written sink-first.
pub fn load_gfa(reader: impl std::io::Read) -> Result<LoadedKmerGraph> {
    let lines: Vec<String> = BufReader::new(reader)
        .lines()
        .collect::<std::io::Result<_>>()?;

    // Pass 1: count S lines and detect descending id order.
    let mut first_id: Option<u32> = None;
    let mut last_id: Option<u32> = None;
    let mut num_segments = 0usize;
    for (lineno, line) in lines.iter().enumerate() {
        if let Some(rest) = line.strip_prefix("S\t") {
            let id_str = rest.split('\t').next().unwrap_or("");
            let id: u32 = id_str
                .parse()
                .map_err(|_| PangeneError::parse(lineno + 1, format!("bad segment id {id_str:?}")))?;
            if first_id.is_none() {
                first_id = Some(id);
            }
            last_id = Some(id);
            num_segments += 1;
        }
    }
    let descending = matches!((first_id, last_id), (Some(f), Some(l)) if f > l);

    // Pass 2: collect segments (reversed if stored sink-first), then edges.
    struct Segment {
        id: u32,
        path: PrgPath,
        fwd: u32,
        rev: u32,
        num_at: u32,
    }
    let mut segments: Vec<Segment> = Vec::with_capacity(num_segments);
    let mut links: Vec<(u32, u32)> = Vec::new();
    for (lineno, line) in lines.iter().enumerate() {
        let lineno = lineno + 1;
        if let Some(rest) = line.strip_prefix("S\t") {
            let fields: Vec<&str> = rest.split('\t').collect();
            if fields.len() < 4 {
                return Err(PangeneError::parse(lineno, "truncated S line"));
            }
            let id: u32 = fields[0]
                .parse()
                .map_err(|_| PangeneError::parse(lineno, "bad segment id"))?;
            let path: PrgPath = fields[1]
                .parse()
                .map_err(|_| PangeneError::parse(lineno, "bad segment path"))?;
            let fwd: u32 = fields[2]
                .strip_prefix("FC:i:")
                .and_then(|v| v.parse().ok())
                .ok_or_else(|| PangeneError::parse(lineno, "bad FC tag"))?;
            let rev: u32 = fields[3]
                .strip_prefix("RC:i:")
                .and_then(|v| v.parse().ok())
                .ok_or_else(|| PangeneError::parse(lineno, "bad RC tag"))?;
            let num_at: u32 = match fields.get(4) {
                Some(v) => v
                    .parse()
                    .map_err(|_| PangeneError::parse(lineno, "bad num_AT field"))?,
                None => 0,
            };
            segments.push(Segment {
                id,
                path,
                fwd,
                rev,
                num_at,
            });
        } else if let Some(rest) = line.strip_prefix("L\t") {
            let fields: Vec<&str> = rest.split('\t').collect();
            if fields.len() < 4 {
                return Err(PangeneError::parse(lineno, "truncated L line"));
            }
            let from: u32 = fields[0]
                .parse()
                .map_err(|_| PangeneError::parse(lineno, "bad link from-id"))?;
            let to: u32 = fields[2]
                .parse()
                .map_err(|_| PangeneError::parse(lineno, "bad link to-id"))?;
            links.push((from, to));
        }
    }

    if descending {
        segments.reverse();
    }

    let mut graph = KmerGraph::new();
    let mut covgs = vec![(0u32, 0u32); segments.len()];
    for (expect_id, seg) in segments.into_iter().enumerate() {
        if seg.id as usize != expect_id {
            return Err(PangeneError::invalid_data(format!(
                "segment ids are not dense: expected {}, found {}",
                expect_id, seg.id
            )));
        }
        let assigned = graph.add_node(seg.path, 0, seg.num_at);
        debug_assert_eq!(assigned, seg.id);
        covgs[assigned as usize] = (seg.fwd, seg.rev);
    }
    for (from, to) in links {
        if from as usize >= graph.len() || to as usize >= graph.len() {
            return Err(PangeneError::invalid_data(format!(
                "link {} -> {} references unknown segment",
                from, to
            )));
        }
        graph.add_edge(from, to);
    }
    Ok(LoadedKmerGraph { graph, covgs })
}

pub fn load_gfa_from_file(path: impl AsRef<Path>) -> Result<LoadedKmerGraph> {
    let file = std::fs::File::open(path)?;
    load_gfa(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Interval, PrgPath};

    fn path(parts: &[(u32, u32)]) -> PrgPath {
        PrgPath::from_intervals(parts.iter().map(|&(s, e)| Interval::new(s, e)))
    }

    /// source -> three consecutive 15-mers -> sink.
    fn linear_fixture() -> KmerGraph {
        let mut kg = KmerGraph::new();
        let source = kg.add_node(PrgPath::terminus(0), 0, 0);
        let n1 = kg.add_node(path(&[(0, 15)]), 0, 0);
        let n2 = kg.add_node(path(&[(1, 16)]), 0, 0);
        let n3 = kg.add_node(path(&[(2, 17)]), 0, 0);
        let sink = kg.add_node(PrgPath::terminus(18), 0, 0);
        kg.add_edge(source, n1);
        kg.add_edge(n1, n2);
        kg.add_edge(n2, n3);
        kg.add_edge(n3, sink);
        kg
    }

    #[test]
    fn test_find_max_path_linear_graph() {
        let kg = linear_fixture();
        let mut view = KmerGraphWithCoverage::new(&kg, 1);
        view.set_num_reads(10);
        view.set_binomial_parameter(0.01);
        for id in [1u32, 2, 3] {
            view.set_covg(id, 0, 4, 1);
        }

        let (score, path) = view
            .find_max_path(0, ScoringModel::BinomialWithError, &CancelFlag::new())
            .unwrap();
        assert_eq!(path, vec![1, 2, 3]);

        let expected = (view.prob(1, 0) + view.prob(2, 0) + view.prob(3, 0)) / 3.0;
        assert!((score - expected).abs() < 1e-9, "{} vs {}", score, expected);
    }

    #[test]
    fn test_find_max_path_prefers_covered_branch() {
        // source -> {a | b} -> join -> sink, coverage only on b
        let mut kg = KmerGraph::new();
        let source = kg.add_node(PrgPath::terminus(0), 0, 0);
        let a = kg.add_node(path(&[(0, 4)]), 0, 0);
        let b = kg.add_node(path(&[(0, 2), (6, 8)]), 0, 0);
        let join = kg.add_node(path(&[(8, 12)]), 0, 0);
        let sink = kg.add_node(PrgPath::terminus(13), 0, 0);
        kg.add_edge(source, a);
        kg.add_edge(source, b);
        kg.add_edge(a, join);
        kg.add_edge(b, join);
        kg.add_edge(join, sink);

        let mut view = KmerGraphWithCoverage::new(&kg, 1);
        view.set_num_reads(8);
        view.set_binomial_parameter(0.01);
        view.set_covg(b, 0, 3, 3);
        view.set_covg(join, 0, 2, 3);

        let (_, p) = view
            .find_max_path(0, ScoringModel::BinomialWithError, &CancelFlag::new())
            .unwrap();
        assert_eq!(p, vec![b, join]);
    }

    #[test]
    fn test_find_max_path_tie_prefers_longer_walk() {
        // Two zero-coverage branches with equal means; the two-node branch
        // must win the tie.
        let mut kg = KmerGraph::new();
        let source = kg.add_node(PrgPath::terminus(0), 0, 0);
        let short = kg.add_node(path(&[(0, 2), (5, 7)]), 0, 0);
        let long1 = kg.add_node(path(&[(0, 4)]), 0, 0);
        let long2 = kg.add_node(path(&[(1, 5)]), 0, 0);
        let join = kg.add_node(path(&[(5, 9)]), 0, 0);
        let sink = kg.add_node(PrgPath::terminus(10), 0, 0);
        kg.add_edge(source, short);
        kg.add_edge(source, long1);
        kg.add_edge(long1, long2);
        kg.add_edge(long2, join);
        kg.add_edge(short, join);
        kg.add_edge(join, sink);

        let mut view = KmerGraphWithCoverage::new(&kg, 1);
        view.set_num_reads(4);
        view.set_binomial_parameter(0.01);
        // equal coverage everywhere keeps node means identical
        for id in [short, long1, long2, join] {
            view.set_covg(id, 0, 1, 1);
        }

        let (_, p) = view
            .find_max_path(0, ScoringModel::BinomialWithError, &CancelFlag::new())
            .unwrap();
        assert_eq!(p, vec![long1, long2, join]);
    }

    #[test]
    fn test_find_max_path_zero_coverage_is_sentinel() {
        let kg = linear_fixture();
        let mut view = KmerGraphWithCoverage::new(&kg, 1);
        view.set_num_reads(10);
        view.set_binomial_parameter(0.01);

        let (score, path) = view
            .find_max_path(0, ScoringModel::BinomialWithError, &CancelFlag::new())
            .unwrap();
        assert_eq!(score, f64::MIN);
        assert!(path.is_empty());
    }

    #[test]
    fn test_find_max_path_respects_cancellation() {
        let kg = linear_fixture();
        let mut view = KmerGraphWithCoverage::new(&kg, 1);
        view.set_num_reads(10);
        view.set_binomial_parameter(0.01);
        view.set_covg(1, 0, 2, 2);

        let cancel = CancelFlag::new();
        cancel.cancel();
        let err = view
            .find_max_path(0, ScoringModel::BinomialWithError, &cancel)
            .unwrap_err();
        assert!(matches!(err, PangeneError::Cancelled));
    }

    #[test]
    fn test_prob_degenerate_case_more_hits_than_reads() {
        let kg = linear_fixture();
        let mut view = KmerGraphWithCoverage::new(&kg, 1);
        view.set_num_reads(3);
        view.set_binomial_parameter(0.01);
        view.set_covg(1, 0, 4, 2); // c = 6 > n = 3
        let p = view.prob(1, 0);
        assert!(p.is_finite());
        assert!(p < 0.0);
    }

    #[test]
    fn test_terminus_scores_zero() {
        let kg = linear_fixture();
        let mut view = KmerGraphWithCoverage::new(&kg, 1);
        view.set_num_reads(10);
        view.set_binomial_parameter(0.01);
        assert_eq!(view.prob(0, 0), 0.0);
        assert_eq!(view.nb_prob(4, 0), 0.0);
        assert_eq!(view.lin_prob(0, 0), 0.0);
    }

    #[test]
    fn test_nb_prob_is_clamped() {
        let kg = linear_fixture();
        let mut view = KmerGraphWithCoverage::new(&kg, 1);
        view.set_negative_binomial_parameters(0.015, 2.0);
        view.set_covg(1, 0, 100_000, 100_000);
        assert!(view.nb_prob(1, 0) >= f64::MIN / 1000.0);
    }

    #[test]
    fn test_find_random_path_ends_before_sink() {
        let kg = linear_fixture();
        let view = KmerGraphWithCoverage::new(&kg, 1);
        let mut rng = rand::rngs::mock::StepRng::new(0, 1);
        let p = view.find_random_path(&mut rng).unwrap();
        assert_eq!(p, vec![1, 2, 3]);
    }

    #[test]
    fn test_gfa_round_trip() {
        let kg = linear_fixture();
        let mut view = KmerGraphWithCoverage::new(&kg, 1);
        view.set_covg(1, 0, 5, 2);
        view.set_covg(2, 0, 1, 1);

        let mut buf = Vec::new();
        view.save_gfa(&mut buf).unwrap();

        let loaded = load_gfa(&buf[..]).unwrap();
        assert_eq!(loaded.graph, kg);
        assert_eq!(loaded.graph.k(), kg.k());
        assert_eq!(loaded.covgs[1], (5, 2));
        assert_eq!(loaded.covgs[2], (1, 1));

        let reloaded_view = loaded.coverage_view(0, 1);
        assert_eq!(reloaded_view.covg(1, 0), (5, 2));
    }

    #[test]
    fn test_gfa_load_descending_ids() {
        // Hand-written file with ids stored sink-first.
        let gfa = "H\tVN:Z:1.0\tbn:Z:--linear --singlearr\n\
                   S\t2\t5,5\tFC:i:0\tRC:i:0\t0\n\
                   S\t1\t0,4\tFC:i:3\tRC:i:4\t2\n\
                   S\t0\t0,0\tFC:i:0\tRC:i:0\t0\n\
                   L\t0\t+\t1\t+\t0M\n\
                   L\t1\t+\t2\t+\t0M\n";
        let loaded = load_gfa(gfa.as_bytes()).unwrap();
        assert_eq!(loaded.graph.len(), 3);
        assert_eq!(loaded.graph.node(1).path.to_string(), "0,4");
        assert_eq!(loaded.covgs[1], (3, 4));
    }
}
