//! # Local PRG
//!
//! One locus of the pangenome: the marker-delimited PRG string parsed into
//! an interval DAG, and the kmer graph sketched over it. Site markers
//! follow the usual convention: an odd number opens and closes a site, the
//! following even number separates its alleles, and nested sites use
//! fresh marker pairs.

use std::collections::{BTreeSet, HashSet};

use tracing::{debug, warn};

use crate::data::hash::canonical_kmer_hash;
use crate::data::{Interval, MiniRecord, PrgPath};
use crate::error::{PangeneError, Result};
use crate::io::vcf::{Vcf, VcfRecord};
use crate::model::kmer_graph::KmerGraph;
use crate::model::local_graph::LocalGraph;

/// Sketching refuses loci with more complete walks than this; such a PRG
/// is malformed for gene-sized input.
const MAX_WALKS: usize = 10_000;

/// Cap on enumerated alternative alleles per bubble when building VCF
/// records; alleles past the cap surface later as TOO_MANY_ALTS calls.
const MAX_ALTS_PER_SITE: usize = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Token {
    Text { start: u32, end: u32 },
    Marker { value: u32, start: u32 },
}

fn tokenize(s: &str) -> Vec<Token> {
    let bytes = s.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0usize;
    while i < bytes.len() {
        if bytes[i].is_ascii_whitespace() {
            i += 1;
            continue;
        }
        let start = i;
        while i < bytes.len() && !bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        let run = &s[start..i];
        if run.bytes().all(|b| b.is_ascii_digit()) {
            tokens.push(Token::Marker {
                value: run.parse().unwrap_or(0),
                start: start as u32,
            });
        } else {
            tokens.push(Token::Text {
                start: start as u32,
                end: i as u32,
            });
        }
    }
    tokens
}

/// One locus: its raw PRG string, sequence graph and kmer graph.
#[derive(Clone, Debug)]
pub struct LocalPrg {
    pub id: u32,
    pub name: String,
    pub seq: String,
    pub prg: LocalGraph,
    pub kmer_prg: KmerGraph,
    /// `(opening flank node, closing flank node)` per variant site, in
    /// parse order (a nested site precedes the site enclosing it).
    sites: Vec<(u32, u32)>,
}

impl LocalPrg {
    pub fn new(id: u32, name: impl Into<String>, prg_string: impl Into<String>) -> Result<Self> {
        let seq = prg_string.into();
        let tokens = tokenize(&seq);
        let mut prg = LocalPrg {
            id,
            name: name.into(),
            seq,
            prg: LocalGraph::new(),
            kmer_prg: KmerGraph::new(),
            sites: Vec::new(),
        };
        let mut next_id = 0u32;
        prg.build_region(&tokens, 0, &mut next_id, None)?;
        Ok(prg)
    }

    pub fn num_variant_sites(&self) -> usize {
        self.sites.len()
    }

    pub fn sites(&self) -> &[(u32, u32)] {
        &self.sites
    }

    /// Create a node for `[start, end)` of the raw string (empty when
    /// `start == end`), optionally linked from `attach`.
    fn push_node(&mut self, next_id: &mut u32, start: u32, end: u32, attach: Option<u32>) -> u32 {
        let id = *next_id;
        *next_id += 1;
        let seq = self.seq[start as usize..end as usize].to_string();
        self.prg.add_node(id, seq, Interval::new(start, end));
        if let Some(prev) = attach {
            self.prg.add_edge(prev, id);
        }
        id
    }

    /// Build a chain of nodes for a token region, linking each new node
    /// from `attach`, and return `(entry, exit)` node ids.
    fn build_region(
        &mut self,
        tokens: &[Token],
        region_anchor: u32,
        next_id: &mut u32,
        attach: Option<u32>,
    ) -> Result<(u32, u32)> {
        // leading text, or an anchor node so the region has an entry
        let (entry, mut idx) = match tokens.first() {
            Some(&Token::Text { start, end }) => {
                (self.push_node(next_id, start, end, attach), 1usize)
            }
            _ => (
                self.push_node(next_id, region_anchor, region_anchor, attach),
                0usize,
            ),
        };
        let mut last = entry;

        while idx < tokens.len() {
            match tokens[idx] {
                Token::Marker { value, .. } if value % 2 == 1 => {
                    let (allele_spans, close_idx, close_start) =
                        self.scan_site(tokens, idx, value)?;
                    let pre = last;
                    let mut allele_exits = Vec::with_capacity(allele_spans.len());
                    for (span_start, span_end, anchor) in allele_spans {
                        let (_, exit) = self.build_region(
                            &tokens[span_start..span_end],
                            anchor,
                            next_id,
                            Some(pre),
                        )?;
                        allele_exits.push(exit);
                    }
                    // the join node: trailing text if present, else an
                    // empty anchor just past the close marker
                    let join = match tokens.get(close_idx + 1) {
                        Some(&Token::Text { start, end }) => {
                            idx = close_idx + 2;
                            self.push_node(next_id, start, end, None)
                        }
                        _ => {
                            idx = close_idx + 1;
                            self.push_node(next_id, close_start, close_start, None)
                        }
                    };
                    for exit in allele_exits {
                        self.prg.add_edge(exit, join);
                    }
                    self.sites.push((pre, join));
                    last = join;
                }
                Token::Marker { value, start } => {
                    return Err(PangeneError::invalid_data(format!(
                        "unexpected allele separator {} at offset {} in PRG {}",
                        value, start, self.name
                    )));
                }
                Token::Text { start, end } => {
                    last = self.push_node(next_id, start, end, Some(last));
                    idx += 1;
                }
            }
        }

        Ok((entry, last))
    }

    /// From the opening marker at `open_idx`, find the allele token spans
    /// and the closing marker. Returns `(spans, close_idx, close_start)`
    /// where each span is `(token_start, token_end, char_anchor)`.
    #[allow(clippy::type_complexity)]
    fn scan_site(
        &self,
        tokens: &[Token],
        open_idx: usize,
        marker: u32,
    ) -> Result<(Vec<(usize, usize, u32)>, usize, u32)> {
        let mut spans = Vec::new();
        let mut open_nested: HashSet<u32> = HashSet::new();
        let mut allele_start = open_idx + 1;
        let mut anchor = match tokens.get(open_idx) {
            Some(&Token::Marker { start, .. }) => start + marker.to_string().len() as u32 + 1,
            _ => 0,
        };
        let mut i = open_idx + 1;
        while i < tokens.len() {
            if let Token::Marker { value, start } = tokens[i] {
                if open_nested.is_empty() && value == marker {
                    spans.push((allele_start, i, anchor));
                    return Ok((spans, i, start + marker.to_string().len() as u32 + 1));
                }
                if open_nested.is_empty() && value == marker + 1 {
                    spans.push((allele_start, i, anchor));
                    allele_start = i + 1;
                    anchor = start + value.to_string().len() as u32 + 1;
                } else if value % 2 == 1 && value != marker {
                    // a nested site's own open or close
                    if !open_nested.remove(&value) {
                        open_nested.insert(value);
                    }
                }
            }
            i += 1;
        }
        Err(PangeneError::invalid_data(format!(
            "site {} in PRG {} never closes",
            marker, self.name
        )))
    }

    /// All complete entry-to-exit node walks, for sketching and VCF
    /// construction. Errors out on combinatorial blow-up.
    pub fn enumerate_walks(&self) -> Result<Vec<Vec<u32>>> {
        let Some(first) = self.prg.nodes().next() else {
            return Ok(Vec::new());
        };
        let mut walks = Vec::new();
        let mut stack = vec![(first.id, vec![first.id])];
        while let Some((id, walk)) = stack.pop() {
            let node = self.prg.node(id);
            if node.out_nodes.is_empty() {
                walks.push(walk);
                if walks.len() > MAX_WALKS {
                    return Err(PangeneError::algorithm(format!(
                        "PRG {} has more than {} walks; refusing to sketch",
                        self.name, MAX_WALKS
                    )));
                }
                continue;
            }
            for &next in node.out_nodes.iter().rev() {
                let mut extended = walk.clone();
                extended.push(next);
                stack.push((next, extended));
            }
        }
        // deterministic order regardless of DFS push order
        walks.sort();
        Ok(walks)
    }

    /// Sketch the locus into its kmer graph: every complete walk gets the
    /// `(w, k)` window-minimizer treatment, chosen k-mers become kmer
    /// nodes keyed by their paths, and consecutive minimizers along each
    /// walk are wired together between the terminal source and sink.
    /// Returns the index records for every kmer node placed.
    pub fn minimizer_sketch(&mut self, w: u32, k: u32) -> Result<Vec<MiniRecord>> {
        if self.seq.is_empty() {
            return Err(PangeneError::invalid_data(format!(
                "PRG {} is empty",
                self.name
            )));
        }
        let walks = self.enumerate_walks()?;
        let total_len = self.seq.len() as u32;

        let mut kmer_prg = KmerGraph::new();
        let source = kmer_prg.add_node(PrgPath::terminus(0), 0, 0);
        let sink = kmer_prg.add_node(PrgPath::terminus(total_len), 0, 0);

        let mut records: Vec<MiniRecord> = Vec::new();
        let mut seen: HashSet<(u64, u32, bool)> = HashSet::new();

        for walk in &walks {
            // linearize the walk with a coordinate map back into the PRG
            let mut seq = String::new();
            let mut pos_map: Vec<u32> = Vec::new();
            for &nid in walk {
                let node = self.prg.node(nid);
                seq.push_str(&node.seq);
                pos_map.extend(node.pos.start..node.pos.end);
            }
            let len = seq.len() as u32;
            if len < k {
                // locus shorter than a k-mer on this walk
                kmer_prg.add_edge(source, sink);
                continue;
            }

            let bytes = seq.as_bytes();
            let num_kmers = len - k + 1;
            let hashes: Vec<Option<(u64, bool)>> = (0..num_kmers)
                .map(|i| canonical_kmer_hash(&bytes[i as usize..(i + k) as usize]).ok())
                .collect();

            let eff_w = w.min(num_kmers);
            let mut chosen: BTreeSet<u32> = BTreeSet::new();
            for wpos in 0..=(num_kmers - eff_w) {
                let window = &hashes[wpos as usize..(wpos + eff_w) as usize];
                let Some(smallest) = window.iter().flatten().map(|&(h, _)| h).min() else {
                    continue;
                };
                for (i, entry) in window.iter().enumerate() {
                    if matches!(entry, Some((h, _)) if *h == smallest) {
                        chosen.insert(wpos + i as u32);
                    }
                }
            }

            let mut prev = source;
            for idx in chosen {
                let (hash, strand) = hashes[idx as usize].expect("chosen k-mers hash cleanly");
                let path = path_from_positions(&pos_map[idx as usize..(idx + k) as usize]);
                let kmer = &seq[idx as usize..(idx + k) as usize];
                let num_at = kmer.bytes().filter(|&b| b == b'A' || b == b'T').count() as u32;
                let node_id = kmer_prg.add_node(path.clone(), hash, num_at);
                kmer_prg.add_edge(prev, node_id);
                if seen.insert((hash, node_id, strand)) {
                    records.push(MiniRecord::new(self.id, path, node_id, strand));
                }
                prev = node_id;
            }
            kmer_prg.add_edge(prev, sink);
        }

        kmer_prg.remove_shortcut_edges();
        kmer_prg.check();
        debug!(
            prg = %self.name,
            nodes = kmer_prg.len(),
            records = records.len(),
            "sketched locus"
        );
        self.kmer_prg = kmer_prg;
        Ok(records)
    }

    /// Project a kmer-node walk back onto local-graph nodes, extending to
    /// the locus boundaries. Nodes positively covered by the walk are
    /// kept; uncovered alternatives inside the walk's span are ruled out.
    pub fn localnode_path_from_kmernode_path(&self, kmer_path: &[u32]) -> Vec<u32> {
        if kmer_path.is_empty() {
            return self.prg.top_path();
        }
        let mut covered: BTreeSet<u32> = BTreeSet::new();
        for &kid in kmer_path {
            for interval in self.kmer_prg.node(kid).path.intervals() {
                covered.extend(interval.start..interval.end);
            }
        }
        let span_start = covered.first().copied().unwrap_or(0);
        let span_end = covered.last().map_or(0, |&p| p + 1);

        let Some(first) = self.prg.nodes().next() else {
            return Vec::new();
        };
        let mut path = Vec::new();
        let mut current = first.id;
        loop {
            path.push(current);
            let outs = &self.prg.node(current).out_nodes;
            if outs.is_empty() {
                break;
            }
            let included = outs.iter().find(|&&n| {
                let pos = self.prg.node(n).pos;
                (pos.start..pos.end).any(|p| covered.contains(&p))
            });
            let next = included.copied().or_else(|| {
                outs.iter()
                    .find(|&&n| {
                        let pos = self.prg.node(n).pos;
                        let in_span = pos.start < span_end && pos.end > span_start;
                        // a non-empty node inside the span with no
                        // coverage was rejected by the walk
                        !(in_span && !pos.is_empty())
                    })
                    .copied()
            });
            current = next.unwrap_or(outs[0]);
        }
        path
    }

    /// Reference position (in locus sequence coordinates) of the base
    /// just after each node of `path`.
    fn cumulative_lengths(&self, path: &[u32]) -> Vec<u32> {
        let mut out = Vec::with_capacity(path.len());
        let mut acc = 0u32;
        for &id in path {
            acc += self.prg.node(id).seq.len() as u32;
            out.push(acc);
        }
        out
    }

    /// Emit one VCF record per alternative allele of every variant site
    /// the reference path passes through.
    pub fn build_vcf(&self, vcf: &mut Vcf, ref_path: &[u32]) -> Result<()> {
        let cumulative = self.cumulative_lengths(ref_path);
        for &(pre, post) in &self.sites {
            let Some(pre_idx) = ref_path.iter().position(|&n| n == pre) else {
                continue; // site sits on an allele the reference skipped
            };
            let Some(post_idx) = ref_path[pre_idx..]
                .iter()
                .position(|&n| n == post)
                .map(|o| pre_idx + o)
            else {
                continue;
            };
            let pos = cumulative[pre_idx];
            let ref_nodes = &ref_path[pre_idx + 1..post_idx];
            let ref_seq = self.prg.seq_along_nodes(ref_nodes);
            let ref_prg_path = self.path_of_nodes(ref_nodes, pre);

            let alt_walks = self.walks_between(pre, post)?;
            let mut emitted = 0usize;
            for walk in &alt_walks {
                let interior = &walk[1..walk.len() - 1];
                if interior == ref_nodes {
                    continue;
                }
                if emitted >= MAX_ALTS_PER_SITE {
                    warn!(
                        prg = %self.name,
                        site = ?(pre, post),
                        "allele cap hit; extra alleles will surface as TOO_MANY_ALTS"
                    );
                    break;
                }
                let alt_seq = self.prg.seq_along_nodes(interior);
                let nested = interior
                    .iter()
                    .any(|&n| self.prg.node(n).out_nodes.len() > 1);
                let graphtype = if nested {
                    "GRAPHTYPE=NESTED"
                } else {
                    "GRAPHTYPE=SIMPLE"
                };
                let alt_prg_path = self.path_of_nodes(interior, pre);
                let record =
                    VcfRecord::new(&self.name, pos, &ref_seq, &alt_seq, "", graphtype)
                        .with_allele_paths(vec![ref_prg_path.clone(), alt_prg_path]);
                vcf.add_record(record);
                emitted += 1;
            }
        }
        Ok(())
    }

    /// PRG path of a node run; empty runs anchor just after `pre`.
    fn path_of_nodes(&self, nodes: &[u32], pre: u32) -> PrgPath {
        let mut path = PrgPath::new();
        for &id in nodes {
            let pos = self.prg.node(id).pos;
            if !pos.is_empty() {
                path.add_end_interval(pos);
            }
        }
        if path.is_empty() {
            let anchor = self.prg.node(pre).pos.end;
            path.add_end_interval(Interval::new(anchor, anchor));
        }
        path
    }

    /// All walks from `from` to `to` inclusive, in deterministic order.
    fn walks_between(&self, from: u32, to: u32) -> Result<Vec<Vec<u32>>> {
        let mut walks = Vec::new();
        let mut stack = vec![(from, vec![from])];
        while let Some((id, walk)) = stack.pop() {
            if id == to {
                walks.push(walk);
                if walks.len() > MAX_WALKS {
                    return Err(PangeneError::algorithm(format!(
                        "site walk explosion in PRG {}",
                        self.name
                    )));
                }
                continue;
            }
            for &next in self.prg.node(id).out_nodes.iter().rev() {
                if self.prg.node(next).pos.start <= self.prg.node(to).pos.end {
                    let mut extended = walk.clone();
                    extended.push(next);
                    stack.push((next, extended));
                }
            }
        }
        walks.sort();
        Ok(walks)
    }

    /// Record one sample's walk against the reference path: shared
    /// stretches become reference calls, divergent stretches become
    /// per-site genotypes.
    pub fn add_sample_gts(
        &self,
        vcf: &mut Vcf,
        ref_path: &[u32],
        sample_path: &[u32],
        sample_name: &str,
    ) {
        let cumulative = self.cumulative_lengths(ref_path);
        let ref_pos_before =
            |i: usize| if i == 0 { 0 } else { cumulative[i - 1] };

        let mut i = 0usize; // index into ref_path
        let mut j = 0usize; // index into sample_path
        let mut shared_from = 0u32;
        while i < ref_path.len() && j < sample_path.len() {
            if ref_path[i] == sample_path[j] {
                i += 1;
                j += 1;
                continue;
            }
            // close the shared stretch before the divergence
            let div_pos = ref_pos_before(i);
            if div_pos > shared_from {
                vcf.add_sample_ref_alleles(sample_name, &self.name, shared_from, div_pos);
            }

            // resync at the first sample node that reappears on the
            // reference path
            let mut resync: Option<(usize, usize)> = None;
            'outer: for jj in j..sample_path.len() {
                for ii in i..ref_path.len() {
                    if ref_path[ii] == sample_path[jj] {
                        resync = Some((ii, jj));
                        break 'outer;
                    }
                }
            }
            let (ii, jj) = resync.unwrap_or((ref_path.len(), sample_path.len()));
            let ref_allele = self.prg.seq_along_nodes(&ref_path[i..ii]);
            let alt_allele = self.prg.seq_along_nodes(&sample_path[j..jj]);
            vcf.add_sample_gt(sample_name, &self.name, div_pos, &ref_allele, &alt_allele);
            shared_from = div_pos + ref_allele.len() as u32;
            i = ii;
            j = jj;
        }
        let end = cumulative.last().copied().unwrap_or(0);
        if end > shared_from {
            vcf.add_sample_ref_alleles(sample_name, &self.name, shared_from, end);
        }
    }
}

/// Compress an ascending position run into a path of maximal intervals.
fn path_from_positions(positions: &[u32]) -> PrgPath {
    let mut path = PrgPath::new();
    let mut iter = positions.iter().copied();
    let Some(first) = iter.next() else {
        return path;
    };
    let mut run_start = first;
    let mut prev = first;
    for p in iter {
        if p != prev + 1 {
            path.add_end_interval(Interval::new(run_start, prev + 1));
            run_start = p;
        }
        prev = p;
    }
    path.add_end_interval(Interval::new(run_start, prev + 1));
    path
}
