//! # Pangraph
//!
//! The read-hit graph across loci: one node per PRG that collected
//! minimizer hits, edges between loci that co-occur on a read. This is
//! the coarse structure the mapper fans out over.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;

use crate::data::{Interval, PrgPath};
use crate::error::Result;

/// A read minimizer matched to a graph minimizer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MinimizerHit {
    pub read_id: u32,
    pub read_interval: Interval,
    pub prg_id: u32,
    pub prg_path: PrgPath,
    pub knode_id: u32,
    /// Read strand relative to the graph k-mer.
    pub strand: bool,
}

impl MinimizerHit {
    pub fn new(
        read_id: u32,
        read_interval: Interval,
        prg_id: u32,
        prg_path: PrgPath,
        knode_id: u32,
        strand: bool,
    ) -> Self {
        Self {
            read_id,
            read_interval,
            prg_id,
            prg_path,
            knode_id,
            strand,
        }
    }
}

impl PartialOrd for MinimizerHit {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MinimizerHit {
    /// Path-major order, so a node's hit set reads off in graph order.
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (
            self.prg_id,
            &self.prg_path,
            self.read_id,
            self.read_interval,
            self.strand,
        )
            .cmp(&(
                other.prg_id,
                &other.prg_path,
                other.read_id,
                other.read_interval,
                other.strand,
            ))
    }
}

/// One locus with the reads and hits that landed on it.
#[derive(Clone, Debug)]
pub struct PanNode {
    pub prg_id: u32,
    pub name: String,
    /// Read ids in arrival order; duplicates record repeated support.
    pub reads: Vec<u32>,
    pub hits: BTreeSet<MinimizerHit>,
}

impl PanNode {
    pub fn new(prg_id: u32, name: impl Into<String>) -> Self {
        Self {
            prg_id,
            name: name.into(),
            reads: Vec::new(),
            hits: BTreeSet::new(),
        }
    }

    /// Number of reads supporting the locus.
    pub fn covg(&self) -> usize {
        self.reads.len()
    }

    pub fn add_read(&mut self, read_id: u32) {
        self.reads.push(read_id);
    }

    pub fn add_hits(&mut self, hits: impl IntoIterator<Item = MinimizerHit>) {
        self.hits.extend(hits);
    }
}

impl PartialEq for PanNode {
    fn eq(&self, other: &Self) -> bool {
        self.prg_id == other.prg_id
    }
}

impl Eq for PanNode {}

/// Locus-level graph over all reads.
#[derive(Clone, Debug, Default)]
pub struct PanGraph {
    pub nodes: BTreeMap<u32, PanNode>,
    /// Observation counts for locus adjacencies on reads.
    edges: BTreeMap<(u32, u32), u32>,
}

impl PanGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a read's hits against a locus, creating the node on first
    /// contact.
    pub fn add_node(
        &mut self,
        prg_id: u32,
        name: &str,
        read_id: u32,
        hits: impl IntoIterator<Item = MinimizerHit>,
    ) {
        let node = self
            .nodes
            .entry(prg_id)
            .or_insert_with(|| PanNode::new(prg_id, name));
        node.add_read(read_id);
        node.add_hits(hits);
    }

    /// Count a co-occurrence of two loci on one read. Direction is
    /// normalized so `(a, b)` and `(b, a)` are the same edge.
    pub fn add_edge(&mut self, from: u32, to: u32) {
        let key = if from <= to { (from, to) } else { (to, from) };
        *self.edges.entry(key).or_insert(0) += 1;
    }

    pub fn edge_covg(&self, from: u32, to: u32) -> u32 {
        let key = if from <= to { (from, to) } else { (to, from) };
        self.edges.get(&key).copied().unwrap_or(0)
    }

    pub fn write_gfa(&self, writer: &mut impl Write) -> Result<()> {
        writeln!(writer, "H\tVN:Z:1.0")?;
        for node in self.nodes.values() {
            writeln!(
                writer,
                "S\t{}\t*\tRC:i:{}",
                node.name,
                node.covg()
            )?;
        }
        for (&(from, to), &covg) in &self.edges {
            let from_name = &self.nodes[&from].name;
            let to_name = &self.nodes[&to].name;
            writeln!(writer, "L\t{}\t+\t{}\t+\t0M\tRC:i:{}", from_name, to_name, covg)?;
        }
        Ok(())
    }
}

impl PartialEq for PanGraph {
    fn eq(&self, other: &Self) -> bool {
        self.nodes.keys().eq(other.nodes.keys())
            && self.edges == other.edges
    }
}

impl Eq for PanGraph {}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(read_id: u32, path: &str, knode_id: u32) -> MinimizerHit {
        MinimizerHit::new(
            read_id,
            Interval::new(1, 5),
            0,
            path.parse().unwrap(),
            knode_id,
            true,
        )
    }

    #[test]
    fn test_add_read_keeps_duplicates() {
        let mut pn = PanNode::new(3, "locus3");
        pn.add_read(0);
        pn.add_read(0);
        pn.add_read(7);
        assert_eq!(pn.reads, vec![0, 0, 7]);
        assert_eq!(pn.covg(), 3);
    }

    #[test]
    fn test_add_hits_dedups_in_path_order() {
        let mut pn = PanNode::new(2, "locus2");
        pn.add_hits([
            hit(0, "4,8", 2),
            hit(0, "0,4", 1),
            hit(0, "0,4", 1), // duplicate
            hit(1, "0,4", 1),
        ]);
        assert_eq!(pn.hits.len(), 3);
        let paths: Vec<String> = pn.hits.iter().map(|h| h.prg_path.to_string()).collect();
        assert_eq!(paths, vec!["0,4", "0,4", "4,8"]);
    }

    #[test]
    fn test_graph_nodes_and_edges() {
        let mut pg = PanGraph::new();
        pg.add_node(0, "locusA", 0, [hit(0, "0,4", 1)]);
        pg.add_node(1, "locusB", 0, [hit(0, "0,4", 1)]);
        pg.add_node(0, "locusA", 1, []);
        pg.add_edge(0, 1);
        pg.add_edge(1, 0);

        assert_eq!(pg.nodes.len(), 2);
        assert_eq!(pg.nodes[&0].covg(), 2);
        assert_eq!(pg.edge_covg(0, 1), 2);
        assert_eq!(pg.edge_covg(1, 0), 2);
    }

    #[test]
    fn test_graph_equality() {
        let mut a = PanGraph::new();
        a.add_node(0, "locusA", 0, []);
        let mut b = PanGraph::new();
        b.add_node(0, "locusA", 5, []);
        assert_eq!(a, b); // same loci, same edges

        b.add_edge(0, 0);
        assert_ne!(a, b);
    }

    #[test]
    fn test_write_gfa() {
        let mut pg = PanGraph::new();
        pg.add_node(0, "locusA", 0, []);
        pg.add_node(1, "locusB", 0, []);
        pg.add_edge(0, 1);
        let mut buf = Vec::new();
        pg.write_gfa(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("S\tlocusA\t*\tRC:i:1"));
        assert!(text.contains("L\tlocusA\t+\tlocusB\t+\t0M\tRC:i:1"));
    }
}
