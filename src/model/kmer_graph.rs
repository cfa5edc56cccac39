//! # Kmer graph
//!
//! The kmer-PRG: a DAG whose nodes are k-base paths through a locus graph
//! and whose edges encode legal k-mer successions. Nodes live in an arena
//! with dense ids assigned in insertion order; adjacency is stored as id
//! vectors on both ends so the coverage overlay never chases pointers.

use std::collections::HashMap;

use crate::data::PrgPath;

/// One k-mer of the locus, identified by the path its bases take.
#[derive(Clone, Debug)]
pub struct KmerNode {
    pub id: u32,
    pub path: PrgPath,
    /// Canonical hash of the k-mer sequence (zero for source and sink).
    pub khash: u64,
    /// Number of A/T bases in the k-mer; carried into the GFA for
    /// downstream composition diagnostics.
    pub num_at: u32,
    pub out_nodes: Vec<u32>,
    pub in_nodes: Vec<u32>,
}

/// Per-locus k-mer DAG.
#[derive(Clone, Debug, Default)]
pub struct KmerGraph {
    nodes: Vec<KmerNode>,
    path_to_id: HashMap<PrgPath, u32>,
    /// Node ids in path order; rebuilt lazily after mutation.
    sorted_ids: Vec<u32>,
    sorted_dirty: bool,
    k: u32,
    max_walk_cache: Option<u32>,
}

impl KmerGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// `k` as fixed by the first non-terminus node; zero until then.
    pub fn k(&self) -> u32 {
        self.k
    }

    pub fn node(&self, id: u32) -> &KmerNode {
        &self.nodes[id as usize]
    }

    pub fn nodes(&self) -> impl Iterator<Item = &KmerNode> {
        self.nodes.iter()
    }

    /// Add a node for `path`, or return the existing node's id.
    ///
    /// The first non-empty path fixes `k`; `check` validates that every
    /// later non-empty path agrees.
    pub fn add_node(&mut self, path: PrgPath, khash: u64, num_at: u32) -> u32 {
        if let Some(&id) = self.path_to_id.get(&path) {
            return id;
        }
        if path.length() > 0 && self.k == 0 {
            self.k = path.length();
        }
        let id = self.nodes.len() as u32;
        self.path_to_id.insert(path.clone(), id);
        self.nodes.push(KmerNode {
            id,
            path,
            khash,
            num_at,
            out_nodes: Vec::new(),
            in_nodes: Vec::new(),
        });
        self.sorted_dirty = true;
        self.max_walk_cache = None;
        id
    }

    /// Add an edge. Idempotent; `from.path < to.path` is a contract so the
    /// graph stays acyclic by construction.
    pub fn add_edge(&mut self, from: u32, to: u32) {
        assert!(
            (from as usize) < self.nodes.len() && (to as usize) < self.nodes.len(),
            "edge endpoint out of range"
        );
        assert!(
            self.nodes[from as usize].path < self.nodes[to as usize].path,
            "non-topological edge {} -> {}",
            from,
            to
        );
        let out = &mut self.nodes[from as usize].out_nodes;
        if !out.contains(&to) {
            out.push(to);
        }
        let inn = &mut self.nodes[to as usize].in_nodes;
        if !inn.contains(&from) {
            inn.push(from);
        }
        self.sorted_dirty = true;
        self.max_walk_cache = None;
    }

    fn rebuild_sorted(&mut self) {
        if !self.sorted_dirty {
            return;
        }
        let mut ids: Vec<u32> = (0..self.nodes.len() as u32).collect();
        ids.sort_by(|&a, &b| self.nodes[a as usize].path.cmp(&self.nodes[b as usize].path));
        self.sorted_ids = ids;
        self.sorted_dirty = false;
    }

    /// Node ids in path order; the first is the source, the last the sink.
    pub fn sorted_ids(&mut self) -> &[u32] {
        self.rebuild_sorted();
        &self.sorted_ids
    }

    /// Path-ordered ids without requiring a mutable graph; recomputed when
    /// the cached order is stale. The coverage overlay borrows the graph
    /// immutably and relies on this.
    pub fn clone_sorted_ids(&self) -> Vec<u32> {
        if !self.sorted_dirty {
            return self.sorted_ids.clone();
        }
        let mut ids: Vec<u32> = (0..self.nodes.len() as u32).collect();
        ids.sort_by(|&a, &b| self.nodes[a as usize].path.cmp(&self.nodes[b as usize].path));
        ids
    }

    pub fn source(&mut self) -> u32 {
        self.rebuild_sorted();
        self.sorted_ids[0]
    }

    pub fn sink(&mut self) -> u32 {
        self.rebuild_sorted();
        *self.sorted_ids.last().expect("graph is empty")
    }

    /// Drop edges `u -> w` whenever some `u -> v -> w` exists and `v`'s
    /// path is covered by the union of `u`'s and `w`'s paths. Returns the
    /// number of edges removed.
    pub fn remove_shortcut_edges(&mut self) -> usize {
        let mut to_remove: Vec<(u32, u32)> = Vec::new();
        for u in &self.nodes {
            for &v in &u.out_nodes {
                for &w in &self.nodes[v as usize].out_nodes {
                    if u.out_nodes.contains(&w)
                        && self.nodes[v as usize]
                            .path
                            .is_covered_by(&u.path, &self.nodes[w as usize].path)
                    {
                        to_remove.push((u.id, w));
                    }
                }
            }
        }
        to_remove.sort_unstable();
        to_remove.dedup();
        for &(u, w) in &to_remove {
            self.nodes[u as usize].out_nodes.retain(|&x| x != w);
            self.nodes[w as usize].in_nodes.retain(|&x| x != u);
        }
        if !to_remove.is_empty() {
            self.sorted_dirty = true;
            self.max_walk_cache = None;
        }
        tracing::debug!(removed = to_remove.len(), "removed shortcut edges");
        to_remove.len()
    }

    /// Number of k-mer nodes on the longest source-to-sink walk.
    ///
    /// (The original field this replaces was called the "shortest path
    /// length"; the value has always been the longest walk and it is used
    /// as the DP tie-break horizon.)
    pub fn max_walk_len(&mut self) -> u32 {
        if let Some(cached) = self.max_walk_cache {
            return cached;
        }
        self.rebuild_sorted();
        let n = self.nodes.len();
        if n == 0 {
            return 0;
        }
        let mut len = vec![0u32; n];
        for &id in self.sorted_ids.clone().iter().rev() {
            let best = self.nodes[id as usize]
                .out_nodes
                .iter()
                .map(|&v| len[v as usize])
                .max();
            len[id as usize] = match best {
                Some(l) => l + 1,
                None => 1,
            };
        }
        let result = len[self.sorted_ids[0] as usize];
        self.max_walk_cache = Some(result);
        result
    }

    /// Assert the DAG invariants: every edge ascends in path order, and
    /// the path-sorted extremes are the unique leaf nodes.
    pub fn check(&mut self) {
        self.rebuild_sorted();
        if self.nodes.is_empty() {
            return;
        }
        let source = self.sorted_ids[0];
        let sink = *self.sorted_ids.last().unwrap();
        for node in &self.nodes {
            assert!(
                node.path.length() == 0 || node.path.length() == self.k,
                "kmer path of length {} in a k={} graph",
                node.path.length(),
                self.k
            );
            for &v in &node.out_nodes {
                assert!(
                    node.path < self.nodes[v as usize].path,
                    "edge {} -> {} violates sort order",
                    node.id,
                    v
                );
            }
            if node.id != source {
                assert!(
                    !node.in_nodes.is_empty(),
                    "node {} has no in-edges but is not the source",
                    node.id
                );
            }
            if node.id != sink {
                assert!(
                    !node.out_nodes.is_empty(),
                    "node {} has no out-edges but is not the sink",
                    node.id
                );
            }
        }
    }
}

impl PartialEq for KmerGraph {
    /// Node-set equality over paths and edges; ids are not compared.
    fn eq(&self, other: &Self) -> bool {
        if self.nodes.len() != other.nodes.len() {
            return false;
        }
        self.nodes.iter().all(|node| {
            let Some(&other_id) = other.path_to_id.get(&node.path) else {
                return false;
            };
            let other_node = &other.nodes[other_id as usize];
            let mut mine: Vec<&PrgPath> = node
                .out_nodes
                .iter()
                .map(|&v| &self.nodes[v as usize].path)
                .collect();
            let mut theirs: Vec<&PrgPath> = other_node
                .out_nodes
                .iter()
                .map(|&v| &other.nodes[v as usize].path)
                .collect();
            mine.sort();
            theirs.sort();
            mine == theirs
        })
    }
}

impl Eq for KmerGraph {}
