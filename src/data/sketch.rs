//! # Read sketching
//!
//! A `Seq` is a read plus its window-minimizer sketch: for every window of
//! `w` consecutive k-mers, every occurrence of the smallest canonical hash
//! is kept. Ties all count, and the sketch deduplicates across windows.

use std::collections::BTreeSet;
use std::fmt;

use crate::data::hash::canonical_kmer_hash;
use crate::data::Minimizer;

/// A read with its minimizer sketch.
#[derive(Clone, Debug)]
pub struct Seq {
    pub id: u32,
    pub name: String,
    pub seq: String,
    pub sketch: BTreeSet<Minimizer>,
}

impl Seq {
    pub fn new(id: u32, name: impl Into<String>, seq: impl Into<String>, w: u32, k: u32) -> Self {
        let mut out = Self {
            id,
            name: name.into(),
            seq: seq.into(),
            sketch: BTreeSet::new(),
        };
        out.minimizer_sketch(w, k);
        out
    }

    /// (Re)build the sketch. Sequences shorter than one full window sketch
    /// to nothing. Non-ACGT bases invalidate the k-mers covering them; the
    /// window minimum is taken over the k-mers that remain.
    pub fn minimizer_sketch(&mut self, w: u32, k: u32) {
        self.sketch.clear();
        let len = self.seq.len() as u32;
        if len + 1 < w + k {
            return;
        }

        let bytes = self.seq.as_bytes();
        let num_kmers = len - k + 1;

        // Canonical hash and strand per k-mer start, None across bad bases.
        let mut hashes: Vec<Option<(u64, bool)>> = Vec::with_capacity(num_kmers as usize);
        for i in 0..num_kmers {
            let kmer = &bytes[i as usize..(i + k) as usize];
            hashes.push(canonical_kmer_hash(kmer).ok());
        }

        for wpos in 0..=(len - w - k + 1) {
            let window = &hashes[wpos as usize..(wpos + w) as usize];
            let smallest = match window.iter().flatten().map(|&(h, _)| h).min() {
                Some(h) => h,
                None => continue,
            };
            for (i, entry) in window.iter().enumerate() {
                if let Some((hash, strand)) = *entry {
                    if hash == smallest {
                        let start = wpos + i as u32;
                        self.sketch
                            .insert(Minimizer::new(hash, start, start + k, strand));
                    }
                }
            }
        }
    }
}

impl fmt::Display for Seq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::hash::canonical_kmer_hash;

    #[test]
    fn test_short_sequence_sketches_to_nothing() {
        let s = Seq::new(0, "r0", "ACGTA", 3, 4);
        assert!(s.sketch.is_empty());
    }

    #[test]
    fn test_sketch_is_nonempty_and_minimal_per_window() {
        let s = Seq::new(0, "r0", "ACGTACGTAC", 3, 4);
        assert!(!s.sketch.is_empty());

        let bytes = s.seq.as_bytes();
        for m in &s.sketch {
            // Every emitted minimizer is the minimum of at least one window
            // containing it.
            let k = m.pos.length();
            let mut found_window = false;
            for wpos in 0..=(bytes.len() as u32 - 3 - k + 1) {
                if m.pos.start < wpos || m.pos.start >= wpos + 3 {
                    continue;
                }
                let min = (wpos..wpos + 3)
                    .map(|i| {
                        canonical_kmer_hash(&bytes[i as usize..(i + k) as usize])
                            .unwrap()
                            .0
                    })
                    .min()
                    .unwrap();
                if min == m.hash {
                    found_window = true;
                    break;
                }
            }
            assert!(found_window, "minimizer {} is not a window minimum", m);
        }
    }

    #[test]
    fn test_strand_is_strand_of_canonical_representative() {
        let s = Seq::new(0, "r0", "ACGTACGTAC", 3, 4);
        for m in &s.sketch {
            let kmer = &s.seq.as_bytes()[m.pos.start as usize..m.pos.end as usize];
            let (_, strand) = canonical_kmer_hash(kmer).unwrap();
            assert_eq!(m.strand, strand);
        }
    }

    #[test]
    fn test_tied_occurrences_all_count() {
        // AAAA dominates every window of this homopolymer, at every offset.
        let s = Seq::new(0, "r0", "AAAAAAAA", 3, 4);
        assert_eq!(s.sketch.len(), 5);
    }

    #[test]
    fn test_non_acgt_bases_are_skipped() {
        let s = Seq::new(0, "r0", "ACGTNACGTACG", 3, 4);
        for m in &s.sketch {
            let kmer = &s.seq[m.pos.start as usize..m.pos.end as usize];
            assert!(!kmer.contains('N'));
        }
    }
}
