//! # Minimizer index
//!
//! The global map from canonical minimizer hashes to every graph position
//! carrying that k-mer. Built in parallel across PRGs with one lock at
//! insertion, persisted as one line per hash.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rayon::prelude::*;
use tracing::{debug, info};

use crate::data::{MiniRecord, PrgPath};
use crate::error::{PangeneError, Result};
use crate::model::LocalPrg;

/// Minimizer hash to the graph positions bearing it.
#[derive(Debug, Default)]
pub struct Index {
    minhash: HashMap<u64, Vec<MiniRecord>>,
}

impl Index {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_minimizers(&self) -> usize {
        self.minhash.len()
    }

    pub fn is_empty(&self) -> bool {
        self.minhash.is_empty()
    }

    pub fn records_for(&self, hash: u64) -> Option<&[MiniRecord]> {
        self.minhash.get(&hash).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, &[MiniRecord])> {
        self.minhash.iter().map(|(&h, v)| (h, v.as_slice()))
    }

    /// Append a record for `hash` unless an identical one is present.
    pub fn add_record(&mut self, hash: u64, prg_id: u32, path: PrgPath, knode_id: u32, strand: bool) {
        let record = MiniRecord::new(prg_id, path, knode_id, strand);
        let bucket = self.minhash.entry(hash).or_default();
        if !bucket.contains(&record) {
            bucket.push(record);
        }
    }

    pub fn clear(&mut self) {
        self.minhash.clear();
    }

    /// On-disk name for the index of `prg_file` at these parameters.
    pub fn index_path(prg_file: &Path, w: u32, k: u32) -> PathBuf {
        let mut name = prg_file.as_os_str().to_os_string();
        name.push(format!(".k{}.w{}.idx", k, w));
        PathBuf::from(name)
    }

    /// One line per hash: `hash<TAB>count<TAB>rec<TAB>rec…`, hash-sorted
    /// for determinism.
    pub fn write(&self, writer: &mut impl Write) -> Result<()> {
        let mut hashes: Vec<&u64> = self.minhash.keys().collect();
        hashes.sort();
        for hash in hashes {
            let records = &self.minhash[hash];
            write!(writer, "{}\t{}", hash, records.len())?;
            for record in records {
                write!(writer, "\t{}", record)?;
            }
            writeln!(writer)?;
        }
        Ok(())
    }

    pub fn save(&self, prg_file: &Path, w: u32, k: u32) -> Result<()> {
        let path = Self::index_path(prg_file, w, k);
        info!(path = %path.display(), minimizers = self.num_minimizers(), "saving index");
        let mut writer = BufWriter::new(std::fs::File::create(path)?);
        self.write(&mut writer)
    }

    pub fn read(reader: impl std::io::Read) -> Result<Self> {
        let mut index = Self::new();
        for (lineno, line) in BufReader::new(reader).lines().enumerate() {
            let lineno = lineno + 1;
            let line = line?;
            if line.is_empty() {
                continue;
            }
            let mut fields = line.split('\t');
            let hash: u64 = fields
                .next()
                .and_then(|v| v.parse().ok())
                .ok_or_else(|| PangeneError::parse(lineno, "bad minimizer hash"))?;
            let count: usize = fields
                .next()
                .and_then(|v| v.parse().ok())
                .ok_or_else(|| PangeneError::parse(lineno, "bad record count"))?;
            let records: Vec<MiniRecord> = fields
                .map(|f| {
                    f.parse::<MiniRecord>()
                        .map_err(|e| PangeneError::parse(lineno, e.to_string()))
                })
                .collect::<Result<_>>()?;
            if records.len() != count {
                return Err(PangeneError::parse(
                    lineno,
                    format!("expected {} records, found {}", count, records.len()),
                ));
            }
            for record in records {
                index.add_record(hash, record.prg_id, record.path, record.knode_id, record.strand);
            }
        }
        Ok(index)
    }

    pub fn load(prg_file: &Path, w: u32, k: u32) -> Result<Self> {
        let path = Self::index_path(prg_file, w, k);
        if !path.exists() {
            return Err(PangeneError::FileNotFound { path });
        }
        info!(path = %path.display(), "loading index");
        let index = Self::read(std::fs::File::open(path)?)?;
        debug!(minimizers = index.num_minimizers(), "index loaded");
        Ok(index)
    }
}

impl PartialEq for Index {
    /// Bucket-by-bucket set equality.
    fn eq(&self, other: &Self) -> bool {
        if self.minhash.len() != other.minhash.len() {
            return false;
        }
        self.minhash.iter().all(|(hash, records)| {
            other.minhash.get(hash).is_some_and(|theirs| {
                records.len() == theirs.len() && records.iter().all(|r| theirs.contains(r))
            })
        })
    }
}

impl Eq for Index {}

/// Sketch every PRG into its kmer graph and collect the minimizer records
/// into `index`. Sketching runs in parallel across PRGs; the index itself
/// takes a single lock per locus at insertion.
pub fn index_prgs(prgs: &mut [LocalPrg], index: &Mutex<Index>, w: u32, k: u32) -> Result<()> {
    info!(prgs = prgs.len(), w, k, "indexing PRGs");
    prgs.par_iter_mut().try_for_each(|prg| -> Result<()> {
        let records = prg.minimizer_sketch(w, k)?;
        let mut index = index.lock().expect("index lock poisoned");
        for record in records {
            let hash = prg.kmer_prg.node(record.knode_id).khash;
            index.add_record(hash, record.prg_id, record.path, record.knode_id, record.strand);
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> PrgPath {
        s.parse().unwrap()
    }

    #[test]
    fn test_add_record_dedups() {
        let mut idx = Index::new();
        idx.add_record(42, 0, path("0,4"), 1, true);
        idx.add_record(42, 0, path("0,4"), 1, true);
        idx.add_record(42, 0, path("0,4"), 1, false); // differs in strand
        idx.add_record(42, 1, path("0,4"), 1, true); // differs in prg
        assert_eq!(idx.records_for(42).unwrap().len(), 3);

        idx.clear();
        assert!(idx.is_empty());
    }

    #[test]
    fn test_round_trip_preserves_buckets() {
        let mut idx = Index::new();
        idx.add_record(42, 0, path("0,4"), 1, true);
        idx.add_record(42, 0, path("4,8"), 2, false);
        idx.add_record(7, 3, path("0,2;5,7"), 4, true);

        let mut buf = Vec::new();
        idx.write(&mut buf).unwrap();
        let loaded = Index::read(&buf[..]).unwrap();
        assert!(idx == loaded);
    }

    #[test]
    fn test_read_rejects_bad_counts() {
        let text = "42\t2\t0,1,0,4,1\n";
        assert!(matches!(
            Index::read(text.as_bytes()),
            Err(PangeneError::Parse { line: 1, .. })
        ));
    }

    #[test]
    fn test_index_path_name() {
        let p = Index::index_path(Path::new("prgs.fa"), 14, 15);
        assert_eq!(p, PathBuf::from("prgs.fa.k15.w14.idx"));
    }

    #[test]
    fn test_index_prgs_sketches_all_loci() {
        let mut prgs = vec![
            LocalPrg::new(0, "locus0", "ACGTACGTAA").unwrap(),
            LocalPrg::new(1, "locus1", "AAAA 5 C 6 G 5 TTTT").unwrap(),
        ];
        let index = Mutex::new(Index::new());
        index_prgs(&mut prgs, &index, 2, 4).unwrap();

        let index = index.into_inner().unwrap();
        assert!(!index.is_empty());
        for prg in &prgs {
            assert!(prg.kmer_prg.len() > 2, "prg {} was not sketched", prg.id);
        }
        // both loci contributed records
        let mut seen_prgs: Vec<u32> = index
            .iter()
            .flat_map(|(_, records)| records.iter().map(|r| r.prg_id))
            .collect();
        seen_prgs.sort_unstable();
        seen_prgs.dedup();
        assert_eq!(seen_prgs, vec![0, 1]);
    }
}
