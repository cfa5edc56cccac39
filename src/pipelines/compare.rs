//! # Compare pipeline
//!
//! Multi-sample genotyping: run the per-sample mapping flow for every
//! sample named in the sample index, merge the per-sample record sets
//! into one site union, reconcile overlapping calls and save a single
//! multi-sample VCF.

use std::fs;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Mutex;

use tracing::{info, warn};

use crate::config::{CompareArgs, MapArgs};
use crate::error::{PangeneError, Result};
use crate::io::fastaq;
use crate::io::index::{index_prgs, Index};
use crate::io::vcf::{SaveFilters, Vcf};
use crate::pipelines::map::{
    build_pangraph, call_locus, load_prgs, merge_locus_vcfs, sketch_reads, LocusCallResult,
};
use crate::utils::{build_thread_pool, CancelFlag};

/// `sample_name<TAB>read_file` per line; `#` comments allowed.
pub fn read_sample_index(path: &PathBuf) -> Result<Vec<(String, PathBuf)>> {
    let reader = BufReader::new(fs::File::open(path)?);
    let mut samples = Vec::new();
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (name, reads) = line.split_once('\t').ok_or_else(|| {
            PangeneError::parse(lineno + 1, "expected sample_name<TAB>read_file")
        })?;
        samples.push((name.to_string(), PathBuf::from(reads)));
    }
    if samples.is_empty() {
        return Err(PangeneError::invalid_data("sample index names no samples"));
    }
    Ok(samples)
}

/// Borrow the per-sample mapping flow with compare's shared settings.
fn map_args_for_sample(args: &CompareArgs, sample: &str, read_file: PathBuf) -> MapArgs {
    MapArgs {
        prg_file: args.prg_file.clone(),
        read_file,
        sketch: args.sketch.clone(),
        genotyping: args.genotyping.clone(),
        sample_name: sample.to_string(),
        outdir: args.outdir.clone(),
        output_covgs: false,
        discover: false,
        denovo_kmer_size: 11,
        max_nb_paths: 10,
        max_insertion_size: 15,
        min_dbg_abundance: 1,
    }
}

pub fn run(args: &CompareArgs) -> Result<()> {
    let pool = build_thread_pool(args.sketch.threads())?;
    let cancel = CancelFlag::new();
    fs::create_dir_all(&args.outdir)?;

    let samples = read_sample_index(&args.sample_index)?;
    info!(samples = samples.len(), "comparing samples");

    let mut prgs = load_prgs(&args.prg_file)?;
    let (w, k) = (args.sketch.w, args.sketch.k);
    let index = Mutex::new(Index::new());
    pool.install(|| index_prgs(&mut prgs, &index, w, k))?;
    let index = index.into_inner().expect("index lock poisoned");

    let mut global = Vcf::new(args.genotyping.to_options(vec![1; samples.len()]));
    for (sample_name, read_file) in &samples {
        let map_args = map_args_for_sample(args, sample_name, read_file.clone());
        let read_records = fastaq::read_sequences(read_file)?;
        let reads = pool.install(|| sketch_reads(read_records, w, k));
        let pangraph = build_pangraph(&reads, &index, &prgs);

        let results: Vec<LocusCallResult> = pool.install(|| {
            use rayon::prelude::*;
            pangraph
                .nodes
                .values()
                .collect::<Vec<_>>()
                .par_iter()
                .filter_map(|node| {
                    let prg = &prgs[node.prg_id as usize];
                    match call_locus(prg, node, &reads, &map_args, &cancel) {
                        Ok(result) => Some(result),
                        Err(e) => {
                            warn!(sample = %sample_name, locus = %prg.name, error = %e, "locus skipped");
                            None
                        }
                    }
                })
                .collect()
        });
        merge_locus_vcfs(&mut global, &results);
        info!(sample = %sample_name, loci = results.len(), "sample genotyped");
    }

    global.make_gt_compatible();
    let out = args.outdir.join("pangene_multisample.vcf");
    global.save(&out, args.genotyping.genotype.mode(), &SaveFilters::default())?;
    info!(records = global.records.len(), samples = global.samples.len(), "compare pipeline finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_read_sample_index() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# a comment").unwrap();
        writeln!(file, "sampleA\treadsA.fq").unwrap();
        writeln!(file, "sampleB\treadsB.fq").unwrap();
        file.flush().unwrap();

        let samples = read_sample_index(&file.path().to_path_buf()).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].0, "sampleA");
        assert_eq!(samples[1].1, PathBuf::from("readsB.fq"));
    }

    #[test]
    fn test_read_sample_index_rejects_empty() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(read_sample_index(&file.path().to_path_buf()).is_err());
    }

    #[test]
    fn test_read_sample_index_rejects_malformed() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "no-tab-here").unwrap();
        file.flush().unwrap();
        assert!(matches!(
            read_sample_index(&file.path().to_path_buf()),
            Err(PangeneError::Parse { .. })
        ));
    }
}
