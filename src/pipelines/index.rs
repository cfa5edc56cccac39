//! # Index pipeline
//!
//! Sketch a PRG collection, persist the minimizer index next to the PRG
//! file, and drop per-locus kmer graphs into the output directory.

use std::fs;
use std::sync::Mutex;

use tracing::info;

use crate::config::IndexArgs;
use crate::error::Result;
use crate::io::index::{index_prgs, Index};
use crate::model::KmerGraphWithCoverage;
use crate::pipelines::map::{load_prgs, sanitize};
use crate::utils::build_thread_pool;

pub fn run(args: &IndexArgs) -> Result<()> {
    let pool = build_thread_pool(args.sketch.threads())?;
    fs::create_dir_all(&args.outdir)?;

    let mut prgs = load_prgs(&args.prg_file)?;
    info!(prgs = prgs.len(), "sketching PRG collection");

    let (w, k) = (args.sketch.w, args.sketch.k);
    let index = Mutex::new(Index::new());
    pool.install(|| index_prgs(&mut prgs, &index, w, k))?;
    let index = index.into_inner().expect("index lock poisoned");
    index.save(&args.prg_file, w, k)?;

    for prg in &prgs {
        let gfa_path = args
            .outdir
            .join(format!("{}.k{}.w{}.gfa", sanitize(&prg.name), k, w));
        let view = KmerGraphWithCoverage::new(&prg.kmer_prg, 1);
        view.save_gfa_to_file(gfa_path)?;
    }

    info!(
        minimizers = index.num_minimizers(),
        loci = prgs.len(),
        "index pipeline finished"
    );
    Ok(())
}
