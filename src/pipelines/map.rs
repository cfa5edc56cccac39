//! # Map pipeline
//!
//! The single-sample orchestrator: sketch the PRGs and the reads, anchor
//! reads through the minimizer index, lay coverage over each hit locus,
//! infer the max-likelihood path, genotype the sites it implies, and
//! optionally reassemble the stretches the reads refuse to support.

use std::collections::BTreeMap;
use std::fs;
use std::io::BufWriter;
use std::path::Path;
use std::sync::Mutex;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::config::MapArgs;
use crate::data::{PrgPath, Seq};
use crate::error::{PangeneError, Result};
use crate::io::fastaq;
use crate::io::index::{index_prgs, Index};
use crate::io::vcf::{SaveFilters, Vcf};
use crate::model::denovo::{
    find_interval_in_localpath, get_read_overlap_coordinates, identify_regions, CandidateRegion,
    DenovoDiscovery,
};
use crate::model::{
    assembly, KmerGraphWithCoverage, LocalPrg, MinimizerHit, PanGraph, PanNode, ScoringModel,
};
use crate::utils::{build_thread_pool, CancelFlag};

/// Coverage runs this low (relative to the locus mean) flag a candidate
/// region for reassembly.
const CANDIDATE_COVG_THRESHOLD: u32 = 2;
/// Candidate regions must be at least this long.
const CANDIDATE_MIN_LENGTH: usize = 5;
/// Padding around a candidate region when gathering reads.
const CANDIDATE_PADDING: u32 = 10;

/// What one locus produced: its record set, the reference backbone the
/// record coordinates live on, and any reassembled candidate paths.
#[derive(Debug)]
pub struct LocusCallResult {
    pub prg_id: u32,
    pub name: String,
    pub vcf: Vcf,
    pub ref_path_seqs: Vec<String>,
    pub candidate_paths: Vec<(String, Vec<String>)>,
}

/// Parse PRG records into local graphs.
pub fn load_prgs(prg_file: &Path) -> Result<Vec<LocalPrg>> {
    let records = fastaq::read_sequences(prg_file)?;
    records
        .into_iter()
        .enumerate()
        .map(|(id, (name, seq))| LocalPrg::new(id as u32, name, seq))
        .collect()
}

/// Sketch reads in parallel, preserving read ids.
pub fn sketch_reads(records: Vec<(String, String)>, w: u32, k: u32) -> Vec<Seq> {
    records
        .into_par_iter()
        .enumerate()
        .map(|(id, (name, seq))| Seq::new(id as u32, name, seq, w, k))
        .collect()
}

/// Anchor every read sketch in the index and accumulate the hit graph.
pub fn build_pangraph(reads: &[Seq], index: &Index, prgs: &[LocalPrg]) -> PanGraph {
    let mut pangraph = PanGraph::new();
    for read in reads {
        let mut per_prg: BTreeMap<u32, Vec<MinimizerHit>> = BTreeMap::new();
        for mini in &read.sketch {
            let Some(records) = index.records_for(mini.hash) else {
                continue;
            };
            for record in records {
                per_prg.entry(record.prg_id).or_default().push(MinimizerHit::new(
                    read.id,
                    mini.pos,
                    record.prg_id,
                    record.path.clone(),
                    record.knode_id,
                    mini.strand == record.strand,
                ));
            }
        }
        let hit_loci: Vec<u32> = per_prg.keys().copied().collect();
        for (prg_id, hits) in per_prg {
            let name = &prgs[prg_id as usize].name;
            pangraph.add_node(prg_id, name, read.id, hits);
        }
        for pair in hit_loci.windows(2) {
            pangraph.add_edge(pair[0], pair[1]);
        }
    }
    pangraph
}

/// Mean total coverage over the locus's non-terminal kmer nodes, the
/// expected-depth estimate genotyping runs on.
fn estimate_exp_depth(view: &KmerGraphWithCoverage<'_>, sample: usize) -> u32 {
    let mut total = 0u64;
    let mut nodes = 0u64;
    for node in view.kmer_prg.nodes() {
        if node.path.length() == 0 {
            continue;
        }
        total += view.total_covg(node.id, sample) as u64;
        nodes += 1;
    }
    if nodes == 0 {
        1
    } else {
        ((total as f64 / nodes as f64).round() as u32).max(1)
    }
}

/// Per-position strand coverage across the locus, maxed over the kmer
/// nodes containing each position.
fn position_coverage(view: &KmerGraphWithCoverage<'_>, sample: usize) -> BTreeMap<u32, (u32, u32)> {
    let mut map: BTreeMap<u32, (u32, u32)> = BTreeMap::new();
    for node in view.kmer_prg.nodes() {
        let (fwd, rev) = view.covg(node.id, sample);
        for interval in node.path.intervals() {
            for pos in interval.start..interval.end {
                let entry = map.entry(pos).or_insert((0, 0));
                entry.0 = entry.0.max(fwd);
                entry.1 = entry.1.max(rev);
            }
        }
    }
    map
}

/// Strand coverage vectors for one allele path. A zero-length allele gets
/// a single entry from the kmer nodes that bridge across its anchor.
fn allele_coverage(
    view: &KmerGraphWithCoverage<'_>,
    sample: usize,
    per_position: &BTreeMap<u32, (u32, u32)>,
    allele_path: &PrgPath,
) -> (Vec<u32>, Vec<u32>) {
    if allele_path.length() > 0 {
        let mut fwd = Vec::new();
        let mut rev = Vec::new();
        for interval in allele_path.intervals() {
            for pos in interval.start..interval.end {
                let &(f, r) = per_position.get(&pos).unwrap_or(&(0, 0));
                fwd.push(f);
                rev.push(r);
            }
        }
        return (fwd, rev);
    }

    // deletion allele: coverage of the kmers that jump the anchor
    let anchor = allele_path.start();
    let mut best = (0u32, 0u32);
    for node in view.kmer_prg.nodes() {
        let bridges = node
            .path
            .intervals()
            .windows(2)
            .any(|pair| pair[0].end <= anchor && anchor <= pair[1].start);
        if bridges {
            let (f, r) = view.covg(node.id, sample);
            best.0 = best.0.max(f);
            best.1 = best.1.max(r);
        }
    }
    (vec![best.0], vec![best.1])
}

/// Call one locus for one sample: coverage, max-likelihood path, VCF
/// records, genotypes and candidate regions.
pub fn call_locus(
    prg: &LocalPrg,
    node: &PanNode,
    reads: &[Seq],
    args: &MapArgs,
    cancel: &CancelFlag,
) -> Result<LocusCallResult> {
    if prg.kmer_prg.k() == 0 {
        // the locus was too short to sketch any k-mers
        return Err(PangeneError::NoFeasiblePath {
            sample: args.sample_name.clone(),
        });
    }
    let mut view = KmerGraphWithCoverage::new(&prg.kmer_prg, 1);
    for hit in &node.hits {
        view.increment_covg(hit.knode_id, 0, hit.strand);
    }
    view.set_num_reads(node.covg() as u32);
    view.set_binomial_parameter(args.genotyping.error_rate);
    let exp_depth = estimate_exp_depth(&view, 0);
    view.set_exp_depth_covg(exp_depth);

    let (score, ml_kmer_path) =
        view.find_max_path(0, ScoringModel::BinomialWithError, cancel)?;
    if score == f64::MIN {
        return Err(PangeneError::NoFeasiblePath {
            sample: args.sample_name.clone(),
        });
    }

    let options = args.genotyping.to_options(vec![exp_depth]);
    let local_path = prg.localnode_path_from_kmernode_path(&ml_kmer_path);
    let ref_path = prg.prg.top_path();

    let mut vcf = Vcf::new(options);
    prg.build_vcf(&mut vcf, &ref_path)?;
    prg.add_sample_gts(&mut vcf, &ref_path, &local_path, &args.sample_name);

    // attach per-allele coverages and genotype each site
    let per_position = position_coverage(&view, 0);
    let sample_col = vcf.get_sample_index(&args.sample_name);
    for record in &mut vcf.records {
        if record.allele_paths.len() < 2 {
            continue;
        }
        let mut fwd = Vec::with_capacity(record.allele_paths.len());
        let mut rev = Vec::with_capacity(record.allele_paths.len());
        for path in &record.allele_paths {
            let (f, r) = allele_coverage(&view, 0, &per_position, path);
            fwd.push(f);
            rev.push(r);
        }
        let info = &mut record.sample_infos[sample_col];
        info.add_coverage_information(fwd, rev);
        info.genotype_from_coverage();
    }
    vcf.make_gt_compatible();

    // the aligned-FASTA backbone is the reference path; record
    // coordinates are relative to it
    let ref_path_seqs: Vec<String> = ref_path
        .iter()
        .map(|&id| prg.prg.node(id).seq.clone())
        .collect();

    // de novo discovery on the chosen path
    let mut candidate_paths = Vec::new();
    if args.discover {
        candidate_paths = discover_candidates(prg, node, &view, reads, &local_path, args, cancel)?;
    }

    if args.output_covgs {
        let gfa_path = args
            .outdir
            .join(format!("{}.covgs.gfa", sanitize(&prg.name)));
        view.save_gfa_to_file(gfa_path)?;
    }

    debug!(locus = %prg.name, score, records = vcf.records.len(), "called locus");
    Ok(LocusCallResult {
        prg_id: prg.id,
        name: prg.name.clone(),
        vcf,
        ref_path_seqs,
        candidate_paths,
    })
}

/// Low-coverage windows on the ML sequence, reassembled from the reads
/// overlapping them.
#[allow(clippy::too_many_arguments)]
fn discover_candidates(
    prg: &LocalPrg,
    node: &PanNode,
    view: &KmerGraphWithCoverage<'_>,
    reads: &[Seq],
    local_path: &[u32],
    args: &MapArgs,
    cancel: &CancelFlag,
) -> Result<Vec<(String, Vec<String>)>> {
    let ml_seq: String = local_path
        .iter()
        .map(|&id| prg.prg.node(id).seq.as_str())
        .collect::<String>();

    // per-base coverage along the ML sequence
    let per_position = position_coverage(view, 0);
    let mut base_covgs = Vec::with_capacity(ml_seq.len());
    for &id in local_path {
        let pos = prg.prg.node(id).pos;
        for p in pos.start..pos.end {
            let &(f, r) = per_position.get(&p).unwrap_or(&(0, 0));
            base_covgs.push(f + r);
        }
    }

    let discovery = DenovoDiscovery::new(
        args.denovo_kmer_size,
        args.genotyping.error_rate,
        args.max_nb_paths,
        args.max_insertion_size,
        args.min_dbg_abundance,
    );

    let mut out = Vec::new();
    for interval in identify_regions(&base_covgs, CANDIDATE_COVG_THRESHOLD, CANDIDATE_MIN_LENGTH) {
        let Some(mut region) =
            CandidateRegion::from_ml_sequence(&prg.name, interval, &ml_seq, args.denovo_kmer_size)
        else {
            continue;
        };
        let sub_path =
            find_interval_in_localpath(interval, &prg.prg, local_path, CANDIDATE_PADDING);
        let coordinates = get_read_overlap_coordinates(node, &prg.prg, &sub_path);
        region.load_pileup(&coordinates, reads);
        match discovery.find_paths_through_candidate_region(&mut region, cancel) {
            Ok(()) => out.push((region.name.clone(), region.candidate_paths.clone())),
            Err(e @ (PangeneError::NoPath { .. } | PangeneError::TooManyPaths { .. })) => {
                warn!(region = %region.name, error = %e, "skipping candidate region");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(out)
}

pub(crate) fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect()
}

/// Fold per-locus record sets into the run-wide VCF. Merged sample
/// states are moved verbatim: they keep their own genotyping options
/// (and the sample index those options are keyed by), so likelihoods
/// re-derive against the depth estimated for their locus.
pub fn merge_locus_vcfs(global: &mut Vcf, results: &[LocusCallResult]) {
    for result in results {
        for record in &result.vcf.records {
            let idx = global.add_record(record.clone());
            for (sample_col, name) in result.vcf.samples.iter().enumerate() {
                let col = global.get_sample_index(name);
                global.records[idx].sample_infos[col] = record.sample_infos[sample_col].clone();
            }
        }
    }
}

/// Run the full mapping pipeline for one sample.
pub fn run(args: &MapArgs) -> Result<()> {
    let pool = build_thread_pool(args.sketch.threads())?;
    let cancel = CancelFlag::new();
    fs::create_dir_all(&args.outdir)?;

    info!(prg_file = %args.prg_file.display(), "loading PRGs");
    let mut prgs = load_prgs(&args.prg_file)?;

    let (w, k) = (args.sketch.w, args.sketch.k);
    let index = Mutex::new(Index::new());
    pool.install(|| index_prgs(&mut prgs, &index, w, k))?;
    let index = index.into_inner().expect("index lock poisoned");
    let index_file = Index::index_path(&args.prg_file, w, k);
    if !index_file.exists() {
        index.save(&args.prg_file, w, k)?;
    }

    info!(read_file = %args.read_file.display(), "sketching reads");
    let read_records = fastaq::read_sequences(&args.read_file)?;
    let num_reads = read_records.len();
    let reads = pool.install(|| sketch_reads(read_records, w, k));

    let pangraph = build_pangraph(&reads, &index, &prgs);
    info!(
        reads = num_reads,
        loci_hit = pangraph.nodes.len(),
        "anchored reads"
    );
    let mut pangraph_writer = BufWriter::new(fs::File::create(args.outdir.join("pangraph.gfa"))?);
    pangraph.write_gfa(&mut pangraph_writer)?;
    drop(pangraph_writer);

    let results: Vec<LocusCallResult> = pool.install(|| {
        pangraph
            .nodes
            .values()
            .collect::<Vec<_>>()
            .par_iter()
            .filter_map(|node| {
                let prg = &prgs[node.prg_id as usize];
                match call_locus(prg, node, &reads, args, &cancel) {
                    Ok(result) => Some(result),
                    Err(PangeneError::NoFeasiblePath { .. }) => {
                        debug!(locus = %prg.name, "no feasible path; locus skipped");
                        None
                    }
                    Err(e) => {
                        warn!(locus = %prg.name, error = %e, "locus failed");
                        None
                    }
                }
            })
            .collect()
    });

    // single-writer merge after the parallel section; merged sample
    // states keep the per-locus options with their estimated depths
    let mut vcf = Vcf::new(args.genotyping.to_options(vec![1]));
    merge_locus_vcfs(&mut vcf, &results);

    let vcf_path = args.outdir.join(format!("{}.vcf", args.sample_name));
    vcf.save(&vcf_path, args.genotyping.genotype.mode(), &SaveFilters::default())?;

    for result in &results {
        if result.vcf.records.is_empty() {
            continue;
        }
        let fasta_path = args
            .outdir
            .join(format!("{}.aligned.fa", sanitize(&result.name)));
        let mut writer = BufWriter::new(fs::File::create(fasta_path)?);
        let seqs: Vec<&str> = result.ref_path_seqs.iter().map(String::as_str).collect();
        result
            .vcf
            .clone()
            .write_aligned_fasta(&mut writer, &seqs)?;
    }

    if args.discover {
        let denovo_path = args.outdir.join("denovo_paths.fa");
        let mut writer = BufWriter::new(fs::File::create(denovo_path)?);
        for result in &results {
            for (region_name, paths) in &result.candidate_paths {
                assembly::write_paths_to_fasta(&mut writer, region_name, paths, 80)?;
            }
        }
    }

    info!(records = vcf.records.len(), "map pipeline finished");
    Ok(())
}
