//! # VCF record set
//!
//! A bespoke VCFv4.3 writer for graph-derived sites. Records are
//! identified by `(chrom, pos, ref, alt)`: adding a duplicate is a no-op
//! and differing INFO annotations collapse silently onto the first record.
//! Sample columns hold full `SampleInfo` state, not strings.

use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use crate::data::PrgPath;
use crate::error::{PangeneError, Result};
use crate::model::sample_info::{GenotypingOptions, SampleInfo};
use crate::utils::today_ddmmyy;

/// Which genotype slot the sample columns report.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GenotypingMode {
    MaxLikelihoodPath,
    Coverage,
}

/// Conjunction-of-groups record filter for `save`. Within each group an
/// unset group passes everything; one or more set flags restrict the
/// group to records matching any of them.
#[derive(Clone, Copy, Debug, Default)]
pub struct SaveFilters {
    pub simple: bool,
    pub nested: bool,
    pub too_many_alts: bool,
    pub snp: bool,
    pub indel: bool,
    pub ph_snps: bool,
    pub complex_var: bool,
}

const FORMAT_FIELDS: [&str; 8] = [
    "GT",
    "MEAN_FWD_COVG",
    "MEAN_REV_COVG",
    "SUM_FWD_COVG",
    "SUM_REV_COVG",
    "GAPS",
    "LIKELIHOOD",
    "GT_CONF",
];

/// One site. Equality and ordering are `(chrom, pos, ref, alt)` only.
#[derive(Clone, Debug)]
pub struct VcfRecord {
    pub chrom: String,
    pub pos: u32,
    pub id: String,
    pub ref_allele: String,
    pub alt_allele: String,
    pub qual: String,
    pub filter: String,
    pub info: String,
    pub format: Vec<String>,
    pub sample_infos: Vec<SampleInfo>,
    /// PRG paths of `[ref, alt]` where known; used to pull kmer coverage
    /// onto the alleles. Not serialized and not part of record identity.
    pub allele_paths: Vec<PrgPath>,
}

impl VcfRecord {
    pub fn new(
        chrom: impl Into<String>,
        pos: u32,
        ref_allele: impl Into<String>,
        alt_allele: impl Into<String>,
        info: impl Into<String>,
        graph_type_info: impl Into<String>,
    ) -> Self {
        let mut ref_allele = ref_allele.into();
        let mut alt_allele = alt_allele.into();
        if ref_allele.is_empty() {
            ref_allele = ".".to_string();
        }
        if alt_allele.is_empty() {
            alt_allele = ".".to_string();
        }

        let mut info = info.into();
        if info.is_empty() || info == "." {
            info = classify_svtype(&ref_allele, &alt_allele);
        }
        let graph_type_info = graph_type_info.into();
        if !graph_type_info.is_empty() {
            if info == "." {
                info = graph_type_info;
            } else {
                info.push(';');
                info.push_str(&graph_type_info);
            }
        }

        Self {
            chrom: chrom.into(),
            pos,
            id: ".".to_string(),
            ref_allele,
            alt_allele,
            qual: ".".to_string(),
            filter: ".".to_string(),
            info,
            format: FORMAT_FIELDS.iter().map(|s| s.to_string()).collect(),
            sample_infos: Vec::new(),
            allele_paths: Vec::new(),
        }
    }

    pub fn with_allele_paths(mut self, paths: Vec<PrgPath>) -> Self {
        self.allele_paths = paths;
        self
    }

    /// End of the reference span (exclusive).
    pub fn ref_end(&self) -> u32 {
        let len = if self.ref_allele == "." {
            0
        } else {
            self.ref_allele.len() as u32
        };
        self.pos + len
    }

    pub fn add_formats(&mut self, formats: &[&str]) {
        for f in formats {
            if !self.format.iter().any(|existing| existing == f) {
                self.format.push(f.to_string());
            }
        }
    }

    fn sample_column(&self, sample: &SampleInfo, mode: GenotypingMode) -> String {
        let gt = match mode {
            GenotypingMode::MaxLikelihoodPath => sample.gt_from_max_likelihood_path(),
            GenotypingMode::Coverage => sample.gt_coverages_compatible(),
        };
        let gt = gt.map_or(".".to_string(), |g| g.to_string());

        if !sample.has_coverage_information() {
            let mut fields = vec![gt];
            fields.extend(std::iter::repeat(".".to_string()).take(self.format.len() - 1));
            return fields.join(":");
        }

        let n = sample.num_alleles();
        let join = |f: &dyn Fn(usize) -> String| {
            (0..n).map(f).collect::<Vec<_>>().join(",")
        };
        let mean_fwd = join(&|a| format!("{}", sample.mean_forward_coverage(a).round() as u32));
        let mean_rev = join(&|a| format!("{}", sample.mean_reverse_coverage(a).round() as u32));
        let sum_fwd = join(&|a| sample.sum_forward_coverage(a).to_string());
        let sum_rev = join(&|a| sample.sum_reverse_coverage(a).to_string());
        let gaps = join(&|a| format!("{:.2}", sample.get_gaps(a)));
        let likelihoods = sample
            .get_likelihoods_for_all_alleles()
            .iter()
            .map(|l| format!("{:.1}", l))
            .collect::<Vec<_>>()
            .join(",");
        let conf = sample
            .get_confidence()
            .map_or(".".to_string(), |(_, c, _)| format!("{:.1}", c));

        [gt, mean_fwd, mean_rev, sum_fwd, sum_rev, gaps, likelihoods, conf].join(":")
    }

    /// Render one body line, sample columns under the given mode.
    pub fn to_vcf_line(&self, mode: GenotypingMode) -> String {
        let mut line = format!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.chrom,
            self.pos,
            self.id,
            self.ref_allele,
            self.alt_allele,
            self.qual,
            self.filter,
            self.info,
            self.format.join(":")
        );
        for sample in &self.sample_infos {
            line.push('\t');
            line.push_str(&self.sample_column(sample, mode));
        }
        line
    }
}

impl PartialEq for VcfRecord {
    fn eq(&self, other: &Self) -> bool {
        self.chrom == other.chrom
            && self.pos == other.pos
            && self.ref_allele == other.ref_allele
            && self.alt_allele == other.alt_allele
    }
}

impl Eq for VcfRecord {}

impl PartialOrd for VcfRecord {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for VcfRecord {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (&self.chrom, self.pos, &self.ref_allele, &self.alt_allele).cmp(&(
            &other.chrom,
            other.pos,
            &other.ref_allele,
            &other.alt_allele,
        ))
    }
}

/// SVTYPE classification from the allele pair.
fn classify_svtype(ref_allele: &str, alt_allele: &str) -> String {
    if ref_allele == "." && alt_allele == "." {
        ".".to_string()
    } else if ref_allele == "." || alt_allele == "." {
        "SVTYPE=INDEL".to_string()
    } else if ref_allele.len() == 1 && alt_allele.len() == 1 {
        "SVTYPE=SNP".to_string()
    } else if ref_allele.len() == alt_allele.len() {
        "SVTYPE=PH_SNPs".to_string()
    } else if ref_allele.len() < alt_allele.len() && alt_allele.starts_with(ref_allele) {
        "SVTYPE=INDEL".to_string()
    } else if alt_allele.len() < ref_allele.len() && ref_allele.starts_with(alt_allele) {
        "SVTYPE=INDEL".to_string()
    } else {
        "SVTYPE=COMPLEX".to_string()
    }
}

/// The site set: deduplicating, sortable, filterable.
#[derive(Clone, Debug)]
pub struct Vcf {
    pub records: Vec<VcfRecord>,
    pub samples: Vec<String>,
    options: Arc<GenotypingOptions>,
}

impl Vcf {
    pub fn new(options: Arc<GenotypingOptions>) -> Self {
        Self {
            records: Vec::new(),
            samples: Vec::new(),
            options,
        }
    }

    pub fn genotyping_options(&self) -> &Arc<GenotypingOptions> {
        &self.options
    }

    /// Add a record unless an equal one exists; returns its index either
    /// way. New records get an empty sample slot per existing sample.
    pub fn add_record(&mut self, mut record: VcfRecord) -> usize {
        if let Some(idx) = self.records.iter().position(|r| *r == record) {
            return idx;
        }
        record.sample_infos = (0..self.samples.len())
            .map(|col| SampleInfo::new(col, self.options.clone()))
            .collect();
        self.records.push(record);
        self.records.len() - 1
    }

    /// Index of a sample column, appending (and back-filling every record)
    /// when the name is new.
    pub fn get_sample_index(&mut self, name: &str) -> usize {
        if let Some(idx) = self.samples.iter().position(|s| s == name) {
            return idx;
        }
        self.samples.push(name.to_string());
        let col = self.samples.len() - 1;
        for record in &mut self.records {
            record.sample_infos.push(SampleInfo::new(col, self.options.clone()));
            debug_assert_eq!(record.sample_infos.len(), self.samples.len());
        }
        col
    }

    /// Record one sample's allele at a site.
    ///
    /// The exact `(chrom, pos, ref, alt)` record gets GT 1 if present.
    /// Otherwise, `ref == alt` marks GT 0 on the record carrying that ref
    /// at that position, and a genuinely new allele becomes a
    /// `TOO_MANY_ALTS` record. Finally every sample already called as
    /// reference on a record covering `pos` is carried onto the updated
    /// record.
    pub fn add_sample_gt(
        &mut self,
        sample_name: &str,
        chrom: &str,
        pos: u32,
        ref_allele: &str,
        alt_allele: &str,
    ) {
        if ref_allele.is_empty() && alt_allele.is_empty() {
            return;
        }
        let sample_index = self.get_sample_index(sample_name);

        let probe = VcfRecord::new(chrom, pos, ref_allele, alt_allele, "", "");
        let mut target: Option<usize> = None;
        if let Some(idx) = self.records.iter().position(|r| *r == probe) {
            self.records[idx].sample_infos[sample_index]
                .set_gt_from_max_likelihood_path(Some(1));
            target = Some(idx);
        } else {
            if ref_allele == alt_allele {
                for idx in 0..self.records.len() {
                    let r = &self.records[idx];
                    if r.chrom == chrom && r.pos == pos && r.ref_allele == ref_allele {
                        self.records[idx].sample_infos[sample_index]
                            .set_gt_from_max_likelihood_path(Some(0));
                        target = Some(idx);
                    }
                }
            }
            if target.is_none() && ref_allele != alt_allele {
                let idx = self.add_record(VcfRecord::new(
                    chrom,
                    pos,
                    ref_allele,
                    alt_allele,
                    "SVTYPE=COMPLEX",
                    "GRAPHTYPE=TOO_MANY_ALTS",
                ));
                self.records[idx].sample_infos[sample_index]
                    .set_gt_from_max_likelihood_path(Some(1));
                target = Some(idx);
            }
        }
        let Some(target) = target else {
            // a pure-reference site with no matching record; nothing to do
            return;
        };

        // carry reference calls from overlapping records onto the target
        let mut ref_samples: Vec<usize> = Vec::new();
        for (idx, r) in self.records.iter().enumerate() {
            if idx == target || r.chrom != chrom {
                continue;
            }
            if r.pos <= pos && pos < r.ref_end() {
                for (j, sample) in r.sample_infos.iter().enumerate() {
                    if sample.gt_from_max_likelihood_path() == Some(0) {
                        ref_samples.push(j);
                    }
                }
            }
        }
        for j in ref_samples {
            self.records[target].sample_infos[j].set_gt_from_max_likelihood_path(Some(0));
        }
    }

    /// Mark GT 0 for this sample on every record whose reference span lies
    /// entirely inside `[pos, pos_to)` on `chrom`.
    pub fn add_sample_ref_alleles(
        &mut self,
        sample_name: &str,
        chrom: &str,
        pos: u32,
        pos_to: u32,
    ) {
        let sample_index = self.get_sample_index(sample_name);
        for record in &mut self.records {
            if record.chrom == chrom && pos <= record.pos && record.ref_end() <= pos_to {
                record.sample_infos[sample_index].set_gt_from_max_likelihood_path(Some(0));
            }
        }
    }

    /// Whether any record starts strictly inside `(from, to]`-style range
    /// with its reference fully before `to`.
    pub fn pos_in_range(&self, from: u32, to: u32) -> bool {
        self.records
            .iter()
            .any(|r| from < r.pos && r.ref_end() <= to)
    }

    pub fn sort_records(&mut self) {
        self.records.sort();
    }

    /// Resolve per-sample ALT/ALT conflicts between records whose
    /// reference spans overlap; the lower-likelihood call loses its
    /// coverage-compatible genotype.
    pub fn make_gt_compatible(&mut self) {
        for i in 0..self.records.len() {
            for j in (i + 1)..self.records.len() {
                let (left, right) = self.records.split_at_mut(j);
                let (a, b) = (&mut left[i], &mut right[0]);
                if a.chrom != b.chrom {
                    continue;
                }
                let overlap = a.pos < b.ref_end() && b.pos < a.ref_end();
                if !overlap {
                    continue;
                }
                for (sa, sb) in a.sample_infos.iter_mut().zip(b.sample_infos.iter_mut()) {
                    sa.solve_incompatible_gt_conflict_with(sb);
                }
            }
        }
    }

    fn record_passes(record: &VcfRecord, filters: &SaveFilters) -> bool {
        let graph_group_unset = !filters.simple && !filters.nested && !filters.too_many_alts;
        let graph_ok = graph_group_unset
            || (filters.simple && record.info.contains("GRAPHTYPE=SIMPLE"))
            || (filters.nested && record.info.contains("GRAPHTYPE=NESTED"))
            || (filters.too_many_alts && record.info.contains("GRAPHTYPE=TOO_MANY_ALTS"));

        let var_group_unset =
            !filters.snp && !filters.indel && !filters.ph_snps && !filters.complex_var;
        let var_ok = var_group_unset
            || (filters.snp && record.info.contains("SVTYPE=SNP"))
            || (filters.indel && record.info.contains("SVTYPE=INDEL"))
            || (filters.ph_snps && record.info.contains("SVTYPE=PH_SNPs"))
            || (filters.complex_var && record.info.contains("SVTYPE=COMPLEX"));

        graph_ok && var_ok
    }

    pub fn write(
        &mut self,
        writer: &mut impl Write,
        mode: GenotypingMode,
        filters: &SaveFilters,
    ) -> Result<()> {
        writeln!(writer, "##fileformat=VCFv4.3")?;
        writeln!(writer, "##fileDate={}", today_ddmmyy())?;
        writeln!(writer, "##ALT=<ID=SNP,Description=\"SNP\">")?;
        writeln!(writer, "##ALT=<ID=PH_SNPs,Description=\"Phased SNPs\">")?;
        writeln!(writer, "##ALT=<ID=INDEL,Description=\"Insertion-deletion\">")?;
        writeln!(
            writer,
            "##ALT=<ID=COMPLEX,Description=\"Complex variant, collection of SNPs and indels\">"
        )?;
        writeln!(
            writer,
            "##INFO=<ID=SVTYPE,Number=1,Type=String,Description=\"Type of variant\">"
        )?;
        writeln!(writer, "##ALT=<ID=SIMPLE,Description=\"Graph bubble is simple\">")?;
        writeln!(
            writer,
            "##ALT=<ID=NESTED,Description=\"Variation site was a nested feature in the graph\">"
        )?;
        writeln!(
            writer,
            "##ALT=<ID=TOO_MANY_ALTS,Description=\"Variation site was a multinested feature with too many alts to include all in the VCF\">"
        )?;
        writeln!(
            writer,
            "##INFO=<ID=GRAPHTYPE,Number=1,Type=String,Description=\"Type of graph feature\">"
        )?;
        write!(writer, "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT")?;
        for sample in &self.samples {
            write!(writer, "\t{}", sample)?;
        }
        writeln!(writer)?;

        self.sort_records();
        let mut written = 0usize;
        for record in &self.records {
            if Self::record_passes(record, filters) {
                writeln!(writer, "{}", record.to_vcf_line(mode))?;
                written += 1;
            }
        }
        debug!(written, total = self.records.len(), "wrote VCF records");
        Ok(())
    }

    pub fn save(
        &mut self,
        path: impl AsRef<Path>,
        mode: GenotypingMode,
        filters: &SaveFilters,
    ) -> Result<()> {
        info!(path = %path.as_ref().display(), "saving VCF");
        let mut writer = BufWriter::new(std::fs::File::create(path)?);
        self.write(&mut writer, mode, filters)
    }

    /// Load VCF body lines back into the set. Sample names come from the
    /// `#CHROM` header line; only the GT field of each sample column is
    /// recovered.
    pub fn load(&mut self, reader: impl std::io::Read) -> Result<usize> {
        let mut added = 0usize;
        let mut sample_columns: Vec<usize> = Vec::new();
        for (lineno, line) in BufReader::new(reader).lines().enumerate() {
            let lineno = lineno + 1;
            let line = line?;
            if let Some(header) = line.strip_prefix("#CHROM\t") {
                let fields: Vec<&str> = header.split('\t').collect();
                sample_columns = fields
                    .iter()
                    .skip(8) // POS..FORMAT
                    .map(|name| self.get_sample_index(name))
                    .collect();
                continue;
            }
            if line.starts_with('#') || line.is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() < 8 {
                return Err(PangeneError::parse(lineno, "truncated VCF record"));
            }
            let pos: u32 = fields[1]
                .parse()
                .map_err(|_| PangeneError::parse(lineno, "bad POS"))?;
            let mut record = VcfRecord::new(fields[0], pos, fields[3], fields[4], fields[7], "");
            record.id = fields[2].to_string();
            record.qual = fields[5].to_string();
            record.filter = fields[6].to_string();
            let idx = self.add_record(record);
            for (col_offset, value) in fields.iter().skip(9).enumerate() {
                let Some(&col) = sample_columns.get(col_offset) else {
                    break;
                };
                let gt = value.split(':').next().unwrap_or(".");
                if let Ok(gt) = gt.parse::<u32>() {
                    self.records[idx].sample_infos[col].set_gt_from_max_likelihood_path(Some(gt));
                }
            }
            added += 1;
        }
        info!(added, total = self.records.len(), "loaded VCF records");
        Ok(added)
    }

    /// Write a `-`-padded multiple alignment of all samples over the
    /// max-likelihood local path `lmp` (one sequence per path node).
    pub fn write_aligned_fasta(
        &mut self,
        writer: &mut impl Write,
        lmp: &[&str],
    ) -> Result<()> {
        self.sort_records();
        if lmp.is_empty() || self.samples.is_empty() {
            return Ok(());
        }

        let num_samples = self.samples.len();
        let mut seqs = vec![String::new(); num_samples];
        let mut alt_until = vec![0u32; num_samples];
        let mut max_len = 0usize;
        let mut ref_len = 0u32; // reference bases consumed so far
        let mut n = 0usize; // position in lmp
        let mut prev_pos: Option<u32> = None;

        for i in 0..self.records.len() {
            let pos = self.records[i].pos;
            let ref_allele = self.records[i].ref_allele.clone();
            let alt_allele = self.records[i].alt_allele.clone();
            let new_site = prev_pos != Some(pos);

            if new_site {
                for seq in seqs.iter_mut() {
                    while seq.len() < max_len {
                        seq.push('-');
                    }
                }
                // reference filler up to the site
                while ref_len < pos && n < lmp.len() {
                    for (j, seq) in seqs.iter_mut().enumerate() {
                        if alt_until[j] < pos {
                            seq.push_str(lmp[n]);
                        }
                    }
                    ref_len += lmp[n].len() as u32;
                    n += 1;
                }
            }

            let span_end = pos + ref_allele.len() as u32;
            let covers_later_site = self.pos_in_range(pos, span_end);
            for j in 0..num_samples {
                let gt = self.records[i].sample_infos[j]
                    .gt_from_max_likelihood_path()
                    .unwrap_or(0);
                if gt == 0 && new_site && !covers_later_site {
                    seqs[j].push_str(&ref_allele);
                    max_len = max_len.max(seqs[j].len());
                } else if gt == 1 {
                    seqs[j].push_str(&alt_allele);
                    max_len = max_len.max(seqs[j].len());
                    alt_until[j] = span_end;
                }
            }
            if new_site && !covers_later_site {
                ref_len += ref_allele.len() as u32;
                n += 1;
            }
            prev_pos = Some(pos);
        }

        for seq in seqs.iter_mut() {
            while seq.len() < max_len {
                seq.push('-');
            }
        }
        // trailing reference
        while n < lmp.len() {
            for (j, seq) in seqs.iter_mut().enumerate() {
                if alt_until[j] <= ref_len {
                    seq.push_str(lmp[n]);
                }
            }
            ref_len += lmp[n].len() as u32;
            n += 1;
        }

        for (name, seq) in self.samples.iter().zip(&seqs) {
            writeln!(writer, ">{}", name)?;
            writeln!(writer, "{}", seq)?;
        }
        Ok(())
    }
}

impl PartialEq for Vcf {
    /// Set equality over records.
    fn eq(&self, other: &Self) -> bool {
        self.records.len() == other.records.len()
            && other
                .records
                .iter()
                .all(|r| self.records.iter().any(|mine| mine == r))
    }
}

impl Eq for Vcf {}

#[cfg(test)]
mod tests {
    use super::*;

    fn vcf() -> Vcf {
        Vcf::new(Arc::new(GenotypingOptions::default()))
    }

    #[test]
    fn test_svtype_classification() {
        assert_eq!(classify_svtype("A", "T"), "SVTYPE=SNP");
        assert_eq!(classify_svtype("AC", "ACG"), "SVTYPE=INDEL");
        assert_eq!(classify_svtype("ACG", "AC"), "SVTYPE=INDEL");
        assert_eq!(classify_svtype("AC", "TG"), "SVTYPE=PH_SNPs");
        assert_eq!(classify_svtype("ACG", "TA"), "SVTYPE=COMPLEX");
        assert_eq!(classify_svtype(".", "TA"), "SVTYPE=INDEL");
        assert_eq!(classify_svtype(".", "."), ".");
    }

    #[test]
    fn test_record_constructor_fills_empty_alleles() {
        let r = VcfRecord::new("chr", 3, "", "G", "", "GRAPHTYPE=SIMPLE");
        assert_eq!(r.ref_allele, ".");
        assert_eq!(r.info, "SVTYPE=INDEL;GRAPHTYPE=SIMPLE");
    }

    #[test]
    fn test_add_formats_appends_without_duplicates() {
        let mut r = VcfRecord::new("chr", 3, "A", "G", "", "");
        let before = r.format.len();
        r.add_formats(&["GT", "NEW_FIELD"]);
        assert_eq!(r.format.len(), before + 1);
        assert_eq!(r.format.last().map(String::as_str), Some("NEW_FIELD"));
    }

    #[test]
    fn test_add_record_is_idempotent() {
        let mut v = vcf();
        v.add_record(VcfRecord::new("chr", 10, "A", "T", "", ""));
        v.add_record(VcfRecord::new("chr", 10, "A", "T", "", ""));
        assert_eq!(v.records.len(), 1);

        // differing INFO collapses silently onto the first record
        v.add_record(VcfRecord::new("chr", 10, "A", "T", "SVTYPE=COMPLEX", ""));
        assert_eq!(v.records.len(), 1);
        assert_eq!(v.records[0].info, "SVTYPE=SNP");
    }

    #[test]
    fn test_get_sample_index_backfills() {
        let mut v = vcf();
        v.add_record(VcfRecord::new("chr", 10, "A", "T", "", ""));
        let s0 = v.get_sample_index("s0");
        let s0_again = v.get_sample_index("s0");
        let s1 = v.get_sample_index("s1");
        assert_eq!((s0, s0_again, s1), (0, 0, 1));
        assert_eq!(v.records[0].sample_infos.len(), 2);
    }

    #[test]
    fn test_add_sample_gt_alt_and_ref() {
        let mut v = vcf();
        v.add_record(VcfRecord::new("chr", 10, "A", "T", "", ""));

        v.add_sample_gt("s0", "chr", 10, "A", "T");
        assert_eq!(
            v.records[0].sample_infos[0].gt_from_max_likelihood_path(),
            Some(1)
        );

        // ref == alt marks the existing site as reference
        v.add_sample_gt("s1", "chr", 10, "A", "A");
        assert_eq!(
            v.records[0].sample_infos[1].gt_from_max_likelihood_path(),
            Some(0)
        );
    }

    #[test]
    fn test_add_sample_gt_new_allele_is_too_many_alts() {
        let mut v = vcf();
        v.add_record(VcfRecord::new("chr", 10, "A", "T", "", ""));
        v.add_sample_gt("s0", "chr", 10, "A", "G");
        assert_eq!(v.records.len(), 2);
        let new = &v.records[1];
        assert!(new.info.contains("GRAPHTYPE=TOO_MANY_ALTS"));
        assert!(new.info.contains("SVTYPE=COMPLEX"));
        assert_eq!(new.sample_infos[0].gt_from_max_likelihood_path(), Some(1));
    }

    #[test]
    fn test_add_sample_gt_propagates_reference_calls() {
        let mut v = vcf();
        v.add_record(VcfRecord::new("chr", 10, "ACG", "T", "", ""));
        v.add_sample_gt("s0", "chr", 10, "ACG", "ACG"); // s0 is reference

        // a second sample introduces a new allele at a covered position;
        // s0's reference call carries over to the new record
        v.add_sample_gt("s1", "chr", 11, "C", "G");
        let new = v
            .records
            .iter()
            .find(|r| r.pos == 11)
            .expect("new record exists");
        assert_eq!(new.sample_infos[0].gt_from_max_likelihood_path(), Some(0));
        assert_eq!(new.sample_infos[1].gt_from_max_likelihood_path(), Some(1));
    }

    #[test]
    fn test_add_sample_ref_alleles() {
        let mut v = vcf();
        v.add_record(VcfRecord::new("chr", 5, "A", "T", "", ""));
        v.add_record(VcfRecord::new("chr", 20, "C", "G", "", ""));
        v.add_sample_ref_alleles("s0", "chr", 0, 10);
        assert_eq!(
            v.records[0].sample_infos[0].gt_from_max_likelihood_path(),
            Some(0)
        );
        assert!(v.records[1].sample_infos[0]
            .gt_from_max_likelihood_path()
            .is_none());
    }

    #[test]
    fn test_save_is_sorted_and_filtered() {
        let mut v = vcf();
        v.add_record(VcfRecord::new("chr", 30, "A", "T", "", "GRAPHTYPE=SIMPLE"));
        v.add_record(VcfRecord::new("chr", 10, "AC", "A", "", "GRAPHTYPE=SIMPLE"));
        v.add_record(VcfRecord::new("chr", 20, "A", "G", "", "GRAPHTYPE=NESTED"));

        let mut buf = Vec::new();
        v.write(
            &mut buf,
            GenotypingMode::MaxLikelihoodPath,
            &SaveFilters::default(),
        )
        .unwrap();
        let text = String::from_utf8(buf).unwrap();
        let body: Vec<&str> = text.lines().filter(|l| !l.starts_with('#')).collect();
        assert_eq!(body.len(), 3);
        let positions: Vec<&str> = body
            .iter()
            .map(|l| l.split('\t').nth(1).unwrap())
            .collect();
        assert_eq!(positions, vec!["10", "20", "30"]);

        // SNP-only filter
        let mut buf = Vec::new();
        let filters = SaveFilters {
            snp: true,
            ..SaveFilters::default()
        };
        v.write(&mut buf, GenotypingMode::MaxLikelihoodPath, &filters)
            .unwrap();
        let text = String::from_utf8(buf).unwrap();
        let body: Vec<&str> = text.lines().filter(|l| !l.starts_with('#')).collect();
        assert_eq!(body.len(), 2);

        // SNP and SIMPLE must both hold
        let mut buf = Vec::new();
        let filters = SaveFilters {
            snp: true,
            simple: true,
            ..SaveFilters::default()
        };
        v.write(&mut buf, GenotypingMode::MaxLikelihoodPath, &filters)
            .unwrap();
        let text = String::from_utf8(buf).unwrap();
        let body: Vec<&str> = text.lines().filter(|l| !l.starts_with('#')).collect();
        assert_eq!(body.len(), 1);
        assert!(body[0].starts_with("chr\t30"));
    }

    #[test]
    fn test_missing_sample_values_render_as_dots() {
        let mut v = vcf();
        v.add_record(VcfRecord::new("chr", 10, "A", "T", "", ""));
        v.get_sample_index("s0");
        let line = v.records[0].to_vcf_line(GenotypingMode::MaxLikelihoodPath);
        let sample_field = line.split('\t').nth(9).unwrap();
        assert_eq!(sample_field, ".:.:.:.:.:.:.:.");
    }

    #[test]
    fn test_load_round_trip_gt() {
        let mut v = vcf();
        let idx = v.add_record(VcfRecord::new("chr", 10, "A", "T", "", ""));
        let col = v.get_sample_index("s0");
        v.records[idx].sample_infos[col].set_gt_from_max_likelihood_path(Some(1));

        let mut buf = Vec::new();
        v.write(
            &mut buf,
            GenotypingMode::MaxLikelihoodPath,
            &SaveFilters::default(),
        )
        .unwrap();

        let mut loaded = vcf();
        let added = loaded.load(&buf[..]).unwrap();
        assert_eq!(added, 1);
        assert_eq!(loaded.samples, vec!["s0"]);
        assert_eq!(loaded.records.len(), 1);
        assert_eq!(
            loaded.records[0].sample_infos[0].gt_from_max_likelihood_path(),
            Some(1)
        );
        assert!(v == loaded);
    }

    #[test]
    fn test_write_aligned_fasta_pads_with_dashes() {
        let mut v = vcf();
        let idx = v.add_record(VcfRecord::new("chr", 1, "G", "TTT", "", ""));
        let s0 = v.get_sample_index("s0");
        let s1 = v.get_sample_index("s1");
        v.records[idx].sample_infos[s0].set_gt_from_max_likelihood_path(Some(0));
        v.records[idx].sample_infos[s1].set_gt_from_max_likelihood_path(Some(1));

        // the ML local path: "A" then the site node "G" then "C"
        let mut buf = Vec::new();
        v.write_aligned_fasta(&mut buf, &["A", "G", "C"]).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], ">s0");
        assert_eq!(lines[2], ">s1");
        let (a, b) = (lines[1], lines[3]);
        assert_eq!(a.len(), b.len());
        assert_eq!(a, "AG--C");
        assert_eq!(b, "ATTTC");
    }
}
