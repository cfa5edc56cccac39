//! # Per-site per-sample genotyping state
//!
//! A `SampleInfo` accumulates per-allele strand-separated base coverages
//! for one sample at one variant site, computes Poisson-with-error allele
//! likelihoods from them, and holds the three genotype slots: the one the
//! max-likelihood path implied, the one the coverages imply, and the
//! conflict-resolved "compatible" genotype the VCF reports under coverage
//! genotyping.

use std::sync::Arc;

use crate::utils::maths::ln_gamma;

/// Shared knobs for coverage-based genotyping, one per run.
#[derive(Clone, Debug)]
pub struct GenotypingOptions {
    /// Expected depth of coverage for each sample, indexed by sample id.
    pub sample_index_to_exp_depth_covg: Vec<u32>,
    pub error_rate: f64,
    /// Absolute floor on a believable allele's mean coverage.
    pub min_allele_covg: u32,
    /// Fraction of the expected depth a believable allele must reach.
    pub min_fraction_allele_covg: f64,
    /// Per-base floor below which a base counts as a gap.
    pub min_kmer_covg: u32,
    /// Coverage floor for the best two alleles before a call is attempted.
    pub min_site_total_covg: u32,
    /// Minimum coverage difference between the best two alleles.
    pub min_site_diff_covg: u32,
    /// Confidence a call must reach to be reported.
    pub confidence_threshold: f64,
}

impl GenotypingOptions {
    pub fn exp_depth_covg_for_sample(&self, sample_index: usize) -> u32 {
        self.sample_index_to_exp_depth_covg
            .get(sample_index)
            .copied()
            .unwrap_or(1)
            .max(1)
    }
}

impl Default for GenotypingOptions {
    fn default() -> Self {
        Self {
            sample_index_to_exp_depth_covg: vec![1],
            error_rate: 0.01,
            min_allele_covg: 0,
            min_fraction_allele_covg: 0.0,
            min_kmer_covg: 0,
            min_site_total_covg: 0,
            min_site_diff_covg: 0,
            confidence_threshold: 1.0,
        }
    }
}

/// Per-site state for one sample.
#[derive(Clone, Debug)]
pub struct SampleInfo {
    sample_index: usize,
    options: Arc<GenotypingOptions>,
    gt_from_max_likelihood_path: Option<u32>,
    gt_from_coverages: Option<(u32, f64)>,
    gt_coverages_compatible: Option<u32>,
    allele_to_forward_coverages: Vec<Vec<u32>>,
    allele_to_reverse_coverages: Vec<Vec<u32>>,
}

impl SampleInfo {
    pub fn new(sample_index: usize, options: Arc<GenotypingOptions>) -> Self {
        Self {
            sample_index,
            options,
            gt_from_max_likelihood_path: None,
            gt_from_coverages: None,
            gt_coverages_compatible: None,
            allele_to_forward_coverages: Vec::new(),
            allele_to_reverse_coverages: Vec::new(),
        }
    }

    pub fn sample_index(&self) -> usize {
        self.sample_index
    }

    pub fn num_alleles(&self) -> usize {
        self.allele_to_forward_coverages.len()
    }

    pub fn has_coverage_information(&self) -> bool {
        !self.allele_to_forward_coverages.is_empty()
    }

    pub fn allele_to_forward_coverages(&self) -> &[Vec<u32>] {
        &self.allele_to_forward_coverages
    }

    pub fn allele_to_reverse_coverages(&self) -> &[Vec<u32>] {
        &self.allele_to_reverse_coverages
    }

    // ---- genotype slots -------------------------------------------------

    pub fn gt_from_max_likelihood_path(&self) -> Option<u32> {
        self.gt_from_max_likelihood_path
    }

    pub fn set_gt_from_max_likelihood_path(&mut self, gt: Option<u32>) {
        self.gt_from_max_likelihood_path = gt;
    }

    pub fn gt_from_coverages(&self) -> Option<(u32, f64)> {
        self.gt_from_coverages
    }

    pub fn gt_coverages_compatible(&self) -> Option<u32> {
        self.gt_coverages_compatible
    }

    pub fn set_gt_coverages_compatible(&mut self, gt: Option<u32>) {
        self.gt_coverages_compatible = gt;
    }

    // ---- coverage -------------------------------------------------------

    /// Attach the per-allele per-base coverage vectors. A site has at
    /// least two alleles, and forward and reverse shapes must agree.
    pub fn add_coverage_information(&mut self, forward: Vec<Vec<u32>>, reverse: Vec<Vec<u32>>) {
        assert!(
            forward.len() >= 2,
            "a site needs at least two alleles, got {}",
            forward.len()
        );
        assert!(
            forward.len() == reverse.len(),
            "forward and reverse coverages disagree on allele count"
        );
        for (allele, (f, r)) in forward.iter().zip(&reverse).enumerate() {
            assert!(
                f.len() == r.len(),
                "allele {} has {} forward bases but {} reverse bases",
                allele,
                f.len(),
                r.len()
            );
        }
        self.allele_to_forward_coverages = forward;
        self.allele_to_reverse_coverages = reverse;
    }

    /// Mean of `fwd + rev` over the allele's bases; zero for an allele
    /// with no bases.
    pub fn mean_total_coverage(&self, allele: usize) -> f64 {
        let f = &self.allele_to_forward_coverages[allele];
        let r = &self.allele_to_reverse_coverages[allele];
        if f.is_empty() {
            return 0.0;
        }
        let total: u32 = f.iter().sum::<u32>() + r.iter().sum::<u32>();
        total as f64 / f.len() as f64
    }

    pub fn sum_forward_coverage(&self, allele: usize) -> u32 {
        self.allele_to_forward_coverages[allele].iter().sum()
    }

    pub fn sum_reverse_coverage(&self, allele: usize) -> u32 {
        self.allele_to_reverse_coverages[allele].iter().sum()
    }

    pub fn mean_forward_coverage(&self, allele: usize) -> f64 {
        let f = &self.allele_to_forward_coverages[allele];
        if f.is_empty() {
            return 0.0;
        }
        self.sum_forward_coverage(allele) as f64 / f.len() as f64
    }

    pub fn mean_reverse_coverage(&self, allele: usize) -> f64 {
        let r = &self.allele_to_reverse_coverages[allele];
        if r.is_empty() {
            return 0.0;
        }
        self.sum_reverse_coverage(allele) as f64 / r.len() as f64
    }

    /// Fraction of the allele's bases whose total coverage falls under the
    /// per-base gap threshold. An allele with no bases is all gap.
    pub fn get_gaps(&self, allele: usize) -> f64 {
        let f = &self.allele_to_forward_coverages[allele];
        let r = &self.allele_to_reverse_coverages[allele];
        if f.is_empty() {
            return 1.0;
        }
        let gaps = f
            .iter()
            .zip(r)
            .filter(|&(&fc, &rc)| fc + rc < self.options.min_kmer_covg)
            .count();
        gaps as f64 / f.len() as f64
    }

    /// `max(min_allele_covg, ceil(min_fraction * expected_depth))`
    pub fn min_coverage_threshold(&self) -> u32 {
        let exp_depth = self.options.exp_depth_covg_for_sample(self.sample_index);
        let from_fraction = (self.options.min_fraction_allele_covg * exp_depth as f64).ceil() as u32;
        self.options.min_allele_covg.max(from_fraction)
    }

    /// Poisson-with-error log-likelihood of one allele being the truth.
    pub fn compute_likelihood(
        &self,
        threshold_met: bool,
        lambda: f64,
        covg_this: f64,
        covg_others: f64,
        error_rate: f64,
        gaps: f64,
    ) -> f64 {
        let mut likelihood = -lambda + covg_others * error_rate.ln() - lambda * gaps
            + (1.0 - gaps) * (1.0 - (-lambda).exp()).ln();
        if threshold_met {
            likelihood += covg_this * lambda.ln() - ln_gamma(covg_this + 1.0);
        }
        likelihood
    }

    /// One likelihood per allele, computed from each allele's mean total
    /// coverage against the sum over all other alleles.
    pub fn get_likelihoods_for_all_alleles(&self) -> Vec<f64> {
        let n = self.num_alleles();
        let threshold = self.min_coverage_threshold() as f64;
        let lambda = self.options.exp_depth_covg_for_sample(self.sample_index) as f64;

        // an allele under threshold contributes nothing anywhere
        let gated: Vec<f64> = (0..n)
            .map(|a| {
                let mean = self.mean_total_coverage(a);
                if mean >= threshold {
                    mean
                } else {
                    0.0
                }
            })
            .collect();
        let total: f64 = gated.iter().sum();

        (0..n)
            .map(|a| {
                self.compute_likelihood(
                    gated[a] > 0.0,
                    lambda,
                    gated[a],
                    total - gated[a],
                    self.options.error_rate,
                    self.get_gaps(a),
                )
            })
            .collect()
    }

    /// Best allele index, its confidence (gap to the runner-up likelihood)
    /// and its likelihood. `None` when the best two alleles are too weakly
    /// or too evenly covered for a call to mean anything.
    pub fn get_confidence(&self) -> Option<(u32, f64, f64)> {
        if self.num_alleles() < 2 {
            return None;
        }
        let likelihoods = self.get_likelihoods_for_all_alleles();
        let mut order: Vec<usize> = (0..likelihoods.len()).collect();
        order.sort_by(|&a, &b| {
            likelihoods[b]
                .partial_cmp(&likelihoods[a])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let (best, second) = (order[0], order[1]);

        let covg_best = self.mean_total_coverage(best);
        let covg_second = self.mean_total_coverage(second);
        if covg_best.max(covg_second) < self.options.min_site_total_covg as f64 {
            return None;
        }
        if (covg_best - covg_second).abs() < self.options.min_site_diff_covg as f64 {
            return None;
        }

        let confidence = likelihoods[best] - likelihoods[second];
        Some((best as u32, confidence, likelihoods[best]))
    }

    /// The coverage genotype: confidence's argmax, but only when the
    /// confidence clears the configured threshold.
    pub fn get_genotype_from_coverage(&self) -> Option<(u32, f64)> {
        let (index, confidence, likelihood) = self.get_confidence()?;
        if confidence >= self.options.confidence_threshold {
            Some((index, likelihood))
        } else {
            None
        }
    }

    /// Run coverage genotyping and latch the result into the coverage and
    /// compatible slots.
    pub fn genotype_from_coverage(&mut self) {
        self.gt_from_coverages = self.get_genotype_from_coverage();
        self.gt_coverages_compatible = self.gt_from_coverages.map(|(idx, _)| idx);
    }

    /// Merge a second site's state for the same sample into this one.
    ///
    /// Coverage vectors concatenate, so a genotype lifted from the
    /// appended side shifts by this side's allele count. When both sides
    /// carried a max-likelihood genotype and they do not both point at
    /// the reference, the conflict is settled by re-genotyping from the
    /// merged coverages.
    pub fn merge_other_sample_info_into_this(&mut self, other: &SampleInfo) {
        let left_alleles = self.num_alleles() as u32;
        self.allele_to_forward_coverages
            .extend(other.allele_to_forward_coverages.iter().cloned());
        self.allele_to_reverse_coverages
            .extend(other.allele_to_reverse_coverages.iter().cloned());

        self.gt_from_max_likelihood_path = match (
            self.gt_from_max_likelihood_path,
            other.gt_from_max_likelihood_path,
        ) {
            (None, None) => None,
            (Some(gt), None) => Some(gt),
            (None, Some(gt)) => Some(gt + left_alleles),
            (Some(0), Some(0)) => Some(0),
            (Some(_), Some(_)) => self.get_genotype_from_coverage().map(|(idx, _)| idx),
        };
        self.gt_from_coverages = None;
        self.gt_coverages_compatible = None;
    }

    /// Settle an overlapping-site conflict for this sample: when both
    /// records called an ALT from coverages, the lower-likelihood call
    /// loses its compatible genotype.
    pub fn solve_incompatible_gt_conflict_with(&mut self, other: &mut SampleInfo) {
        let (Some((this_gt, this_lik)), Some((other_gt, other_lik))) =
            (self.gt_from_coverages, other.gt_from_coverages)
        else {
            return;
        };
        if this_gt == 0 || other_gt == 0 {
            return;
        }
        if this_lik >= other_lik {
            other.gt_coverages_compatible = None;
        } else {
            self.gt_coverages_compatible = None;
        }
    }
}
