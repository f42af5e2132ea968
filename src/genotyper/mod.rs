// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

pub(crate) mod bootstrap;
pub(crate) mod posteriors;
pub(crate) mod refine;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use bio::stats::LogProb;
use ndarray::{Array2, Array3};

use crate::align::{HaplotypeAligner, Seed};
use crate::align::trace::TraceCache;
use crate::constants::{MIN_FLANK_SPAN, TOLERANCE};
use crate::em::{self, EmConfig, LengthObservations};
use crate::errors::Error;
use crate::haplotype::Haplotype;
use crate::locus::Region;
use crate::output::{
    padded_alleles, FailureReason, LocusCall, LocusOutcome, SampleCall,
};
use crate::reads::{
    bp_diff_in_window, cigar_query_len, cigar_ref_len, LocusReads, ReadPool, SampleReads,
};
use crate::stutter::StutterModel;
use crate::utils::{expected_value, PROB_05};

use self::posteriors::PosteriorParams;

/// Externally supplied phased-genotype log-priors (e.g. from a phased
/// reference panel). Tensor index 0 is the reference allele; index `i + 1`
/// corresponds to `alt_alleles[i]`.
#[derive(Debug, Clone)]
pub struct AllelePriors {
    pub alt_alleles: Vec<Vec<u8>>,
    /// Shape `(num_alleles, num_alleles, num_samples)`.
    pub tensor: Array3<LogProb>,
    /// Which samples actually carry priors; the rest are excluded from
    /// emission.
    pub has_prior: Vec<bool>,
}

/// Locus-scoped mutable state. Owned exclusively by the genotyper; every
/// allele-set mutation swaps the haplotype, the alignment matrix and the
/// trace cache together.
#[derive(Default)]
pub(crate) struct LocusState {
    pub(crate) sample_names: Vec<String>,
    pub(crate) call_sample: Vec<bool>,
    pub(crate) reads: LocusReads,
    pub(crate) pool: ReadPool,
    pub(crate) align_fail: usize,
    pub(crate) haplotype: Option<Haplotype>,
    pub(crate) aln: Option<Array2<LogProb>>,
    pub(crate) seeds: Vec<Seed>,
    pub(crate) posteriors: Option<Array3<LogProb>>,
    pub(crate) sample_totals: Vec<LogProb>,
    pub(crate) trace_cache: TraceCache,
}

/// Sequence-based STR genotyper for one locus.
///
/// Drives initialization, alignment of every read against every candidate
/// haplotype, the genotype posterior E-step, stutter-allele refinement,
/// optional EM retraining of the stutter model and emission. Instances are
/// single-use: `genotype` consumes the value, and across-locus parallelism
/// belongs to the caller (see `utils::worker_pool`).
#[derive(Builder)]
#[builder(pattern = "owned")]
pub struct Genotyper {
    region: Region,
    /// Uppercase chromosome sequence covering the locus with flanking
    /// margin.
    chrom_seq: Vec<u8>,
    stutter_model: StutterModel,
    samples: Vec<SampleReads>,
    /// Repeat sequences proposed by the upstream haplotype generator.
    #[builder(default)]
    candidate_repeat_seqs: Vec<Vec<u8>>,
    #[builder(default)]
    allele_priors: Option<AllelePriors>,
    /// Align each distinct read sequence only once.
    #[builder(default = "true")]
    pool_identical_seqs: bool,
    #[builder(default)]
    haploid: bool,
    /// Emit samples without aligned reads as missing.
    #[builder(default = "true")]
    require_one_read: bool,
    /// Post-hoc filter masking reads whose ML traceback does not span the
    /// repeat. Off by default; when enabled, each sample's posterior is
    /// renormalized over spanning evidence only.
    #[builder(default)]
    require_spanning: bool,
    /// Re-estimate the stutter model by EM and re-genotype with it.
    #[builder(default)]
    retrain_stutter: bool,
    #[builder(default)]
    em_config: EmConfig,
    #[builder(default)]
    output_bootstrap_quality: bool,
    #[builder(default = "100")]
    bootstrap_iterations: usize,
    #[builder(default = "42")]
    bootstrap_seed: u64,
    /// Cooperative cancellation, checked between phases.
    #[builder(default)]
    abort: Option<Arc<AtomicBool>>,
    #[builder(setter(skip), default)]
    state: LocusState,
}

impl Genotyper {
    /// Genotype the locus. Contract violations surface as errors; guard
    /// failures are reported as `LocusOutcome::Failed` without emission.
    pub fn genotype(mut self) -> Result<LocusOutcome> {
        if let Some(reason) = self.init()? {
            warn!("skipping {}:{}: {}", self.region.chrom(), self.region.start(), reason);
            return Ok(LocusOutcome::Failed(reason));
        }
        if let Some(reason) = self.run_cycle() {
            warn!("skipping {}:{}: {}", self.region.chrom(), self.region.start(), reason);
            return Ok(LocusOutcome::Failed(reason));
        }
        if self.retrain_stutter {
            if let Some(reason) = self.retrain() {
                warn!("skipping {}:{}: {}", self.region.chrom(), self.region.start(), reason);
                return Ok(LocusOutcome::Failed(reason));
            }
        }
        match self.emit() {
            Some(call) => Ok(LocusOutcome::Called(Box::new(call))),
            None => {
                warn!(
                    "skipping {}:{}: {}",
                    self.region.chrom(),
                    self.region.start(),
                    FailureReason::Cancelled
                );
                Ok(LocusOutcome::Failed(FailureReason::Cancelled))
            }
        }
    }

    fn aborted(&self) -> bool {
        self.abort
            .as_ref()
            .map_or(false, |signal| signal.load(Ordering::Relaxed))
    }

    pub(crate) fn num_samples(&self) -> usize {
        self.state.sample_names.len()
    }

    fn num_alleles(&self) -> usize {
        self.state
            .haplotype
            .as_ref()
            .expect("bug: haplotype queried before initialization")
            .num_combinations()
    }

    /// Base pair difference of every repeat alternate from the reference.
    pub(crate) fn allele_bp_diffs(&self) -> Vec<i64> {
        let repeat = self.state.haplotype.as_ref().unwrap().repeat();
        let ref_len = repeat.alternate(0).len() as i64;
        repeat
            .alternates()
            .map(|alt| alt.len() as i64 - ref_len)
            .collect()
    }

    fn init(&mut self) -> Result<Option<FailureReason>> {
        if self.samples.is_empty() {
            return Err(Error::NoReads.into());
        }
        let num_samples = self.samples.len();
        self.state.sample_names = self.samples.iter().map(|s| s.name.clone()).collect();
        self.state.call_sample = vec![true; num_samples];

        let (window_start, window_stop) = self.region.indel_window();
        let mut min_start = i64::MAX;
        let mut max_stop = i64::MIN;
        for (s, sample) in self.samples.iter().enumerate() {
            for (j, read) in sample.reads.iter().enumerate() {
                let bases = read.bases.to_ascii_uppercase();
                if bases.is_empty() || cigar_query_len(&read.cigar) != bases.len() {
                    warn!(
                        "sample {}: dropping read {} with inconsistent CIGAR",
                        sample.name, j
                    );
                    self.state.align_fail += 1;
                    continue;
                }
                if read.quals.len() != bases.len() {
                    return Err(Error::QualityLengthMismatch {
                        sample: sample.name.clone(),
                        read: j,
                        bases: bases.len(),
                        quals: read.quals.len(),
                    }
                    .into());
                }
                let stop = read.start + cigar_ref_len(&read.cigar);
                if read.use_for_discovery {
                    min_start = min_start.min(read.start);
                    max_stop = max_stop.max(stop);
                }
                let pool_index = if self.pool_identical_seqs {
                    self.state.pool.add(&bases, &read.quals)
                } else {
                    self.state.reads.len()
                };
                self.state.reads.bp_diff.push(bp_diff_in_window(
                    &read.cigar,
                    read.start,
                    window_start,
                    window_stop,
                ));
                self.state.reads.bases.push(bases);
                self.state.reads.quals.push(read.quals.clone());
                self.state.reads.log_p1.push(read.log_p1);
                self.state.reads.log_p2.push(read.log_p2);
                self.state.reads.sample_label.push(s);
                self.state.reads.pool_index.push(pool_index);
            }
        }
        if self.state.align_fail > 0 {
            info!(
                "dropped {} reads failing the realignment contract",
                self.state.align_fail
            );
        }

        // no reads extend past both repeat boundaries
        if min_start >= self.region.start() - MIN_FLANK_SPAN
            || max_stop <= self.region.stop() + MIN_FLANK_SPAN
        {
            return Ok(Some(FailureReason::NoSpanningReads));
        }

        let alternates = if let Some(priors) = &self.allele_priors {
            if priors.has_prior.len() != num_samples {
                return Err(Error::AllelePriorSampleMismatch {
                    flags: priors.has_prior.len(),
                    samples: num_samples,
                }
                .into());
            }
            let num_alleles = priors.alt_alleles.len() + 1;
            if priors.tensor.dim() != (num_alleles, num_alleles, num_samples) {
                return Err(Error::AllelePriorShapeMismatch {
                    given: priors.tensor.shape().to_vec(),
                    alleles: num_alleles,
                    samples: num_samples,
                }
                .into());
            }
            if !priors.has_prior.iter().any(|&has| has) {
                return Ok(Some(FailureReason::NoAllelePriors));
            }
            for (call, &has) in self.state.call_sample.iter_mut().zip(&priors.has_prior) {
                *call = *call && has;
            }
            Vec::new()
        } else {
            self.candidate_repeat_seqs.clone()
        };

        let mut haplotype = Haplotype::generate(
            &self.region,
            &self.chrom_seq,
            &alternates,
            self.stutter_model.clone(),
        )?;
        if let Some(priors) = &self.allele_priors {
            // the prior tensor fixes the allele order
            for alt in &priors.alt_alleles {
                haplotype.repeat_mut().add_alternate(alt.to_ascii_uppercase());
            }
        }

        if (haplotype.repeat().min_len() as i64)
            < haplotype.repeat().stutter().max_deletion().abs()
        {
            return Ok(Some(FailureReason::RepeatBlockTooShort));
        }

        debug!(
            "haplotype with {} candidate alleles, stutter model {}",
            haplotype.num_combinations(),
            haplotype.repeat().stutter()
        );
        self.state.haplotype = Some(haplotype);
        Ok(None)
    }

    /// One ALIGN -> POSTERIOR -> REFINE pass over the current haplotype.
    fn run_cycle(&mut self) -> Option<FailureReason> {
        if self.aborted() {
            return Some(FailureReason::Cancelled);
        }
        info!("Aligning reads to each candidate haplotype...");
        self.align();
        if self.aborted() {
            return Some(FailureReason::Cancelled);
        }
        self.update_posteriors(None);
        if self.aborted() {
            return Some(FailureReason::Cancelled);
        }
        self.refine_allele_set()
    }

    /// Align every read (or pooled representative) against every candidate
    /// haplotype and install the fresh matrix and seeds.
    fn align(&mut self) {
        let haplotype = self.state.haplotype.take().unwrap();
        let (matrix, seeds) = self.alignment_matrix(&haplotype);
        self.state.haplotype = Some(haplotype);
        self.state.aln = Some(matrix);
        self.state.seeds = seeds;
        self.state.trace_cache.clear();
    }

    /// Alignment matrix of all reads against an arbitrary haplotype (used
    /// both for the installed haplotype and for temporary discovery
    /// haplotypes).
    pub(crate) fn alignment_matrix(
        &self,
        haplotype: &Haplotype,
    ) -> (Array2<LogProb>, Vec<Seed>) {
        let num_alleles = haplotype.num_combinations();
        let num_reads = self.state.reads.len();
        let mut aligner = HaplotypeAligner::new(haplotype);
        let mut matrix = Array2::from_elem((num_reads, num_alleles), LogProb::ln_one());
        let mut seeds = vec![Seed::Unanchored; num_reads];

        if self.pool_identical_seqs {
            let pool = &self.state.pool;
            let mut pool_lls = Vec::with_capacity(pool.len());
            let mut pool_seeds = Vec::with_capacity(pool.len());
            for p in 0..pool.len() {
                let quals = pool.mean_quals(p);
                let (seed, lls) = aligner.process_read(pool.seq(p), &quals);
                pool_seeds.push(seed);
                pool_lls.push(lls);
            }
            for r in 0..num_reads {
                let p = self.state.reads.pool_index[r];
                seeds[r] = pool_seeds[p];
                for k in 0..num_alleles {
                    matrix[[r, k]] = pool_lls[p][k];
                }
            }
        } else {
            for r in 0..num_reads {
                let (seed, lls) = aligner.process_read(
                    &self.state.reads.bases[r],
                    &self.state.reads.quals[r],
                );
                seeds[r] = seed;
                for k in 0..num_alleles {
                    matrix[[r, k]] = lls[k];
                }
            }
        }
        (matrix, seeds)
    }

    fn posterior_params(&self) -> PosteriorParams {
        PosteriorParams {
            aln: self.state.aln.as_ref().unwrap(),
            log_p1: &self.state.reads.log_p1,
            log_p2: &self.state.reads.log_p2,
            sample_label: &self.state.reads.sample_label,
            num_samples: self.num_samples(),
            haploid: self.haploid,
            priors: self.allele_priors.as_ref().map(|priors| &priors.tensor),
        }
    }

    /// Recompute the genotype posterior tensor, returning the total
    /// log-likelihood.
    pub(crate) fn update_posteriors(&mut self, weights: Option<&[u32]>) -> LogProb {
        let uniform;
        let weights = match weights {
            Some(weights) => weights,
            None => {
                uniform = vec![1u32; self.state.reads.len()];
                &uniform
            }
        };
        let (posteriors, totals, total_ll) = {
            let params = self.posterior_params();
            posteriors::log_sample_posteriors(&params, weights)
        };
        self.state.posteriors = Some(posteriors);
        self.state.sample_totals = totals;
        total_ll
    }

    /// Re-estimate the stutter model from the ML alignments and re-genotype
    /// with it.
    fn retrain(&mut self) -> Option<FailureReason> {
        info!("Retraining the stutter model from maximum likelihood alignments");
        let sizes = self.ml_read_sizes();
        let mut diffs = Vec::new();
        let mut log_p1 = Vec::new();
        let mut log_p2 = Vec::new();
        let mut sample_label = Vec::new();
        for (r, size) in sizes.iter().enumerate() {
            if let Some(size) = size {
                diffs.push(*size);
                log_p1.push(self.state.reads.log_p1[r]);
                log_p2.push(self.state.reads.log_p2[r]);
                sample_label.push(self.state.reads.sample_label[r]);
            }
        }
        let observations = LengthObservations {
            diffs: &diffs,
            log_p1: &log_p1,
            log_p2: &log_p2,
            sample_label: &sample_label,
            num_samples: self.num_samples(),
            ref_len: self.region.len(),
            haploid: self.haploid,
        };
        let init = self
            .state
            .haplotype
            .as_ref()
            .unwrap()
            .repeat()
            .stutter()
            .clone();
        let fit = match em::train(&observations, &init, &self.em_config) {
            Some(fit) => fit,
            None => return Some(FailureReason::StutterRetrainFailed),
        };
        info!("Learned stutter model: {}", fit.model);
        self.state
            .haplotype
            .as_mut()
            .unwrap()
            .repeat_mut()
            .set_stutter(fit.model);
        self.state.trace_cache.clear();
        self.run_cycle()
    }

    /// Per-read ML repeat size: base pair difference of the read's best
    /// phased allele plus the traced stutter artifact. `None` for reads
    /// without an anchored alignment.
    pub(crate) fn ml_read_sizes(&mut self) -> Vec<Option<i64>> {
        let bp_diffs = self.allele_bp_diffs();
        self.retrace_alignments()
            .into_iter()
            .map(|traced| traced.map(|(allele, trace)| bp_diffs[allele] + trace.stutter_size))
            .collect()
    }

    /// Mask reads excluded by post-hoc filtering, returning per-sample
    /// masked counts. Unanchored reads always count as masked.
    fn filter_alignments(&mut self) -> Vec<usize> {
        let mut masked = vec![0usize; self.num_samples()];
        let traces = self.retrace_alignments();
        let num_alleles = self.num_alleles();
        let mut filt_count = 0usize;
        let mut keep_count = 0usize;
        for (r, traced) in traces.iter().enumerate() {
            let sample = self.state.reads.sample_label[r];
            let trace = match traced {
                Some((_, trace)) => trace,
                None => {
                    masked[sample] += 1;
                    continue;
                }
            };
            let spanning = trace.start < self.region.start() && trace.stop > self.region.stop() + 1;
            if self.require_spanning && !spanning {
                self.state.seeds[r] = Seed::Masked;
                let aln = self.state.aln.as_mut().unwrap();
                for k in 0..num_alleles {
                    aln[[r, k]] = LogProb::ln_one();
                }
                masked[sample] += 1;
                filt_count += 1;
            } else {
                keep_count += 1;
            }
        }
        if filt_count > 0 {
            info!(
                "Filtered {} out of {} reads based on their ML alignment tracebacks",
                filt_count,
                filt_count + keep_count
            );
            self.update_posteriors(None);
        }
        masked
    }

    /// Assemble the locus result from the final posteriors and tracebacks.
    /// `None` when the abort signal fires during bootstrap iterations.
    fn emit(&mut self) -> Option<LocusCall> {
        let num_samples = self.num_samples();
        let num_alleles = self.num_alleles();
        let allele_bp_diffs = self.allele_bp_diffs();

        let masked_reads = self.filter_alignments();
        let traces = self.retrace_alignments();

        let posteriors = self.state.posteriors.as_ref().unwrap();
        let totals = &self.state.sample_totals;
        let genotypes = posteriors::optimal_genotypes(posteriors);
        let (unphased, phase_probs) = posteriors::unphased_posteriors(posteriors, &genotypes);
        let gls = posteriors::genotype_likelihoods(posteriors, totals, self.haploid);
        let gl_diffs = posteriors::gl_diffs(&gls, &genotypes, num_alleles, self.haploid);

        // posterior mean base pair dosage per sample
        let mut bp_dosages = Vec::with_capacity(num_samples);
        for s in 0..num_samples {
            let mut cells = Vec::with_capacity(num_alleles * num_alleles);
            let mut dip_diffs = Vec::with_capacity(num_alleles * num_alleles);
            for a in 0..num_alleles {
                for b in 0..num_alleles {
                    cells.push(posteriors[[a, b, s]]);
                    dip_diffs.push(allele_bp_diffs[a] + allele_bp_diffs[b]);
                }
            }
            let scale = if self.haploid { 0.5 } else { 1.0 };
            bp_dosages.push(scale * expected_value(&cells, &dip_diffs));
        }

        // per-read statistics grouped by sample
        let aln = self.state.aln.as_ref().unwrap();
        let reads = &self.state.reads;
        let mut num_aligned = vec![0usize; num_samples];
        let mut num_snp_reads = vec![0usize; num_samples];
        let mut strand_one = vec![0usize; num_samples];
        let mut strand_two = vec![0usize; num_samples];
        let mut stutter_reads = vec![0usize; num_samples];
        let mut flank_indel_reads = vec![0usize; num_samples];
        let mut allreads = vec![Vec::new(); num_samples];
        let mut mallreads = vec![Vec::new(); num_samples];
        let mut pallreads = vec![Vec::new(); num_samples];
        let mut log_read_phases = vec![Vec::new(); num_samples];

        for (r, traced) in traces.iter().enumerate() {
            let (allele, trace) = match traced {
                Some(traced) => traced,
                None => continue,
            };
            let s = reads.sample_label[r];
            let (gt_a, gt_b) = genotypes[s];
            let phase_one = *PROB_05 + reads.log_p1[r] + aln[[r, gt_a]];
            let phase_two = *PROB_05 + reads.log_p2[r] + aln[[r, gt_b]];
            let total = phase_one.ln_add_exp(phase_two);
            log_read_phases[s].push(LogProb(*phase_one - *total));

            if trace.stutter_size != 0 {
                stutter_reads[s] += 1;
            }
            if trace.has_flank_indel() {
                flank_indel_reads[s] += 1;
            }
            num_aligned[s] += 1;

            if (*reads.log_p1[r] - *reads.log_p2[r]).abs() > TOLERANCE {
                num_snp_reads[s] += 1;
                if reads.log_p1[r] > reads.log_p2[r] {
                    strand_one[s] += 1;
                } else {
                    strand_two[s] += 1;
                }
            }

            if let Some(diff) = reads.bp_diff[r] {
                allreads[s].push(diff);
            }
            let row: Vec<LogProb> = (0..num_alleles).map(|k| aln[[r, k]]).collect();
            pallreads[s].push(expected_value(&row, &allele_bp_diffs));

            // ML size, restricted to reads spanning the repeat by 5 bp
            let ml_size = allele_bp_diffs[*allele] + trace.stutter_size;
            if trace.start < self.region.start() - (MIN_FLANK_SPAN - 1)
                && trace.stop > self.region.stop() + MIN_FLANK_SPAN
            {
                mallreads[s].push(ml_size);
            }
        }

        let bootstrap_qualities = if self.output_bootstrap_quality {
            let params = self.posterior_params();
            Some(bootstrap::bootstrap_qualities(
                &params,
                &self.state.seeds,
                &genotypes,
                self.bootstrap_iterations,
                self.bootstrap_seed,
                self.abort.as_deref(),
            )?)
        } else {
            None
        };

        // allele counts over eligible, called samples
        let mut allele_counts = vec![0usize; num_alleles];
        let mut skip_count = 0usize;
        for (s, &(gt_a, gt_b)) in genotypes.iter().enumerate() {
            if self.require_one_read && num_aligned[s] == 0 {
                continue;
            }
            if self.state.call_sample[s] {
                if self.haploid {
                    assert_eq!(gt_a, gt_b);
                    allele_counts[gt_a] += 1;
                } else {
                    allele_counts[gt_a] += 1;
                    allele_counts[gt_b] += 1;
                }
            } else {
                skip_count += 1;
            }
        }

        // aggregate depths over called samples
        let mut depth = 0;
        let mut snp_total = 0;
        let mut masked_total = 0;
        let mut stutter_total = 0;
        let mut flank_total = 0;
        for s in 0..num_samples {
            if !self.state.call_sample[s] {
                continue;
            }
            depth += num_aligned[s];
            snp_total += num_snp_reads[s];
            masked_total += masked_reads[s];
            stutter_total += stutter_reads[s];
            flank_total += flank_indel_reads[s];
        }

        let mut samples = Vec::with_capacity(num_samples);
        for s in 0..num_samples {
            if !self.state.call_sample[s]
                || (self.require_one_read && num_aligned[s] == 0)
            {
                samples.push(None);
                continue;
            }
            let (gt_a, gt_b) = genotypes[s];
            let phase1_mass = if num_aligned[s] == 0 {
                0.0
            } else {
                LogProb::ln_sum_exp(&log_read_phases[s]).exp()
            };
            samples.push(Some(SampleCall {
                genotype: genotypes[s],
                bp_diffs: (allele_bp_diffs[gt_a], allele_bp_diffs[gt_b]),
                posterior_phased: posteriors[[gt_a, gt_b, s]].exp(),
                posterior_unphased: unphased[s].exp(),
                phase_prob: phase_probs[s],
                depth: num_aligned[s],
                snp_reads: num_snp_reads[s],
                masked_reads: masked_reads[s],
                stutter_reads: stutter_reads[s],
                flank_indel_reads: flank_indel_reads[s],
                phase_read_mass: (phase1_mass, num_aligned[s] as f64 - phase1_mass),
                snp_phase_counts: (strand_one[s], strand_two[s]),
                bp_dosage: bp_dosages[s],
                gl_diff: gl_diffs[s],
                bootstrap_quality: bootstrap_qualities.as_ref().map(|q| q[s]),
                gls: gls[s].clone(),
                pls: rescaled_likelihoods(&gls[s]),
                allreads: allreads[s].clone(),
                pallreads: pallreads[s].clone(),
                mallreads: mallreads[s].clone(),
            }));
        }

        let haplotype = self.state.haplotype.as_ref().unwrap();
        let stutter = haplotype.repeat().stutter();
        let (pos, mut alleles) = padded_alleles(&self.region, &self.chrom_seq, haplotype.repeat());
        let ref_allele = alleles.remove(0);

        Some(LocusCall {
            chrom: self.region.chrom().clone(),
            pos: pos + 1,
            name: self.region.name().clone(),
            period: self.region.period(),
            ref_allele,
            alt_alleles: alleles,
            allele_bp_diffs,
            allele_counts,
            skip_count,
            depth,
            snp_reads: snp_total,
            masked_reads: masked_total,
            stutter_reads: stutter_total,
            flank_indel_reads: flank_total,
            stutter_params: [
                stutter.in_geom(),
                stutter.in_up(),
                stutter.in_down(),
                stutter.out_geom(),
                stutter.out_up(),
                stutter.out_down(),
            ],
            sample_names: self.state.sample_names.clone(),
            samples,
        })
    }
}

/// Integer genotype likelihoods rescaled so the maximum is zero.
fn rescaled_likelihoods(gls: &[f64]) -> Vec<i32> {
    let max_gl = gls.iter().cloned().fold(f64::MIN, f64::max);
    gls.iter().map(|&gl| (gl - max_gl) as i32).collect()
}
