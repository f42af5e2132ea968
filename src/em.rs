// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use bio::stats::LogProb;
use itertools::Itertools;
use ndarray::Array3;

use crate::constants::LOG_IMPOSSIBLE;
use crate::stutter::StutterModel;
use crate::utils::PROB_05;

/// Keeps estimated frequencies and stutter parameters off the boundary of
/// the parameter space for degenerate inputs.
const PSEUDOCOUNT: f64 = 1e-3;

const MIN_GEOM: f64 = 1e-4;

/// Convergence settings for the stutter EM.
#[derive(Debug, Clone, Copy, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct EmConfig {
    pub max_iter: usize,
    pub abs_ll_converge: f64,
    pub frac_ll_converge: f64,
}

impl Default for EmConfig {
    fn default() -> Self {
        EmConfig {
            max_iter: 100,
            abs_ll_converge: 0.01,
            frac_ll_converge: 0.001,
        }
    }
}

/// Per-read repeat-length observations for the EM re-estimator.
pub(crate) struct LengthObservations<'a> {
    /// Net repeat-length difference of each read from the reference allele.
    pub(crate) diffs: &'a [i64],
    pub(crate) log_p1: &'a [LogProb],
    pub(crate) log_p2: &'a [LogProb],
    pub(crate) sample_label: &'a [usize],
    pub(crate) num_samples: usize,
    /// Reference repeat length in base pairs.
    pub(crate) ref_len: usize,
    pub(crate) haploid: bool,
}

/// Result of a successful EM fit: the re-estimated stutter model together
/// with the per-sample posterior over ordered length-genotypes.
#[derive(Debug)]
pub(crate) struct StutterFit {
    pub(crate) model: StutterModel,
    pub(crate) lengths: Vec<i64>,
    pub(crate) genotype_posteriors: Array3<LogProb>,
}

/// Expectation-maximization over the six stutter parameters and per-allele
/// frequencies, with candidate length-alleles taken from the distinct
/// observed repeat-length differences. Returns `None` when the fit does not
/// converge or produces invalid parameters.
pub(crate) fn train(
    observations: &LengthObservations,
    init: &StutterModel,
    config: &EmConfig,
) -> Option<StutterFit> {
    let lengths: Vec<i64> = observations.diffs.iter().cloned().sorted().dedup().collect();
    let n = lengths.len();
    if n == 0 {
        return None;
    }
    let num_reads = observations.diffs.len();
    let period = init.period();

    let mut model = init.clone();
    let mut freqs = vec![1.0 / n as f64; n];
    let mut prev_ll: Option<f64> = None;
    let mut posteriors = Array3::from_elem((n, n, observations.num_samples), LogProb::ln_one());

    // group reads by sample once
    let mut reads_by_sample = vec![Vec::new(); observations.num_samples];
    for r in 0..num_reads {
        reads_by_sample[observations.sample_label[r]].push(r);
    }

    let true_len = |allele: usize, lengths: &[i64]| -> usize {
        (observations.ref_len as i64 + lengths[allele]).max(0) as usize
    };

    for _ in 0..config.max_iter {
        // E-step: per-sample posterior over ordered length-genotypes
        let mut total_ll = 0.0;
        for s in 0..observations.num_samples {
            let mut cells = Vec::with_capacity(n * n);
            for a in 0..n {
                for b in 0..n {
                    let log_prior = if observations.haploid {
                        if a == b {
                            LogProb(freqs[a].ln())
                        } else {
                            LOG_IMPOSSIBLE
                        }
                    } else {
                        LogProb(freqs[a].ln() + freqs[b].ln())
                    };
                    let mut cell = log_prior;
                    for &r in &reads_by_sample[s] {
                        let delta_a = observations.diffs[r] - lengths[a];
                        let delta_b = observations.diffs[r] - lengths[b];
                        let term = (*PROB_05
                            + observations.log_p1[r]
                            + model.log_prob_artifact(true_len(a, &lengths), delta_a))
                        .ln_add_exp(
                            *PROB_05
                                + observations.log_p2[r]
                                + model.log_prob_artifact(true_len(b, &lengths), delta_b),
                        );
                        cell = cell + term;
                    }
                    cells.push(cell);
                    posteriors[[a, b, s]] = cell;
                }
            }
            let total = LogProb::ln_sum_exp(&cells);
            if *total == f64::NEG_INFINITY {
                return None;
            }
            for a in 0..n {
                for b in 0..n {
                    posteriors[[a, b, s]] = LogProb(*posteriors[[a, b, s]] - *total);
                }
            }
            total_ll += *total;
        }

        if let Some(prev) = prev_ll {
            let improvement = total_ll - prev;
            if improvement.abs() < config.abs_ll_converge
                || improvement.abs() < config.frac_ll_converge * prev.abs()
            {
                return Some(StutterFit {
                    model,
                    lengths,
                    genotype_posteriors: posteriors,
                });
            }
        }
        prev_ll = Some(total_ll);

        // M-step: expected artifact and allele counts
        let mut eq_mass = PSEUDOCOUNT;
        let mut in_up_mass = PSEUDOCOUNT;
        let mut in_down_mass = PSEUDOCOUNT;
        let mut out_up_mass = PSEUDOCOUNT;
        let mut out_down_mass = PSEUDOCOUNT;
        let mut in_events = PSEUDOCOUNT;
        let mut in_steps = 2.0 * PSEUDOCOUNT;
        let mut out_events = PSEUDOCOUNT;
        let mut out_steps = 2.0 * PSEUDOCOUNT;
        let mut freq_counts = vec![PSEUDOCOUNT; n];

        let mut record = |mass: f64, delta: i64| {
            if delta == 0 {
                eq_mass += mass;
            } else if delta.unsigned_abs() % period as u64 == 0 {
                if delta > 0 {
                    in_up_mass += mass;
                } else {
                    in_down_mass += mass;
                }
                in_events += mass;
                in_steps += mass * (delta.unsigned_abs() / period as u64) as f64;
            } else {
                if delta > 0 {
                    out_up_mass += mass;
                } else {
                    out_down_mass += mass;
                }
                out_events += mass;
                out_steps += mass * delta.unsigned_abs() as f64;
            }
        };

        for s in 0..observations.num_samples {
            for a in 0..n {
                for b in 0..n {
                    let weight = posteriors[[a, b, s]].exp();
                    if weight < 1e-12 {
                        continue;
                    }
                    for &r in &reads_by_sample[s] {
                        let delta_a = observations.diffs[r] - lengths[a];
                        let delta_b = observations.diffs[r] - lengths[b];
                        let term_a = *PROB_05
                            + observations.log_p1[r]
                            + model.log_prob_artifact(true_len(a, &lengths), delta_a);
                        let term_b = *PROB_05
                            + observations.log_p2[r]
                            + model.log_prob_artifact(true_len(b, &lengths), delta_b);
                        let total = term_a.ln_add_exp(term_b);
                        if *total == f64::NEG_INFINITY {
                            continue;
                        }
                        let phase_one = (*term_a - *total).exp();
                        record(weight * phase_one, delta_a);
                        record(weight * (1.0 - phase_one), delta_b);
                        freq_counts[a] += weight * phase_one;
                        freq_counts[b] += weight * (1.0 - phase_one);
                    }
                }
            }
        }
        drop(record);

        let artifact_total =
            eq_mass + in_up_mass + in_down_mass + out_up_mass + out_down_mass;
        let in_geom = (in_events / in_steps).clamp(MIN_GEOM, 1.0 - MIN_GEOM);
        let out_geom = (out_events / out_steps).clamp(MIN_GEOM, 1.0 - MIN_GEOM);
        model = StutterModel::new(
            in_geom,
            in_up_mass / artifact_total,
            in_down_mass / artifact_total,
            out_geom,
            out_up_mass / artifact_total,
            out_down_mass / artifact_total,
            period,
            init.max_insertion(),
            init.max_deletion(),
        )
        .ok()?;

        let freq_total: f64 = freq_counts.iter().sum();
        for (freq, count) in freqs.iter_mut().zip(&freq_counts) {
            *freq = count / freq_total;
        }
    }

    // ran out of iterations without converging
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init_model() -> StutterModel {
        StutterModel::new(0.8, 0.1, 0.15, 0.8, 0.05, 0.05, 2, 6, -6).unwrap()
    }

    fn uniform_phase(n: usize) -> Vec<LogProb> {
        vec![*PROB_05; n]
    }

    #[test]
    fn test_stutter_free_reads_shrink_artifact_mass() {
        // one sample, all reads exactly at +4 bp
        let diffs = vec![4i64; 20];
        let p1 = uniform_phase(20);
        let p2 = uniform_phase(20);
        let labels = vec![0usize; 20];
        let observations = LengthObservations {
            diffs: &diffs,
            log_p1: &p1,
            log_p2: &p2,
            sample_label: &labels,
            num_samples: 1,
            ref_len: 12,
            haploid: false,
        };
        let fit = train(&observations, &init_model(), &EmConfig::default()).unwrap();
        assert_eq!(fit.lengths, vec![4]);
        assert!(fit.model.in_up() < 0.01);
        assert!(fit.model.in_down() < 0.01);
        let gts = crate::genotyper::posteriors::optimal_genotypes(&fit.genotype_posteriors);
        assert_eq!(gts[0], (0, 0));
    }

    #[test]
    fn test_heterozygous_lengths_recovered() {
        // half the reads at 0 bp, half at +4 bp
        let mut diffs = vec![0i64; 10];
        diffs.extend(vec![4i64; 10]);
        let p1 = uniform_phase(20);
        let p2 = uniform_phase(20);
        let labels = vec![0usize; 20];
        let observations = LengthObservations {
            diffs: &diffs,
            log_p1: &p1,
            log_p2: &p2,
            sample_label: &labels,
            num_samples: 1,
            ref_len: 12,
            haploid: false,
        };
        let fit = train(&observations, &init_model(), &EmConfig::default()).unwrap();
        assert_eq!(fit.lengths, vec![0, 4]);
        let gts = crate::genotyper::posteriors::optimal_genotypes(&fit.genotype_posteriors);
        assert!(gts[0] == (0, 1) || gts[0] == (1, 0));
    }

    #[test]
    fn test_no_observations_fails() {
        let observations = LengthObservations {
            diffs: &[],
            log_p1: &[],
            log_p2: &[],
            sample_label: &[],
            num_samples: 1,
            ref_len: 12,
            haploid: false,
        };
        assert!(train(&observations, &init_model(), &EmConfig::default()).is_none());
    }
}
