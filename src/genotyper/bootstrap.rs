// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::sync::atomic::{AtomicBool, Ordering};

use bio::stats::LogProb;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::align::Seed;

use super::posteriors::{
    init_log_priors, optimal_genotypes, read_genotype_lls, PosteriorParams,
};

/// Multinomial bootstrap over each sample's aligned reads: the fraction of
/// iterations in which the resampled MAP genotype matches the original as an
/// unordered pair. Returns `None` when the abort signal fires between
/// iterations.
pub(crate) fn bootstrap_qualities(
    params: &PosteriorParams,
    seeds: &[Seed],
    genotypes: &[(usize, usize)],
    iterations: usize,
    rng_seed: u64,
    abort: Option<&AtomicBool>,
) -> Option<Vec<f64>> {
    let (num_reads, num_alleles) = params.aln.dim();
    assert_eq!(seeds.len(), num_reads);

    // partition the aligned reads by sample
    let mut reads_by_sample = vec![Vec::new(); params.num_samples];
    for (r, seed) in seeds.iter().enumerate() {
        if seed.is_aligned() {
            reads_by_sample[params.sample_label[r]].push(r);
        }
    }

    // precompute all read log-likelihoods for each ordered genotype
    let read_lls = read_genotype_lls(params.aln, params.log_p1, params.log_p2);
    let prior = init_log_priors(num_alleles, params.num_samples, params.haploid, params.priors);

    let mut rng = StdRng::seed_from_u64(rng_seed);
    let mut match_counts = vec![0usize; params.num_samples];
    for _ in 0..iterations {
        if abort.map_or(false, |signal| signal.load(Ordering::Relaxed)) {
            return None;
        }
        let mut weights = vec![0u32; num_reads];
        for sample_reads in &reads_by_sample {
            for _ in 0..sample_reads.len() {
                weights[sample_reads[rng.gen_range(0..sample_reads.len())]] += 1;
            }
        }

        // recompute unnormalized posteriors with the resampled weights
        let mut tensor = prior.clone();
        for a in 0..num_alleles {
            for b in 0..num_alleles {
                for r in 0..num_reads {
                    if weights[r] == 0 {
                        continue;
                    }
                    let cell = &mut tensor[[a, b, params.sample_label[r]]];
                    *cell = LogProb(**cell + weights[r] as f64 * *read_lls[[a, b, r]]);
                }
            }
        }

        let resampled = optimal_genotypes(&tensor);
        for (s, (&(a, b), &(orig_a, orig_b))) in
            resampled.iter().zip(genotypes).enumerate()
        {
            if (a, b) == (orig_a, orig_b) || (b, a) == (orig_a, orig_b) {
                match_counts[s] += 1;
            }
        }
    }

    Some(
        match_counts
            .iter()
            .map(|&count| count as f64 / iterations as f64)
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::PROB_05;
    use ndarray::Array2;

    #[test]
    fn test_certain_call_has_full_quality() {
        let mut aln = Array2::from_elem((20, 3), LogProb(-20.0));
        for r in 0..20 {
            aln[[r, 1]] = LogProb(-0.1);
        }
        let p1 = vec![*PROB_05; 20];
        let p2 = vec![*PROB_05; 20];
        let labels = vec![0usize; 20];
        let params = PosteriorParams {
            aln: &aln,
            log_p1: &p1,
            log_p2: &p2,
            sample_label: &labels,
            num_samples: 1,
            haploid: false,
            priors: None,
        };
        let seeds = vec![Seed::Anchored(5); 20];
        let qualities = bootstrap_qualities(&params, &seeds, &[(1, 1)], 100, 42, None).unwrap();
        assert_eq!(qualities, vec![1.0]);
    }

    #[test]
    fn test_sample_without_reads_never_matches_by_chance() {
        // with no aligned reads every iteration reproduces the prior argmax
        let aln = Array2::from_elem((0, 2), LogProb::ln_one());
        let params = PosteriorParams {
            aln: &aln,
            log_p1: &[],
            log_p2: &[],
            sample_label: &[],
            num_samples: 1,
            haploid: false,
            priors: None,
        };
        let qualities = bootstrap_qualities(&params, &[], &[(0, 0)], 10, 7, None).unwrap();
        // prior argmax is the homozygous reference cell, which matches
        assert_eq!(qualities, vec![1.0]);
    }
}
