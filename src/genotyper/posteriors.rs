// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use bio::stats::LogProb;
use ndarray::{Array2, Array3};

use crate::constants::{GL_DIFF_UNDEFINED, LOG_IMPOSSIBLE, TOLERANCE};
use crate::utils::PROB_05;

/// Borrowed view of everything the E-step needs.
pub(crate) struct PosteriorParams<'a> {
    /// Read x allele log-alignment matrix.
    pub(crate) aln: &'a Array2<LogProb>,
    pub(crate) log_p1: &'a [LogProb],
    pub(crate) log_p2: &'a [LogProb],
    pub(crate) sample_label: &'a [usize],
    pub(crate) num_samples: usize,
    pub(crate) haploid: bool,
    /// Externally supplied per-sample phased-genotype log-priors.
    pub(crate) priors: Option<&'a Array3<LogProb>>,
}

/// Phased-genotype log-prior tensor.
///
/// Diploid default: every unordered genotype carries equal mass, so phased
/// heterozygotes get 1/(n(n+1)) and homozygotes 2/(n(n+1)). Haploid default:
/// off-diagonal cells are impossible, the diagonal is uniform.
pub(crate) fn init_log_priors(
    num_alleles: usize,
    num_samples: usize,
    haploid: bool,
    priors: Option<&Array3<LogProb>>,
) -> Array3<LogProb> {
    if let Some(priors) = priors {
        assert_eq!(
            priors.dim(),
            (num_alleles, num_alleles, num_samples),
            "bug: allele prior tensor out of sync with the haplotype"
        );
        return priors.clone();
    }
    let n = num_alleles as f64;
    if haploid {
        let log_homoz = LogProb(-n.ln());
        let mut tensor =
            Array3::from_elem((num_alleles, num_alleles, num_samples), LOG_IMPOSSIBLE);
        for a in 0..num_alleles {
            for s in 0..num_samples {
                tensor[[a, a, s]] = log_homoz;
            }
        }
        tensor
    } else {
        let log_hetz = LogProb(-(n.ln() + (n + 1.0).ln()));
        let log_homoz = LogProb(2f64.ln() - n.ln() - (n + 1.0).ln());
        let mut tensor = Array3::from_elem((num_alleles, num_alleles, num_samples), log_hetz);
        for a in 0..num_alleles {
            for s in 0..num_samples {
                tensor[[a, a, s]] = log_homoz;
            }
        }
        tensor
    }
}

/// Per-read per-genotype log-likelihood
/// `L[a, b, r] = logsumexp(log(1/2) + log_p1_r + A[r, a], log(1/2) + log_p2_r + A[r, b])`.
pub(crate) fn read_genotype_lls(
    aln: &Array2<LogProb>,
    log_p1: &[LogProb],
    log_p2: &[LogProb],
) -> Array3<LogProb> {
    let (num_reads, num_alleles) = aln.dim();
    let mut lls = Array3::from_elem((num_alleles, num_alleles, num_reads), LogProb::ln_one());
    for a in 0..num_alleles {
        for b in 0..num_alleles {
            for r in 0..num_reads {
                lls[[a, b, r]] = (*PROB_05 + log_p1[r] + aln[[r, a]])
                    .ln_add_exp(*PROB_05 + log_p2[r] + aln[[r, b]]);
            }
        }
    }
    lls
}

/// E-step: combine per-read alignment likelihoods and phasing priors into
/// normalized per-sample log-posteriors over ordered genotypes. Returns the
/// posterior tensor, per-sample normalizers (total log-likelihoods) and
/// their sum.
pub(crate) fn log_sample_posteriors(
    params: &PosteriorParams,
    weights: &[u32],
) -> (Array3<LogProb>, Vec<LogProb>, LogProb) {
    let (num_reads, num_alleles) = params.aln.dim();
    assert_eq!(weights.len(), num_reads);
    let mut posteriors =
        init_log_priors(num_alleles, params.num_samples, params.haploid, params.priors);

    for a in 0..num_alleles {
        for b in 0..num_alleles {
            for r in 0..num_reads {
                if weights[r] == 0 {
                    continue;
                }
                let term = (*PROB_05 + params.log_p1[r] + params.aln[[r, a]])
                    .ln_add_exp(*PROB_05 + params.log_p2[r] + params.aln[[r, b]]);
                let cell = &mut posteriors[[a, b, params.sample_label[r]]];
                *cell = LogProb(**cell + weights[r] as f64 * *term);
                debug_assert!(**cell <= TOLERANCE);
            }
        }
    }

    let mut totals = Vec::with_capacity(params.num_samples);
    for s in 0..params.num_samples {
        let cells: Vec<LogProb> = (0..num_alleles)
            .flat_map(|a| (0..num_alleles).map(move |b| (a, b)))
            .map(|(a, b)| posteriors[[a, b, s]])
            .collect();
        let total = LogProb::ln_sum_exp(&cells);
        for a in 0..num_alleles {
            for b in 0..num_alleles {
                let cell = &mut posteriors[[a, b, s]];
                *cell = LogProb(**cell - *total);
            }
        }
        totals.push(total);
    }
    let total_ll = LogProb(totals.iter().map(|total| **total).sum());
    (posteriors, totals, total_ll)
}

/// MAP ordered genotype per sample; ties resolve to the lexicographically
/// smallest pair.
pub(crate) fn optimal_genotypes(posteriors: &Array3<LogProb>) -> Vec<(usize, usize)> {
    let (num_alleles, _, num_samples) = posteriors.dim();
    let mut genotypes = vec![(0, 0); num_samples];
    let mut best = vec![LogProb(-f64::INFINITY); num_samples];
    for a in 0..num_alleles {
        for b in 0..num_alleles {
            for s in 0..num_samples {
                if posteriors[[a, b, s]] > best[s] {
                    best[s] = posteriors[[a, b, s]];
                    genotypes[s] = (a, b);
                }
            }
        }
    }
    genotypes
}

/// Unphased posterior and phase probability of each sample's MAP genotype.
pub(crate) fn unphased_posteriors(
    posteriors: &Array3<LogProb>,
    genotypes: &[(usize, usize)],
) -> (Vec<LogProb>, Vec<f64>) {
    let mut unphased = Vec::with_capacity(genotypes.len());
    let mut phase_probs = Vec::with_capacity(genotypes.len());
    for (s, &(a, b)) in genotypes.iter().enumerate() {
        if a == b {
            unphased.push(posteriors[[a, b, s]]);
            phase_probs.push(1.0);
        } else {
            let phased = posteriors[[a, b, s]];
            let total = phased.ln_add_exp(posteriors[[b, a, s]]);
            unphased.push(total);
            phase_probs.push((*phased - *total).exp());
        }
    }
    (unphased, phase_probs)
}

/// Per-sample log10 genotype likelihoods over unordered genotypes in VCF
/// order (haploid mode keeps homozygous cells only).
pub(crate) fn genotype_likelihoods(
    posteriors: &Array3<LogProb>,
    totals: &[LogProb],
    haploid: bool,
) -> Vec<Vec<f64>> {
    let (num_alleles, _, num_samples) = posteriors.dim();
    let mut gls = vec![Vec::new(); num_samples];
    for a in 0..num_alleles {
        for b in 0..=a {
            if haploid && a != b {
                continue;
            }
            for (s, gls) in gls.iter_mut().enumerate() {
                let phased = posteriors[[a, b, s]].ln_add_exp(posteriors[[b, a, s]]);
                let gl = *totals[s] + **PROB_05 + *phased;
                gls.push(gl * std::f64::consts::LOG10_E);
            }
        }
    }
    gls
}

/// Log10 likelihood gap between each sample's reported genotype and the next
/// best one. Negative when the reported genotype is not the likelihood
/// optimum (MAP and maximum likelihood may disagree under non-uniform
/// priors).
pub(crate) fn gl_diffs(
    gls: &[Vec<f64>],
    genotypes: &[(usize, usize)],
    num_alleles: usize,
    haploid: bool,
) -> Vec<f64> {
    genotypes
        .iter()
        .zip(gls)
        .map(|(&(a, b), gls)| {
            if num_alleles == 1 {
                return GL_DIFF_UNDEFINED;
            }
            let max_gl = gls.iter().cloned().fold(f64::MIN, f64::max);
            let mut second_gl = f64::MIN;
            for &gl in gls {
                if gl < max_gl {
                    second_gl = second_gl.max(gl);
                }
            }
            if second_gl == f64::MIN {
                second_gl = max_gl;
            }
            let gl_index = if haploid {
                a
            } else {
                let (min_gt, max_gt) = (a.min(b), a.max(b));
                max_gt * (max_gt + 1) / 2 + min_gt
            };
            if (max_gl - gls[gl_index]).abs() < TOLERANCE {
                max_gl - second_gl
            } else {
                gls[gl_index] - max_gl
            }
        })
        .collect()
}
