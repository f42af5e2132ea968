// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

pub(crate) mod pairhmm;
pub(crate) mod trace;

use bio::stats::pairhmm::PairHMM;
use bio::stats::LogProb;

use crate::haplotype::Haplotype;
use crate::utils::NUMERICAL_EPSILON;

use self::pairhmm::{CandidateEmission, EditDistanceCalculation, GapParams, ReadEmission};
use self::trace::{trace_read, Trace};

/// Length of the exact-match window used to anchor a read in the flanks.
pub(crate) const SEED_LEN: usize = 10;

/// Anchoring status of a read against the haplotype flanks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Seed {
    /// Read base position of a uniquely placed high-entropy anchor.
    Anchored(usize),
    /// No unambiguous anchor; the read is uninformative for genotyping.
    Unanchored,
    /// Masked by post-hoc filtering; excluded like unanchored reads.
    Masked,
}

impl Seed {
    pub(crate) fn is_aligned(&self) -> bool {
        matches!(self, Seed::Anchored(_))
    }
}

/// Aligns reads against every candidate haplotype, marginalizing repeat-block
/// stutter through the stutter model and scoring flanks with the
/// position-specific error model.
pub(crate) struct HaplotypeAligner<'a> {
    haplotype: &'a Haplotype,
    pairhmm: PairHMM,
    gap_params: GapParams,
}

impl<'a> HaplotypeAligner<'a> {
    pub(crate) fn new(haplotype: &'a Haplotype) -> Self {
        HaplotypeAligner {
            haplotype,
            pairhmm: PairHMM::new(),
            gap_params: GapParams,
        }
    }

    /// Position in the read where a high-entropy window is uniquely placed in
    /// one of the flanks. `None` when the read carries no unambiguous anchor
    /// (e.g. it lies entirely within the repeat tract).
    pub(crate) fn seed_position(&self, bases: &[u8]) -> Option<usize> {
        if bases.len() < SEED_LEN {
            return None;
        }
        let left = self.haplotype.left().seq();
        let right = self.haplotype.right().seq();
        let mut best: Option<(usize, usize)> = None;
        for window_start in 0..=bases.len() - SEED_LEN {
            let window = &bases[window_start..window_start + SEED_LEN];
            let occurrences = count_occurrences(left, window) + count_occurrences(right, window);
            if occurrences == 1 {
                // prefer the anchor farthest from the read ends
                let margin = window_start.min(bases.len() - (window_start + SEED_LEN));
                if best.map_or(true, |(_, m)| margin > m) {
                    best = Some((window_start, margin));
                }
            }
        }
        best.map(|(window_start, _)| window_start + SEED_LEN / 2)
    }

    /// Per-allele log-likelihoods of one read. Unanchored reads are reported
    /// uninformative: a zero log-probability for every allele, i.e. uniform.
    pub(crate) fn process_read(&mut self, bases: &[u8], quals: &[u8]) -> (Seed, Vec<LogProb>) {
        let num_alleles = self.haplotype.num_combinations();
        let seed = match self.seed_position(bases) {
            Some(pos) => Seed::Anchored(pos),
            None => return (Seed::Unanchored, vec![LogProb::ln_one(); num_alleles]),
        };

        let read_emission = ReadEmission::new(bases, quals);
        let edit_dist = if bases.len() <= EditDistanceCalculation::max_pattern_len() {
            Some(EditDistanceCalculation::new(bases.iter().copied()))
        } else {
            None
        };

        let mut likelihoods = Vec::with_capacity(num_alleles);
        for allele in 0..num_alleles {
            likelihoods.push(self.prob_read_allele(
                &read_emission,
                edit_dist.as_ref(),
                allele,
            ));
        }
        (seed, likelihoods)
    }

    /// `log P(read | allele)`, marginalized over stutter artifact sizes.
    fn prob_read_allele(
        &mut self,
        read_emission: &ReadEmission,
        edit_dist: Option<&EditDistanceCalculation>,
        allele: usize,
    ) -> LogProb {
        let repeat_len = self.haplotype.repeat().alternate(allele).len();
        let stutter = self.haplotype.repeat().stutter().clone();
        let mut summands = Vec::new();
        for delta in stutter.support() {
            let prob_artifact = stutter.log_prob_artifact(repeat_len, delta);
            if prob_artifact == LogProb::ln_zero() {
                continue;
            }
            let candidate = self.haplotype.seq(allele, delta);
            let prob_aln = self.prob_read_candidate(read_emission, edit_dist, &candidate);
            summands.push(prob_artifact + prob_aln);
        }
        LogProb::ln_sum_exp(&summands).cap_numerical_overshoot(NUMERICAL_EPSILON)
    }

    /// Probability of the read given one concrete candidate sequence, banded
    /// around the best edit-distance hit as in the realignment model.
    fn prob_read_candidate(
        &mut self,
        read_emission: &ReadEmission,
        edit_dist: Option<&EditDistanceCalculation>,
        candidate: &[u8],
    ) -> LogProb {
        let mut emission = CandidateEmission::new(candidate, read_emission);
        if let Some(edit_dist) = edit_dist {
            if let Some(hit) = edit_dist.calc_best_hit(&emission) {
                if hit.dist() == 0 {
                    // perfect match: all alternative paths are much worse
                    return read_emission.certainty_est();
                }
                emission.shrink_to_hit(&hit);
                return self.pairhmm.prob_related(
                    &self.gap_params,
                    &emission,
                    Some(hit.dist_upper_bound()),
                );
            }
        }
        self.pairhmm.prob_related(&self.gap_params, &emission, None)
    }

    /// Back-trace the optimal alignment of a read against `allele`, choosing
    /// the stutter size that maximizes artifact probability times alignment
    /// likelihood.
    pub(crate) fn trace_optimal(&mut self, bases: &[u8], quals: &[u8], allele: usize) -> Trace {
        let repeat_len = self.haplotype.repeat().alternate(allele).len();
        let stutter = self.haplotype.repeat().stutter().clone();
        let read_emission = ReadEmission::new(bases, quals);
        let edit_dist = if bases.len() <= EditDistanceCalculation::max_pattern_len() {
            Some(EditDistanceCalculation::new(bases.iter().copied()))
        } else {
            None
        };

        let mut best_delta = 0i64;
        let mut best_score = LogProb::ln_zero();
        for delta in stutter.support() {
            let prob_artifact = stutter.log_prob_artifact(repeat_len, delta);
            if prob_artifact == LogProb::ln_zero() {
                continue;
            }
            let candidate = self.haplotype.seq(allele, delta);
            let score =
                prob_artifact + self.prob_read_candidate(&read_emission, edit_dist.as_ref(), &candidate);
            if score > best_score {
                best_score = score;
                best_delta = delta;
            }
        }
        trace_read(self.haplotype, allele, best_delta, bases)
    }
}

fn count_occurrences(seq: &[u8], window: &[u8]) -> usize {
    if seq.len() < window.len() {
        return 0;
    }
    seq.windows(window.len()).filter(|w| *w == window).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locus::Region;
    use crate::stutter::StutterModel;

    fn haplotype(alternates: &[&[u8]]) -> Haplotype {
        let mut chrom = b"TTGACGGATCTTAAGCTGACGGATCTTAAGCTAGCTGATC".to_vec();
        chrom.extend_from_slice(b"ACACACAC");
        chrom.extend_from_slice(b"GGTTAGCCATTGCAAGTCCGGTTAGCCATTGCAAGTCCGG");
        let region = Region::new("chr1", 40, 47, 2, None).unwrap();
        let stutter = StutterModel::new(0.9, 0.05, 0.1, 0.9, 0.01, 0.01, 2, 4, -4).unwrap();
        let alternates: Vec<Vec<u8>> = alternates.iter().map(|s| s.to_vec()).collect();
        Haplotype::generate(&region, &chrom, &alternates, stutter).unwrap()
    }

    #[test]
    fn test_seed_in_flank() {
        let hap = haplotype(&[]);
        let aligner = HaplotypeAligner::new(&hap);
        let read = hap.seq(0, 0)[15..55].to_vec();
        assert!(aligner.seed_position(&read).is_some());
        // a read consisting only of repeat sequence has no anchor
        assert_eq!(aligner.seed_position(b"ACACACACACAC"), None);
    }

    #[test]
    fn test_matching_allele_preferred() {
        let hap = haplotype(&[b"ACACACACACAC"]);
        let mut aligner = HaplotypeAligner::new(&hap);
        // read carrying the 12 bp alternate
        let read = hap.seq(1, 0)[15..55].to_vec();
        let quals = vec![30u8; read.len()];
        let (seed, lls) = aligner.process_read(&read, &quals);
        assert!(seed.is_aligned());
        assert_eq!(lls.len(), 2);
        assert!(lls[1] > lls[0]);
        assert!(*lls[1] <= 0.0);

        // reference read prefers the reference allele
        let read = hap.seq(0, 0)[15..55].to_vec();
        let quals = vec![30u8; read.len()];
        let (_, lls) = aligner.process_read(&read, &quals);
        assert!(lls[0] > lls[1]);
    }

    #[test]
    fn test_unanchored_read_uniform() {
        let hap = haplotype(&[]);
        let mut aligner = HaplotypeAligner::new(&hap);
        let (seed, lls) = aligner.process_read(b"ACACACACACAC", &[30u8; 12]);
        assert_eq!(seed, Seed::Unanchored);
        assert!(lls.iter().all(|ll| *ll == LogProb::ln_one()));
    }

    #[test]
    fn test_trace_optimal_picks_stutter() {
        let hap = haplotype(&[]);
        let mut aligner = HaplotypeAligner::new(&hap);
        // read with one extra motif copy relative to the single reference allele
        let read = hap.seq(0, 2)[15..55].to_vec();
        let quals = vec![30u8; read.len()];
        let trace = aligner.trace_optimal(&read, &quals, 0);
        assert_eq!(trace.stutter_size, 2);
        assert_eq!(trace.repeat_seq, b"ACACACACAC".to_vec());
    }
}
