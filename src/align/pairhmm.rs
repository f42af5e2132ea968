// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::cmp;
use std::cmp::Ordering;

use bio::pattern_matching::myers::Myers;
use bio::stats::pairhmm;
use bio::stats::{LogProb, PHREDProb, Prob};

/// Width of band around alignment with optimal edit distance.
pub(crate) const EDIT_BAND: usize = 2;

lazy_static! {
    static ref PROB_CONFUSION: LogProb = LogProb::from(Prob(0.3333));
    /// Flank indel open/extend probabilities of the position-specific error
    /// model. Indels inside the repeat tract are not scored here; they are
    /// marginalized through the stutter model instead.
    static ref PROB_FLANK_INDEL_OPEN: LogProb = LogProb::from(Prob(1e-4));
    static ref PROB_FLANK_INDEL_EXTEND: LogProb = LogProb::from(Prob(0.1));
}

/// unpack miscall probability of read_base.
pub(crate) fn prob_read_base_miscall(base_qual: u8) -> LogProb {
    LogProb::from(PHREDProb::from(base_qual as f64))
}

/// Position-specific emission model of one read, derived from its base
/// qualities.
#[derive(Debug)]
pub(crate) struct ReadEmission {
    bases: Vec<u8>,
    any_miscall: Vec<LogProb>,
    no_miscall: Vec<LogProb>,
}

impl ReadEmission {
    pub(crate) fn new(bases: &[u8], quals: &[u8]) -> Self {
        assert_eq!(bases.len(), quals.len());
        let mut any_miscall = vec![LogProb::ln_zero(); bases.len()];
        let mut no_miscall = any_miscall.clone();
        for (j, &qual) in quals.iter().enumerate() {
            let prob_miscall = prob_read_base_miscall(qual);
            any_miscall[j] = prob_miscall;
            no_miscall[j] = prob_miscall.ln_one_minus_exp();
        }
        ReadEmission {
            bases: bases.to_vec(),
            any_miscall,
            no_miscall,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.bases.len()
    }

    fn particular_miscall(&self, j: usize) -> LogProb {
        self.any_miscall[j] + *PROB_CONFUSION
    }

    /// Calculate probability of read_base given ref_base.
    pub(crate) fn prob_match_mismatch(&self, j: usize, ref_base: u8) -> pairhmm::XYEmission {
        if self.bases[j].to_ascii_uppercase() == ref_base.to_ascii_uppercase() {
            pairhmm::XYEmission::Match(self.no_miscall[j])
        } else {
            pairhmm::XYEmission::Mismatch(self.particular_miscall(j))
        }
    }

    pub(crate) fn prob_insertion(&self, j: usize) -> LogProb {
        self.any_miscall[j]
    }

    /// Probability that none of the bases is miscalled.
    pub(crate) fn certainty_est(&self) -> LogProb {
        self.no_miscall.iter().sum()
    }
}

/// Gap parameters for the pair HMM over a candidate haplotype.
#[derive(Debug, Clone)]
pub(crate) struct GapParams;

impl pairhmm::GapParameters for GapParams {
    #[inline]
    fn prob_gap_x(&self) -> LogProb {
        *PROB_FLANK_INDEL_OPEN
    }

    #[inline]
    fn prob_gap_y(&self) -> LogProb {
        *PROB_FLANK_INDEL_OPEN
    }

    #[inline]
    fn prob_gap_x_extend(&self) -> LogProb {
        *PROB_FLANK_INDEL_EXTEND
    }

    #[inline]
    fn prob_gap_y_extend(&self) -> LogProb {
        *PROB_FLANK_INDEL_EXTEND
    }
}

impl pairhmm::StartEndGapParameters for GapParams {
    /// Semiglobal alignment: return true.
    #[inline]
    fn free_start_gap_x(&self) -> bool {
        true
    }

    /// Semiglobal alignment: return true.
    #[inline]
    fn free_end_gap_x(&self) -> bool {
        true
    }

    /// Semiglobal alignment: return 1.0.
    #[inline]
    fn prob_start_gap_x(&self, _: usize) -> LogProb {
        LogProb::ln_one()
    }
}

/// Emission parameters over one materialized candidate haplotype sequence
/// (flanks plus a stutter-stretched repeat alternate).
#[derive(Debug)]
pub(crate) struct CandidateEmission<'a> {
    seq: &'a [u8],
    ref_offset: usize,
    ref_end: usize,
    read_emission: &'a ReadEmission,
}

impl<'a> CandidateEmission<'a> {
    pub(crate) fn new(seq: &'a [u8], read_emission: &'a ReadEmission) -> Self {
        CandidateEmission {
            seq,
            ref_offset: 0,
            ref_end: seq.len(),
            read_emission,
        }
    }

    #[inline]
    fn ref_base(&self, i: usize) -> u8 {
        self.seq[i + self.ref_offset]
    }

    pub(crate) fn shrink_to_hit(&mut self, hit: &EditDistanceHit) {
        self.ref_end = cmp::min(self.ref_offset + hit.end + EDIT_BAND, self.ref_end);
        self.ref_offset += hit.start.saturating_sub(EDIT_BAND);
    }
}

impl<'a> pairhmm::EmissionParameters for CandidateEmission<'a> {
    #[inline]
    fn prob_emit_xy(&self, i: usize, j: usize) -> pairhmm::XYEmission {
        let r = self.ref_base(i);
        self.read_emission.prob_match_mismatch(j, r)
    }

    #[inline]
    fn prob_emit_x(&self, _: usize) -> LogProb {
        LogProb::ln_one()
    }

    #[inline]
    fn prob_emit_y(&self, j: usize) -> LogProb {
        self.read_emission.prob_insertion(j)
    }

    #[inline]
    fn len_x(&self) -> usize {
        self.ref_end - self.ref_offset
    }

    #[inline]
    fn len_y(&self) -> usize {
        self.read_emission.len()
    }
}

pub(crate) struct EditDistanceCalculation {
    myers: Myers<u128>,
    read_seq_len: usize,
}

impl EditDistanceCalculation {
    pub(crate) fn max_pattern_len() -> usize {
        128
    }

    /// Create new instance.
    ///
    /// # Arguments
    /// * `read_seq` - read sequence (may not exceed 128 bases).
    pub(crate) fn new<P>(read_seq: P) -> Self
    where
        P: Iterator<Item = u8> + DoubleEndedIterator + ExactSizeIterator,
    {
        let l = read_seq.len();
        EditDistanceCalculation {
            myers: Myers::new(read_seq.rev()),
            read_seq_len: l,
        }
    }

    /// Returns a reasonable upper bound for the edit distance in order to
    /// band the pairHMM computation. We use the best edit distance and add a
    /// small band.
    pub(crate) fn calc_best_hit(&self, emission_params: &CandidateEmission) -> Option<EditDistanceHit> {
        use bio::stats::pairhmm::EmissionParameters;

        let len_x = emission_params.len_x();
        let ref_seq = (0..len_x)
            .rev()
            .map(|i| emission_params.ref_base(i).to_ascii_uppercase());
        let mut best_dist = u8::max_value();
        let mut positions = Vec::new();
        for (pos, dist) in self.myers.find_all_end(ref_seq, u8::max_value()) {
            match dist.cmp(&best_dist) {
                Ordering::Less => {
                    positions.clear();
                    positions.push(pos);
                    best_dist = dist;
                }
                Ordering::Equal => {
                    positions.push(pos);
                }
                Ordering::Greater => (),
            }
        }
        if positions.is_empty() {
            return None;
        }

        // We find a pos relative to ref end, hence we have to project it to a
        // position relative to the start.
        let project = |pos| len_x - pos;
        let start = project(*positions.last().unwrap()).saturating_sub(best_dist as usize);
        // take the last (aka first because we are mapping backwards) position
        // for an upper bound of the putative end
        let end = cmp::min(
            project(positions[0]) + self.read_seq_len + best_dist as usize,
            len_x,
        );
        Some(EditDistanceHit {
            start,
            end,
            dist: best_dist,
        })
    }
}

#[derive(Debug, Clone)]
pub(crate) struct EditDistanceHit {
    start: usize,
    end: usize,
    dist: u8,
}

impl EditDistanceHit {
    pub(crate) fn dist(&self) -> u8 {
        self.dist
    }

    pub(crate) fn dist_upper_bound(&self) -> usize {
        self.dist as usize + EDIT_BAND
    }
}
