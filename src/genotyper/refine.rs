// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::collections::{BTreeSet, HashMap};

use bio::stats::LogProb;
use ndarray::Array2;

use crate::align::trace::{reindex_trace_cache, Trace};
use crate::align::HaplotypeAligner;
use crate::constants::{MIN_CANDIDATE_FRAC, MIN_CANDIDATE_READS};
use crate::haplotype::RepeatBlock;
use crate::output::FailureReason;
use crate::utils::PROB_05;

use super::posteriors;
use super::{Genotyper, LocusState};

impl Genotyper {
    /// Refine the candidate allele set after the first posterior pass:
    /// discover additional alleles hidden in stutter artifacts, then prune
    /// alleles without a MAP call. Disabled when external allele priors fix
    /// the allele set.
    pub(crate) fn refine_allele_set(&mut self) -> Option<FailureReason> {
        if self.allele_priors.is_some() {
            return None;
        }
        if let Err(reason) = self.discover_stutter_alleles() {
            return Some(reason);
        }
        self.prune_uncalled_alleles();
        None
    }

    /// Retrace every aligned read against its sample's MAP genotype, picking
    /// the phase with the larger phased likelihood. Traces are served from
    /// the `(pool, allele)` cache.
    pub(crate) fn retrace_alignments(&mut self) -> Vec<Option<(usize, Trace)>> {
        let genotypes =
            posteriors::optimal_genotypes(self.state.posteriors.as_ref().unwrap());
        let LocusState {
            haplotype,
            trace_cache,
            reads,
            seeds,
            aln,
            ..
        } = &mut self.state;
        let haplotype = haplotype.as_ref().unwrap();
        let aln = aln.as_ref().unwrap();
        let mut aligner = HaplotypeAligner::new(haplotype);

        let mut traced = Vec::with_capacity(reads.len());
        for r in 0..reads.len() {
            if !seeds[r].is_aligned() {
                traced.push(None);
                continue;
            }
            let (gt_a, gt_b) = genotypes[reads.sample_label[r]];
            let phase_one = *PROB_05 + reads.log_p1[r] + aln[[r, gt_a]];
            let phase_two = *PROB_05 + reads.log_p2[r] + aln[[r, gt_b]];
            let best = if phase_one > phase_two { gt_a } else { gt_b };
            let trace = trace_cache
                .entry((reads.pool_index[r], best))
                .or_insert_with(|| aligner.trace_optimal(&reads.bases[r], &reads.quals[r], best))
                .clone();
            traced.push(Some((best, trace)));
        }
        traced
    }

    /// Candidate repeat sequences suggested by nonzero-stutter tracebacks:
    /// accepted when some sample supports the sequence with at least two
    /// reads covering at least 15% of its spanning tracebacks.
    fn stutter_candidates(&mut self) -> Vec<Vec<u8>> {
        let traced = self.retrace_alignments();
        let haplotype = self.state.haplotype.as_ref().unwrap();
        let num_samples = self.num_samples();
        let mut sample_counts = vec![0usize; num_samples];
        let mut stutter_counts: Vec<HashMap<Vec<u8>, usize>> =
            vec![HashMap::new(); num_samples];
        for (r, traced) in traced.iter().enumerate() {
            let trace = match traced {
                Some((_, trace)) => trace,
                None => continue,
            };
            if trace.spans_repeat(haplotype) {
                if trace.stutter_size != 0 {
                    *stutter_counts[self.state.reads.sample_label[r]]
                        .entry(trace.repeat_seq.clone())
                        .or_insert(0) += 1;
                }
                sample_counts[self.state.reads.sample_label[r]] += 1;
            }
        }

        let mut candidates = BTreeSet::new();
        for s in 0..num_samples {
            for (seq, &count) in &stutter_counts[s] {
                if haplotype.repeat().contains(seq) {
                    continue;
                }
                if count >= MIN_CANDIDATE_READS
                    && count as f64 / sample_counts[s] as f64 >= MIN_CANDIDATE_FRAC
                {
                    candidates.insert(seq.clone());
                }
            }
        }
        candidates.into_iter().collect()
    }

    /// Closed discovery loop: propose stutter-derived candidate alleles,
    /// align all reads against a temporary haplotype holding only the
    /// candidates, merge the new likelihood columns into the existing
    /// matrix, rebuild the haplotype and recompute posteriors; repeat until
    /// discovery yields nothing new.
    fn discover_stutter_alleles(&mut self) -> Result<(), FailureReason> {
        loop {
            if self.aborted() {
                return Err(FailureReason::Cancelled);
            }
            let mut candidates = self.stutter_candidates();
            info!(
                "Identified {} additional candidate alleles from stutter artifacts",
                candidates.len()
            );
            if candidates.is_empty() {
                return Ok(());
            }
            candidates.sort_by_key(|seq| seq.len());
            for seq in &candidates {
                debug!("\t{}", String::from_utf8_lossy(seq));
            }

            let max_deletion = self
                .state
                .haplotype
                .as_ref()
                .unwrap()
                .repeat()
                .stutter()
                .max_deletion()
                .unsigned_abs() as usize;
            if candidates[0].len() < max_deletion {
                return Err(FailureReason::StutterAlleleTooShort);
            }

            // align every read against a haplotype holding only the candidates
            let temp_haplotype = {
                let haplotype = self.state.haplotype.as_ref().unwrap();
                let repeat = haplotype.repeat();
                let mut block = RepeatBlock::new(
                    repeat.start(),
                    candidates[0].clone(),
                    repeat.period(),
                    repeat.stutter().clone(),
                );
                for candidate in &candidates[1..] {
                    block.add_alternate(candidate.clone());
                }
                haplotype.with_repeat_block(block)
            };
            let (candidate_aln, _) = self.alignment_matrix(&temp_haplotype);

            // merged repeat block: reference stays first, the rest ordered by
            // length
            let (new_haplotype, original_indices, candidate_indices) = {
                let haplotype = self.state.haplotype.as_ref().unwrap();
                let repeat = haplotype.repeat();
                let mut merged = RepeatBlock::new(
                    repeat.start(),
                    repeat.alternate(0).to_vec(),
                    repeat.period(),
                    repeat.stutter().clone(),
                );
                let mut rest: Vec<Vec<u8>> = repeat
                    .alternates()
                    .skip(1)
                    .map(|seq| seq.to_vec())
                    .chain(candidates.iter().cloned())
                    .collect();
                rest.sort_by_key(|seq| seq.len());
                for seq in rest {
                    merged.add_alternate(seq);
                }

                // old index -> merged index, from first principles via lookup
                // on the merged block
                let original_indices: Vec<usize> = repeat
                    .alternates()
                    .map(|seq| {
                        merged
                            .index_of(seq)
                            .expect("bug: existing allele missing from merged repeat block")
                    })
                    .collect();
                let candidate_indices: Vec<usize> = candidates
                    .iter()
                    .map(|seq| {
                        merged
                            .index_of(seq)
                            .expect("bug: candidate allele missing from merged repeat block")
                    })
                    .collect();
                (
                    haplotype.with_repeat_block(merged),
                    original_indices,
                    candidate_indices,
                )
            };

            // combine likelihood columns into their merged positions
            let old_aln = self.state.aln.take().unwrap();
            let num_reads = self.state.reads.len();
            let total_alleles = original_indices.len() + candidate_indices.len();
            let mut merged_aln =
                Array2::from_elem((num_reads, total_alleles), LogProb::ln_one());
            for r in 0..num_reads {
                for (j, &new_j) in original_indices.iter().enumerate() {
                    merged_aln[[r, new_j]] = old_aln[[r, j]];
                }
                for (j, &new_j) in candidate_indices.iter().enumerate() {
                    merged_aln[[r, new_j]] = candidate_aln[[r, j]];
                }
            }

            let mapping: Vec<Option<usize>> =
                original_indices.iter().map(|&index| Some(index)).collect();
            reindex_trace_cache(&mut self.state.trace_cache, &mapping);

            self.state.haplotype = Some(new_haplotype);
            self.state.aln = Some(merged_aln);
            self.update_posteriors(None);
        }
    }

    /// Alleles without a MAP call in any eligible sample (the reference is
    /// always retained).
    fn uncalled_alleles(&self) -> Vec<usize> {
        let num_samples = self.num_samples();
        let mut aligned = vec![false; num_samples];
        for (r, seed) in self.state.seeds.iter().enumerate() {
            if seed.is_aligned() {
                aligned[self.state.reads.sample_label[r]] = true;
            }
        }
        let genotypes =
            posteriors::optimal_genotypes(self.state.posteriors.as_ref().unwrap());
        let num_alleles = self.state.haplotype.as_ref().unwrap().num_combinations();
        let mut called = vec![false; num_alleles];
        for (s, &(gt_a, gt_b)) in genotypes.iter().enumerate() {
            if (!self.require_one_read || aligned[s]) && self.state.call_sample[s] {
                called[gt_a] = true;
                called[gt_b] = true;
            }
        }
        (1..num_alleles).filter(|&allele| !called[allele]).collect()
    }

    /// Remove alleles no sample was called with, compacting the alignment
    /// matrix and the trace cache in the same step, then recompute the
    /// posteriors.
    pub(crate) fn prune_uncalled_alleles(&mut self) {
        let uncalled = self.uncalled_alleles();
        if uncalled.is_empty() {
            return;
        }
        info!(
            "Recomputing sample posteriors after removing {} uncalled alleles",
            uncalled.len()
        );

        let (new_haplotype, mapping) = {
            let haplotype = self.state.haplotype.as_ref().unwrap();
            let (block, mapping) = haplotype.repeat().remove_alleles(&uncalled);
            (haplotype.with_repeat_block(block), mapping)
        };

        let old_aln = self.state.aln.take().unwrap();
        let num_reads = self.state.reads.len();
        let survivors: Vec<usize> = mapping
            .iter()
            .enumerate()
            .filter_map(|(old, new)| new.map(|_| old))
            .collect();
        let mut compact_aln =
            Array2::from_elem((num_reads, survivors.len()), LogProb::ln_one());
        for r in 0..num_reads {
            for (new_j, &old_j) in survivors.iter().enumerate() {
                compact_aln[[r, new_j]] = old_aln[[r, old_j]];
            }
        }

        reindex_trace_cache(&mut self.state.trace_cache, &mapping);
        self.state.haplotype = Some(new_haplotype);
        self.state.aln = Some(compact_aln);
        self.update_posteriors(None);

        assert_eq!(
            self.state.haplotype.as_ref().unwrap().num_combinations(),
            self.state.aln.as_ref().unwrap().dim().1,
            "bug: allele count mismatch after pruning"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The two reindex directions share one invariant: every surviving entry
    /// must land at the index its sequence has in the rebuilt block.
    #[test]
    fn trace_cache_reindex_roundtrip() {
        use crate::align::trace::TraceCache;
        use crate::stutter::StutterModel;

        let stutter =
            StutterModel::new(0.9, 0.05, 0.1, 0.9, 0.01, 0.01, 2, 4, -4).unwrap();
        let mut block = RepeatBlock::new(100, b"ACACACAC".to_vec(), 2, stutter);
        block.add_alternate(b"ACACAC".to_vec());
        block.add_alternate(b"ACACACACAC".to_vec());

        let trace = |allele: usize| Trace {
            allele,
            stutter_size: 0,
            repeat_seq: block.alternate(allele).to_vec(),
            start: 90,
            stop: 120,
            flank_ins: 0,
            flank_del: 0,
            flank_indels: Vec::new(),
        };
        let mut cache = TraceCache::default();
        for allele in 0..3 {
            cache.insert((0, allele), trace(allele));
        }

        // discovery direction: merge two candidates, mapping derived by
        // index_of on the merged block
        let mut merged = RepeatBlock::new(
            100,
            block.alternate(0).to_vec(),
            2,
            block.stutter().clone(),
        );
        let mut rest: Vec<Vec<u8>> = block
            .alternates()
            .skip(1)
            .map(|seq| seq.to_vec())
            .chain(vec![b"ACAC".to_vec(), b"ACACACACACAC".to_vec()])
            .collect();
        rest.sort_by_key(|seq| seq.len());
        for seq in rest {
            merged.add_alternate(seq);
        }
        let mapping: Vec<Option<usize>> = block
            .alternates()
            .map(|seq| merged.index_of(seq))
            .collect();
        let mut merged_cache = cache.clone();
        reindex_trace_cache(&mut merged_cache, &mapping);
        assert_eq!(merged_cache.len(), 3);
        for ((_, allele), trace) in &merged_cache {
            assert_eq!(merged.index_of(&trace.repeat_seq), Some(*allele));
        }

        // pruning direction: drop the middle allele, mapping from survivor
        // compaction
        let (pruned, mapping) = block.remove_alleles(&[1]);
        let mut pruned_cache = cache;
        reindex_trace_cache(&mut pruned_cache, &mapping);
        assert_eq!(pruned_cache.len(), 2);
        for ((_, allele), trace) in &pruned_cache {
            assert_eq!(pruned.index_of(&trace.repeat_seq), Some(*allele));
        }
    }
}
