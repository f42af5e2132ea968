// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::collections::HashMap;

use bio::stats::LogProb;
use rust_htslib::bam::record::{Cigar, CigarString};

/// One read realigned against the reference, as delivered by the upstream
/// BAM processing collaborator.
#[derive(new, Debug, Clone)]
pub struct ReadInput {
    /// Realigned read sequence (uppercased on ingestion).
    pub bases: Vec<u8>,
    /// Per-base qualities (raw phred, not ASCII-offset).
    pub quals: Vec<u8>,
    /// CIGAR of the realignment against the reference.
    pub cigar: CigarString,
    /// Reference position of the first aligned base.
    pub start: i64,
    /// Log prior that the read stems from allele one of its sample, derived
    /// from nearby heterozygous SNPs (log(1/2) without SNP information).
    pub log_p1: LogProb,
    /// Log prior that the read stems from allele two of its sample.
    pub log_p2: LogProb,
    /// Whether the upstream filters consider this read usable for haplotype
    /// discovery.
    pub use_for_discovery: bool,
}

#[derive(new, Debug, Clone)]
pub struct SampleReads {
    pub name: String,
    pub reads: Vec<ReadInput>,
}

/// Flattened per-read state for one locus, indexed in parallel.
#[derive(Debug, Default)]
pub(crate) struct LocusReads {
    pub(crate) bases: Vec<Vec<u8>>,
    pub(crate) quals: Vec<Vec<u8>>,
    pub(crate) log_p1: Vec<LogProb>,
    pub(crate) log_p2: Vec<LogProb>,
    pub(crate) sample_label: Vec<usize>,
    pub(crate) pool_index: Vec<usize>,
    /// Net repeat-length difference from the realignment CIGAR, `None` when
    /// the read does not span the repeat window.
    pub(crate) bp_diff: Vec<Option<i64>>,
}

impl LocusReads {
    pub(crate) fn len(&self) -> usize {
        self.bases.len()
    }
}

/// Number of reference bases consumed by a CIGAR.
pub(crate) fn cigar_ref_len(cigar: &CigarString) -> i64 {
    cigar
        .iter()
        .map(|op| match op {
            Cigar::Match(l) | Cigar::Equal(l) | Cigar::Diff(l) | Cigar::Del(l)
            | Cigar::RefSkip(l) => *l as i64,
            _ => 0,
        })
        .sum()
}

/// Number of read bases consumed by a CIGAR.
pub(crate) fn cigar_query_len(cigar: &CigarString) -> usize {
    cigar
        .iter()
        .map(|op| match op {
            Cigar::Match(l) | Cigar::Equal(l) | Cigar::Diff(l) | Cigar::Ins(l)
            | Cigar::SoftClip(l) => *l as usize,
            _ => 0,
        })
        .sum()
}

/// Net base pair difference (insertions minus deletions) of a realignment
/// within the inclusive window `[window_start, window_stop]`. Returns `None`
/// unless the realignment fully spans the window.
pub(crate) fn bp_diff_in_window(
    cigar: &CigarString,
    start: i64,
    window_start: i64,
    window_stop: i64,
) -> Option<i64> {
    let stop = start + cigar_ref_len(cigar);
    if start > window_start || stop <= window_stop {
        return None;
    }
    let mut ref_pos = start;
    let mut diff = 0i64;
    for op in cigar.iter() {
        match op {
            Cigar::Match(l) | Cigar::Equal(l) | Cigar::Diff(l) => {
                ref_pos += *l as i64;
            }
            Cigar::Ins(l) => {
                if ref_pos >= window_start && ref_pos <= window_stop {
                    diff += *l as i64;
                }
            }
            Cigar::Del(l) | Cigar::RefSkip(l) => {
                let del_start = ref_pos.max(window_start);
                let del_stop = (ref_pos + *l as i64 - 1).min(window_stop);
                if let Cigar::Del(_) = op {
                    if del_stop >= del_start {
                        diff -= del_stop - del_start + 1;
                    }
                }
                ref_pos += *l as i64;
            }
            Cigar::SoftClip(_) | Cigar::HardClip(_) | Cigar::Pad(_) => {}
        }
    }
    Some(diff)
}

/// Coalesces reads with identical base sequences so that each distinct
/// sequence is aligned only once. The pooled representative carries the
/// position-wise mean base qualities of its constituents.
#[derive(Debug, Default)]
pub(crate) struct ReadPool {
    by_seq: HashMap<Vec<u8>, usize>,
    seqs: Vec<Vec<u8>>,
    qual_sums: Vec<Vec<u64>>,
    counts: Vec<usize>,
}

impl ReadPool {
    /// Register a read, returning its dense pool id.
    pub(crate) fn add(&mut self, bases: &[u8], quals: &[u8]) -> usize {
        assert_eq!(
            bases.len(),
            quals.len(),
            "bug: quality string length does not match read length"
        );
        if let Some(&pool) = self.by_seq.get(bases) {
            assert_eq!(self.seqs[pool].len(), bases.len());
            for (sum, &qual) in self.qual_sums[pool].iter_mut().zip(quals) {
                *sum += qual as u64;
            }
            self.counts[pool] += 1;
            pool
        } else {
            let pool = self.seqs.len();
            self.by_seq.insert(bases.to_vec(), pool);
            self.seqs.push(bases.to_vec());
            self.qual_sums.push(quals.iter().map(|&q| q as u64).collect());
            self.counts.push(1);
            pool
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.seqs.len()
    }

    pub(crate) fn seq(&self, pool: usize) -> &[u8] {
        &self.seqs[pool]
    }

    /// Position-wise mean base qualities over all constituents of a pool.
    pub(crate) fn mean_quals(&self, pool: usize) -> Vec<u8> {
        let n = self.counts[pool] as u64;
        self.qual_sums[pool]
            .iter()
            .map(|&sum| ((sum as f64 / n as f64).round() as u64).min(u8::MAX as u64) as u8)
            .collect()
    }
}
