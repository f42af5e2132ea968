// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::collections::HashMap;

use bio::alignment::pairwise::Aligner;
use bio::alignment::AlignmentOperation;
use itertools::Itertools;

use crate::haplotype::Haplotype;

/// Back-traced optimal alignment of one read against one candidate
/// haplotype: the stutter size applied to the repeat block, the implied
/// repeat sequence, the genomic span of the alignment and any indels placed
/// in the flanks.
#[derive(Debug, Clone)]
pub(crate) struct Trace {
    pub(crate) allele: usize,
    /// Stutter artifact size in base pairs (0 when the read matches the
    /// allele length).
    pub(crate) stutter_size: i64,
    /// Repeat-block sequence implied by the traceback (the stutter-stretched
    /// alternate).
    pub(crate) repeat_seq: Vec<u8>,
    /// Inclusive genomic start of the traced alignment.
    pub(crate) start: i64,
    /// Exclusive genomic end of the traced alignment.
    pub(crate) stop: i64,
    /// Total inserted/deleted base pairs placed in the flanks.
    pub(crate) flank_ins: i64,
    pub(crate) flank_del: i64,
    /// Individual flank indels as (genomic position, signed length).
    pub(crate) flank_indels: Vec<(i64, i64)>,
}

impl Trace {
    /// Whether the traced alignment fully spans the repeat block.
    pub(crate) fn spans_repeat(&self, haplotype: &Haplotype) -> bool {
        self.start < haplotype.repeat().start() && self.stop > haplotype.repeat().end()
    }

    pub(crate) fn has_flank_indel(&self) -> bool {
        self.flank_ins != 0 || self.flank_del != 0
    }
}

/// Cache of tracebacks keyed by (pool index, allele index). Cleared whenever
/// the haplotype or the stutter model changes; reindexed when only allele
/// indices move.
pub(crate) type TraceCache = HashMap<(usize, usize), Trace>;

/// Rewrite cache keys through an old-allele-index -> new-allele-index
/// mapping, discarding traces whose allele was dropped.
pub(crate) fn reindex_trace_cache(cache: &mut TraceCache, mapping: &[Option<usize>]) {
    let entries = cache.drain().collect::<Vec<_>>();
    for ((pool, allele), mut trace) in entries {
        if let Some(new_allele) = mapping[allele] {
            trace.allele = new_allele;
            cache.insert((pool, new_allele), trace);
        }
    }
}

/// Trace the optimal alignment of a read against candidate haplotype
/// `allele` stretched by `delta` base pairs of stutter, using the
/// Needleman-Wunsch primitive.
pub(crate) fn trace_read(
    haplotype: &Haplotype,
    allele: usize,
    delta: i64,
    bases: &[u8],
) -> Trace {
    let repeat_seq = haplotype.repeat().artifact_seq(allele, delta);
    let hap_seq = haplotype.seq(allele, delta);
    let left_len = haplotype.left().len();
    let repeat_len = repeat_seq.len();

    let mut aligner =
        Aligner::with_capacity(bases.len(), hap_seq.len(), -5, -1, |a: u8, b: u8| {
            if a.to_ascii_uppercase() == b.to_ascii_uppercase() {
                1i32
            } else {
                -1i32
            }
        });
    let alignment = aligner.semiglobal(bases, &hap_seq);

    let to_genomic = |y: usize| -> i64 {
        if y < left_len {
            haplotype.left().start() + y as i64
        } else if y < left_len + repeat_len {
            (haplotype.repeat().start() + (y - left_len) as i64).min(haplotype.repeat().end())
        } else {
            haplotype.right().start() + (y - left_len - repeat_len) as i64
        }
    };

    let mut flank_ins = 0i64;
    let mut flank_del = 0i64;
    let mut flank_indels = Vec::new();
    let mut y = alignment.ystart;
    for (op, group) in &alignment.operations.iter().group_by(|op| **op) {
        let len = group.count();
        match op {
            AlignmentOperation::Match | AlignmentOperation::Subst => {
                y += len;
            }
            AlignmentOperation::Ins => {
                // consumes read only; flank insertion unless it falls inside
                // the repeat tract
                if y <= left_len || y >= left_len + repeat_len {
                    flank_ins += len as i64;
                    flank_indels.push((to_genomic(y), len as i64));
                }
            }
            AlignmentOperation::Del => {
                // consumes haplotype only
                if y + len <= left_len || y >= left_len + repeat_len {
                    flank_del += len as i64;
                    flank_indels.push((to_genomic(y), -(len as i64)));
                }
                y += len;
            }
            AlignmentOperation::Xclip(_) | AlignmentOperation::Yclip(_) => (),
        }
    }

    let start = to_genomic(alignment.ystart);
    let stop = if alignment.yend >= left_len + repeat_len {
        haplotype.right().start() + (alignment.yend - left_len - repeat_len) as i64
    } else {
        to_genomic(alignment.yend)
    };

    Trace {
        allele,
        stutter_size: delta,
        repeat_seq,
        start,
        stop,
        flank_ins,
        flank_del,
        flank_indels,
    }
}
