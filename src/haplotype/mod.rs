// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

pub mod block;

use anyhow::Result;
use itertools::Itertools;

use crate::constants::MAX_REF_FLANK_LEN;
use crate::errors::Error;
use crate::locus::Region;
use crate::stutter::StutterModel;

pub use block::{FlankBlock, RepeatBlock};

/// Candidate locus haplotype: left flank, repeat block, right flank.
///
/// Only the repeat block carries alternate sequences; substituting alternate
/// `k` (optionally stretched by a stutter artifact) into the middle block
/// yields candidate haplotype `k`. Any change to the alternate list requires
/// a rebuild via `with_repeat_block`; dense arrays indexed by allele must be
/// reindexed in the same step.
#[derive(Clone, Debug)]
pub struct Haplotype {
    left: FlankBlock,
    repeat: RepeatBlock,
    right: FlankBlock,
}

impl Haplotype {
    /// Build the three-block haplotype for a locus from the reference
    /// chromosome sequence and externally discovered repeat alternates.
    /// Alternate 0 is always the reference repeat; the remaining alternates
    /// are deduplicated and ordered by length.
    pub fn generate(
        region: &Region,
        chrom_seq: &[u8],
        alternates: &[Vec<u8>],
        stutter: StutterModel,
    ) -> Result<Self> {
        let left_start = region.start() - MAX_REF_FLANK_LEN;
        let right_end = region.stop() + 1 + MAX_REF_FLANK_LEN;
        if left_start < 0 || right_end as usize > chrom_seq.len() {
            return Err(Error::ReferenceWindowTooSmall {
                chrom: region.chrom().clone(),
                start: region.start(),
                stop: region.stop(),
                needed: MAX_REF_FLANK_LEN,
            }
            .into());
        }

        let ref_repeat = chrom_seq[region.start() as usize..=region.stop() as usize]
            .to_ascii_uppercase();
        let mut repeat = RepeatBlock::new(
            region.start(),
            ref_repeat.clone(),
            region.period(),
            stutter,
        );
        for seq in alternates
            .iter()
            .map(|seq| seq.to_ascii_uppercase())
            .filter(|seq| !seq.is_empty() && *seq != ref_repeat)
            .unique()
            .sorted_by_key(|seq| seq.len())
        {
            repeat.add_alternate(seq);
        }

        let left = FlankBlock::new(
            left_start,
            chrom_seq[left_start as usize..region.start() as usize].to_ascii_uppercase(),
        );
        let right = FlankBlock::new(
            region.stop() + 1,
            chrom_seq[(region.stop() + 1) as usize..right_end as usize].to_ascii_uppercase(),
        );
        Ok(Haplotype {
            left,
            repeat,
            right,
        })
    }

    /// Rebuild with a replacement repeat block (allele set or stutter model
    /// changed). Consumers holding allele-indexed state must reindex.
    pub fn with_repeat_block(&self, repeat: RepeatBlock) -> Self {
        assert!(
            repeat.num_alternates() >= 1,
            "bug: repeat block without alternates"
        );
        Haplotype {
            left: self.left.clone(),
            repeat,
            right: self.right.clone(),
        }
    }

    /// Number of candidate haplotypes: the product of per-block alternate
    /// counts. The flanks contribute a factor of one each, so this equals
    /// the repeat block's alternate count.
    pub fn num_combinations(&self) -> usize {
        self.repeat.num_alternates()
    }

    pub fn left(&self) -> &FlankBlock {
        &self.left
    }

    pub fn repeat(&self) -> &RepeatBlock {
        &self.repeat
    }

    pub fn repeat_mut(&mut self) -> &mut RepeatBlock {
        &mut self.repeat
    }

    pub fn right(&self) -> &FlankBlock {
        &self.right
    }

    /// Full sequence of candidate haplotype `allele` with a stutter artifact
    /// of `delta` base pairs applied to the repeat block.
    pub fn seq(&self, allele: usize, delta: i64) -> Vec<u8> {
        let mut seq =
            Vec::with_capacity(self.left.len() + self.repeat.max_len() + self.right.len());
        seq.extend_from_slice(self.left.seq());
        seq.extend(self.repeat.artifact_seq(allele, delta));
        seq.extend_from_slice(self.right.seq());
        seq
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stutter() -> StutterModel {
        StutterModel::new(0.9, 0.05, 0.1, 0.9, 0.01, 0.01, 2, 4, -4).unwrap()
    }

    fn chrom_seq() -> Vec<u8> {
        // 40 bp left context, 8 bp AC repeat, 40 bp right context
        let mut seq = b"TTGACGGATCTTAAGCTGACGGATCTTAAGCTAGCTGATC".to_vec();
        seq.extend_from_slice(b"ACACACAC");
        seq.extend_from_slice(b"GGTTAGCCATTGCAAGTCCGGTTAGCCATTGCAAGTCCGG");
        seq
    }

    #[test]
    fn test_generate() {
        let region = Region::new("chr1", 40, 47, 2, None).unwrap();
        let hap = Haplotype::generate(
            &region,
            &chrom_seq(),
            &[b"ACACACACACAC".to_vec(), b"ACACAC".to_vec(), b"acacacac".to_vec()],
            stutter(),
        )
        .unwrap();
        assert_eq!(hap.num_combinations(), 3);
        assert_eq!(hap.repeat().alternate(0), b"ACACACAC");
        assert_eq!(hap.repeat().alternate(1), b"ACACAC");
        assert_eq!(hap.repeat().alternate(2), b"ACACACACACAC");
        assert_eq!(hap.left().len(), 30);
        assert_eq!(hap.right().len(), 30);
        assert_eq!(hap.left().end(), 40);
        assert_eq!(hap.right().start(), 48);
        assert_eq!(hap.seq(0, 0).len(), 68);
        assert_eq!(hap.seq(1, 2).len(), 68);
    }

    #[test]
    fn test_insufficient_flank() {
        let region = Region::new("chr1", 10, 17, 2, None).unwrap();
        assert!(Haplotype::generate(&region, &chrom_seq(), &[], stutter()).is_err());
    }
}
