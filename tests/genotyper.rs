// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use approx::assert_relative_eq;
use bio::stats::{LogProb, Prob};
use crossbeam::channel::{unbounded, Receiver, Sender};
use rust_htslib::bam::record::{Cigar, CigarString};

use satyper::utils::worker_pool::{worker_pool, Orderable};
use satyper::{
    FailureReason, Genotyper, GenotyperBuilder, LocusOutcome, ReadInput, Region, SampleReads,
    StutterModel,
};

const LEFT: &[u8] = b"CGTAGTAACGGATCAGCTTGACGAATTCGGCCTAGATTGC";
const RIGHT: &[u8] = b"GGATTCAACGTTGCAGGTCCAGTATGGACGTCAATTCGGA";
const REF_REPEAT: &[u8] = b"ACACACAC";
const FLANK: usize = 12;

fn chrom_seq() -> Vec<u8> {
    let mut seq = LEFT.to_vec();
    seq.extend_from_slice(REF_REPEAT);
    seq.extend_from_slice(RIGHT);
    seq
}

fn region() -> Region {
    Region::new("chr1", 40, 47, 2, None).unwrap()
}

fn stutter_model() -> StutterModel {
    StutterModel::new(0.9, 0.1, 0.1, 0.9, 0.01, 0.01, 2, 6, -6).unwrap()
}

fn log_half() -> LogProb {
    LogProb::from(Prob(0.5))
}

/// A noise-free read covering `FLANK` bases on each side of the repeat,
/// carrying the given repeat alternate.
fn read_for(alt: &[u8]) -> ReadInput {
    let mut bases = LEFT[LEFT.len() - FLANK..].to_vec();
    bases.extend_from_slice(alt);
    bases.extend_from_slice(&RIGHT[..FLANK]);
    let quals = vec![30u8; bases.len()];
    let start = (LEFT.len() - FLANK) as i64;
    let diff = alt.len() as i64 - REF_REPEAT.len() as i64;
    let cigar = if diff == 0 {
        CigarString(vec![Cigar::Match(bases.len() as u32)])
    } else if diff > 0 {
        CigarString(vec![
            Cigar::Match((FLANK + REF_REPEAT.len()) as u32),
            Cigar::Ins(diff as u32),
            Cigar::Match(FLANK as u32),
        ])
    } else {
        CigarString(vec![
            Cigar::Match((FLANK + alt.len()) as u32),
            Cigar::Del((-diff) as u32),
            Cigar::Match(FLANK as u32),
        ])
    };
    ReadInput::new(bases, quals, cigar, start, log_half(), log_half(), true)
}

fn sample(name: &str, reads: Vec<ReadInput>) -> SampleReads {
    SampleReads::new(name.to_owned(), reads)
}

fn builder() -> GenotyperBuilder {
    GenotyperBuilder::default()
        .region(region())
        .chrom_seq(chrom_seq())
        .stutter_model(stutter_model())
}

#[test]
fn homozygous_call_with_pruning() {
    // three candidate alleles, forty noise-free reads supporting the 10 bp one
    let reads: Vec<ReadInput> = (0..40).map(|_| read_for(b"ACACACACAC")).collect();
    let outcome = builder()
        .samples(vec![sample("s1", reads)])
        .candidate_repeat_seqs(vec![
            b"ACACACACAC".to_vec(),
            b"ACACACACACAC".to_vec(),
        ])
        .build()
        .unwrap()
        .genotype()
        .unwrap();

    let call = outcome.call().expect("locus should be called");
    assert_eq!(call.ref_allele, "ACACACAC");
    // the uncalled 12 bp allele is pruned, the called one survives
    assert_eq!(call.alt_alleles, vec!["ACACACACAC".to_owned()]);
    assert_eq!(call.allele_bp_diffs, vec![0, 2]);
    assert_eq!(call.allele_counts, vec![0, 2]);
    assert_eq!(call.pos, 41);
    assert_eq!(call.depth, 40);

    let sample_call = call.samples[0].as_ref().expect("sample should be called");
    assert_eq!(sample_call.genotype, (1, 1));
    assert_eq!(sample_call.bp_diffs, (2, 2));
    assert!(sample_call.posterior_phased >= 0.99);
    assert_relative_eq!(sample_call.phase_prob, 1.0);
    assert_relative_eq!(sample_call.bp_dosage, 4.0, epsilon = 0.05);
    assert!(sample_call.gl_diff >= 10.0);
    assert_eq!(sample_call.depth, 40);
    assert_eq!(sample_call.stutter_reads, 0);
    assert_eq!(sample_call.flank_indel_reads, 0);
    assert!(sample_call.mallreads.iter().all(|&diff| diff == 2));
    assert!(sample_call.allreads.iter().all(|&diff| diff == 2));
}

#[test]
fn heterozygous_call_has_ambiguous_phase() {
    let mut reads = Vec::new();
    for _ in 0..10 {
        reads.push(read_for(REF_REPEAT));
    }
    for _ in 0..10 {
        reads.push(read_for(b"ACACACACAC"));
    }
    let outcome = builder()
        .samples(vec![sample("s1", reads)])
        .candidate_repeat_seqs(vec![b"ACACACACAC".to_vec()])
        .build()
        .unwrap()
        .genotype()
        .unwrap();

    let call = outcome.call().unwrap();
    let sample_call = call.samples[0].as_ref().unwrap();
    let (gt_a, gt_b) = sample_call.genotype;
    assert!((gt_a, gt_b) == (0, 1) || (gt_a, gt_b) == (1, 0));
    assert!(sample_call.posterior_unphased >= 0.95);
    assert_relative_eq!(sample_call.phase_prob, 0.5, epsilon = 1e-6);
    assert_eq!(call.allele_counts, vec![1, 1]);
}

#[test]
fn stutter_discovery_adds_allele() {
    // start from the reference allele only; a third of the reads carry an
    // extra motif copy that is only reachable through stutter tracebacks
    let mut reads = Vec::new();
    for _ in 0..10 {
        reads.push(read_for(REF_REPEAT));
    }
    for _ in 0..6 {
        reads.push(read_for(b"ACACACACAC"));
    }
    let outcome = builder()
        .samples(vec![sample("s1", reads)])
        .build()
        .unwrap()
        .genotype()
        .unwrap();

    let call = outcome.call().unwrap();
    // one refinement iteration discovered the 10 bp allele
    assert_eq!(call.alt_alleles, vec!["ACACACACAC".to_owned()]);
    assert_eq!(call.allele_bp_diffs, vec![0, 2]);
    let sample_call = call.samples[0].as_ref().unwrap();
    let (gt_a, gt_b) = sample_call.genotype;
    assert!((gt_a, gt_b) == (0, 1) || (gt_a, gt_b) == (1, 0));
    // after refinement the stutter reads align to the new allele directly
    assert_eq!(sample_call.stutter_reads, 0);
}

#[test]
fn bootstrap_quality_certain_call() {
    let reads: Vec<ReadInput> = (0..20).map(|_| read_for(b"ACACACACAC")).collect();
    let outcome = builder()
        .samples(vec![sample("s1", reads)])
        .candidate_repeat_seqs(vec![b"ACACACACAC".to_vec()])
        .output_bootstrap_quality(true)
        .bootstrap_iterations(100)
        .build()
        .unwrap()
        .genotype()
        .unwrap();

    let call = outcome.call().unwrap();
    let sample_call = call.samples[0].as_ref().unwrap();
    assert_eq!(sample_call.bootstrap_quality, Some(1.0));
}

#[test]
fn em_retrain_updates_stutter_parameters() {
    let reads: Vec<ReadInput> = (0..20).map(|_| read_for(b"ACACACACAC")).collect();
    let outcome = builder()
        .samples(vec![sample("s1", reads)])
        .candidate_repeat_seqs(vec![b"ACACACACAC".to_vec()])
        .retrain_stutter(true)
        .build()
        .unwrap()
        .genotype()
        .unwrap();

    let call = outcome.call().unwrap();
    // noise-free reads drive the artifact mass far below the initial 0.1
    assert!(call.stutter_params[1] < 0.01);
    assert!(call.stutter_params[2] < 0.01);
    let sample_call = call.samples[0].as_ref().unwrap();
    assert_eq!(sample_call.genotype, (1, 1));
}

#[test]
fn haploid_mode_calls_homozygous() {
    let reads: Vec<ReadInput> = (0..20).map(|_| read_for(b"ACACACACAC")).collect();
    let outcome = builder()
        .samples(vec![sample("s1", reads)])
        .candidate_repeat_seqs(vec![b"ACACACACAC".to_vec()])
        .haploid(true)
        .build()
        .unwrap()
        .genotype()
        .unwrap();

    let call = outcome.call().unwrap();
    let sample_call = call.samples[0].as_ref().unwrap();
    assert_eq!(sample_call.genotype.0, sample_call.genotype.1);
    // haploid dosage counts one allele copy
    assert_relative_eq!(sample_call.bp_dosage, 2.0, epsilon = 0.05);
    assert_eq!(call.allele_counts, vec![0, 1]);
}

#[test]
fn sample_without_reads_is_missing() {
    let reads: Vec<ReadInput> = (0..20).map(|_| read_for(b"ACACACACAC")).collect();
    let outcome = builder()
        .samples(vec![sample("s1", reads), sample("s2", Vec::new())])
        .candidate_repeat_seqs(vec![b"ACACACACAC".to_vec()])
        .build()
        .unwrap()
        .genotype()
        .unwrap();

    let call = outcome.call().unwrap();
    assert!(call.samples[0].is_some());
    assert!(call.samples[1].is_none());
    // only the covered sample contributes allele counts
    assert_eq!(call.allele_counts.iter().sum::<usize>(), 2);
}

#[test]
fn sample_without_reads_gets_prior_when_not_required() {
    let reads: Vec<ReadInput> = (0..20).map(|_| read_for(b"ACACACACAC")).collect();
    let outcome = builder()
        .samples(vec![sample("s1", reads), sample("s2", Vec::new())])
        .candidate_repeat_seqs(vec![b"ACACACACAC".to_vec()])
        .require_one_read(false)
        .build()
        .unwrap()
        .genotype()
        .unwrap();

    let call = outcome.call().unwrap();
    let empty_sample = call.samples[1].as_ref().expect("emitted despite no reads");
    // posterior equals the prior: the homozygous reference cell wins ties
    assert_eq!(empty_sample.genotype, (0, 0));
    assert_eq!(empty_sample.depth, 0);
}

#[test]
fn non_spanning_reads_fail_the_locus() {
    // reads stopping right at the repeat boundary
    let mut read = read_for(REF_REPEAT);
    read.bases.truncate(FLANK + REF_REPEAT.len());
    read.quals.truncate(FLANK + REF_REPEAT.len());
    read.cigar = CigarString(vec![Cigar::Match((FLANK + REF_REPEAT.len()) as u32)]);
    let outcome = builder()
        .samples(vec![sample("s1", vec![read])])
        .build()
        .unwrap()
        .genotype()
        .unwrap();
    assert_eq!(outcome.failure(), Some(FailureReason::NoSpanningReads));
}

#[test]
fn short_repeat_alternate_fails_the_locus() {
    let reads: Vec<ReadInput> = (0..20).map(|_| read_for(REF_REPEAT)).collect();
    let outcome = builder()
        .samples(vec![sample("s1", reads)])
        .candidate_repeat_seqs(vec![b"ACAC".to_vec()])
        .build()
        .unwrap()
        .genotype()
        .unwrap();
    assert_eq!(outcome.failure(), Some(FailureReason::RepeatBlockTooShort));
}

#[test]
fn abort_signal_cancels_the_locus() {
    let abort = Arc::new(AtomicBool::new(false));
    abort.store(true, Ordering::Relaxed);
    let reads: Vec<ReadInput> = (0..20).map(|_| read_for(REF_REPEAT)).collect();
    let outcome = builder()
        .samples(vec![sample("s1", reads)])
        .abort(Some(abort))
        .build()
        .unwrap()
        .genotype()
        .unwrap();
    assert_eq!(outcome.failure(), Some(FailureReason::Cancelled));
}

#[test]
fn emitted_record_roundtrips_through_serde() {
    let reads: Vec<ReadInput> = (0..20).map(|_| read_for(b"ACACACACAC")).collect();
    let outcome = builder()
        .samples(vec![sample("s1", reads)])
        .candidate_repeat_seqs(vec![b"ACACACACAC".to_vec()])
        .build()
        .unwrap()
        .genotype()
        .unwrap();

    let json = serde_json::to_string(&outcome).unwrap();
    let reparsed: LocusOutcome = serde_json::from_str(&json).unwrap();
    let call = outcome.call().unwrap();
    let reparsed_call = reparsed.call().unwrap();
    let original = call.samples[0].as_ref().unwrap();
    let recovered = reparsed_call.samples[0].as_ref().unwrap();
    assert_eq!(original.genotype, recovered.genotype);
    assert_eq!(original.bp_diffs, recovered.bp_diffs);
    assert_relative_eq!(
        original.posterior_phased,
        recovered.posterior_phased,
        epsilon = 1e-6
    );
}

#[derive(Debug)]
struct LocusItem {
    index: usize,
    outcome: LocusOutcome,
}

impl Orderable for LocusItem {
    fn index(&self) -> usize {
        self.index
    }
}

#[test]
fn loci_parallelize_through_the_worker_pool() {
    let (in_sender, in_receiver) = unbounded();
    // locus 0 and 2 are homozygous alternate, locus 1 is reference
    let alts: Vec<&[u8]> = vec![b"ACACACACAC", b"ACACACAC", b"ACACACACAC"];
    for (index, alt) in alts.iter().enumerate() {
        in_sender.send((index, alt.to_vec())).unwrap();
    }
    drop(in_sender);

    let mut outcomes = Vec::new();
    let workers = (0..2).map(|_| {
        |in_receiver: Receiver<(usize, Vec<u8>)>,
         out_sender: Sender<LocusItem>|
         -> anyhow::Result<()> {
            for (index, alt) in in_receiver {
                let reads: Vec<ReadInput> = (0..20).map(|_| read_for(&alt)).collect();
                let outcome = builder()
                    .samples(vec![sample("s1", reads)])
                    .candidate_repeat_seqs(vec![b"ACACACACAC".to_vec()])
                    .build()
                    .unwrap()
                    .genotype()?;
                out_sender.send(LocusItem { index, outcome }).unwrap();
            }
            Ok(())
        }
    });
    worker_pool(
        in_receiver,
        workers,
        |item: LocusItem| {
            outcomes.push(item);
            Ok(())
        },
        4,
    )
    .unwrap();

    assert_eq!(outcomes.len(), 3);
    for (i, item) in outcomes.iter().enumerate() {
        assert_eq!(item.index, i);
    }
    let genotype = |item: &LocusItem| item.outcome.call().unwrap().samples[0]
        .as_ref()
        .unwrap()
        .genotype;
    assert_eq!(genotype(&outcomes[0]), (1, 1));
    assert_eq!(genotype(&outcomes[1]), (0, 0));
    assert_eq!(genotype(&outcomes[2]), (1, 1));
}
