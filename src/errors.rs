// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum Error {
    #[error("invalid repeat period {period}: must be between 1 and 9")]
    InvalidPeriod { period: usize },
    #[error("invalid locus {chrom}:{start}-{stop}: stop must not precede start")]
    InvalidRegion {
        chrom: String,
        start: i64,
        stop: i64,
    },
    #[error(
        "reference sequence too short for locus {chrom}:{start}-{stop}: \
         need at least {needed} bp of flank on each side"
    )]
    ReferenceWindowTooSmall {
        chrom: String,
        start: i64,
        stop: i64,
        needed: i64,
    },
    #[error("invalid stutter parameter {name}={value}: must lie strictly within (0, 1)")]
    InvalidStutterParameter { name: &'static str, value: f64 },
    #[error(
        "invalid stutter parameters: {up} + {down} must stay below 1 for the {frame} frame"
    )]
    InvalidStutterMass {
        frame: &'static str,
        up: f64,
        down: f64,
    },
    #[error("invalid stutter support: max_insertion={max_insertion} must be >= 0 and max_deletion={max_deletion} must be <= 0")]
    InvalidStutterSupport {
        max_insertion: i64,
        max_deletion: i64,
    },
    #[error("sample {sample}: read {read} has {quals} quality values for {bases} bases")]
    QualityLengthMismatch {
        sample: String,
        read: usize,
        bases: usize,
        quals: usize,
    },
    #[error("allele prior tensor has shape {given:?} but {alleles} alleles and {samples} samples were supplied")]
    AllelePriorShapeMismatch {
        given: Vec<usize>,
        alleles: usize,
        samples: usize,
    },
    #[error("allele priors flag {flags} samples but {samples} samples were supplied")]
    AllelePriorSampleMismatch { flags: usize, samples: usize },
    #[error("no reads were supplied for any sample")]
    NoReads,
}
