// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Sequence-based STR genotyping: reads aligned around a short tandem
//! repeat are scored against candidate haplotypes under a PCR stutter error
//! model, yielding per-sample diploid (or haploid) genotypes with calibrated
//! posteriors. The candidate allele set is refined in a closed loop from
//! stutter tracebacks, and the stutter model itself can be re-estimated by
//! EM.
//!
//! BAM/CRAM handling, reference fetching, read realignment and VCF text
//! emission live upstream and downstream of this crate; the genotyper
//! consumes realigned reads plus a reference window and produces locus
//! results.

#[macro_use]
extern crate log;
#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate derive_builder;
#[macro_use]
extern crate derive_new;
#[macro_use]
extern crate getset;
#[macro_use]
extern crate serde_derive;
#[cfg(test)]
#[macro_use]
extern crate approx;

pub mod align;
pub mod constants;
pub mod em;
pub mod errors;
pub mod genotyper;
pub mod haplotype;
pub mod locus;
pub mod output;
pub mod reads;
pub mod stutter;
pub mod utils;

pub use crate::em::EmConfig;
pub use crate::genotyper::{AllelePriors, Genotyper, GenotyperBuilder};
pub use crate::locus::Region;
pub use crate::output::{FailureReason, LocusCall, LocusOutcome, SampleCall};
pub use crate::reads::{ReadInput, SampleReads};
pub use crate::stutter::StutterModel;
