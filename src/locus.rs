// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use anyhow::Result;

use crate::errors::Error;

/// Descriptor of one STR locus: chromosome, inclusive start and stop of the
/// repeat on the reference, and the motif period.
#[derive(Clone, Debug, PartialEq, Eq, Getters, CopyGetters, Serialize)]
pub struct Region {
    #[getset(get = "pub")]
    chrom: String,
    /// Inclusive start of the repeat on the reference.
    #[getset(get_copy = "pub")]
    start: i64,
    /// Inclusive stop of the repeat on the reference.
    #[getset(get_copy = "pub")]
    stop: i64,
    /// Repeat motif period in base pairs (1-9).
    #[getset(get_copy = "pub")]
    period: usize,
    #[getset(get = "pub")]
    name: Option<String>,
}

impl Region {
    pub fn new(
        chrom: impl Into<String>,
        start: i64,
        stop: i64,
        period: usize,
        name: Option<String>,
    ) -> Result<Self> {
        let chrom = chrom.into();
        if !(1..=9).contains(&period) {
            return Err(Error::InvalidPeriod { period }.into());
        }
        if stop < start || start < 0 {
            return Err(Error::InvalidRegion { chrom, start, stop }.into());
        }
        Ok(Region {
            chrom,
            start,
            stop,
            period,
            name,
        })
    }

    /// Length of the repeat on the reference in base pairs.
    pub fn len(&self) -> usize {
        (self.stop - self.start + 1) as usize
    }

    /// Window in which read indels count towards the repeat length
    /// difference: the repeat padded by one period on each side.
    pub(crate) fn indel_window(&self) -> (i64, i64) {
        (self.start - self.period as i64, self.stop + self.period as i64)
    }
}
