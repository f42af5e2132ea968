// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::fmt;

use anyhow::Result;
use bio::stats::LogProb;

use crate::errors::Error;

/// PCR stutter error model for one locus.
///
/// The probability that an observed repeat tract differs from the true allele
/// by `delta` base pairs decomposes into an in-frame component (`delta` a
/// multiple of the motif period, geometric in the number of motif copies) and
/// an out-of-frame component (geometric in base pairs). Support is bounded by
/// `max_insertion`/`max_deletion`.
#[derive(Clone, Debug, PartialEq)]
pub struct StutterModel {
    in_geom: f64,
    in_up: f64,
    in_down: f64,
    out_geom: f64,
    out_up: f64,
    out_down: f64,
    period: usize,
    max_insertion: i64,
    max_deletion: i64,
    log_equal: f64,
}

impl StutterModel {
    pub fn new(
        in_geom: f64,
        in_up: f64,
        in_down: f64,
        out_geom: f64,
        out_up: f64,
        out_down: f64,
        period: usize,
        max_insertion: i64,
        max_deletion: i64,
    ) -> Result<Self> {
        for (name, value) in &[
            ("in_geom", in_geom),
            ("in_up", in_up),
            ("in_down", in_down),
            ("out_geom", out_geom),
            ("out_up", out_up),
            ("out_down", out_down),
        ] {
            if !(*value > 0.0 && *value < 1.0) {
                return Err(Error::InvalidStutterParameter { name, value: *value }.into());
            }
        }
        if in_up + in_down >= 1.0 {
            return Err(Error::InvalidStutterMass {
                frame: "in",
                up: in_up,
                down: in_down,
            }
            .into());
        }
        if out_up + out_down >= 1.0 {
            return Err(Error::InvalidStutterMass {
                frame: "out",
                up: out_up,
                down: out_down,
            }
            .into());
        }
        if max_insertion < 0 || max_deletion > 0 {
            return Err(Error::InvalidStutterSupport {
                max_insertion,
                max_deletion,
            }
            .into());
        }
        Ok(StutterModel {
            in_geom,
            in_up,
            in_down,
            out_geom,
            out_up,
            out_down,
            period,
            max_insertion,
            max_deletion,
            log_equal: (1.0 - in_up - in_down).ln(),
        })
    }

    /// Probability that PCR turns a true repeat tract of `true_allele_bp`
    /// bases into one observed `delta_bp` bases longer (shorter for negative
    /// `delta_bp`).
    pub fn log_prob_artifact(&self, true_allele_bp: usize, delta_bp: i64) -> LogProb {
        if delta_bp < self.max_deletion || delta_bp > self.max_insertion {
            return LogProb::ln_zero();
        }
        if delta_bp + true_allele_bp as i64 < 0 {
            return LogProb::ln_zero();
        }
        if delta_bp == 0 {
            return LogProb(self.log_equal);
        }
        let steps = delta_bp.unsigned_abs();
        if steps % self.period as u64 == 0 {
            // in-frame: geometric in motif copies
            let dir = if delta_bp > 0 { self.in_up } else { self.in_down };
            let copies = steps / self.period as u64;
            LogProb(
                dir.ln()
                    + (copies - 1) as f64 * (1.0 - self.in_geom).ln()
                    + self.in_geom.ln(),
            )
        } else {
            // out-of-frame: geometric in base pairs
            let dir = if delta_bp > 0 { self.out_up } else { self.out_down };
            LogProb(
                dir.ln()
                    + (steps - 1) as f64 * (1.0 - self.out_geom).ln()
                    + self.out_geom.ln(),
            )
        }
    }

    /// All artifact sizes with non-zero support.
    pub fn support(&self) -> impl Iterator<Item = i64> {
        self.max_deletion..=self.max_insertion
    }

    pub fn period(&self) -> usize {
        self.period
    }

    pub fn max_insertion(&self) -> i64 {
        self.max_insertion
    }

    /// Largest supported deletion, as a non-positive base pair count.
    pub fn max_deletion(&self) -> i64 {
        self.max_deletion
    }

    pub fn in_geom(&self) -> f64 {
        self.in_geom
    }

    pub fn in_up(&self) -> f64 {
        self.in_up
    }

    pub fn in_down(&self) -> f64 {
        self.in_down
    }

    pub fn out_geom(&self) -> f64 {
        self.out_geom
    }

    pub fn out_up(&self) -> f64 {
        self.out_up
    }

    pub fn out_down(&self) -> f64 {
        self.out_down
    }
}

impl fmt::Display for StutterModel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "IN=({:.4}, {:.4}, {:.4}) OUT=({:.4}, {:.4}, {:.4}) P={}",
            self.in_geom, self.in_up, self.in_down, self.out_geom, self.out_up, self.out_down,
            self.period
        )
    }
}
