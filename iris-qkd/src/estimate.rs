//! Destructive QBER estimation.
//!
//! A third of the sifted key is sacrificed: each sampled position is compared
//! across the two sides and then removed from both, so the disclosed subset
//! can never leak into the final key. The resulting rate is rounded to two
//! decimals and drives the branch into (or around) reconciliation.

use crate::pair::SiftedKeyPair;
use crate::{Error, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Fraction of the sifted key consumed by estimation (one round per 3 bits).
const SAMPLE_DIVISOR: usize = 3;

/// Estimated quantum bit error rate, rounded to two decimals.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Qber(f64);

impl Qber {
    /// Round a raw errors/rounds ratio to two decimals.
    fn from_ratio(errors: usize, rounds: usize) -> Self {
        let raw = errors as f64 / rounds as f64;
        Qber((raw * 100.0).round() / 100.0)
    }

    /// Rate in `[0, 1]`.
    pub fn value(self) -> f64 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0.0
    }

    /// Whether the rate is at or above the given abort threshold.
    pub fn at_or_above(self, threshold: f64) -> bool {
        self.0 >= threshold
    }

    /// Construct from an already-rounded value. Test and bench helper.
    pub fn from_value(value: f64) -> Self {
        Qber(value)
    }
}

/// Sample and consume `len / 3` positions of `pair`, returning the estimated
/// error rate. Fails with [`Error::DegenerateKey`] when fewer than 3 sifted
/// bits are available, since zero sampling rounds would make the estimate
/// meaningless.
pub fn estimate_qber<R: Rng + ?Sized>(pair: &mut SiftedKeyPair, rng: &mut R) -> Result<Qber> {
    let rounds = pair.len() / SAMPLE_DIVISOR;
    if rounds == 0 {
        return Err(Error::DegenerateKey { len: pair.len() });
    }

    let mut errors = 0usize;
    for _ in 0..rounds {
        let index = rng.gen_range(0..pair.len());
        let (s, r) = pair.remove(index)?;
        if s != r {
            errors += 1;
        }
    }

    let qber = Qber::from_ratio(errors, rounds);
    debug!(rounds, errors, qber = qber.value(), remaining = pair.len(), "QBER estimated");
    Ok(qber)
}
