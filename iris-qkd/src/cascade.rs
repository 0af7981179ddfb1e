//! Cascade block-parity reconciliation.
//!
//! Pass 1 shuffles the pair jointly, cuts it into blocks of
//! `floor(0.73 / QBER)` bits, and accepts every block whose parities agree.
//! A mismatched parity means an odd number of errors, so each such block is
//! bisected pass by pass, accepting the agreeing half and keeping the
//! disagreeing one, until a single position isolates the error; the sender
//! bit is kept and the receiver bit flipped. The number of mismatched blocks
//! after pass 1 fixes the terminal length in closed form: the loop runs
//! until the accepted key holds `len - error_blocks` bits, then absorbs the
//! isolated corrections to restore the full length.
//!
//! A block whose parities agree can still hide an even number of errors;
//! that residual risk is deliberately left to the confirmation rounds.

use crate::estimate::Qber;
use crate::pair::{parity, SiftedKeyPair};
use crate::{Error, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Numerator of the empirical first-pass block-size rule.
const BLOCK_SIZE_NUMERATOR: f64 = 0.73;

/// Hard cap on bisection passes. The queue halves every pass, so any run
/// that gets here has corrupted bookkeeping.
const MAX_PASSES: u32 = 64;

/// Reconciliation statistics for observability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CascadeReport {
    /// Mismatched-parity blocks detected in pass 1 (equals corrected bits).
    pub error_blocks: usize,
    /// Total passes run, the initial split included.
    pub passes: u32,
}

/// First-pass block size for a given error rate.
pub fn initial_block_size(qber: Qber) -> usize {
    let size = (BLOCK_SIZE_NUMERATOR / qber.value()).floor();
    (size as usize).max(1)
}

/// Run Cascade over `pair`, returning the corrected pair (receiver side
/// altered) and the run statistics. Length is preserved: every block,
/// accepted or corrected, ends up in the output.
pub fn reconcile<R: Rng + ?Sized>(
    pair: SiftedKeyPair,
    qber: Qber,
    rng: &mut R,
) -> Result<(SiftedKeyPair, CascadeReport)> {
    if pair.is_empty() {
        return Err(Error::DegenerateKey { len: 0 });
    }
    if qber.is_zero() {
        // A clean estimate bypasses reconciliation entirely.
        return Ok((pair, CascadeReport::default()));
    }

    let total_len = pair.len();
    let block_size = initial_block_size(qber);

    // Pass 1: joint shuffle, fixed-size split, parity sort.
    let mut shuffled = pair;
    shuffled.shuffle(rng);

    let mut accepted = SiftedKeyPair::empty();
    let mut pending: Vec<SiftedKeyPair> = Vec::new();
    let mut start = 0;
    while start < total_len {
        let end = (start + block_size).min(total_len);
        let block = shuffled.slice(start, end)?;
        let (ps, pr) = block.parities();
        if ps == pr {
            accepted.extend_from(&block);
        } else {
            pending.push(block);
        }
        start = end;
    }

    let error_blocks = pending.len();
    // Each mismatched block isolates exactly one position, so the accepted
    // key is predictably short of the input by the pass-1 error count.
    let predicted_len = total_len - error_blocks;
    debug!(total_len, block_size, error_blocks, "cascade pass 1 complete");

    let mut passes = 1u32;
    while accepted.len() != predicted_len {
        passes += 1;
        if passes > MAX_PASSES {
            return Err(Error::Inconsistency(format!(
                "cascade failed to converge after {MAX_PASSES} passes"
            )));
        }
        for block in pending.iter_mut() {
            if block.len() <= 1 {
                continue;
            }
            block.shuffle(rng);
            // Bisect, biasing the first half longer on odd lengths.
            let half = block.len() - block.len() / 2;
            let first = block.slice(0, half)?;
            let second = block.slice(half, block.len())?;
            let first_mismatch = {
                let (ps, pr) = first.parities();
                ps != pr
            };
            let second_mismatch = {
                let (ps, pr) = second.parities();
                ps != pr
            };
            // The parent holds an odd number of errors, so exactly one half
            // can disagree.
            *block = match (first_mismatch, second_mismatch) {
                (true, false) => {
                    accepted.extend_from(&second);
                    first
                }
                (false, true) => {
                    accepted.extend_from(&first);
                    second
                }
                _ => {
                    return Err(Error::Inconsistency(
                        "parity bookkeeping violated during bisection".into(),
                    ))
                }
            };
        }
        trace!(passes, accepted = accepted.len(), "cascade pass complete");
    }

    // Terminal corrections: each pending block is a single isolated error.
    // The sender bit is authoritative; the receiver bit flips to match.
    for block in &pending {
        let (s, r) = block.get(0)?;
        accepted.push(s, !r);
    }

    if accepted.len() != total_len {
        return Err(Error::Inconsistency(format!(
            "cascade output length {} does not match input length {total_len}",
            accepted.len()
        )));
    }

    debug!(passes, error_blocks, "cascade reconciliation complete");
    Ok((accepted, CascadeReport { error_blocks, passes }))
}
