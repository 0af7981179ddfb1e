//! BICONF confirmation rounds.
//!
//! Cascade can leave an even number of errors hiding inside an accepted
//! block. Eight independent rounds each draw a random subset of the key and
//! compare parities over it; a disagreement is localized by bisecting the
//! subset (the first half takes the extra element on odd lengths) down to a
//! single position, whose receiver bit is flipped in the underlying key so
//! the correction persists for later rounds and the final key.

use crate::estimate::Qber;
use crate::pair::{parity, SiftedKeyPair};
use crate::{Error, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Confirmation rounds per handshake. Fixed by the protocol.
const ROUNDS: u32 = 8;

/// Numerator of the block-size rule, 4 ln 2.
const BLOCK_SIZE_NUMERATOR: f64 = 2.772588722239781;

/// Confirmation statistics for observability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BiconfReport {
    /// Residual errors found and corrected across all rounds.
    pub corrected: usize,
    /// Subset size drawn each round.
    pub block_size: usize,
}

/// Subset size for a given error rate and key length, clamped so a draw
/// without replacement is always possible.
pub fn block_size(qber: Qber, key_len: usize) -> usize {
    let raw = if qber.is_zero() {
        8.min(key_len)
    } else {
        (BLOCK_SIZE_NUMERATOR / (3.0 * qber.value())).floor() as usize
    };
    raw.clamp(1, key_len.max(1))
}

/// Run the confirmation rounds over `pair` in place, returning how many
/// residual errors were corrected.
pub fn confirm<R: Rng + ?Sized>(
    pair: &mut SiftedKeyPair,
    qber: Qber,
    rng: &mut R,
) -> Result<BiconfReport> {
    if pair.is_empty() {
        return Err(Error::DegenerateKey { len: 0 });
    }

    let size = block_size(qber, pair.len());
    let mut corrected = 0usize;

    for round in 1..=ROUNDS {
        let subset: Vec<usize> = rand::seq::index::sample(rng, pair.len(), size).into_vec();
        if subset_parities_disagree(pair, &subset)? {
            let index = isolate_error(pair, subset)?;
            pair.flip_receiver(index)?;
            corrected += 1;
            debug!(round, index, "confirmation round corrected a residual error");
        }
    }

    debug!(corrected, block_size = size, "confirmation rounds complete");
    Ok(BiconfReport { corrected, block_size: size })
}

/// Parity comparison over a subset of positions.
fn subset_parities_disagree(pair: &SiftedKeyPair, subset: &[usize]) -> Result<bool> {
    let mut sender_bits = Vec::with_capacity(subset.len());
    let mut receiver_bits = Vec::with_capacity(subset.len());
    for &i in subset {
        let (s, r) = pair.get(i)?;
        sender_bits.push(s);
        receiver_bits.push(r);
    }
    Ok(parity(&sender_bits) != parity(&receiver_bits))
}

/// Bisect a disagreeing subset down to the single position carrying the
/// parity difference.
fn isolate_error(pair: &SiftedKeyPair, mut subset: Vec<usize>) -> Result<usize> {
    while subset.len() > 1 {
        let half = subset.len() / 2 + subset.len() % 2;
        let second = subset.split_off(half);
        if subset_parities_disagree(pair, &subset)? {
            // keep the first half
        } else if subset_parities_disagree(pair, &second)? {
            subset = second;
        } else {
            return Err(Error::Inconsistency(
                "subset parity disagreement vanished during bisection".into(),
            ));
        }
    }
    subset
        .first()
        .copied()
        .ok_or_else(|| Error::Inconsistency("bisection of an empty subset".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn block_size_rule() {
        assert_eq!(block_size(Qber::from_value(0.13), 100), 7);
        assert_eq!(block_size(Qber::from_value(0.2), 100), 4);
        // Zero rate keys off the key length instead.
        assert_eq!(block_size(Qber::from_value(0.0), 100), 8);
        assert_eq!(block_size(Qber::from_value(0.0), 5), 5);
        // Clamped to the population size.
        assert_eq!(block_size(Qber::from_value(0.01), 20), 20);
    }

    #[test]
    fn clean_pair_needs_no_corrections() {
        let mut rng = ChaCha20Rng::seed_from_u64(41);
        let bits = crate::channel::random_bits(32, &mut rng);
        let mut pair = SiftedKeyPair::new(bits.clone(), bits).unwrap();
        let report = confirm(&mut pair, Qber::from_value(0.0), &mut rng).unwrap();
        assert_eq!(report.corrected, 0);
        assert_eq!(pair.mismatch_count(), 0);
    }

    #[test]
    fn whole_key_subset_always_finds_the_single_error() {
        // With QBER 0 and a short key the subset is the whole key, so every
        // round sees the parity difference and the first round fixes it.
        let mut rng = ChaCha20Rng::seed_from_u64(42);
        let sender = vec![true, false, true, false, true, false];
        let mut receiver = sender.clone();
        receiver[3] = !receiver[3];
        let mut pair = SiftedKeyPair::new(sender, receiver).unwrap();
        let report = confirm(&mut pair, Qber::from_value(0.0), &mut rng).unwrap();
        assert_eq!(report.corrected, 1);
        assert_eq!(pair.mismatch_count(), 0);
        let (ps, pr) = pair.parities();
        assert_eq!(ps, pr);
    }

    #[test]
    fn corrections_persist_across_rounds() {
        // Two injected errors; whichever rounds catch them must leave the
        // underlying key corrected, never re-flip a fixed position.
        for seed in 0..10 {
            let mut rng = ChaCha20Rng::seed_from_u64(seed);
            let sender = crate::channel::random_bits(16, &mut rng);
            let mut receiver = sender.clone();
            receiver[2] = !receiver[2];
            receiver[9] = !receiver[9];
            let mut pair = SiftedKeyPair::new(sender, receiver).unwrap();
            let before = pair.mismatch_count();
            let report = confirm(&mut pair, Qber::from_value(0.0), &mut rng).unwrap();
            // A disagreeing subset always bisects to a genuine mismatch, so
            // every reported correction removes exactly one error.
            assert_eq!(before - pair.mismatch_count(), report.corrected);
        }
    }

    #[test]
    fn empty_pair_is_degenerate() {
        let mut rng = ChaCha20Rng::seed_from_u64(44);
        let mut pair = SiftedKeyPair::empty();
        assert_eq!(
            confirm(&mut pair, Qber::from_value(0.0), &mut rng),
            Err(Error::DegenerateKey { len: 0 })
        );
    }
}
