//! Basis sifting: keep only the rounds where both parties measured in the
//! same basis. Deterministic, order preserving, and allowed to come back
//! empty; what to do about an empty result is upstream policy.

use crate::channel::Basis;
use crate::pair::SiftedKeyPair;
use crate::{Error, Result};

/// Filter both bit sequences down to the positions with equal bases.
pub fn sift(
    sender_bases: &[Basis],
    receiver_bases: &[Basis],
    sender_bits: &[bool],
    receiver_bits: &[bool],
) -> Result<SiftedKeyPair> {
    let n = sender_bases.len();
    if receiver_bases.len() != n || sender_bits.len() != n || receiver_bits.len() != n {
        return Err(Error::Inconsistency(format!(
            "sequence lengths differ: bases {}/{} bits {}/{}",
            n,
            receiver_bases.len(),
            sender_bits.len(),
            receiver_bits.len()
        )));
    }

    let mut pair = SiftedKeyPair::empty();
    for i in 0..n {
        if sender_bases[i] == receiver_bases[i] {
            pair.push(sender_bits[i], receiver_bits[i]);
        }
    }
    Ok(pair)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{random_bases, random_bits};
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn keeps_only_matching_positions() {
        use Basis::{Diagonal as D, Rectilinear as R};
        let pair = sift(
            &[R, R, D, D],
            &[R, D, D, R],
            &[true, false, true, false],
            &[true, true, false, false],
        )
        .unwrap();
        // Positions 0 and 2 match.
        assert_eq!(pair.sender(), &[true, true]);
        assert_eq!(pair.receiver(), &[true, false]);
    }

    #[test]
    fn empty_result_is_valid() {
        use Basis::{Diagonal as D, Rectilinear as R};
        let pair = sift(&[R, D], &[D, R], &[true, true], &[false, false]).unwrap();
        assert!(pair.is_empty());
    }

    #[test]
    fn sifted_length_is_about_half_for_random_bases() {
        let mut rng = ChaCha20Rng::seed_from_u64(11);
        let n = 4096;
        let sb = random_bases(n, &mut rng);
        let rb = random_bases(n, &mut rng);
        let bits = random_bits(n, &mut rng);
        let pair = sift(&sb, &rb, &bits, &bits).unwrap();
        assert!(pair.len() <= n);
        let ratio = pair.len() as f64 / n as f64;
        assert!((ratio - 0.5).abs() < 0.05, "ratio = {ratio}");
    }

    #[test]
    fn rejects_length_mismatch() {
        use Basis::Rectilinear as R;
        assert!(sift(&[R], &[R, R], &[true], &[true]).is_err());
    }
}
