//! Privacy amplification.
//!
//! The reconciled key plus a fresh random salt is hashed into the final
//! 256-bit secret, compressing away whatever partial information earlier
//! stages may have disclosed. The salt is shared and not secret, but it is
//! drawn fresh per handshake. The first key bit selects between two distinct
//! 256-bit digests, and the output is rendered as a fixed-width binary
//! string: leading zero bits are significant and must survive formatting.

use crate::pair::SiftedKeyPair;
use crate::{Error, Result};
use rand::Rng;
use sha2::{Digest, Sha256};
use std::fmt;
use tracing::debug;

/// Derived per-connection secret: a 256-bit digest in binary expansion.
#[derive(Clone, PartialEq, Eq)]
pub struct FinalKey {
    bits: String,
}

impl FinalKey {
    /// Full binary expansion, '0'/'1' characters, fixed width.
    pub fn bits(&self) -> &str {
        &self.bits
    }

    /// Key width in bits.
    pub fn bit_len(&self) -> usize {
        self.bits.len()
    }

    /// Key material regrouped into bytes, 8 bits per byte, for use as a
    /// repeating stream-cipher key.
    pub fn key_bytes(&self) -> Vec<u8> {
        self.bits
            .as_bytes()
            .chunks(8)
            .map(|chunk| {
                chunk
                    .iter()
                    .fold(0u8, |acc, &c| (acc << 1) | u8::from(c == b'1'))
            })
            .collect()
    }
}

// The key is a per-connection secret; keep it out of logs.
impl fmt::Debug for FinalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FinalKey")
            .field("bit_len", &self.bits.len())
            .field("prefix", &&self.bits[..self.bits.len().min(8)])
            .finish()
    }
}

/// Salt, hash, and compare both sides of the pair into the final key.
///
/// Both sides are digested independently over their own bits; if the
/// resulting digests differ the handshake is unusable and the caller gets
/// [`Error::KeyDivergence`] instead of a key that only one side holds.
pub fn amplify<R: Rng + ?Sized>(pair: &SiftedKeyPair, rng: &mut R) -> Result<FinalKey> {
    if pair.is_empty() {
        return Err(Error::DegenerateKey { len: 0 });
    }

    // Shared salt, one bit per key bit, appended identically to both sides.
    let salt = crate::channel::random_bits(pair.len(), rng);

    let sender_bits = digest_side(pair.sender(), &salt);
    let receiver_bits = digest_side(pair.receiver(), &salt);
    if sender_bits != receiver_bits {
        return Err(Error::KeyDivergence);
    }

    debug!(key_bits = sender_bits.len(), "privacy amplification complete");
    Ok(FinalKey { bits: sender_bits })
}

/// Digest one side's key-plus-salt into a fixed-width binary string.
///
/// The side's own first bit picks the algorithm: SHA-256 when set,
/// BLAKE3-256 otherwise. Matching sides therefore always agree on the
/// selection.
fn digest_side(key: &[bool], salt: &[bool]) -> String {
    let mut material = Vec::with_capacity(key.len() + salt.len());
    for &bit in key.iter().chain(salt) {
        material.push(if bit { b'1' } else { b'0' });
    }

    let digest: [u8; 32] = if key.first().copied().unwrap_or(false) {
        Sha256::digest(&material).into()
    } else {
        *blake3::hash(&material).as_bytes()
    };
    to_binary_string(&digest)
}

/// Fixed-width binary rendering: every byte contributes exactly 8 chars, so
/// leading zeros never collapse the key width.
fn to_binary_string(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 8);
    for byte in bytes {
        for shift in (0..8).rev() {
            out.push(if byte >> shift & 1 == 1 { '1' } else { '0' });
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn identical_pair(bits: Vec<bool>) -> SiftedKeyPair {
        SiftedKeyPair::new(bits.clone(), bits).unwrap()
    }

    #[test]
    fn binary_rendering_preserves_leading_zeros() {
        assert_eq!(to_binary_string(&[0x01]), "00000001");
        assert_eq!(to_binary_string(&[0x00, 0xff]), "0000000011111111");
        assert_eq!(to_binary_string(&hex!("80")), "10000000");
    }

    #[test]
    fn output_is_always_256_bits() {
        for seed in 0..8 {
            let mut rng = ChaCha20Rng::seed_from_u64(seed);
            let pair = identical_pair(crate::channel::random_bits(10, &mut rng));
            let key = amplify(&pair, &mut rng).unwrap();
            assert_eq!(key.bit_len(), iris_core::types::FINAL_KEY_BITS);
            assert_eq!(key.key_bytes().len(), 32);
        }
    }

    #[test]
    fn same_inputs_same_key() {
        let pair = identical_pair(vec![true, false, true, true]);
        let a = amplify(&pair, &mut ChaCha20Rng::seed_from_u64(9)).unwrap();
        let b = amplify(&pair, &mut ChaCha20Rng::seed_from_u64(9)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn salt_changes_the_key() {
        let pair = identical_pair(vec![true, false, true, true]);
        let a = amplify(&pair, &mut ChaCha20Rng::seed_from_u64(9)).unwrap();
        let b = amplify(&pair, &mut ChaCha20Rng::seed_from_u64(10)).unwrap();
        assert_ne!(a.bits(), b.bits());
    }

    #[test]
    fn first_bit_selects_the_algorithm() {
        // key 1,0 with salt drawn from the seeded RNG; recompute by hand.
        let pair = identical_pair(vec![true, false]);
        let mut rng = ChaCha20Rng::seed_from_u64(5);
        let key = amplify(&pair, &mut rng).unwrap();

        let mut rng = ChaCha20Rng::seed_from_u64(5);
        let salt = crate::channel::random_bits(2, &mut rng);
        let mut material = vec![b'1', b'0'];
        for &s in &salt {
            material.push(if s { b'1' } else { b'0' });
        }
        let expected: [u8; 32] = Sha256::digest(&material).into();
        assert_eq!(key.bits(), to_binary_string(&expected));

        // Leading zero bit switches to the second algorithm.
        let pair = identical_pair(vec![false, true]);
        let mut rng = ChaCha20Rng::seed_from_u64(5);
        let key = amplify(&pair, &mut rng).unwrap();
        let mut material = vec![b'0', b'1'];
        for &s in &salt {
            material.push(if s { b'1' } else { b'0' });
        }
        let expected = *blake3::hash(&material).as_bytes();
        assert_eq!(key.bits(), to_binary_string(&expected));
    }

    #[test]
    fn divergent_sides_are_rejected() {
        let pair =
            SiftedKeyPair::new(vec![true, true, false], vec![true, false, false]).unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(6);
        assert_eq!(amplify(&pair, &mut rng), Err(Error::KeyDivergence));
    }

    #[test]
    fn empty_pair_is_degenerate() {
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        assert_eq!(
            amplify(&SiftedKeyPair::empty(), &mut rng),
            Err(Error::DegenerateKey { len: 0 })
        );
    }

    #[test]
    fn key_bytes_regroup_the_bit_string() {
        let key = FinalKey { bits: "0000000101000001".into() };
        assert_eq!(key.key_bytes(), vec![0x01, 0x41]);
    }
}
