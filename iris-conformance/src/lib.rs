#![forbid(unsafe_code)]
//! Iris protocol conformance helpers.
//!
//! Small, self-contained helpers used by the conformance and property test
//! suites: deterministic RNG construction, synthetic key-pair builders with
//! controlled error injection, and a simple rate check. These utilities
//! intentionally avoid any external side effects.
//!
//! # Quick Start
//!
//! ```
//! use iris_conformance::{check_rate_within, inject_error_rate, random_pair, seeded_rng};
//!
//! let mut rng = seeded_rng(2024);
//! let mut pair = random_pair(1_000, &mut rng);
//! let injected = inject_error_rate(&mut pair, 0.1, &mut rng).unwrap();
//! assert_eq!(pair.mismatch_count(), injected);
//! check_rate_within(injected as f64 / 1_000.0, 0.1, 0.01).unwrap();
//! ```

use iris_qkd::SiftedKeyPair;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

/// Deterministic per-test RNG; the same seed replays every draw.
pub fn seeded_rng(seed: u64) -> ChaCha20Rng {
	ChaCha20Rng::seed_from_u64(seed)
}

/// Build a pair whose sides agree at every position, with random contents.
pub fn random_pair<R: Rng + ?Sized>(len: usize, rng: &mut R) -> SiftedKeyPair {
	let mut pair = SiftedKeyPair::empty();
	for _ in 0..len {
		let bit = rng.gen();
		pair.push(bit, bit);
	}
	pair
}

/// Flip the receiver side at the given positions.
pub fn flip_positions(
	pair: &mut SiftedKeyPair,
	positions: &[usize],
) -> Result<(), iris_qkd::Error> {
	for &index in positions {
		pair.flip_receiver(index)?;
	}
	Ok(())
}

/// Flip a `rate` fraction of distinct receiver positions, returning how many
/// were flipped.
pub fn inject_error_rate<R: Rng + ?Sized>(
	pair: &mut SiftedKeyPair,
	rate: f64,
	rng: &mut R,
) -> Result<usize, iris_qkd::Error> {
	let count = ((pair.len() as f64) * rate).round() as usize;
	let count = count.min(pair.len());
	if count == 0 {
		return Ok(0);
	}
	for index in rand::seq::index::sample(rng, pair.len(), count) {
		pair.flip_receiver(index)?;
	}
	Ok(count)
}

/// Error from [`check_rate_within`].
#[derive(Debug, thiserror::Error, PartialEq)]
#[error("rate {observed} outside {expected} +/- {tolerance}")]
pub struct RateError {
	pub observed: f64,
	pub expected: f64,
	pub tolerance: f64,
}

/// Check that an observed rate is finite and within tolerance of the
/// expected one.
pub fn check_rate_within(observed: f64, expected: f64, tolerance: f64) -> Result<(), RateError> {
	if !observed.is_finite() || (observed - expected).abs() > tolerance {
		return Err(RateError { observed, expected, tolerance });
	}
	Ok(())
}
