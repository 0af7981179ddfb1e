//! Index-aligned sender/receiver bit pair.
//!
//! Every transform that reorders or shrinks the key must touch both sides
//! with the same indices in the same operation. The pair refuses to be
//! constructed or mutated into a state where the sides disagree in length;
//! a caller that manages to request one gets [`Error::Inconsistency`] back
//! instead of silently corrupted key material.

use crate::{Error, Result};
use rand::Rng;

/// Sender/receiver bit sequences restricted to basis-matching positions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SiftedKeyPair {
    sender: Vec<bool>,
    receiver: Vec<bool>,
}

impl SiftedKeyPair {
    /// Build a pair from two equal-length bit sequences.
    pub fn new(sender: Vec<bool>, receiver: Vec<bool>) -> Result<Self> {
        if sender.len() != receiver.len() {
            return Err(Error::Inconsistency(format!(
                "side lengths differ: sender {} receiver {}",
                sender.len(),
                receiver.len()
            )));
        }
        Ok(Self { sender, receiver })
    }

    /// Empty pair.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sender.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sender.is_empty()
    }

    pub fn sender(&self) -> &[bool] {
        &self.sender
    }

    pub fn receiver(&self) -> &[bool] {
        &self.receiver
    }

    /// Append one aligned bit pair.
    pub fn push(&mut self, sender_bit: bool, receiver_bit: bool) {
        self.sender.push(sender_bit);
        self.receiver.push(receiver_bit);
    }

    /// Bit pair at `index`.
    pub fn get(&self, index: usize) -> Result<(bool, bool)> {
        match (self.sender.get(index), self.receiver.get(index)) {
            (Some(&s), Some(&r)) => Ok((s, r)),
            _ => Err(Error::Inconsistency(format!(
                "index {index} out of bounds for pair of length {}",
                self.len()
            ))),
        }
    }

    /// Remove the bit pair at `index` from both sides, returning it.
    ///
    /// Shifts the tail down on both sides so positions stay aligned.
    pub fn remove(&mut self, index: usize) -> Result<(bool, bool)> {
        if index >= self.len() {
            return Err(Error::Inconsistency(format!(
                "removal index {index} out of bounds for pair of length {}",
                self.len()
            )));
        }
        Ok((self.sender.remove(index), self.receiver.remove(index)))
    }

    /// Flip the receiver-side bit at `index` in place.
    pub fn flip_receiver(&mut self, index: usize) -> Result<()> {
        match self.receiver.get_mut(index) {
            Some(bit) => {
                *bit = !*bit;
                Ok(())
            }
            None => Err(Error::Inconsistency(format!(
                "flip index {index} out of bounds for pair of length {}",
                self.len()
            ))),
        }
    }

    /// Apply one random permutation to both sides (Fisher-Yates, same swaps).
    pub fn shuffle<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        for i in (1..self.len()).rev() {
            let j = rng.gen_range(0..=i);
            self.sender.swap(i, j);
            self.receiver.swap(i, j);
        }
    }

    /// Copy the aligned sub-range `[start, end)` into a new pair.
    pub fn slice(&self, start: usize, end: usize) -> Result<Self> {
        if start > end || end > self.len() {
            return Err(Error::Inconsistency(format!(
                "slice {start}..{end} out of bounds for pair of length {}",
                self.len()
            )));
        }
        Ok(Self {
            sender: self.sender[start..end].to_vec(),
            receiver: self.receiver[start..end].to_vec(),
        })
    }

    /// Append all bit pairs of `other`.
    pub fn extend_from(&mut self, other: &Self) {
        self.sender.extend_from_slice(&other.sender);
        self.receiver.extend_from_slice(&other.receiver);
    }

    /// Parity (sum mod 2) of each side over the whole pair.
    pub fn parities(&self) -> (bool, bool) {
        (parity(&self.sender), parity(&self.receiver))
    }

    /// Number of positions where the sides disagree.
    pub fn mismatch_count(&self) -> usize {
        self.sender
            .iter()
            .zip(self.receiver.iter())
            .filter(|(s, r)| s != r)
            .count()
    }
}

/// Sum mod 2 of a bit sequence.
pub fn parity(bits: &[bool]) -> bool {
    bits.iter().fold(false, |acc, &b| acc ^ b)
}
