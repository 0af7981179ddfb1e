//! Iris key-agreement engine.
//!
//! Derives a per-connection shared secret by simulating a BB84 exchange and
//! running its classical post-processing pipeline:
//!
//! ```text
//! channel -> sift -> estimate -> (branch) -> cascade -> biconf -> amplify
//! ```
//!
//! The whole pipeline is CPU-bound, performs no I/O, and draws every random
//! decision from one caller-supplied RNG, so a fixed seed replays a handshake
//! bit for bit. Both protocol parties live in the same process; the "channel"
//! is a stochastic noise model, not a network.

#![forbid(unsafe_code)]
#![warn(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::unreachable,
    clippy::todo,
    clippy::unimplemented
)]

/// Noisy-channel simulation and basis/bit sequence generation.
pub mod channel;
/// Basis sifting.
pub mod sift;
/// Destructive QBER estimation.
pub mod estimate;
/// Cascade block-parity reconciliation.
pub mod cascade;
/// BICONF randomized confirmation rounds.
pub mod biconf;
/// Salted hash privacy amplification.
pub mod amplify;
/// Index-aligned sender/receiver key pair.
pub mod pair;
/// Handshake driver sequencing the pipeline stages.
pub mod handshake;

pub use amplify::FinalKey;
pub use channel::{Basis, ChannelNoiseModel};
pub use estimate::Qber;
pub use handshake::{
    run_handshake, HandshakeConfig, HandshakeObserver, HandshakeOutcome, HandshakeReport, Stage,
};
pub use pair::SiftedKeyPair;

/// Error type for key-agreement operations.
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum Error {
    /// QBER reached the abort threshold; the channel is treated as compromised.
    #[error("channel abort: QBER {qber} at or above threshold")]
    ChannelAbort {
        /// The estimated error rate that triggered the abort.
        qber: f64,
    },
    /// Too little key material left to run the next stage meaningfully.
    #[error("degenerate key: {len} bits is too short to continue")]
    DegenerateKey {
        /// Remaining pair length when the stage gave up.
        len: usize,
    },
    /// Joint-transform bookkeeping violated. Fatal: key material is corrupt.
    #[error("key pair inconsistency: {0}")]
    Inconsistency(String),
    /// Sender and receiver digests differ after amplification.
    #[error("sender and receiver keys diverged after amplification")]
    KeyDivergence,
}

/// Convenient Result alias for this crate.
pub type Result<T> = core::result::Result<T, Error>;
