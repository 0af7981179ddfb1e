//! Handshake driver.
//!
//! Sequences one key-agreement attempt end to end: simulate the exchange,
//! sift, estimate the error rate, branch into reconciliation or around it,
//! confirm, amplify. The caller owns the RNG (one instance per handshake,
//! never shared across connections) and receives stage-by-stage diagnostics
//! through an observer; the diagnostics are informational text with no
//! protocol meaning.
//!
//! Retry policy deliberately lives a layer up. A single call here is a
//! single attempt; [`crate::Error::ChannelAbort`],
//! [`crate::Error::DegenerateKey`], and [`crate::Error::KeyDivergence`] are
//! the retryable outcomes.

use crate::amplify::{amplify, FinalKey};
use crate::biconf::{confirm, BiconfReport};
use crate::cascade::{reconcile, CascadeReport};
use crate::channel::{random_bases, random_bits, transmit, ChannelNoiseModel};
use crate::estimate::{estimate_qber, Qber};
use crate::sift::sift;
use crate::{Error, Result};
use iris_core::types::QBER_ABORT_THRESHOLD;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Parameters of one handshake attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandshakeConfig {
    /// Units transmitted per attempt.
    pub qubit_count: usize,
    /// Channel noise model applied to every unit.
    pub noise: ChannelNoiseModel,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            qubit_count: iris_core::types::QUBIT_COUNT,
            noise: ChannelNoiseModel::default(),
        }
    }
}

impl HandshakeConfig {
    /// Derive the handshake parameters from the service configuration.
    pub fn from_core(cfg: &iris_core::CoreConfig) -> Self {
        Self {
            qubit_count: cfg.qubit_count,
            noise: ChannelNoiseModel {
                bit_flip: cfg.bit_flip_prob,
                phase_flip: cfg.phase_flip_prob,
            },
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.qubit_count == 0 {
            return Err(Error::DegenerateKey { len: 0 });
        }
        self.noise.validate()
    }
}

/// Pipeline stage, for observer diagnostics and status reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Transmission,
    Sifting,
    Estimation,
    Reconciliation,
    Confirmation,
    Amplification,
}

/// Receives stage-by-stage diagnostic text during a handshake.
///
/// Implementations must not attach protocol meaning to the text; it exists
/// so the connection's caller can watch progress.
pub trait HandshakeObserver {
    fn on_progress(&mut self, stage: Stage, detail: &str);
}

/// No-op observer.
impl HandshakeObserver for () {
    fn on_progress(&mut self, _stage: Stage, _detail: &str) {}
}

/// Collects progress lines; handy in tests and simple callers.
impl HandshakeObserver for Vec<(Stage, String)> {
    fn on_progress(&mut self, stage: Stage, detail: &str) {
        self.push((stage, detail.to_owned()));
    }
}

/// Statistics of a completed attempt. Contains no key material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandshakeReport {
    /// Estimated error rate of this attempt.
    pub qber: f64,
    /// Basis-matching rounds kept by sifting.
    pub sifted_len: usize,
    /// Key bits remaining after estimation consumed its sample.
    pub post_estimation_len: usize,
    /// Reconciliation statistics; all zeros when the clean branch skipped it.
    pub cascade: CascadeReport,
    /// Confirmation statistics.
    pub biconf: BiconfReport,
    /// Width of the derived key.
    pub key_bits: usize,
}

/// A derived key together with its attempt statistics.
#[derive(Debug)]
pub struct HandshakeOutcome {
    pub key: FinalKey,
    pub report: HandshakeReport,
}

/// Fresh OS-seeded RNG for one production handshake. Tests construct
/// seeded instances directly for bit-exact replay.
pub fn handshake_rng() -> ChaCha20Rng {
    ChaCha20Rng::from_entropy()
}

/// Run one key-agreement attempt.
pub fn run_handshake<R, O>(
    config: &HandshakeConfig,
    rng: &mut R,
    observer: &mut O,
) -> Result<HandshakeOutcome>
where
    R: Rng + ?Sized,
    O: HandshakeObserver + ?Sized,
{
    config.validate()?;
    let n = config.qubit_count;

    observer.on_progress(
        Stage::Transmission,
        &format!("transmitting {n} units through the simulated channel"),
    );
    let sender_bits = random_bits(n, rng);
    let sender_bases = random_bases(n, rng);
    let receiver_bases = random_bases(n, rng);
    let received = transmit(&sender_bits, &sender_bases, &receiver_bases, &config.noise, rng)?;

    let mut pair = sift(&sender_bases, &receiver_bases, &sender_bits, &received)?;
    let sifted_len = pair.len();
    observer.on_progress(
        Stage::Sifting,
        &format!("kept {sifted_len}/{n} basis-matching rounds"),
    );
    debug!(sifted_len, "sifting complete");

    let qber = estimate_qber(&mut pair, rng)?;
    let post_estimation_len = pair.len();
    observer.on_progress(
        Stage::Estimation,
        &format!("QBER {} over {} disclosed bits", qber.value(), sifted_len - post_estimation_len),
    );
    if qber.at_or_above(QBER_ABORT_THRESHOLD) {
        warn!(qber = qber.value(), "abort threshold reached, channel treated as compromised");
        observer.on_progress(
            Stage::Estimation,
            &format!("QBER {} at or above {QBER_ABORT_THRESHOLD}, aborting", qber.value()),
        );
        return Err(Error::ChannelAbort { qber: qber.value() });
    }

    let cascade = if qber.is_zero() {
        observer.on_progress(Stage::Reconciliation, "clean estimate, reconciliation skipped");
        CascadeReport::default()
    } else {
        let (corrected, report) = reconcile(pair, qber, rng)?;
        pair = corrected;
        observer.on_progress(
            Stage::Reconciliation,
            &format!(
                "corrected {} error blocks in {} passes",
                report.error_blocks, report.passes
            ),
        );
        report
    };

    let biconf = confirm(&mut pair, qber, rng)?;
    observer.on_progress(
        Stage::Confirmation,
        &format!("{} residual corrections over 8 rounds", biconf.corrected),
    );

    let key = amplify(&pair, rng)?;
    observer.on_progress(
        Stage::Amplification,
        &format!("derived a {}-bit key", key.bit_len()),
    );
    info!(
        qber = qber.value(),
        sifted_len,
        corrected = cascade.error_blocks + biconf.corrected,
        "handshake attempt complete"
    );

    Ok(HandshakeOutcome {
        key,
        report: HandshakeReport {
            qber: qber.value(),
            sifted_len,
            post_estimation_len,
            cascade,
            biconf,
            key_bits: iris_core::types::FINAL_KEY_BITS,
        },
    })
}

/// Convenience wrapper used where no diagnostics are wanted.
pub fn run_handshake_silent<R: Rng + ?Sized>(
    config: &HandshakeConfig,
    rng: &mut R,
) -> Result<HandshakeOutcome> {
    run_handshake(config, rng, &mut ())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noiseless_config() -> HandshakeConfig {
        HandshakeConfig {
            qubit_count: 24,
            noise: ChannelNoiseModel::noiseless(),
        }
    }

    #[test]
    fn noiseless_handshake_completes_with_zero_qber() {
        let mut rng = ChaCha20Rng::seed_from_u64(100);
        let outcome = run_handshake_silent(&noiseless_config(), &mut rng).unwrap();
        assert_eq!(outcome.report.qber, 0.0);
        assert_eq!(outcome.report.cascade, CascadeReport::default());
        assert_eq!(outcome.key.bit_len(), 256);
        assert!(outcome.report.sifted_len <= 24);
        assert_eq!(
            outcome.report.post_estimation_len,
            outcome.report.sifted_len - outcome.report.sifted_len / 3
        );
    }

    #[test]
    fn fixed_seed_replays_bit_for_bit() {
        let a = run_handshake_silent(&noiseless_config(), &mut ChaCha20Rng::seed_from_u64(7))
            .unwrap();
        let b = run_handshake_silent(&noiseless_config(), &mut ChaCha20Rng::seed_from_u64(7))
            .unwrap();
        assert_eq!(a.key.bits(), b.key.bits());
        assert_eq!(a.report, b.report);
    }

    #[test]
    fn observer_sees_every_stage() {
        let mut rng = ChaCha20Rng::seed_from_u64(8);
        let mut log: Vec<(Stage, String)> = Vec::new();
        run_handshake(&noiseless_config(), &mut rng, &mut log).unwrap();
        let stages: Vec<Stage> = log.iter().map(|(s, _)| *s).collect();
        for expected in [
            Stage::Transmission,
            Stage::Sifting,
            Stage::Estimation,
            Stage::Reconciliation,
            Stage::Confirmation,
            Stage::Amplification,
        ] {
            assert!(stages.contains(&expected), "missing {expected:?}");
        }
    }

    #[test]
    fn saturated_noise_aborts() {
        // Every matching-basis bit arrives flipped, so the sampled error
        // rate is 1.0 and the attempt aborts at the threshold.
        let config = HandshakeConfig {
            qubit_count: 64,
            noise: ChannelNoiseModel { bit_flip: 1.0, phase_flip: 0.0 },
        };
        let mut rng = ChaCha20Rng::seed_from_u64(9);
        match run_handshake_silent(&config, &mut rng) {
            Err(Error::ChannelAbort { qber }) => assert_eq!(qber, 1.0),
            other => panic!("expected channel abort, got {other:?}"),
        }
    }

    #[test]
    fn tiny_exchange_is_degenerate() {
        // Two units can sift to at most two bits, under the estimation
        // minimum.
        let config = HandshakeConfig {
            qubit_count: 2,
            noise: ChannelNoiseModel::noiseless(),
        };
        let mut rng = ChaCha20Rng::seed_from_u64(10);
        match run_handshake_silent(&config, &mut rng) {
            Err(Error::DegenerateKey { len }) => assert!(len <= 2),
            other => panic!("expected degenerate key, got {other:?}"),
        }
    }

    #[test]
    fn noisy_handshake_is_total() {
        // Under the reference noise model every outcome must be a valid key
        // or a typed, retryable error; nothing may panic or diverge.
        let config = HandshakeConfig::default();
        for seed in 0..32 {
            let mut rng = ChaCha20Rng::seed_from_u64(seed);
            match run_handshake_silent(&config, &mut rng) {
                Ok(outcome) => {
                    assert_eq!(outcome.key.bit_len(), 256);
                    assert!(outcome.report.qber < QBER_ABORT_THRESHOLD);
                }
                Err(Error::ChannelAbort { qber }) => assert!(qber >= QBER_ABORT_THRESHOLD),
                Err(Error::DegenerateKey { len }) => assert!(len < 3),
                // Residual even-count errors can slip past confirmation and
                // show up as divergent digests; that is a retryable outcome,
                // not a defect.
                Err(Error::KeyDivergence) => {}
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }
    }
}
