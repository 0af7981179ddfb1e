use crate::error::{Error, Result};
use crate::types;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CoreConfig {
	pub log_level: String,
	/// Transmitted units per handshake attempt.
	pub qubit_count: usize,
	/// Per-unit bit-flip probability of the simulated channel.
	pub bit_flip_prob: f64,
	/// Per-unit phase-flip probability of the simulated channel.
	pub phase_flip_prob: f64,
	/// Handshake attempts before the connection is marked failed.
	pub max_handshake_attempts: u32,
}

impl Default for CoreConfig {
	fn default() -> Self {
		Self {
			log_level: "info".into(),
			qubit_count: types::QUBIT_COUNT,
			bit_flip_prob: types::DEFAULT_NOISE_PROB,
			phase_flip_prob: types::DEFAULT_NOISE_PROB,
			max_handshake_attempts: types::MAX_HANDSHAKE_ATTEMPTS,
		}
	}
}

impl CoreConfig {
	pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
		let data = fs::read_to_string(&path)?;
		let cfg: Self = toml::from_str(&data).map_err(|e| Error::config(format!("toml parse error: {e}")))?;
		cfg.validate()?;
		debug!(path = %path.as_ref().display(), "configuration loaded");
		Ok(cfg)
	}

	pub fn from_env() -> Result<Self> {
		let mut cfg = Self::default();
		if let Ok(v) = std::env::var("IRIS_LOG_LEVEL") { cfg.log_level = v; }
		if let Ok(v) = std::env::var("IRIS_QUBIT_COUNT") {
			cfg.qubit_count = v.parse().map_err(|_| Error::config(format!("invalid qubit_count: {v}")))?;
		}
		if let Ok(v) = std::env::var("IRIS_MAX_ATTEMPTS") {
			cfg.max_handshake_attempts = v.parse().map_err(|_| Error::config(format!("invalid max_attempts: {v}")))?;
		}
		cfg.validate()?;
		Ok(cfg)
	}

	pub fn validate(&self) -> Result<()> {
		let allowed = ["trace","debug","info","warn","error"];
		if !allowed.contains(&self.log_level.as_str()) {
			return Err(Error::config(format!("invalid log_level: {}", self.log_level)));
		}
		if self.qubit_count == 0 {
			return Err(Error::config("qubit_count must be positive"));
		}
		for (name, p) in [("bit_flip_prob", self.bit_flip_prob), ("phase_flip_prob", self.phase_flip_prob)] {
			if !(0.0..=1.0).contains(&p) {
				return Err(Error::config(format!("{name} out of range: {p}")));
			}
		}
		if self.max_handshake_attempts == 0 {
			return Err(Error::config("max_handshake_attempts must be positive"));
		}
		Ok(())
	}
}
