#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use iris_core::CoreConfig;
use iris_daemon::errors::DaemonError;
use iris_daemon::event_system::{EventKind, EventSystem};
use iris_daemon::registry::{ConnectionRegistry, RegistryConfig};
use iris_daemon::service::{HandshakeService, ServiceConfig};
use tracing::{error, info};

/// Iris key-agreement daemon: derives one simulated-QKD key per connection.
#[derive(Debug, Parser)]
#[command(name = "iris-daemon", version)]
struct Args {
	/// Path to a TOML configuration file; environment variables otherwise.
	#[arg(long)]
	config: Option<PathBuf>,
	/// Number of connections to establish keys for.
	#[arg(long, default_value_t = 1)]
	connections: u64,
}

#[tokio::main(worker_threads = 4)]
async fn main() -> Result<(), DaemonError> {
	let args = Args::parse();

	let cfg = match &args.config {
		Some(path) => CoreConfig::load_from_file(path),
		None => CoreConfig::from_env(),
	}
	.map_err(|e| DaemonError::config(e.to_string()))?;

	let filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cfg.log_level.clone()));
	tracing_subscriber::fmt().with_env_filter(filter).init();

	let registry = Arc::new(ConnectionRegistry::new(RegistryConfig::default()));
	let events = EventSystem::new(1024);
	let service = Arc::new(HandshakeService::new(
		registry.clone(),
		events.clone(),
		ServiceConfig::from_core(&cfg),
	)?);

	// Mirror every event to the log, progress lines included.
	let mut rx = events.subscribe();
	let printer = events.clone();
	tokio::spawn(async move {
		let all = Some(vec![EventKind::Lifecycle, EventKind::Progress, EventKind::Failure]);
		while let Ok(ev) = rx.recv().await {
			if printer.matches(&ev, &all).await {
				info!(connection_id = ev.connection_id, kind = ?ev.kind, "{}", ev.detail);
			}
		}
	});

	info!(
		qubits = cfg.qubit_count,
		bit_flip = cfg.bit_flip_prob,
		connections = args.connections,
		"iris daemon starting"
	);

	// One key-establishment task per connection; state never crosses tasks.
	let mut handles = Vec::new();
	for id in 1..=args.connections {
		registry.register(id).await?;
		let service = service.clone();
		handles.push(tokio::spawn(async move { (id, service.establish(id).await) }));
	}

	let mut failures = 0u64;
	for handle in handles {
		let (id, result) = handle
			.await
			.map_err(|e| DaemonError::internal(format!("establish task panicked: {e}")))?;
		match result {
			Ok(key) => info!(connection_id = id, key_bits = key.bit_len(), "key established"),
			Err(e) => {
				failures += 1;
				error!(connection_id = id, error = %e, "key establishment failed");
			}
		}
	}

	let metrics = registry.metrics().await;
	info!(
		succeeded = metrics.handshakes_succeeded,
		failed = metrics.handshakes_failed,
		"iris daemon done"
	);
	if failures > 0 {
		return Err(DaemonError::internal(format!("{failures} connection(s) failed")));
	}
	Ok(())
}
