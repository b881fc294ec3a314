//! `chainctl`: operator command line over the chain adapters.
//!
//! Loads the configuration, wires storage, metrics and one adapter per
//! configured chain, and runs a single command. No key material is handled
//! here; commands that need a signer are left to the embedding wallet.

use alloy_primitives::U256;
use anyhow::{anyhow, Context};
use chain_adapter::with_deadline;
use chain_config::Config;
use chain_types::{cancellation, FeeSpeed, TransactionRequest};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use std::path::PathBuf;
use std::time::Duration;

mod server;
mod wiring;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Print the feature flags of a chain adapter
	Capabilities { chain: String },
	/// Estimate the fee for a transfer
	Estimate {
		chain: String,
		#[arg(long)]
		from: String,
		#[arg(long)]
		to: String,
		/// Amount in the chain's smallest unit
		#[arg(long)]
		amount: String,
		/// Asset symbol; defaults to the chain's native asset
		#[arg(long)]
		asset: Option<String>,
		#[arg(long, default_value = "normal")]
		speed: FeeSpeed,
		/// Keep printing fresh estimates until Ctrl-C
		#[arg(long)]
		follow: bool,
	},
	/// Print the current status of a transaction
	Status { chain: String, hash: String },
	/// Stream status changes of a transaction until Ctrl-C
	Watch { chain: String, hash: String },
	/// Print the Prometheus exposition of this process
	Metrics,
	/// Drop stored transaction state older than the retention window
	Clean {
		#[arg(long)]
		older_than_hours: Option<u64>,
	},
	/// Serve /metrics and /health until Ctrl-C
	Serve {
		#[arg(long, default_value = "127.0.0.1:9464")]
		bind: String,
	},
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let args = Args::parse();

	use tracing_subscriber::{fmt, EnvFilter};

	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.with_writer(std::io::stderr)
		.init();

	let config = Config::from_file(&args.config)
		.await
		.with_context(|| format!("failed to load {}", args.config.display()))?;
	tracing::info!("Loaded configuration [{}]", config.service.id);

	let runtime = wiring::build_runtime(&config)?;
	let deadline = Duration::from_secs(config.service.request_deadline_seconds);
	let service = &runtime.service;

	match args.command {
		Command::Capabilities { chain } => {
			print_json(&service.capabilities(&chain)?)?;
		},
		Command::Estimate {
			chain,
			from,
			to,
			amount,
			asset,
			speed,
			follow,
		} => {
			let amount: U256 = amount
				.parse()
				.map_err(|e| anyhow!("invalid amount {}: {}", amount, e))?;
			let asset = match asset {
				Some(asset) => asset,
				None => native_asset(&config, &chain)?.to_string(),
			};
			let request = TransactionRequest::new(from, to, asset, amount).with_speed(speed);

			if follow {
				let interval = Duration::from_secs(config.service.fee_update_interval_seconds);
				let (handle, signal) = cancellation();
				let mut stream = service
					.subscribe_fee_updates(&chain, &request, interval, signal)
					.await?;
				tokio::spawn(cancel_on_ctrl_c(handle));
				while let Some(estimate) = stream.next().await {
					print_json(&estimate)?;
				}
			} else {
				let estimate = with_deadline(deadline, service.estimate(&chain, &request)).await?;
				print_json(&estimate)?;
			}
		},
		Command::Status { chain, hash } => {
			let status = with_deadline(deadline, service.query_status(&chain, &hash)).await?;
			print_json(&status)?;
		},
		Command::Watch { chain, hash } => {
			let (handle, signal) = cancellation();
			let mut stream = service.subscribe_status(&chain, &hash, signal).await?;
			tokio::spawn(cancel_on_ctrl_c(handle));
			while let Some(status) = stream.next().await {
				print_json(&status)?;
			}
		},
		Command::Metrics => {
			print!("{}", service.export_metrics());
		},
		Command::Clean { older_than_hours } => {
			let hours = older_than_hours.unwrap_or(config.storage.retention_hours);
			let removed = runtime
				.store
				.clean(Duration::from_secs(hours * 3600))
				.await?;
			tracing::info!(removed, hours, "Cleaned transaction state");
			println!("{}", removed);
		},
		Command::Serve { bind } => {
			let state = server::AppState {
				metrics: runtime.metrics().clone(),
			};
			server::serve(&bind, state, async {
				let _ = tokio::signal::ctrl_c().await;
			})
			.await?;
		},
	}

	Ok(())
}

async fn cancel_on_ctrl_c(handle: chain_types::CancelHandle) {
	if tokio::signal::ctrl_c().await.is_ok() {
		tracing::info!("Interrupted, closing subscription");
	}
	handle.cancel();
}

/// Native asset of the chain's adapter family.
fn native_asset(config: &Config, chain_id: &str) -> anyhow::Result<&'static str> {
	let chain = config
		.chains
		.get(chain_id)
		.ok_or_else(|| anyhow!("chain {} is not configured", chain_id))?;
	match chain.implementation.as_str() {
		"bitcoin" => Ok("BTC"),
		"evm" => Ok("ETH"),
		other => Err(anyhow!("no native asset known for {}", other)),
	}
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
	println!("{}", serde_json::to_string_pretty(value)?);
	Ok(())
}
