//! rfshim - exercise the timed streaming shim on a simulated device

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use rf_hal::fault::tokio_handler;
use rf_hal::{FaultCounts, FaultKind, FaultRecord, Sample};
use rf_sim::{SimDeviceConfig, SimFactory};
use rf_stream::{SessionConfig, StreamSession};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "rfshim", version, about = "Timed streaming shim for SDR front ends")]
struct Cli {
    /// Session configuration file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Send timed bursts through the simulated device and read them back
    Loopback {
        /// Number of bursts
        #[arg(long, default_value_t = 10)]
        bursts: usize,
        /// Samples per burst
        #[arg(long, default_value_t = 5000)]
        burst_len: usize,
        /// Channels in each direction
        #[arg(long, default_value_t = 1)]
        channels: usize,
        /// Report an underflow on every n-th burst
        #[arg(long)]
        underflow_every: Option<usize>,
    },
    /// Print the effective session configuration
    Config,
}

#[derive(Debug, Default, Serialize)]
struct LoopbackSummary {
    device: String,
    bursts: usize,
    samples_sent: usize,
    samples_received: usize,
    incomplete_transfers: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries the JSON output
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "rfshim=info,rf_stream=info,rf_hal=info,rf_sim=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => SessionConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => SessionConfig::default(),
    };

    match cli.command {
        Command::Config => {
            println!("{}", config.to_json_pretty()?);
        }
        Command::Loopback {
            bursts,
            burst_len,
            channels,
            underflow_every,
        } => {
            let config = SessionConfig {
                rx_channels: channels,
                tx_channels: channels,
                ..config
            };
            config.validate()?;
            let sim = SimDeviceConfig {
                underflow_every,
                ..Default::default()
            };
            loopback(config, sim, bursts, burst_len).await?;
        }
    }

    Ok(())
}

async fn loopback(
    config: SessionConfig,
    sim: SimDeviceConfig,
    bursts: usize,
    burst_len: usize,
) -> anyhow::Result<()> {
    let (fault_tx, mut fault_rx) = mpsc::unbounded_channel::<FaultRecord>();

    // Faults stream out as JSON lines while the session runs
    let printer = tokio::spawn(async move {
        let mut counts = FaultCounts::default();
        while let Some(fault) = fault_rx.recv().await {
            match fault.kind {
                FaultKind::Overflow => counts.overflow += 1,
                FaultKind::Late => counts.late += 1,
                FaultKind::Underflow => counts.underflow += 1,
            }
            match serde_json::to_string(&fault) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::warn!("Could not encode fault: {}", e),
            }
        }
        counts
    });

    let summary = tokio::task::spawn_blocking(move || -> anyhow::Result<LoopbackSummary> {
        let factory = SimFactory::empty().with_device(sim);
        let mut session = StreamSession::open(&factory, config)?;
        session.register_fault_handler(tokio_handler(fault_tx));
        session.wait_lo_locked()?;

        let channels = session.tx_channels();
        let tx_data: Vec<Vec<Sample>> = (0..channels)
            .map(|ch| {
                (0..burst_len)
                    .map(|i| Sample::from_polar(0.5, (i + ch) as f32 * 0.01))
                    .collect()
            })
            .collect();
        let mut rx_data = vec![vec![Sample::default(); burst_len]; session.rx_channels()];

        let mut summary = LoopbackSummary {
            device: session.device_name().to_string(),
            bursts,
            ..Default::default()
        };

        let mut at = session.time_now()? + 0.1;
        for burst in 0..bursts {
            let tx: Vec<&[Sample]> = tx_data.iter().map(|b| b.as_slice()).collect();
            let sent = session.send_timed_multi(&tx, burst_len, Some(at), true, true, true)?;
            summary.samples_sent += sent.samples;

            let mut rx: Vec<&mut [Sample]> = rx_data.iter_mut().map(|b| b.as_mut_slice()).collect();
            let received = session.recv_multi(&mut rx, burst_len, true)?;
            summary.samples_received += received.samples;

            if !sent.report.is_complete() || !received.report.is_complete() {
                summary.incomplete_transfers += 1;
            }
            tracing::debug!("Burst {} at {}", burst, at);
            at = sent.next_time_spec + 0.001;
        }

        session.close()?;
        Ok(summary)
    })
    .await??;

    let counts = printer.await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    println!("{}", serde_json::to_string_pretty(&counts)?);
    Ok(())
}
