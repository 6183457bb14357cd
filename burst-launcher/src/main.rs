//! Flux Burst
//!
//! Runs one job on a Flux Operator MiniCluster and collects its output.
//!
//! Architecture:
//! - Configuration: job from the command line, tuning from the environment
//! - Services: one per phase (provision, prepare, submit, watch, collect)
//! - Lifecycle: sequences the services and guarantees cleanup
//!
//! A launch either borrows the cluster the local kubeconfig points at or
//! creates a GKE cluster for the job and destroys it afterwards. The
//! MiniCluster is always deleted, and the exit status tells a calling
//! pipeline how the job ended.

mod cli;
mod config;
mod error;
mod lifecycle;
mod output;
mod service;

#[cfg(test)]
mod testing;

use anyhow::{Context, Result};
use burst_client::{ClusterProvider, GkeProvider, GoogleTokenSource, KubeConnector};
use burst_core::domain::cluster::ProvisionMode;
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, info_span};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use crate::cli::Cli;
use crate::config::Config;
use crate::lifecycle::LifecycleController;
use crate::service::ClusterProvisioner;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_filter().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(2)
        }
    }
}

/// Runs the launch; errors returned here are invocation errors
async fn run(cli: Cli) -> Result<u8> {
    let config = load_config()?;
    let job = cli.job_spec()?;
    let mode = cli.provision_mode();

    let http = reqwest::Client::builder()
        .timeout(config.http_timeout)
        .build()
        .context("Failed to build HTTP client")?;
    let tokens = GoogleTokenSource::from_env();
    let provider: Option<Arc<dyn ClusterProvider>> = match &mode {
        ProvisionMode::Create(_) => Some(Arc::new(GkeProvider::new(http.clone(), tokens.clone()))),
        ProvisionMode::Borrow => None,
    };

    let controller = LifecycleController::new(
        ClusterProvisioner::new(provider, &config),
        Arc::new(KubeConnector::new(tokens, http.clone())),
        cli.manifest_source(),
        http,
        config,
    );

    let cancel = CancellationToken::new();
    let cancel_on_signal = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received, cleaning up");
        cancel_on_signal.cancel();
    });

    let run_id = Uuid::new_v4();
    let span = info_span!("run", %run_id, job = %job.name);
    info!(parent: &span, "Launching {} on {} node(s)", job.command, job.nodes);

    let result = controller
        .run(&job, &mode, run_id, &cancel)
        .instrument(span)
        .await;

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("{}", e);
            return Ok(e.exit_code());
        }
    };

    if let Some(path) = &cli.summary {
        if let Err(e) = output::write_summary(path, &outcome) {
            error!("{}", e);
            return Ok(e.exit_code());
        }
    }
    if !cli.quiet {
        output::print_summary(&outcome);
    }

    Ok(outcome.exit_code())
}

/// Loads tuning from the environment
fn load_config() -> Result<Config> {
    let config = Config::from_env().context("Invalid launcher configuration")?;
    config.validate()?;
    Ok(config)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
