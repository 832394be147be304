mod args;
mod host;

use std::{sync::Arc, time::Duration};

use anyhow::bail;
use clap::Parser;
use streamline::{
    protection::StaticCapability, Collaborators, SessionOrchestrator, SessionPhase,
};

use args::ProbeArgs;
use host::{DeferredLicenseProvider, LoggingHost};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = ProbeArgs::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .try_from_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = args.session_config()?;
    let mut collaborators = Collaborators::http(args.client()?);
    if !args.drm_schemes.is_empty() {
        collaborators = collaborators.with_protection(
            Arc::new(StaticCapability::new(&args.drm_schemes)),
            Arc::new(DeferredLicenseProvider::new(args.drm_schemes.clone())),
        );
    }

    let mut handle =
        SessionOrchestrator::from_uri(&args.url, collaborators, Arc::new(LoggingHost), config)?
            .spawn();

    let deadline = async {
        match args.deadline {
            Some(seconds) => tokio::time::sleep(Duration::from_secs(seconds)).await,
            None => std::future::pending().await,
        }
    };

    let phase = tokio::select! {
        phase = handle.settled() => phase,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted");
            SessionPhase::Destroyed
        }
        _ = deadline => {
            tracing::warn!(state = ?handle.phase(), "Session did not settle in time");
            SessionPhase::Destroyed
        }
    };

    handle.destroy();
    handle.destroyed().await;

    match phase {
        SessionPhase::Ready => Ok(()),
        SessionPhase::Failed => bail!("Failed to build track sources"),
        _ => bail!("Session stopped before playback could start"),
    }
}
