//! Autocaster director binary.
//!
//! Replays a directory of overhead-map frames through the decision engine.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{bail, Context};
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use caster_director::replay::{
    DirectoryFrameSource, LoggingCamera, NoopLifecycle, NoopScene, NoopWindow, ReplayProbe,
};
use caster_director::{metrics, Collaborators, Director, DirectorConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("caster_director=info,caster_vision=info"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting caster-director");

    let config = DirectorConfig::from_env().context("loading configuration")?;
    info!("Director config: {:?}", config.tick);

    if let Some(addr) = &config.metrics_addr {
        let addr: SocketAddr = addr
            .parse()
            .with_context(|| format!("invalid CASTER_METRICS_ADDR '{addr}'"))?;
        metrics::init_metrics(addr)?;
        info!("Prometheus metrics on http://{}/metrics", addr);
    }

    let Some(frame_dir) = config.capture.frame_dir.clone() else {
        bail!("CASTER_FRAME_DIR must point at a directory of PNG frames");
    };
    let frames = Arc::new(
        DirectoryFrameSource::open(&frame_dir, config.capture.replay_loop)
            .with_context(|| format!("opening frames in {}", frame_dir.display()))?,
    );
    let ports = Collaborators {
        frames: frames.clone(),
        camera: Arc::new(LoggingCamera),
        window: Arc::new(NoopWindow),
        scene: Arc::new(NoopScene),
        lifecycle: Arc::new(NoopLifecycle),
        probe: Arc::new(ReplayProbe::new(frames)),
    };

    // Setup signal handler
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        shutdown_tx.send(true).ok();
    });

    let mut director = Director::new(config, ports, shutdown_rx)?;
    director.run().await?;

    info!("Director stopped");
    Ok(())
}
