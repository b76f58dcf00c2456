//! # relay-agent
//!
//! embed-relay server binary: loads settings, starts the embedding model in
//! the background and runs the TCP session manager until it stops itself or
//! receives ctrl-c.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use relay_embeddings::{start_backend, EmbeddingConfig, ReadinessGate};
use relay_server::{ServerConfig, SessionManager};
use relay_settings::{EmbeddingBackend, RelaySettings};
use tracing::info;

/// TCP embedding relay.
#[derive(Parser, Debug)]
#[command(name = "relay-agent", about = "TCP embedding relay server")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (default `~/.embed-relay/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Idle accept timeouts before shutting down; 0 disables.
    #[arg(long)]
    idle_shutdown_after: Option<u32>,

    /// Use deterministic hash embeddings instead of loading a model.
    #[arg(long)]
    mock_embeddings: bool,
}

impl Cli {
    /// Layer command-line overrides over loaded settings.
    fn apply(&self, settings: &mut RelaySettings) {
        if let Some(ref host) = self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(limit) = self.idle_shutdown_after {
            settings.server.idle_shutdown_after = (limit > 0).then_some(limit);
        }
        if self.mock_embeddings {
            settings.embedding.backend = EmbeddingBackend::Mock;
        }
    }
}

fn load_settings(cli: &Cli) -> Result<RelaySettings> {
    let mut settings = match cli.settings {
        Some(ref path) => relay_settings::load_settings_from_path(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => relay_settings::load_settings().context("Failed to load settings")?,
    };
    cli.apply(&mut settings);
    settings.validate().context("Invalid settings")?;
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings =
        tracing::subscriber::with_default(relay_logging::bootstrap_subscriber(), || {
            load_settings(&cli)
        })?;
    relay_logging::init_subscriber(&settings.logging);

    let embedding = EmbeddingConfig::from_settings(&settings.embedding);
    let gate = Arc::new(ReadinessGate::new());
    let backend =
        start_backend(&embedding, Arc::clone(&gate)).context("Failed to start embeddings")?;

    let manager = Arc::new(
        SessionManager::bind(
            ServerConfig::from_settings(&settings.server),
            gate,
            backend.service,
            embedding.worker_queue_depth,
        )
        .await
        .context("Failed to bind server")?,
    );
    info!(addr = %manager.local_addr(), model = %embedding.model, "embed-relay started");

    let run = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.run().await })
    };

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for ctrl-c")?;
            info!("ctrl-c received, shutting down");
            manager.shutdown().shutdown();
        }
        () = manager.shutdown().cancelled() => {}
    }

    run.await
        .context("Server task panicked")?
        .context("Server failed")?;
    if let Some(load) = backend.load_task {
        load.abort();
    }
    info!("embed-relay stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("relay-agent").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn no_flags_keeps_settings() {
        let mut settings = RelaySettings::default();
        parse(&[]).apply(&mut settings);
        assert_eq!(settings.server.port, 5096);
        assert_eq!(settings.server.idle_shutdown_after, Some(3));
        assert_eq!(settings.embedding.backend, EmbeddingBackend::Onnx);
    }

    #[test]
    fn flags_override_settings() {
        let mut settings = RelaySettings::default();
        parse(&[
            "--host",
            "127.0.0.1",
            "--port",
            "0",
            "--idle-shutdown-after",
            "7",
            "--mock-embeddings",
        ])
        .apply(&mut settings);
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 0);
        assert_eq!(settings.server.idle_shutdown_after, Some(7));
        assert_eq!(settings.embedding.backend, EmbeddingBackend::Mock);
    }

    #[test]
    fn zero_idle_limit_disables_idle_shutdown() {
        let mut settings = RelaySettings::default();
        parse(&["--idle-shutdown-after", "0"]).apply(&mut settings);
        assert_eq!(settings.server.idle_shutdown_after, None);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn settings_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server": {"port": 6000}}"#).unwrap();
        let cli = parse(&["--settings", path.to_str().unwrap(), "--mock-embeddings"]);
        let settings = load_settings(&cli).unwrap();
        assert_eq!(settings.server.port, 6000);
        assert_eq!(settings.embedding.backend, EmbeddingBackend::Mock);
    }

    #[test]
    fn malformed_settings_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        let cli = parse(&["--settings", path.to_str().unwrap()]);
        assert!(load_settings(&cli).is_err());
    }

    #[tokio::test]
    async fn mock_flag_opens_gate_immediately() {
        let gate = Arc::new(ReadinessGate::new());
        let backend = start_backend(&EmbeddingConfig::mock(8), Arc::clone(&gate)).unwrap();
        assert!(gate.is_ready());
        assert!(backend.load_task.is_none());
    }

    #[tokio::test]
    async fn default_backend_loads_model_in_background() {
        let settings = RelaySettings::default();
        let embedding = EmbeddingConfig::from_settings(&settings.embedding);
        assert_eq!(embedding.backend, EmbeddingBackend::Onnx);

        let gate = Arc::new(ReadinessGate::new());
        let backend = start_backend(&embedding, Arc::clone(&gate)).unwrap();
        // The load task has not been polled yet on this runtime.
        assert!(!gate.is_ready());
        let load = backend.load_task.expect("onnx backend loads in the background");
        load.abort();
        assert_eq!(backend.service.dimensions(), embedding.dimensions);
    }
}
