use anyhow::Result;
use clap::Parser;
use collab_core::change_log::InMemoryChangeLog;
use collab_core::collaborators::{
    InMemoryDocumentMetadataStore, InMemoryUserDirectory, MockAuthorizationClient,
};
use collab_core::config::Config;
use collab_core::contributions::InMemoryContributionStore;
use collab_core::ids::{DocumentId, UserId};
use collab_core::registry::RoomRegistry;
use collab_core::{logging, transport};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::debug;

/// Runs the collaborative editing server: one TCP listener accepting one connection per
/// editor session (§11), backed by an in-process `RoomRegistry` of Document Rooms.
#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// TCP port to listen on.
    #[arg(long, env = "COLLAB_CORE_PORT", default_value_t = 7400)]
    port: u16,
    /// Path to an `ini` config file (§12). Missing file falls back to defaults.
    #[arg(long, env = "COLLAB_CORE_CONFIG")]
    config: Option<PathBuf>,
    /// Enable debug-level logging.
    #[arg(long)]
    debug: bool,
    /// Document id to pre-create with empty content, so a first editor can join without a
    /// separate provisioning step. May be given multiple times.
    #[arg(long = "seed-document")]
    seed_documents: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::initialize(cli.debug);

    let config = cli
        .config
        .as_deref()
        .map_or_else(Config::default, Config::from_config_file);

    let authorization = Arc::new(MockAuthorizationClient::default());
    let metadata = Arc::new(InMemoryDocumentMetadataStore::default());
    let user_directory = Arc::new(InMemoryUserDirectory::default());
    let change_log: Arc<dyn collab_core::change_log::ChangeLog> =
        Arc::new(InMemoryChangeLog::new());
    let contributions: Arc<dyn collab_core::contributions::ContributionStore> =
        Arc::new(InMemoryContributionStore::new());

    let registry = RoomRegistry::new(
        config,
        authorization,
        metadata,
        change_log,
        contributions,
        user_directory,
    );

    for document_id in cli.seed_documents {
        registry.create_document(
            &DocumentId(document_id),
            "",
            &UserId("system".to_string()),
        );
    }

    let server = tokio::spawn({
        let registry = registry.clone();
        async move { transport::serve(cli.port, registry).await }
    });

    wait_for_shutdown().await;
    server.abort();
    Ok(())
}

async fn wait_for_shutdown() {
    let mut signal_terminate = signal::unix::signal(signal::unix::SignalKind::terminate())
        .expect("Should have been able to create terminate signal stream");
    tokio::select! {
        _ = signal::ctrl_c() => {
            debug!("Got SIGINT (Ctrl+C), shutting down");
        }
        _ = signal_terminate.recv() => {
            debug!("Got SIGTERM, shutting down");
        }
    }
}
