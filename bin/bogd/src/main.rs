//! Bog Daemon - A replication node for the bog signed content log.
//!
//! Provides:
//! - The peer replication endpoint (WebSocket upgrade on the listen port)
//! - The HTTP query directory on the same port
//! - Gossip, persistence, and integrity timers
//! - Identity bootstrap and offline publishing

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use bog_core::Keypair;
use bog_gossip::{Gossip, RequestSink, StoreProbe};
use bog_log::tasks::{DEFAULT_FLUSH_INTERVAL, DEFAULT_REBUILD_INTERVAL};
use bog_log::{keys, LogManager};
use bog_net::{dial, http, Endpoint, PeerSet};
use bog_store::{ContentStore, RocksStore};

/// Bog daemon service.
#[derive(Parser)]
#[command(name = "bogd")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Configuration file path
    #[arg(short, long, default_value = "~/.bog/config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon (default)
    Run {
        /// Listen address
        #[arg(short, long)]
        listen: Option<SocketAddr>,
    },

    /// Print the local identity and log summary
    Status,

    /// Sign and append a message while the daemon is stopped
    Publish {
        /// Message body
        body: String,
    },
}

/// Daemon configuration.
#[derive(Debug, Clone)]
struct DaemonConfig {
    /// Listen address for peers and directory queries
    listen_addr: SocketAddr,
    /// Data directory
    data_dir: PathBuf,
    /// Peer directory URLs to dial at startup
    peers: Vec<String>,
    /// Log persistence cadence
    flush_interval: Duration,
    /// Log integrity cadence
    rebuild_interval: Duration,
    /// Gossip re-request cadence
    gossip_interval: Duration,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".parse().unwrap(),
            data_dir: PathBuf::from("~/.bog/data"),
            peers: Vec::new(),
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            rebuild_interval: DEFAULT_REBUILD_INTERVAL,
            gossip_interval: bog_gossip::DEFAULT_TICK_INTERVAL,
        }
    }
}

/// Load configuration from TOML file.
fn load_config(path: &PathBuf) -> Result<DaemonConfig> {
    let path = expand_tilde(path);

    if !path.exists() {
        info!("No config file found at {:?}, using defaults", path);
        return Ok(DaemonConfig::default());
    }

    let content = std::fs::read_to_string(&path).context("Failed to read config file")?;
    let toml: toml::Value = content.parse().context("Failed to parse config file")?;

    let mut config = DaemonConfig::default();

    if let Some(network) = toml.get("network") {
        if let Some(listen) = network.get("listen").and_then(|v| v.as_str()) {
            config.listen_addr = listen.parse().context("Invalid listen address")?;
        }
        if let Some(peers) = network.get("peers").and_then(|v| v.as_array()) {
            config.peers = peers
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect();
        }
    }

    if let Some(storage) = toml.get("storage") {
        if let Some(data_dir) = storage.get("data_dir").and_then(|v| v.as_str()) {
            config.data_dir = PathBuf::from(data_dir);
        }
    }

    if let Some(timers) = toml.get("timers") {
        if let Some(secs) = timers.get("flush_secs").and_then(|v| v.as_integer()) {
            config.flush_interval = Duration::from_secs(secs as u64);
        }
        if let Some(secs) = timers.get("rebuild_secs").and_then(|v| v.as_integer()) {
            config.rebuild_interval = Duration::from_secs(secs as u64);
        }
        if let Some(secs) = timers.get("gossip_secs").and_then(|v| v.as_integer()) {
            config.gossip_interval = Duration::from_secs(secs as u64);
        }
    }

    Ok(config)
}

/// Expand ~ to home directory.
fn expand_tilde(path: &PathBuf) -> PathBuf {
    let s = path.to_string_lossy();
    if s.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(&s[2..]);
        }
    }
    path.clone()
}

/// Load the persisted identity or generate and persist a fresh one.
fn load_identity(store: &dyn ContentStore) -> Result<Keypair> {
    if let Some(concat) = store.get_text(keys::KEYPAIR)? {
        return Keypair::from_concat(&concat).context("Persisted keypair is invalid");
    }

    info!("Generating new identity");
    let keypair = Keypair::generate();
    store
        .put(keys::KEYPAIR, keypair.to_concat().as_bytes())
        .context("Failed to persist new keypair")?;
    Ok(keypair)
}

/// The assembled node.
struct Node {
    keypair: Keypair,
    log: Arc<LogManager>,
    gossip: Arc<Gossip>,
    peers: Arc<PeerSet>,
    endpoint: Arc<Endpoint>,
}

impl Node {
    /// Opens storage under `data_dir` and wires all components.
    fn open(data_dir: &PathBuf) -> Result<Self> {
        let data_dir = expand_tilde(data_dir);
        std::fs::create_dir_all(&data_dir).context("Failed to create data directory")?;

        let store: Arc<dyn ContentStore> =
            Arc::new(RocksStore::open(&data_dir).context("Failed to open content store")?);
        let keypair = load_identity(store.as_ref())?;

        let log = Arc::new(LogManager::new(store.clone()));
        if let Err(e) = log.load() {
            warn!("Failed to load persisted log, starting fresh: {e}");
        }

        let gossip = Arc::new(Gossip::new(Arc::new(StoreProbe(store.clone()))));
        let peers = Arc::new(PeerSet::new());
        let endpoint = Arc::new(Endpoint::new(
            store,
            log.clone(),
            gossip.clone(),
            peers.clone(),
        ));

        Ok(Self {
            keypair,
            log,
            gossip,
            peers,
            endpoint,
        })
    }

    /// Dials every configured peer, best-effort.
    async fn dial_peers(&self, urls: &[String]) {
        for url in urls {
            match dial::connect(self.endpoint.clone(), url).await {
                Ok(_) => {}
                Err(e) => warn!("Failed to connect to {url}: {e}"),
            }
        }
    }

    /// Prints the local identity and log summary.
    fn print_status(&self) {
        println!("Bog Node Status");
        println!("===============");
        println!();
        println!("Identity: {}", self.keypair.pubkey());
        println!();
        let entries = self.log.entries();
        println!("Log:");
        println!("  Entries: {}", entries.len());
        println!("  Authors: {}", self.log.pubkeys().len());
        println!("  Missing content: {}", self.gossip.missing_len());
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = load_config(&cli.config)?;

    match cli.command.unwrap_or(Commands::Run { listen: None }) {
        Commands::Run { listen } => {
            if let Some(addr) = listen {
                config.listen_addr = addr;
            }

            info!("Starting bog daemon");
            info!("Listen address: {}", config.listen_addr);
            info!("Data directory: {:?}", expand_tilde(&config.data_dir));

            let node = Node::open(&config.data_dir)?;
            info!("Identity: {}", node.keypair.pubkey());

            let app = http::router(node.endpoint.clone());
            let listener = tokio::net::TcpListener::bind(config.listen_addr)
                .await
                .context("Failed to bind listen address")?;
            tokio::spawn(async move {
                if let Err(e) = axum::serve(listener, app).await {
                    error!("Listener failed: {e}");
                }
            });

            node.dial_peers(&config.peers).await;

            bog_log::tasks::spawn_flush(node.log.clone(), config.flush_interval);
            bog_log::tasks::spawn_rebuild(node.log.clone(), config.rebuild_interval);
            bog_gossip::spawn_tick(
                node.gossip.clone(),
                node.peers.clone() as Arc<dyn RequestSink>,
                config.gossip_interval,
            );

            println!("bogd running");
            println!("  Identity: {}", node.keypair.pubkey());
            println!("  Listen: {}", config.listen_addr);
            println!();
            println!("Press Ctrl+C to stop");

            signal::ctrl_c()
                .await
                .context("Failed to listen for shutdown signal")?;
            info!("Shutting down");

            // One final flush so nothing accepted since the last tick is lost.
            if let Err(e) = node.log.flush_if_dirty() {
                warn!("Final flush failed: {e}");
            }
            info!("Daemon stopped");
        }

        Commands::Status => {
            let node = Node::open(&config.data_dir)?;
            node.print_status();
        }

        Commands::Publish { body } => {
            let node = Node::open(&config.data_dir)?;
            let hash = node.log.compose(&body, &node.keypair)?;
            node.log.flush_if_dirty()?;
            println!("{hash}");
        }
    }

    Ok(())
}
