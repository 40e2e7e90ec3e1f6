//! Quill relay server binary.
//!
//! Holds the canonical text for one shared buffer and relays every
//! accepted update to the connected editors.

use clap::Parser;
use log::info;

use quill_collab::protocol::ENDPOINT_PATH;
use quill_collab::server::{ServerConfig, SyncServer};

/// Relay server command line arguments.
#[derive(Parser, Debug)]
#[command(name = "quill-server")]
#[command(about = "Relay server for a shared Quill text buffer")]
struct Args {
    /// Address to listen on
    #[arg(short, long, default_value = "127.0.0.1:8080", value_name = "ADDR")]
    bind: String,

    /// WebSocket endpoint path
    #[arg(long, default_value = ENDPOINT_PATH)]
    path: String,

    /// Initial canonical text
    #[arg(long, default_value = "")]
    text: String,

    /// Connections beyond this are closed on arrival
    #[arg(long, default_value_t = 100)]
    max_peers: usize,

    /// Frames buffered per peer before it starts skipping
    #[arg(long, default_value_t = 256)]
    broadcast_capacity: usize,

    /// Send the resulting text back to the peer that sent the update
    #[arg(long)]
    echo_to_sender: bool,

    /// Largest canonical text accepted, in chars
    #[arg(long, default_value_t = 1 << 20)]
    max_text_len: usize,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl From<&Args> for ServerConfig {
    fn from(args: &Args) -> Self {
        Self {
            bind_addr: args.bind.clone(),
            endpoint_path: args.path.clone(),
            max_peers: args.max_peers,
            broadcast_capacity: args.broadcast_capacity,
            echo_to_sender: args.echo_to_sender,
            max_text_len: args.max_text_len,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();

    // RUST_LOG wins over --verbose when set
    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    info!("Starting quill-server");

    let server = SyncServer::with_text(ServerConfig::from(&args), &args.text);
    server.run().await
}
