//! Room relay and WebRTC signaling server.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin agora-server
//! cargo run --bin agora-server -- --host 0.0.0.0 --port 3000
//! AGORA_OUTBOUND_CAPACITY=256 cargo run --bin agora-server
//! ```

use std::{sync::Arc, time::Duration};

use agora_server::{
    config::{ConnectionConfig, HubConfig},
    hub::Hub,
    infrastructure::store::InMemoryMessageStore,
    ui::Server,
};
use agora_shared::{
    logger::setup_logger,
    time::{Clock, SystemClock},
};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "agora-server")]
#[command(about = "Room relay and WebRTC signaling hub over WebSocket", long_about = None)]
struct Args {
    /// Host address to bind the server to
    #[arg(short = 'H', long, env = "AGORA_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port number to bind the server to
    #[arg(short = 'p', long, env = "AGORA_PORT", default_value = "8080")]
    port: u16,

    /// Default log level when RUST_LOG is not set
    #[arg(long, env = "AGORA_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Capacity of each hub intake channel
    #[arg(long, env = "AGORA_INTAKE_CAPACITY", default_value_t = HubConfig::default().intake_capacity)]
    intake_capacity: usize,

    /// Outbound queue capacity per connection
    #[arg(long, env = "AGORA_OUTBOUND_CAPACITY", default_value_t = ConnectionConfig::default().outbound_capacity)]
    outbound_capacity: usize,

    /// Largest accepted inbound frame, in bytes
    #[arg(long, env = "AGORA_MAX_MESSAGE_SIZE", default_value_t = ConnectionConfig::default().max_message_size)]
    max_message_size: usize,

    /// Seconds between liveness probes
    #[arg(long, env = "AGORA_PING_INTERVAL", default_value_t = ConnectionConfig::default().ping_interval.as_secs())]
    ping_interval_secs: u64,

    /// Seconds of inbound silence before a connection is dropped
    #[arg(long, env = "AGORA_READ_TIMEOUT", default_value_t = ConnectionConfig::default().read_timeout.as_secs())]
    read_timeout_secs: u64,

    /// Seconds a single outbound write may take
    #[arg(long, env = "AGORA_WRITE_TIMEOUT", default_value_t = ConnectionConfig::default().write_timeout.as_secs())]
    write_timeout_secs: u64,

    /// Seconds a single history write may take
    #[arg(long, env = "AGORA_PERSIST_TIMEOUT", default_value_t = ConnectionConfig::default().persist_timeout.as_secs())]
    persist_timeout_secs: u64,

    /// Chat messages kept in history
    #[arg(long, env = "AGORA_HISTORY_CAPACITY", default_value_t = 1000)]
    history_capacity: usize,
}

impl Args {
    fn hub_config(&self) -> HubConfig {
        HubConfig {
            intake_capacity: self.intake_capacity,
        }
    }

    fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            outbound_capacity: self.outbound_capacity,
            max_message_size: self.max_message_size,
            ping_interval: Duration::from_secs(self.ping_interval_secs),
            read_timeout: Duration::from_secs(self.read_timeout_secs),
            write_timeout: Duration::from_secs(self.write_timeout_secs),
            persist_timeout: Duration::from_secs(self.persist_timeout_secs),
        }
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    setup_logger(env!("CARGO_BIN_NAME"), &args.log_level);

    let hub_config = args.hub_config();
    let connection_config = args.connection_config();
    if let Err(e) = hub_config
        .validate()
        .and_then(|_| connection_config.validate())
    {
        tracing::error!("Invalid configuration: {}", e);
        std::process::exit(1);
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = Arc::new(InMemoryMessageStore::new(args.history_capacity, clock.clone()));
    let (hub, hub_task) = Hub::spawn(hub_config, clock.clone());

    let server = Server::new(hub.clone(), store, clock, connection_config);
    if let Err(e) = server.run(args.host, args.port).await {
        tracing::error!("Server error: {}", e);
        hub.stop();
        std::process::exit(1);
    }

    hub.stop();
    if let Err(e) = hub_task.await {
        tracing::error!("Hub task failed: {}", e);
    }
}
