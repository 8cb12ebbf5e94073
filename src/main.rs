//! socket-io-metrics demo
//!
//! Instruments an in-memory socket.io style server, generates some traffic
//! and serves the resulting metrics until Ctrl-C.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use socket_io_metrics::config::validate;
use socket_io_metrics::{Config, SocketIoMetrics};
use socket_transport::{EventServer, MemoryServer, Namespace, Socket};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Delay before the demo creates its second namespace.
const LATE_NAMESPACE_DELAY: Duration = Duration::from_secs(3);

/// Delay before a client joins the second namespace. Connections made before
/// the next rescan would go unobserved.
const LATE_CLIENT_DELAY: Duration = Duration::from_secs(6);

/// Period of the simulated client traffic.
const TRAFFIC_PERIOD: Duration = Duration::from_millis(500);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = if Path::new(&config_path).exists() {
        Config::load(&config_path).map_err(|e| {
            error!(path = %config_path, error = %e, "Failed to load config");
            e
        })?
    } else {
        info!(path = %config_path, "Config file not found, using defaults");
        let mut config = Config::default();
        config.exporter.enabled = true;
        config
    };

    if let Err(errors) = validate(&config) {
        for e in &errors {
            error!(error = %e, "Invalid configuration");
        }
        return Err(anyhow::anyhow!("{} configuration error(s)", errors.len()));
    }
    if !config.exporter.enabled {
        info!("Exporter disabled; metrics are printed on shutdown only");
    }

    let server = MemoryServer::new();
    server.of("/");

    let handle: Arc<dyn EventServer> = Arc::new(server.clone());
    let metrics = SocketIoMetrics::start(handle, &config)?;

    let stop = CancellationToken::new();
    let traffic = tokio::spawn(simulate_traffic(server.clone(), stop.clone()));

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    stop.cancel();
    if let Err(e) = traffic.await {
        error!(error = %e, "Traffic simulation failed");
    }

    if !config.exporter.enabled {
        print!("{}", metrics.gather_text());
    }
    metrics.shutdown().await;
    Ok(())
}

/// Connects a few clients to "/", adds "/chat" after a delay and keeps both
/// namespaces busy until `stop` is cancelled.
async fn simulate_traffic(server: MemoryServer, stop: CancellationToken) {
    let root = server.of("/");
    let mut clients = Vec::new();
    for i in 0..3 {
        match root.connect(&format!("client-{i}")) {
            Ok(socket) => clients.push(socket),
            Err(e) => error!(error = %e, "Failed to connect demo client"),
        }
    }

    let started = tokio::time::Instant::now();
    let mut chat_nsp = None;
    let mut chat = None;
    let mut interval = tokio::time::interval(TRAFFIC_PERIOD);
    let mut tick: u64 = 0;

    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = interval.tick() => {}
        }
        tick += 1;

        for socket in &clients {
            socket.emit("ping", &[json!("hi")]);
            socket.receive("pong", &[json!({ "tick": tick })]);
        }
        root.emit("news", &[json!({ "headline": "tick", "seq": tick })]);

        let elapsed = started.elapsed();
        if chat_nsp.is_none() && elapsed >= LATE_NAMESPACE_DELAY {
            let nsp = server.of("/chat");
            info!(namespace = %nsp.name(), "Created namespace");
            chat_nsp = Some(nsp);
        }
        if chat.is_none() && elapsed >= LATE_CLIENT_DELAY {
            chat = chat_nsp.as_ref().and_then(|nsp| nsp.connect("chatter").ok());
        }
        if let Some(socket) = &chat {
            socket.receive("message", &[json!("hello"), json!(tick)]);
            if tick % 10 == 0 {
                socket.receive("error", &[json!("simulated failure")]);
            }
        }

        if tick % 20 == 0 {
            if let Some(socket) = clients.pop() {
                socket.disconnect("client namespace disconnect");
            }
        }
    }

    for socket in clients.into_iter().chain(chat) {
        socket.disconnect("server shutting down");
    }
}
