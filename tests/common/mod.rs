//! Shared utilities for integration testing.

use std::net::SocketAddr;

use request_guard::config::GuardConfig;
use request_guard::lifecycle::{self, Shutdown};
use tokio::net::TcpListener;

/// Accept and hold TCP connections, standing in for a datastore.
pub async fn start_fake_datastore() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    addr
}

/// Config bound to an ephemeral port with both datastores faked.
pub async fn test_config() -> GuardConfig {
    let relational = start_fake_datastore().await;
    let document = start_fake_datastore().await;

    let mut config = GuardConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.observability.metrics_enabled = false;
    config.datastores.relational_url = format!("postgres://{relational}/platform");
    config.datastores.document_url = format!("mongodb://{document}/platform");
    config
}

/// Start the full service. Returns its base URL and the shutdown handle.
pub async fn spawn_guard(config: GuardConfig) -> (String, Shutdown) {
    let prepared = lifecycle::prepare(config).await.unwrap();
    let addr = prepared.listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let stop = shutdown.wait();
    tokio::spawn(async move {
        let _ = prepared.server.run(prepared.listener, stop).await;
    });

    (format!("http://{addr}"), shutdown)
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
