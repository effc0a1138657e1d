//! Shared helpers for integration tests: ephemeral mock API servers and
//! retry policies that keep tests fast.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;

use hnkeep::retry::RetryPolicy;

/// Serves `router` on an ephemeral local port for the lifetime of the test.
pub async fn spawn_server(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("test listener addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("test server");
    });
    addr
}

/// Base URL for a spawned test server.
pub fn base_url(addr: SocketAddr) -> String {
    format!("http://{addr}")
}

/// Retries with negligible delays.
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
    }
}

/// No retries at all; the first outcome is final.
pub fn single_attempt() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 1,
        base_delay: Duration::ZERO,
        max_delay: Duration::ZERO,
    }
}
