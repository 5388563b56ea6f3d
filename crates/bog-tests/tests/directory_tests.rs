//! Directory tests against a real listener: HTTP queries over raw sockets
//! and peer replication over an actual WebSocket upgrade.

use std::net::SocketAddr;

use bog_core::{digest, sign_at, Timestamp};
use bog_net::{dial, http};
use bog_store::ContentStore;
use bog_tests::{settle, TestNode};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("bog_tests=debug,bog_net=debug")
        .with_test_writer()
        .try_init();
}

/// Serves a node's directory on an ephemeral port.
async fn serve(node: &TestNode) -> SocketAddr {
    let app = http::router(node.endpoint.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// One HTTP/1.1 request, returning the full response text.
async fn get(addr: SocketAddr, path: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!("GET {path} HTTP/1.1\r\nhost: localhost\r\nconnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    String::from_utf8(response).unwrap()
}

fn body_of(response: &str) -> &str {
    response.split("\r\n\r\n").nth(1).unwrap_or("")
}

#[tokio::test]
async fn test_all_returns_log_as_json() {
    init_tracing();

    let node = TestNode::new();
    node.publish("hello from the directory").unwrap();
    let addr = serve(&node).await;

    let response = get(addr, "/all").await;
    assert!(response.starts_with("HTTP/1.1 200"));
    assert!(response.to_lowercase().contains("access-control-allow-origin: *"));

    let entries: serde_json::Value = serde_json::from_str(body_of(&response)).unwrap();
    let entries = entries.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["text"], "hello from the directory");
    assert_eq!(entries[0]["author"], node.pubkey());
}

#[tokio::test]
async fn test_latest_returns_only_recent_entries() {
    init_tracing();

    let node = TestNode::new();

    // One entry signed well outside the five-minute window.
    let content = digest(b"stale");
    node.store.put(content.as_str(), b"stale").unwrap();
    let old = sign_at(&content, &node.keypair, Timestamp::new(1700000000000));
    assert!(node.log.add(&old).unwrap());

    node.publish("fresh").unwrap();
    let addr = serve(&node).await;

    let response = get(addr, "/latest").await;
    assert!(response.starts_with("HTTP/1.1 200"));
    let entries: serde_json::Value = serde_json::from_str(body_of(&response)).unwrap();
    let entries = entries.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["text"], "fresh");

    // The full log still holds both.
    let response = get(addr, "/all").await;
    let entries: serde_json::Value = serde_json::from_str(body_of(&response)).unwrap();
    assert_eq!(entries.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_author_and_search_queries() {
    init_tracing();

    let node = TestNode::new();
    node.publish("the quick brown fox").unwrap();
    let addr = serve(&node).await;

    let response = get(addr, &format!("/{}", urlencode(&node.pubkey()))).await;
    assert!(response.starts_with("HTTP/1.1 200"));
    let entries: serde_json::Value = serde_json::from_str(body_of(&response)).unwrap();
    assert_eq!(entries.as_array().unwrap().len(), 1);

    // `?` searches body text, case-insensitive, url-encoded.
    let response = get(addr, "/%3FQUICK%20BROWN").await;
    let entries: serde_json::Value = serde_json::from_str(body_of(&response)).unwrap();
    assert_eq!(entries.as_array().unwrap().len(), 1);

    let response = get(addr, "/%3Fnothing%20matches").await;
    let entries: serde_json::Value = serde_json::from_str(body_of(&response)).unwrap();
    assert!(entries.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_blob_and_missing_key() {
    init_tracing();

    let node = TestNode::new();
    let hash = node.publish("raw blob body").unwrap();
    let addr = serve(&node).await;

    // An unknown key that matches nothing is a 404.
    let response = get(addr, "/no-such-key").await;
    assert!(response.starts_with("HTTP/1.1 404"));

    // A known envelope hash answers from the log, not the blob store.
    let response = get(addr, &format!("/{}", urlencode(hash.as_str()))).await;
    assert!(response.starts_with("HTTP/1.1 200"));
    let entries: serde_json::Value = serde_json::from_str(body_of(&response)).unwrap();
    assert_eq!(entries.as_array().unwrap()[0]["hash"], hash.as_str());
}

#[tokio::test]
async fn test_websocket_peer_replication() {
    init_tracing();

    let a = TestNode::new();
    let addr = serve(&a).await;

    let b = TestNode::new();
    dial::connect(b.endpoint.clone(), &format!("ws://{addr}/"))
        .await
        .unwrap();

    b.publish("over the wire").unwrap();
    settle().await;

    let entries = a.log.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].text.as_deref(), Some("over the wire"));
    assert_eq!(entries[0].author, b.pubkey());
    assert_eq!(a.peers.len(), 1);
}

/// Base64 hashes contain `+` and `/`, both of which need escaping in a path.
fn urlencode(s: &str) -> String {
    s.replace('%', "%25")
        .replace('+', "%2B")
        .replace('/', "%2F")
}
