use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::io::AsyncWriteExt;

use localdrop::config::Config;
use localdrop::registry::{FileRegistry, SessionRegistry, TransferRecord};
use localdrop::server::{Server, ServerError, ServerState};
use localdrop::storage::LocalStorage;
use localdrop::AppState;

const LOOPBACK: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

fn test_server(dir: &tempfile::TempDir, port: u16) -> Server {
    let mut config = Config::default();
    config.server.bind_host = LOOPBACK;
    config.server.port = port;
    config.server.advertise_ip = Some(LOOPBACK);
    config.discovery.enabled = false;
    config.storage_dir = dir.path().join("files");

    let storage = LocalStorage::new(&config.storage_dir).unwrap();
    let state = AppState::new(
        config,
        Arc::new(SessionRegistry::new()),
        Arc::new(storage),
    );
    Server::new(Arc::new(state))
}

fn url(addr: SocketAddr, path: &str) -> String {
    format!("http://{addr}{path}")
}

async fn get_json(addr: SocketAddr, path: &str) -> Value {
    reqwest::get(url(addr, path))
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_start_serves_requests() {
    let dir = tempfile::tempdir().unwrap();
    let server = test_server(&dir, 0);
    assert_eq!(server.status().state, ServerState::Stopped);

    let addr = server.start().await.unwrap();
    assert_ne!(addr.port(), 0);
    assert!(server.is_running().await);

    let status = server.status();
    assert_eq!(status.state, ServerState::Running);
    assert_eq!(status.address.port, addr.port());

    let json = get_json(addr, "/api/status").await;
    assert_eq!(json["success"], true);
    assert_eq!(json["port"], addr.port());
    assert_eq!(json["ip"], "127.0.0.1");

    server.stop().await;
}

#[tokio::test]
async fn test_start_and_stop_are_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let server = test_server(&dir, 0);

    let first = server.start().await.unwrap();
    let second = server.start().await.unwrap();
    assert_eq!(first, second);

    server.stop().await;
    server.stop().await;
    assert!(!server.is_running().await);
    assert_eq!(server.status().state, ServerState::Stopped);
}

#[tokio::test]
async fn test_stop_closes_listener() {
    let dir = tempfile::tempdir().unwrap();
    let server = test_server(&dir, 0);
    let addr = server.start().await.unwrap();

    assert!(reqwest::get(url(addr, "/api/status")).await.is_ok());

    server.stop().await;

    // A fresh client so no pooled connection survives the stop.
    let client = reqwest::Client::new();
    assert!(client.get(url(addr, "/api/status")).send().await.is_err());

    // The port is free again.
    let listener = tokio::net::TcpListener::bind(addr).await;
    assert!(listener.is_ok());
}

#[tokio::test]
async fn test_restart_rebinds() {
    let dir = tempfile::tempdir().unwrap();
    let server = test_server(&dir, 0);
    server.start().await.unwrap();

    let addr = server.restart().await.unwrap();
    assert_eq!(server.status().state, ServerState::Running);

    let json = get_json(addr, "/api/files").await;
    assert_eq!(json["success"], true);

    server.stop().await;
}

#[tokio::test]
async fn test_start_during_drain_keeps_status_consistent() {
    let dir = tempfile::tempdir().unwrap();
    let server = Arc::new(test_server(&dir, 0));
    let addr = server.start().await.unwrap();

    // An upload whose body never completes keeps the old listener draining.
    let mut stalled = tokio::net::TcpStream::connect(addr).await.unwrap();
    stalled
        .write_all(
            b"POST /api/upload HTTP/1.1\r\n\
Host: localhost\r\n\
Content-Type: application/json\r\n\
Content-Length: 1000\r\n\
\r\n\
{\"data\":",
        )
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let stopping = tokio::spawn({
        let server = Arc::clone(&server);
        async move { server.stop().await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let starting = tokio::spawn({
        let server = Arc::clone(&server);
        async move { server.start().await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    drop(stalled);

    stopping.await.unwrap();
    let new_addr = starting.await.unwrap().unwrap();

    assert!(server.is_running().await);
    assert_eq!(server.status().state, ServerState::Running);
    assert_eq!(server.status().address.port, new_addr.port());

    let json = get_json(new_addr, "/api/status").await;
    assert_eq!(json["success"], true);

    server.stop().await;
    assert_eq!(server.status().state, ServerState::Stopped);
}

#[tokio::test]
async fn test_bind_failure_reports_error() {
    let dir = tempfile::tempdir().unwrap();
    let taken = std::net::TcpListener::bind((LOOPBACK, 0)).unwrap();
    let port = taken.local_addr().unwrap().port();

    let server = test_server(&dir, port);
    let err = server.start().await.unwrap_err();
    assert!(matches!(err, ServerError::Bind { addr, .. } if addr.port() == port));

    assert!(!server.is_running().await);
    assert_eq!(server.status().state, ServerState::Stopped);
}

#[tokio::test]
async fn test_status_updates_are_published() {
    let dir = tempfile::tempdir().unwrap();
    let server = test_server(&dir, 0);
    let mut updates = server.subscribe();

    let addr = server.start().await.unwrap();

    // The configured address is published as soon as the listener is up.
    let status = *updates
        .wait_for(|s| s.advertisable().is_some())
        .await
        .unwrap();
    assert_eq!(status.advertisable(), Some((LOOPBACK, addr.port())));

    server.stop().await;
    let status = *updates
        .wait_for(|s| s.state == ServerState::Stopped)
        .await
        .unwrap();
    assert_eq!(status.advertisable(), None);
}

#[tokio::test]
async fn test_registry_changes_visible_without_restart() {
    let dir = tempfile::tempdir().unwrap();
    let server = test_server(&dir, 0);
    let addr = server.start().await.unwrap();
    let registry = Arc::clone(&server.state().registry);

    let mut ids = Vec::new();
    for i in 0..20 {
        let path = dir.path().join(format!("shared-{i}.txt"));
        std::fs::write(&path, format!("file {i}")).unwrap();
        let record = TransferRecord::shared_from_path(&path).unwrap();
        ids.push(record.id.clone());
        registry.add(record);

        let json = get_json(addr, "/api/files").await;
        let listed: Vec<&str> = json["files"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f["id"].as_str().unwrap())
            .collect();
        assert_eq!(listed, ids);
    }

    let removed = ids.remove(0);
    registry.remove(&removed);
    let json = get_json(addr, "/api/files").await;
    assert_eq!(json["files"].as_array().unwrap().len(), ids.len());

    let response = reqwest::get(url(addr, &format!("/api/files/{removed}")))
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);

    server.stop().await;
}

#[tokio::test]
async fn test_browser_upload_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let server = test_server(&dir, 0);
    let addr = server.start().await.unwrap();

    let payload: Vec<u8> = (0..4096u32).map(|i| (i % 251) as u8).collect();
    let form = reqwest::multipart::Form::new().part(
        "file",
        reqwest::multipart::Part::bytes(payload.clone())
            .file_name("photo.jpg")
            .mime_str("image/jpeg")
            .unwrap(),
    );

    let client = reqwest::Client::new();
    let json: Value = client
        .post(url(addr, "/api/upload"))
        .multipart(form)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["file"]["name"], "photo.jpg");
    assert_eq!(json["file"]["mimeType"], "image/jpeg");
    assert_eq!(json["file"]["size"], payload.len());

    let id = json["file"]["id"].as_str().unwrap().to_string();
    assert!(server.state().registry.get(&id).is_some());

    let response = client
        .get(url(addr, &format!("/api/files/{id}")))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(
        response.headers()["access-control-allow-origin"],
        "*"
    );
    assert_eq!(response.bytes().await.unwrap().as_ref(), payload.as_slice());

    server.stop().await;
}
