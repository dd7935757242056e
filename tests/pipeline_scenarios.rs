//! End-to-end pipeline scenarios against mock API and origin servers.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use wishlist_core::{Config, Identifier, Pipeline};

fn config_for(work_dir: &Path, server: &MockServer) -> Config {
    Config {
        api_base: format!("{}/api/v1/w", server.uri()),
        work_dir: work_dir.to_path_buf(),
        rate_limit_permits: 45,
        rate_limit_window_secs: 1,
        download_timeout_secs: 1,
        resolve_timeout_secs: 5,
        connect_timeout_secs: 5,
        ..Config::default()
    }
}

async fn mount_resolution(server: &MockServer, id: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/api/v1/w/{id}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "id": id, "path": format!("{}/full/{id}.jpg", server.uri()) }
        })))
        .mount(server)
        .await;
}

async fn mount_resolution_status(server: &MockServer, id: &str, status: u16) {
    Mock::given(method("GET"))
        .and(path(format!("/api/v1/w/{id}")))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

async fn mount_file(server: &MockServer, id: &str, delay: Option<Duration>) {
    let mut template = ResponseTemplate::new(200).set_body_bytes(format!("image {id}").into_bytes());
    if let Some(delay) = delay {
        template = template.set_delay(delay);
    }
    Mock::given(method("GET"))
        .and(path(format!("/full/{id}.jpg")))
        .respond_with(template)
        .mount(server)
        .await;
}

fn failure_ids(work_dir: &Path) -> Vec<String> {
    fs::read_to_string(work_dir.join("fails.txt"))
        .unwrap_or_default()
        .lines()
        .filter_map(Identifier::from_line)
        .map(|id| id.as_str().to_string())
        .collect()
}

fn downloaded_files(work_dir: &Path) -> Vec<String> {
    let dir = work_dir.join("wallhaven_download");
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_run_saved_timeout_and_rate_limited() {
    let server = MockServer::start().await;
    let temp = TempDir::new().expect("failed to create temp dir");
    let work_dir = temp.path();

    mount_resolution(&server, "a1").await;
    mount_resolution(&server, "b2").await;
    mount_resolution_status(&server, "c3", 429).await;
    mount_file(&server, "a1", None).await;
    mount_file(&server, "b2", Some(Duration::from_secs(3))).await;

    fs::write(
        work_dir.join("captured_urls_20250101_120000.txt"),
        "[2025-01-01 12:00:00] https://wallhaven.cc/w/a1\n\
         [2025-01-01 12:00:01] https://wallhaven.cc/w/b2\n\
         [2025-01-01 12:00:02] https://wallhaven.cc/w/c3\n",
    )
    .unwrap();

    let pipeline = Pipeline::new(config_for(work_dir, &server)).expect("valid config");
    let summary = pipeline.run().await.expect("run completes");

    assert_eq!(summary.ingest.added, 3);
    assert_eq!(summary.resolve.attempted, 3);
    assert_eq!(summary.resolve.succeeded, 2);
    assert_eq!(summary.resolve.rate_limited, 1);
    assert_eq!(summary.download.attempted(), 2);
    assert_eq!(summary.download.succeeded(), 1);
    assert_eq!(summary.reconcile.completed, 1);

    assert!(!work_dir.join("wishlist.txt").exists(), "pending store removed");
    assert!(!work_dir.join("src_wishlist.csv").exists());
    assert!(!work_dir.join("status_wishlist.csv").exists());
    assert!(!work_dir.join("captured_urls_20250101_120000.txt").exists());

    let mut failed = failure_ids(work_dir);
    failed.sort();
    assert_eq!(failed, vec!["b2".to_string(), "c3".to_string()]);
    assert_eq!(downloaded_files(work_dir), vec!["a1.jpg".to_string()]);
}

#[tokio::test]
async fn test_reconcile_without_logs_leaves_pending_store() {
    let server = MockServer::start().await;
    let temp = TempDir::new().expect("failed to create temp dir");
    let work_dir = temp.path();
    fs::write(work_dir.join("wishlist.txt"), "a1\nb2\n").unwrap();

    let pipeline = Pipeline::new(config_for(work_dir, &server)).expect("valid config");
    let report = pipeline.reconcile().expect("reconcile succeeds");

    assert!(!report.logs_found);
    assert_eq!(
        fs::read_to_string(work_dir.join("wishlist.txt")).unwrap(),
        "a1\nb2\n"
    );
    assert!(!work_dir.join("fails.txt").exists());
}

#[tokio::test]
async fn test_two_runs_with_reseeded_failures() {
    let server = MockServer::start().await;
    let temp = TempDir::new().expect("failed to create temp dir");
    let work_dir = temp.path();

    // First run: x cannot be resolved, y downloads.
    mount_resolution_status(&server, "x", 503).await;
    mount_resolution(&server, "y").await;
    mount_file(&server, "y", None).await;
    fs::write(
        work_dir.join("wishlist.txt"),
        "https://wallhaven.cc/w/x\nhttps://wallhaven.cc/w/y\n",
    )
    .unwrap();

    let pipeline = Pipeline::new(config_for(work_dir, &server)).expect("valid config");
    let first = pipeline.run().await.expect("first run completes");

    assert_eq!(first.reconcile.failed.len(), 1);
    assert_eq!(failure_ids(work_dir), vec!["x".to_string()]);
    assert!(!work_dir.join("wishlist.txt").exists());
    assert_eq!(downloaded_files(work_dir), vec!["y.jpg".to_string()]);

    // Second run: the API recovers and the operator re-queues failures.
    server.reset().await;
    mount_resolution(&server, "x").await;
    mount_file(&server, "x", None).await;

    let ingest = pipeline.ingest(true).expect("reseed succeeds");
    assert!(ingest.reseeded_failures);
    assert_eq!(ingest.added, 1);
    assert!(!work_dir.join("fails.txt").exists());

    let second = pipeline.run().await.expect("second run completes");

    assert_eq!(second.resolve.attempted, 1, "only the re-queued identifier");
    assert_eq!(second.download.succeeded(), 1);
    assert_eq!(second.reconcile.completed, 1);
    assert!(second.reconcile.failed.is_empty());
    assert!(failure_ids(work_dir).is_empty());
    assert!(!work_dir.join("wishlist.txt").exists());
    assert_eq!(
        downloaded_files(work_dir),
        vec!["x.jpg".to_string(), "y.jpg".to_string()]
    );
}

#[tokio::test]
async fn test_run_after_interrupted_run_skips_saved_items() {
    let server = MockServer::start().await;
    let temp = TempDir::new().expect("failed to create temp dir");
    let work_dir = temp.path();
    let uri = server.uri();

    mount_resolution(&server, "b2").await;
    mount_file(&server, "b2", None).await;

    // The previous run stopped after a1 was saved but before reconcile.
    fs::write(
        work_dir.join("wishlist.txt"),
        "https://wallhaven.cc/w/a1\nhttps://wallhaven.cc/w/b2\n",
    )
    .unwrap();
    fs::write(
        work_dir.join("src_wishlist.csv"),
        format!("id,status,url\na1,success,{uri}/full/a1.jpg\nb2,success,{uri}/full/b2.jpg\n"),
    )
    .unwrap();
    fs::write(
        work_dir.join("status_wishlist.csv"),
        format!("id,url,download_status\na1,{uri}/full/a1.jpg,saved\n"),
    )
    .unwrap();

    let pipeline = Pipeline::new(config_for(work_dir, &server)).expect("valid config");
    let summary = pipeline.run().await.expect("run completes");

    assert!(summary.recovered.logs_found);
    assert_eq!(summary.recovered.completed, 1);
    assert_eq!(summary.recovered.kept, 1);
    assert_eq!(summary.resolve.attempted, 1);
    assert_eq!(summary.download.attempted(), 1);
    assert_eq!(summary.reconcile.completed, 1);

    let paths: Vec<String> = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|r| r.url.path().to_string())
        .collect();
    assert_eq!(paths.len(), 2, "got: {paths:?}");
    assert!(paths.iter().all(|p| !p.contains("a1")), "got: {paths:?}");
    assert!(!work_dir.join("wishlist.txt").exists());
    assert!(failure_ids(work_dir).is_empty());
}

#[tokio::test]
async fn test_run_after_interrupted_run_with_nothing_left_pending() {
    let server = MockServer::start().await;
    let temp = TempDir::new().expect("failed to create temp dir");
    let work_dir = temp.path();

    fs::write(work_dir.join("wishlist.txt"), "a1\n").unwrap();
    fs::write(
        work_dir.join("src_wishlist.csv"),
        "id,status,url\na1,success,https://w.example/full/a1.jpg\n",
    )
    .unwrap();
    fs::write(
        work_dir.join("status_wishlist.csv"),
        "id,url,download_status\na1,https://w.example/full/a1.jpg,saved\n",
    )
    .unwrap();

    let pipeline = Pipeline::new(config_for(work_dir, &server)).expect("valid config");
    let summary = pipeline.run().await.expect("run completes");

    assert_eq!(summary.recovered.completed, 1);
    assert_eq!(summary.resolve.attempted, 0);
    assert_eq!(summary.download.attempted(), 0);
    assert!(!summary.reconcile.logs_found);
    assert!(server.received_requests().await.unwrap().is_empty());
    assert!(!work_dir.join("wishlist.txt").exists());
    assert!(!work_dir.join("src_wishlist.csv").exists());
}

#[tokio::test]
async fn test_run_without_any_input_fails() {
    let server = MockServer::start().await;
    let temp = TempDir::new().expect("failed to create temp dir");

    let pipeline = Pipeline::new(config_for(temp.path(), &server)).expect("valid config");
    let err = pipeline.run().await.expect_err("missing pending store is fatal");

    assert!(err.to_string().contains("does not exist"), "got: {err}");
    assert!(server.received_requests().await.unwrap().is_empty());
}
