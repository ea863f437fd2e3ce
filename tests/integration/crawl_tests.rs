//! Integration tests for the crawler
//!
//! These tests use wiremock to serve profile pages and images, and run the
//! full crawl cycle end-to-end against a scratch data folder.

use avatar_harvest::config::{parse_config, Config};
use avatar_harvest::crawler::{crawl, TaskOutcome};
use avatar_harvest::state::TaskStore;
use avatar_harvest::storage::{DiskMonitor, ManualDisk};
use avatar_harvest::{HarvestError, Site};
use flate2::read::GzDecoder;
use std::fs::File;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ONE_IMAGE_PAGE: &str = r#"<html><body>
    <img src="/img/290_290/face.jpg">
    <img src="/img/120_120/thumb.jpg">
</body></html>"#;

/// Builds a config whose Baihe site points at the mock server
fn create_test_config(
    dir: &Path,
    server_uri: &str,
    threads: u32,
    valid_image_count: u32,
    archive_step: u64,
    checkpoint: &str,
) -> Config {
    let content = format!(
        r#"
task-file = "{dir}/tasks.json"

[crawler]
threads = {threads}
valid-image-count = {valid_image_count}
archive-step = {archive_step}
image-concurrency = 2
checkpoint = "{checkpoint}"
shutdown-grace-secs = 1

[user-agent]
crawler-name = "TestBot"
crawler-version = "1.0.0"
contact-url = "https://example.com/contact"
contact-email = "test@example.com"

[network]
max-retries = 1
initial-backoff-ms = 1
max-backoff-ms = 1
timeout-secs = 5

[paths]
data-folder = "{dir}/data"
archive-folder = "{dir}/archive"

[sites.baihe]
profile-url = "{server_uri}/p/{{id}}"
"#,
        dir = dir.display(),
    );
    parse_config(&content).expect("Test config should be valid")
}

fn write_tasks(dir: &Path, tasks_json: &str) -> Arc<TaskStore> {
    let path = dir.join("tasks.json");
    std::fs::write(&path, tasks_json).unwrap();
    Arc::new(TaskStore::load(&path).unwrap())
}

fn baihe_task(begin: u64, end: u64) -> String {
    format!(
        r#"{{"tasks": [{{"type": "baihe", "data": {{"begin-id": {}, "end-id": {}}}}}]}}"#,
        begin, end
    )
}

/// `begin-id` of the first task as persisted on disk
fn persisted_begin_id(dir: &Path) -> u64 {
    let content = std::fs::read_to_string(dir.join("tasks.json")).unwrap();
    let value: serde_json::Value = serde_json::from_str(&content).unwrap();
    value["tasks"][0]["data"]["begin-id"].as_u64().unwrap()
}

async fn mount_profiles(server: &MockServer, body: &str, delay: Duration) {
    Mock::given(method("GET"))
        .and(path_regex(r"^/p/\d+$"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body)
                .set_delay(delay),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/img/290_290/face.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"JPEG".to_vec()))
        .mount(server)
        .await;
}

async fn profile_requests(server: &MockServer, id: u64) -> usize {
    let wanted = format!("/p/{}", id);
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|request| request.url.path() == wanted)
        .count()
}

fn unlimited_disk() -> Arc<dyn DiskMonitor> {
    Arc::new(ManualDisk::unlimited())
}

/// A disk that reports low space from the `healthy_checks + 1`-th check on
struct FillingDisk {
    checks: AtomicU64,
    healthy_checks: u64,
}

impl DiskMonitor for FillingDisk {
    fn available_bytes(&self) -> u64 {
        let seen = self.checks.fetch_add(1, Ordering::SeqCst);
        if seen < self.healthy_checks {
            u64::MAX
        } else {
            0
        }
    }

    fn min_free_bytes(&self) -> u64 {
        1024
    }
}

#[tokio::test]
async fn test_finished_range_is_archived() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_profiles(&server, ONE_IMAGE_PAGE, Duration::ZERO).await;

    let config = create_test_config(dir.path(), &server.uri(), 3, 1, 10, "completed");
    let store = write_tasks(dir.path(), &baihe_task(100, 110));

    let reports = crawl(&config, store, unlimited_disk(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].outcome, TaskOutcome::Completed);
    assert_eq!(reports[0].stats.saved, 10);

    let archive = dir.path().join("archive/Baihe/100-109.tar.gz");
    assert!(archive.exists(), "archive should be written");
    assert_eq!(
        std::fs::read_dir(dir.path().join("archive/Baihe"))
            .unwrap()
            .count(),
        1
    );

    let mut reader = tar::Archive::new(GzDecoder::new(File::open(&archive).unwrap()));
    let entries: Vec<String> = reader
        .entries()
        .unwrap()
        .map(|entry| entry.unwrap().path().unwrap().display().to_string())
        .collect();
    assert_eq!(entries.len(), 20);
    assert!(entries.contains(&"0/0/100/100.html".to_string()));
    assert!(entries.contains(&"0/0/109/face.jpg".to_string()));

    // Sources are gone; the stats log stays
    assert!(!dir.path().join("data/Baihe/0").exists());
    let stats = std::fs::read_to_string(dir.path().join("data/Baihe/stats/0.stats")).unwrap();
    assert_eq!(stats.lines().count(), 10);
    assert!(stats.lines().all(|line| line.ends_with("\t1")));

    assert_eq!(persisted_begin_id(dir.path()), 109);
}

#[tokio::test]
async fn test_profile_below_threshold_leaves_nothing() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_profiles(&server, ONE_IMAGE_PAGE, Duration::ZERO).await;

    let config = create_test_config(dir.path(), &server.uri(), 2, 2, 10_000, "completed");
    let store = write_tasks(dir.path(), &baihe_task(7, 8));

    let reports = crawl(&config, store, unlimited_disk(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(reports[0].stats.rejected, 1);
    assert_eq!(reports[0].stats.saved, 0);
    assert!(!dir.path().join("data/Baihe/0/0/7").exists());
    assert!(!dir.path().join("data/Baihe/stats").exists());
}

#[tokio::test]
async fn test_low_disk_pauses_task() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_profiles(&server, ONE_IMAGE_PAGE, Duration::ZERO).await;

    let config = create_test_config(dir.path(), &server.uri(), 4, 1, 10_000, "completed");
    let store = write_tasks(dir.path(), &baihe_task(40, 60));
    let disk = Arc::new(FillingDisk {
        checks: AtomicU64::new(0),
        healthy_checks: 10,
    });

    let reports = crawl(&config, store, disk, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(reports[0].outcome, TaskOutcome::PausedLowDisk { at: 50 });
    assert_eq!(reports[0].stats.saved, 10);
    assert!(persisted_begin_id(dir.path()) < 50);
    assert_eq!(profile_requests(&server, 50).await, 0);
}

#[tokio::test]
async fn test_dispatched_checkpoint_mode() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_profiles(&server, ONE_IMAGE_PAGE, Duration::ZERO).await;

    let config = create_test_config(dir.path(), &server.uri(), 4, 1, 10_000, "dispatched");
    let store = write_tasks(dir.path(), &baihe_task(40, 60));
    let disk = Arc::new(FillingDisk {
        checks: AtomicU64::new(0),
        healthy_checks: 10,
    });

    let reports = crawl(&config, store, disk, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(reports[0].checkpoint, 49);
    assert_eq!(persisted_begin_id(dir.path()), 49);
}

#[tokio::test]
async fn test_restart_resumes_from_checkpoint() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_profiles(&server, ONE_IMAGE_PAGE, Duration::ZERO).await;

    let config = create_test_config(dir.path(), &server.uri(), 4, 1, 10_000, "completed");

    // First run stops before id 50
    let store = write_tasks(dir.path(), &baihe_task(40, 60));
    let disk = Arc::new(FillingDisk {
        checks: AtomicU64::new(0),
        healthy_checks: 10,
    });
    crawl(&config, store, disk, CancellationToken::new())
        .await
        .unwrap();
    let resume_at = persisted_begin_id(dir.path());
    assert_eq!(resume_at, 49);

    // Second run reloads the task file it left behind
    let store = Arc::new(TaskStore::load(&dir.path().join("tasks.json")).unwrap());
    let reports = crawl(&config, store, unlimited_disk(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(reports[0].outcome, TaskOutcome::Completed);
    assert_eq!(profile_requests(&server, 48).await, 1);
    assert_eq!(profile_requests(&server, 49).await, 2);
    assert_eq!(profile_requests(&server, 59).await, 1);
    assert_eq!(persisted_begin_id(dir.path()), 59);
    assert!(dir.path().join("data/Baihe/0/0/59/59.html").exists());
}

#[tokio::test]
async fn test_concurrency_limit_respected() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_profiles(&server, "<html></html>", Duration::from_millis(30)).await;

    let config = create_test_config(dir.path(), &server.uri(), 2, 1, 10_000, "completed");
    let store = write_tasks(dir.path(), &baihe_task(0, 10));

    let reports = crawl(&config, store, unlimited_disk(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(reports[0].stats.rejected, 10);
    assert!(reports[0].peak_concurrency <= 2);
    assert_eq!(server.received_requests().await.unwrap().len(), 10);
}

#[tokio::test]
async fn test_task_without_strategy_fails_loudly() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    let config = create_test_config(dir.path(), &server.uri(), 2, 1, 10_000, "completed");
    let store = write_tasks(
        dir.path(),
        r#"{"tasks": [{"type": "renren", "data": {"begin-id": 1, "end-id": 5}}]}"#,
    );

    let result = crawl(&config, store, unlimited_disk(), CancellationToken::new()).await;

    assert!(matches!(result, Err(HarvestError::UnknownSite(Site::Renren))));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_tasks_run_concurrently_and_persist_together() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_profiles(&server, ONE_IMAGE_PAGE, Duration::ZERO).await;

    let config = create_test_config(dir.path(), &server.uri(), 2, 1, 10_000, "completed");
    let store = write_tasks(
        dir.path(),
        r#"{"tasks": [
            {"type": "baihe", "data": {"begin-id": 0, "end-id": 5}},
            {"type": "baihe", "data": {"begin-id": 2000, "end-id": 2005}}
        ]}"#,
    );

    let reports = crawl(&config, store, unlimited_disk(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(reports.len(), 2);
    assert!(reports
        .iter()
        .all(|report| report.outcome == TaskOutcome::Completed));

    let content = std::fs::read_to_string(dir.path().join("tasks.json")).unwrap();
    let value: serde_json::Value = serde_json::from_str(&content).unwrap();
    assert_eq!(value["tasks"][0]["data"]["begin-id"].as_u64(), Some(4));
    assert_eq!(value["tasks"][1]["data"]["begin-id"].as_u64(), Some(2004));
    assert_eq!(value["tasks"][1]["type"].as_str(), Some("baihe"));
}

#[tokio::test]
async fn test_range_ending_off_boundary_is_not_archived() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_profiles(&server, ONE_IMAGE_PAGE, Duration::ZERO).await;

    let config = create_test_config(dir.path(), &server.uri(), 2, 1, 10, "completed");
    let store = write_tasks(dir.path(), &baihe_task(100, 105));

    let reports = crawl(&config, store, unlimited_disk(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(reports[0].outcome, TaskOutcome::Completed);
    assert_eq!(reports[0].stats.saved, 5);
    // The trailing partial range is left for --sweep
    assert!(!dir.path().join("archive").exists());
    assert!(dir.path().join("data/Baihe/0/0/104/104.html").exists());
}

#[tokio::test]
async fn test_empty_task_sends_no_requests() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_profiles(&server, ONE_IMAGE_PAGE, Duration::ZERO).await;

    let config = create_test_config(dir.path(), &server.uri(), 2, 1, 10, "completed");
    let store = write_tasks(dir.path(), &baihe_task(30, 20));

    let reports = crawl(&config, store, unlimited_disk(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(reports[0].outcome, TaskOutcome::Completed);
    assert_eq!(reports[0].checkpoint, 30);
    assert!(server.received_requests().await.unwrap().is_empty());
    assert!(!dir.path().join("data").exists());
}

#[tokio::test]
async fn test_archive_failure_does_not_stop_crawl() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_profiles(&server, ONE_IMAGE_PAGE, Duration::ZERO).await;

    let config = create_test_config(dir.path(), &server.uri(), 2, 1, 10, "completed");
    let store = write_tasks(dir.path(), &baihe_task(0, 20));

    // A regular file where the archive folder should be
    std::fs::write(dir.path().join("archive"), b"in the way").unwrap();

    let reports = crawl(&config, store, unlimited_disk(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(reports[0].outcome, TaskOutcome::Completed);
    assert_eq!(reports[0].stats.saved, 20);
    assert_eq!(profile_requests(&server, 19).await, 1);
    assert!(dir.path().join("data/Baihe/0/0/0/0.html").exists());
    assert!(dir.path().join("data/Baihe/0/0/19/19.html").exists());
    assert_eq!(persisted_begin_id(dir.path()), 19);
}
