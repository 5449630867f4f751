use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn catsync_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("catsync");
    path
}

/// Temp workspace with a config pointing at `engine_url` and a three-item
/// catalog file. Returns (tmp, config path, catalog path).
fn setup_test_env(engine_url: &str) -> (TempDir, PathBuf, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let (protocol, rest) = engine_url.split_once("://").unwrap();
    let (host, port) = rest.trim_end_matches('/').rsplit_once(':').unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/catsync.sqlite"

[engine]
protocol = "{protocol}"
host = "{host}"
port = {port}
api_key = "test-key"
timeout_secs = 1

[collection]
name = "products"
environment = "test"

[indexing]
batch_size = 10

[search]
timezone = "America/New_York"
"#,
        root = root.display(),
    );

    let config_path = config_dir.join("catsync.toml");
    fs::write(&config_path, config_content).unwrap();

    let catalog_path = root.join("catalog.json");
    fs::write(
        &catalog_path,
        r#"[
  {
    "id": "101",
    "title": "Amazing Fantasy #15",
    "price": 1200.0,
    "categories": ["comics"],
    "attribute_terms": ["CGC 4.0"],
    "created_at": "2024-01-03T10:00:00Z"
  },
  {
    "id": "102",
    "title": "Tales of Suspense #39",
    "kind": "auction",
    "categories": ["comics"],
    "created_at": "2024-01-02T10:00:00Z",
    "auction": {
      "dates_from": "2024-06-15 09:00:00",
      "dates_to": "2024-06-22 21:00:00",
      "start_price": 250.0,
      "has_started": true
    }
  },
  {
    "id": "103",
    "title": "Draft listing",
    "status": "draft",
    "created_at": "2024-01-01T10:00:00Z"
  }
]"#,
    )
    .unwrap();

    (tmp, config_path, catalog_path)
}

fn run_catsync(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = catsync_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("CATSYNC_ENGINE_API_KEY")
        .env("RUST_LOG", "warn")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run catsync binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

/// Run the binary off the async runtime so a wiremock server in this
/// process keeps serving.
async fn run_catsync_async(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let config_path = config_path.to_path_buf();
    let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
    tokio::task::spawn_blocking(move || {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        run_catsync(&config_path, &args)
    })
    .await
    .unwrap()
}

const UNREACHABLE: &str = "http://127.0.0.1:9";

#[test]
fn test_init_creates_database() {
    let (tmp, config_path, _) = setup_test_env(UNREACHABLE);

    let (stdout, stderr, success) = run_catsync(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/catsync.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path, _) = setup_test_env(UNREACHABLE);

    let (_, _, success1) = run_catsync(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_catsync(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_catalog_import_and_status() {
    let (_tmp, config_path, catalog_path) = setup_test_env(UNREACHABLE);

    run_catsync(&config_path, &["init"]);
    let (stdout, stderr, success) = run_catsync(
        &config_path,
        &["catalog", "import", catalog_path.to_str().unwrap()],
    );
    assert!(success, "import failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Imported 3 catalog item(s)."));

    let (stdout, stderr, success) = run_catsync(&config_path, &["status"]);
    assert!(success, "status failed: stdout={}, stderr={}", stdout, stderr);

    let status: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(status["collection"], "products_test");
    assert_eq!(status["complete"], false);
    assert_eq!(status["indexed_count"], 0);
    // The draft listing is not eligible.
    assert_eq!(status["remaining"], 2);
    assert_eq!(status["state"], "idle");
}

#[test]
fn test_import_is_idempotent() {
    let (_tmp, config_path, catalog_path) = setup_test_env(UNREACHABLE);
    let file = catalog_path.to_str().unwrap();

    run_catsync(&config_path, &["catalog", "import", file]);
    run_catsync(&config_path, &["catalog", "import", file]);

    let (stdout, _, _) = run_catsync(&config_path, &["status"]);
    let status: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(status["remaining"], 2);
}

#[test]
fn test_tick_against_unreachable_engine_fails() {
    let (_tmp, config_path, catalog_path) = setup_test_env(UNREACHABLE);
    run_catsync(
        &config_path,
        &["catalog", "import", catalog_path.to_str().unwrap()],
    );

    let (stdout, stderr, success) = run_catsync(&config_path, &["tick"]);
    assert!(!success, "tick should fail: stdout={}", stdout);

    let report: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(report["status"], "error");
    assert_eq!(report["remaining"], 2);
    assert!(
        report["message"]
            .as_str()
            .unwrap()
            .starts_with("Error creating collection"),
        "stderr={}",
        stderr
    );
}

#[test]
fn test_tick_rejects_zero_batch_size() {
    let (_tmp, config_path, _) = setup_test_env(UNREACHABLE);

    let (_, stderr, success) = run_catsync(&config_path, &["tick", "--batch-size", "0"]);
    assert!(!success);
    assert!(stderr.contains("--batch-size must be > 0"));
}

#[test]
fn test_ping_unreachable_engine() {
    let (_tmp, config_path, _) = setup_test_env(UNREACHABLE);

    let (_, stderr, success) = run_catsync(&config_path, &["ping"]);
    assert!(!success);
    assert!(stderr.contains("Connection failed"));
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_catsync(&tmp.path().join("nope.toml"), &["status"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}

#[test]
fn test_invalid_timezone_rejected() {
    let (_tmp, config_path, _) = setup_test_env(UNREACHABLE);
    let content = fs::read_to_string(&config_path)
        .unwrap()
        .replace("America/New_York", "Mars/Olympus_Mons");
    fs::write(&config_path, content).unwrap();

    let (_, stderr, success) = run_catsync(&config_path, &["status"]);
    assert!(!success);
    assert!(stderr.contains("timezone"), "stderr={}", stderr);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_index_runs_to_completion_against_engine() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/collections"))
        .respond_with(
            ResponseTemplate::new(409)
                .set_body_json(serde_json::json!({"message": "A collection with name `products_test` already exists."})),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/collections/products_test/documents"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({})))
        .expect(2)
        .mount(&server)
        .await;

    let (_tmp, config_path, catalog_path) = setup_test_env(&server.uri());
    run_catsync_async(
        &config_path,
        &["catalog", "import", catalog_path.to_str().unwrap()],
    )
    .await;

    let (stdout, stderr, success) =
        run_catsync_async(&config_path, &["index", "--progress", "json"]).await;
    assert!(success, "index failed: stdout={}, stderr={}", stdout, stderr);

    let summary: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(summary["status"], "complete");
    assert_eq!(summary["indexed"], 2);
    assert_eq!(summary["failed"], 0);
    assert_eq!(summary["ticks"], 2);
    assert!(stderr.contains("\"total\":2"), "stderr={}", stderr);

    let (stdout, _, success) = run_catsync_async(&config_path, &["status"]).await;
    assert!(success);
    let status: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(status["complete"], true);
    assert_eq!(status["indexed_count"], 2);
    assert_eq!(status["state"], "complete");

    // Complete collections short-circuit: no further document writes.
    let (stdout, _, success) = run_catsync_async(&config_path, &["tick"]).await;
    assert!(success);
    let report: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(report["status"], "complete");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_search_prints_listing_and_total() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/collections/products_test/documents/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "found": 60,
            "hits": [
                {"document": {"id": "102"}},
                {"document": {"id": "999"}},
                {"document": {"id": "101"}}
            ]
        })))
        .mount(&server)
        .await;

    let (_tmp, config_path, catalog_path) = setup_test_env(&server.uri());
    run_catsync_async(
        &config_path,
        &["catalog", "import", catalog_path.to_str().unwrap()],
    )
    .await;

    let (stdout, stderr, success) = run_catsync_async(
        &config_path,
        &["search", "suspense", "--sort", "price", "--page", "2"],
    )
    .await;
    assert!(success, "search failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("1. 102  Tales of Suspense #39"));
    assert!(stdout.contains("2. 101  Amazing Fantasy #15"));
    assert!(!stdout.contains("999"));
    assert!(stdout.contains("Total listings: 60  (page 2 of 2)"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_live_search_prints_suggestions() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/collections/products_test/documents/search"))
        .and(query_param("q", "suspense"))
        .and(query_param("per_page", "5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "found": 2,
            "hits": [
                {"document": {"id": "102"}},
                {"document": {"id": "101"}}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (_tmp, config_path, catalog_path) = setup_test_env(&server.uri());
    run_catsync_async(
        &config_path,
        &["catalog", "import", catalog_path.to_str().unwrap()],
    )
    .await;

    let (stdout, stderr, success) =
        run_catsync_async(&config_path, &["search", "--live", "suspense"]).await;
    assert!(success, "live search failed: stdout={}, stderr={}", stdout, stderr);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(
        lines,
        vec!["102  Tales of Suspense #39", "101  Amazing Fantasy #15  1200.00"]
    );

    let (stdout, _, success) = run_catsync_async(&config_path, &["search", "--live", "  "]).await;
    assert!(success);
    assert_eq!(stdout.trim(), "No results found.");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_catalog_status_change_removes_document() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/collections/products_test/documents/101"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "101"})))
        .expect(1)
        .mount(&server)
        .await;

    let (_tmp, config_path, catalog_path) = setup_test_env(&server.uri());
    run_catsync_async(
        &config_path,
        &["catalog", "import", catalog_path.to_str().unwrap()],
    )
    .await;

    let (stdout, stderr, success) =
        run_catsync_async(&config_path, &["catalog", "set-status", "101", "draft"]).await;
    assert!(success, "set-status failed: stdout={}, stderr={}", stdout, stderr);
    let result: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(result["outcome"], "removed");
    assert_eq!(result["status"], "draft");

    let (stdout, _, _) = run_catsync_async(&config_path, &["status"]).await;
    let status: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(status["remaining"], 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_catalog_delete_removes_item_once() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/collections/products_test/documents/102"))
        .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({"message": "Not Found"})))
        .expect(1)
        .mount(&server)
        .await;

    let (_tmp, config_path, catalog_path) = setup_test_env(&server.uri());
    run_catsync_async(
        &config_path,
        &["catalog", "import", catalog_path.to_str().unwrap()],
    )
    .await;

    let (stdout, stderr, success) =
        run_catsync_async(&config_path, &["catalog", "delete", "102"]).await;
    assert!(success, "delete failed: stdout={}, stderr={}", stdout, stderr);
    let result: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(result["deleted"], true);
    assert_eq!(result["removed"], false);

    let (_, stderr, success) = run_catsync_async(&config_path, &["catalog", "delete", "102"]).await;
    assert!(!success);
    assert!(stderr.contains("No catalog item with id '102'"));
}
