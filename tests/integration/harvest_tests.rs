//! Integration tests for the harvester
//!
//! These tests use wiremock to stand up mock hosts and tempfile output
//! roots, and run complete harvests end-to-end. Every sleep goes through a
//! recording sleeper, so backoff and politeness waits cost no wall time.

use chrono::{Duration as ChronoDuration, Utc};
use harvest_engine::config::Config;
use harvest_engine::crawler::RecordingSleeper;
use harvest_engine::output::{RunManifestEntry, RUN_MANIFEST, RUN_SUMMARY};
use harvest_engine::robots::MAX_CRAWL_DELAY_SECS;
use harvest_engine::storage::{
    read_log, reason, DisallowedEntry, FailureEntry, Section, SkipEntry, DISALLOWED_LOG,
    FAILURES_LOG, SKIPPED_LOG,
};
use harvest_engine::{HarvestSummary, Harvester};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), "text/html")
}

fn test_config(root: &Path, seeds: Vec<String>) -> Config {
    let mut config = Config::with_output_root(root);
    config.crawl.seeds = seeds;
    config.crawl.workers = 1;
    config.fetch.user_agent = "harvest-test/1.0".to_string();
    config.fetch.timeout_seconds = 5;
    config
}

async fn run(config: Config, sleeper: &RecordingSleeper) -> HarvestSummary {
    Harvester::new(config)
        .expect("client builds")
        .with_sleeper(Arc::new(sleeper.clone()))
        .run()
        .await
        .expect("harvest completes")
}

fn count_files(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .map(|path| if path.is_dir() { count_files(&path) } else { 1 })
        .sum()
}

fn run_manifest(root: &Path) -> Vec<RunManifestEntry> {
    read_log(&root.join(RUN_MANIFEST)).expect("run manifest readable")
}

#[tokio::test]
async fn test_crawl_follows_links() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(html(r#"<html><body><a href="/b">B</a></body></html>"#))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/b"))
        .respond_with(html("<html><body>leaf</body></html>"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let sleeper = RecordingSleeper::new();
    let mut config = test_config(dir.path(), vec![format!("{}/a", base)]);
    config.crawl.max_pages = 2;
    config.crawl.max_depth = 1;
    let summary = run(config, &sleeper).await;

    assert_eq!(summary.fetched, 2);
    assert_eq!(summary.pages, 2);
    assert_eq!(summary.frontier_remaining, 0);
    assert_eq!(summary.total_failed(), 0);

    let entries = run_manifest(dir.path());
    assert_eq!(entries.len(), 2);
    let b = entries
        .iter()
        .find(|e| e.record.url == format!("{}/b", base))
        .expect("b recorded");
    assert_eq!(b.origin, "crawl");
    assert_eq!(b.record.host, "127.0.0.1");
    assert_eq!(b.record.depth, 1);
    assert!(b.record.is_html);
    assert!(dir.path().join(&b.record.local_path).is_file());
    assert!(dir.path().join(RUN_SUMMARY).is_file());
}

#[tokio::test]
async fn test_second_run_skips_fresh_records() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(r#"<a href="/doc.pdf">doc</a>"#))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/doc.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.4 body".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let sleeper = RecordingSleeper::new();
    let before_first = Utc::now() - ChronoDuration::seconds(1);

    let first = run(test_config(dir.path(), vec![format!("{}/", base)]), &sleeper).await;
    assert_eq!(first.fetched, 2);
    let manifest_before = run_manifest(dir.path());

    let mut config = test_config(dir.path(), vec![format!("{}/", base)]);
    config.since = Some(before_first);
    let second = run(config, &sleeper).await;

    assert_eq!(second.fetched, 0);
    assert_eq!(second.skipped_for(reason::FRESH), 1);

    let skipped: Vec<SkipEntry> = read_log(&dir.path().join(SKIPPED_LOG)).unwrap();
    assert_eq!(skipped.len(), 1);
    assert_eq!(skipped[0].url, format!("{}/", base));
    assert_eq!(skipped[0].reason, reason::FRESH);

    let manifest_after = run_manifest(dir.path());
    assert_eq!(manifest_after.len(), manifest_before.len());
    for (before, after) in manifest_before.iter().zip(&manifest_after) {
        assert_eq!(before.record, after.record);
    }
}

#[tokio::test]
async fn test_stale_refetch_stores_nothing_new() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(r#"<a href="/data.csv">data</a>"#))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/data.csv"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"a,b\n1,2\n".to_vec()))
        .expect(2)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let sleeper = RecordingSleeper::new();

    run(test_config(dir.path(), vec![format!("{}/", base)]), &sleeper).await;
    let before = run_manifest(dir.path());
    let content_files = count_files(&dir.path().join("html")) + count_files(&dir.path().join("assets"));

    let mut config = test_config(dir.path(), vec![format!("{}/", base)]);
    config.since = Some(Utc::now());
    let second = run(config, &sleeper).await;
    assert_eq!(second.fetched, 2);
    assert_eq!(second.deduped, 2);

    let after = run_manifest(dir.path());
    assert_eq!(after.len(), before.len());
    for entry in &before {
        let same = after
            .iter()
            .find(|e| e.record.url == entry.record.url)
            .expect("url still recorded");
        assert_eq!(same.record.sha256, entry.record.sha256);
        assert_eq!(same.record.local_path, entry.record.local_path);
    }
    assert_eq!(
        count_files(&dir.path().join("html")) + count_files(&dir.path().join("assets")),
        content_files
    );

    // Without a cutoff nothing already recorded is requested again
    let third = run(test_config(dir.path(), vec![format!("{}/", base)]), &sleeper).await;
    assert_eq!(third.fetched, 0);
    assert_eq!(third.skipped_for(reason::FRESH), 1);
    assert_eq!(run_manifest(dir.path()).len(), before.len());
}

#[tokio::test]
async fn test_identical_bytes_are_stored_once() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(r#"<a href="/x.pdf">x</a><a href="/y.pdf">y</a>"#))
        .mount(&server)
        .await;
    for file in ["/x.pdf", "/y.pdf"] {
        Mock::given(method("GET"))
            .and(path(file))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"same bytes".to_vec()))
            .mount(&server)
            .await;
    }

    let dir = TempDir::new().unwrap();
    let sleeper = RecordingSleeper::new();
    let summary = run(test_config(dir.path(), vec![format!("{}/", base)]), &sleeper).await;

    assert_eq!(summary.attachments, 2);
    assert_eq!(summary.deduped, 1);

    let entries = run_manifest(dir.path());
    let pdfs: Vec<_> = entries.iter().filter(|e| !e.record.is_html).collect();
    assert_eq!(pdfs.len(), 2);
    assert_eq!(pdfs[0].record.sha256, pdfs[1].record.sha256);
    assert_eq!(pdfs[0].record.local_path, pdfs[1].record.local_path);
    assert!(pdfs.iter().any(|e| e.record.deduped_by_hash));
}

#[tokio::test]
async fn test_unchanged_page_answers_not_modified() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/"))
        .and(header("if-none-match", "\"v1\""))
        .respond_with(ResponseTemplate::new(304))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html("<html><body>stable</body></html>").insert_header("etag", "\"v1\""))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let sleeper = RecordingSleeper::new();

    let first = run(test_config(dir.path(), vec![format!("{}/", base)]), &sleeper).await;
    assert_eq!(first.fetched, 1);
    let original = run_manifest(dir.path()).remove(0).record;

    let mut config = test_config(dir.path(), vec![format!("{}/", base)]);
    config.since = Some(Utc::now());
    let second = run(config, &sleeper).await;

    assert_eq!(second.fetched, 0);
    assert_eq!(second.not_modified, 1);

    let refreshed = run_manifest(dir.path()).remove(0).record;
    assert_eq!(refreshed.sha256, original.sha256);
    assert_eq!(refreshed.local_path, original.local_path);
    assert!(refreshed.fetched_at >= original.fetched_at);
}

#[tokio::test]
async fn test_robots_disallow_is_never_requested() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(
                b"User-agent: *\nDisallow: /private\n".to_vec(),
                "text/plain",
            ),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(
            r#"<a href="/private/secret">no</a><a href="/public">yes</a>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/private/secret"))
        .respond_with(html("secret"))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/public"))
        .respond_with(html("public"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let sleeper = RecordingSleeper::new();
    let summary = run(test_config(dir.path(), vec![format!("{}/", base)]), &sleeper).await;

    assert_eq!(summary.skipped_for(reason::ROBOTS), 1);
    assert_eq!(summary.pages, 2);

    let denied: Vec<DisallowedEntry> = read_log(&dir.path().join(DISALLOWED_LOG)).unwrap();
    assert_eq!(denied.len(), 1);
    assert_eq!(denied[0].url, format!("{}/private/secret", base));
}

#[tokio::test]
async fn test_page_budget_is_never_exceeded() {
    let server = MockServer::start().await;
    let base = server.uri();

    let links: String = (0..10)
        .map(|i| format!(r#"<a href="/p{}">{}</a>"#, i, i))
        .collect();
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(&links))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(html("<html>leaf</html>"))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let sleeper = RecordingSleeper::new();
    let mut config = test_config(dir.path(), vec![format!("{}/", base)]);
    config.crawl.max_pages = 2;
    let summary = run(config, &sleeper).await;

    let pages = run_manifest(dir.path())
        .into_iter()
        .filter(|e| e.record.is_html)
        .count();
    assert_eq!(pages, 2);
    assert_eq!(summary.pages, 2);
    assert_eq!(summary.frontier_remaining, 9);
    assert_eq!(summary.skipped_for(reason::BUDGET), 9);

    let skipped: Vec<SkipEntry> = read_log(&dir.path().join(SKIPPED_LOG)).unwrap();
    assert_eq!(skipped.len(), 9);
    assert!(skipped.iter().all(|s| s.reason == reason::BUDGET));
}

#[tokio::test]
async fn test_bulk_byte_budget_stops_the_phase() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/one.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8; 600]))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/two.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![2u8; 600]))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let sleeper = RecordingSleeper::new();
    let mut config = test_config(dir.path(), vec![]);
    config.bulk.urls = vec![format!("{}/one.zip", base), format!("{}/two.zip", base)];
    config.bulk.max_bulk_bytes = 1000;
    let summary = run(config, &sleeper).await;

    assert_eq!(summary.bulk_artifacts, 1);
    assert_eq!(summary.bulk_bytes, 600);
    assert_eq!(summary.failed_for(reason::SIZE_LIMIT), 1);

    let failures: Vec<FailureEntry> =
        read_log(&Section::Bulk.dir(dir.path()).join(FAILURES_LOG)).unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].reason, reason::SIZE_LIMIT);
    assert_eq!(failures[0].url, format!("{}/two.zip", base));
    assert_eq!(failures[0].remaining_bytes, Some(400));

    let bulk: Vec<_> = run_manifest(dir.path())
        .into_iter()
        .filter(|e| e.origin == "bulk")
        .collect();
    assert_eq!(bulk.len(), 1);
    assert!(bulk[0].record.is_bulk_artifact);
}

#[tokio::test]
async fn test_retry_after_is_honored() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "5"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html("<html>ok</html>"))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let sleeper = RecordingSleeper::new();
    let summary = run(test_config(dir.path(), vec![format!("{}/", base)]), &sleeper).await;

    assert_eq!(summary.fetched, 1);
    assert!(sleeper
        .recorded()
        .iter()
        .any(|d| *d >= Duration::from_secs(5)));
}

#[tokio::test]
async fn test_server_errors_are_logged_after_retries() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(r#"<a href="/broken">b</a><a href="/gone">g</a>"#))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let sleeper = RecordingSleeper::new();
    let summary = run(test_config(dir.path(), vec![format!("{}/", base)]), &sleeper).await;

    assert_eq!(summary.failed_for(reason::REQUEST_FAILED), 1);
    assert_eq!(summary.failed_for(reason::HTTP_ERROR), 1);

    let failures: Vec<FailureEntry> = read_log(&dir.path().join(FAILURES_LOG)).unwrap();
    let broken = failures
        .iter()
        .find(|f| f.url.ends_with("/broken"))
        .expect("broken logged");
    assert_eq!(broken.attempts, Some(3));
    assert_eq!(broken.status_code, Some(500));
    assert_eq!(run_manifest(dir.path()).len(), 1);
}

#[tokio::test]
async fn test_api_samples_are_recorded() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/v1/items"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(b"[1,2,3]".to_vec(), "application/json"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let sleeper = RecordingSleeper::new();
    let mut config = test_config(dir.path(), vec![]);
    let endpoint = format!("{}/v1/items", base);
    config.api_samples.urls = vec![endpoint.clone(), endpoint.clone()];
    let summary = run(config, &sleeper).await;

    assert_eq!(summary.api_samples, 1);
    let samples: Vec<_> = run_manifest(dir.path())
        .into_iter()
        .filter(|e| e.origin == "api_samples")
        .collect();
    assert_eq!(samples.len(), 1);
    assert!(samples[0].record.is_api_sample);
    assert_eq!(samples[0].record.url, endpoint);
}

#[tokio::test]
async fn test_bulk_and_api_requests_are_spaced() {
    let server = MockServer::start().await;
    let base = server.uri();

    for file in ["/one.zip", "/two.zip"] {
        Mock::given(method("GET"))
            .and(path(file))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(file.as_bytes().to_vec()))
            .expect(1)
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/v1/items"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(b"[]".to_vec(), "application/json"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let sleeper = RecordingSleeper::new();
    let mut config = test_config(dir.path(), vec![]);
    config.fetch.throttle_seconds = 2.0;
    config.bulk.urls = vec![format!("{}/one.zip", base), format!("{}/two.zip", base)];
    config.api_samples.urls = vec![format!("{}/v1/items", base)];
    let summary = run(config, &sleeper).await;

    assert_eq!(summary.bulk_artifacts, 2);
    assert_eq!(summary.api_samples, 1);

    // HEAD and GET per artifact plus one API request, each after the first spaced
    let spaced = sleeper
        .recorded()
        .into_iter()
        .filter(|d| *d > Duration::from_millis(1500))
        .count();
    assert!(spaced >= 4, "expected at least 4 politeness waits, got {}", spaced);
}

#[tokio::test]
async fn test_huge_crawl_delay_is_capped() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(b"User-agent: *\nCrawl-delay: 1e300\n".to_vec(), "text/plain"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(r#"<a href="/next">next</a>"#))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/next"))
        .respond_with(html("<html>next</html>"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let sleeper = RecordingSleeper::new();
    let summary = run(test_config(dir.path(), vec![format!("{}/", base)]), &sleeper).await;

    assert_eq!(summary.pages, 2);
    let cap = Duration::from_secs_f64(MAX_CRAWL_DELAY_SECS);
    let recorded = sleeper.recorded();
    assert!(recorded.iter().all(|d| *d <= cap));
    assert!(recorded.iter().any(|d| *d > cap - Duration::from_secs(5)));
}

#[tokio::test]
async fn test_dotted_path_and_child_are_both_stored() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/api/v2.1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(br#"{"version":"2.1"}"#.to_vec(), "application/json"),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v2.1/docs"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(br#"{"docs":[]}"#.to_vec(), "application/json"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let sleeper = RecordingSleeper::new();
    let mut config = test_config(dir.path(), vec![]);
    config.api_samples.urls = vec![
        format!("{}/api/v2.1", base),
        format!("{}/api/v2.1/docs", base),
    ];
    let summary = run(config, &sleeper).await;

    assert_eq!(summary.api_samples, 2);
    let samples: Vec<_> = run_manifest(dir.path())
        .into_iter()
        .filter(|e| e.origin == "api_samples")
        .collect();
    assert_eq!(samples.len(), 2);
    for sample in &samples {
        assert!(dir.path().join(&sample.record.local_path).is_file());
    }
    assert_ne!(samples[0].record.local_path, samples[1].record.local_path);
}

#[tokio::test]
async fn test_invalid_config_is_rejected_before_running() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path(), vec![]);
    config.fetch.throttle_seconds = 1e300;

    assert!(Harvester::new(config).is_err());
    assert!(!dir.path().join(RUN_SUMMARY).exists());
}
