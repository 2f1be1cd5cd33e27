use crawl_pilot::config::{compute_config_hash, load_config_with_hash};
use crawl_pilot::{ConfigError, Crawler};
use std::io::Write;
use tempfile::NamedTempFile;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[tokio::test]
async fn test_crawl_seeds_from_config_file() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/seed"))
        .and(header("user-agent", "FileBot/2.0"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let file = write_config(&format!(
        r#"
seeds = ["{}/seed"]

[limiter]
default-delay-ms = 10

[robots]
scheme = "http"

[user-agent]
crawler-name = "FileBot"
crawler-version = "2.0"
contact-url = ""
"#,
        mock_server.uri()
    ));

    let (config, hash) = load_config_with_hash(file.path()).expect("Failed to load config");
    assert_eq!(hash.len(), 64);

    let crawler = Crawler::from_config(&config).expect("Failed to build crawler");
    let report = crawler.fetch_all(&config.seeds, 0).await;
    assert_eq!(report.succeeded(), 1);
}

#[test]
fn test_hash_tracks_file_content() {
    let first = write_config("[limiter]\ndefault-delay-ms = 100\n");
    let same = write_config("[limiter]\ndefault-delay-ms = 100\n");
    let other = write_config("[limiter]\ndefault-delay-ms = 200\n");

    let hash = compute_config_hash(first.path()).unwrap();
    assert_eq!(hash, compute_config_hash(same.path()).unwrap());
    assert_ne!(hash, compute_config_hash(other.path()).unwrap());
}

#[test]
fn test_invalid_file_is_rejected() {
    let file = write_config("[scheduler]\nmax-concurrent-tasks = 0\n");
    assert!(matches!(
        load_config_with_hash(file.path()),
        Err(ConfigError::Validation(_))
    ));

    let file = write_config("seeds = [\"ftp://example.com/\"]\n");
    assert!(load_config_with_hash(file.path()).is_err());
}
