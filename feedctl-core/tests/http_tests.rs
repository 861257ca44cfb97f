use std::sync::Arc;

use feedctl_core::config::RemoteConfig;
use feedctl_core::{
    Cache, Config, Controller, FeedParser, FetchConfig, FetchError, FileUrlSource, HttpFeedParser,
    JsonCache, QueueFile, RemoteUrlSource, UrlSource, UrlSourceKind,
};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn sample_rss() -> String {
    r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Test Feed</title>
    <link>http://example.com/</link>
    <description>Test description</description>
    <item>
      <title>Item 1</title>
      <link>http://example.com/1</link>
      <guid>1</guid>
      <pubDate>Mon, 21 Oct 2024 07:28:00 GMT</pubDate>
      <description>First</description>
    </item>
    <item>
      <title>Item 2</title>
      <link>http://example.com/2</link>
      <guid>2</guid>
      <pubDate>Mon, 21 Oct 2024 08:00:00 GMT</pubDate>
      <enclosure url="http://cdn.example.com/2.mp3" length="1" type="audio/mpeg"/>
    </item>
  </channel>
</rss>"#
        .to_string()
}

fn fast_fetch() -> FetchConfig {
    FetchConfig {
        request_timeout: std::time::Duration::from_secs(2),
        max_retries: 1,
        retry_backoff_ms: 10,
        ..FetchConfig::default()
    }
}

#[tokio::test]
async fn http_parser_reads_rss_documents() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feed"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/rss+xml")
                .set_body_string(sample_rss()),
        )
        .mount(&server)
        .await;

    let url = format!("{}/feed", server.uri());
    let feed = tokio::task::spawn_blocking(move || {
        HttpFeedParser::new(fast_fetch()).unwrap().parse(&url)
    })
    .await
    .unwrap()
    .unwrap();

    assert_eq!(feed.title, "Test Feed");
    assert_eq!(feed.items.len(), 2);
    assert_eq!(feed.items[0].guid, "1");
    assert!(feed.items.iter().all(|i| i.unread));
    assert_eq!(
        feed.items[1].enclosure_url.as_deref(),
        Some("http://cdn.example.com/2.mp3")
    );
}

#[tokio::test]
async fn http_errors_are_retried_then_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .expect(2)
        .mount(&server)
        .await;

    let url = format!("{}/gone", server.uri());
    let result = tokio::task::spawn_blocking(move || {
        HttpFeedParser::new(fast_fetch()).unwrap().parse(&url)
    })
    .await
    .unwrap();

    assert!(matches!(result, Err(FetchError::Network(_))));
}

#[tokio::test]
async fn controller_reloads_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feed"))
        .respond_with(ResponseTemplate::new(200).set_body_string(sample_rss()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>nope</html>"))
        .mount(&server)
        .await;

    let good = format!("{}/feed", server.uri());
    let broken = format!("{}/broken", server.uri());
    let dir = tempfile::tempdir().unwrap();
    let url_file = dir.path().join("urls");
    std::fs::write(&url_file, format!("{good}\n{broken}\n")).unwrap();
    let cache_path = dir.path().join("cache.json");
    let queue_path = dir.path().join("queue");

    let report = tokio::task::spawn_blocking(move || {
        let config = Config {
            reload_threads: 2,
            ..Config::default()
        };
        let cache = Arc::new(JsonCache::open(&cache_path, 0).unwrap());
        let mut source = FileUrlSource::new(&url_file);
        source.reload().unwrap();
        let parser = HttpFeedParser::new(fast_fetch()).unwrap();
        let controller = Controller::new(
            config,
            cache.clone(),
            Box::new(source),
            Box::new(parser),
            QueueFile::new(&queue_path, "/tmp"),
        );
        controller.load_feeds().unwrap();
        let report = controller.reload_all(true).unwrap();
        assert!(cache.internalize(&broken).unwrap().is_empty());
        report
    })
    .await
    .unwrap();

    assert!(report.notified);
    assert_eq!(report.after.feeds, 1);
    assert_eq!(report.after.articles, 2);
    drop(dir);
}

#[tokio::test]
async fn remote_account_source_authenticates_and_reads_tags() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/subscriptions"))
        .and(header("authorization", "Basic am9lOnNlY3JldA=="))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            { "url": "http://a.example/rss", "tags": ["news", "~Alpha"] },
            { "url": "http://b.example/rss" }
        ])))
        .mount(&server)
        .await;

    let remote = RemoteConfig {
        url: format!("{}/subscriptions", server.uri()),
        login: "joe".to_string(),
        password: "secret".to_string(),
    };
    let (urls, tags, name) = tokio::task::spawn_blocking(move || {
        let mut source =
            RemoteUrlSource::new(UrlSourceKind::RemoteAccount, remote, &fast_fetch()).unwrap();
        source.reload().unwrap();
        (
            source.urls().to_vec(),
            source.tags("http://a.example/rss"),
            source.source_name(),
        )
    })
    .await
    .unwrap();

    assert_eq!(urls, ["http://a.example/rss", "http://b.example/rss"]);
    assert_eq!(tags, ["news", "~Alpha"]);
    assert!(!name.contains("secret"));
}

#[tokio::test]
async fn remote_list_source_reads_line_format() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/urls.txt"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("# shared list\nhttp://a.example/rss tech\nhttp://b.example/rss\n"),
        )
        .mount(&server)
        .await;

    let remote = RemoteConfig {
        url: format!("{}/urls.txt", server.uri()),
        ..RemoteConfig::default()
    };
    let (urls, all_tags) = tokio::task::spawn_blocking(move || {
        let mut source =
            RemoteUrlSource::new(UrlSourceKind::RemoteList, remote, &fast_fetch()).unwrap();
        source.reload().unwrap();
        (source.urls().to_vec(), source.all_tags())
    })
    .await
    .unwrap();

    assert_eq!(urls, ["http://a.example/rss", "http://b.example/rss"]);
    assert!(all_tags.contains("tech"));
}
