use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tubeshelf::app::TubeshelfError;
use tubeshelf::config::HttpConfig;
use tubeshelf::fetcher::http_fetcher::HttpFetcher;
use tubeshelf::fetcher::Fetcher;

fn test_config() -> HttpConfig {
    HttpConfig {
        timeout_secs: 2,
        user_agent: "tubeshelf-test/1.0".into(),
        accept_language: "en-GB".into(),
    }
}

#[tokio::test]
async fn fetch_sends_configured_headers() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/page"))
        .and(header("user-agent", "tubeshelf-test/1.0"))
        .and(header("accept-language", "en-GB"))
        .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::with_config(&test_config()).unwrap();
    let response = fetcher
        .fetch(&format!("{}/page", server.uri()))
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.body, b"hello");
}

#[tokio::test]
async fn fetch_maps_error_status() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/feed"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::with_config(&test_config()).unwrap();
    let err = fetcher
        .fetch(&format!("{}/feed", server.uri()))
        .await
        .unwrap_err();

    match err {
        TubeshelfError::Fetch { status, ref message } => {
            assert_eq!(status, Some(503));
            assert_eq!(message, "HTTP Error 503");
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(err.http_status(), 503);
}

#[tokio::test]
async fn fetch_times_out_as_transport_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(std::time::Duration::from_secs(3)))
        .mount(&server)
        .await;

    let config = HttpConfig {
        timeout_secs: 1,
        ..test_config()
    };
    let fetcher = HttpFetcher::with_config(&config).unwrap();
    let err = fetcher
        .fetch(&format!("{}/slow", server.uri()))
        .await
        .unwrap_err();

    assert!(matches!(err, TubeshelfError::Fetch { status: None, .. }));
    assert_eq!(err.http_status(), 500);
}
