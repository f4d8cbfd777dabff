//! TVMaze client behaviour against a mock HTTP server.

use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use showsync::config::UpstreamConfig;
use showsync::error::{FailureKind, IngestError};
use showsync::upstream::{CatalogSource, TvMazeClient, UpdatePeriod, UpstreamError};

fn client_for(server: &MockServer) -> TvMazeClient {
    TvMazeClient::new(&UpstreamConfig {
        base_url: server.uri(),
        ..UpstreamConfig::default()
    })
    .expect("client")
}

#[tokio::test]
async fn index_page_decodes_records() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/shows"))
        .and(query_param("page", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 1, "name": "Under the Dome", "genres": ["Drama"], "webChannel": null},
            {"id": 2, "name": "Person of Interest"}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let records = client_for(&server).show_index_page(0).await.unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].name.as_deref(), Some("Under the Dome"));
    assert_eq!(records[0].genres, vec!["Drama"]);
    assert_eq!(records[1].id, Some(2));
}

#[tokio::test]
async fn index_page_past_the_end_is_empty() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/shows"))
        .and(query_param("page", "300"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let records = client_for(&server).show_index_page(300).await.unwrap();

    assert!(records.is_empty());
}

#[tokio::test]
async fn missing_show_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/shows/42"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = client_for(&server).show(42).await.unwrap_err();

    assert!(matches!(err, UpstreamError::NotFound { .. }));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn rate_limit_carries_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/shows/1/seasons"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "7"))
        .mount(&server)
        .await;

    let err = client_for(&server).seasons(1).await.unwrap_err();

    assert!(matches!(err, UpstreamError::RateLimited { retry_after: Some(7) }));
    assert_eq!(IngestError::from(err).kind(), FailureKind::TransientUpstream);
}

#[tokio::test]
async fn server_errors_are_transient_and_client_errors_are_not() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/shows/1/episodes"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/shows/2/episodes"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
        .mount(&server)
        .await;
    let client = client_for(&server);

    let unavailable = client.episodes(1).await.unwrap_err();
    assert!(matches!(unavailable, UpstreamError::Status { status: 503, .. }));
    assert!(unavailable.is_transient());

    let rejected = client.episodes(2).await.unwrap_err();
    assert!(matches!(rejected, UpstreamError::Status { status: 400, .. }));
    assert_eq!(IngestError::from(rejected).kind(), FailureKind::PermanentUpstream);
}

#[tokio::test]
async fn malformed_body_is_permanent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/shows/5"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
        .mount(&server)
        .await;

    let err = client_for(&server).show(5).await.unwrap_err();

    assert!(matches!(err, UpstreamError::Malformed { .. }));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn update_feed_parses_string_keys() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/updates/shows"))
        .and(query_param("since", "week"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "10": 1_700_000_100,
            "2": 1_700_000_000
        })))
        .expect(1)
        .mount(&server)
        .await;

    let updates = client_for(&server).updates(UpdatePeriod::Week).await.unwrap();

    assert_eq!(updates.keys().copied().collect::<Vec<_>>(), vec![2, 10]);
    assert_eq!(updates[&10], 1_700_000_100);
}

#[tokio::test]
async fn update_feed_rejects_non_numeric_ids() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/updates/shows"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"abc": 1})))
        .mount(&server)
        .await;

    let err = client_for(&server).updates(UpdatePeriod::Day).await.unwrap_err();

    assert!(matches!(err, UpstreamError::Malformed { .. }));
}
