//! # Tests for Handlers
//!
//! Direct handler calls; routing and auth are covered in `tests/router_tests.rs`.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode};
use sea_orm::{Database, DatabaseConnection};

use crate::config::{AppConfig, UpstreamConfig};
use crate::handlers::{healthz, root};
use crate::server::AppState;
use crate::upstream::TvMazeClient;

fn state_with(db: DatabaseConnection) -> AppState {
    let source = TvMazeClient::new(&UpstreamConfig::default()).expect("client");
    AppState::new(AppConfig::default(), db, Arc::new(source))
}

#[tokio::test]
async fn test_root_handler_returns_expected_service_info() {
    let response = root().await;

    assert_eq!(response.0.service, "showsync");
    assert_eq!(response.0.version, env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_healthz_reports_ok_with_live_database() {
    let db = Database::connect("sqlite::memory:").await.expect("sqlite");

    let response = healthz(State(state_with(db))).await.expect("healthy");

    assert_eq!(response.0.status, "ok");
    assert_eq!(response.0.database, "ok");
}

#[tokio::test]
async fn test_healthz_returns_503_when_database_unreachable() {
    let err = healthz(State(state_with(DatabaseConnection::default())))
        .await
        .expect_err("disconnected database must fail");

    assert_eq!(err.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(&*err.code, "SERVICE_UNAVAILABLE");
}
