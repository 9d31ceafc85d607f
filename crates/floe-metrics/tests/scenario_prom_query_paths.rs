//! Scenario: Prometheus instant-query client behaviour against a mock server.
//!
//! # Invariants under test
//!
//! 1. A successful response yields one sample per labelled series, with the
//!    stringified value parsed into f64.
//! 2. An empty result set is `Ok(vec![])`, not an error.
//! 3. `status: "error"` surfaces as `MetricsError::Backend` with the
//!    backend's errorType and message.
//! 4. A non-2xx response surfaces as `MetricsError::HttpStatus`.
//! 5. Unparseable bodies surface as `MetricsError::Decode`.
//! 6. Label selectors are rendered into the PromQL query parameter.

use std::collections::BTreeMap;

use floe_metrics::{MetricsBackend, MetricsError, PromClient};
use httpmock::prelude::*;

fn selectors(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

// ---------------------------------------------------------------------------
// 1. Success path with two series
// ---------------------------------------------------------------------------

#[tokio::test]
async fn success_returns_one_sample_per_series() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/api/v1/query");
        then.status(200).json_body(serde_json::json!({
            "status": "success",
            "data": {
                "resultType": "vector",
                "result": [
                    {"metric": {"host": "a"}, "value": [1700000000.0, "90"]},
                    {"metric": {"host": "b"}, "value": [1700000000.0, "12.5"]}
                ]
            }
        }));
    });

    let client = PromClient::new(server.base_url());
    let samples = client
        .query_instant("cpu_usage", &BTreeMap::new())
        .await
        .unwrap();

    mock.assert();
    assert_eq!(samples.len(), 2);
    assert_eq!(samples[0].labels.get("host").unwrap(), "a");
    assert_eq!(samples[0].value, 90.0);
    assert_eq!(samples[1].value, 12.5);
    assert_eq!(samples[0].at.timestamp(), 1_700_000_000);
}

// ---------------------------------------------------------------------------
// 2. Empty series set is Ok
// ---------------------------------------------------------------------------

#[tokio::test]
async fn empty_result_is_ok_and_empty() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/api/v1/query");
        then.status(200).json_body(serde_json::json!({
            "status": "success",
            "data": {"resultType": "vector", "result": []}
        }));
    });

    let client = PromClient::new(server.base_url());
    let samples = client
        .query_instant("absent_metric", &BTreeMap::new())
        .await
        .unwrap();
    assert!(samples.is_empty());
}

// ---------------------------------------------------------------------------
// 3. Backend rejection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn backend_error_surfaces_type_and_message() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/api/v1/query");
        then.status(200).json_body(serde_json::json!({
            "status": "error",
            "errorType": "bad_data",
            "error": "invalid parameter"
        }));
    });

    let client = PromClient::new(server.base_url());
    let err = client
        .query_instant("cpu_usage", &BTreeMap::new())
        .await
        .unwrap_err();

    match err {
        MetricsError::Backend {
            error_type,
            message,
        } => {
            assert_eq!(error_type, "bad_data");
            assert_eq!(message, "invalid parameter");
        }
        other => panic!("expected Backend, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// 4. HTTP status error
// ---------------------------------------------------------------------------

#[tokio::test]
async fn http_5xx_surfaces_status_and_body() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/api/v1/query");
        then.status(503).body("overloaded");
    });

    let client = PromClient::new(server.base_url());
    let err = client
        .query_instant("cpu_usage", &BTreeMap::new())
        .await
        .unwrap_err();

    match err {
        MetricsError::HttpStatus { code, body } => {
            assert_eq!(code, 503);
            assert_eq!(body, "overloaded");
            assert!(err_is_transient(code));
        }
        other => panic!("expected HttpStatus, got {other:?}"),
    }
}

fn err_is_transient(code: u16) -> bool {
    MetricsError::HttpStatus {
        code,
        body: String::new(),
    }
    .is_transient()
}

// ---------------------------------------------------------------------------
// 5. Decode failure
// ---------------------------------------------------------------------------

#[tokio::test]
async fn non_json_body_is_a_decode_error() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/api/v1/query");
        then.status(200).body("<html>not json</html>");
    });

    let client = PromClient::new(server.base_url());
    let err = client
        .query_instant("cpu_usage", &BTreeMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, MetricsError::Decode(_)));
}

// ---------------------------------------------------------------------------
// 6. Selector rendering reaches the wire
// ---------------------------------------------------------------------------

#[tokio::test]
async fn selectors_are_rendered_into_the_query_param() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/api/v1/query")
            .query_param("query", "cdc_lag_seconds{source=\"orders\"}");
        then.status(200).json_body(serde_json::json!({
            "status": "success",
            "data": {"resultType": "vector", "result": [
                {"metric": {"source": "orders"}, "value": [1700000000.0, "61"]}
            ]}
        }));
    });

    let client = PromClient::new(server.base_url());
    let samples = client
        .query_instant("cdc_lag_seconds", &selectors(&[("source", "orders")]))
        .await
        .unwrap();

    mock.assert();
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].value, 61.0);
}
