//! The blocking client drives the same implementation on the calling thread.

use std::{
    sync::mpsc::{self, RecvTimeoutError},
    thread,
    time::Duration,
};

use httpmock::prelude::*;
use oauth2_api_client::{
    blocking, new_api_client, ApiCallError, Error, OAuth2Config, RequestBody, ResponseBody,
    TokenFetchError,
};
use reqwest::{
    header::{HeaderMap, HeaderValue, CONTENT_TYPE},
    Method,
};
use serde_json::json;

fn config(server: &MockServer) -> OAuth2Config {
    OAuth2Config::new(
        server.url("/token"),
        "test_client_id",
        "test_client_secret",
        ["api:read", "api:write"],
    )
    .unwrap()
}

fn mock_token(server: &MockServer) -> httpmock::Mock<'_> {
    server.mock(|when, then| {
        when.method(POST)
            .path("/token")
            .body_includes("grant_type=client_credentials");
        then.status(200)
            .header("content-type", "application/json")
            .body(r#"{"access_token":"test_access_token","expires_in":3600}"#);
    })
}

#[test]
fn token_is_fetched_once() {
    let server = MockServer::start();
    let token_mock = mock_token(&server);

    let client = new_api_client(config(&server), server.base_url()).unwrap();
    assert_eq!(
        client.access_token().unwrap().as_deref(),
        Some("test_access_token")
    );
    assert_eq!(
        client.access_token().unwrap().as_deref(),
        Some("test_access_token")
    );
    token_mock.assert_calls(1);
}

#[test]
fn token_error_surfaces() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/token");
        then.status(400)
            .header("content-type", "application/json")
            .body(r#"{"error":"invalid_client"}"#);
    });

    let client = new_api_client(config(&server), server.base_url()).unwrap();
    let err = client.access_token().unwrap_err();
    assert!(matches!(
        err,
        Error::TokenFetch(TokenFetchError::Status { status: 400, .. })
    ));
}

#[test]
fn call_api_returns_payload_and_status() {
    let server = MockServer::start();
    mock_token(&server);
    server.mock(|when, then| {
        when.method(GET)
            .path("/api/test")
            .header("authorization", "Bearer test_access_token");
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({"message": "Success"}));
    });
    server.mock(|when, then| {
        when.method(GET).path("/api/missing");
        then.status(404)
            .header("content-type", "application/json")
            .json_body(json!({"error": "Not found"}));
    });

    let client = new_api_client(config(&server), server.base_url()).unwrap();

    let (body, status) = client
        .call_api(Method::GET, "/api/test", None, None)
        .unwrap()
        .into_parts();
    assert_eq!(status, 200);
    assert_eq!(body, ResponseBody::Json(json!({"message": "Success"})));

    let (body, status) = client
        .call_api(Method::GET, "/api/missing", None, None)
        .unwrap()
        .into_parts();
    assert_eq!(status, 404);
    assert_eq!(body, ResponseBody::Json(json!({"error": "Not found"})));
}

#[test]
fn form_body_is_urlencoded() {
    let server = MockServer::start();
    mock_token(&server);
    let api_mock = server.mock(|when, then| {
        when.method(POST)
            .path("/api/form")
            .header("content-type", "application/x-www-form-urlencoded")
            .body_includes("name=Jane+Doe")
            .body_includes("age=31");
        then.status(200)
            .header("content-type", "text/plain")
            .body("ok");
    });

    let mut headers = HeaderMap::new();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("application/x-www-form-urlencoded"),
    );

    let client = new_api_client(config(&server), server.base_url()).unwrap();
    let res = client
        .call_api(
            Method::POST,
            "/api/form",
            Some(headers),
            Some(RequestBody::from(json!({"name": "Jane Doe", "age": 31}))),
        )
        .unwrap();
    assert_eq!(res.body.as_text(), Some("ok"));
    api_mock.assert();
}

#[test]
fn download_file_reports_bytes_written() {
    let server = MockServer::start();
    mock_token(&server);
    server.mock(|when, then| {
        when.method(GET).path("/api/download");
        then.status(200).body("file content");
    });

    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("downloaded_file.txt");

    let client = new_api_client(config(&server), server.base_url()).unwrap();
    let download = client
        .download_file(Method::GET, "/api/download", &dest, None, None)
        .unwrap();

    assert_eq!(download.bytes_written, 12);
    assert_eq!(std::fs::read_to_string(&dest).unwrap(), "file content");
}

#[test]
fn closed_client_fails_fast() {
    let server = MockServer::start();
    mock_token(&server);

    let client = new_api_client(config(&server), server.base_url()).unwrap();
    assert!(client.close());
    assert!(client.is_closed());

    let err = client
        .call_api(Method::GET, "/api/test", None, None)
        .unwrap_err();
    assert!(matches!(err, Error::ApiCall(ApiCallError::Closed)));
}

#[test]
fn client_shares_token_manager_cache_and_refetches_after_invalidate() {
    let (done, finished) = mpsc::channel();
    let worker = thread::spawn(move || {
        let server = MockServer::start();
        let token_mock = mock_token(&server);

        let manager = blocking::TokenManager::from_config(config(&server)).unwrap();
        assert!(manager.cached().is_none());
        assert_eq!(manager.get_token().unwrap().access_token, "test_access_token");

        let client = blocking::ApiClient::with_token_manager(
            server.base_url(),
            reqwest::Client::new(),
            &manager,
        )
        .unwrap();
        assert_eq!(
            client.access_token().unwrap().as_deref(),
            Some("test_access_token")
        );
        token_mock.assert_calls(1);

        // The refetch reuses the manager's pooled connection.
        manager.invalidate();
        assert!(manager.cached().is_none());
        assert_eq!(
            client.access_token().unwrap().as_deref(),
            Some("test_access_token")
        );
        token_mock.assert_calls(2);
        assert!(manager.cached().is_some());

        done.send(()).unwrap();
    });

    match finished.recv_timeout(Duration::from_secs(10)) {
        Err(RecvTimeoutError::Timeout) => panic!("blocking client hung refetching the token"),
        _ => worker.join().unwrap(),
    }
}
