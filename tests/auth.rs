mod support;

use std::net::TcpListener;

use assert_matches::assert_matches;

use faang_downloader::auth::{Authorizer, TokenHttpClient};
use faang_downloader::error::DownloaderError;

use support::serve_once;

#[test]
fn credentials_are_posted_as_json() {
    let (addr, request) = serve_once("HTTP/1.1 200 OK", r#"{"token": "jwt-abc"}"#);
    let client = TokenHttpClient::new(&format!("http://{addr}/")).unwrap();

    let token = client.authorize("alice", "s3cret").unwrap();
    assert_eq!(token.as_str(), "jwt-abc");

    let request = request.join().unwrap();
    assert!(request.starts_with("POST /api-token-auth/ HTTP/1.1\r\n"));
    assert!(
        request
            .to_ascii_lowercase()
            .contains("content-type: application/json")
    );
    assert!(request.ends_with(r#"{"username":"alice","password":"s3cret"}"#));
}

#[test]
fn rejected_credentials_are_invalid() {
    let (addr, _request) = serve_once(
        "HTTP/1.1 400 Bad Request",
        r#"{"non_field_errors": ["Unable to log in with provided credentials."]}"#,
    );
    let client = TokenHttpClient::new(&format!("http://{addr}")).unwrap();

    let err = client.authorize("alice", "wrong").unwrap_err();
    assert_matches!(err, DownloaderError::Auth(message) if message == "invalid credentials");
}

#[test]
fn undecodable_token_response_is_invalid() {
    let (addr, _request) = serve_once("HTTP/1.1 200 OK", "<html>maintenance</html>");
    let client = TokenHttpClient::new(&format!("http://{addr}")).unwrap();

    let err = client.authorize("alice", "s3cret").unwrap_err();
    assert_matches!(err, DownloaderError::Auth(message) if message == "invalid credentials");
}

#[test]
fn unreachable_token_endpoint_is_invalid() {
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let client = TokenHttpClient::new(&format!("http://{addr}")).unwrap();

    let err = client.authorize("alice", "s3cret").unwrap_err();
    assert_matches!(err, DownloaderError::Auth(message) if message == "invalid credentials");
}
