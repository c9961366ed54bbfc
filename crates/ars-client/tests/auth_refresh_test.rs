//! Authenticated history fetches against a mocked backend.

use std::sync::Arc;

use ars_client::{AuthClient, ClientError, HistorySource, HttpConfig, HttpHistory, Tokens};
use ars_proto::{Endpoints, TeamId};
use mockito::{Matcher, Server, ServerGuard};

const PAGE: &str = r#"{
    "messages": [{"username": "bob", "content": "hi", "timestamp": "2024-05-01T12:00:00Z"}],
    "has_next": true
}"#;

fn client(server: &ServerGuard, refresh: Option<&str>) -> Arc<AuthClient> {
    let endpoints = Endpoints::parse(&server.url()).unwrap();
    let tokens = Tokens { access: "old".into(), refresh: refresh.map(str::to_string) };
    Arc::new(AuthClient::new(endpoints, tokens, &HttpConfig::default()).unwrap())
}

fn history_path() -> Matcher {
    Matcher::Regex(r"^/api/team/7/messages/".into())
}

fn page_query(page: u32) -> Matcher {
    Matcher::UrlEncoded("page".into(), page.to_string())
}

#[tokio::test]
async fn fetch_sends_bearer_and_page() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", history_path())
        .match_query(page_query(3))
        .match_header("authorization", "Bearer old")
        .with_status(200)
        .with_body(PAGE)
        .expect(1)
        .create_async()
        .await;

    let history = HttpHistory::new(client(&server, None));
    let page = history.fetch(&TeamId::new("7"), 3).await.unwrap();

    assert!(page.has_next);
    assert_eq!(page.messages.len(), 1);
    mock.assert_async().await;
}

#[tokio::test]
async fn unauthorized_refreshes_once_and_retries() {
    let mut server = Server::new_async().await;
    let rejected = server
        .mock("GET", history_path())
        .match_header("authorization", "Bearer old")
        .with_status(401)
        .expect(1)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", "/auth/refresh/")
        .match_body(Matcher::Json(serde_json::json!({"refresh": "r1"})))
        .with_status(200)
        .with_body(r#"{"access": "new", "refresh": "r2"}"#)
        .expect(1)
        .create_async()
        .await;
    let accepted = server
        .mock("GET", history_path())
        .match_header("authorization", "Bearer new")
        .with_status(200)
        .with_body(PAGE)
        .expect(1)
        .create_async()
        .await;

    let auth = client(&server, Some("r1"));
    let history = HttpHistory::new(Arc::clone(&auth));
    history.fetch(&TeamId::new("7"), 1).await.unwrap();

    rejected.assert_async().await;
    refresh.assert_async().await;
    accepted.assert_async().await;

    let tokens = auth.tokens();
    assert_eq!(tokens.access, "new");
    assert_eq!(tokens.refresh.as_deref(), Some("r2"));
}

#[tokio::test]
async fn concurrent_unauthorized_share_one_refresh() {
    let mut server = Server::new_async().await;
    let rejected = server
        .mock("GET", history_path())
        .match_header("authorization", "Bearer old")
        .with_status(401)
        .expect(2)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", "/auth/refresh/")
        .with_status(200)
        .with_body(r#"{"access": "new"}"#)
        .expect(1)
        .create_async()
        .await;
    let accepted = server
        .mock("GET", history_path())
        .match_header("authorization", "Bearer new")
        .with_status(200)
        .with_body(PAGE)
        .expect(2)
        .create_async()
        .await;

    let auth = client(&server, Some("r1"));
    let history = HttpHistory::new(Arc::clone(&auth));
    let team = TeamId::new("7");

    let (first, second) = tokio::join!(history.fetch(&team, 1), history.fetch(&team, 2));
    assert!(first.is_ok());
    assert!(second.is_ok());

    rejected.assert_async().await;
    refresh.assert_async().await;
    accepted.assert_async().await;

    // Refresh response without a rotated refresh token keeps the old one
    assert_eq!(auth.tokens().refresh.as_deref(), Some("r1"));
}

#[tokio::test]
async fn unauthorized_without_refresh_token() {
    let mut server = Server::new_async().await;
    server.mock("GET", history_path()).with_status(401).create_async().await;
    let refresh = server.mock("POST", "/auth/refresh/").expect(0).create_async().await;

    let history = HttpHistory::new(client(&server, None));
    let result = history.fetch(&TeamId::new("7"), 1).await;

    assert!(matches!(result, Err(ClientError::Unauthorized)));
    refresh.assert_async().await;
}

#[tokio::test]
async fn rejected_refresh_is_unauthorized() {
    let mut server = Server::new_async().await;
    server.mock("GET", history_path()).with_status(401).create_async().await;
    server.mock("POST", "/auth/refresh/").with_status(401).create_async().await;

    let history = HttpHistory::new(client(&server, Some("r1")));
    let result = history.fetch(&TeamId::new("7"), 1).await;

    assert!(matches!(result, Err(ClientError::Unauthorized)));
}

#[tokio::test]
async fn server_errors_surface_status() {
    let mut server = Server::new_async().await;
    server.mock("GET", history_path()).with_status(503).create_async().await;

    let history = HttpHistory::new(client(&server, Some("r1")));
    let result = history.fetch(&TeamId::new("7"), 1).await;

    assert!(matches!(result, Err(ClientError::Status { status: 503 })));
}

#[tokio::test]
async fn malformed_page_is_protocol_error() {
    let mut server = Server::new_async().await;
    server.mock("GET", history_path()).with_status(200).with_body("<html>").create_async().await;

    let history = HttpHistory::new(client(&server, None));
    let result = history.fetch(&TeamId::new("7"), 1).await;

    assert!(matches!(result, Err(ClientError::Protocol(_))));
}
