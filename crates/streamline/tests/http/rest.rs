use std::{collections::BTreeSet, sync::Arc};

use serde::{Deserialize, Serialize};
use streamline::rest::{CookiePersistence, MemoryCookies, RestClient, RestError};
use wiremock::{
    matchers::{body_json, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

use crate::AssertWrapper;

#[derive(Serialize)]
struct Login<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize, PartialEq)]
struct Stream {
    id: u64,
    title: String,
}

fn seeded(cookies: &[&str]) -> Arc<MemoryCookies> {
    let store = Arc::new(MemoryCookies::default());
    store.store(cookies.iter().map(|c| c.to_string()).collect());
    store
}

#[tokio::test]
async fn test_login_replaces_cookies() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/users/login"))
        .and(body_json(serde_json::json!({ "username": "alice", "password": "hunter2" })))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Set-Cookie", "sid=s%3Aabc123; Path=/; HttpOnly")
                .set_body_json(serde_json::json!({ "id": 7 })),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/streams"))
        .and(header("cookie", "sid=s%3Aabc123"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!([{ "id": 1, "title": "launch" }])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let cookies = seeded(&["sid=expired"]);
    let client = RestClient::new(&server.uri(), cookies.clone())?;

    let user: serde_json::Value = client
        .post_json(
            "/api/users/login",
            &Login {
                username: "alice",
                password: "hunter2",
            },
        )
        .await
        .assert_success();
    assert_eq!(user["id"], 7);
    assert_eq!(cookies.load(), BTreeSet::from(["sid=s%3Aabc123".to_string()]));

    let streams: Vec<Stream> = client.get_json("api/streams").await.assert_success();
    assert_eq!(
        streams,
        vec![Stream {
            id: 1,
            title: "launch".to_string()
        }]
    );

    // the login request itself went out without the stale cookie
    let requests = server.received_requests().await.unwrap_or_default();
    let login = requests
        .iter()
        .find(|r| r.url.path() == "/api/users/login")
        .assert_success();
    login.headers.get("cookie").assert_error();

    Ok(())
}

#[tokio::test]
async fn test_cookies_kept_without_set_cookie() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/streams"))
        .and(header("cookie", "sid=abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .expect(2)
        .mount(&server)
        .await;

    let cookies = seeded(&["sid=abc"]);
    let client = RestClient::new(&format!("{}/", server.uri()), cookies.clone())?;

    for _ in 0..2 {
        let streams: Vec<Stream> = client.get_json("/api/streams").await.assert_success();
        assert!(streams.is_empty());
    }
    assert_eq!(cookies.load().len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_unusable_set_cookie_empties_store() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/streams"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Set-Cookie", "sid=bare")
                .set_body_json(serde_json::json!([])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let cookies = seeded(&["sid=abc"]);
    let client = RestClient::new(&format!("{}/", server.uri()), cookies.clone())?;

    let streams: Vec<Stream> = client.get_json("/api/streams").await.assert_success();
    assert!(streams.is_empty());
    assert_eq!(cookies.load(), BTreeSet::new());

    Ok(())
}

#[tokio::test]
async fn test_error_status() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/streams/42"))
        .respond_with(ResponseTemplate::new(404).set_body_string("Stream not found"))
        .mount(&server)
        .await;

    let client = RestClient::new(&server.uri(), Arc::new(MemoryCookies::default()))?;
    match client.get_json::<Stream>("/api/streams/42").await {
        Err(RestError::Status(status)) => assert_eq!(status.as_u16(), 404),
        other => panic!("unexpected result: {other:?}"),
    }

    Ok(())
}

#[tokio::test]
async fn test_invalid_json() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/streams"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let client = RestClient::new(&server.uri(), Arc::new(MemoryCookies::default()))?;
    assert!(matches!(
        client.get_json::<Vec<Stream>>("api/streams").await,
        Err(RestError::Json(_))
    ));

    Ok(())
}
