use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use parley_api::{AppState, AppStateInner, router};
use parley_gateway::longpoll::LongPoll;
use parley_gateway::notifier::ChangeNotifier;
use parley_store::{Clock, IdentityStore, MessageLog, SystemClock};

const POLL_TIMEOUT: Duration = Duration::from_millis(300);

fn test_state() -> AppState {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let identity = Arc::new(IdentityStore::new(clock.clone(), chrono::Duration::seconds(30)));
    identity.add("root", "rootpw", true).unwrap();
    let log = Arc::new(MessageLog::new(identity.clone(), clock));
    AppStateInner::new(identity, LongPoll::new(log, ChangeNotifier::new(), POLL_TIMEOUT))
}

async fn call(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("SessionAuthToken", token);
    }
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()))
    };
    (status, value)
}

async fn register_and_login(app: &Router, username: &str, password: &str) -> String {
    let creds = json!({ "username": username, "password": password });
    let (status, body) = call(app, Method::POST, "/auth/register", None, Some(creds.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body, json!(username));

    login(app, username, password).await
}

async fn login(app: &Router, username: &str, password: &str) -> String {
    let creds = json!({ "username": username, "password": password });
    let (status, body) = call(app, Method::POST, "/auth/login", None, Some(creds)).await;
    assert_eq!(status, StatusCode::OK);
    body["token"].as_str().unwrap().to_string()
}

async fn send(app: &Router, token: &str, sender: &str, content: &str) -> StatusCode {
    let body = json!({ "sender": sender, "content": content });
    call(app, Method::POST, "/messages/send", Some(token), Some(body)).await.0
}

fn message_ids(body: &Value) -> Vec<u64> {
    body.as_array()
        .unwrap()
        .iter()
        .map(|m| m["id"].as_u64().unwrap())
        .collect()
}

#[tokio::test]
async fn test_health_needs_no_auth() {
    let app = router(test_state());

    let (status, body) = call(&app, Method::GET, "/system/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!("OK"));

    let (status, _) = call(&app, Method::HEAD, "/system/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_register_and_login_outcomes() {
    let app = router(test_state());
    register_and_login(&app, "bob", "pw").await;

    let taken = json!({ "username": "Bob", "password": "x" });
    let (status, _) = call(&app, Method::POST, "/auth/register", None, Some(taken)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let missing = json!({ "username": "carol" });
    let (status, _) = call(&app, Method::POST, "/auth/register", None, Some(missing.clone())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = call(&app, Method::POST, "/auth/login", None, Some(missing)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let wrong = json!({ "username": "bob", "password": "nope" });
    let (status, _) = call(&app, Method::POST, "/auth/login", None, Some(wrong)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_relogin_revokes_old_token() {
    let app = router(test_state());
    let first = register_and_login(&app, "alice", "pw").await;
    let second = login(&app, "alice", "pw").await;

    let (status, _) = call(&app, Method::GET, "/users", Some(&first), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, body) = call(&app, Method::GET, "/users", Some(&second), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!(["root", "alice"]));
}

#[tokio::test]
async fn test_protected_routes_require_token() {
    let app = router(test_state());
    for (method, uri, body) in [
        (Method::GET, "/users", None),
        (Method::GET, "/users/status", None),
        (Method::POST, "/users/heartbeat", None),
        (Method::GET, "/messages/history", None),
        (Method::GET, "/messages/updates?lastId=0", None),
        (Method::POST, "/messages/clear", None),
        (Method::POST, "/messages/send", Some(json!({ "sender": "root", "content": "hi" }))),
        (Method::POST, "/users/update", Some(json!({ "username": "root", "newUsername": "admin" }))),
        (Method::POST, "/users/delete", Some(json!({ "username": "root", "password": "rootpw" }))),
    ] {
        let (status, _) = call(&app, method.clone(), uri, None, body.clone()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{method} {uri}");
        let (status, _) = call(&app, method.clone(), uri, Some("bogus"), body).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{method} {uri}");
    }

    // Nothing above reached a handler.
    let root = login(&app, "root", "rootpw").await;
    let (_, body) = call(&app, Method::GET, "/users", Some(&root), None).await;
    assert_eq!(body, json!(["root"]));
    let (_, body) = call(&app, Method::GET, "/messages/history", Some(&root), None).await;
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn test_send_and_read_history() {
    let app = router(test_state());
    let alice = register_and_login(&app, "alice", "pw").await;
    let bob = register_and_login(&app, "bob", "pw").await;

    assert_eq!(send(&app, &alice, "alice", "hi").await, StatusCode::NO_CONTENT);
    assert_eq!(send(&app, &bob, "bob", "yo").await, StatusCode::NO_CONTENT);
    assert_eq!(send(&app, &bob, "alice", "spoof").await, StatusCode::FORBIDDEN);
    assert_eq!(send(&app, &bob, "bob", "  ").await, StatusCode::BAD_REQUEST);

    let (status, body) = call(&app, Method::GET, "/messages/history", Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(message_ids(&body), vec![1, 2]);
    assert_eq!(body[0]["sender"], "alice");
    assert_eq!(body[1]["content"], "yo");
    assert!(body[1]["timestampUtc"].is_string());

    let (_, body) = call(&app, Method::GET, "/messages/history?take=1", Some(&alice), None).await;
    assert_eq!(message_ids(&body), vec![2]);

    let (status, _) = call(&app, Method::GET, "/messages/history?take=0", Some(&alice), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_updates_cursor_validation() {
    let app = router(test_state());
    let alice = register_and_login(&app, "alice", "pw").await;

    for uri in [
        "/messages/updates",
        "/messages/updates?lastId=-1",
        "/messages/updates?lastId=abc",
    ] {
        let (status, _) = call(&app, Method::GET, uri, Some(&alice), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
    }
}

#[tokio::test]
async fn test_updates_returns_immediately_when_behind() {
    let app = router(test_state());
    let alice = register_and_login(&app, "alice", "pw").await;
    send(&app, &alice, "alice", "hi").await;
    send(&app, &alice, "alice", "again").await;

    let (status, body) = call(&app, Method::GET, "/messages/updates?lastId=1", Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(message_ids(&body), vec![2]);
}

#[tokio::test]
async fn test_updates_times_out_empty() {
    let app = router(test_state());
    let alice = register_and_login(&app, "alice", "pw").await;
    send(&app, &alice, "alice", "hi").await;

    let started = Instant::now();
    let (status, body) = call(&app, Method::GET, "/messages/updates?lastId=1", Some(&alice), None).await;
    let elapsed = started.elapsed();

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
    assert!(elapsed >= POLL_TIMEOUT);
    assert!(elapsed < Duration::from_secs(3));
}

#[tokio::test]
async fn test_updates_woken_by_send() {
    let state = test_state();
    let app = router(state.clone());
    let alice = register_and_login(&app, "alice", "pw").await;
    let bob = register_and_login(&app, "bob", "pw").await;

    let poller = {
        let app = app.clone();
        let alice = alice.clone();
        tokio::spawn(async move {
            call(&app, Method::GET, "/messages/updates?lastId=0", Some(&alice), None).await
        })
    };

    while state.longpoll.notifier().pending() == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(send(&app, &bob, "bob", "wake up").await, StatusCode::NO_CONTENT);

    let (status, body) = poller.await.unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(message_ids(&body), vec![1]);
    assert_eq!(body[0]["sender"], "bob");
}

#[tokio::test]
async fn test_clear_is_admin_only() {
    let app = router(test_state());
    let alice = register_and_login(&app, "alice", "pw").await;
    let root = login(&app, "root", "rootpw").await;
    send(&app, &alice, "alice", "hi").await;

    let (status, _) = call(&app, Method::POST, "/messages/clear", Some(&alice), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = call(&app, Method::POST, "/messages/clear", Some(&root), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, body) = call(&app, Method::GET, "/messages/history", Some(&alice), None).await;
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn test_update_user_permissions() {
    let app = router(test_state());
    let alice = register_and_login(&app, "alice", "pw").await;
    register_and_login(&app, "bob", "pw").await;
    let root = login(&app, "root", "rootpw").await;

    let rename_bob = json!({ "username": "bob", "newUsername": "robert" });
    let (status, _) = call(&app, Method::POST, "/users/update", Some(&alice), Some(rename_bob.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let clash = json!({ "username": "alice", "newUsername": "BOB" });
    let (status, _) = call(&app, Method::POST, "/users/update", Some(&alice), Some(clash)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let nothing = json!({ "username": "alice" });
    let (status, _) = call(&app, Method::POST, "/users/update", Some(&alice), Some(nothing)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(&app, Method::POST, "/users/update", Some(&root), Some(rename_bob)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let new_pw = json!({ "username": "alice", "newPassword": "pw2" });
    let (status, _) = call(&app, Method::POST, "/users/update", Some(&alice), Some(new_pw)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    login(&app, "alice", "pw2").await;

    let (_, body) = call(&app, Method::GET, "/users", Some(&root), None).await;
    assert_eq!(body, json!(["root", "alice", "robert"]));
}

#[tokio::test]
async fn test_delete_user_purges_account_and_messages() {
    let app = router(test_state());
    let alice = register_and_login(&app, "alice", "pw").await;
    let bob = register_and_login(&app, "bob", "pw").await;
    send(&app, &alice, "alice", "from alice").await;
    send(&app, &bob, "bob", "from bob").await;

    let other = json!({ "username": "alice", "password": "pw" });
    let (status, _) = call(&app, Method::POST, "/users/delete", Some(&bob), Some(other)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let wrong_pw = json!({ "username": "bob", "password": "nope" });
    let (status, _) = call(&app, Method::POST, "/users/delete", Some(&bob), Some(wrong_pw)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let me = json!({ "username": "bob", "password": "pw" });
    let (status, _) = call(&app, Method::POST, "/users/delete", Some(&bob), Some(me)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = call(&app, Method::GET, "/users", Some(&bob), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = call(&app, Method::GET, "/messages/history", Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(message_ids(&body), vec![1]);

    let (_, body) = call(&app, Method::GET, "/users", Some(&alice), None).await;
    assert_eq!(body, json!(["root", "alice"]));
}

#[tokio::test]
async fn test_status_and_heartbeat() {
    let app = router(test_state());
    let alice = register_and_login(&app, "alice", "pw").await;

    let (status, _) = call(&app, Method::POST, "/users/heartbeat", Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(&app, Method::GET, "/users/status", Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[1], json!({ "username": "alice", "online": true }));
}
