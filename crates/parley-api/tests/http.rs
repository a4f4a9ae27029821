use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use http_body_util::BodyExt;
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::{Value, json};
use tower::ServiceExt;

use parley_api::completion::CompletionClient;
use parley_api::state::AppStateInner;
use parley_api::token::TokenCodec;
use parley_db::Database;

const SECRET: &str = "http-test-secret";

/// Echoes the prompt back so replies are predictable.
struct Echo;

#[async_trait]
impl CompletionClient for Echo {
    async fn generate_reply(&self, prompt: &str) -> anyhow::Result<String> {
        Ok(format!("echo: {}", prompt))
    }
}

struct TestApp {
    router: Router,
    db: Arc<Database>,
    codec: TokenCodec,
}

impl TestApp {
    fn new() -> Self {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let codec = TokenCodec::new(SECRET, chrono::Duration::days(1));
        let state = AppStateInner::new(
            db.clone(),
            codec.clone(),
            Arc::new(Echo),
            Duration::from_secs(5),
        );

        Self {
            router: parley_api::router(state),
            db,
            codec,
        }
    }

    fn bearer(&self, user_id: &str) -> String {
        format!("Bearer {}", self.codec.issue(user_id).unwrap())
    }

    async fn call(
        &self,
        method: Method,
        uri: &str,
        auth: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(auth) = auth {
            builder = builder.header(header::AUTHORIZATION, auth);
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, value)
    }

    async fn chat(&self, auth: Option<&str>, thread_id: &str, message: &str) -> (StatusCode, Value) {
        self.call(
            Method::POST,
            "/api/chat",
            auth,
            Some(json!({ "threadId": thread_id, "message": message })),
        )
        .await
    }

    fn thread_rows(&self, thread_id: &str) -> i64 {
        self.db
            .with_conn(|conn| {
                let n = conn.query_row(
                    "SELECT COUNT(*) FROM threads WHERE thread_id = ?1",
                    [thread_id],
                    |r| r.get(0),
                )?;
                Ok(n)
            })
            .unwrap()
    }
}

fn sign(secret: &str, payload: Value) -> String {
    let mut payload = payload;
    if payload.get("exp").is_none() {
        payload["exp"] = json!((chrono::Utc::now() + chrono::Duration::hours(1)).timestamp());
    }
    let token = encode(
        &Header::default(),
        &payload,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap();
    format!("Bearer {}", token)
}

#[tokio::test]
async fn required_routes_reject_missing_credentials() {
    let app = TestApp::new();

    for (method, uri) in [
        (Method::GET, "/api/thread"),
        (Method::GET, "/api/thread/t1"),
        (Method::DELETE, "/api/thread/t1"),
    ] {
        let (status, body) = app.call(method, uri, None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{}", uri);
        assert!(body["error"].is_string(), "{}", uri);
    }
}

#[tokio::test]
async fn required_routes_reject_bad_credentials() {
    let app = TestApp::new();
    let expired = sign(
        SECRET,
        json!({ "userId": "alice", "exp": (chrono::Utc::now() - chrono::Duration::hours(2)).timestamp() }),
    );

    for auth in [
        "Bearer nonsense".to_string(),
        "Token abc".to_string(),
        sign("wrong-secret", json!({ "userId": "alice" })),
        expired,
    ] {
        let (status, _) = app.call(Method::GET, "/api/thread", Some(&auth), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{}", auth);
    }
}

#[tokio::test]
async fn token_without_user_is_unauthorized_like_no_token() {
    let app = TestApp::new();
    let empty_claim = sign(SECRET, json!({ "role": "user" }));

    let (with_claim, body_a) = app
        .call(Method::GET, "/api/thread", Some(&empty_claim), None)
        .await;
    let (without, body_b) = app.call(Method::GET, "/api/thread", None, None).await;

    assert_eq!(with_claim, StatusCode::UNAUTHORIZED);
    assert_eq!(without, StatusCode::UNAUTHORIZED);
    assert_eq!(body_a, body_b);

    // Not downgraded to guest on the optional route either
    let (status, _) = app.chat(Some(&empty_claim), "t1", "hi").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn guest_chat_replies_without_storing() {
    let app = TestApp::new();

    let (status, body) = app.chat(None, "t1", "hi").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reply"], "echo: hi");
    assert_eq!(app.thread_rows("t1"), 0);
}

#[tokio::test]
async fn bad_signature_on_chat_degrades_to_guest() {
    let app = TestApp::new();
    let forged = sign("attacker-secret", json!({ "userId": "alice" }));

    let (status, body) = app.chat(Some(&forged), "t1", "hi").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reply"], "echo: hi");
    assert_eq!(app.thread_rows("t1"), 0);
}

#[tokio::test]
async fn missing_message_is_bad_request() {
    let app = TestApp::new();
    let alice = app.bearer("alice");

    for body in [json!({ "threadId": "t1" }), json!({ "threadId": "t1", "message": "" })] {
        let (status, body) = app
            .call(Method::POST, "/api/chat", Some(&alice), Some(body))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Message is required");
    }
    assert_eq!(app.thread_rows("t1"), 0);
}

#[tokio::test]
async fn unparseable_body_still_gets_json_error() {
    let app = TestApp::new();

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/chat")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn chat_then_read_back() {
    let app = TestApp::new();
    let alice = app.bearer("alice");

    let (status, body) = app.chat(Some(&alice), "t1", "hi").await;
    assert_eq!(status, StatusCode::OK);
    let reply = body["reply"].as_str().unwrap().to_string();

    let (status, messages) = app.call(Method::GET, "/api/thread/t1", Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    let messages = messages.as_array().unwrap();
    let tail = &messages[messages.len() - 2..];
    assert_eq!(tail[0], json!({ "role": "user", "content": "hi" }));
    assert_eq!(tail[1], json!({ "role": "assistant", "content": reply }));
}

#[tokio::test]
async fn same_thread_id_is_isolated_between_users() {
    let app = TestApp::new();
    let alice = app.bearer("alice");
    let bob = app.bearer("bob");

    app.chat(Some(&alice), "t1", "alice only").await;
    app.chat(Some(&bob), "t1", "bob only").await;

    let (_, a) = app.call(Method::GET, "/api/thread/t1", Some(&alice), None).await;
    let (_, b) = app.call(Method::GET, "/api/thread/t1", Some(&bob), None).await;

    let a = a.to_string();
    let b = b.to_string();
    assert!(a.contains("alice only") && !a.contains("bob only"));
    assert!(b.contains("bob only") && !b.contains("alice only"));
    assert_eq!(app.thread_rows("t1"), 2);
}

#[tokio::test]
async fn foreign_thread_is_not_found() {
    let app = TestApp::new();
    let alice = app.bearer("alice");
    let bob = app.bearer("bob");

    app.chat(Some(&alice), "private", "secret").await;

    let (status, body) = app
        .call(Method::GET, "/api/thread/private", Some(&bob), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Thread not found");

    let (status, _) = app
        .call(Method::DELETE, "/api/thread/private", Some(&bob), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Still there for its owner
    let (status, _) = app
        .call(Method::GET, "/api/thread/private", Some(&alice), None)
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn delete_twice_is_ok_then_not_found() {
    let app = TestApp::new();
    let alice = app.bearer("alice");

    app.chat(Some(&alice), "t1", "hi").await;

    let (first, body) = app.call(Method::DELETE, "/api/thread/t1", Some(&alice), None).await;
    assert_eq!(first, StatusCode::OK);
    assert!(body["success"].is_string());

    let (second, _) = app.call(Method::DELETE, "/api/thread/t1", Some(&alice), None).await;
    assert_eq!(second, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn list_is_newest_first_and_owner_scoped() {
    let app = TestApp::new();
    let alice = app.bearer("alice");
    let bob = app.bearer("bob");

    app.chat(Some(&alice), "older", "one").await;
    app.chat(Some(&alice), "newer", "two").await;
    app.chat(Some(&bob), "bobs", "three").await;

    let (status, threads) = app.call(Method::GET, "/api/thread", Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);

    let ids: Vec<_> = threads
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["threadId"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(ids, ["newer", "older"]);
    assert_eq!(threads[0]["title"], "two");
    assert_eq!(threads[0]["ownerId"], "alice");
}

#[tokio::test]
async fn legacy_id_claim_reaches_the_same_threads() {
    let app = TestApp::new();
    let canonical = app.bearer("alice");
    let legacy = sign(SECRET, json!({ "id": "alice" }));

    app.chat(Some(&canonical), "t1", "hi").await;

    let (status, messages) = app.call(Method::GET, "/api/thread/t1", Some(&legacy), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(messages.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn register_login_and_use_token() {
    let app = TestApp::new();
    let credentials = json!({ "username": "carol", "password": "correct horse" });

    let (status, registered) = app
        .call(Method::POST, "/api/auth/register", None, Some(credentials.clone()))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(registered["username"], "carol");

    let (status, _) = app
        .call(Method::POST, "/api/auth/register", None, Some(credentials.clone()))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app
        .call(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "username": "carol", "password": "wrong password" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, logged_in) = app
        .call(Method::POST, "/api/auth/login", None, Some(credentials))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(logged_in["userId"], registered["userId"]);

    let auth = format!("Bearer {}", logged_in["token"].as_str().unwrap());
    app.chat(Some(&auth), "t1", "hello").await;

    let (status, threads) = app.call(Method::GET, "/api/thread", Some(&auth), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(threads[0]["ownerId"], registered["userId"]);
}

#[tokio::test]
async fn register_validates_input() {
    let app = TestApp::new();

    for body in [
        json!({ "username": "ab", "password": "long enough" }),
        json!({ "username": "dave", "password": "short" }),
    ] {
        let (status, body) = app
            .call(Method::POST, "/api/auth/register", None, Some(body))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }
}

#[tokio::test]
async fn ping_answers_pong() {
    let app = TestApp::new();

    let (status, body) = app.call(Method::GET, "/ping", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("pong".into()));
}

#[tokio::test]
async fn unknown_route_is_json_not_found() {
    let app = TestApp::new();

    let (status, body) = app.call(Method::GET, "/api/nope", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Not found");
}

#[tokio::test]
async fn wrong_method_is_json_error() {
    let app = TestApp::new();

    for (method, uri) in [
        (Method::GET, "/api/chat"),
        (Method::DELETE, "/ping"),
        (Method::GET, "/api/auth/login"),
    ] {
        let (status, body) = app.call(method, uri, None, None).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED, "{}", uri);
        assert_eq!(body["error"], "Method not allowed", "{}", uri);
    }
}

#[tokio::test]
async fn expired_token_on_chat_degrades_to_guest() {
    let app = TestApp::new();
    let expired = sign(
        SECRET,
        json!({ "userId": "alice", "exp": (chrono::Utc::now() - chrono::Duration::hours(2)).timestamp() }),
    );

    let (status, body) = app.chat(Some(&expired), "t1", "hi").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reply"], "echo: hi");
    assert_eq!(app.thread_rows("t1"), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_registrations_have_one_winner() {
    let app = Arc::new(TestApp::new());
    let mut tasks = tokio::task::JoinSet::new();

    for _ in 0..4 {
        let app = app.clone();
        tasks.spawn(async move {
            app.call(
                Method::POST,
                "/api/auth/register",
                None,
                Some(json!({ "username": "erin", "password": "correct horse" })),
            )
            .await
        });
    }

    let mut statuses = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        let (status, body) = joined.unwrap();
        if status != StatusCode::CREATED {
            assert_eq!(body["error"], "Username already taken");
        }
        statuses.push(status);
    }

    let created = statuses.iter().filter(|s| **s == StatusCode::CREATED).count();
    let conflicts = statuses.iter().filter(|s| **s == StatusCode::CONFLICT).count();
    assert_eq!((created, conflicts), (1, 3), "{:?}", statuses);
}
