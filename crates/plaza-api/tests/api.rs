use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
    routing::get,
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use http_body_util::BodyExt;
use plaza_api::{AppState, AppStateInner, Config, router, with_middleware};
use plaza_crypto::PasswordService;
use plaza_db::{Database, StoreError};
use plaza_mail::{MailError, Mailer, Recipient, Template};
use serde_json::{Value, json};
use tower::ServiceExt;

#[derive(Default)]
struct RecordingMailer {
    sent: Mutex<Vec<(Recipient, Value, bool)>>,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, _template: Template, to: &Recipient, data: &Value, sandbox: bool) -> plaza_mail::Result<()> {
        self.sent.lock().unwrap().push((to.clone(), data.clone(), sandbox));
        Ok(())
    }
}

struct FailingMailer;

#[async_trait]
impl Mailer for FailingMailer {
    async fn send(&self, _template: Template, _to: &Recipient, _data: &Value, _sandbox: bool) -> plaza_mail::Result<()> {
        Err(MailError::RetriesExhausted {
            attempts: 3,
            last: "connection refused".into(),
        })
    }
}

struct TestApp {
    router: Router,
    state: AppState,
    db: Database,
}

fn app_with(mailer: Arc<dyn Mailer>) -> TestApp {
    let config = Config::from_lookup(|_| None).unwrap();
    let db = Database::open_in_memory().unwrap();
    let mut inner = AppStateInner::new(config, db.clone(), mailer).unwrap();
    inner.passwords = PasswordService::with_cost(1024, 1).unwrap();
    let state: AppState = Arc::new(inner);
    TestApp {
        router: router(state.clone()),
        state,
        db,
    }
}

fn app() -> TestApp {
    app_with(Arc::new(RecordingMailer::default()))
}

impl TestApp {
    async fn send(&self, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.request(request).await
    }

    async fn request(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    /// Register, activate and sign in. Returns (user id, bearer token).
    async fn signed_in(&self, name: &str) -> (i64, String) {
        let (status, body) = self
            .send(
                "POST",
                "/authentication/users",
                None,
                Some(json!({
                    "username": name,
                    "email": format!("{}@x.com", name),
                    "password": "password",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        let user_id = body["user_id"].as_i64().unwrap();
        let activation = body["token"].as_str().unwrap().to_string();

        let (status, _) = self
            .send("PUT", &format!("/users/activate/{}", activation), None, None)
            .await;
        assert_eq!(status, StatusCode::OK);

        (user_id, self.login(name).await)
    }

    async fn login(&self, name: &str) -> String {
        let (status, body) = self
            .send(
                "POST",
                "/authentication/token",
                None,
                Some(json!({ "email": format!("{}@x.com", name), "password": "password" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body["token"].as_str().unwrap().to_string()
    }

    /// Must run before the user's first bearer request; the acting user is cached.
    async fn set_role(&self, user_id: i64, role: &'static str) {
        self.db
            .call(move |conn| {
                conn.execute(
                    "UPDATE users SET role_id = (SELECT id FROM roles WHERE name = ?1) WHERE id = ?2",
                    (role, user_id),
                )?;
                Ok(())
            })
            .await
            .unwrap();
    }

    async fn create_post(&self, token: &str, title: &str) -> Value {
        let (status, body) = self
            .send(
                "POST",
                "/posts",
                Some(token),
                Some(json!({ "title": title, "content": "hello", "tags": ["intro"] })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body
    }
}

#[tokio::test]
async fn follow_without_authorization_header_is_unauthorized() {
    let app = app();
    let (status, body) = app.send("PUT", "/users/1/follow", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");
}

#[tokio::test]
async fn garbage_bearer_token_is_unauthorized() {
    let app = app();
    let (status, body) = app.send("GET", "/users/feed", Some("not-a-token"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn registration_mails_the_activation_link() {
    let mailer = Arc::new(RecordingMailer::default());
    let app = app_with(mailer.clone());

    let (status, body) = app
        .send(
            "POST",
            "/authentication/users",
            None,
            Some(json!({ "username": "alice", "email": "alice@x.com", "password": "password" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let token = body["token"].as_str().unwrap();

    let sent = mailer.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    let (to, data, sandbox) = &sent[0];
    assert_eq!(to.email, "alice@x.com");
    assert_eq!(
        data["activation_url"],
        format!("http://localhost:8080/activate/{}", token)
    );
    assert!(*sandbox);
}

#[tokio::test]
async fn alice_scenario_feed_counts_comments() {
    let app = app();
    let (alice_id, alice) = app.signed_in("alice").await;
    let (_, bob) = app.signed_in("bob").await;

    let post = app.create_post(&alice, "first post").await;
    assert_eq!(post["version"], 0);

    let (status, _) = app
        .send("PUT", &format!("/users/{}/follow", alice_id), Some(&bob), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, feed) = app.send("GET", "/users/feed", Some(&bob), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(feed.as_array().unwrap().len(), 1);
    assert_eq!(feed[0]["id"], post["id"]);
    assert_eq!(feed[0]["username"], "alice");
    assert_eq!(feed[0]["comments_count"], 0);

    let (status, comment) = app
        .send(
            "POST",
            &format!("/posts/{}/comments", post["id"]),
            Some(&bob),
            Some(json!({ "content": "nice" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(comment["username"], "bob");

    let (_, feed) = app.send("GET", "/users/feed", Some(&bob), None).await;
    assert_eq!(feed[0]["comments_count"], 1);

    let (status, detail) = app
        .send("GET", &format!("/posts/{}", post["id"]), Some(&bob), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["comments"][0]["content"], "nice");
}

#[tokio::test]
async fn follow_twice_conflicts_and_unfollow_empties_feed() {
    let app = app();
    let (alice_id, alice) = app.signed_in("alice").await;
    let (_, bob) = app.signed_in("bob").await;
    app.create_post(&alice, "hello").await;

    let follow = format!("/users/{}/follow", alice_id);
    assert_eq!(app.send("PUT", &follow, Some(&bob), None).await.0, StatusCode::NO_CONTENT);
    let (status, body) = app.send("PUT", &follow, Some(&bob), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "already following this user");

    let unfollow = format!("/users/{}/unfollow", alice_id);
    assert_eq!(app.send("PUT", &unfollow, Some(&bob), None).await.0, StatusCode::NO_CONTENT);

    let (_, feed) = app.send("GET", "/users/feed", Some(&bob), None).await;
    assert!(feed.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn following_yourself_or_nobody_is_rejected() {
    let app = app();
    let (me, token) = app.signed_in("alice").await;

    let (status, _) = app
        .send("PUT", &format!("/users/{}/follow", me), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.send("PUT", "/users/9999/follow", Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn stale_version_is_not_found() {
    let app = app();
    let (_, alice) = app.signed_in("alice").await;
    let post = app.create_post(&alice, "v0").await;
    let uri = format!("/posts/{}", post["id"]);

    for title in ["v1", "v2"] {
        let (status, _) = app
            .send("PATCH", &uri, Some(&alice), Some(json!({ "title": title })))
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = app
        .send("PATCH", &uri, Some(&alice), Some(json!({ "title": "late", "version": 1 })))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());

    let (status, body) = app
        .send("PATCH", &uri, Some(&alice), Some(json!({ "content": "fresh", "version": 2 })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["version"], 3);
    assert_eq!(body["title"], "v2");
    assert_eq!(body["content"], "fresh");
}

#[tokio::test]
async fn mutation_checks_authentication_then_existence_then_policy() {
    let app = app();
    let (_, alice) = app.signed_in("alice").await;
    let (_, bob) = app.signed_in("bob").await;
    let post = app.create_post(&alice, "mine").await;
    let uri = format!("/posts/{}", post["id"]);
    let edit = json!({ "title": "edited" });

    let (status, _) = app.send("PATCH", "/posts/9999", None, Some(edit.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.send("PATCH", "/posts/9999", Some(&bob), Some(edit.clone())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app.send("PATCH", &uri, Some(&bob), Some(edit.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");

    let (status, _) = app.send("DELETE", &uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.send("PATCH", &uri, Some(&alice), Some(edit)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn bad_bodies_do_not_jump_ahead_of_existence_and_policy() {
    let app = app();
    let (_, alice) = app.signed_in("alice").await;
    let (_, bob) = app.signed_in("bob").await;
    let post = app.create_post(&alice, "mine").await;
    let uri = format!("/posts/{}", post["id"]);

    let blank = json!({ "title": "" });
    let unknown = json!({ "title": "x", "owner": 2 });

    let (status, body) = app.send("PATCH", "/posts/9999", Some(&bob), Some(blank.clone())).await;
    assert_eq!(status, StatusCode::NOT_FOUND, "{}", body);

    let (status, _) = app.send("PATCH", &uri, Some(&bob), Some(blank.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.send("PATCH", &uri, Some(&bob), Some(unknown.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .send("POST", "/posts/9999/comments", Some(&bob), Some(json!({ "content": "" })))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Once the caller is allowed, the body is checked.
    let (status, body) = app.send("PATCH", &uri, Some(&alice), Some(blank)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "title is required");

    let (status, _) = app.send("PATCH", &uri, Some(&alice), Some(unknown)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .send("POST", &format!("{}/comments", uri), Some(&bob), Some(json!({ "content": "" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "content is required");

    let not_json = Request::builder()
        .method("PATCH")
        .uri(&uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", alice))
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from(r#"{"title":"x"}"#))
        .unwrap();
    let (status, body) = app.request(not_json).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("application/json"));
}

#[tokio::test]
async fn moderators_update_and_admins_delete() {
    let app = app();
    let (_, alice) = app.signed_in("alice").await;
    let (moderator_id, moderator) = app.signed_in("mod").await;
    let (admin_id, admin) = app.signed_in("root").await;
    app.set_role(moderator_id, "moderator").await;
    app.set_role(admin_id, "admin").await;

    let post = app.create_post(&alice, "mine").await;
    let uri = format!("/posts/{}", post["id"]);

    let (status, _) = app
        .send("PATCH", &uri, Some(&moderator), Some(json!({ "title": "moderated" })))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.send("DELETE", &uri, Some(&moderator), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.send("DELETE", &uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.send("GET", &uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn failed_invitation_mail_removes_the_user() {
    let app = app_with(Arc::new(FailingMailer));

    let (status, body) = app
        .send(
            "POST",
            "/authentication/users",
            None,
            Some(json!({ "username": "alice", "email": "alice@x.com", "password": "password" })),
        )
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!body["error"].as_str().unwrap().contains("connection refused"));

    assert!(matches!(
        app.state.storage.users.get_by_email("alice@x.com").await,
        Err(StoreError::NotFound)
    ));
}

#[tokio::test]
async fn duplicate_registration_conflicts() {
    let app = app();
    app.signed_in("alice").await;

    let (status, body) = app
        .send(
            "POST",
            "/authentication/users",
            None,
            Some(json!({ "username": "alice", "email": "other@x.com", "password": "password" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "username already taken");

    let (status, body) = app
        .send(
            "POST",
            "/authentication/users",
            None,
            Some(json!({ "username": "alice2", "email": "alice@x.com", "password": "password" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "email already registered");
}

#[tokio::test]
async fn activation_works_once() {
    let app = app();
    let (_, body) = app
        .send(
            "POST",
            "/authentication/users",
            None,
            Some(json!({ "username": "alice", "email": "alice@x.com", "password": "password" })),
        )
        .await;
    let uri = format!("/users/activate/{}", body["token"].as_str().unwrap());

    // Not activated yet, so no token.
    let (status, _) = app
        .send(
            "POST",
            "/authentication/token",
            None,
            Some(json!({ "email": "alice@x.com", "password": "password" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    assert_eq!(app.send("PUT", &uri, None, None).await.0, StatusCode::OK);
    let (status, body) = app.send("PUT", &uri, None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "invalid activation token");
}

#[tokio::test]
async fn wrong_password_is_unauthorized() {
    let app = app();
    app.signed_in("alice").await;
    let (status, _) = app
        .send(
            "POST",
            "/authentication/token",
            None,
            Some(json!({ "email": "alice@x.com", "password": "wrong-password" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn invalid_payloads_are_bad_requests() {
    let app = app();
    let (_, token) = app.signed_in("alice").await;

    let (status, body) = app
        .send("POST", "/posts", Some(&token), Some(json!({ "title": "", "content": "x" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "title is required");

    let (status, _) = app
        .send("POST", "/posts", Some(&token), Some(json!({ "title": "t", "content": "x", "owner": 1 })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .send("GET", "/users/feed?sort=sideways", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("asc or desc"));

    let (status, body) = app.send("GET", "/posts/abc", Some(&token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn feed_accepts_filters() {
    let app = app();
    let (_, token) = app.signed_in("alice").await;
    app.create_post(&token, "tagged").await;

    let (status, feed) = app
        .send("GET", "/users/feed?limit=5&offset=0&sort=asc&search=tag&tags=intro", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(feed.as_array().unwrap().len(), 1);

    let (status, feed) = app
        .send("GET", "/users/feed?search=nothing-matches", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(feed.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn get_user_returns_public_fields() {
    let app = app();
    let (alice_id, token) = app.signed_in("alice").await;

    let (status, body) = app
        .send("GET", &format!("/users/{}", alice_id), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "alice");
    assert!(body.get("password").is_none());

    let (status, _) = app.send("GET", "/users/9999", Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_requires_basic_auth() {
    let app = app();

    let response = app
        .router
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));

    let basic = |creds: &str| {
        Request::get("/health")
            .header(header::AUTHORIZATION, format!("Basic {}", B64.encode(creds)))
            .body(Body::empty())
            .unwrap()
    };

    let (status, _) = app.request(basic("admin:wrong")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app.request(basic("admin:admin")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["env"], "development");
}

#[tokio::test]
async fn unknown_route_is_json_not_found() {
    let app = app();
    let (status, body) = app.send("GET", "/nowhere", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "route not found");
}

#[tokio::test]
async fn wrong_method_is_json_method_not_allowed() {
    let app = app();
    let (status, body) = app.send("GET", "/authentication/users", None, None).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body["error"], "method not allowed");
}

#[tokio::test]
async fn responses_carry_a_request_id() {
    let app = app();

    let response = app
        .router
        .clone()
        .oneshot(Request::get("/nowhere").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let generated = response.headers().get("x-request-id").unwrap();
    assert!(!generated.is_empty());

    let response = app
        .router
        .clone()
        .oneshot(
            Request::get("/nowhere")
                .header("x-request-id", "req-42")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.headers().get("x-request-id").unwrap(), "req-42");
}

async fn explode() -> &'static str {
    panic!("handler blew up")
}

async fn dawdle() -> &'static str {
    tokio::time::sleep(Duration::from_secs(120)).await;
    "too late"
}

fn bare(router: Router) -> TestApp {
    let app = app();
    TestApp {
        router: with_middleware(router, Duration::from_secs(60)),
        state: app.state,
        db: app.db,
    }
}

#[tokio::test]
async fn handler_panic_is_a_json_internal_error() {
    let app = bare(Router::new().route("/explode", get(explode)));
    let (status, body) = app.send("GET", "/explode", None, None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("could not process"));
    assert!(!body["error"].as_str().unwrap().contains("blew up"));
}

#[tokio::test(start_paused = true)]
async fn slow_requests_hit_the_deadline() {
    let app = bare(Router::new().route("/dawdle", get(dawdle)));
    let (status, body) = app.send("GET", "/dawdle", None, None).await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(body["error"], "request timed out");
}
