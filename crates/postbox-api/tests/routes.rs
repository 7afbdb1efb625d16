use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use postbox_api::token::TokenService;
use postbox_api::{AppStateInner, router};
use postbox_db::Database;

const SECRET: &str = "integration-secret";

fn app() -> Router {
    let state = Arc::new(AppStateInner {
        db: Database::open_in_memory().unwrap(),
        tokens: TokenService::new(SECRET),
    });
    router(state)
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

async fn register_and_login(app: &Router, username: &str, password: &str) -> String {
    let creds = json!({ "username": username, "password": password });
    let (status, _) = send(app, post_json("/register", creds.clone())).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(app, post_json("/login", creds)).await;
    assert_eq!(status, StatusCode::OK);
    body["token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn submitted_message_can_be_fetched_by_id() {
    let app = app();
    let (status, body) = send(
        &app,
        post_json(
            "/api/messages",
            json!({ "name": "Ann", "email": "ann@example.com", "message": "Hello there" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "Message sent successfully.");
    let created = &body["data"];
    assert!(created["createdAt"].is_string());

    let id = created["id"].as_str().unwrap();
    let (status, fetched) = send(&app, get(&format!("/api/messages/{id}"), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&fetched, created);
}

#[tokio::test]
async fn missing_or_empty_fields_are_rejected() {
    let app = app();
    let token = register_and_login(&app, "reader", "pw").await;

    let bad_bodies = [
        json!({ "email": "ann@example.com", "message": "hi" }),
        json!({ "name": "Ann", "message": "hi" }),
        json!({ "name": "Ann", "email": "ann@example.com" }),
        json!({ "name": "", "email": "ann@example.com", "message": "hi" }),
        json!({}),
    ];
    for body in bad_bodies {
        let (status, resp) = send(&app, post_json("/api/messages", body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(resp["error"], "All fields are required.");
    }

    let (status, list) = send(&app, get("/api/messages", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list, json!([]));
}

#[tokio::test]
async fn malformed_body_uses_error_shape() {
    let app = app();
    let req = Request::builder()
        .method("POST")
        .uri("/api/messages")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn listing_requires_a_valid_token() {
    let app = app();

    let (status, body) = send(&app, get("/api/messages", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "No token provided");

    let (status, body) = send(&app, get("/api/messages", Some("garbage"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid token");

    let foreign = TokenService::new("some-other-secret")
        .issue(Uuid::new_v4(), "mallory")
        .unwrap();
    let (status, _) = send(&app, get("/api/messages", Some(&foreign))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    for text in ["one", "two"] {
        let (status, _) = send(
            &app,
            post_json(
                "/api/messages",
                json!({ "name": "Ann", "email": "ann@example.com", "message": text }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let token = register_and_login(&app, "reader", "pw").await;
    let (status, list) = send(&app, get("/api/messages", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    let texts: Vec<&str> = list
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["message"].as_str().unwrap())
        .collect();
    assert_eq!(texts, vec!["one", "two"]);
}

#[tokio::test]
async fn duplicate_username_is_rejected() {
    let app = app();
    let creds = json!({ "username": "bob", "password": "hunter22" });

    let (status, body) = send(&app, post_json("/register", creds.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "User registered successfully");

    let (status, body) = send(&app, post_json("/register", json!({ "username": "bob", "password": "other" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Username already exists");

    // The first password still works, so no second record replaced it.
    let (status, _) = send(&app, post_json("/login", creds)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn register_requires_both_fields() {
    let app = app();
    let (status, body) = send(&app, post_json("/register", json!({ "username": "carol" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn login_flow() {
    let app = app();

    let (status, _) = send(
        &app,
        post_json("/register", json!({ "username": "alice", "password": "secret123" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(
        &app,
        post_json("/login", json!({ "username": "alice", "password": "wrong" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid username or password");

    let (status, _) = send(
        &app,
        post_json("/login", json!({ "username": "nobody", "password": "secret123" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(
        &app,
        post_json("/login", json!({ "username": "alice", "password": "secret123" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Login successful");
    let token = body["token"].as_str().unwrap();
    assert!(!token.is_empty());

    let claims = TokenService::new(SECRET).verify(token).unwrap();
    assert_eq!(claims.username, "alice");
}

#[tokio::test]
async fn protected_route_echoes_identity() {
    let app = app();

    let (status, _) = send(&app, get("/protected", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let token = register_and_login(&app, "dave", "pw").await;
    let (status, body) = send(&app, get("/protected", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "You have access to this route");
    assert_eq!(body["user"]["username"], "dave");
    assert!(body["user"]["id"].is_string());
    assert!(body["user"]["exp"].is_number());
}

#[tokio::test]
async fn unknown_or_malformed_message_id_is_not_found() {
    let app = app();

    let (status, body) = send(&app, get("/api/messages/not-an-id", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Message not found.");

    let (status, _) = send(&app, get(&format!("/api/messages/{}", Uuid::new_v4()), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Percent-decodes to a byte that is not UTF-8.
    let (status, body) = send(&app, get("/api/messages/%FF", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Message not found.");
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_registrations_of_one_name_store_one_user() {
    let state = Arc::new(AppStateInner {
        db: Database::open_in_memory().unwrap(),
        tokens: TokenService::new(SECRET),
    });
    let app = router(state.clone());

    let (first, second) = tokio::join!(
        send(&app, post_json("/register", json!({ "username": "erin", "password": "first-pw" }))),
        send(&app, post_json("/register", json!({ "username": "erin", "password": "second-pw" }))),
    );

    let mut statuses = vec![first.0, second.0];
    statuses.sort();
    assert_eq!(statuses, vec![StatusCode::CREATED, StatusCode::BAD_REQUEST]);

    let loser = if first.0 == StatusCode::BAD_REQUEST { &first.1 } else { &second.1 };
    assert_eq!(loser["error"], "Username already exists");

    let stored: i64 = state
        .db
        .with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM users WHERE username = 'erin'",
                [],
                |row| row.get(0),
            )?)
        })
        .unwrap();
    assert_eq!(stored, 1);
}
