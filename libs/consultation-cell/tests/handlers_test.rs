use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::{json, Value};
use tower::ServiceExt;

use consultation_cell::router::consultation_routes;
use presence_cell::PresenceRegistry;
use shared_database::AppState;
use shared_utils::test_utils::{JwtTestUtils, ManualClock, TestConfig, TestUser};

fn test_state() -> Arc<AppState> {
    Arc::new(
        AppState::in_memory(TestConfig::default().to_offline_app_config())
            .with_clock(Arc::new(ManualClock::fixture())),
    )
}

async fn body_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn post(uri: &str, user: &TestUser, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("Authorization", JwtTestUtils::bearer(user))
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn request_body() -> Value {
    json!({
        "doctor_id": "D1",
        "doctor_name": "Dr. Ada",
        "message": "Chest pain since this morning"
    })
}

#[tokio::test]
async fn offline_doctor_returns_conflict() {
    let patient = TestUser::patient("p1@example.com").with_id("P1");

    let response = consultation_routes(test_state())
        .oneshot(post("/", &patient, request_body()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn duplicate_request_reports_existing_id() {
    let state = test_state();
    PresenceRegistry::from_state(&state).heartbeat("D1").await.unwrap();
    let patient = TestUser::patient("p1@example.com").with_id("P1").with_name("Pat One");

    let response = consultation_routes(state.clone())
        .oneshot(post("/", &patient, request_body()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body_json(response).await;
    let request_id = created["request"]["id"].as_str().unwrap().to_string();
    assert_eq!(created["request"]["patient"]["name"], "Pat One");

    let response = consultation_routes(state)
        .oneshot(post("/", &patient, request_body()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let json = body_json(response).await;
    assert_eq!(json["existing_request_id"], request_id);
    assert!(json["room_id"].is_null());
}

#[tokio::test]
async fn doctor_accepts_and_gets_room() {
    let state = test_state();
    PresenceRegistry::from_state(&state).heartbeat("D1").await.unwrap();
    let patient = TestUser::patient("p1@example.com").with_id("P1");
    let doctor = TestUser::doctor("d1@example.com").with_id("D1");
    let other_doctor = TestUser::doctor("d2@example.com").with_id("D2");

    let response = consultation_routes(state.clone())
        .oneshot(post("/", &patient, request_body()))
        .await
        .unwrap();
    let request_id = body_json(response).await["request"]["id"]
        .as_str()
        .unwrap()
        .to_string();

    let uri = format!("/{}/accept", request_id);

    let response = consultation_routes(state.clone())
        .oneshot(post(&uri, &patient, json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = consultation_routes(state.clone())
        .oneshot(post(&uri, &other_doctor, json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = consultation_routes(state.clone())
        .oneshot(post(&uri, &doctor, json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["room_id"], format!("instant-{}", request_id));
    assert_eq!(json["request"]["status"], "accepted");

    let response = consultation_routes(state)
        .oneshot(post(&uri, &doctor, json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn doctor_list_requires_doctor_role() {
    let patient = TestUser::patient("p1@example.com");

    let response = consultation_routes(test_state())
        .oneshot(
            Request::builder()
                .uri("/doctor")
                .header("Authorization", JwtTestUtils::bearer(&patient))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

fn get(uri: &str, user: &TestUser) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("Authorization", JwtTestUtils::bearer(user))
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn foreign_request_looks_like_a_missing_one() {
    let state = test_state();
    PresenceRegistry::from_state(&state).heartbeat("D1").await.unwrap();
    let patient = TestUser::patient("p1@example.com").with_id("P1");
    let stranger = TestUser::patient("p2@example.com").with_id("P2");

    let response = consultation_routes(state.clone())
        .oneshot(post("/", &patient, request_body()))
        .await
        .unwrap();
    let request_id = body_json(response).await["request"]["id"]
        .as_str()
        .unwrap()
        .to_string();

    let response = consultation_routes(state.clone())
        .oneshot(get(&format!("/{}", request_id), &stranger))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let foreign = body_json(response).await;

    let response = consultation_routes(state.clone())
        .oneshot(get("/REQ-1", &stranger))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let missing = body_json(response).await;

    assert_eq!(
        foreign["error"].as_str().unwrap().replace(&request_id, "REQ-1"),
        missing["error"].as_str().unwrap()
    );

    let response = consultation_routes(state)
        .oneshot(get(&format!("/{}", request_id), &patient))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
