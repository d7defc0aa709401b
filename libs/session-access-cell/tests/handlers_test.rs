use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use chrono::{NaiveDate, NaiveTime};
use serde_json::Value;
use tower::ServiceExt;

use appointment_cell::{Actor, AppointmentStatus, NewBooking, SlotLedger};
use consultation_cell::{MatchRequestBroker, NewConsultation};
use presence_cell::PresenceRegistry;
use session_access_cell::session_routes;
use shared_database::AppState;
use shared_models::identity::PatientIdentity;
use shared_utils::test_utils::{JwtTestUtils, ManualClock, TestConfig, TestUser};

fn test_state() -> Arc<AppState> {
    Arc::new(
        AppState::in_memory(TestConfig::default().to_offline_app_config())
            .with_clock(Arc::new(ManualClock::fixture())),
    )
}

fn join(uri: &str, user: &TestUser) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("Authorization", JwtTestUtils::bearer(user))
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn contact() -> PatientIdentity {
    PatientIdentity {
        name: "Pat Doe".to_string(),
        phone: "0800".to_string(),
        email: "pat@example.com".to_string(),
    }
}

async fn accepted_request(state: &AppState) -> String {
    PresenceRegistry::from_state(state).heartbeat("D1").await.unwrap();
    let broker = MatchRequestBroker::from_state(state);
    let request = broker
        .request(NewConsultation {
            patient_id: "P1".to_string(),
            patient: contact(),
            doctor_id: "D1".to_string(),
            doctor_name: "Dr. Ada".to_string(),
            specialty: None,
            message: None,
        })
        .await
        .unwrap();
    broker.accept(&request.id, "D1").await.unwrap();
    request.id
}

#[tokio::test]
async fn parties_join_accepted_consultation() {
    let state = test_state();
    let request_id = accepted_request(&state).await;
    let uri = format!("/consultations/{}/join", request_id);

    let patient = TestUser::patient("pat@example.com").with_id("P1");
    let response = session_routes(state.clone())
        .oneshot(join(&uri, &patient))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["room_id"], format!("instant-{}", request_id));
    assert_eq!(json["role"], "patient");

    let doctor = TestUser::doctor("d1@example.com").with_id("D1");
    let response = session_routes(state).oneshot(join(&uri, &doctor)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn mismatched_patient_is_refused_without_details() {
    let state = test_state();
    let request_id = accepted_request(&state).await;

    let impostor = TestUser::patient("other@example.com")
        .with_id("P2")
        .with_phone("0999");
    let response = session_routes(state.clone())
        .oneshot(join(&format!("/consultations/{}/join", request_id), &impostor))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let denied = body_json(response).await;

    // Unknown ids are indistinguishable from denials.
    let response = session_routes(state)
        .oneshot(join("/consultations/REQ-1/join", &impostor))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await, denied);
}

#[tokio::test]
async fn appointment_join_requires_confirmation() {
    let state = test_state();
    let ledger = SlotLedger::from_state(&state);
    let appointment = ledger
        .book(NewBooking {
            doctor_id: "D1".to_string(),
            doctor_name: "Dr. Ada".to_string(),
            specialty: "cardiology".to_string(),
            date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            patient: contact(),
            patient_id: Some("P1".to_string()),
            notes: None,
        })
        .await
        .unwrap();

    let patient = TestUser::patient("pat@example.com").with_id("P1");
    let uri = format!("/appointments/{}/join", appointment.id);

    let response = session_routes(state.clone())
        .oneshot(join(&uri, &patient))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    ledger
        .transition(&appointment.id, AppointmentStatus::Confirmed, &Actor::admin())
        .await
        .unwrap();

    let response = session_routes(state).oneshot(join(&uri, &patient)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["room_id"], "appointment-A001");
}
