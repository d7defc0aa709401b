use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{Duration, TimeZone, Utc};

use consultation_cell::{ConsultationError, ConsultationStatus, MatchRequestBroker, NewConsultation};
use presence_cell::PresenceRegistry;
use shared_database::{ChangeBus, MemoryRecordStore, RecordStore};
use shared_models::identity::PatientIdentity;
use shared_utils::test_utils::ManualClock;

struct Fixture {
    broker: MatchRequestBroker,
    presence: PresenceRegistry,
    clock: ManualClock,
    store: MemoryRecordStore,
}

fn setup() -> Fixture {
    let store = MemoryRecordStore::default();
    let clock = ManualClock::new(Utc.timestamp_millis_opt(1_700_000_000_000).unwrap());
    let bus = ChangeBus::new();
    let presence = PresenceRegistry::new(
        Arc::new(store.clone()),
        bus.clone(),
        Arc::new(clock.clone()),
        Duration::minutes(5),
    );
    let broker = MatchRequestBroker::new(
        Arc::new(store.clone()),
        bus,
        Arc::new(clock.clone()),
        presence.clone(),
    );
    Fixture {
        broker,
        presence,
        clock,
        store,
    }
}

fn new_request(patient_id: &str, doctor_id: &str) -> NewConsultation {
    NewConsultation {
        patient_id: patient_id.to_string(),
        patient: PatientIdentity {
            name: "Pat Doe".to_string(),
            phone: "0800".to_string(),
            email: "pat@example.com".to_string(),
        },
        doctor_id: doctor_id.to_string(),
        doctor_name: "Dr. Ada".to_string(),
        specialty: Some("cardiology".to_string()),
        message: None,
    }
}

#[tokio::test]
async fn offline_doctor_cannot_be_requested() {
    let f = setup();

    let result = f.broker.request(new_request("P1", "D1")).await;
    assert_matches!(result, Err(ConsultationError::DoctorOffline(id)) if id == "D1");

    f.presence.heartbeat("D1").await.unwrap();
    f.clock.advance(Duration::minutes(6));
    let result = f.broker.request(new_request("P1", "D1")).await;
    assert_matches!(result, Err(ConsultationError::DoctorOffline(_)));
}

#[tokio::test]
async fn repeat_request_is_a_duplicate() {
    let f = setup();
    f.presence.heartbeat("D1").await.unwrap();

    let first = f.broker.request(new_request("P1", "D1")).await.unwrap();
    assert_eq!(first.id, "REQ-1700000000000");
    assert_eq!(first.status, ConsultationStatus::Pending);

    f.clock.advance(Duration::seconds(5));
    let second = f.broker.request(new_request("P1", "D1")).await;
    assert_matches!(
        second,
        Err(ConsultationError::DuplicateRequest { existing_id, room_id: None }) if existing_id == first.id
    );

    assert_eq!(f.store.list("requests/").await.unwrap().len(), 1);
}

#[tokio::test]
async fn duplicate_of_accepted_request_returns_room() {
    let f = setup();
    f.presence.heartbeat("D1").await.unwrap();

    let first = f.broker.request(new_request("P1", "D1")).await.unwrap();
    let room_id = f.broker.accept(&first.id, "D1").await.unwrap();
    assert_eq!(room_id, "instant-REQ-1700000000000");

    let again = f.broker.request(new_request("P1", "D1")).await;
    assert_matches!(
        again,
        Err(ConsultationError::DuplicateRequest { room_id: Some(room), .. }) if room == room_id
    );
}

#[tokio::test]
async fn accepted_request_is_reported_after_doctor_goes_offline() {
    let f = setup();
    f.presence.heartbeat("D1").await.unwrap();

    let first = f.broker.request(new_request("P1", "D1")).await.unwrap();
    let room_id = f.broker.accept(&first.id, "D1").await.unwrap();

    f.clock.advance(Duration::minutes(6));
    assert!(!f.presence.is_online("D1").await.unwrap());

    let again = f.broker.request(new_request("P1", "D1")).await;
    assert_matches!(
        again,
        Err(ConsultationError::DuplicateRequest { room_id: Some(room), .. }) if room == room_id
    );
}

#[tokio::test]
async fn ids_with_separators_are_rejected() {
    let f = setup();
    f.presence.heartbeat("D1").await.unwrap();

    let result = f.broker.request(new_request("P1/D2", "D1")).await;
    assert_matches!(result, Err(ConsultationError::ValidationError(_)));

    let result = f.broker.request(new_request("P1", "D1/x")).await;
    assert_matches!(result, Err(ConsultationError::ValidationError(_)));

    assert!(f.store.list("requests-open/").await.unwrap().is_empty());
}

#[tokio::test]
async fn accept_sets_room_and_timestamp() {
    let f = setup();
    f.presence.heartbeat("D1").await.unwrap();
    let request = f.broker.request(new_request("P1", "D1")).await.unwrap();

    f.broker.accept(&request.id, "D1").await.unwrap();

    let stored = f.broker.get(&request.id).await.unwrap();
    assert_eq!(stored.status, ConsultationStatus::Accepted);
    assert_eq!(stored.room_id.as_deref(), Some("instant-REQ-1700000000000"));
    assert!(stored.accepted_at.is_some());

    let again = f.broker.reject(&request.id, "D1").await;
    assert_matches!(again, Err(ConsultationError::RequestAlreadyResolved { .. }));
}

#[tokio::test]
async fn other_doctor_is_unauthorized() {
    let f = setup();
    f.presence.heartbeat("D1").await.unwrap();
    let request = f.broker.request(new_request("P1", "D1")).await.unwrap();

    assert_matches!(
        f.broker.accept(&request.id, "D2").await,
        Err(ConsultationError::Unauthorized)
    );
    assert_matches!(
        f.broker.accept("REQ-1", "D1").await,
        Err(ConsultationError::NotFound(_))
    );
    assert_eq!(
        f.broker.get(&request.id).await.unwrap().status,
        ConsultationStatus::Pending
    );
}

#[tokio::test]
async fn resolution_frees_the_pair() {
    let f = setup();
    f.presence.heartbeat("D1").await.unwrap();

    let first = f.broker.request(new_request("P1", "D1")).await.unwrap();
    f.broker.reject(&first.id, "D1").await.unwrap();

    f.clock.advance(Duration::seconds(1));
    let second = f.broker.request(new_request("P1", "D1")).await.unwrap();
    assert_ne!(second.id, first.id);

    f.broker.cancel(&second.id, "P1").await.unwrap();
    let third = f.broker.request(new_request("P1", "D1")).await.unwrap();
    f.broker.accept(&third.id, "D1").await.unwrap();
    f.broker.complete(&third.id, "P1").await.unwrap();

    assert!(f.store.get("requests-open/P1/D1").await.unwrap().is_none());
}

#[tokio::test]
async fn same_millisecond_requests_get_distinct_ids() {
    let f = setup();
    f.presence.heartbeat("D1").await.unwrap();

    let first = f.broker.request(new_request("P1", "D1")).await.unwrap();
    let second = f.broker.request(new_request("P2", "D1")).await.unwrap();

    assert_eq!(first.id, "REQ-1700000000000");
    assert_eq!(second.id, "REQ-1700000000001");
}

#[tokio::test]
async fn listings_hide_stale_clutter() {
    let f = setup();
    f.presence.heartbeat("D1").await.unwrap();

    let rejected = f.broker.request(new_request("P1", "D1")).await.unwrap();
    f.broker.reject(&rejected.id, "D1").await.unwrap();

    f.clock.advance(Duration::seconds(1));
    let cancelled = f.broker.request(new_request("P1", "D1")).await.unwrap();
    f.broker.cancel(&cancelled.id, "P1").await.unwrap();

    f.clock.advance(Duration::seconds(1));
    let open = f.broker.request(new_request("P1", "D1")).await.unwrap();

    let doctor_view: Vec<String> = f
        .broker
        .list_for_doctor("D1")
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(doctor_view, vec![open.id.clone(), rejected.id.clone()]);

    let patient_view: Vec<String> = f
        .broker
        .list_for_patient("P1")
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(patient_view, vec![open.id, cancelled.id]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_leave_one_record() {
    let f = setup();
    f.presence.heartbeat("D1").await.unwrap();

    let attempts = (0..12).map(|_| {
        let broker = f.broker.clone();
        tokio::spawn(async move { broker.request(new_request("P1", "D1")).await })
    });
    let results = futures::future::join_all(attempts).await;

    let created = results
        .into_iter()
        .map(|joined| joined.unwrap())
        .filter(|result| result.is_ok())
        .count();
    assert_eq!(created, 1);
    assert_eq!(f.store.list("requests/").await.unwrap().len(), 1);
}
