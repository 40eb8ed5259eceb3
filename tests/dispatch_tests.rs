//! Dispatch engine tests against a wiremock messaging gateway.

mod test_utils;

use std::time::Duration;

use campaigns::dispatch::DispatchError;
use campaigns::models::{CampaignStatus, DeliveryStatus, DeviceStatus};
use campaigns::repositories::{DeliveryRecorder, DeviceRepository};
use chrono::Utc;
use sea_orm::{ConnectionTrait, Statement};
use serde_json::json;
use test_utils::*;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SEND_PATH: &str = "/api/message/send-text";

fn accepted() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "success": true, "message": "sent" }))
}

async fn mount_accepting(server: &MockServer, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path(SEND_PATH))
        .and(header("authorization", format!("Bearer {TEST_TOKEN}").as_str()))
        .and(header("content-type", "application/json"))
        .respond_with(accepted())
        .expect(expected_calls)
        .mount(server)
        .await;
}

#[tokio::test]
async fn partial_delivery_leaves_campaign_in_progress() {
    let db = setup_test_db().await.unwrap();
    let server = MockServer::start().await;
    let fixture = campaign_fixture(
        &db,
        &["+6281100000001", "+6281100000002", "+6281100000003"],
        Some(Utc::now()),
    )
    .await
    .unwrap();

    for number in ["+6281100000001", "+6281100000002"] {
        Mock::given(method("POST"))
            .and(path(SEND_PATH))
            .and(body_partial_json(json!({ "number": number })))
            .respond_with(accepted())
            .expect(1)
            .mount(&server)
            .await;
    }
    Mock::given(method("POST"))
        .and(path(SEND_PATH))
        .and(body_partial_json(json!({ "number": "+6281100000003" })))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>upstream hiccup</html>"))
        .expect(1)
        .mount(&server)
        .await;

    let report = dispatcher(&db, &server.uri())
        .dispatch(fixture.campaign.id, None)
        .await
        .expect("dispatch runs");

    assert_eq!(report.status, CampaignStatus::InProgress);
    assert_eq!(report.recipients, 3);
    assert_eq!(report.delivered, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(
        campaign_status(&db, fixture.campaign.id).await.unwrap(),
        CampaignStatus::InProgress
    );

    let records = DeliveryRecorder::new(db.clone())
        .list_for_campaign(fixture.campaign.id)
        .await
        .unwrap();
    assert_eq!(records.len(), 3);

    let failed: Vec<_> = records
        .iter()
        .filter(|r| r.status == DeliveryStatus::Failed)
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].contact_id, fixture.contacts[2].id);
    assert!(
        failed[0]
            .error
            .as_deref()
            .unwrap_or_default()
            .starts_with("malformed_response")
    );
}

#[tokio::test]
async fn full_delivery_completes_campaign_with_expected_payload() {
    let db = setup_test_db().await.unwrap();
    let server = MockServer::start().await;
    let fixture = campaign_fixture(&db, &["+6281200000001", "+6281200000002"], None)
        .await
        .unwrap();

    Mock::given(method("POST"))
        .and(path(SEND_PATH))
        .and(header("authorization", format!("Bearer {TEST_TOKEN}").as_str()))
        .and(body_partial_json(json!({
            "number": "+6281200000001",
            "message": "Hello from the campaign"
        })))
        .respond_with(accepted())
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(SEND_PATH))
        .and(body_partial_json(json!({
            "number": "+6281200000002",
            "message": "Hello from the campaign"
        })))
        .respond_with(accepted())
        .expect(1)
        .mount(&server)
        .await;

    let report = dispatcher(&db, &server.uri())
        .dispatch(fixture.campaign.id, None)
        .await
        .unwrap();

    assert!(report.is_completed());
    assert_eq!(report.delivered, 2);
    assert!(report.finished_at >= report.started_at);
    assert_eq!(
        campaign_status(&db, fixture.campaign.id).await.unwrap(),
        CampaignStatus::Completed
    );
    assert_eq!(
        DeliveryRecorder::new(db.clone())
            .count_for_campaign(fixture.campaign.id, Some(DeliveryStatus::Success))
            .await
            .unwrap(),
        2
    );
}

#[tokio::test]
async fn override_message_replaces_campaign_message() {
    let db = setup_test_db().await.unwrap();
    let server = MockServer::start().await;
    let fixture = campaign_fixture(&db, &["+6281300000001"], None)
        .await
        .unwrap();

    Mock::given(method("POST"))
        .and(path(SEND_PATH))
        .and(body_partial_json(json!({ "message": "Flash sale today" })))
        .respond_with(accepted())
        .expect(1)
        .mount(&server)
        .await;

    let report = dispatcher(&db, &server.uri())
        .dispatch(fixture.campaign.id, Some("Flash sale today".to_string()))
        .await
        .unwrap();
    assert!(report.is_completed());
}

#[tokio::test]
async fn blank_override_falls_back_to_campaign_message() {
    let db = setup_test_db().await.unwrap();
    let server = MockServer::start().await;
    let fixture = campaign_fixture(&db, &["+6281300000002"], None)
        .await
        .unwrap();

    Mock::given(method("POST"))
        .and(path(SEND_PATH))
        .and(body_partial_json(
            json!({ "message": "Hello from the campaign" }),
        ))
        .respond_with(accepted())
        .expect(1)
        .mount(&server)
        .await;

    let report = dispatcher(&db, &server.uri())
        .dispatch(fixture.campaign.id, Some("   ".to_string()))
        .await
        .unwrap();
    assert!(report.is_completed());
}

#[tokio::test]
async fn rejected_send_is_recorded_as_failed() {
    let db = setup_test_db().await.unwrap();
    let server = MockServer::start().await;
    let fixture = campaign_fixture(&db, &["+6281400000001"], None)
        .await
        .unwrap();

    Mock::given(method("POST"))
        .and(path(SEND_PATH))
        .respond_with(
            ResponseTemplate::new(422).set_body_json(json!({ "error": "number not on network" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let report = dispatcher(&db, &server.uri())
        .dispatch(fixture.campaign.id, None)
        .await
        .unwrap();

    assert_eq!(report.status, CampaignStatus::InProgress);
    assert_eq!(report.failed, 1);

    let records = DeliveryRecorder::new(db.clone())
        .list_for_campaign(fixture.campaign.id)
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, DeliveryStatus::Failed);
    let error = records[0].error.as_deref().unwrap();
    assert!(error.contains("422"));
    assert!(error.contains("number not on network"));
}

#[tokio::test]
async fn success_false_body_is_a_failed_delivery() {
    let db = setup_test_db().await.unwrap();
    let server = MockServer::start().await;
    let fixture = campaign_fixture(&db, &["+6281400000002"], None)
        .await
        .unwrap();

    Mock::given(method("POST"))
        .and(path(SEND_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": false })))
        .mount(&server)
        .await;

    let report = dispatcher(&db, &server.uri())
        .dispatch(fixture.campaign.id, None)
        .await
        .unwrap();
    assert_eq!(report.delivered, 0);
    assert_eq!(report.failed, 1);
}

#[tokio::test]
async fn gateway_timeout_is_recorded_and_dispatch_continues() {
    let db = setup_test_db().await.unwrap();
    let server = MockServer::start().await;
    let fixture = campaign_fixture(&db, &["+6281500000001", "+6281500000002"], None)
        .await
        .unwrap();

    Mock::given(method("POST"))
        .and(path(SEND_PATH))
        .and(body_partial_json(json!({ "number": "+6281500000001" })))
        .respond_with(accepted().set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(SEND_PATH))
        .and(body_partial_json(json!({ "number": "+6281500000002" })))
        .respond_with(accepted())
        .expect(1)
        .mount(&server)
        .await;

    let mut gateway = gateway_config(&server.uri());
    gateway.timeout_ms = 200;

    let report = dispatcher_with(&db, gateway, 1)
        .dispatch(fixture.campaign.id, None)
        .await
        .unwrap();

    assert_eq!(report.delivered, 1);
    assert_eq!(report.failed, 1);

    let records = DeliveryRecorder::new(db.clone())
        .list_for_campaign(fixture.campaign.id)
        .await
        .unwrap();
    let timed_out = records
        .iter()
        .find(|r| r.contact_id == fixture.contacts[0].id)
        .unwrap();
    assert_eq!(timed_out.status, DeliveryStatus::Failed);
    assert!(timed_out.error.as_deref().unwrap().starts_with("timeout"));
}

#[tokio::test]
async fn inactive_device_is_rejected_without_side_effects() {
    let db = setup_test_db().await.unwrap();
    let server = MockServer::start().await;
    mount_accepting(&server, 0).await;
    let fixture = campaign_fixture(&db, &["+6281600000001"], None)
        .await
        .unwrap();
    DeviceRepository::new(db.clone())
        .set_status(fixture.device.id, DeviceStatus::Inactive)
        .await
        .unwrap();

    let err = dispatcher(&db, &server.uri())
        .dispatch(fixture.campaign.id, None)
        .await
        .unwrap_err();

    assert!(matches!(err, DispatchError::DeviceInactive(id) if id == fixture.campaign.id));
    assert_eq!(
        campaign_status(&db, fixture.campaign.id).await.unwrap(),
        CampaignStatus::Pending
    );
    assert_eq!(
        DeliveryRecorder::new(db.clone())
            .count_for_campaign(fixture.campaign.id, None)
            .await
            .unwrap(),
        0
    );
}

#[tokio::test]
async fn campaign_without_recipients_is_rejected() {
    let db = setup_test_db().await.unwrap();
    let server = MockServer::start().await;
    mount_accepting(&server, 0).await;
    let fixture = campaign_fixture(&db, &[], None).await.unwrap();

    let err = dispatcher(&db, &server.uri())
        .dispatch(fixture.campaign.id, None)
        .await
        .unwrap_err();

    assert!(matches!(err, DispatchError::NoRecipients(_)));
    assert_eq!(
        campaign_status(&db, fixture.campaign.id).await.unwrap(),
        CampaignStatus::Pending
    );
}

#[tokio::test]
async fn missing_gateway_credentials_leave_campaign_pending() {
    let db = setup_test_db().await.unwrap();
    let server = MockServer::start().await;
    mount_accepting(&server, 0).await;
    let fixture = campaign_fixture(&db, &["+6281700000001"], None)
        .await
        .unwrap();

    let mut gateway = gateway_config(&server.uri());
    gateway.api_token = None;

    let err = dispatcher_with(&db, gateway, 1)
        .dispatch(fixture.campaign.id, None)
        .await
        .unwrap_err();

    assert!(matches!(err, DispatchError::GatewayMisconfigured(_)));
    assert_eq!(
        campaign_status(&db, fixture.campaign.id).await.unwrap(),
        CampaignStatus::Pending
    );
}

#[tokio::test]
async fn unknown_campaign_is_not_found() {
    let db = setup_test_db().await.unwrap();
    let server = MockServer::start().await;

    let id = uuid::Uuid::new_v4();
    let err = dispatcher(&db, &server.uri())
        .dispatch(id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::NotFound(missing) if missing == id));
}

#[tokio::test]
async fn completed_campaign_is_not_dispatched_again() {
    let db = setup_test_db().await.unwrap();
    let server = MockServer::start().await;
    mount_accepting(&server, 1).await;
    let fixture = campaign_fixture(&db, &["+6281800000001"], None)
        .await
        .unwrap();
    let dispatcher = dispatcher(&db, &server.uri());

    dispatcher.dispatch(fixture.campaign.id, None).await.unwrap();
    let err = dispatcher
        .dispatch(fixture.campaign.id, None)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        DispatchError::NotPending {
            status: CampaignStatus::Completed,
            ..
        }
    ));
}

#[tokio::test]
async fn storage_fault_after_claim_marks_campaign_failed() {
    let db = setup_test_db().await.unwrap();
    let server = MockServer::start().await;
    mount_accepting(&server, 1).await;
    let fixture = campaign_fixture(&db, &["+6281900000001", "+6281900000002"], None)
        .await
        .unwrap();

    db.execute(Statement::from_string(
        db.get_database_backend(),
        "DROP TABLE delivery_records".to_string(),
    ))
    .await
    .unwrap();

    let err = dispatcher(&db, &server.uri())
        .dispatch(fixture.campaign.id, None)
        .await
        .unwrap_err();

    assert!(matches!(err, DispatchError::Aborted { id, .. } if id == fixture.campaign.id));
    assert_eq!(
        campaign_status(&db, fixture.campaign.id).await.unwrap(),
        CampaignStatus::Failed
    );
}

#[tokio::test]
async fn concurrent_dispatch_sends_each_message_once() {
    let db = setup_test_db().await.unwrap();
    let server = MockServer::start().await;
    mount_accepting(&server, 2).await;
    let fixture = campaign_fixture(&db, &["+6282000000001", "+6282000000002"], None)
        .await
        .unwrap();

    let first = dispatcher(&db, &server.uri());
    let second = dispatcher(&db, &server.uri());

    let (a, b) = tokio::join!(
        first.dispatch(fixture.campaign.id, None),
        second.dispatch(fixture.campaign.id, None)
    );

    let winners = [&a, &b].iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    let loser = if a.is_ok() { b } else { a };
    assert!(matches!(
        loser,
        Err(DispatchError::ClaimLost(_)) | Err(DispatchError::NotPending { .. })
    ));

    assert_eq!(
        DeliveryRecorder::new(db.clone())
            .count_for_campaign(fixture.campaign.id, None)
            .await
            .unwrap(),
        2
    );
}

#[tokio::test]
async fn bounded_fan_out_delivers_to_every_recipient() {
    let db = setup_test_db().await.unwrap();
    let server = MockServer::start().await;
    mount_accepting(&server, 5).await;
    let numbers = [
        "+6282100000001",
        "+6282100000002",
        "+6282100000003",
        "+6282100000004",
        "+6282100000005",
    ];
    let fixture = campaign_fixture(&db, &numbers, None).await.unwrap();

    let report = dispatcher_with(&db, gateway_config(&server.uri()), 3)
        .dispatch(fixture.campaign.id, None)
        .await
        .unwrap();

    assert!(report.is_completed());
    assert_eq!(report.delivered, 5);
    assert_eq!(
        DeliveryRecorder::new(db.clone())
            .count_for_campaign(fixture.campaign.id, Some(DeliveryStatus::Success))
            .await
            .unwrap(),
        5
    );
}
