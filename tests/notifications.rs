//! Notification Tests
//!
//! Covers creation/targeting, the merged feed (explicit + synthetic rows),
//! read-state transitions, per-account soft delete, and the read-sync events
//! pushed to the caller's own sessions.

mod common;

use axum::http::StatusCode;
use common::{app, FEED_LOCK};
use serde_json::{json, Value};
use sqlx::Row;
use uuid::Uuid;

use tailward::app::presence::PresenceRegistry;

fn find_item<'a>(items: &'a [Value], id: Uuid) -> Option<&'a Value> {
    let id = id.to_string();
    items.iter().find(|item| item["id"] == id.as_str())
}

async fn list_items(path_account: Uuid) -> Vec<Value> {
    let app = app().await;
    let resp = app
        .get("/notifications?page_size=100", Some(path_account))
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    resp.json()["items"].as_array().cloned().unwrap_or_default()
}

async fn unread_total(account: Uuid) -> i64 {
    let app = app().await;
    let resp = app
        .get("/notifications/unread-count", Some(account))
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    resp.json()["unread"].as_i64().unwrap()
}

// ===========================================================================
// Creation & targeting
// ===========================================================================

#[tokio::test]
async fn targeted_notification_creates_single_unread_record() {
    let app = app().await;
    let recipient = app.create_client("tgt_recipient").await;
    let bystander = app.create_client("tgt_bystander").await;

    let notif = app
        .create_targeted(recipient.id, None, "Appointment Confirmed")
        .await;

    let row_count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM notification_recipients WHERE notification_id = $1",
    )
    .bind(notif)
    .fetch_one(app.pool())
    .await
    .unwrap();
    assert_eq!(row_count, 1);

    let items = list_items(recipient.id).await;
    let item = find_item(&items, notif).expect("recipient should see the notification");
    assert_eq!(item["is_read"], json!(false));
    assert_eq!(item["target_type"], json!("specific"));
    assert_eq!(item["type_name"], json!("appointment_update"));
    assert!(item["delivered_at"].is_string());

    let items = list_items(bystander.id).await;
    assert!(find_item(&items, notif).is_none());
}

#[tokio::test]
async fn broadcast_marks_creator_read_and_fans_out() {
    let app = app().await;
    let creator = app.create_client("bc_creator").await;
    let other = app.create_client("bc_other").await;

    let _guard = FEED_LOCK.lock().await;
    let notif = app
        .create_broadcast(Some(creator.id), "New Pet Care Tip")
        .await;

    let items = list_items(creator.id).await;
    let item = find_item(&items, notif).expect("creator should see own broadcast");
    assert_eq!(item["is_read"], json!(true));

    let items = list_items(other.id).await;
    let item = find_item(&items, notif).expect("other client should see broadcast");
    assert_eq!(item["is_read"], json!(false));
    // Eagerly materialized, not synthetic.
    assert!(item["delivered_at"].is_string());
}

#[tokio::test]
async fn broadcast_excludes_staff_and_deleted_accounts() {
    let app = app().await;
    let staff = app.create_account("bc_staff", "staff").await;
    let deleted = app.create_client("bc_deleted").await;
    sqlx::query("UPDATE accounts SET is_deleted = TRUE WHERE id = $1")
        .bind(deleted.id)
        .execute(app.pool())
        .await
        .unwrap();

    let _guard = FEED_LOCK.lock().await;
    let notif = app.create_broadcast(None, "Clinic Hours Update").await;

    for account in [staff.id, deleted.id] {
        let row: Option<bool> = sqlx::query_scalar(
            "SELECT is_read FROM notification_recipients \
             WHERE account_id = $1 AND notification_id = $2",
        )
        .bind(account)
        .bind(notif)
        .fetch_optional(app.pool())
        .await
        .unwrap();
        assert!(row.is_none(), "no row should be materialized");
    }
}

#[tokio::test]
async fn synthetic_fallback_covers_accounts_created_after_broadcast() {
    let app = app().await;

    let _guard = FEED_LOCK.lock().await;
    let notif = app.create_broadcast(None, "New Vaccination Video").await;
    let late = app.create_client("late_arrival").await;

    let items = list_items(late.id).await;
    let item = find_item(&items, notif).expect("late account should see broadcast");
    assert_eq!(item["is_read"], json!(false));
    // Synthetic: no stored delivery row yet.
    assert!(item["delivered_at"].is_null());

    let resp = app
        .get("/notifications/unread-count", Some(late.id))
        .await;
    let body = resp.json();
    assert!(body["breakdown"]["synthetic"].as_i64().unwrap() >= 1);
    assert_eq!(
        body["unread"].as_i64().unwrap(),
        body["breakdown"]["explicit"].as_i64().unwrap()
            + body["breakdown"]["synthetic"].as_i64().unwrap()
    );
}

#[tokio::test]
async fn unknown_notification_type_rejected() {
    let app = app().await;
    let recipient = app.create_client("unknown_type").await;

    let resp = app
        .post_admin(
            "/notifications",
            json!({
                "type_id": 999,
                "title": "Mystery",
                "message": "m",
                "target_type": "specific",
                "recipient_id": recipient.id,
            }),
            Some(app.admin_token()),
        )
        .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.error_message(), "unknown notification type");
}

#[tokio::test]
async fn specific_targeting_requires_recipient() {
    let app = app().await;

    let resp = app
        .post_admin(
            "/notifications",
            json!({
                "type_id": 4,
                "title": "No recipient",
                "message": "m",
                "target_type": "specific",
            }),
            Some(app.admin_token()),
        )
        .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn create_notification_requires_admin_token() {
    let app = app().await;

    let resp = app
        .post_admin(
            "/notifications",
            json!({
                "type_id": 4,
                "title": "t",
                "message": "m",
                "target_type": "all",
            }),
            None,
        )
        .await;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);
}

// ===========================================================================
// Read state
// ===========================================================================

#[tokio::test]
async fn mark_read_decrements_unread_and_syncs_sessions() {
    let app = app().await;
    let account = app.create_client("read_sync").await;
    let notif = app
        .create_targeted(account.id, None, "Appointment Rescheduled")
        .await;

    let _guard = FEED_LOCK.lock().await;
    let before = unread_total(account.id).await;

    // Two open devices, both attached to the hub.
    let registry = PresenceRegistry::new(app.state.db.clone());
    let session_a = Uuid::new_v4();
    let session_b = Uuid::new_v4();
    registry.join(account.id, session_a, Some("device-a")).await.unwrap();
    registry.join(account.id, session_b, Some("device-b")).await.unwrap();
    let mut rx_a = app.state.hub.attach(session_a).await;
    let mut rx_b = app.state.hub.attach(session_b).await;

    let resp = app
        .post(&format!("/notifications/{}/read", notif), Some(account.id))
        .await;
    assert_eq!(resp.status, StatusCode::NO_CONTENT);

    assert_eq!(unread_total(account.id).await, before - 1);

    for rx in [&mut rx_a, &mut rx_b] {
        let event = rx.try_recv().expect("expected a read event on each session");
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], json!("notification_read"));
        assert_eq!(value["data"]["notification_id"], json!(notif.to_string()));
    }

    app.state.hub.detach(session_a).await;
    app.state.hub.detach(session_b).await;
    registry.leave(session_a).await.unwrap();
    registry.leave(session_b).await.unwrap();
}

#[tokio::test]
async fn mark_read_is_idempotent() {
    let app = app().await;
    let account = app.create_client("read_twice").await;
    let notif = app.create_targeted(account.id, None, "Lab Results Ready").await;

    for _ in 0..2 {
        let resp = app
            .post(&format!("/notifications/{}/read", notif), Some(account.id))
            .await;
        assert_eq!(resp.status, StatusCode::NO_CONTENT);
    }

    let (is_read, read_at_set): (bool, bool) = {
        let row = sqlx::query(
            "SELECT is_read, read_at IS NOT NULL AS read_at_set \
             FROM notification_recipients \
             WHERE account_id = $1 AND notification_id = $2",
        )
        .bind(account.id)
        .bind(notif)
        .fetch_one(app.pool())
        .await
        .unwrap();
        (row.get("is_read"), row.get("read_at_set"))
    };
    assert!(is_read);
    assert!(read_at_set);
}

#[tokio::test]
async fn mark_read_materializes_synthetic_entry() {
    let app = app().await;

    let _guard = FEED_LOCK.lock().await;
    let notif = app.create_broadcast(None, "Parasite Season Reminder").await;
    let late = app.create_client("read_synthetic").await;

    let resp = app
        .post(&format!("/notifications/{}/read", notif), Some(late.id))
        .await;
    assert_eq!(resp.status, StatusCode::NO_CONTENT);

    let is_read: bool = sqlx::query_scalar(
        "SELECT is_read FROM notification_recipients \
         WHERE account_id = $1 AND notification_id = $2",
    )
    .bind(late.id)
    .bind(notif)
    .fetch_one(app.pool())
    .await
    .expect("row should have been materialized");
    assert!(is_read);

    let items = list_items(late.id).await;
    let item = find_item(&items, notif).unwrap();
    assert_eq!(item["is_read"], json!(true));
    assert!(item["delivered_at"].is_string());
}

#[tokio::test]
async fn mark_read_on_missing_targeted_record_is_noop() {
    let app = app().await;
    let account = app.create_client("read_missing").await;
    let other = app.create_client("read_missing_other").await;
    let notif = app.create_targeted(other.id, None, "Not Yours").await;

    let resp = app
        .post(&format!("/notifications/{}/read", notif), Some(account.id))
        .await;
    assert_eq!(resp.status, StatusCode::NO_CONTENT);

    let row_count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM notification_recipients \
         WHERE account_id = $1 AND notification_id = $2",
    )
    .bind(account.id)
    .bind(notif)
    .fetch_one(app.pool())
    .await
    .unwrap();
    assert_eq!(row_count, 0, "no row may be materialized for a targeted miss");
}

#[tokio::test]
async fn mark_all_read_covers_explicit_and_synthetic_entries() {
    let app = app().await;

    let _guard = FEED_LOCK.lock().await;
    let account = app.create_client("read_all").await;
    let targeted = app.create_targeted(account.id, None, "Invoice Posted").await;
    let materialized = app.create_broadcast(None, "Holiday Closure").await;
    // Remove the eagerly materialized row so this broadcast is synthetic
    // for the account, as if the account joined after fan-out.
    sqlx::query(
        "DELETE FROM notification_recipients \
         WHERE account_id = $1 AND notification_id = $2",
    )
    .bind(account.id)
    .bind(materialized)
    .execute(app.pool())
    .await
    .unwrap();

    assert!(unread_total(account.id).await >= 2);

    let resp = app.post("/notifications/read-all", Some(account.id)).await;
    assert_eq!(resp.status, StatusCode::NO_CONTENT);

    assert_eq!(unread_total(account.id).await, 0);

    for notif in [targeted, materialized] {
        let is_read: bool = sqlx::query_scalar(
            "SELECT is_read FROM notification_recipients \
             WHERE account_id = $1 AND notification_id = $2",
        )
        .bind(account.id)
        .bind(notif)
        .fetch_one(app.pool())
        .await
        .expect("row should exist after read-all");
        assert!(is_read);
    }
}

// ===========================================================================
// Per-account delete
// ===========================================================================

#[tokio::test]
async fn delete_is_scoped_to_the_calling_account() {
    let app = app().await;
    let deleter = app.create_client("del_caller").await;
    let keeper = app.create_client("del_keeper").await;

    let _guard = FEED_LOCK.lock().await;
    let notif = app.create_broadcast(None, "Weekend Promo").await;

    let resp = app
        .delete(&format!("/notifications/{}", notif), Some(deleter.id))
        .await;
    assert_eq!(resp.status, StatusCode::NO_CONTENT);

    let items = list_items(deleter.id).await;
    assert!(find_item(&items, notif).is_none(), "deleted for the caller");

    let items = list_items(keeper.id).await;
    assert!(find_item(&items, notif).is_some(), "untouched for others");

    // The shared notification row itself is untouched.
    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM notifications WHERE id = $1)")
            .bind(notif)
            .fetch_one(app.pool())
            .await
            .unwrap();
    assert!(exists);
}

#[tokio::test]
async fn delete_suppresses_synthetic_entry() {
    let app = app().await;

    let _guard = FEED_LOCK.lock().await;
    let notif = app.create_broadcast(None, "Grooming Openings").await;
    let late = app.create_client("del_synthetic").await;

    let before = unread_total(late.id).await;

    let resp = app
        .delete(&format!("/notifications/{}", notif), Some(late.id))
        .await;
    assert_eq!(resp.status, StatusCode::NO_CONTENT);

    let items = list_items(late.id).await;
    assert!(find_item(&items, notif).is_none());
    assert_eq!(unread_total(late.id).await, before - 1);
}

// ===========================================================================
// Feed consistency & pagination
// ===========================================================================

#[tokio::test]
async fn unread_count_matches_unread_entries_in_list() {
    let app = app().await;

    let _guard = FEED_LOCK.lock().await;
    let account = app.create_client("consistency").await;
    app.create_targeted(account.id, None, "One").await;
    let read_one = app.create_targeted(account.id, None, "Two").await;
    app.create_broadcast(None, "Three").await;
    app.post(&format!("/notifications/{}/read", read_one), Some(account.id))
        .await;

    let items = list_items(account.id).await;
    let unread_in_list = items
        .iter()
        .filter(|item| item["is_read"] == json!(false))
        .count() as i64;

    assert_eq!(unread_total(account.id).await, unread_in_list);
}

#[tokio::test]
async fn list_paginates_newest_first() {
    let app = app().await;

    let _guard = FEED_LOCK.lock().await;
    let account = app.create_client("paging").await;
    // Suppress broadcasts other tests may have created, so the feed holds
    // exactly the three targeted notifications below.
    sqlx::query(
        "INSERT INTO notification_recipients (account_id, notification_id, is_deleted) \
         SELECT $1, id, TRUE FROM notifications WHERE target_type = 'all' \
         ON CONFLICT (account_id, notification_id) DO NOTHING",
    )
    .bind(account.id)
    .execute(app.pool())
    .await
    .unwrap();

    let mut created = Vec::new();
    for title in ["First", "Second", "Third"] {
        created.push(app.create_targeted(account.id, None, title).await);
    }

    let resp = app
        .get("/notifications?page=1&page_size=2", Some(account.id))
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    let body = resp.json();
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(body["pagination"]["page"], json!(1));
    assert_eq!(body["pagination"]["total"].as_i64().unwrap(), 3);
    assert_eq!(body["pagination"]["pages"].as_i64().unwrap(), 2);
    // Newest first: the last created notification leads the feed.
    assert_eq!(items[0]["id"], json!(created[2].to_string()));

    let resp = app
        .get("/notifications?page=2&page_size=2", Some(account.id))
        .await;
    let body = resp.json();
    assert_eq!(body["items"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn list_rejects_bad_pagination() {
    let app = app().await;
    let account = app.create_client("bad_paging").await;

    let resp = app.get("/notifications?page=0", Some(account.id)).await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);

    let resp = app
        .get("/notifications?page_size=1000", Some(account.id))
        .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
}

// ===========================================================================
// Catalog & auth
// ===========================================================================

#[tokio::test]
async fn notification_type_catalog_is_seeded() {
    let app = app().await;
    let account = app.create_client("catalog").await;

    let resp = app.get("/notification-types", Some(account.id)).await;
    assert_eq!(resp.status, StatusCode::OK);
    let types = resp.json();
    let types = types.as_array().unwrap();
    assert_eq!(types.len(), 6);
    assert_eq!(types[0]["type_name"], json!("forum_update"));
    assert_eq!(types[3]["type_name"], json!("appointment_update"));
}

#[tokio::test]
async fn requests_without_identity_are_rejected() {
    let app = app().await;

    let resp = app.get("/notifications", None).await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);

    let resp = app.get("/notifications/unread-count", None).await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);

    // A syntactically valid but unknown account id is rejected too.
    let resp = app.get("/notifications", Some(Uuid::new_v4())).await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
}
