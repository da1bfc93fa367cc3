mod common;

use common::{create_request, item, TestApp};
use poflow_api::services::purchase_orders::RouteTarget;
use rust_decimal_macros::dec;

#[tokio::test]
async fn upload_stores_the_object_and_records_an_audit_entry() {
    let app = TestApp::new().await;

    let po = app
        .purchase_orders
        .create_purchase_order(app.employee, create_request(vec![item("A", 1, dec!(10))]))
        .await
        .unwrap();

    let attachment = app
        .attachments
        .add_attachment(po.id, app.employee, b"quote.pdf contents".to_vec())
        .await
        .unwrap();
    assert!(attachment.url.contains(&po.po_number));

    assert_eq!(app.storage.uploads().await.len(), 1);

    let history = app
        .purchase_orders
        .workflow_history(po.id, app.employee)
        .await
        .unwrap();
    assert!(history.iter().any(|e| e.action == "add_attachment"));
}

#[tokio::test]
async fn repeat_uploads_by_one_user_stay_distinct() {
    let app = TestApp::new().await;

    let po = app
        .purchase_orders
        .create_purchase_order(app.employee, create_request(vec![item("A", 1, dec!(10))]))
        .await
        .unwrap();

    let first = app
        .attachments
        .add_attachment(po.id, app.employee, b"quote v1".to_vec())
        .await
        .unwrap();
    let second = app
        .attachments
        .add_attachment(po.id, app.employee, b"quote v2".to_vec())
        .await
        .unwrap();

    assert_ne!(first.url, second.url);

    let uploads = app.storage.uploads().await;
    assert_eq!(uploads.len(), 2);
    assert_ne!(uploads[0].0, uploads[1].0);

    let visible = app
        .attachments
        .visible_attachments(po.id, app.employee)
        .await
        .unwrap();
    assert_eq!(visible.len(), 2);
}

#[tokio::test]
async fn strangers_cannot_attach_to_someone_elses_order() {
    let app = TestApp::new().await;

    let po = app
        .purchase_orders
        .create_purchase_order(app.employee, create_request(vec![item("A", 1, dec!(10))]))
        .await
        .unwrap();

    let stranger = poflow_api::Actor::new(uuid::Uuid::new_v4(), poflow_api::UserRole::Employee);
    let err = app
        .attachments
        .add_attachment(po.id, stranger, b"sneaky".to_vec())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        poflow_api::ServiceError::PermissionDenied(_)
    ));
}

#[tokio::test]
async fn procurement_sees_only_pre_routing_uploads_plus_their_own() {
    let app = TestApp::new().await;

    let po = app
        .purchase_orders
        .create_purchase_order(app.employee, create_request(vec![item("A", 1, dec!(10))]))
        .await
        .unwrap();

    // Uploaded before the order reaches procurement.
    let before = app
        .attachments
        .add_attachment(po.id, app.employee, b"original quote".to_vec())
        .await
        .unwrap();

    app.purchase_orders
        .assistant_approve(po.id, app.assistant)
        .await
        .unwrap();
    app.purchase_orders
        .route(po.id, app.manager, RouteTarget::Procurement)
        .await
        .unwrap();

    // Manager adds an internal document after routing; procurement uploads
    // their own delivery note.
    let after = app
        .attachments
        .add_attachment(po.id, app.manager, b"internal memo".to_vec())
        .await
        .unwrap();
    let own = app
        .attachments
        .add_attachment(po.id, app.procurement, b"delivery note".to_vec())
        .await
        .unwrap();

    let visible = app
        .attachments
        .visible_attachments(po.id, app.procurement)
        .await
        .unwrap();
    let ids: Vec<_> = visible.iter().map(|a| a.id).collect();
    assert!(ids.contains(&before.id));
    assert!(ids.contains(&own.id));
    assert!(!ids.contains(&after.id));

    // Manager tier sees everything.
    let manager_view = app
        .attachments
        .visible_attachments(po.id, app.manager)
        .await
        .unwrap();
    assert_eq!(manager_view.len(), 3);

    // The creator sees only their own uploads.
    let creator_view = app
        .attachments
        .visible_attachments(po.id, app.employee)
        .await
        .unwrap();
    assert_eq!(creator_view.len(), 1);
    assert_eq!(creator_view[0].id, before.id);
}

#[tokio::test]
async fn procurement_sees_everything_when_no_routing_is_on_record() {
    let app = TestApp::new().await;

    let po = app
        .purchase_orders
        .create_purchase_order(app.employee, create_request(vec![item("A", 1, dec!(10))]))
        .await
        .unwrap();
    app.attachments
        .add_attachment(po.id, app.employee, b"quote".to_vec())
        .await
        .unwrap();

    let visible = app
        .attachments
        .visible_attachments(po.id, app.procurement)
        .await
        .unwrap();
    assert_eq!(visible.len(), 1);
}
