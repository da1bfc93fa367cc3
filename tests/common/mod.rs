#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use poflow_api::auth::{Actor, UserRole};
use poflow_api::db::{self, DbConfig, DbPool};
use poflow_api::entities::{device_token, notification};
use poflow_api::events;
use poflow_api::external::directory::{DirectoryUser, InMemoryUserDirectory, UserDirectory};
use poflow_api::external::push::{InMemoryPushGateway, PushGateway};
use poflow_api::external::storage::{InMemoryObjectStorage, ObjectStorage};
use poflow_api::services::purchase_orders::{
    CreatePurchaseOrderRequest, PurchaseOrderItemRequest,
};
use poflow_api::services::{
    AttachmentService, AuditService, NotificationOrchestrator, PurchaseOrderService,
    SequenceService,
};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, Set};
use uuid::Uuid;

/// Test harness wiring the full service stack against a throwaway SQLite
/// file database with in-memory collaborators.
pub struct TestApp {
    pub db: Arc<DbPool>,
    pub directory: Arc<InMemoryUserDirectory>,
    pub gateway: Arc<InMemoryPushGateway>,
    pub storage: Arc<InMemoryObjectStorage>,
    pub audit: AuditService,
    pub purchase_orders: PurchaseOrderService,
    pub attachments: AttachmentService,
    pub employee: Actor,
    pub assistant: Actor,
    pub manager: Actor,
    pub finance: Actor,
    pub general_manager: Actor,
    pub procurement: Actor,
    db_path: std::path::PathBuf,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Builds a fresh application stack with its own database file and one
    /// directory user per role.
    pub async fn new() -> Self {
        let db_path =
            std::env::temp_dir().join(format!("poflow_test_{}.db", Uuid::new_v4().simple()));
        let config = DbConfig {
            url: format!("sqlite://{}?mode=rwc", db_path.display()),
            max_connections: 1,
            min_connections: 1,
            ..Default::default()
        };

        let pool = db::establish_connection_with_config(&config)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations");
        let pool = Arc::new(pool);

        let directory = Arc::new(InMemoryUserDirectory::new());
        let gateway = Arc::new(InMemoryPushGateway::new());
        let storage = Arc::new(InMemoryObjectStorage::new());

        let employee = Actor::new(Uuid::new_v4(), UserRole::Employee);
        let assistant = Actor::new(Uuid::new_v4(), UserRole::AssistantManager);
        let manager = Actor::new(Uuid::new_v4(), UserRole::Manager);
        let finance = Actor::new(Uuid::new_v4(), UserRole::FinanceManager);
        let general_manager = Actor::new(Uuid::new_v4(), UserRole::GeneralManager);
        let procurement = Actor::new(Uuid::new_v4(), UserRole::ProcurementOfficer);

        for (actor, name) in [
            (&employee, "Emma Employee"),
            (&assistant, "Aya Assistant"),
            (&manager, "Moe Manager"),
            (&finance, "Fay Finance"),
            (&general_manager, "Gus General"),
            (&procurement, "Pat Procurement"),
        ] {
            directory
                .add_user(DirectoryUser {
                    id: actor.id,
                    name: name.to_string(),
                    email: format!("{}@example.com", name.split(' ').next().unwrap()),
                    role: actor.role,
                })
                .await;
        }

        let audit = AuditService::new(pool.clone());
        let notifier = Arc::new(NotificationOrchestrator::new(
            pool.clone(),
            directory.clone() as Arc<dyn UserDirectory>,
            gateway.clone() as Arc<dyn PushGateway>,
        ));

        let (event_sender, event_rx) = events::event_channel(64);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let purchase_orders = PurchaseOrderService::new(
            pool.clone(),
            audit.clone(),
            SequenceService::new(),
            notifier.clone(),
            Some(Arc::new(event_sender)),
        )
        .expect("transition table is valid");

        let attachments = AttachmentService::new(
            pool.clone(),
            storage.clone() as Arc<dyn ObjectStorage>,
            audit.clone(),
        );

        Self {
            db: pool,
            directory,
            gateway,
            storage,
            audit,
            purchase_orders,
            attachments,
            employee,
            assistant,
            manager,
            finance,
            general_manager,
            procurement,
            db_path,
            _event_task: event_task,
        }
    }

    /// Registers a push token for a user.
    pub async fn register_device(&self, user_id: Uuid, token: &str) {
        device_token::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            token: Set(token.to_string()),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await
        .expect("failed to register device token");
    }

    pub async fn device_tokens_for(&self, user_id: Uuid) -> Vec<String> {
        device_token::Entity::find()
            .filter(device_token::Column::UserId.eq(user_id))
            .all(&*self.db)
            .await
            .expect("failed to load device tokens")
            .into_iter()
            .map(|t| t.token)
            .collect()
    }

    pub async fn notification_count_for(&self, user_id: Uuid) -> u64 {
        notification::Entity::find()
            .filter(notification::Column::UserId.eq(user_id))
            .count(&*self.db)
            .await
            .expect("failed to count notifications")
    }

    pub async fn notifications_for(&self, user_id: Uuid) -> Vec<notification::Model> {
        notification::Entity::find()
            .filter(notification::Column::UserId.eq(user_id))
            .all(&*self.db)
            .await
            .expect("failed to load notifications")
    }

    /// Waits until the user has at least `count` notification rows.
    /// Dispatch runs on spawned tasks, so rows land slightly after the
    /// service call returns.
    pub async fn wait_for_notifications(&self, user_id: Uuid, count: u64) {
        for _ in 0..100 {
            if self.notification_count_for(user_id).await >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!(
            "user {} never reached {} notification rows",
            user_id, count
        );
    }

    /// Lets any in-flight fire-and-forget dispatch settle.
    pub async fn settle(&self) {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.db_path);
    }
}

pub fn item(code: &str, quantity: i32, price: Decimal) -> PurchaseOrderItemRequest {
    PurchaseOrderItemRequest {
        item_id: None,
        code: code.to_string(),
        name: format!("Item {}", code),
        quantity,
        unit: "pcs".to_string(),
        price,
        line_total: None,
    }
}

pub fn create_request(items: Vec<PurchaseOrderItemRequest>) -> CreatePurchaseOrderRequest {
    CreatePurchaseOrderRequest {
        department: "IT".to_string(),
        request_type: "hardware".to_string(),
        requester_name: "Test Requester".to_string(),
        request_date: None,
        supplier_id: None,
        notes: None,
        currency: "USD".to_string(),
        save_as_draft: false,
        items,
    }
}
