//! The purchase order workflow engine.
//!
//! Validates transition legality against the table in
//! [`crate::services::transitions`], performs the mutation and the audit
//! write inside one transaction, and triggers notification fan-out after
//! commit. The status write is a conditional UPDATE filtered on the
//! expected current status, so the storage engine arbitrates concurrent
//! writers: exactly one of two racing transitions succeeds and the other
//! observes a state conflict.

use crate::auth::Actor;
use crate::db::DbPool;
use crate::entities::purchase_order::{self, PurchaseOrderStatus as Status};
use crate::entities::purchase_order_item as po_item;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::audit::{AuditFilter, AuditService, ENTITY_PURCHASE_ORDER};
use crate::services::notifications::NotificationOrchestrator;
use crate::services::sequence::SequenceService;
use crate::services::transitions::{self, WorkflowOp, UPDATABLE_STATUSES};
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use prometheus::IntCounter;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

lazy_static! {
    static ref PO_CREATIONS: IntCounter = IntCounter::new(
        "purchase_order_creations_total",
        "Total number of purchase orders created"
    )
    .expect("metric can be created");
    static ref PO_TRANSITIONS: IntCounter = IntCounter::new(
        "purchase_order_transitions_total",
        "Total number of successful purchase order transitions"
    )
    .expect("metric can be created");
    static ref PO_TRANSITION_CONFLICTS: IntCounter = IntCounter::new(
        "purchase_order_transition_conflicts_total",
        "Transitions rejected because the order was not in the required status"
    )
    .expect("metric can be created");
}

/// Request/response types for the workflow engine.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PurchaseOrderItemRequest {
    /// Optional reference into the external entity catalog.
    pub item_id: Option<Uuid>,
    #[validate(length(min = 1, message = "Item code is required"))]
    pub code: String,
    #[validate(length(min = 1, message = "Item name is required"))]
    pub name: String,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
    pub unit: String,
    pub price: Decimal,
    /// Taken verbatim when supplied, else computed as `price × quantity`.
    pub line_total: Option<Decimal>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreatePurchaseOrderRequest {
    #[validate(length(min = 1, message = "Department is required"))]
    pub department: String,
    pub request_type: String,
    #[validate(length(min = 1, message = "Requester name is required"))]
    pub requester_name: String,
    pub request_date: Option<DateTime<Utc>>,
    pub supplier_id: Option<Uuid>,
    pub notes: Option<String>,
    #[validate(length(min = 3, max = 3, message = "Currency must be 3 characters"))]
    pub currency: String,
    /// When set the order starts in `draft` and enters the review chain on
    /// submit; otherwise the initial status is chosen by the creator role.
    #[serde(default)]
    pub save_as_draft: bool,
    #[validate(length(min = 1, message = "At least one item is required"))]
    pub items: Vec<PurchaseOrderItemRequest>,
}

#[derive(Debug, Default, Serialize, Deserialize, Validate)]
pub struct UpdatePurchaseOrderRequest {
    pub department: Option<String>,
    pub request_type: Option<String>,
    pub requester_name: Option<String>,
    pub supplier_id: Option<Uuid>,
    pub execution_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    /// When supplied, replaces all line items wholesale.
    pub items: Option<Vec<PurchaseOrderItemRequest>>,
}

/// Received-quantity update applied by a procurement officer to one line.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ReceivedItemUpdate {
    pub item_id: Uuid,
    #[validate(range(min = 0, message = "Received quantity cannot be negative"))]
    pub received_quantity: i32,
    /// Overrides the line price when the procured price differs.
    pub price: Option<Decimal>,
}

/// Optional secondary review tiers a manager can route an order through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteTarget {
    Finance,
    GeneralManager,
    Procurement,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseOrderItemResponse {
    pub id: Uuid,
    pub item_id: Option<Uuid>,
    pub code: String,
    pub name: String,
    pub quantity: i32,
    pub unit: String,
    pub received_quantity: Option<i32>,
    pub price: Decimal,
    pub line_total: Decimal,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseOrderResponse {
    pub id: Uuid,
    pub po_number: String,
    pub request_date: DateTime<Utc>,
    pub department: String,
    pub request_type: String,
    pub requester_name: String,
    pub status: Status,
    pub notes: Option<String>,
    pub supplier_id: Option<Uuid>,
    pub execution_date: Option<DateTime<Utc>>,
    pub total_amount: Decimal,
    pub currency: String,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub items: Vec<PurchaseOrderItemResponse>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PurchaseOrderSummary {
    pub id: Uuid,
    pub po_number: String,
    pub department: String,
    pub requester_name: String,
    pub status: Status,
    pub total_amount: Decimal,
    pub currency: String,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PurchaseOrderListResponse {
    pub orders: Vec<PurchaseOrderSummary>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

/// One step of an order's reconstructed workflow timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowHistoryEntry {
    pub actor_id: Uuid,
    pub action: String,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

fn line_total_for(item: &PurchaseOrderItemRequest) -> Decimal {
    item.line_total
        .unwrap_or_else(|| item.price * Decimal::from(item.quantity))
}

/// The workflow engine. All collaborators are injected by constructor; no
/// global switch selects implementations at runtime.
#[derive(Clone)]
pub struct PurchaseOrderService {
    db: Arc<DbPool>,
    audit: AuditService,
    sequence: SequenceService,
    notifier: Arc<NotificationOrchestrator>,
    event_sender: Option<Arc<EventSender>>,
}

impl PurchaseOrderService {
    /// Creates the workflow engine, validating the transition table for
    /// completeness so a malformed table fails at startup, not mid-request.
    pub fn new(
        db: Arc<DbPool>,
        audit: AuditService,
        sequence: SequenceService,
        notifier: Arc<NotificationOrchestrator>,
        event_sender: Option<Arc<EventSender>>,
    ) -> Result<Self, ServiceError> {
        transitions::validate_table().map_err(ServiceError::InternalError)?;
        Ok(Self {
            db,
            audit,
            sequence,
            notifier,
            event_sender,
        })
    }

    /// Creates a new purchase order with its line items in one transaction.
    #[instrument(skip(self, request), fields(creator = %actor.id, role = %actor.role))]
    pub async fn create_purchase_order(
        &self,
        actor: Actor,
        request: CreatePurchaseOrderRequest,
    ) -> Result<PurchaseOrderResponse, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;
        for item in &request.items {
            item.validate()
                .map_err(|e| ServiceError::ValidationError(e.to_string()))?;
        }

        let status = if request.save_as_draft {
            Status::Draft
        } else {
            transitions::initial_status(actor.role)
        };
        let now = Utc::now();
        let po_id = Uuid::new_v4();
        let total_amount: Decimal = request.items.iter().map(line_total_for).sum();

        let txn = self.db.begin().await?;

        let po_number = self.sequence.next_po_number(&txn).await?;

        let order = purchase_order::ActiveModel {
            id: Set(po_id),
            po_number: Set(po_number.clone()),
            request_date: Set(request.request_date.unwrap_or(now)),
            department: Set(request.department.clone()),
            request_type: Set(request.request_type.clone()),
            requester_name: Set(request.requester_name.clone()),
            status: Set(status.clone()),
            notes: Set(request.notes.clone()),
            supplier_id: Set(request.supplier_id),
            execution_date: Set(None),
            total_amount: Set(total_amount),
            currency: Set(request.currency.clone()),
            created_by: Set(actor.id),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        };
        let saved = order.insert(&txn).await?;

        for item in &request.items {
            let row = po_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                purchase_order_id: Set(po_id),
                item_id: Set(item.item_id),
                code: Set(item.code.clone()),
                name: Set(item.name.clone()),
                quantity: Set(item.quantity),
                unit: Set(item.unit.clone()),
                received_quantity: Set(None),
                price: Set(item.price),
                line_total: Set(line_total_for(item)),
                currency: Set(request.currency.clone()),
                created_at: Set(now),
            };
            row.insert(&txn).await?;
        }

        self.audit
            .record(
                &txn,
                actor.id,
                "create_purchase_order",
                ENTITY_PURCHASE_ORDER,
                &po_number,
                json!({
                    "status": status.as_str(),
                    "total_amount": total_amount,
                    "items_count": request.items.len(),
                }),
            )
            .await?;

        txn.commit().await?;

        PO_CREATIONS.inc();
        info!(po_number = %po_number, status = %status, "Purchase order created");

        self.emit_event(Event::PurchaseOrderCreated(po_id)).await;

        let notifier = self.notifier.clone();
        let for_fanout = saved.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier.on_created(&for_fanout).await {
                warn!(error = %e, po_number = %for_fanout.po_number, "Creation fan-out failed");
            }
        });

        let (order, items) = self.load_aggregate(po_id).await?;
        Ok(Self::to_response(order, items))
    }

    /// Submits a draft. Lands in a tier chosen by the submitter's role.
    /// Only the creator (or a manager-tier caller) may submit.
    pub async fn submit(
        &self,
        po_id: Uuid,
        actor: Actor,
    ) -> Result<PurchaseOrderResponse, ServiceError> {
        self.execute_transition(po_id, actor, WorkflowOp::Submit, None)
            .await
    }

    pub async fn assistant_approve(
        &self,
        po_id: Uuid,
        actor: Actor,
    ) -> Result<PurchaseOrderResponse, ServiceError> {
        self.execute_transition(po_id, actor, WorkflowOp::AssistantApprove, None)
            .await
    }

    pub async fn assistant_reject(
        &self,
        po_id: Uuid,
        actor: Actor,
        reason: Option<String>,
    ) -> Result<PurchaseOrderResponse, ServiceError> {
        self.execute_transition(po_id, actor, WorkflowOp::AssistantReject, reason)
            .await
    }

    pub async fn manager_approve(
        &self,
        po_id: Uuid,
        actor: Actor,
    ) -> Result<PurchaseOrderResponse, ServiceError> {
        self.execute_transition(po_id, actor, WorkflowOp::ManagerApprove, None)
            .await
    }

    pub async fn manager_reject(
        &self,
        po_id: Uuid,
        actor: Actor,
        reason: Option<String>,
    ) -> Result<PurchaseOrderResponse, ServiceError> {
        self.execute_transition(po_id, actor, WorkflowOp::ManagerReject, reason)
            .await
    }

    /// Routes an order under manager review to a secondary tier.
    pub async fn route(
        &self,
        po_id: Uuid,
        actor: Actor,
        target: RouteTarget,
    ) -> Result<PurchaseOrderResponse, ServiceError> {
        let op = match target {
            RouteTarget::Finance => WorkflowOp::RouteToFinance,
            RouteTarget::GeneralManager => WorkflowOp::RouteToGeneralManager,
            RouteTarget::Procurement => WorkflowOp::RouteToProcurement,
        };
        self.execute_transition(po_id, actor, op, None).await
    }

    pub async fn finance_approve(
        &self,
        po_id: Uuid,
        actor: Actor,
    ) -> Result<PurchaseOrderResponse, ServiceError> {
        self.execute_transition(po_id, actor, WorkflowOp::FinanceApprove, None)
            .await
    }

    pub async fn finance_reject(
        &self,
        po_id: Uuid,
        actor: Actor,
        reason: Option<String>,
    ) -> Result<PurchaseOrderResponse, ServiceError> {
        self.execute_transition(po_id, actor, WorkflowOp::FinanceReject, reason)
            .await
    }

    pub async fn general_manager_approve(
        &self,
        po_id: Uuid,
        actor: Actor,
    ) -> Result<PurchaseOrderResponse, ServiceError> {
        self.execute_transition(po_id, actor, WorkflowOp::GeneralManagerApprove, None)
            .await
    }

    pub async fn general_manager_reject(
        &self,
        po_id: Uuid,
        actor: Actor,
        reason: Option<String>,
    ) -> Result<PurchaseOrderResponse, ServiceError> {
        self.execute_transition(po_id, actor, WorkflowOp::GeneralManagerReject, reason)
            .await
    }

    pub async fn return_to_manager(
        &self,
        po_id: Uuid,
        actor: Actor,
    ) -> Result<PurchaseOrderResponse, ServiceError> {
        self.execute_transition(po_id, actor, WorkflowOp::ReturnToManager, None)
            .await
    }

    pub async fn manager_final_approve(
        &self,
        po_id: Uuid,
        actor: Actor,
    ) -> Result<PurchaseOrderResponse, ServiceError> {
        self.execute_transition(po_id, actor, WorkflowOp::ManagerFinalApprove, None)
            .await
    }

    pub async fn manager_final_reject(
        &self,
        po_id: Uuid,
        actor: Actor,
        reason: Option<String>,
    ) -> Result<PurchaseOrderResponse, ServiceError> {
        self.execute_transition(po_id, actor, WorkflowOp::ManagerFinalReject, reason)
            .await
    }

    pub async fn complete(
        &self,
        po_id: Uuid,
        actor: Actor,
    ) -> Result<PurchaseOrderResponse, ServiceError> {
        self.execute_transition(po_id, actor, WorkflowOp::Complete, None)
            .await
    }

    /// Records received quantities on line items, recomputes totals from
    /// `price × received_quantity`, and advances `pending_procurement`
    /// orders back to manager review.
    #[instrument(skip(self, updates), fields(po_id = %po_id, officer = %actor.id))]
    pub async fn procurement_update(
        &self,
        po_id: Uuid,
        actor: Actor,
        updates: Vec<ReceivedItemUpdate>,
        note: Option<String>,
    ) -> Result<PurchaseOrderResponse, ServiceError> {
        for update in &updates {
            update
                .validate()
                .map_err(|e| ServiceError::ValidationError(e.to_string()))?;
        }

        let po = self.find_order(po_id).await?;
        let current = po.status.clone();
        let next = transitions::next_status(WorkflowOp::ProcurementUpdate, &current, actor.role)?;

        let items = po_item::Entity::find()
            .filter(po_item::Column::PurchaseOrderId.eq(po_id))
            .all(&*self.db)
            .await?;
        let mut by_id: HashMap<Uuid, po_item::Model> =
            items.into_iter().map(|i| (i.id, i)).collect();

        let txn = self.db.begin().await?;

        if !self
            .conditional_status_write(&txn, &po, &current, &next, note.as_deref())
            .await?
        {
            txn.rollback().await?;
            return self
                .state_conflict(po_id, WorkflowOp::ProcurementUpdate, &current)
                .await;
        }

        for update in &updates {
            let item = by_id.remove(&update.item_id).ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "Line item {} not found on purchase order {}",
                    update.item_id, po.po_number
                ))
            })?;
            let price = update.price.unwrap_or(item.price);
            let line_total = price * Decimal::from(update.received_quantity);

            let mut active: po_item::ActiveModel = item.clone().into();
            active.received_quantity = Set(Some(update.received_quantity));
            active.price = Set(price);
            active.line_total = Set(line_total);
            let updated = active.update(&txn).await?;
            by_id.insert(updated.id, updated);
        }

        let total_amount: Decimal = by_id.values().map(|i| i.line_total).sum();
        purchase_order::Entity::update_many()
            .col_expr(
                purchase_order::Column::TotalAmount,
                Expr::value(total_amount),
            )
            .filter(purchase_order::Column::Id.eq(po_id))
            .exec(&txn)
            .await?;

        self.audit
            .record(
                &txn,
                actor.id,
                WorkflowOp::ProcurementUpdate.action_name(),
                ENTITY_PURCHASE_ORDER,
                &po.po_number,
                json!({
                    "from_status": current.as_str(),
                    "to_status": next.as_str(),
                    "received": updates
                        .iter()
                        .map(|u| json!({
                            "item_id": u.item_id,
                            "received_quantity": u.received_quantity,
                        }))
                        .collect::<Vec<_>>(),
                    "total_amount": total_amount,
                    "note": note,
                }),
            )
            .await?;

        txn.commit().await?;
        PO_TRANSITIONS.inc();
        info!(
            po_number = %po.po_number,
            old_status = %current,
            new_status = %next,
            total_amount = %total_amount,
            "Procurement update applied"
        );

        self.after_transition(po_id, &current, &next).await
    }

    /// Edits core fields while the order is still editable; replaces line
    /// items wholesale when they are supplied. Never changes status.
    #[instrument(skip(self, request), fields(po_id = %po_id, caller = %actor.id))]
    pub async fn update_purchase_order(
        &self,
        po_id: Uuid,
        actor: Actor,
        request: UpdatePurchaseOrderRequest,
    ) -> Result<PurchaseOrderResponse, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;
        if let Some(items) = &request.items {
            if items.is_empty() {
                return Err(ServiceError::ValidationError(
                    "At least one item is required".to_string(),
                ));
            }
            for item in items {
                item.validate()
                    .map_err(|e| ServiceError::ValidationError(e.to_string()))?;
            }
        }

        let po = self.find_order(po_id).await?;
        if po.created_by != actor.id && !actor.is_elevated() {
            return Err(ServiceError::PermissionDenied(
                "only the creator may edit this purchase order".to_string(),
            ));
        }
        if !UPDATABLE_STATUSES.contains(&po.status) {
            return Err(ServiceError::StateConflict {
                operation: "update_purchase_order".to_string(),
                current: po.status.as_str().to_string(),
                required: UPDATABLE_STATUSES
                    .iter()
                    .map(Status::as_str)
                    .collect::<Vec<_>>()
                    .join(" or "),
            });
        }

        let now = Utc::now();
        let current = po.status.clone();
        let txn = self.db.begin().await?;

        let mut update = purchase_order::Entity::update_many()
            .col_expr(purchase_order::Column::UpdatedAt, Expr::value(Some(now)));
        if let Some(department) = &request.department {
            update = update.col_expr(
                purchase_order::Column::Department,
                Expr::value(department.clone()),
            );
        }
        if let Some(request_type) = &request.request_type {
            update = update.col_expr(
                purchase_order::Column::RequestType,
                Expr::value(request_type.clone()),
            );
        }
        if let Some(requester_name) = &request.requester_name {
            update = update.col_expr(
                purchase_order::Column::RequesterName,
                Expr::value(requester_name.clone()),
            );
        }
        if let Some(supplier_id) = request.supplier_id {
            update = update.col_expr(
                purchase_order::Column::SupplierId,
                Expr::value(Some(supplier_id)),
            );
        }
        if let Some(execution_date) = request.execution_date {
            update = update.col_expr(
                purchase_order::Column::ExecutionDate,
                Expr::value(Some(execution_date)),
            );
        }
        if let Some(notes) = &request.notes {
            update = update.col_expr(purchase_order::Column::Notes, Expr::value(Some(notes.clone())));
        }

        let mut total_amount = po.total_amount;
        if let Some(items) = &request.items {
            total_amount = items.iter().map(line_total_for).sum();
            update = update.col_expr(
                purchase_order::Column::TotalAmount,
                Expr::value(total_amount),
            );
        }

        // Guard against racing a concurrent transition: the write only
        // lands if the status we validated is still the stored one.
        let result = update
            .filter(purchase_order::Column::Id.eq(po_id))
            .filter(purchase_order::Column::Status.eq(current.clone()))
            .exec(&txn)
            .await?;
        if result.rows_affected == 0 {
            txn.rollback().await?;
            return self
                .state_conflict_for_update(po_id, &current)
                .await;
        }

        if let Some(items) = &request.items {
            po_item::Entity::delete_many()
                .filter(po_item::Column::PurchaseOrderId.eq(po_id))
                .exec(&txn)
                .await?;
            for item in items {
                let row = po_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    purchase_order_id: Set(po_id),
                    item_id: Set(item.item_id),
                    code: Set(item.code.clone()),
                    name: Set(item.name.clone()),
                    quantity: Set(item.quantity),
                    unit: Set(item.unit.clone()),
                    received_quantity: Set(None),
                    price: Set(item.price),
                    line_total: Set(line_total_for(item)),
                    currency: Set(po.currency.clone()),
                    created_at: Set(now),
                };
                row.insert(&txn).await?;
            }
        }

        self.audit
            .record(
                &txn,
                actor.id,
                "update_purchase_order",
                ENTITY_PURCHASE_ORDER,
                &po.po_number,
                json!({
                    "status": current.as_str(),
                    "items_replaced": request.items.is_some(),
                    "total_amount": total_amount,
                }),
            )
            .await?;

        txn.commit().await?;
        info!(po_number = %po.po_number, "Purchase order updated");

        self.emit_event(Event::PurchaseOrderUpdated(po_id)).await;

        let (order, items) = self.load_aggregate(po_id).await?;
        Ok(Self::to_response(order, items))
    }

    /// Full aggregate read. Employees may only read their own orders.
    #[instrument(skip(self), fields(po_id = %po_id, caller = %actor.id))]
    pub async fn get_purchase_order(
        &self,
        po_id: Uuid,
        actor: Actor,
    ) -> Result<PurchaseOrderResponse, ServiceError> {
        let (order, items) = self.load_aggregate(po_id).await?;
        if order.created_by != actor.id && !actor.is_elevated() {
            return Err(ServiceError::PermissionDenied(
                "purchase order belongs to another user".to_string(),
            ));
        }
        Ok(Self::to_response(order, items))
    }

    /// Paginated listing, newest first. Employee-scoped to own orders.
    #[instrument(skip(self), fields(caller = %actor.id))]
    pub async fn list_purchase_orders(
        &self,
        actor: Actor,
        page: u64,
        per_page: u64,
    ) -> Result<PurchaseOrderListResponse, ServiceError> {
        let mut query = purchase_order::Entity::find();
        if !actor.is_elevated() {
            query = query.filter(purchase_order::Column::CreatedBy.eq(actor.id));
        }
        let paginator = query
            .order_by_desc(purchase_order::Column::CreatedAt)
            .paginate(&*self.db, per_page);

        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.max(1) - 1).await?;

        Ok(PurchaseOrderListResponse {
            orders: orders
                .into_iter()
                .map(|po| PurchaseOrderSummary {
                    id: po.id,
                    po_number: po.po_number,
                    department: po.department,
                    requester_name: po.requester_name,
                    status: po.status,
                    total_amount: po.total_amount,
                    currency: po.currency,
                    created_by: po.created_by,
                    created_at: po.created_at,
                })
                .collect(),
            total,
            page,
            per_page,
        })
    }

    /// Timeline of workflow actions for an order, oldest first,
    /// reconstructed from the audit trail.
    #[instrument(skip(self), fields(po_id = %po_id))]
    pub async fn workflow_history(
        &self,
        po_id: Uuid,
        actor: Actor,
    ) -> Result<Vec<WorkflowHistoryEntry>, ServiceError> {
        let po = self.find_order(po_id).await?;
        if po.created_by != actor.id && !actor.is_elevated() {
            return Err(ServiceError::PermissionDenied(
                "purchase order belongs to another user".to_string(),
            ));
        }

        let filter = AuditFilter {
            entity_type: Some(ENTITY_PURCHASE_ORDER.to_string()),
            entity_ref: Some(po.po_number),
            actor_id: None,
        };
        let mut entries = self.audit.list_by_filter(&filter, 500, 0).await?;
        entries.reverse();

        Ok(entries
            .into_iter()
            .map(|e| WorkflowHistoryEntry {
                actor_id: e.actor_id,
                action: e.action,
                details: e.details,
                created_at: e.created_at,
            })
            .collect())
    }

    // ---- internals ----

    async fn find_order(&self, po_id: Uuid) -> Result<purchase_order::Model, ServiceError> {
        purchase_order::Entity::find_by_id(po_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Purchase order {} not found", po_id)))
    }

    async fn load_aggregate(
        &self,
        po_id: Uuid,
    ) -> Result<(purchase_order::Model, Vec<po_item::Model>), ServiceError> {
        let order = self.find_order(po_id).await?;
        let items = po_item::Entity::find()
            .filter(po_item::Column::PurchaseOrderId.eq(po_id))
            .order_by_asc(po_item::Column::CreatedAt)
            .all(&*self.db)
            .await?;
        Ok((order, items))
    }

    /// The shared transition path: guard, conditional write, audit, commit,
    /// then post-commit fan-out.
    #[instrument(skip(self, note), fields(po_id = %po_id, operation = op.action_name()))]
    async fn execute_transition(
        &self,
        po_id: Uuid,
        actor: Actor,
        op: WorkflowOp,
        note: Option<String>,
    ) -> Result<PurchaseOrderResponse, ServiceError> {
        let po = self.find_order(po_id).await?;

        if op == WorkflowOp::Submit && po.created_by != actor.id && !actor.is_elevated() {
            return Err(ServiceError::PermissionDenied(
                "only the creator may submit this purchase order".to_string(),
            ));
        }

        let current = po.status.clone();
        let next = transitions::next_status(op, &current, actor.role)?;

        let txn = self.db.begin().await?;

        if !self
            .conditional_status_write(&txn, &po, &current, &next, note.as_deref())
            .await?
        {
            txn.rollback().await?;
            return self.state_conflict(po_id, op, &current).await;
        }

        self.audit
            .record(
                &txn,
                actor.id,
                op.action_name(),
                ENTITY_PURCHASE_ORDER,
                &po.po_number,
                json!({
                    "from_status": current.as_str(),
                    "to_status": next.as_str(),
                    "note": note,
                }),
            )
            .await?;

        txn.commit().await?;
        PO_TRANSITIONS.inc();
        info!(
            po_number = %po.po_number,
            old_status = %current,
            new_status = %next,
            "Purchase order transition applied"
        );

        self.after_transition(po_id, &current, &next).await
    }

    /// Conditional status write: lands only if the stored status is still
    /// the one the guard validated. Returns whether a row was updated.
    async fn conditional_status_write(
        &self,
        txn: &sea_orm::DatabaseTransaction,
        po: &purchase_order::Model,
        current: &Status,
        next: &Status,
        note: Option<&str>,
    ) -> Result<bool, ServiceError> {
        let mut update = purchase_order::Entity::update_many()
            .col_expr(purchase_order::Column::Status, Expr::value(next.clone()))
            .col_expr(
                purchase_order::Column::UpdatedAt,
                Expr::value(Some(Utc::now())),
            );
        if let Some(note) = note {
            let appended = match &po.notes {
                Some(existing) if !existing.is_empty() => format!("{existing}\n{note}"),
                _ => note.to_string(),
            };
            update = update.col_expr(purchase_order::Column::Notes, Expr::value(Some(appended)));
        }

        let result = update
            .filter(purchase_order::Column::Id.eq(po.id))
            .filter(purchase_order::Column::Status.eq(current.clone()))
            .exec(txn)
            .await?;
        Ok(result.rows_affected > 0)
    }

    /// Builds the conflict error after a lost write race, re-reading the
    /// stored status so the caller sees what actually won.
    async fn state_conflict(
        &self,
        po_id: Uuid,
        op: WorkflowOp,
        expected: &Status,
    ) -> Result<PurchaseOrderResponse, ServiceError> {
        PO_TRANSITION_CONFLICTS.inc();
        let observed = purchase_order::Entity::find_by_id(po_id)
            .one(&*self.db)
            .await?
            .map(|p| p.status.as_str().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        warn!(
            po_id = %po_id,
            operation = op.action_name(),
            expected = %expected,
            observed = %observed,
            "Transition lost a concurrent write race"
        );
        Err(ServiceError::StateConflict {
            operation: op.action_name().to_string(),
            current: observed,
            required: expected.as_str().to_string(),
        })
    }

    async fn state_conflict_for_update(
        &self,
        po_id: Uuid,
        expected: &Status,
    ) -> Result<PurchaseOrderResponse, ServiceError> {
        PO_TRANSITION_CONFLICTS.inc();
        let observed = purchase_order::Entity::find_by_id(po_id)
            .one(&*self.db)
            .await?
            .map(|p| p.status.as_str().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        Err(ServiceError::StateConflict {
            operation: "update_purchase_order".to_string(),
            current: observed,
            required: expected.as_str().to_string(),
        })
    }

    /// Post-commit work shared by all transitions: re-read the aggregate,
    /// emit the domain event, and dispatch notifications fire-and-forget.
    async fn after_transition(
        &self,
        po_id: Uuid,
        previous: &Status,
        next: &Status,
    ) -> Result<PurchaseOrderResponse, ServiceError> {
        let (order, items) = self.load_aggregate(po_id).await?;

        self.emit_event(Event::PurchaseOrderStatusChanged {
            po_id,
            old_status: previous.as_str().to_string(),
            new_status: next.as_str().to_string(),
        })
        .await;

        let notifier = self.notifier.clone();
        let for_dispatch = order.clone();
        let previous = previous.clone();
        let next = next.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier
                .on_status_changed(&for_dispatch, previous, next)
                .await
            {
                warn!(
                    error = %e,
                    po_number = %for_dispatch.po_number,
                    "Notification dispatch failed"
                );
            }
        });

        Ok(Self::to_response(order, items))
    }

    async fn emit_event(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(event).await {
                warn!(error = %e, "Failed to send domain event");
            }
        }
    }

    fn to_response(
        order: purchase_order::Model,
        items: Vec<po_item::Model>,
    ) -> PurchaseOrderResponse {
        PurchaseOrderResponse {
            id: order.id,
            po_number: order.po_number,
            request_date: order.request_date,
            department: order.department,
            request_type: order.request_type,
            requester_name: order.requester_name,
            status: order.status,
            notes: order.notes,
            supplier_id: order.supplier_id,
            execution_date: order.execution_date,
            total_amount: order.total_amount,
            currency: order.currency,
            created_by: order.created_by,
            created_at: order.created_at,
            updated_at: order.updated_at,
            items: items
                .into_iter()
                .map(|item| PurchaseOrderItemResponse {
                    id: item.id,
                    item_id: item.item_id,
                    code: item.code,
                    name: item.name,
                    quantity: item.quantity,
                    unit: item.unit,
                    received_quantity: item.received_quantity,
                    price: item.price,
                    line_total: item.line_total,
                    currency: item.currency,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn item_request(quantity: i32, price: Decimal) -> PurchaseOrderItemRequest {
        PurchaseOrderItemRequest {
            item_id: None,
            code: "ITM-001".to_string(),
            name: "Test item".to_string(),
            quantity,
            unit: "pcs".to_string(),
            price,
            line_total: None,
        }
    }

    #[test]
    fn line_total_computed_from_price_and_quantity() {
        assert_eq!(line_total_for(&item_request(2, dec!(50))), dec!(100));
        assert_eq!(line_total_for(&item_request(3, dec!(19.99))), dec!(59.97));
    }

    #[test]
    fn supplied_line_total_is_taken_verbatim() {
        let mut req = item_request(2, dec!(50));
        req.line_total = Some(dec!(95));
        assert_eq!(line_total_for(&req), dec!(95));
    }

    #[test]
    fn to_response_preserves_the_aggregate() {
        let now = Utc::now();
        let po_id = Uuid::new_v4();
        let creator = Uuid::new_v4();
        let order = purchase_order::Model {
            id: po_id,
            po_number: "PO-26-08-0001".to_string(),
            request_date: now,
            department: "IT".to_string(),
            request_type: "hardware".to_string(),
            requester_name: "Sara".to_string(),
            status: Status::UnderAssistantReview,
            notes: None,
            supplier_id: None,
            execution_date: None,
            total_amount: dec!(200),
            currency: "USD".to_string(),
            created_by: creator,
            created_at: now,
            updated_at: Some(now),
        };
        let items = vec![po_item::Model {
            id: Uuid::new_v4(),
            purchase_order_id: po_id,
            item_id: None,
            code: "ITM-001".to_string(),
            name: "Laptop".to_string(),
            quantity: 2,
            unit: "pcs".to_string(),
            received_quantity: None,
            price: dec!(100),
            line_total: dec!(200),
            currency: "USD".to_string(),
            created_at: now,
        }];

        let response = PurchaseOrderService::to_response(order, items);
        assert_eq!(response.po_number, "PO-26-08-0001");
        assert_eq!(response.items.len(), 1);
        assert_eq!(response.total_amount, dec!(200));
        assert_eq!(
            response.items.iter().map(|i| i.line_total).sum::<Decimal>(),
            response.total_amount
        );
    }

    #[test]
    fn create_request_requires_items() {
        let request = CreatePurchaseOrderRequest {
            department: "IT".to_string(),
            request_type: "hardware".to_string(),
            requester_name: "Sara".to_string(),
            request_date: None,
            supplier_id: None,
            notes: None,
            currency: "USD".to_string(),
            save_as_draft: false,
            items: vec![],
        };
        assert!(request.validate().is_err());
    }
}
