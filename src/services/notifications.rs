//! Notification fan-out triggered by purchase order transitions.
//!
//! For every recipient the orchestrator persists a notification row first,
//! then attempts push delivery in gateway-sized batches. The row is the
//! durable record; a failed push is logged and dropped, never retried, and
//! never fails the triggering workflow operation.

use crate::auth::UserRole;
use crate::db::DbPool;
use crate::entities::{device_token, notification, purchase_order};
use crate::errors::ServiceError;
use crate::external::{PushDelivery, PushGateway, PushMessage, UserDirectory, MULTICAST_BATCH_LIMIT};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde_json::json;
use std::sync::Arc;
use tracing::{instrument, warn};
use uuid::Uuid;

use purchase_order::PurchaseOrderStatus as Status;

/// Roles notified when a new purchase order enters the review chain.
const CREATION_FANOUT_ROLES: &[UserRole] = &[UserRole::AssistantManager, UserRole::Manager];

/// Fixed mapping from a resulting status to notification content.
/// Unmapped statuses fall back to a generic "status changed" message.
fn message_for(po_number: &str, next: &Status) -> (&'static str, String, Option<String>) {
    match next {
        Status::UnderAssistantReview => (
            "po_submitted",
            format!("Purchase order {} submitted", po_number),
            Some("The order is awaiting assistant manager review.".to_string()),
        ),
        Status::UnderManagerReview => (
            "po_under_manager_review",
            format!("Purchase order {} moved to manager review", po_number),
            None,
        ),
        Status::UnderFinanceReview => (
            "po_routed_finance",
            format!("Purchase order {} routed to finance", po_number),
            None,
        ),
        Status::UnderGeneralManagerReview => (
            "po_routed_general_manager",
            format!("Purchase order {} routed to the general manager", po_number),
            None,
        ),
        Status::PendingProcurement => (
            "po_routed_procurement",
            format!("Purchase order {} routed to procurement", po_number),
            None,
        ),
        Status::InProgress => (
            "po_in_progress",
            format!("Purchase order {} is in progress", po_number),
            None,
        ),
        Status::ReturnedToManagerReview => (
            "po_returned_to_manager",
            format!("Purchase order {} returned for final manager review", po_number),
            None,
        ),
        Status::Completed => (
            "po_completed",
            format!("Purchase order {} approved", po_number),
            Some("The order has completed the approval chain.".to_string()),
        ),
        Status::RejectedByAssistant
        | Status::RejectedByManager
        | Status::RejectedByFinance
        | Status::RejectedByGeneralManager => (
            "po_rejected",
            format!("Purchase order {} rejected", po_number),
            Some("See the order notes for the rejection reason.".to_string()),
        ),
        _ => (
            "po_status_changed",
            format!("Purchase order {} status changed", po_number),
            None,
        ),
    }
}

/// Resolves recipients for a transition, persists their notification rows,
/// and dispatches best-effort pushes.
pub struct NotificationOrchestrator {
    db: Arc<DbPool>,
    directory: Arc<dyn UserDirectory>,
    gateway: Arc<dyn PushGateway>,
    batch_size: usize,
}

impl NotificationOrchestrator {
    pub fn new(
        db: Arc<DbPool>,
        directory: Arc<dyn UserDirectory>,
        gateway: Arc<dyn PushGateway>,
    ) -> Self {
        Self {
            db,
            directory,
            gateway,
            batch_size: MULTICAST_BATCH_LIMIT,
        }
    }

    /// Overrides the tokens-per-multicast batch size, normally from
    /// [`crate::config::AppConfig::push_batch_size`]. Clamped to the
    /// gateway's hard ceiling.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.clamp(1, MULTICAST_BATCH_LIMIT);
        self
    }

    /// Fan-out for a newly created purchase order: every assistant manager
    /// and manager in the directory.
    #[instrument(skip(self, po), fields(po_number = %po.po_number))]
    pub async fn on_created(&self, po: &purchase_order::Model) -> Result<(), ServiceError> {
        let recipients = self.directory.find_ids_by_roles(CREATION_FANOUT_ROLES).await?;
        let data = json!({
            "po_id": po.id,
            "po_number": po.po_number,
            "status": po.status.as_str(),
        });
        for user_id in recipients {
            self.notify_user(
                user_id,
                "po_created",
                format!("New purchase order {}", po.po_number),
                Some(format!("{} requested by {}", po.department, po.requester_name)),
                data.clone(),
            )
            .await;
        }
        Ok(())
    }

    /// Notifies the order's creator that its status changed.
    #[instrument(
        skip(self, po),
        fields(po_number = %po.po_number, old_status = %previous, new_status = %next)
    )]
    pub async fn on_status_changed(
        &self,
        po: &purchase_order::Model,
        previous: Status,
        next: Status,
    ) -> Result<(), ServiceError> {
        let (notification_type, title, body) = message_for(&po.po_number, &next);
        let data = json!({
            "po_id": po.id,
            "po_number": po.po_number,
            "from_status": previous.as_str(),
            "to_status": next.as_str(),
        });
        self.notify_user(po.created_by, notification_type, title, body, data)
            .await;
        Ok(())
    }

    /// Persists one notification row, then pushes to the user's devices.
    /// Push and prune failures are logged and swallowed; the row always
    /// survives.
    async fn notify_user(
        &self,
        user_id: Uuid,
        notification_type: &str,
        title: String,
        body: Option<String>,
        data: serde_json::Value,
    ) {
        let row = notification::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            notification_type: Set(notification_type.to_string()),
            title: Set(title.clone()),
            body: Set(body.clone()),
            data: Set(data.clone()),
            is_read: Set(false),
            created_at: Set(Utc::now()),
        };
        if let Err(e) = row.insert(&*self.db).await {
            warn!(error = %e, user_id = %user_id, "Failed to persist notification row");
            return;
        }

        let message = PushMessage { title, body, data };
        if let Err(e) = self.push_to_user(user_id, &message).await {
            warn!(error = %e, user_id = %user_id, "Push delivery failed");
        }
    }

    async fn push_to_user(&self, user_id: Uuid, message: &PushMessage) -> Result<(), ServiceError> {
        let tokens: Vec<String> = device_token::Entity::find()
            .filter(device_token::Column::UserId.eq(user_id))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|t| t.token)
            .collect();

        if tokens.is_empty() {
            return Ok(());
        }

        let mut invalid: Vec<String> = Vec::new();
        for batch in tokens.chunks(self.batch_size) {
            match self.gateway.send_multicast(batch, message).await {
                Ok(outcomes) => {
                    for outcome in outcomes {
                        match outcome.delivery {
                            PushDelivery::InvalidToken => invalid.push(outcome.token),
                            PushDelivery::Failed(reason) => {
                                warn!(token = %outcome.token, reason = %reason, "Push rejected");
                            }
                            PushDelivery::Delivered => {}
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, batch_size = batch.len(), "Multicast batch failed");
                }
            }
        }

        if !invalid.is_empty() {
            // Prune failures are non-fatal; the tokens will be reported
            // invalid again on the next push.
            if let Err(e) = device_token::Entity::delete_many()
                .filter(device_token::Column::Token.is_in(invalid.clone()))
                .exec(&*self.db)
                .await
            {
                warn!(error = %e, count = invalid.len(), "Failed to prune invalid device tokens");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejections_map_to_po_rejected() {
        for status in [
            Status::RejectedByAssistant,
            Status::RejectedByManager,
            Status::RejectedByFinance,
            Status::RejectedByGeneralManager,
        ] {
            let (kind, title, _) = message_for("PO-26-08-0001", &status);
            assert_eq!(kind, "po_rejected");
            assert!(title.contains("PO-26-08-0001"));
        }
    }

    #[test]
    fn unmapped_status_falls_back_to_generic() {
        let (kind, _, _) = message_for("PO-26-08-0001", &Status::Draft);
        assert_eq!(kind, "po_status_changed");
    }

    #[test]
    fn completion_maps_to_po_completed() {
        let (kind, _, body) = message_for("PO-26-08-0002", &Status::Completed);
        assert_eq!(kind, "po_completed");
        assert!(body.is_some());
    }
}
