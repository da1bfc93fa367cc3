//! Attachment upload and role-based visibility.
//!
//! Uploader and upload time are first-class columns on the attachment row;
//! the procurement cut-off point is recovered from the audit trail (the
//! most recent routing-to-procurement entry for the order).

use crate::auth::Actor;
use crate::auth::UserRole;
use crate::db::DbPool;
use crate::entities::{purchase_order, purchase_order_attachment as attachment};
use crate::errors::ServiceError;
use crate::external::ObjectStorage;
use crate::services::audit::{AuditService, ENTITY_PURCHASE_ORDER};
use crate::services::transitions::WorkflowOp;
use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set, TransactionTrait};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Storage folder for purchase order evidence uploads.
const ATTACHMENT_FOLDER: &str = "purchase-orders";

#[derive(Clone)]
pub struct AttachmentService {
    db: Arc<DbPool>,
    storage: Arc<dyn ObjectStorage>,
    audit: AuditService,
}

impl AttachmentService {
    pub fn new(db: Arc<DbPool>, storage: Arc<dyn ObjectStorage>, audit: AuditService) -> Self {
        Self { db, storage, audit }
    }

    /// Uploads evidence for a purchase order and records its metadata.
    ///
    /// The storage path follows
    /// `{folder}/{uploader_id}/{po_number}/{attachment_id}`, so repeat
    /// uploads by the same user never overwrite an earlier object. The
    /// metadata row and the audit entry commit together.
    #[instrument(skip(self, bytes), fields(po_id = %po_id, uploader = %actor.id))]
    pub async fn add_attachment(
        &self,
        po_id: Uuid,
        actor: Actor,
        bytes: Vec<u8>,
    ) -> Result<attachment::Model, ServiceError> {
        let po = purchase_order::Entity::find_by_id(po_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Purchase order {} not found", po_id)))?;

        if po.created_by != actor.id && !actor.is_elevated() {
            return Err(ServiceError::PermissionDenied(
                "only the creator or an elevated role may attach evidence".to_string(),
            ));
        }

        let attachment_id = Uuid::new_v4();
        let path = format!(
            "{}/{}/{}/{}",
            ATTACHMENT_FOLDER, actor.id, po.po_number, attachment_id
        );
        let url = self.storage.upload(bytes, &path).await?;

        let txn = self.db.begin().await?;
        let row = attachment::ActiveModel {
            id: Set(attachment_id),
            purchase_order_id: Set(po.id),
            url: Set(url.clone()),
            uploaded_by: Set(actor.id),
            uploaded_at: Set(Utc::now()),
        };
        let saved = row.insert(&txn).await?;
        self.audit
            .record(
                &txn,
                actor.id,
                "add_attachment",
                ENTITY_PURCHASE_ORDER,
                &po.po_number,
                json!({ "url": url }),
            )
            .await?;
        txn.commit().await?;

        info!(po_number = %po.po_number, "Attachment recorded");
        Ok(saved)
    }

    /// The subset of an order's attachments the actor may see.
    #[instrument(skip(self), fields(po_id = %po_id, role = %actor.role))]
    pub async fn visible_attachments(
        &self,
        po_id: Uuid,
        actor: Actor,
    ) -> Result<Vec<attachment::Model>, ServiceError> {
        let po = purchase_order::Entity::find_by_id(po_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Purchase order {} not found", po_id)))?;

        let attachments = attachment::Entity::find()
            .filter(attachment::Column::PurchaseOrderId.eq(po.id))
            .all(&*self.db)
            .await?;

        let routed_at = if actor.role == UserRole::ProcurementOfficer {
            self.audit
                .last_action_at(&po.po_number, WorkflowOp::RouteToProcurement.action_name())
                .await?
        } else {
            None
        };

        Ok(filter_visible(attachments, &actor, routed_at))
    }
}

/// Role matrix for attachment visibility.
///
/// Manager-tier roles see everything. Procurement officers see what existed
/// before the order was last routed to them, plus their own uploads; with
/// no routing entry on record the filter stays permissive. Everyone else
/// sees only their own uploads.
pub fn filter_visible(
    attachments: Vec<attachment::Model>,
    actor: &Actor,
    routed_to_procurement_at: Option<DateTime<Utc>>,
) -> Vec<attachment::Model> {
    if actor.role.is_manager_tier() {
        return attachments;
    }

    if actor.role == UserRole::ProcurementOfficer {
        return match routed_to_procurement_at {
            Some(cutoff) => attachments
                .into_iter()
                .filter(|a| a.uploaded_at < cutoff || a.uploaded_by == actor.id)
                .collect(),
            None => attachments,
        };
    }

    attachments
        .into_iter()
        .filter(|a| a.uploaded_by == actor.id)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn attachment_at(uploaded_by: Uuid, uploaded_at: DateTime<Utc>) -> attachment::Model {
        attachment::Model {
            id: Uuid::new_v4(),
            purchase_order_id: Uuid::new_v4(),
            url: "https://storage.local/purchase-orders/x/PO-26-08-0001".into(),
            uploaded_by,
            uploaded_at,
        }
    }

    #[test]
    fn manager_tier_sees_everything() {
        let rows = vec![
            attachment_at(Uuid::new_v4(), Utc::now()),
            attachment_at(Uuid::new_v4(), Utc::now()),
        ];
        let manager = Actor::new(Uuid::new_v4(), UserRole::Manager);
        assert_eq!(filter_visible(rows.clone(), &manager, None).len(), 2);

        let finance = Actor::new(Uuid::new_v4(), UserRole::FinanceManager);
        assert_eq!(filter_visible(rows, &finance, None).len(), 2);
    }

    #[test]
    fn employee_sees_only_own_uploads() {
        let employee = Actor::new(Uuid::new_v4(), UserRole::Employee);
        let rows = vec![
            attachment_at(employee.id, Utc::now()),
            attachment_at(Uuid::new_v4(), Utc::now()),
        ];
        let visible = filter_visible(rows, &employee, None);
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].uploaded_by, employee.id);
    }

    #[test]
    fn procurement_sees_pre_routing_plus_own() {
        let officer = Actor::new(Uuid::new_v4(), UserRole::ProcurementOfficer);
        let routed_at = Utc::now();
        let before = attachment_at(Uuid::new_v4(), routed_at - Duration::hours(1));
        let after_foreign = attachment_at(Uuid::new_v4(), routed_at + Duration::hours(1));
        let after_own = attachment_at(officer.id, routed_at + Duration::hours(2));

        let visible = filter_visible(
            vec![before.clone(), after_foreign, after_own.clone()],
            &officer,
            Some(routed_at),
        );
        let ids: Vec<Uuid> = visible.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![before.id, after_own.id]);
    }

    #[test]
    fn procurement_without_routing_entry_sees_all() {
        let officer = Actor::new(Uuid::new_v4(), UserRole::ProcurementOfficer);
        let rows = vec![
            attachment_at(Uuid::new_v4(), Utc::now()),
            attachment_at(Uuid::new_v4(), Utc::now()),
        ];
        assert_eq!(filter_visible(rows, &officer, None).len(), 2);
    }
}
