//! Append-only audit recorder.
//!
//! One entry per state-changing action, keyed on the purchase order's
//! business number. The audit trail is also the system of record for
//! workflow history reconstruction; there is no separate history table.

use crate::entities::audit_log;
use crate::errors::ServiceError;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::db::DbPool;

/// Entity type tag for purchase order audit entries.
pub const ENTITY_PURCHASE_ORDER: &str = "purchase_order";

/// Filter for audit queries; unset fields match everything.
#[derive(Clone, Debug, Default)]
pub struct AuditFilter {
    pub entity_type: Option<String>,
    pub entity_ref: Option<String>,
    pub actor_id: Option<Uuid>,
}

#[derive(Clone)]
pub struct AuditService {
    db: Arc<DbPool>,
}

impl AuditService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Appends one audit entry on the caller's connection, so the write
    /// joins whatever transaction the caller has open.
    #[instrument(skip(self, conn, details), fields(action = %action, entity_ref = %entity_ref))]
    pub async fn record<C: ConnectionTrait>(
        &self,
        conn: &C,
        actor_id: Uuid,
        action: &str,
        entity_type: &str,
        entity_ref: &str,
        details: serde_json::Value,
    ) -> Result<audit_log::Model, ServiceError> {
        let entry = audit_log::ActiveModel {
            id: Set(Uuid::new_v4()),
            actor_id: Set(actor_id),
            action: Set(action.to_string()),
            entity_type: Set(entity_type.to_string()),
            entity_ref: Set(entity_ref.to_string()),
            details: Set(details),
            created_at: Set(Utc::now()),
        };
        let saved = entry.insert(conn).await?;
        Ok(saved)
    }

    /// Entries matching the filter, newest first. Callers reconstructing a
    /// timeline reverse the page themselves.
    #[instrument(skip(self, filter))]
    pub async fn list_by_filter(
        &self,
        filter: &AuditFilter,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<audit_log::Model>, ServiceError> {
        let mut query = audit_log::Entity::find();
        if let Some(entity_type) = &filter.entity_type {
            query = query.filter(audit_log::Column::EntityType.eq(entity_type.clone()));
        }
        if let Some(entity_ref) = &filter.entity_ref {
            query = query.filter(audit_log::Column::EntityRef.eq(entity_ref.clone()));
        }
        if let Some(actor_id) = filter.actor_id {
            query = query.filter(audit_log::Column::ActorId.eq(actor_id));
        }

        let entries = query
            .order_by_desc(audit_log::Column::CreatedAt)
            .limit(limit)
            .offset(offset)
            .all(&*self.db)
            .await?;
        Ok(entries)
    }

    /// Timestamp of the most recent entry with the given action for an
    /// entity, if any. Used by the attachment visibility filter to find
    /// when an order was last routed to procurement.
    #[instrument(skip(self))]
    pub async fn last_action_at(
        &self,
        entity_ref: &str,
        action: &str,
    ) -> Result<Option<DateTime<Utc>>, ServiceError> {
        let entry = audit_log::Entity::find()
            .filter(audit_log::Column::EntityRef.eq(entity_ref))
            .filter(audit_log::Column::Action.eq(action))
            .order_by_desc(audit_log::Column::CreatedAt)
            .one(&*self.db)
            .await?;
        Ok(entry.map(|e| e.created_at))
    }

    /// Administrative bulk purge, all-or-nothing. Not used by the workflow
    /// path.
    #[instrument(skip(self, filter))]
    pub async fn purge_by_filter(&self, filter: &AuditFilter) -> Result<u64, ServiceError> {
        let txn = self.db.begin().await?;

        let mut delete = audit_log::Entity::delete_many();
        if let Some(entity_type) = &filter.entity_type {
            delete = delete.filter(audit_log::Column::EntityType.eq(entity_type.clone()));
        }
        if let Some(entity_ref) = &filter.entity_ref {
            delete = delete.filter(audit_log::Column::EntityRef.eq(entity_ref.clone()));
        }
        if let Some(actor_id) = filter.actor_id {
            delete = delete.filter(audit_log::Column::ActorId.eq(actor_id));
        }

        let result = delete.exec(&txn).await?;
        txn.commit().await?;

        info!(deleted = result.rows_affected, "Audit entries purged");
        Ok(result.rows_affected)
    }
}
