use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a purchase order.
///
/// `Completed` and every `RejectedBy*` variant are terminal: no workflow
/// operation transitions out of them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(40))")]
#[serde(rename_all = "snake_case")]
pub enum PurchaseOrderStatus {
    #[sea_orm(string_value = "draft")]
    Draft,
    #[sea_orm(string_value = "under_assistant_review")]
    UnderAssistantReview,
    #[sea_orm(string_value = "rejected_by_assistant")]
    RejectedByAssistant,
    #[sea_orm(string_value = "under_manager_review")]
    UnderManagerReview,
    #[sea_orm(string_value = "rejected_by_manager")]
    RejectedByManager,
    #[sea_orm(string_value = "under_finance_review")]
    UnderFinanceReview,
    #[sea_orm(string_value = "rejected_by_finance")]
    RejectedByFinance,
    #[sea_orm(string_value = "under_general_manager_review")]
    UnderGeneralManagerReview,
    #[sea_orm(string_value = "rejected_by_general_manager")]
    RejectedByGeneralManager,
    #[sea_orm(string_value = "pending_procurement")]
    PendingProcurement,
    #[sea_orm(string_value = "in_progress")]
    InProgress,
    #[sea_orm(string_value = "returned_to_manager_review")]
    ReturnedToManagerReview,
    #[sea_orm(string_value = "completed")]
    Completed,
}

impl PurchaseOrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseOrderStatus::Draft => "draft",
            PurchaseOrderStatus::UnderAssistantReview => "under_assistant_review",
            PurchaseOrderStatus::RejectedByAssistant => "rejected_by_assistant",
            PurchaseOrderStatus::UnderManagerReview => "under_manager_review",
            PurchaseOrderStatus::RejectedByManager => "rejected_by_manager",
            PurchaseOrderStatus::UnderFinanceReview => "under_finance_review",
            PurchaseOrderStatus::RejectedByFinance => "rejected_by_finance",
            PurchaseOrderStatus::UnderGeneralManagerReview => "under_general_manager_review",
            PurchaseOrderStatus::RejectedByGeneralManager => "rejected_by_general_manager",
            PurchaseOrderStatus::PendingProcurement => "pending_procurement",
            PurchaseOrderStatus::InProgress => "in_progress",
            PurchaseOrderStatus::ReturnedToManagerReview => "returned_to_manager_review",
            PurchaseOrderStatus::Completed => "completed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PurchaseOrderStatus::Completed
                | PurchaseOrderStatus::RejectedByAssistant
                | PurchaseOrderStatus::RejectedByManager
                | PurchaseOrderStatus::RejectedByFinance
                | PurchaseOrderStatus::RejectedByGeneralManager
        )
    }
}

impl std::fmt::Display for PurchaseOrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "purchase_orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    /// Human-readable order number, `PO-{YY}-{MM}-{NNNN}`, unique and the
    /// key the audit trail uses for this order.
    #[sea_orm(unique)]
    pub po_number: String,
    pub request_date: DateTime<Utc>,
    pub department: String,
    pub request_type: String,
    pub requester_name: String,
    pub status: PurchaseOrderStatus,
    pub notes: Option<String>,
    pub supplier_id: Option<Uuid>,
    pub execution_date: Option<DateTime<Utc>>,
    /// Always equals the sum of the line items' `line_total` when items are
    /// present; caller-supplied totals are overridden on write.
    pub total_amount: Decimal,
    pub currency: String,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::purchase_order_item::Entity")]
    Items,
    #[sea_orm(has_many = "super::purchase_order_attachment::Entity")]
    Attachments,
}

impl Related<super::purchase_order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Items.def()
    }
}

impl Related<super::purchase_order_attachment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Attachments.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_are_completed_and_rejections() {
        use PurchaseOrderStatus::*;
        for status in [
            RejectedByAssistant,
            RejectedByManager,
            RejectedByFinance,
            RejectedByGeneralManager,
            Completed,
        ] {
            assert!(status.is_terminal(), "{status} should be terminal");
        }
        for status in [
            Draft,
            UnderAssistantReview,
            UnderManagerReview,
            UnderFinanceReview,
            UnderGeneralManagerReview,
            PendingProcurement,
            InProgress,
            ReturnedToManagerReview,
        ] {
            assert!(!status.is_terminal(), "{status} should not be terminal");
        }
    }
}
