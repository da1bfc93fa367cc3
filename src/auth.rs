//! Caller identity for workflow operations.
//!
//! Authentication itself happens outside this crate; every operation is
//! invoked with an already-verified [`Actor`] carrying the caller's id and
//! role.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};
use uuid::Uuid;

/// Roles recognised by the approval chain.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UserRole {
    Employee,
    AssistantManager,
    Manager,
    FinanceManager,
    GeneralManager,
    ProcurementOfficer,
}

impl UserRole {
    /// Manager-tier roles see every purchase order and every attachment.
    pub fn is_manager_tier(&self) -> bool {
        matches!(
            self,
            UserRole::Manager
                | UserRole::AssistantManager
                | UserRole::FinanceManager
                | UserRole::GeneralManager
        )
    }

    /// Roles whose own orders skip the assistant review tier.
    pub fn skips_assistant_review(&self) -> bool {
        matches!(self, UserRole::Manager | UserRole::AssistantManager)
    }
}

/// A verified caller: identity plus role, resolved by the surrounding
/// application before the workflow is invoked.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: Uuid,
    pub role: UserRole,
}

impl Actor {
    pub fn new(id: Uuid, role: UserRole) -> Self {
        Self { id, role }
    }

    /// Whether this actor may act on purchase orders they did not create.
    pub fn is_elevated(&self) -> bool {
        self.role.is_manager_tier() || self.role == UserRole::ProcurementOfficer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_serializes_as_snake_case() {
        assert_eq!(UserRole::AssistantManager.to_string(), "assistant_manager");
        assert_eq!(
            serde_json::to_string(&UserRole::ProcurementOfficer).unwrap(),
            "\"procurement_officer\""
        );
    }

    #[test]
    fn employee_is_not_elevated() {
        let actor = Actor::new(Uuid::new_v4(), UserRole::Employee);
        assert!(!actor.is_elevated());
        assert!(Actor::new(Uuid::new_v4(), UserRole::Manager).is_elevated());
    }
}
