//! The purchase order transition table.
//!
//! Every guarded transition is a row of data: operation, allowed source
//! statuses, allowed caller roles, and the outcome. Adding a role or a
//! status is a table change, not a new conditional branch. The table is
//! validated for completeness at startup via [`validate_table`].

use crate::auth::UserRole;
use crate::entities::purchase_order::PurchaseOrderStatus as Status;
use crate::errors::ServiceError;

/// Named workflow operations that move a purchase order between statuses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WorkflowOp {
    Submit,
    AssistantApprove,
    AssistantReject,
    ManagerApprove,
    ManagerReject,
    RouteToFinance,
    RouteToGeneralManager,
    RouteToProcurement,
    FinanceApprove,
    FinanceReject,
    GeneralManagerApprove,
    GeneralManagerReject,
    ProcurementUpdate,
    ReturnToManager,
    ManagerFinalApprove,
    ManagerFinalReject,
    Complete,
}

impl WorkflowOp {
    /// Action tag written to the audit trail for this operation.
    pub fn action_name(&self) -> &'static str {
        match self {
            WorkflowOp::Submit => "submit_purchase_order",
            WorkflowOp::AssistantApprove => "assistant_approve_purchase_order",
            WorkflowOp::AssistantReject => "assistant_reject_purchase_order",
            WorkflowOp::ManagerApprove => "manager_approve_purchase_order",
            WorkflowOp::ManagerReject => "manager_reject_purchase_order",
            WorkflowOp::RouteToFinance => "route_to_finance",
            WorkflowOp::RouteToGeneralManager => "route_to_general_manager",
            WorkflowOp::RouteToProcurement => "route_to_procurement",
            WorkflowOp::FinanceApprove => "finance_approve_purchase_order",
            WorkflowOp::FinanceReject => "finance_reject_purchase_order",
            WorkflowOp::GeneralManagerApprove => "general_manager_approve_purchase_order",
            WorkflowOp::GeneralManagerReject => "general_manager_reject_purchase_order",
            WorkflowOp::ProcurementUpdate => "procurement_update_purchase_order",
            WorkflowOp::ReturnToManager => "return_to_manager_review",
            WorkflowOp::ManagerFinalApprove => "manager_final_approve_purchase_order",
            WorkflowOp::ManagerFinalReject => "manager_final_reject_purchase_order",
            WorkflowOp::Complete => "complete_purchase_order",
        }
    }
}

/// Resulting status of a legal transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Fixed(Status),
    /// Submit lands in a tier chosen by the submitter's role.
    SubmitByRole,
    /// Procurement updates advance `pending_procurement` to manager review
    /// and leave `in_progress` unchanged.
    AdvanceFromProcurement,
}

/// One guarded transition: `(operation, source statuses, caller roles) -> outcome`.
#[derive(Debug)]
pub struct TransitionRule {
    pub op: WorkflowOp,
    pub from: &'static [Status],
    pub roles: &'static [UserRole],
    pub outcome: Outcome,
}

const ALL_ROLES: &[UserRole] = &[
    UserRole::Employee,
    UserRole::AssistantManager,
    UserRole::Manager,
    UserRole::FinanceManager,
    UserRole::GeneralManager,
    UserRole::ProcurementOfficer,
];

pub static TRANSITIONS: &[TransitionRule] = &[
    TransitionRule {
        op: WorkflowOp::Submit,
        from: &[Status::Draft],
        // Ownership (creator or elevated) is enforced by the workflow
        // service; any role may submit its own draft.
        roles: ALL_ROLES,
        outcome: Outcome::SubmitByRole,
    },
    TransitionRule {
        op: WorkflowOp::AssistantApprove,
        from: &[Status::UnderAssistantReview],
        roles: &[UserRole::AssistantManager, UserRole::Manager],
        outcome: Outcome::Fixed(Status::UnderManagerReview),
    },
    TransitionRule {
        op: WorkflowOp::AssistantReject,
        from: &[Status::UnderAssistantReview],
        roles: &[UserRole::AssistantManager, UserRole::Manager],
        outcome: Outcome::Fixed(Status::RejectedByAssistant),
    },
    TransitionRule {
        op: WorkflowOp::ManagerApprove,
        from: &[Status::UnderManagerReview],
        roles: &[UserRole::Manager],
        outcome: Outcome::Fixed(Status::Completed),
    },
    TransitionRule {
        op: WorkflowOp::ManagerReject,
        from: &[Status::UnderManagerReview],
        roles: &[UserRole::Manager],
        outcome: Outcome::Fixed(Status::RejectedByManager),
    },
    TransitionRule {
        op: WorkflowOp::RouteToFinance,
        from: &[Status::UnderManagerReview],
        roles: &[UserRole::Manager],
        outcome: Outcome::Fixed(Status::UnderFinanceReview),
    },
    TransitionRule {
        op: WorkflowOp::RouteToGeneralManager,
        from: &[Status::UnderManagerReview],
        roles: &[UserRole::Manager],
        outcome: Outcome::Fixed(Status::UnderGeneralManagerReview),
    },
    TransitionRule {
        op: WorkflowOp::RouteToProcurement,
        from: &[Status::UnderManagerReview],
        roles: &[UserRole::Manager],
        outcome: Outcome::Fixed(Status::PendingProcurement),
    },
    TransitionRule {
        op: WorkflowOp::FinanceApprove,
        from: &[Status::UnderFinanceReview],
        roles: &[UserRole::FinanceManager],
        outcome: Outcome::Fixed(Status::UnderManagerReview),
    },
    TransitionRule {
        op: WorkflowOp::FinanceReject,
        from: &[Status::UnderFinanceReview],
        roles: &[UserRole::FinanceManager],
        outcome: Outcome::Fixed(Status::RejectedByFinance),
    },
    TransitionRule {
        op: WorkflowOp::GeneralManagerApprove,
        from: &[Status::UnderGeneralManagerReview],
        roles: &[UserRole::GeneralManager],
        outcome: Outcome::Fixed(Status::UnderManagerReview),
    },
    TransitionRule {
        op: WorkflowOp::GeneralManagerReject,
        from: &[Status::UnderGeneralManagerReview],
        roles: &[UserRole::GeneralManager],
        outcome: Outcome::Fixed(Status::RejectedByGeneralManager),
    },
    TransitionRule {
        op: WorkflowOp::ProcurementUpdate,
        from: &[Status::PendingProcurement, Status::InProgress],
        roles: &[UserRole::ProcurementOfficer],
        outcome: Outcome::AdvanceFromProcurement,
    },
    TransitionRule {
        op: WorkflowOp::ReturnToManager,
        from: &[Status::InProgress, Status::PendingProcurement],
        roles: &[UserRole::Manager],
        outcome: Outcome::Fixed(Status::ReturnedToManagerReview),
    },
    TransitionRule {
        op: WorkflowOp::ManagerFinalApprove,
        from: &[Status::ReturnedToManagerReview],
        roles: &[UserRole::Manager],
        outcome: Outcome::Fixed(Status::Completed),
    },
    TransitionRule {
        op: WorkflowOp::ManagerFinalReject,
        from: &[Status::ReturnedToManagerReview],
        roles: &[UserRole::Manager],
        outcome: Outcome::Fixed(Status::RejectedByManager),
    },
    TransitionRule {
        op: WorkflowOp::Complete,
        from: &[Status::InProgress],
        roles: &[UserRole::Manager],
        outcome: Outcome::Fixed(Status::Completed),
    },
];

/// Statuses in which the core fields of a purchase order may still be
/// edited. Terminal and rejected orders are immutable.
pub const UPDATABLE_STATUSES: &[Status] = &[
    Status::Draft,
    Status::InProgress,
    Status::UnderAssistantReview,
    Status::UnderManagerReview,
    Status::ReturnedToManagerReview,
];

/// Initial status of a newly created (non-draft) purchase order, chosen by
/// the creator's role: higher-trust roles skip the assistant tier.
pub fn initial_status(role: UserRole) -> Status {
    if role.skips_assistant_review() {
        Status::UnderManagerReview
    } else {
        Status::UnderAssistantReview
    }
}

/// Where a submitted draft lands, by submitter role.
pub fn submit_target(role: UserRole) -> Status {
    match role {
        UserRole::Manager => Status::InProgress,
        UserRole::AssistantManager => Status::UnderManagerReview,
        _ => Status::UnderAssistantReview,
    }
}

pub fn rule_for(op: WorkflowOp) -> Option<&'static TransitionRule> {
    TRANSITIONS.iter().find(|r| r.op == op)
}

fn required_statuses(rule: &TransitionRule) -> String {
    rule.from
        .iter()
        .map(Status::as_str)
        .collect::<Vec<_>>()
        .join(" or ")
}

/// Resolves the status a legal transition lands in, or the guard error.
///
/// Both guards are checked here, before any persistence write: the current
/// status must be a legal source and the caller's role must be in the
/// allowed set.
pub fn next_status(
    op: WorkflowOp,
    current: &Status,
    role: UserRole,
) -> Result<Status, ServiceError> {
    let rule = rule_for(op).ok_or_else(|| {
        ServiceError::InternalError(format!("no transition rule for {}", op.action_name()))
    })?;

    if !rule.from.contains(current) {
        return Err(ServiceError::StateConflict {
            operation: op.action_name().to_string(),
            current: current.as_str().to_string(),
            required: required_statuses(rule),
        });
    }

    if !rule.roles.contains(&role) {
        return Err(ServiceError::PermissionDenied(format!(
            "role {} may not perform {}",
            role,
            op.action_name()
        )));
    }

    Ok(match rule.outcome {
        Outcome::Fixed(status) => status,
        Outcome::SubmitByRole => submit_target(role),
        Outcome::AdvanceFromProcurement => {
            if *current == Status::PendingProcurement {
                Status::UnderManagerReview
            } else {
                current.clone()
            }
        }
    })
}

/// Startup check: each operation has exactly one rule, every rule names at
/// least one source status and one role, and no rule is sourced from a
/// terminal state.
pub fn validate_table() -> Result<(), String> {
    let mut seen = std::collections::HashSet::new();
    for rule in TRANSITIONS {
        if !seen.insert(rule.op) {
            return Err(format!("duplicate rule for {}", rule.op.action_name()));
        }
        if rule.from.is_empty() {
            return Err(format!("{} has no source statuses", rule.op.action_name()));
        }
        if rule.roles.is_empty() {
            return Err(format!("{} has no allowed roles", rule.op.action_name()));
        }
        if let Some(terminal) = rule.from.iter().find(|s| s.is_terminal()) {
            return Err(format!(
                "{} is sourced from terminal status {}",
                rule.op.action_name(),
                terminal
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_complete_and_terminal_free() {
        validate_table().unwrap();
    }

    #[test]
    fn initial_status_depends_on_creator_role() {
        assert_eq!(initial_status(UserRole::Manager), Status::UnderManagerReview);
        assert_eq!(
            initial_status(UserRole::AssistantManager),
            Status::UnderManagerReview
        );
        assert_eq!(
            initial_status(UserRole::Employee),
            Status::UnderAssistantReview
        );
        assert_eq!(
            initial_status(UserRole::ProcurementOfficer),
            Status::UnderAssistantReview
        );
    }

    #[test]
    fn submit_lands_by_role() {
        assert_eq!(
            next_status(WorkflowOp::Submit, &Status::Draft, UserRole::Manager).unwrap(),
            Status::InProgress
        );
        assert_eq!(
            next_status(WorkflowOp::Submit, &Status::Draft, UserRole::AssistantManager).unwrap(),
            Status::UnderManagerReview
        );
        assert_eq!(
            next_status(WorkflowOp::Submit, &Status::Draft, UserRole::Employee).unwrap(),
            Status::UnderAssistantReview
        );
    }

    #[test]
    fn wrong_status_is_a_state_conflict() {
        let err = next_status(
            WorkflowOp::ManagerApprove,
            &Status::Completed,
            UserRole::Manager,
        )
        .unwrap_err();
        assert!(err.is_state_conflict());
    }

    #[test]
    fn wrong_role_is_permission_denied() {
        let err = next_status(
            WorkflowOp::ManagerApprove,
            &Status::UnderManagerReview,
            UserRole::Employee,
        )
        .unwrap_err();
        assert!(matches!(err, ServiceError::PermissionDenied(_)));
    }

    #[test]
    fn assistant_approval_moves_to_manager_review() {
        for role in [UserRole::AssistantManager, UserRole::Manager] {
            assert_eq!(
                next_status(WorkflowOp::AssistantApprove, &Status::UnderAssistantReview, role)
                    .unwrap(),
                Status::UnderManagerReview
            );
        }
    }

    #[test]
    fn procurement_update_advances_only_pending() {
        assert_eq!(
            next_status(
                WorkflowOp::ProcurementUpdate,
                &Status::PendingProcurement,
                UserRole::ProcurementOfficer,
            )
            .unwrap(),
            Status::UnderManagerReview
        );
        assert_eq!(
            next_status(
                WorkflowOp::ProcurementUpdate,
                &Status::InProgress,
                UserRole::ProcurementOfficer,
            )
            .unwrap(),
            Status::InProgress
        );
    }

    #[test]
    fn review_round_trip_through_finance() {
        assert_eq!(
            next_status(
                WorkflowOp::RouteToFinance,
                &Status::UnderManagerReview,
                UserRole::Manager,
            )
            .unwrap(),
            Status::UnderFinanceReview
        );
        assert_eq!(
            next_status(
                WorkflowOp::FinanceApprove,
                &Status::UnderFinanceReview,
                UserRole::FinanceManager,
            )
            .unwrap(),
            Status::UnderManagerReview
        );
        assert_eq!(
            next_status(
                WorkflowOp::FinanceReject,
                &Status::UnderFinanceReview,
                UserRole::FinanceManager,
            )
            .unwrap(),
            Status::RejectedByFinance
        );
    }
}
