use sea_orm::error::DbErr;
use sea_orm::TransactionError;
use serde::Serialize;
use thiserror::Error;

/// Errors produced by the workflow services.
///
/// Guard failures (`StateConflict`, `PermissionDenied`, `NotFound`,
/// `ValidationError`) are always raised before any persistence write, so a
/// rejected operation leaves no partial state behind. Notification failures
/// are never surfaced through this type; they are logged and swallowed by
/// the orchestrator.
#[derive(Error, Debug, Serialize)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(
        #[from]
        #[serde(skip)]
        DbErr,
    ),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    /// The operation is not legal from the purchase order's current status.
    ///
    /// Carries enough context for a client to explain why the action is
    /// blocked: the operation name, the status the order is actually in,
    /// and the status(es) the operation requires.
    #[error("State conflict: {operation} requires status {required}, but the purchase order is {current}")]
    StateConflict {
        operation: String,
        current: String,
        required: String,
    },

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Event error: {0}")]
    EventError(String),

    #[error("External service error: {0}")]
    ExternalServiceError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl ServiceError {
    /// Wraps a database error. Kept as a named constructor so transaction
    /// closures can use it as a function reference.
    pub fn db_error(err: DbErr) -> Self {
        ServiceError::DatabaseError(err)
    }

    pub fn is_state_conflict(&self) -> bool {
        matches!(self, ServiceError::StateConflict { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ServiceError::NotFound(_))
    }
}

impl From<TransactionError<ServiceError>> for ServiceError {
    fn from(err: TransactionError<ServiceError>) -> Self {
        match err {
            TransactionError::Connection(db_err) => ServiceError::DatabaseError(db_err),
            TransactionError::Transaction(service_err) => service_err,
        }
    }
}
