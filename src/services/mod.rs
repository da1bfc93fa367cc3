pub mod attachments;
pub mod audit;
pub mod notifications;
pub mod purchase_orders;
pub mod sequence;
pub mod transitions;

pub use attachments::AttachmentService;
pub use audit::AuditService;
pub use notifications::NotificationOrchestrator;
pub use purchase_orders::PurchaseOrderService;
pub use sequence::SequenceService;
