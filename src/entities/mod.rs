pub mod audit_log;
pub mod device_token;
pub mod notification;
pub mod po_sequence;
pub mod purchase_order;
pub mod purchase_order_attachment;
pub mod purchase_order_item;
