use crate::errors::ServiceError;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

/// Domain events emitted by the workflow engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    PurchaseOrderCreated(Uuid),
    PurchaseOrderUpdated(Uuid),
    PurchaseOrderStatusChanged {
        po_id: Uuid,
        old_status: String,
        new_status: String,
    },
    AttachmentAdded {
        po_id: Uuid,
        url: String,
    },
}

/// Handle for publishing events onto the processing channel.
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously. Fails once the processing loop has
    /// shut down and dropped its receiver.
    pub async fn send(&self, event: Event) -> Result<(), ServiceError> {
        self.sender
            .send(event)
            .await
            .map_err(|e| ServiceError::EventError(format!("Failed to send event: {}", e)))
    }
}

/// Creates a bounded event channel, returning the sender and the raw
/// receiver for [`process_events`].
pub fn event_channel(capacity: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(capacity);
    (EventSender::new(tx), rx)
}

/// Consumes events off the channel until every sender is dropped.
///
/// Event consumption is observational only; the workflow result never
/// depends on it.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match event {
            Event::PurchaseOrderCreated(po_id) => {
                info!(po_id = %po_id, "Purchase order created event");
            }
            Event::PurchaseOrderUpdated(po_id) => {
                info!(po_id = %po_id, "Purchase order updated event");
            }
            Event::PurchaseOrderStatusChanged {
                po_id,
                old_status,
                new_status,
            } => {
                info!(
                    po_id = %po_id,
                    old_status = %old_status,
                    new_status = %new_status,
                    "Purchase order status changed event"
                );
            }
            Event::AttachmentAdded { po_id, url } => {
                info!(po_id = %po_id, url = %url, "Attachment added event");
            }
        }
    }

    info!("Event processing loop stopped");
}
