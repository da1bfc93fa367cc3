use crate::errors::ServiceError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Hard ceiling on tokens per multicast call, imposed by the gateway.
pub const MULTICAST_BATCH_LIMIT: usize = 500;

/// Payload delivered to each device.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PushMessage {
    pub title: String,
    pub body: Option<String>,
    pub data: serde_json::Value,
}

/// Per-token delivery result reported by the gateway.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PushDelivery {
    Delivered,
    /// The token is unregistered or invalid and should be pruned.
    InvalidToken,
    /// Transient failure; the token stays registered.
    Failed(String),
}

/// Outcome for one token of a multicast batch.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PushOutcome {
    pub token: String,
    pub delivery: PushDelivery,
}

/// Push notification gateway (FCM or equivalent).
///
/// Implementations must report a per-token outcome; callers rely on
/// `InvalidToken` to prune dead registrations. Batches larger than
/// [`MULTICAST_BATCH_LIMIT`] are the caller's responsibility to split.
#[async_trait]
pub trait PushGateway: Send + Sync {
    async fn send_multicast(
        &self,
        tokens: &[String],
        message: &PushMessage,
    ) -> Result<Vec<PushOutcome>, ServiceError>;
}

/// Recording gateway for tests and local runs: every send succeeds unless
/// the token was registered as invalid beforehand.
#[derive(Default)]
pub struct InMemoryPushGateway {
    sent: Arc<RwLock<Vec<(Vec<String>, PushMessage)>>>,
    invalid_tokens: Arc<RwLock<HashSet<String>>>,
}

impl InMemoryPushGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a token so subsequent sends report it as unregistered.
    pub async fn mark_invalid(&self, token: &str) {
        self.invalid_tokens.write().await.insert(token.to_string());
    }

    /// Batches recorded so far, in send order.
    pub async fn sent_batches(&self) -> Vec<(Vec<String>, PushMessage)> {
        self.sent.read().await.clone()
    }
}

#[async_trait]
impl PushGateway for InMemoryPushGateway {
    async fn send_multicast(
        &self,
        tokens: &[String],
        message: &PushMessage,
    ) -> Result<Vec<PushOutcome>, ServiceError> {
        if tokens.len() > MULTICAST_BATCH_LIMIT {
            return Err(ServiceError::ExternalServiceError(format!(
                "multicast batch of {} exceeds gateway limit of {}",
                tokens.len(),
                MULTICAST_BATCH_LIMIT
            )));
        }
        self.sent
            .write()
            .await
            .push((tokens.to_vec(), message.clone()));
        let invalid = self.invalid_tokens.read().await;
        Ok(tokens
            .iter()
            .map(|t| PushOutcome {
                token: t.clone(),
                delivery: if invalid.contains(t) {
                    PushDelivery::InvalidToken
                } else {
                    PushDelivery::Delivered
                },
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn reports_invalid_tokens_per_batch() {
        let gateway = InMemoryPushGateway::new();
        gateway.mark_invalid("dead-token").await;

        let message = PushMessage {
            title: "Purchase order approved".into(),
            body: None,
            data: json!({}),
        };
        let outcomes = gateway
            .send_multicast(&["live-token".into(), "dead-token".into()], &message)
            .await
            .unwrap();

        assert_eq!(outcomes[0].delivery, PushDelivery::Delivered);
        assert_eq!(outcomes[1].delivery, PushDelivery::InvalidToken);
        assert_eq!(gateway.sent_batches().await.len(), 1);
    }

    #[tokio::test]
    async fn rejects_oversized_batches() {
        let gateway = InMemoryPushGateway::new();
        let tokens: Vec<String> = (0..=MULTICAST_BATCH_LIMIT).map(|i| format!("t{i}")).collect();
        let message = PushMessage {
            title: "x".into(),
            body: None,
            data: json!({}),
        };
        assert!(gateway.send_multicast(&tokens, &message).await.is_err());
    }
}
