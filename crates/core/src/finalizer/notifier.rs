use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::NotifyError;
use crate::status::Order;

/// Body of a completion notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionNotice {
    pub order_id: String,
    pub submitter: String,
    pub completion_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl From<&Order> for CompletionNotice {
    fn from(order: &Order) -> Self {
        Self {
            order_id: order.id.clone(),
            submitter: order.submitter.clone(),
            completion_date: order.completion_date,
            note: order.note.clone(),
        }
    }
}

/// Tells the submitter an order is done.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, order: &Order) -> Result<(), NotifyError>;
}

/// Only logs. Used when no webhook is configured.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, order: &Order) -> Result<(), NotifyError> {
        info!(order_id = %order.id, submitter = %order.submitter, "Order complete");
        Ok(())
    }
}

/// POSTs a [`CompletionNotice`] as JSON.
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("reprocess/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| NotifyError::Http(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, order: &Order) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.url)
            .json(&CompletionNotice::from(order))
            .send()
            .await
            .map_err(|e| NotifyError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        info!(order_id = %order.id, url = %self.url, "Completion notification sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::ProductOptions;
    use crate::status::OrderStatus;

    fn order() -> Order {
        Order {
            id: "ops-101914-093015".to_string(),
            submitter: "ops@example.org".to_string(),
            options: ProductOptions::new(),
            status: OrderStatus::Complete,
            note: None,
            created_at: Utc::now(),
            completion_date: Some(Utc::now()),
            notified_at: None,
        }
    }

    #[test]
    fn test_notice_body() {
        let json = serde_json::to_value(CompletionNotice::from(&order())).unwrap();
        assert_eq!(json["order_id"], "ops-101914-093015");
        assert_eq!(json["submitter"], "ops@example.org");
        assert!(json.get("note").is_none());
    }

    #[tokio::test]
    async fn test_log_notifier_always_succeeds() {
        tokio_test::assert_ok!(LogNotifier.notify(&order()).await);
    }

    #[tokio::test]
    async fn test_webhook_unreachable() {
        let notifier = WebhookNotifier::new("http://127.0.0.1:9/notify", Duration::from_secs(2)).unwrap();
        let err = notifier.notify(&order()).await.unwrap_err();
        assert!(matches!(err, NotifyError::Http(_)));
        assert!(err.is_retryable());
    }
}
