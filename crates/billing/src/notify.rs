//! Notification dispatch
//!
//! Best-effort, fire-and-forget delivery of customer notifications. The
//! billing core never blocks on delivery confirmation and never fails an
//! operation because a notification could not be sent: delivery errors are
//! logged here and go no further.

use async_trait::async_trait;
use rebill_shared::TemplateKind;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Collaborator that delivers a templated message to a customer.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    /// Queue a notification. Must not block on delivery and must not fail
    /// the caller: all transport errors are swallowed and logged.
    async fn notify(&self, customer_id: Uuid, kind: TemplateKind, params: serde_json::Value);
}

/// Configuration for the SMS gateway dispatcher.
#[derive(Debug, Clone)]
pub struct SmsConfig {
    pub gateway_url: String,
    pub api_token: String,
}

impl SmsConfig {
    /// Read gateway settings from `SMS_GATEWAY_URL` / `SMS_GATEWAY_TOKEN`.
    pub fn from_env() -> Option<Self> {
        let gateway_url = std::env::var("SMS_GATEWAY_URL").ok()?;
        let api_token = std::env::var("SMS_GATEWAY_TOKEN").unwrap_or_default();
        Some(Self {
            gateway_url,
            api_token,
        })
    }
}

/// Dispatcher that posts notification requests to an HTTP SMS gateway.
///
/// The gateway resolves the customer's phone number and renders the
/// template; this side only identifies the customer and the message kind.
#[derive(Clone)]
pub struct SmsDispatcher {
    client: reqwest::Client,
    config: SmsConfig,
}

impl SmsDispatcher {
    pub fn new(config: SmsConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl NotificationDispatcher for SmsDispatcher {
    async fn notify(&self, customer_id: Uuid, kind: TemplateKind, params: serde_json::Value) {
        let client = self.client.clone();
        let config = self.config.clone();
        let body = serde_json::json!({
            "customer_id": customer_id,
            "template": kind.as_str(),
            "params": params,
        });

        // Detached send: a slow or failing gateway must not stall billing.
        tokio::spawn(async move {
            let result = client
                .post(&config.gateway_url)
                .bearer_auth(&config.api_token)
                .json(&body)
                .send()
                .await;

            match result {
                Ok(response) if response.status().is_success() => {
                    info!(
                        customer_id = %customer_id,
                        template = kind.as_str(),
                        "Notification dispatched"
                    );
                }
                Ok(response) => {
                    warn!(
                        customer_id = %customer_id,
                        template = kind.as_str(),
                        status = %response.status(),
                        "SMS gateway rejected notification"
                    );
                }
                Err(e) => {
                    error!(
                        customer_id = %customer_id,
                        template = kind.as_str(),
                        error = %e,
                        "Failed to reach SMS gateway"
                    );
                }
            }
        });
    }
}

/// Dispatcher that drops everything. Used when no gateway is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullDispatcher;

#[async_trait]
impl NotificationDispatcher for NullDispatcher {
    async fn notify(&self, customer_id: Uuid, kind: TemplateKind, _params: serde_json::Value) {
        info!(
            customer_id = %customer_id,
            template = kind.as_str(),
            "Notification dropped (no gateway configured)"
        );
    }
}

/// In-memory dispatcher that records every request, for tests.
#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    sent: std::sync::Mutex<Vec<(Uuid, TemplateKind)>>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<(Uuid, TemplateKind)> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn count_of(&self, kind: TemplateKind) -> usize {
        self.sent().iter().filter(|(_, k)| *k == kind).count()
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    async fn notify(&self, customer_id: Uuid, kind: TemplateKind, _params: serde_json::Value) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push((customer_id, kind));
        }
    }
}
