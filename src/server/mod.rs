//! Example axum glue: callback endpoint plus thin initiate and query endpoints.

use std::{str::FromStr, sync::Arc};

use crate::{callback::StkCallback, gateway::DarajaGateway};

pub mod api;

pub use api::router;

/// What the callback endpoint tells Daraja when the sink fails to process a callback.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AckPolicy {
    /// Always acknowledge a well formed callback. Sink failures are only logged.
    #[default]
    Always,
    /// Answer 500 when the sink fails.
    OnSuccess,
}

impl FromStr for AckPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "always" => Ok(Self::Always),
            "on_success" | "on-success" => Ok(Self::OnSuccess),
            other => Err(format!(
                "ack policy must be 'always' or 'on_success', got {other:?}"
            )),
        }
    }
}

/// Receives parsed callbacks. Implement it to persist outcomes or notify customers.
#[async_trait::async_trait]
pub trait CallbackSink: Send + Sync {
    async fn handle(&self, callback: StkCallback) -> anyhow::Result<()>;
}

/// Sink that only logs outcomes.
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait::async_trait]
impl CallbackSink for LogSink {
    async fn handle(&self, callback: StkCallback) -> anyhow::Result<()> {
        let metadata = callback.metadata();
        if callback.is_success() {
            tracing::info!(
                checkout_request_id = %callback.checkout_request_id,
                receipt = ?metadata.receipt_number,
                amount = ?metadata.amount,
                "Payment completed"
            );
        } else {
            tracing::info!(
                checkout_request_id = %callback.checkout_request_id,
                code = callback.result_code,
                description = %callback.result_desc,
                "Payment not completed"
            );
        }
        Ok(())
    }
}

#[derive(Clone, axum::extract::FromRef)]
pub struct AppState {
    pub gateway: DarajaGateway,
    pub callback: CallbackState,
}

#[derive(Clone)]
pub struct CallbackState {
    pub token: Option<Arc<str>>,
    pub ack_policy: AckPolicy,
    pub sink: Arc<dyn CallbackSink>,
}

impl AppState {
    pub fn new(gateway: DarajaGateway, sink: Arc<dyn CallbackSink>) -> Self {
        Self {
            gateway,
            callback: CallbackState {
                token: None,
                ack_policy: AckPolicy::default(),
                sink,
            },
        }
    }

    /// Require `?token=` on the callback url.
    pub fn with_callback_token(mut self, token: impl Into<Arc<str>>) -> Self {
        self.callback.token = Some(token.into());
        self
    }

    pub fn with_ack_policy(mut self, policy: AckPolicy) -> Self {
        self.callback.ack_policy = policy;
        self
    }
}
