use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::Config;

pub use error::{Error, ErrorResponse};
pub use query::{StkQueryRequest, StkQueryResponse};
pub use stk::{PaymentRequest, StkPushRequest, StkPushResponse};

mod auth;
mod error;
/// Log masking for Daraja payloads
pub mod mask;
/// STK Push status query
mod query;
/// STK Push request and acknowledgement
pub mod stk;

pub use auth::AccessToken;

pub type Result<T> = std::result::Result<T, Error>;

/// Daraja STK Push client.
///
/// Cheap to clone, clones share the HTTP connection pool and the cached access token.
#[derive(Debug, Clone)]
pub struct DarajaGateway {
    client: reqwest::Client,
    config: Arc<Config>,
    token: Arc<Mutex<Option<AccessToken>>>,
}

impl DarajaGateway {
    pub fn new(config: Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(Error::Transport)?;
        tracing::info!(
            environment = %config.environment(),
            base_url = %config.base_url(),
            "Initialized Daraja gateway"
        );
        Ok(Self {
            client,
            config: Arc::new(config),
            token: Arc::new(Mutex::new(None)),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Return the cached access token or fetch a new one when it is absent or about to expire.
    pub async fn access_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh()) {
            return Ok(token.value().to_string());
        }
        let token = self.fetch_token().await?;
        let value = token.value().to_string();
        *cached = Some(token);
        Ok(value)
    }

    /// Drop the cached token so the next call authenticates again.
    pub async fn invalidate_token(&self) {
        self.token.lock().await.take();
    }

    async fn fetch_token(&self) -> Result<AccessToken> {
        let url = format!(
            "{}/oauth/v1/generate?grant_type=client_credentials",
            self.config.base_url()
        );
        tracing::debug!(%url, "Gateway API token request");
        let response = self
            .send_with_retry(|| {
                self.client.get(&url).headers(auth::basic_headers(
                    self.config.consumer_key(),
                    self.config.consumer_secret(),
                ))
            })
            .await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            tracing::error!(%status, "Failed to get access token");
            return Err(Error::Auth {
                status: status.as_u16(),
                description: auth_description(&text),
            });
        }
        let body: auth::TokenResponse =
            serde_json::from_str(&text).map_err(|e| Error::Auth {
                status: status.as_u16(),
                description: format!("invalid token response: {e}"),
            })?;
        let Some(access_token) = body.access_token.filter(|t| !t.is_empty()) else {
            tracing::error!(%status, "No access token in response");
            return Err(Error::Auth {
                status: status.as_u16(),
                description: "no access_token in response".into(),
            });
        };
        let lifetime = body
            .expires_in
            .map(std::time::Duration::from_secs)
            .unwrap_or(AccessToken::DEFAULT_LIFETIME);
        tracing::info!(expires_in = lifetime.as_secs(), "Access token retrieved");
        Ok(AccessToken::new(access_token, lifetime))
    }

    /// Initiate an STK Push and return Daraja's acknowledgement.
    ///
    /// The acknowledgement only says the prompt was sent. The payment outcome arrives later
    /// on the configured callback url, or through [`DarajaGateway::query_payment`].
    pub async fn initiate_payment(&self, payment: &PaymentRequest) -> Result<StkPushResponse> {
        let phone = validate_payment(payment)?;
        let token = self.access_token().await?;
        let request = StkPushRequest::new(&self.config, payment, &phone, stk::timestamp());
        let url = format!("{}/mpesa/stkpush/v1/processrequest", self.config.base_url());
        let secured_request = mask::secure_serializable(&request);
        tracing::debug!(%url, data = %secured_request, "Gateway API stk push request");

        let response = self
            .send_with_retry(|| {
                self.client
                    .post(&url)
                    .headers(auth::bearer_headers(&token))
                    .json(&request)
            })
            .await?;
        let (status, body) = read_body(response).await?;
        tracing::debug!(
            %status,
            response = %mask::secure_value(&body),
            "Gateway API stk push response"
        );
        if !status.is_success() {
            if status == reqwest::StatusCode::UNAUTHORIZED {
                self.invalidate_token().await;
            }
            let err = Error::from_error_body(status.as_u16(), &body);
            tracing::error!("STK push rejected: {err}");
            return Err(err);
        }
        let ack: StkPushResponse = serde_json::from_value(body)?;
        if !ack.is_accepted() {
            tracing::error!(
                code = %ack.response_code,
                description = %ack.response_description,
                "STK push not accepted"
            );
            return Err(Error::Gateway {
                status: status.as_u16(),
                code: ack.response_code,
                message: ack.response_description,
            });
        }
        tracing::info!(
            merchant_request_id = %ack.merchant_request_id,
            checkout_request_id = %ack.checkout_request_id,
            "STK push accepted"
        );
        Ok(ack)
    }

    /// Send a request, retrying only when it fails before a response arrives.
    async fn send_with_retry<F>(&self, build: F) -> Result<reqwest::Response>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let policy = self.config.retry();
        let mut attempt = 0;
        loop {
            attempt += 1;
            match build().send().await {
                Ok(response) => return Ok(response),
                Err(e) if !is_network_failure(&e) => {
                    tracing::error!(attempt, "Gateway request could not be sent: {e}");
                    return Err(Error::Transport(e));
                }
                Err(e) if attempt < policy.max_attempts => {
                    tracing::warn!(attempt, "Gateway request failed, retrying: {e}");
                    tokio::time::sleep(policy.delay).await;
                }
                Err(e) => {
                    tracing::error!(attempt, "Gateway request failed: {e}");
                    return Err(Error::Network {
                        attempts: attempt,
                        source: e,
                    });
                }
            }
        }
    }
}

/// Failures on the wire (connect, reset, timeout). Nothing else is worth retrying.
fn is_network_failure(e: &reqwest::Error) -> bool {
    e.is_connect() || e.is_timeout() || e.is_request()
}

/// Read a response body as json, keeping non-json bodies as a json string.
async fn read_body(response: reqwest::Response) -> Result<(reqwest::StatusCode, serde_json::Value)> {
    let status = response.status();
    let text = response.text().await?;
    let body = serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text));
    Ok((status, body))
}

fn validate_payment(payment: &PaymentRequest) -> Result<String> {
    if payment.amount == 0 {
        return Err(Error::InvalidRequest("amount must be at least 1".into()));
    }
    if payment.account_reference.trim().is_empty() || payment.transaction_desc.trim().is_empty() {
        return Err(Error::InvalidRequest(
            "account_reference and transaction_desc are required".into(),
        ));
    }
    stk::normalize_phone(&payment.phone_number).ok_or_else(|| {
        Error::InvalidRequest(format!(
            "phone number {:?} is not a valid Safaricom number",
            mask::mask_digits(&payment.phone_number)
        ))
    })
}

/// Pull a readable description out of a failed token response.
fn auth_description(text: &str) -> String {
    match serde_json::from_str::<ErrorResponse>(text) {
        Ok(res) => format!("{}: {}", res.error_code, res.error_message),
        Err(_) if text.trim().is_empty() => "empty response".into(),
        Err(_) => text.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payment(phone: &str, amount: u64) -> PaymentRequest {
        PaymentRequest {
            phone_number: phone.into(),
            amount,
            account_reference: "INV-1".into(),
            transaction_desc: "Order".into(),
        }
    }

    #[test]
    fn validates_payment_fields() {
        assert_eq!(validate_payment(&payment("+254719321423", 10)).unwrap(), "254719321423");
        assert!(matches!(
            validate_payment(&payment("0719321423", 0)),
            Err(Error::InvalidRequest(_))
        ));
        assert!(matches!(
            validate_payment(&payment("12", 10)),
            Err(Error::InvalidRequest(_))
        ));
        let mut blank = payment("0719321423", 10);
        blank.transaction_desc = " ".into();
        assert!(matches!(validate_payment(&blank), Err(Error::InvalidRequest(_))));
    }

    #[test]
    fn builder_errors_are_not_network_failures() {
        let err = reqwest::Client::new().get("not a url").build().unwrap_err();
        assert!(err.is_builder());
        assert!(!is_network_failure(&err));
    }

    #[test]
    fn auth_description_prefers_error_body() {
        let text = r#"{"requestId":"1","errorCode":"400.008.01","errorMessage":"Invalid Authentication passed"}"#;
        assert_eq!(auth_description(text), "400.008.01: Invalid Authentication passed");
        assert_eq!(auth_description(""), "empty response");
        assert_eq!(auth_description("Bad credentials"), "Bad credentials");
    }
}
