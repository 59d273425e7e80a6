use serde::{Deserialize, Serialize};

use crate::gateway::{DarajaGateway, Error, Result, auth, mask, read_body, stk};

#[derive(Debug, Serialize)]
pub struct StkQueryRequest<'a> {
    #[serde(rename = "BusinessShortCode")]
    pub business_short_code: &'a str,
    #[serde(rename = "Password")]
    pub password: String,
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: &'a str,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StkQueryResponse {
    #[serde(rename = "ResponseCode")]
    pub response_code: String,
    #[serde(rename = "ResponseDescription")]
    pub response_description: String,
    #[serde(rename = "MerchantRequestID")]
    pub merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    /// Daraja sends the result code as a string here, unlike the callback.
    #[serde(rename = "ResultCode")]
    pub result_code: String,
    #[serde(rename = "ResultDesc")]
    pub result_desc: String,
}

impl StkQueryResponse {
    /// The customer completed the payment.
    pub fn is_paid(&self) -> bool {
        self.result_code.trim() == "0"
    }
}

impl DarajaGateway {
    /// Ask Daraja for the outcome of an earlier STK Push.
    pub async fn query_payment(&self, checkout_request_id: &str) -> Result<StkQueryResponse> {
        if checkout_request_id.trim().is_empty() {
            return Err(Error::InvalidRequest(
                "checkout_request_id is required".into(),
            ));
        }
        let token = self.access_token().await?;
        let timestamp = stk::timestamp();
        let business_short_code = self.config.business_shortcode();
        let request = StkQueryRequest {
            business_short_code,
            password: stk::password(business_short_code, self.config.passkey(), &timestamp),
            timestamp,
            checkout_request_id,
        };
        let url = format!("{}/mpesa/stkpushquery/v1/query", self.config.base_url());
        tracing::debug!(%url, data = %mask::secure_serializable(&request), "Gateway API stk query request");

        let response = self
            .send_with_retry(|| {
                self.client
                    .post(&url)
                    .headers(auth::bearer_headers(&token))
                    .json(&request)
            })
            .await?;
        let (status, body) = read_body(response).await?;
        tracing::debug!(%status, data = %mask::secure_value(&body), "Gateway API stk query response");
        if !status.is_success() {
            return Err(Error::from_error_body(status.as_u16(), &body));
        }
        let result: StkQueryResponse = serde_json::from_value(body)?;
        if result.response_code.trim() != "0" {
            return Err(Error::Gateway {
                status: status.as_u16(),
                code: result.response_code,
                message: result.response_description,
            });
        }
        Ok(result)
    }
}
