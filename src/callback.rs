//! STK Push callback payload.
//!
//! Daraja posts the final payment outcome to the configured callback url as
//!
//! ```json
//! {"Body": {"stkCallback": {
//!     "MerchantRequestID": "29115-34620561-1",
//!     "CheckoutRequestID": "ws_CO_191220191020363925",
//!     "ResultCode": 0,
//!     "ResultDesc": "The service request is processed successfully.",
//!     "CallbackMetadata": {"Item": [{"Name": "Amount", "Value": 1.00}]}
//! }}}
//! ```
//!
//! `CallbackMetadata` is only present for successful payments.

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum CallbackError {
    #[error("callback body is not valid json: {0}")]
    InvalidJson(serde_json::Error),
    #[error("callback payload is missing {0}")]
    MissingField(&'static str),
    #[error("malformed stkCallback: {0}")]
    Malformed(serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StkCallback {
    #[serde(rename = "MerchantRequestID")]
    pub merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    #[serde(rename = "ResultCode")]
    pub result_code: i64,
    #[serde(rename = "ResultDesc")]
    pub result_desc: String,
    #[serde(
        rename = "CallbackMetadata",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub callback_metadata: Option<CallbackMetadata>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallbackMetadata {
    #[serde(rename = "Item", default)]
    pub items: Vec<MetadataItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetadataItem {
    #[serde(rename = "Name")]
    pub name: String,
    /// Absent for items such as an empty `Balance`.
    #[serde(rename = "Value", default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

/// Well known metadata of a successful payment.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct PaymentMetadata {
    pub amount: Option<f64>,
    pub receipt_number: Option<String>,
    /// `YYYYMMDDHHMMSS` as sent by Daraja.
    pub transaction_date: Option<String>,
    pub phone_number: Option<String>,
}

impl StkCallback {
    pub fn is_success(&self) -> bool {
        self.result_code == 0
    }

    pub fn item(&self, name: &str) -> Option<&serde_json::Value> {
        self.callback_metadata
            .as_ref()?
            .items
            .iter()
            .find(|item| item.name == name)?
            .value
            .as_ref()
    }

    pub fn metadata(&self) -> PaymentMetadata {
        PaymentMetadata {
            amount: self.item("Amount").and_then(as_f64),
            receipt_number: self.item("MpesaReceiptNumber").and_then(as_text),
            transaction_date: self.item("TransactionDate").and_then(as_text),
            phone_number: self.item("PhoneNumber").and_then(as_text),
        }
    }
}

fn as_f64(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Extract the `stkCallback` object from a callback body.
pub fn parse(payload: &serde_json::Value) -> Result<StkCallback, CallbackError> {
    let body = payload
        .get("Body")
        .ok_or(CallbackError::MissingField("Body"))?;
    let callback = body
        .get("stkCallback")
        .ok_or(CallbackError::MissingField("stkCallback"))?;
    StkCallback::deserialize(callback).map_err(CallbackError::Malformed)
}

pub fn parse_slice(bytes: &[u8]) -> Result<StkCallback, CallbackError> {
    let payload: serde_json::Value =
        serde_json::from_slice(bytes).map_err(CallbackError::InvalidJson)?;
    parse(&payload)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn success() -> serde_json::Value {
        json!({
            "Body": {
                "stkCallback": {
                    "MerchantRequestID": "29115-34620561-1",
                    "CheckoutRequestID": "ws_CO_191220191020363925",
                    "ResultCode": 0,
                    "ResultDesc": "The service request is processed successfully.",
                    "CallbackMetadata": {
                        "Item": [
                            { "Name": "Amount", "Value": 1.00 },
                            { "Name": "MpesaReceiptNumber", "Value": "NLJ7RT61SV" },
                            { "Name": "Balance" },
                            { "Name": "TransactionDate", "Value": 20191219102115u64 },
                            { "Name": "PhoneNumber", "Value": 254708374149u64 }
                        ]
                    }
                }
            }
        })
    }

    #[test]
    fn parses_success() {
        let callback = parse(&success()).unwrap();
        assert!(callback.is_success());
        assert_eq!(callback.result_code, 0);
        assert_eq!(callback.merchant_request_id, "29115-34620561-1");
        assert_eq!(callback.checkout_request_id, "ws_CO_191220191020363925");
        assert_eq!(
            callback.metadata(),
            PaymentMetadata {
                amount: Some(1.0),
                receipt_number: Some("NLJ7RT61SV".into()),
                transaction_date: Some("20191219102115".into()),
                phone_number: Some("254708374149".into()),
            }
        );
        assert_eq!(callback.item("Balance"), None);
    }

    #[test]
    fn parses_cancelled_without_metadata() {
        let payload = json!({
            "Body": {
                "stkCallback": {
                    "MerchantRequestID": "29115-34620561-1",
                    "CheckoutRequestID": "ws_CO_191220191020363925",
                    "ResultCode": 1032,
                    "ResultDesc": "Request canceled by user."
                }
            }
        });
        let callback = parse(&payload).unwrap();
        assert!(!callback.is_success());
        assert_eq!(callback.metadata(), PaymentMetadata::default());
    }

    #[test]
    fn rejects_missing_body() {
        let err = parse(&json!({ "stkCallback": {} })).unwrap_err();
        assert!(matches!(err, CallbackError::MissingField("Body")));
        let err = parse(&json!({ "Body": {} })).unwrap_err();
        assert!(matches!(err, CallbackError::MissingField("stkCallback")));
    }

    #[test]
    fn rejects_malformed_callback() {
        let payload = json!({ "Body": { "stkCallback": { "ResultCode": "zero" } } });
        assert!(matches!(parse(&payload), Err(CallbackError::Malformed(_))));
        assert!(matches!(parse_slice(b"{not json"), Err(CallbackError::InvalidJson(_))));
    }

    #[test]
    fn parses_raw_bytes() {
        let bytes = serde_json::to_vec(&success()).unwrap();
        assert_eq!(parse_slice(&bytes).unwrap().result_code, 0);
    }
}
