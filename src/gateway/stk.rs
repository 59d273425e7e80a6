use base64::{Engine, prelude::BASE64_STANDARD};
use serde::{Deserialize, Serialize};
use time::{
    OffsetDateTime, UtcOffset,
    macros::{format_description, offset},
};

use crate::config::{AccountKind, Config};

/// Daraja timestamps are expressed in East Africa Time.
const EAT: UtcOffset = offset!(+3);

/// Payment the caller wants to collect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub phone_number: String,
    /// Whole shillings.
    pub amount: u64,
    pub account_reference: String,
    pub transaction_desc: String,
}

#[derive(Debug, Serialize)]
pub struct StkPushRequest<'a> {
    #[serde(rename = "BusinessShortCode")]
    pub business_short_code: &'a str,
    #[serde(rename = "Password")]
    pub password: String,
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
    #[serde(rename = "TransactionType")]
    pub transaction_type: &'static str,
    #[serde(rename = "Amount")]
    pub amount: u64,
    #[serde(rename = "PartyA")]
    pub party_a: &'a str,
    #[serde(rename = "PartyB")]
    pub party_b: &'a str,
    #[serde(rename = "PhoneNumber")]
    pub phone_number: &'a str,
    #[serde(rename = "CallBackURL")]
    pub callback_url: &'a str,
    #[serde(rename = "AccountReference")]
    pub account_reference: &'a str,
    #[serde(rename = "TransactionDesc")]
    pub transaction_desc: &'a str,
}

impl<'a> StkPushRequest<'a> {
    /// `phone` must already be normalized.
    pub fn new(
        config: &'a Config,
        request: &'a PaymentRequest,
        phone: &'a str,
        timestamp: String,
    ) -> Self {
        let business_short_code = config.business_shortcode();
        let party_b = match config.account_kind() {
            AccountKind::Till => config.shortcode(),
            AccountKind::Paybill => business_short_code,
        };
        Self {
            business_short_code,
            password: password(business_short_code, config.passkey(), &timestamp),
            timestamp,
            transaction_type: config.account_kind().transaction_type(),
            amount: request.amount,
            party_a: phone,
            party_b,
            phone_number: phone,
            callback_url: config.callback_url().as_str(),
            account_reference: &request.account_reference,
            transaction_desc: &request.transaction_desc,
        }
    }
}

/// Synchronous acknowledgement of an STK Push. Fields Daraja adds are kept in `extra`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StkPushResponse {
    #[serde(rename = "MerchantRequestID")]
    pub merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    #[serde(rename = "ResponseCode")]
    pub response_code: String,
    #[serde(rename = "ResponseDescription")]
    pub response_description: String,
    #[serde(rename = "CustomerMessage", default)]
    pub customer_message: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl StkPushResponse {
    pub fn is_accepted(&self) -> bool {
        self.response_code.trim() == "0"
    }
}

/// Current time as `YYYYMMDDHHMMSS` in EAT.
pub fn timestamp() -> String {
    format_timestamp(OffsetDateTime::now_utc())
}

pub fn format_timestamp(at: OffsetDateTime) -> String {
    at.to_offset(EAT)
        .format(format_description!(
            "[year][month][day][hour][minute][second]"
        ))
        .expect("timestamp format has only numeric components of a valid date")
}

/// `base64(shortcode + passkey + timestamp)`
pub fn password(shortcode: &str, passkey: &str, timestamp: &str) -> String {
    BASE64_STANDARD.encode(format!("{shortcode}{passkey}{timestamp}"))
}

/// Normalize a Kenyan MSISDN to `2547XXXXXXXX` / `2541XXXXXXXX`.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let digits: String = raw
        .chars()
        .filter(|c| !matches!(c, '+' | ' ' | '-' | '(' | ')'))
        .collect();
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let subscriber = match digits.len() {
        12 if digits.starts_with("254") => &digits[3..],
        10 if digits.starts_with('0') => &digits[1..],
        9 => &digits[..],
        _ => return None,
    };
    if !matches!(subscriber.as_bytes().first(), Some(b'7' | b'1')) {
        return None;
    }
    Some(format!("254{subscriber}"))
}
