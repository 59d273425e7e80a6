use std::time::{Duration, Instant};

use axum::http::HeaderMap;
use axum_extra::headers::{self, HeaderMapExt};
use serde::Deserialize;

/// Tokens are refreshed this long before Daraja expires them.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

pub fn basic_headers(consumer_key: &str, consumer_secret: &str) -> HeaderMap {
    let mut map = HeaderMap::new();
    map.typed_insert(headers::Authorization::basic(consumer_key, consumer_secret));
    map
}

pub fn bearer_headers(token: &str) -> HeaderMap {
    let mut map = HeaderMap::new();
    // tokens that are not valid header values are sent without auth and rejected upstream
    if let Ok(auth) = headers::Authorization::bearer(token) {
        map.typed_insert(auth);
    }
    map.typed_insert(headers::ContentType::json());
    map
}

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: Option<String>,
    #[serde(default, deserialize_with = "lenient_seconds")]
    pub expires_in: Option<u64>,
}

/// Daraja sends `expires_in` as a string, tolerate a number as well.
fn lenient_seconds<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Seconds {
        Number(u64),
        Text(String),
    }

    Ok(
        match Option::<Seconds>::deserialize(deserializer)? {
            Some(Seconds::Number(n)) => Some(n),
            Some(Seconds::Text(s)) => s.trim().parse().ok(),
            None => None,
        },
    )
}

#[derive(Debug, Clone)]
pub struct AccessToken {
    value: String,
    expires_at: Instant,
}

impl AccessToken {
    /// Daraja tokens live for an hour.
    pub const DEFAULT_LIFETIME: Duration = Duration::from_secs(3599);

    /// Lifetimes that overflow the clock fall back to [`Self::DEFAULT_LIFETIME`].
    pub fn new(value: String, lifetime: Duration) -> Self {
        let now = Instant::now();
        let expires_at = now
            .checked_add(lifetime)
            .unwrap_or(now + Self::DEFAULT_LIFETIME);
        Self { value, expires_at }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Still usable at `now`, keeping a safety margin before expiry.
    pub fn is_fresh_at(&self, now: Instant) -> bool {
        now + EXPIRY_MARGIN < self.expires_at
    }

    pub fn is_fresh(&self) -> bool {
        self.is_fresh_at(Instant::now())
    }
}
