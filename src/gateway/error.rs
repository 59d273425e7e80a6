use serde::de::Error as _;

use crate::config::ConfigError;

/// Error body Daraja returns with non-2xx responses.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ErrorResponse {
    #[serde(rename = "requestId", default)]
    pub request_id: Option<String>,
    #[serde(rename = "errorCode")]
    pub error_code: String,
    #[serde(rename = "errorMessage")]
    pub error_message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("authentication failed with status {status}: {description}")]
    Auth { status: u16, description: String },
    #[error("network error after {attempts} attempt(s): {source}")]
    Network {
        attempts: usize,
        #[source]
        source: reqwest::Error,
    },
    #[error("gateway responded with status {status}, code {code}: {message}")]
    Gateway {
        status: u16,
        code: String,
        message: String,
    },
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("http transport error: {0}")]
    Transport(reqwest::Error),
    #[error("gateway response deserialization: {0}")]
    Deserialization(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn from_error_body(status: u16, body: &serde_json::Value) -> Self {
        match serde_json::from_value::<ErrorResponse>(body.clone()) {
            Ok(res) => Self::Gateway {
                status,
                code: res.error_code,
                message: res.error_message,
            },
            Err(_) => Self::Gateway {
                status,
                code: status.to_string(),
                message: body.to_string(),
            },
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        if value.is_decode() {
            return Self::Deserialization(serde_json::Error::custom(
                "failed to decode response body",
            ));
        }
        Self::Transport(value)
    }
}
