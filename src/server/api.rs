use axum::{
    body::Bytes,
    extract::{FromRequest, Query, State},
    response::IntoResponse,
    routing::post,
};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::{
    callback,
    gateway::{self, DarajaGateway, PaymentRequest, StkPushResponse, StkQueryResponse, mask},
    server::{AckPolicy, AppState, CallbackState},
};

/// Body Daraja expects back from a callback endpoint.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct Ack {
    #[serde(rename = "ResultCode")]
    pub result_code: u8,
    #[serde(rename = "ResultDesc")]
    pub result_desc: String,
}

impl Ack {
    fn accepted() -> (StatusCode, axum::Json<Self>) {
        (
            StatusCode::OK,
            axum::Json(Self {
                result_code: 0,
                result_desc: "Success".into(),
            }),
        )
    }

    fn rejected(status: StatusCode, desc: impl Into<String>) -> (StatusCode, axum::Json<Self>) {
        (
            status,
            axum::Json(Self {
                result_code: 1,
                result_desc: desc.into(),
            }),
        )
    }
}

#[derive(Debug, Deserialize)]
struct CallbackParams {
    #[serde(default)]
    token: Option<String>,
}

#[instrument(skip_all)]
async fn callback_handler(
    State(state): State<CallbackState>,
    Query(params): Query<CallbackParams>,
    body: Bytes,
) -> (StatusCode, axum::Json<Ack>) {
    if let Some(expected) = state.token.as_deref() {
        if params.token.as_deref() != Some(expected) {
            tracing::warn!("Rejected callback with invalid token");
            return Ack::rejected(StatusCode::FORBIDDEN, "Invalid token");
        }
    }

    let callback = match serde_json::from_slice::<serde_json::Value>(&body) {
        Ok(value) => {
            tracing::trace!(data = %mask::secure_value(&value), "Received stk callback");
            callback::parse(&value)
        }
        Err(e) => Err(callback::CallbackError::InvalidJson(e)),
    };
    let callback = match callback {
        Ok(callback) => callback,
        Err(e) => {
            tracing::warn!("Failed to parse callback body: {e}");
            return Ack::rejected(StatusCode::BAD_REQUEST, e.to_string());
        }
    };

    let checkout_request_id = callback.checkout_request_id.clone();
    match state.sink.handle(callback).await {
        Ok(()) => Ack::accepted(),
        Err(e) => {
            tracing::error!(%checkout_request_id, "Failed to process callback: {e}");
            match state.ack_policy {
                AckPolicy::Always => Ack::accepted(),
                AckPolicy::OnSuccess => {
                    Ack::rejected(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
                }
            }
        }
    }
}

#[instrument(skip_all)]
async fn initiate_handler(
    State(gateway): State<DarajaGateway>,
    Json(payment): Json<PaymentRequest>,
) -> Result<axum::Json<StkPushResponse>, ApiError> {
    match gateway.initiate_payment(&payment).await {
        Ok(ack) => Ok(axum::Json(ack)),
        Err(e) => {
            tracing::error!("Failed to initiate payment: {e}");
            Err(e.into())
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub checkout_request_id: String,
}

#[instrument(skip_all)]
async fn query_handler(
    State(gateway): State<DarajaGateway>,
    Json(query): Json<QueryRequest>,
) -> Result<axum::Json<StkQueryResponse>, ApiError> {
    tracing::debug!(checkout_request_id = %query.checkout_request_id, "Stk query request");
    match gateway.query_payment(&query.checkout_request_id).await {
        Ok(res) => Ok(axum::Json(res)),
        Err(e) => {
            tracing::error!("Failed to query payment: {e}");
            Err(e.into())
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    #[serde(skip)]
    status: StatusCode,
    error: String,
}

impl ApiError {
    pub fn new(status: StatusCode, error: impl Into<String>) -> Self {
        Self {
            status,
            error: error.into(),
        }
    }
}

impl From<gateway::Error> for ApiError {
    fn from(value: gateway::Error) -> Self {
        let status = match &value {
            gateway::Error::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            gateway::Error::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_GATEWAY,
        };
        Self::new(status, value.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status, axum::Json(self)).into_response()
    }
}

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/api/mpesa/callback", post(callback_handler))
        .route("/api/mpesa/stkpush", post(initiate_handler))
        .route("/api/mpesa/query", post(query_handler))
}

/// `Json` extractor wrapper that answers rejections with an [`ApiError`] body
pub struct Json<T>(pub T);

impl<S, T> FromRequest<S> for Json<T>
where
    T: serde::de::DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(
        req: axum::http::Request<axum::body::Body>,
        state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        match axum::Json::<T>::from_request(req, state).await {
            Ok(axum::Json(value)) => Ok(Self(value)),
            Err(e) => Err(ApiError::new(StatusCode::BAD_REQUEST, e.body_text())),
        }
    }
}
