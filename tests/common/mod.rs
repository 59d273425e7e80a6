#![allow(dead_code)]

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    routing::{get, post},
};
use daraja_stk::{AccountKind, Config, RetryPolicy};
use serde_json::{Value, json};
use tokio::net::TcpListener;

pub const PASSKEY: &str = "bfb279f9aa9bdbcf158e97dd71a467cd2e0c893059b10f78e6b72ada1ed2c919";

#[derive(Clone)]
pub struct Reply {
    pub status: StatusCode,
    pub body: Value,
}

impl Reply {
    pub fn ok(body: Value) -> Self {
        Self {
            status: StatusCode::OK,
            body,
        }
    }

    pub fn status(status: StatusCode, body: Value) -> Self {
        Self { status, body }
    }
}

/// In-process stand-in for the Daraja API.
#[derive(Clone)]
pub struct StubGateway {
    pub base_url: String,
    pub token_hits: Arc<AtomicUsize>,
    pub push_hits: Arc<AtomicUsize>,
    pub query_hits: Arc<AtomicUsize>,
    pub last_push: Arc<Mutex<Option<Value>>>,
    pub last_push_auth: Arc<Mutex<Option<String>>>,
}

#[derive(Clone)]
struct StubState {
    stub: StubGateway,
    token: Reply,
    push: Reply,
    query: Reply,
}

pub fn token_ok() -> Reply {
    Reply::ok(json!({ "access_token": "stub-token", "expires_in": "3599" }))
}

pub fn push_ok() -> Reply {
    Reply::ok(json!({
        "MerchantRequestID": "29115-34620561-1",
        "CheckoutRequestID": "ws_CO_191220191020363925",
        "ResponseCode": "0",
        "ResponseDescription": "Success. Request accepted for processing",
        "CustomerMessage": "Success. Request accepted for processing"
    }))
}

pub fn query_ok() -> Reply {
    Reply::ok(json!({
        "ResponseCode": "0",
        "ResponseDescription": "The service request has been accepted successsfully",
        "MerchantRequestID": "29115-34620561-1",
        "CheckoutRequestID": "ws_CO_191220191020363925",
        "ResultCode": "1032",
        "ResultDesc": "Request cancelled by user"
    }))
}

async fn token_handler(State(state): State<StubState>, headers: HeaderMap) -> (StatusCode, Json<Value>) {
    state.stub.token_hits.fetch_add(1, Ordering::SeqCst);
    let basic = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("Basic "));
    if !basic {
        return (StatusCode::UNAUTHORIZED, Json(json!({})));
    }
    (state.token.status, Json(state.token.body))
}

async fn push_handler(
    State(state): State<StubState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    state.stub.push_hits.fetch_add(1, Ordering::SeqCst);
    *state.stub.last_push.lock().unwrap() = Some(body);
    *state.stub.last_push_auth.lock().unwrap() = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    (state.push.status, Json(state.push.body))
}

async fn query_handler(State(state): State<StubState>) -> (StatusCode, Json<Value>) {
    state.stub.query_hits.fetch_add(1, Ordering::SeqCst);
    (state.query.status, Json(state.query.body))
}

pub async fn spawn_gateway(token: Reply, push: Reply, query: Reply) -> StubGateway {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let stub = StubGateway {
        base_url: format!("http://{addr}"),
        token_hits: Arc::default(),
        push_hits: Arc::default(),
        query_hits: Arc::default(),
        last_push: Arc::default(),
        last_push_auth: Arc::default(),
    };
    let app = Router::new()
        .route("/oauth/v1/generate", get(token_handler))
        .route("/mpesa/stkpush/v1/processrequest", post(push_handler))
        .route("/mpesa/stkpushquery/v1/query", post(query_handler))
        .with_state(StubState {
            stub: stub.clone(),
            token,
            push,
            query,
        });
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    stub
}

/// Listener that accepts and immediately drops every connection.
pub async fn spawn_dropping_listener() -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = accepted.clone();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            drop(socket);
        }
    });
    (format!("http://{addr}"), accepted)
}

pub fn config(base_url: &str, kind: AccountKind) -> Config {
    Config::builder()
        .consumer_key("key")
        .consumer_secret("secret")
        .shortcode("174379")
        .passkey(PASSKEY)
        .callback_url("https://example.com/api/mpesa/callback")
        .account_kind(kind)
        .timeout(Duration::from_secs(5))
        .retry(RetryPolicy {
            max_attempts: 3,
            delay: Duration::from_millis(10),
        })
        .base_url(base_url)
        .build()
        .unwrap()
}
