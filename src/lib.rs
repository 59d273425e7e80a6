//! M-Pesa Daraja STK Push integration.
//!
//! - [config] (validated credentials and mode)
//! - [gateway] (token handling, STK Push initiation and query)
//! - [callback] (parsing the payload Daraja posts back)
//! - [server] (axum glue for a callback endpoint)
#![doc = include_str!("../README.md")]

pub mod callback;
pub mod config;
/// Daraja API client
///
/// This module defines the types and methods to talk to Safaricom's Daraja API.
pub mod gateway;
pub mod server;

pub use callback::{CallbackError, PaymentMetadata, StkCallback};
pub use config::{AccountKind, Config, ConfigError, Environment, RetryPolicy};
pub use gateway::{DarajaGateway, Error, PaymentRequest, StkPushResponse, StkQueryResponse};
