use std::{fmt, str::FromStr, time::Duration};

use reqwest::Url;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_ATTEMPTS: usize = 3;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required field: {0}")]
    Missing(&'static str),
    #[error("invalid {field}: {value:?} must be 5 to 7 digits")]
    InvalidShortcode { field: &'static str, value: String },
    #[error("invalid url {0:?}, expected an absolute http(s) url")]
    InvalidUrl(String),
    #[error("environment must be 'sandbox' or 'production', got {0:?}")]
    InvalidEnvironment(String),
    #[error("account type must be 'till' or 'paybill', got {0:?}")]
    InvalidAccountKind(String),
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Environment {
    #[default]
    Sandbox,
    Production,
}

impl Environment {
    pub fn base_url(&self) -> &'static str {
        match self {
            Self::Sandbox => "https://sandbox.safaricom.co.ke",
            Self::Production => "https://api.safaricom.co.ke",
        }
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sandbox" => Ok(Self::Sandbox),
            "production" => Ok(Self::Production),
            _ => Err(ConfigError::InvalidEnvironment(s.to_string())),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sandbox => f.write_str("sandbox"),
            Self::Production => f.write_str("production"),
        }
    }
}

/// Merchant account mode.
///
/// Till (Buy Goods) payments go to the till number while the password is derived from the
/// store number. Paybill payments use the paybill number for both.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AccountKind {
    #[default]
    Till,
    Paybill,
}

impl AccountKind {
    pub fn transaction_type(&self) -> &'static str {
        match self {
            Self::Till => "CustomerBuyGoodsOnline",
            Self::Paybill => "CustomerPayBillOnline",
        }
    }
}

impl FromStr for AccountKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "till" | "buygoods" => Ok(Self::Till),
            "paybill" => Ok(Self::Paybill),
            _ => Err(ConfigError::InvalidAccountKind(s.to_string())),
        }
    }
}

/// Fixed attempt count with a fixed pause between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// Validated Daraja configuration. Built with [`Config::builder`] or [`Config::from_env`].
#[derive(Clone)]
pub struct Config {
    consumer_key: String,
    consumer_secret: String,
    shortcode: String,
    business_shortcode: String,
    passkey: String,
    callback_url: Url,
    environment: Environment,
    account_kind: AccountKind,
    timeout: Duration,
    retry: RetryPolicy,
    base_url: Option<String>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("consumer_key", &"***")
            .field("consumer_secret", &"***")
            .field("shortcode", &self.shortcode)
            .field("business_shortcode", &self.business_shortcode)
            .field("passkey", &"***")
            .field("callback_url", &self.callback_url.as_str())
            .field("environment", &self.environment)
            .field("account_kind", &self.account_kind)
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Read configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        builder.consumer_key = lookup("MPESA_CONSUMER_KEY");
        builder.consumer_secret = lookup("MPESA_CONSUMER_SECRET");
        builder.shortcode = lookup("MPESA_SHORTCODE").or_else(|| lookup("SHORT_CODE"));
        builder.business_shortcode = lookup("MPESA_BUSINESS_SHORTCODE");
        builder.passkey = lookup("MPESA_PASSKEY");
        builder.callback_url = lookup("MPESA_CALLBACK_URL");
        builder.base_url = lookup("MPESA_BASE_URL").filter(|v| !v.trim().is_empty());
        if let Some(env) = lookup("MPESA_ENVIRONMENT") {
            builder.environment = env.parse()?;
        }
        if let Some(kind) = lookup("MPESA_ACCOUNT_TYPE") {
            builder.account_kind = kind.parse()?;
        }
        if let Some(secs) = lookup("MPESA_REQUEST_TIMEOUT") {
            builder.timeout = Some(parse_seconds("MPESA_REQUEST_TIMEOUT", &secs)?);
        }
        if let Some(delay) = lookup("MPESA_RETRY_DELAY") {
            builder.retry.delay = parse_seconds("MPESA_RETRY_DELAY", &delay)?;
        }
        if let Some(attempts) = lookup("MPESA_MAX_RETRIES") {
            builder.retry.max_attempts =
                attempts
                    .trim()
                    .parse()
                    .map_err(|e: std::num::ParseIntError| ConfigError::Invalid {
                        field: "MPESA_MAX_RETRIES",
                        reason: e.to_string(),
                    })?;
        }
        builder.build()
    }

    pub fn consumer_key(&self) -> &str {
        &self.consumer_key
    }

    pub fn consumer_secret(&self) -> &str {
        &self.consumer_secret
    }

    /// Till number (Till) or paybill number (Paybill).
    pub fn shortcode(&self) -> &str {
        &self.shortcode
    }

    /// Number the password is derived from. Falls back to the shortcode.
    pub fn business_shortcode(&self) -> &str {
        &self.business_shortcode
    }

    pub fn passkey(&self) -> &str {
        &self.passkey
    }

    pub fn callback_url(&self) -> &Url {
        &self.callback_url
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub fn account_kind(&self) -> AccountKind {
        self.account_kind
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn retry(&self) -> RetryPolicy {
        self.retry
    }

    /// Gateway base url without trailing slash.
    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.environment.base_url())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    consumer_key: Option<String>,
    consumer_secret: Option<String>,
    shortcode: Option<String>,
    business_shortcode: Option<String>,
    passkey: Option<String>,
    callback_url: Option<String>,
    environment: Environment,
    account_kind: AccountKind,
    timeout: Option<Duration>,
    retry: RetryPolicy,
    base_url: Option<String>,
}

impl ConfigBuilder {
    pub fn consumer_key(mut self, value: impl Into<String>) -> Self {
        self.consumer_key = Some(value.into());
        self
    }

    pub fn consumer_secret(mut self, value: impl Into<String>) -> Self {
        self.consumer_secret = Some(value.into());
        self
    }

    pub fn shortcode(mut self, value: impl Into<String>) -> Self {
        self.shortcode = Some(value.into());
        self
    }

    pub fn business_shortcode(mut self, value: impl Into<String>) -> Self {
        self.business_shortcode = Some(value.into());
        self
    }

    pub fn passkey(mut self, value: impl Into<String>) -> Self {
        self.passkey = Some(value.into());
        self
    }

    pub fn callback_url(mut self, value: impl Into<String>) -> Self {
        self.callback_url = Some(value.into());
        self
    }

    pub fn environment(mut self, value: Environment) -> Self {
        self.environment = value;
        self
    }

    pub fn account_kind(mut self, value: AccountKind) -> Self {
        self.account_kind = value;
        self
    }

    pub fn timeout(mut self, value: Duration) -> Self {
        self.timeout = Some(value);
        self
    }

    pub fn retry(mut self, value: RetryPolicy) -> Self {
        self.retry = value;
        self
    }

    /// Override the environment base url, e.g. to point at a proxy or a local stub.
    pub fn base_url(mut self, value: impl Into<String>) -> Self {
        self.base_url = Some(value.into());
        self
    }

    pub fn build(self) -> Result<Config, ConfigError> {
        let consumer_key = required("consumer_key", self.consumer_key)?;
        let consumer_secret = required("consumer_secret", self.consumer_secret)?;
        let shortcode = required("shortcode", self.shortcode)?;
        let passkey = required("passkey", self.passkey)?;
        let callback_url = required("callback_url", self.callback_url)?;

        validate_shortcode("shortcode", &shortcode)?;
        let business_shortcode = match self.business_shortcode {
            Some(code) if !code.trim().is_empty() => {
                let code = code.trim().to_string();
                validate_shortcode("business_shortcode", &code)?;
                code
            }
            _ => shortcode.clone(),
        };

        let callback_url = Url::parse(&callback_url)
            .ok()
            .filter(|_| is_http_url(&callback_url))
            .ok_or(ConfigError::InvalidUrl(callback_url))?;

        let timeout = self.timeout.unwrap_or(DEFAULT_TIMEOUT);
        if timeout.is_zero() {
            return Err(ConfigError::Invalid {
                field: "timeout",
                reason: "must be greater than zero".into(),
            });
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "max_attempts",
                reason: "at least one attempt is required".into(),
            });
        }

        let base_url = match self.base_url {
            Some(url) => {
                let url = url.trim().trim_end_matches('/').to_string();
                if !is_http_url(&url) {
                    return Err(ConfigError::InvalidUrl(url));
                }
                Some(url)
            }
            None => None,
        };

        Ok(Config {
            consumer_key,
            consumer_secret,
            shortcode,
            business_shortcode,
            passkey,
            callback_url,
            environment: self.environment,
            account_kind: self.account_kind,
            timeout,
            retry: self.retry,
            base_url,
        })
    }
}

fn required(field: &'static str, value: Option<String>) -> Result<String, ConfigError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(field))
}

fn is_http_url(value: &str) -> bool {
    Url::parse(value).is_ok_and(|url| matches!(url.scheme(), "http" | "https") && url.has_host())
}

fn validate_shortcode(field: &'static str, value: &str) -> Result<(), ConfigError> {
    if (5..=7).contains(&value.len()) && value.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(ConfigError::InvalidShortcode {
            field,
            value: value.to_string(),
        })
    }
}

fn parse_seconds(field: &'static str, value: &str) -> Result<Duration, ConfigError> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .ok_or_else(|| ConfigError::Invalid {
            field,
            reason: format!("{value:?} is not a number of seconds"),
        })
}
