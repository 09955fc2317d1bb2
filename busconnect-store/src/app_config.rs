use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub redis: Option<RedisConfig>,
    #[serde(default)]
    pub kafka: Option<KafkaConfig>,
    pub auth: AuthConfig,
    pub payments: PaymentsConfig,
    #[serde(default)]
    pub business_rules: BusinessRules,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    /// Travel-safe insurance, minor units
    #[serde(default = "default_insurance_fee")]
    pub insurance_fee: i64,
    /// Luggage tagging fee, minor units
    #[serde(default = "default_luggage_fee")]
    pub luggage_fee: i64,
    #[serde(default = "default_max_free_bags")]
    pub max_free_bags: u32,
    /// Unset keeps provisional bookings forever.
    #[serde(default)]
    pub provisional_ttl_seconds: Option<u64>,
    #[serde(default = "default_sweep_interval")]
    pub expiry_sweep_interval_seconds: u64,
    #[serde(default = "default_outbox_poll")]
    pub outbox_poll_interval_ms: u64,
    #[serde(default = "default_feed_capacity")]
    pub feed_capacity: usize,
}

fn default_insurance_fee() -> i64 { 3000 }
fn default_luggage_fee() -> i64 { 500 }
fn default_max_free_bags() -> u32 { 3 }
fn default_sweep_interval() -> u64 { 60 }
fn default_outbox_poll() -> u64 { 1000 }
fn default_feed_capacity() -> usize { 100 }

impl Default for BusinessRules {
    fn default() -> Self {
        Self {
            insurance_fee: default_insurance_fee(),
            luggage_fee: default_luggage_fee(),
            max_free_bags: default_max_free_bags(),
            provisional_ttl_seconds: None,
            expiry_sweep_interval_seconds: default_sweep_interval(),
            outbox_poll_interval_ms: default_outbox_poll(),
            feed_capacity: default_feed_capacity(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentProvider {
    Paystack,
    Mock,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PaymentsConfig {
    #[serde(default = "default_provider")]
    pub provider: PaymentProvider,
    /// Also the HMAC key for webhook signatures.
    pub secret_key: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    pub callback_base_url: String,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_verify_timeout")]
    pub verify_timeout_ms: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

fn default_provider() -> PaymentProvider { PaymentProvider::Paystack }
fn default_base_url() -> String { "https://api.paystack.co".to_string() }
fn default_currency() -> String { "GHS".to_string() }
fn default_verify_timeout() -> u64 { 10_000 }
fn default_request_timeout() -> u64 { 15_000 }

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 { 5 }

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: i64,
}

fn default_rate_limit() -> i64 { 100 }

#[derive(Debug, Deserialize, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Optional per-environment overrides
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. `BUSCONNECT__PAYMENTS__SECRET_KEY=sk_live_...`
            .add_source(config::Environment::with_prefix("BUSCONNECT").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
