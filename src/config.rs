//! Middleware configuration
//!
//! [`Settings`] holds the plain option values and can be loaded from files and
//! `IRONLEAP__*` environment variables. [`Options`] is the validated form the
//! pipeline runs on, carrying the host hooks alongside the typed values.

use crate::event::hooks::{
    GetMetadataFn, Hooks, IdentifyCompanyFn, MaskContentFn, SkipFn,
};
use ::config::{Config, Environment, File};
use nutype::nutype;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_MAX_BATCH_SIZE: usize = 25;
pub const DEFAULT_MAX_SEND_INTERVAL_MS: u64 = 2000;
pub const DEFAULT_MAX_BODY_SIZE: usize = 100_000;
pub const DEFAULT_DELIVERY_DELAY_MS: u64 = 10;
pub const DEFAULT_RECOVERY_TIMEOUT_MS: u64 = 1000;
pub const DEFAULT_DELIVERY_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_MAX_CONCURRENT_DELIVERIES: usize = 4;

/// Application key sent with every batch
#[nutype(
    validate(predicate = |key: &str| !key.trim().is_empty()),
    derive(Clone, Debug, Display, Deserialize, Serialize, TryFrom, AsRef, PartialEq, Eq),
)]
pub struct AppKey(String);

/// Destination URL for event batches
#[nutype(
    validate(predicate = |url: &str| url.starts_with("http://") || url.starts_with("https://")),
    derive(Clone, Debug, Display, Deserialize, Serialize, TryFrom, AsRef, PartialEq, Eq),
)]
pub struct CollectorUrl(String);

/// Maximum number of captured bytes kept for one side of an exchange
#[nutype(
    validate(predicate = |size: &usize| *size > 0),
    derive(Clone, Copy, Debug, Display, Deserialize, Serialize, TryFrom, AsRef, PartialEq, Eq),
)]
pub struct MaxBodySize(usize);

/// Number of events that forces an immediate flush
#[nutype(
    validate(predicate = |count: &usize| *count > 0),
    derive(Clone, Copy, Debug, Display, Deserialize, Serialize, TryFrom, AsRef, PartialEq, Eq),
)]
pub struct MaxBatchSize(usize);

/// Longest time, in milliseconds, an event waits in a batch
#[nutype(
    validate(predicate = |millis: &u64| *millis > 0),
    derive(Clone, Copy, Debug, Display, Deserialize, Serialize, TryFrom, AsRef, PartialEq, Eq),
)]
pub struct SendInterval(u64);

impl SendInterval {
    pub fn as_duration(&self) -> Duration {
        Duration::from_millis(self.into_inner())
    }
}

/// Option validation failures. All of them are fatal at setup.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("An app key is required")]
    MissingAppKey,

    #[error("A collector URL is required")]
    MissingCollectorUrl,

    #[error("Invalid collector URL '{0}': expected an http:// or https:// URL")]
    InvalidCollectorUrl(String),

    #[error("max_batch_size must be a number greater than 0")]
    InvalidBatchSize,

    #[error("max_send_interval_ms must be a positive number of milliseconds")]
    InvalidSendInterval,

    #[error("request_max_body_size must be a number greater than 0")]
    InvalidRequestMaxBodySize,

    #[error("response_max_body_size must be a number greater than 0")]
    InvalidResponseMaxBodySize,

    #[error("max_concurrent_deliveries must be a number greater than 0")]
    InvalidConcurrency,

    #[error("Failed to load settings: {0}")]
    Load(#[from] ::config::ConfigError),
}

/// Plain option values, as read from configuration sources
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub app_key: String,
    #[serde(default)]
    pub ironleap_url: Option<String>,
    pub log_body: bool,
    pub max_batch_size: usize,
    pub max_send_interval_ms: u64,
    pub request_max_body_size: usize,
    pub response_max_body_size: usize,
    #[serde(default)]
    pub request_mask_headers: Vec<String>,
    #[serde(default)]
    pub response_mask_headers: Vec<String>,
    pub debug: bool,
    pub delivery_delay_ms: u64,
    pub recovery_timeout_ms: u64,
    pub delivery_timeout_ms: u64,
    pub max_concurrent_deliveries: usize,
}

impl Settings {
    /// Settings with every default applied
    pub fn new(app_key: impl Into<String>, ironleap_url: impl Into<String>) -> Self {
        Self {
            app_key: app_key.into(),
            ironleap_url: Some(ironleap_url.into()),
            log_body: true,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            max_send_interval_ms: DEFAULT_MAX_SEND_INTERVAL_MS,
            request_max_body_size: DEFAULT_MAX_BODY_SIZE,
            response_max_body_size: DEFAULT_MAX_BODY_SIZE,
            request_mask_headers: Vec::new(),
            response_mask_headers: Vec::new(),
            debug: false,
            delivery_delay_ms: DEFAULT_DELIVERY_DELAY_MS,
            recovery_timeout_ms: DEFAULT_RECOVERY_TIMEOUT_MS,
            delivery_timeout_ms: DEFAULT_DELIVERY_TIMEOUT_MS,
            max_concurrent_deliveries: DEFAULT_MAX_CONCURRENT_DELIVERIES,
        }
    }

    /// Load settings from defaults, `config/ironleap.*` and `IRONLEAP__*` variables
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .set_default("app_key", "")?
            .set_default("log_body", true)?
            .set_default("max_batch_size", DEFAULT_MAX_BATCH_SIZE as u64)?
            .set_default("max_send_interval_ms", DEFAULT_MAX_SEND_INTERVAL_MS)?
            .set_default("request_max_body_size", DEFAULT_MAX_BODY_SIZE as u64)?
            .set_default("response_max_body_size", DEFAULT_MAX_BODY_SIZE as u64)?
            .set_default("request_mask_headers", Vec::<String>::new())?
            .set_default("response_mask_headers", Vec::<String>::new())?
            .set_default("debug", false)?
            .set_default("delivery_delay_ms", DEFAULT_DELIVERY_DELAY_MS)?
            .set_default("recovery_timeout_ms", DEFAULT_RECOVERY_TIMEOUT_MS)?
            .set_default("delivery_timeout_ms", DEFAULT_DELIVERY_TIMEOUT_MS)?
            .set_default(
                "max_concurrent_deliveries",
                DEFAULT_MAX_CONCURRENT_DELIVERIES as u64,
            )?
            .add_source(File::with_name("config/ironleap").required(false))
            .add_source(
                Environment::with_prefix("IRONLEAP")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("request_mask_headers")
                    .with_list_parse_key("response_mask_headers"),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }
}

/// Validated options plus host hooks
#[derive(Clone, Debug)]
pub struct Options {
    pub app_key: AppKey,
    pub collector_url: CollectorUrl,
    pub log_body: bool,
    pub max_batch_size: MaxBatchSize,
    pub max_send_interval: SendInterval,
    pub request_max_body_size: MaxBodySize,
    pub response_max_body_size: MaxBodySize,
    pub request_mask_headers: Vec<String>,
    pub response_mask_headers: Vec<String>,
    pub debug: bool,
    pub delivery_delay: Duration,
    pub recovery_timeout: Duration,
    pub delivery_timeout: Duration,
    pub max_concurrent_deliveries: usize,
    pub hooks: Hooks,
}

impl Options {
    /// Validate settings. Hooks start at their defaults.
    pub fn new(settings: Settings) -> Result<Self, ConfigError> {
        let app_key = AppKey::try_new(settings.app_key).map_err(|_| ConfigError::MissingAppKey)?;
        let url = settings
            .ironleap_url
            .ok_or(ConfigError::MissingCollectorUrl)?;
        let collector_url = CollectorUrl::try_new(url.clone())
            .map_err(|_| ConfigError::InvalidCollectorUrl(url))?;
        let max_batch_size = MaxBatchSize::try_new(settings.max_batch_size)
            .map_err(|_| ConfigError::InvalidBatchSize)?;
        let max_send_interval = SendInterval::try_new(settings.max_send_interval_ms)
            .map_err(|_| ConfigError::InvalidSendInterval)?;
        let request_max_body_size = MaxBodySize::try_new(settings.request_max_body_size)
            .map_err(|_| ConfigError::InvalidRequestMaxBodySize)?;
        let response_max_body_size = MaxBodySize::try_new(settings.response_max_body_size)
            .map_err(|_| ConfigError::InvalidResponseMaxBodySize)?;
        if settings.max_concurrent_deliveries == 0 {
            return Err(ConfigError::InvalidConcurrency);
        }

        Ok(Self {
            app_key,
            collector_url,
            log_body: settings.log_body,
            max_batch_size,
            max_send_interval,
            request_max_body_size,
            response_max_body_size,
            request_mask_headers: settings.request_mask_headers,
            response_mask_headers: settings.response_mask_headers,
            debug: settings.debug,
            delivery_delay: Duration::from_millis(settings.delivery_delay_ms),
            recovery_timeout: Duration::from_millis(settings.recovery_timeout_ms),
            delivery_timeout: Duration::from_millis(settings.delivery_timeout_ms),
            max_concurrent_deliveries: settings.max_concurrent_deliveries,
            hooks: Hooks::default(),
        })
    }

    pub fn with_identify_company(mut self, hook: IdentifyCompanyFn) -> Self {
        self.hooks.identify_company = hook;
        self
    }

    pub fn with_get_metadata(mut self, hook: GetMetadataFn) -> Self {
        self.hooks.get_metadata = hook;
        self
    }

    pub fn with_mask_content(mut self, hook: MaskContentFn) -> Self {
        self.hooks.mask_content = hook;
        self
    }

    pub fn with_skip(mut self, hook: SkipFn) -> Self {
        self.hooks.skip = hook;
        self
    }

    pub fn request_limit(&self) -> usize {
        self.request_max_body_size.into_inner()
    }

    pub fn response_limit(&self) -> usize {
        self.response_max_body_size.into_inner()
    }
}
