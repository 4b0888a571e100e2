use http::Method;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};

use crate::config::settings::SettingsConfig;

/// ================================
/// Full service configuration
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub settings: SettingsConfig,
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

/// ================================
/// Providers
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    pub request: RequestConfig,
    /// merged into the request form/body, also the cache key
    #[serde(default)]
    pub credentials: BTreeMap<String, GenericSourceValue>,
    pub parse: ParseConfig,
    /// extra grace period for this provider
    pub timeout_ms: Option<u64>,
}

/// HTTP request details
#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "lowercase")]
pub struct RequestConfig {
    pub url: String,
    #[serde(with = "http_serde::method", default = "default_method")]
    pub method: Method, // GET, POST
    pub headers: Option<HashMap<String, GenericSourceValue>>,
    /// sent as application/x-www-form-urlencoded
    pub form: Option<BTreeMap<String, GenericSourceValue>>,
    /// sent as JSON
    pub body: Option<BTreeMap<String, GenericSourceValue>>,
}

/// Header, form and credential value sources
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum GenericSourceValue {
    Literal { value: String },
    FromEnv { from_env: String },
    FromFile { path: String },
}

/// ================================
/// Parsing - token, ttl and extras
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct ParseConfig {
    /// JSON pointer to the token, e.g. `/access_token`
    pub token_pointer: String,
    /// JSON pointer to the lifetime in seconds, e.g. `/expires_in`
    pub ttl_pointer: Option<String>,
    /// extra name -> JSON pointer, e.g. `token_type: /token_type`
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

fn default_method() -> Method {
    Method::POST
}
