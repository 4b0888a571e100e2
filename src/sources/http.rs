use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::cache::token::StoredToken;
use crate::config::providers::{ParseConfig, ProviderConfig};
use crate::provider::{redact_map, Provider};
use crate::sources::values::{prepare_generic_source_value, prepare_generic_source_values};

pub type HttpCredentials = BTreeMap<String, String>;

/// Provider calling a token endpoint described in the config file.
#[derive(Debug, Clone)]
pub struct HttpProvider {
    pub name: String,
    config: Arc<ProviderConfig>,
    client: Client,
}

impl HttpProvider {
    pub fn new(name: String, config: ProviderConfig, client: Client) -> Self {
        Self {
            name,
            config: Arc::new(config),
            client,
        }
    }

    /// Configured credentials with env and file values resolved
    pub fn credentials(&self) -> Result<HttpCredentials> {
        prepare_generic_source_values(&self.config.credentials)
            .with_context(|| format!("provider '{}' credentials", self.name))
    }
}

impl Provider for HttpProvider {
    type Credentials = HttpCredentials;

    fn name(&self) -> &str {
        &self.name
    }

    async fn request_token(&self, credentials: &HttpCredentials) -> Result<StoredToken<HttpCredentials>> {
        let req_cfg = &self.config.request;
        let mut request = self.client.request(req_cfg.method.clone(), &req_cfg.url);

        // Build headers dynamically
        if let Some(headers) = &req_cfg.headers {
            for (key, v) in headers {
                let value = prepare_generic_source_value(v)?;
                request = request.header(key, value)
            }
        }

        // Credentials travel with the form, the JSON body or the query
        if let Some(form) = &req_cfg.form {
            let mut fields = prepare_generic_source_values(form)?;
            fields.extend(credentials.clone());
            request = request.form(&fields);
        } else if let Some(body) = &req_cfg.body {
            let mut fields = prepare_generic_source_values(body)?;
            fields.extend(credentials.clone());
            request = request.json(&fields);
        } else if !credentials.is_empty() {
            request = request.query(credentials);
        }

        debug!("provider '{}': {} {}", self.name, req_cfg.method, req_cfg.url);
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(anyhow!("token endpoint responded {}", response.status()));
        }
        let body: Value = response
            .json()
            .await
            .context("token endpoint returned invalid JSON")?;

        parse_token_response(&self.name, credentials.clone(), &self.config.parse, &body)
    }

    fn timeout(&self) -> Option<Duration> {
        self.config.timeout_ms.map(Duration::from_millis)
    }

    fn clean_credentials(&self, credentials: &HttpCredentials) -> BTreeMap<String, Value> {
        redact_map(credentials)
    }
}

/// Extract token, ttl and extras from a JSON token response.
pub fn parse_token_response<C>(
    provider: &str,
    credentials: C,
    parse: &ParseConfig,
    body: &Value,
) -> Result<StoredToken<C>> {
    let token = body
        .pointer(&parse.token_pointer)
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("token not found at '{}'", parse.token_pointer))?;

    let ttl = match &parse.ttl_pointer {
        Some(pointer) => Some(parse_ttl(body.pointer(pointer)).ok_or_else(|| {
            anyhow!("ttl at '{}' is missing or not a non-negative integer", pointer)
        })?),
        None => None,
    };

    let mut stored = StoredToken::new(provider, credentials, token).with_ttl(ttl);
    for (key, pointer) in &parse.extra {
        if let Some(value) = body.pointer(pointer) {
            stored = stored.with_extra(key.to_owned(), value.clone());
        }
    }
    Ok(stored)
}

/// Seconds as a JSON number or a numeric string
fn parse_ttl(value: Option<&Value>) -> Option<u64> {
    match value? {
        Value::Number(number) => number.as_u64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}
