//! Provider module
//!
//! A provider knows how to obtain a credential for one external API.
//! The store never interprets credentials, it only uses them as cache keys
//! and hands them back to the provider.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::time::Duration;

use anyhow::{anyhow, Result};
use http::header::AUTHORIZATION;
use http::{HeaderName, HeaderValue};
use serde_json::Value;

use crate::cache::token::StoredToken;

pub const REDACTED: &str = "[REDACTED]";

pub trait Provider: Send + Sync + 'static {
    /// Opaque input identifying which account to authenticate as.
    /// Structurally equal values share one cache slot.
    type Credentials: Clone + Eq + Hash + Debug + Send + Sync + 'static;

    fn name(&self) -> &str;

    fn request_token(
        &self,
        credentials: &Self::Credentials,
    ) -> impl Future<Output = Result<StoredToken<Self::Credentials>>> + Send;

    /// Providers without a dedicated refresh flow fetch a brand new token.
    fn refresh_token(
        &self,
        token: &StoredToken<Self::Credentials>,
    ) -> impl Future<Output = Result<StoredToken<Self::Credentials>>> + Send {
        self.request_token(token.credentials())
    }

    /// Grace period added to the caller timeout
    fn timeout(&self) -> Option<Duration> {
        None
    }

    fn authorization_header(&self, token: &str) -> Result<(HeaderName, HeaderValue)> {
        let value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|err| anyhow!("token is not a valid header value: {}", err))?;
        Ok((AUTHORIZATION, value))
    }

    /// Credentials safe for logs and error reports. Must strip every secret.
    fn clean_credentials(&self, credentials: &Self::Credentials) -> BTreeMap<String, Value>;
}

/// Mask values whose key looks like a secret.
pub fn redact_map<'a, I>(entries: I) -> BTreeMap<String, Value>
where
    I: IntoIterator<Item = (&'a String, &'a String)>,
{
    entries
        .into_iter()
        .map(|(key, value)| {
            let lowered = key.to_lowercase();
            let secret = ["secret", "password", "token", "key"]
                .iter()
                .any(|marker| lowered.contains(marker));
            let value = if secret { REDACTED.to_owned() } else { value.to_owned() };
            (key.to_owned(), Value::String(value))
        })
        .collect()
}
