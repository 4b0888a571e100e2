use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::Value;

/// Credential produced by a provider for one credentials value.
///
/// The secret is fixed at construction. A refresh yields a new `StoredToken`
/// with its own timestamp instead of mutating this one.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredToken<C> {
    provider: String,
    credentials: C,
    token: String,
    ttl: Option<u64>,
    timestamp: Option<DateTime<Utc>>,
    extra: BTreeMap<String, Value>,
}

impl<C> StoredToken<C> {
    /// New token fetched right now, without expiration.
    pub fn new(provider: impl Into<String>, credentials: C, token: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            credentials,
            token: token.into(),
            ttl: None,
            timestamp: Some(Utc::now()),
            extra: BTreeMap::new(),
        }
    }

    /// Time to live in seconds, counted from the timestamp
    pub fn with_ttl(mut self, ttl: Option<u64>) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_timestamp(mut self, timestamp: Option<DateTime<Utc>>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn credentials(&self) -> &C {
        &self.credentials
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn ttl(&self) -> Option<u64> {
        self.ttl
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }

    pub fn extra(&self) -> &BTreeMap<String, Value> {
        &self.extra
    }

    /// Check validity against the wall clock
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    /// Tokens without ttl never expire on their own.
    /// A ttl without a timestamp cannot be trusted.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        match (self.ttl, self.timestamp) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(ttl), Some(ts)) => (now - ts).num_seconds() <= i64::try_from(ttl).unwrap_or(i64::MAX),
        }
    }

    /// Seconds elapsed since the token was fetched, never negative.
    pub fn elapsed_seconds_at(&self, now: DateTime<Utc>) -> i64 {
        self.timestamp
            .map(|ts| (now - ts).num_seconds().max(0))
            .unwrap_or(0)
    }
}
