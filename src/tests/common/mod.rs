// src/tests/common/mod.rs
pub use axum::Router;
pub use tokio::task::JoinHandle;

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{anyhow, Result};
use serde_json::Value;

use crate::cache::token::StoredToken;
use crate::config::settings::StoreSettings;
use crate::provider::{Provider, REDACTED};

/// Spawn an Axum router on an ephemeral port and return (JoinHandle, SocketAddr)
pub async fn spawn_axum(router: Router) -> (JoinHandle<()>, SocketAddr) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind failed");
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.expect("server failed");
    });
    (handle, addr)
}

pub fn settings_with_min_refresh(min_refresh_delay_ms: u64) -> StoreSettings {
    StoreSettings {
        min_refresh_delay_ms,
        ..StoreSettings::default()
    }
}

/// Provider counting its calls. Credentials look like `user:password`.
pub struct TestProvider {
    pub name: String,
    pub ttl: Option<u64>,
    pub delay: Duration,
    pub grace: Option<Duration>,
    pub with_refresh: bool,
    pub panics: bool,
    pub failing: AtomicBool,
    pub calls: AtomicUsize,
    pub refreshes: AtomicUsize,
}

impl TestProvider {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            ttl: None,
            delay: Duration::ZERO,
            grace: None,
            with_refresh: false,
            panics: false,
            failing: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            refreshes: AtomicUsize::new(0),
        }
    }

    pub fn ttl(mut self, ttl: u64) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn grace(mut self, grace: Duration) -> Self {
        self.grace = Some(grace);
        self
    }

    pub fn with_refresh(mut self) -> Self {
        self.with_refresh = true;
        self
    }

    pub fn panicking(mut self) -> Self {
        self.panics = true;
        self
    }

    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn refreshes(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    fn user(credentials: &str) -> &str {
        credentials.split(':').next().unwrap_or_default()
    }
}

impl Provider for TestProvider {
    type Credentials = String;

    fn name(&self) -> &str {
        &self.name
    }

    async fn request_token(&self, credentials: &String) -> Result<StoredToken<String>> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(self.delay).await;
        if self.panics {
            panic!("provider exploded");
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(anyhow!("bad creds"));
        }
        let token = format!("{}-{}", Self::user(credentials), n);
        Ok(StoredToken::new(&self.name, credentials.clone(), token).with_ttl(self.ttl))
    }

    async fn refresh_token(&self, token: &StoredToken<String>) -> Result<StoredToken<String>> {
        if !self.with_refresh {
            return self.request_token(token.credentials()).await;
        }
        let n = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(self.delay).await;
        if self.failing.load(Ordering::SeqCst) {
            return Err(anyhow!("refresh rejected"));
        }
        Ok(StoredToken::new(&self.name, token.credentials().clone(), format!("refreshed-{}", n))
            .with_ttl(self.ttl))
    }

    fn timeout(&self) -> Option<Duration> {
        self.grace
    }

    fn clean_credentials(&self, credentials: &String) -> BTreeMap<String, Value> {
        BTreeMap::from([
            ("user".to_owned(), Value::from(Self::user(credentials))),
            ("password".to_owned(), Value::from(REDACTED)),
        ])
    }
}

/// Credentials whose hash blows up for the value `boom`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragile(pub String);

impl Hash for Fragile {
    fn hash<H: Hasher>(&self, state: &mut H) {
        if self.0 == "boom" {
            panic!("unhashable credentials");
        }
        self.0.hash(state);
    }
}

pub struct FragileProvider {
    pub calls: AtomicUsize,
}

impl FragileProvider {
    pub fn new() -> Self {
        Self { calls: AtomicUsize::new(0) }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Provider for FragileProvider {
    type Credentials = Fragile;

    fn name(&self) -> &str {
        "fragile"
    }

    async fn request_token(&self, credentials: &Fragile) -> Result<StoredToken<Fragile>> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(StoredToken::new("fragile", credentials.clone(), format!("fragile-{}", n)))
    }

    fn clean_credentials(&self, credentials: &Fragile) -> BTreeMap<String, Value> {
        BTreeMap::from([("value".to_owned(), Value::from(credentials.0.clone()))])
    }
}
