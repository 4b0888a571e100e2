use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use http::{HeaderName, HeaderValue};
use tracing::info;

use crate::cache::token::StoredToken;
use crate::config::settings::StoreSettings;
use crate::error::{StoreError, StoreResult};
use crate::provider::Provider;
use crate::reporting::{ErrorReporter, TracingReporter};
use crate::store::provider_store::{ProviderStore, StoreHandle};

static GLOBAL_STORE: OnceLock<AuthTokenStore> = OnceLock::new();

/// Provider identity: its type plus its name, so two instances of one type
/// configured under different names get separate workers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ProviderKey {
    type_id: TypeId,
    name: String,
}

impl ProviderKey {
    fn of<P: Provider>(provider: &P) -> Self {
        Self {
            type_id: TypeId::of::<P>(),
            name: provider.name().to_owned(),
        }
    }
}

/// Entry point for token consumers.
///
/// Finds or lazily starts the worker of a provider and forwards the call.
/// The first provider instance seen for an identity is the one the worker
/// keeps using.
pub struct AuthTokenStore {
    settings: StoreSettings,
    reporter: Arc<dyn ErrorReporter>,
    registry: Mutex<HashMap<ProviderKey, Arc<dyn StoreHandle>>>,
}

impl Default for AuthTokenStore {
    fn default() -> Self {
        Self::new(StoreSettings::default())
    }
}

impl AuthTokenStore {
    pub fn new(settings: StoreSettings) -> Self {
        Self::with_reporter(settings, Arc::new(TracingReporter))
    }

    pub fn with_reporter(settings: StoreSettings, reporter: Arc<dyn ErrorReporter>) -> Self {
        Self {
            settings,
            reporter,
            registry: Mutex::new(HashMap::new()),
        }
    }

    /// Process-wide store with default settings
    pub fn global() -> &'static AuthTokenStore {
        GLOBAL_STORE.get_or_init(AuthTokenStore::default)
    }

    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    /// Get-or-create of the provider worker, atomic under the registry lock.
    /// A worker that stopped after too many crashes is replaced here.
    pub fn store_for<P: Provider>(&self, provider: &Arc<P>) -> StoreResult<ProviderStore<P>> {
        let key = ProviderKey::of(provider.as_ref());
        let mut registry = self.registry.lock().map_err(|_| {
            StoreError::ProviderStoreUnavailable("provider registry lock poisoned".to_owned())
        })?;

        if let Some(handle) = registry.get(&key) {
            if handle.is_alive() {
                return handle
                    .as_any()
                    .downcast_ref::<ProviderStore<P>>()
                    .cloned()
                    .ok_or_else(|| {
                        StoreError::ProviderStoreUnavailable(format!(
                            "provider '{}' is registered with another type",
                            key.name
                        ))
                    });
            }
            info!("provider store '{}' stopped, starting a new one", key.name);
        }

        let store = ProviderStore::start(provider.clone(), &self.settings, self.reporter.clone())?;
        info!("provider store '{}' registered", key.name);
        registry.insert(key, Arc::new(store.clone()));
        Ok(store)
    }

    /// `request_with_timeout` with the configured default timeout
    pub async fn request<P: Provider>(
        &self,
        provider: &Arc<P>,
        credentials: P::Credentials,
    ) -> StoreResult<StoredToken<P::Credentials>> {
        self.request_with_timeout(provider, credentials, self.settings.default_timeout())
            .await
    }

    pub async fn request_with_timeout<P: Provider>(
        &self,
        provider: &Arc<P>,
        credentials: P::Credentials,
        timeout: Duration,
    ) -> StoreResult<StoredToken<P::Credentials>> {
        self.store_for(provider)?.request(credentials, timeout).await
    }

    pub async fn release<P: Provider>(
        &self,
        provider: &Arc<P>,
        credentials: P::Credentials,
    ) -> StoreResult<()> {
        self.store_for(provider)?.release(credentials).await
    }

    /// Token rendered as the provider's authorization header
    pub async fn authorization_header<P: Provider>(
        &self,
        provider: &Arc<P>,
        credentials: P::Credentials,
    ) -> StoreResult<(HeaderName, HeaderValue)> {
        let token = self.request(provider, credentials).await?;
        provider
            .authorization_header(token.token())
            .map_err(|err| StoreError::acquisition_failed(&err))
    }

    pub async fn cached_tokens<P: Provider>(&self, provider: &Arc<P>) -> StoreResult<usize> {
        self.store_for(provider)?.cached_tokens().await
    }

    /// Number of registered provider workers
    pub fn providers(&self) -> usize {
        self.registry.lock().map(|registry| registry.len()).unwrap_or(0)
    }
}
