//! Outbound HTTP client that authenticates requests through the token store.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use reqwest::{Client, Request, Response, StatusCode};
use tracing::{info, warn};

use crate::provider::Provider;
use crate::store::AuthTokenStore;

/// Sends requests with the provider's authorization header.
///
/// A 401 answer releases the cached token and the request is sent once more
/// with a freshly acquired one. Requests with a streaming body are not retried.
pub struct AuthorizedClient<P: Provider> {
    client: Client,
    store: Arc<AuthTokenStore>,
    provider: Arc<P>,
    credentials: P::Credentials,
}

impl<P: Provider> AuthorizedClient<P> {
    pub fn new(client: Client, store: Arc<AuthTokenStore>, provider: Arc<P>, credentials: P::Credentials) -> Self {
        Self {
            client,
            store,
            provider,
            credentials,
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub async fn execute(&self, request: Request) -> Result<Response> {
        let retry = request.try_clone();
        let response = self.send_authorized(request).await?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        info!("provider '{}': 401 received, releasing token", self.provider.name());
        self.store
            .release(&self.provider, self.credentials.clone())
            .await?;

        match retry {
            Some(request) => self.send_authorized(request).await,
            None => {
                warn!("provider '{}': request body cannot be replayed, not retrying", self.provider.name());
                Ok(response)
            }
        }
    }

    async fn send_authorized(&self, mut request: Request) -> Result<Response> {
        let (name, value) = self
            .store
            .authorization_header(&self.provider, self.credentials.clone())
            .await
            .map_err(|err| anyhow!("provider '{}': {}", self.provider.name(), err))?;
        request.headers_mut().insert(name, value);
        Ok(self.client.execute(request).await?)
    }
}
