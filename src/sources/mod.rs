use std::collections::HashMap;
use std::sync::Arc;

use reqwest::Client;

use crate::config::providers::ProviderConfig;

pub mod http;
pub mod values;

pub use http::{HttpCredentials, HttpProvider};

/// Build one HTTP provider per configured entry, sharing a client.
pub fn build_providers(
    providers: &HashMap<String, ProviderConfig>,
    client: &Client,
) -> HashMap<String, Arc<HttpProvider>> {
    providers
        .iter()
        .map(|(name, cfg)| {
            let provider = HttpProvider::new(name.to_owned(), cfg.clone(), client.clone());
            (name.to_owned(), Arc::new(provider))
        })
        .collect()
}
