//! Token store: one worker per provider behind a shared facade.

pub mod auth_token_store;
pub mod provider_store;
pub mod supervisor;

pub use auth_token_store::AuthTokenStore;
pub use provider_store::ProviderStore;
pub use supervisor::RestartPolicy;
