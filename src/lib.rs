//! # Auth Token Store
//!
//! Caches authentication tokens per provider and coordinates their
//! acquisition and refresh. Each provider gets one supervised worker
//! that deduplicates concurrent requests for the same credentials and
//! refreshes tokens shortly before they expire.
//!
//! Modules:
//! - `store`: registry, per-provider workers and supervision
//! - `provider`: the `Provider` trait implemented by token sources
//! - `cache`: the cached `StoredToken`
//! - `sources`: config-driven HTTP providers
//! - `middleware`: outbound client retrying once on 401
//! - `server`: token and metrics endpoints for the daemon

pub mod cache;
pub mod config;
pub mod error;
pub mod middleware;
pub mod observability;
pub mod provider;
pub mod reporting;
pub mod server;
pub mod sources;
pub mod store;
pub mod tests;
pub mod utils;

pub use crate::cache::StoredToken;
pub use crate::error::{StoreError, StoreResult};
pub use crate::provider::Provider;
pub use crate::store::{AuthTokenStore, ProviderStore};
