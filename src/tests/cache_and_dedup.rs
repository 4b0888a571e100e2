#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use crate::error::StoreError;
    use crate::store::AuthTokenStore;
    use crate::tests::common::TestProvider;

    #[tokio::test]
    async fn valid_token_is_served_from_cache() {
        let store = AuthTokenStore::default();
        let provider = Arc::new(TestProvider::new("cache"));

        let first = store.request(&provider, "alice:pw".to_owned()).await.unwrap();
        let second = store.request(&provider, "alice:pw".to_owned()).await.unwrap();

        assert_eq!(first.token(), "alice-1");
        assert_eq!(second.token(), "alice-1");
        assert_eq!(first.timestamp(), second.timestamp());
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_requests_share_one_acquisition() {
        let store = Arc::new(AuthTokenStore::default());
        let provider = Arc::new(TestProvider::new("dedup").delay(Duration::from_millis(100)));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let store = store.clone();
            let provider = provider.clone();
            handles.push(tokio::spawn(async move {
                store.request(&provider, "alice:pw".to_owned()).await
            }));
        }

        for handle in handles {
            let token = handle.await.unwrap().unwrap();
            assert_eq!(token.token(), "alice-1");
        }
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_requests_share_one_error() {
        let store = Arc::new(AuthTokenStore::default());
        let provider = Arc::new(TestProvider::new("dedup-error").delay(Duration::from_millis(100)));
        provider.fail(true);

        let mut handles = Vec::new();
        for _ in 0..5 {
            let store = store.clone();
            let provider = provider.clone();
            handles.push(tokio::spawn(async move {
                store.request(&provider, "alice:pw".to_owned()).await
            }));
        }

        for handle in handles {
            let err = handle.await.unwrap().unwrap_err();
            assert_eq!(err, StoreError::AcquisitionFailed("bad creds".to_owned()));
        }
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn release_forces_a_new_acquisition() {
        let store = AuthTokenStore::default();
        let provider = Arc::new(TestProvider::new("release").ttl(3600));

        // releasing nothing is fine
        store.release(&provider, "alice:pw".to_owned()).await.unwrap();

        let first = store.request(&provider, "alice:pw".to_owned()).await.unwrap();
        store.release(&provider, "alice:pw".to_owned()).await.unwrap();
        store.release(&provider, "alice:pw".to_owned()).await.unwrap();
        let second = store.request(&provider, "alice:pw".to_owned()).await.unwrap();

        assert_eq!(first.token(), "alice-1");
        assert_eq!(second.token(), "alice-2");
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn distinct_credentials_are_cached_independently() {
        let store = AuthTokenStore::default();
        let provider = Arc::new(TestProvider::new("independent"));

        let alice = store.request(&provider, "alice:pw".to_owned()).await.unwrap();
        let bob = store.request(&provider, "bob:pw".to_owned()).await.unwrap();
        assert_ne!(alice.token(), bob.token());
        assert_eq!(store.cached_tokens(&provider).await.unwrap(), 2);

        store.release(&provider, "alice:pw".to_owned()).await.unwrap();
        assert_eq!(store.cached_tokens(&provider).await.unwrap(), 1);

        let bob_again = store.request(&provider, "bob:pw".to_owned()).await.unwrap();
        assert_eq!(bob_again.token(), bob.token());
        assert_eq!(provider.calls(), 2);

        store.request(&provider, "alice:pw".to_owned()).await.unwrap();
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn provider_error_is_returned_and_not_cached() {
        let store = AuthTokenStore::default();
        let provider = Arc::new(TestProvider::new("failing"));
        provider.fail(true);

        let err = store.request(&provider, "alice:pw".to_owned()).await.unwrap_err();
        assert_eq!(err, StoreError::AcquisitionFailed("bad creds".to_owned()));
        assert_eq!(store.cached_tokens(&provider).await.unwrap(), 0);

        store.request(&provider, "alice:pw".to_owned()).await.unwrap_err();
        assert_eq!(provider.calls(), 2);

        provider.fail(false);
        let token = store.request(&provider, "alice:pw".to_owned()).await.unwrap();
        assert_eq!(token.token(), "alice-3");
    }

    #[tokio::test]
    async fn token_without_ttl_stays_cached() {
        let store = AuthTokenStore::new(crate::tests::common::settings_with_min_refresh(100));
        let provider = Arc::new(TestProvider::new("forever"));

        store.request(&provider, "alice:pw".to_owned()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(400)).await;
        let token = store.request(&provider, "alice:pw".to_owned()).await.unwrap();

        assert_eq!(token.token(), "alice-1");
        assert_eq!(token.ttl(), None);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn panicking_provider_is_an_unknown_result() {
        let store = AuthTokenStore::default();
        let provider = Arc::new(TestProvider::new("panicking").panicking());

        let err = store.request(&provider, "alice:pw".to_owned()).await.unwrap_err();
        assert!(matches!(err, StoreError::UnknownAcquisitionResult(ref msg) if msg.contains("provider exploded")));
        assert_eq!(store.cached_tokens(&provider).await.unwrap(), 0);

        // the worker survives provider panics
        store.request(&provider, "alice:pw".to_owned()).await.unwrap_err();
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn authorization_header_uses_cached_token() {
        let store = AuthTokenStore::default();
        let provider = Arc::new(TestProvider::new("header"));

        let (name, value) = store
            .authorization_header(&provider, "alice:pw".to_owned())
            .await
            .unwrap();
        assert_eq!(name, http::header::AUTHORIZATION);
        assert_eq!(value, "Bearer alice-1");
    }
}
