pub mod tmdb;

pub use tmdb::TmdbProvider;

use crate::cache::Cache;
use crate::constants::{NS_IDENTITY, NS_METADATA};
use crate::error::{EnrichError, Result};
use crate::types::{ProviderRef, TitleMetadata};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// The metadata provider's two lookup surfaces, behind a seam so the
/// pipeline can be exercised against stubs.
#[async_trait]
pub trait TitleProvider: Send + Sync {
    /// "Find by external id": maps an IMDb id to the provider's own id and
    /// content type. `None` when the provider knows no such title.
    async fn find_by_imdb_id(&self, imdb_id: &str) -> Result<Option<ProviderRef>>;

    /// Full detail lookup for a resolved title.
    async fn title_details(&self, provider_ref: &ProviderRef) -> Result<TitleMetadata>;
}

/// Resolves external ids to provider refs, with caching. Only found matches
/// are cached; a `NotFound` stays uncached so a later run can try again.
pub struct IdentityResolver {
    provider: Arc<dyn TitleProvider>,
    cache: Cache,
}

impl IdentityResolver {
    pub fn new(provider: Arc<dyn TitleProvider>, cache: Cache) -> Self {
        Self { provider, cache }
    }

    #[instrument(skip(self))]
    pub async fn resolve(&self, imdb_id: &str) -> Result<ProviderRef> {
        if let Some(hit) = self.cache.get_as::<ProviderRef>(NS_IDENTITY, imdb_id) {
            return Ok(hit);
        }
        match self.provider.find_by_imdb_id(imdb_id).await? {
            Some(provider_ref) => {
                self.cache.put(NS_IDENTITY, imdb_id, &provider_ref);
                Ok(provider_ref)
            }
            None => Err(EnrichError::NotFound(imdb_id.to_string())),
        }
    }
}

/// Fetches title metadata, with caching per `(content_type, provider id)` and
/// a fixed post-call delay to respect the provider's own rate limits. That
/// delay is local to this component; the geocoding queue is a separate
/// discipline entirely.
pub struct MetadataFetcher {
    provider: Arc<dyn TitleProvider>,
    cache: Cache,
    delay: Duration,
}

impl MetadataFetcher {
    pub fn new(provider: Arc<dyn TitleProvider>, cache: Cache, delay: Duration) -> Self {
        Self {
            provider,
            cache,
            delay,
        }
    }

    #[instrument(skip(self))]
    pub async fn fetch(&self, provider_ref: &ProviderRef) -> Result<TitleMetadata> {
        let key = format!("{}:{}", provider_ref.content_type, provider_ref.tmdb_id);
        if let Some(hit) = self.cache.get_as::<TitleMetadata>(NS_METADATA, &key) {
            return Ok(hit);
        }
        let metadata = self.provider.title_details(provider_ref).await?;
        tokio::time::sleep(self.delay).await;
        self.cache.put(NS_METADATA, &key, &metadata);
        Ok(metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::FsCacheStore;
    use crate::types::ContentType;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    struct CountingProvider {
        finds: AtomicUsize,
        details: AtomicUsize,
        known: bool,
    }

    impl CountingProvider {
        fn new(known: bool) -> Self {
            Self {
                finds: AtomicUsize::new(0),
                details: AtomicUsize::new(0),
                known,
            }
        }
    }

    #[async_trait]
    impl TitleProvider for CountingProvider {
        async fn find_by_imdb_id(&self, _imdb_id: &str) -> Result<Option<ProviderRef>> {
            self.finds.fetch_add(1, Ordering::SeqCst);
            Ok(self.known.then(|| ProviderRef {
                tmdb_id: 603,
                content_type: ContentType::Movie,
            }))
        }

        async fn title_details(&self, _provider_ref: &ProviderRef) -> Result<TitleMetadata> {
            self.details.fetch_add(1, Ordering::SeqCst);
            Ok(TitleMetadata {
                title: "The Matrix".to_string(),
                year: 1999,
                genres: vec!["Action".to_string()],
                poster: None,
                trailer: None,
                rating: Some(8.2),
            })
        }
    }

    fn cache_in(dir: &std::path::Path) -> Cache {
        Cache::new(Arc::new(FsCacheStore::new(dir)))
    }

    #[tokio::test]
    async fn test_identity_resolution_is_cached() {
        let dir = tempdir().unwrap();
        let provider = Arc::new(CountingProvider::new(true));
        let resolver = IdentityResolver::new(provider.clone(), cache_in(dir.path()));

        let first = resolver.resolve("tt0133093").await.unwrap();
        let second = resolver.resolve("tt0133093").await.unwrap();
        assert_eq!(first.tmdb_id, second.tmdb_id);
        assert_eq!(provider.finds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_not_found_is_not_cached() {
        let dir = tempdir().unwrap();
        let provider = Arc::new(CountingProvider::new(false));
        let resolver = IdentityResolver::new(provider.clone(), cache_in(dir.path()));

        assert!(matches!(
            resolver.resolve("tt0000001").await,
            Err(EnrichError::NotFound(_))
        ));
        assert!(matches!(
            resolver.resolve("tt0000001").await,
            Err(EnrichError::NotFound(_))
        ));
        // Both calls went to the provider: misses stay uncached.
        assert_eq!(provider.finds.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_metadata_is_cached_per_ref() {
        let dir = tempdir().unwrap();
        let provider = Arc::new(CountingProvider::new(true));
        let fetcher =
            MetadataFetcher::new(provider.clone(), cache_in(dir.path()), Duration::from_millis(0));
        let provider_ref = ProviderRef {
            tmdb_id: 603,
            content_type: ContentType::Movie,
        };

        let first = fetcher.fetch(&provider_ref).await.unwrap();
        let second = fetcher.fetch(&provider_ref).await.unwrap();
        assert_eq!(first.title, second.title);
        assert_eq!(provider.details.load(Ordering::SeqCst), 1);
    }
}
