//! Body and garment catalogs, refreshed from the backend and merged with
//! assets the client has generated but the server has not listed yet.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use super::backend::FittingBackend;
use crate::cache::{CacheKey, ModelAssetCache};
use crate::error::FittingResult;
use crate::models::{Asset, Collection};

/// What happens to the in-memory list when a refresh fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RefreshPolicy {
    #[default]
    KeepOnError,
    ClearOnError,
}

#[derive(Default)]
struct CollectionState {
    authoritative: Vec<Asset>,
    optimistic: Vec<Asset>,
}

/// Shared per-collection asset lists.
#[derive(Clone, Default)]
pub struct CatalogStore {
    inner: Arc<RwLock<HashMap<Collection, CollectionState>>>,
}

impl CatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Presentation list: presets first, then generated assets, otherwise in
    /// server order with optimistic entries last.
    pub fn assets(&self, collection: Collection) -> Vec<Asset> {
        let inner = self.inner.read();
        let Some(state) = inner.get(&collection) else {
            return Vec::new();
        };

        let mut assets = state.authoritative.clone();
        assets.extend(
            state
                .optimistic
                .iter()
                .filter(|a| !state.authoritative.iter().any(|b| b.url == a.url))
                .cloned(),
        );
        assets.sort_by_key(|a| !a.is_preset);
        assets
    }

    /// Add a session-local asset; it is listed until a refresh returns one
    /// with the same URL.
    pub fn insert_optimistic(&self, collection: Collection, asset: Asset) {
        let mut inner = self.inner.write();
        let state = inner.entry(collection).or_default();
        if let Some(existing) = state.optimistic.iter_mut().find(|a| a.url == asset.url) {
            *existing = asset;
        } else {
            debug!(collection = %collection, url = %asset.url, "Adding optimistic asset");
            state.optimistic.push(asset);
        }
    }

    /// Install a fresh authoritative list.
    pub fn replace(&self, collection: Collection, assets: Vec<Asset>) {
        let mut inner = self.inner.write();
        let state = inner.entry(collection).or_default();
        state
            .optimistic
            .retain(|a| !assets.iter().any(|b| b.url == a.url));
        state.authoritative = assets;
    }

    pub fn clear(&self, collection: Collection) {
        self.inner.write().remove(&collection);
    }

    /// First preset, or the first asset when there is none.
    pub fn default_selection(&self, collection: Collection) -> Option<Asset> {
        let assets = self.assets(collection);
        assets
            .iter()
            .find(|a| a.is_preset)
            .or_else(|| assets.first())
            .cloned()
    }
}

/// Keeps a [`CatalogStore`] in sync with the backend and loads model bytes
/// through the shared cache.
#[derive(Clone)]
pub struct CatalogSync {
    backend: Arc<dyn FittingBackend>,
    store: CatalogStore,
    cache: ModelAssetCache<Bytes>,
}

impl CatalogSync {
    pub fn new(
        backend: Arc<dyn FittingBackend>,
        store: CatalogStore,
        cache: ModelAssetCache<Bytes>,
    ) -> Self {
        Self {
            backend,
            store,
            cache,
        }
    }

    pub fn store(&self) -> &CatalogStore {
        &self.store
    }

    pub fn cache(&self) -> &ModelAssetCache<Bytes> {
        &self.cache
    }

    /// Re-fetch a collection. On failure the previous list stays in place
    /// unless `policy` says otherwise, and the error is returned.
    pub async fn refresh(
        &self,
        collection: Collection,
        policy: RefreshPolicy,
    ) -> FittingResult<Vec<Asset>> {
        match self.backend.list_assets(collection).await {
            Ok(assets) => {
                info!(collection = %collection, count = assets.len(), "Catalog refreshed");
                self.store.replace(collection, assets);
                Ok(self.store.assets(collection))
            }
            Err(e) => {
                warn!(collection = %collection, error = %e, ?policy, "Catalog refresh failed");
                if policy == RefreshPolicy::ClearOnError {
                    self.store.clear(collection);
                }
                Err(e)
            }
        }
    }

    /// Switching into asset management drops every cached model so edits
    /// made elsewhere show up, then reloads the list.
    pub async fn enter_asset_management(
        &self,
        collection: Collection,
    ) -> FittingResult<Vec<Asset>> {
        self.cache.invalidate_all();
        self.refresh(collection, RefreshPolicy::KeepOnError).await
    }

    /// Model bytes for `key`, from the cache when present.
    pub async fn fetch_model(&self, key: CacheKey) -> FittingResult<Bytes> {
        let backend = self.backend.clone();
        self.cache
            .get_or_load(key, move |url| backend.fetch_model(url))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::services::mock_backend::{MockBackend, asset};

    fn setup() -> (Arc<MockBackend>, CatalogSync) {
        let backend = Arc::new(MockBackend::new());
        let sync = CatalogSync::new(
            backend.clone() as Arc<dyn FittingBackend>,
            CatalogStore::new(),
            ModelAssetCache::new(),
        );
        (backend, sync)
    }

    fn names(assets: &[Asset]) -> Vec<&str> {
        assets.iter().map(|a| a.name.as_str()).collect()
    }

    #[tokio::test]
    async fn test_presets_first_stable_order() {
        let (backend, sync) = setup();
        backend.push_list(
            Collection::Bodies,
            Ok(vec![
                asset("gen_b.obj", Collection::Bodies, false),
                asset("preset_1.obj", Collection::Bodies, true),
                asset("gen_a.obj", Collection::Bodies, false),
                asset("preset_2.obj", Collection::Bodies, true),
            ]),
        );

        let assets = sync
            .refresh(Collection::Bodies, RefreshPolicy::KeepOnError)
            .await
            .unwrap();
        assert_eq!(
            names(&assets),
            vec!["preset_1.obj", "preset_2.obj", "gen_b.obj", "gen_a.obj"]
        );
        assert_eq!(
            sync.store().default_selection(Collection::Bodies).unwrap().name,
            "preset_1.obj"
        );
    }

    #[tokio::test]
    async fn test_default_selection_without_presets() {
        let (backend, sync) = setup();
        assert!(sync.store().default_selection(Collection::Clothes).is_none());

        backend.push_list(
            Collection::Clothes,
            Ok(vec![
                asset("shirt.glb", Collection::Clothes, false),
                asset("pants.glb", Collection::Clothes, false),
            ]),
        );
        sync.refresh(Collection::Clothes, RefreshPolicy::KeepOnError)
            .await
            .unwrap();
        assert_eq!(
            sync.store().default_selection(Collection::Clothes).unwrap().name,
            "shirt.glb"
        );
    }

    #[tokio::test]
    async fn test_failure_keeps_previous_list() {
        let (backend, sync) = setup();
        backend.push_list(
            Collection::Clothes,
            Ok(vec![asset("shirt.glb", Collection::Clothes, false)]),
        );
        backend.push_list(
            Collection::Clothes,
            Err(ErrorKind::ServerConnection("refused".to_string())),
        );

        sync.refresh(Collection::Clothes, RefreshPolicy::KeepOnError)
            .await
            .unwrap();
        let result = sync
            .refresh(Collection::Clothes, RefreshPolicy::KeepOnError)
            .await;

        assert!(matches!(result, Err(ErrorKind::ServerConnection(_))));
        assert_eq!(names(&sync.store().assets(Collection::Clothes)), vec!["shirt.glb"]);
    }

    #[tokio::test]
    async fn test_failure_with_clear_policy() {
        let (backend, sync) = setup();
        backend.push_list(
            Collection::Clothes,
            Ok(vec![asset("shirt.glb", Collection::Clothes, false)]),
        );
        backend.push_list(Collection::Clothes, Err(ErrorKind::Catalog("error".to_string())));

        sync.refresh(Collection::Clothes, RefreshPolicy::ClearOnError)
            .await
            .unwrap();
        assert!(
            sync.refresh(Collection::Clothes, RefreshPolicy::ClearOnError)
                .await
                .is_err()
        );
        assert!(sync.store().assets(Collection::Clothes).is_empty());
    }

    #[tokio::test]
    async fn test_optimistic_assets_until_confirmed() {
        let (backend, sync) = setup();
        let store = sync.store();
        backend.push_list(
            Collection::Clothes,
            Ok(vec![asset("preset.glb", Collection::Clothes, true)]),
        );
        sync.refresh(Collection::Clothes, RefreshPolicy::KeepOnError)
            .await
            .unwrap();

        let fresh = asset("fresh.glb", Collection::Clothes, false);
        store.insert_optimistic(Collection::Clothes, fresh.clone());
        store.insert_optimistic(Collection::Clothes, fresh.clone());
        assert_eq!(
            names(&store.assets(Collection::Clothes)),
            vec!["preset.glb", "fresh.glb"]
        );

        // Server does not list it yet
        backend.push_list(
            Collection::Clothes,
            Ok(vec![asset("preset.glb", Collection::Clothes, true)]),
        );
        sync.refresh(Collection::Clothes, RefreshPolicy::KeepOnError)
            .await
            .unwrap();
        assert_eq!(store.assets(Collection::Clothes).len(), 2);

        // Confirmed: the authoritative copy replaces the optimistic one
        let mut confirmed = fresh.clone();
        confirmed.thumbnail_url = Some("/outputs/clothes/fresh.jpg".to_string());
        backend.push_list(
            Collection::Clothes,
            Ok(vec![confirmed.clone(), asset("preset.glb", Collection::Clothes, true)]),
        );
        let assets = sync
            .refresh(Collection::Clothes, RefreshPolicy::KeepOnError)
            .await
            .unwrap();
        assert_eq!(assets, vec![asset("preset.glb", Collection::Clothes, true), confirmed]);
    }

    #[tokio::test]
    async fn test_fetch_model_goes_through_cache() {
        let (backend, sync) = setup();
        let key = CacheKey::with_bust("/outputs/clothes/shirt.glb", "9");

        let first = sync.fetch_model(key.clone()).await.unwrap();
        let second = sync.fetch_model(key.clone()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(
            backend.calls(),
            vec!["fetch_model:/outputs/clothes/shirt.glb?t=9".to_string()]
        );

        sync.cache().invalidate("/outputs/clothes/shirt.glb");
        sync.fetch_model(key).await.unwrap();
        assert_eq!(backend.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_enter_asset_management_drops_cache() {
        let (backend, sync) = setup();
        sync.cache()
            .insert(CacheKey::new("/outputs/bodies/a.obj"), Bytes::from_static(b"a"));

        sync.enter_asset_management(Collection::Bodies).await.unwrap();

        assert!(sync.cache().is_empty());
        assert_eq!(backend.calls(), vec!["list_assets:bodies".to_string()]);
    }
}
