use crate::store::{
    MediaId, MediaUpload, ProductDraft, ProductId, ProductStore, StoreError, TargetCategory,
    TargetCategoryId,
};
use async_trait::async_trait;
use std::{
    collections::BTreeMap,
    path::PathBuf,
    sync::{
        Mutex,
        atomic::{AtomicU64, Ordering},
    },
};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct StoredProduct {
    pub draft: ProductDraft,
    pub tags: Vec<String>,
    pub primary_image: Option<MediaId>,
}

#[derive(Debug, Clone)]
pub struct StoredMedia {
    pub product: ProductId,
    pub filename: String,
    pub content_type: String,
    pub size: usize,
    pub saved_to: Option<PathBuf>,
}

#[derive(Default)]
struct Catalog {
    products: BTreeMap<ProductId, StoredProduct>,
    media: BTreeMap<MediaId, StoredMedia>,
}

/// In-process catalog. Media bytes are read from the upload and, when a media
/// directory is configured, copied there under the upload filename.
pub struct MemoryStore {
    categories: Vec<TargetCategory>,
    media_dir: Option<PathBuf>,
    next_id: AtomicU64,
    catalog: Mutex<Catalog>,
}

impl MemoryStore {
    pub fn new(categories: Vec<TargetCategory>) -> Self {
        Self {
            categories,
            media_dir: None,
            next_id: AtomicU64::new(100),
            catalog: Mutex::new(Catalog::default()),
        }
    }

    pub fn with_media_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.media_dir = Some(dir.into());
        self
    }

    /// Parses `id:name` pairs separated by commas, e.g. `15:Uncategorized,22:Shoes`.
    pub fn parse_categories(raw: &str) -> Vec<TargetCategory> {
        raw.split(',')
            .filter_map(|entry| {
                let (id, name) = entry.trim().split_once(':')?;
                let id = id.trim().parse::<u64>().ok()?;
                let name = name.trim();
                (!name.is_empty()).then(|| TargetCategory {
                    id: TargetCategoryId(id),
                    name: name.to_string(),
                })
            })
            .collect()
    }

    #[cfg(test)]
    pub fn products(&self) -> Vec<StoredProduct> {
        self.lock().products.values().cloned().collect()
    }

    #[cfg(test)]
    pub fn media(&self) -> Vec<StoredMedia> {
        self.lock().media.values().cloned().collect()
    }

    fn allocate(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Catalog> {
        self.catalog
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(vec![TargetCategory {
            id: TargetCategoryId(15),
            name: "Uncategorized".into(),
        }])
    }
}

#[async_trait]
impl ProductStore for MemoryStore {
    async fn target_categories(&self) -> Result<Vec<TargetCategory>, StoreError> {
        Ok(self.categories.clone())
    }

    async fn create_product(&self, draft: &ProductDraft) -> Result<ProductId, StoreError> {
        let id = ProductId(self.allocate());
        self.lock().products.insert(
            id,
            StoredProduct {
                draft: draft.clone(),
                tags: Vec::new(),
                primary_image: None,
            },
        );
        debug!(target: "importer.store", product_id = %id, name = %draft.name, "memory product created");
        Ok(id)
    }

    async fn assign_tags(&self, product: ProductId, tags: &[String]) -> Result<(), StoreError> {
        let mut catalog = self.lock();
        let stored = catalog
            .products
            .get_mut(&product)
            .ok_or(StoreError::UnknownProduct(product))?;
        stored.tags = tags.to_vec();
        Ok(())
    }

    async fn register_media(
        &self,
        product: ProductId,
        upload: MediaUpload<'_>,
    ) -> Result<MediaId, StoreError> {
        if !self.lock().products.contains_key(&product) {
            return Err(StoreError::UnknownProduct(product));
        }
        let bytes = tokio::fs::read(upload.path).await?;
        let saved_to = match &self.media_dir {
            Some(dir) => {
                tokio::fs::create_dir_all(dir).await?;
                let target = dir.join(upload.filename);
                tokio::fs::write(&target, &bytes).await?;
                Some(target)
            }
            None => None,
        };

        let id = MediaId(self.allocate());
        self.lock().media.insert(
            id,
            StoredMedia {
                product,
                filename: upload.filename.to_string(),
                content_type: upload.content_type.to_string(),
                size: bytes.len(),
                saved_to,
            },
        );
        Ok(id)
    }

    async fn set_primary_image(
        &self,
        product: ProductId,
        media: MediaId,
    ) -> Result<(), StoreError> {
        let mut catalog = self.lock();
        // media only becomes primary for the product it was uploaded to
        let Some(upload) = catalog.media.get(&media).filter(|m| m.product == product) else {
            return Err(StoreError::UnknownMedia(media));
        };
        debug!(
            target: "importer.store",
            product_id = %product,
            media_id = %media,
            filename = %upload.filename,
            saved_to = ?upload.saved_to,
            "memory primary image set"
        );
        let stored = catalog
            .products
            .get_mut(&product)
            .ok_or(StoreError::UnknownProduct(product))?;
        stored.primary_image = Some(media);
        Ok(())
    }
}
