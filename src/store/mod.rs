pub mod memory;
pub mod woo;

pub use memory::MemoryStore;
pub use woo::{WooConfig, WooStore};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{fmt, path::Path};
use thiserror::Error;

macro_rules! store_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

store_id!(TargetCategoryId);
store_id!(ProductId);
store_id!(MediaId);

/// A product category that already exists in the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TargetCategory {
    pub id: TargetCategoryId,
    pub name: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StockStatus {
    #[default]
    InStock,
    OutOfStock,
    OnBackorder,
}

impl StockStatus {
    /// Lenient parse of model output; unknown values yield `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw
            .trim()
            .to_lowercase()
            .replace(['_', '-', ' '], "")
            .as_str()
        {
            "instock" => Some(Self::InStock),
            "outofstock" => Some(Self::OutOfStock),
            "onbackorder" | "backorder" => Some(Self::OnBackorder),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InStock => "instock",
            Self::OutOfStock => "outofstock",
            Self::OnBackorder => "onbackorder",
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Inventory {
    pub quantity: i64,
    pub status: StockStatus,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct DraftDimensions {
    pub length: Option<String>,
    pub width: Option<String>,
    pub height: Option<String>,
}

/// A simple product ready to be persisted. Unset options keep store defaults.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProductDraft {
    pub name: String,
    pub regular_price: String,
    pub sale_price: Option<String>,
    pub description: String,
    pub short_description: String,
    pub sku: Option<String>,
    pub inventory: Option<Inventory>,
    pub weight: Option<String>,
    pub dimensions: Option<DraftDimensions>,
    pub category_ids: Vec<TargetCategoryId>,
    pub features: Vec<String>,
}

/// A local file to be registered as a media asset.
#[derive(Debug, Clone, Copy)]
pub struct MediaUpload<'a> {
    pub path: &'a Path,
    pub filename: &'a str,
    pub content_type: &'a str,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store request failed: {0}")]
    Request(String),
    #[error("store returned HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("invalid store response: {0}")]
    InvalidResponse(String),
    #[error("unknown product {0}")]
    UnknownProduct(ProductId),
    #[error("unknown media {0}")]
    UnknownMedia(MediaId),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// The commerce backend products are written into.
#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn target_categories(&self) -> Result<Vec<TargetCategory>, StoreError>;

    /// Persists a new product and returns its id.
    async fn create_product(&self, draft: &ProductDraft) -> Result<ProductId, StoreError>;

    async fn assign_tags(&self, product: ProductId, tags: &[String]) -> Result<(), StoreError>;

    /// Stores the file as a media asset attached to `product`.
    async fn register_media(
        &self,
        product: ProductId,
        upload: MediaUpload<'_>,
    ) -> Result<MediaId, StoreError>;

    async fn set_primary_image(&self, product: ProductId, media: MediaId)
    -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stock_status_parse_is_lenient() {
        assert_eq!(StockStatus::parse("instock"), Some(StockStatus::InStock));
        assert_eq!(StockStatus::parse("In Stock"), Some(StockStatus::InStock));
        assert_eq!(
            StockStatus::parse("out_of_stock"),
            Some(StockStatus::OutOfStock)
        );
        assert_eq!(StockStatus::parse("backorder"), Some(StockStatus::OnBackorder));
        assert_eq!(StockStatus::parse("discontinued"), None);
    }

    #[test]
    fn ids_serialize_as_plain_numbers() {
        let value = serde_json::to_value(TargetCategory {
            id: TargetCategoryId(15),
            name: "Uncategorized".into(),
        })
        .expect("json");
        assert_eq!(value["id"], serde_json::json!(15));
    }
}
