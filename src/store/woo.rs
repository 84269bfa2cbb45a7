use crate::http::build_client;
use crate::store::{
    MediaId, MediaUpload, ProductDraft, ProductId, ProductStore, StoreError, TargetCategory,
    TargetCategoryId,
};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use serde_with::skip_serializing_none;
use tracing::{debug, warn};
use urlencoding::encode;

const CATEGORY_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone)]
pub struct WooConfig {
    pub base_url: String,
    pub username: String,
    pub app_password: String,
}

impl WooConfig {
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var("WOO_BASE_URL").ok()?;
        let username = std::env::var("WOO_USERNAME").ok()?;
        let app_password = std::env::var("WOO_APP_PASSWORD").ok()?;
        Some(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            username,
            app_password,
        })
    }
}

/// WooCommerce REST backend (`wc/v3` for catalog data, `wp/v2/media` for uploads).
#[derive(Debug, Clone)]
pub struct WooStore {
    config: WooConfig,
    http: Client,
}

impl WooStore {
    pub fn new(config: WooConfig) -> Self {
        Self {
            config,
            http: build_client(),
        }
    }

    fn wc_url(&self, path: &str) -> String {
        format!("{}/wp-json/wc/v3/{}", self.config.base_url, path)
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.basic_auth(&self.config.username, Some(&self.config.app_password))
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, StoreError> {
        self.authed(builder)
            .send()
            .await
            .map_err(|err| StoreError::Request(err.to_string()))
    }

    async fn update_product(&self, product: ProductId, body: &Value) -> Result<(), StoreError> {
        let response = self
            .send(self.http.put(self.wc_url(&format!("products/{product}"))).json(body))
            .await?;
        expect_success(response).await.map(|_| ())
    }

    async fn resolve_tag(&self, name: &str) -> Result<u64, StoreError> {
        let response = self
            .send(self.http.post(self.wc_url("products/tags")).json(&json!({ "name": name })))
            .await?;
        let status = response.status().as_u16();
        let body: Value = response
            .json()
            .await
            .map_err(|err| StoreError::InvalidResponse(err.to_string()))?;
        if (200..300).contains(&status) {
            return body
                .get("id")
                .and_then(Value::as_u64)
                .ok_or_else(|| StoreError::InvalidResponse("tag without id".into()));
        }
        // an existing tag answers 400 term_exists with the id of the existing term
        if body.get("code").and_then(Value::as_str) == Some("term_exists")
            && let Some(id) = body.pointer("/data/resource_id").and_then(Value::as_u64)
        {
            return Ok(id);
        }
        Err(StoreError::Status {
            status,
            message: error_message(&body),
        })
    }
}

#[derive(Debug, Deserialize)]
struct WooCategory {
    id: u64,
    name: String,
}

#[derive(Debug, Deserialize)]
struct WooCreated {
    id: u64,
}

#[derive(Debug, Serialize)]
struct IdRef {
    id: u64,
}

#[skip_serializing_none]
#[derive(Debug, Serialize)]
struct WooDimensions<'a> {
    length: Option<&'a str>,
    width: Option<&'a str>,
    height: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct WooAttribute<'a> {
    name: &'static str,
    visible: bool,
    options: &'a [String],
}

#[skip_serializing_none]
#[derive(Debug, Serialize)]
struct WooProductPayload<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    status: &'static str,
    regular_price: &'a str,
    sale_price: Option<&'a str>,
    description: &'a str,
    short_description: &'a str,
    sku: Option<&'a str>,
    manage_stock: Option<bool>,
    stock_quantity: Option<i64>,
    stock_status: Option<&'static str>,
    weight: Option<&'a str>,
    dimensions: Option<WooDimensions<'a>>,
    categories: Vec<IdRef>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attributes: Vec<WooAttribute<'a>>,
}

impl<'a> WooProductPayload<'a> {
    fn from_draft(draft: &'a ProductDraft) -> Self {
        let attributes = if draft.features.is_empty() {
            Vec::new()
        } else {
            vec![WooAttribute {
                name: "Features",
                visible: true,
                options: &draft.features,
            }]
        };
        Self {
            name: &draft.name,
            kind: "simple",
            status: "publish",
            regular_price: &draft.regular_price,
            sale_price: draft.sale_price.as_deref(),
            description: &draft.description,
            short_description: &draft.short_description,
            sku: draft.sku.as_deref(),
            manage_stock: draft.inventory.as_ref().map(|_| true),
            stock_quantity: draft.inventory.as_ref().map(|inv| inv.quantity),
            stock_status: draft.inventory.as_ref().map(|inv| inv.status.as_str()),
            weight: draft.weight.as_deref(),
            dimensions: draft.dimensions.as_ref().map(|dims| WooDimensions {
                length: dims.length.as_deref(),
                width: dims.width.as_deref(),
                height: dims.height.as_deref(),
            }),
            categories: draft
                .category_ids
                .iter()
                .map(|TargetCategoryId(id)| IdRef { id: *id })
                .collect(),
            attributes,
        }
    }
}

#[async_trait]
impl ProductStore for WooStore {
    async fn target_categories(&self) -> Result<Vec<TargetCategory>, StoreError> {
        let mut categories = Vec::new();
        for page in 1.. {
            let response = self
                .send(self.http.get(self.wc_url("products/categories")).query(&[
                    ("per_page", CATEGORY_PAGE_SIZE.to_string()),
                    ("page", page.to_string()),
                    ("hide_empty", "false".to_string()),
                ]))
                .await?;
            let batch: Vec<WooCategory> = expect_success(response)
                .await?
                .json()
                .await
                .map_err(|err| StoreError::InvalidResponse(err.to_string()))?;
            let short_page = batch.len() < CATEGORY_PAGE_SIZE;
            categories.extend(batch.into_iter().map(|c| TargetCategory {
                id: TargetCategoryId(c.id),
                name: c.name,
            }));
            if short_page {
                break;
            }
        }
        Ok(categories)
    }

    async fn create_product(&self, draft: &ProductDraft) -> Result<ProductId, StoreError> {
        let payload = WooProductPayload::from_draft(draft);
        let response = self
            .send(self.http.post(self.wc_url("products")).json(&payload))
            .await?;
        let created: WooCreated = expect_success(response)
            .await?
            .json()
            .await
            .map_err(|err| StoreError::InvalidResponse(err.to_string()))?;
        debug!(target: "importer.store", product_id = created.id, "woocommerce product created");
        Ok(ProductId(created.id))
    }

    async fn assign_tags(&self, product: ProductId, tags: &[String]) -> Result<(), StoreError> {
        let mut refs = Vec::with_capacity(tags.len());
        for tag in tags {
            match self.resolve_tag(tag).await {
                Ok(id) => refs.push(IdRef { id }),
                Err(err) => {
                    warn!(target: "importer.store", tag = %tag, error = %err, "tag_resolution_failed");
                }
            }
        }
        if refs.is_empty() {
            return Ok(());
        }
        self.update_product(product, &json!({ "tags": refs })).await
    }

    async fn register_media(
        &self,
        product: ProductId,
        upload: MediaUpload<'_>,
    ) -> Result<MediaId, StoreError> {
        let bytes = tokio::fs::read(upload.path).await?;
        let url = format!("{}/wp-json/wp/v2/media", self.config.base_url);
        let disposition = format!(
            "attachment; filename=\"{}\"; filename*=UTF-8''{}",
            ascii_fallback(upload.filename),
            encode(upload.filename)
        );
        let response = self
            .send(
                self.http
                    .post(url)
                    .query(&[("post", product.0)])
                    .header(reqwest::header::CONTENT_TYPE, upload.content_type)
                    .header(reqwest::header::CONTENT_DISPOSITION, disposition)
                    .body(bytes),
            )
            .await?;
        let created: WooCreated = expect_success(response)
            .await?
            .json()
            .await
            .map_err(|err| StoreError::InvalidResponse(err.to_string()))?;
        Ok(MediaId(created.id))
    }

    async fn set_primary_image(
        &self,
        product: ProductId,
        media: MediaId,
    ) -> Result<(), StoreError> {
        self.update_product(product, &json!({ "images": [{ "id": media.0 }] }))
            .await
    }
}

async fn expect_success(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body: Value = response.json().await.unwrap_or(Value::Null);
    Err(StoreError::Status {
        status: status.as_u16(),
        message: error_message(&body),
    })
}

fn error_message(body: &Value) -> String {
    body.get("message")
        .and_then(Value::as_str)
        .unwrap_or("Unknown error")
        .to_string()
}

fn ascii_fallback(filename: &str) -> String {
    filename
        .chars()
        .map(|c| if c.is_ascii_graphic() && c != '"' { c } else { '_' })
        .collect()
}
