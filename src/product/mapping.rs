use crate::product::models::GeneratedProduct;
use crate::store::{DraftDimensions, Inventory, ProductDraft, StockStatus, TargetCategoryId};
use tracing::debug;

/// Projects a generated record onto a simple-product draft in `category`.
///
/// Stock is only managed when the model supplied a quantity; the status then
/// defaults to in stock. Empty dimension sets are dropped.
pub fn draft_from_generated(product: &GeneratedProduct, category: TargetCategoryId) -> ProductDraft {
    let inventory = product.stock_quantity.map(|quantity| {
        let status = match product.stock_status.as_deref() {
            Some(raw) => StockStatus::parse(raw).unwrap_or_else(|| {
                debug!(target: "importer.run", status = raw, "unknown stock status, using instock");
                StockStatus::InStock
            }),
            None => StockStatus::InStock,
        };
        Inventory {
            quantity: quantity.max(0),
            status,
        }
    });

    let dimensions = product
        .dimensions
        .as_ref()
        .filter(|dims| !dims.is_empty())
        .map(|dims| DraftDimensions {
            length: dims.length.clone(),
            width: dims.width.clone(),
            height: dims.height.clone(),
        });

    ProductDraft {
        name: product.name.trim().to_string(),
        regular_price: product.price.trim().to_string(),
        sale_price: product.sale_price.clone(),
        description: product.long_description.clone(),
        short_description: product.short_description.clone(),
        sku: product.sku.clone(),
        inventory,
        weight: product.weight.clone(),
        dimensions,
        category_ids: vec![category],
        features: clean_list(&product.features),
    }
}

/// Trimmed, non-empty, first-occurrence-wins copy of a model-supplied list.
pub fn clean_list(values: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(values.len());
    for value in values {
        let trimmed = value.trim();
        if trimmed.is_empty() || out.iter().any(|seen| seen.eq_ignore_ascii_case(trimmed)) {
            continue;
        }
        out.push(trimmed.to_string());
    }
    out
}
