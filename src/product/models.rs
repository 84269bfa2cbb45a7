use crate::models::string_or_number;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use serde_with::skip_serializing_none;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProductFieldError {
    #[error("product name is empty")]
    EmptyName,
    #[error("price `{0}` is not a non-negative decimal")]
    InvalidPrice(String),
    #[error("sale price `{0}` is not a non-negative decimal")]
    InvalidSalePrice(String),
}

/// One product record as returned by the text model.
#[skip_serializing_none]
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct GeneratedProduct {
    pub name: String,
    #[serde(default, deserialize_with = "optional_text")]
    pub sku: Option<String>,
    #[serde(deserialize_with = "string_or_number")]
    pub price: String,
    #[serde(default, deserialize_with = "optional_text")]
    pub sale_price: Option<String>,
    #[serde(default, deserialize_with = "optional_integer")]
    pub stock_quantity: Option<i64>,
    #[serde(default, deserialize_with = "optional_text")]
    pub stock_status: Option<String>,
    #[serde(default, deserialize_with = "optional_text")]
    pub weight: Option<String>,
    #[serde(default)]
    pub dimensions: Option<Dimensions>,
    pub short_description: String,
    pub long_description: String,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl GeneratedProduct {
    pub fn validate(&self) -> Result<(), ProductFieldError> {
        if self.name.trim().is_empty() {
            return Err(ProductFieldError::EmptyName);
        }
        if !is_decimal(&self.price) {
            return Err(ProductFieldError::InvalidPrice(self.price.clone()));
        }
        if let Some(sale) = &self.sale_price
            && !is_decimal(sale)
        {
            return Err(ProductFieldError::InvalidSalePrice(sale.clone()));
        }
        Ok(())
    }
}

#[skip_serializing_none]
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct Dimensions {
    #[serde(default, deserialize_with = "optional_text")]
    pub length: Option<String>,
    #[serde(default, deserialize_with = "optional_text")]
    pub width: Option<String>,
    #[serde(default, deserialize_with = "optional_text")]
    pub height: Option<String>,
}

impl Dimensions {
    pub fn is_empty(&self) -> bool {
        self.length.is_none() && self.width.is_none() && self.height.is_none()
    }
}

fn is_decimal(value: &str) -> bool {
    value
        .trim()
        .parse::<f64>()
        .map(|v| v.is_finite() && v >= 0.0)
        .unwrap_or(false)
}

/// Optional string-or-number field; blanks and `null` become `None`.
fn optional_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    let text = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::String(s)) => s,
        Some(Value::Number(n)) => n.to_string(),
        Some(other) => {
            return Err(serde::de::Error::custom(format!(
                "expected string or number, got {other}"
            )));
        }
    };
    let trimmed = text.trim();
    Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
}

fn optional_integer<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("expected integer, got {n}"))),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("expected integer, got `{s}`"))),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected integer, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn full_record() -> Value {
        json!({
            "name": "Trail Runner 2",
            "sku": "TR-002",
            "price": "89.99",
            "sale_price": 79.5,
            "stock_quantity": "40",
            "stock_status": "instock",
            "weight": 0.8,
            "dimensions": {"length": "30", "width": 12, "height": ""},
            "short_description": "Light trail shoe",
            "long_description": "A lightweight trail running shoe.",
            "features": ["Grippy sole", "Breathable mesh"],
            "tags": ["running", "outdoor"]
        })
    }

    #[test]
    fn parses_mixed_string_and_number_fields() {
        let product: GeneratedProduct = serde_json::from_value(full_record()).expect("product");
        assert_eq!(product.price, "89.99");
        assert_eq!(product.sale_price.as_deref(), Some("79.5"));
        assert_eq!(product.stock_quantity, Some(40));
        assert_eq!(product.weight.as_deref(), Some("0.8"));
        let dims = product.dimensions.as_ref().expect("dimensions");
        assert_eq!(dims.width.as_deref(), Some("12"));
        assert_eq!(dims.height, None);
        assert_eq!(product.features.len(), 2);
        assert!(product.validate().is_ok());
    }

    #[test]
    fn optional_fields_may_be_absent() {
        let product: GeneratedProduct = serde_json::from_value(json!({
            "name": "Plain Notebook",
            "price": 4,
            "short_description": "A5 notebook",
            "long_description": "Ninety-six ruled pages."
        }))
        .expect("product");
        assert_eq!(product.sku, None);
        assert_eq!(product.stock_quantity, None);
        assert!(product.tags.is_empty());
        assert!(product.validate().is_ok());
    }

    #[test]
    fn missing_required_field_fails_to_parse() {
        let mut record = full_record();
        record.as_object_mut().unwrap().remove("long_description");
        assert!(serde_json::from_value::<GeneratedProduct>(record).is_err());
    }

    #[test]
    fn validate_rejects_blank_name_and_bad_prices() {
        let mut product: GeneratedProduct =
            serde_json::from_value(full_record()).expect("product");
        product.name = "  ".into();
        assert_eq!(product.validate(), Err(ProductFieldError::EmptyName));

        product.name = "Shoe".into();
        product.price = "free".into();
        assert!(matches!(
            product.validate(),
            Err(ProductFieldError::InvalidPrice(_))
        ));

        product.price = "10".into();
        product.sale_price = Some("-1".into());
        assert!(matches!(
            product.validate(),
            Err(ProductFieldError::InvalidSalePrice(_))
        ));
    }
}
