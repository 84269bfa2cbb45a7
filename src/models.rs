use crate::importer::ImportErrorKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Raw import form as submitted by the admin UI.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ImportForm {
    #[serde(default, deserialize_with = "string_or_number")]
    pub product_count: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub generation_category: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub content_language: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub product_category: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ImportResult {
    pub success: bool,
    pub imported_count: usize,
    pub image_success_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ImportErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<String>,
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub products: Vec<ImportedProduct>,
    pub stages: Vec<StageReport>,
}

impl ImportResult {
    pub fn notice(&self) -> Notice {
        if self.success {
            Notice {
                level: NoticeLevel::Success,
                text: format!(
                    "Successfully imported {} products with {} AI-generated images.",
                    self.imported_count, self.image_success_count
                ),
            }
        } else {
            Notice {
                level: NoticeLevel::Error,
                text: format!(
                    "Error during product import: {}",
                    self.message.as_deref().unwrap_or("unknown error")
                ),
            }
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ImportedProduct {
    pub product_id: u64,
    pub name: String,
    pub image_attached: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StageReport {
    pub name: String,
    pub elapsed_ms: u128,
    pub timestamp: DateTime<Utc>,
    pub output: Value,
}

impl StageReport {
    pub fn new(name: &str, elapsed_ms: u128, output: Value) -> Self {
        Self {
            name: name.to_string(),
            elapsed_ms,
            timestamp: Utc::now(),
            output,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Accepts a JSON string or number and keeps its textual form. `null` maps to
/// an empty string.
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(String::new()),
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn result(success: bool, message: Option<&str>) -> ImportResult {
        ImportResult {
            success,
            imported_count: 3,
            image_success_count: 2,
            message: message.map(str::to_string),
            error_kind: None,
            failed_stage: None,
            run_id: "run".into(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            products: Vec::new(),
            stages: Vec::new(),
        }
    }

    #[test]
    fn import_form_accepts_numbers_and_strings() {
        let form: ImportForm = serde_json::from_value(json!({
            "product_count": 5,
            "generation_category": "books",
            "content_language": "en",
            "product_category": "15",
        }))
        .expect("form");
        assert_eq!(form.product_count, "5");
        assert_eq!(form.product_category, "15");
    }

    #[test]
    fn import_form_missing_fields_are_blank() {
        let form: ImportForm = serde_json::from_value(json!({})).expect("form");
        assert!(form.product_count.is_empty());
        assert!(form.generation_category.is_empty());
    }

    #[test]
    fn import_form_rejects_nested_values() {
        let err = serde_json::from_value::<ImportForm>(json!({"product_count": [1]}));
        assert!(err.is_err());
    }

    #[test]
    fn success_notice_reports_counts() {
        let notice = result(true, None).notice();
        assert_eq!(notice.level, NoticeLevel::Success);
        assert_eq!(
            notice.text,
            "Successfully imported 3 products with 2 AI-generated images."
        );
    }

    #[test]
    fn error_notice_carries_message() {
        let notice = result(false, Some("boom")).notice();
        assert_eq!(notice.level, NoticeLevel::Error);
        assert_eq!(notice.text, "Error during product import: boom");
    }
}
