use crate::catalog::Language;
use crate::http::{HttpClient, HttpError, HttpRequest};
use crate::openai::{OpenAiConfig, upstream_message};
use crate::product::GeneratedProduct;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

const EXCERPT_CHARS: usize = 255;

const PRODUCT_SHAPE: &str = r#"{
    "products": [
        {
            "name": "Product Name",
            "sku": "UNIQUE-SKU-123",
            "price": "29.99",
            "sale_price": "24.99",
            "stock_quantity": 100,
            "stock_status": "instock",
            "weight": "1.5",
            "dimensions": {
                "length": "10",
                "width": "5",
                "height": "2"
            },
            "short_description": "Brief product description",
            "long_description": "Detailed product description",
            "features": ["feature1", "feature2"],
            "tags": ["tag1", "tag2"]
        }
    ]
}"#;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("HTTP request failed: {0}")]
    Transport(#[from] HttpError),
    #[error("OpenAI API Error (HTTP {status}): {message}")]
    Api { status: u16, message: String },
    #[error("Model refused to generate: {0}")]
    Refusal(String),
    #[error("Response exceeded maximum length. Try reducing the number of products.")]
    Truncated,
    #[error("Content was filtered due to safety concerns.")]
    ContentFiltered,
    #[error("Response contained no message content.")]
    MissingContent,
    #[error("Invalid response structure from OpenAI API: {0}")]
    MalformedBody(String),
    #[error("JSON parsing error: {reason}. Content received: {excerpt}")]
    MalformedContent { reason: String, excerpt: String },
    #[error("Invalid product data format received from API: {0}")]
    InvalidProducts(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    response_format: ResponseFormat,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ChoiceMessage>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

/// Chat-completion client that turns one request into a list of products.
pub struct TextGenerator {
    http: Arc<dyn HttpClient>,
    config: OpenAiConfig,
    api_key: String,
}

impl TextGenerator {
    pub fn new(http: Arc<dyn HttpClient>, config: OpenAiConfig, api_key: impl Into<String>) -> Self {
        Self {
            http,
            config,
            api_key: api_key.into(),
        }
    }

    pub async fn generate(
        &self,
        count: u8,
        category_name: &str,
        language: &Language,
    ) -> Result<Vec<GeneratedProduct>, GenerationError> {
        let body = ChatRequest {
            model: &self.config.text_model,
            messages: build_messages(count, category_name, language),
            response_format: ResponseFormat {
                kind: "json_object",
            },
            temperature: 0.7,
            max_tokens: 2000,
        };
        let request = HttpRequest::post_json(
            format!("{}/chat/completions", self.config.base_url),
            &body,
        )?
        .bearer_auth(&self.api_key)
        .timeout(self.config.timeout);

        let response = self.http.send(request).await?;
        if response.status != 200 {
            return Err(GenerationError::Api {
                status: response.status,
                message: upstream_message(&response.body),
            });
        }
        debug!(target: "importer.openai", bytes = response.body.len(), "chat completion received");
        parse_completion(&response.body)
    }
}

pub fn build_messages(count: u8, category_name: &str, language: &Language) -> Vec<ChatMessage> {
    let label = language.prompt_label();
    vec![
        ChatMessage {
            role: "system",
            content: format!(
                "You are a product data generator for an ecommerce store. Generate all content in {label}. You must respond with valid JSON only."
            ),
        },
        ChatMessage {
            role: "user",
            content: format!(
                "Generate {count} realistic products for the category \"{category_name}\". All text should be in {label}. Include realistic prices, descriptions, and features. Return JSON in this exact format:\n{PRODUCT_SHAPE}"
            ),
        },
    ]
}

/// Validates a chat-completion body and extracts the product list. Either
/// every record is valid or the whole response is rejected.
pub fn parse_completion(body: &[u8]) -> Result<Vec<GeneratedProduct>, GenerationError> {
    let completion: ChatCompletion = serde_json::from_slice(body)
        .map_err(|err| GenerationError::MalformedBody(err.to_string()))?;
    let choice = completion
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| GenerationError::MalformedBody("no choices returned".into()))?;

    if let Some(refusal) = choice
        .message
        .as_ref()
        .and_then(|m| m.refusal.as_deref())
        .filter(|r| !r.trim().is_empty())
    {
        return Err(GenerationError::Refusal(refusal.to_string()));
    }

    match choice.finish_reason.as_deref() {
        Some("length") => return Err(GenerationError::Truncated),
        Some("content_filter") => return Err(GenerationError::ContentFiltered),
        _ => {}
    }

    let content = choice
        .message
        .and_then(|m| m.content)
        .filter(|c| !c.trim().is_empty())
        .ok_or(GenerationError::MissingContent)?;

    let document: Value =
        serde_json::from_str(&content).map_err(|err| GenerationError::MalformedContent {
            reason: err.to_string(),
            excerpt: content.chars().take(EXCERPT_CHARS).collect(),
        })?;

    let records = document
        .get("products")
        .and_then(Value::as_array)
        .ok_or_else(|| GenerationError::InvalidProducts("missing `products` array".into()))?;
    if records.is_empty() {
        return Err(GenerationError::InvalidProducts("`products` is empty".into()));
    }

    records
        .iter()
        .enumerate()
        .map(|(idx, record)| {
            let product: GeneratedProduct = serde_json::from_value(record.clone())
                .map_err(|err| GenerationError::InvalidProducts(format!("product {idx}: {err}")))?;
            product.validate().map_err(|err| {
                warn!(target: "importer.openai", index = idx, error = %err, "rejected generated product");
                GenerationError::InvalidProducts(format!("product {idx}: {err}"))
            })?;
            Ok(product)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::LANGUAGES;
    use crate::testing::{ScriptedHttp, chat_response, products_json};
    use serde_json::json;

    fn english() -> &'static Language {
        &LANGUAGES[0]
    }

    fn completion(content: &str, finish_reason: &str) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "choices": [{
                "index": 0,
                "finish_reason": finish_reason,
                "message": {"role": "assistant", "content": content}
            }]
        }))
        .unwrap()
    }

    #[test]
    fn prompt_names_count_category_and_language() {
        let messages = build_messages(3, "Books", english());
        assert_eq!(messages[0].role, "system");
        assert!(messages[0].content.contains("English (EN)"));
        assert!(messages[1].content.starts_with("Generate 3 realistic products"));
        assert!(messages[1].content.contains("\"Books\""));
        assert!(messages[1].content.contains("\"long_description\""));
    }

    #[test]
    fn parses_well_formed_products() {
        let body = serde_json::to_vec(&chat_response(&products_json(2))).unwrap();
        let products = parse_completion(&body).expect("products");
        assert_eq!(products.len(), 2);
        assert_eq!(products[0].name, "Product 1");
    }

    #[test]
    fn truncated_output_is_reported() {
        let err = parse_completion(&completion("{\"products\": [", "length")).expect_err("length");
        assert!(matches!(err, GenerationError::Truncated));
        assert!(err.to_string().contains("exceeded maximum length"));
    }

    #[test]
    fn content_filter_is_reported() {
        let err = parse_completion(&completion("", "content_filter")).expect_err("filtered");
        assert!(matches!(err, GenerationError::ContentFiltered));
    }

    #[test]
    fn refusal_takes_precedence() {
        let body = serde_json::to_vec(&json!({
            "choices": [{
                "finish_reason": "stop",
                "message": {"content": null, "refusal": "I can't help with that."}
            }]
        }))
        .unwrap();
        let err = parse_completion(&body).expect_err("refusal");
        assert!(matches!(err, GenerationError::Refusal(ref text) if text == "I can't help with that."));
    }

    #[test]
    fn missing_content_and_choices_are_distinct() {
        let err = parse_completion(&completion("  ", "stop")).expect_err("blank");
        assert!(matches!(err, GenerationError::MissingContent));

        let err = parse_completion(br#"{"choices": []}"#).expect_err("no choices");
        assert!(matches!(err, GenerationError::MalformedBody(_)));

        let err = parse_completion(b"<html>bad gateway</html>").expect_err("not json");
        assert!(matches!(err, GenerationError::MalformedBody(_)));
    }

    #[test]
    fn malformed_content_keeps_short_excerpt() {
        let content = format!("not json {}", "x".repeat(400));
        let err = parse_completion(&completion(&content, "stop")).expect_err("bad content");
        match err {
            GenerationError::MalformedContent { excerpt, .. } => {
                assert_eq!(excerpt.chars().count(), 255);
                assert!(excerpt.starts_with("not json"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn products_must_be_a_non_empty_valid_array() {
        let err = parse_completion(&completion(r#"{"items": []}"#, "stop")).expect_err("missing");
        assert!(matches!(err, GenerationError::InvalidProducts(_)));

        let err = parse_completion(&completion(r#"{"products": {}}"#, "stop")).expect_err("object");
        assert!(matches!(err, GenerationError::InvalidProducts(_)));

        let err = parse_completion(&completion(r#"{"products": []}"#, "stop")).expect_err("empty");
        assert!(matches!(err, GenerationError::InvalidProducts(_)));

        let one_bad = json!({"products": [
            {"name": "Ok", "price": "1", "short_description": "s", "long_description": "l"},
            {"name": "No price", "short_description": "s", "long_description": "l"}
        ]});
        let err = parse_completion(&completion(&one_bad.to_string(), "stop")).expect_err("partial");
        assert!(matches!(err, GenerationError::InvalidProducts(ref m) if m.starts_with("product 1")));
    }

    #[tokio::test]
    async fn generate_posts_json_mode_request() {
        let http = Arc::new(ScriptedHttp::new().on_json(
            "/chat/completions",
            200,
            &chat_response(&products_json(1)),
        ));
        let generator = TextGenerator::new(http.clone(), OpenAiConfig::default(), "sk-test");
        let products = generator.generate(1, "Books", english()).await.expect("generate");
        assert_eq!(products.len(), 1);

        let requests = http.requests();
        assert_eq!(requests.len(), 1);
        let sent: Value = serde_json::from_slice(requests[0].body.as_deref().unwrap()).unwrap();
        assert_eq!(sent["model"], json!("gpt-4-turbo-preview"));
        assert_eq!(sent["response_format"], json!({"type": "json_object"}));
        assert_eq!(sent["max_tokens"], json!(2000));
        assert_eq!(sent["messages"].as_array().map(Vec::len), Some(2));
        assert!(
            requests[0]
                .headers
                .iter()
                .any(|(k, v)| k == "Authorization" && v == "Bearer sk-test")
        );
        assert_eq!(requests[0].timeout, Some(std::time::Duration::from_secs(60)));
    }

    #[tokio::test]
    async fn generate_surfaces_upstream_error_message() {
        let http = Arc::new(ScriptedHttp::new().on_json(
            "/chat/completions",
            401,
            &json!({"error": {"message": "Incorrect API key provided."}}),
        ));
        let generator = TextGenerator::new(http, OpenAiConfig::default(), "sk-bad");
        let err = generator
            .generate(1, "Books", english())
            .await
            .expect_err("401");
        assert_eq!(
            err.to_string(),
            "OpenAI API Error (HTTP 401): Incorrect API key provided."
        );
    }

    #[tokio::test]
    async fn generate_reports_transport_failures() {
        let http = Arc::new(ScriptedHttp::new().fail("/chat/completions", "connection reset"));
        let generator = TextGenerator::new(http, OpenAiConfig::default(), "sk-test");
        let err = generator
            .generate(1, "Books", english())
            .await
            .expect_err("transport");
        assert!(matches!(err, GenerationError::Transport(_)));
    }
}
