use crate::http::{HttpClient, HttpError, HttpRequest};
use crate::openai::{OpenAiConfig, upstream_message};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("image request failed: {0}")]
    Transport(#[from] HttpError),
    #[error("image API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },
    #[error("invalid image response: {0}")]
    MalformedBody(String),
    #[error("no image in response")]
    EmptyResult,
}

/// Where the generated image can be fetched from. URLs expire quickly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeneratedImage {
    Url(String),
    Inline(Vec<u8>),
}

#[derive(Debug, Serialize)]
struct ImageRequest<'a> {
    model: &'a str,
    prompt: String,
    n: u8,
    size: &'static str,
    quality: &'static str,
    response_format: &'static str,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    #[serde(default)]
    data: Vec<ImageDatum>,
}

#[derive(Debug, Deserialize)]
struct ImageDatum {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    b64_json: Option<String>,
}

pub struct ImageGenerator {
    http: Arc<dyn HttpClient>,
    config: OpenAiConfig,
    api_key: String,
}

impl ImageGenerator {
    pub fn new(http: Arc<dyn HttpClient>, config: OpenAiConfig, api_key: impl Into<String>) -> Self {
        Self {
            http,
            config,
            api_key: api_key.into(),
        }
    }

    pub async fn generate(
        &self,
        product_name: &str,
        short_description: &str,
        category_name: &str,
    ) -> Result<GeneratedImage, ImageError> {
        let body = ImageRequest {
            model: &self.config.image_model,
            prompt: build_prompt(product_name, short_description, category_name),
            n: 1,
            size: "1024x1024",
            quality: "hd",
            response_format: "url",
        };
        let request = HttpRequest::post_json(
            format!("{}/images/generations", self.config.base_url),
            &body,
        )?
        .bearer_auth(&self.api_key)
        .timeout(self.config.timeout);

        let response = self.http.send(request).await?;
        if response.status != 200 {
            return Err(ImageError::Api {
                status: response.status,
                message: upstream_message(&response.body),
            });
        }
        let parsed: ImageResponse = response
            .json()
            .map_err(|err| ImageError::MalformedBody(err.to_string()))?;
        let datum = parsed.data.into_iter().next().ok_or(ImageError::EmptyResult)?;

        if let Some(url) = datum.url.filter(|u| !u.trim().is_empty()) {
            return Ok(GeneratedImage::Url(url));
        }
        match datum.b64_json {
            Some(encoded) if !encoded.trim().is_empty() => BASE64
                .decode(encoded.trim())
                .map(GeneratedImage::Inline)
                .map_err(|err| ImageError::MalformedBody(err.to_string())),
            _ => Err(ImageError::EmptyResult),
        }
    }
}

pub fn build_prompt(product_name: &str, short_description: &str, category_name: &str) -> String {
    format!(
        "A professional product photo of {}, from the {} category. {}. Style: Professional e-commerce white background photography, high resolution, product-focused.",
        product_name.trim(),
        category_name.trim(),
        short_description.trim().trim_end_matches('.')
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedHttp, image_response};
    use serde_json::{Value, json};

    fn generator(http: Arc<ScriptedHttp>) -> ImageGenerator {
        ImageGenerator::new(http, OpenAiConfig::default(), "sk-test")
    }

    #[test]
    fn prompt_includes_product_and_category() {
        let prompt = build_prompt("Desk Lamp", "LED desk lamp.", "Electronics");
        assert_eq!(
            prompt,
            "A professional product photo of Desk Lamp, from the Electronics category. LED desk lamp. Style: Professional e-commerce white background photography, high resolution, product-focused."
        );
    }

    #[tokio::test]
    async fn returns_url_and_sends_fixed_parameters() {
        let http = Arc::new(ScriptedHttp::new().on_json(
            "/images/generations",
            200,
            &image_response("https://cdn.example.com/img.png"),
        ));
        let image = generator(http.clone())
            .generate("Lamp", "A lamp", "Electronics")
            .await
            .expect("image");
        assert_eq!(image, GeneratedImage::Url("https://cdn.example.com/img.png".into()));

        let sent: Value =
            serde_json::from_slice(http.requests()[0].body.as_deref().unwrap()).unwrap();
        assert_eq!(sent["model"], json!("dall-e-3"));
        assert_eq!(sent["n"], json!(1));
        assert_eq!(sent["size"], json!("1024x1024"));
        assert_eq!(sent["quality"], json!("hd"));
        assert_eq!(sent["response_format"], json!("url"));
    }

    #[tokio::test]
    async fn decodes_inline_payloads() {
        let http = Arc::new(ScriptedHttp::new().on_json(
            "/images/generations",
            200,
            &json!({"data": [{"b64_json": "aGVsbG8="}]}),
        ));
        let image = generator(http)
            .generate("Lamp", "A lamp", "Electronics")
            .await
            .expect("image");
        assert_eq!(image, GeneratedImage::Inline(b"hello".to_vec()));
    }

    #[tokio::test]
    async fn empty_data_is_an_error() {
        let http = Arc::new(ScriptedHttp::new().on_json(
            "/images/generations",
            200,
            &json!({"data": []}),
        ));
        let err = generator(http)
            .generate("Lamp", "A lamp", "Electronics")
            .await
            .expect_err("empty");
        assert!(matches!(err, ImageError::EmptyResult));
    }

    #[tokio::test]
    async fn upstream_errors_carry_message() {
        let http = Arc::new(ScriptedHttp::new().on_json(
            "/images/generations",
            400,
            &json!({"error": {"message": "Your request was rejected by the safety system."}}),
        ));
        let err = generator(http)
            .generate("Lamp", "A lamp", "Electronics")
            .await
            .expect_err("400");
        match err {
            ImageError::Api { status, message } => {
                assert_eq!(status, 400);
                assert!(message.contains("safety system"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
