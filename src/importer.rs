use crate::assets::{AssetIngestor, DEFAULT_DOWNLOAD_TIMEOUT};
use crate::http::HttpClient;
use crate::models::{ImportForm, ImportResult, ImportedProduct, StageReport};
use crate::openai::{GenerationError, ImageGenerator, OpenAiConfig, TextGenerator};
use crate::product::{GeneratedProduct, clean_list, draft_from_generated};
use crate::settings::Settings;
use crate::store::{ProductId, ProductStore, StoreError};
use crate::validate::{ImportRequest, ValidationError, check_form};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::{future::Future, sync::Arc, time::Duration, time::Instant};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

/// Runs one import: validate, generate the batch, then create each product
/// and attach its image.
pub struct Importer {
    http: Arc<dyn HttpClient>,
    store: Arc<dyn ProductStore>,
    openai: OpenAiConfig,
    settings: Settings,
    download_timeout: Duration,
}

impl Importer {
    pub fn new(
        http: Arc<dyn HttpClient>,
        store: Arc<dyn ProductStore>,
        openai: OpenAiConfig,
        settings: Settings,
    ) -> Self {
        Self {
            http,
            store,
            openai,
            settings,
            download_timeout: DEFAULT_DOWNLOAD_TIMEOUT,
        }
    }

    pub fn with_download_timeout(mut self, timeout: Duration) -> Self {
        self.download_timeout = timeout;
        self
    }

    /// Never fails: errors end up in `ImportResult::message` together with
    /// whatever was imported before the failure.
    pub async fn run(&self, form: &ImportForm) -> ImportResult {
        let mut log = RunLog::start();
        match self.execute(form, &mut log).await {
            Ok(()) => log.finish(None),
            Err(err) => {
                warn!(
                    target: "importer.run",
                    run_id = %log.run_id,
                    stage = err.stage(),
                    kind = ?err.kind(),
                    imported = log.products.len(),
                    error = %err,
                    "import_failed"
                );
                log.finish(Some(err))
            }
        }
    }

    pub async fn try_run(&self, form: &ImportForm) -> Result<ImportResult, ImportError> {
        let mut log = RunLog::start();
        self.execute(form, &mut log).await?;
        Ok(log.finish(None))
    }

    async fn execute(&self, form: &ImportForm, log: &mut RunLog) -> Result<(), ImportError> {
        let request = self
            .capture_stage("validate", &mut log.stages, async {
                let registry = self.settings.registry();
                let checked = check_form(form, &registry, self.settings.api_key().is_some())
                    .map_err(ImportError::validation)?;
                // the store is only consulted once the form itself is valid
                let targets = self
                    .store
                    .target_categories()
                    .await
                    .map_err(|err| ImportError::store("validate", err))?;
                let request = checked.resolve(&targets).map_err(ImportError::validation)?;
                let output = json!({
                    "count": request.count(),
                    "generation_category": request.generation_category(),
                    "language": request.language().code,
                    "target_category_id": request.target_category_id(),
                });
                Ok::<_, ImportError>(StageOutcome::new(request, output))
            })
            .await?;
        info!(
            target: "importer.run",
            run_id = %log.run_id,
            count = request.count(),
            category = request.generation_category(),
            language = request.language().code,
            "import_started"
        );

        let api_key = self.settings.api_key().unwrap_or_default();
        let text = TextGenerator::new(self.http.clone(), self.openai.clone(), api_key);
        let mut products = self
            .capture_stage("generate_products", &mut log.stages, async {
                let products = text
                    .generate(
                        request.count(),
                        request.generation_category_name(),
                        request.language(),
                    )
                    .await
                    .map_err(ImportError::generation)?;
                let output = json!({
                    "received": products.len(),
                    "model": self.openai.text_model,
                });
                Ok::<_, ImportError>(StageOutcome::new(products, output))
            })
            .await?;

        let requested = usize::from(request.count());
        if products.len() > requested {
            warn!(
                target: "importer.run",
                run_id = %log.run_id,
                requested,
                received = products.len(),
                "extra_products_discarded"
            );
            products.truncate(requested);
        }

        let images = ImageGenerator::new(self.http.clone(), self.openai.clone(), api_key);
        let assets = AssetIngestor::new(self.http.clone(), self.store.clone())
            .with_download_timeout(self.download_timeout);

        for (index, product) in products.iter().enumerate() {
            let draft = draft_from_generated(product, request.target_category_id());
            let product_id = self
                .capture_stage("create_product", &mut log.stages, async {
                    let id = self
                        .store
                        .create_product(&draft)
                        .await
                        .map_err(|err| ImportError::store("create_product", err))?;
                    let output = json!({"index": index, "product_id": id, "name": draft.name});
                    Ok::<_, ImportError>(StageOutcome::new(id, output))
                })
                .await?;
            log.products.push(ImportedProduct {
                product_id: product_id.0,
                name: draft.name.clone(),
                image_attached: false,
            });

            let tags = clean_list(&product.tags);
            if !tags.is_empty()
                && let Err(err) = self.store.assign_tags(product_id, &tags).await
            {
                warn!(target: "importer.run", product_id = %product_id, error = %err, "tag_assignment_failed");
            }

            let attached = self
                .attach_image(&images, &assets, product, product_id, &request, &mut log.stages)
                .await;
            if attached && let Some(last) = log.products.last_mut() {
                last.image_attached = true;
            }
        }
        Ok(())
    }

    /// Image generation and ingestion for one product. Failures are logged
    /// and reported as `false`.
    async fn attach_image(
        &self,
        images: &ImageGenerator,
        assets: &AssetIngestor,
        product: &GeneratedProduct,
        product_id: ProductId,
        request: &ImportRequest,
        stages: &mut Vec<StageReport>,
    ) -> bool {
        let started = Instant::now();
        let generated = images
            .generate(
                &product.name,
                &product.short_description,
                request.target_category_name(),
            )
            .await;
        record_stage(
            stages,
            "generate_image",
            started,
            match &generated {
                Ok(_) => json!({"product_id": product_id, "ok": true}),
                Err(err) => json!({"product_id": product_id, "ok": false, "error": err.to_string()}),
            },
        );
        let image = match generated {
            Ok(image) => image,
            Err(err) => {
                warn!(target: "importer.openai", product_id = %product_id, error = %err, "image_generation_failed");
                return false;
            }
        };

        let started = Instant::now();
        let attached = assets.attach(image, product_id, &product.name).await;
        record_stage(
            stages,
            "attach_image",
            started,
            match &attached {
                Ok(media) => json!({"product_id": product_id, "media_id": media}),
                Err(err) => json!({"product_id": product_id, "error": err.to_string()}),
            },
        );
        match attached {
            Ok(_) => true,
            Err(err) => {
                warn!(target: "importer.assets", product_id = %product_id, error = %err, "image_attach_failed");
                false
            }
        }
    }

    async fn capture_stage<T, Fut>(
        &self,
        name: &'static str,
        stages: &mut Vec<StageReport>,
        fut: Fut,
    ) -> Result<T, ImportError>
    where
        Fut: Future<Output = Result<StageOutcome<T>, ImportError>>,
    {
        let started = Instant::now();
        let outcome = fut.await?;
        let elapsed_ms = started.elapsed().as_millis();
        crate::metrics::stage_elapsed(name, elapsed_ms);
        stages.push(StageReport::new(name, elapsed_ms, outcome.output));
        Ok(outcome.value)
    }
}

fn record_stage(stages: &mut Vec<StageReport>, name: &'static str, started: Instant, output: Value) {
    let elapsed_ms = started.elapsed().as_millis();
    crate::metrics::stage_elapsed(name, elapsed_ms);
    stages.push(StageReport::new(name, elapsed_ms, output));
}

struct RunLog {
    run_id: String,
    started_at: DateTime<Utc>,
    stages: Vec<StageReport>,
    products: Vec<ImportedProduct>,
}

impl RunLog {
    fn start() -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            stages: Vec::new(),
            products: Vec::new(),
        }
    }

    fn finish(self, error: Option<ImportError>) -> ImportResult {
        let imported_count = self.products.len();
        let image_success_count = self.products.iter().filter(|p| p.image_attached).count();
        crate::metrics::import_finished(error.is_none(), imported_count, image_success_count);
        ImportResult {
            success: error.is_none(),
            imported_count,
            image_success_count,
            message: error.as_ref().map(|err| err.detail().to_string()),
            error_kind: error.as_ref().map(ImportError::kind),
            failed_stage: error.as_ref().map(|err| err.stage().to_string()),
            run_id: self.run_id,
            started_at: self.started_at,
            finished_at: Utc::now(),
            products: self.products,
            stages: self.stages,
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("{stage}: {message}")]
pub struct ImportError {
    stage: &'static str,
    message: String,
    kind: ImportErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportErrorKind {
    Validation,
    UpstreamTransport,
    UpstreamApplication,
    ResponseFormat,
    Store,
}

impl ImportError {
    pub fn validation(err: ValidationError) -> Self {
        Self {
            stage: "validate",
            message: err.to_string(),
            kind: ImportErrorKind::Validation,
        }
    }

    pub fn generation(err: GenerationError) -> Self {
        let kind = match &err {
            GenerationError::Transport(_) => ImportErrorKind::UpstreamTransport,
            GenerationError::Api { .. }
            | GenerationError::Refusal(_)
            | GenerationError::Truncated
            | GenerationError::ContentFiltered => ImportErrorKind::UpstreamApplication,
            GenerationError::MissingContent
            | GenerationError::MalformedBody(_)
            | GenerationError::MalformedContent { .. }
            | GenerationError::InvalidProducts(_) => ImportErrorKind::ResponseFormat,
        };
        Self {
            stage: "generate_products",
            message: err.to_string(),
            kind,
        }
    }

    pub fn store(stage: &'static str, err: StoreError) -> Self {
        Self {
            stage,
            message: err.to_string(),
            kind: ImportErrorKind::Store,
        }
    }

    pub fn stage(&self) -> &'static str {
        self.stage
    }

    pub fn kind(&self) -> ImportErrorKind {
        self.kind
    }

    pub fn detail(&self) -> &str {
        &self.message
    }
}

#[derive(Debug)]
struct StageOutcome<T> {
    value: T,
    output: Value,
}

impl<T> StageOutcome<T> {
    fn new(value: T, output: Value) -> Self {
        Self { value, output }
    }
}
