mod assets;
mod catalog;
mod http;
mod importer;
mod metrics;
mod models;
mod openai;
mod product;
mod security;
mod settings;
mod store;
#[cfg(test)]
mod testing;
mod validate;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Extension, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use catalog::{GenerationCategory, Language};
use eyre::WrapErr;
use http::{HttpClient, ReqwestHttpClient};
use importer::{ImportErrorKind, Importer};
use models::{ApiError, ImportForm, ImportResult, Notice, NoticeLevel};
use openai::OpenAiConfig;
use security::{AdminAuth, AdminContext, require_admin};
use serde::Serialize;
use serde_json::json;
use settings::{SettingsError, SettingsStore, SettingsUpdate, SettingsView};
use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};
use store::{MemoryStore, ProductStore, StoreError, TargetCategory, WooConfig, WooStore};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};
use validate::{MAX_PRODUCTS, MIN_PRODUCTS};

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        error!(target: "importer.api", "server crashed: {err:?}");
    }
}

async fn run() -> eyre::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env();
    let settings = SettingsStore::load(&config.settings_path, config.env_api_key.clone())
        .await
        .wrap_err_with(|| format!("loading settings from {}", config.settings_path.display()))?;
    let state = AppState {
        http: Arc::new(ReqwestHttpClient::new()),
        store: build_store(&config),
        settings: Arc::new(settings),
        openai: config.openai.clone(),
        download_timeout: config.download_timeout,
    };
    let app = build_router(state, AdminAuth::from_env(), config.body_limit);

    let addr: SocketAddr = ([0, 0, 0, 0], config.port).into();
    info!(target: "importer.api", "listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .wrap_err_with(|| format!("binding {addr}"))?;
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

/// Process configuration read once at startup.
struct AppConfig {
    port: u16,
    body_limit: usize,
    settings_path: PathBuf,
    env_api_key: Option<String>,
    media_dir: Option<PathBuf>,
    download_timeout: Duration,
    openai: OpenAiConfig,
    woo: Option<WooConfig>,
    target_categories: Option<String>,
}

impl AppConfig {
    fn from_env() -> Self {
        Self {
            port: env_parse("PORT").unwrap_or(8000),
            body_limit: env_parse::<usize>("REQUEST_MAX_BYTES")
                .filter(|v| *v > 0)
                .unwrap_or(256 * 1024),
            settings_path: env_string("SETTINGS_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(settings::DEFAULT_SETTINGS_PATH)),
            env_api_key: env_string("OPENAI_API_KEY"),
            media_dir: env_string("MEDIA_DIR").map(PathBuf::from),
            download_timeout: env_parse::<u64>("IMAGE_DOWNLOAD_TIMEOUT_SECS")
                .filter(|v| *v > 0)
                .map(Duration::from_secs)
                .unwrap_or(assets::DEFAULT_DOWNLOAD_TIMEOUT),
            openai: OpenAiConfig::from_env(),
            woo: WooConfig::from_env(),
            target_categories: env_string("DEMO_TARGET_CATEGORIES"),
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_string(key).and_then(|v| v.parse().ok())
}

fn build_store(config: &AppConfig) -> Arc<dyn ProductStore> {
    if let Some(woo) = config.woo.clone() {
        info!(target: "importer.store", base_url = %woo.base_url, "using WooCommerce store");
        return Arc::new(WooStore::new(woo));
    }
    let mut store = match config.target_categories.as_deref() {
        Some(raw) => {
            let categories = MemoryStore::parse_categories(raw);
            if categories.is_empty() {
                MemoryStore::default()
            } else {
                MemoryStore::new(categories)
            }
        }
        None => MemoryStore::default(),
    };
    if let Some(dir) = &config.media_dir {
        store = store.with_media_dir(dir);
    }
    info!(target: "importer.store", "using in-memory store");
    Arc::new(store)
}

#[derive(Clone)]
struct AppState {
    http: Arc<dyn HttpClient>,
    store: Arc<dyn ProductStore>,
    settings: Arc<SettingsStore>,
    openai: OpenAiConfig,
    download_timeout: Duration,
}

fn build_router(state: AppState, auth: AdminAuth, body_limit: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_headers(Any)
        .allow_methods(Any)
        .allow_origin(Any);

    let protected = Router::new()
        .route("/import/options", get(import_options))
        .route("/imports", post(create_import))
        .route("/settings", get(get_settings).put(update_settings))
        .route_layer(middleware::from_fn_with_state(auth, require_admin));

    Router::new()
        .route("/health", get(health))
        .merge(protected)
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(DefaultBodyLimit::max(body_limit)),
        )
}

/// Health and readiness check.
///
/// - Method: `GET`
/// - Path: `/health`
/// - Auth: none
async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "demo-catalog-importer",
    }))
}

#[derive(Debug, Serialize)]
struct CountRange {
    min: u8,
    max: u8,
}

#[derive(Debug, Serialize)]
struct ImportOptions {
    api_key_configured: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    notice: Option<Notice>,
    generation_categories: Vec<GenerationCategory>,
    languages: &'static [Language],
    target_categories: Vec<TargetCategory>,
    product_count: CountRange,
}

/// Everything the import form offers.
///
/// - Method: `GET`
/// - Path: `/import/options`
/// - Auth: `Authorization: Bearer <key>` or `X-Admin-Key: <key>`
async fn import_options(State(state): State<AppState>) -> Result<Json<ImportOptions>, AppError> {
    metrics::inc_requests("/import/options");
    let settings = state.settings.snapshot().await;
    let registry = settings.registry();
    let api_key_configured = settings.api_key().is_some();
    let target_categories = state.store.target_categories().await?;
    Ok(Json(ImportOptions {
        api_key_configured,
        notice: (!api_key_configured).then(|| Notice {
            level: NoticeLevel::Warning,
            text: "Please enter your OpenAI API key in the Settings tab before importing products."
                .into(),
        }),
        generation_categories: registry.categories().to_vec(),
        languages: registry.languages(),
        target_categories,
        product_count: CountRange {
            min: MIN_PRODUCTS,
            max: MAX_PRODUCTS,
        },
    }))
}

#[derive(Debug, Serialize)]
struct ImportResponse {
    result: ImportResult,
    notice: Notice,
}

/// Generate and import a batch of demo products.
///
/// - Method: `POST`
/// - Path: `/imports`
/// - Body: `ImportForm`
/// - Response: `ImportResult` plus the notice shown to the operator. `400`
///   when the form is rejected, `502` when a later stage fails.
async fn create_import(
    State(state): State<AppState>,
    Extension(admin): Extension<AdminContext>,
    Json(form): Json<ImportForm>,
) -> Response {
    metrics::inc_requests("/imports");
    info!(
        target: "importer.api",
        admin = %admin.key_hint,
        count = %form.product_count,
        category = %form.generation_category,
        "import requested"
    );
    let settings = state.settings.snapshot().await;
    let importer = Importer::new(
        state.http.clone(),
        state.store.clone(),
        state.openai.clone(),
        settings,
    )
    .with_download_timeout(state.download_timeout);

    let result = importer.run(&form).await;
    let status = match result.error_kind {
        None => StatusCode::OK,
        Some(ImportErrorKind::Validation) => StatusCode::BAD_REQUEST,
        Some(_) => StatusCode::BAD_GATEWAY,
    };
    let notice = result.notice();
    (status, Json(ImportResponse { result, notice })).into_response()
}

/// Current settings with the API key masked.
async fn get_settings(State(state): State<AppState>) -> Json<SettingsView> {
    metrics::inc_requests("/settings");
    Json(state.settings.snapshot().await.view())
}

/// Replace the API key and/or the generation categories.
///
/// - Method: `PUT`
/// - Path: `/settings`
/// - Body: `SettingsUpdate`
async fn update_settings(
    State(state): State<AppState>,
    Extension(admin): Extension<AdminContext>,
    Json(update): Json<SettingsUpdate>,
) -> Result<Json<SettingsView>, AppError> {
    metrics::inc_requests("/settings:update");
    let saved = state.settings.update(&update).await?;
    info!(target: "importer.api", admin = %admin.key_hint, "settings updated");
    Ok(Json(saved.view()))
}

#[derive(Debug)]
enum AppError {
    Settings(SettingsError),
    Store(StoreError),
}

impl From<SettingsError> for AppError {
    fn from(value: SettingsError) -> Self {
        Self::Settings(value)
    }
}

impl From<StoreError> for AppError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, detail) = match self {
            AppError::Settings(err) if err.is_invalid_input() => {
                (StatusCode::BAD_REQUEST, "invalid_settings", err.to_string())
            }
            AppError::Settings(err) => {
                error!(target: "importer.api", error = %err, "settings write failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "settings_unavailable", err.to_string())
            }
            AppError::Store(err) => (StatusCode::BAD_GATEWAY, "store_unavailable", err.to_string()),
        };
        let payload = ApiError {
            error: code.to_string(),
            detail: Some(detail),
        };
        (status, Json(payload)).into_response()
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    let _ = fmt().with_env_filter(filter).try_init();
}
