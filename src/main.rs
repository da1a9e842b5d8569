//! Sheet Import - spreadsheet/CSV to content repository import service.

mod assets;
mod config;
mod error;
mod importer;
mod nodes;
mod product;
mod progress;
mod repository;
mod sheet_loader;
mod sheet_parser;

use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use config::{ImportConfig, ServiceSettings};
use error::ImportError;
use importer::{ImportRequest, ImportSummary, Importer};
use progress::Progress;
use repository::SlingClient;
use sheet_loader::{HttpFetcher, SheetLoader, SheetSource};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    importer: Arc<Importer>,
    config: Arc<ImportConfig>,
    /// Held for the duration of a run; a second import is refused.
    in_flight: Arc<Mutex<()>>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "sheet_import=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ImportConfig::load_or_default(std::path::Path::new("configs/import.json"));
    let settings = ServiceSettings::from_env()?;
    info!("Repository: {}", settings.base_url);

    let client = reqwest::Client::new();
    let repository = SlingClient::new(client.clone(), &settings.base_url, &config.csrf_token_path)
        .with_authorization(settings.authorization.clone());
    let fetcher = HttpFetcher::new(client)
        .with_repository_auth(&settings.base_url, settings.authorization.clone());
    let loader = SheetLoader::new(Arc::new(fetcher), &settings.base_url);

    let state = AppState {
        importer: Arc::new(Importer::new(Arc::new(repository), loader, &config)),
        config: Arc::new(config),
        in_flight: Arc::new(Mutex::new(())),
    };

    let app = Router::new()
        .route("/health", get(health))
        .route("/config", get(get_config))
        .route("/import", post(start_import))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&settings.bind_addr).await?;
    info!("Server listening on http://{}", settings.bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint.
async fn health() -> &'static str {
    "ok"
}

/// Form defaults and repository layout.
async fn get_config(State(state): State<AppState>) -> Json<ImportConfig> {
    Json((*state.config).clone())
}

#[derive(Debug, Default, serde::Deserialize)]
struct ImportBody {
    spreadsheet_url: Option<String>,
    csv_path: Option<String>,
    file: Option<String>,
    image_folder_path: Option<String>,
}

/// Run an import and return its per-row results.
///
/// The run is detached from the request: a client that disconnects does not
/// stop it halfway through a row.
async fn start_import(
    State(state): State<AppState>,
    Json(body): Json<ImportBody>,
) -> Result<Json<ImportSummary>, (StatusCode, String)> {
    let request =
        build_request(&body, &state.config).map_err(|msg| (StatusCode::BAD_REQUEST, msg))?;

    let running = state.in_flight.clone().try_lock_owned().map_err(|_| {
        (
            StatusCode::CONFLICT,
            "An import is already running".to_string(),
        )
    })?;

    let importer = state.importer.clone();
    let run = tokio::spawn(async move {
        let _running = running;
        let (progress, mut events) = Progress::channel();
        let reporter = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                info!("{}", event);
            }
        });

        let outcome = importer.run(&request, &progress).await;
        drop(progress);
        let _ = reporter.await;
        outcome
    });

    let outcome = run.await.map_err(|e| {
        error!("Import task failed: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Import task failed".to_string(),
        )
    })?;

    let summary = outcome.map_err(|e| {
        error!("Import failed: {}", e);
        (status_for(&e), e.to_string())
    })?;

    info!(
        "Complete! ✓ {} ✗ {} (Total: {})",
        summary.success_count, summary.fail_count, summary.total
    );
    Ok(Json(summary))
}

// ============================================================================
// Helper functions
// ============================================================================

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Pick the source and staging folder for a request, falling back to the
/// configured defaults.
fn build_request(body: &ImportBody, config: &ImportConfig) -> Result<ImportRequest, String> {
    let source = if let Some(url) = non_blank(body.spreadsheet_url.as_deref()) {
        SheetSource::Spreadsheet(url)
    } else if let Some(path) = non_blank(body.csv_path.as_deref()) {
        SheetSource::CsvPath(path)
    } else if let Some(file) = non_blank(body.file.as_deref()) {
        SheetSource::LocalFile(PathBuf::from(file))
    } else if let Some(url) = non_blank(Some(&config.default_spreadsheet_url)) {
        SheetSource::Spreadsheet(url)
    } else {
        return Err("Please enter a Google Spreadsheet URL".to_string());
    };

    let image_folder = non_blank(body.image_folder_path.as_deref())
        .or_else(|| non_blank(Some(&config.default_image_folder_path)))
        .ok_or_else(|| "Please enter an Image Folder Path".to_string())?;

    Ok(ImportRequest {
        source,
        image_folder,
    })
}

fn status_for(err: &ImportError) -> StatusCode {
    match err {
        e if e.is_input_error() => StatusCode::BAD_REQUEST,
        ImportError::NoData | ImportError::Parse(_) => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::BAD_GATEWAY,
    }
}
