//! Import pipeline orchestrator.
//!
//! One run walks: acquire credential → resolve source → load → parse →
//! ensure shared folders → process rows → summarize. Only the first four
//! steps can abort the run; folder problems are warnings and row problems
//! are recorded in the row's result.

use crate::assets::{self, ImageMigration};
use crate::config::ImportConfig;
use crate::error::ImportError;
use crate::nodes::{self, RepositoryLayout};
use crate::product::ProductRow;
use crate::progress::{Progress, ProgressEvent};
use crate::repository::ContentRepository;
use crate::sheet_loader::{SheetLoader, SheetSource};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// What to import and where the staged images are.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRequest {
    pub source: SheetSource,
    /// Repository folder holding the images named in `product_image`.
    pub image_folder: String,
}

/// Outcome of one row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportResult {
    pub success: bool,
    pub path: String,
    pub product_title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// All row outcomes of a run, in sheet order.
#[derive(Debug, Clone, Serialize)]
pub struct ImportSummary {
    pub run_id: String,
    pub results: Vec<ImportResult>,
    pub success_count: usize,
    pub fail_count: usize,
    pub total: usize,
}

impl ImportSummary {
    pub fn from_results(run_id: String, results: Vec<ImportResult>) -> Self {
        let success_count = results.iter().filter(|r| r.success).count();
        let total = results.len();
        Self {
            run_id,
            results,
            success_count,
            fail_count: total - success_count,
            total,
        }
    }
}

pub struct Importer {
    repository: Arc<dyn ContentRepository>,
    loader: SheetLoader,
    layout: RepositoryLayout,
    default_category: String,
    row_delay: Duration,
}

impl Importer {
    pub fn new(
        repository: Arc<dyn ContentRepository>,
        loader: SheetLoader,
        config: &ImportConfig,
    ) -> Self {
        Self {
            repository,
            loader,
            layout: config.layout(),
            default_category: config.default_category.clone(),
            row_delay: config.row_delay(),
        }
    }

    /// Run one import. Returns `Err` only for run-level failures.
    pub async fn run(
        &self,
        request: &ImportRequest,
        progress: &Progress,
    ) -> Result<ImportSummary, ImportError> {
        let run_id = format!("imp_{}", Uuid::new_v4().simple());
        let span = info_span!("import", run_id = %run_id);
        self.run_inner(run_id, request, progress)
            .instrument(span)
            .await
    }

    async fn run_inner(
        &self,
        run_id: String,
        request: &ImportRequest,
        progress: &Progress,
    ) -> Result<ImportSummary, ImportError> {
        info!("=== Starting import from {} ===", request.source);
        let repo = self.repository.as_ref();

        let csrf = repo.csrf_token().await.map_err(|e| {
            error!("Cannot proceed without CSRF token: {}", e);
            ImportError::MissingCredential(e)
        })?;

        let source = self.loader.resolve(&request.source)?;
        progress.emit(ProgressEvent::Loading {
            message: source.loading_message(),
        });

        let data = self.loader.fetch(&source).await?;
        let rows = data.parse()?;
        if rows.is_empty() {
            return Err(ImportError::NoData);
        }

        let total = rows.len();
        debug!("Columns: {:?}", rows[0].columns().collect::<Vec<_>>());
        progress.emit(ProgressEvent::Loaded {
            message: format!("Loaded {} items", total),
            total,
        });

        let products: Vec<ProductRow> = rows
            .iter()
            .enumerate()
            .map(|(i, row)| ProductRow::from_record(i, row, &self.default_category))
            .collect();

        let staging = request.image_folder.trim_end_matches('/');
        self.ensure_shared_folders(&products, staging, &csrf).await;

        let results = self.process_rows(products, staging, &csrf, progress).await;
        let summary = ImportSummary::from_results(run_id, results);
        info!(
            "=== Summary: {}/{} successful ===",
            summary.success_count, summary.total
        );
        Ok(summary)
    }

    /// Ensure the staging `imported/` folder once and each distinct category
    /// once, in first-seen order. Failures are logged and skipped.
    async fn ensure_shared_folders(&self, products: &[ProductRow], staging: &str, csrf: &str) {
        let repo = self.repository.as_ref();

        match nodes::ensure_imported_folder(repo, staging, csrf).await {
            Ok(ensured) => debug!("Imported folder under {}: {:?}", staging, ensured),
            Err(e) => warn!("Failed to ensure imported folder under {}: {}", staging, e),
        }

        for category in distinct_categories(products) {
            info!("Ensuring category folders for: {}", category);
            match nodes::ensure_category_folders(repo, &self.layout, &category, csrf).await {
                Ok(folders) => debug!(
                    "Category {}: page {:?}, assets {:?}",
                    category, folders.page, folders.assets
                ),
                Err(e) => warn!("Failed to ensure folders for category {}: {}", category, e),
            }
        }
    }

    async fn process_rows(
        &self,
        products: Vec<ProductRow>,
        staging: &str,
        csrf: &str,
        progress: &Progress,
    ) -> Vec<ImportResult> {
        let repo = self.repository.as_ref();
        let total = products.len();
        let mut results = Vec::with_capacity(total);

        for mut product in products {
            let index = product.index + 1;
            info!("--- Processing {}/{} ---", index, total);
            info!("Category: {}, Name: {}", product.category, product.name);

            if let Some(image) = product.image().map(str::to_string) {
                match assets::migrate_image(repo, &self.layout, staging, &product.category, &image, csrf)
                    .await
                {
                    ImageMigration::Migrated {
                        destination,
                        archived,
                    } => {
                        debug!("Image migrated to {} (archived: {})", destination, archived);
                        product.set_image(destination);
                    }
                    ImageMigration::Kept { reason } => {
                        warn!("Continuing with original image path: {} ({})", image, reason)
                    }
                }
            }

            let path = self.layout.product_page(&product.category, &product.name);
            let result = match nodes::create_page_subtree(repo, &path, &product, csrf).await {
                Ok(()) => ImportResult {
                    success: true,
                    path: path.clone(),
                    product_title: product.display_title.clone(),
                    error: None,
                },
                Err(e) => {
                    error!("{} at {}: {}", e, e.path, e.source);
                    ImportResult {
                        success: false,
                        path: path.clone(),
                        product_title: product.display_title.clone(),
                        error: Some(e.to_string()),
                    }
                }
            };

            progress.emit(ProgressEvent::Item {
                index,
                total,
                product_title: result.product_title.clone(),
                success: result.success,
                path,
            });
            results.push(result);

            if index < total && !self.row_delay.is_zero() {
                tokio::time::sleep(self.row_delay).await;
            }
        }

        results
    }
}

/// Categories of `products`, deduplicated, in order of first appearance.
fn distinct_categories(products: &[ProductRow]) -> Vec<String> {
    let mut seen = HashSet::new();
    products
        .iter()
        .filter(|p| seen.insert(p.category.clone()))
        .map(|p| p.category.clone())
        .collect()
}
