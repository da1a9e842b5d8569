//! Node-level repository operations: idempotent folder ensures and the
//! ordered, non-idempotent page subtree creation.

use crate::error::RepositoryError;
use crate::product::ProductRow;
use crate::repository::{ContentRepository, NodeForm};
use std::fmt;
use thiserror::Error;
use tracing::{debug, error, info};

const PAGE: &str = "cq:Page";
const PAGE_CONTENT: &str = "cq:PageContent";
const UNSTRUCTURED: &str = "nt:unstructured";
const FOLDER: &str = "sling:Folder";

const PAGE_TEMPLATE: &str = "/libs/core/franklin/templates/page";
const PAGE_RESOURCE: &str = "core/franklin/components/page/v1/page";
const ROOT_RESOURCE: &str = "core/franklin/components/root/v1/root";
const SECTION_RESOURCE: &str = "core/franklin/components/section/v1/section";
const BLOCK_RESOURCE: &str = "core/franklin/components/block/v1/block";

const BLOCK_MODEL: &str = "product";
const BLOCK_NAME: &str = "Product";

/// Where pages and assets live in the repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryLayout {
    pub content_root: String,
    pub dam_root: String,
}

impl RepositoryLayout {
    pub fn category_page(&self, category: &str) -> String {
        format!("{}/{}", self.content_root, category)
    }

    pub fn category_assets(&self, category: &str) -> String {
        format!("{}/{}", self.dam_root, category)
    }

    pub fn product_page(&self, category: &str, name: &str) -> String {
        format!("{}/{}/{}", self.content_root, category, name)
    }

    pub fn asset_path(&self, category: &str, file: &str) -> String {
        format!("{}/{}/{}", self.dam_root, category, file)
    }
}

/// Outcome of an ensure operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ensured {
    AlreadyExists,
    Created,
}

/// The five levels of a product page, in creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubtreeStep {
    Page,
    Content,
    Root,
    Section,
    Block,
}

impl SubtreeStep {
    pub fn label(self) -> &'static str {
        match self {
            Self::Page => "cq:Page",
            Self::Content => "jcr:content",
            Self::Root => "root",
            Self::Section => "section",
            Self::Block => "block",
        }
    }

    /// Path segment of this level below its parent.
    fn segment(self) -> Option<&'static str> {
        match self {
            Self::Page => None,
            Self::Content => Some("jcr:content"),
            Self::Root => Some("root"),
            Self::Section => Some("section"),
            Self::Block => Some("block"),
        }
    }
}

impl fmt::Display for SubtreeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A subtree step failed; later steps were not attempted.
#[derive(Debug, Error)]
#[error("Failed to create {step}")]
pub struct SubtreeError {
    pub step: SubtreeStep,
    pub path: String,
    #[source]
    pub source: RepositoryError,
}

/// Path of every subtree level under `page`.
fn step_paths(page: &str) -> Vec<(SubtreeStep, String)> {
    let mut path = page.to_string();
    [
        SubtreeStep::Page,
        SubtreeStep::Content,
        SubtreeStep::Root,
        SubtreeStep::Section,
        SubtreeStep::Block,
    ]
    .into_iter()
    .map(|step| {
        if let Some(segment) = step.segment() {
            path = format!("{}/{}", path, segment);
        }
        (step, path.clone())
    })
    .collect()
}

fn structural_form(step: SubtreeStep, title: Option<&str>) -> NodeForm {
    match step {
        SubtreeStep::Page => NodeForm::primary_type(PAGE),
        SubtreeStep::Content => {
            let form = NodeForm::primary_type(PAGE_CONTENT)
                .with("sling:resourceType", PAGE_RESOURCE)
                .with("cq:template", PAGE_TEMPLATE);
            match title {
                Some(title) => form.with("jcr:title", title),
                None => form,
            }
        }
        SubtreeStep::Root => {
            NodeForm::primary_type(UNSTRUCTURED).with("sling:resourceType", ROOT_RESOURCE)
        }
        SubtreeStep::Section => {
            NodeForm::primary_type(UNSTRUCTURED).with("sling:resourceType", SECTION_RESOURCE)
        }
        SubtreeStep::Block => {
            NodeForm::primary_type(UNSTRUCTURED).with("sling:resourceType", BLOCK_RESOURCE)
        }
    }
}

/// Block form carrying the product's fields.
pub fn block_form(product: &ProductRow) -> NodeForm {
    let mut form = structural_form(SubtreeStep::Block, None)
        .with("model", BLOCK_MODEL)
        .with("name", BLOCK_NAME);
    for (key, value) in product.block_properties() {
        form.push(key, value);
    }
    if let Some(title) = &product.block_title {
        form.push("jcr:title", title.as_str());
    }
    form
}

/// Create every level of `page` down to and including `last`, in order,
/// stopping at the first failure.
async fn create_levels(
    repo: &dyn ContentRepository,
    page: &str,
    last: SubtreeStep,
    title: Option<&str>,
    block: Option<&NodeForm>,
    csrf: &str,
) -> Result<(), SubtreeError> {
    for (step, path) in step_paths(page) {
        let form = match (step, block) {
            (SubtreeStep::Block, Some(block)) => block.clone(),
            _ => structural_form(step, title),
        };

        if let Err(source) = repo.post_form(&path, &form, csrf).await {
            if let RepositoryError::Status { status, body, .. } = &source {
                error!("Failed to create {}: {} ({})", step, path, status);
                if step == SubtreeStep::Block {
                    error!("Response body: {}", body);
                }
            } else {
                error!("Error creating {} {}: {}", step, path, source);
            }
            return Err(SubtreeError { step, path, source });
        }
        debug!("{} created: {}", step, path);

        if step == last {
            break;
        }
    }
    Ok(())
}

/// Create the full product page: page, content, root, section, block.
///
/// Not idempotent and never rolled back; a failure leaves the levels created
/// so far in place.
pub async fn create_page_subtree(
    repo: &dyn ContentRepository,
    page: &str,
    product: &ProductRow,
    csrf: &str,
) -> Result<(), SubtreeError> {
    info!("Creating page structure: {}", page);
    let block = block_form(product);
    create_levels(
        repo,
        page,
        SubtreeStep::Block,
        product.page_title(),
        Some(&block),
        csrf,
    )
    .await?;
    info!("Complete page structure created: {}", page);
    Ok(())
}

/// Ensure the `imported/` folder under the staging folder.
pub async fn ensure_imported_folder(
    repo: &dyn ContentRepository,
    staging: &str,
    csrf: &str,
) -> Result<Ensured, RepositoryError> {
    let path = format!("{}/imported", staging);
    ensure_folder(repo, &path, csrf).await
}

async fn ensure_folder(
    repo: &dyn ContentRepository,
    path: &str,
    csrf: &str,
) -> Result<Ensured, RepositoryError> {
    if repo.exists(path).await? {
        debug!("Folder exists: {}", path);
        return Ok(Ensured::AlreadyExists);
    }
    repo.post_form(path, &NodeForm::primary_type(FOLDER), csrf)
        .await?;
    info!("Folder created: {}", path);
    Ok(Ensured::Created)
}

/// Result of ensuring a category's page and asset folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategoryFolders {
    pub page: Ensured,
    pub assets: Ensured,
}

/// Ensure the category page (page, content, root, section; titled with the
/// category) and the category asset folder. The asset folder is not attempted
/// if the page could not be created.
pub async fn ensure_category_folders(
    repo: &dyn ContentRepository,
    layout: &RepositoryLayout,
    category: &str,
    csrf: &str,
) -> Result<CategoryFolders, RepositoryError> {
    let page_path = layout.category_page(category);
    let page = if repo.exists(&page_path).await? {
        debug!("Content category exists: {}", page_path);
        Ensured::AlreadyExists
    } else {
        create_levels(
            repo,
            &page_path,
            SubtreeStep::Section,
            Some(category),
            None,
            csrf,
        )
        .await
        .map_err(|e| e.source)?;
        info!("Category page created: {}", page_path);
        Ensured::Created
    };

    let assets = ensure_folder(repo, &layout.category_assets(category), csrf).await?;
    Ok(CategoryFolders { page, assets })
}
