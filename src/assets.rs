//! Moves product images out of the staging folder into per-category asset
//! folders.

use crate::nodes::RepositoryLayout;
use crate::repository::ContentRepository;
use tracing::{info, warn};

/// What happened to a row's image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageMigration {
    /// Copied to `destination`. `archived` is false when the staging original
    /// could not be moved to `imported/`.
    Migrated { destination: String, archived: bool },
    /// Copy failed; the row keeps its original image value.
    Kept { reason: String },
}

/// Where a staging file is archived after a successful copy.
pub fn archive_path(staging: &str, source: &str) -> String {
    let file_name = source.rsplit('/').next().unwrap_or(source);
    format!("{}/imported/{}", staging, file_name)
}

/// Copy `{staging}/{image}` to the category asset folder, then move the
/// original into `{staging}/imported/`. Failures degrade, they never abort.
pub async fn migrate_image(
    repo: &dyn ContentRepository,
    layout: &RepositoryLayout,
    staging: &str,
    category: &str,
    image: &str,
    csrf: &str,
) -> ImageMigration {
    let source = format!("{}/{}", staging, image);
    let destination = layout.asset_path(category, image);

    info!("Copying image: {} -> {}", source, destination);
    if let Err(e) = repo.copy_node(&source, &destination, csrf).await {
        warn!("Image copy failed: {} (continues with original path)", e);
        return ImageMigration::Kept {
            reason: e.to_string(),
        };
    }

    let archive = archive_path(staging, &source);
    let archived = match repo.move_node(&source, &archive, csrf).await {
        Ok(()) => {
            info!("Original image moved to {}", archive);
            true
        }
        Err(e) => {
            warn!("Failed to move image to imported folder: {}", e);
            false
        }
    };

    ImageMigration::Migrated {
        destination,
        archived,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::testing::FakeRepository;

    const STAGING: &str = "/content/dam/fma/csv";
    const CSRF: &str = "csrf-123";

    fn layout() -> RepositoryLayout {
        RepositoryLayout {
            content_root: "/content/fma/goods".into(),
            dam_root: "/content/dam/fma/goods".into(),
        }
    }

    #[test]
    fn test_archive_path_uses_file_name() {
        assert_eq!(
            archive_path(STAGING, "/content/dam/fma/csv/sub/sake.png"),
            "/content/dam/fma/csv/imported/sake.png"
        );
    }

    #[tokio::test]
    async fn test_copy_then_move() {
        let repo = FakeRepository::new();
        let outcome = migrate_image(&repo, &layout(), STAGING, "omusubi", "sake.png", CSRF).await;
        assert_eq!(
            outcome,
            ImageMigration::Migrated {
                destination: "/content/dam/fma/goods/omusubi/sake.png".into(),
                archived: true,
            }
        );

        // Both operations target the staging original
        assert_eq!(
            repo.posted_paths(),
            vec!["/content/dam/fma/csv/sake.png", "/content/dam/fma/csv/sake.png"]
        );
        let calls = repo.calls();
        let ops: Vec<_> = calls
            .iter()
            .filter_map(|c| match c {
                crate::repository::testing::Call::Post { form, .. } => {
                    form.get(":operation").map(str::to_string)
                }
                _ => None,
            })
            .collect();
        assert_eq!(ops, vec!["copy", "move"]);
    }

    #[tokio::test]
    async fn test_move_failure_still_migrates() {
        let repo =
            FakeRepository::new().failing_operation("/content/dam/fma/csv/sake.png", "move");
        let outcome = migrate_image(&repo, &layout(), STAGING, "omusubi", "sake.png", CSRF).await;
        assert_eq!(
            outcome,
            ImageMigration::Migrated {
                destination: "/content/dam/fma/goods/omusubi/sake.png".into(),
                archived: false,
            }
        );
        assert_eq!(repo.posted_paths().len(), 2);
    }

    #[tokio::test]
    async fn test_copy_failure_keeps_original() {
        let repo = FakeRepository::new().failing_at("/content/dam/fma/csv/sake.png");
        let outcome = migrate_image(&repo, &layout(), STAGING, "omusubi", "sake.png", CSRF).await;
        assert!(matches!(outcome, ImageMigration::Kept { .. }));
        // No move after a failed copy
        assert_eq!(repo.posted_paths().len(), 1);
    }
}
