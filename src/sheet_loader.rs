//! Resolves an import source to something fetchable and retrieves its data.
//!
//! Google Sheets are read through their CSV export endpoint (first sheet), CSV
//! paths are fetched from the repository host, and local files are read from
//! disk.

use crate::error::ImportError;
use crate::sheet_parser::{self, RowRecord};
use regex::Regex;
use reqwest::{Client, Url};
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

const SHEETS_BASE_URL: &str = "https://docs.google.com/spreadsheets/d";

const SHEET_SHARING_HINT: &str =
    "Make sure the sheet is published or shared with \"Anyone with the link can view\".";
const CSV_PATH_HINT: &str = "Check that the CSV path exists and is readable.";

fn sheet_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"/spreadsheets/d/([a-zA-Z0-9_-]+)").expect("sheet id pattern is valid")
    })
}

/// Extract the sheet id from a Google Sheets URL.
pub fn extract_sheet_id(url: &str) -> Option<String> {
    sheet_id_pattern()
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// CSV export endpoint for the first sheet (gid=0).
pub fn export_url(sheet_id: &str) -> String {
    format!("{}/{}/export?format=csv&gid=0", SHEETS_BASE_URL, sheet_id)
}

/// Where the rows of an import come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SheetSource {
    /// Google Sheets URL containing `/spreadsheets/d/{id}`.
    Spreadsheet(String),
    /// CSV resource, repository-relative or absolute URL.
    CsvPath(String),
    /// Local `.csv`/`.xlsx`/`.xlsm` file.
    LocalFile(PathBuf),
}

impl fmt::Display for SheetSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spreadsheet(url) => write!(f, "spreadsheet {}", url),
            Self::CsvPath(path) => write!(f, "CSV {}", path),
            Self::LocalFile(path) => write!(f, "file {}", path.display()),
        }
    }
}

/// A validated source, ready to be fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedSource {
    Spreadsheet { sheet_id: String, url: String },
    Csv { url: String },
    File { path: PathBuf },
}

impl ResolvedSource {
    pub fn loading_message(&self) -> String {
        match self {
            Self::Spreadsheet { .. } => "Loading Google Sheet...".to_string(),
            Self::Csv { url } => format!("Loading CSV {}...", url),
            Self::File { path } => format!("Loading {}...", path.display()),
        }
    }
}

/// Raw sheet content before parsing.
#[derive(Debug, Clone)]
pub enum SheetData {
    Csv(String),
    File { filename: String, bytes: Vec<u8> },
}

impl SheetData {
    pub fn parse(&self) -> Result<Vec<RowRecord>, ImportError> {
        let parsed = match self {
            Self::Csv(text) => sheet_parser::parse_csv(text),
            Self::File { filename, bytes } => sheet_parser::parse_file(filename, bytes),
        };
        parsed.map_err(|e| ImportError::Parse(format!("{:#}", e)))
    }
}

/// Body and status of a read-only GET.
#[derive(Debug, Clone)]
pub struct FetchedText {
    pub status: u16,
    pub body: String,
}

impl FetchedText {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Read-only HTTP access used to download sheet data.
#[async_trait::async_trait]
pub trait SheetFetcher: Send + Sync {
    async fn get(&self, url: &str) -> Result<FetchedText, ImportError>;
}

/// [`SheetFetcher`] backed by reqwest. Requests to the repository origin
/// (same scheme, host and port) carry the repository's `Authorization`
/// header; other origins get none.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    repository_auth: Option<(Url, String)>,
}

impl HttpFetcher {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            repository_auth: None,
        }
    }

    pub fn with_repository_auth(mut self, base_url: &str, authorization: Option<String>) -> Self {
        self.repository_auth = match (Url::parse(base_url), authorization) {
            (Ok(base), Some(value)) => Some((base, value)),
            (Err(e), Some(_)) => {
                warn!(
                    "Repository URL {} is invalid, CSV fetches stay unauthenticated: {}",
                    base_url, e
                );
                None
            }
            (_, None) => None,
        };
        self
    }

    /// Header value for `url`, only when it shares the repository origin.
    fn authorization_for(&self, url: &str) -> Option<&str> {
        let (base, value) = self.repository_auth.as_ref()?;
        let target = Url::parse(url).ok()?;
        (target.origin() == base.origin()).then_some(value.as_str())
    }
}

#[async_trait::async_trait]
impl SheetFetcher for HttpFetcher {
    async fn get(&self, url: &str) -> Result<FetchedText, ImportError> {
        let unreachable = |e: reqwest::Error| ImportError::SourceUnreachable {
            url: url.to_string(),
            reason: e.to_string(),
        };

        let mut request = self.client.get(url);
        if let Some(value) = self.authorization_for(url) {
            request = request.header("Authorization", value);
        }

        let resp = request.send().await.map_err(unreachable)?;
        let status = resp.status().as_u16();
        debug!("GET {} -> {}", url, status);
        let body = resp.text().await.map_err(unreachable)?;
        Ok(FetchedText { status, body })
    }
}

/// Resolves and loads import sources.
#[derive(Clone)]
pub struct SheetLoader {
    fetcher: Arc<dyn SheetFetcher>,
    base_url: String,
}

impl SheetLoader {
    /// `base_url` is the repository origin that relative CSV paths are
    /// fetched from.
    pub fn new(fetcher: Arc<dyn SheetFetcher>, base_url: impl Into<String>) -> Self {
        Self {
            fetcher,
            base_url: base_url.into(),
        }
    }

    /// Validate `source` without touching the network.
    pub fn resolve(&self, source: &SheetSource) -> Result<ResolvedSource, ImportError> {
        match source {
            SheetSource::Spreadsheet(url) => {
                let sheet_id = extract_sheet_id(url)
                    .ok_or_else(|| ImportError::InvalidSpreadsheetUrl(url.clone()))?;
                info!("Sheet ID extracted: {}", sheet_id);
                let url = export_url(&sheet_id);
                Ok(ResolvedSource::Spreadsheet { sheet_id, url })
            }
            SheetSource::CsvPath(path) => {
                let url = if path.starts_with("http://") || path.starts_with("https://") {
                    path.clone()
                } else {
                    format!(
                        "{}/{}",
                        self.base_url.trim_end_matches('/'),
                        path.trim_start_matches('/')
                    )
                };
                Ok(ResolvedSource::Csv { url })
            }
            SheetSource::LocalFile(path) => {
                let name = path.to_string_lossy();
                match sheet_parser::extension(&name).as_str() {
                    "csv" | "xlsx" | "xlsm" => Ok(ResolvedSource::File { path: path.clone() }),
                    _ => Err(ImportError::UnsupportedFile(name.into_owned())),
                }
            }
        }
    }

    /// Retrieve the raw content of a resolved source.
    pub async fn fetch(&self, source: &ResolvedSource) -> Result<SheetData, ImportError> {
        match source {
            ResolvedSource::Spreadsheet { sheet_id, url } => {
                info!("Loading Google Sheet: {}", sheet_id);
                let text = self.fetch_text(url, SHEET_SHARING_HINT).await?;
                info!("Google Sheet loaded successfully. Length: {}", text.len());
                Ok(SheetData::Csv(text))
            }
            ResolvedSource::Csv { url } => {
                let text = self.fetch_text(url, CSV_PATH_HINT).await?;
                info!("CSV loaded successfully. Length: {}", text.len());
                Ok(SheetData::Csv(text))
            }
            ResolvedSource::File { path } => {
                let bytes = tokio::fs::read(path)
                    .await
                    .map_err(|source| ImportError::LocalFile {
                        path: path.display().to_string(),
                        source,
                    })?;
                info!("Read {} ({} bytes)", path.display(), bytes.len());
                Ok(SheetData::File {
                    filename: path.to_string_lossy().into_owned(),
                    bytes,
                })
            }
        }
    }

    async fn fetch_text(&self, url: &str, hint: &str) -> Result<String, ImportError> {
        let fetched = self.fetcher.get(url).await?;
        if !fetched.is_success() {
            return Err(ImportError::SourceStatus {
                url: url.to_string(),
                status: fetched.status,
                hint: hint.to_string(),
            });
        }
        Ok(fetched.body)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::StaticFetcher;
    use super::*;

    const SHEET_URL: &str = "https://docs.google.com/spreadsheets/d/ABC123/edit#gid=0";

    fn loader(fetcher: StaticFetcher) -> SheetLoader {
        SheetLoader::new(Arc::new(fetcher), "http://localhost:4502")
    }

    #[test]
    fn test_authorization_only_for_repository_origin() {
        let fetcher = HttpFetcher::new(Client::new())
            .with_repository_auth("http://aem.corp:4502", Some("Basic abc".into()));

        assert_eq!(
            fetcher.authorization_for("http://aem.corp:4502/content/dam/goods.csv"),
            Some("Basic abc")
        );
        assert_eq!(fetcher.authorization_for("http://aem.corp:45021/x.csv"), None);
        assert_eq!(fetcher.authorization_for("http://aem.corp:4502.evil.io/x.csv"), None);
        assert_eq!(fetcher.authorization_for("https://aem.corp:4502/x.csv"), None);
        assert_eq!(
            fetcher.authorization_for("https://docs.google.com/spreadsheets/d/A/export"),
            None
        );
    }

    #[test]
    fn test_no_authorization_without_credentials() {
        let fetcher =
            HttpFetcher::new(Client::new()).with_repository_auth("http://aem.corp:4502", None);
        assert_eq!(fetcher.authorization_for("http://aem.corp:4502/x.csv"), None);
    }

    #[test]
    fn test_extract_sheet_id() {
        assert_eq!(extract_sheet_id(SHEET_URL).as_deref(), Some("ABC123"));
        assert_eq!(
            extract_sheet_id("https://docs.google.com/spreadsheets/d/1a-B_c/").as_deref(),
            Some("1a-B_c")
        );
        assert_eq!(extract_sheet_id("https://example.com/sheet.csv"), None);
    }

    #[test]
    fn test_export_url() {
        assert_eq!(
            export_url("ABC123"),
            "https://docs.google.com/spreadsheets/d/ABC123/export?format=csv&gid=0"
        );
    }

    #[test]
    fn test_resolve_invalid_spreadsheet_url() {
        let loader = loader(StaticFetcher::default());
        let err = loader
            .resolve(&SheetSource::Spreadsheet("https://example.com/x".into()))
            .unwrap_err();
        assert!(matches!(err, ImportError::InvalidSpreadsheetUrl(_)));
    }

    #[test]
    fn test_resolve_csv_path_against_base() {
        let loader = loader(StaticFetcher::default());
        let resolved = loader
            .resolve(&SheetSource::CsvPath("/content/dam/fma/csv/goods.csv".into()))
            .unwrap();
        assert_eq!(
            resolved,
            ResolvedSource::Csv {
                url: "http://localhost:4502/content/dam/fma/csv/goods.csv".into()
            }
        );

        let absolute = loader
            .resolve(&SheetSource::CsvPath("https://cdn.example.com/a.csv".into()))
            .unwrap();
        assert_eq!(
            absolute,
            ResolvedSource::Csv {
                url: "https://cdn.example.com/a.csv".into()
            }
        );
    }

    #[test]
    fn test_resolve_rejects_unknown_file_type() {
        let loader = loader(StaticFetcher::default());
        let err = loader
            .resolve(&SheetSource::LocalFile("goods.pdf".into()))
            .unwrap_err();
        assert!(matches!(err, ImportError::UnsupportedFile(_)));
    }

    #[tokio::test]
    async fn test_fetch_spreadsheet() {
        let fetcher = StaticFetcher::default().with(&export_url("ABC123"), 200, "name\nsake\n");
        let loader = loader(fetcher);
        let resolved = loader
            .resolve(&SheetSource::Spreadsheet(SHEET_URL.into()))
            .unwrap();
        let rows = loader.fetch(&resolved).await.unwrap().parse().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("name"), Some("sake"));
    }

    #[tokio::test]
    async fn test_fetch_non_success_carries_status_and_hint() {
        let fetcher = StaticFetcher::default().with(&export_url("ABC123"), 403, "denied");
        let loader = loader(fetcher);
        let resolved = loader
            .resolve(&SheetSource::Spreadsheet(SHEET_URL.into()))
            .unwrap();
        match loader.fetch(&resolved).await.unwrap_err() {
            ImportError::SourceStatus { status, hint, .. } => {
                assert_eq!(status, 403);
                assert!(hint.contains("Anyone with the link"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_fetch_missing_local_file() {
        let loader = loader(StaticFetcher::default());
        let resolved = loader
            .resolve(&SheetSource::LocalFile("/nonexistent/goods.csv".into()))
            .unwrap();
        let err = loader.fetch(&resolved).await.unwrap_err();
        assert!(matches!(err, ImportError::LocalFile { .. }));
    }
}
