//! Content repository client: metadata reads and form-encoded Sling POSTs.

use crate::error::RepositoryError;
use reqwest::{Client, Method, RequestBuilder, Url};
use serde::Deserialize;
use tracing::debug;

/// Ordered form body for a node POST. Field order is preserved on the wire,
/// which is the order the repository stores properties in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeForm {
    pairs: Vec<(String, String)>,
}

impl NodeForm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Form starting with `jcr:primaryType`.
    pub fn primary_type(node_type: &str) -> Self {
        Self::new().with("jcr:primaryType", node_type)
    }

    /// Move/copy directive for the node the form is posted to.
    pub fn operation(op: &str, dest: &str) -> Self {
        Self::new()
            .with(":operation", op)
            .with(":dest", dest)
            .with(":replace", "true")
            .with("_charset_", "utf-8")
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.push(key, value);
        self
    }

    pub fn push(&mut self, key: &str, value: impl Into<String>) {
        self.pairs.push((key.to_string(), value.into()));
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn keys(&self) -> Vec<&str> {
        self.pairs.iter().map(|(k, _)| k.as_str()).collect()
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }
}

/// Transport to a hierarchical content repository.
#[async_trait::async_trait]
pub trait ContentRepository: Send + Sync {
    /// Fetch a fresh CSRF token.
    async fn csrf_token(&self) -> Result<String, RepositoryError>;

    /// Whether `path` resolves. Any non-success status counts as missing.
    async fn exists(&self, path: &str) -> Result<bool, RepositoryError>;

    /// POST `form` to `path` with the CSRF token attached.
    async fn post_form(&self, path: &str, form: &NodeForm, csrf: &str)
        -> Result<(), RepositoryError>;

    /// Copy `src` to `dest`, overwriting.
    async fn copy_node(&self, src: &str, dest: &str, csrf: &str) -> Result<(), RepositoryError> {
        self.post_form(src, &NodeForm::operation("copy", dest), csrf)
            .await
    }

    /// Move `src` to `dest`, overwriting.
    async fn move_node(&self, src: &str, dest: &str, csrf: &str) -> Result<(), RepositoryError> {
        self.post_form(src, &NodeForm::operation("move", dest), csrf)
            .await
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
}

/// [`ContentRepository`] over the Sling POST servlet.
#[derive(Clone)]
pub struct SlingClient {
    client: Client,
    base_url: String,
    authorization: Option<String>,
    csrf_token_path: String,
}

impl SlingClient {
    pub fn new(client: Client, base_url: impl Into<String>, csrf_token_path: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            authorization: None,
            csrf_token_path: csrf_token_path.into(),
        }
    }

    /// Opaque `Authorization` header value sent with every request.
    pub fn with_authorization(mut self, authorization: Option<String>) -> Self {
        self.authorization = authorization.filter(|v| !v.is_empty());
        self
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, RepositoryError> {
        let url = resource_url(&self.base_url, path)?;
        let builder = self.client.request(method, url);
        Ok(match &self.authorization {
            Some(value) => builder.header("Authorization", value),
            None => builder,
        })
    }

    fn transport(path: &str) -> impl FnOnce(reqwest::Error) -> RepositoryError + '_ {
        move |source| RepositoryError::Transport {
            path: path.to_string(),
            source,
        }
    }
}

/// `{base}{path}` with every path segment percent-encoded, so node names
/// containing `#` or `?` stay part of the path.
fn resource_url(base: &str, path: &str) -> Result<Url, RepositoryError> {
    let invalid = |reason: String| RepositoryError::InvalidUrl {
        path: path.to_string(),
        reason,
    };
    let mut url = Url::parse(base).map_err(|e| invalid(e.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| invalid(format!("{} cannot be a base URL", base)))?
        .pop_if_empty()
        .extend(path.split('/').filter(|segment| !segment.is_empty()));
    Ok(url)
}

#[async_trait::async_trait]
impl ContentRepository for SlingClient {
    async fn csrf_token(&self) -> Result<String, RepositoryError> {
        let path = self.csrf_token_path.as_str();
        let resp = self
            .request(Method::GET, path)?
            .send()
            .await
            .map_err(Self::transport(path))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(RepositoryError::Status {
                path: path.to_string(),
                status,
                body,
            });
        }

        let token: TokenResponse = resp.json().await.map_err(Self::transport(path))?;
        match token.token {
            Some(token) if !token.is_empty() => {
                debug!("CSRF token obtained");
                Ok(token)
            }
            _ => Err(RepositoryError::EmptyToken),
        }
    }

    async fn exists(&self, path: &str) -> Result<bool, RepositoryError> {
        let metadata = format!("{}.json", path);
        let resp = self
            .request(Method::GET, &metadata)?
            .send()
            .await
            .map_err(Self::transport(path))?;

        debug!("GET {} -> {}", metadata, resp.status());
        Ok(resp.status().is_success())
    }

    async fn post_form(
        &self,
        path: &str,
        form: &NodeForm,
        csrf: &str,
    ) -> Result<(), RepositoryError> {
        let resp = self
            .request(Method::POST, path)?
            .header("CSRF-Token", csrf)
            .form(form.pairs())
            .send()
            .await
            .map_err(Self::transport(path))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(RepositoryError::Status {
                path: path.to_string(),
                status,
                body,
            });
        }

        let kind = form
            .get("jcr:primaryType")
            .or_else(|| form.get(":operation"))
            .unwrap_or("-");
        debug!("POST {} [{}] {:?}", path, kind, form.keys());
        Ok(())
    }
}
