//! Azure Blob Storage backend over the plain REST API.
//!
//! Authentication is a container-scoped SAS token appended to every request.
//! References handed back to the pipeline are blob URLs *without* the token,
//! so manifests never leak credentials.

use super::{validate_name, ArtifactStore};
use crate::error::StorageError;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{StatusCode, Url};
use std::fmt;
use std::time::Duration;
use tracing::debug;

const API_VERSION: &str = "2021-08-06";

static BLOB_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<Blob>.*?<Name>(.*?)</Name>").expect("valid regex"));
static NEXT_MARKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<NextMarker>(.*?)</NextMarker>").expect("valid regex"));

/// Connection settings for one blob container.
#[derive(Clone)]
pub struct AzureBlobConfig {
    /// e.g. `https://account.blob.core.windows.net/container`
    pub container_url: String,
    /// SAS token with read/write/list rights, with or without leading `?`.
    pub sas_token: String,
    pub timeout_secs: u64,
}

impl fmt::Debug for AzureBlobConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureBlobConfig")
            .field("container_url", &self.container_url)
            .field("sas_token", &"<redacted>")
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl AzureBlobConfig {
    pub fn new(container_url: impl Into<String>, sas_token: impl Into<String>) -> Self {
        Self {
            container_url: container_url.into(),
            sas_token: sas_token.into(),
            timeout_secs: 120,
        }
    }
}

/// An [`ArtifactStore`] backed by one Azure Blob container.
#[derive(Debug, Clone)]
pub struct AzureBlobStore {
    container: Url,
    sas: String,
    client: reqwest::Client,
}

impl AzureBlobStore {
    pub fn new(config: AzureBlobConfig) -> Result<Self, StorageError> {
        let trimmed = config.container_url.trim_end_matches('/');
        let container = Url::parse(trimmed).map_err(|e| StorageError::Http {
            name: config.container_url.clone(),
            reason: format!("invalid container URL: {e}"),
        })?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| StorageError::Http {
                name: config.container_url.clone(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            container,
            sas: config.sas_token.trim_start_matches('?').to_string(),
            client,
        })
    }

    /// Public URL of `name`, without the SAS token.
    pub fn blob_url(&self, name: &str) -> Url {
        let mut url = self.container.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.extend(name.split('/'));
        }
        url
    }

    fn signed(&self, mut url: Url) -> Url {
        if !self.sas.is_empty() {
            let query = match url.query() {
                Some(q) if !q.is_empty() => format!("{q}&{}", self.sas),
                _ => self.sas.clone(),
            };
            url.set_query(Some(&query));
        }
        url
    }

    fn transport(name: &str, e: reqwest::Error) -> StorageError {
        StorageError::Http {
            name: name.to_string(),
            reason: e.to_string(),
        }
    }

    async fn status_error(name: &str, response: reqwest::Response) -> StorageError {
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return StorageError::NotFound {
                name: name.to_string(),
            };
        }
        let body = response.text().await.unwrap_or_default();
        StorageError::Status {
            name: name.to_string(),
            status: status.as_u16(),
            body: body.chars().take(500).collect(),
        }
    }
}

#[async_trait]
impl ArtifactStore for AzureBlobStore {
    async fn put(&self, name: &str, bytes: Vec<u8>, content_type: &str) -> Result<String, StorageError> {
        validate_name(name)?;
        let url = self.blob_url(name);
        let len = bytes.len();

        let response = self
            .client
            .put(self.signed(url.clone()))
            .header("x-ms-blob-type", "BlockBlob")
            .header("x-ms-version", API_VERSION)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await
            .map_err(|e| Self::transport(name, e))?;

        if !response.status().is_success() {
            return Err(Self::status_error(name, response).await);
        }
        debug!(artifact = name, bytes = len, "Uploaded blob");
        Ok(url.to_string())
    }

    async fn get(&self, name: &str) -> Result<Vec<u8>, StorageError> {
        validate_name(name)?;
        let response = self
            .client
            .get(self.signed(self.blob_url(name)))
            .header("x-ms-version", API_VERSION)
            .send()
            .await
            .map_err(|e| Self::transport(name, e))?;

        if !response.status().is_success() {
            return Err(Self::status_error(name, response).await);
        }
        let bytes = response.bytes().await.map_err(|e| Self::transport(name, e))?;
        Ok(bytes.to_vec())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let mut names = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let mut url = self.container.clone();
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("restype", "container");
                query.append_pair("comp", "list");
                if !prefix.is_empty() {
                    query.append_pair("prefix", prefix);
                }
                if let Some(m) = &marker {
                    query.append_pair("marker", m);
                }
            }

            let response = self
                .client
                .get(self.signed(url))
                .header("x-ms-version", API_VERSION)
                .send()
                .await
                .map_err(|e| Self::transport(prefix, e))?;
            if !response.status().is_success() {
                return Err(Self::status_error(prefix, response).await);
            }
            let body = response.text().await.map_err(|e| Self::transport(prefix, e))?;

            let page = parse_list_page(&body);
            names.extend(page.names);
            match page.next_marker {
                Some(m) => marker = Some(m),
                None => break,
            }
        }

        Ok(names)
    }

    fn location(&self) -> String {
        self.container.to_string()
    }
}

/// One page of a `List Blobs` response.
#[derive(Debug, Default, PartialEq, Eq)]
struct ListPage {
    names: Vec<String>,
    next_marker: Option<String>,
}

fn parse_list_page(xml: &str) -> ListPage {
    let names = BLOB_NAME_RE
        .captures_iter(xml)
        .map(|c| unescape_xml(&c[1]))
        .collect();
    let next_marker = NEXT_MARKER_RE
        .captures(xml)
        .map(|c| unescape_xml(&c[1]))
        .filter(|m| !m.is_empty());
    ListPage { names, next_marker }
}

fn unescape_xml(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
