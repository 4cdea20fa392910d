//! Remote store speaking the S3 REST dialect over HTTP.
//!
//! Listing uses `ListObjectsV2` with a `/` delimiter and continuation tokens.
//! Authentication is an optional bearer token (S3-compatible gateways,
//! presigning proxies); request signing is left to the gateway.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::StorageError;
use crate::staging::StagedDir;
use crate::storage_traits::*;

/// Retry policy for transient HTTP failures (network errors, 5xx, 429).
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    fn delay_for_attempt(&self, attempt: usize) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1) as u32)
    }
}

pub struct S3LikeRemoteStore {
    endpoint: String,
    bucket: String,
    bearer_token: Option<String>,
    retry: RetryPolicy,
    client: Client,
}

impl S3LikeRemoteStore {
    pub fn new(endpoint: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            bucket: bucket.into(),
            bearer_token: None,
            retry: RetryPolicy::default(),
            client: Client::new(),
        }
    }

    #[must_use]
    pub fn with_bearer_token(mut self, token: Option<String>) -> Self {
        self.bearer_token = token.filter(|t| !t.is_empty());
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn bucket_url(&self) -> String {
        format!("{}/{}", self.endpoint, self.bucket)
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}", self.bucket_url(), key.trim_start_matches('/'))
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let req = self.client.request(method, url);
        match &self.bearer_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn send_with_retry<F>(&self, build: F) -> StorageResult<Response>
    where
        F: Fn() -> RequestBuilder + Send + Sync,
    {
        let mut attempt = 0usize;
        loop {
            attempt += 1;
            let outcome = build().send().await;
            let retryable = match &outcome {
                Ok(resp) => {
                    resp.status().is_server_error()
                        || resp.status() == StatusCode::TOO_MANY_REQUESTS
                }
                Err(e) => e.is_connect() || e.is_timeout(),
            };
            if !retryable || attempt >= self.retry.max_attempts {
                let resp = outcome?;
                if !resp.status().is_success() {
                    let status = resp.status();
                    let body = resp.text().await.unwrap_or_default();
                    return Err(StorageError::Remote(format!(
                        "{status}: {}",
                        body.chars().take(200).collect::<String>()
                    )));
                }
                return Ok(resp);
            }
            debug!(attempt, "retrying remote request");
            tokio::time::sleep(self.retry.delay_for_attempt(attempt)).await;
        }
    }

    /// One `ListObjectsV2` page.
    async fn list_page(
        &self,
        prefix: &str,
        delimiter: Option<&str>,
        token: Option<&str>,
    ) -> StorageResult<ListBucketResult> {
        let url = self.bucket_url();
        let mut query: Vec<(&str, &str)> = vec![("list-type", "2"), ("prefix", prefix)];
        if let Some(d) = delimiter {
            query.push(("delimiter", d));
        }
        if let Some(t) = token {
            query.push(("continuation-token", t));
        }
        let resp = self
            .send_with_retry(|| self.request(Method::GET, &url).query(&query))
            .await?;
        let body = resp.text().await?;
        parse_listing(&body)
    }

    /// Every object key below `prefix`, across pages.
    async fn list_keys(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let page = self.list_page(prefix, None, token.as_deref()).await?;
            keys.extend(page.contents.into_iter().map(|o| o.key));
            match (page.is_truncated, page.next_continuation_token) {
                (true, Some(next)) => token = Some(next),
                _ => break,
            }
        }
        Ok(keys)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListBucketResult {
    #[serde(default)]
    is_truncated: bool,
    #[serde(default)]
    next_continuation_token: Option<String>,
    #[serde(default)]
    contents: Vec<ObjectEntry>,
    #[serde(default)]
    common_prefixes: Vec<CommonPrefix>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ObjectEntry {
    key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CommonPrefix {
    prefix: String,
}

fn parse_listing(xml: &str) -> StorageResult<ListBucketResult> {
    Ok(quick_xml::de::from_str(xml)?)
}

#[async_trait]
impl RemoteStore for S3LikeRemoteStore {
    async fn list_folders(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let base = listing_prefix(prefix);
        let mut folders = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let page = self.list_page(&base, Some("/"), token.as_deref()).await?;
            folders.extend(page.common_prefixes.into_iter().filter_map(|p| {
                let name = p.prefix.strip_prefix(base.as_str())?.trim_end_matches('/');
                (!name.is_empty()).then(|| name.to_string())
            }));
            match (page.is_truncated, page.next_continuation_token) {
                (true, Some(next)) => token = Some(next),
                _ => break,
            }
        }
        folders.sort();
        folders.dedup();
        Ok(folders)
    }

    async fn fetch_folder(
        &self,
        prefix: &str,
        folder: &str,
        dest: &Path,
    ) -> StorageResult<FetchedFolder> {
        let key_prefix = folder_key(prefix, folder);
        let keys: Vec<String> = self
            .list_keys(&key_prefix)
            .await?
            .into_iter()
            .filter(|k| !k.ends_with('/'))
            .collect();
        if keys.is_empty() {
            return Err(StorageError::FolderNotFound {
                folder: folder.to_string(),
            });
        }

        let mut staged = StagedDir::new(dest)?;
        for key in &keys {
            let url = self.object_url(key);
            let resp = self
                .send_with_retry(|| self.request(Method::GET, &url))
                .await?;
            let bytes = resp.bytes().await?;
            let rel = key.strip_prefix(key_prefix.as_str()).unwrap_or(key);
            staged.write(rel, &bytes).await?;
        }
        let (path, files) = staged.commit()?;
        debug!(folder = %folder, files, "fetched folder from object store");
        Ok(FetchedFolder { path, files })
    }

    async fn move_folder(&self, folder: &str, archive_prefix: &str) -> StorageResult<usize> {
        let archive_prefix = archive_prefix.trim_matches('/');
        let keys = self.list_keys(&folder_key("", folder)).await?;
        let mut moved = 0usize;
        for key in keys {
            let new_key = format!("{archive_prefix}/{key}");
            let copy_source = format!("/{}/{}", self.bucket, key);
            let copy_url = self.object_url(&new_key);
            let copied = self
                .send_with_retry(|| {
                    self.request(Method::PUT, &copy_url)
                        .header("x-amz-copy-source", copy_source.as_str())
                })
                .await;
            if let Err(e) = copied {
                warn!(key = %key, error = %e, "copy to archive failed; object left in place");
                continue;
            }
            let delete_url = self.object_url(&key);
            if let Err(e) = self
                .send_with_retry(|| self.request(Method::DELETE, &delete_url))
                .await
            {
                warn!(key = %key, error = %e, "delete after archive copy failed");
                continue;
            }
            moved += 1;
        }
        Ok(moved)
    }
}
