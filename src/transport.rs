//! The raw HTTP capability the retry machinery drives.
//!
//! Everything transport-level (TLS, proxies, pooling, redirects, cookies,
//! timeouts) lives behind [`Transport`]; the retry layer only interprets the
//! returned response or error.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{header, Request, Response, Url};

use crate::{FormValues, Result};

/// Performs exactly one HTTP attempt per call.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends a fully built request.
    async fn execute(&self, request: Request) -> Result<Response>;

    async fn get(&self, url: Url) -> Result<Response>;

    async fn head(&self, url: Url) -> Result<Response>;

    async fn post(&self, url: Url, content_type: &str, body: Bytes) -> Result<Response>;

    /// Posts `form` url-encoded.
    async fn post_form(&self, url: Url, form: &FormValues) -> Result<Response>;
}

/// [`Transport`] backed by a [`reqwest::Client`].
#[derive(Clone, Default)]
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReqwestTransport").finish_non_exhaustive()
    }
}

impl ReqwestTransport {
    /// Uses an already configured client; redirects, cookies, proxies and
    /// TLS come from it unchanged.
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Creates a client whose every attempt is bounded by `timeout`.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http })
    }

    pub fn http_client(&self) -> &reqwest::Client {
        &self.http
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: Request) -> Result<Response> {
        Ok(self.http.execute(request).await?)
    }

    async fn get(&self, url: Url) -> Result<Response> {
        Ok(self.http.get(url).send().await?)
    }

    async fn head(&self, url: Url) -> Result<Response> {
        Ok(self.http.head(url).send().await?)
    }

    async fn post(&self, url: Url, content_type: &str, body: Bytes) -> Result<Response> {
        Ok(self
            .http
            .post(url)
            .header(header::CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await?)
    }

    async fn post_form(&self, url: Url, form: &FormValues) -> Result<Response> {
        Ok(self.http.post(url).form(&form.pairs()).send().await?)
    }
}
