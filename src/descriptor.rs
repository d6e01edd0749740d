use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use reqwest::{header::HeaderMap, Method, Request, Response, Url, Version};

use crate::{transport::Transport, Error, FormValues, Result};

/// The client entry point a call came through.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryPoint {
    Execute,
    Get,
    Head,
    Post,
    PostForm,
}

impl EntryPoint {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Execute => "Execute",
            Self::Get => "Get",
            Self::Head => "Head",
            Self::Post => "Post",
            Self::PostForm => "PostForm",
        }
    }
}

impl fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request parts replayed on every attempt of a generic call.
#[derive(Clone, Debug)]
pub(crate) struct RequestParts {
    headers: HeaderMap,
    version: Version,
    timeout: Option<Duration>,
}

/// Immutable description of one logical call.
///
/// The body is captured once, so every attempt sends the same bytes.
#[derive(Clone, Debug)]
pub struct RequestDescriptor {
    entry: EntryPoint,
    method: Method,
    url: Url,
    body: Option<Bytes>,
    content_type: Option<String>,
    form: Option<FormValues>,
    parts: Option<RequestParts>,
}

impl RequestDescriptor {
    fn new(entry: EntryPoint, method: Method, url: Url) -> Self {
        Self {
            entry,
            method,
            url,
            body: None,
            content_type: None,
            form: None,
            parts: None,
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(EntryPoint::Get, Method::GET, url)
    }

    pub fn head(url: Url) -> Self {
        Self::new(EntryPoint::Head, Method::HEAD, url)
    }

    pub fn post(url: Url, content_type: impl Into<String>, body: impl Into<Bytes>) -> Self {
        let mut desc = Self::new(EntryPoint::Post, Method::POST, url);
        desc.content_type = Some(content_type.into());
        desc.body = Some(body.into());
        desc
    }

    pub fn post_form(url: Url, form: FormValues) -> Self {
        let mut desc = Self::new(EntryPoint::PostForm, Method::POST, url);
        desc.form = Some(form);
        desc
    }

    /// Captures a built request.
    ///
    /// A streaming body cannot be replayed and is rejected as a body-read
    /// error before any attempt is made.
    pub fn from_request(request: Request) -> Result<Self> {
        let body = match request.body() {
            None => None,
            Some(body) => match body.as_bytes() {
                Some(bytes) => Some(Bytes::copy_from_slice(bytes)),
                None => {
                    return Err(Error::body_read(std::io::Error::other(
                        "streaming request body cannot be buffered",
                    )))
                }
            },
        };

        let mut desc = Self::new(
            EntryPoint::Execute,
            request.method().clone(),
            request.url().clone(),
        );
        desc.body = body;
        desc.parts = Some(RequestParts {
            headers: request.headers().clone(),
            version: request.version(),
            timeout: request.timeout().copied(),
        });
        Ok(desc)
    }

    pub fn entry(&self) -> EntryPoint {
        self.entry
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn form(&self) -> Option<&FormValues> {
        self.form.as_ref()
    }

    /// Only `GET` and `HEAD` are safe to send more than once at a time.
    pub fn is_idempotent(&self) -> bool {
        matches!(self.entry, EntryPoint::Get | EntryPoint::Head)
    }

    /// Number of workers to run for `configured` concurrency.
    pub fn effective_concurrency(&self, configured: usize) -> usize {
        if self.is_idempotent() {
            configured.max(1)
        } else {
            1
        }
    }

    /// Performs one attempt with a fresh copy of the captured body.
    pub(crate) async fn dispatch(&self, transport: &dyn Transport) -> Result<Response> {
        match self.entry {
            EntryPoint::Execute => transport.execute(self.rehydrate()).await,
            EntryPoint::Get => transport.get(self.url.clone()).await,
            EntryPoint::Head => transport.head(self.url.clone()).await,
            EntryPoint::Post => {
                let content_type = self.content_type.as_deref().unwrap_or_default();
                let body = self.body.clone().unwrap_or_default();
                transport.post(self.url.clone(), content_type, body).await
            }
            EntryPoint::PostForm => {
                let empty = FormValues::new();
                let form = self.form.as_ref().unwrap_or(&empty);
                transport.post_form(self.url.clone(), form).await
            }
        }
    }

    fn rehydrate(&self) -> Request {
        let mut request = Request::new(self.method.clone(), self.url.clone());
        if let Some(parts) = &self.parts {
            *request.headers_mut() = parts.headers.clone();
            *request.version_mut() = parts.version;
            *request.timeout_mut() = parts.timeout;
        }
        if let Some(body) = &self.body {
            *request.body_mut() = Some(body.clone().into());
        }
        request
    }
}
