use std::fmt;
use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use reqwest::{Request, Response, Url};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::{
    executor::{AttemptTag, Executor},
    log::{ErrEntry, ErrorLog},
    transport::{ReqwestTransport, Transport},
    ClientOptions, Error, FormValues, RequestDescriptor, Result,
};

#[derive(Clone)]
/// HTTP client that retries failed attempts and races concurrent `GET`s.
///
/// Clones share the transport, the error log and the last-success tag.
pub struct ResilientClient {
    transport: Arc<dyn Transport>,
    options: ClientOptions,
    log: Arc<ErrorLog>,
    last_success: Arc<Mutex<Option<AttemptTag>>>,
}

impl fmt::Debug for ResilientClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResilientClient")
            .field("options", &self.options)
            .field("log", &self.log)
            .finish_non_exhaustive()
    }
}

impl Default for ResilientClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ResilientClient {
    /// Creates a client over a default [`reqwest::Client`] with default options.
    pub fn new() -> Self {
        Self::with_transport(ReqwestTransport::default())
    }

    /// Creates a client over any [`Transport`].
    pub fn with_transport(transport: impl Transport + 'static) -> Self {
        Self {
            transport: Arc::new(transport),
            options: ClientOptions::default(),
            log: Arc::new(ErrorLog::new()),
            last_success: Arc::new(Mutex::new(None)),
        }
    }

    /// Creates a client over a configured [`reqwest::Client`].
    ///
    /// Timeouts, redirects, cookies, proxies and TLS are taken from it as is.
    pub fn with_http_client(http: reqwest::Client) -> Self {
        Self::with_transport(ReqwestTransport::new(http))
    }

    /// Applies retry, concurrency and logging options.
    pub fn with_options(mut self, opts: ClientOptions) -> Self {
        self.options = opts;
        self
    }

    /// Replaces the error log, e.g. with one that has sinks attached.
    pub fn with_error_log(mut self, log: ErrorLog) -> Self {
        self.log = Arc::new(log);
        self
    }

    /// Sends every failed attempt to `logger` while `log_retries` is set.
    ///
    /// The sink is attached to the shared log, so existing clones see it too.
    pub fn with_logger<F>(self, logger: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.log.set_logger(logger);
        self
    }

    /// Writes every failed attempt to `writer` while `log_retries` is set.
    ///
    /// The sink is attached to the shared log, so existing clones see it too.
    pub fn with_log_writer<W>(self, writer: W) -> Self
    where
        W: Write + Send + 'static,
    {
        self.log.set_writer(writer);
        self
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut ClientOptions {
        &mut self.options
    }

    /// Sends a built request with a single worker.
    ///
    /// The body must be in memory; a streaming body fails before any attempt.
    pub async fn execute(&self, request: Request) -> Result<Response> {
        let desc = RequestDescriptor::from_request(request)?;
        self.send(desc).await
    }

    /// Sends a `GET`, racing `concurrency` workers.
    pub async fn get(&self, url: &str) -> Result<Response> {
        self.send(RequestDescriptor::get(parse_url(url)?)).await
    }

    /// Sends a `HEAD`, racing `concurrency` workers.
    pub async fn head(&self, url: &str) -> Result<Response> {
        self.send(RequestDescriptor::head(parse_url(url)?)).await
    }

    /// Sends a `POST` with a single worker.
    pub async fn post<B>(&self, url: &str, content_type: &str, body: B) -> Result<Response>
    where
        B: Into<Bytes>,
    {
        let desc = RequestDescriptor::post(parse_url(url)?, content_type, body);
        self.send(desc).await
    }

    /// Buffers `body` fully, then behaves like [`ResilientClient::post`].
    ///
    /// A read failure is returned before any attempt.
    pub async fn post_reader<R>(&self, url: &str, content_type: &str, body: R) -> Result<Response>
    where
        R: AsyncRead + Unpin,
    {
        let url = parse_url(url)?;
        let body = read_body(body).await?;
        self.send(RequestDescriptor::post(url, content_type, body))
            .await
    }

    /// Sends url-encoded `form` as a `POST` with a single worker.
    pub async fn post_form(&self, url: &str, form: FormValues) -> Result<Response> {
        self.send(RequestDescriptor::post_form(parse_url(url)?, form))
            .await
    }

    /// Which worker and retry decided the most recent call.
    ///
    /// Shared by all clones; concurrent calls overwrite each other.
    pub fn last_success(&self) -> Option<AttemptTag> {
        *self
            .last_success
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Recorded failures, one line each:
    /// `<unix-seconds> <entry> [<method>] to <url> request-<n> retry-<n> error: <err>`.
    ///
    /// Empty unless `keep_log` is set.
    pub fn log_string(&self) -> String {
        self.log.render()
    }

    pub fn error_log(&self) -> Vec<ErrEntry> {
        self.log.entries()
    }

    pub fn clear_log(&self) {
        self.log.clear();
    }

    /// Runs a prepared descriptor.
    pub async fn send(&self, desc: RequestDescriptor) -> Result<Response> {
        let exec = Executor {
            transport: Arc::clone(&self.transport),
            opts: Arc::new(self.options.clone()),
            log: Arc::clone(&self.log),
        };
        let outcome = exec.run(desc).await?;
        *self
            .last_success
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(outcome.tag);
        outcome.result
    }
}

fn parse_url(url: &str) -> Result<Url> {
    Url::parse(url).map_err(|err| Error::InvalidUrl(format!("{url}: {err}")))
}

async fn read_body<R: AsyncRead + Unpin>(mut body: R) -> Result<Bytes> {
    let mut buf = Vec::new();
    body.read_to_end(&mut buf).await.map_err(Error::body_read)?;
    Ok(Bytes::from(buf))
}

/// [`ResilientClient::execute`] on a default client.
pub async fn execute(request: Request) -> Result<Response> {
    ResilientClient::new().execute(request).await
}

/// [`ResilientClient::get`] on a default client.
pub async fn get(url: &str) -> Result<Response> {
    ResilientClient::new().get(url).await
}

/// [`ResilientClient::head`] on a default client.
pub async fn head(url: &str) -> Result<Response> {
    ResilientClient::new().head(url).await
}

/// [`ResilientClient::post`] on a default client.
pub async fn post<B>(url: &str, content_type: &str, body: B) -> Result<Response>
where
    B: Into<Bytes>,
{
    ResilientClient::new().post(url, content_type, body).await
}

/// [`ResilientClient::post_form`] on a default client.
pub async fn post_form(url: &str, form: FormValues) -> Result<Response> {
    ResilientClient::new().post_form(url, form).await
}
