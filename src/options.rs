use crate::{Backoff, Error, Result};

/// Default `strftime` pattern for timestamps handed to the retry logger.
pub const DEFAULT_LOG_TIME_FORMAT: &str = "%H:%M:%S%.6f";

/// Configures concurrency, retry and logging behavior.
#[derive(Clone, Debug)]
pub struct ClientOptions {
    /// Concurrent workers for `GET`/`HEAD` calls. Other verbs always use one.
    pub concurrency: usize,
    /// Attempts per worker. Zero means no attempt is made.
    pub max_retries: usize,
    /// Wait between a failed attempt and the next one.
    pub backoff: Backoff,
    /// Keep failed attempts in memory for [`crate::ResilientClient::log_string`].
    pub keep_log: bool,
    /// Send failed attempts to the configured logger and log writer.
    pub log_retries: bool,
    /// `strftime` pattern used when formatting log timestamps.
    pub log_time_format: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            concurrency: 1,
            max_retries: 3,
            backoff: Backoff::default(),
            keep_log: false,
            log_retries: true,
            log_time_format: DEFAULT_LOG_TIME_FORMAT.to_owned(),
        }
    }
}

impl ClientOptions {
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn keep_log(mut self, keep_log: bool) -> Self {
        self.keep_log = keep_log;
        self
    }

    pub fn log_retries(mut self, log_retries: bool) -> Self {
        self.log_retries = log_retries;
        self
    }

    pub fn log_time_format(mut self, format: impl Into<String>) -> Self {
        self.log_time_format = format.into();
        self
    }

    /// Builds options from environment variables.
    ///
    /// Reads, each optional:
    /// - `RESILIENT_HTTP_CONCURRENCY`
    /// - `RESILIENT_HTTP_MAX_RETRIES`
    /// - `RESILIENT_HTTP_BACKOFF` (`fixed`, `fixed:<ms>`, `linear`,
    ///   `exponential`, `linear-jitter`, `exponential-jitter`)
    /// - `RESILIENT_HTTP_KEEP_LOG`
    /// - `RESILIENT_HTTP_LOG_RETRIES`
    /// - `RESILIENT_HTTP_LOG_TIME_FORMAT`
    ///
    /// Unset variables keep their default value.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ClientOptions::from_env`] with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut opts = Self::default();
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };

        if let Some(value) = get("RESILIENT_HTTP_CONCURRENCY") {
            opts.concurrency = parse_count("RESILIENT_HTTP_CONCURRENCY", &value)?;
        }
        if let Some(value) = get("RESILIENT_HTTP_MAX_RETRIES") {
            opts.max_retries = parse_count("RESILIENT_HTTP_MAX_RETRIES", &value)?;
        }
        if let Some(value) = get("RESILIENT_HTTP_BACKOFF") {
            opts.backoff = value.parse()?;
        }
        if let Some(value) = get("RESILIENT_HTTP_KEEP_LOG") {
            opts.keep_log = parse_flag("RESILIENT_HTTP_KEEP_LOG", &value)?;
        }
        if let Some(value) = get("RESILIENT_HTTP_LOG_RETRIES") {
            opts.log_retries = parse_flag("RESILIENT_HTTP_LOG_RETRIES", &value)?;
        }
        if let Some(value) = get("RESILIENT_HTTP_LOG_TIME_FORMAT") {
            opts.log_time_format = value;
        }
        Ok(opts)
    }
}

fn parse_count(key: &str, value: &str) -> Result<usize> {
    value
        .parse::<usize>()
        .map_err(|err| Error::Config(format!("{key}='{value}': {err}")))
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::Config(format!("{key}='{value}' is not a boolean"))),
    }
}
