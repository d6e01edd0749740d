//! History of failed attempts.

use std::fmt;
use std::fmt::Write as _;
use std::io::Write;
use std::panic::Location;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Method;

use crate::{ClientOptions, EntryPoint, Error, RequestDescriptor};

/// Status code written in front of every raw log line.
pub const SEND_ERROR_CODE: u16 = 602;

/// Callback receiving one formatted line per failed attempt.
pub type Logger = Arc<dyn Fn(&str) + Send + Sync>;

type LogWriter = Arc<Mutex<Box<dyn Write + Send>>>;

/// One failed attempt.
#[derive(Clone, Debug)]
pub struct ErrEntry {
    pub time: DateTime<Utc>,
    pub entry: EntryPoint,
    pub method: Method,
    pub url: String,
    pub worker: usize,
    pub retry: usize,
    pub error: Error,
}

impl ErrEntry {
    pub(crate) fn new(desc: &RequestDescriptor, worker: usize, retry: usize, error: Error) -> Self {
        Self {
            time: Utc::now(),
            entry: desc.entry(),
            method: desc.method().clone(),
            url: desc.url().to_string(),
            worker,
            retry,
            error,
        }
    }

    /// `<time> <entry> [<method>] to <url> request-<n> retry-<n> error: <err>`
    /// with `<time>` rendered through `time_format`.
    pub fn message(&self, time_format: &str) -> String {
        let mut time = String::new();
        if write!(time, "{}", self.time.format(time_format)).is_err() {
            // invalid strftime pattern
            time = self.time.to_rfc3339_opts(SecondsFormat::Micros, true);
        }
        format!("{} {}", time, self.describe())
    }

    fn describe(&self) -> String {
        format!(
            "{} [{}] to {} request-{} retry-{} error: {}",
            self.entry, self.method, self.url, self.worker, self.retry, self.error
        )
    }
}

impl fmt::Display for ErrEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.time.timestamp(), self.describe())
    }
}

/// Thread-safe, append-only record of failed attempts plus optional sinks.
#[derive(Default)]
pub struct ErrorLog {
    entries: Mutex<Vec<ErrEntry>>,
    sinks: Mutex<Sinks>,
}

#[derive(Clone, Default)]
struct Sinks {
    logger: Option<Logger>,
    writer: Option<LogWriter>,
}

impl fmt::Debug for ErrorLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sinks = self.sinks();
        f.debug_struct("ErrorLog")
            .field("entries", &self.len())
            .field("logger", &sinks.logger.is_some())
            .field("writer", &sinks.writer.is_some())
            .finish()
    }
}

/// Snapshots the recorded entries; the copy shares the same sinks.
impl Clone for ErrorLog {
    fn clone(&self) -> Self {
        Self {
            entries: Mutex::new(self.entries()),
            sinks: Mutex::new(self.sinks()),
        }
    }
}

impl ErrorLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_logger<F>(self, logger: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.set_logger(logger);
        self
    }

    pub fn with_writer<W>(self, writer: W) -> Self
    where
        W: Write + Send + 'static,
    {
        self.set_writer(writer);
        self
    }

    /// Replaces the logger callback in place.
    pub fn set_logger<F>(&self, logger: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.lock_sinks().logger = Some(Arc::new(logger));
    }

    /// Replaces the raw writer in place.
    pub fn set_writer<W>(&self, writer: W)
    where
        W: Write + Send + 'static,
    {
        self.lock_sinks().writer = Some(Arc::new(Mutex::new(Box::new(writer))));
    }

    /// Stores `entry` when `keep_log` is set and, when `log_retries` is set,
    /// forwards it to the logger and writer. Sink failures are ignored.
    #[track_caller]
    pub fn record(&self, entry: ErrEntry, opts: &ClientOptions) {
        #[cfg(feature = "tracing")]
        tracing::warn!(
            entry = %entry.entry,
            method = %entry.method,
            url = %entry.url,
            worker = entry.worker,
            retry = entry.retry,
            error = %entry.error,
            "attempt failed"
        );

        if opts.log_retries {
            let sinks = self.sinks();
            if let Some(logger) = &sinks.logger {
                logger(&entry.message(&opts.log_time_format));
            }
            if let Some(writer) = &sinks.writer {
                let line = raw_line(&entry, &opts.log_time_format, Location::caller());
                let mut writer = writer.lock().unwrap_or_else(PoisonError::into_inner);
                let _ = writer.write_all(line.as_bytes());
                let _ = writer.flush();
            }
        }

        if opts.keep_log {
            self.lock().push(entry);
        }
    }

    /// One line per recorded entry, oldest first, each ending in `\n`.
    pub fn render(&self) -> String {
        self.lock()
            .iter()
            .map(|entry| format!("{entry}\n"))
            .collect()
    }

    pub fn entries(&self) -> Vec<ErrEntry> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ErrEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_sinks(&self) -> MutexGuard<'_, Sinks> {
        self.sinks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // cloned out so a slow sink never holds the lock
    fn sinks(&self) -> Sinks {
        self.lock_sinks().clone()
    }
}

/// `I 0602 <rfc3339 millis> [<dir>/<file>:<line>] <message>\n`
fn raw_line(entry: &ErrEntry, time_format: &str, caller: &Location<'_>) -> String {
    format!(
        "I {:04} {} [{}:{}] {}\n",
        SEND_ERROR_CODE,
        entry.time.to_rfc3339_opts(SecondsFormat::Millis, true),
        short_file(caller.file()),
        caller.line(),
        entry.message(time_format)
    )
}

fn short_file(file: &str) -> String {
    let path = Path::new(file);
    let name = path.file_name().and_then(|name| name.to_str()).unwrap_or(file);
    match path
        .parent()
        .and_then(Path::file_name)
        .and_then(|dir| dir.to_str())
    {
        Some(dir) => format!("{dir}/{name}"),
        None => name.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    use chrono::{TimeZone, Utc};
    use reqwest::{StatusCode, Url};

    use super::{short_file, ErrEntry, ErrorLog};
    use crate::{ClientOptions, Error, RequestDescriptor};

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl SharedBuf {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().expect("buffer lock").clone()).expect("utf8 log")
        }
    }

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().expect("buffer lock").extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct BrokenWriter;

    impl Write for BrokenWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::other("disk full"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Err(std::io::Error::other("disk full"))
        }
    }

    fn entry(worker: usize, retry: usize) -> ErrEntry {
        let url = Url::parse("http://localhost/items").expect("static url must parse");
        let mut entry = ErrEntry::new(
            &RequestDescriptor::get(url),
            worker,
            retry,
            Error::Status(StatusCode::SERVICE_UNAVAILABLE),
        );
        entry.time = Utc
            .with_ymd_and_hms(2024, 5, 1, 12, 30, 15)
            .single()
            .expect("valid timestamp");
        entry
    }

    fn keeping() -> ClientOptions {
        ClientOptions::default().keep_log(true)
    }

    #[test]
    fn render_writes_one_line_per_entry_in_order() {
        let log = ErrorLog::new();
        log.record(entry(0, 0), &keeping());
        log.record(entry(1, 0), &keeping());
        log.record(entry(0, 1), &keeping());

        let rendered = log.render();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0],
            "1714566615 Get [GET] to http://localhost/items request-0 retry-0 error: 503 Service Unavailable"
        );
        assert!(lines[1].contains("request-1 retry-0"));
        assert!(lines[2].contains("request-0 retry-1"));
    }

    #[test]
    fn memory_log_is_off_unless_keep_log() {
        let log = ErrorLog::new();
        log.record(entry(0, 0), &ClientOptions::default());
        assert!(log.is_empty());
        assert_eq!(log.render(), "");
    }

    #[test]
    fn sinks_fire_without_keep_log() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let buf = SharedBuf::default();
        let log = ErrorLog::new()
            .with_logger(move |line| sink.lock().expect("sink lock").push(line.to_owned()))
            .with_writer(buf.clone());

        log.record(entry(2, 1), &ClientOptions::default());

        let seen = seen.lock().expect("sink lock");
        assert_eq!(
            seen.as_slice(),
            ["12:30:15.000000 Get [GET] to http://localhost/items request-2 retry-1 error: 503 Service Unavailable"]
        );
        let raw = buf.contents();
        assert!(raw.starts_with("I 0602 2024-05-01T12:30:15.000Z [src/log.rs:"), "{raw}");
        assert!(raw.ends_with("request-2 retry-1 error: 503 Service Unavailable\n"));
        assert!(log.is_empty());
    }

    #[test]
    fn sinks_are_silent_when_log_retries_is_off() {
        let buf = SharedBuf::default();
        let log = ErrorLog::new().with_writer(buf.clone());
        log.record(entry(0, 0), &keeping().log_retries(false));
        assert_eq!(buf.contents(), "");
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn failing_writer_does_not_stop_recording() {
        let log = ErrorLog::new().with_writer(BrokenWriter);
        log.record(entry(0, 0), &keeping());
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn concurrent_records_are_all_kept() {
        let log = Arc::new(ErrorLog::new());
        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let log = Arc::clone(&log);
                std::thread::spawn(move || {
                    for retry in 0..25 {
                        log.record(entry(worker, retry), &keeping());
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("recording thread must not panic");
        }
        assert_eq!(log.len(), 200);
        assert_eq!(log.render().lines().count(), 200);
    }

    #[test]
    fn clone_snapshots_entries() {
        let log = ErrorLog::new();
        log.record(entry(0, 0), &keeping());
        let copy = log.clone();
        log.clear();
        assert_eq!(copy.len(), 1);
        assert!(log.is_empty());
    }

    #[test]
    fn sinks_attached_later_reach_every_holder() {
        let buf = SharedBuf::default();
        let log = Arc::new(ErrorLog::new());
        let holder = Arc::clone(&log);
        log.set_writer(buf.clone());

        holder.record(entry(0, 0), &ClientOptions::default());
        assert!(buf.contents().contains("request-0 retry-0"));
    }

    #[test]
    fn short_file_keeps_parent_directory() {
        assert_eq!(short_file("/home/dev/crate/src/executor.rs"), "src/executor.rs");
        assert_eq!(short_file("main.rs"), "main.rs");
    }
}
