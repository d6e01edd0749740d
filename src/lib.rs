//! `resilient-http` adds retries, backoff and concurrent attempts on top of
//! an async HTTP transport.
//!
//! Every call goes through one of the client entry points:
//! - [`ResilientClient::execute`]
//! - [`ResilientClient::get`] / [`ResilientClient::head`]
//! - [`ResilientClient::post`] / [`ResilientClient::post_form`]
//!
//! `GET` and `HEAD` race `concurrency` workers and return whichever reports
//! first. Every other call runs a single worker so side effects are never
//! duplicated. Each worker retries up to `max_retries` times, waiting
//! according to its [`Backoff`].

mod backoff;
mod client;
mod descriptor;
mod error;
mod executor;
mod form;
mod log;
mod options;
mod transport;

pub use backoff::Backoff;
pub use client::{execute, get, head, post, post_form, ResilientClient};
pub use descriptor::{EntryPoint, RequestDescriptor};
pub use error::Error;
pub use executor::AttemptTag;
pub use form::FormValues;
pub use log::{ErrEntry, ErrorLog, Logger, SEND_ERROR_CODE};
pub use options::{ClientOptions, DEFAULT_LOG_TIME_FORMAT};
pub use transport::{ReqwestTransport, Transport};

pub type Result<T> = std::result::Result<T, Error>;
