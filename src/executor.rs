//! Races concurrent retrying workers for one logical call.
//!
//! Each worker runs its attempts sequentially. The first worker to report,
//! whether with a success or with its final failure, decides the outcome;
//! the others are told to stop before their next attempt.

use std::sync::Arc;

use reqwest::Response;
use tokio::sync::{mpsc, watch};

use crate::{
    log::{ErrEntry, ErrorLog},
    transport::Transport,
    ClientOptions, Error, RequestDescriptor, Result,
};

/// Identifies the attempt that decided a call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttemptTag {
    /// Zero-based worker index.
    pub worker: usize,
    /// Zero-based retry index within that worker.
    pub retry: usize,
}

/// What a worker reports when it stops.
#[derive(Debug)]
pub(crate) struct AttemptOutcome {
    pub(crate) tag: AttemptTag,
    pub(crate) result: Result<Response>,
}

/// Shared collaborators of one call.
#[derive(Clone)]
pub(crate) struct Executor {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) opts: Arc<ClientOptions>,
    pub(crate) log: Arc<ErrorLog>,
}

impl Executor {
    /// Runs `desc` until the first worker reports.
    ///
    /// Returns [`Error::NoAttempts`] right away when `max_retries` is zero.
    pub(crate) async fn run(&self, desc: RequestDescriptor) -> Result<AttemptOutcome> {
        if self.opts.max_retries == 0 {
            return Err(Error::NoAttempts);
        }

        let concurrency = desc.effective_concurrency(self.opts.concurrency);
        let desc = Arc::new(desc);
        // sized so a late reporter never blocks on a receiver that is gone
        let (results_tx, mut results_rx) = mpsc::channel(concurrency);
        let (cancel_tx, cancel_rx) = watch::channel(false);

        for index in 0..concurrency {
            let worker = Worker {
                index,
                desc: Arc::clone(&desc),
                exec: self.clone(),
                cancelled: cancel_rx.clone(),
                results: results_tx.clone(),
            };
            tokio::spawn(worker.run());
        }
        drop(results_tx);

        let outcome = results_rx.recv().await.ok_or(Error::WorkersLost)?;
        cancel_tx.send_replace(true);

        #[cfg(feature = "tracing")]
        tracing::debug!(
            url = %desc.url(),
            worker = outcome.tag.worker,
            retry = outcome.tag.retry,
            success = outcome.result.is_ok(),
            "call decided"
        );

        Ok(outcome)
    }
}

struct Worker {
    index: usize,
    desc: Arc<RequestDescriptor>,
    exec: Executor,
    cancelled: watch::Receiver<bool>,
    results: mpsc::Sender<AttemptOutcome>,
}

impl Worker {
    async fn run(self) {
        let max_retries = self.exec.opts.max_retries;
        let mut last_error = None;

        for retry in 0..max_retries {
            if self.is_cancelled() {
                return;
            }

            let error = match self.desc.dispatch(self.exec.transport.as_ref()).await {
                Ok(response) if response.status().as_u16() < 400 => {
                    self.report(retry, Ok(response)).await;
                    return;
                }
                Ok(response) => Error::Status(response.status()),
                Err(err) => err,
            };

            self.exec.log.record(
                ErrEntry::new(&self.desc, self.index, retry, error.clone()),
                &self.exec.opts,
            );
            last_error = Some((retry, error));

            if retry + 1 < max_retries {
                let wait = self.exec.opts.backoff.duration(retry);
                #[cfg(feature = "tracing")]
                tracing::debug!(worker = self.index, retry, ?wait, "backing off");
                tokio::time::sleep(wait).await;
            }
        }

        if let Some((retry, error)) = last_error {
            self.report(retry, Err(error)).await;
        }
    }

    /// Raised once a winner is known, or when the caller dropped the call.
    fn is_cancelled(&self) -> bool {
        *self.cancelled.borrow() || self.results.is_closed()
    }

    async fn report(&self, retry: usize, result: Result<Response>) {
        let outcome = AttemptOutcome {
            tag: AttemptTag {
                worker: self.index,
                retry,
            },
            result,
        };
        // the call already returned when the receiver is gone
        let _ = self.results.send(outcome).await;
    }
}
