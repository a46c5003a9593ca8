//! Polling and debounced refetching.
//!
//! Both helpers own a background task that is stopped when they are
//! dropped. Requests already in flight are not aborted: their results are
//! still published into the store, unless it was reset since, and simply
//! not delivered.
//!
//! Results wait for the caller in a bounded queue. When the caller falls
//! behind, new results are dropped; their data has been published anyway.

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio::time::MissedTickBehavior;

use crate::environment::Environment;
use crate::error::FetchError;
use crate::graphql;

type FetchResult = Result<graphql::Response, FetchError>;

/// Results kept until the caller reads them.
const RESULTS_BACKLOG: usize = 8;

/// Queues a result unless the backlog is full.
fn deliver(sender: &mpsc::Sender<FetchResult>, result: FetchResult) {
    if let Err(mpsc::error::TrySendError::Full(_)) = sender.try_send(result) {
        tracing::debug!(backlog = RESULTS_BACKLOG, "result backlog full, dropping result");
    }
}

/// Refetches a query at a fixed interval.
///
/// A new request is issued on every tick, without waiting for the previous
/// one; results are delivered in completion order.
pub struct Poller {
    task: JoinHandle<()>,
    results: mpsc::Receiver<FetchResult>,
}

impl Poller {
    /// Starts polling. The first request is issued after one interval.
    pub fn start(environment: Environment, request: graphql::Request, interval: Duration) -> Self {
        let interval = interval.max(Duration::from_millis(1));
        let (sender, results) = mpsc::channel(RESULTS_BACKLOG);
        let task = tokio::spawn(async move {
            let mut ticks = tokio::time::interval_at(Instant::now() + interval, interval);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticks.tick().await;
                if sender.is_closed() {
                    break;
                }
                tracing::debug!("polling");
                let fetch = environment.fetch_query(request.clone());
                let sender = sender.clone();
                tokio::spawn(async move {
                    deliver(&sender, fetch.await);
                });
            }
        });
        Self { task, results }
    }

    /// The next poll result, in completion order.
    pub async fn next(&mut self) -> Option<FetchResult> {
        self.results.recv().await
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Runs an action with the latest value once no new value has been pushed
/// for the delay.
pub struct Debouncer<T> {
    values: mpsc::UnboundedSender<T>,
    task: JoinHandle<()>,
}

impl<T> Debouncer<T>
where
    T: Send + 'static,
{
    pub fn new<F, Fut>(delay: Duration, mut action: F) -> Self
    where
        F: FnMut(T) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (values, mut receiver) = mpsc::unbounded_channel::<T>();
        let task = tokio::spawn(async move {
            while let Some(mut latest) = receiver.recv().await {
                loop {
                    tokio::select! {
                        value = receiver.recv() => match value {
                            Some(value) => latest = value,
                            None => return,
                        },
                        _ = tokio::time::sleep(delay) => {
                            tokio::spawn(action(latest));
                            break;
                        }
                    }
                }
            }
        });
        Self { values, task }
    }

    /// Pushes a value, restarting the delay.
    pub fn push(&self, value: T) {
        let _ = self.values.send(value);
    }
}

impl<T> Drop for Debouncer<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Refetches a search query once the search text has settled.
pub struct DebouncedRefetch {
    debouncer: Debouncer<String>,
    results: mpsc::Receiver<FetchResult>,
}

impl DebouncedRefetch {
    /// `request` builds the query for a search text.
    pub fn new<F>(environment: Environment, delay: Duration, request: F) -> Self
    where
        F: Fn(&str) -> graphql::Request + Send + Sync + 'static,
    {
        let (sender, results) = mpsc::channel(RESULTS_BACKLOG);
        let debouncer = Debouncer::new(delay, move |search: String| {
            tracing::debug!(%search, "refetching search");
            let fetch = environment.fetch_query(request(&search));
            let sender = sender.clone();
            async move {
                deliver(&sender, fetch.await);
            }
        });
        Self { debouncer, results }
    }

    pub fn search(&self, text: impl Into<String>) {
        self.debouncer.push(text.into());
    }

    /// The next refetch result.
    pub async fn next(&mut self) -> Option<FetchResult> {
        self.results.recv().await
    }
}
