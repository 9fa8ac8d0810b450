//! Deduplicating artwork fetcher.
//!
//! ```text
//!   fetch(url, cb)
//!     ├── url already in flight → cb appended to that job, no new request
//!     └── new url → job created, task spawned:
//!                    transport.fetch → ImageBytes::decode (blocking pool)
//!                    → job removed → every cb called once, in order
//! ```
//!
//! A transport or decoder that panics completes the job with
//! [`FetchError::Aborted`], so waiters are never left hanging.
//!
//! The job table is the only shared state. It sits behind a mutex because
//! transport tasks complete on runtime worker threads; callbacks run after the
//! lock is released. The fetcher never touches the station registry: callers
//! forward the outcome to the coordination context from inside their callback.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Url;
use tracing::{debug, warn};

use crate::error::{FetchError, TransportError};
use crate::station::ImageBytes;

/// Result handed to every waiter of a fetch job.
pub type FetchOutcome = Result<ImageBytes, FetchError>;

type OnComplete = Box<dyn FnOnce(FetchOutcome) + Send + 'static>;

/// The opaque network primitive behind the fetcher.
///
/// Timeouts, redirects and TLS are the implementation's business; the fetcher
/// adds none of its own.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, TransportError>;
}

/// What `fetch` did with the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    /// A new network request was issued.
    Started,
    /// An identical request was already in flight; the callback joined it.
    Joined,
}

/// Parse `raw` as an absolute http(s) url.
pub fn parse_http_url(raw: &str) -> Option<Url> {
    let url = Url::parse(raw.trim()).ok()?;
    matches!(url.scheme(), "http" | "https")
        .then_some(url)
        .filter(|u| u.has_host())
}

#[derive(Clone)]
pub struct AssetFetcher {
    transport: Arc<dyn Transport>,
    jobs: Arc<Mutex<HashMap<String, Vec<OnComplete>>>>,
}

impl AssetFetcher {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            jobs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Request the image at `url`; `on_complete` is called exactly once with
    /// the outcome, possibly on another thread.
    ///
    /// Must be called from within a tokio runtime. A url that is not absolute
    /// http(s) is refused up front and `on_complete` is dropped uncalled.
    pub fn fetch<F>(&self, url: &str, on_complete: F) -> Result<FetchStatus, FetchError>
    where
        F: FnOnce(FetchOutcome) + Send + 'static,
    {
        let parsed = parse_http_url(url).ok_or_else(|| FetchError::InvalidUrl(url.to_string()))?;
        let key = parsed.to_string();

        {
            let mut jobs = self.jobs.lock();
            if let Some(waiters) = jobs.get_mut(&key) {
                waiters.push(Box::new(on_complete));
                debug!("fetcher: joined in-flight {} ({} waiting)", key, waiters.len());
                return Ok(FetchStatus::Joined);
            }
            jobs.insert(key.clone(), vec![Box::new(on_complete)]);
        }

        debug!("fetcher: starting {}", key);
        let transport = Arc::clone(&self.transport);
        let jobs = Arc::clone(&self.jobs);
        tokio::spawn(async move {
            let outcome = download(transport, parsed).await;
            complete(&jobs, &key, outcome);
        });
        Ok(FetchStatus::Started)
    }

    /// Number of distinct urls currently being fetched.
    pub fn in_flight(&self) -> usize {
        self.jobs.lock().len()
    }
}

async fn download(transport: Arc<dyn Transport>, url: Url) -> FetchOutcome {
    let request = tokio::spawn(async move { transport.fetch(&url).await });
    let data = request.await.map_err(aborted)??;
    let decoded = tokio::task::spawn_blocking(move || ImageBytes::decode(data))
        .await
        .map_err(aborted)?;
    Ok(decoded?)
}

fn aborted(e: tokio::task::JoinError) -> FetchError {
    FetchError::Aborted(e.to_string())
}

fn complete(jobs: &Mutex<HashMap<String, Vec<OnComplete>>>, key: &str, outcome: FetchOutcome) {
    let waiters = jobs.lock().remove(key).unwrap_or_default();
    match &outcome {
        Ok(img) => debug!("fetcher: {} done, {:?}, {} waiting", key, img, waiters.len()),
        Err(e) => warn!("fetcher: {} failed: {} ({} waiting)", key, e, waiters.len()),
    }
    for on_complete in waiters {
        on_complete(outcome.clone());
    }
}
