//! Resilient per-domain page fetching.
//!
//! A [`PageFetcher`] resolves a relative or absolute URI against its domain,
//! serves it from the memory cache, then the disk cache, and only then from
//! the network. Downloads retry transient failures with an adaptive delay
//! that grows by one step after each failure and shrinks by one step after
//! each success. "Not found" is terminal and never retried.
//!
//! Backoff sleeps race the caller's [`CancellationToken`], and an optional
//! time budget bounds the total wall-clock time of one download.

pub mod cache;
pub mod http_client;

pub use cache::PageCache;
pub use http_client::{HttpClient, HttpResponse, Transport, TransportError};

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::text;
use crate::types::{PriceResult, PriceWatchError};

/// Retry behaviour of a fetcher.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total download attempts, including the first.
    pub attempts: u32,
    /// Adaptive delay step, also the initial delay.
    pub delay_step: Duration,
    /// Upper bound on the wall-clock time of one download.
    pub time_budget: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 10,
            delay_step: Duration::from_millis(200),
            time_budget: None,
        }
    }
}

/// Page fetcher bound to one domain.
pub struct PageFetcher {
    domain: Url,
    transport: Arc<dyn Transport>,
    cache: PageCache,
    policy: RetryPolicy,
    /// Current inter-request delay in milliseconds.
    delay_ms: AtomicU64,
    protection_triggered: AtomicBool,
}

impl PageFetcher {
    pub fn new(
        domain: &str,
        transport: Arc<dyn Transport>,
        cache: PageCache,
        policy: RetryPolicy,
    ) -> PriceResult<Self> {
        let domain = Url::parse(domain)?;
        let delay_ms = AtomicU64::new(policy.delay_step.as_millis() as u64);
        Ok(Self {
            domain,
            transport,
            cache,
            policy,
            delay_ms,
            protection_triggered: AtomicBool::new(false),
        })
    }

    pub fn domain(&self) -> &Url {
        &self.domain
    }

    pub fn cache(&self) -> &PageCache {
        &self.cache
    }

    /// Refuse all further downloads (cached pages are still served).
    pub fn set_protection_triggered(&self, triggered: bool) {
        self.protection_triggered.store(triggered, Ordering::SeqCst);
    }

    pub fn protection_triggered(&self) -> bool {
        self.protection_triggered.load(Ordering::SeqCst)
    }

    /// Delay observed before the next download attempt.
    pub fn current_delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms.load(Ordering::SeqCst))
    }

    /// Absolute URI for `uri`: the domain itself for `None`, absolute URIs
    /// unchanged, relative paths joined to the domain with a single slash.
    pub fn resolve(&self, uri: Option<&str>) -> String {
        match uri {
            None => self.domain.to_string(),
            Some(u) => match Url::parse(u) {
                Ok(absolute) => absolute.to_string(),
                Err(_) => text::slash_safe_concat(self.domain.as_str(), u),
            },
        }
    }

    /// Page content for `uri`, from cache when fresh.
    pub async fn get(&self, uri: Option<&str>, cancel: &CancellationToken) -> PriceResult<String> {
        let url = self.resolve(uri);

        if let Some(content) = self.cache.get_memory(&url) {
            debug!(%url, "returning content from memory");
            return Ok(content);
        }

        if let Some(content) = self.cache.get_disk(&url) {
            debug!(%url, "returning content from local file");
            return Ok(content);
        }

        if self.protection_triggered() {
            warn!(%url, "download refused, site protection is triggered");
            return Err(PriceWatchError::ProtectionTriggered { url });
        }

        info!(%url, "downloading");
        let content = self.download(&url, cancel).await?;
        self.cache.put(&url, &content);
        Ok(content)
    }

    async fn download(&self, url: &str, cancel: &CancellationToken) -> PriceResult<String> {
        let deadline = self.policy.time_budget.map(|budget| Instant::now() + budget);
        let max_attempts = self.policy.attempts.max(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            let delay = self.current_delay();
            if deadline.is_some_and(|d| Instant::now() + delay > d) {
                return Err(PriceWatchError::BudgetExceeded {
                    url: url.to_string(),
                });
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(PriceWatchError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }

            debug!(url, attempt, "download try");

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(PriceWatchError::Cancelled),
                _ = until(deadline) => {
                    return Err(PriceWatchError::BudgetExceeded { url: url.to_string() });
                }
                r = self.transport.get(url) => r,
            };

            let failure = match outcome {
                Ok(resp) if resp.status == 404 => {
                    warn!(url, "server responded with 404 Not Found");
                    return Err(PriceWatchError::NotFound {
                        url: url.to_string(),
                    });
                }
                Ok(resp) if (200..300).contains(&resp.status) && !resp.body.is_empty() => {
                    self.shrink_delay();
                    info!(url, attempt, bytes = resp.body.len(), "downloaded successfully");
                    return Ok(resp.body);
                }
                Ok(resp) if (200..300).contains(&resp.status) => {
                    "got empty result from the server".to_string()
                }
                Ok(resp) => format!("HTTP {}", resp.status),
                Err(e) => e.to_string(),
            };

            if attempt >= max_attempts {
                warn!(url, attempt, "download tries exhausted: {failure}");
                return Err(PriceWatchError::FetchExhausted {
                    url: url.to_string(),
                    attempts: attempt,
                    last_error: failure,
                });
            }

            self.grow_delay();
            warn!(
                url,
                attempt,
                next_delay_ms = self.current_delay().as_millis() as u64,
                "download try failed: {failure}"
            );
        }
    }

    fn grow_delay(&self) {
        let step = self.policy.delay_step.as_millis() as u64;
        self.delay_ms.fetch_add(step, Ordering::SeqCst);
    }

    fn shrink_delay(&self) {
        let step = self.policy.delay_step.as_millis() as u64;
        let _ = self
            .delay_ms
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |d| {
                Some(d.saturating_sub(step))
            });
    }
}

/// Resolves at the deadline, or never.
async fn until(deadline: Option<Instant>) {
    match deadline {
        Some(d) => tokio::time::sleep_until(d).await,
        None => std::future::pending::<()>().await,
    }
}
