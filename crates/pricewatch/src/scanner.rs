//! Page-scan service.
//!
//! [`ScanContext`] owns everything a scan shares: settings, the HTTP
//! transport, the per-domain fetchers, the rate cache and the cancellation
//! token. [`Scanner`] drives one or many page plans through it.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use url::Url;

use crate::config::Settings;
use crate::currency::{FallbackGate, RateCache, WebRateSource};
use crate::fetch::{HttpClient, PageCache, PageFetcher, Transport};
use crate::plan::PagePlan;
use crate::types::{PageParseResult, PriceResult, PriceWatchError};

/// Shared state of a scanning session.
pub struct ScanContext {
    pub settings: Settings,
    pub transport: Arc<dyn Transport>,
    pub rates: Arc<RateCache>,
    pub cancel: CancellationToken,
    fetchers: DashMap<String, Arc<PageFetcher>>,
}

impl ScanContext {
    pub fn new(
        settings: Settings,
        transport: Arc<dyn Transport>,
        rates: Arc<RateCache>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            settings,
            transport,
            rates,
            cancel,
            fetchers: DashMap::new(),
        }
    }

    /// Production wiring: reqwest transport, web rate source, and `gate`
    /// deciding on the rate file fallback.
    pub fn from_settings(settings: Settings, gate: FallbackGate) -> PriceResult<Self> {
        let transport: Arc<dyn Transport> = Arc::new(HttpClient::new(
            settings.request_timeout_ms,
            &settings.user_agent,
        ));
        let cancel = CancellationToken::new();

        let source = WebRateSource::new(
            transport.clone(),
            PageCache::new(None, settings.cache_ttl()),
            settings.retry_policy(),
            cancel.clone(),
        )?;
        let rates = RateCache::new(
            settings.main_currency,
            Arc::new(source),
            settings.rate_file_path(),
            settings.rate_ttl(),
        )
        .with_fallback_gate(gate);

        Ok(Self::new(settings, transport, Arc::new(rates), cancel))
    }

    /// The fetcher for `domain`, created on first use and shared afterwards.
    pub fn fetcher_for(&self, domain: &Url) -> PriceResult<Arc<PageFetcher>> {
        if let Some(existing) = self.fetchers.get(domain.as_str()) {
            return Ok(existing.clone());
        }

        let fetcher = Arc::new(PageFetcher::new(
            domain.as_str(),
            self.transport.clone(),
            PageCache::new(Some(self.settings.page_cache_dir()), self.settings.cache_ttl()),
            self.settings.retry_policy(),
        )?);
        Ok(self
            .fetchers
            .entry(domain.as_str().to_string())
            .or_insert(fetcher)
            .clone())
    }
}

/// One page to scan.
#[derive(Clone)]
pub struct ScanTarget {
    pub plan: Arc<PagePlan>,
    /// Relative or absolute address; the plan's domain root if `None`.
    pub uri: Option<String>,
}

impl ScanTarget {
    pub fn new(plan: Arc<PagePlan>, uri: Option<String>) -> Self {
        Self { plan, uri }
    }

    fn key(&self) -> (String, Option<String>) {
        (self.plan.name().to_string(), self.uri.clone())
    }
}

/// Result of one target in a batch.
#[derive(Debug)]
pub struct ScanOutcome {
    pub plan: String,
    pub uri: Option<String>,
    /// `Ok(None)` when the page no longer exists.
    pub result: PriceResult<Option<PageParseResult>>,
}

pub struct Scanner {
    ctx: Arc<ScanContext>,
}

impl Scanner {
    pub fn new(ctx: Arc<ScanContext>) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &ScanContext {
        &self.ctx
    }

    /// Stop starting new scans and interrupt pending backoff sleeps.
    pub fn cancel(&self) {
        self.ctx.cancel.cancel();
    }

    /// Scan one page. A page that no longer exists yields `Ok(None)`.
    pub async fn scan_page(
        &self,
        plan: &PagePlan,
        uri: Option<&str>,
    ) -> PriceResult<Option<PageParseResult>> {
        match plan.parse(uri, &self.ctx).await {
            Ok(page) => Ok(Some(page)),
            Err(PriceWatchError::NotFound { url }) => {
                warn!(plan = %plan.name(), %url, "page not found, skipped");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Scan every distinct target, at most `concurrency` at a time.
    ///
    /// Failures are reported per target and never abort the batch. Once the
    /// context is cancelled, targets not yet started report `Cancelled`.
    pub async fn scan_many(&self, targets: Vec<ScanTarget>) -> Vec<ScanOutcome> {
        let mut seen = HashSet::new();
        let unique: Vec<ScanTarget> = targets
            .into_iter()
            .filter(|t| seen.insert(t.key()))
            .collect();
        let limit = self.ctx.settings.concurrency.max(1);
        info!(targets = unique.len(), concurrency = limit, "scanning pages");

        stream::iter(unique)
            .map(|target| async move {
                let result = if self.ctx.cancel.is_cancelled() {
                    Err(PriceWatchError::Cancelled)
                } else {
                    self.scan_page(&target.plan, target.uri.as_deref()).await
                };
                if let Err(e) = &result {
                    warn!(plan = %target.plan.name(), uri = ?target.uri, "scan failed: {e}");
                }
                ScanOutcome {
                    plan: target.plan.name().to_string(),
                    uri: target.uri,
                    result,
                }
            })
            .buffer_unordered(limit)
            .collect()
            .await
    }
}
