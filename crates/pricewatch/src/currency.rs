//! Currency rate cache.
//!
//! Rates are kept relative to one main currency: the rate of `C` is how many
//! main-currency units one `C` is worth. The main currency is seeded at 1 and
//! never expires; every other rate is resolved lazily, first from a
//! [`RateSource`] and, when that fails, from a plain-text rate file. The file
//! fallback is gated by a caller-supplied predicate.
//!
//! Rate file format, one line per currency:
//!
//! ```text
//! EUR to USD 1.0850 (2026-01-31 18:00:00)
//! GBP to USD 0.0000 (never)
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex as StdMutex, PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use dashmap::DashMap;
use regex::Regex;
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bit::{Bit, Fragment};
use crate::fetch::{PageCache, PageFetcher, RetryPolicy, Transport};
use crate::money::ExchangeRates;
use crate::mold::{Mold, MoldKind};
use crate::text;
use crate::types::{Currency, PriceResult, PriceWatchError};

const EXPIRY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

static RATE_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Za-z]{3}) to ([A-Za-z]{3}) ([0-9.]+) \((.+)\)\s*$")
        .expect("rate line regex is valid")
});

/// A conversion rate with an optional expiry; `None` never expires.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExpirableRate {
    pub rate: Decimal,
    pub expires: Option<DateTime<Utc>>,
}

impl ExpirableRate {
    pub fn permanent(rate: Decimal) -> Self {
        Self {
            rate,
            expires: None,
        }
    }

    pub fn expiring(rate: Decimal, expires: DateTime<Utc>) -> Self {
        Self {
            rate,
            expires: Some(expires),
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires.is_some_and(|at| at <= now)
    }
}

/// Where fresh rates come from.
#[async_trait]
pub trait RateSource: Send + Sync {
    /// Main-currency units per one `currency`.
    async fn fetch_rate(&self, currency: Currency, main: Currency) -> PriceResult<Decimal>;
}

/// Asked before falling back to the rate file; receives a human-readable prompt.
pub type FallbackGate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Lazily populated, expiring table of rates against one main currency.
pub struct RateCache {
    main: Currency,
    table: RwLock<HashMap<Currency, ExpirableRate>>,
    /// One lock per currency, so a stale entry is refreshed once without
    /// holding up other currencies.
    refresh: DashMap<Currency, Arc<Mutex<()>>>,
    /// One fallback question on the terminal at a time.
    asking: Mutex<()>,
    persisting: StdMutex<()>,
    source: Arc<dyn RateSource>,
    rate_file: PathBuf,
    ttl: chrono::Duration,
    allow_file_fallback: FallbackGate,
}

impl RateCache {
    /// A cache whose file fallback is denied until a gate is installed.
    pub fn new(
        main: Currency,
        source: Arc<dyn RateSource>,
        rate_file: PathBuf,
        ttl: chrono::Duration,
    ) -> Self {
        let mut table = HashMap::new();
        table.insert(main, ExpirableRate::permanent(Decimal::ONE));
        Self {
            main,
            table: RwLock::new(table),
            refresh: DashMap::new(),
            asking: Mutex::new(()),
            persisting: StdMutex::new(()),
            source,
            rate_file,
            ttl,
            allow_file_fallback: Arc::new(|_: &str| false),
        }
    }

    pub fn with_fallback_gate(mut self, gate: FallbackGate) -> Self {
        self.allow_file_fallback = gate;
        self
    }

    pub fn main(&self) -> Currency {
        self.main
    }

    pub fn rate_file(&self) -> &Path {
        &self.rate_file
    }

    /// The cached entry for `currency`, expired or not.
    pub fn cached(&self, currency: Currency) -> Option<ExpirableRate> {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&currency)
            .copied()
    }

    /// Seed or replace an entry.
    pub fn insert(&self, currency: Currency, rate: ExpirableRate) {
        self.table
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(currency, rate);
    }

    /// How many `alpha` make one `beta`, resolving both rates first.
    pub async fn rate_for(&self, alpha: Currency, beta: Currency) -> PriceResult<Decimal> {
        let a = self.ensure(alpha).await?;
        let b = self.ensure(beta).await?;
        b.checked_div(a)
            .ok_or_else(|| PriceWatchError::overflow(format!("dividing {beta} by {alpha} rate")))
    }

    pub async fn ensure_all(
        &self,
        currencies: impl IntoIterator<Item = Currency>,
    ) -> PriceResult<()> {
        for currency in currencies {
            self.ensure(currency).await?;
        }
        Ok(())
    }

    /// A valid rate for `currency`, refreshing it if missing or expired.
    pub async fn ensure(&self, currency: Currency) -> PriceResult<Decimal> {
        if let Some(rate) = self.fresh(currency) {
            return Ok(rate);
        }

        let lock = self.refresh.entry(currency).or_default().clone();
        let _guard = lock.lock().await;

        // Another task may have refreshed it while we waited.
        match self.cached(currency) {
            Some(entry) if !entry.is_expired_at(Utc::now()) => return Ok(entry.rate),
            Some(entry) => {
                info!(%currency, expired = ?entry.expires, "rate expired, evicting");
                self.table
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&currency);
            }
            None => info!(%currency, "rate unknown, resolving"),
        }

        let reason = match self.source.fetch_rate(currency, self.main).await {
            Ok(rate) if rate > Decimal::ZERO => {
                self.insert(currency, ExpirableRate::expiring(rate, Utc::now() + self.ttl));
                info!(%currency, main = %self.main, %rate, "rate refreshed");
                if let Err(e) = self.persist() {
                    warn!(path = %self.rate_file.display(), "failed to persist rates: {e}");
                }
                return Ok(rate);
            }
            Ok(rate) => format!("source returned non-positive rate {rate}"),
            Err(e) => e.to_string(),
        };

        warn!(%currency, "rate download failed: {reason}");
        self.from_file(currency, &reason).await
    }

    fn fresh(&self, currency: Currency) -> Option<Decimal> {
        self.cached(currency)
            .filter(|entry| !entry.is_expired_at(Utc::now()))
            .map(|entry| entry.rate)
    }

    async fn from_file(&self, currency: Currency, reason: &str) -> PriceResult<Decimal> {
        let prompt = format!(
            "Rate for {currency} could not be downloaded ({reason}). Use the rate from {}?",
            self.rate_file.display()
        );
        if !self.ask_fallback(prompt).await {
            return Err(PriceWatchError::CurrencyUnavailable {
                currency,
                reason: format!("{reason}; rate file fallback denied"),
            });
        }

        if !self.rate_file.exists() {
            self.write_template()?;
            return Err(PriceWatchError::CurrencyUnavailable {
                currency,
                reason: format!(
                    "rate file was missing, a template was written to {}",
                    self.rate_file.display()
                ),
            });
        }

        let contents = fs::read_to_string(&self.rate_file)?;
        let rate = parse_rate_file(&contents, self.main)
            .get(&currency)
            .copied()
            .filter(|r| *r > Decimal::ZERO)
            .ok_or_else(|| PriceWatchError::CurrencyUnavailable {
                currency,
                reason: format!("no usable rate in {}", self.rate_file.display()),
            })?;

        info!(%currency, %rate, "using rate from file");
        self.insert(currency, ExpirableRate::expiring(rate, Utc::now() + self.ttl));
        Ok(rate)
    }

    /// Run the gate on the blocking pool, since it may wait on a terminal.
    async fn ask_fallback(&self, prompt: String) -> bool {
        let _asking = self.asking.lock().await;
        let gate = self.allow_file_fallback.clone();
        tokio::task::spawn_blocking(move || gate(&prompt))
            .await
            .unwrap_or_else(|e| {
                warn!("rate file fallback question failed: {e}");
                false
            })
    }

    /// Write the whole table to the rate file.
    pub fn persist(&self) -> PriceResult<()> {
        let _writing = self.persisting.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries: Vec<(Currency, ExpirableRate)> = self
            .table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(c, r)| (*c, *r))
            .collect();
        entries.sort_by_key(|(c, _)| *c);

        let body: String = entries
            .iter()
            .map(|(c, r)| format_rate_line(*c, self.main, r))
            .collect();
        write_file(&self.rate_file, &body)?;
        debug!(path = %self.rate_file.display(), count = entries.len(), "rates persisted");
        Ok(())
    }

    fn write_template(&self) -> PriceResult<()> {
        let body: String = Currency::ALL
            .into_iter()
            .filter(|c| *c != self.main)
            .map(|c| format_rate_line(c, self.main, &ExpirableRate::permanent(Decimal::ZERO)))
            .collect();
        write_file(&self.rate_file, &body)?;
        warn!(path = %self.rate_file.display(), "rate file template written");
        Ok(())
    }
}

impl ExchangeRates for RateCache {
    /// Reads already-resolved rates only; call [`RateCache::ensure_all`] first.
    fn rate(&self, alpha: Currency, beta: Currency) -> PriceResult<Decimal> {
        let lookup = |c: Currency| {
            self.cached(c)
                .map(|entry| entry.rate)
                .filter(|r| *r > Decimal::ZERO)
                .ok_or_else(|| PriceWatchError::CurrencyUnavailable {
                    currency: c,
                    reason: "rate not resolved".to_string(),
                })
        };
        lookup(beta)?
            .checked_div(lookup(alpha)?)
            .ok_or_else(|| PriceWatchError::overflow(format!("dividing {beta} by {alpha} rate")))
    }
}

fn format_rate_line(currency: Currency, main: Currency, rate: &ExpirableRate) -> String {
    let expires = match rate.expires {
        Some(at) => at.format(EXPIRY_FORMAT).to_string(),
        None => "never".to_string(),
    };
    format!("{currency} to {main} {:.4} ({expires})\n", rate.rate)
}

/// Rates against `main` found in a rate file. Lines for another main
/// currency, and lines that do not parse, are skipped.
pub fn parse_rate_file(contents: &str, main: Currency) -> HashMap<Currency, Decimal> {
    contents
        .lines()
        .filter_map(|line| {
            let caps = RATE_LINE_RE.captures(line)?;
            let currency: Currency = caps[1].parse().ok()?;
            let against: Currency = caps[2].parse().ok()?;
            if against != main {
                return None;
            }
            let rate = text::parse_decimal(&caps[3])?;
            Some((currency, rate))
        })
        .collect()
}

/// Parse the expiry column of a rate line.
pub fn parse_expiry(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw.trim(), EXPIRY_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

fn write_file(path: &Path, body: &str) -> PriceResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, body)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Rates scraped from a search engine's currency converter.
pub struct WebRateSource {
    fetcher: PageFetcher,
    cancel: CancellationToken,
}

impl WebRateSource {
    pub const DOMAIN: &'static str = "https://www.google.com/";

    pub fn new(
        transport: Arc<dyn Transport>,
        cache: PageCache,
        policy: RetryPolicy,
        cancel: CancellationToken,
    ) -> PriceResult<Self> {
        Self::with_domain(Self::DOMAIN, transport, cache, policy, cancel)
    }

    pub fn with_domain(
        domain: &str,
        transport: Arc<dyn Transport>,
        cache: PageCache,
        policy: RetryPolicy,
        cancel: CancellationToken,
    ) -> PriceResult<Self> {
        Ok(Self {
            fetcher: PageFetcher::new(domain, transport, cache, policy)?,
            cancel,
        })
    }

    /// Relative query for "one `currency` in `main`".
    pub fn query(currency: Currency, main: Currency) -> String {
        format!("search?hl=en&gl=en&q={currency}+to+{main}")
    }

    /// The number right before the main currency's long name, tags allowed
    /// in between.
    fn rate_bit(main: Currency) -> Bit {
        Bit::regex(format!(
            r"([0-9][0-9,]*(?:\.[0-9]+)?)\s*(?:<[^>]+>\s*)*{}",
            regex::escape(main.long_name())
        ))
        .molds(vec![Mold::bare(MoldKind::OnlyFloatChars)])
    }
}

#[async_trait]
impl RateSource for WebRateSource {
    async fn fetch_rate(&self, currency: Currency, main: Currency) -> PriceResult<Decimal> {
        let markup = self
            .fetcher
            .get(Some(&Self::query(currency, main)), &self.cancel)
            .await?;
        let raw = Self::rate_bit(main).extract(Fragment::Text(&markup))?;

        text::parse_decimal(&raw)
            .filter(|r| *r > Decimal::ZERO)
            .ok_or_else(|| PriceWatchError::CurrencyUnavailable {
                currency,
                reason: format!("no {main} rate on the search page"),
            })
    }
}
