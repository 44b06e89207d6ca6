//! Pricewatch: shop page parsing plans, resilient fetching, currency rates and price maths.

pub mod bit;
pub mod catalog;
pub mod config;
pub mod currency;
pub mod fetch;
pub mod mold;
pub mod money;
pub mod plan;
pub mod price_math;
pub mod scanner;
pub mod text;
pub mod types;

pub use bit::{Bit, Detail, Fragment, Lookup, SelectMethod, TextProperty};
pub use catalog::builtin_plans;
pub use config::Settings;
pub use currency::{RateCache, RateSource, WebRateSource};
pub use fetch::{HttpClient, PageCache, PageFetcher, RetryPolicy, Transport};
pub use mold::{Mold, MoldKind};
pub use money::{ExchangeRates, Money, RateTable};
pub use plan::{DefaultOptionMode, OptionPlan, OrderEconomics, PagePlan, PriceMode};
pub use price_math::{latest_snapshot, lowest_snapshot, price_shift, weighted_mean_price};
pub use scanner::{ScanContext, ScanOutcome, ScanTarget, Scanner};
pub use types::*;
