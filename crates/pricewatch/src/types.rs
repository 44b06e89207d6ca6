//! Core data types for parsed pages, price snapshots, and errors.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::money::Money;

/// Currencies a shop may quote prices in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Usd,
    Eur,
    Uah,
    Gbp,
    Pln,
}

impl Currency {
    /// Every supported currency, in display order.
    pub const ALL: [Currency; 5] = [
        Currency::Usd,
        Currency::Eur,
        Currency::Uah,
        Currency::Gbp,
        Currency::Pln,
    ];

    /// ISO 4217 code.
    pub fn code(&self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Uah => "UAH",
            Currency::Gbp => "GBP",
            Currency::Pln => "PLN",
        }
    }

    /// Long English name, as rate pages spell it out.
    pub fn long_name(&self) -> &'static str {
        match self {
            Currency::Usd => "United States Dollar",
            Currency::Eur => "Euro",
            Currency::Uah => "Ukrainian hryvnia",
            Currency::Gbp => "Pound sterling",
            Currency::Pln => "Polish zloty",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = PriceWatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Currency::ALL
            .into_iter()
            .find(|c| c.code().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| PriceWatchError::Configuration(format!("unknown currency: {wanted}")))
    }
}

/// One parsed product option (variant) of a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionParseResult {
    /// Retailer's own identifier of the option.
    pub code: Option<String>,
    /// First free-form property, usually the colour.
    pub property_a: Option<String>,
    /// Second free-form property, usually the size.
    pub property_b: Option<String>,
    pub property_c: Option<String>,
    /// Site's wording of the stock status.
    pub stock_status: Option<String>,
    pub price: Money,
}

impl OptionParseResult {
    /// Display name joining the non-empty properties with `/`, or `-`.
    pub fn display_name(&self) -> String {
        let props: Vec<&str> = [&self.property_a, &self.property_b, &self.property_c]
            .into_iter()
            .filter_map(|p| p.as_deref())
            .filter(|p| !p.is_empty())
            .collect();

        if props.is_empty() {
            "-".to_string()
        } else {
            props.join("/")
        }
    }
}

/// Everything extracted from one product page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageParseResult {
    pub title: String,
    pub thumbnail: Option<String>,
    pub options: Vec<OptionParseResult>,
}

/// The state of one option at a moment in time.
///
/// Snapshots are owned by the persistence layer; this crate only reads them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub timestamp: DateTime<Utc>,
    pub stock_status: Option<String>,
    pub price: Money,
}

impl Snapshot {
    /// Snapshot of a freshly parsed option, stamped `now` unless forced.
    pub fn from_parse(option: &OptionParseResult, forced: Option<DateTime<Utc>>) -> Self {
        Self {
            timestamp: forced.unwrap_or_else(Utc::now),
            stock_status: option.stock_status.clone(),
            price: option.price,
        }
    }
}

/// Errors that can occur while fetching, extracting or normalizing prices.
#[derive(thiserror::Error, Debug)]
pub enum PriceWatchError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Selector not found: '{query}' in {context}")]
    SelectorNotFound { query: String, context: String },

    #[error("Extraction yielded no results: '{query}'")]
    NoResults { query: String },

    #[error("Zero or negative price is not permitted: '{raw}'")]
    InvalidPrice { raw: String },

    #[error("Price arithmetic overflowed while {operation}")]
    PriceOverflow { operation: String },

    #[error("Page not found: {url}")]
    NotFound { url: String },

    #[error("Site protection triggered, refusing to download {url}")]
    ProtectionTriggered { url: String },

    #[error("{attempts} download attempts failed for {url}: {last_error}")]
    FetchExhausted {
        url: String,
        attempts: u32,
        last_error: String,
    },

    #[error("Time budget exceeded while downloading {url}")]
    BudgetExceeded { url: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Currency rate unavailable for {currency}: {reason}")]
    CurrencyUnavailable { currency: Currency, reason: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PriceWatchError {
    pub fn overflow(operation: impl Into<String>) -> Self {
        PriceWatchError::PriceOverflow {
            operation: operation.into(),
        }
    }

    /// Whether this is the "nothing there" class that optional fields tolerate.
    pub fn is_absence(&self) -> bool {
        matches!(
            self,
            PriceWatchError::SelectorNotFound { .. } | PriceWatchError::NoResults { .. }
        )
    }

    /// Whether this is a fetch failure that ends the page scan.
    pub fn is_terminal_fetch(&self) -> bool {
        matches!(
            self,
            PriceWatchError::NotFound { .. }
                | PriceWatchError::ProtectionTriggered { .. }
                | PriceWatchError::FetchExhausted { .. }
                | PriceWatchError::BudgetExceeded { .. }
        )
    }
}

/// Convenience result type.
pub type PriceResult<T> = Result<T, PriceWatchError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn option(a: Option<&str>, b: Option<&str>) -> OptionParseResult {
        OptionParseResult {
            code: None,
            property_a: a.map(String::from),
            property_b: b.map(String::from),
            property_c: None,
            stock_status: None,
            price: Money::new(Decimal::ONE, Currency::Usd),
        }
    }

    #[test]
    fn test_currency_roundtrip() {
        for c in Currency::ALL {
            assert_eq!(c.code().parse::<Currency>().unwrap(), c);
        }
        assert_eq!("eur".parse::<Currency>().unwrap(), Currency::Eur);
        assert!("XYZ".parse::<Currency>().is_err());
    }

    #[test]
    fn test_display_name() {
        assert_eq!(option(Some("red"), Some("XL")).display_name(), "red/XL");
        assert_eq!(option(Some(""), Some("XL")).display_name(), "XL");
        assert_eq!(option(None, None).display_name(), "-");
    }

    #[test]
    fn test_error_classes() {
        let absent = PriceWatchError::NoResults {
            query: "li".into(),
        };
        assert!(absent.is_absence());
        assert!(!absent.is_terminal_fetch());

        let gone = PriceWatchError::NotFound {
            url: "https://shop.test/x".into(),
        };
        assert!(gone.is_terminal_fetch());
        assert!(!gone.is_absence());
    }
}
