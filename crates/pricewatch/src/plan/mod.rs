//! Parsing plans: declarative trees of bits describing one shop's pages.

pub mod option;
pub mod page;

pub use option::OptionPlan;
pub use page::PagePlan;

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::money::Money;

/// How a page's default option relates to its repeating options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultOptionMode {
    /// No default option on this site.
    #[default]
    Ignore,
    /// The default option is one of the options.
    Alongside,
    /// The default option is the base; repeating options modify it.
    Basis,
    /// The default option is used only when there are no repeating options.
    Alternative,
    /// The default option is the only option.
    Single,
}

impl DefaultOptionMode {
    pub fn name(&self) -> &'static str {
        match self {
            DefaultOptionMode::Ignore => "Ignore",
            DefaultOptionMode::Alongside => "Alongside",
            DefaultOptionMode::Basis => "Basis",
            DefaultOptionMode::Alternative => "Alternative",
            DefaultOptionMode::Single => "Single",
        }
    }

    /// Modes where a page without repeating options is still valid.
    pub fn tolerates_missing_options(&self) -> bool {
        matches!(
            self,
            DefaultOptionMode::Alongside | DefaultOptionMode::Alternative
        )
    }
}

impl fmt::Display for DefaultOptionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How repeating option prices are composed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceMode {
    /// Each option price is complete on its own.
    #[default]
    Standalone,
    /// Each option price is a delta on top of the default option price.
    Additive,
}

/// Shop ordering rules applied during price normalization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderEconomics {
    /// Share of the price taken off by discounts, tax refunds and the like.
    #[serde(default)]
    pub deduction: Decimal,
    /// Order value ceiling, e.g. a customs threshold.
    pub limit: Option<Money>,
    /// Fixed charge per order: shipping, handling, fees.
    pub extra: Option<Money>,
}
