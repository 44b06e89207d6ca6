//! Page plan: one shop's rules for turning a product page into options.
//!
//! Parsing runs in strict order:
//!
//! 1. fetch the markup through the plan's own [`PageFetcher`];
//! 2. run the page-level molds over it;
//! 3. read the title (mandatory), subtitle and thumbnail (optional);
//! 4. unless the default option is the only one, collect repeating options;
//! 5. unless there is no default option, parse it and merge it in;
//! 6. normalize every price to the main currency and apply order economics.
//!
//! Steps 2 to 6 are synchronous and can be driven directly with
//! [`PagePlan::parse_markup`].

use std::collections::BTreeSet;
use std::fmt;

use rust_decimal::Decimal;
use scraper::Html;
use tracing::{debug, info, warn};
use url::Url;

use super::{DefaultOptionMode, OptionPlan, OrderEconomics, PriceMode};
use crate::bit::{Bit, Fragment, Lookup, SelectMethod};
use crate::money::{ExchangeRates, Money};
use crate::mold::{self, Mold};
use crate::scanner::ScanContext;
use crate::types::{
    Currency, OptionParseResult, PageParseResult, PriceResult, PriceWatchError,
};

/// Shop page parser.
pub struct PagePlan {
    id: Option<u32>,
    name: String,
    domain: Url,
    preprocess: Vec<Mold>,
    title: Bit,
    subtitle: Option<Bit>,
    thumbnail: Option<Bit>,
    default_mode: DefaultOptionMode,
    default_option: Option<OptionPlan>,
    options_list: Option<Bit>,
    actual_option: Option<OptionPlan>,
    price_mode: PriceMode,
    economics: OrderEconomics,
}

impl fmt::Debug for PagePlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PagePlan")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("domain", &self.domain.as_str())
            .field("default_mode", &self.default_mode)
            .field("price_mode", &self.price_mode)
            .finish_non_exhaustive()
    }
}

impl PagePlan {
    pub fn new(id: Option<u32>, name: &str, domain: &str, title: Bit) -> PriceResult<Self> {
        Ok(Self {
            id,
            name: name.to_string(),
            domain: Url::parse(domain)?,
            preprocess: Vec::new(),
            title,
            subtitle: None,
            thumbnail: None,
            default_mode: DefaultOptionMode::Ignore,
            default_option: None,
            options_list: None,
            actual_option: None,
            price_mode: PriceMode::Standalone,
            economics: OrderEconomics::default(),
        })
    }

    pub fn preprocess(mut self, molds: Vec<Mold>) -> Self {
        self.preprocess = molds;
        self
    }

    pub fn subtitle(mut self, bit: Bit) -> Self {
        self.subtitle = Some(bit);
        self
    }

    pub fn thumbnail(mut self, bit: Bit) -> Self {
        self.thumbnail = Some(bit);
        self
    }

    /// Default option and how it combines with repeating options.
    pub fn default_option(mut self, mode: DefaultOptionMode, plan: Option<OptionPlan>) -> Self {
        self.default_mode = mode;
        self.default_option = plan;
        self
    }

    /// Repeating options: the bit listing raw option fragments, and the plan
    /// applied to each fragment.
    pub fn options(mut self, list: Bit, plan: OptionPlan) -> Self {
        self.options_list = Some(list);
        self.actual_option = Some(plan);
        self
    }

    pub fn price_mode(mut self, mode: PriceMode) -> Self {
        self.price_mode = mode;
        self
    }

    pub fn economics(mut self, economics: OrderEconomics) -> Self {
        self.economics = economics;
        self
    }

    /// A mirror storefront sharing every rule of this plan under another
    /// identity, name and domain.
    pub fn twin(&self, id: Option<u32>, name: &str, domain: &str) -> PriceResult<PagePlan> {
        Ok(PagePlan {
            id,
            name: name.to_string(),
            domain: Url::parse(domain)?,
            preprocess: self.preprocess.clone(),
            title: self.title.clone(),
            subtitle: self.subtitle.clone(),
            thumbnail: self.thumbnail.clone(),
            default_mode: self.default_mode,
            default_option: self.default_option.clone(),
            options_list: self.options_list.clone(),
            actual_option: self.actual_option.clone(),
            price_mode: self.price_mode,
            economics: self.economics.clone(),
        })
    }

    pub fn id(&self) -> Option<u32> {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn domain(&self) -> &Url {
        &self.domain
    }

    pub fn default_mode(&self) -> DefaultOptionMode {
        self.default_mode
    }

    pub fn order_economics(&self) -> &OrderEconomics {
        &self.economics
    }

    /// Every currency this plan's prices can be quoted in.
    pub fn currencies(&self) -> BTreeSet<Currency> {
        let mut set = BTreeSet::new();
        for plan in [&self.default_option, &self.actual_option].into_iter().flatten() {
            set.insert(plan.currency);
        }
        for money in [&self.economics.limit, &self.economics.extra].into_iter().flatten() {
            set.insert(money.currency);
        }
        set
    }

    /// Fetch, parse and normalize the page at `uri` (the domain root if `None`).
    ///
    /// Downloads go through the context's fetcher for this plan's domain, so
    /// the cache and retry policy are always those of `ctx`.
    pub async fn parse(&self, uri: Option<&str>, ctx: &ScanContext) -> PriceResult<PageParseResult> {
        let fetcher = ctx.fetcher_for(&self.domain)?;
        let markup = fetcher.get(uri, &ctx.cancel).await?;

        let main = ctx.rates.main();
        ctx.rates
            .ensure_all(self.currencies().into_iter().chain([main]))
            .await?;

        self.parse_markup(&markup, ctx.rates.as_ref(), main)
            .inspect_err(|e| warn!(plan = %self.name, uri = ?uri, "page parsing failed: {e}"))
    }

    /// Steps 2 to 6 over already fetched markup.
    pub fn parse_markup(
        &self,
        markup: &str,
        rates: &dyn ExchangeRates,
        main: Currency,
    ) -> PriceResult<PageParseResult> {
        let page = self.extract(markup, rates)?;
        self.normalize(page, rates, main)
    }

    /// Raw options in their quoted currencies, default option merged in.
    pub fn extract(&self, markup: &str, rates: &dyn ExchangeRates) -> PriceResult<PageParseResult> {
        let processed = mold::mold(markup, &self.preprocess)?;
        let html = Html::parse_document(&processed);
        let doc = Fragment::Document {
            html: &html,
            markup: &processed,
        };

        let mut page = PageParseResult {
            title: self.title.extract(doc)?,
            ..PageParseResult::default()
        };

        if let Some(subtitle) = self.optional_field(&self.subtitle, doc, "subtitle") {
            page.title = format!("{} {subtitle}", page.title);
        }
        page.thumbnail = self.optional_field(&self.thumbnail, doc, "thumbnail");

        if self.default_mode != DefaultOptionMode::Single {
            match self.collect_options(doc, &processed, &mut page.options) {
                Ok(()) => {}
                Err(e) if e.is_absence() && self.default_mode.tolerates_missing_options() => {
                    info!(plan = %self.name, "no repeating options: {e}");
                }
                Err(e) => return Err(e),
            }
        }

        if self.default_mode != DefaultOptionMode::Ignore {
            self.merge_default_option(doc, &mut page.options, rates)?;
        }

        Ok(page)
    }

    fn optional_field(&self, bit: &Option<Bit>, doc: Fragment<'_>, field: &str) -> Option<String> {
        match bit.as_ref()?.lookup(doc) {
            Ok(Lookup::Found(value)) => Some(value),
            Ok(Lookup::Missing(reason)) => {
                debug!(plan = %self.name, field, %reason, "optional page field absent");
                None
            }
            Err(e) => {
                warn!(plan = %self.name, field, "optional page field failed: {e}");
                None
            }
        }
    }

    fn collect_options(
        &self,
        doc: Fragment<'_>,
        markup: &str,
        options: &mut Vec<OptionParseResult>,
    ) -> PriceResult<()> {
        let (Some(list), Some(plan)) = (&self.options_list, &self.actual_option) else {
            return Err(PriceWatchError::Configuration(format!(
                "plan '{}' needs an option list in {} mode",
                self.name, self.default_mode
            )));
        };

        let mut push = |fragment: Fragment<'_>| -> PriceResult<()> {
            let parsed = match self.price_mode {
                PriceMode::Standalone => plan.parse(fragment),
                PriceMode::Additive => plan.parse_delta(fragment),
            };
            match parsed {
                Ok(option) => options.push(option),
                Err(PriceWatchError::InvalidPrice { raw }) => {
                    debug!(plan = %self.name, %raw, "option dropped, price not positive");
                }
                Err(e) => return Err(e),
            }
            Ok(())
        };

        match list.method {
            SelectMethod::Regex => {
                for raw in list.extract_strings(markup)? {
                    push(Fragment::Text(&raw))?;
                }
            }
            SelectMethod::Css => {
                for element in list.extract_elements(doc)? {
                    push(Fragment::Element(element))?;
                }
            }
        }
        Ok(())
    }

    fn merge_default_option(
        &self,
        doc: Fragment<'_>,
        options: &mut Vec<OptionParseResult>,
        rates: &dyn ExchangeRates,
    ) -> PriceResult<()> {
        let plan = self.default_option.as_ref().ok_or_else(|| {
            PriceWatchError::Configuration(format!(
                "plan '{}' needs a default option in {} mode",
                self.name, self.default_mode
            ))
        })?;

        if self.default_mode == DefaultOptionMode::Single {
            info!(domain = %self.domain, "one option per page, add each option separately");
        }

        let mut default = plan
            .parse(doc)
            .inspect_err(|e| warn!(plan = %self.name, "default option failed: {e}"))?;
        let label = self.default_mode.name().to_string();
        default.code = Some(label.clone());
        default.property_a = Some(label);

        if self.price_mode == PriceMode::Additive {
            for option in options.iter_mut() {
                let base = default.price.to(option.price.currency, rates)?;
                let amount = option.price.amount.checked_add(base.amount).ok_or_else(|| {
                    PriceWatchError::overflow(format!("adding {} to the default price", option.price))
                })?;
                option.price = Money::new(amount, option.price.currency);
            }
        }

        let keep = match self.default_mode {
            DefaultOptionMode::Alongside | DefaultOptionMode::Single => true,
            DefaultOptionMode::Alternative => options.is_empty(),
            DefaultOptionMode::Basis | DefaultOptionMode::Ignore => false,
        };
        if keep {
            options.push(default);
        }
        Ok(())
    }

    /// Convert every price to `main`, then apply the deduction and amortize
    /// the per-order extra fee over the units that fit under the order limit.
    pub fn normalize(
        &self,
        mut page: PageParseResult,
        rates: &dyn ExchangeRates,
        main: Currency,
    ) -> PriceResult<PageParseResult> {
        let divisor = Decimal::ONE + self.economics.deduction;
        let limit = self
            .economics
            .limit
            .map(|m| m.to(main, rates))
            .transpose()?;
        let extra = self
            .economics
            .extra
            .map(|m| m.to(main, rates))
            .transpose()?;

        for option in &mut page.options {
            let mut value = option
                .price
                .to(main, rates)?
                .amount
                .checked_div(divisor)
                .ok_or_else(|| {
                    PriceWatchError::Configuration(format!(
                        "plan '{}': deduction {} leaves nothing to divide by",
                        self.name, self.economics.deduction
                    ))
                })?;

            if let (Some(limit), Some(extra)) = (limit, extra) {
                if limit.amount > Decimal::ZERO && value > Decimal::ZERO {
                    value = limit
                        .amount
                        .checked_div(value)
                        .and_then(|pieces_per_order| extra.amount.checked_div(pieces_per_order))
                        .and_then(|share| value.checked_add(share))
                        .ok_or_else(|| {
                            PriceWatchError::overflow(format!("amortizing the order fee over {value}"))
                        })?;
                }
            }

            option.price = Money::new(value, main);
        }
        Ok(page)
    }
}
