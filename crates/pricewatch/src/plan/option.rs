//! Option plan: how to read one product option out of a fragment.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bit::{Bit, Fragment, Lookup};
use crate::money::Money;
use crate::text;
use crate::types::{Currency, OptionParseResult, PriceResult, PriceWatchError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionPlan {
    pub code: Option<Bit>,
    pub property_a: Option<Bit>,
    pub property_b: Option<Bit>,
    pub property_c: Option<Bit>,
    pub stock: Option<Bit>,
    pub price: Bit,
    pub currency: Currency,
}

impl OptionPlan {
    pub fn new(price: Bit, currency: Currency) -> Self {
        Self {
            code: None,
            property_a: None,
            property_b: None,
            property_c: None,
            stock: None,
            price,
            currency,
        }
    }

    pub fn code(mut self, bit: Bit) -> Self {
        self.code = Some(bit);
        self
    }

    pub fn property_a(mut self, bit: Bit) -> Self {
        self.property_a = Some(bit);
        self
    }

    pub fn property_b(mut self, bit: Bit) -> Self {
        self.property_b = Some(bit);
        self
    }

    pub fn property_c(mut self, bit: Bit) -> Self {
        self.property_c = Some(bit);
        self
    }

    pub fn stock(mut self, bit: Bit) -> Self {
        self.stock = Some(bit);
        self
    }

    /// Parse an option whose price must be strictly positive.
    pub fn parse(&self, fragment: Fragment<'_>) -> PriceResult<OptionParseResult> {
        self.parse_with(fragment, true)
    }

    /// Parse an option whose price is a delta; zero, negative and
    /// unparsable amounts are kept (the latter as zero).
    pub fn parse_delta(&self, fragment: Fragment<'_>) -> PriceResult<OptionParseResult> {
        self.parse_with(fragment, false)
    }

    fn parse_with(&self, fragment: Fragment<'_>, strict: bool) -> PriceResult<OptionParseResult> {
        let raw = self.price.extract(fragment)?;
        let amount = text::parse_decimal(&raw).unwrap_or(Decimal::ZERO);
        if strict && amount <= Decimal::ZERO {
            return Err(PriceWatchError::InvalidPrice { raw });
        }

        Ok(OptionParseResult {
            code: optional(&self.code, fragment, "code")?,
            property_a: optional(&self.property_a, fragment, "property A")?,
            property_b: optional(&self.property_b, fragment, "property B")?,
            property_c: optional(&self.property_c, fragment, "property C")?,
            stock_status: optional(&self.stock, fragment, "stock")?,
            price: Money::new(amount, self.currency),
        })
    }
}

fn optional(bit: &Option<Bit>, fragment: Fragment<'_>, field: &str) -> PriceResult<Option<String>> {
    let Some(bit) = bit else {
        return Ok(None);
    };
    match bit.lookup(fragment)? {
        Lookup::Found(value) => Ok(Some(value)),
        Lookup::Missing(reason) => {
            debug!(field, %reason, "optional option field absent");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mold::{Mold, MoldKind};
    use scraper::Html;

    const OPTION: &str = r#"<div class="opt">
        <span class="sku">S-1</span>
        <span class="color">blue</span>
        <span class="stock">In stock</span>
        <span class="price">1 299,50 грн</span>
        <span class="zero">0</span>
    </div>"#;

    fn price_bit(query: &str) -> Bit {
        Bit::css(query).molds(vec![
            Mold::bare(MoldKind::Commas2Points),
            Mold::bare(MoldKind::OnlyFloatChars),
        ])
    }

    fn parse_doc(plan: &OptionPlan, strict: bool) -> PriceResult<OptionParseResult> {
        let html = Html::parse_document(OPTION);
        let fragment = Fragment::Document {
            html: &html,
            markup: OPTION,
        };
        if strict {
            plan.parse(fragment)
        } else {
            plan.parse_delta(fragment)
        }
    }

    #[test]
    fn test_parse_full_option() {
        let plan = OptionPlan::new(price_bit("span.price"), Currency::Uah)
            .code(Bit::css("span.sku"))
            .property_a(Bit::css("span.color"))
            .stock(Bit::css("span.stock"));

        let opt = parse_doc(&plan, true).unwrap();
        assert_eq!(opt.code.as_deref(), Some("S-1"));
        assert_eq!(opt.property_a.as_deref(), Some("blue"));
        assert_eq!(opt.property_b, None);
        assert_eq!(opt.stock_status.as_deref(), Some("In stock"));
        assert_eq!(opt.price, Money::new(Decimal::new(129950, 2), Currency::Uah));
    }

    #[test]
    fn test_missing_optional_fields_are_tolerated() {
        let plan = OptionPlan::new(price_bit("span.price"), Currency::Uah)
            .code(Bit::css("span.absent"))
            .property_b(Bit::css("span.also-absent"));

        let opt = parse_doc(&plan, true).unwrap();
        assert_eq!(opt.code, None);
        assert_eq!(opt.property_b, None);
    }

    #[test]
    fn test_missing_price_selector_propagates() {
        let plan = OptionPlan::new(price_bit("span.absent"), Currency::Uah);
        let err = parse_doc(&plan, true).unwrap_err();
        assert!(matches!(err, PriceWatchError::SelectorNotFound { .. }));
    }

    #[test]
    fn test_non_positive_price_is_invalid() {
        let plan = OptionPlan::new(price_bit("span.zero"), Currency::Uah);
        assert!(matches!(
            parse_doc(&plan, true),
            Err(PriceWatchError::InvalidPrice { .. })
        ));

        let garbage = OptionPlan::new(Bit::css("span.color"), Currency::Uah);
        assert!(matches!(
            parse_doc(&garbage, true),
            Err(PriceWatchError::InvalidPrice { .. })
        ));
    }

    #[test]
    fn test_delta_price_allows_zero() {
        let plan = OptionPlan::new(price_bit("span.zero"), Currency::Eur);
        let opt = parse_doc(&plan, false).unwrap();
        assert_eq!(opt.price.amount, Decimal::ZERO);
    }

    #[test]
    fn test_parse_from_text_fragment() {
        let json = r#"{"SizeName":"XL","SellPriceAmount":45.5,"SizeVarId":"123456789"}"#;
        let plan = OptionPlan::new(Bit::regex(r#"[sS]ell[pP]rice[aA]mount":(.+?),"#), Currency::Eur)
            .code(
                Bit::regex(r#"[sS]ize[vV]ar[iI][dD]":"(\d+)"#)
                    .molds(vec![Mold::new(MoldKind::Substr, ["-5"])]),
            )
            .property_b(Bit::regex(r#"[sS]ize[nN]ame":"(.+?)","#));

        let opt = plan.parse(Fragment::Text(json)).unwrap();
        assert_eq!(opt.code.as_deref(), Some("56789"));
        assert_eq!(opt.property_b.as_deref(), Some("XL"));
        assert_eq!(opt.price.amount, Decimal::new(455, 1));
    }
}
