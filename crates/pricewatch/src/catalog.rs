//! Built-in shop page plans.

use rust_decimal::Decimal;

use crate::bit::Bit;
use crate::mold::{Mold, MoldKind};
use crate::money::Money;
use crate::plan::{DefaultOptionMode, OptionPlan, OrderEconomics, PagePlan};
use crate::types::{Currency, PriceResult};

/// Mirror storefronts of the PromUa platform: (id, name, domain).
const PROM_UA_TWINS: [(u32, &str, &str); 4] = [
    (1001, "Zhyva", "https://zhyva.com.ua"),
    (1002, "Novosad", "https://novosad-market.prom.ua/"),
    (1003, "Smaragd", "https://smaragd.prom.ua/"),
    (1004, "Gorshok", "https://gorshok.kiev.ua/"),
];

/// Every built-in plan, twins last.
pub fn builtin_plans() -> PriceResult<Vec<PagePlan>> {
    let prom_ua = prom_ua()?;
    let mut plans = Vec::with_capacity(2 + PROM_UA_TWINS.len());
    for (id, name, domain) in PROM_UA_TWINS {
        plans.push(prom_ua.twin(Some(id), name, domain)?);
    }
    plans.insert(0, sports_direct()?);
    plans.insert(0, prom_ua);
    Ok(plans)
}

/// Find a plan by numeric id or by name (case-insensitive, the part before
/// any parenthesised note is enough).
pub fn find<'a>(plans: &'a [PagePlan], key: &str) -> Option<&'a PagePlan> {
    plans.iter().find(|p| matches(p, key))
}

/// Whether `key` names `plan`, see [`find`].
pub fn matches(plan: &PagePlan, key: &str) -> bool {
    let key = key.trim();
    if let Ok(id) = key.parse::<u32>() {
        return plan.id() == Some(id);
    }
    let short = plan.name().split(" (").next().unwrap_or_default();
    plan.name().eq_ignore_ascii_case(key) || short.eq_ignore_ascii_case(key)
}

fn prom_ua() -> PriceResult<PagePlan> {
    let title = Bit::css("title").molds(vec![
        Mold::bare(MoldKind::HtmlDecode),
        Mold::new(MoldKind::Before, [":"]),
        Mold::new(MoldKind::Before, [" - "]),
        Mold::bare(MoldKind::Trim),
    ]);

    let price = Bit::css("span[data-qaid='product_price']").molds(vec![
        Mold::bare(MoldKind::Commas2Points),
        Mold::bare(MoldKind::OnlyFloatChars),
    ]);
    let option = OptionPlan::new(price, Currency::Uah)
        .code(Bit::css("span[data-qaid='product_code']").attr("title"))
        .stock(Bit::css("li[data-qaid='presence_data']"));

    Ok(PagePlan::new(Some(7), "PromUa", "https://prom.ua", title)?
        .default_option(DefaultOptionMode::Single, Some(option)))
}

fn sports_direct() -> PriceResult<PagePlan> {
    let variant_id = r#"[sS]ize[vV]ar[iI][dD]":"(\d+)"#;

    let option = OptionPlan::new(Bit::regex(r#"[sS]ell[pP]rice[aA]mount":(.+?),"#), Currency::Eur)
        .code(Bit::regex(variant_id).molds(vec![Mold::new(MoldKind::Substr, ["-5"])]))
        .property_a(Bit::regex(variant_id).molds(vec![
            Mold::new(MoldKind::Substr, ["-5", "2"]),
            Mold::new(MoldKind::Prepend, ["color "]),
            Mold::bare(MoldKind::Trim),
        ]))
        .property_b(Bit::regex(r#"[sS]ize[nN]ame":"(.+?)","#).molds(vec![
            Mold::new(MoldKind::Remove, [r#"="""#]),
            Mold::bare(MoldKind::Trim),
        ]));

    let economics = OrderEconomics {
        deduction: Decimal::ZERO,
        limit: Some(Money::new(Decimal::from(150), Currency::Eur)),
        extra: Some(Money::new(Decimal::from(30), Currency::Eur)),
    };

    Ok(PagePlan::new(
        Some(8),
        "SportsDirect (-0% +30€)",
        "https://ua.sportsdirect.com",
        Bit::css("span#lblProductBrand"),
    )?
    .preprocess(vec![
        Mold::new(MoldKind::RegexReplace, ["&quot;", "\""]),
        Mold::bare(MoldKind::StripHtmlComments),
        Mold::bare(MoldKind::HtmlDecode),
    ])
    .subtitle(Bit::css("span#lblProductName"))
    .options(Bit::regex(r#"\{"[sS]ize[nN]ame":.+?\}"#), option)
    .economics(economics))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::RateTable;

    const PROM_PAGE: &str = r#"<html><head><title>Garden hose 20m: buy at a good price - Prom</title></head>
        <body>
          <span data-qaid="product_code" title="HZ-20">Code: HZ-20</span>
          <ul><li data-qaid="presence_data">In stock</li></ul>
          <span data-qaid="product_price">1 249,50</span>
        </body></html>"#;

    const SPORTS_PAGE: &str = r#"<html><body>
        <span id="lblProductBrand">Nike</span><span id="lblProductName">Air Max</span>
        <script>var sizes = [{&quot;SizeName&quot;:&quot;41&quot;,&quot;SizeVarId&quot;:&quot;1234567890&quot;,&quot;SellPriceAmount&quot;:20,&quot;x&quot;:1}];</script>
        <!-- {"SizeName":"hidden","SizeVarId":"1","SellPriceAmount":1,"x":1} -->
        </body></html>"#;

    #[test]
    fn test_catalog_contents() {
        let plans = builtin_plans().unwrap();
        let ids: Vec<_> = plans.iter().map(|p| p.id().unwrap()).collect();
        assert_eq!(ids, vec![7, 8, 1001, 1002, 1003, 1004]);
        assert_eq!(plans[2].domain().as_str(), "https://zhyva.com.ua/");
        assert_eq!(plans[5].default_mode(), DefaultOptionMode::Single);
    }

    #[test]
    fn test_find() {
        let plans = builtin_plans().unwrap();
        assert_eq!(find(&plans, "promua").unwrap().id(), Some(7));
        assert_eq!(find(&plans, "SportsDirect").unwrap().id(), Some(8));
        assert_eq!(find(&plans, "1003").unwrap().name(), "Smaragd");
        assert!(find(&plans, "nowhere").is_none());
        assert!(find(&plans, "42").is_none());
    }

    #[test]
    fn test_prom_ua_page() {
        let plans = builtin_plans().unwrap();
        let rates = RateTable::new(Currency::Uah);
        let page = plans[0]
            .parse_markup(PROM_PAGE, &rates, Currency::Uah)
            .unwrap();

        assert_eq!(page.title, "Garden hose 20m");
        assert_eq!(page.options.len(), 1);
        assert_eq!(page.options[0].stock_status.as_deref(), Some("In stock"));
        assert_eq!(page.options[0].price, Money::new(Decimal::new(124950, 2), Currency::Uah));
    }

    #[test]
    fn test_sports_direct_page() {
        let plans = builtin_plans().unwrap();
        let rates = RateTable::new(Currency::Eur);
        let page = plans[1]
            .parse_markup(SPORTS_PAGE, &rates, Currency::Eur)
            .unwrap();

        assert_eq!(page.title, "Nike Air Max");
        assert_eq!(page.options.len(), 1);
        let option = &page.options[0];
        assert_eq!(option.code.as_deref(), Some("67890"));
        assert_eq!(option.property_a.as_deref(), Some("color 67"));
        assert_eq!(option.property_b.as_deref(), Some("41"));
        // 20 €, 7.5 pieces under the 150 € ceiling, 30 € fee spread as 4 € each
        assert_eq!(option.price, Money::new(Decimal::from(24), Currency::Eur));
    }
}
