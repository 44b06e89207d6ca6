//! Terminal rendering of plans and scan results.

use std::fmt::Write as _;

use pricewatch::{PagePlan, PageParseResult, ScanOutcome};
use rust_decimal::Decimal;

/// One line per built-in plan: id, name, domain, default-option mode.
pub fn render_shops(plans: &[PagePlan]) -> String {
    let mut out = String::new();
    for plan in plans {
        let id = plan.id().map(|i| i.to_string()).unwrap_or_else(|| "-".into());
        let _ = writeln!(
            out,
            "{id:>5}  {:<24} {:<36} {}",
            plan.name(),
            plan.domain().as_str(),
            plan.default_mode()
        );
    }
    out
}

/// The same catalog as JSON.
pub fn shops_json(plans: &[PagePlan]) -> serde_json::Value {
    serde_json::Value::Array(
        plans
            .iter()
            .map(|p| {
                serde_json::json!({
                    "id": p.id(),
                    "name": p.name(),
                    "domain": p.domain().as_str(),
                    "default_option_mode": p.default_mode().name(),
                    "currencies": p.currencies().iter().map(|c| c.code()).collect::<Vec<_>>(),
                })
            })
            .collect(),
    )
}

/// Title, thumbnail and one row per option.
pub fn render_page(page: &PageParseResult) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", page.title);
    if let Some(thumb) = &page.thumbnail {
        let _ = writeln!(out, "  thumbnail: {thumb}");
    }
    if page.options.is_empty() {
        let _ = writeln!(out, "  (no options)");
    }
    for option in &page.options {
        let _ = writeln!(
            out,
            "  {:<12} {:<24} {:>14}  {}",
            option.code.as_deref().unwrap_or("-"),
            option.display_name(),
            option.price.to_string(),
            option.stock_status.as_deref().unwrap_or("")
        );
    }
    out
}

/// A batch outcome: the page, a skip note, or the error.
pub fn render_outcome(outcome: &ScanOutcome) -> String {
    let target = outcome.uri.as_deref().unwrap_or("/");
    match &outcome.result {
        Ok(Some(page)) => format!("[{}] {target}\n{}", outcome.plan, render_page(page)),
        Ok(None) => format!("[{}] {target}: page not found, skipped\n", outcome.plan),
        Err(e) => format!("[{}] {target}: {e}\n", outcome.plan),
    }
}

/// A price shift as a signed percentage.
pub fn render_shift(shift: Option<Decimal>) -> String {
    match shift {
        Some(s) => {
            let pct = (s * Decimal::ONE_HUNDRED).normalize();
            let sign = if pct > Decimal::ZERO { "+" } else { "" };
            format!("{sign}{pct}%")
        }
        None => "no shift: a price is missing or zero".to_string(),
    }
}

/// Batch outcomes as JSON, errors as strings.
pub fn outcomes_json(outcomes: &[ScanOutcome]) -> serde_json::Value {
    serde_json::Value::Array(
        outcomes
            .iter()
            .map(|o| {
                let (page, error) = match &o.result {
                    Ok(page) => (serde_json::to_value(page).unwrap_or_default(), None),
                    Err(e) => (serde_json::Value::Null, Some(e.to_string())),
                };
                serde_json::json!({
                    "plan": o.plan,
                    "uri": o.uri,
                    "page": page,
                    "error": error,
                })
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pricewatch::{Currency, Money, OptionParseResult, PriceWatchError};

    fn page() -> PageParseResult {
        PageParseResult {
            title: "Sneakers Air".into(),
            thumbnail: None,
            options: vec![OptionParseResult {
                code: Some("67890".into()),
                property_a: Some("color 67".into()),
                property_b: Some("41".into()),
                property_c: None,
                stock_status: None,
                price: Money::new(Decimal::new(2450, 2), Currency::Eur),
            }],
        }
    }

    #[test]
    fn test_render_page() {
        let text = render_page(&page());
        assert!(text.starts_with("Sneakers Air\n"));
        assert!(text.contains("color 67/41"));
        assert!(text.contains("24.50 €"));
    }

    #[test]
    fn test_render_shift() {
        assert_eq!(render_shift(Some(Decimal::new(10, 2))), "+10%");
        assert_eq!(render_shift(Some(Decimal::new(-5, 2))), "-5%");
        assert_eq!(render_shift(Some(Decimal::ZERO)), "0%");
        assert!(render_shift(None).starts_with("no shift"));
    }

    #[test]
    fn test_render_outcomes() {
        let skipped = ScanOutcome {
            plan: "PromUa".into(),
            uri: Some("p/1".into()),
            result: Ok(None),
        };
        assert_eq!(render_outcome(&skipped), "[PromUa] p/1: page not found, skipped\n");

        let failed = ScanOutcome {
            plan: "PromUa".into(),
            uri: None,
            result: Err(PriceWatchError::Cancelled),
        };
        let json = outcomes_json(&[failed]);
        assert_eq!(json[0]["uri"], serde_json::Value::Null);
        assert!(json[0]["error"].as_str().is_some());
    }
}
