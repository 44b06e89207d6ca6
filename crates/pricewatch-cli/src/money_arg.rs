//! Money values on the command line: `12.50 EUR`, `12.50EUR` or `12,50:eur`.

use std::str::FromStr;

use pricewatch::{Currency, Money};
use rust_decimal::Decimal;

pub fn parse_money(raw: &str) -> Result<Money, String> {
    let raw = raw.trim();
    let split = raw
        .find(|c: char| c.is_ascii_alphabetic())
        .ok_or_else(|| format!("'{raw}': missing currency code"))?;
    let (amount, code) = raw.split_at(split);

    let amount = amount.trim().trim_end_matches(':').replace(',', ".");
    let amount = Decimal::from_str(amount.trim()).map_err(|e| format!("'{raw}': {e}"))?;
    let currency: Currency = code.parse().map_err(|e| format!("'{raw}': {e}"))?;
    Ok(Money::new(amount, currency))
}
