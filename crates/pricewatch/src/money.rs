//! Money values and currency conversion.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{Currency, PriceResult, PriceWatchError};

/// Source of conversion rates between currencies.
///
/// `rate(alpha, beta)` answers "how many `alpha` make one `beta`".
pub trait ExchangeRates {
    fn rate(&self, alpha: Currency, beta: Currency) -> PriceResult<Decimal>;
}

/// A fixed table of rates relative to one main currency.
#[derive(Debug, Clone)]
pub struct RateTable {
    main: Currency,
    rates: HashMap<Currency, Decimal>,
}

impl RateTable {
    /// Table holding only the main currency at rate 1.
    pub fn new(main: Currency) -> Self {
        let mut rates = HashMap::new();
        rates.insert(main, Decimal::ONE);
        Self { main, rates }
    }

    /// Record that one `currency` is worth `rate` of the main currency.
    pub fn with(mut self, currency: Currency, rate: Decimal) -> Self {
        self.rates.insert(currency, rate);
        self
    }

    pub fn main(&self) -> Currency {
        self.main
    }
}

impl ExchangeRates for RateTable {
    fn rate(&self, alpha: Currency, beta: Currency) -> PriceResult<Decimal> {
        let lookup = |c: Currency| {
            self.rates
                .get(&c)
                .copied()
                .filter(|r| *r > Decimal::ZERO)
                .ok_or_else(|| PriceWatchError::CurrencyUnavailable {
                    currency: c,
                    reason: "not in rate table".to_string(),
                })
        };
        lookup(beta)?
            .checked_div(lookup(alpha)?)
            .ok_or_else(|| PriceWatchError::overflow(format!("dividing {beta} by {alpha} rate")))
    }
}

/// An amount of money in a specific currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    pub amount: Decimal,
    pub currency: Currency,
}

impl Money {
    pub fn new(amount: Decimal, currency: Currency) -> Self {
        Self { amount, currency }
    }

    /// The same value expressed in another currency.
    pub fn to(&self, currency: Currency, rates: &dyn ExchangeRates) -> PriceResult<Money> {
        if self.currency == currency {
            return Ok(*self);
        }
        let rate = rates.rate(currency, self.currency)?;
        let amount = self.amount.checked_mul(rate).ok_or_else(|| {
            PriceWatchError::overflow(format!(
                "converting {} {} to {currency}",
                self.amount, self.currency
            ))
        })?;
        Ok(Money::new(amount, currency))
    }

    /// Compare after bringing `other` into this money's currency.
    pub fn compare(&self, other: &Money, rates: &dyn ExchangeRates) -> PriceResult<Ordering> {
        let other = other.to(self.currency, rates)?;
        Ok(self.amount.cmp(&other.amount))
    }

    /// Arithmetic mean of a list, expressed in `currency`. `None` for an empty list.
    pub fn average(
        list: &[Money],
        currency: Currency,
        rates: &dyn ExchangeRates,
    ) -> PriceResult<Option<Money>> {
        if list.is_empty() {
            return Ok(None);
        }

        let mut sum = Decimal::ZERO;
        for entry in list {
            sum = sum
                .checked_add(entry.to(currency, rates)?.amount)
                .ok_or_else(|| PriceWatchError::overflow("summing prices"))?;
        }

        Ok(Some(Money::new(sum / Decimal::from(list.len()), currency)))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let amount = self.amount.round_dp(2);
        match self.currency {
            Currency::Usd => write!(f, "${amount:.2}"),
            Currency::Gbp => write!(f, "£{amount:.2}"),
            Currency::Eur => write!(f, "{amount:.2} €"),
            Currency::Uah => write!(f, "{amount:.2} грн"),
            Currency::Pln => write!(f, "{amount:.2} zł"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rates() -> RateTable {
        // 1 EUR = 1.10 USD, 1 UAH = 0.025 USD
        RateTable::new(Currency::Usd)
            .with(Currency::Eur, Decimal::new(110, 2))
            .with(Currency::Uah, Decimal::new(25, 3))
    }

    #[test]
    fn test_same_currency_is_identity() {
        let m = Money::new(Decimal::new(1234, 2), Currency::Eur);
        assert_eq!(m.to(Currency::Eur, &rates()).unwrap(), m);
    }

    #[test]
    fn test_conversion_via_main() {
        let eur = Money::new(Decimal::from(10), Currency::Eur);
        let usd = eur.to(Currency::Usd, &rates()).unwrap();
        assert_eq!(usd.amount, Decimal::from(11));
        assert_eq!(usd.currency, Currency::Usd);

        let uah = eur.to(Currency::Uah, &rates()).unwrap();
        assert_eq!(uah.amount, Decimal::from(440));
    }

    #[test]
    fn test_missing_rate_is_unavailable() {
        let gbp = Money::new(Decimal::ONE, Currency::Gbp);
        let err = gbp.to(Currency::Usd, &rates()).unwrap_err();
        assert!(matches!(
            err,
            PriceWatchError::CurrencyUnavailable {
                currency: Currency::Gbp,
                ..
            }
        ));
    }

    #[test]
    fn test_conversion_overflow_is_an_error() {
        let huge = Money::new(Decimal::MAX, Currency::Eur);
        let err = huge.to(Currency::Usd, &rates()).unwrap_err();
        assert!(matches!(err, PriceWatchError::PriceOverflow { .. }));

        let extremes = RateTable::new(Currency::Usd)
            .with(Currency::Eur, Decimal::MAX)
            .with(Currency::Uah, Decimal::new(1, 28));
        assert!(matches!(
            extremes.rate(Currency::Uah, Currency::Eur),
            Err(PriceWatchError::PriceOverflow { .. })
        ));
    }

    #[test]
    fn test_compare_normalizes() {
        let ten_eur = Money::new(Decimal::from(10), Currency::Eur);
        let ten_usd = Money::new(Decimal::from(10), Currency::Usd);
        assert_eq!(ten_eur.compare(&ten_usd, &rates()).unwrap(), Ordering::Greater);
        assert_eq!(ten_usd.compare(&ten_eur, &rates()).unwrap(), Ordering::Less);
    }

    #[test]
    fn test_average() {
        let list = [
            Money::new(Decimal::from(10), Currency::Usd),
            Money::new(Decimal::from(10), Currency::Eur),
        ];
        let avg = Money::average(&list, Currency::Usd, &rates()).unwrap().unwrap();
        assert_eq!(avg.amount, Decimal::new(105, 1));
        assert!(Money::average(&[], Currency::Usd, &rates()).unwrap().is_none());
    }

    #[test]
    fn test_display() {
        assert_eq!(Money::new(Decimal::new(5, 1), Currency::Usd).to_string(), "$0.50");
        assert_eq!(Money::new(Decimal::new(19999, 2), Currency::Uah).to_string(), "199.99 грн");
        assert_eq!(Money::new(Decimal::from(3), Currency::Eur).to_string(), "3.00 €");
    }
}
