//! Price indicators over an option's snapshot history.

use std::cmp::Ordering;

use rust_decimal::Decimal;

use crate::money::{ExchangeRates, Money};
use crate::types::{Currency, PriceResult, PriceWatchError, Snapshot};

/// Time-weighted mean price of a snapshot series, in `currency`.
///
/// Each snapshot weighs half the gap to its predecessor plus half the gap to
/// its successor, so a price that held for longer counts for more. A single
/// snapshot is returned as is, in its own currency; an empty series has no
/// mean. A series whose snapshots share one timestamp falls back to the
/// arithmetic mean.
pub fn weighted_mean_price(
    snapshots: &[Snapshot],
    currency: Currency,
    rates: &dyn ExchangeRates,
) -> PriceResult<Option<Money>> {
    match snapshots {
        [] => return Ok(None),
        [only] => return Ok(Some(only.price)),
        _ => {}
    }

    let mut series: Vec<&Snapshot> = snapshots.iter().collect();
    series.sort_by_key(|s| s.timestamp);

    let first = series[0].timestamp;
    let last = series[series.len() - 1].timestamp;
    let total_ms = (last - first).num_milliseconds();

    if total_ms == 0 {
        let prices: Vec<Money> = series.iter().map(|s| s.price).collect();
        return Money::average(&prices, currency, rates);
    }

    let half_gap = |a: &Snapshot, b: &Snapshot| {
        Decimal::from((b.timestamp - a.timestamp).num_milliseconds()) / Decimal::TWO
    };

    let mut weighted_sum = Decimal::ZERO;
    for (i, &snap) in series.iter().enumerate() {
        let before = match i.checked_sub(1) {
            Some(prev) => half_gap(series[prev], snap),
            None => Decimal::ZERO,
        };
        let after = match series.get(i + 1) {
            Some(&next) => half_gap(snap, next),
            None => Decimal::ZERO,
        };

        let price = snap.price.to(currency, rates)?;
        weighted_sum = (before + after)
            .checked_mul(price.amount)
            .and_then(|w| weighted_sum.checked_add(w))
            .ok_or_else(|| PriceWatchError::overflow("weighting prices over time"))?;
    }

    Ok(Some(Money::new(weighted_sum / Decimal::from(total_ms), currency)))
}

/// Signed relative deviation of `current` from `general`, to two decimals.
///
/// `0.10` means ten percent above, `-0.10` ten percent below. `None` when
/// either side is missing or zero.
pub fn price_shift(
    general: Option<&Money>,
    current: Option<&Money>,
    rates: &dyn ExchangeRates,
) -> PriceResult<Option<Decimal>> {
    let (Some(general), Some(current)) = (general, current) else {
        return Ok(None);
    };

    let today = current.amount;
    let average = general.to(current.currency, rates)?.amount;
    if today.is_zero() || average.is_zero() {
        return Ok(None);
    }

    let ratio = today
        .checked_div(average)
        .ok_or_else(|| PriceWatchError::overflow(format!("comparing {today} with {average}")))?;
    let shift = if ratio < Decimal::ONE {
        -(Decimal::ONE - ratio)
    } else {
        ratio - Decimal::ONE
    };
    Ok(Some(shift.round_dp(2)))
}

/// The most recent snapshot.
pub fn latest_snapshot(snapshots: &[Snapshot]) -> Option<&Snapshot> {
    snapshots.iter().max_by_key(|s| s.timestamp)
}

/// The cheapest snapshot, comparing prices across currencies. Ties keep the
/// earliest in slice order.
pub fn lowest_snapshot<'a>(
    snapshots: &'a [Snapshot],
    rates: &dyn ExchangeRates,
) -> PriceResult<Option<&'a Snapshot>> {
    let mut lowest: Option<&Snapshot> = None;
    for snap in snapshots {
        lowest = match lowest {
            Some(best) if snap.price.compare(&best.price, rates)? != Ordering::Less => Some(best),
            _ => Some(snap),
        };
    }
    Ok(lowest)
}
