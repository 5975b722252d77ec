//! Agreement statistics across provider values.

use rust_decimal::Decimal;

/// Median of `values`. The mean of the two middle values for an even count.
pub fn median(values: &[Decimal]) -> Option<Decimal> {
    if values.is_empty() {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort();

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        let (lo, hi) = (sorted[mid - 1], sorted[mid]);
        Some(match lo.checked_add(hi) {
            Some(sum) => sum / Decimal::TWO,
            // Same sign when the sum overflows, so the gap fits
            None => lo + (hi - lo) / Decimal::TWO,
        })
    } else {
        Some(sorted[mid])
    }
}

/// Largest relative deviation from the median: `max(|v - median| / |median|)`.
///
/// Zero for fewer than two values or a zero median. A deviation too large to
/// represent saturates at `Decimal::MAX`.
pub fn variance(values: &[Decimal]) -> Decimal {
    if values.len() < 2 {
        return Decimal::ZERO;
    }
    let Some(mid) = median(values) else {
        return Decimal::ZERO;
    };
    if mid.is_zero() {
        return Decimal::ZERO;
    }

    values
        .iter()
        .map(|v| {
            v.checked_sub(mid)
                .and_then(|diff| diff.abs().checked_div(mid.abs()))
                .unwrap_or(Decimal::MAX)
        })
        .max()
        .unwrap_or(Decimal::ZERO)
}
