use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Arithmetic mean; `None` for an empty input.
///
/// A sum past the `Decimal` range is averaged term by term instead.
pub(crate) fn mean(values: impl IntoIterator<Item = Decimal>) -> Option<Decimal> {
    let values: Vec<Decimal> = values.into_iter().collect();
    if values.is_empty() {
        return None;
    }
    let count = Decimal::from(values.len());
    match checked_sum(values.iter().copied()) {
        Some(sum) => Some(sum / count),
        None => checked_sum(values.iter().map(|v| *v / count)),
    }
}

/// Mean of `values` weighted by the paired weights.
///
/// Only pairs with a positive weight count. When no pair has one, falls
/// back to the plain mean of every value. `None` when the total weight
/// itself leaves the `Decimal` range.
pub(crate) fn weighted_mean(pairs: &[(Decimal, Option<Decimal>)]) -> Option<Decimal> {
    let weighted: Vec<(Decimal, Decimal)> = pairs
        .iter()
        .filter_map(|(v, w)| w.filter(|w| *w > Decimal::ZERO).map(|w| (*v, w)))
        .collect();
    if weighted.is_empty() {
        return mean(pairs.iter().map(|(v, _)| *v));
    }

    let total_weight = checked_sum(weighted.iter().map(|(_, w)| *w))?;
    let exact = weighted
        .iter()
        .try_fold(Decimal::ZERO, |acc, (v, w)| acc.checked_add(v.checked_mul(*w)?));
    match exact {
        Some(sum) => sum.checked_div(total_weight),
        // Products overflowed: weigh by share of the total instead.
        None => weighted.iter().try_fold(Decimal::ZERO, |acc, (v, w)| {
            acc.checked_add(v.checked_mul(*w / total_weight)?)
        }),
    }
}

/// Sum of the present values; `None` when none are present or the sum
/// leaves the `Decimal` range.
pub(crate) fn sum_present(values: impl IntoIterator<Item = Option<Decimal>>) -> Option<Decimal> {
    let mut present = values.into_iter().flatten().peekable();
    present.peek()?;
    checked_sum(present)
}

/// Population standard deviation; `None` for fewer than two values or
/// when the variance overflows.
pub(crate) fn std_dev(values: &[Decimal]) -> Option<Decimal> {
    if values.len() < 2 {
        return None;
    }
    let avg = mean(values.iter().copied())?;
    let squares = values
        .iter()
        .map(|v| {
            let deviation = v.checked_sub(avg)?;
            deviation.checked_mul(deviation)
        })
        .collect::<Option<Vec<Decimal>>>()?;
    let variance = mean(squares)?;
    let variance_f64 = variance.to_f64()?;
    Decimal::from_f64_retain(variance_f64.sqrt())
}

/// Overflow-checked sum.
pub(crate) fn checked_sum(values: impl IntoIterator<Item = Decimal>) -> Option<Decimal> {
    values
        .into_iter()
        .try_fold(Decimal::ZERO, |acc, v| acc.checked_add(v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_mean() {
        assert_eq!(mean([dec!(100), dec!(102), dec!(98)]), Some(dec!(100)));
        assert_eq!(mean(Vec::<Decimal>::new()), None);
    }

    #[test]
    fn test_weighted_mean_ignores_unweighted_values() {
        let pairs = [
            (dec!(10), Some(dec!(3))),
            (dec!(-10), Some(dec!(1))),
            (dec!(50), None),
        ];
        assert_eq!(weighted_mean(&pairs), Some(dec!(5)));
    }

    #[test]
    fn test_weighted_mean_falls_back_to_plain_mean() {
        let pairs = [(dec!(4), None), (dec!(8), Some(dec!(0)))];
        assert_eq!(weighted_mean(&pairs), Some(dec!(6)));
        assert_eq!(weighted_mean(&[]), None);
    }

    #[test]
    fn test_sum_present() {
        assert_eq!(sum_present([Some(dec!(1)), None, Some(dec!(2))]), Some(dec!(3)));
        assert_eq!(sum_present([None, None]), None);
    }

    #[test]
    fn test_std_dev() {
        let values = [dec!(2), dec!(4), dec!(4), dec!(4), dec!(5), dec!(5), dec!(7), dec!(9)];
        assert_eq!(std_dev(&values), Some(dec!(2)));
        assert_eq!(std_dev(&[dec!(1)]), None);
    }

    #[test]
    fn test_mean_of_values_near_the_decimal_limit() {
        let half = Decimal::MAX / dec!(2);
        let avg = mean([Decimal::MAX, half]).unwrap();
        assert!(avg > half && avg < Decimal::MAX);
    }

    #[test]
    fn test_weighted_mean_with_oversized_products() {
        // 1e20 * 1e9 is past the Decimal range; shares keep it finite.
        let pairs = [
            (dec!(100000000000000000000), Some(dec!(1000000000))),
            (dec!(100000000000000000000), Some(dec!(1000000000))),
        ];
        assert_eq!(weighted_mean(&pairs), Some(dec!(100000000000000000000)));
    }

    #[test]
    fn test_weighted_mean_with_oversized_total_weight() {
        let pairs = [(dec!(1), Some(Decimal::MAX)), (dec!(2), Some(Decimal::MAX))];
        assert_eq!(weighted_mean(&pairs), None);
    }

    #[test]
    fn test_sum_present_overflow_is_absent() {
        assert_eq!(sum_present([Some(Decimal::MAX), Some(Decimal::MAX)]), None);
        assert_eq!(checked_sum([Decimal::MAX, Decimal::ONE]), None);
    }

    #[test]
    fn test_std_dev_overflow_is_absent() {
        assert_eq!(std_dev(&[Decimal::MAX, Decimal::MIN]), None);
    }
}
