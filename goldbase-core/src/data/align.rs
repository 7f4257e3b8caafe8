//! Pairwise date alignment of two price series.
//!
//! Both series are clipped to their common date span and then paired by
//! date. A date present in only one series is dropped: there is no
//! forward-fill and no positional pairing.

use super::provider::PriceSeries;
use chrono::NaiveDate;
use std::collections::HashMap;

/// One date where both series have a close.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlignedPair {
    pub date: NaiveDate,
    pub left: f64,
    pub right: f64,
}

/// The overlapping span `[max(first dates), min(last dates)]`, or `None` if
/// either series is empty or the spans are disjoint.
pub fn common_span(left: &PriceSeries, right: &PriceSeries) -> Option<(NaiveDate, NaiveDate)> {
    let start = left.first_date()?.max(right.first_date()?);
    let end = left.last_date()?.min(right.last_date()?);
    (start <= end).then_some((start, end))
}

/// Pair two series by date inside their common span, ascending.
pub fn align_pair(left: &PriceSeries, right: &PriceSeries) -> Vec<AlignedPair> {
    let Some((start, end)) = common_span(left, right) else {
        return Vec::new();
    };

    let right = right.restrict(start, end);
    let by_date: HashMap<NaiveDate, f64> =
        right.points().iter().map(|p| (p.date, p.close)).collect();

    left.restrict(start, end)
        .points()
        .iter()
        .filter_map(|p| {
            by_date.get(&p.date).map(|&r| AlignedPair {
                date: p.date,
                left: p.close,
                right: r,
            })
        })
        .collect()
}
