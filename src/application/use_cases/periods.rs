use crate::domain::period::{Aggregation, Bucket, DateRange, Delta, Granularity, PeriodKind};
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use std::collections::BTreeMap;

/// Calendar period of `kind` containing `reference`. Weeks start on Monday.
pub fn period_range(kind: PeriodKind, reference: NaiveDate) -> DateRange {
    match kind {
        PeriodKind::Year => DateRange::new(
            ymd(reference.year(), 1, 1),
            ymd(reference.year(), 12, 31),
        ),
        PeriodKind::Quarter => {
            let first_month = (reference.month0() / 3) * 3 + 1;
            let start = ymd(reference.year(), first_month, 1);
            DateRange::new(start, add_months(start, 3) - Duration::days(1))
        }
        PeriodKind::Month => {
            let start = ymd(reference.year(), reference.month(), 1);
            DateRange::new(start, add_months(start, 1) - Duration::days(1))
        }
        PeriodKind::Week => {
            let start = reference - Duration::days(reference.weekday().num_days_from_monday() as i64);
            DateRange::new(start, start + Duration::days(6))
        }
        PeriodKind::Day => DateRange::new(reference, reference),
    }
}

/// Range of the same length that ends the day before `range` starts.
pub fn previous_range(range: DateRange) -> DateRange {
    let end = range.start - Duration::days(1);
    let start = range.start - Duration::days(range.len_days());
    DateRange::new(start, end)
}

pub fn bucket_start(date: NaiveDate, granularity: Granularity) -> NaiveDate {
    match granularity {
        Granularity::Day => date,
        Granularity::Week => date - Duration::days(date.weekday().num_days_from_monday() as i64),
        Granularity::Month => ymd(date.year(), date.month(), 1),
    }
}

/// Buckets timestamped values and aggregates each bucket. Buckets are sorted
/// by start date; buckets without points are not emitted.
pub fn resample(
    points: &[(NaiveDateTime, f64)],
    granularity: Granularity,
    aggregation: Aggregation,
) -> Vec<Bucket> {
    let mut buckets: BTreeMap<NaiveDate, (f64, usize)> = BTreeMap::new();
    for (ts, value) in points {
        let entry = buckets
            .entry(bucket_start(ts.date(), granularity))
            .or_insert((0.0, 0));
        entry.0 += value;
        entry.1 += 1;
    }

    buckets
        .into_iter()
        .map(|(start, (sum, count))| Bucket {
            start,
            value: match aggregation {
                Aggregation::Sum => sum,
                Aggregation::Mean => sum / count as f64,
                Aggregation::Count => count as f64,
            },
        })
        .collect()
}

pub fn delta(current: f64, previous: f64) -> Delta {
    let change = current - previous;
    let change_pct = if previous != 0.0 {
        change / previous * 100.0
    } else {
        0.0
    };
    Delta {
        current,
        previous,
        change,
        change_pct,
    }
}

fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or(NaiveDate::MIN)
}

fn add_months(first_of_month: NaiveDate, months: u32) -> NaiveDate {
    let total = first_of_month.month0() + months;
    ymd(first_of_month.year() + (total / 12) as i32, total % 12 + 1, 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_period_ranges() {
        let reference = d(2024, 2, 14);
        assert_eq!(period_range(PeriodKind::Year, reference), DateRange::new(d(2024, 1, 1), d(2024, 12, 31)));
        assert_eq!(period_range(PeriodKind::Quarter, reference), DateRange::new(d(2024, 1, 1), d(2024, 3, 31)));
        assert_eq!(period_range(PeriodKind::Month, reference), DateRange::new(d(2024, 2, 1), d(2024, 2, 29)));
        // 2024-02-14 is a Wednesday
        assert_eq!(period_range(PeriodKind::Week, reference), DateRange::new(d(2024, 2, 12), d(2024, 2, 18)));
        assert_eq!(period_range(PeriodKind::Day, reference), DateRange::new(reference, reference));
        assert_eq!(
            period_range(PeriodKind::Quarter, d(2023, 11, 30)),
            DateRange::new(d(2023, 10, 1), d(2023, 12, 31))
        );
        assert_eq!(
            period_range(PeriodKind::Month, d(2023, 12, 5)),
            DateRange::new(d(2023, 12, 1), d(2023, 12, 31))
        );
    }

    #[test]
    fn test_previous_range_has_equal_length_and_is_adjacent() {
        let references = [d(2024, 1, 1), d(2024, 3, 15), d(2023, 7, 31), d(2025, 12, 31)];
        let kinds = [PeriodKind::Year, PeriodKind::Quarter, PeriodKind::Month, PeriodKind::Week, PeriodKind::Day];
        for reference in references {
            for kind in kinds {
                let current = period_range(kind, reference);
                let previous = previous_range(current);
                assert_eq!(previous.len_days(), current.len_days(), "{:?} {}", kind, reference);
                assert_eq!(previous.end + Duration::days(1), current.start);
            }
        }
    }

    #[test]
    fn test_previous_month_of_march() {
        let previous = previous_range(period_range(PeriodKind::Month, d(2024, 3, 10)));
        assert_eq!(previous, DateRange::new(d(2024, 1, 31), d(2024, 2, 29)));
    }

    #[test]
    fn test_resample_by_week_and_month() {
        let at = |y, m, day| d(y, m, day).and_hms_opt(10, 0, 0).unwrap();
        let points = vec![
            (at(2024, 1, 1), 10.0),
            (at(2024, 1, 3), 20.0),
            (at(2024, 1, 8), 5.0),
            (at(2024, 2, 2), 1.0),
        ];

        let weekly = resample(&points, Granularity::Week, Aggregation::Sum);
        assert_eq!(weekly.len(), 3);
        assert_eq!(weekly[0], Bucket { start: d(2024, 1, 1), value: 30.0 });
        assert_eq!(weekly[1], Bucket { start: d(2024, 1, 8), value: 5.0 });
        assert_eq!(weekly[2].start, d(2024, 1, 29));

        let monthly = resample(&points, Granularity::Month, Aggregation::Mean);
        assert_eq!(monthly[0], Bucket { start: d(2024, 1, 1), value: 35.0 / 3.0 });
        assert_eq!(monthly[1], Bucket { start: d(2024, 2, 1), value: 1.0 });

        let daily = resample(&points, Granularity::Day, Aggregation::Count);
        assert_eq!(daily.len(), 4);
        assert!(daily.iter().all(|b| b.value == 1.0));
    }

    #[test]
    fn test_delta_with_zero_previous() {
        assert_eq!(delta(5.0, 0.0).change_pct, 0.0);
        let d = delta(150.0, 100.0);
        assert_eq!(d.change, 50.0);
        assert_eq!(d.change_pct, 50.0);
    }
}
