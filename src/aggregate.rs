//! Account/creation-date aggregation.
//!
//! Reduces tweet records to one row per (handle, creation date) and counts
//! how many accounts share each creation date.

use crate::records::TweetRecord;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct AccountDate {
    pub creation_date: NaiveDate,
    pub handle: String,
}

/// Accounts first observed with a given creation date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreationDateGroup {
    pub date: NaiveDate,
    pub handles: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Quantile {
    pub percent: u8,
    pub value: f64,
}

/// Keeps records whose text contains `needle`, ignoring case.
pub fn filter_by_text(records: &[TweetRecord], needle: &str) -> Vec<TweetRecord> {
    let needle = needle.to_lowercase();
    records
        .iter()
        .filter(|r| {
            r.text
                .as_deref()
                .is_some_and(|t| t.to_lowercase().contains(&needle))
        })
        .cloned()
        .collect()
}

/// One entry per distinct (handle, creation date), ordered by date then handle.
pub fn aggregate(records: &[TweetRecord]) -> Vec<AccountDate> {
    let pairs: BTreeSet<AccountDate> = records
        .iter()
        .map(|r| AccountDate {
            creation_date: r.account_created_at.date_naive(),
            handle: r.screen_name.clone(),
        })
        .collect();
    debug!(records = records.len(), pairs = pairs.len(), "aggregated accounts");
    pairs.into_iter().collect()
}

pub fn count_by_date(pairs: &[AccountDate]) -> BTreeMap<NaiveDate, usize> {
    pairs.iter().fold(BTreeMap::new(), |mut counts, pair| {
        *counts.entry(pair.creation_date).or_insert(0) += 1;
        counts
    })
}

/// Keeps pairs whose date has strictly more than `threshold` accounts.
pub fn filter_by_min_count(
    pairs: &[AccountDate],
    counts: &BTreeMap<NaiveDate, usize>,
    threshold: usize,
) -> Vec<AccountDate> {
    pairs
        .iter()
        .filter(|p| counts.get(&p.creation_date).is_some_and(|&n| n > threshold))
        .cloned()
        .collect()
}

/// Inclusive creation-date range; `None` leaves that side open.
pub fn filter_by_date_range(
    pairs: &[AccountDate],
    after: Option<NaiveDate>,
    before: Option<NaiveDate>,
) -> Vec<AccountDate> {
    pairs
        .iter()
        .filter(|p| after.is_none_or(|a| p.creation_date >= a))
        .filter(|p| before.is_none_or(|b| p.creation_date <= b))
        .cloned()
        .collect()
}

pub fn group_by_date(pairs: &[AccountDate]) -> Vec<CreationDateGroup> {
    let mut groups: BTreeMap<NaiveDate, Vec<String>> = BTreeMap::new();
    for pair in pairs {
        groups
            .entry(pair.creation_date)
            .or_default()
            .push(pair.handle.clone());
    }
    groups
        .into_iter()
        .map(|(date, handles)| CreationDateGroup { date, handles })
        .collect()
}

/// Distinct handles in first-seen order.
pub fn handles(pairs: &[AccountDate]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    pairs
        .iter()
        .filter(|p| seen.insert(p.handle.as_str()))
        .map(|p| p.handle.clone())
        .collect()
}

/// Quartiles of accounts-per-date, interpolating between order statistics.
pub fn count_quantiles(counts: &BTreeMap<NaiveDate, usize>) -> Vec<Quantile> {
    let mut values: Vec<f64> = counts.values().map(|&n| n as f64).collect();
    if values.is_empty() {
        return Vec::new();
    }
    values.sort_by(f64::total_cmp);

    [0u8, 25, 50, 75, 100]
        .into_iter()
        .map(|percent| {
            let h = (values.len() - 1) as f64 * f64::from(percent) / 100.0;
            let lo = h.floor() as usize;
            let hi = (lo + 1).min(values.len() - 1);
            let value = values[lo] + (h - lo as f64) * (values[hi] - values[lo]);
            Quantile { percent, value }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::parse_timestamp;

    fn record(handle: &str, ts: &str) -> TweetRecord {
        TweetRecord::new(handle, parse_timestamp(ts).unwrap())
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn two_day_table() -> Vec<TweetRecord> {
        let mut records = vec![
            record("early1", "2021-08-01 09:00:00"),
            record("early2", "2021-08-01 18:00:00"),
        ];
        for i in 0..5 {
            records.push(record(&format!("late{i}"), "2021-08-02 12:00:00"));
        }
        records
    }

    #[test]
    fn aggregate_dedups_and_floors_to_day() {
        let records = vec![
            record("bob", "2021-08-01 23:59:59"),
            record("bob", "2021-08-01 00:00:00"),
            record("amy", "2021-08-01 12:00:00"),
        ];
        let pairs = aggregate(&records);
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].handle, "amy");
        assert!(pairs.iter().all(|p| p.creation_date == date("2021-08-01")));
    }

    #[test]
    fn threshold_is_strictly_greater() {
        let pairs = aggregate(&two_day_table());
        let counts = count_by_date(&pairs);
        assert_eq!(counts[&date("2021-08-01")], 2);
        assert_eq!(counts[&date("2021-08-02")], 5);

        let kept = filter_by_min_count(&pairs, &counts, 4);
        assert_eq!(kept.len(), 5);
        assert!(kept.iter().all(|p| p.creation_date == date("2021-08-02")));

        assert!(filter_by_min_count(&pairs, &counts, 5).is_empty());
    }

    #[test]
    fn aggregation_is_idempotent() {
        let records = two_day_table();
        let first = aggregate(&records);
        let second = aggregate(&records);
        assert_eq!(first, second);
        assert_eq!(count_by_date(&first), count_by_date(&second));
    }

    #[test]
    fn empty_input_gives_empty_tables() {
        let pairs = aggregate(&[]);
        assert!(pairs.is_empty());
        let counts = count_by_date(&pairs);
        assert!(counts.is_empty());
        assert!(filter_by_min_count(&pairs, &counts, 0).is_empty());
        assert!(count_quantiles(&counts).is_empty());
    }

    #[test]
    fn date_range_is_inclusive() {
        let pairs = aggregate(&two_day_table());
        let only_late = filter_by_date_range(&pairs, Some(date("2021-08-02")), None);
        assert_eq!(only_late.len(), 5);
        let only_early = filter_by_date_range(&pairs, None, Some(date("2021-08-01")));
        assert_eq!(only_early.len(), 2);
        assert_eq!(filter_by_date_range(&pairs, None, None).len(), 7);
    }

    #[test]
    fn text_filter_ignores_case() {
        let records = vec![
            record("a", "2021-08-01").with_text("Vote NOW for the thing"),
            record("b", "2021-08-01").with_text("unrelated"),
            record("c", "2021-08-01"),
        ];
        let kept = filter_by_text(&records, "vote now");
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].screen_name, "a");
    }

    #[test]
    fn quartiles_interpolate() {
        let counts = count_by_date(&aggregate(&two_day_table()));
        let q: Vec<f64> = count_quantiles(&counts).iter().map(|q| q.value).collect();
        assert_eq!(q, vec![2.0, 2.75, 3.5, 4.25, 5.0]);
    }

    #[test]
    fn groups_and_handles_follow_pairs() {
        let pairs = aggregate(&two_day_table());
        let groups = group_by_date(&pairs);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[1].handles.len(), 5);
        assert_eq!(handles(&pairs).len(), 7);
    }
}
