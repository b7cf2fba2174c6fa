//! Dashboard aggregates over a user's history.

use chrono::{Days, NaiveDate};
use serde::Serialize;

use crate::analysis::Verdict;
use crate::history::HistoryItem;
use crate::kind::AnalysisKind;

pub const ACTIVITY_DAYS: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DayCount {
    pub date: NaiveDate,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct DashboardStats {
    pub total: usize,
    pub verified: usize,
    pub suspicious: usize,
    pub fake: usize,
    pub bookmarked: usize,
    pub text: usize,
    pub link: usize,
    pub image: usize,
    /// Oldest first, ending with `today`. Days are UTC calendar days.
    pub activity: Vec<DayCount>,
}

impl DashboardStats {
    pub fn from_items(items: &[HistoryItem], today: NaiveDate) -> Self {
        let mut stats = DashboardStats {
            total: items.len(),
            activity: (0..ACTIVITY_DAYS)
                .rev()
                .filter_map(|back| today.checked_sub_days(Days::new(back as u64)))
                .map(|date| DayCount { date, count: 0 })
                .collect(),
            ..Default::default()
        };

        for item in items {
            match item.verdict() {
                Verdict::Verified => stats.verified += 1,
                Verdict::Suspicious => stats.suspicious += 1,
                Verdict::Fake => stats.fake += 1,
                Verdict::Unknown => {}
            }
            match item.analysis_type {
                AnalysisKind::Text => stats.text += 1,
                AnalysisKind::Link => stats.link += 1,
                AnalysisKind::Image => stats.image += 1,
            }
            if item.is_bookmarked {
                stats.bookmarked += 1;
            }
            let day = item.created_at.date_naive();
            if let Some(bucket) = stats.activity.iter_mut().find(|d| d.date == day) {
                bucket.count += 1;
            }
        }
        stats
    }

    /// Non-zero verdict buckets for charting, as (label, count).
    pub fn verdict_breakdown(&self) -> Vec<(&'static str, usize)> {
        [
            ("Verified", self.verified),
            ("Suspicious", self.suspicious),
            ("Fake/Scam", self.fake),
        ]
        .into_iter()
        .filter(|(_, n)| *n > 0)
        .collect()
    }

    pub fn kind_breakdown(&self) -> Vec<(AnalysisKind, usize)> {
        [
            (AnalysisKind::Text, self.text),
            (AnalysisKind::Link, self.link),
            (AnalysisKind::Image, self.image),
        ]
        .into_iter()
        .filter(|(_, n)| *n > 0)
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::item;
    use chrono::Utc;

    #[test]
    fn legacy_verdict_words_share_buckets() {
        let items = vec![
            item("1", "verified", false, 0),
            item("2", "legitimate", true, 0),
            item("3", "uncertain", false, 1),
            item("4", "scam", true, 2),
            item("5", "fake", false, 3),
            item("6", "???", false, 3),
        ];
        let stats = DashboardStats::from_items(&items, Utc::now().date_naive());
        assert_eq!(stats.total, 6);
        assert_eq!((stats.verified, stats.suspicious, stats.fake), (2, 1, 2));
        assert_eq!(stats.bookmarked, 2);
        assert_eq!(stats.text, 6);
        assert_eq!(stats.kind_breakdown(), vec![(AnalysisKind::Text, 6)]);
    }

    #[test]
    fn activity_covers_seven_days_ending_today() {
        let mut items = vec![item("today", "fake", false, 0), item("old", "fake", false, 30)];
        items.push(item("today2", "fake", false, 0));
        let today = Utc::now().date_naive();
        let stats = DashboardStats::from_items(&items, today);

        assert_eq!(stats.activity.len(), ACTIVITY_DAYS);
        assert_eq!(stats.activity.last().unwrap().date, today);
        assert!(stats.activity[0].date < stats.activity[6].date);
        assert_eq!(stats.activity.last().unwrap().count, 2);
        assert_eq!(stats.activity.iter().map(|d| d.count).sum::<usize>(), 2);
    }

    #[test]
    fn empty_history_has_no_breakdown() {
        let stats = DashboardStats::from_items(&[], Utc::now().date_naive());
        assert!(stats.verdict_breakdown().is_empty());
        assert_eq!(stats.activity.len(), ACTIVITY_DAYS);
    }
}
