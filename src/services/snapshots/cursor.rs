// File: src/services/snapshots/cursor.rs
use crate::db::postgres::models::snapshot_record::LatestSnapshot;
use chrono::{Days, NaiveDate};

/// Next snapshot date to acquire. Moves forward only after a batch is committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesCursor {
    next: NaiveDate,
    period: Days,
}

impl SeriesCursor {
    pub fn from_latest(latest: LatestSnapshot, epoch_start: NaiveDate, period_days: u32) -> Self {
        let period = Days::new(u64::from(period_days));
        let next = match latest {
            LatestSnapshot::TableMissing | LatestSnapshot::Empty => epoch_start,
            LatestSnapshot::Latest(date) => step(date, period),
        };
        Self { next, period }
    }

    pub fn next(&self) -> NaiveDate {
        self.next
    }

    pub fn advance(&mut self) -> NaiveDate {
        self.next = step(self.next, self.period);
        self.next
    }

    /// The series is complete once the next date is not before `today`.
    pub fn is_caught_up(&self, today: NaiveDate) -> bool {
        self.next >= today
    }
}

fn step(date: NaiveDate, period: Days) -> NaiveDate {
    date.checked_add_days(period).unwrap_or(NaiveDate::MAX)
}
