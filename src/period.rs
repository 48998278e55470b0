//! Calendar periods for analytics rollups
//!
//! Rollups are keyed by the UTC calendar period they cover. Each period type
//! fires once at its close (one second before the period rolls over), and the
//! bounds of the period are what the aggregation queries run against.

use std::fmt;

use chrono::{DateTime, Datelike, Days, Duration as ChronoDuration, Months, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Inclusive time range `[start, end]` used for aggregation queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts <= self.end
    }
}

/// Granularity of an analytics rollup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PeriodType {
    Daily,
    Monthly,
    Yearly,
}

impl PeriodType {
    pub const ALL: [PeriodType; 3] = [PeriodType::Daily, PeriodType::Monthly, PeriodType::Yearly];

    /// Bounds of the period containing `now`.
    ///
    /// The start is midnight of the first day of the period; the end is one
    /// millisecond before the next period starts, so timestamps written right
    /// up to the rollover still fall inside the closing period.
    pub fn bounds(self, now: DateTime<Utc>) -> TimeRange {
        let start = self.period_start(now.date_naive());
        let next = self.next_start(start);

        TimeRange {
            start: midnight(start),
            end: midnight(next) - ChronoDuration::milliseconds(1),
        }
    }

    /// The next instant at which a period of this type closes, strictly after
    /// `after`.
    ///
    /// A period closes at 23:59:59 UTC of its last day. When `after` already
    /// sits past today's close, the close of the following period is returned.
    pub fn next_close(self, after: DateTime<Utc>) -> DateTime<Utc> {
        let mut start = self.period_start(after.date_naive());

        loop {
            let close = midnight(self.next_start(start)) - ChronoDuration::seconds(1);
            if close > after {
                return close;
            }
            start = self.next_start(start);
        }
    }

    /// First calendar day of the period containing `date`.
    fn period_start(self, date: NaiveDate) -> NaiveDate {
        match self {
            PeriodType::Daily => date,
            PeriodType::Monthly => date - Days::new(u64::from(date.day0())),
            PeriodType::Yearly => date - Days::new(u64::from(date.ordinal0())),
        }
    }

    /// First calendar day of the period after the one starting at `start`.
    fn next_start(self, start: NaiveDate) -> NaiveDate {
        match self {
            PeriodType::Daily => start + Days::new(1),
            PeriodType::Monthly => start + Months::new(1),
            PeriodType::Yearly => start + Months::new(12),
        }
    }
}

impl fmt::Display for PeriodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeriodType::Daily => write!(f, "DAILY"),
            PeriodType::Monthly => write!(f, "MONTHLY"),
            PeriodType::Yearly => write!(f, "YEARLY"),
        }
    }
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}
