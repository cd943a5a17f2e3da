use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthWindow {
    pub year: i32,
    pub month: u32,
}

impl MonthWindow {
    /// Returns `None` when `month` is outside 1..=12.
    pub fn new(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1)?;
        Some(Self { year, month })
    }

    pub fn current() -> Self {
        let now = Utc::now();
        Self {
            year: now.year(),
            month: now.month(),
        }
    }

    /// First instant of the month in UTC.
    pub fn lower_bound(&self) -> Option<DateTime<Utc>> {
        let start = NaiveDate::from_ymd_opt(self.year, self.month, 1)?.and_hms_opt(0, 0, 0)?;
        Some(Utc.from_utc_datetime(&start))
    }

    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        timestamp.year() == self.year && timestamp.month() == self.month
    }

    pub fn label(&self) -> String {
        format!("{:04}-{:02}", self.year, self.month)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetrievalWindow {
    Month(MonthWindow),
    Ids(Vec<u64>),
}

impl RetrievalWindow {
    pub fn label(&self) -> Option<String> {
        match self {
            Self::Month(window) => Some(window.label()),
            Self::Ids(_) => None,
        }
    }
}
