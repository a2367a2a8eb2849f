// src/week.rs
//! Calendar arithmetic shared by timesheets, reports and KPI queries.
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, Utc};

/// Monday of the week containing `date`.
pub fn week_start_of(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

pub fn week_end_of(week_start: NaiveDate) -> NaiveDate {
    week_start + Duration::days(6)
}

pub fn month_start(date: NaiveDate) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(date.year(), date.month(), 1)
}

pub fn next_month_start(date: NaiveDate) -> Option<NaiveDate> {
    if date.month() == 12 {
        NaiveDate::from_ymd_opt(date.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(date.year(), date.month() + 1, 1)
    }
}

pub fn quarter_start(date: NaiveDate) -> Option<NaiveDate> {
    let first_month = (date.month0() / 3) * 3 + 1;
    NaiveDate::from_ymd_opt(date.year(), first_month, 1)
}

pub fn year_start(date: NaiveDate) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(date.year(), 1, 1)
}

/// Start of the clock hour containing `at`.
pub fn hour_start(at: DateTime<Utc>) -> DateTime<Utc> {
    let secs = at.timestamp();
    DateTime::from_timestamp(secs - secs.rem_euclid(3600), 0).unwrap_or(at)
}

/// Half-open `[start, end)` interval in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at < self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Hourly,
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Yearly,
}

impl Period {
    /// Unknown names fall back to daily.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("hourly") => Period::Hourly,
            Some("weekly") => Period::Weekly,
            Some("monthly") => Period::Monthly,
            Some("quarterly") => Period::Quarterly,
            Some("yearly") => Period::Yearly,
            _ => Period::Daily,
        }
    }

    /// The period-sized window that contains `at`. Weeks start on Sunday here.
    pub fn range_around(&self, at: DateTime<Utc>) -> Option<TimeRange> {
        let date = at.date_naive();
        let (start, end) = match self {
            Period::Hourly => {
                let start = hour_start(at);
                return Some(TimeRange {
                    start,
                    end: start + Duration::hours(1),
                });
            }
            Period::Daily => (date, date + Duration::days(1)),
            Period::Weekly => {
                let start =
                    date - Duration::days(date.weekday().num_days_from_sunday() as i64);
                (start, start + Duration::days(7))
            }
            Period::Monthly => (month_start(date)?, next_month_start(date)?),
            Period::Quarterly => {
                let start = quarter_start(date)?;
                let end = if start.month() == 10 {
                    NaiveDate::from_ymd_opt(start.year() + 1, 1, 1)?
                } else {
                    NaiveDate::from_ymd_opt(start.year(), start.month() + 3, 1)?
                };
                (start, end)
            }
            Period::Yearly => (year_start(date)?, NaiveDate::from_ymd_opt(date.year() + 1, 1, 1)?),
        };
        Some(TimeRange {
            start: midnight(start),
            end: midnight(end),
        })
    }
}

pub fn midnight(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}

/// Accepts `YYYY-MM-DD`, an RFC 3339 timestamp, or a naive `YYYY-MM-DDTHH:MM:SS`.
pub fn parse_flexible_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc).date_naive());
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|dt| dt.date())
}

pub fn parse_flexible_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    parse_flexible_date(raw).map(midnight)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn week_start_is_monday() {
        // 2024-01-03 is a Wednesday
        assert_eq!(week_start_of(d(2024, 1, 3)), d(2024, 1, 1));
        assert_eq!(week_start_of(d(2024, 1, 1)), d(2024, 1, 1));
        assert_eq!(week_start_of(d(2024, 1, 7)), d(2024, 1, 1));
        assert_eq!(week_end_of(d(2024, 1, 1)), d(2024, 1, 7));
    }

    #[test]
    fn weekly_kpi_range_starts_on_sunday() {
        let at = Utc.with_ymd_and_hms(2024, 1, 3, 15, 30, 0).unwrap();
        let range = Period::Weekly.range_around(at).unwrap();
        assert_eq!(range.start, midnight(d(2023, 12, 31)));
        assert_eq!(range.end, midnight(d(2024, 1, 7)));
        assert!(range.contains(at));
    }

    #[test]
    fn hourly_and_daily_ranges() {
        let at = Utc.with_ymd_and_hms(2024, 5, 10, 9, 45, 12).unwrap();
        let hour = Period::Hourly.range_around(at).unwrap();
        assert_eq!(hour.start, Utc.with_ymd_and_hms(2024, 5, 10, 9, 0, 0).unwrap());
        assert_eq!(hour.end, Utc.with_ymd_and_hms(2024, 5, 10, 10, 0, 0).unwrap());

        let day = Period::Daily.range_around(at).unwrap();
        assert_eq!(day.start, midnight(d(2024, 5, 10)));
        assert_eq!(day.end, midnight(d(2024, 5, 11)));
    }

    #[test]
    fn quarter_and_year_wrap_correctly() {
        let at = Utc.with_ymd_and_hms(2024, 11, 20, 0, 0, 0).unwrap();
        let q = Period::Quarterly.range_around(at).unwrap();
        assert_eq!(q.start, midnight(d(2024, 10, 1)));
        assert_eq!(q.end, midnight(d(2025, 1, 1)));

        let m = Period::Monthly
            .range_around(Utc.with_ymd_and_hms(2024, 12, 5, 0, 0, 0).unwrap())
            .unwrap();
        assert_eq!(m.end, midnight(d(2025, 1, 1)));

        let y = Period::Yearly.range_around(at).unwrap();
        assert_eq!(y.start, midnight(d(2024, 1, 1)));
        assert_eq!(y.end, midnight(d(2025, 1, 1)));
    }

    #[test]
    fn unknown_period_is_daily() {
        assert_eq!(Period::parse(Some("fortnightly")), Period::Daily);
        assert_eq!(Period::parse(None), Period::Daily);
        assert_eq!(Period::parse(Some("Weekly")), Period::Weekly);
    }

    #[test]
    fn flexible_dates() {
        assert_eq!(parse_flexible_date("2024-01-01"), Some(d(2024, 1, 1)));
        assert_eq!(
            parse_flexible_date("2024-01-01T00:00:00.000Z"),
            Some(d(2024, 1, 1))
        );
        assert_eq!(parse_flexible_date("2024-01-01T10:00:00"), Some(d(2024, 1, 1)));
        assert_eq!(parse_flexible_date("yesterday"), None);
    }
}
