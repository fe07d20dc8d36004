use chrono::{Datelike, Duration, NaiveDate};
use std::fmt;

/// Named historical date range over which performance is measured (inclusive on both ends)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LookbackWindow {
    pub name: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl LookbackWindow {
    pub fn new(name: &str, start: NaiveDate, end: NaiveDate) -> Self {
        Self { name: name.to_string(), start, end }
    }

    /// The `days` full days before `today`, today excluded
    pub fn last_days(days: i64, today: NaiveDate) -> Self {
        let end = today - Duration::days(1);
        let start = end - Duration::days(days.max(1) - 1);
        Self::new(&format!("LAST_{}_DAYS", days), start, end)
    }

    /// Same calendar day one year ago up to today
    pub fn last_year(today: NaiveDate) -> Self {
        // Feb 29 has no counterpart one year back
        let start = today
            .with_year(today.year() - 1)
            .unwrap_or_else(|| today - Duration::days(365));
        Self::new("LAST_YEAR", start, today)
    }

    /// Everything since 2000-01-01
    pub fn all_time(today: NaiveDate) -> Self {
        let start = NaiveDate::from_ymd_opt(2000, 1, 1).unwrap_or(today);
        Self::new("ALL_TIME", start, today)
    }

    pub fn is_valid(&self) -> bool {
        self.start <= self.end
    }

    /// Number of days covered, both ends included
    pub fn length_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// Date range in the `YYYYMMDD,YYYYMMDD` form used by reporting queries
    pub fn query_range(&self) -> String {
        format!("{},{}", self.start.format("%Y%m%d"), self.end.format("%Y%m%d"))
    }
}

impl fmt::Display for LookbackWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.query_range())
    }
}

/// Longest window first; equal lengths keep their given order
pub fn order_longest_first(windows: &[LookbackWindow]) -> Vec<LookbackWindow> {
    let mut ordered = windows.to_vec();
    ordered.sort_by(|a, b| b.length_days().cmp(&a.length_days()));
    ordered
}

/// One year, then 30, 14 and 7 days
pub fn standard_windows(today: NaiveDate) -> Vec<LookbackWindow> {
    vec![
        LookbackWindow::last_year(today),
        LookbackWindow::last_days(30, today),
        LookbackWindow::last_days(14, today),
        LookbackWindow::last_days(7, today),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_last_days_excludes_today() {
        let window = LookbackWindow::last_days(7, day(2024, 3, 10));
        assert_eq!(window.start, day(2024, 3, 3));
        assert_eq!(window.end, day(2024, 3, 9));
        assert_eq!(window.length_days(), 7);
        assert_eq!(window.name, "LAST_7_DAYS");
    }

    #[test]
    fn test_last_year_on_leap_day() {
        let window = LookbackWindow::last_year(day(2024, 2, 29));
        assert_eq!(window.start, day(2023, 3, 1));
        assert_eq!(window.end, day(2024, 2, 29));
    }

    #[test]
    fn test_query_range_format() {
        let window = LookbackWindow::all_time(day(2024, 6, 5));
        assert_eq!(window.query_range(), "20000101,20240605");
    }

    #[test]
    fn test_order_longest_first() {
        let today = day(2024, 6, 5);
        let given = vec![
            LookbackWindow::last_days(7, today),
            LookbackWindow::last_year(today),
            LookbackWindow::last_days(30, today),
        ];
        let names: Vec<String> = order_longest_first(&given).into_iter().map(|w| w.name).collect();
        assert_eq!(names, vec!["LAST_YEAR", "LAST_30_DAYS", "LAST_7_DAYS"]);
    }
}
