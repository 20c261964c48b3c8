//! Holiday calendar.
//!
//! The builtin table covers national and religious holidays for 2023, 2024
//! and 2025. Dates outside those years never resolve to a holiday; callers
//! that need other years build an explicit calendar with
//! [`HolidayCalendar::from_entries`].

use crate::error::{ForecastError, Result};
use chrono::{Datelike, NaiveDate};
use std::collections::{BTreeSet, HashMap};
use std::sync::OnceLock;

/// Text written for days without a holiday.
pub const NO_HOLIDAY: &str = "None";

const BUILTIN_HOLIDAYS: &[(&str, &str)] = &[
    // 2023
    ("2023-01-26", "Republic Day"),
    ("2023-08-15", "Independence Day"),
    ("2023-10-02", "Gandhi Jayanti"),
    ("2023-01-14", "Makar Sankranti"),
    ("2023-03-08", "Holi"),
    ("2023-04-22", "Eid al-Fitr"),
    ("2023-08-29", "Raksha Bandhan"),
    ("2023-08-30", "Janmashtami"),
    ("2023-09-19", "Ganesh Chaturthi"),
    ("2023-10-24", "Diwali"),
    ("2023-11-12", "Guru Nanak Jayanti"),
    ("2023-12-25", "Christmas"),
    // 2024
    ("2024-01-26", "Republic Day"),
    ("2024-08-15", "Independence Day"),
    ("2024-10-02", "Gandhi Jayanti"),
    ("2024-01-15", "Makar Sankranti"),
    ("2024-03-25", "Holi"),
    ("2024-04-11", "Eid al-Fitr"),
    ("2024-08-19", "Raksha Bandhan"),
    ("2024-08-26", "Janmashtami"),
    ("2024-09-07", "Ganesh Chaturthi"),
    ("2024-11-01", "Diwali"),
    ("2024-11-15", "Guru Nanak Jayanti"),
    ("2024-12-25", "Christmas"),
    // 2025
    ("2025-01-26", "Republic Day"),
    ("2025-03-31", "Holi"),
    ("2025-08-15", "Independence Day"),
    ("2025-10-02", "Gandhi Jayanti"),
    ("2025-01-03", "Makar Sankranti"),
    ("2025-03-14", "Maha Shivaratri"),
    ("2025-04-01", "Eid al-Fitr"),
    ("2025-08-08", "Raksha Bandhan"),
    ("2025-08-16", "Janmashtami"),
    ("2025-08-28", "Ganesh Chaturthi"),
    ("2025-10-22", "Diwali"),
    ("2025-11-05", "Guru Nanak Jayanti"),
    ("2025-12-25", "Christmas"),
];

static BUILTIN: OnceLock<HolidayCalendar> = OnceLock::new();

/// Immutable mapping from calendar date to holiday name.
#[derive(Debug, Clone, Default)]
pub struct HolidayCalendar {
    entries: HashMap<NaiveDate, String>,
}

impl HolidayCalendar {
    /// The builtin 2023-2025 table, initialised on first use.
    pub fn builtin() -> &'static HolidayCalendar {
        BUILTIN.get_or_init(|| {
            let entries = BUILTIN_HOLIDAYS
                .iter()
                .filter_map(|(date, name)| {
                    NaiveDate::parse_from_str(date, "%Y-%m-%d")
                        .ok()
                        .map(|d| (d, (*name).to_string()))
                })
                .collect();
            HolidayCalendar { entries }
        })
    }

    /// Build a calendar from explicit `(date, name)` entries.
    ///
    /// A date listed twice is rejected rather than silently overwritten.
    pub fn from_entries<I, S>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (NaiveDate, S)>,
        S: Into<String>,
    {
        let mut map = HashMap::new();
        for (date, name) in entries {
            if map.insert(date, name.into()).is_some() {
                return Err(ForecastError::InvalidInput(format!(
                    "Holiday date {} listed more than once",
                    date
                )));
            }
        }
        Ok(Self { entries: map })
    }

    /// Holiday name for `date`, if any.
    pub fn lookup(&self, date: NaiveDate) -> Option<&str> {
        self.entries.get(&date).map(String::as_str)
    }

    /// Holiday name for an ISO `YYYY-MM-DD` string, or [`NO_HOLIDAY`].
    pub fn lookup_iso(&self, date: &str) -> Result<&str> {
        let parsed = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
            .map_err(|_| ForecastError::InvalidDateFormat(format!("'{}' is not YYYY-MM-DD", date)))?;
        Ok(self.lookup(parsed).unwrap_or(NO_HOLIDAY))
    }

    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        self.entries.contains_key(&date)
    }

    /// Years with at least one entry, ascending.
    pub fn covered_years(&self) -> Vec<i32> {
        let years: BTreeSet<i32> = self.entries.keys().map(|d| d.year()).collect();
        years.into_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_republic_day_every_covered_year() {
        let calendar = HolidayCalendar::builtin();
        for iso in ["2023-01-26", "2024-01-26", "2025-01-26"] {
            assert_eq!(calendar.lookup_iso(iso).unwrap(), "Republic Day");
        }
    }

    #[test]
    fn test_outside_covered_years_is_sentinel() {
        let calendar = HolidayCalendar::builtin();
        assert_eq!(calendar.lookup_iso("2022-01-26").unwrap(), NO_HOLIDAY);
        assert_eq!(calendar.lookup_iso("2026-12-25").unwrap(), NO_HOLIDAY);
        assert!(calendar.lookup(date(2026, 8, 15)).is_none());
    }

    #[test]
    fn test_ordinary_day_is_sentinel() {
        let calendar = HolidayCalendar::builtin();
        assert_eq!(calendar.lookup_iso("2024-06-03").unwrap(), NO_HOLIDAY);
    }

    #[test]
    fn test_builtin_table_shape() {
        let calendar = HolidayCalendar::builtin();
        assert_eq!(calendar.len(), BUILTIN_HOLIDAYS.len());
        assert_eq!(calendar.covered_years(), vec![2023, 2024, 2025]);
        assert_eq!(calendar.lookup(date(2025, 3, 14)), Some("Maha Shivaratri"));
        assert_eq!(calendar.lookup(date(2024, 11, 1)), Some("Diwali"));
    }

    #[test]
    fn test_invalid_iso_date() {
        let calendar = HolidayCalendar::builtin();
        assert!(matches!(
            calendar.lookup_iso("26/01/2023"),
            Err(ForecastError::InvalidDateFormat(_))
        ));
    }

    #[test]
    fn test_explicit_calendar() {
        let calendar =
            HolidayCalendar::from_entries(vec![(date(2026, 1, 26), "Republic Day")]).unwrap();
        assert!(calendar.is_holiday(date(2026, 1, 26)));
        assert!(!calendar.is_holiday(date(2025, 1, 26)));

        let duplicate = HolidayCalendar::from_entries(vec![
            (date(2026, 1, 26), "Republic Day"),
            (date(2026, 1, 26), "Other"),
        ]);
        assert!(duplicate.is_err());
    }
}
