//! Transaction-level CSV ingestion.
//!
//! Expected columns:
//!   `date` (or `DateTime`), `Quantity` required;
//!   `Items`, `Holiday`, `Temperature (°C)` optional.

use crate::error::{ForecastError, Result};
use chrono::{NaiveDate, NaiveDateTime};
use std::fs::File;
use std::io::Read;
use std::path::Path;

pub const DATE_COLUMN: &str = "date";
pub const DATETIME_COLUMN: &str = "DateTime";
pub const QUANTITY_COLUMN: &str = "Quantity";
pub const ITEMS_COLUMN: &str = "Items";
pub const HOLIDAY_COLUMN: &str = "Holiday";
pub const TEMPERATURE_COLUMN: &str = "Temperature (°C)";

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d-%m-%Y"];
const TIME_FORMATS: &[&str] = &["%H:%M:%S%.f", "%H:%M:%S", "%H:%M"];

/// One sale event.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub timestamp: NaiveDateTime,
    pub item: Option<String>,
    pub quantity: f64,
    pub temperature: Option<f64>,
    /// Holiday name from the input row; `None` when the cell was empty or a
    /// "no holiday" marker.
    pub holiday: Option<String>,
}

impl Transaction {
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date()
    }
}

/// Parsed input table with the optional columns that were present.
#[derive(Debug, Clone, Default)]
pub struct TransactionTable {
    pub rows: Vec<Transaction>,
    pub has_items: bool,
    pub has_holiday: bool,
    pub has_temperature: bool,
}

impl TransactionTable {
    /// Load a table from any CSV reader.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = csv_reader.headers()?.clone();
        let position = |name: &str| headers.iter().position(|h| h == name);

        let date_idx = position(DATE_COLUMN).or_else(|| position(DATETIME_COLUMN));
        let quantity_idx = position(QUANTITY_COLUMN);

        let (date_idx, quantity_idx) = match (date_idx, quantity_idx) {
            (Some(d), Some(q)) => (d, q),
            (d, q) => {
                let mut missing = Vec::new();
                if d.is_none() {
                    missing.push(DATE_COLUMN);
                }
                if q.is_none() {
                    missing.push(QUANTITY_COLUMN);
                }
                return Err(ForecastError::MissingColumn(missing.join(", ")));
            }
        };

        let items_idx = position(ITEMS_COLUMN);
        let holiday_idx = position(HOLIDAY_COLUMN);
        let temperature_idx = position(TEMPERATURE_COLUMN);

        let mut rows = Vec::new();
        for (line_num, record) in csv_reader.records().enumerate() {
            let record = record?;
            let line = line_num + 2;
            let cell = |idx: usize| record.get(idx).unwrap_or("");

            let raw_date = cell(date_idx);
            let timestamp = parse_timestamp(raw_date).ok_or_else(|| {
                ForecastError::InvalidDateFormat(format!(
                    "Invalid date format in date column at line {}: '{}'",
                    line, raw_date
                ))
            })?;

            let quantity = parse_quantity(cell(quantity_idx), line)?;

            let item = items_idx
                .map(cell)
                .filter(|s| !s.is_empty())
                .map(str::to_string);

            let holiday = holiday_idx.and_then(|idx| normalize_holiday(cell(idx)));

            let temperature = match temperature_idx.map(cell) {
                Some(raw) if !raw.is_empty() => Some(raw.parse::<f64>().map_err(|_| {
                    ForecastError::InvalidInput(format!(
                        "Invalid temperature at line {}: '{}'",
                        line, raw
                    ))
                })?),
                _ => None,
            };

            rows.push(Transaction {
                timestamp,
                item,
                quantity,
                temperature,
                holiday,
            });
        }

        Ok(Self {
            rows,
            has_items: items_idx.is_some(),
            has_holiday: holiday_idx.is_some(),
            has_temperature: temperature_idx.is_some(),
        })
    }

    /// Load a table from a CSV file path.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Self::from_reader(file)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Parse a date or date-time cell.
///
/// Date-only values land at midnight.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return date.and_hms_opt(0, 0, 0);
        }
    }

    for date_fmt in DATE_FORMATS {
        for time_fmt in TIME_FORMATS {
            for sep in [" ", "T"] {
                let fmt = format!("{}{}{}", date_fmt, sep, time_fmt);
                if let Ok(ts) = NaiveDateTime::parse_from_str(s, &fmt) {
                    return Some(ts);
                }
            }
        }
    }

    None
}

/// Map "no holiday" markers (empty, `None`, `nan`) to `None`.
pub fn normalize_holiday(raw: &str) -> Option<String> {
    let s = raw.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("none") || s.eq_ignore_ascii_case("nan") {
        None
    } else {
        Some(s.to_string())
    }
}

fn parse_quantity(raw: &str, line: usize) -> Result<f64> {
    let value = raw.parse::<f64>().map_err(|_| {
        ForecastError::InvalidInput(format!("Invalid quantity at line {}: '{}'", line, raw))
    })?;
    if !value.is_finite() || value < 0.0 {
        return Err(ForecastError::InvalidInput(format!(
            "Quantity must be a non-negative number at line {}: '{}'",
            line, raw
        )));
    }
    Ok(value)
}
