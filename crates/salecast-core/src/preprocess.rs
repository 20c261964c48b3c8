//! Split raw `DateTime` stamps into `date`/`time` columns and tag holidays.
//!
//! All other input columns pass through unchanged. An existing `date`,
//! `time` or `Holiday` column is overwritten in place.

use crate::error::{ForecastError, Result};
use crate::holidays::{HolidayCalendar, NO_HOLIDAY};
use crate::transactions::{parse_timestamp, DATETIME_COLUMN, DATE_COLUMN, HOLIDAY_COLUMN};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use tracing::info;

const TIME_COLUMN: &str = "time";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreprocessSummary {
    pub rows: usize,
    /// Rows whose date is a calendar holiday.
    pub holiday_rows: usize,
}

/// Process CSV text from `reader` into `writer`.
pub fn preprocess<R: Read, W: Write>(
    reader: R,
    writer: W,
    calendar: &HolidayCalendar,
) -> Result<PreprocessSummary> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = csv_reader.headers()?.clone();

    let datetime_idx = headers
        .iter()
        .position(|h| h == DATETIME_COLUMN)
        .ok_or_else(|| ForecastError::MissingColumn(DATETIME_COLUMN.to_string()))?;

    let mut out_headers: Vec<String> = headers.iter().map(str::to_string).collect();
    let mut slot = |name: &str| match out_headers.iter().position(|h| h == name) {
        Some(i) => i,
        None => {
            out_headers.push(name.to_string());
            out_headers.len() - 1
        }
    };
    let date_idx = slot(DATE_COLUMN);
    let time_idx = slot(TIME_COLUMN);
    let holiday_idx = slot(HOLIDAY_COLUMN);

    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(&out_headers)?;

    let mut summary = PreprocessSummary {
        rows: 0,
        holiday_rows: 0,
    };
    for (line_num, record) in csv_reader.records().enumerate() {
        let record = record?;
        let raw = record.get(datetime_idx).unwrap_or("");
        let timestamp = parse_timestamp(raw).ok_or_else(|| {
            ForecastError::InvalidDateFormat(format!(
                "Invalid DateTime at line {}: '{}'",
                line_num + 2,
                raw
            ))
        })?;

        let mut row: Vec<String> = record.iter().map(str::to_string).collect();
        row.resize(out_headers.len(), String::new());

        let holiday = calendar.lookup(timestamp.date());
        if holiday.is_some() {
            summary.holiday_rows += 1;
        }
        row[date_idx] = timestamp.format("%Y-%m-%d").to_string();
        row[time_idx] = timestamp.format("%H:%M:%S").to_string();
        row[holiday_idx] = holiday.unwrap_or(NO_HOLIDAY).to_string();

        csv_writer.write_record(&row)?;
        summary.rows += 1;
    }
    csv_writer.flush()?;

    Ok(summary)
}

/// Process the CSV at `input` and write the result to `output`.
pub fn preprocess_file<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
    calendar: &HolidayCalendar,
) -> Result<PreprocessSummary> {
    let reader = File::open(input.as_ref())?;
    let writer = File::create(output.as_ref())?;
    let summary = preprocess(reader, writer, calendar)?;
    info!(
        rows = summary.rows,
        holiday_rows = summary.holiday_rows,
        output = %output.as_ref().display(),
        "processed data saved"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transactions::TransactionTable;
    use chrono::NaiveDate;

    const RAW: &str = "\
DateTime,Items,Quantity
2023-01-25 08:15:00,Bread,4
2023-01-26 17:40:12,Cake,2
2023-01-27 09:00:00,Bread,6
";

    #[test]
    fn test_adds_columns() {
        let mut out = Vec::new();
        let summary = preprocess(RAW.as_bytes(), &mut out, HolidayCalendar::builtin()).unwrap();
        assert_eq!(summary.rows, 3);
        assert_eq!(summary.holiday_rows, 1);

        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("DateTime,Items,Quantity,date,time,Holiday"));
        assert_eq!(
            lines.next(),
            Some("2023-01-25 08:15:00,Bread,4,2023-01-25,08:15:00,None")
        );
        assert_eq!(
            lines.next(),
            Some("2023-01-26 17:40:12,Cake,2,2023-01-26,17:40:12,Republic Day")
        );
    }

    #[test]
    fn test_round_trip_through_reader() {
        let mut out = Vec::new();
        preprocess(RAW.as_bytes(), &mut out, HolidayCalendar::builtin()).unwrap();
        let table = TransactionTable::from_reader(out.as_slice()).unwrap();

        assert_eq!(table.len(), 3);
        assert!(table.has_holiday);
        let dates: Vec<NaiveDate> = table.rows.iter().map(|r| r.date()).collect();
        assert_eq!(dates[1], NaiveDate::from_ymd_opt(2023, 1, 26).unwrap());
        assert_eq!(table.rows[0].holiday, None);
        assert_eq!(table.rows[1].holiday.as_deref(), Some("Republic Day"));
        assert_eq!(table.rows[2].item.as_deref(), Some("Bread"));
    }

    #[test]
    fn test_existing_holiday_column_overwritten() {
        let raw = "DateTime,Quantity,Holiday\n2024-12-25 10:00,1,\n2024-12-26 10:00,1,Boxing Day\n";
        let mut out = Vec::new();
        preprocess(raw.as_bytes(), &mut out, HolidayCalendar::builtin()).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "DateTime,Quantity,Holiday,date,time");
        assert!(lines[1].ends_with(",Christmas,2024-12-25,10:00:00"));
        assert!(lines[2].ends_with(",None,2024-12-26,10:00:00"));
    }

    #[test]
    fn test_missing_datetime_column() {
        let raw = "date,Quantity\n2024-01-01,1\n";
        let err = preprocess(raw.as_bytes(), Vec::new(), HolidayCalendar::builtin()).unwrap_err();
        assert!(matches!(err, ForecastError::MissingColumn(c) if c == "DateTime"));
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input_data.csv");
        let output = dir.path().join("processed_data.csv");
        std::fs::write(&input, RAW).unwrap();

        let summary = preprocess_file(&input, &output, HolidayCalendar::builtin()).unwrap();
        assert_eq!(summary.rows, 3);
        let table = TransactionTable::from_path(&output).unwrap();
        assert_eq!(table.len(), 3);
    }
}
