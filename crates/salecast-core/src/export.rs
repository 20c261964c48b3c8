//! CSV artifacts written by the batch pipeline.
//!
//! - summary: `Date, Recommended Quantity, Min Quantity, Max Quantity` (rounded)
//! - raw: `ds, yhat, yhat_lower, yhat_upper` (unrounded)
//! - decomposition: `ds, observed, trend, seasonal, remainder`

use crate::decomposition::DecompositionRow;
use crate::error::Result;
use crate::forecast::{ForecastPoint, RoundedForecast};
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRow {
    #[serde(rename = "Date")]
    pub date: NaiveDate,
    #[serde(rename = "Recommended Quantity")]
    pub recommended: i64,
    #[serde(rename = "Min Quantity")]
    pub min: i64,
    #[serde(rename = "Max Quantity")]
    pub max: i64,
}

impl From<&RoundedForecast> for SummaryRow {
    fn from(r: &RoundedForecast) -> Self {
        Self {
            date: r.date,
            recommended: r.forecast,
            min: r.lower,
            max: r.upper,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawForecastRow {
    pub ds: NaiveDate,
    pub yhat: f64,
    pub yhat_lower: f64,
    pub yhat_upper: f64,
}

impl From<&ForecastPoint> for RawForecastRow {
    fn from(p: &ForecastPoint) -> Self {
        Self {
            ds: p.date,
            yhat: p.forecast,
            yhat_lower: p.lower,
            yhat_upper: p.upper,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecompositionCsvRow {
    pub ds: NaiveDate,
    pub observed: f64,
    pub trend: f64,
    pub seasonal: f64,
    pub remainder: f64,
}

impl From<&DecompositionRow> for DecompositionCsvRow {
    fn from(r: &DecompositionRow) -> Self {
        Self {
            ds: r.date,
            observed: r.observed,
            trend: r.trend,
            seasonal: r.seasonal,
            remainder: r.remainder,
        }
    }
}

fn write_rows<W: Write, T: Serialize>(writer: W, rows: impl IntoIterator<Item = T>) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for row in rows {
        csv_writer.serialize(row)?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Read rows of any artifact type back from CSV.
pub fn read_rows<R: Read, T: DeserializeOwned>(reader: R) -> Result<Vec<T>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut rows = Vec::new();
    for row in csv_reader.deserialize() {
        rows.push(row?);
    }
    Ok(rows)
}

pub fn write_summary<W: Write>(writer: W, rounded: &[RoundedForecast]) -> Result<()> {
    write_rows(writer, rounded.iter().map(SummaryRow::from))
}

pub fn write_raw_forecast<W: Write>(writer: W, points: &[ForecastPoint]) -> Result<()> {
    write_rows(writer, points.iter().map(RawForecastRow::from))
}

pub fn write_decomposition<W: Write>(writer: W, rows: &[DecompositionRow]) -> Result<()> {
    write_rows(writer, rows.iter().map(DecompositionCsvRow::from))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn points() -> Vec<ForecastPoint> {
        vec![
            ForecastPoint {
                date: NaiveDate::from_ymd_opt(2023, 2, 3).unwrap(),
                forecast: 41.6,
                lower: 20.25,
                upper: 62.5,
            },
            ForecastPoint {
                date: NaiveDate::from_ymd_opt(2023, 2, 4).unwrap(),
                forecast: 58.4,
                lower: 30.1,
                upper: 86.7,
            },
        ]
    }

    #[test]
    fn test_summary_layout() {
        let rounded: Vec<RoundedForecast> = points().iter().map(ForecastPoint::rounded).collect();
        let mut out = Vec::new();
        write_summary(&mut out, &rounded).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Date,Recommended Quantity,Min Quantity,Max Quantity");
        assert_eq!(lines[1], "2023-02-03,42,20,62");

        let back: Vec<SummaryRow> = read_rows(text.as_bytes()).unwrap();
        assert_eq!(back.len(), 2);
        assert_eq!(back[1].recommended, 58);
    }

    #[test]
    fn test_raw_forecast_keeps_precision() {
        let mut out = Vec::new();
        write_raw_forecast(&mut out, &points()).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("ds,yhat,yhat_lower,yhat_upper\n"));

        let back: Vec<RawForecastRow> = read_rows(text.as_bytes()).unwrap();
        assert_eq!(back[0].yhat, 41.6);
        assert_eq!(back[0].yhat_lower, 20.25);
    }

    #[test]
    fn test_decomposition_file() {
        let rows = vec![DecompositionRow {
            date: NaiveDate::from_ymd_opt(2023, 2, 3).unwrap(),
            observed: 10.0,
            trend: 9.0,
            seasonal: 1.1,
            remainder: 1.01,
        }];
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("decomposition.csv");
        write_decomposition(std::fs::File::create(&path).unwrap(), &rows).unwrap();

        let back: Vec<DecompositionCsvRow> =
            read_rows(std::fs::File::open(&path).unwrap()).unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].trend, 9.0);
    }
}
