//! Daily aggregation and exogenous calendar features.
//!
//! Transactions are summed per calendar date, then each day gets the
//! regressors `dayofweek`, `month`, `is_weekend`, `is_holiday` and, when the
//! input carries readings, a mean `temperature`. The same builder extends the
//! features over a forecast horizon.

use crate::error::{ForecastError, Result};
use crate::holidays::HolidayCalendar;
use crate::imputation::{fill_nulls_forward, mean_of_present};
use crate::transactions::TransactionTable;
use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::Range;
use std::str::FromStr;
use tracing::warn;

/// Calendar regressors, in matrix column order.
pub const CALENDAR_FEATURES: [&str; 4] = ["dayofweek", "month", "is_weekend", "is_holiday"];

/// Name of the optional temperature regressor.
pub const TEMPERATURE_FEATURE: &str = "temperature";

/// Where historical holiday flags come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HolidaySource {
    /// The input row's own `Holiday` value.
    #[default]
    InputColumn,
    /// The holiday calendar, matched by exact date.
    Calendar,
}

impl FromStr for HolidaySource {
    type Err = ForecastError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "input_column" | "input" | "column" => Ok(Self::InputColumn),
            "calendar" | "static" => Ok(Self::Calendar),
            _ => Err(ForecastError::InvalidParameter {
                param: "holiday_source".to_string(),
                value: s.to_string(),
                reason: "expected 'input_column' or 'calendar'".to_string(),
            }),
        }
    }
}

/// How holidays are assumed over the forecast horizon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FutureHolidayPolicy {
    /// A future date is a holiday when its (month, day) matches a historical
    /// holiday date of any year.
    RecurringMonthDay,
    /// No future holidays.
    #[default]
    NoHolidays,
}

impl FromStr for FutureHolidayPolicy {
    type Err = ForecastError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "recurring_month_day" | "recurring" | "month_day" => Ok(Self::RecurringMonthDay),
            "no_holidays" | "none" => Ok(Self::NoHolidays),
            _ => Err(ForecastError::InvalidParameter {
                param: "future_holidays".to_string(),
                value: s.to_string(),
                reason: "expected 'recurring_month_day' or 'no_holidays'".to_string(),
            }),
        }
    }
}

/// Feature construction options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureConfig {
    pub holiday_source: HolidaySource,
    pub future_holidays: FutureHolidayPolicy,
    /// Insert zero-quantity rows for dates without transactions.
    pub fill_missing_days: bool,
    /// Add the temperature regressor when the input has readings.
    pub use_temperature: bool,
}

impl FeatureConfig {
    /// Continuous series, input-column holidays, no future holidays, no temperature.
    pub fn server() -> Self {
        Self {
            holiday_source: HolidaySource::InputColumn,
            future_holidays: FutureHolidayPolicy::NoHolidays,
            fill_missing_days: true,
            use_temperature: false,
        }
    }

    /// Sparse series, input-column holidays repeated by month/day, temperature.
    pub fn batch() -> Self {
        Self {
            holiday_source: HolidaySource::InputColumn,
            future_holidays: FutureHolidayPolicy::RecurringMonthDay,
            fill_missing_days: false,
            use_temperature: true,
        }
    }
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self::server()
    }
}

/// Day of week with Monday = 0 .. Sunday = 6.
pub fn day_of_week(date: NaiveDate) -> u32 {
    date.weekday().num_days_from_monday()
}

/// Saturday or Sunday.
pub fn is_weekend(date: NaiveDate) -> bool {
    day_of_week(date) >= 5
}

/// One day of the aggregated series.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyRecord {
    pub date: NaiveDate,
    pub quantity: f64,
    pub day_of_week: u32,
    pub month: u32,
    pub is_weekend: bool,
    pub is_holiday: bool,
    pub temperature: Option<f64>,
}

impl DailyRecord {
    /// Record with calendar features derived from `date`.
    pub fn new(date: NaiveDate, quantity: f64, is_holiday: bool, temperature: Option<f64>) -> Self {
        Self {
            date,
            quantity,
            day_of_week: day_of_week(date),
            month: date.month(),
            is_weekend: is_weekend(date),
            is_holiday,
            temperature,
        }
    }
}

/// Column-major regressor matrix: `columns[feature][time]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureMatrix {
    names: Vec<String>,
    columns: Vec<Vec<f64>>,
}

impl FeatureMatrix {
    /// Create a matrix, checking that every column has the same length.
    pub fn new(names: Vec<String>, columns: Vec<Vec<f64>>) -> Result<Self> {
        if names.len() != columns.len() {
            return Err(ForecastError::InvalidInput(format!(
                "{} feature names for {} columns",
                names.len(),
                columns.len()
            )));
        }
        if let Some(first) = columns.first() {
            for (name, col) in names.iter().zip(columns.iter()) {
                if col.len() != first.len() {
                    return Err(ForecastError::InvalidInput(format!(
                        "Feature '{}' has {} values but expected {}",
                        name,
                        col.len(),
                        first.len()
                    )));
                }
            }
        }
        Ok(Self { names, columns })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn columns(&self) -> &[Vec<f64>] {
        &self.columns
    }

    pub fn n_features(&self) -> usize {
        self.columns.len()
    }

    pub fn n_rows(&self) -> usize {
        self.columns.first().map_or(0, Vec::len)
    }

    /// Rows in `range` of every column.
    pub fn slice(&self, range: Range<usize>) -> FeatureMatrix {
        FeatureMatrix {
            names: self.names.clone(),
            columns: self.columns.iter().map(|c| c[range.clone()].to_vec()).collect(),
        }
    }
}

/// Date-indexed daily totals with their features.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DailySeries {
    records: Vec<DailyRecord>,
    has_temperature: bool,
}

impl DailySeries {
    /// Wrap records whose dates are strictly increasing.
    ///
    /// The temperature regressor is enabled only if every record has a value.
    pub fn from_records(records: Vec<DailyRecord>) -> Result<Self> {
        if records.windows(2).any(|w| w[1].date <= w[0].date) {
            return Err(ForecastError::InvalidInput(
                "Daily records must have strictly increasing dates".to_string(),
            ));
        }
        let has_temperature =
            !records.is_empty() && records.iter().all(|r| r.temperature.is_some());
        Ok(Self {
            records,
            has_temperature,
        })
    }

    pub fn records(&self) -> &[DailyRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn has_temperature(&self) -> bool {
        self.has_temperature
    }

    pub fn quantities(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.quantity).collect()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.records.iter().map(|r| r.date).collect()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.records.first().map(|r| r.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.records.last().map(|r| r.date)
    }

    /// True when consecutive records are exactly one day apart.
    pub fn is_continuous(&self) -> bool {
        self.records
            .windows(2)
            .all(|w| w[0].date.succ_opt() == Some(w[1].date))
    }

    pub fn holiday_dates(&self) -> Vec<NaiveDate> {
        self.records
            .iter()
            .filter(|r| r.is_holiday)
            .map(|r| r.date)
            .collect()
    }

    /// Historical regressors in [`CALENDAR_FEATURES`] order, plus temperature
    /// when present.
    pub fn features(&self) -> FeatureMatrix {
        let mut names: Vec<String> = CALENDAR_FEATURES.iter().map(|s| s.to_string()).collect();
        let mut columns = vec![
            self.records.iter().map(|r| r.day_of_week as f64).collect(),
            self.records.iter().map(|r| r.month as f64).collect(),
            self.records.iter().map(|r| flag(r.is_weekend)).collect(),
            self.records.iter().map(|r| flag(r.is_holiday)).collect(),
        ];
        if self.has_temperature {
            names.push(TEMPERATURE_FEATURE.to_string());
            columns.push(
                self.records
                    .iter()
                    .map(|r| r.temperature.unwrap_or(f64::NAN))
                    .collect(),
            );
        }
        FeatureMatrix { names, columns }
    }

    /// Mean temperature per calendar month over the history.
    pub fn monthly_mean_temperature(&self) -> HashMap<u32, f64> {
        let mut by_month: HashMap<u32, (f64, usize)> = HashMap::new();
        for r in &self.records {
            if let Some(t) = r.temperature {
                let entry = by_month.entry(r.month).or_insert((0.0, 0));
                entry.0 += t;
                entry.1 += 1;
            }
        }
        by_month
            .into_iter()
            .map(|(month, (sum, count))| (month, sum / count as f64))
            .collect()
    }
}

fn flag(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

#[derive(Default)]
struct DayAccumulator {
    quantity: f64,
    temperature_sum: f64,
    temperature_count: usize,
}

/// Builds the daily series and its regressors.
#[derive(Debug, Clone, Copy)]
pub struct FeatureBuilder<'a> {
    config: FeatureConfig,
    calendar: &'a HolidayCalendar,
}

impl<'a> FeatureBuilder<'a> {
    pub fn new(config: FeatureConfig, calendar: &'a HolidayCalendar) -> Self {
        Self { config, calendar }
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Aggregate transactions into one record per date.
    pub fn build(&self, table: &TransactionTable) -> Result<DailySeries> {
        if table.is_empty() {
            return Err(ForecastError::InsufficientData { needed: 1, got: 0 });
        }

        let mut days: BTreeMap<NaiveDate, DayAccumulator> = BTreeMap::new();
        for row in &table.rows {
            let acc = days.entry(row.date()).or_default();
            acc.quantity += row.quantity;
            if let Some(t) = row.temperature {
                acc.temperature_sum += t;
                acc.temperature_count += 1;
            }
        }

        let input_holidays: HashSet<NaiveDate> = table
            .rows
            .iter()
            .filter(|r| r.holiday.is_some())
            .map(|r| r.date())
            .collect();

        let dates = self.index_dates(&days)?;

        let raw_temperature: Vec<Option<f64>> = dates
            .iter()
            .map(|d| {
                days.get(d)
                    .filter(|acc| acc.temperature_count > 0)
                    .map(|acc| acc.temperature_sum / acc.temperature_count as f64)
            })
            .collect();
        let use_temperature = self.config.use_temperature
            && table.has_temperature
            && raw_temperature.iter().any(Option::is_some);
        let (dates, temperature) = if use_temperature {
            let filled = fill_nulls_forward(&raw_temperature);
            // Nothing to carry forward before the first reading.
            let leading = filled.iter().take_while(|t| t.is_none()).count();
            if leading > 0 {
                warn!(
                    days = leading,
                    first_reading = %dates[leading],
                    "dropping leading days without a temperature reading"
                );
            }
            (dates[leading..].to_vec(), filled[leading..].to_vec())
        } else {
            let n = dates.len();
            (dates, vec![None; n])
        };

        let records = dates
            .iter()
            .zip(temperature)
            .map(|(&date, temp)| {
                let quantity = days.get(&date).map_or(0.0, |acc| acc.quantity);
                let is_holiday = match self.config.holiday_source {
                    HolidaySource::InputColumn => input_holidays.contains(&date),
                    HolidaySource::Calendar => self.calendar.is_holiday(date),
                };
                DailyRecord::new(date, quantity, is_holiday, temp)
            })
            .collect();

        DailySeries::from_records(records)
    }

    /// Dates of the next `horizon` days after the series with their regressors.
    pub fn future_features(
        &self,
        series: &DailySeries,
        horizon: usize,
    ) -> Result<(Vec<NaiveDate>, FeatureMatrix)> {
        if horizon == 0 {
            return Err(ForecastError::InvalidParameter {
                param: "horizon".to_string(),
                value: horizon.to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        let last = series
            .last_date()
            .ok_or(ForecastError::InsufficientData { needed: 1, got: 0 })?;

        let dates = (1..=horizon as u64)
            .map(|i| {
                last.checked_add_days(Days::new(i)).ok_or_else(|| {
                    ForecastError::ComputationError(format!(
                        "Date overflow {} days after {}",
                        i, last
                    ))
                })
            })
            .collect::<Result<Vec<NaiveDate>>>()?;

        let recurring: HashSet<(u32, u32)> = match self.config.future_holidays {
            FutureHolidayPolicy::RecurringMonthDay => series
                .holiday_dates()
                .iter()
                .map(|d| (d.month(), d.day()))
                .collect(),
            FutureHolidayPolicy::NoHolidays => HashSet::new(),
        };

        let mut names: Vec<String> = CALENDAR_FEATURES.iter().map(|s| s.to_string()).collect();
        let mut columns = vec![
            dates.iter().map(|d| day_of_week(*d) as f64).collect(),
            dates.iter().map(|d| d.month() as f64).collect(),
            dates.iter().map(|d| flag(is_weekend(*d))).collect(),
            dates
                .iter()
                .map(|d| flag(recurring.contains(&(d.month(), d.day()))))
                .collect(),
        ];

        if series.has_temperature() {
            let monthly = series.monthly_mean_temperature();
            let overall = mean_of_present(
                &series
                    .records()
                    .iter()
                    .map(|r| r.temperature)
                    .collect::<Vec<_>>(),
            )
            .unwrap_or(0.0);
            names.push(TEMPERATURE_FEATURE.to_string());
            columns.push(
                dates
                    .iter()
                    .map(|d| monthly.get(&d.month()).copied().unwrap_or(overall))
                    .collect(),
            );
        }

        Ok((dates, FeatureMatrix::new(names, columns)?))
    }

    fn index_dates(&self, days: &BTreeMap<NaiveDate, DayAccumulator>) -> Result<Vec<NaiveDate>> {
        if !self.config.fill_missing_days {
            return Ok(days.keys().copied().collect());
        }
        let (first, last) = match (days.keys().next(), days.keys().next_back()) {
            (Some(f), Some(l)) => (*f, *l),
            _ => return Err(ForecastError::InsufficientData { needed: 1, got: 0 }),
        };
        Ok(first.iter_days().take_while(|d| *d <= last).collect())
    }
}
