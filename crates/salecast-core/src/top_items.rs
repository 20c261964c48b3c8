//! Best-selling items and their weekly profiles.

use crate::transactions::TransactionTable;
use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Items need more than this many distinct dates for a weekly profile.
pub const MIN_PROFILE_DAYS: usize = 7;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemTotal {
    pub item: String,
    pub quantity: f64,
}

/// Mean daily quantity per weekday, Monday first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklyProfile {
    pub item: String,
    pub weekday_means: [f64; 7],
}

/// Top `n` items by total quantity.
///
/// Equal totals keep first-appearance order. Tables without an `Items`
/// column rank nothing.
pub fn rank_items(table: &TransactionTable, n: usize) -> Vec<ItemTotal> {
    if !table.has_items {
        return Vec::new();
    }

    let mut totals: Vec<ItemTotal> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();
    for row in &table.rows {
        let Some(item) = row.item.as_deref() else {
            continue;
        };
        match index.get(item) {
            Some(&i) => totals[i].quantity += row.quantity,
            None => {
                index.insert(item, totals.len());
                totals.push(ItemTotal {
                    item: item.to_string(),
                    quantity: row.quantity,
                });
            }
        }
    }

    totals.sort_by(|a, b| b.quantity.total_cmp(&a.quantity));
    totals.truncate(n);
    totals
}

/// Weekday means for each ranked item with enough history.
///
/// Each item's daily totals are zero-filled between its first and last date
/// before averaging.
pub fn weekly_profiles(table: &TransactionTable, ranking: &[ItemTotal]) -> Vec<WeeklyProfile> {
    ranking
        .iter()
        .filter_map(|ranked| {
            let mut daily: BTreeMap<NaiveDate, f64> = BTreeMap::new();
            for row in table
                .rows
                .iter()
                .filter(|r| r.item.as_deref() == Some(ranked.item.as_str()))
            {
                *daily.entry(row.date()).or_insert(0.0) += row.quantity;
            }
            if daily.len() <= MIN_PROFILE_DAYS {
                return None;
            }

            let first = *daily.keys().next()?;
            let last = *daily.keys().next_back()?;
            let mut sums = [0.0; 7];
            let mut counts = [0usize; 7];
            for date in first.iter_days().take_while(|d| *d <= last) {
                let weekday = date.weekday().num_days_from_monday() as usize;
                sums[weekday] += daily.get(&date).copied().unwrap_or(0.0);
                counts[weekday] += 1;
            }

            let mut weekday_means = [0.0; 7];
            for d in 0..7 {
                if counts[d] > 0 {
                    weekday_means[d] = sums[d] / counts[d] as f64;
                }
            }
            Some(WeeklyProfile {
                item: ranked.item.clone(),
                weekday_means,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn table(csv: &str) -> TransactionTable {
        TransactionTable::from_reader(csv.as_bytes()).unwrap()
    }

    #[test]
    fn test_rank_order_and_length() {
        let t = table(
            "date,Items,Quantity\n\
             2023-01-01,Cake,4\n2023-01-01,Bread,5\n2023-01-02,Bun,9\n\
             2023-01-02,Cake,5\n2023-01-03,Tart,1\n",
        );
        let ranking = rank_items(&t, 5);
        let names: Vec<&str> = ranking.iter().map(|r| r.item.as_str()).collect();
        // Cake and Bun tie at 9; Cake appeared first.
        assert_eq!(names, vec!["Cake", "Bun", "Bread", "Tart"]);
        assert_eq!(rank_items(&t, 2).len(), 2);
        assert_relative_eq!(ranking[0].quantity, 9.0);
    }

    #[test]
    fn test_no_items_column() {
        let t = table("date,Quantity\n2023-01-01,4\n");
        assert!(rank_items(&t, 5).is_empty());
    }

    #[test]
    fn test_short_history_excluded() {
        let mut csv = String::from("date,Items,Quantity\n");
        for day in 1..=7 {
            csv.push_str(&format!("2024-01-{:02},Bread,1\n", day));
        }
        let t = table(&csv);
        let ranking = rank_items(&t, 5);
        assert!(weekly_profiles(&t, &ranking).is_empty());
    }

    #[test]
    fn test_weekly_profile_zero_fills() {
        // 2024-01-01 is a Monday; Bread sells on Mondays and Saturdays only.
        let mut csv = String::from("date,Items,Quantity\n");
        for week in 0..3 {
            let monday = 1 + week * 7;
            csv.push_str(&format!("2024-01-{:02},Bread,6\n", monday));
            csv.push_str(&format!("2024-01-{:02},Bread,4\n", monday + 5));
        }
        csv.push_str("2024-01-22,Bread,6\n2024-01-27,Bread,4\n");
        let t = table(&csv);
        let ranking = rank_items(&t, 1);
        let profiles = weekly_profiles(&t, &ranking);
        assert_eq!(profiles.len(), 1);

        let means = profiles[0].weekday_means;
        assert_relative_eq!(means[0], 6.0, epsilon = 1e-9);
        assert_relative_eq!(means[1], 0.0, epsilon = 1e-9);
        assert_relative_eq!(means[5], 4.0, epsilon = 1e-9);
        assert_relative_eq!(means[6], 0.0, epsilon = 1e-9);
    }
}
