//! Missing value imputation functions.

/// Fill NULL values with the last observed value (forward fill / LOCF).
///
/// Leading NULLs stay NULL; values are never carried backwards.
pub fn fill_nulls_forward(values: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut result = Vec::with_capacity(values.len());
    let mut last_value: Option<f64> = None;

    for v in values {
        match v {
            Some(x) => {
                last_value = Some(*x);
                result.push(Some(*x));
            }
            None => {
                result.push(last_value);
            }
        }
    }

    result
}

/// Mean of the non-NULL values, `None` when there are none.
pub fn mean_of_present(values: &[Option<f64>]) -> Option<f64> {
    let present: Vec<f64> = values.iter().filter_map(|v| *v).collect();
    if present.is_empty() {
        None
    } else {
        Some(present.iter().sum::<f64>() / present.len() as f64)
    }
}
