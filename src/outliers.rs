use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::NaiveDate;
use polars::prelude::*;
use thiserror::Error;

use crate::logging::log_event;
use crate::stats;

/// Threshold multiplier applied when the caller does not supply one.
pub const DEFAULT_THRESHOLD: f64 = 3.0;

#[derive(Debug, Error)]
pub enum OutlierError {
    #[error("unknown outlier method `{0}`: use `iqr` or `zscore`")]
    UnknownMethod(String),
    #[error("polars error: {0}")]
    Polars(#[from] PolarsError),
}

pub type OutlierResult<T> = Result<T, OutlierError>;

/// Statistical rules for flagging anomalous return observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutlierMethod {
    /// Interquartile-range fences: flag values below `Q1 - t*IQR` or above `Q3 + t*IQR`.
    Iqr,
    /// Flag values more than `t` sample standard deviations from the column mean.
    Zscore,
}

impl FromStr for OutlierMethod {
    type Err = OutlierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().to_lowercase();
        match trimmed.as_str() {
            "iqr" => Ok(Self::Iqr),
            "zscore" => Ok(Self::Zscore),
            _ => Err(OutlierError::UnknownMethod(trimmed)),
        }
    }
}

impl TryFrom<&str> for OutlierMethod {
    type Error = OutlierError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::from_str(value)
    }
}

/// Flag anomalous observations per column of a returns table.
///
/// Returns the boolean flag table (same date index and columns as the input)
/// together with the sparse outlier-value collection: for every column with at
/// least one flag, a `<column>_outlier` frame holding only the flagged rows
/// under their original dates. Columns without flags are omitted entirely, and
/// the per-column date indexes are independent of one another.
pub fn detect_outliers(
    returns: &DataFrame,
    method: OutlierMethod,
    threshold: f64,
) -> OutlierResult<(DataFrame, BTreeMap<String, DataFrame>)> {
    let dates: Vec<NaiveDate> = returns
        .column("date")?
        .date()?
        .as_date_iter()
        .flatten()
        .collect();

    let mut flag_columns: Vec<Series> = Vec::with_capacity(returns.width());
    flag_columns.push(returns.column("date")?.clone());
    let mut outlier_values = BTreeMap::new();
    let mut flagged_total = 0usize;

    for series in returns.get_columns() {
        if series.name() == "date" {
            continue;
        }

        let values = to_f64_options(series)?;
        let finite: Vec<f64> = values
            .iter()
            .flatten()
            .copied()
            .filter(|value| value.is_finite())
            .collect();

        let flags: Vec<bool> = match method {
            OutlierMethod::Iqr => {
                let (lower, upper) = iqr_fences(&finite, threshold);
                values
                    .iter()
                    .map(|value| value.is_some_and(|v| v < lower || v > upper))
                    .collect()
            }
            OutlierMethod::Zscore => {
                let mean = stats::sample_mean(&finite);
                let std = stats::sample_variance(&finite, mean).sqrt();
                values
                    .iter()
                    .map(|value| {
                        value.is_some_and(|v| std > f64::EPSILON && (v - mean).abs() / std > threshold)
                    })
                    .collect()
            }
        };

        let mut flagged_dates = Vec::new();
        let mut flagged = Vec::new();
        for ((date, value), flag) in dates.iter().zip(values.iter()).zip(flags.iter()) {
            if *flag && let Some(value) = value {
                flagged_dates.push(*date);
                flagged.push(*value);
            }
        }

        if !flagged.is_empty() {
            let name = format!("{}_outlier", series.name());
            flagged_total += flagged.len();
            let frame = DataFrame::new(vec![
                DateChunked::from_naive_date("date", flagged_dates).into_series(),
                Series::new(&name, flagged),
            ])?;
            outlier_values.insert(name, frame);
        }

        flag_columns.push(Series::new(series.name(), flags));
    }

    let flags = DataFrame::new(flag_columns)?;

    log_event(
        file!(),
        "OutlierDetection",
        "detect_outliers",
        "outliers.detect",
        line!(),
        &format!(
            "Flagged {flagged_total} outliers in {} columns using {method:?} with threshold {threshold}",
            outlier_values.len()
        ),
        None,
    );

    Ok((flags, outlier_values))
}

/// String-selector variant of [`detect_outliers`] for callers holding the
/// method name as external input; `threshold` falls back to
/// [`DEFAULT_THRESHOLD`].
pub fn detect_outliers_with_method(
    returns: &DataFrame,
    method: &str,
    threshold: Option<f64>,
) -> OutlierResult<(DataFrame, BTreeMap<String, DataFrame>)> {
    let method = OutlierMethod::from_str(method)?;
    detect_outliers(returns, method, threshold.unwrap_or(DEFAULT_THRESHOLD))
}

fn iqr_fences(values: &[f64], threshold: f64) -> (f64, f64) {
    match (stats::quantile(values, 0.25), stats::quantile(values, 0.75)) {
        (Some(q1), Some(q3)) => {
            let iqr = q3 - q1;
            (q1 - threshold * iqr, q3 + threshold * iqr)
        }
        _ => (f64::NEG_INFINITY, f64::INFINITY),
    }
}

fn to_f64_options(series: &Series) -> PolarsResult<Vec<Option<f64>>> {
    let casted = if series.dtype() != &DataType::Float64 {
        series.cast(&DataType::Float64)?
    } else {
        series.clone()
    };
    Ok(casted
        .f64()
        .expect("series cast to f64")
        .into_iter()
        .collect())
}
