use chrono::NaiveDate;
use polars::prelude::*;
use thiserror::Error;

use crate::logging::log_event;

#[derive(Debug, Error)]
pub enum ReturnsError {
    #[error("invalid price {price} for `{column}` on {date}: prices must be positive and finite")]
    InvalidPrice {
        column: String,
        date: NaiveDate,
        price: f64,
    },
    #[error("failed to assemble returns table: {source}")]
    Frame {
        #[from]
        source: PolarsError,
    },
}

pub type ReturnsResult<T> = Result<T, ReturnsError>;

/// Convert a price table into day-over-day fractional changes.
///
/// The leading row has no predecessor and is dropped, so the result holds one
/// row fewer than the input and the same ticker columns. A zero, negative,
/// null, or non-finite price cell fails with [`ReturnsError::InvalidPrice`]
/// rather than propagating infinite or undefined returns.
pub fn compute_returns(prices: &DataFrame) -> ReturnsResult<DataFrame> {
    let dates: Vec<NaiveDate> = prices
        .column("date")?
        .date()?
        .as_date_iter()
        .flatten()
        .collect();
    let tail: Vec<NaiveDate> = dates.iter().skip(1).copied().collect();

    let mut columns: Vec<Series> = Vec::with_capacity(prices.width());
    columns.push(DateChunked::from_naive_date("date", tail).into_series());

    for series in prices.get_columns() {
        if series.name() == "date" {
            continue;
        }

        let values = to_price_vec(series, &dates)?;
        let mut changes = Vec::with_capacity(values.len().saturating_sub(1));
        for window in values.windows(2) {
            changes.push(window[1] / window[0] - 1.0);
        }
        columns.push(Series::new(series.name(), changes));
    }

    let frame = DataFrame::new(columns)?;

    log_event(
        file!(),
        "Returns",
        "compute_returns",
        "returns.compute",
        line!(),
        &format!(
            "Computed daily returns for {} columns over {} rows",
            frame.width().saturating_sub(1),
            frame.height()
        ),
        None,
    );

    Ok(frame)
}

fn to_price_vec(series: &Series, dates: &[NaiveDate]) -> ReturnsResult<Vec<f64>> {
    let casted = if series.dtype() != &DataType::Float64 {
        series.cast(&DataType::Float64)?
    } else {
        series.clone()
    };
    let chunked = casted.f64().expect("series cast to f64");

    let mut prices = Vec::with_capacity(chunked.len());
    for (row, value) in chunked.into_iter().enumerate() {
        let price = value.unwrap_or(f64::NAN);
        if !(price.is_finite() && price > 0.0) {
            return Err(ReturnsError::InvalidPrice {
                column: series.name().to_string(),
                date: dates.get(row).copied().unwrap_or_default(),
                price,
            });
        }
        prices.push(price);
    }

    Ok(prices)
}
