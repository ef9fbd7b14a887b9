use std::str::FromStr;

use chrono::NaiveDate;
use polars::prelude::*;
use serde::Serialize;
use thiserror::Error;

use crate::logging::log_event;
use crate::stats;

/// Trailing window length applied when the caller does not supply one.
pub const DEFAULT_ROLLING_WINDOW: usize = 30;

const GRID_OPACITY: f64 = 0.3;

#[derive(Debug, Error)]
pub enum ChartError {
    #[error("unknown statistic `{0}`: use `std` or `mean`")]
    UnknownStatistic(String),
    #[error("polars error: {0}")]
    Polars(#[from] PolarsError),
}

pub type ChartResult<T> = Result<T, ChartError>;

/// Trailing-window aggregates supported by the rolling-statistic chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollingStatistic {
    /// Rolling sample standard deviation (volatility).
    Std,
    /// Rolling arithmetic mean.
    Mean,
}

impl FromStr for RollingStatistic {
    type Err = ChartError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().to_lowercase();
        match trimmed.as_str() {
            "std" => Ok(Self::Std),
            "mean" => Ok(Self::Mean),
            _ => Err(ChartError::UnknownStatistic(trimmed)),
        }
    }
}

impl TryFrom<&str> for RollingStatistic {
    type Error = ChartError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::from_str(value)
    }
}

/// Figure dimensions in display units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FigureSize {
    pub width: f64,
    pub height: f64,
}

impl Default for FigureSize {
    fn default() -> Self {
        Self {
            width: 12.0,
            height: 5.0,
        }
    }
}

/// Caller-facing display options shared by every chart builder.
#[derive(Debug, Clone, Default)]
pub struct ChartOptions {
    /// Chart title; each builder supplies its own default when absent.
    pub title: Option<String>,
    pub figsize: FigureSize,
}

/// One labeled line: the points carry their own dates, so gaps in a column do
/// not disturb its neighbours.
#[derive(Debug, Clone, Serialize)]
pub struct ChartSeries {
    pub name: String,
    pub points: Vec<(NaiveDate, f64)>,
    pub line_width: f64,
    pub opacity: f64,
}

/// Horizontal guide drawn across the full plot width.
#[derive(Debug, Clone, Serialize)]
pub struct ReferenceLine {
    pub value: f64,
    pub width: f64,
    pub dashed: bool,
}

/// Complete description of a line chart, independent of any rendering surface.
///
/// Serializable so an external surface can consume it as JSON.
#[derive(Debug, Clone, Serialize)]
pub struct ChartSpec {
    pub title: String,
    pub figsize: FigureSize,
    pub x_label: String,
    pub y_label: String,
    pub grid_opacity: f64,
    pub legend: bool,
    pub series: Vec<ChartSeries>,
    pub reference_lines: Vec<ReferenceLine>,
}

/// External rendering surface. Rendering is a side effect only; the surface
/// acknowledges the spec and returns nothing.
pub trait ChartRenderer {
    fn render(&self, spec: &ChartSpec) -> ChartResult<()>;
}

/// Describe a closing-price line chart: one line per ticker column.
pub fn price_chart(prices: &DataFrame, options: &ChartOptions) -> ChartResult<ChartSpec> {
    let spec = ChartSpec {
        title: options
            .title
            .clone()
            .unwrap_or_else(|| "Asset Prices Over Time".to_string()),
        figsize: options.figsize,
        x_label: "Date".to_string(),
        y_label: "Price (USD)".to_string(),
        grid_opacity: GRID_OPACITY,
        legend: true,
        series: frame_series(prices, 1.5, 1.0)?,
        reference_lines: Vec::new(),
    };

    log_event(
        file!(),
        "Visualization",
        "price_chart",
        "charts.price",
        line!(),
        &format!("Described price chart with {} series", spec.series.len()),
        None,
    );

    Ok(spec)
}

/// Describe a daily-return line chart with a dashed zero reference line.
pub fn returns_chart(returns: &DataFrame, options: &ChartOptions) -> ChartResult<ChartSpec> {
    let spec = ChartSpec {
        title: options
            .title
            .clone()
            .unwrap_or_else(|| "Daily Returns".to_string()),
        figsize: options.figsize,
        x_label: "Date".to_string(),
        y_label: "Daily Return".to_string(),
        grid_opacity: GRID_OPACITY,
        legend: true,
        series: frame_series(returns, 1.0, 0.7)?,
        reference_lines: vec![ReferenceLine {
            value: 0.0,
            width: 0.8,
            dashed: true,
        }],
    };

    log_event(
        file!(),
        "Visualization",
        "returns_chart",
        "charts.returns",
        line!(),
        &format!("Described returns chart with {} series", spec.series.len()),
        None,
    );

    Ok(spec)
}

/// Compute a trailing full-window aggregate over every column of a returns
/// table: one output row per input row with a complete window, dated by the
/// window's final observation.
pub fn rolling_statistic(
    returns: &DataFrame,
    window: usize,
    statistic: RollingStatistic,
) -> ChartResult<DataFrame> {
    assert!(window > 0, "window size must be positive");

    let dates: Vec<NaiveDate> = returns
        .column("date")?
        .date()?
        .as_date_iter()
        .flatten()
        .collect();
    let tail: Vec<NaiveDate> = if dates.len() >= window {
        dates[window - 1..].to_vec()
    } else {
        Vec::new()
    };

    let mut columns: Vec<Series> = Vec::with_capacity(returns.width());
    columns.push(DateChunked::from_naive_date("date", tail).into_series());

    for series in returns.get_columns() {
        if series.name() == "date" {
            continue;
        }

        let values = to_f64_vec(series)?;
        let aggregated: Vec<f64> = if values.len() >= window {
            values
                .windows(window)
                .map(|slice| match statistic {
                    RollingStatistic::Std => stats::sample_std(slice),
                    RollingStatistic::Mean => stats::sample_mean(slice),
                })
                .collect()
        } else {
            Vec::new()
        };
        columns.push(Series::new(series.name(), aggregated));
    }

    let frame = DataFrame::new(columns)?;

    log_event(
        file!(),
        "Visualization",
        "rolling_statistic",
        "charts.rolling",
        line!(),
        &format!(
            "Computed {window}-row rolling {statistic:?} over {} rows",
            frame.height()
        ),
        None,
    );

    Ok(frame)
}

/// String-selector variant of [`rolling_statistic`] for callers holding the
/// statistic name as external input.
pub fn rolling_statistic_with_name(
    returns: &DataFrame,
    window: usize,
    statistic: &str,
) -> ChartResult<DataFrame> {
    let statistic = RollingStatistic::from_str(statistic)?;
    rolling_statistic(returns, window, statistic)
}

/// Describe a rolling-statistic line chart, computing the window aggregate
/// first and labeling the y-axis from the window length and statistic.
pub fn rolling_statistic_chart(
    returns: &DataFrame,
    window: usize,
    statistic: RollingStatistic,
    options: &ChartOptions,
) -> ChartResult<ChartSpec> {
    let aggregated = rolling_statistic(returns, window, statistic)?;

    let y_label = match statistic {
        RollingStatistic::Std => {
            format!("{window}-Day Rolling Volatility (Standard Deviation)")
        }
        RollingStatistic::Mean => format!("{window}-Day Rolling Mean Return"),
    };

    let spec = ChartSpec {
        title: options
            .title
            .clone()
            .unwrap_or_else(|| "Rolling Statistics".to_string()),
        figsize: options.figsize,
        x_label: "Date".to_string(),
        y_label,
        grid_opacity: GRID_OPACITY,
        legend: true,
        series: frame_series(&aggregated, 1.5, 1.0)?,
        reference_lines: Vec::new(),
    };

    log_event(
        file!(),
        "Visualization",
        "rolling_statistic_chart",
        "charts.rolling",
        line!(),
        &format!("Described rolling {statistic:?} chart with {} series", spec.series.len()),
        None,
    );

    Ok(spec)
}

fn frame_series(frame: &DataFrame, line_width: f64, opacity: f64) -> ChartResult<Vec<ChartSeries>> {
    let dates: Vec<NaiveDate> = frame
        .column("date")?
        .date()?
        .as_date_iter()
        .flatten()
        .collect();

    let mut series_list = Vec::new();
    for series in frame.get_columns() {
        if series.name() == "date" {
            continue;
        }

        let values = to_f64_vec(series)?;
        let points: Vec<(NaiveDate, f64)> = dates
            .iter()
            .copied()
            .zip(values)
            .filter(|(_, value)| value.is_finite())
            .collect();

        series_list.push(ChartSeries {
            name: series.name().to_string(),
            points,
            line_width,
            opacity,
        });
    }

    Ok(series_list)
}

fn to_f64_vec(series: &Series) -> PolarsResult<Vec<f64>> {
    let casted = if series.dtype() != &DataType::Float64 {
        series.cast(&DataType::Float64)?
    } else {
        series.clone()
    };
    Ok(casted
        .f64()
        .expect("series cast to f64")
        .into_iter()
        .map(|value| value.unwrap_or(f64::NAN))
        .collect())
}
