//! tickerlab is a small library of reusable helpers for exploratory
//! market-data analysis. It covers fetching historical daily bars through a
//! pluggable provider boundary, projecting closing prices, deriving daily
//! returns, flagging statistical outliers, and describing price/return/rolling
//! charts as explicit values for an external rendering surface.

pub mod charts;
pub mod dataset;
pub mod logging;
pub mod outliers;
pub mod returns;
pub mod stats;

pub use charts::{
    ChartError, ChartOptions, ChartRenderer, ChartSpec, FigureSize, RollingStatistic, price_chart,
    returns_chart, rolling_statistic, rolling_statistic_chart, rolling_statistic_with_name,
};
pub use dataset::{
    CsvBarsProvider, DatasetError, FetchOptions, FetchRequest, GroupBy, MarketDataProvider,
    RawMarketData, download_data, extract_prices,
};
pub use outliers::{OutlierError, OutlierMethod, detect_outliers, detect_outliers_with_method};
pub use returns::{ReturnsError, compute_returns};

pub type Result<T> = anyhow::Result<T>;
