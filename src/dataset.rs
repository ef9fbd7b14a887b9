use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::NaiveDate;
use polars::prelude::*;
use thiserror::Error;

use crate::logging::log_event;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("market data unavailable for [{tickers}]: {reason}")]
    DataUnavailable { tickers: String, reason: String },
    #[error("ticker `{0}` is missing from the downloaded data")]
    MissingTicker(String),
    #[error("failed to assemble price table: {source}")]
    Frame { #[from] source: PolarsError },
}

pub type DatasetResult<T> = Result<T, DatasetError>;

/// How the provider organizes the columns of its result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GroupBy {
    #[default]
    Ticker,
}

/// Provider configuration forwarded with every download request.
#[derive(Debug, Clone, Copy)]
pub struct FetchOptions {
    pub group_by: GroupBy,
    /// Request split/dividend-adjusted prices.
    pub auto_adjust: bool,
    /// Let the provider show its own progress indicator.
    pub progress: bool,
    /// Let the provider parallelize its own fetch.
    pub threads: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            group_by: GroupBy::Ticker,
            auto_adjust: true,
            progress: false,
            threads: false,
        }
    }
}

/// A single historical-bars request; `start` and `end` are inclusive calendar dates.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub tickers: Vec<String>,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub options: FetchOptions,
}

/// External source of historical daily bars.
///
/// Implementations own transport, authentication, and rate limiting; the
/// library only consumes the tabular result.
pub trait MarketDataProvider {
    fn fetch_daily_bars(&self, request: &FetchRequest) -> crate::Result<RawMarketData>;
}

/// Raw acquisition output: one daily bar frame per ticker, all sharing a
/// common date index.
#[derive(Debug, Clone, Default)]
pub struct RawMarketData {
    bars: BTreeMap<String, DataFrame>,
}

impl RawMarketData {
    pub fn new(bars: BTreeMap<String, DataFrame>) -> Self {
        Self { bars }
    }

    pub fn bars(&self, ticker: &str) -> Option<&DataFrame> {
        self.bars.get(ticker)
    }

    pub fn tickers(&self) -> impl Iterator<Item = &str> {
        self.bars.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty() || self.bars.values().all(|frame| frame.height() == 0)
    }
}

/// Download historical daily bars for `tickers` over the inclusive
/// `start..=end` date range.
///
/// The request succeeds or fails atomically: any provider failure, or a result
/// carrying no rows at all, surfaces as [`DatasetError::DataUnavailable`] with
/// the original failure detail embedded as context.
pub fn download_data(
    provider: &dyn MarketDataProvider,
    tickers: &[&str],
    start: NaiveDate,
    end: NaiveDate,
    options: FetchOptions,
) -> DatasetResult<RawMarketData> {
    let request = FetchRequest {
        tickers: tickers.iter().map(|ticker| ticker.to_string()).collect(),
        start,
        end,
        options,
    };
    let joined = tickers.join(", ");

    let raw = provider.fetch_daily_bars(&request).map_err(|error| {
        let reason = format!("{error:#}");
        log_event(
            file!(),
            "Acquisition",
            "download_data",
            "dataset.download",
            line!(),
            &format!("Provider failed for [{joined}]"),
            Some(&reason),
        );
        DatasetError::DataUnavailable {
            tickers: joined.clone(),
            reason,
        }
    })?;

    if raw.is_empty() {
        log_event(
            file!(),
            "Acquisition",
            "download_data",
            "dataset.download",
            line!(),
            &format!("Provider returned an empty table for [{joined}]"),
            None,
        );
        return Err(DatasetError::DataUnavailable {
            tickers: joined,
            reason: "provider returned an empty table".to_string(),
        });
    }

    log_event(
        file!(),
        "Acquisition",
        "download_data",
        "dataset.download",
        line!(),
        &format!("Downloaded daily bars for [{joined}] from {start} to {end}"),
        None,
    );

    Ok(raw)
}

/// Project the raw acquisition output down to one closing-price column per
/// requested ticker, keyed by the shared date index.
pub fn extract_prices(raw: &RawMarketData, tickers: &[&str]) -> DatasetResult<DataFrame> {
    let mut columns: Vec<Series> = Vec::with_capacity(tickers.len() + 1);

    for (position, ticker) in tickers.iter().enumerate() {
        let bars = raw
            .bars(ticker)
            .ok_or_else(|| DatasetError::MissingTicker(ticker.to_string()))?;
        let close = bars
            .column("close")
            .map_err(|_| DatasetError::MissingTicker(ticker.to_string()))?;

        if position == 0 {
            columns.push(bars.column("date")?.clone());
        }

        let mut prices = close.clone();
        prices.rename(ticker);
        columns.push(prices);
    }

    let frame = DataFrame::new(columns)?;

    log_event(
        file!(),
        "Extraction",
        "extract_prices",
        "dataset.extract",
        line!(),
        &format!("Extracted closing prices for: {}", tickers.join(", ")),
        None,
    );

    Ok(frame)
}

/// Offline [`MarketDataProvider`] reading one `<TICKER>.csv` daily bar file
/// per symbol from a directory.
///
/// Fixture files are expected to hold already-adjusted bars with a header of
/// `date,open,high,low,close,volume`, so the adjustment and progress options
/// carried by the request have no effect here.
#[derive(Debug, Clone)]
pub struct CsvBarsProvider {
    root: PathBuf,
}

impl CsvBarsProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn load_bars(&self, ticker: &str, start: NaiveDate, end: NaiveDate) -> crate::Result<DataFrame> {
        let path: PathBuf = self.root.join(format!("{ticker}.csv"));
        let frame = read_bars_csv(&path)
            .with_context(|| format!("loading bars for `{ticker}` from {}", path.display()))?;

        let dates = frame
            .column("date")
            .and_then(|series| series.date())
            .map(|dates| dates.clone())
            .with_context(|| format!("bars for `{ticker}` are missing a date column"))?;

        let mask: BooleanChunked = dates
            .as_date_iter()
            .map(|date| Some(date.is_some_and(|date| date >= start && date <= end)))
            .collect();

        let filtered = frame
            .filter(&mask)
            .with_context(|| format!("filtering bars for `{ticker}` to {start}..={end}"))?;

        log_event(
            file!(),
            "CsvBarsProvider",
            "load_bars",
            "dataset.load",
            line!(),
            &format!("Loaded {} rows for `{ticker}` from {}", filtered.height(), path.display()),
            None,
        );

        Ok(filtered)
    }
}

impl MarketDataProvider for CsvBarsProvider {
    fn fetch_daily_bars(&self, request: &FetchRequest) -> crate::Result<RawMarketData> {
        let mut bars = BTreeMap::new();
        for ticker in &request.tickers {
            let frame = self.load_bars(ticker, request.start, request.end)?;
            bars.insert(ticker.clone(), frame);
        }
        Ok(RawMarketData::new(bars))
    }
}

fn read_bars_csv(path: &Path) -> PolarsResult<DataFrame> {
    LazyCsvReader::new(path)
        .has_header(true)
        .with_try_parse_dates(true)
        .with_infer_schema_length(Some(2048))
        .finish()?
        .collect()
}
