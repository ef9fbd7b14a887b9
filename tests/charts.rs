use std::cell::RefCell;

use approx::assert_abs_diff_eq;
use chrono::NaiveDate;
use polars::prelude::*;

use tickerlab::charts::{
    ChartError, ChartOptions, ChartRenderer, ChartSpec, DEFAULT_ROLLING_WINDOW, RollingStatistic,
    price_chart, returns_chart, rolling_statistic, rolling_statistic_chart,
    rolling_statistic_with_name,
};

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, day).expect("valid fixture date")
}

fn value_frame(columns: &[(&str, &[f64])]) -> DataFrame {
    let rows = columns[0].1.len();
    let dates: Vec<NaiveDate> = (1..=rows as u32).map(date).collect();
    let mut series: Vec<Series> =
        vec![DateChunked::from_naive_date("date", dates).into_series()];
    for (name, values) in columns {
        series.push(Series::new(name, values.to_vec()));
    }
    DataFrame::new(series).expect("valid fixture frame")
}

fn column_values(frame: &DataFrame, name: &str) -> Vec<f64> {
    frame
        .column(name)
        .unwrap()
        .f64()
        .unwrap()
        .into_no_null_iter()
        .collect()
}

#[derive(Default)]
struct RecordingRenderer {
    rendered: RefCell<Vec<ChartSpec>>,
}

impl ChartRenderer for RecordingRenderer {
    fn render(&self, spec: &ChartSpec) -> Result<(), ChartError> {
        self.rendered.borrow_mut().push(spec.clone());
        Ok(())
    }
}

#[test]
fn price_chart_carries_standard_labels_and_styling() -> anyhow::Result<()> {
    let prices = value_frame(&[("A", &[10.0, 11.0, 12.0]), ("B", &[20.0, 19.0, 21.0])]);

    let spec = price_chart(&prices, &ChartOptions::default())?;
    assert_eq!(spec.title, "Asset Prices Over Time");
    assert_eq!(spec.x_label, "Date");
    assert_eq!(spec.y_label, "Price (USD)");
    assert_abs_diff_eq!(spec.grid_opacity, 0.3);
    assert_abs_diff_eq!(spec.figsize.width, 12.0);
    assert_abs_diff_eq!(spec.figsize.height, 5.0);
    assert!(spec.legend);
    assert!(spec.reference_lines.is_empty());

    assert_eq!(spec.series.len(), 2);
    assert_eq!(spec.series[0].name, "A");
    assert_abs_diff_eq!(spec.series[0].line_width, 1.5);
    assert_eq!(spec.series[0].points.len(), 3);
    assert_eq!(spec.series[0].points[0], (date(1), 10.0));

    let titled = price_chart(
        &prices,
        &ChartOptions {
            title: Some("Holdings".to_string()),
            ..ChartOptions::default()
        },
    )?;
    assert_eq!(titled.title, "Holdings");

    Ok(())
}

#[test]
fn returns_chart_draws_a_dashed_zero_line() -> anyhow::Result<()> {
    let returns = value_frame(&[("A", &[0.01, -0.02, 0.015])]);

    let spec = returns_chart(&returns, &ChartOptions::default())?;
    assert_eq!(spec.title, "Daily Returns");
    assert_eq!(spec.y_label, "Daily Return");
    assert_abs_diff_eq!(spec.series[0].line_width, 1.0);
    assert_abs_diff_eq!(spec.series[0].opacity, 0.7);

    assert_eq!(spec.reference_lines.len(), 1);
    let zero_line = &spec.reference_lines[0];
    assert_abs_diff_eq!(zero_line.value, 0.0);
    assert_abs_diff_eq!(zero_line.width, 0.8);
    assert!(zero_line.dashed);

    Ok(())
}

#[test]
fn rolling_mean_matches_hand_computation() -> anyhow::Result<()> {
    let returns = value_frame(&[("A", &[0.01, 0.02, 0.03, 0.04])]);

    let rolled = rolling_statistic(&returns, 2, RollingStatistic::Mean)?;
    assert_eq!(rolled.height(), 3);

    let values = column_values(&rolled, "A");
    assert_abs_diff_eq!(values[0], 0.015, epsilon = 1e-12);
    assert_abs_diff_eq!(values[1], 0.025, epsilon = 1e-12);
    assert_abs_diff_eq!(values[2], 0.035, epsilon = 1e-12);

    let dates: Vec<NaiveDate> = rolled
        .column("date")?
        .date()?
        .as_date_iter()
        .flatten()
        .collect();
    assert_eq!(dates, vec![date(2), date(3), date(4)]);

    Ok(())
}

#[test]
fn rolling_std_uses_the_sample_divisor() -> anyhow::Result<()> {
    let returns = value_frame(&[("A", &[1.0, 2.0, 3.0, 4.0])]);

    let rolled = rolling_statistic(&returns, 3, RollingStatistic::Std)?;
    let values = column_values(&rolled, "A");
    assert_eq!(values.len(), 2);
    assert_abs_diff_eq!(values[0], 1.0, epsilon = 1e-12);
    assert_abs_diff_eq!(values[1], 1.0, epsilon = 1e-12);

    Ok(())
}

#[test]
fn short_tables_produce_empty_rolling_output() -> anyhow::Result<()> {
    let returns = value_frame(&[("A", &[0.01, 0.02])]);

    let rolled = rolling_statistic(&returns, DEFAULT_ROLLING_WINDOW, RollingStatistic::Std)?;
    assert_eq!(rolled.height(), 0);
    assert_eq!(rolled.get_column_names(), &["date", "A"]);

    Ok(())
}

#[test]
fn rolling_chart_labels_follow_window_and_statistic() -> anyhow::Result<()> {
    let returns = value_frame(&[("A", &[0.01, 0.02, 0.03, 0.04, 0.05])]);

    let volatility =
        rolling_statistic_chart(&returns, 3, RollingStatistic::Std, &ChartOptions::default())?;
    assert_eq!(volatility.title, "Rolling Statistics");
    assert_eq!(
        volatility.y_label,
        "3-Day Rolling Volatility (Standard Deviation)"
    );
    assert_abs_diff_eq!(volatility.series[0].line_width, 1.5);
    assert_eq!(volatility.series[0].points.len(), 3);

    let mean =
        rolling_statistic_chart(&returns, 4, RollingStatistic::Mean, &ChartOptions::default())?;
    assert_eq!(mean.y_label, "4-Day Rolling Mean Return");

    Ok(())
}

#[test]
fn statistic_parsing_rejects_unknown_names() {
    let returns = value_frame(&[("A", &[0.01, 0.02, 0.03])]);

    let rolled = rolling_statistic_with_name(&returns, 2, "std").expect("known statistic");
    assert_eq!(rolled.height(), 2);

    let error =
        rolling_statistic_with_name(&returns, 2, "median").expect_err("unknown statistic");
    assert!(matches!(error, ChartError::UnknownStatistic(name) if name == "median"));
}

#[test]
fn specs_render_through_the_surface_trait() -> anyhow::Result<()> {
    let prices = value_frame(&[("A", &[10.0, 11.0, 12.0])]);
    let renderer = RecordingRenderer::default();

    let spec = price_chart(&prices, &ChartOptions::default())?;
    renderer.render(&spec)?;

    let rendered = renderer.rendered.borrow();
    assert_eq!(rendered.len(), 1);
    assert_eq!(rendered[0].title, spec.title);

    Ok(())
}

#[test]
fn specs_serialize_for_external_surfaces() -> anyhow::Result<()> {
    let prices = value_frame(&[("A", &[10.0, 11.0, 12.0])]);
    let spec = price_chart(&prices, &ChartOptions::default())?;

    let json = serde_json::to_value(&spec)?;
    assert_eq!(json["y_label"], "Price (USD)");
    assert_eq!(json["series"][0]["name"], "A");

    Ok(())
}
