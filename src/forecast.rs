//! Short-horizon training load trend forecasting
//!
//! The load series is decomposed additively into a piecewise-linear trend,
//! whose slope may change at a handful of changepoints spread over the early
//! part of the history, and a weekly Fourier seasonality. The model is fitted
//! with L1-penalised least squares on every call and then discarded.

use chrono::{Datelike, Days, NaiveDate};
use linfa::prelude::*;
use linfa_elasticnet::{ElasticNet, ElasticNetError};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::f64::consts::PI;

use crate::error::{ComputeError, RiskError};
use crate::history::HistoryTable;
use crate::models::ForecastPoint;

const MODEL_NAME: &str = "trend forecaster";

/// Trend forecaster configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    /// Number of days forecast after the last observation
    pub horizon: usize,

    /// Upper bound on potential changepoints
    pub max_changepoints: usize,

    /// Fraction of history in which changepoints may be placed
    pub changepoint_range: f64,

    /// Weekly Fourier order (0 disables seasonality)
    pub weekly_fourier_order: usize,

    /// History span in days required before weekly seasonality is fitted
    pub weekly_min_span_days: i64,

    /// Regularisation strength on scaled coefficients
    pub penalty: f64,

    /// Share of the penalty applied as L1
    pub l1_ratio: f64,

    /// Coordinate descent iteration cap
    pub max_iterations: u32,

    /// Coordinate descent convergence tolerance
    pub tolerance: f64,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            horizon: 7,
            max_changepoints: 25,
            changepoint_range: 0.8,
            weekly_fourier_order: 3,
            weekly_min_span_days: 14,
            penalty: 1e-3,
            l1_ratio: 0.9,
            max_iterations: 5_000,
            tolerance: 1e-5,
        }
    }
}

/// How a forecast was produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ForecastMethod {
    /// Trend plus seasonality model
    Decomposed { changepoints: usize, weekly: bool },
    /// Last known value repeated (fewer than two distinct dates)
    FlatProjection,
}

/// Forecast for the configured horizon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub points: Vec<ForecastPoint>,
    pub method: ForecastMethod,
}

/// Column layout of the regression: trend, changepoint hinges, weekly terms
struct Design {
    first_date: NaiveDate,
    span_days: f64,
    changepoints: Vec<f64>,
    fourier_order: usize,
}

impl Design {
    fn scaled_time(&self, date: NaiveDate) -> f64 {
        (date - self.first_date).num_days() as f64 / self.span_days
    }

    fn n_columns(&self) -> usize {
        1 + self.changepoints.len() + 2 * self.fourier_order
    }

    fn row(&self, date: NaiveDate) -> Vec<f64> {
        let t = self.scaled_time(date);
        let mut row = Vec::with_capacity(self.n_columns());
        row.push(t);
        row.extend(self.changepoints.iter().map(|cp| (t - cp).max(0.0)));

        let day = f64::from(date.num_days_from_ce());
        for k in 1..=self.fourier_order {
            let angle = 2.0 * PI * k as f64 * day / 7.0;
            row.push(angle.sin());
            row.push(angle.cos());
        }
        row
    }

    fn matrix(&self, dates: &[NaiveDate]) -> Array2<f64> {
        let mut matrix = Array2::zeros((dates.len(), self.n_columns()));
        for (date, mut target) in dates.iter().zip(matrix.rows_mut()) {
            for (cell, value) in target.iter_mut().zip(self.row(*date)) {
                *cell = value;
            }
        }
        matrix
    }
}

/// Fitted decomposition; loads are scaled by their maximum magnitude
struct TrendModel {
    design: Design,
    load_scale: f64,
    regression: ElasticNet<f64>,
}

impl TrendModel {
    fn predict(&self, dates: &[NaiveDate]) -> Result<Vec<f64>, ComputeError> {
        let records = self.design.matrix(dates);
        let scaled: Array1<f64> = self.regression.predict(&records);
        let values: Vec<f64> = scaled.iter().map(|v| v * self.load_scale).collect();
        if values.iter().any(|v| !v.is_finite()) {
            return Err(ComputeError::NonFinite {
                model: MODEL_NAME.to_string(),
            });
        }
        Ok(values)
    }
}

/// Trend forecasting engine
pub struct TrendForecaster {
    config: ForecastConfig,
}

impl TrendForecaster {
    /// Create a forecaster with default configuration
    pub fn new() -> Self {
        Self {
            config: ForecastConfig::default(),
        }
    }

    /// Create a forecaster with custom configuration
    pub fn with_config(config: ForecastConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    /// Forecast the history's load column over the configured horizon
    pub fn forecast_history(&self, history: &HistoryTable) -> Result<Forecast, RiskError> {
        let series = history.load_series()?;
        Ok(self.forecast(&series)?)
    }

    /// Forecast an ordered `(date, load)` series
    pub fn forecast(&self, series: &[(NaiveDate, f64)]) -> Result<Forecast, ComputeError> {
        let &(last_date, last_value) = series
            .iter()
            .max_by_key(|(date, _)| *date)
            .ok_or_else(|| self.fit_error("empty series"))?;

        let distinct_dates: BTreeSet<NaiveDate> = series.iter().map(|(date, _)| *date).collect();
        if distinct_dates.len() < 2 {
            tracing::debug!(%last_date, "Single observed date, projecting last load");
            return Self::flat_projection(last_date, last_value, self.config.horizon);
        }

        let model = self.fit(series, &distinct_dates)?;
        let future = future_dates(last_date, self.config.horizon)?;
        let values = model.predict(&future)?;

        Ok(Forecast {
            points: future
                .into_iter()
                .zip(values)
                .map(|(date, predicted_load)| ForecastPoint {
                    date,
                    predicted_load,
                })
                .collect(),
            method: ForecastMethod::Decomposed {
                changepoints: model.design.changepoints.len(),
                weekly: model.design.fourier_order > 0,
            },
        })
    }

    /// Repeat `value` for each of the `horizon` days after `last_date`
    pub fn flat_projection(
        last_date: NaiveDate,
        value: f64,
        horizon: usize,
    ) -> Result<Forecast, ComputeError> {
        Ok(Forecast {
            points: future_dates(last_date, horizon)?
                .into_iter()
                .map(|date| ForecastPoint {
                    date,
                    predicted_load: value,
                })
                .collect(),
            method: ForecastMethod::FlatProjection,
        })
    }

    fn fit(
        &self,
        series: &[(NaiveDate, f64)],
        distinct_dates: &BTreeSet<NaiveDate>,
    ) -> Result<TrendModel, ComputeError> {
        let (first_date, last_date) = match (distinct_dates.first(), distinct_dates.last()) {
            (Some(first), Some(last)) => (*first, *last),
            _ => return Err(self.fit_error("empty series")),
        };
        let span = (last_date - first_date).num_days();

        let load_scale = series
            .iter()
            .map(|(_, load)| load.abs())
            .fold(0.0_f64, f64::max);
        let load_scale = if load_scale > 0.0 { load_scale } else { 1.0 };

        let fourier_order = if span >= self.config.weekly_min_span_days {
            self.config.weekly_fourier_order
        } else {
            0
        };

        let mut design = Design {
            first_date,
            span_days: span as f64,
            changepoints: Vec::new(),
            fourier_order,
        };
        design.changepoints = self
            .changepoint_dates(series)
            .into_iter()
            .map(|date| design.scaled_time(date))
            .filter(|t| *t > 0.0 && *t < 1.0)
            .collect();

        let dates: Vec<NaiveDate> = series.iter().map(|(date, _)| *date).collect();
        let records = design.matrix(&dates);
        let targets: Array1<f64> = series.iter().map(|(_, load)| load / load_scale).collect();

        let fitted: Result<ElasticNet<f64>, ElasticNetError> = ElasticNet::<f64>::params()
            .penalty(self.config.penalty)
            .l1_ratio(self.config.l1_ratio)
            .with_intercept(true)
            .max_iterations(self.config.max_iterations)
            .tolerance(self.config.tolerance)
            .fit(&Dataset::new(records, targets));
        let regression = fitted.map_err(|e| self.fit_error(&e.to_string()))?;

        if !regression.intercept().is_finite()
            || regression.hyperplane().iter().any(|w| !w.is_finite())
        {
            return Err(ComputeError::NonFinite {
                model: MODEL_NAME.to_string(),
            });
        }

        tracing::debug!(
            rows = series.len(),
            span_days = span,
            changepoints = design.changepoints.len(),
            weekly_order = fourier_order,
            "Fitted trend model"
        );

        Ok(TrendModel {
            design,
            load_scale,
            regression,
        })
    }

    /// Evenly spaced observation dates inside the changepoint range,
    /// excluding the first observation
    fn changepoint_dates(&self, series: &[(NaiveDate, f64)]) -> Vec<NaiveDate> {
        let range_rows = (series.len() as f64 * self.config.changepoint_range).floor() as usize;
        let count = self
            .config
            .max_changepoints
            .min(range_rows.saturating_sub(1));
        if count == 0 {
            return Vec::new();
        }

        let last_index = (range_rows - 1) as f64;
        let mut dates: Vec<NaiveDate> = (1..=count)
            .map(|i| {
                let index = (last_index * i as f64 / count as f64).round() as usize;
                series[index.min(series.len() - 1)].0
            })
            .collect();
        dates.dedup();
        dates
    }

    fn fit_error(&self, reason: &str) -> ComputeError {
        ComputeError::FitFailed {
            model: MODEL_NAME.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl Default for TrendForecaster {
    fn default() -> Self {
        Self::new()
    }
}

fn future_dates(last_date: NaiveDate, horizon: usize) -> Result<Vec<NaiveDate>, ComputeError> {
    (1..=horizon as u64)
        .map(|offset| {
            last_date
                .checked_add_days(Days::new(offset))
                .ok_or_else(|| ComputeError::FitFailed {
                    model: MODEL_NAME.to_string(),
                    reason: format!("date overflow after {}", last_date),
                })
        })
        .collect()
}
