//! Risk report aggregation
//!
//! Runs the trend forecaster and the fatigue -> injury classifier chain for
//! one athlete's history. Recoverable failures in one stage are replaced by
//! that stage's fallback value without affecting the others; only a payload
//! that cannot be parsed into observations fails the whole request.
//!
//! Every call refits all models from scratch on the supplied history. No
//! model, cache or partial result outlives the call.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ensemble::ForestConfig;
use crate::error::{RiskError, ValidationError};
use crate::fatigue::FatigueClassifier;
use crate::forecast::{Forecast, ForecastConfig, ForecastMethod, TrendForecaster};
use crate::history::HistoryTable;
use crate::injury::{InjuryConfig, InjuryRiskClassifier};
use crate::models::{FatiguePrediction, ForecastPoint, InjuryPrediction, Label};

/// Response payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskReport {
    /// Forecast load for the horizon after the last observation
    pub tendencia: Vec<ForecastPoint>,

    /// Fatigue class predicted for the latest observation
    pub riesgo_fatiga: Option<Label>,

    /// Injury class predicted for the latest observation
    pub riesgo_lesion: Option<Label>,

    /// Held-out accuracy of the injury model, null when not trained
    pub exactitud_modelo_lesion: Option<f64>,
}

/// How a single stage finished
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StageOutcome {
    Completed,
    Fallback { reason: String },
}

impl StageOutcome {
    pub fn is_fallback(&self) -> bool {
        matches!(self, StageOutcome::Fallback { .. })
    }
}

/// Report plus per-stage diagnostics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailedReport {
    pub report: RiskReport,
    pub trend: StageOutcome,
    pub fatigue: StageOutcome,
    pub injury: StageOutcome,
    pub forecast_method: Option<ForecastMethod>,
    /// SHA-256 of the history the models were fitted on
    pub history_fingerprint: String,
}

/// Model settings for one pipeline run
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub forecast: ForecastConfig,
    pub fatigue: ForestConfig,
    pub injury: InjuryConfig,
}

/// Risk pipeline for one athlete's history
pub struct RiskPipeline {
    forecaster: TrendForecaster,
    fatigue: FatigueClassifier,
    injury: InjuryRiskClassifier,
}

impl RiskPipeline {
    pub fn new() -> Self {
        Self::with_config(PipelineConfig::default())
    }

    pub fn with_config(config: PipelineConfig) -> Self {
        Self {
            forecaster: TrendForecaster::with_config(config.forecast),
            fatigue: FatigueClassifier::with_config(config.fatigue),
            injury: InjuryRiskClassifier::with_config(config.injury),
        }
    }

    /// Parse a JSON payload and run the pipeline; parse failures abort
    pub fn run_json(&self, payload: &str) -> Result<RiskReport, RiskError> {
        let history = HistoryTable::from_json_str(payload)?;
        Ok(self.run(&history))
    }

    /// Run the pipeline on a decoded JSON payload
    pub fn run_value(&self, payload: &Value) -> Result<RiskReport, ValidationError> {
        let history = HistoryTable::from_json_value(payload)?;
        Ok(self.run(&history))
    }

    /// Run the pipeline; never fails once the history is parsed
    pub fn run(&self, history: &HistoryTable) -> RiskReport {
        self.run_detailed(history).report
    }

    /// Run the pipeline and keep per-stage outcomes
    pub fn run_detailed(&self, history: &HistoryTable) -> DetailedReport {
        let history_fingerprint = history.fingerprint();
        let span = tracing::info_span!(
            "risk_pipeline",
            rows = history.len(),
            columns = ?history.column_names(),
            fingerprint = %history_fingerprint
        );

        // Never entered: this thread may run unrelated rayon jobs while join blocks
        let trend_span = tracing::info_span!(parent: &span, "trend_forecast");
        let classifier_span = tracing::info_span!(parent: &span, "classifiers");

        let ((tendencia, forecast_method, trend), (fatigue_prediction, fatigue, injury_result, injury)) =
            rayon::join(
                || trend_span.in_scope(|| self.trend_stage(history)),
                || classifier_span.in_scope(|| self.classifier_stages(history)),
            );

        let (riesgo_lesion, exactitud_modelo_lesion) = match injury_result {
            Some(prediction) => (Some(prediction.label), prediction.accuracy),
            None => (None, None),
        };

        let report = RiskReport {
            tendencia,
            riesgo_fatiga: fatigue_prediction.map(|p| p.label),
            riesgo_lesion,
            exactitud_modelo_lesion,
        };

        tracing::info!(
            parent: &span,
            horizon = report.tendencia.len(),
            fatigue = ?report.riesgo_fatiga,
            injury = ?report.riesgo_lesion,
            degraded = trend.is_fallback() || fatigue.is_fallback() || injury.is_fallback(),
            "Risk report ready"
        );

        DetailedReport {
            report,
            trend,
            fatigue,
            injury,
            forecast_method,
            history_fingerprint,
        }
    }

    fn trend_stage(
        &self,
        history: &HistoryTable,
    ) -> (Vec<ForecastPoint>, Option<ForecastMethod>, StageOutcome) {
        match self.forecaster.forecast_history(history) {
            Ok(Forecast { points, method }) => (points, Some(method), StageOutcome::Completed),
            Err(RiskError::Compute(err)) => {
                tracing::warn!(error = %err, "Trend model failed, projecting last load");
                let fallback = history
                    .load_series()
                    .ok()
                    .and_then(|series| series.last().copied())
                    .and_then(|(date, load)| {
                        TrendForecaster::flat_projection(date, load, self.forecaster.config().horizon)
                            .ok()
                    });
                match fallback {
                    Some(forecast) => (
                        forecast.points,
                        Some(forecast.method),
                        Self::fallback(&err.to_string()),
                    ),
                    None => (Vec::new(), None, Self::fallback(&err.to_string())),
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "Trend forecast unavailable");
                (Vec::new(), None, Self::fallback(&err.to_string()))
            }
        }
    }

    fn classifier_stages(
        &self,
        history: &HistoryTable,
    ) -> (
        Option<FatiguePrediction>,
        StageOutcome,
        Option<InjuryPrediction>,
        StageOutcome,
    ) {
        let (fatigue_prediction, fatigue_outcome) =
            match tracing::info_span!("fatigue_classifier").in_scope(|| self.fatigue.predict_latest(history)) {
                Ok(prediction) => (Some(prediction), StageOutcome::Completed),
                Err(err) => {
                    tracing::warn!(error = %err, "Fatigue classifier unavailable");
                    (None, Self::fallback(&err.to_string()))
                }
            };

        let live_fatigue = fatigue_prediction.map(|p| p.label);
        let (injury_prediction, injury_outcome) = match tracing::info_span!("injury_classifier")
            .in_scope(|| self.injury.assess(history, live_fatigue))
        {
            Ok(prediction) => (Some(prediction), StageOutcome::Completed),
            Err(err) => {
                tracing::warn!(error = %err, "Injury classifier unavailable");
                (None, Self::fallback(&err.to_string()))
            }
        };

        (fatigue_prediction, fatigue_outcome, injury_prediction, injury_outcome)
    }

    fn fallback(reason: &str) -> StageOutcome {
        StageOutcome::Fallback {
            reason: reason.to_string(),
        }
    }
}

impl Default for RiskPipeline {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Arc, Mutex};
    use tracing::span::{Attributes, Id};
    use tracing::Subscriber;
    use tracing_subscriber::layer::{Context, SubscriberExt};
    use tracing_subscriber::registry::LookupSpan;
    use tracing_subscriber::Layer;

    /// Records span creations and entries seen by the subscriber
    #[derive(Clone, Default)]
    struct SpanRecorder {
        created: Arc<Mutex<Vec<String>>>,
        entered: Arc<Mutex<Vec<String>>>,
    }

    impl<S> Layer<S> for SpanRecorder
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
    {
        fn on_new_span(&self, attrs: &Attributes<'_>, _id: &Id, _ctx: Context<'_, S>) {
            self.created
                .lock()
                .unwrap()
                .push(attrs.metadata().name().to_string());
        }

        fn on_enter(&self, id: &Id, ctx: Context<'_, S>) {
            if let Some(span) = ctx.span(id) {
                self.entered.lock().unwrap().push(span.name().to_string());
            }
        }
    }

    #[test]
    fn test_empty_history_degrades_every_stage() {
        let detailed = RiskPipeline::new().run_detailed(&HistoryTable::from_observations(Vec::new()));
        assert!(detailed.report.tendencia.is_empty());
        assert_eq!(detailed.report.riesgo_fatiga, None);
        assert!(detailed.trend.is_fallback());
        assert!(detailed.fatigue.is_fallback());
        // Injury column absent: skipped, not failed
        assert_eq!(detailed.injury, StageOutcome::Completed);
        assert_eq!(detailed.report.riesgo_lesion, Some(0));
        assert_eq!(detailed.report.exactitud_modelo_lesion, None);
    }

    #[test]
    fn test_trend_survives_missing_classifier_columns() {
        let report = RiskPipeline::new()
            .run_json(r#"[{"date": "2024-03-01", "load": 300}, {"date": "2024-03-02", "load": 320}]"#)
            .unwrap();
        assert_eq!(report.tendencia.len(), 7);
        assert_eq!(report.riesgo_fatiga, None);
        assert_eq!(report.riesgo_lesion, Some(0));
    }

    #[test]
    fn test_unparseable_payload_fails_request() {
        let err = RiskPipeline::new()
            .run_value(&json!({"training_data": [1, 2, 3]}))
            .unwrap_err();
        assert!(matches!(err, ValidationError::MalformedPayload { .. }));
    }

    #[test]
    fn test_report_field_names() {
        let report = RiskReport {
            tendencia: Vec::new(),
            riesgo_fatiga: Some(1),
            riesgo_lesion: Some(0),
            exactitud_modelo_lesion: None,
        };
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(
            value,
            json!({
                "tendencia": [],
                "riesgo_fatiga": 1,
                "riesgo_lesion": 0,
                "exactitud_modelo_lesion": null
            })
        );
    }

    #[test]
    fn test_request_span_is_not_entered_on_calling_thread() {
        let recorder = SpanRecorder::default();
        let subscriber = tracing_subscriber::registry().with(recorder.clone());
        let history = HistoryTable::from_json_value(&json!([
            {"date": "2024-03-01", "load": 300},
            {"date": "2024-03-02", "load": 340}
        ]))
        .unwrap();

        tracing::subscriber::with_default(subscriber, || {
            RiskPipeline::new().run_detailed(&history);
        });

        let created = recorder.created.lock().unwrap();
        assert!(created.iter().any(|name| name == "risk_pipeline"));
        assert!(created.iter().any(|name| name == "trend_forecast"));
        let entered = recorder.entered.lock().unwrap();
        assert!(!entered.iter().any(|name| name == "risk_pipeline"));
    }
}
