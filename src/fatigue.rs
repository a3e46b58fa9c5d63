//! Fatigue classification
//!
//! A bagged tree ensemble trained on the whole available history of
//! `(load, hrv, sleep_hours) -> fatigue_label`, predicting the class of the
//! most recent observation.

use crate::ensemble::{BaggedForest, ForestConfig, LabelEncoder};
use crate::error::{ComputeError, RiskError};
use crate::history::{FatigueView, HistoryTable};
use crate::models::{FatiguePrediction, Label};

const MODEL_NAME: &str = "fatigue classifier";

/// Outcome of the fit step
#[derive(Debug, Clone)]
pub enum FatigueFit {
    /// Ensemble trained on the history
    Trained(BaggedForest),
    /// Only one class was ever recorded
    Degenerate(Label),
}

impl FatigueFit {
    pub fn predict(&self, features: [f64; 3]) -> Result<FatiguePrediction, ComputeError> {
        let label = match self {
            FatigueFit::Trained(forest) => forest.predict_one(features)?,
            FatigueFit::Degenerate(label) => *label,
        };
        Ok(FatiguePrediction { label })
    }
}

/// Fatigue classifier
pub struct FatigueClassifier {
    config: ForestConfig,
}

impl FatigueClassifier {
    pub fn new() -> Self {
        Self {
            config: ForestConfig::default(),
        }
    }

    pub fn with_config(config: ForestConfig) -> Self {
        Self { config }
    }

    /// Fit on every labelled row; no data is held out
    pub fn fit(&self, view: &FatigueView) -> Result<FatigueFit, ComputeError> {
        let encoder = LabelEncoder::fit(&view.labels);
        if let [only] = encoder.classes() {
            tracing::debug!(label = only, "Single fatigue class in history");
            return Ok(FatigueFit::Degenerate(*only));
        }
        BaggedForest::fit(MODEL_NAME, &view.features, &view.labels, &self.config)
            .map(FatigueFit::Trained)
    }

    /// Fit on the history and classify its latest observation
    pub fn predict_latest(&self, history: &HistoryTable) -> Result<FatiguePrediction, RiskError> {
        let view = history.fatigue_view()?;
        let prediction = self.fit(&view)?.predict(view.latest)?;
        tracing::debug!(
            rows = view.features.len(),
            label = prediction.label,
            "Fatigue prediction"
        );
        Ok(prediction)
    }
}

impl Default for FatigueClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DataError;
    use crate::models::Observation;
    use chrono::NaiveDate;

    fn history(labels: &[Label]) -> HistoryTable {
        let start = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        HistoryTable::from_observations(
            labels
                .iter()
                .enumerate()
                .map(|(i, label)| {
                    let heavy = *label > 0;
                    Observation::new(
                        start + chrono::Duration::days(i as i64),
                        if heavy { 650.0 + i as f64 } else { 250.0 + i as f64 },
                        if heavy { 38.0 } else { 72.0 },
                        if heavy { 5.5 } else { 8.0 },
                    )
                    .with_fatigue(*label)
                })
                .collect(),
        )
    }

    #[test]
    fn test_predicts_latest_class() {
        let table = history(&[0, 0, 1, 0, 1, 1, 0, 0, 1, 1]);
        let prediction = FatigueClassifier::new().predict_latest(&table).unwrap();
        assert_eq!(prediction.label, 1);

        let table = history(&[1, 1, 0, 1, 0, 0, 1, 1, 0, 0]);
        let prediction = FatigueClassifier::new().predict_latest(&table).unwrap();
        assert_eq!(prediction.label, 0);
    }

    #[test]
    fn test_single_class_degenerates() {
        let table = history(&[2]);
        let view = table.fatigue_view().unwrap();
        let fit = FatigueClassifier::new().fit(&view).unwrap();
        assert!(matches!(fit, FatigueFit::Degenerate(2)));
        assert_eq!(fit.predict(view.latest).unwrap().label, 2);
    }

    #[test]
    fn test_missing_feature_column() {
        let mut rows: Vec<Observation> = history(&[0, 1]).rows().to_vec();
        for row in &mut rows {
            row.sleep_hours = None;
        }
        let table = HistoryTable::from_observations(rows);
        let err = FatigueClassifier::new().predict_latest(&table).unwrap_err();
        assert!(matches!(
            err,
            RiskError::Data(DataError::MissingColumn { ref column }) if column == "sleep_hours"
        ));
    }
}
