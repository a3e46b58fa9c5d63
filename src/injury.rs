//! Conditional injury risk classification
//!
//! Trains only when the history carries an injury label with at least two
//! distinct values. Training rows use the recorded fatigue labels; the live
//! row uses the fatigue class freshly predicted for the latest observation.

use serde::{Deserialize, Serialize};

use crate::ensemble::{accuracy, train_test_split, BaggedForest, ForestConfig, LabelEncoder};
use crate::error::{ComputeError, DataError, RiskError};
use crate::history::{HistoryTable, InjuryView};
use crate::models::{InjuryPrediction, Label};

const MODEL_NAME: &str = "injury classifier";

/// Injury classifier configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InjuryConfig {
    /// Ensemble settings
    pub forest: ForestConfig,

    /// Share of labelled rows held out for accuracy
    pub test_fraction: f64,

    /// Label reported when no model is trained ("no risk")
    pub default_label: Label,
}

impl Default for InjuryConfig {
    fn default() -> Self {
        Self {
            forest: ForestConfig {
                n_trees: 200,
                max_depth: Some(4),
                seed: 42,
            },
            test_fraction: 0.2,
            default_label: 0,
        }
    }
}

/// Outcome of the fit step
#[derive(Debug, Clone)]
pub enum InjuryFit {
    /// Ensemble trained, with held-out accuracy when a test partition exists
    Trained {
        model: BaggedForest,
        accuracy: Option<f64>,
    },
    /// Complete rows carry a single class; nothing trained
    Skipped { default: Label },
}

/// Injury risk classifier
pub struct InjuryRiskClassifier {
    config: InjuryConfig,
}

impl InjuryRiskClassifier {
    pub fn new() -> Self {
        Self {
            config: InjuryConfig::default(),
        }
    }

    pub fn with_config(config: InjuryConfig) -> Self {
        Self { config }
    }

    /// Whether the history supports training at all
    pub fn is_active(history: &HistoryTable) -> bool {
        history
            .injury_label_values()
            .map_or(false, |values| values.len() >= 2)
    }

    /// Split, train and score on held-out rows
    pub fn fit(&self, view: &InjuryView) -> Result<InjuryFit, ComputeError> {
        let encoder = LabelEncoder::fit(&view.labels);
        if let [only] = encoder.classes() {
            tracing::debug!(label = only, "Complete rows carry a single injury class");
            return Ok(InjuryFit::Skipped {
                default: self.config.default_label,
            });
        }

        let (train, test) = train_test_split(
            view.features.len(),
            self.config.test_fraction,
            self.config.forest.seed,
        );

        let train_features: Vec<[f64; 4]> = train.iter().map(|i| view.features[*i]).collect();
        let train_labels: Vec<Label> = train.iter().map(|i| view.labels[*i]).collect();
        let model =
            BaggedForest::fit(MODEL_NAME, &train_features, &train_labels, &self.config.forest)?;

        let test_features: Vec<[f64; 4]> = test.iter().map(|i| view.features[*i]).collect();
        let test_labels: Vec<Label> = test.iter().map(|i| view.labels[*i]).collect();
        let predicted = model.predict(&test_features)?;
        let accuracy = accuracy(&predicted, &test_labels);

        tracing::debug!(
            train_rows = train.len(),
            test_rows = test.len(),
            accuracy = ?accuracy,
            "Fitted injury ensemble"
        );

        Ok(InjuryFit::Trained { model, accuracy })
    }

    /// Fit on the history and classify its latest observation.
    ///
    /// `live_fatigue` is the fatigue class predicted for the latest row; when
    /// absent, the row's recorded fatigue label is used instead.
    pub fn assess(
        &self,
        history: &HistoryTable,
        live_fatigue: Option<Label>,
    ) -> Result<InjuryPrediction, RiskError> {
        if !Self::is_active(history) {
            tracing::debug!("Injury label absent or constant, skipping training");
            return Ok(self.skipped(self.config.default_label));
        }

        let view = history.injury_view()?;
        match self.fit(&view)? {
            InjuryFit::Trained { model, accuracy } => {
                let fatigue = live_fatigue
                    .or(view.latest_fatigue_label)
                    .ok_or_else(|| DataError::IncompleteLatestRow {
                        missing: "fatigue_label".to_string(),
                    })?;
                let [load, hrv, sleep] = view.latest;
                let label = model.predict_one([load, hrv, sleep, fatigue as f64])?;
                Ok(InjuryPrediction { label, accuracy })
            }
            InjuryFit::Skipped { default } => Ok(self.skipped(default)),
        }
    }

    fn skipped(&self, label: Label) -> InjuryPrediction {
        InjuryPrediction {
            label,
            accuracy: None,
        }
    }
}

impl Default for InjuryRiskClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Observation;
    use chrono::NaiveDate;

    fn observation(day: i64, heavy: bool) -> Observation {
        let start = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        let date = start + chrono::Duration::days(day);
        if heavy {
            Observation::new(date, 700.0 + day as f64, 35.0, 5.0)
                .with_fatigue(2)
                .with_injury(1)
        } else {
            Observation::new(date, 250.0 + day as f64, 70.0, 8.0)
                .with_fatigue(0)
                .with_injury(0)
        }
    }

    #[test]
    fn test_constant_label_skips_training() {
        let rows: Vec<Observation> = (0..10)
            .map(|day| observation(day, day % 2 == 0).with_injury(0))
            .collect();
        let table = HistoryTable::from_observations(rows);
        assert!(!InjuryRiskClassifier::is_active(&table));

        let prediction = InjuryRiskClassifier::new().assess(&table, Some(2)).unwrap();
        assert_eq!(prediction.label, 0);
        assert_eq!(prediction.accuracy, None);
    }

    #[test]
    fn test_missing_label_column_skips_training() {
        let rows: Vec<Observation> = (0..4)
            .map(|day| {
                let mut obs = observation(day, day == 3);
                obs.injury_label = None;
                obs
            })
            .collect();
        let table = HistoryTable::from_observations(rows);
        let prediction = InjuryRiskClassifier::new().assess(&table, None).unwrap();
        assert_eq!(prediction, InjuryPrediction { label: 0, accuracy: None });
    }

    #[test]
    fn test_trained_model_reports_accuracy() {
        let rows: Vec<Observation> = (0..20).map(|day| observation(day, day % 3 == 0)).collect();
        let table = HistoryTable::from_observations(rows);
        assert!(InjuryRiskClassifier::is_active(&table));

        let prediction = InjuryRiskClassifier::new().assess(&table, Some(0)).unwrap();
        let accuracy = prediction.accuracy.expect("accuracy for trained model");
        assert!((0.0..=1.0).contains(&accuracy));
        assert_eq!(accuracy, 1.0);
    }

    #[test]
    fn test_split_is_reproducible() {
        let rows: Vec<Observation> = (0..25).map(|day| observation(day, day % 4 == 1)).collect();
        let table = HistoryTable::from_observations(rows);
        let classifier = InjuryRiskClassifier::new();
        assert_eq!(
            classifier.assess(&table, Some(2)).unwrap(),
            classifier.assess(&table, Some(2)).unwrap()
        );
    }

    #[test]
    fn test_needs_some_fatigue_for_live_row() {
        let mut rows: Vec<Observation> = (0..6).map(|day| observation(day, day % 2 == 0)).collect();
        if let Some(last) = rows.last_mut() {
            last.fatigue_label = None;
        }
        let table = HistoryTable::from_observations(rows);
        let err = InjuryRiskClassifier::new().assess(&table, None).unwrap_err();
        assert!(matches!(err, RiskError::Data(DataError::IncompleteLatestRow { .. })));

        assert!(InjuryRiskClassifier::new().assess(&table, Some(2)).is_ok());
    }

    #[test]
    fn test_single_class_among_complete_rows() {
        let mut rows: Vec<Observation> = (0..6).map(|day| observation(day, false)).collect();
        let mut injured = observation(6, true);
        injured.hrv = None;
        rows.push(injured);
        rows.push(observation(7, false));
        let table = HistoryTable::from_observations(rows);
        assert!(InjuryRiskClassifier::is_active(&table));

        let view = table.injury_view().unwrap();
        let fit = InjuryRiskClassifier::new().fit(&view).unwrap();
        assert!(matches!(fit, InjuryFit::Skipped { default: 0 }));
    }
}
