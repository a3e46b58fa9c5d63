use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Categorical outcome label (fatigue class, injury flag)
pub type Label = i64;

/// One day of athlete history as supplied by the data-access layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Calendar date of the observation
    pub date: NaiveDate,

    /// Training load for the day (session-derived or cumulative)
    pub load: Option<f64>,

    /// Heart-rate variability
    pub hrv: Option<f64>,

    /// Hours slept
    pub sleep_hours: Option<f64>,

    /// Ground-truth fatigue class, if recorded
    pub fatigue_label: Option<Label>,

    /// Ground-truth injury outcome, if recorded
    pub injury_label: Option<Label>,
}

impl Observation {
    /// Create an observation carrying only the three physiological features
    pub fn new(date: NaiveDate, load: f64, hrv: f64, sleep_hours: f64) -> Self {
        Self {
            date,
            load: Some(load),
            hrv: Some(hrv),
            sleep_hours: Some(sleep_hours),
            fatigue_label: None,
            injury_label: None,
        }
    }

    pub fn with_fatigue(mut self, label: Label) -> Self {
        self.fatigue_label = Some(label);
        self
    }

    pub fn with_injury(mut self, label: Label) -> Self {
        self.injury_label = Some(label);
        self
    }

    /// `(load, hrv, sleep_hours)` when all three are present
    pub fn features(&self) -> Option<[f64; 3]> {
        Some([self.load?, self.hrv?, self.sleep_hours?])
    }
}

/// Forecast load for a single future day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub predicted_load: f64,
}

/// Fatigue class predicted for the latest observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FatiguePrediction {
    pub label: Label,
}

/// Injury class predicted for the latest observation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InjuryPrediction {
    pub label: Label,

    /// Held-out accuracy, `None` when no model was trained
    pub accuracy: Option<f64>,
}

/// Completed training session awaiting scoring
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub athlete_id: String,
    pub duration_minutes: i64,
    /// Rating of Perceived Exertion (1-10)
    pub rpe: i64,
}

impl SessionRecord {
    pub fn new(athlete_id: impl Into<String>, duration_minutes: i64, rpe: i64) -> Self {
        Self {
            athlete_id: athlete_id.into(),
            duration_minutes,
            rpe,
        }
    }
}

/// Post-session guidance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Recommendation {
    #[serde(rename = "active recovery")]
    ActiveRecovery,
    #[serde(rename = "continue normal plan")]
    ContinueNormalPlan,
}

impl Recommendation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Recommendation::ActiveRecovery => "active recovery",
            Recommendation::ContinueNormalPlan => "continue normal plan",
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Recommendation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active recovery" => Ok(Recommendation::ActiveRecovery),
            "continue normal plan" => Ok(Recommendation::ContinueNormalPlan),
            _ => Err(format!("Unknown recommendation: {}", s)),
        }
    }
}

/// Result of scoring one session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionScore {
    /// duration_minutes x rpe
    pub session_load: i64,
    pub risk_flag: bool,
    /// floor(session_load / 100)
    pub fatigue_level: i64,
    pub recommendation: Recommendation,
}

/// Append-only fatigue entry written once per scored session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FatigueRecord {
    pub id: Uuid,
    pub athlete_id: String,
    pub recorded_at: DateTime<Utc>,
    pub session_load: i64,
    pub fatigue_level: i64,
    pub injury_risk_flag: bool,
    pub recommendation: Recommendation,
}

impl FatigueRecord {
    /// Build a record stamped with the current time
    pub fn from_score(athlete_id: impl Into<String>, score: &SessionScore) -> Self {
        Self {
            id: Uuid::new_v4(),
            athlete_id: athlete_id.into(),
            recorded_at: Utc::now(),
            session_load: score.session_load,
            fatigue_level: score.fatigue_level,
            injury_risk_flag: score.risk_flag,
            recommendation: score.recommendation,
        }
    }
}
