//! Real-time session load scoring
//!
//! Deterministic rule applied once per completed session:
//! `session_load = duration_minutes x rpe`, flagged when it exceeds the
//! configured threshold, with `fatigue_level = floor(session_load / 100)`.

use serde::{Deserialize, Serialize};

use crate::database::FatigueStore;
use crate::error::{RiskError, ValidationError};
use crate::models::{FatigueRecord, Recommendation, SessionRecord, SessionScore};

/// Lowest accepted RPE
pub const MIN_RPE: i64 = 1;
/// Highest accepted RPE
pub const MAX_RPE: i64 = 10;

const FATIGUE_LEVEL_DIVISOR: i64 = 100;

/// Session scoring configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Loads strictly above this value flag injury risk
    pub load_threshold: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { load_threshold: 500 }
    }
}

/// Session load scorer
pub struct SessionLoadScorer {
    config: SessionConfig,
}

impl SessionLoadScorer {
    pub fn new() -> Self {
        Self {
            config: SessionConfig::default(),
        }
    }

    pub fn with_config(config: SessionConfig) -> Self {
        Self { config }
    }

    /// Score a session from its duration and perceived exertion
    pub fn score(&self, duration_minutes: i64, rpe: i64) -> Result<SessionScore, ValidationError> {
        if !(MIN_RPE..=MAX_RPE).contains(&rpe) {
            return Err(ValidationError::RpeOutOfRange { rpe });
        }
        if duration_minutes <= 0 {
            return Err(ValidationError::NonPositiveDuration {
                duration: duration_minutes,
            });
        }

        let session_load = duration_minutes
            .checked_mul(rpe)
            .ok_or(ValidationError::DurationOutOfRange {
                duration: duration_minutes,
            })?;
        let risk_flag = session_load > self.config.load_threshold;

        Ok(SessionScore {
            session_load,
            risk_flag,
            fatigue_level: session_load / FATIGUE_LEVEL_DIVISOR,
            recommendation: if risk_flag {
                Recommendation::ActiveRecovery
            } else {
                Recommendation::ContinueNormalPlan
            },
        })
    }

    /// Score a session and append the resulting fatigue record to the store
    pub fn score_and_record<S: FatigueStore + ?Sized>(
        &self,
        store: &S,
        session: &SessionRecord,
    ) -> Result<(SessionScore, FatigueRecord), RiskError> {
        if session.athlete_id.trim().is_empty() {
            return Err(ValidationError::EmptyAthleteId.into());
        }

        let score = self.score(session.duration_minutes, session.rpe)?;
        let record = FatigueRecord::from_score(session.athlete_id.clone(), &score);
        store.append_session(session, &record)?;

        tracing::info!(
            athlete_id = %session.athlete_id,
            session_load = score.session_load,
            fatigue_level = score.fatigue_level,
            risk = score.risk_flag,
            "Session scored"
        );

        Ok((score, record))
    }
}

impl Default for SessionLoadScorer {
    fn default() -> Self {
        Self::new()
    }
}
