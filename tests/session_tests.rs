//! Integration tests for real-time session scoring and persistence

use proptest::prelude::*;
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

use loadrisk::session::{MAX_RPE, MIN_RPE};
use loadrisk::{
    Database, FatigueStore, Recommendation, RiskError, SessionConfig, SessionLoadScorer,
    SessionRecord, ValidationError,
};

#[test]
fn test_scenarios_from_coaching_staff() {
    let scorer = SessionLoadScorer::new();

    let hard = scorer.score(60, 9).unwrap();
    assert_eq!(hard.session_load, 540);
    assert!(hard.risk_flag);
    assert_eq!(hard.fatigue_level, 5);
    assert_eq!(hard.recommendation, Recommendation::ActiveRecovery);

    let easy = scorer.score(30, 4).unwrap();
    assert_eq!(easy.session_load, 120);
    assert!(!easy.risk_flag);
    assert_eq!(easy.fatigue_level, 1);
    assert_eq!(easy.recommendation, Recommendation::ContinueNormalPlan);
}

#[test]
fn test_exactly_threshold_is_not_flagged() {
    let scorer = SessionLoadScorer::new();
    let at_threshold = scorer.score(100, 5).unwrap();
    assert_eq!(at_threshold.session_load, 500);
    assert!(!at_threshold.risk_flag);

    let above = scorer.score(167, 3).unwrap();
    assert_eq!(above.session_load, 501);
    assert!(above.risk_flag);
}

#[test]
fn test_out_of_scale_rpe_is_rejected() {
    let scorer = SessionLoadScorer::new();
    for rpe in [0, 11, -3] {
        let err = scorer.score(45, rpe).unwrap_err();
        assert_eq!(err, ValidationError::RpeOutOfRange { rpe });
    }
}

#[test]
fn test_recorded_session_is_latest() {
    let temp_dir = TempDir::new().unwrap();
    let db = Database::new(temp_dir.path().join("sessions.db")).unwrap();
    let scorer = SessionLoadScorer::new();

    scorer
        .score_and_record(&db, &SessionRecord::new("marta", 30, 4))
        .unwrap();
    let (score, record) = scorer
        .score_and_record(&db, &SessionRecord::new("marta", 60, 9))
        .unwrap();

    let latest = db.latest_fatigue("marta").unwrap().unwrap();
    assert_eq!(latest, record);
    assert_eq!(latest.session_load, score.session_load);
    assert_eq!(latest.fatigue_level, score.fatigue_level);
    assert_eq!(latest.injury_risk_flag, score.risk_flag);
    assert_eq!(latest.recommendation, score.recommendation);
    assert_eq!(db.session_count("marta").unwrap(), 2);
    assert_eq!(db.fatigue_history("marta", 10).unwrap().len(), 2);
}

#[test]
fn test_invalid_session_reports_user_message() {
    let db = Database::in_memory().unwrap();
    let err = SessionLoadScorer::new()
        .score_and_record(&db, &SessionRecord::new("marta", 60, 0))
        .unwrap_err();

    assert!(matches!(err, RiskError::Validation(_)));
    assert_eq!(err.status_code(), 400);
    assert!(err.user_message().contains("1 to 10"));
    assert_eq!(db.session_count("marta").unwrap(), 0);
}

#[test]
fn test_custom_threshold_from_config() {
    let scorer = SessionLoadScorer::with_config(SessionConfig {
        load_threshold: 300,
    });
    assert!(scorer.score(40, 8).unwrap().risk_flag);
    assert!(!scorer.score(30, 10).unwrap().risk_flag);
}

#[test]
fn test_concurrent_athletes_do_not_lose_records() {
    let temp_dir = TempDir::new().unwrap();
    let db = Arc::new(Database::new(temp_dir.path().join("shared.db")).unwrap());

    let handles: Vec<_> = (0..4)
        .map(|athlete| {
            let db = Arc::clone(&db);
            thread::spawn(move || {
                let scorer = SessionLoadScorer::new();
                let athlete_id = format!("athlete-{}", athlete);
                for minutes in 1..=10 {
                    scorer
                        .score_and_record(
                            db.as_ref(),
                            &SessionRecord::new(athlete_id.clone(), minutes * 10, 5),
                        )
                        .unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    for athlete in 0..4 {
        let athlete_id = format!("athlete-{}", athlete);
        assert_eq!(db.session_count(&athlete_id).unwrap(), 10);
        assert_eq!(db.fatigue_history(&athlete_id, 100).unwrap().len(), 10);
    }
}

proptest! {
    #[test]
    fn test_session_rule_properties(
        duration in 1i64..600i64,
        rpe in MIN_RPE..=MAX_RPE
    ) {
        let score = SessionLoadScorer::new().score(duration, rpe).unwrap();

        prop_assert_eq!(score.session_load, duration * rpe);
        prop_assert_eq!(score.fatigue_level, (duration * rpe) / 100);
        prop_assert_eq!(score.risk_flag, duration * rpe > 500);
        prop_assert_eq!(
            score.recommendation == Recommendation::ActiveRecovery,
            score.risk_flag
        );
    }

    #[test]
    fn test_rpe_outside_scale_always_rejected(
        duration in 1i64..600i64,
        rpe in prop_oneof![-100i64..MIN_RPE, (MAX_RPE + 1)..100i64]
    ) {
        prop_assert!(SessionLoadScorer::new().score(duration, rpe).is_err());
    }
}
