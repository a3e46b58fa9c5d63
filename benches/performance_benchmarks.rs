use chrono::{Duration, NaiveDate};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use loadrisk::{
    Database, FatigueClassifier, HistoryTable, InjuryRiskClassifier, Observation, RiskPipeline,
    SessionLoadScorer, SessionRecord, TrendForecaster,
};

/// Performance benchmarks for the risk pipeline
///
/// Every request refits all models, so these track how fitting cost grows
/// with the length of an athlete's history.

fn create_history(days: usize) -> HistoryTable {
    let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
    let rows = (0..days)
        .map(|day| {
            let date = start + Duration::days(day as i64);
            let hard = day % 3 == 0;
            let wave = (day % 7) as f64 * 12.0;
            if hard {
                Observation::new(date, 600.0 + wave, 42.0 - (day % 4) as f64, 5.6)
                    .with_fatigue(2)
                    .with_injury(i64::from(day % 9 == 0))
            } else {
                Observation::new(date, 260.0 + wave, 68.0 + (day % 5) as f64, 7.9)
                    .with_fatigue(i64::from(day % 5 == 1))
                    .with_injury(0)
            }
        })
        .collect();
    HistoryTable::from_observations(rows)
}

fn bench_full_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("Risk Pipeline");
    group.sample_size(20);

    let pipeline = RiskPipeline::new();
    for &days in &[14, 60, 180, 365] {
        let history = create_history(days);

        group.throughput(Throughput::Elements(days as u64));
        group.bench_with_input(BenchmarkId::new("run", days), &history, |b, history| {
            b.iter(|| pipeline.run(black_box(history)));
        });
    }

    group.finish();
}

fn bench_individual_models(c: &mut Criterion) {
    let mut group = c.benchmark_group("Models");
    group.sample_size(20);

    let forecaster = TrendForecaster::new();
    let fatigue = FatigueClassifier::new();
    let injury = InjuryRiskClassifier::new();

    for &days in &[60, 365] {
        let history = create_history(days);

        group.bench_with_input(BenchmarkId::new("trend", days), &history, |b, history| {
            b.iter(|| forecaster.forecast_history(black_box(history)));
        });
        group.bench_with_input(BenchmarkId::new("fatigue", days), &history, |b, history| {
            b.iter(|| fatigue.predict_latest(black_box(history)));
        });
        group.bench_with_input(BenchmarkId::new("injury", days), &history, |b, history| {
            b.iter(|| injury.assess(black_box(history), Some(0)));
        });
    }

    group.finish();
}

fn bench_history_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("History Parsing");

    for &days in &[60, 365] {
        let payload = serde_json::to_string(&create_history(days).rows()).unwrap();

        group.throughput(Throughput::Bytes(payload.len() as u64));
        group.bench_with_input(BenchmarkId::new("from_json_str", days), &payload, |b, payload| {
            b.iter(|| HistoryTable::from_json_str(black_box(payload)));
        });
    }

    group.finish();
}

fn bench_session_scoring(c: &mut Criterion) {
    let scorer = SessionLoadScorer::new();
    let db = Database::in_memory().unwrap();

    c.bench_function("score", |b| {
        b.iter(|| scorer.score(black_box(75), black_box(7)));
    });
    c.bench_function("score_and_record", |b| {
        let session = SessionRecord::new("bench-athlete", 75, 7);
        b.iter(|| scorer.score_and_record(&db, black_box(&session)));
    });
}

criterion_group!(
    benches,
    bench_full_pipeline,
    bench_individual_models,
    bench_history_parsing,
    bench_session_scoring
);

criterion_main!(benches);
