// Library interface for LoadRisk modules
// This allows integration tests and the CLI to access the core functionality

pub mod config;
pub mod database;
pub mod ensemble;
pub mod error;
pub mod fatigue;
pub mod forecast;
pub mod history;
pub mod injury;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod session;

// Re-export commonly used types for convenience
pub use models::*;
pub use config::AppConfig;
pub use database::{Database, FatigueStore};
pub use ensemble::{BaggedForest, ForestConfig};
pub use error::{ComputeError, DataError, DatabaseError, Result, RiskError, ValidationError};
pub use fatigue::FatigueClassifier;
pub use forecast::{Forecast, ForecastConfig, ForecastMethod, TrendForecaster};
pub use history::HistoryTable;
pub use injury::{InjuryConfig, InjuryRiskClassifier};
pub use logging::{LogConfig, LogFormat, LogLevel};
pub use pipeline::{DetailedReport, PipelineConfig, RiskPipeline, RiskReport, StageOutcome};
pub use session::{SessionConfig, SessionLoadScorer};
