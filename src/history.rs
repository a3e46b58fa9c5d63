//! Athlete history table
//!
//! Parses the rows handed over by the data-access layer into an ordered,
//! immutable sequence of [`Observation`]s and exposes narrow read-only
//! projections for each model so parsing happens exactly once per request.

use chrono::{DateTime, NaiveDate};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap};
use std::io::Read;

use crate::error::{DataError, RiskError, ValidationError};
use crate::models::{Label, Observation};

/// Logical history columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    Date,
    Load,
    Hrv,
    SleepHours,
    FatigueLabel,
    InjuryLabel,
}

impl Column {
    pub fn name(&self) -> &'static str {
        match self {
            Column::Date => "date",
            Column::Load => "load",
            Column::Hrv => "hrv",
            Column::SleepHours => "sleep_hours",
            Column::FatigueLabel => "fatigue_label",
            Column::InjuryLabel => "injury_label",
        }
    }

    const ALL: [Column; 6] = [
        Column::Date,
        Column::Load,
        Column::Hrv,
        Column::SleepHours,
        Column::FatigueLabel,
        Column::InjuryLabel,
    ];
}

/// Maps header spellings (English and the legacy Spanish schema) to columns
struct ColumnMapping {
    names: HashMap<String, Column>,
}

impl ColumnMapping {
    fn new() -> Self {
        let mut names = HashMap::new();
        Self::add(&mut names, Column::Date, &["date", "fecha", "ds", "day"]);
        Self::add(&mut names, Column::Load, &["load", "carga", "training_load", "y"]);
        Self::add(&mut names, Column::Hrv, &["hrv", "heart_rate_variability"]);
        Self::add(
            &mut names,
            Column::SleepHours,
            &["sleep_hours", "suenio_horas", "sleep", "sleep_duration"],
        );
        Self::add(&mut names, Column::FatigueLabel, &["fatigue_label", "fatiga", "fatigue"]);
        Self::add(&mut names, Column::InjuryLabel, &["injury_label", "lesion", "injury"]);
        Self { names }
    }

    fn add(names: &mut HashMap<String, Column>, column: Column, variations: &[&str]) {
        for variation in variations {
            names.insert(variation.to_string(), column);
        }
    }

    fn resolve(&self, header: &str) -> Option<Column> {
        let normalized = header.trim().to_lowercase().replace([' ', '-'], "_");
        self.names.get(&normalized).copied()
    }
}

/// Ordered, immutable history of one athlete
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryTable {
    rows: Vec<Observation>,
    columns: BTreeSet<&'static str>,
}

/// Training rows and live feature vector for the fatigue classifier
#[derive(Debug, Clone, PartialEq)]
pub struct FatigueView {
    pub features: Vec<[f64; 3]>,
    pub labels: Vec<Label>,
    pub latest: [f64; 3],
}

/// Training rows for the injury classifier
#[derive(Debug, Clone, PartialEq)]
pub struct InjuryView {
    /// `(load, hrv, sleep_hours, fatigue_label)` per complete row
    pub features: Vec<[f64; 4]>,
    pub labels: Vec<Label>,
    /// Features of the most recent observation, without the fatigue label
    pub latest: [f64; 3],
    /// Recorded fatigue label of the most recent observation
    pub latest_fatigue_label: Option<Label>,
}

impl HistoryTable {
    /// Build a table from already-typed observations
    pub fn from_observations(mut rows: Vec<Observation>) -> Self {
        rows.sort_by_key(|row| row.date);

        let mut columns = BTreeSet::new();
        columns.insert(Column::Date.name());
        for row in &rows {
            if row.load.is_some() {
                columns.insert(Column::Load.name());
            }
            if row.hrv.is_some() {
                columns.insert(Column::Hrv.name());
            }
            if row.sleep_hours.is_some() {
                columns.insert(Column::SleepHours.name());
            }
            if row.fatigue_label.is_some() {
                columns.insert(Column::FatigueLabel.name());
            }
            if row.injury_label.is_some() {
                columns.insert(Column::InjuryLabel.name());
            }
        }

        Self { rows, columns }
    }

    /// Parse a JSON payload: either an array of rows or `{"training_data": [...]}`
    pub fn from_json_str(payload: &str) -> Result<Self, RiskError> {
        let value: Value = serde_json::from_str(payload).map_err(|e| {
            ValidationError::MalformedPayload {
                reason: e.to_string(),
            }
        })?;
        Ok(Self::from_json_value(&value)?)
    }

    /// Parse an already-decoded JSON payload
    pub fn from_json_value(value: &Value) -> Result<Self, ValidationError> {
        let rows = match value {
            Value::Array(rows) => rows,
            Value::Object(map) => match map.get("training_data") {
                Some(Value::Array(rows)) => rows,
                Some(_) => {
                    return Err(ValidationError::MalformedPayload {
                        reason: "training_data must be an array of rows".to_string(),
                    })
                }
                None => {
                    return Err(ValidationError::MissingField {
                        field: "training_data".to_string(),
                    })
                }
            },
            _ => {
                return Err(ValidationError::MalformedPayload {
                    reason: "expected an array of rows".to_string(),
                })
            }
        };

        let mapping = ColumnMapping::new();
        let mut columns = BTreeSet::new();
        let mut observations = Vec::with_capacity(rows.len());

        for (index, row) in rows.iter().enumerate() {
            let object = row.as_object().ok_or_else(|| ValidationError::MalformedPayload {
                reason: format!("row {} is not an object", index),
            })?;
            let cells = Self::map_cells(&mapping, object);
            for column in cells.keys() {
                columns.insert(column.name());
            }
            observations.push(Self::observation_from_cells(index, &cells)?);
        }

        observations.sort_by_key(|row| row.date);
        Ok(Self {
            rows: observations,
            columns,
        })
    }

    /// Parse CSV history with a header row
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, ValidationError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = csv_reader
            .headers()
            .map_err(|e| ValidationError::MalformedPayload {
                reason: e.to_string(),
            })?
            .clone();

        let mut rows = Vec::new();
        for record in csv_reader.records() {
            let record = record.map_err(|e| ValidationError::MalformedPayload {
                reason: e.to_string(),
            })?;
            let mut object = Map::new();
            for (header, cell) in headers.iter().zip(record.iter()) {
                let value = if cell.is_empty() {
                    Value::Null
                } else {
                    Value::String(cell.to_string())
                };
                object.insert(header.to_string(), value);
            }
            rows.push(Value::Object(object));
        }

        Self::from_json_value(&Value::Array(rows))
    }

    fn map_cells<'a>(
        mapping: &ColumnMapping,
        object: &'a Map<String, Value>,
    ) -> HashMap<Column, &'a Value> {
        let mut cells = HashMap::new();
        for (header, value) in object {
            if let Some(column) = mapping.resolve(header) {
                cells.entry(column).or_insert(value);
            }
        }
        cells
    }

    fn observation_from_cells(
        index: usize,
        cells: &HashMap<Column, &Value>,
    ) -> Result<Observation, ValidationError> {
        let date_value = cells
            .get(&Column::Date)
            .ok_or_else(|| ValidationError::InvalidDate {
                row: index,
                value: "<missing>".to_string(),
            })?;
        let date = parse_date(date_value).ok_or_else(|| ValidationError::InvalidDate {
            row: index,
            value: date_value.to_string(),
        })?;

        let number = |column: Column| cells.get(&column).and_then(|v| parse_number(v));
        let label = |column: Column| cells.get(&column).and_then(|v| parse_label(v));

        Ok(Observation {
            date,
            load: number(Column::Load),
            hrv: number(Column::Hrv),
            sleep_hours: number(Column::SleepHours),
            fatigue_label: label(Column::FatigueLabel),
            injury_label: label(Column::InjuryLabel),
        })
    }

    pub fn rows(&self) -> &[Observation] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Observation with the maximum date
    pub fn latest(&self) -> Option<&Observation> {
        self.rows.last()
    }

    /// Whether any supplied row carried the column
    pub fn has_column(&self, column: Column) -> bool {
        self.columns.contains(column.name())
    }

    fn require_column(&self, column: Column) -> Result<(), DataError> {
        if self.has_column(column) {
            Ok(())
        } else {
            Err(DataError::MissingColumn {
                column: column.name().to_string(),
            })
        }
    }

    /// `(date, load)` pairs for rows with a numeric load
    pub fn load_series(&self) -> Result<Vec<(NaiveDate, f64)>, DataError> {
        if self.rows.is_empty() {
            return Err(DataError::EmptyHistory);
        }
        self.require_column(Column::Load)?;

        let series: Vec<(NaiveDate, f64)> = self
            .rows
            .iter()
            .filter_map(|row| row.load.filter(|v| v.is_finite()).map(|load| (row.date, load)))
            .collect();

        if series.is_empty() {
            return Err(DataError::NoNumericValues {
                column: Column::Load.name().to_string(),
            });
        }
        Ok(series)
    }

    fn require_feature_columns(&self) -> Result<(), DataError> {
        if self.rows.is_empty() {
            return Err(DataError::EmptyHistory);
        }
        self.require_column(Column::Load)?;
        self.require_column(Column::Hrv)?;
        self.require_column(Column::SleepHours)
    }

    fn latest_features(&self) -> Result<[f64; 3], DataError> {
        let latest = self.latest().ok_or(DataError::EmptyHistory)?;
        latest.features().ok_or_else(|| {
            let missing: Vec<&str> = [
                (latest.load, Column::Load),
                (latest.hrv, Column::Hrv),
                (latest.sleep_hours, Column::SleepHours),
            ]
            .iter()
            .filter(|(value, _)| value.is_none())
            .map(|(_, column)| column.name())
            .collect();
            DataError::IncompleteLatestRow {
                missing: missing.join(", "),
            }
        })
    }

    /// Projection used by the fatigue classifier
    pub fn fatigue_view(&self) -> Result<FatigueView, DataError> {
        self.require_feature_columns()?;
        self.require_column(Column::FatigueLabel)?;

        let (features, labels): (Vec<[f64; 3]>, Vec<Label>) = self
            .rows
            .iter()
            .filter_map(|row| Some((row.features()?, row.fatigue_label?)))
            .unzip();

        if features.is_empty() {
            return Err(DataError::NoLabelledRows {
                model: "fatigue classifier".to_string(),
            });
        }

        Ok(FatigueView {
            features,
            labels,
            latest: self.latest_features()?,
        })
    }

    /// Distinct injury labels across history, `None` if the column is absent
    pub fn injury_label_values(&self) -> Option<BTreeSet<Label>> {
        if !self.has_column(Column::InjuryLabel) {
            return None;
        }
        Some(self.rows.iter().filter_map(|row| row.injury_label).collect())
    }

    /// Projection used by the injury classifier; training rows carry
    /// ground-truth fatigue labels only
    pub fn injury_view(&self) -> Result<InjuryView, DataError> {
        self.require_feature_columns()?;
        self.require_column(Column::FatigueLabel)?;
        self.require_column(Column::InjuryLabel)?;

        let (features, labels): (Vec<[f64; 4]>, Vec<Label>) = self
            .rows
            .iter()
            .filter_map(|row| {
                let [load, hrv, sleep] = row.features()?;
                let fatigue = row.fatigue_label? as f64;
                Some(([load, hrv, sleep, fatigue], row.injury_label?))
            })
            .unzip();

        if features.is_empty() {
            return Err(DataError::NoLabelledRows {
                model: "injury classifier".to_string(),
            });
        }

        Ok(InjuryView {
            features,
            labels,
            latest: self.latest_features()?,
            latest_fatigue_label: self.latest().and_then(|row| row.fatigue_label),
        })
    }

    /// SHA-256 over the canonical row contents, used to correlate requests
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for row in &self.rows {
            hasher.update(
                format!(
                    "{}|{:?}|{:?}|{:?}|{:?}|{:?}\n",
                    row.date, row.load, row.hrv, row.sleep_hours, row.fatigue_label, row.injury_label
                )
                .as_bytes(),
            );
        }
        format!("{:x}", hasher.finalize())
    }

    /// Names of the logical columns present
    pub fn column_names(&self) -> Vec<&'static str> {
        Column::ALL
            .iter()
            .filter(|column| self.has_column(**column))
            .map(|column| column.name())
            .collect()
    }
}

fn parse_date(value: &Value) -> Option<NaiveDate> {
    let text = value.as_str()?.trim();
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(datetime) = DateTime::parse_from_rfc3339(text) {
        return Some(datetime.date_naive());
    }
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"]
        .iter()
        .find_map(|format| chrono::NaiveDateTime::parse_from_str(text, format).ok())
        .map(|datetime| datetime.date())
}

fn parse_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    number.is_finite().then_some(number)
}

fn parse_label(value: &Value) -> Option<Label> {
    match value {
        Value::Bool(flag) => Some(Label::from(*flag)),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as Label)),
        Value::String(s) => {
            let trimmed = s.trim();
            trimmed.parse::<Label>().ok().or_else(|| {
                trimmed
                    .parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite() && f.fract() == 0.0)
                    .map(|f| f as Label)
            })
        }
        _ => None,
    }
}
