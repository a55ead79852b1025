use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

use crate::calc::{GradeScale, IgcseWeights};
use crate::db;
use crate::stats::{default_passing_grades, DEFAULT_PASS_THRESHOLD};

pub const SETTINGS_KEY: &str = "grading.config";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{scale} scale has no boundaries")]
    EmptyScale { scale: &'static str },

    #[error("{scale} scale boundary {grade} has threshold {min} outside 0..=100")]
    BoundaryOutOfRange {
        scale: &'static str,
        grade: String,
        min: f64,
    },

    #[error("{scale} scale lists grade {grade} more than once")]
    DuplicateGrade { scale: &'static str, grade: String },

    #[error("{scale} scale needs a boundary at 0")]
    MissingZeroBoundary { scale: &'static str },

    #[error("IGCSE weights must sum to 100 (got {coursework} + {exam})")]
    WeightsMismatch { coursework: u32, exam: u32 },

    #[error("passing threshold {0} is outside 0..=100")]
    ThresholdOutOfRange(f64),
}

/// Grading rules a workspace may override. Every field falls back to the
/// built-in tables when absent from the stored JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GradingConfig {
    pub standard_scale: GradeScale,
    pub igcse_scale: GradeScale,
    pub igcse_weights: IgcseWeights,
    pub passing_threshold: f64,
    pub passing_grades: Vec<String>,
}

impl Default for GradingConfig {
    fn default() -> Self {
        Self {
            standard_scale: GradeScale::standard(),
            igcse_scale: GradeScale::igcse(),
            igcse_weights: IgcseWeights::default(),
            passing_threshold: DEFAULT_PASS_THRESHOLD,
            passing_grades: default_passing_grades(),
        }
    }
}

impl GradingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_scale("standard", &self.standard_scale)?;
        validate_scale("igcse", &self.igcse_scale)?;
        if !self.igcse_weights.sums_to_100() {
            return Err(ConfigError::WeightsMismatch {
                coursework: self.igcse_weights.coursework,
                exam: self.igcse_weights.exam,
            });
        }
        if !(0.0..=100.0).contains(&self.passing_threshold) {
            return Err(ConfigError::ThresholdOutOfRange(self.passing_threshold));
        }
        Ok(())
    }
}

fn validate_scale(name: &'static str, scale: &GradeScale) -> Result<(), ConfigError> {
    if scale.boundaries.is_empty() {
        return Err(ConfigError::EmptyScale { scale: name });
    }
    let mut seen: HashSet<&str> = HashSet::new();
    for b in &scale.boundaries {
        if !(0.0..=100.0).contains(&b.min) {
            return Err(ConfigError::BoundaryOutOfRange {
                scale: name,
                grade: b.grade.clone(),
                min: b.min,
            });
        }
        if !seen.insert(b.grade.as_str()) {
            return Err(ConfigError::DuplicateGrade {
                scale: name,
                grade: b.grade.clone(),
            });
        }
    }
    if !scale.boundaries.iter().any(|b| b.min == 0.0) {
        return Err(ConfigError::MissingZeroBoundary { scale: name });
    }
    Ok(())
}

/// Stored config, or defaults when the workspace never saved one.
pub fn load(conn: &Connection) -> anyhow::Result<GradingConfig> {
    let Some(raw) = db::settings_get_json(conn, SETTINGS_KEY)? else {
        return Ok(GradingConfig::default());
    };
    let cfg: GradingConfig = serde_json::from_value(raw)?;
    cfg.validate()?;
    Ok(cfg)
}

pub fn save(conn: &Connection, cfg: &GradingConfig) -> anyhow::Result<()> {
    cfg.validate()?;
    db::settings_set_json(conn, SETTINGS_KEY, &serde_json::to_value(cfg)?)
}
