use serde::{Deserialize, Serialize};

use crate::calc::{round_2dp, CurriculumType, GradeResult, GradeScale, PerformanceLevel};
use crate::config::GradingConfig;

pub const DEFAULT_PASS_THRESHOLD: f64 = 50.0;

/// Letters that mean at least 50% under both the standard and IGCSE tables.
pub fn default_passing_grades() -> Vec<String> {
    ["A+", "A*", "A", "B+", "B", "C+"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// One element of an aggregate: either an explicit percentage or a raw
/// score that a percentage can be derived from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeSample {
    #[serde(default)]
    pub percentage: Option<f64>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub max_score: Option<f64>,
    #[serde(default)]
    pub letter_grade: Option<String>,
}

impl GradeSample {
    pub fn from_percentage(percentage: f64) -> Self {
        Self {
            percentage: Some(percentage),
            ..Self::default()
        }
    }

    pub fn derived_percentage(&self) -> Option<f64> {
        if let Some(p) = self.percentage {
            return Some(p);
        }
        match (self.score, self.max_score) {
            (Some(score), Some(max)) if max > 0.0 => Some(score / max * 100.0),
            _ => None,
        }
    }
}

/// Invalid results carry no usable data and are skipped by the aggregates.
impl From<&GradeResult> for GradeSample {
    fn from(r: &GradeResult) -> Self {
        if !r.is_valid {
            return Self::default();
        }
        Self {
            percentage: r.percentage,
            score: r.score,
            max_score: Some(r.max_score),
            letter_grade: r.letter_grade.clone(),
        }
    }
}

fn usable_percentages(grades: &[GradeSample]) -> Vec<f64> {
    grades
        .iter()
        .filter_map(GradeSample::derived_percentage)
        .collect()
}

/// Mean of the usable percentages. An empty set yields 0, which callers
/// treat as "no data".
pub fn calculate_class_average(grades: &[GradeSample]) -> f64 {
    let values = usable_percentages(grades);
    if values.is_empty() {
        return 0.0;
    }
    round_2dp(values.iter().sum::<f64>() / values.len() as f64)
}

pub fn calculate_pass_rate(grades: &[GradeSample]) -> i64 {
    calculate_pass_rate_with(grades, DEFAULT_PASS_THRESHOLD, &default_passing_grades())
}

/// A grade passes on percentage OR on letter; either suffices.
pub fn calculate_pass_rate_with(
    grades: &[GradeSample],
    passing_threshold: f64,
    passing_grades: &[String],
) -> i64 {
    let mut valid: usize = 0;
    let mut passing: usize = 0;
    for g in grades {
        let percentage = g.derived_percentage();
        let letter = g.letter_grade.as_deref();
        if percentage.is_none() && letter.is_none() {
            continue;
        }
        valid += 1;
        let by_percentage = percentage.map(|p| p >= passing_threshold).unwrap_or(false);
        let by_letter = letter
            .map(|l| passing_grades.iter().any(|pg| pg == l))
            .unwrap_or(false);
        if by_percentage || by_letter {
            passing += 1;
        }
    }
    if valid == 0 {
        return 0;
    }
    (100.0 * passing as f64 / valid as f64).round() as i64
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeStatistics {
    pub count: usize,
    pub average: f64,
    pub highest: f64,
    pub lowest: f64,
    pub pass_rate: f64,
}

/// Pass rate here is percentage-only at a fixed 50% threshold.
pub fn calculate_grade_statistics(grades: &[GradeSample]) -> GradeStatistics {
    let values = usable_percentages(grades);
    if values.is_empty() {
        return GradeStatistics::default();
    }
    let count = values.len();
    let sum: f64 = values.iter().sum();
    let highest = values.iter().copied().fold(f64::MIN, f64::max);
    let lowest = values.iter().copied().fold(f64::MAX, f64::min);
    let passed = values.iter().filter(|p| **p >= DEFAULT_PASS_THRESHOLD).count();

    GradeStatistics {
        count,
        average: round_2dp(sum / count as f64),
        highest: round_2dp(highest),
        lowest: round_2dp(lowest),
        pass_rate: round_2dp(100.0 * passed as f64 / count as f64),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeData {
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub max_score: Option<f64>,
    #[serde(default)]
    pub percentage: Option<f64>,
    #[serde(default)]
    pub letter_grade: Option<String>,
    #[serde(default)]
    pub cbc_performance_level: Option<String>,
    #[serde(default)]
    pub curriculum_type: Option<String>,
}

impl From<&GradeResult> for GradeData {
    fn from(r: &GradeResult) -> Self {
        Self {
            score: r.score,
            max_score: Some(r.max_score),
            percentage: r.percentage,
            letter_grade: r.letter_grade.clone(),
            cbc_performance_level: r.cbc_performance_level.map(|l| l.as_str().to_string()),
            curriculum_type: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

pub fn validate_grade_data(grade: &GradeData) -> ValidationReport {
    let standard = GradeScale::standard();
    let igcse = GradeScale::igcse();
    validate_against(grade, &standard, &igcse)
}

pub fn validate_grade_data_with(grade: &GradeData, config: &GradingConfig) -> ValidationReport {
    validate_against(grade, &config.standard_scale, &config.igcse_scale)
}

fn validate_against(grade: &GradeData, standard: &GradeScale, igcse: &GradeScale) -> ValidationReport {
    let mut errors: Vec<String> = Vec::new();

    if let Some(score) = grade.score {
        if score < 0.0 {
            errors.push("Score cannot be negative".to_string());
        }
        if let Some(max) = grade.max_score {
            if score > max {
                errors.push("Score cannot exceed maximum score".to_string());
            }
        }
    }
    if let Some(max) = grade.max_score {
        if !(max > 0.0) {
            errors.push("Maximum score must be greater than 0".to_string());
        }
    }
    if let Some(p) = grade.percentage {
        if !(0.0..=100.0).contains(&p) {
            errors.push("Percentage must be between 0 and 100".to_string());
        }
    }
    if let Some(letter) = grade.letter_grade.as_deref() {
        if !standard.contains(letter) && !igcse.contains(letter) {
            errors.push(format!("Invalid letter grade: {}", letter));
        }
    }
    if let Some(level) = grade.cbc_performance_level.as_deref() {
        if PerformanceLevel::from_code(level).is_none() {
            errors.push(format!("Invalid CBC performance level: {}", level));
        }
    }
    if let Some(curriculum) = grade.curriculum_type.as_deref() {
        if curriculum.parse::<CurriculumType>().is_err() {
            errors.push(format!("Invalid curriculum type: {}", curriculum));
        }
    }

    ValidationReport {
        is_valid: errors.is_empty(),
        errors,
    }
}
