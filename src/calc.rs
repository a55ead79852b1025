use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::config::GradingConfig;

pub const DEFAULT_MAX_SCORE: f64 = 100.0;
pub const DEFAULT_COURSEWORK_WEIGHT: u32 = 30;
pub const DEFAULT_EXAM_WEIGHT: u32 = 70;

/// Two-decimal rounding used for every percentage the calculator emits:
/// `floor(100 * x + 0.5) / 100`, i.e. half up.
pub fn round_2dp(x: f64) -> f64 {
    ((100.0 * x) + 0.5).floor() / 100.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CurriculumType {
    Standard,
    Cbc,
    Igcse,
}

impl CurriculumType {
    pub fn as_str(self) -> &'static str {
        match self {
            CurriculumType::Standard => "standard",
            CurriculumType::Cbc => "cbc",
            CurriculumType::Igcse => "igcse",
        }
    }
}

impl fmt::Display for CurriculumType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CurriculumType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard" => Ok(CurriculumType::Standard),
            "cbc" => Ok(CurriculumType::Cbc),
            "igcse" => Ok(CurriculumType::Igcse),
            other => Err(format!("Unsupported curriculum type: {}", other)),
        }
    }
}

/// CBC competency bands: exceeding, meeting, approaching, below expectation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PerformanceLevel {
    EE,
    ME,
    AE,
    BE,
}

impl PerformanceLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            PerformanceLevel::EE => "EE",
            PerformanceLevel::ME => "ME",
            PerformanceLevel::AE => "AE",
            PerformanceLevel::BE => "BE",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "EE" => Some(PerformanceLevel::EE),
            "ME" => Some(PerformanceLevel::ME),
            "AE" => Some(PerformanceLevel::AE),
            "BE" => Some(PerformanceLevel::BE),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeBoundary {
    pub grade: String,
    pub min: f64,
}

impl GradeBoundary {
    fn new(grade: &str, min: f64) -> Self {
        Self {
            grade: grade.to_string(),
            min,
        }
    }
}

/// A letter-grade table with inclusive lower bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GradeScale {
    pub boundaries: Vec<GradeBoundary>,
}

impl GradeScale {
    pub fn standard() -> Self {
        Self {
            boundaries: vec![
                GradeBoundary::new("A+", 90.0),
                GradeBoundary::new("A", 80.0),
                GradeBoundary::new("B+", 70.0),
                GradeBoundary::new("B", 60.0),
                GradeBoundary::new("C+", 50.0),
                GradeBoundary::new("C", 40.0),
                GradeBoundary::new("D+", 30.0),
                GradeBoundary::new("D", 20.0),
                GradeBoundary::new("E", 0.0),
            ],
        }
    }

    pub fn igcse() -> Self {
        Self {
            boundaries: vec![
                GradeBoundary::new("A*", 90.0),
                GradeBoundary::new("A", 80.0),
                GradeBoundary::new("B", 70.0),
                GradeBoundary::new("C", 60.0),
                GradeBoundary::new("D", 50.0),
                GradeBoundary::new("E", 40.0),
                GradeBoundary::new("F", 30.0),
                GradeBoundary::new("G", 20.0),
                GradeBoundary::new("U", 0.0),
            ],
        }
    }

    pub fn contains(&self, grade: &str) -> bool {
        self.boundaries.iter().any(|b| b.grade == grade)
    }

    /// Highest boundary not above `percentage` wins. Returns `None` when the
    /// percentage is absent or outside `[0, 100]`.
    pub fn letter_for(&self, percentage: Option<f64>) -> Option<String> {
        let p = percentage?;
        if !(0.0..=100.0).contains(&p) {
            return None;
        }
        let mut sorted: Vec<&GradeBoundary> = self.boundaries.iter().collect();
        sorted.sort_by(|a, b| b.min.total_cmp(&a.min));
        let grade = sorted
            .into_iter()
            .find(|b| b.min <= p)
            .map(|b| b.grade.clone())
            // Unreachable with a zero boundary present.
            .unwrap_or_else(|| "E".to_string());
        Some(grade)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IgcseWeights {
    pub coursework: u32,
    pub exam: u32,
}

impl Default for IgcseWeights {
    fn default() -> Self {
        Self {
            coursework: DEFAULT_COURSEWORK_WEIGHT,
            exam: DEFAULT_EXAM_WEIGHT,
        }
    }
}

impl IgcseWeights {
    pub fn sums_to_100(&self) -> bool {
        u64::from(self.coursework) + u64::from(self.exam) == 100
    }
}

fn default_max_score() -> f64 {
    DEFAULT_MAX_SCORE
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StandardInput {
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default = "default_max_score")]
    pub max_score: f64,
}

/// CBC marks are out of 100. `maxScore` is accepted so the common entry
/// shape parses, but any other scale is refused at calculation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CbcInput {
    #[serde(default, alias = "score")]
    pub marks: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct IgcseInput {
    #[serde(default)]
    pub coursework_score: Option<f64>,
    #[serde(default)]
    pub exam_score: Option<f64>,
    /// Falls back to the configured split when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coursework_weight: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exam_weight: Option<u32>,
}

/// One raw score entry, tagged by the curriculum whose rules apply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "curriculumType", rename_all = "lowercase")]
pub enum GradeInput {
    Standard(StandardInput),
    Cbc(CbcInput),
    Igcse(IgcseInput),
}

impl GradeInput {
    pub fn curriculum(&self) -> CurriculumType {
        match self {
            GradeInput::Standard(_) => CurriculumType::Standard,
            GradeInput::Cbc(_) => CurriculumType::Cbc,
            GradeInput::Igcse(_) => CurriculumType::Igcse,
        }
    }

    /// Same entry with replacement scores. Scale and weights stay as stored;
    /// components absent from `update` keep their current values.
    pub fn with_scores(&self, update: &ScoreUpdate) -> GradeInput {
        match self {
            GradeInput::Standard(s) => GradeInput::Standard(StandardInput {
                score: update.score.or(s.score),
                max_score: s.max_score,
            }),
            GradeInput::Cbc(c) => GradeInput::Cbc(CbcInput {
                marks: update.score.or(c.marks),
                max_score: c.max_score,
            }),
            GradeInput::Igcse(i) => GradeInput::Igcse(IgcseInput {
                coursework_score: update.coursework_score.or(i.coursework_score),
                exam_score: update.exam_score.or(i.exam_score),
                coursework_weight: i.coursework_weight,
                exam_weight: i.exam_weight,
            }),
        }
    }
}

/// Replacement scores for an existing entry. `score` is the standard score
/// or the CBC marks; IGCSE uses the two component scores.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreUpdate {
    #[serde(default, alias = "newScore", alias = "marks")]
    pub score: Option<f64>,
    #[serde(default)]
    pub coursework_score: Option<f64>,
    #[serde(default)]
    pub exam_score: Option<f64>,
}

impl ScoreUpdate {
    pub fn is_empty(&self) -> bool {
        self.score.is_none() && self.coursework_score.is_none() && self.exam_score.is_none()
    }
}

/// Untyped entry as it arrives from a form or bulk grid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeParams {
    /// Left empty when absent so the result reports it as unsupported.
    #[serde(default)]
    pub curriculum_type: String,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub max_score: Option<f64>,
    #[serde(default)]
    pub coursework_score: Option<f64>,
    #[serde(default)]
    pub exam_score: Option<f64>,
    #[serde(default)]
    pub coursework_weight: Option<u32>,
    #[serde(default)]
    pub exam_weight: Option<u32>,
}

impl TryFrom<&GradeParams> for GradeInput {
    type Error = String;

    fn try_from(p: &GradeParams) -> Result<Self, Self::Error> {
        let curriculum: CurriculumType = p.curriculum_type.parse()?;
        Ok(match curriculum {
            CurriculumType::Standard => GradeInput::Standard(StandardInput {
                score: p.score,
                max_score: p.max_score.unwrap_or(DEFAULT_MAX_SCORE),
            }),
            // CBC marks are always out of 100; the score is taken as-is.
            CurriculumType::Cbc => GradeInput::Cbc(CbcInput {
                marks: p.score,
                max_score: p.max_score,
            }),
            CurriculumType::Igcse => GradeInput::Igcse(IgcseInput {
                coursework_score: p.coursework_score,
                exam_score: p.exam_score,
                coursework_weight: p.coursework_weight,
                exam_weight: p.exam_weight,
            }),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeResult {
    pub score: Option<f64>,
    pub max_score: f64,
    pub percentage: Option<f64>,
    pub letter_grade: Option<String>,
    pub cbc_performance_level: Option<PerformanceLevel>,
    pub is_valid: bool,
    pub error: Option<String>,
}

impl GradeResult {
    pub fn invalid(score: Option<f64>, max_score: f64, error: impl Into<String>) -> Self {
        Self {
            score,
            max_score,
            percentage: None,
            letter_grade: None,
            cbc_performance_level: None,
            is_valid: false,
            error: Some(error.into()),
        }
    }
}

pub fn calculate_percentage(score: Option<f64>, max_score: f64) -> Option<f64> {
    let score = score?;
    if !(max_score > 0.0) {
        return None;
    }
    if !(score >= 0.0 && score <= max_score) {
        return None;
    }
    Some(round_2dp(score / max_score * 100.0))
}

/// Letter grade from the fixed table of `curriculum`. CBC has no letter
/// grades and always yields `None`.
pub fn calculate_letter_grade(percentage: Option<f64>, curriculum: CurriculumType) -> Option<String> {
    match curriculum {
        CurriculumType::Standard => GradeScale::standard().letter_for(percentage),
        CurriculumType::Igcse => GradeScale::igcse().letter_for(percentage),
        CurriculumType::Cbc => None,
    }
}

/// Out-of-range marks fall back to `BE` rather than signalling invalid
/// input; `calculate_cbc_grade` is the validating entry point.
pub fn calculate_cbc_performance_level(marks: f64) -> PerformanceLevel {
    if (80.0..=100.0).contains(&marks) {
        PerformanceLevel::EE
    } else if (60.0..80.0).contains(&marks) {
        PerformanceLevel::ME
    } else if (40.0..60.0).contains(&marks) {
        PerformanceLevel::AE
    } else {
        PerformanceLevel::BE
    }
}

pub fn calculate_standard_grade(score: Option<f64>, max_score: f64) -> GradeResult {
    calculate_standard_grade_with(score, max_score, &GradeScale::standard())
}

pub fn calculate_standard_grade_with(
    score: Option<f64>,
    max_score: f64,
    scale: &GradeScale,
) -> GradeResult {
    let Some(value) = score else {
        return GradeResult::invalid(None, max_score, "Score is required");
    };
    if !(max_score > 0.0) {
        return GradeResult::invalid(score, max_score, "Maximum score must be greater than 0");
    }
    if !(value >= 0.0 && value <= max_score) {
        return GradeResult::invalid(
            score,
            max_score,
            format!("Score must be between 0 and {}", max_score),
        );
    }

    let percentage = calculate_percentage(score, max_score);
    GradeResult {
        score,
        max_score,
        percentage,
        letter_grade: scale.letter_for(percentage),
        cbc_performance_level: None,
        is_valid: true,
        error: None,
    }
}

pub fn calculate_cbc_grade(marks: Option<f64>) -> GradeResult {
    let invalid = |error: String| GradeResult {
        cbc_performance_level: Some(PerformanceLevel::BE),
        ..GradeResult::invalid(marks, DEFAULT_MAX_SCORE, error)
    };
    let Some(value) = marks else {
        return invalid("Marks are required".to_string());
    };
    if !(0.0..=100.0).contains(&value) {
        return invalid("Marks must be between 0 and 100".to_string());
    }

    GradeResult {
        score: marks,
        max_score: DEFAULT_MAX_SCORE,
        percentage: Some(round_2dp(value)),
        letter_grade: None,
        cbc_performance_level: Some(calculate_cbc_performance_level(value)),
        is_valid: true,
        error: None,
    }
}

pub fn calculate_igcse_grade(
    coursework_score: Option<f64>,
    exam_score: Option<f64>,
    coursework_weight: u32,
    exam_weight: u32,
) -> GradeResult {
    calculate_igcse_grade_with(
        coursework_score,
        exam_score,
        IgcseWeights {
            coursework: coursework_weight,
            exam: exam_weight,
        },
        &GradeScale::igcse(),
    )
}

pub fn calculate_igcse_grade_with(
    coursework_score: Option<f64>,
    exam_score: Option<f64>,
    weights: IgcseWeights,
    scale: &GradeScale,
) -> GradeResult {
    let (Some(coursework), Some(exam)) = (coursework_score, exam_score) else {
        return GradeResult::invalid(
            None,
            DEFAULT_MAX_SCORE,
            "Coursework and exam scores are required",
        );
    };
    if !(0.0..=100.0).contains(&coursework) {
        return GradeResult::invalid(
            None,
            DEFAULT_MAX_SCORE,
            "Coursework score must be between 0 and 100",
        );
    }
    if !(0.0..=100.0).contains(&exam) {
        return GradeResult::invalid(
            None,
            DEFAULT_MAX_SCORE,
            "Exam score must be between 0 and 100",
        );
    }
    if !weights.sums_to_100() {
        return GradeResult::invalid(
            None,
            DEFAULT_MAX_SCORE,
            format!(
                "Coursework and exam weights must sum to 100 (got {} + {})",
                weights.coursework, weights.exam
            ),
        );
    }

    let total = coursework * f64::from(weights.coursework) / 100.0
        + exam * f64::from(weights.exam) / 100.0;
    let percentage = round_2dp(total);
    GradeResult {
        score: Some(percentage),
        max_score: DEFAULT_MAX_SCORE,
        percentage: Some(percentage),
        letter_grade: scale.letter_for(Some(percentage)),
        cbc_performance_level: None,
        is_valid: true,
        error: None,
    }
}

pub fn calculate_grade(input: &GradeInput) -> GradeResult {
    calculate_grade_with(input, &GradingConfig::default())
}

pub fn calculate_grade_with(input: &GradeInput, config: &GradingConfig) -> GradeResult {
    match input {
        GradeInput::Standard(s) => {
            calculate_standard_grade_with(s.score, s.max_score, &config.standard_scale)
        }
        GradeInput::Cbc(c) => match c.max_score {
            Some(max) if max != DEFAULT_MAX_SCORE => GradeResult {
                cbc_performance_level: Some(PerformanceLevel::BE),
                ..GradeResult::invalid(
                    c.marks,
                    max,
                    format!("CBC marks are out of 100, got a maximum of {}", max),
                )
            },
            _ => calculate_cbc_grade(c.marks),
        },
        GradeInput::Igcse(i) => {
            let weights = IgcseWeights {
                coursework: i.coursework_weight.unwrap_or(config.igcse_weights.coursework),
                exam: i.exam_weight.unwrap_or(config.igcse_weights.exam),
            };
            calculate_igcse_grade_with(i.coursework_score, i.exam_score, weights, &config.igcse_scale)
        }
    }
}

pub fn calculate_grade_params(params: &GradeParams) -> GradeResult {
    calculate_grade_params_with(params, &GradingConfig::default())
}

pub fn calculate_grade_params_with(params: &GradeParams, config: &GradingConfig) -> GradeResult {
    match GradeInput::try_from(params) {
        Ok(input) => calculate_grade_with(&input, config),
        Err(message) => GradeResult::invalid(
            params.score,
            params.max_score.unwrap_or(DEFAULT_MAX_SCORE),
            message,
        ),
    }
}
