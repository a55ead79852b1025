use gradebookd::calc::{
    calculate_cbc_grade, calculate_cbc_performance_level, calculate_grade, calculate_grade_params,
    calculate_igcse_grade, calculate_letter_grade, calculate_percentage, calculate_standard_grade,
    CbcInput, CurriculumType, GradeInput, GradeParams, IgcseInput, PerformanceLevel, ScoreUpdate,
    StandardInput,
};

#[test]
fn percentage_rounds_to_two_decimals() {
    assert_eq!(calculate_percentage(Some(1.0), 3.0), Some(33.33));
    assert_eq!(calculate_percentage(Some(2.0), 3.0), Some(66.67));
    assert_eq!(calculate_percentage(Some(0.0), 10.0), Some(0.0));
    assert_eq!(calculate_percentage(Some(10.0), 10.0), Some(100.0));
}

#[test]
fn percentage_refuses_instead_of_clamping() {
    assert_eq!(calculate_percentage(None, 100.0), None);
    assert_eq!(calculate_percentage(Some(5.0), 0.0), None);
    assert_eq!(calculate_percentage(Some(5.0), -10.0), None);
    assert_eq!(calculate_percentage(Some(-0.5), 10.0), None);
    assert_eq!(calculate_percentage(Some(10.5), 10.0), None);
}

#[test]
fn standard_letter_boundaries_are_inclusive() {
    let cases = [
        (90.0, "A+"),
        (89.99, "A"),
        (80.0, "A"),
        (70.0, "B+"),
        (60.0, "B"),
        (50.0, "C+"),
        (40.0, "C"),
        (30.0, "D+"),
        (20.0, "D"),
        (19.99, "E"),
        (0.0, "E"),
    ];
    for (p, expected) in cases {
        assert_eq!(
            calculate_letter_grade(Some(p), CurriculumType::Standard).as_deref(),
            Some(expected),
            "percentage {}",
            p
        );
    }
}

#[test]
fn igcse_letter_boundaries_are_inclusive() {
    let cases = [
        (100.0, "A*"),
        (90.0, "A*"),
        (80.0, "A"),
        (70.0, "B"),
        (60.0, "C"),
        (50.0, "D"),
        (40.0, "E"),
        (30.0, "F"),
        (20.0, "G"),
        (5.0, "U"),
    ];
    for (p, expected) in cases {
        assert_eq!(
            calculate_letter_grade(Some(p), CurriculumType::Igcse).as_deref(),
            Some(expected),
            "percentage {}",
            p
        );
    }
}

#[test]
fn letter_grade_rejects_missing_and_out_of_range() {
    assert_eq!(calculate_letter_grade(None, CurriculumType::Standard), None);
    assert_eq!(calculate_letter_grade(Some(-1.0), CurriculumType::Standard), None);
    assert_eq!(calculate_letter_grade(Some(100.01), CurriculumType::Igcse), None);
    assert_eq!(calculate_letter_grade(Some(75.0), CurriculumType::Cbc), None);
}

#[test]
fn cbc_band_edges_map_to_higher_band() {
    assert_eq!(calculate_cbc_performance_level(80.0), PerformanceLevel::EE);
    assert_eq!(calculate_cbc_performance_level(79.99), PerformanceLevel::ME);
    assert_eq!(calculate_cbc_performance_level(60.0), PerformanceLevel::ME);
    assert_eq!(calculate_cbc_performance_level(59.5), PerformanceLevel::AE);
    assert_eq!(calculate_cbc_performance_level(40.0), PerformanceLevel::AE);
    assert_eq!(calculate_cbc_performance_level(39.0), PerformanceLevel::BE);
    assert_eq!(calculate_cbc_performance_level(0.0), PerformanceLevel::BE);
}

#[test]
fn cbc_out_of_range_level_falls_back_to_be() {
    assert_eq!(calculate_cbc_performance_level(-5.0), PerformanceLevel::BE);
    assert_eq!(calculate_cbc_performance_level(101.0), PerformanceLevel::BE);
}

#[test]
fn cbc_grade_example() {
    let r = calculate_grade_params(&GradeParams {
        curriculum_type: "cbc".to_string(),
        score: Some(85.0),
        max_score: Some(100.0),
        ..GradeParams::default()
    });
    assert!(r.is_valid);
    assert_eq!(r.percentage, Some(85.0));
    assert_eq!(r.cbc_performance_level, Some(PerformanceLevel::EE));
    assert_eq!(r.letter_grade, None);
    assert_eq!(r.error, None);
}

#[test]
fn cbc_invalid_marks_default_to_be() {
    let r = calculate_cbc_grade(Some(120.0));
    assert!(!r.is_valid);
    assert_eq!(r.cbc_performance_level, Some(PerformanceLevel::BE));
    assert_eq!(r.percentage, None);
    assert!(r.error.is_some());

    let missing = calculate_cbc_grade(None);
    assert!(!missing.is_valid);
    assert_eq!(missing.cbc_performance_level, Some(PerformanceLevel::BE));
}

#[test]
fn standard_grade_example() {
    let r = calculate_grade(&GradeInput::Standard(StandardInput {
        score: Some(42.0),
        max_score: 50.0,
    }));
    assert!(r.is_valid);
    assert_eq!(r.percentage, Some(84.0));
    assert_eq!(r.letter_grade.as_deref(), Some("A"));
    assert_eq!(r.cbc_performance_level, None);
}

#[test]
fn standard_grade_errors_are_distinct() {
    let missing = calculate_standard_grade(None, 100.0);
    let bad_max = calculate_standard_grade(Some(10.0), 0.0);
    let out_of_range = calculate_standard_grade(Some(110.0), 100.0);
    for r in [&missing, &bad_max, &out_of_range] {
        assert!(!r.is_valid);
        assert_eq!(r.percentage, None);
        assert_eq!(r.letter_grade, None);
    }
    let messages = [
        missing.error.clone().expect("missing error"),
        bad_max.error.clone().expect("max error"),
        out_of_range.error.clone().expect("range error"),
    ];
    assert_ne!(messages[0], messages[1]);
    assert_ne!(messages[1], messages[2]);
    assert_ne!(messages[0], messages[2]);
}

#[test]
fn igcse_weighted_example() {
    let r = calculate_igcse_grade(Some(80.0), Some(60.0), 30, 70);
    assert!(r.is_valid);
    assert_eq!(r.percentage, Some(66.0));
    assert_eq!(r.letter_grade.as_deref(), Some("C"));
    assert_eq!(r.max_score, 100.0);
}

#[test]
fn igcse_weights_must_sum_to_exactly_100() {
    for (cw, ex) in [(30, 69), (30, 71), (0, 0), (100, 1)] {
        let r = calculate_igcse_grade(Some(80.0), Some(60.0), cw, ex);
        assert!(!r.is_valid, "weights {}/{} accepted", cw, ex);
        assert!(r.error.as_deref().unwrap_or("").contains("sum to 100"));
    }
    assert!(calculate_igcse_grade(Some(80.0), Some(60.0), 50, 50).is_valid);
}

#[test]
fn igcse_requires_both_scores_in_range() {
    assert!(!calculate_igcse_grade(None, Some(60.0), 30, 70).is_valid);
    assert!(!calculate_igcse_grade(Some(80.0), None, 30, 70).is_valid);
    assert!(!calculate_igcse_grade(Some(101.0), Some(60.0), 30, 70).is_valid);
    assert!(!calculate_igcse_grade(Some(80.0), Some(-1.0), 30, 70).is_valid);
}

#[test]
fn igcse_input_defaults_to_30_70_split() {
    let r = calculate_grade(&GradeInput::Igcse(IgcseInput {
        coursework_score: Some(80.0),
        exam_score: Some(60.0),
        coursework_weight: None,
        exam_weight: None,
    }));
    assert_eq!(r.percentage, Some(66.0));
}

#[test]
fn dispatch_matches_direct_calls() {
    assert_eq!(
        calculate_grade(&GradeInput::Cbc(CbcInput {
            marks: Some(61.0),
            max_score: None
        })),
        calculate_cbc_grade(Some(61.0))
    );
    assert_eq!(
        calculate_grade(&GradeInput::Standard(StandardInput {
            score: Some(7.0),
            max_score: 10.0
        })),
        calculate_standard_grade(Some(7.0), 10.0)
    );
}

#[test]
fn unsupported_curriculum_is_an_invalid_result() {
    let r = calculate_grade_params(&GradeParams {
        curriculum_type: "montessori".to_string(),
        score: Some(50.0),
        ..GradeParams::default()
    });
    assert!(!r.is_valid);
    assert_eq!(
        r.error.as_deref(),
        Some("Unsupported curriculum type: montessori")
    );
}

#[test]
fn missing_curriculum_type_is_an_invalid_result() {
    let params: GradeParams =
        serde_json::from_value(serde_json::json!({ "score": 50 })).expect("parse params");
    let r = calculate_grade_params(&params);
    assert!(!r.is_valid);
    assert_eq!(r.error.as_deref(), Some("Unsupported curriculum type: "));
}

#[test]
fn cbc_entry_accepts_score_and_max_score_keys() {
    let input: GradeInput = serde_json::from_value(serde_json::json!({
        "curriculumType": "cbc",
        "score": 85.0,
        "maxScore": 100.0
    }))
    .expect("parse cbc entry");
    assert_eq!(input.curriculum(), CurriculumType::Cbc);

    let r = calculate_grade(&input);
    assert!(r.is_valid, "{:?}", r.error);
    assert_eq!(r.percentage, Some(85.0));
    assert_eq!(r.cbc_performance_level, Some(PerformanceLevel::EE));
    assert_eq!(r.letter_grade, None);
}

#[test]
fn cbc_entry_on_another_scale_is_refused() {
    let input: GradeInput = serde_json::from_value(serde_json::json!({
        "curriculumType": "cbc",
        "score": 40.0,
        "maxScore": 50.0
    }))
    .expect("parse cbc entry");
    let r = calculate_grade(&input);
    assert!(!r.is_valid);
    assert_eq!(r.cbc_performance_level, Some(PerformanceLevel::BE));
}

#[test]
fn entry_with_unknown_key_is_rejected() {
    for raw in [
        serde_json::json!({ "curriculumType": "standard", "marks": 40.0 }),
        serde_json::json!({ "curriculumType": "cbc", "courseworkScore": 40.0 }),
        serde_json::json!({ "curriculumType": "igcse", "score": 40.0 }),
    ] {
        assert!(
            serde_json::from_value::<GradeInput>(raw.clone()).is_err(),
            "{} should not parse",
            raw
        );
    }
}

#[test]
fn score_update_keeps_scale_and_weights() {
    let standard = GradeInput::Standard(StandardInput {
        score: Some(40.0),
        max_score: 50.0,
    });
    let updated = standard.with_scores(&ScoreUpdate {
        score: Some(46.0),
        ..ScoreUpdate::default()
    });
    assert_eq!(calculate_grade(&updated).percentage, Some(92.0));

    let igcse = GradeInput::Igcse(IgcseInput {
        coursework_score: Some(50.0),
        exam_score: Some(50.0),
        coursework_weight: Some(40),
        exam_weight: Some(60),
    });
    let updated = igcse.with_scores(&ScoreUpdate {
        exam_score: Some(100.0),
        ..ScoreUpdate::default()
    });
    // 0.4 * 50 + 0.6 * 100
    assert_eq!(calculate_grade(&updated).percentage, Some(80.0));
}
