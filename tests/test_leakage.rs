//! Integration test: leakage audit and ablation on a credit-card style dataset

use cvaudit::data::Dataset;
use cvaudit::error::CvAuditError;
use cvaudit::leakage::LeakageAuditor;
use cvaudit::metrics::{Metric, Scorer, ScoringConvention};
use cvaudit::pipeline::{ModelSpec, PipelineSpec};
use cvaudit::training::{CrossValidator, EvaluationConfig};
use polars::prelude::*;

/// 50 rejected applications with no spending, 100 accepted ones of which 2 spent nothing
fn applications() -> Dataset {
    let n_false = 50;
    let n_true = 100;

    let card: Vec<&str> = (0..n_false)
        .map(|_| "no")
        .chain((0..n_true).map(|_| "yes"))
        .collect();
    let expenditure: Vec<f64> = (0..n_false)
        .map(|_| 0.0)
        .chain((0..n_true).map(|i| if i < 2 { 0.0 } else { 20.0 + (i * 13 % 97) as f64 }))
        .collect();
    let age: Vec<f64> = (0..n_false + n_true).map(|i| 20.0 + (i * 37 % 23) as f64).collect();
    let share: Vec<Option<f64>> = (0..n_false + n_true)
        .map(|i| if i % 10 == 0 { None } else { Some((i % 7) as f64 / 10.0) })
        .collect();

    let frame = df!(
        "card" => card,
        "expenditure" => expenditure,
        "age" => age,
        "share" => share
    )
    .unwrap();
    Dataset::from_frame(frame)
}

#[test]
fn test_audit_reports_sentinel_fractions() {
    let ds = applications();
    let report = LeakageAuditor::new().audit(&ds, "card", "expenditure").unwrap();

    assert_eq!(format!("{:.2}", report.fraction_false), "1.00");
    assert_eq!(format!("{:.2}", report.fraction_true), "0.02");
    assert_eq!(report.rows_false, 50);
    assert_eq!(report.rows_true, 100);
    assert!(report.to_string().contains("expenditure == 0: 1.00"));
}

#[test]
fn test_audit_columns_keeps_order() {
    let ds = applications();
    let features = vec!["age".to_string(), "expenditure".to_string(), "share".to_string()];
    let reports = LeakageAuditor::new().audit_columns(&ds, "card", &features).unwrap();

    let names: Vec<&str> = reports.iter().map(|r| r.feature.as_str()).collect();
    assert_eq!(names, vec!["age", "expenditure", "share"]);
    assert!(reports[1].gap() > reports[0].gap());
}

#[test]
fn test_single_class_target_reports_nan() {
    let frame = df!(
        "card" => &[true, true, true],
        "expenditure" => &[0.0, 5.0, 9.0]
    )
    .unwrap();
    let ds = Dataset::from_frame(frame);
    let report = LeakageAuditor::new().audit(&ds, "card", "expenditure").unwrap();

    assert!(report.fraction_false.is_nan());
    assert!((report.fraction_true - 1.0 / 3.0).abs() < 1e-12);
}

#[test]
fn test_non_binary_target_rejected() {
    let ds = applications();
    let err = LeakageAuditor::new().audit(&ds, "age", "expenditure").unwrap_err();
    assert!(matches!(err, CvAuditError::InvalidConfiguration(_)));
}

#[test]
fn test_ablation_compares_with_and_without_suspects() {
    let ds = applications();
    let features = vec!["expenditure".to_string(), "age".to_string(), "share".to_string()];
    let suspects = vec!["expenditure".to_string()];

    let spec = PipelineSpec::imputed_forest_regressor(20, Some(0));
    let spec = PipelineSpec {
        model: ModelSpec::RandomForestClassifier {
            n_estimators: 20,
            max_depth: None,
            random_state: Some(0),
        },
        ..spec
    };
    let scorer = Scorer::new(Metric::Accuracy, ScoringConvention::HigherIsBetter);
    let evaluator = CrossValidator::new(EvaluationConfig::new().with_fold_count(5).with_shuffle(3));

    let result = LeakageAuditor::new().ablation(
        &evaluator,
        &ds,
        "card",
        &features,
        &suspects,
        || spec.build(),
        &scorer,
    );
    assert!(result.is_ok(), "ablation should succeed: {:?}", result.err());

    let report = result.unwrap();
    assert_eq!(report.dropped, suspects);
    assert_eq!(report.baseline.n_folds, 5);
    assert_eq!(report.without_suspects.n_folds, 5);
    assert!(report.baseline.mean_score > 0.9);
    assert!(report.score_change() < 0.0);
}

#[test]
fn test_ablation_suspect_must_be_a_feature() {
    let ds = applications();
    let features = vec!["age".to_string()];
    let spec = PipelineSpec::imputed_forest_regressor(5, Some(0));
    let scorer = Scorer::new(Metric::MeanAbsoluteError, ScoringConvention::HigherIsBetter);

    let err = LeakageAuditor::new()
        .ablation(
            &CrossValidator::default(),
            &ds,
            "card",
            &features,
            &["expenditure".to_string()],
            || spec.build(),
            &scorer,
        )
        .unwrap_err();
    assert!(matches!(err, CvAuditError::InvalidConfiguration(_)));
}
