//! Ranking and summary of evaluation records.

use crate::metrics::EvaluationRecord;
use std::fmt::Write;

const RULE_WIDTH: usize = 60;

fn rank_key(record: &EvaluationRecord) -> f64 {
    if record.r2().is_nan() {
        f64::NEG_INFINITY
    } else {
        record.r2()
    }
}

/// Records sorted by R² descending. The sort is stable, so equal scores keep
/// training order; undefined scores sort last.
pub fn rank(records: &[EvaluationRecord]) -> Vec<EvaluationRecord> {
    let mut ranked = records.to_vec();
    ranked.sort_by(|a, b| rank_key(b).total_cmp(&rank_key(a)));
    ranked
}

/// Per-model metric blocks followed by the best model line.
pub fn format_summary(records: &[EvaluationRecord]) -> String {
    let ranked = rank(records);
    let rule = "=".repeat(RULE_WIDTH);
    let mut out = String::new();

    let _ = writeln!(out, "{}", rule);
    let _ = writeln!(out, "MODEL PERFORMANCE COMPARISON");
    let _ = writeln!(out, "{}", rule);

    for record in &ranked {
        let m = &record.metrics;
        let _ = writeln!(out);
        let _ = writeln!(out, "{}:", record.name());
        let _ = writeln!(out, "  R² Score: {:.4}", m.r2);
        let _ = writeln!(out, "  RMSE:     {:.4}", m.rmse);
        let _ = writeln!(out, "  MAE:      {:.4}", m.mae);
        let _ = writeln!(out, "  MSE:      {:.4}", m.mse);
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "{}", rule);
    match ranked.first() {
        Some(best) => {
            let _ = writeln!(out, "BEST MODEL: {} (R² = {:.4})", best.name(), best.r2());
        }
        None => {
            let _ = writeln!(out, "BEST MODEL: none");
        }
    }
    let _ = writeln!(out, "{}", rule);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Metrics;
    use crate::models::ModelKind;

    fn record(kind: ModelKind, r2: f64) -> EvaluationRecord {
        EvaluationRecord::new(
            kind,
            Metrics {
                mse: 4.0,
                rmse: 2.0,
                mae: 1.5,
                r2,
            },
        )
    }

    #[test]
    fn test_rank_descending_and_stable() {
        let records = vec![
            record(ModelKind::LinearRegression, 0.7),
            record(ModelKind::Svr, f64::NAN),
            record(ModelKind::RidgeRegression, 0.9),
            record(ModelKind::LassoRegression, 0.9),
        ];
        let order: Vec<ModelKind> = rank(&records).iter().map(|r| r.model).collect();
        assert_eq!(
            order,
            vec![
                ModelKind::RidgeRegression,
                ModelKind::LassoRegression,
                ModelKind::LinearRegression,
                ModelKind::Svr
            ]
        );
    }

    #[test]
    fn test_summary_names_best_model() {
        let summary = format_summary(&[
            record(ModelKind::RandomForest, 0.85),
            record(ModelKind::GradientBoosting, 0.91234),
        ]);
        assert!(summary.contains("BEST MODEL: Gradient_Boosting (R² = 0.9123)"));
        assert!(summary.contains("Random_Forest:\n  R² Score: 0.8500"));
        assert!(summary.contains("  RMSE:     2.0000"));
    }

    #[test]
    fn test_summary_empty() {
        assert!(format_summary(&[]).contains("BEST MODEL: none"));
    }
}
