//! Text report of a finished run: model comparison table, feature
//! importances of the best model and the latest predictions.

use crate::comparison::rank;
use crate::metrics::EvaluationRecord;
use crate::model_bank::FeatureImportances;
use crate::models::ModelKind;
use chrono::{DateTime, Utc};
use std::fmt::Write;

/// Everything the report reads; it never feeds anything back.
pub struct ReportInput<'a> {
    pub symbol: &'a str,
    pub records: &'a [EvaluationRecord],
    pub best: Option<ModelKind>,
    pub feature_columns: &'a [String],
    pub importances: &'a FeatureImportances,
    pub test_timestamps: &'a [DateTime<Utc>],
    pub actual: &'a [f64],
    pub predicted: &'a [f64],
}

/// Feature names paired with their scores, highest first.
pub fn top_features(columns: &[String], scores: &[f64], n: usize) -> Vec<(String, f64)> {
    let mut pairs: Vec<(String, f64)> = columns.iter().cloned().zip(scores.iter().copied()).collect();
    pairs.sort_by(|a, b| b.1.total_cmp(&a.1));
    pairs.truncate(n);
    pairs
}

pub fn render_report(input: &ReportInput<'_>, top_n: usize, prediction_rows: usize) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "\n  Model comparison for {}:", input.symbol);
    let _ = writeln!(out, "  ┌──────────────────────┬──────────┬──────────────┬──────────────┬──────────────────┐");
    let _ = writeln!(out, "  │ Model                │ R²       │ RMSE         │ MAE          │ MSE              │");
    let _ = writeln!(out, "  ├──────────────────────┼──────────┼──────────────┼──────────────┼──────────────────┤");
    for record in rank(input.records) {
        let m = &record.metrics;
        let marker = if Some(record.model) == input.best { "*" } else { " " };
        let _ = writeln!(
            out,
            "  │{}{:20} │ {:>8.4} │ {:>12.4} │ {:>12.4} │ {:>16.4} │",
            marker,
            record.name(),
            m.r2,
            m.rmse,
            m.mae,
            m.mse
        );
    }
    let _ = writeln!(out, "  └──────────────────────┴──────────┴──────────────┴──────────────┴──────────────────┘");

    let best_name = input.best.map(|k| k.name()).unwrap_or("none");
    match input.importances {
        FeatureImportances::Available(scores) => {
            let _ = writeln!(out, "\n  Top {} features ({}):", top_n, best_name);
            for (name, score) in top_features(input.feature_columns, scores, top_n) {
                let bar = "#".repeat((score * 50.0).round() as usize);
                let _ = writeln!(out, "  {:>20} {:>7.4} {}", name, score, bar);
            }
        }
        FeatureImportances::Unavailable => {
            let _ = writeln!(
                out,
                "\n  Feature importances not available for {}",
                best_name
            );
        }
    }

    let rows = input
        .actual
        .len()
        .min(input.predicted.len())
        .min(input.test_timestamps.len());
    let start = rows.saturating_sub(prediction_rows);
    if rows > 0 {
        let _ = writeln!(out, "\n  Last {} test predictions ({}):", rows - start, best_name);
        let _ = writeln!(out, "  {:>12} {:>14} {:>14} {:>12}", "date", "actual", "predicted", "error");
        for i in start..rows {
            let _ = writeln!(
                out,
                "  {:>12} {:>14.4} {:>14.4} {:>+12.4}",
                input.test_timestamps[i].format("%Y-%m-%d"),
                input.actual[i],
                input.predicted[i],
                input.predicted[i] - input.actual[i]
            );
        }
    }
    out
}
