//! End-to-end run: fetch, features, split, model bank, comparison, report
//! and artifacts.

use crate::comparison::format_summary;
use crate::config::PipelineConfig;
use crate::data_source::{
    CoinGeckoSource, DataSource, Period, SymbolTranslator, YahooFinanceSource, fetch_with_fallback,
};
use crate::error::{DataSourceError, ModelError, PersistenceError, PipelineError};
use crate::features::indicators::IndicatorWarning;
use crate::features::prepare_features;
use crate::market_data::TimeSeriesTable;
use crate::metrics::EvaluationRecord;
use crate::model_bank::{FeatureImportances, ModelBank};
use crate::models::ModelKind;
use crate::persistence::{self, ArtifactPaths, SavedModel};
use crate::preprocess::{SplitData, split_and_scale};
use crate::report::{ReportInput, render_report};
use chrono::Utc;
use log::{info, warn};
use std::path::PathBuf;

/// Per-run switches, usually taken from the command line.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub symbol: String,
    pub period: Period,
    pub create_report: bool,
    pub save_output: bool,
    pub output_dir: PathBuf,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            symbol: "BTC-USD".to_string(),
            period: Period::default(),
            create_report: true,
            save_output: true,
            output_dir: PathBuf::from("output"),
        }
    }
}

/// What a successful run produced.
#[derive(Debug)]
pub struct PipelineOutcome {
    pub symbol: String,
    pub period: Period,
    pub best_model: Option<ModelKind>,
    pub best_score: f64,
    pub records: Vec<EvaluationRecord>,
    pub model_failures: Vec<(ModelKind, ModelError)>,
    pub indicator_warnings: Vec<IndicatorWarning>,
    pub persistence_warnings: Vec<PersistenceError>,
    pub summary: String,
    pub report: Option<String>,
    pub saved: Option<ArtifactPaths>,
}

pub struct PredictionPipeline {
    config: PipelineConfig,
    primary: Box<dyn DataSource>,
    fallback: Box<dyn DataSource>,
    translator: SymbolTranslator,
}

impl PredictionPipeline {
    /// Yahoo Finance as primary source, CoinGecko as fallback.
    pub fn new(config: PipelineConfig) -> Result<Self, DataSourceError> {
        let data = &config.data_config;
        let primary = YahooFinanceSource::new(&data.yahoo_base_url, data.request_timeout_secs)?;
        let fallback = CoinGeckoSource::new(
            &data.coingecko_base_url,
            &data.quote_currency,
            data.request_timeout_secs,
        )?;
        Ok(Self::with_sources(config, Box::new(primary), Box::new(fallback)))
    }

    pub fn with_sources(
        config: PipelineConfig,
        primary: Box<dyn DataSource>,
        fallback: Box<dyn DataSource>,
    ) -> Self {
        let translator = SymbolTranslator::with_overrides(&config.data_config.coin_id_overrides);
        Self {
            config,
            primary,
            fallback,
            translator,
        }
    }

    pub fn collect_data(&self, symbol: &str, period: Period) -> Result<TimeSeriesTable, PipelineError> {
        let raw = fetch_with_fallback(
            self.primary.as_ref(),
            self.fallback.as_ref(),
            &self.translator,
            symbol,
            period,
        )?;
        info!("Successfully collected {} data points", raw.len());
        Ok(raw)
    }

    pub fn run(&self, options: &RunOptions) -> Result<PipelineOutcome, PipelineError> {
        info!("Starting complete cryptocurrency prediction pipeline...");
        let raw = self.collect_data(&options.symbol, options.period)?;
        self.run_on_table(&raw, options)
    }

    /// Everything after data collection, on an already fetched table.
    pub fn run_on_table(
        &self,
        raw: &TimeSeriesTable,
        options: &RunOptions,
    ) -> Result<PipelineOutcome, PipelineError> {
        let features = &self.config.feature_config;

        info!("Preprocessing data...");
        let prepared = prepare_features(raw, features)?;
        info!(
            "Preprocessing complete. Features: {:?}",
            prepared.table.column_names()
        );

        info!("Training models...");
        let split = split_and_scale(
            &prepared.table,
            &features.target_column,
            features.horizon,
            &self.config.split_config,
        )?;
        let mut bank = ModelBank::new(self.config.model_config.clone());
        let training = bank.train_and_evaluate_all(&split)?;

        let summary = format_summary(&training.records);
        println!("{}", summary);

        let best_model = training.best.model();
        let report = if options.create_report {
            let text = self.render(&bank, &split, &training.records, &options.symbol);
            println!("{}", text);
            Some(text)
        } else {
            None
        };

        let mut persistence_warnings = Vec::new();
        let saved = if options.save_output {
            let paths = ArtifactPaths::new(&options.output_dir, &options.symbol, Utc::now());
            persistence_warnings =
                save_artifacts(bank, &split, &prepared.table, &training.records, &options.symbol, &paths);
            for warning in &persistence_warnings {
                warn!("Failed to save output: {}", warning);
            }
            Some(paths)
        } else {
            None
        };

        info!("Pipeline completed successfully!");
        Ok(PipelineOutcome {
            symbol: options.symbol.clone(),
            period: options.period,
            best_model,
            best_score: training.best.score(),
            records: training.records,
            model_failures: training.failures,
            indicator_warnings: prepared.warnings,
            persistence_warnings,
            summary,
            report,
            saved,
        })
    }

    fn render(
        &self,
        bank: &ModelBank,
        split: &SplitData,
        records: &[EvaluationRecord],
        symbol: &str,
    ) -> String {
        let (best, predicted) = match bank.predict_best(&split.x_test) {
            Ok((kind, predicted)) => (Some(kind), predicted.to_vec()),
            Err(e) => {
                warn!("No best-model predictions for the report: {}", e);
                (None, Vec::new())
            }
        };
        let importances = best
            .and_then(|kind| bank.feature_importance(kind).ok())
            .unwrap_or(FeatureImportances::Unavailable);
        let actual = split.y_test.to_vec();

        let input = ReportInput {
            symbol,
            records,
            best,
            feature_columns: &split.feature_columns,
            importances: &importances,
            test_timestamps: &split.test_timestamps,
            actual: &actual,
            predicted: &predicted,
        };
        let output = &self.config.output_config;
        render_report(&input, output.report_top_features, output.report_prediction_rows)
    }
}

/// Write every artifact; each failure is returned instead of aborting.
///
/// Consumes the bank so the best estimator moves into the saved model.
fn save_artifacts(
    mut bank: ModelBank,
    split: &SplitData,
    features: &TimeSeriesTable,
    records: &[EvaluationRecord],
    symbol: &str,
    paths: &ArtifactPaths,
) -> Vec<PersistenceError> {
    let mut failures = Vec::new();

    if let Some(kind) = bank.best() {
        let predicted = bank
            .predict(kind, &split.x_test)
            .map_err(PersistenceError::from)
            .and_then(|predicted| {
                persistence::save_predictions(
                    &split.test_timestamps,
                    &split.y_test.to_vec(),
                    &predicted.to_vec(),
                    &paths.predictions,
                )
            });
        failures.extend(predicted.err());

        let saved = bank
            .take(kind)
            .ok_or_else(|| PersistenceError::from(ModelError::NotTrained(kind.to_string())))
            .map(|estimator| SavedModel {
                model: kind,
                symbol: symbol.to_string(),
                saved_at: Utc::now(),
                feature_columns: split.feature_columns.clone(),
                scaler: split.scaler.clone(),
                estimator,
            })
            .and_then(|saved| persistence::save_model(&saved, &paths.model));
        failures.extend(saved.err());
    }

    failures.extend(persistence::save_feature_table(features, &paths.features).err());
    failures.extend(persistence::save_results(records, &paths.results).err());
    failures
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelBankConfig;
    use crate::data_source::{KeyFormat, MockDataSource};
    use crate::market_data::{CLOSE, VOLUME};
    use chrono::{DateTime, Duration, TimeZone};

    fn trend(n: usize) -> TimeSeriesTable {
        let start = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        let ts: Vec<DateTime<Utc>> = (0..n).map(|i| start + Duration::days(i as i64)).collect();
        let close: Vec<f64> = (0..n).map(|i| 100.0 + i as f64).collect();
        let volume: Vec<f64> = (0..n).map(|i| 1_000.0 + (i % 5) as f64 * 50.0).collect();
        TimeSeriesTable::from_columns(ts, vec![(CLOSE, close), (VOLUME, volume)])
    }

    fn linear_only() -> PipelineConfig {
        PipelineConfig {
            model_config: ModelBankConfig {
                enabled: vec![ModelKind::LinearRegression, ModelKind::RidgeRegression],
                ..ModelBankConfig::default()
            },
            ..PipelineConfig::default()
        }
    }

    fn source(format: KeyFormat, rows: usize) -> Box<dyn DataSource> {
        let mut mock = MockDataSource::new();
        mock.expect_name().return_const("mock");
        mock.expect_key_format().return_const(format);
        mock.expect_fetch().returning(move |_, _| Ok(trend(rows)));
        Box::new(mock)
    }

    #[test]
    fn test_run_without_outputs() {
        let pipeline = PredictionPipeline::with_sources(
            linear_only(),
            source(KeyFormat::Ticker, 200),
            source(KeyFormat::CatalogId, 200),
        );
        let options = RunOptions {
            create_report: false,
            save_output: false,
            ..RunOptions::default()
        };
        let outcome = pipeline.run(&options).unwrap();

        assert_eq!(outcome.records.len(), 2);
        assert!(outcome.best_model.is_some());
        assert!(outcome.report.is_none());
        assert!(outcome.saved.is_none());
        assert!(outcome.summary.contains("BEST MODEL"));
    }

    #[test]
    fn test_run_writes_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = PredictionPipeline::with_sources(
            linear_only(),
            source(KeyFormat::Ticker, 200),
            source(KeyFormat::CatalogId, 200),
        );
        let options = RunOptions {
            output_dir: dir.path().to_path_buf(),
            ..RunOptions::default()
        };
        let outcome = pipeline.run(&options).unwrap();

        assert!(outcome.persistence_warnings.is_empty());
        assert!(outcome.report.unwrap().contains("Model comparison for BTC-USD"));
        let paths = outcome.saved.unwrap();
        for path in [&paths.model, &paths.features, &paths.results, &paths.predictions] {
            assert!(path.exists(), "{} missing", path.display());
        }
        let restored = persistence::load_model(&paths.model).unwrap();
        assert_eq!(Some(restored.model), outcome.best_model);
    }

    #[test]
    fn test_close_only_table_reports_indicator_warning() {
        let full = trend(200);
        let close_only = TimeSeriesTable::from_columns(
            full.timestamps().to_vec(),
            vec![(CLOSE, full.column(CLOSE).unwrap().to_vec())],
        );
        let pipeline = PredictionPipeline::with_sources(
            linear_only(),
            source(KeyFormat::Ticker, 200),
            source(KeyFormat::CatalogId, 200),
        );
        let options = RunOptions {
            create_report: false,
            save_output: false,
            ..RunOptions::default()
        };

        let outcome = pipeline.run_on_table(&close_only, &options).unwrap();
        assert_eq!(
            outcome.indicator_warnings,
            vec![IndicatorWarning {
                indicators: vec!["Volume_SMA", "OBV"],
                missing: vec![VOLUME.to_string()],
            }]
        );
        assert_eq!(outcome.records.len(), 2);
    }

    #[test]
    fn test_too_short_series_is_insufficient_data() {
        let pipeline = PredictionPipeline::with_sources(
            linear_only(),
            source(KeyFormat::Ticker, 5),
            source(KeyFormat::CatalogId, 5),
        );
        let options = RunOptions {
            save_output: false,
            ..RunOptions::default()
        };
        assert!(matches!(
            pipeline.run(&options),
            Err(PipelineError::InsufficientData(_))
        ));
    }
}
