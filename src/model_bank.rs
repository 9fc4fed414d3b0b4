//! Trains the model catalogue under identical conditions and keeps the
//! fitted estimators for prediction, importance queries and persistence.

use crate::config::ModelBankConfig;
use crate::error::{ModelError, PipelineError};
use crate::metrics::{EvaluationRecord, evaluate};
use crate::models::{Estimator, ModelKind, Regressor};
use crate::preprocess::SplitData;
use log::{error, info};
use ndarray::{Array1, Array2};

/// Importance scores, when the estimator can provide them.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureImportances {
    Available(Vec<f64>),
    Unavailable,
}

/// Running best-R² selection over records in training order.
///
/// A record replaces the current best only when its R² is strictly greater,
/// so ties keep the earlier model and NaN never wins.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BestModel {
    current: Option<(ModelKind, f64)>,
}

impl BestModel {
    pub fn observe(&mut self, record: &EvaluationRecord) {
        let score = record.r2();
        let replace = match self.current {
            None => score > f64::NEG_INFINITY,
            Some((_, best)) => score > best,
        };
        if replace {
            self.current = Some((record.model, score));
        }
    }

    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a EvaluationRecord>) -> Self {
        records.into_iter().fold(Self::default(), |mut best, record| {
            best.observe(record);
            best
        })
    }

    pub fn model(&self) -> Option<ModelKind> {
        self.current.map(|(kind, _)| kind)
    }

    /// Best R², or negative infinity before any model was observed
    pub fn score(&self) -> f64 {
        self.current.map(|(_, r2)| r2).unwrap_or(f64::NEG_INFINITY)
    }
}

#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub records: Vec<EvaluationRecord>,
    pub failures: Vec<(ModelKind, ModelError)>,
    pub best: BestModel,
}

pub struct ModelBank {
    config: ModelBankConfig,
    models: Vec<Estimator>,
    best: Option<ModelKind>,
}

impl ModelBank {
    pub fn new(config: ModelBankConfig) -> Self {
        Self {
            config,
            models: Vec::new(),
            best: None,
        }
    }

    pub fn get(&self, kind: ModelKind) -> Option<&Estimator> {
        self.models.iter().find(|m| m.kind() == kind)
    }

    pub fn best(&self) -> Option<ModelKind> {
        self.best
    }

    /// Add or replace a fitted estimator, e.g. one restored from disk.
    pub fn insert(&mut self, estimator: Estimator) {
        let kind = estimator.kind();
        match self.models.iter_mut().find(|m| m.kind() == kind) {
            Some(slot) => *slot = estimator,
            None => self.models.push(estimator),
        }
    }

    fn remove(&mut self, kind: ModelKind) {
        self.models.retain(|m| m.kind() != kind);
    }

    /// Move a fitted estimator out of the bank, e.g. to persist it.
    pub fn take(&mut self, kind: ModelKind) -> Option<Estimator> {
        let index = self.models.iter().position(|m| m.kind() == kind)?;
        Some(self.models.remove(index))
    }

    /// Fit one catalogue entry. A failed fit is logged and leaves no model.
    pub fn train(
        &mut self,
        kind: ModelKind,
        x_train: &Array2<f64>,
        y_train: &Array1<f64>,
    ) -> Result<&Estimator, ModelError> {
        info!("Training {}...", kind);
        let mut estimator = Estimator::build(kind, &self.config);
        if let Err(e) = estimator.fit(x_train, y_train) {
            error!("Error training {}: {}", kind, e);
            self.remove(kind);
            return Err(e);
        }
        self.insert(estimator);
        self.get(kind).ok_or(ModelError::NotTrained(kind.to_string()))
    }

    pub fn evaluate(
        &self,
        kind: ModelKind,
        x_test: &Array2<f64>,
        y_test: &Array1<f64>,
    ) -> Result<EvaluationRecord, ModelError> {
        let predictions = self.predict(kind, x_test)?;
        let metrics = evaluate(y_test, &predictions)?;
        Ok(EvaluationRecord::new(kind, metrics))
    }

    /// Train and score every enabled model in catalogue order.
    ///
    /// Individual failures are collected; only a run where nothing trained
    /// is an error.
    pub fn train_and_evaluate_all(&mut self, split: &SplitData) -> Result<TrainingReport, PipelineError> {
        let enabled: Vec<ModelKind> = ModelKind::ALL
            .iter()
            .copied()
            .filter(|kind| self.config.enabled.contains(kind))
            .collect();

        let mut records = Vec::new();
        let mut failures = Vec::new();
        let mut best = BestModel::default();

        for &kind in &enabled {
            if let Err(e) = self.train(kind, &split.x_train, &split.y_train) {
                failures.push((kind, e));
                continue;
            }
            match self.evaluate(kind, &split.x_test, &split.y_test) {
                Ok(record) => {
                    info!(
                        "{} - R²: {:.4}, RMSE: {:.4}",
                        kind, record.metrics.r2, record.metrics.rmse
                    );
                    best.observe(&record);
                    records.push(record);
                }
                Err(e) => {
                    error!("Error evaluating {}: {}", kind, e);
                    self.remove(kind);
                    failures.push((kind, e));
                }
            }
        }

        if records.is_empty() {
            return Err(PipelineError::NoModelTrained(enabled.len()));
        }
        self.best = best.model();
        if let Some(kind) = self.best {
            info!("Best model: {} (R² = {:.4})", kind, best.score());
        }

        Ok(TrainingReport {
            records,
            failures,
            best,
        })
    }

    pub fn feature_importance(&self, kind: ModelKind) -> Result<FeatureImportances, ModelError> {
        let estimator = self
            .get(kind)
            .ok_or_else(|| ModelError::NotTrained(kind.to_string()))?;
        Ok(match estimator.as_feature_importance() {
            Some(model) => FeatureImportances::Available(model.feature_importances().to_vec()),
            None => FeatureImportances::Unavailable,
        })
    }

    pub fn predict(&self, kind: ModelKind, x: &Array2<f64>) -> Result<Array1<f64>, ModelError> {
        self.get(kind)
            .ok_or_else(|| ModelError::NotTrained(kind.to_string()))?
            .predict(x)
    }

    /// Predict with the best model of the last training run.
    pub fn predict_best(&self, x: &Array2<f64>) -> Result<(ModelKind, Array1<f64>), ModelError> {
        let kind = self
            .best
            .ok_or_else(|| ModelError::NotTrained("best model".to_string()))?;
        Ok((kind, self.predict(kind, x)?))
    }
}
