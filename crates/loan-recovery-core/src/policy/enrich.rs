use serde::Serialize;
use tracing::{debug, instrument};

use super::{Assessment, RiskLabel, Strategy};
use crate::{
    dataset::Dataset,
    scorer::{ScoreError, Scorer},
};

pub const RISK_SCORE_COLUMN: &str = "Risk_Score";
pub const HIGH_RISK_FLAG_COLUMN: &str = "Predicted_High_Risk";
pub const STRATEGY_COLUMN: &str = "Strategy";

/// Derived columns, in the order they lead every output table.
pub const DERIVED_COLUMNS: [&str; 3] = [RISK_SCORE_COLUMN, HIGH_RISK_FLAG_COLUMN, STRATEGY_COLUMN];

/// Score every row of `dataset` and attach the policy outcome.
///
/// Fails fast for the whole batch: a schema column absent from the header is
/// reported with `row: None` before anything is scored, otherwise the first
/// record that cannot be scored aborts with its row index.
#[instrument(name = "enrich_dataset", skip_all, fields(rows = dataset.len()))]
pub fn enrich<S>(dataset: &Dataset, scorer: &S) -> Result<EnrichedDataset, ScoreError>
where
    S: Scorer + ?Sized,
{
    let schema = scorer.schema();
    let missing = schema.missing_by(|name| dataset.has_column(name));
    if !missing.is_empty() {
        return Err(ScoreError::SchemaMismatch { row: None, missing });
    }

    let vectors: Vec<_> = dataset.records().collect();
    let assessments: Vec<_> = scorer
        .score(&vectors)?
        .into_iter()
        .map(Assessment::from_score)
        .collect();
    debug!(assessed = assessments.len(), "dataset enriched");

    Ok(EnrichedDataset {
        source: dataset.clone(),
        features: schema.names().to_vec(),
        assessments,
    })
}

/// Uploaded dataset plus one assessment per row.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedDataset {
    source: Dataset,
    features: Vec<String>,
    assessments: Vec<Assessment>,
}

impl EnrichedDataset {
    pub fn source(&self) -> &Dataset {
        &self.source
    }

    pub fn assessments(&self) -> &[Assessment] {
        &self.assessments
    }

    pub fn len(&self) -> usize {
        self.assessments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assessments.is_empty()
    }

    /// Derived columns followed by every original column in source order.
    /// Source columns that reuse a derived name are replaced.
    pub fn export_view(&self) -> Dataset {
        self.project(|column| !DERIVED_COLUMNS.contains(&column))
    }

    /// Derived columns followed by the original non-feature columns.
    pub fn display_view(&self) -> Dataset {
        self.project(|column| {
            !DERIVED_COLUMNS.contains(&column) && !self.features.iter().any(|f| f == column)
        })
    }

    fn project<F>(&self, keep: F) -> Dataset
    where
        F: Fn(&str) -> bool,
    {
        let kept: Vec<usize> = self
            .source
            .columns()
            .iter()
            .enumerate()
            .filter(|(_, column)| keep(column.as_str()))
            .map(|(idx, _)| idx)
            .collect();

        let columns = DERIVED_COLUMNS
            .iter()
            .map(|column| column.to_string())
            .chain(kept.iter().map(|&idx| self.source.columns()[idx].clone()))
            .collect();

        let rows = self
            .source
            .rows()
            .iter()
            .zip(&self.assessments)
            .map(|(cells, assessment)| {
                derived_cells(assessment)
                    .into_iter()
                    .chain(kept.iter().map(|&idx| cells[idx].clone()))
                    .collect()
            })
            .collect();

        Dataset::from_validated(columns, rows)
    }

    pub fn summary(&self) -> BatchSummary {
        BatchSummary::from_assessments(&self.assessments)
    }
}

/// Cells for the derived columns; scores keep full precision.
pub(crate) fn derived_cells(assessment: &Assessment) -> [String; 3] {
    [
        format!("{:?}", assessment.score.value()),
        assessment.label.as_flag().to_string(),
        assessment.strategy.to_string(),
    ]
}

/// Aggregate counts over a scored batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub high_risk: usize,
    pub low_risk: usize,
    pub legal_action: usize,
    pub settlement_plan: usize,
    pub reminder: usize,
    pub mean_score: Option<f64>,
}

impl BatchSummary {
    pub fn from_assessments(assessments: &[Assessment]) -> Self {
        let mut summary = Self {
            total: assessments.len(),
            ..Self::default()
        };
        let mut score_sum = 0.0;
        for assessment in assessments {
            score_sum += assessment.score.value();
            match assessment.label {
                RiskLabel::HighRisk => summary.high_risk += 1,
                RiskLabel::LowRisk => summary.low_risk += 1,
            }
            match assessment.strategy {
                Strategy::LegalAction => summary.legal_action += 1,
                Strategy::SettlementPlan => summary.settlement_plan += 1,
                Strategy::Reminder => summary.reminder += 1,
            }
        }
        if !assessments.is_empty() {
            summary.mean_score = Some(score_sum / assessments.len() as f64);
        }
        summary
    }

    pub fn count_for(&self, strategy: Strategy) -> usize {
        match strategy {
            Strategy::LegalAction => self.legal_action,
            Strategy::SettlementPlan => self.settlement_plan,
            Strategy::Reminder => self.reminder,
        }
    }
}
