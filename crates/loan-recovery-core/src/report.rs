use std::fmt::Write;

use serde::Serialize;

use crate::{
    dataset::Dataset,
    policy::{
        enrich::{derived_cells, BatchSummary, EnrichedDataset, DERIVED_COLUMNS},
        Assessment, RiskLabel, Strategy,
    },
    scorer::FeatureImportance,
};

const IMPORTANCE_BAR_WIDTH: f64 = 24.0;

/// Format styles supported by the renderers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Human,
    Json,
    Csv,
}

/// Render the outcome for a single manually entered record.
pub fn render_assessment(assessment: &Assessment, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Human => {
            let mut out = String::new();
            writeln!(
                out,
                "Risk Score: {} -> {}",
                assessment.score, assessment.label
            )?;
            writeln!(out, "Recommended Strategy: {}", assessment.strategy)?;
            Ok(out)
        }
        OutputFormat::Json => Ok(serde_json::to_string_pretty(&JsonAssessment::from(
            assessment,
        ))?),
        OutputFormat::Csv => {
            let columns = DERIVED_COLUMNS.iter().map(|c| c.to_string()).collect();
            let row = derived_cells(assessment).to_vec();
            Ok(Dataset::new(columns, vec![row])?.to_csv_string()?)
        }
    }
}

/// Render an enriched upload, optionally followed by the model's feature importances.
pub fn render_batch(
    batch: &EnrichedDataset,
    importances: Option<&[FeatureImportance]>,
    format: OutputFormat,
) -> anyhow::Result<String> {
    match format {
        OutputFormat::Human => render_batch_human(batch, importances),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(&JsonBatch {
            summary: batch.summary(),
            results: batch.export_view(),
            feature_importance: importances,
        })?),
        OutputFormat::Csv => Ok(batch.export_view().to_csv_string()?),
    }
}

/// Render a ranked importance listing on its own.
pub fn render_importances(
    importances: &[FeatureImportance],
    format: OutputFormat,
) -> anyhow::Result<String> {
    match format {
        OutputFormat::Human => {
            let mut out = String::new();
            write_importances(&mut out, importances)?;
            Ok(out)
        }
        OutputFormat::Json => Ok(serde_json::to_string_pretty(importances)?),
        OutputFormat::Csv => {
            let rows = importances
                .iter()
                .map(|item| vec![item.feature.clone(), item.importance.to_string()])
                .collect();
            let table = Dataset::new(vec!["Feature".into(), "Importance".into()], rows)?;
            Ok(table.to_csv_string()?)
        }
    }
}

fn render_batch_human(
    batch: &EnrichedDataset,
    importances: Option<&[FeatureImportance]>,
) -> anyhow::Result<String> {
    let mut out = String::new();
    write_summary(&mut out, &batch.summary())?;
    writeln!(out)?;

    if batch.is_empty() {
        writeln!(out, "No records to display.")?;
    } else {
        writeln!(out, "Results:")?;
        write_table(&mut out, &batch.display_view())?;
    }

    if let Some(importances) = importances {
        writeln!(out)?;
        write_importances(&mut out, importances)?;
    }
    Ok(out)
}

fn write_summary(out: &mut String, summary: &BatchSummary) -> std::fmt::Result {
    writeln!(out, "Scored {} record(s)", summary.total)?;
    writeln!(
        out,
        "Risk Labels: {} {} • {} {}",
        RiskLabel::HighRisk,
        summary.high_risk,
        RiskLabel::LowRisk,
        summary.low_risk
    )?;
    let strategies: Vec<_> = Strategy::ALL
        .iter()
        .map(|strategy| format!("{} {}", strategy, summary.count_for(*strategy)))
        .collect();
    writeln!(out, "Strategies: {}", strategies.join(" • "))?;
    match summary.mean_score {
        Some(mean) => writeln!(out, "Mean Risk Score: {mean:.2}"),
        None => writeln!(out, "Mean Risk Score: n/a"),
    }
}

fn write_table(out: &mut String, table: &Dataset) -> std::fmt::Result {
    let mut widths: Vec<usize> = table
        .columns()
        .iter()
        .map(|c| c.chars().count())
        .collect();
    for row in table.rows() {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let write_line = |out: &mut String, cells: &[String]| -> std::fmt::Result {
        let line: Vec<_> = cells
            .iter()
            .zip(&widths)
            .map(|(cell, &width)| format!("{cell:<width$}"))
            .collect();
        writeln!(out, "{}", line.join("  ").trim_end())
    };

    write_line(out, table.columns())?;
    let rule: Vec<_> = widths.iter().map(|w| "-".repeat(*w)).collect();
    write_line(out, &rule)?;
    for row in table.rows() {
        write_line(out, row)?;
    }
    Ok(())
}

fn write_importances(out: &mut String, importances: &[FeatureImportance]) -> std::fmt::Result {
    writeln!(out, "Feature Importance:")?;
    let name_width = importances
        .iter()
        .map(|item| item.feature.chars().count())
        .max()
        .unwrap_or(0);
    let max = importances
        .iter()
        .map(|item| item.importance)
        .fold(0.0_f64, f64::max);
    for item in importances {
        let bar_len = if max > 0.0 {
            (item.importance / max * IMPORTANCE_BAR_WIDTH).round() as usize
        } else {
            0
        };
        writeln!(
            out,
            "  - {feature:<name_width$} {importance:.3} {bar}",
            feature = item.feature,
            importance = item.importance,
            bar = "#".repeat(bar_len),
        )?;
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct JsonAssessment {
    risk_score: f64,
    risk_label: RiskLabel,
    predicted_high_risk: u8,
    strategy: Strategy,
}

impl From<&Assessment> for JsonAssessment {
    fn from(assessment: &Assessment) -> Self {
        Self {
            risk_score: assessment.score.value(),
            risk_label: assessment.label,
            predicted_high_risk: assessment.label.as_flag(),
            strategy: assessment.strategy,
        }
    }
}

#[derive(Debug, Serialize)]
struct JsonBatch<'a> {
    summary: BatchSummary,
    results: Dataset,
    #[serde(skip_serializing_if = "Option::is_none")]
    feature_importance: Option<&'a [FeatureImportance]>,
}
