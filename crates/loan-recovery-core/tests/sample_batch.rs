use std::path::PathBuf;

use insta::assert_snapshot;
use loan_recovery_core::{
    enrich,
    report::{render_batch, OutputFormat},
    Dataset, FeatureVector, FileArtifactRepository, ModelScorer, RiskLabel, ScoreError, Scorer,
    Strategy,
};

fn workspace_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../..")
}

async fn sample_scorer() -> ModelScorer {
    let repo = FileArtifactRepository::in_dir(workspace_root().join("artifacts"));
    ModelScorer::from_repository(&repo)
        .await
        .unwrap_or_else(|err| panic!("sample artifacts should load: {err:#}"))
}

fn sample_dataset() -> Dataset {
    Dataset::from_csv_path(&workspace_root().join("data/borrowers_sample.csv"))
        .expect("sample upload should parse")
}

#[tokio::test(flavor = "current_thread")]
async fn sample_batch_human_snapshot() {
    let scorer = sample_scorer().await;
    let enriched = enrich(&sample_dataset(), &scorer).unwrap();
    let importances = scorer.feature_importances();
    let output = render_batch(&enriched, importances.as_deref(), OutputFormat::Human).unwrap();
    assert_snapshot!("sample_batch_human", output);
}

#[tokio::test(flavor = "current_thread")]
async fn sample_batch_hits_every_tier_and_boundary() {
    let scorer = sample_scorer().await;
    let enriched = enrich(&sample_dataset(), &scorer).unwrap();
    let outcomes: Vec<_> = enriched
        .assessments()
        .iter()
        .map(|a| (a.score.value(), a.label, a.strategy))
        .collect();
    assert_eq!(
        outcomes,
        vec![
            (0.0625, RiskLabel::LowRisk, Strategy::Reminder),
            (0.875, RiskLabel::HighRisk, Strategy::LegalAction),
            (0.5, RiskLabel::LowRisk, Strategy::Reminder),
            (0.25, RiskLabel::LowRisk, Strategy::Reminder),
            (0.625, RiskLabel::HighRisk, Strategy::SettlementPlan),
            (1.0, RiskLabel::HighRisk, Strategy::LegalAction),
            (0.75, RiskLabel::HighRisk, Strategy::SettlementPlan),
        ]
    );
}

#[tokio::test(flavor = "current_thread")]
async fn manual_entry_matches_batch_row() {
    let scorer = sample_scorer().await;
    let dataset = sample_dataset();
    let enriched = enrich(&dataset, &scorer).unwrap();

    let manual: FeatureVector = scorer
        .schema()
        .names()
        .iter()
        .map(|name| {
            let idx = dataset
                .columns()
                .iter()
                .position(|column| column == name)
                .unwrap();
            (name.clone(), dataset.rows()[1][idx].parse::<f64>().unwrap())
        })
        .collect();
    let score = scorer.score(&[manual]).unwrap()[0];
    assert_eq!(score, enriched.assessments()[1].score);
}

#[tokio::test(flavor = "current_thread")]
async fn export_csv_leads_with_derived_columns() {
    let scorer = sample_scorer().await;
    let enriched = enrich(&sample_dataset(), &scorer).unwrap();
    let csv = render_batch(&enriched, None, OutputFormat::Csv).unwrap();
    let mut lines = csv.lines();
    assert_eq!(
        lines.next().unwrap(),
        "Risk_Score,Predicted_High_Risk,Strategy,Borrower_ID,Age,Monthly_Income,Loan_Amount,\
         Loan_Tenure,Interest_Rate,Collateral_Value,Outstanding_Loan_Amount,Monthly_EMI,\
         Num_Missed_Payments,Days_Past_Due"
    );
    assert_eq!(
        lines.next().unwrap(),
        "0.0625,0,Reminder,B001,35,85000,500000,60,8.5,300000,90000,10200,0,0"
    );
}

#[tokio::test(flavor = "current_thread")]
async fn upload_without_required_column_names_it() {
    let scorer = sample_scorer().await;
    let upload = "Borrower_ID,Age,Monthly_Income\nB1,30,1000\n";
    let dataset = Dataset::from_csv_reader(upload.as_bytes()).unwrap();
    let err = enrich(&dataset, &scorer).unwrap_err();
    match err {
        ScoreError::SchemaMismatch { row: None, missing } => {
            assert!(missing.contains(&"Days_Past_Due".to_string()));
            assert!(!missing.contains(&"Age".to_string()));
        }
        other => panic!("unexpected error: {other}"),
    }
}
