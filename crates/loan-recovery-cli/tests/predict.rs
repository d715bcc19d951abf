use assert_cmd::Command;
use predicates::prelude::*;
use std::path::PathBuf;

fn cli() -> Command {
    let root = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../..");
    let mut cmd = Command::cargo_bin("loan-recovery").unwrap();
    cmd.arg("--model")
        .arg(root.join("artifacts/model.json"))
        .arg("--features")
        .arg(root.join("artifacts/features.json"))
        .env("RUST_LOG", "warn");
    cmd
}

#[test]
fn overdue_borrower_goes_to_legal_action() {
    cli()
        .args([
            "predict",
            "--set",
            "Num_Missed_Payments=6",
            "--set",
            "Days_Past_Due=120",
            "--set",
            "Outstanding_Loan_Amount=350000",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Risk Score: 1.00 -> High Risk"))
        .stdout(predicate::str::contains("Recommended Strategy: Legal Action"));
}

#[test]
fn unset_fields_default_to_zero() {
    cli()
        .arg("predict")
        .assert()
        .success()
        .stdout(predicate::str::contains("-> Low Risk"))
        .stdout(predicate::str::contains("Recommended Strategy: Reminder"));
}

#[test]
fn json_output_carries_score() {
    let output = cli()
        .args(["predict", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let value: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(value["risk_score"], serde_json::json!(0.3125));
    assert_eq!(value["risk_label"], "Low Risk");
    assert_eq!(value["strategy"], "Reminder");
}

#[test]
fn strict_mode_requires_every_feature() {
    cli()
        .args(["predict", "--strict", "--set", "Age=40"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing required feature(s)"));
}

#[test]
fn unknown_feature_is_rejected() {
    cli()
        .args(["predict", "--set", "Credit_Score=700"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown feature `Credit_Score`"));
}

#[test]
fn non_numeric_value_is_rejected() {
    cli()
        .args(["predict", "--set", "Age=abc"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("feature `Age` has invalid value `abc`"));
}

#[test]
fn features_json_lists_schema() {
    let output = cli()
        .args(["features", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let value: serde_json::Value = serde_json::from_slice(&output).unwrap();
    let features = value["features"].as_array().unwrap();
    assert_eq!(features.len(), 10);
    assert_eq!(features[0], "Age");
    assert_eq!(features[9], "Days_Past_Due");
}
