mod settings;

use std::{
    fs::File,
    io,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use loan_recovery_core::{
    enrich,
    report::{render_assessment, render_batch, render_importances, OutputFormat},
    Assessment, Dataset, FeatureVector, FileArtifactRepository, ModelScorer, Scorer,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

use settings::AppSettings;

#[derive(Parser, Debug)]
#[command(
    name = "loan-recovery",
    author,
    version,
    about = "Borrower risk scoring and recovery strategy CLI"
)]
struct Cli {
    /// Configuration file with `model_path` / `features_path` (TOML, JSON or YAML)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Model artifact, overriding configuration and environment
    #[arg(long, value_name = "FILE", global = true)]
    model: Option<PathBuf>,

    /// Feature schema artifact (JSON array of names)
    #[arg(long, value_name = "FILE", global = true)]
    features: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Score every borrower in a CSV upload
    ScoreFile {
        /// CSV with a header row; read from stdin when omitted
        input: Option<PathBuf>,
        /// Also write the results CSV (derived columns first) to this path
        #[arg(long, short, value_name = "FILE")]
        output: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = Format::Human)]
        format: Format,
        /// Append the model's feature importances
        #[arg(long)]
        importance: bool,
    },
    /// Score a single borrower entered field by field
    Predict {
        /// Feature value, repeatable
        #[arg(long = "set", value_name = "NAME=VALUE", value_parser = parse_assignment)]
        fields: Vec<(String, String)>,
        /// Do not default unset features to 0.0
        #[arg(long)]
        strict: bool,
        #[arg(long)]
        json: bool,
    },
    /// List the features the model requires
    Features {
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Human,
    Json,
    Csv,
}

impl From<Format> for OutputFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Human => OutputFormat::Human,
            Format::Json => OutputFormat::Json,
            Format::Csv => OutputFormat::Csv,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        eprintln!("{} {err:#}", "error:".red().bold());
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let settings =
        AppSettings::load(cli.config.as_deref())?.with_overrides(cli.model, cli.features);
    let scorer = load_scorer(&settings).await?;

    match cli.command.unwrap_or(Commands::Features { json: false }) {
        Commands::ScoreFile {
            input,
            output,
            format,
            importance,
        } => score_file(
            &scorer,
            input.as_deref(),
            output.as_deref(),
            format.into(),
            importance,
        ),
        Commands::Predict {
            fields,
            strict,
            json,
        } => predict(&scorer, &fields, strict, json),
        Commands::Features { json } => list_features(&scorer, json),
    }
}

async fn load_scorer(settings: &AppSettings) -> Result<ModelScorer> {
    let repo = FileArtifactRepository::new(&settings.model_path, &settings.features_path);
    let scorer = ModelScorer::from_repository(&repo)
        .await
        .context("failed to load model artifacts")?;
    info!(
        model = %settings.model_path.display(),
        features = scorer.schema().len(),
        "model ready"
    );
    Ok(scorer)
}

fn score_file(
    scorer: &ModelScorer,
    input: Option<&Path>,
    output: Option<&Path>,
    format: OutputFormat,
    importance: bool,
) -> Result<()> {
    let dataset = match input {
        Some(path) => Dataset::from_csv_path(path)
            .with_context(|| format!("failed to read borrowers from {}", path.display()))?,
        None => Dataset::from_csv_reader(io::stdin().lock())
            .context("failed to read borrowers from stdin")?,
    };

    let enriched = match enrich(&dataset, scorer) {
        Ok(enriched) => enriched,
        Err(err) => {
            eprintln!(
                "{} the CSV must include these columns: {}",
                "hint:".yellow().bold(),
                scorer.schema().names().join(", ")
            );
            return Err(err).context("failed to score uploaded borrowers");
        }
    };

    let importances = if importance {
        scorer.feature_importances()
    } else {
        None
    };
    print!("{}", render_batch(&enriched, importances.as_deref(), format)?);

    if let Some(path) = output {
        let file = File::create(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        enriched
            .export_view()
            .write_csv(file)
            .with_context(|| format!("failed to write results to {}", path.display()))?;
        info!(path = %path.display(), rows = enriched.len(), "results written");
    }
    Ok(())
}

fn predict(
    scorer: &ModelScorer,
    fields: &[(String, String)],
    strict: bool,
    json: bool,
) -> Result<()> {
    let schema = scorer.schema();
    if let Some((name, _)) = fields.iter().find(|(name, _)| !schema.contains(name)) {
        bail!(
            "unknown feature `{name}`; expected one of: {}",
            schema.names().join(", ")
        );
    }

    let mut vector = FeatureVector::new();
    if !strict {
        for name in schema.names() {
            vector.insert(name.clone(), 0.0);
        }
    }
    for (name, value) in fields {
        vector.insert(name.clone(), value.as_str());
    }

    let score = scorer
        .score(std::slice::from_ref(&vector))
        .context("failed to score borrower")?
        .into_iter()
        .next()
        .context("scorer returned no score")?;
    let format = if json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };
    print!(
        "{}",
        render_assessment(&Assessment::from_score(score), format)?
    );
    Ok(())
}

fn list_features(scorer: &ModelScorer, json: bool) -> Result<()> {
    let schema = scorer.schema();
    let importances = scorer.feature_importances();
    if json {
        let payload = serde_json::json!({
            "features": schema.names(),
            "importance": importances,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    println!(
        "{} feature(s) required by the model",
        schema.len().to_string().bold()
    );
    for name in schema.names() {
        println!("- {name}");
    }
    if let Some(importances) = importances {
        println!();
        print!(
            "{}",
            render_importances(&importances, OutputFormat::Human)?
        );
    }
    Ok(())
}

fn parse_assignment(raw: &str) -> std::result::Result<(String, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got `{raw}`"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing feature name in `{raw}`"));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .try_init();
}
