use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sqlpilot_catalog::{JsonFileSchemaSource, SchemaSource};
use sqlpilot_core::{BackendKind, Config, Outcome, Report, SchemaModel};
use sqlpilot_engine::{Answer, AnswerData, Explanation, Pipeline};

const DEFAULT_CONFIG: &str = "sqlpilot.toml";

/// sqlpilot - answer natural-language questions with validated, read-only SQL
#[derive(Parser)]
#[command(name = "sqlpilot")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: sqlpilot.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Schema description (JSON); overrides SQLPILOT_SCHEMA and the config file
    #[arg(short, long, global = true)]
    schema: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a question
    Ask {
        question: String,

        /// Print the full answer as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show how a question would be planned, without running it
    Explain {
        question: String,

        /// Print the explanation as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the tables and relationships of the schema
    Tables,

    /// Answer every question in a file (one per line) and write a report
    Batch {
        /// Questions file; blank lines and lines starting with '#' are skipped
        file: PathBuf,

        /// Output file for report.json
        #[arg(short, long, default_value = "report.json")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // A missing .env is fine
    dotenvy::dotenv().ok();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let config = load_config(&cli)?;
    let schema = load_schema(&cli, &config).await?;

    if cli.verbose {
        eprintln!(
            "{} {} tables, dialect {}",
            "Schema:".cyan(),
            schema.tables().len(),
            config.dialect.unwrap_or_else(|| schema.dialect())
        );
    }

    match cli.command {
        Commands::Tables => {
            tables_command(&schema);
            Ok(())
        }
        Commands::Ask { question, json } => {
            let pipeline = Pipeline::from_config(config, schema)?;
            ask_command(&pipeline, &question, json).await
        }
        Commands::Explain { question, json } => {
            let pipeline = Pipeline::from_config(config, schema)?;
            explain_command(&pipeline, &question, json).await
        }
        Commands::Batch { file, output } => {
            let pipeline = Pipeline::from_config(config, schema)?;
            batch_command(&pipeline, &file, &output, cli.verbose).await
        }
    }
}

/// Config file, then environment overrides
fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = if let Some(config_path) = &cli.config {
        Config::from_file(config_path)
            .with_context(|| format!("loading config {}", config_path.display()))?
    } else if Path::new(DEFAULT_CONFIG).exists() {
        Config::from_file(Path::new(DEFAULT_CONFIG))?
    } else {
        if cli.verbose {
            eprintln!("{}", "No config file found, using defaults".yellow());
        }
        Config::default()
    };

    if let Ok(schema) = std::env::var("SQLPILOT_SCHEMA") {
        config.schema_path = Some(PathBuf::from(schema));
    }
    if let Ok(db) = std::env::var("SQLPILOT_DB") {
        config.backend.kind = BackendKind::Sqlite;
        config.backend.path = Some(PathBuf::from(db));
    }
    if let Some(path) = config.backend.path.take() {
        config.backend.path = Some(config.resolve_path(&path));
    }

    Ok(config)
}

async fn load_schema(cli: &Cli, config: &Config) -> Result<SchemaModel> {
    let path = cli
        .schema
        .clone()
        .or_else(|| config.schema_path.as_ref().map(|p| config.resolve_path(p)))
        .context("no schema given; pass --schema, set SQLPILOT_SCHEMA or schema_path in sqlpilot.toml")?;

    tracing::debug!(path = %path.display(), "loading schema");
    let schema = JsonFileSchemaSource::new(path).load().await?;
    Ok(schema)
}

fn tables_command(schema: &SchemaModel) {
    println!("\n{}", "=".repeat(60).bright_blue());
    println!("{}", "Schema Overview".bold().bright_blue());
    println!("{}", "=".repeat(60).bright_blue());
    println!();

    println!("{} {}", "Dialect:".bold(), schema.dialect());
    println!("{} {}", "Tables:".bold(), schema.tables().len());
    println!();

    for table in schema.tables() {
        println!("{} ({} columns)", table.full_name.green().bold(), table.columns.len());
        if !table.description.is_empty() {
            println!("  {}", table.description);
        }
        if !table.synonyms.is_empty() {
            println!("  {} {}", "synonyms:".dimmed(), table.synonyms.join(", "));
        }
        for column in &table.columns {
            let key = if column.is_primary_key { " PK".yellow().to_string() } else { String::new() };
            println!("    {} {}{}", column.name, column.declared_type.dimmed(), key);
        }
    }

    if !schema.relationships().is_empty() {
        println!();
        println!("{}", "Relationships:".bold());
        for rel in schema.relationships() {
            println!(
                "  {}.{} -> {}.{}",
                rel.from_table, rel.from_column, rel.to_table, rel.to_column
            );
        }
    }
    println!();
}

async fn ask_command(pipeline: &Pipeline, question: &str, json: bool) -> Result<()> {
    let answer = pipeline.answer(question).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&answer)?);
    } else {
        print_answer(&answer);
    }

    if answer.outcome == Outcome::ExecutionFailed {
        std::process::exit(1);
    }
    Ok(())
}

async fn explain_command(pipeline: &Pipeline, question: &str, json: bool) -> Result<()> {
    let explanation = pipeline.explain(question).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&explanation)?);
    } else {
        print_explanation(&explanation);
    }
    Ok(())
}

async fn batch_command(pipeline: &Pipeline, file: &Path, output: &Path, verbose: bool) -> Result<()> {
    let contents = std::fs::read_to_string(file)
        .with_context(|| format!("reading questions from {}", file.display()))?;
    let questions: Vec<&str> = contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect();

    if verbose {
        eprintln!("{} {} questions...", "Answering".cyan(), questions.len());
    }

    let mut report = Report::new();
    for question in questions {
        let answer = pipeline.answer(question).await;
        if verbose {
            eprintln!("  {} {}", outcome_label(answer.outcome), question);
        }
        report.add_entry(answer.to_report_entry());
    }

    let report = report.with_metadata(serde_json::json!({
        "dialect": pipeline.schema().dialect().as_str(),
        "tables": pipeline.schema().tables().len(),
        "questions_file": file.display().to_string(),
    }));

    report.save_to_file(output)?;
    eprintln!("{} {}", "Report saved to:".green(), output.display());

    print_report_summary(&report);

    if report.has_failures() {
        std::process::exit(1);
    }
    Ok(())
}

fn outcome_label(outcome: Outcome) -> colored::ColoredString {
    match outcome {
        Outcome::Answered => "ANSWERED".green().bold(),
        Outcome::BestEffort => "BEST EFFORT".yellow().bold(),
        Outcome::NoRelevantTable => "NO TABLE".yellow(),
        Outcome::ExecutionFailed => "FAILED".red().bold(),
    }
}

fn print_answer(answer: &Answer) {
    println!();
    println!("{} {}", "Question:".bold(), answer.question);
    println!(
        "{} {} (confidence {:.2})",
        "Intent:".bold(),
        answer.intent,
        answer.detection.confidence
    );
    if answer.detection.intent != answer.intent {
        println!("  {} detected as {}", "note:".dimmed(), answer.detection.intent);
    }
    if !answer.selected_tables.is_empty() {
        println!("{} {}", "Tables:".bold(), answer.selected_tables.join(", "));
    }
    if let Some(sql) = &answer.generated_sql {
        println!("{} {}", "SQL:".bold(), sql.cyan());
    }
    println!(
        "{} {} after {} iteration(s)",
        "Outcome:".bold(),
        outcome_label(answer.outcome),
        answer.iterations_used
    );
    println!();

    for error in &answer.validation_errors {
        println!("  {} {}", "✗".red(), error);
    }
    for warning in &answer.payload.warnings {
        println!("  {} {}", "⚠".yellow(), warning);
    }

    match &answer.payload.data {
        AnswerData::Count { total, groups } => {
            println!("{} {}", "Total:".bold(), total.to_string().green().bold());
            for group in groups {
                println!("  {}: {}", group.key, group.count);
            }
        }
        AnswerData::Aggregate { function, column, rows } => {
            println!("{}({})", function.bold(), column);
            print_rows(rows);
        }
        AnswerData::Rows { rows, row_count, .. } => {
            println!("{} {}", "Rows:".bold(), row_count);
            print_rows(rows);
        }
        AnswerData::Describe { table, columns, sample } => {
            println!("{}", table.green().bold());
            for column in columns {
                let key = if column.primary_key { " PK" } else { "" };
                println!("  {} {}{}", column.name, column.data_type.dimmed(), key);
            }
            if !sample.is_empty() {
                println!();
                println!("{}", "Sample:".bold());
                print_rows(sample);
            }
        }
        AnswerData::None => println!("{}", answer.payload.message.yellow()),
    }
    println!();
}

fn print_rows(rows: &[sqlpilot_catalog::Row]) {
    for row in rows {
        let cells: Vec<String> = row.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        println!("  {}", cells.join("  "));
    }
}

fn print_explanation(explanation: &Explanation) {
    let detection = &explanation.detection;

    println!();
    println!("{} {}", "Question:".bold(), explanation.question);
    println!(
        "{} {} (confidence {:.2})",
        "Intent:".bold(),
        detection.intent,
        detection.confidence
    );
    if explanation.intent != detection.intent {
        println!("  {} planned as {}", "note:".dimmed(), explanation.intent);
    }
    if !detection.reasons.is_empty() {
        println!("  {} {}", "rules:".dimmed(), detection.reasons.join(", "));
    }
    if !explanation.entities.terms.is_empty() {
        println!("{} {}", "Terms:".bold(), explanation.entities.terms.join(", "));
    }
    println!();

    println!("{}", "Table scores:".bold());
    if explanation.selection.tables.is_empty() {
        println!("  {}", "no table matched".yellow());
    }
    for table in &explanation.selection.tables {
        let marker = if table.selected { "✓".green() } else { " ".normal() };
        println!(
            "  {} {:<30} {:.4} (lexical {:.4}, retrieval {:.4})",
            marker, table.full_name, table.combined_score, table.lexical_score, table.retrieval_score
        );
    }
    println!();

    if let Some(sql) = &explanation.sql {
        println!("{} {}", "SQL:".bold(), sql.cyan());
    }
    match &explanation.validation {
        Some(v) if v.is_valid => println!("{}", "✓ Validation passed".green()),
        Some(v) => {
            println!("{}", "✗ Validation failed".red().bold());
            for error in &v.errors {
                println!("  {}", error);
            }
        }
        None => {}
    }
    if let Some(failure) = &explanation.failure {
        println!("{} {}", "Failure:".red().bold(), failure);
    }
    println!();
}

/// Print report summary to stdout
fn print_report_summary(report: &Report) {
    println!("\n{}", "=".repeat(60).bright_blue());
    println!("{}", "Batch Report".bold().bright_blue());
    println!("{}", "=".repeat(60).bright_blue());
    println!();

    println!("Version: {}", report.version);
    println!("Timestamp: {}", report.timestamp);
    println!();

    println!("{}", "Summary:".bold());
    println!("  Total questions:   {}", report.summary.total);
    println!("  Answered:          {}", report.summary.answered.to_string().green());
    println!("  Best effort:       {}", report.summary.best_effort.to_string().yellow());
    println!("  No relevant table: {}", report.summary.no_relevant_table.to_string().yellow());
    if report.summary.execution_failed > 0 {
        println!(
            "  Failed:            {}",
            report.summary.execution_failed.to_string().red().bold()
        );
    } else {
        println!("  Failed:            {}", "0".green());
    }
    println!();

    for entry in report.entries.iter().filter(|e| !e.errors.is_empty()) {
        println!("  [{}] {}", outcome_label(entry.outcome), entry.question);
        for error in &entry.errors {
            println!("      {}", error);
        }
    }
    println!("{}", "=".repeat(60).bright_blue());
}
