//! csv-row-model CLI - Import CSV files through declarative row models
//!
//! # Commands
//!
//! ```bash
//! csv-row-model import users.json users.csv       # Import rows, print JSON report
//! csv-row-model columns users.json                # Show the model's columns and headers
//! csv-row-model check users.json                  # Check a model definition file
//! ```
//!
//! Defaults for `import` can come from the environment (or a `.env` file):
//! `CSV_ROW_MODEL_DELIMITER`, `CSV_ROW_MODEL_NO_HEADER`,
//! `CSV_ROW_MODEL_INCLUDE_INVALID`.

use clap::{Parser, Subcommand};
use csv_row_model::config;
use csv_row_model::error::ConfigError;
use csv_row_model::import::{self, ImportOptions};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "csv-row-model")]
#[command(about = "Import CSV files through declarative row models")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a CSV file with a row model definition
    Import {
        /// Model definition (JSON)
        model: PathBuf,
        /// Input CSV file
        input: PathBuf,
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// CSV delimiter (auto-detected if not specified; "tab" for tabs)
        #[arg(short, long)]
        delimiter: Option<String>,
        /// Keep invalid and skipped rows in the output
        #[arg(long)]
        include_invalid: bool,
        /// The first line is data, not a header
        #[arg(long)]
        no_header: bool,
    },

    /// List the columns and headers of a model
    Columns {
        /// Model definition (JSON)
        model: PathBuf,
    },

    /// Check a model definition without importing anything
    Check {
        /// Model definition (JSON)
        model: PathBuf,
    },
}

fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Import {
            model,
            input,
            output,
            delimiter,
            include_invalid,
            no_header,
        } => cmd_import(
            &model,
            &input,
            output.as_deref(),
            delimiter.as_deref(),
            include_invalid,
            no_header,
        ),

        Commands::Columns { model } => cmd_columns(&model),

        Commands::Check { model } => cmd_check(&model),
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

fn cmd_import(
    model_path: &Path,
    input: &Path,
    output: Option<&Path>,
    delimiter: Option<&str>,
    include_invalid: bool,
    no_header: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let model = config::load_model(model_path)?;
    eprintln!("📄 Model: {} ({})", model.name(), model_path.display());

    let mut options = ImportOptions::from_env();
    if let Some(raw) = delimiter {
        options.delimiter =
            Some(import::parse_delimiter(raw).ok_or_else(|| format!("invalid delimiter: {:?}", raw))?);
    }
    if include_invalid {
        options.include_invalid = true;
    }
    if no_header {
        options.has_header = false;
    }

    let report = import::import_path(input, &model, &options)?;

    let json = serde_json::to_string_pretty(&report)?;
    write_output(&json, output)?;

    if report.aborted {
        eprintln!("⚠️  Import stopped early");
    }
    eprintln!("\n✨ Done!");
    Ok(())
}

fn cmd_columns(model_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let model = config::load_model(model_path)?;
    let schema = model.schema();

    println!("📄 Model: {}\n", model.name());
    for column in schema.columns() {
        let type_name = column
            .column_type()
            .map(|t| t.to_string())
            .unwrap_or_else(|| "String".to_string());
        println!("  {} ({}) - header: {}", column.name(), type_name, column.header());
    }

    let dynamic = schema.dynamic_column_names();
    if !dynamic.is_empty() {
        println!("\nDynamic columns: {}", dynamic.join(", "));
    }

    Ok(())
}

fn cmd_check(model_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("✔️  Checking: {}", model_path.display());

    match config::load_model(model_path) {
        Ok(model) => {
            let rules = model.row_rules();
            let cell_rules = model.cell_rules();
            eprintln!(
                "✅ Model '{}' is valid ({} columns, {} rules, {} warnings, {} cell rules)",
                model.name(),
                model.schema().len(),
                rules.errors().len(),
                rules.warnings().len(),
                cell_rules.errors().len() + cell_rules.warnings().len()
            );
            Ok(())
        }
        Err(ConfigError::InvalidDefinition { errors }) => {
            eprintln!("\n❌ {} problem(s):", errors.len());
            for err in &errors {
                eprintln!("   - {}", err);
            }
            std::process::exit(1);
        }
        Err(e) => Err(e.into()),
    }
}

fn write_output(content: &str, path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("💾 Output written to: {}", p.display());
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}
