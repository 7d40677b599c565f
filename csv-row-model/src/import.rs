//! High-level import API: CSV in, validated attribute maps out.
//!
//! Combines decoding, the row stream and validation, and reports every
//! step through [`crate::logs`].
//!
//! # Example
//!
//! ```rust,ignore
//! use csv_row_model::{config, import};
//! use std::path::Path;
//!
//! let model = config::load_model(Path::new("users.json"))?;
//! let report = import::import_path(Path::new("users.csv"), &model, &import::ImportOptions::default())?;
//! println!("{} valid rows", report.valid_count);
//! ```

use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

use crate::error::ImportResult;
use crate::logs::{log_info, log_row_error, log_success, log_warning};
use crate::model::{DefaultChange, HasColumns, HasDefaults, HasValidation, ImportModel, Row};
use crate::parser::{self, DecodedCsv};
use crate::reader::{CsvSource, RowStream, Source};
use crate::validation::Messages;
use crate::value::{Attributes, Context, OrderedMap};

const ENV_DELIMITER: &str = "CSV_ROW_MODEL_DELIMITER";
const ENV_NO_HEADER: &str = "CSV_ROW_MODEL_NO_HEADER";
const ENV_INCLUDE_INVALID: &str = "CSV_ROW_MODEL_INCLUDE_INVALID";

/// Options for an import
#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Use this delimiter instead of detecting one
    pub delimiter: Option<char>,

    /// The first row is a header
    pub has_header: bool,

    /// Keep skipped rows in the report
    pub include_invalid: bool,

    /// Invalid rows detailed in the logs
    pub max_logged_errors: usize,

    /// Read-only data handed to every row
    pub context: Context,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            delimiter: None,
            has_header: true,
            include_invalid: false,
            max_logged_errors: 5,
            context: Context::new(),
        }
    }
}

impl ImportOptions {
    /// Defaults overridden by `CSV_ROW_MODEL_*` environment variables.
    pub fn from_env() -> Self {
        let mut options = Self::default();
        if let Some(delimiter) = std::env::var(ENV_DELIMITER).ok().and_then(|d| parse_delimiter(&d)) {
            options.delimiter = Some(delimiter);
        }
        if env_flag(ENV_NO_HEADER) {
            options.has_header = false;
        }
        if env_flag(ENV_INCLUDE_INVALID) {
            options.include_invalid = true;
        }
        options
    }
}

/// Reads a delimiter argument; `tab` and `\t` name the tab character.
pub fn parse_delimiter(raw: &str) -> Option<char> {
    match raw {
        "tab" | "TAB" | "\\t" => Some('\t'),
        other => {
            let mut chars = other.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Some(c),
                _ => None,
            }
        }
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

/// One row of the report
#[derive(Debug, Clone, Serialize)]
pub struct ImportedRow {
    pub index: Option<usize>,
    pub attributes: Attributes,
    pub errors: Messages,
    pub warnings: Messages,
    pub default_changes: OrderedMap<DefaultChange>,
    pub valid: bool,
    pub safe: bool,
    pub children: usize,
}

impl ImportedRow {
    pub fn from_row(row: &Row) -> Self {
        let validation = row.validation_result();
        Self {
            index: row.index(),
            attributes: row.attributes(),
            valid: validation.is_valid(),
            safe: validation.is_safe(),
            errors: validation.errors,
            warnings: validation.warnings,
            default_changes: row.default_changes(),
            children: row.children().len(),
        }
    }
}

/// CSV file information
#[derive(Debug, Clone, Serialize)]
pub struct CsvInfo {
    pub encoding: String,
    pub delimiter: char,
    pub headers: Vec<String>,
}

/// Result of an import
#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub model: String,
    pub rows: Vec<ImportedRow>,
    pub valid_count: usize,
    pub invalid_count: usize,
    pub unsafe_count: usize,
    pub skipped_count: usize,
    pub aborted: bool,
    pub csv_info: CsvInfo,
}

/// Import a CSV file.
///
/// Detects the encoding and (unless given in `options`) the delimiter.
pub fn import_path(path: &Path, model: &Arc<ImportModel>, options: &ImportOptions) -> ImportResult<ImportReport> {
    log_info(format!("Reading {}...", path.display()));
    let decoded = parser::read_file(path, options.delimiter)?;
    import_decoded(decoded, model, options)
}

/// Import CSV bytes.
pub fn import_bytes(bytes: &[u8], model: &Arc<ImportModel>, options: &ImportOptions) -> ImportResult<ImportReport> {
    let decoded = parser::decode_bytes(bytes, options.delimiter)?;
    import_decoded(decoded, model, options)
}

fn import_decoded(decoded: DecodedCsv, model: &Arc<ImportModel>, options: &ImportOptions) -> ImportResult<ImportReport> {
    log_success(format!("Detected encoding: {}", decoded.encoding));
    log_success(format!("Detected separator: '{}'", format_delimiter(decoded.delimiter)));
    let source = CsvSource::from_decoded(&decoded, options.has_header)?;
    import_source(source, model, options, &decoded.encoding, decoded.delimiter)
}

/// Import rows from any [`Source`].
pub fn import_source<S: Source>(
    source: S,
    model: &Arc<ImportModel>,
    options: &ImportOptions,
    encoding: &str,
    delimiter: char,
) -> ImportResult<ImportReport> {
    let mut stream = RowStream::with_context(model.clone(), source, options.context.clone());

    let headers: Vec<String> = stream
        .read_header()?
        .map(|header| header.iter().map(|c| c.clone().unwrap_or_default()).collect())
        .unwrap_or_default();
    if let Some(header) = stream.header() {
        let mismatches = model.schema().header_mismatches(header);
        if !mismatches.is_empty() {
            log_warning(format!("Header does not match columns: {}", mismatches.join(", ")));
        }
    }
    log_info(format!("Importing with model '{}' ({} columns)", model.name(), model.schema().len()));

    let mut report = ImportReport {
        model: model.name().to_string(),
        rows: Vec::new(),
        valid_count: 0,
        invalid_count: 0,
        unsafe_count: 0,
        skipped_count: 0,
        aborted: false,
        csv_info: CsvInfo {
            encoding: encoding.to_string(),
            delimiter,
            headers,
        },
    };

    while let Some(row) = stream.next_row()? {
        let imported = ImportedRow::from_row(&row);
        let skipped = row.skip();

        if imported.valid {
            report.valid_count += 1;
        } else {
            report.invalid_count += 1;
            if report.invalid_count <= options.max_logged_errors {
                log_row_error(display_index(&imported), &imported.errors.full_messages());
            }
        }
        if !imported.safe {
            report.unsafe_count += 1;
        }
        if skipped {
            report.skipped_count += 1;
        }
        if !skipped || options.include_invalid {
            report.rows.push(imported);
        }
    }

    report.aborted = stream.is_aborted();
    if report.aborted {
        log_warning("Import aborted by the model");
    }
    print_summary(&report);
    Ok(report)
}

fn display_index(row: &ImportedRow) -> String {
    row.index.map(|i| (i + 1).to_string()).unwrap_or_else(|| "?".to_string())
}

/// Format delimiter for display
fn format_delimiter(d: char) -> String {
    match d {
        '\t' => "TAB".to_string(),
        other => other.to_string(),
    }
}

fn print_summary(report: &ImportReport) {
    if report.invalid_count == 0 {
        log_success(format!("All {} rows valid!", report.valid_count));
    } else {
        log_success(format!("Valid: {}", report.valid_count));
        log_warning(format!("Invalid: {}", report.invalid_count));
    }
    if report.unsafe_count > 0 {
        log_warning(format!("{} rows with warnings", report.unsafe_count));
    }
    if report.skipped_count > 0 {
        log_info(format!("{} rows skipped", report.skipped_count));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{raw_row, Presenter};
    use crate::reader::MemorySource;
    use crate::schema::{ColumnOptions, ColumnType};
    use crate::validation::Rule;
    use crate::value::Value;
    use std::io::Write;

    fn model() -> Arc<ImportModel> {
        ImportModel::builder("users")
            .column("id", ColumnOptions::new().of_type(ColumnType::Integer).validate_type())
            .column("name", ColumnOptions::new())
            .column("role", ColumnOptions::new().default("member"))
            .validates(Rule::presence("name"))
            .warns(Rule::default_change("role"))
            .build()
            .unwrap()
    }

    #[test]
    fn test_default_options() {
        let opts = ImportOptions::default();
        assert!(opts.has_header);
        assert!(!opts.include_invalid);
        assert_eq!(opts.max_logged_errors, 5);
        assert_eq!(opts.delimiter, None);
    }

    #[test]
    fn test_parse_delimiter() {
        assert_eq!(parse_delimiter(";"), Some(';'));
        assert_eq!(parse_delimiter("tab"), Some('\t'));
        assert_eq!(parse_delimiter(";;"), None);
        assert_eq!(parse_delimiter(""), None);
    }

    #[test]
    fn test_import_bytes_counts_rows() {
        let csv = "Id;Name;Role\n1;Ada;admin\nx;Grace;\n3;;\n4;Linus;\n";
        let report = import_bytes(csv.as_bytes(), &model(), &ImportOptions::default()).unwrap();

        assert_eq!(report.csv_info.delimiter, ';');
        assert_eq!(report.csv_info.headers, vec!["Id", "Name", "Role"]);
        assert_eq!(report.valid_count, 2);
        assert_eq!(report.invalid_count, 2);
        assert_eq!(report.unsafe_count, 3);
        assert_eq!(report.skipped_count, 2);
        assert_eq!(report.rows.len(), 2);
        assert!(!report.aborted);

        let linus = &report.rows[1];
        assert_eq!(linus.attributes.get("id"), Some(&Value::Integer(4)));
        assert_eq!(linus.attributes.get("role"), Some(&Value::from("member")));
        assert_eq!(linus.default_changes.get("role"), Some(&(Value::Nil, Value::from("member"))));
        assert_eq!(linus.warnings.full_messages(), vec!["Role changed by default"]);
    }

    #[test]
    fn test_include_invalid_keeps_every_row() {
        let csv = "id,name,role\nx,Ada,admin\n";
        let options = ImportOptions {
            include_invalid: true,
            ..ImportOptions::default()
        };
        let report = import_bytes(csv.as_bytes(), &model(), &options).unwrap();
        assert_eq!(report.rows.len(), 1);
        let row = &report.rows[0];
        assert!(!row.valid);
        assert_eq!(row.errors.full_messages(), vec!["Id is not a Integer format"]);
        assert_eq!(row.attributes.get("id"), Some(&Value::Nil));
    }

    struct SkipGuests;

    impl Presenter for SkipGuests {
        fn skip(&self, row: &Row) -> bool {
            row.attribute("role") == Value::from("guest")
        }
    }

    #[test]
    fn test_presenter_skips_valid_rows() {
        let model = ImportModel::builder("members")
            .inherit(&model())
            .presenter(SkipGuests)
            .build()
            .unwrap();
        let csv = "id,name,role
1,Ada,admin
2,Grace,guest
x,Linus,guest
";
        let report = import_bytes(csv.as_bytes(), &model, &ImportOptions::default()).unwrap();
        assert_eq!(report.valid_count, 2);
        assert_eq!(report.invalid_count, 1);
        assert_eq!(report.skipped_count, 2);
        assert_eq!(report.rows.len(), 1);
        assert_eq!(report.rows[0].attributes.get("name"), Some(&Value::from("Ada")));
    }

    struct StopAfter(i64);

    impl Presenter for StopAfter {
        fn abort(&self, row: &Row) -> bool {
            row.attribute("id") == Value::Integer(self.0)
        }
    }

    #[test]
    fn test_abort_stops_import() {
        let model = ImportModel::builder("stoppable")
            .inherit(&model())
            .presenter(StopAfter(2))
            .build()
            .unwrap();
        let source = MemorySource::without_header(vec![
            raw_row(["1", "a", "x"]),
            raw_row(["2", "b", "x"]),
            raw_row(["3", "c", "x"]),
        ]);
        let options = ImportOptions {
            has_header: false,
            ..ImportOptions::default()
        };
        let report = import_source(source, &model, &options, "utf-8", ',').unwrap();
        assert!(report.aborted);
        assert_eq!(report.rows.len(), 2);
        assert!(report.csv_info.headers.is_empty());
    }

    #[test]
    fn test_import_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "id\tname\trole\n7\tAda\tadmin\n").unwrap();
        let report = import_path(file.path(), &model(), &ImportOptions::default()).unwrap();
        assert_eq!(report.csv_info.delimiter, '\t');
        assert_eq!(report.rows[0].attributes.get("name"), Some(&Value::from("Ada")));
        assert!(report.rows[0].safe);
    }

    #[test]
    fn test_report_serializes() {
        let report = import_bytes(b"id,name,role\n1,Ada,admin\n", &model(), &ImportOptions::default()).unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["rows"][0]["attributes"]["id"], 1);
        assert_eq!(json["csv_info"]["delimiter"], ",");
    }

    #[test]
    fn test_empty_input_is_an_error() {
        assert!(import_bytes(b"", &model(), &ImportOptions::default()).is_err());
    }
}
