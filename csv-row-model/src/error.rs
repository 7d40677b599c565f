//! Error types for csv-row-model.
//!
//! This module defines the error hierarchy of the crate:
//!
//! - [`ConfigError`] - Model/schema misdeclarations, raised while a model is defined
//! - [`SourceError`] - Failures of the underlying CSV source (I/O, tokenizer, encoding)
//! - [`ImportError`] - Top-level errors of the import pipeline
//!
//! Cell coercion and format problems are *not* errors here: they are
//! reported through the validation layer, keyed by column.

use thiserror::Error;

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors raised while declaring columns, rules or whole models.
///
/// These are fatal for the model definition and always surface before any
/// row is processed.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A column declared both a `type` and a `parse` function.
    #[error("column '{0}': you need either :parse OR :type but not both of them")]
    TypeAndParse(String),

    /// A type name that has no built-in coercion.
    #[error("column '{column}': unsupported type '{type_name}'")]
    UnsupportedType { column: String, type_name: String },

    /// An option key outside of the supported set.
    #[error("column '{column}': invalid options {keys:?}")]
    UnknownOption { column: String, keys: Vec<String> },

    /// An option with a value of the wrong shape.
    #[error("column '{column}': invalid value for option '{option}'")]
    InvalidOption { column: String, option: String },

    /// A reference to a column the schema does not declare.
    #[error("unknown column '{0}'")]
    UnknownColumn(String),

    /// A column name used twice where names must be unique.
    #[error("duplicate column '{0}'")]
    DuplicateColumn(String),

    /// Invalid regular expression in a format rule.
    #[error("invalid format rule for '{column}': {message}")]
    InvalidRule { column: String, message: String },

    /// A model definition file that does not match the model schema.
    #[error("invalid model definition: {errors:?}")]
    InvalidDefinition { errors: Vec<String> },

    /// JSON error while reading a model definition.
    #[error("model definition JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error while reading a model definition.
    #[error("model definition IO error: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Source Errors
// =============================================================================

/// Errors from the CSV source collaborator.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Failed to read the input.
    #[error("failed to read source: {0}")]
    Io(#[from] std::io::Error),

    /// The CSV tokenizer rejected the input.
    #[error("invalid CSV at line {line}: {message}")]
    Csv { line: u64, message: String },

    /// Could not decode the input bytes.
    #[error("failed to decode source as {0}")]
    Encoding(String),

    /// Nothing to read.
    #[error("CSV source is empty")]
    Empty,

    /// Delimiters must be single-byte characters.
    #[error("invalid delimiter {0:?}: must be an ASCII character")]
    InvalidDelimiter(char),
}

impl From<csv::Error> for SourceError {
    fn from(err: csv::Error) -> Self {
        let line = err.position().map(|p| p.line()).unwrap_or(0);
        match err.into_kind() {
            csv::ErrorKind::Io(io) => SourceError::Io(io),
            kind => SourceError::Csv {
                line,
                message: format!("{:?}", kind),
            },
        }
    }
}

// =============================================================================
// Import Errors (top-level)
// =============================================================================

/// Top-level import pipeline errors.
///
/// This is the error type returned by [`crate::import::import_path`] and
/// friends. It wraps the lower-level errors.
#[derive(Debug, Error)]
pub enum ImportError {
    /// Model definition error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Source error.
    #[error("source error: {0}")]
    Source(#[from] SourceError),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for model definition.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for source operations.
pub type SourceResult<T> = Result<T, SourceError>;

/// Result type for the import pipeline.
pub type ImportResult<T> = Result<T, ImportError>;
