//! # csv-row-model - Declarative row models for CSV import
//!
//! A row model declares the columns of a CSV file once (names, types,
//! parsing, defaults, headers) together with validation rules. Every CSV
//! line then becomes a [`Row`] exposing typed attributes, error and warning
//! messages, and the defaults that were applied.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   CSV File  │────▶│   Parser    │────▶│  RowStream  │────▶│ Report JSON │
//! │  (ISO/UTF8) │     │  (auto-enc) │     │ (rows+kids) │     │ (validated) │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//!                                               ▲
//!                                        ┌─────────────┐
//!                                        │ ImportModel │
//!                                        │ (code/JSON) │
//!                                        └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use csv_row_model::prelude::*;
//! use csv_row_model::{ColumnOptions, ColumnType, ImportModel, Row, Rule};
//!
//! let model = ImportModel::builder("users")
//!     .column("id", ColumnOptions::new().of_type(ColumnType::Integer).validate_type())
//!     .column("name", ColumnOptions::new().default("anonymous"))
//!     .validates(Rule::presence("id"))
//!     .build()?;
//!
//! let row = Row::from_cells(&model, ["1", ""]);
//! assert!(row.is_valid());
//! assert_eq!(row.attribute("name"), "anonymous".into());
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`value`] - Dynamic cell values and ordered maps
//! - [`schema`] - Column declarations and type coercion
//! - [`validation`] - Rules, messages and results
//! - [`model`] - Import models and row instances
//! - [`parser`] - Encoding and delimiter detection
//! - [`reader`] - CSV sources and the row stream
//! - [`import`] - End-to-end import pipeline
//! - [`config`] - Models defined in JSON files
//! - [`logs`] - Progress logging

// Core modules
pub mod error;
pub mod value;

// Declarations
pub mod schema;
pub mod validation;
pub mod model;

// Reading
pub mod parser;
pub mod reader;

// Pipeline
pub mod import;
pub mod config;
pub mod logs;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{ConfigError, ConfigResult, ImportError, ImportResult, SourceError, SourceResult};

// =============================================================================
// Re-exports - Values
// =============================================================================

pub use value::{humanize, Attributes, Context, OrderedMap, Value};

// =============================================================================
// Re-exports - Schema & validation
// =============================================================================

pub use schema::{Column, ColumnOptions, ColumnType, DefaultValue, Schema, SchemaBuilder};
pub use validation::{Check, Messages, Rule, RuleSet, ValidationResult};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use model::{
    raw_row, Attribute, ChildRule, DefaultChange, DefaultPresenter, HasColumns, HasDefaults,
    HasValidation, ImportModel, ImportModelBuilder, Presenter, RawRow, Row, RowOptions, RowScope,
};

// =============================================================================
// Re-exports - Reading & import
// =============================================================================

pub use reader::{CsvConfig, CsvSource, MemorySource, ReaderState, RowStream, Source};
pub use import::{import_bytes, import_path, import_source, CsvInfo, ImportOptions, ImportReport, ImportedRow};
pub use config::{load_model, parse_model, ModelDefinition};

/// The capability traits, for method syntax on rows and cell models.
pub mod prelude {
    pub use crate::model::{HasColumns, HasDefaults, HasValidation, Presenter};
    pub use crate::reader::Source;
}
