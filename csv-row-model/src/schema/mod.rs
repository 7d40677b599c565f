//! Column schema registry.
//!
//! A [`Schema`] is the ordered, frozen list of columns of a row model. It is
//! produced once by a [`SchemaBuilder`], which resolves inheritance (columns
//! of ancestor schemas first, overridden in place by name) and rejects
//! misdeclared columns before any row is read.
//!
//! ```rust,ignore
//! use csv_row_model::{ColumnOptions, ColumnType, Schema};
//!
//! let schema = Schema::builder()
//!     .column("id", ColumnOptions::new().of_type(ColumnType::Integer).validate_type())
//!     .column("name", ColumnOptions::new().header("Full Name"))
//!     .build()?;
//! assert_eq!(schema.column_names(), vec!["id", "name"]);
//! ```

pub mod types;

use serde_json::Map;
use std::fmt;
use std::sync::Arc;

use crate::error::{ConfigError, ConfigResult};
use crate::model::RowScope;
use crate::value::{humanize, Value};

pub use types::{ColumnType, CoercionError};

/// Option keys accepted by the map form of a column declaration.
pub const VALID_OPTION_KEYS: &[&str] = &[
    "type",
    "parse",
    "validate_type",
    "default",
    "header",
    "header_matches",
];

/// Custom cell parser: receives the formatted cell (`""` when missing).
pub type ParseFn = Arc<dyn Fn(&str, &RowScope<'_>) -> Value + Send + Sync>;

/// Lazily computed default, evaluated against the row.
pub type DefaultFn = Arc<dyn Fn(&RowScope<'_>) -> Value + Send + Sync>;

// =============================================================================
// Column options
// =============================================================================

/// Default value of a column: a constant or a thunk evaluated per row.
#[derive(Clone)]
pub enum DefaultValue {
    Static(Value),
    Thunk(DefaultFn),
}

impl DefaultValue {
    pub fn resolve(&self, scope: &RowScope<'_>) -> Value {
        match self {
            DefaultValue::Static(value) => value.clone(),
            DefaultValue::Thunk(thunk) => thunk(scope),
        }
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::Static(value) => f.debug_tuple("Static").field(value).finish(),
            DefaultValue::Thunk(_) => f.write_str("Thunk(..)"),
        }
    }
}

/// Options of a column declaration.
#[derive(Clone, Default)]
pub struct ColumnOptions {
    /// Built-in coercion target.
    pub column_type: Option<ColumnType>,
    /// Custom parser, exclusive with `column_type`.
    pub parse: Option<ParseFn>,
    /// Register a format check for `column_type` on the cell model.
    pub validate_type: bool,
    /// Substituted when the formatted cell is blank.
    pub default: Option<DefaultValue>,
    /// Human friendly header, defaults to the humanized column name.
    pub header: Option<String>,
    /// Header cells identifying this column.
    pub header_matches: Vec<String>,
}

impl fmt::Debug for ColumnOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnOptions")
            .field("column_type", &self.column_type)
            .field("parse", &self.parse.as_ref().map(|_| ".."))
            .field("validate_type", &self.validate_type)
            .field("default", &self.default)
            .field("header", &self.header)
            .field("header_matches", &self.header_matches)
            .finish()
    }
}

impl ColumnOptions {
    pub fn new() -> Self {
        <Self as Default>::default()
    }

    pub fn of_type(mut self, column_type: ColumnType) -> Self {
        self.column_type = Some(column_type);
        self
    }

    pub fn parse<F>(mut self, parse: F) -> Self
    where
        F: Fn(&str, &RowScope<'_>) -> Value + Send + Sync + 'static,
    {
        self.parse = Some(Arc::new(parse));
        self
    }

    pub fn validate_type(mut self) -> Self {
        self.validate_type = true;
        self
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(DefaultValue::Static(value.into()));
        self
    }

    pub fn default_with<F>(mut self, thunk: F) -> Self
    where
        F: Fn(&RowScope<'_>) -> Value + Send + Sync + 'static,
    {
        self.default = Some(DefaultValue::Thunk(Arc::new(thunk)));
        self
    }

    pub fn header(mut self, header: impl Into<String>) -> Self {
        self.header = Some(header.into());
        self
    }

    pub fn header_matches<I, S>(mut self, matches: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.header_matches = matches.into_iter().map(Into::into).collect();
        self
    }

    /// Reads the map form of a declaration (model definition files).
    ///
    /// Unknown keys and unknown type names are configuration errors. Parse
    /// functions can only be given in code.
    pub fn from_map(column: &str, options: &Map<String, serde_json::Value>) -> ConfigResult<Self> {
        let mut extra: Vec<String> = options
            .keys()
            .filter(|k| !VALID_OPTION_KEYS.contains(&k.as_str()))
            .cloned()
            .collect();
        if !extra.is_empty() {
            extra.sort();
            return Err(ConfigError::UnknownOption {
                column: column.to_string(),
                keys: extra,
            });
        }
        if options.contains_key("type") && options.contains_key("parse") {
            return Err(ConfigError::TypeAndParse(column.to_string()));
        }
        if options.contains_key("parse") {
            return Err(ConfigError::InvalidOption {
                column: column.to_string(),
                option: "parse".into(),
            });
        }

        let invalid = |option: &str| ConfigError::InvalidOption {
            column: column.to_string(),
            option: option.to_string(),
        };

        let mut parsed = ColumnOptions::new();
        if let Some(type_name) = options.get("type") {
            let type_name = type_name.as_str().ok_or_else(|| invalid("type"))?;
            let column_type = type_name
                .parse::<ColumnType>()
                .map_err(|type_name| ConfigError::UnsupportedType {
                    column: column.to_string(),
                    type_name,
                })?;
            parsed.column_type = Some(column_type);
        }
        if let Some(flag) = options.get("validate_type") {
            parsed.validate_type = flag.as_bool().ok_or_else(|| invalid("validate_type"))?;
        }
        if let Some(default) = options.get("default") {
            parsed.default = Some(DefaultValue::Static(Value::from_json(default)));
        }
        if let Some(header) = options.get("header") {
            parsed.header = Some(header.as_str().ok_or_else(|| invalid("header"))?.to_string());
        }
        if let Some(matches) = options.get("header_matches") {
            let matches = matches.as_array().ok_or_else(|| invalid("header_matches"))?;
            parsed.header_matches = matches
                .iter()
                .map(|m| m.as_str().map(String::from).ok_or_else(|| invalid("header_matches")))
                .collect::<ConfigResult<_>>()?;
        }
        Ok(parsed)
    }

    /// Overlays the options that `other` sets.
    fn merge(&mut self, other: ColumnOptions) {
        if other.column_type.is_some() {
            self.column_type = other.column_type;
        }
        if other.parse.is_some() {
            self.parse = other.parse;
        }
        self.validate_type |= other.validate_type;
        if other.default.is_some() {
            self.default = other.default;
        }
        if other.header.is_some() {
            self.header = other.header;
        }
        if !other.header_matches.is_empty() {
            self.header_matches = other.header_matches;
        }
    }

    fn check(&self, column: &str) -> ConfigResult<()> {
        if self.column_type.is_some() && self.parse.is_some() {
            return Err(ConfigError::TypeAndParse(column.to_string()));
        }
        if self.validate_type && !self.column_type.is_some_and(|t| t.has_format_check()) {
            return Err(ConfigError::UnsupportedType {
                column: column.to_string(),
                type_name: self.column_type.map_or("none", |t| t.name()).to_string(),
            });
        }
        Ok(())
    }
}

// =============================================================================
// Column
// =============================================================================

/// A declared column.
#[derive(Debug, Clone)]
pub struct Column {
    name: String,
    options: ColumnOptions,
}

impl Column {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &ColumnOptions {
        &self.options
    }

    pub fn column_type(&self) -> Option<ColumnType> {
        self.options.column_type
    }

    pub fn parser(&self) -> Option<&ParseFn> {
        self.options.parse.as_ref()
    }

    pub fn default_value(&self) -> Option<&DefaultValue> {
        self.options.default.as_ref()
    }

    /// The type whose format is checked on the cell model, if any.
    pub fn format_check(&self) -> Option<ColumnType> {
        self.column_type()
            .filter(|t| self.options.validate_type && t.has_format_check())
    }

    pub fn header(&self) -> String {
        self.options.header.clone().unwrap_or_else(|| humanize(&self.name))
    }

    pub fn matches_header(&self, cell: &str) -> bool {
        let cell = cell.trim();
        if self.options.header_matches.is_empty() {
            cell.eq_ignore_ascii_case(&self.name) || cell.eq_ignore_ascii_case(&self.header())
        } else {
            self.options
                .header_matches
                .iter()
                .any(|m| cell.eq_ignore_ascii_case(m.trim()))
        }
    }
}

// =============================================================================
// Schema
// =============================================================================

/// Frozen, ordered column list of a row model.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    columns: Vec<Column>,
    dynamic_columns: Vec<String>,
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::new()
    }

    /// Column names in declaration order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Positional index of a column.
    pub fn index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn headers(&self) -> Vec<String> {
        self.columns.iter().map(Column::header).collect()
    }

    pub fn dynamic_column_names(&self) -> Vec<&str> {
        self.dynamic_columns.iter().map(String::as_str).collect()
    }

    /// For each column, the position of its header cell in `header_row`.
    pub fn header_positions(&self, header_row: &[Option<String>]) -> Vec<Option<usize>> {
        self.columns
            .iter()
            .map(|column| {
                header_row
                    .iter()
                    .position(|cell| cell.as_deref().is_some_and(|c| column.matches_header(c)))
            })
            .collect()
    }

    /// Columns whose header is not at their positional index.
    pub fn header_mismatches(&self, header_row: &[Option<String>]) -> Vec<String> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(i, column)| {
                !header_row
                    .get(*i)
                    .and_then(|cell| cell.as_deref())
                    .is_some_and(|c| column.matches_header(c))
            })
            .map(|(_, column)| column.name.clone())
            .collect()
    }
}

/// Builds a [`Schema`], resolving inheritance once.
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    columns: Vec<Column>,
    dynamic_columns: Vec<String>,
    error: Option<ConfigError>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the builder with an ancestor's columns.
    ///
    /// Call once per ancestor, oldest first. Later declarations with the same
    /// name replace the ancestor's options but keep its position.
    pub fn inherit(mut self, parent: &Schema) -> Self {
        for column in &parent.columns {
            self.upsert(column.clone());
        }
        for name in &parent.dynamic_columns {
            if !self.dynamic_columns.contains(name) {
                self.dynamic_columns.push(name.clone());
            }
        }
        self
    }

    /// Chaining form of [`SchemaBuilder::declare_column`]; the first error is
    /// returned by [`SchemaBuilder::build`].
    pub fn column(mut self, name: impl Into<String>, options: ColumnOptions) -> Self {
        if let Err(err) = self.declare_column(name, options) {
            self.error.get_or_insert(err);
        }
        self
    }

    pub fn declare_column(&mut self, name: impl Into<String>, options: ColumnOptions) -> ConfigResult<()> {
        let name = name.into();
        options.check(&name)?;
        if self.dynamic_columns.contains(&name) {
            return Err(ConfigError::DuplicateColumn(name));
        }
        self.upsert(Column { name, options });
        Ok(())
    }

    /// Declares a column from its map form.
    pub fn declare_column_map(&mut self, name: &str, options: &Map<String, serde_json::Value>) -> ConfigResult<()> {
        let options = ColumnOptions::from_map(name, options)?;
        self.declare_column(name, options)
    }

    /// Merges options into an already declared column.
    pub fn merge_options(&mut self, name: &str, options: ColumnOptions) -> ConfigResult<()> {
        let column = self
            .columns
            .iter_mut()
            .find(|c| c.name == name)
            .ok_or_else(|| ConfigError::UnknownColumn(name.to_string()))?;
        let mut merged = column.options.clone();
        merged.merge(options);
        merged.check(name)?;
        column.options = merged;
        Ok(())
    }

    /// Declares a dynamic column spanning the cells after the fixed columns.
    pub fn dynamic_column(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if self.columns.iter().any(|c| c.name == name) || self.dynamic_columns.contains(&name) {
            self.error.get_or_insert(ConfigError::DuplicateColumn(name));
        } else {
            self.dynamic_columns.push(name);
        }
        self
    }

    pub fn build(self) -> ConfigResult<Schema> {
        if let Some(err) = self.error {
            return Err(err);
        }
        Ok(Schema {
            columns: self.columns,
            dynamic_columns: self.dynamic_columns,
        })
    }

    fn upsert(&mut self, column: Column) {
        match self.columns.iter_mut().find(|c| c.name == column.name) {
            Some(existing) => *existing = column,
            None => self.columns.push(column),
        }
    }
}
