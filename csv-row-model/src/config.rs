//! JSON model definitions.
//!
//! A model file declares columns in the map form accepted by
//! [`ColumnOptions::from_map`](crate::schema::ColumnOptions::from_map), plus
//! rules, warnings and how child rows are recognized:
//!
//! ```json
//! {
//!   "name": "users",
//!   "columns": [
//!     { "name": "id", "type": "Integer", "validate_type": true },
//!     { "name": "email", "header": "E-mail" },
//!     { "name": "role", "default": "member" }
//!   ],
//!   "rules": [{ "column": "email", "rule": "format", "pattern": "@" }],
//!   "warnings": [{ "column": "role", "rule": "default_change" }],
//!   "child_when_blank": "id"
//! }
//! ```
//!
//! Files are checked against the embedded Draft 7 schema
//! (`schemas/row-model.json`) before they are converted.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;

use crate::error::{ConfigError, ConfigResult};
use crate::model::{ImportModel, RawRow, Row};
use crate::schema::ColumnType;
use crate::validation::Rule;

static MODEL_SCHEMA: Lazy<Result<Value, String>> = Lazy::new(|| {
    serde_json::from_str(include_str!("../schemas/row-model.json")).map_err(|e| e.to_string())
});

/// A model file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDefinition {
    pub name: String,

    /// Column declarations: `name` plus column options.
    pub columns: Vec<Map<String, Value>>,

    #[serde(default)]
    pub dynamic_columns: Vec<String>,

    /// Row-level error rules
    #[serde(default)]
    pub rules: Vec<RuleDefinition>,

    /// Row-level warning rules
    #[serde(default)]
    pub warnings: Vec<RuleDefinition>,

    /// Rules on the formatted cells
    #[serde(default)]
    pub cell_rules: Vec<RuleDefinition>,

    #[serde(default)]
    pub cell_warnings: Vec<RuleDefinition>,

    /// Rows where this column is blank belong to the previous row.
    #[serde(default)]
    pub child_when_blank: Option<String>,
}

/// A rule on one column
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleDefinition {
    pub column: String,

    #[serde(flatten)]
    pub check: CheckDefinition,

    #[serde(default)]
    pub allow_blank: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum CheckDefinition {
    Presence,
    Length {
        #[serde(default)]
        min: Option<usize>,
        #[serde(default)]
        max: Option<usize>,
    },
    Format {
        pattern: String,
    },
    Inclusion {
        values: Vec<String>,
    },
    TypeFormat {
        #[serde(rename = "type")]
        column_type: ColumnType,
    },
    DefaultChange,
}

impl RuleDefinition {
    pub fn to_rule(&self) -> ConfigResult<Rule> {
        let column = self.column.as_str();
        let rule = match &self.check {
            CheckDefinition::Presence => Rule::presence(column),
            CheckDefinition::Length { min, max } => Rule::length(column, *min, *max),
            CheckDefinition::Format { pattern } => Rule::format(column, pattern)?,
            CheckDefinition::Inclusion { values } => Rule::inclusion(column, values.iter().cloned()),
            CheckDefinition::TypeFormat { column_type } => Rule::type_format(column, *column_type),
            CheckDefinition::DefaultChange => Rule::default_change(column),
        };
        Ok(if self.allow_blank { rule.allow_blank() } else { rule })
    }
}

impl ModelDefinition {
    /// Converts the definition into a frozen model.
    pub fn build(&self) -> ConfigResult<Arc<ImportModel>> {
        let mut builder = ImportModel::builder(self.name.clone());
        let mut names: Vec<String> = Vec::new();

        for column in &self.columns {
            let mut options = column.clone();
            let name = options
                .remove("name")
                .and_then(|n| n.as_str().map(String::from))
                .ok_or_else(|| ConfigError::InvalidDefinition {
                    errors: vec![format!("column without a name in model '{}'", self.name)],
                })?;
            builder.schema_mut().declare_column_map(&name, &options)?;
            if !names.contains(&name) {
                names.push(name);
            }
        }
        for name in &self.dynamic_columns {
            builder = builder.dynamic_column(name.clone());
        }

        for rule in &self.rules {
            builder.add_rule(rule.to_rule()?);
        }
        for rule in &self.warnings {
            builder.add_warning(rule.to_rule()?);
        }
        for rule in &self.cell_rules {
            builder.add_cell_rule(rule.to_rule()?);
        }
        for rule in &self.cell_warnings {
            builder.add_cell_warning(rule.to_rule()?);
        }

        if let Some(column) = &self.child_when_blank {
            let index = names
                .iter()
                .position(|name| name == column)
                .ok_or_else(|| ConfigError::UnknownColumn(column.clone()))?;
            builder.set_children_when(Arc::new(move |_: &Row, raw: &RawRow| {
                raw.get(index)
                    .and_then(|cell| cell.as_deref())
                    .map_or(true, |cell| cell.trim().is_empty())
            }));
        }

        builder.build()
    }
}

/// Validates a JSON value against a JSON schema.
///
/// # Returns
/// * `Ok(())` if valid
/// * `Err(Vec<String>)` with every violation otherwise
pub fn validate(schema: &Value, data: &Value) -> Result<(), Vec<String>> {
    let validator = jsonschema::draft7::new(schema)
        .map_err(|e| vec![format!("invalid schema: {}", e)])?;

    let errors: Vec<String> = validator
        .iter_errors(data)
        .map(|e| e.to_string())
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Checks a model file against the embedded model schema.
pub fn validate_definition(data: &Value) -> ConfigResult<()> {
    let schema = MODEL_SCHEMA.as_ref().map_err(|e| ConfigError::InvalidDefinition {
        errors: vec![format!("embedded model schema: {}", e)],
    })?;
    validate(schema, data).map_err(|errors| ConfigError::InvalidDefinition { errors })
}

/// Reads and checks a definition without building it.
pub fn parse_definition(json: &str) -> ConfigResult<ModelDefinition> {
    let value: Value = serde_json::from_str(json)?;
    validate_definition(&value)?;
    Ok(serde_json::from_value(value)?)
}

/// Builds a model from JSON text.
pub fn parse_model(json: &str) -> ConfigResult<Arc<ImportModel>> {
    parse_definition(json)?.build()
}

/// Builds a model from a JSON file.
pub fn load_model(path: &Path) -> ConfigResult<Arc<ImportModel>> {
    let content = std::fs::read_to_string(path)?;
    parse_model(&content)
}
