//! Cell/attribute resolution for one column of one row.

use serde::Serialize;

use super::capabilities::DefaultChange;
use super::row::{Row, RowScope};
use crate::value::Value;

/// Everything known about one cell of a row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attribute {
    pub column: String,
    /// Raw cell from the CSV row.
    pub source_value: Option<String>,
    /// Cell after the model's `format_cell` hook.
    pub formatted_value: Option<String>,
    /// Result of parse/coercion, before any default.
    pub parsed_value: Value,
    /// Set when the built-in coercion rejected the cell.
    pub coercion_error: Option<String>,
    /// The default substituted for a blank cell.
    pub default_value: Option<Value>,
    /// Final value; `Nil` when the cell has errors.
    pub value: Value,
}

impl Attribute {
    pub fn default_applied(&self) -> bool {
        self.default_value.is_some()
    }

    pub fn default_change(&self) -> Option<DefaultChange> {
        self.default_value
            .as_ref()
            .map(|default| (self.parsed_value.clone(), default.clone()))
    }
}

/// Resolves column `index` of `row`.
///
/// Order: raw cell, `format_cell`, parse/coerce, default when that result
/// is blank. A `parse` function sees every cell, blank ones included (as
/// `""` when the cell is missing); typed columns turn blank cells into
/// `Nil`. A cell with cell-model errors or a coercion error resolves to
/// `Nil`.
pub(crate) fn resolve(row: &Row, index: usize) -> Attribute {
    let column = &row.model().schema().columns()[index];
    let scope = RowScope::new(row, column.name());
    let source_value = row.source_cell(index).map(String::from);
    let formatted_value = row.formatted_cell(index).map(String::from);

    let cell = formatted_value.as_deref();
    let (parsed_value, coercion_error) = if let Some(parse) = column.parser() {
        (parse(cell.unwrap_or_default(), &scope), None)
    } else if let Some(column_type) = column.column_type() {
        match cell.filter(|c| !c.trim().is_empty()) {
            None => (Value::Nil, None),
            Some(cell) => match column_type.coerce(cell) {
                Ok(value) => (value, None),
                Err(err) => (Value::Nil, Some(err.to_string())),
            },
        }
    } else {
        (Value::from_cell(cell), None)
    };

    let default_value = match column.default_value() {
        Some(default) if coercion_error.is_none() && parsed_value.is_blank() => {
            Some(default.resolve(&scope))
        }
        _ => None,
    };

    let has_cell_errors = row.cell_errors().has(column.name());
    let value = if has_cell_errors || coercion_error.is_some() {
        Value::Nil
    } else {
        default_value.clone().unwrap_or_else(|| parsed_value.clone())
    };

    Attribute {
        column: column.name().to_string(),
        source_value,
        formatted_value,
        parsed_value,
        coercion_error,
        default_value,
        value,
    }
}
