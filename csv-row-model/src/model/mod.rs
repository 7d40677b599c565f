//! Row model definitions.
//!
//! An [`ImportModel`] is the immutable description of one kind of CSV row:
//! its [`Schema`], the cell-level and row-level rule sets, formatting hooks,
//! per-column attribute overrides, the presenter deciding skip/abort, and
//! how child rows are recognized. Models are built once with
//! [`ImportModelBuilder`] and shared through `Arc` by every [`Row`] they
//! produce.
//!
//! ```rust,ignore
//! let model = ImportModel::builder("users")
//!     .column("id", ColumnOptions::new().of_type(ColumnType::Integer).validate_type())
//!     .column("name", ColumnOptions::new())
//!     .validates(Rule::presence("name"))
//!     .build()?;
//! let row = Row::from_cells(&model, ["1", "Ada"]);
//! assert!(row.is_valid());
//! ```

pub mod attribute;
pub mod capabilities;
pub mod row;

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::error::{ConfigError, ConfigResult};
use crate::schema::{ColumnOptions, Schema, SchemaBuilder};
use crate::validation::{Rule, RuleSet};
use crate::value::{Context, Value};

pub use attribute::Attribute;
pub use capabilities::{DefaultChange, HasColumns, HasDefaults, HasValidation};
pub use row::{raw_row, CellModel, DynamicCell, RawRow, Row, RowOptions, RowScope};

/// `format_cell(cell, column_name, column_index, context)`.
pub type FormatCellFn = Arc<dyn Fn(Option<&str>, &str, usize, &Context) -> Option<String> + Send + Sync>;

/// `format_dynamic_column_header(header, column_name, start_index, offset, context)`.
pub type FormatHeaderFn =
    Arc<dyn Fn(Option<&str>, &str, usize, usize, &Context) -> Option<String> + Send + Sync>;

/// Replaces the value of one column in [`Row::attributes`](HasColumns::attributes).
pub type AttributeFn = Arc<dyn Fn(&Row) -> Value + Send + Sync>;

/// Decides whether a raw row is a child of the row being built.
pub type ChildPredicate = Arc<dyn Fn(&Row, &RawRow) -> bool + Send + Sync>;

/// Decides whether a row is skipped or ends the import.
pub trait Presenter: Send + Sync {
    fn skip(&self, _row: &Row) -> bool {
        false
    }

    fn abort(&self, _row: &Row) -> bool {
        false
    }
}

/// Presenter that never skips a valid row and never aborts.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultPresenter;

impl Presenter for DefaultPresenter {}

/// How the rows following a parent row are recognized as its children.
#[derive(Clone)]
pub enum ChildRule {
    /// Raw-row predicate evaluated against the parent.
    Predicate(ChildPredicate),
    /// A raw row is a child when it is a valid instance of this model.
    Model(Arc<ImportModel>),
}

impl fmt::Debug for ChildRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChildRule::Predicate(_) => f.write_str("Predicate(..)"),
            ChildRule::Model(model) => f.debug_tuple("Model").field(&model.name()).finish(),
        }
    }
}

// =============================================================================
// ImportModel
// =============================================================================

/// Immutable definition of a row model.
pub struct ImportModel {
    name: String,
    schema: Schema,
    format_cell: Option<FormatCellFn>,
    format_dynamic_header: Option<FormatHeaderFn>,
    declared_cell_rules: RuleSet,
    cell_rules: RuleSet,
    row_rules: RuleSet,
    overrides: Vec<(String, AttributeFn)>,
    presenter: Arc<dyn Presenter>,
    child_rule: Option<ChildRule>,
}

impl ImportModel {
    pub fn builder(name: impl Into<String>) -> ImportModelBuilder {
        ImportModelBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.schema.column_names()
    }

    pub fn headers(&self) -> Vec<String> {
        self.schema.headers()
    }

    /// Rules run on the formatted cells, including generated type checks.
    pub fn cell_rules(&self) -> &RuleSet {
        &self.cell_rules
    }

    /// Rules run on the final attribute values.
    pub fn row_rules(&self) -> &RuleSet {
        &self.row_rules
    }

    pub fn presenter(&self) -> &dyn Presenter {
        self.presenter.as_ref()
    }

    pub fn child_rule(&self) -> Option<&ChildRule> {
        self.child_rule.as_ref()
    }

    pub fn attribute_override(&self, column: &str) -> Option<&AttributeFn> {
        self.overrides.iter().find(|(name, _)| name == column).map(|(_, f)| f)
    }

    pub fn format_cell(&self, cell: Option<&str>, column: &str, index: usize, context: &Context) -> Option<String> {
        match &self.format_cell {
            Some(format) => format(cell, column, index, context),
            None => cell.map(String::from),
        }
    }

    pub fn format_dynamic_column_header(
        &self,
        header: Option<&str>,
        column: &str,
        start: usize,
        offset: usize,
        context: &Context,
    ) -> Option<String> {
        match &self.format_dynamic_header {
            Some(format) => format(header, column, start, offset, context),
            None => header.map(String::from),
        }
    }
}

impl fmt::Debug for ImportModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImportModel")
            .field("name", &self.name)
            .field("columns", &self.schema.column_names())
            .field("dynamic_columns", &self.schema.dynamic_column_names())
            .field("cell_rules", &self.cell_rules)
            .field("row_rules", &self.row_rules)
            .field("child_rule", &self.child_rule)
            .finish()
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builds an [`ImportModel`]. Errors are collected and reported by `build`.
pub struct ImportModelBuilder {
    name: String,
    schema: SchemaBuilder,
    format_cell: Option<FormatCellFn>,
    format_dynamic_header: Option<FormatHeaderFn>,
    cell_rules: RuleSet,
    row_rules: RuleSet,
    overrides: Vec<(String, AttributeFn)>,
    presenter: Option<Arc<dyn Presenter>>,
    child_rule: Option<ChildRule>,
    error: Option<ConfigError>,
}

impl ImportModelBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: SchemaBuilder::new(),
            format_cell: None,
            format_dynamic_header: None,
            cell_rules: RuleSet::new(),
            row_rules: RuleSet::new(),
            overrides: Vec::new(),
            presenter: None,
            child_rule: None,
            error: None,
        }
    }

    /// Inherits columns, rules, hooks and overrides of `parent`.
    ///
    /// Call before declaring the model's own columns; several ancestors are
    /// applied oldest first.
    pub fn inherit(mut self, parent: &ImportModel) -> Self {
        self.schema = self.schema.inherit(&parent.schema);
        self.cell_rules.extend(&parent.declared_cell_rules);
        self.row_rules.extend(&parent.row_rules);
        if parent.format_cell.is_some() {
            self.format_cell = parent.format_cell.clone();
        }
        if parent.format_dynamic_header.is_some() {
            self.format_dynamic_header = parent.format_dynamic_header.clone();
        }
        for (column, f) in &parent.overrides {
            self.set_override(column.clone(), f.clone());
        }
        self.presenter = Some(parent.presenter.clone());
        if parent.child_rule.is_some() {
            self.child_rule = parent.child_rule.clone();
        }
        self
    }

    pub fn column(mut self, name: impl Into<String>, options: ColumnOptions) -> Self {
        self.schema = self.schema.column(name, options);
        self
    }

    /// Non-chaining form of [`ImportModelBuilder::column`].
    pub fn declare_column(&mut self, name: impl Into<String>, options: ColumnOptions) -> ConfigResult<()> {
        self.schema.declare_column(name, options)
    }

    pub fn schema_mut(&mut self) -> &mut SchemaBuilder {
        &mut self.schema
    }

    pub fn merge_options(mut self, name: &str, options: ColumnOptions) -> Self {
        if let Err(err) = self.schema.merge_options(name, options) {
            self.error.get_or_insert(err);
        }
        self
    }

    pub fn dynamic_column(mut self, name: impl Into<String>) -> Self {
        self.schema = self.schema.dynamic_column(name);
        self
    }

    pub fn format_cell<F>(mut self, format: F) -> Self
    where
        F: Fn(Option<&str>, &str, usize, &Context) -> Option<String> + Send + Sync + 'static,
    {
        self.format_cell = Some(Arc::new(format));
        self
    }

    pub fn format_dynamic_column_header<F>(mut self, format: F) -> Self
    where
        F: Fn(Option<&str>, &str, usize, usize, &Context) -> Option<String> + Send + Sync + 'static,
    {
        self.format_dynamic_header = Some(Arc::new(format));
        self
    }

    /// Row-level error rule.
    pub fn validates(mut self, rule: Rule) -> Self {
        self.row_rules.add_error(rule);
        self
    }

    /// Row-level warning rule.
    pub fn warns(mut self, rule: Rule) -> Self {
        self.row_rules.add_warning(rule);
        self
    }

    /// Cell-level (formatted string) error rule.
    pub fn validates_cell(mut self, rule: Rule) -> Self {
        self.cell_rules.add_error(rule);
        self
    }

    /// Cell-level (formatted string) warning rule.
    pub fn warns_cell(mut self, rule: Rule) -> Self {
        self.cell_rules.add_warning(rule);
        self
    }

    pub fn add_rule(&mut self, rule: Rule) {
        self.row_rules.add_error(rule);
    }

    pub fn add_warning(&mut self, rule: Rule) {
        self.row_rules.add_warning(rule);
    }

    pub fn add_cell_rule(&mut self, rule: Rule) {
        self.cell_rules.add_error(rule);
    }

    pub fn add_cell_warning(&mut self, rule: Rule) {
        self.cell_rules.add_warning(rule);
    }

    /// Overrides the value `attributes()` reports for `column`.
    pub fn attribute<F>(mut self, column: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Row) -> Value + Send + Sync + 'static,
    {
        self.set_override(column.into(), Arc::new(f));
        self
    }

    pub fn presenter(mut self, presenter: impl Presenter + 'static) -> Self {
        self.presenter = Some(Arc::new(presenter));
        self
    }

    pub fn children_when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Row, &RawRow) -> bool + Send + Sync + 'static,
    {
        self.child_rule = Some(ChildRule::Predicate(Arc::new(predicate)));
        self
    }

    pub fn set_children_when(&mut self, predicate: ChildPredicate) {
        self.child_rule = Some(ChildRule::Predicate(predicate));
    }

    /// Rows that are valid instances of `child` belong to the preceding row.
    pub fn has_children(mut self, child: Arc<ImportModel>) -> Self {
        self.child_rule = Some(ChildRule::Model(child));
        self
    }

    /// Freezes the definition.
    ///
    /// Fails on the first collected declaration error, or when a rule or
    /// attribute override names a column that does not exist.
    pub fn build(self) -> ConfigResult<Arc<ImportModel>> {
        if let Some(err) = self.error {
            return Err(err);
        }
        let schema = self.schema.build()?;

        let known: HashSet<&str> = schema.column_names().into_iter().collect();
        for column in self.cell_rules.columns() {
            if !known.contains(column) {
                return Err(ConfigError::UnknownColumn(column.to_string()));
            }
        }
        for column in self.row_rules.columns() {
            if !known.contains(column) && column != "source_row" {
                return Err(ConfigError::UnknownColumn(column.to_string()));
            }
        }
        for (column, _) in &self.overrides {
            if !known.contains(column.as_str()) {
                return Err(ConfigError::UnknownColumn(column.clone()));
            }
        }

        let mut cell_rules = RuleSet::new();
        for column in schema.columns() {
            if let Some(column_type) = column.format_check() {
                cell_rules.add_error(Rule::type_format(column.name(), column_type));
            }
        }
        cell_rules.extend(&self.cell_rules);

        Ok(Arc::new(ImportModel {
            name: self.name,
            schema,
            format_cell: self.format_cell,
            format_dynamic_header: self.format_dynamic_header,
            declared_cell_rules: self.cell_rules,
            cell_rules,
            row_rules: self.row_rules,
            overrides: self.overrides,
            presenter: self.presenter.unwrap_or_else(|| Arc::new(DefaultPresenter)),
            child_rule: self.child_rule,
        }))
    }

    fn set_override(&mut self, column: String, f: AttributeFn) {
        match self.overrides.iter_mut().find(|(name, _)| *name == column) {
            Some(slot) => slot.1 = f,
            None => self.overrides.push((column, f)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnType;

    fn base() -> Arc<ImportModel> {
        ImportModel::builder("base")
            .column("string1", ColumnOptions::new())
            .column("string2", ColumnOptions::new())
            .validates(Rule::presence("string1"))
            .build()
            .unwrap()
    }

    #[test]
    fn test_type_checks_are_generated_for_validate_type() {
        let model = ImportModel::builder("typed")
            .column("id", ColumnOptions::new().of_type(ColumnType::Integer).validate_type())
            .column("name", ColumnOptions::new().of_type(ColumnType::String))
            .column("amount", ColumnOptions::new().of_type(ColumnType::Float))
            .build()
            .unwrap();
        let checked: Vec<&str> = model.cell_rules().errors().iter().map(Rule::column).collect();
        assert_eq!(checked, vec!["id"]);

        let result = ImportModel::builder("typed")
            .column("name", ColumnOptions::new().of_type(ColumnType::String).validate_type())
            .build();
        assert!(matches!(result, Err(ConfigError::UnsupportedType { .. })));
    }

    #[test]
    fn test_type_and_parse_fails_at_build() {
        let result = ImportModel::builder("bad")
            .column(
                "string1",
                ColumnOptions::new()
                    .of_type(ColumnType::Date)
                    .parse(|_, _| Value::from("haha")),
            )
            .build();
        let err = result.unwrap_err();
        assert_eq!(
            err.to_string(),
            "column 'string1': you need either :parse OR :type but not both of them"
        );
    }

    #[test]
    fn test_rules_on_unknown_columns_are_rejected() {
        let result = ImportModel::builder("bad")
            .column("a", ColumnOptions::new())
            .validates(Rule::presence("b"))
            .build();
        assert!(matches!(result, Err(ConfigError::UnknownColumn(ref c)) if c == "b"));

        let result = ImportModel::builder("bad")
            .column("a", ColumnOptions::new())
            .attribute("z", |_| Value::Nil)
            .build();
        assert!(matches!(result, Err(ConfigError::UnknownColumn(ref c)) if c == "z"));
    }

    #[test]
    fn test_inherit_keeps_parent_rules_and_columns() {
        let parent = base();
        let child = ImportModel::builder("child")
            .inherit(&parent)
            .column("string3", ColumnOptions::new())
            .column("string1", ColumnOptions::new().of_type(ColumnType::Integer).validate_type())
            .build()
            .unwrap();

        assert_eq!(child.column_names(), vec!["string1", "string2", "string3"]);
        assert_eq!(child.row_rules().errors().len(), 1);
        assert_eq!(child.cell_rules().errors().len(), 1);
        assert_eq!(parent.cell_rules().errors().len(), 0);

        let grandchild = ImportModel::builder("grandchild").inherit(&child).build().unwrap();
        assert_eq!(grandchild.cell_rules().errors().len(), 1);
    }

    #[test]
    fn test_format_hooks_default_to_identity() {
        let model = base();
        let context = Context::new();
        assert_eq!(model.format_cell(Some(" a "), "string1", 0, &context).as_deref(), Some(" a "));
        assert_eq!(model.format_cell(None, "string1", 0, &context), None);
        assert_eq!(
            model.format_dynamic_column_header(Some("h"), "skills", 2, 0, &context).as_deref(),
            Some("h")
        );
    }
}
