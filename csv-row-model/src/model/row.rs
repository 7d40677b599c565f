//! Row model instances.

use once_cell::unsync::OnceCell;
use serde::{Serialize, Serializer};
use std::cell::RefCell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use super::attribute::{self, Attribute};
use super::capabilities::{DefaultChange, HasColumns, HasDefaults, HasValidation};
use super::{ChildRule, ImportModel};
use crate::validation::{Messages, ValidationResult};
use crate::value::{Attributes, Context, OrderedMap, Value};

/// One physical CSV row; `None` is an empty cell.
pub type RawRow = Vec<Option<String>>;

/// Builds a raw row where every cell is present.
pub fn raw_row<I, S>(cells: I) -> RawRow
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    cells.into_iter().map(|c| Some(c.as_ref().to_string())).collect()
}

/// Construction options of a [`Row`].
#[derive(Debug, Clone, Default)]
pub struct RowOptions {
    /// Position of the row in the source, header excluded.
    pub index: Option<usize>,
    pub source_header: Option<Arc<RawRow>>,
    pub context: Arc<Context>,
    /// The previously read row; its own `previous` is released.
    pub previous: Option<Row>,
    pub is_child: bool,
}

/// A trailing cell of a dynamic column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DynamicCell {
    pub header: Option<String>,
    pub value: Option<String>,
}

// =============================================================================
// Row
// =============================================================================

/// An instance of an [`ImportModel`] over one source row and its children.
///
/// Formatted cells, cell-model errors and attributes are computed lazily and
/// memoized; validation is re-run on every call.
#[derive(Clone)]
pub struct Row {
    model: Arc<ImportModel>,
    source_row: Option<RawRow>,
    source_header: Option<Arc<RawRow>>,
    index: Option<usize>,
    context: Arc<Context>,
    previous: Option<Box<Row>>,
    is_child: bool,
    children: Vec<RawRow>,
    formatted: OnceCell<Vec<Option<String>>>,
    cell_errors: OnceCell<Messages>,
    attributes: Vec<OnceCell<Attribute>>,
    resolving: RefCell<Vec<bool>>,
}

impl Row {
    pub fn new(model: Arc<ImportModel>, source_row: Option<RawRow>, options: RowOptions) -> Self {
        let width = model.schema().len();
        let previous = options.previous.map(|mut previous| {
            previous.free_previous();
            Box::new(previous)
        });
        Self {
            model,
            source_row,
            source_header: options.source_header,
            index: options.index,
            context: options.context,
            previous,
            is_child: options.is_child,
            children: Vec::new(),
            formatted: OnceCell::new(),
            cell_errors: OnceCell::new(),
            attributes: (0..width).map(|_| OnceCell::new()).collect(),
            resolving: RefCell::new(vec![false; width]),
        }
    }

    /// Row over present cells with default options.
    pub fn from_cells<I, S>(model: &Arc<ImportModel>, cells: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::new(model.clone(), Some(raw_row(cells)), RowOptions::default())
    }

    pub fn model(&self) -> &Arc<ImportModel> {
        &self.model
    }

    pub fn source_row(&self) -> Option<&RawRow> {
        self.source_row.as_ref()
    }

    pub fn source_header(&self) -> Option<&RawRow> {
        self.source_header.as_deref()
    }

    pub fn index(&self) -> Option<usize> {
        self.index
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn previous(&self) -> Option<&Row> {
        self.previous.as_deref()
    }

    /// Drops the reference to the previous row.
    pub fn free_previous(&mut self) {
        self.previous = None;
    }

    pub fn is_child(&self) -> bool {
        self.is_child
    }

    /// Raw rows appended as children.
    pub fn children(&self) -> &[RawRow] {
        &self.children
    }

    pub(crate) fn source_cell(&self, index: usize) -> Option<&str> {
        self.source_row.as_ref()?.get(index)?.as_deref()
    }

    fn formatted_cells(&self) -> &[Option<String>] {
        self.formatted.get_or_init(|| {
            self.model
                .schema()
                .columns()
                .iter()
                .enumerate()
                .map(|(i, column)| {
                    self.model
                        .format_cell(self.source_cell(i), column.name(), i, &self.context)
                })
                .collect()
        })
    }

    pub(crate) fn formatted_cell(&self, index: usize) -> Option<&str> {
        self.formatted_cells().get(index)?.as_deref()
    }

    /// The formatted-string view validated by the cell rules.
    pub fn cell_model(&self) -> CellModel<'_> {
        CellModel { row: self }
    }

    pub(crate) fn cell_errors(&self) -> &Messages {
        self.cell_errors
            .get_or_init(|| self.model.cell_rules().validate(&self.cell_model()).errors)
    }

    /// Resolved attribute of a column, `None` for unknown columns.
    pub fn attribute_object(&self, column: &str) -> Option<&Attribute> {
        let index = self.model.schema().index(column)?;
        self.attribute_at(index)
    }

    pub fn attribute_objects(&self) -> Vec<&Attribute> {
        (0..self.attributes.len()).filter_map(|i| self.attribute_at(i)).collect()
    }

    /// Resolves once; a lookup re-entering a column being resolved gets `None`.
    fn attribute_at(&self, index: usize) -> Option<&Attribute> {
        let cell = self.attributes.get(index)?;
        if let Some(resolved) = cell.get() {
            return Some(resolved);
        }
        if self.resolving.borrow()[index] {
            return None;
        }
        self.resolving.borrow_mut()[index] = true;
        let resolved = attribute::resolve(self, index);
        self.resolving.borrow_mut()[index] = false;
        let _ = cell.set(resolved);
        cell.get()
    }

    /// Value after parsing and defaults, ignoring attribute overrides.
    pub fn original_attribute(&self, column: &str) -> Value {
        self.attribute_object(column)
            .map(|a| a.value.clone())
            .unwrap_or_default()
    }

    pub fn original_attributes(&self) -> Attributes {
        self.model
            .schema()
            .column_names()
            .into_iter()
            .map(|column| (column, self.original_attribute(column)))
            .collect()
    }

    /// Cells after `format_cell`.
    pub fn formatted_attributes(&self) -> OrderedMap<Option<String>> {
        self.model
            .schema()
            .column_names()
            .into_iter()
            .zip(self.formatted_cells().iter().cloned())
            .collect()
    }

    /// Raw cells keyed by column; empty when there is no source row.
    pub fn mapped_row(&self) -> OrderedMap<Option<String>> {
        if self.source_row.is_none() {
            return OrderedMap::new();
        }
        self.source_attributes()
    }

    /// Raw cells keyed by column, `None` past the end of the row.
    pub fn source_attributes(&self) -> OrderedMap<Option<String>> {
        self.model
            .schema()
            .column_names()
            .into_iter()
            .enumerate()
            .map(|(i, column)| (column, self.source_cell(i).map(String::from)))
            .collect()
    }

    /// The attribute map as JSON.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }

    /// Trailing cells of every dynamic column, with their headers.
    pub fn dynamic_attributes(&self) -> OrderedMap<Vec<DynamicCell>> {
        let schema = self.model.schema();
        let row_len = self.source_row.as_ref().map_or(0, Vec::len);
        let mut start = schema.len();
        let mut dynamic = OrderedMap::new();

        for name in schema.dynamic_column_names() {
            let declared = self.context.get(name).and_then(|v| v.as_array());
            let width = declared.map_or_else(|| row_len.saturating_sub(start), Vec::len);
            let cells = (0..width)
                .map(|offset| {
                    let index = start + offset;
                    let header = self
                        .source_header
                        .as_ref()
                        .and_then(|h| h.get(index).cloned().flatten())
                        .or_else(|| {
                            declared
                                .and_then(|items| items.get(offset))
                                .and_then(|item| item.as_str().map(String::from))
                        });
                    DynamicCell {
                        header: self.model.format_dynamic_column_header(
                            header.as_deref(),
                            name,
                            start,
                            offset,
                            &self.context,
                        ),
                        value: self
                            .model
                            .format_cell(self.source_cell(index), name, index, &self.context),
                    }
                })
                .collect();
            dynamic.insert(name, cells);
            start += width;
        }
        dynamic
    }

    /// Invalid rows and rows the presenter rejects are skipped.
    pub fn skip(&self) -> bool {
        !self.is_valid() || self.model.presenter().skip(self)
    }

    pub fn abort(&self) -> bool {
        self.model.presenter().abort(self)
    }

    /// Appends `candidate` when it is a child of this row.
    pub fn append_child(&mut self, candidate: &RawRow) -> bool {
        let accepted = match self.model.child_rule() {
            None => false,
            Some(ChildRule::Predicate(is_child)) => is_child(self, candidate),
            Some(ChildRule::Model(child_model)) => {
                self.child_row(child_model.clone(), candidate.clone()).is_valid()
            }
        };
        if accepted {
            self.children.push(candidate.clone());
        }
        accepted
    }

    /// Children as row instances of the child model (or of this model).
    pub fn child_rows(&self) -> Vec<Row> {
        let model = match self.model.child_rule() {
            Some(ChildRule::Model(child_model)) => child_model.clone(),
            _ => self.model.clone(),
        };
        self.children
            .iter()
            .map(|raw| self.child_row(model.clone(), raw.clone()))
            .collect()
    }

    fn child_row(&self, model: Arc<ImportModel>, raw: RawRow) -> Row {
        Row::new(
            model,
            Some(raw),
            RowOptions {
                index: None,
                source_header: self.source_header.clone(),
                context: self.context.clone(),
                previous: None,
                is_child: true,
            },
        )
    }
}

impl HasColumns for Row {
    fn column_names(&self) -> Vec<&str> {
        self.model.schema().column_names()
    }

    /// Final value: the model's attribute override, else the original value.
    fn attribute(&self, column: &str) -> Value {
        match self.model.attribute_override(column) {
            Some(f) => f(self),
            None => self.original_attribute(column),
        }
    }
}

impl HasDefaults for Row {
    fn default_change(&self, column: &str) -> Option<DefaultChange> {
        self.attribute_object(column)?.default_change()
    }
}

impl HasValidation for Row {
    fn validation_result(&self) -> ValidationResult {
        let mut inner = self.cell_model().validation_result();
        for (i, column) in self.model.schema().columns().iter().enumerate() {
            if inner.errors.has(column.name()) {
                continue;
            }
            if let Some(error) = self.attribute_at(i).and_then(|a| a.coercion_error.clone()) {
                inner.errors.add(column.name(), error);
            }
        }

        let mut outer = ValidationResult::default();
        if self.source_row.as_ref().map_or(true, Vec::is_empty) {
            outer.errors.add("source_row", "can't be blank");
        }
        let rules = self.model.row_rules().validate(self);
        outer.errors.extend(rules.errors);
        outer.warnings.extend(rules.warnings);

        outer.merge_inner(&inner)
    }
}

impl PartialEq for Row {
    fn eq(&self, other: &Self) -> bool {
        self.attributes() == other.attributes()
    }
}

impl Eq for Row {}

impl Hash for Row {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.attributes().hash(state);
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.attributes().serialize(serializer)
    }
}

impl fmt::Debug for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Row")
            .field("model", &self.model.name())
            .field("index", &self.index)
            .field("mapped_row", &self.mapped_row())
            .field("context", &self.context)
            .field("is_child", &self.is_child)
            .field("previous", &self.previous.as_ref().map(|p| p.index))
            .finish()
    }
}

// =============================================================================
// Cell model
// =============================================================================

/// The formatted-string view of a row, validated before values are used.
pub struct CellModel<'a> {
    row: &'a Row,
}

impl HasColumns for CellModel<'_> {
    fn column_names(&self) -> Vec<&str> {
        self.row.model.schema().column_names()
    }

    fn attribute(&self, column: &str) -> Value {
        self.row
            .model
            .schema()
            .index(column)
            .map(|i| Value::from_cell(self.row.formatted_cell(i)))
            .unwrap_or_default()
    }
}

impl HasDefaults for CellModel<'_> {
    fn default_change(&self, _column: &str) -> Option<DefaultChange> {
        None
    }
}

impl HasValidation for CellModel<'_> {
    fn validation_result(&self) -> ValidationResult {
        self.row.model.cell_rules().validate(self)
    }
}

// =============================================================================
// Scope
// =============================================================================

/// What parse functions and default thunks can see of the row.
pub struct RowScope<'a> {
    row: &'a Row,
    column: &'a str,
}

impl<'a> RowScope<'a> {
    pub(crate) fn new(row: &'a Row, column: &'a str) -> Self {
        Self { row, column }
    }

    pub fn row(&self) -> &'a Row {
        self.row
    }

    /// Column being resolved.
    pub fn column(&self) -> &'a str {
        self.column
    }

    pub fn context(&self) -> &'a Context {
        self.row.context()
    }

    pub fn index(&self) -> Option<usize> {
        self.row.index()
    }

    /// Resolved value of another column.
    pub fn attribute(&self, column: &str) -> Value {
        self.row.original_attribute(column)
    }

    pub fn formatted(&self, column: &str) -> Option<&'a str> {
        let index = self.row.model.schema().index(column)?;
        self.row.formatted_cell(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnOptions, ColumnType};
    use crate::validation::Rule;
    use crate::model::Presenter;
    use proptest::prelude::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn basic() -> Arc<ImportModel> {
        ImportModel::builder("basic")
            .column("string1", ColumnOptions::new())
            .column("string2", ColumnOptions::new())
            .build()
            .unwrap()
    }

    fn cells(values: &[Option<&str>]) -> RawRow {
        values.iter().map(|v| v.map(String::from)).collect()
    }

    fn row(model: &Arc<ImportModel>, values: &[Option<&str>]) -> Row {
        Row::new(model.clone(), Some(cells(values)), RowOptions::default())
    }

    #[test]
    fn test_mapped_row() {
        let row = Row::from_cells(&basic(), ["1.01", "b"]);
        let expected: OrderedMap<Option<String>> = vec![
            ("string1", Some("1.01".to_string())),
            ("string2", Some("b".to_string())),
        ]
        .into_iter()
        .collect();
        assert_eq!(row.mapped_row(), expected);
        assert_eq!(row.attributes().get("string1"), Some(&Value::from("1.01")));
    }

    #[test]
    fn test_short_row_keeps_every_column() {
        let row = Row::from_cells(&basic(), ["a"]);
        assert_eq!(row.column_names(), vec!["string1", "string2"]);
        assert_eq!(row.attributes().get("string2"), Some(&Value::Nil));
        assert_eq!(row.mapped_row().get("string2"), Some(&None));
        assert_eq!(row.attribute("nope"), Value::Nil);
    }

    #[test]
    fn test_empty_row_is_invalid() {
        let model = basic();
        let empty = Row::new(model.clone(), Some(Vec::new()), RowOptions::default());
        assert!(!empty.is_valid());
        assert_eq!(empty.errors().full_messages(), vec!["Source row can't be blank"]);

        let missing = Row::new(model, None, RowOptions::default());
        assert!(!missing.is_valid());
        assert!(missing.mapped_row().is_empty());
    }

    #[test]
    fn test_format_cell_feeds_every_stage() {
        let model = ImportModel::builder("formatted")
            .column("string1", ColumnOptions::new())
            .format_cell(|cell, column, index, _| cell.map(|c| format!("{}-{}-{}", c, column, index)))
            .build()
            .unwrap();
        let row = Row::from_cells(&model, ["a"]);
        assert_eq!(row.original_attribute("string1"), Value::from("a-string1-0"));
        assert_eq!(
            row.formatted_attributes().get("string1"),
            Some(&Some("a-string1-0".to_string()))
        );
        assert_eq!(row.mapped_row().get("string1"), Some(&Some("a".to_string())));
    }

    #[test]
    fn test_parse_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let model = ImportModel::builder("parsed")
            .column(
                "string1",
                ColumnOptions::new().parse(move |cell, _| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Value::from(format!("{}!", cell))
                }),
            )
            .build()
            .unwrap();
        let row = Row::from_cells(&model, ["a"]);
        assert_eq!(row.original_attribute("string1"), Value::from("a!"));
        assert_eq!(row.original_attribute("string1"), Value::from("a!"));
        assert!(row.is_valid());
        let _ = row.attributes();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_parse_sees_blank_cells_and_context() {
        let model = ImportModel::builder("parsed")
            .column(
                "amount",
                ColumnOptions::new().parse(|cell, scope| {
                    let rate = scope.context().get("rate").and_then(|r| r.as_f64()).unwrap_or(1.0);
                    cell.parse::<f64>().map(|v| Value::Float(v * rate)).unwrap_or_default()
                }),
            )
            .build()
            .unwrap();
        let context = json!({ "rate": 2.0 }).as_object().cloned().unwrap();
        let options = RowOptions {
            context: Arc::new(context),
            ..RowOptions::default()
        };
        let row = Row::new(model.clone(), Some(raw_row(["1.5"])), options);
        assert_eq!(row.original_attribute("amount"), Value::Float(3.0));

        let blank = Row::from_cells(&model, [""]);
        assert_eq!(blank.original_attribute("amount"), Value::Nil);
    }

    #[test]
    fn test_default_change() {
        let model = ImportModel::builder("defaults")
            .column("string1", ColumnOptions::new().default(123))
            .column("string2", ColumnOptions::new())
            .build()
            .unwrap();

        let defaulted = row(&model, &[None, Some("b")]);
        assert_eq!(defaulted.original_attribute("string1"), Value::Integer(123));
        let changes = defaulted.default_changes();
        assert_eq!(changes.get("string1"), Some(&(Value::Nil, Value::Integer(123))));
        assert_eq!(changes.len(), 1);

        let present = row(&model, &[Some("a"), Some("b")]);
        assert!(present.default_changes().is_empty());
        assert_eq!(present.original_attribute("string1"), Value::from("a"));
    }

    #[test]
    fn test_default_when_format_cell_blanks_the_value() {
        let model = ImportModel::builder("defaults")
            .column(
                "string1",
                ColumnOptions::new()
                    .parse(|cell, _| cell.parse::<f64>().map(Value::Float).unwrap_or_default())
                    .default("123"),
            )
            .format_cell(|cell, _, _, _| cell.filter(|c| *c != "blank").map(String::from))
            .build()
            .unwrap();
        assert_eq!(Row::from_cells(&model, ["blank"]).original_attribute("string1"), Value::from("123"));
        assert_eq!(Row::from_cells(&model, ["123"]).original_attribute("string1"), Value::Float(123.0));
    }

    #[test]
    fn test_default_thunk_reads_other_columns() {
        let model = ImportModel::builder("defaults")
            .column("string1", ColumnOptions::new())
            .column("string2", ColumnOptions::new().default_with(|scope| scope.attribute("string1")))
            .build()
            .unwrap();
        let row = row(&model, &[Some("a"), None]);
        assert_eq!(row.original_attribute("string2"), Value::from("a"));
    }

    #[test]
    fn test_cyclic_defaults_resolve_to_nil() {
        let model = ImportModel::builder("cycle")
            .column("a", ColumnOptions::new().default_with(|scope| scope.attribute("b")))
            .column("b", ColumnOptions::new().default_with(|scope| scope.attribute("a")))
            .build()
            .unwrap();
        let row = row(&model, &[None, None]);
        assert_eq!(row.original_attribute("a"), Value::Nil);
    }

    #[test]
    fn test_type_coercion() {
        let model = ImportModel::builder("typed")
            .column("flag", ColumnOptions::new().of_type(ColumnType::Boolean))
            .column("count", ColumnOptions::new().of_type(ColumnType::Integer))
            .column("ratio", ColumnOptions::new().of_type(ColumnType::Float))
            .build()
            .unwrap();
        let row = Row::from_cells(&model, ["yes", "1.01", "1.01"]);
        assert_eq!(row.original_attribute("flag"), Value::Boolean(true));
        assert_eq!(row.original_attribute("count"), Value::Nil);
        assert_eq!(row.original_attribute("ratio"), Value::Float(1.01));
        assert_eq!(row.errors().get("count"), ["could not be parsed as Integer"]);
        assert_eq!(
            row.attribute_object("count").unwrap().coercion_error.as_deref(),
            Some("could not be parsed as Integer")
        );
    }

    #[test]
    fn test_blank_cells_in_typed_and_parsed_columns() {
        let model = ImportModel::builder("blanks")
            .column("n", ColumnOptions::new().of_type(ColumnType::Integer))
            .column("b", ColumnOptions::new().of_type(ColumnType::Boolean))
            .column("p", ColumnOptions::new().parse(|_, _| Value::Boolean(false)))
            .column("d", ColumnOptions::new().of_type(ColumnType::Integer).default(7))
            .build()
            .unwrap();
        let row = Row::from_cells(&model, ["  ", "", "", " "]);
        assert_eq!(row.attribute("n"), Value::Nil);
        assert_eq!(row.attribute("b"), Value::Nil);
        assert_eq!(row.attribute("p"), Value::Boolean(false));
        assert_eq!(row.attribute("d"), Value::Integer(7));
        assert_eq!(row.default_changes().get("d"), Some(&(Value::Nil, Value::Integer(7))));
        assert!(row.attribute_object("n").unwrap().coercion_error.is_none());
        assert!(row.is_valid());
    }

    #[test]
    fn test_validate_type_error_wins_over_coercion() {
        let model = ImportModel::builder("typed")
            .column("count", ColumnOptions::new().of_type(ColumnType::Integer).validate_type())
            .build()
            .unwrap();
        for (cell, valid) in [("123", true), ("123.0", true), ("123.45", false), ("", true)] {
            let row = Row::from_cells(&model, [cell]);
            assert_eq!(row.is_valid(), valid, "cell {:?}", cell);
        }
        let invalid = Row::from_cells(&model, ["123.45"]);
        assert_eq!(invalid.errors().get("count"), ["is not a Integer format"]);
        assert_eq!(invalid.original_attribute("count"), Value::Nil);
        assert_eq!(Row::from_cells(&model, ["123.0"]).original_attribute("count"), Value::Integer(123));
    }

    #[test]
    fn test_cell_errors_take_precedence() {
        let model = ImportModel::builder("validated")
            .column("id", ColumnOptions::new())
            .validates_cell(Rule::presence("id"))
            .validates(Rule::length("id", Some(5), None))
            .build()
            .unwrap();

        let short = Row::from_cells(&model, ["1.01"]);
        assert_eq!(short.errors().full_messages(), vec!["Id is too short (minimum is 5 characters)"]);

        let blank = Row::from_cells(&model, [""]);
        assert_eq!(blank.errors().full_messages(), vec!["Id can't be blank"]);
        assert_eq!(blank.original_attribute("id"), Value::Nil);
    }

    #[test]
    fn test_warnings_keep_row_valid() {
        let model = ImportModel::builder("warned")
            .column("id", ColumnOptions::new())
            .warns_cell(Rule::presence("id"))
            .warns(Rule::length("id", Some(5), None))
            .build()
            .unwrap();
        let row = Row::from_cells(&model, [""]);
        assert!(row.is_valid());
        assert!(!row.is_safe());
        assert_eq!(row.warnings().full_messages(), vec!["Id can't be blank"]);
    }

    #[test]
    fn test_default_change_warning() {
        let model = ImportModel::builder("warned")
            .column("string1", ColumnOptions::new().default("x"))
            .warns(Rule::default_change("string1"))
            .build()
            .unwrap();
        let row = row(&model, &[None]);
        assert!(row.is_valid());
        assert_eq!(row.warnings().full_messages(), vec!["String1 changed by default"]);
        assert!(Row::from_cells(&model, ["a"]).is_safe());
    }

    #[test]
    fn test_attribute_override() {
        let model = ImportModel::builder("override")
            .column("first", ColumnOptions::new())
            .column("last", ColumnOptions::new())
            .attribute("last", |row| {
                Value::from(row.original_attribute("last").to_text().unwrap_or_default().to_uppercase())
            })
            .build()
            .unwrap();
        let row = Row::from_cells(&model, ["ada", "lovelace"]);
        assert_eq!(row.attribute("last"), Value::from("LOVELACE"));
        assert_eq!(row.original_attribute("last"), Value::from("lovelace"));
        let attributes = row.attributes();
        assert_eq!(attributes.keys().collect::<Vec<_>>(), vec!["first", "last"]);
    }

    struct SkipFirstColumn(&'static str);

    impl Presenter for SkipFirstColumn {
        fn skip(&self, row: &Row) -> bool {
            row.attribute("string1") == Value::from(self.0)
        }

        fn abort(&self, row: &Row) -> bool {
            row.attribute("string1") == Value::from("stop")
        }
    }

    #[test]
    fn test_skip_and_abort() {
        let model = ImportModel::builder("presented")
            .column("string1", ColumnOptions::new())
            .validates(Rule::presence("string1"))
            .presenter(SkipFirstColumn("skip"))
            .build()
            .unwrap();
        assert!(!Row::from_cells(&model, ["keep"]).skip());
        assert!(Row::from_cells(&model, ["skip"]).skip());
        assert!(Row::from_cells(&model, [""]).skip());
        assert!(Row::from_cells(&model, ["stop"]).abort());
        assert!(!Row::from_cells(&basic(), ["a", "b"]).abort());
    }

    #[test]
    fn test_previous_is_released() {
        let model = basic();
        let first = Row::from_cells(&model, ["1", "a"]);
        let second = Row::new(
            model.clone(),
            Some(raw_row(["2", "b"])),
            RowOptions {
                previous: Some(first),
                ..RowOptions::default()
            },
        );
        let third = Row::new(
            model,
            Some(raw_row(["3", "c"])),
            RowOptions {
                previous: Some(second.clone()),
                ..RowOptions::default()
            },
        );
        assert!(second.previous().is_some());
        let previous = third.previous().unwrap();
        assert_eq!(previous.original_attribute("string1"), Value::from("2"));
        assert!(previous.previous().is_none());
    }

    #[test]
    fn test_children_by_predicate() {
        let model = ImportModel::builder("parent")
            .column("id", ColumnOptions::new())
            .column("item", ColumnOptions::new())
            .children_when(|_, raw| raw.first().map_or(true, |c| c.as_deref().map_or(true, str::is_empty)))
            .build()
            .unwrap();
        let mut parent = Row::from_cells(&model, ["1", "a"]);
        assert!(parent.append_child(&cells(&[None, Some("b")])));
        assert!(!parent.append_child(&raw_row(["2", "c"])));
        assert_eq!(parent.children().len(), 1);

        let children = parent.child_rows();
        assert!(children[0].is_child());
        assert_eq!(children[0].original_attribute("item"), Value::from("b"));
    }

    #[test]
    fn test_children_by_model() {
        let child = ImportModel::builder("child")
            .column("id", ColumnOptions::new())
            .column("item", ColumnOptions::new())
            .validates(Rule::custom("id", "must be blank", |v| v.is_blank()))
            .validates(Rule::presence("item"))
            .build()
            .unwrap();
        let parent_model = ImportModel::builder("parent")
            .inherit(&child)
            .has_children(child.clone())
            .build()
            .unwrap();
        let mut parent = Row::from_cells(&parent_model, ["1", "a"]);
        assert!(parent.append_child(&raw_row(["", "b"])));
        assert!(!parent.append_child(&raw_row(["2", "b"])));
        assert!(Arc::ptr_eq(parent.child_rows()[0].model(), &child));
    }

    #[test]
    fn test_dynamic_columns() {
        let model = ImportModel::builder("dynamic")
            .column("name", ColumnOptions::new())
            .dynamic_column("skills")
            .format_dynamic_column_header(|header, _, _, offset, _| header.map(|h| format!("{}#{}", h, offset)))
            .build()
            .unwrap();
        let header = Arc::new(raw_row(["Name", "Rust", "Go"]));
        let row = Row::new(
            model.clone(),
            Some(raw_row(["Ada", "yes", "no"])),
            RowOptions {
                source_header: Some(header),
                ..RowOptions::default()
            },
        );
        let dynamic = row.dynamic_attributes();
        let skills = dynamic.get("skills").unwrap();
        assert_eq!(skills.len(), 2);
        assert_eq!(skills[1].header.as_deref(), Some("Go#1"));
        assert_eq!(skills[1].value.as_deref(), Some("no"));
        assert_eq!(row.attributes().len(), 1);

        let context = json!({ "skills": ["Rust"] }).as_object().cloned().unwrap();
        let narrowed = Row::new(
            model,
            Some(raw_row(["Ada", "yes", "no"])),
            RowOptions {
                context: Arc::new(context),
                ..RowOptions::default()
            },
        );
        let skills = narrowed.dynamic_attributes().get("skills").cloned().unwrap();
        assert_eq!(
            skills,
            vec![DynamicCell {
                header: Some("Rust#0".to_string()),
                value: Some("yes".to_string()),
            }]
        );
    }

    #[test]
    fn test_source_attributes_without_source_row() {
        let missing = Row::new(basic(), None, RowOptions::default());
        assert_eq!(missing.source_attributes().len(), 2);
        assert_eq!(missing.source_attributes().get("string1"), Some(&None));

        let row = Row::from_cells(&basic(), ["a"]);
        assert_eq!(row.to_json(), json!({ "string1": "a", "string2": null }));
    }

    #[test]
    fn test_equality_and_serialization_use_attributes() {
        let model = basic();
        let a = Row::from_cells(&model, ["1", "x"]);
        let b = Row::from_cells(&model, ["1", "x"]);
        assert_eq!(a, b);
        assert_ne!(a, Row::from_cells(&model, ["2", "x"]));
        assert_eq!(serde_json::to_string(&a).unwrap(), r#"{"string1":"1","string2":"x"}"#);
        assert!(format!("{:?}", a).contains("mapped_row"));
    }

    proptest! {
        #[test]
        fn attribute_keys_match_columns(cells in prop::collection::vec(prop::option::of("[a-z0-9 ]{0,6}"), 0..5)) {
            let model = basic();
            let row = Row::new(model.clone(), Some(cells), RowOptions::default());
            let keys: Vec<String> = row.attributes().keys().map(String::from).collect();
            prop_assert_eq!(keys, vec!["string1".to_string(), "string2".to_string()]);
        }
    }
}
