//! Row validation layer.
//!
//! Validation is two-tier: a [`RuleSet`] holds *error* rules (a failure makes
//! the record invalid) and *warning* rules (a failure makes it unsafe but
//! keeps it valid). Rules are evaluated against anything exposing columns and
//! default changes, which is both the cell model (formatted strings) and the
//! row (final values).
//!
//! # Messages
//!
//! Messages are keyed by column and kept in column order. Full messages
//! prefix the humanized column name: `"Id can't be blank"`.
//!
//! # Precedence
//!
//! [`ValidationResult::merge_inner`] merges cell-level (inner) results into
//! row-level (outer) results: a column with inner messages takes those and
//! drops its outer ones; other columns keep their outer messages.

use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

use crate::error::{ConfigError, ConfigResult};
use crate::model::{HasColumns, HasDefaults};
use crate::schema::ColumnType;
use crate::value::{humanize, OrderedMap, Value};

/// Predicate of a custom rule; `true` means the value passes.
pub type RulePredicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

// =============================================================================
// Messages
// =============================================================================

/// Validation messages keyed by column, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Messages(OrderedMap<Vec<String>>);

impl Messages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, column: &str, message: impl Into<String>) {
        match self.0.get_mut(column) {
            Some(list) => list.push(message.into()),
            None => {
                self.0.insert(column, vec![message.into()]);
            }
        }
    }

    /// Messages of one column; empty when the column is clean.
    pub fn get(&self, column: &str) -> &[String] {
        self.0.get(column).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has(&self, column: &str) -> bool {
        !self.get(column).is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(Vec::is_empty)
    }

    /// Columns with at least one message.
    pub fn columns(&self) -> Vec<&str> {
        self.0.iter().filter(|(_, m)| !m.is_empty()).map(|(c, _)| c).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Vec<String>)> {
        self.0.iter()
    }

    /// `"<Humanized column> <message>"` for every message.
    pub fn full_messages(&self) -> Vec<String> {
        self.0
            .iter()
            .flat_map(|(column, messages)| {
                let name = humanize(column);
                messages.iter().map(move |m| format!("{} {}", name, m))
            })
            .collect()
    }

    /// Replaces the messages of every column present in `inner`.
    pub fn merge_inner(&mut self, inner: &Messages) {
        for (column, messages) in inner.iter().filter(|(_, m)| !m.is_empty()) {
            self.0.insert(column, messages.clone());
        }
    }

    /// Appends every message of `other`.
    pub fn extend(&mut self, other: Messages) {
        for (column, messages) in other.0 {
            for message in messages {
                self.add(&column, message);
            }
        }
    }
}

/// Errors and warnings of one validation run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub errors: Messages,
    pub warnings: Messages,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn is_safe(&self) -> bool {
        self.warnings.is_empty()
    }

    /// Merges cell-level results into these row-level results.
    pub fn merge_inner(mut self, inner: &ValidationResult) -> Self {
        self.errors.merge_inner(&inner.errors);
        self.warnings.merge_inner(&inner.warnings);
        self
    }
}

// =============================================================================
// Rules
// =============================================================================

/// What a rule checks.
#[derive(Clone)]
pub enum Check {
    /// Value must not be blank.
    Presence,
    /// Text length bounds, in characters.
    Length { min: Option<usize>, max: Option<usize> },
    /// Text must match the pattern.
    Format(Regex),
    /// Text must be one of the values.
    Inclusion(Vec<String>),
    /// Text must be in the format of the type.
    TypeFormat(ColumnType),
    /// The column must not have been filled by its default.
    DefaultChange,
    /// Arbitrary predicate with its message.
    Custom { message: String, predicate: RulePredicate },
}

impl fmt::Debug for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Check::Presence => f.write_str("Presence"),
            Check::Length { min, max } => f.debug_struct("Length").field("min", min).field("max", max).finish(),
            Check::Format(re) => f.debug_tuple("Format").field(&re.as_str()).finish(),
            Check::Inclusion(values) => f.debug_tuple("Inclusion").field(values).finish(),
            Check::TypeFormat(t) => f.debug_tuple("TypeFormat").field(t).finish(),
            Check::DefaultChange => f.write_str("DefaultChange"),
            Check::Custom { message, .. } => f.debug_struct("Custom").field("message", message).finish(),
        }
    }
}

/// A check bound to a column.
#[derive(Debug, Clone)]
pub struct Rule {
    column: String,
    check: Check,
    allow_blank: bool,
}

impl Rule {
    pub fn new(column: impl Into<String>, check: Check) -> Self {
        Self {
            column: column.into(),
            check,
            allow_blank: false,
        }
    }

    pub fn presence(column: impl Into<String>) -> Self {
        Self::new(column, Check::Presence)
    }

    pub fn length(column: impl Into<String>, min: Option<usize>, max: Option<usize>) -> Self {
        Self::new(column, Check::Length { min, max })
    }

    pub fn format(column: impl Into<String>, pattern: &str) -> ConfigResult<Self> {
        let column = column.into();
        let regex = Regex::new(pattern).map_err(|e| ConfigError::InvalidRule {
            column: column.clone(),
            message: e.to_string(),
        })?;
        Ok(Self::new(column, Check::Format(regex)))
    }

    pub fn inclusion<I, S>(column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(column, Check::Inclusion(values.into_iter().map(Into::into).collect()))
    }

    /// Type format check; blank cells pass.
    pub fn type_format(column: impl Into<String>, column_type: ColumnType) -> Self {
        Self::new(column, Check::TypeFormat(column_type)).allow_blank()
    }

    pub fn default_change(column: impl Into<String>) -> Self {
        Self::new(column, Check::DefaultChange)
    }

    pub fn custom<F>(column: impl Into<String>, message: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        Self::new(
            column,
            Check::Custom {
                message: message.into(),
                predicate: Arc::new(predicate),
            },
        )
    }

    /// Skip the check when the value is blank.
    pub fn allow_blank(mut self) -> Self {
        self.allow_blank = true;
        self
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn check(&self) -> &Check {
        &self.check
    }

    /// The failure message, or `None` when the record passes.
    pub fn evaluate<R>(&self, record: &R) -> Option<String>
    where
        R: HasColumns + HasDefaults + ?Sized,
    {
        if let Check::DefaultChange = self.check {
            return record
                .default_change(&self.column)
                .map(|_| "changed by default".to_string());
        }

        let value = record.attribute(&self.column);
        if self.allow_blank && value.is_blank() {
            return None;
        }
        let text = value.to_text().unwrap_or_default();

        match &self.check {
            Check::Presence => value.is_blank().then(|| "can't be blank".to_string()),
            Check::Length { min, max } => {
                let len = text.chars().count();
                match (min, max) {
                    (Some(min), _) if len < *min => {
                        Some(format!("is too short (minimum is {} characters)", min))
                    }
                    (_, Some(max)) if len > *max => {
                        Some(format!("is too long (maximum is {} characters)", max))
                    }
                    _ => None,
                }
            }
            Check::Format(regex) => (!regex.is_match(&text)).then(|| "is invalid".to_string()),
            Check::Inclusion(values) => {
                (!values.iter().any(|v| *v == text)).then(|| "is not included in the list".to_string())
            }
            Check::TypeFormat(column_type) => (!column_type.matches_format(&text))
                .then(|| format!("is not a {} format", column_type)),
            Check::Custom { message, predicate } => (!predicate(&value)).then(|| message.clone()),
            Check::DefaultChange => None,
        }
    }
}

/// Error rules and warning rules of one model.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    errors: Vec<Rule>,
    warnings: Vec<Rule>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, rule: Rule) {
        self.errors.push(rule);
    }

    pub fn add_warning(&mut self, rule: Rule) {
        self.warnings.push(rule);
    }

    pub fn errors(&self) -> &[Rule] {
        &self.errors
    }

    pub fn warnings(&self) -> &[Rule] {
        &self.warnings
    }

    /// Appends the rules of `other` (inherited rules come first).
    pub fn extend(&mut self, other: &RuleSet) {
        self.errors.extend(other.errors.iter().cloned());
        self.warnings.extend(other.warnings.iter().cloned());
    }

    /// Every column a rule refers to.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.errors.iter().chain(&self.warnings).map(Rule::column)
    }

    pub fn validate<R>(&self, record: &R) -> ValidationResult
    where
        R: HasColumns + HasDefaults + ?Sized,
    {
        ValidationResult {
            errors: run(&self.errors, record),
            warnings: run(&self.warnings, record),
        }
    }
}

/// Runs rules in order and collects the failures.
pub fn run<R>(rules: &[Rule], record: &R) -> Messages
where
    R: HasColumns + HasDefaults + ?Sized,
{
    let mut messages = Messages::new();
    for rule in rules {
        if let Some(message) = rule.evaluate(record) {
            messages.add(&rule.column, message);
        }
    }
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Attributes;

    /// Minimal record over a fixed attribute map.
    struct Fixture {
        attributes: Attributes,
        defaulted: Vec<&'static str>,
    }

    impl Fixture {
        fn new(pairs: &[(&str, Value)]) -> Self {
            Self {
                attributes: pairs.iter().cloned().collect(),
                defaulted: Vec::new(),
            }
        }
    }

    impl HasColumns for Fixture {
        fn column_names(&self) -> Vec<&str> {
            self.attributes.keys().collect()
        }

        fn attribute(&self, column: &str) -> Value {
            self.attributes.get(column).cloned().unwrap_or_default()
        }
    }

    impl HasDefaults for Fixture {
        fn default_change(&self, column: &str) -> Option<(Value, Value)> {
            self.defaulted
                .iter()
                .any(|c| *c == column)
                .then(|| (Value::Nil, Value::from("b")))
        }
    }

    #[test]
    fn test_presence_and_full_messages() {
        let record = Fixture::new(&[("id", Value::from(""))]);
        let messages = run(&[Rule::presence("id")], &record);
        assert_eq!(messages.full_messages(), vec!["Id can't be blank"]);
    }

    #[test]
    fn test_length_messages() {
        let record = Fixture::new(&[("id", Value::from("abc"))]);
        let short = run(&[Rule::length("id", Some(5), None)], &record);
        assert_eq!(short.full_messages(), vec!["Id is too short (minimum is 5 characters)"]);
        let long = run(&[Rule::length("id", None, Some(2))], &record);
        assert_eq!(long.get("id"), ["is too long (maximum is 2 characters)"]);
    }

    #[test]
    fn test_type_format_allows_blank() {
        let rule = Rule::type_format("string1", ColumnType::Integer);
        for (cell, ok) in [("123", true), ("123.0", true), ("123.45", false), ("", true)] {
            let record = Fixture::new(&[("string1", Value::from(cell))]);
            assert_eq!(rule.evaluate(&record).is_none(), ok, "cell {:?}", cell);
        }
        let nil = Fixture::new(&[("string1", Value::Nil)]);
        assert!(rule.evaluate(&nil).is_none());
    }

    #[test]
    fn test_date_format_rule() {
        let rule = Rule::type_format("string1", ColumnType::Date);
        let record = Fixture::new(&[("string1", Value::from("12/12/2012"))]);
        assert!(rule.evaluate(&record).is_none());
        let bad = Fixture::new(&[("string1", Value::from("12/13/2012"))]);
        assert_eq!(rule.evaluate(&bad).as_deref(), Some("is not a Date format"));
    }

    #[test]
    fn test_default_change_rule() {
        let rule = Rule::default_change("string1");
        let mut record = Fixture::new(&[("string1", Value::from("a")), ("string2", Value::from("b"))]);
        assert!(rule.evaluate(&record).is_none());

        record.defaulted = vec!["string2"];
        assert!(rule.evaluate(&record).is_none());

        record.defaulted = vec!["string1"];
        let messages = run(&[rule], &record);
        assert_eq!(messages.full_messages(), vec!["String1 changed by default"]);
    }

    #[test]
    fn test_format_inclusion_and_custom() {
        let record = Fixture::new(&[("code", Value::from("AB-1"))]);
        let rules = vec![
            Rule::format("code", r"^[A-Z]{2}-\d$").unwrap(),
            Rule::inclusion("code", ["XY-1"]),
            Rule::custom("code", "must be lowercase", |v| {
                v.as_str().is_some_and(|s| s == s.to_lowercase())
            }),
        ];
        let messages = run(&rules, &record);
        assert_eq!(
            messages.get("code"),
            ["is not included in the list", "must be lowercase"]
        );
        assert!(matches!(Rule::format("code", "("), Err(ConfigError::InvalidRule { .. })));
    }

    #[test]
    fn test_inner_messages_take_precedence() {
        let mut outer = ValidationResult::default();
        outer.errors.add("id", "is too short (minimum is 5 characters)");
        outer.errors.add("name", "is invalid");
        let mut inner = ValidationResult::default();
        inner.errors.add("id", "can't be blank");

        let merged = outer.merge_inner(&inner);
        assert_eq!(merged.errors.get("id"), ["can't be blank"]);
        assert_eq!(merged.errors.get("name"), ["is invalid"]);
        assert!(!merged.is_valid());
        assert!(merged.is_safe());
    }

    #[test]
    fn test_messages_serialize_as_map() {
        let mut messages = Messages::new();
        messages.add("id", "can't be blank");
        assert_eq!(serde_json::to_string(&messages).unwrap(), r#"{"id":["can't be blank"]}"#);
    }
}
