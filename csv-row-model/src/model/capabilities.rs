//! Capability traits implemented by rows and by the cell model.

use crate::validation::{Messages, ValidationResult};
use crate::value::{Attributes, OrderedMap, Value};

/// `(value_before_default, default)` recorded when a default fills a column.
pub type DefaultChange = (Value, Value);

/// Something with named columns.
pub trait HasColumns {
    /// Column names in declaration order.
    fn column_names(&self) -> Vec<&str>;

    /// Value of a column; `Nil` for unknown columns.
    fn attribute(&self, column: &str) -> Value;

    /// `column => attribute(column)` for every column.
    fn attributes(&self) -> Attributes {
        self.column_names()
            .into_iter()
            .map(|column| (column, self.attribute(column)))
            .collect()
    }
}

/// Something whose columns may have been filled by defaults.
pub trait HasDefaults: HasColumns {
    fn default_change(&self, column: &str) -> Option<DefaultChange>;

    /// Default changes of every column, omitting unchanged columns.
    fn default_changes(&self) -> OrderedMap<DefaultChange> {
        self.column_names()
            .into_iter()
            .filter_map(|column| self.default_change(column).map(|change| (column, change)))
            .collect()
    }
}

/// Something that can be validated into errors and warnings.
pub trait HasValidation {
    /// Runs validation; nothing is memoized between calls.
    fn validation_result(&self) -> ValidationResult;

    fn is_valid(&self) -> bool {
        self.validation_result().is_valid()
    }

    /// `true` when no warning fires.
    fn is_safe(&self) -> bool {
        self.validation_result().is_safe()
    }

    fn errors(&self) -> Messages {
        self.validation_result().errors
    }

    fn warnings(&self) -> Messages {
        self.validation_result().warnings
    }
}
