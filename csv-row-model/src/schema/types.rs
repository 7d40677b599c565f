//! Built-in column types: coercion from cell text and format checks.
//!
//! Coercion never panics; a cell that does not match its type yields a
//! [`CoercionError`] which the attribute resolver turns into a validation
//! message.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::value::Value;

static INTEGER_FORMAT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[+-]?(\d+|\d{1,3}(,\d{3})+)(\.0*)?$").expect("integer format regex"));

static FLOAT_FORMAT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[+-]?((\d+|\d{1,3}(,\d{3})+)(\.\d*)?|\.\d+)$").expect("float format regex"));

static TRUE_BOOLEAN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^(true|t|yes|y|1)$").expect("true tokens regex"));

static FALSE_BOOLEAN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^(false|f|no|n|0)$").expect("false tokens regex"));

static NUMERIC_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,4})[/.\-](\d{1,2})[/.\-](\d{1,4})$").expect("numeric date regex"));

/// Textual date layouts tried after the numeric forms.
const TEXT_DATE_FORMATS: &[&str] = &["%d %B %Y", "%d %b %Y", "%B %d, %Y", "%b %d, %Y"];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%Y/%m/%d %H:%M:%S",
];

/// Types a column can be coerced to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    Boolean,
    Integer,
    Float,
    Date,
    DateTime,
    String,
}

/// A cell that could not be coerced to its column type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoercionError {
    pub column_type: ColumnType,
    pub cell: String,
}

impl fmt::Display for CoercionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "could not be parsed as {}", self.column_type)
    }
}

impl std::error::Error for CoercionError {}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ColumnType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Boolean" => Ok(ColumnType::Boolean),
            "Integer" => Ok(ColumnType::Integer),
            "Float" => Ok(ColumnType::Float),
            "Date" => Ok(ColumnType::Date),
            "DateTime" => Ok(ColumnType::DateTime),
            "String" => Ok(ColumnType::String),
            other => Err(other.to_string()),
        }
    }
}

impl ColumnType {
    pub fn name(&self) -> &'static str {
        match self {
            ColumnType::Boolean => "Boolean",
            ColumnType::Integer => "Integer",
            ColumnType::Float => "Float",
            ColumnType::Date => "Date",
            ColumnType::DateTime => "DateTime",
            ColumnType::String => "String",
        }
    }

    /// Whether `validate_type` registers a format check for this type.
    pub fn has_format_check(&self) -> bool {
        !matches!(self, ColumnType::String)
    }

    /// Whether `cell` is in this type's format. Strings always are.
    pub fn matches_format(&self, cell: &str) -> bool {
        let cell = cell.trim();
        match self {
            ColumnType::Boolean => is_boolean_format(cell),
            ColumnType::Integer => is_integer_format(cell),
            ColumnType::Float => is_float_format(cell),
            ColumnType::Date => parse_date(cell).is_some(),
            ColumnType::DateTime => parse_datetime(cell).is_some(),
            ColumnType::String => true,
        }
    }

    /// Coerces non-blank cell text to a value of this type.
    pub fn coerce(&self, cell: &str) -> Result<Value, CoercionError> {
        let trimmed = cell.trim();
        let coerced = match self {
            ColumnType::String => Some(Value::String(cell.to_string())),
            ColumnType::Boolean => parse_boolean(trimmed).map(Value::Boolean),
            ColumnType::Integer => parse_integer(trimmed).map(Value::Integer),
            ColumnType::Float => parse_float(trimmed).map(Value::Float),
            ColumnType::Date => parse_date(trimmed).map(Value::Date),
            ColumnType::DateTime => parse_datetime(trimmed).map(Value::DateTime),
        };
        coerced.ok_or_else(|| CoercionError {
            column_type: *self,
            cell: cell.to_string(),
        })
    }
}

pub fn is_integer_format(cell: &str) -> bool {
    INTEGER_FORMAT.is_match(cell)
}

pub fn is_float_format(cell: &str) -> bool {
    FLOAT_FORMAT.is_match(cell)
}

pub fn is_boolean_format(cell: &str) -> bool {
    TRUE_BOOLEAN.is_match(cell) || FALSE_BOOLEAN.is_match(cell)
}

fn strip_digit_groups(cell: &str) -> String {
    cell.replace(',', "")
}

fn parse_boolean(cell: &str) -> Option<bool> {
    if TRUE_BOOLEAN.is_match(cell) {
        Some(true)
    } else if FALSE_BOOLEAN.is_match(cell) {
        Some(false)
    } else {
        None
    }
}

fn parse_integer(cell: &str) -> Option<i64> {
    if !is_integer_format(cell) {
        return None;
    }
    let plain = strip_digit_groups(cell);
    let whole = plain.split('.').next().unwrap_or("");
    whole.trim_start_matches('+').parse().ok()
}

fn parse_float(cell: &str) -> Option<f64> {
    if !is_float_format(cell) {
        return None;
    }
    strip_digit_groups(cell).trim_start_matches('+').parse().ok()
}

/// Parses a date, resolving numeric layouts in day/month/year order.
///
/// A leading four-digit part is a year (`Y-m-d`), a trailing four-digit
/// part is a year after day and month (`d/m/Y`), and three short parts are
/// read as `y/m/d` with the two-digit year in 1969..=2068.
pub fn parse_date(cell: &str) -> Option<NaiveDate> {
    if let Some(caps) = NUMERIC_DATE.captures(cell) {
        let parts: Vec<&str> = (1..=3).filter_map(|i| caps.get(i)).map(|m| m.as_str()).collect();
        let num = |s: &str| s.parse::<u32>().ok();
        let (year, month, day) = if parts[0].len() == 4 {
            (parts[0].parse::<i32>().ok()?, num(parts[1])?, num(parts[2])?)
        } else if parts[2].len() == 4 {
            (parts[2].parse::<i32>().ok()?, num(parts[1])?, num(parts[0])?)
        } else if parts[0].len() <= 2 && parts[2].len() <= 2 {
            (expand_two_digit_year(num(parts[0])?), num(parts[1])?, num(parts[2])?)
        } else {
            return None;
        };
        return NaiveDate::from_ymd_opt(year, month, day);
    }
    TEXT_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(cell, fmt).ok())
}

fn expand_two_digit_year(yy: u32) -> i32 {
    let yy = yy as i32;
    if yy >= 69 {
        1900 + yy
    } else {
        2000 + yy
    }
}

/// Parses a date-time; a bare date is read as midnight.
pub fn parse_datetime(cell: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(cell) {
        return Some(dt.naive_utc());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(cell, fmt).ok())
        .or_else(|| parse_date(cell).and_then(|d| d.and_hms_opt(0, 0, 0)))
}
