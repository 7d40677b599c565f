//! Reading row instances from CSV sources.
//!
//! - [`Source`]: forward-only raw rows with one row of lookahead
//! - [`CsvSource`]: the `csv` crate over any reader or a decoded file
//! - [`MemorySource`]: rows held in memory
//! - [`RowStream`]: groups parent/child rows into [`crate::Row`]s

pub mod csv_source;
pub mod source;
pub mod stream;

pub use csv_source::{CsvConfig, CsvSource};
pub use source::{MemorySource, Source};
pub use stream::{next_row, ReaderState, RowStream};
