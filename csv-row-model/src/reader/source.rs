//! The row source abstraction.

use std::collections::VecDeque;

use crate::error::SourceResult;
use crate::model::RawRow;

/// Forward-only source of raw rows with one row of lookahead.
///
/// Sources keep the next row buffered, so [`Source::next_row`] and
/// [`Source::end_of_file`] never read.
pub trait Source {
    /// Consumes the header row once (when the source has one).
    fn skip_header(&mut self) -> SourceResult<()>;

    fn header(&self) -> Option<&RawRow>;

    /// Advances to the next row.
    fn read_row(&mut self) -> SourceResult<()>;

    /// Row at the current position; `None` before the first read and at the end.
    fn current_row(&self) -> Option<&RawRow>;

    /// Peeks at the row after the current one.
    fn next_row(&self) -> Option<&RawRow>;

    fn end_of_file(&self) -> bool {
        self.next_row().is_none()
    }

    /// Index of the current data row, header excluded.
    fn index(&self) -> Option<usize>;
}

/// In-memory source, mostly for tests and programmatic imports.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    header: Option<RawRow>,
    pending_header: bool,
    rows: VecDeque<RawRow>,
    current: Option<RawRow>,
    index: Option<usize>,
}

impl MemorySource {
    /// Source whose first row is a header.
    pub fn with_header(mut rows: Vec<RawRow>) -> Self {
        let has_header = !rows.is_empty();
        let header = has_header.then(|| rows.remove(0));
        Self {
            header,
            pending_header: has_header,
            rows: rows.into(),
            ..Self::default()
        }
    }

    /// Source where every row is data.
    pub fn without_header(rows: Vec<RawRow>) -> Self {
        Self {
            rows: rows.into(),
            ..Self::default()
        }
    }
}

impl Source for MemorySource {
    fn skip_header(&mut self) -> SourceResult<()> {
        self.pending_header = false;
        Ok(())
    }

    fn header(&self) -> Option<&RawRow> {
        if self.pending_header {
            None
        } else {
            self.header.as_ref()
        }
    }

    fn read_row(&mut self) -> SourceResult<()> {
        self.current = self.rows.pop_front();
        if self.current.is_some() {
            self.index = Some(self.index.map_or(0, |i| i + 1));
        }
        Ok(())
    }

    fn current_row(&self) -> Option<&RawRow> {
        self.current.as_ref()
    }

    fn next_row(&self) -> Option<&RawRow> {
        self.rows.front()
    }

    fn index(&self) -> Option<usize> {
        self.index
    }
}
