//! Pull-based row stream: groups physical rows into row model instances.

use std::sync::Arc;

use super::source::Source;
use crate::error::SourceResult;
use crate::model::{HasValidation, ImportModel, RawRow, Row, RowOptions};
use crate::value::Context;

/// Where a [`RowStream`] is in its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    BeforeHeader,
    ReadingRows,
    EndOfFile,
}

/// Reads the next row instance from `source`.
///
/// Skips the header once, reads one physical row, then keeps appending the
/// following rows while the model accepts them as children. Returns `None`
/// at end of file.
pub fn next_row<S: Source + ?Sized>(
    model: &Arc<ImportModel>,
    source: &mut S,
    header: Option<Arc<RawRow>>,
    context: Arc<Context>,
    previous: Option<Row>,
) -> SourceResult<Option<Row>> {
    source.skip_header()?;
    if source.end_of_file() {
        return Ok(None);
    }
    source.read_row()?;

    let mut row = Row::new(
        model.clone(),
        source.current_row().cloned(),
        RowOptions {
            index: source.index(),
            source_header: header,
            context,
            previous,
            is_child: false,
        },
    );

    while let Some(candidate) = source.next_row().cloned() {
        if !row.append_child(&candidate) {
            break;
        }
        source.read_row()?;
    }
    Ok(Some(row))
}

/// Iterator of row instances over a [`Source`].
///
/// Iteration ends at end of file, on a source error (yielded once), or
/// after a row whose `abort()` is true; that row is still yielded. Only
/// the last row is retained, with its own previous row released.
pub struct RowStream<S: Source> {
    model: Arc<ImportModel>,
    source: S,
    context: Arc<Context>,
    header: Option<Arc<RawRow>>,
    previous: Option<Row>,
    state: ReaderState,
    aborted: bool,
}

impl<S: Source> RowStream<S> {
    pub fn new(model: Arc<ImportModel>, source: S) -> Self {
        Self::with_context(model, source, Context::new())
    }

    pub fn with_context(model: Arc<ImportModel>, source: S, context: Context) -> Self {
        Self {
            model,
            source,
            context: Arc::new(context),
            header: None,
            previous: None,
            state: ReaderState::BeforeHeader,
            aborted: false,
        }
    }

    pub fn state(&self) -> ReaderState {
        self.state
    }

    /// The header row; available once the first row was requested.
    pub fn header(&self) -> Option<&RawRow> {
        self.header.as_deref()
    }

    /// Reads the header now; does nothing after the first call.
    pub fn read_header(&mut self) -> SourceResult<Option<&RawRow>> {
        if self.state == ReaderState::BeforeHeader {
            self.source.skip_header()?;
            self.header = self.source.header().cloned().map(Arc::new);
            self.state = ReaderState::ReadingRows;
        }
        Ok(self.header.as_deref())
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    pub fn model(&self) -> &Arc<ImportModel> {
        &self.model
    }

    /// Row instances reachable from the stream.
    pub fn retained_rows(&self) -> usize {
        let mut count = 0;
        let mut cursor = self.previous.as_ref();
        while let Some(row) = cursor {
            count += 1;
            cursor = row.previous();
        }
        count
    }

    /// Next row instance, `None` after the end or an abort.
    pub fn next_row(&mut self) -> SourceResult<Option<Row>> {
        self.read_header()?;
        if self.state == ReaderState::EndOfFile {
            return Ok(None);
        }

        let previous = self.previous.take();
        let next = next_row(
            &self.model,
            &mut self.source,
            self.header.clone(),
            self.context.clone(),
            previous,
        )?;

        match next {
            None => {
                self.state = ReaderState::EndOfFile;
                Ok(None)
            }
            Some(row) => {
                if row.abort() {
                    self.aborted = true;
                    self.state = ReaderState::EndOfFile;
                }
                self.previous = Some(row.clone());
                Ok(Some(row))
            }
        }
    }

    /// Rows that are neither invalid nor rejected by the presenter.
    pub fn importable(self) -> impl Iterator<Item = SourceResult<Row>> {
        self.filter(|row| row.as_ref().map_or(true, |row| !row.skip()))
    }

    /// Valid rows only; source errors are passed through.
    pub fn each_valid(self) -> impl Iterator<Item = SourceResult<Row>> {
        self.filter(|row| row.as_ref().map_or(true, |row| row.is_valid()))
    }
}

impl<S: Source> Iterator for RowStream<S> {
    type Item = SourceResult<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_row() {
            Ok(row) => row.map(Ok),
            Err(err) => {
                self.state = ReaderState::EndOfFile;
                Some(Err(err))
            }
        }
    }
}
