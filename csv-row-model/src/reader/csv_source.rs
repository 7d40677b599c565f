//! [`Source`] over the `csv` crate.

use csv::{ReaderBuilder, StringRecord};
use std::io::{Cursor, Read};
use std::path::Path;

use super::source::Source;
use crate::error::{SourceError, SourceResult};
use crate::model::RawRow;
use crate::parser::{self, DecodedCsv};

/// Tokenizer settings.
#[derive(Debug, Clone, Copy)]
pub struct CsvConfig {
    pub delimiter: u8,
    pub has_header: bool,
}

impl Default for CsvConfig {
    fn default() -> Self {
        Self {
            delimiter: b',',
            has_header: true,
        }
    }
}

impl CsvConfig {
    /// Config for a detected or user-given delimiter character.
    pub fn with_delimiter(delimiter: char, has_header: bool) -> SourceResult<Self> {
        if !delimiter.is_ascii() {
            return Err(SourceError::InvalidDelimiter(delimiter));
        }
        Ok(Self {
            delimiter: delimiter as u8,
            has_header,
        })
    }
}

/// CSV stream bound to a generic reader.
///
/// Rows may have any number of cells. Empty cells are read as `None`.
/// A record that fails to tokenize is reported by the `read_row` call that
/// would have moved onto it, so the rows before it are still read.
pub struct CsvSource<R: Read> {
    rdr: csv::Reader<R>,
    has_header: bool,
    primed: bool,
    header: Option<RawRow>,
    current: Option<RawRow>,
    lookahead: Option<RawRow>,
    pending_error: Option<SourceError>,
    index: Option<usize>,
    record: StringRecord,
}

impl<R: Read> CsvSource<R> {
    /// Build a CSV source from any `Read` using `CsvConfig`.
    pub fn from_reader(reader: R, cfg: CsvConfig) -> Self {
        let rdr = ReaderBuilder::new()
            .has_headers(false)
            .delimiter(cfg.delimiter)
            .flexible(true)
            .from_reader(reader);
        Self {
            rdr,
            has_header: cfg.has_header,
            primed: false,
            header: None,
            current: None,
            lookahead: None,
            pending_error: None,
            index: None,
            record: StringRecord::new(),
        }
    }

    fn fetch(&mut self) -> SourceResult<Option<RawRow>> {
        if !self.rdr.read_record(&mut self.record)? {
            return Ok(None);
        }
        Ok(Some(
            self.record
                .iter()
                .map(|cell| (!cell.is_empty()).then(|| cell.to_string()))
                .collect(),
        ))
    }

    /// Reads the header (if any) and buffers the first data row.
    fn prime(&mut self) -> SourceResult<()> {
        if self.primed {
            return Ok(());
        }
        self.primed = true;
        if self.has_header {
            self.header = self.fetch()?;
        }
        self.lookahead = self.fetch()?;
        Ok(())
    }
}

impl CsvSource<Cursor<Vec<u8>>> {
    /// Source over already decoded content.
    pub fn from_decoded(decoded: &DecodedCsv, has_header: bool) -> SourceResult<Self> {
        let cfg = CsvConfig::with_delimiter(decoded.delimiter, has_header)?;
        Ok(Self::from_reader(Cursor::new(decoded.content.clone().into_bytes()), cfg))
    }

    /// Decodes a file (encoding and delimiter detection) and opens it.
    pub fn from_path<P: AsRef<Path>>(
        path: P,
        delimiter: Option<char>,
        has_header: bool,
    ) -> SourceResult<(Self, DecodedCsv)> {
        let decoded = parser::read_file(path, delimiter)?;
        let source = Self::from_decoded(&decoded, has_header)?;
        Ok((source, decoded))
    }
}

impl<R: Read> Source for CsvSource<R> {
    fn skip_header(&mut self) -> SourceResult<()> {
        self.prime()
    }

    fn header(&self) -> Option<&RawRow> {
        self.header.as_ref()
    }

    fn read_row(&mut self) -> SourceResult<()> {
        self.prime()?;
        if let Some(err) = self.pending_error.take() {
            self.current = None;
            return Err(err);
        }
        self.current = self.lookahead.take();
        if self.current.is_some() {
            self.index = Some(self.index.map_or(0, |i| i + 1));
            match self.fetch() {
                Ok(next) => self.lookahead = next,
                Err(err) => self.pending_error = Some(err),
            }
        }
        Ok(())
    }

    fn current_row(&self) -> Option<&RawRow> {
        self.current.as_ref()
    }

    fn next_row(&self) -> Option<&RawRow> {
        self.lookahead.as_ref()
    }

    fn end_of_file(&self) -> bool {
        self.primed && self.lookahead.is_none() && self.pending_error.is_none()
    }

    fn index(&self) -> Option<usize> {
        self.index
    }
}
