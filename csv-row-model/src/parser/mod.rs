//! Raw input decoding with encoding and delimiter auto-detection.
//!
//! Turns input bytes into UTF-8 text the CSV tokenizer can read. Rows are
//! not split here; see [`crate::reader::CsvSource`].

use std::path::Path;

use crate::error::{SourceError, SourceResult};

/// Candidate delimiters, in tie-break order.
const DELIMITERS: [char; 4] = [',', ';', '\t', '|'];

/// Decoded input plus what was detected on the way.
#[derive(Debug, Clone)]
pub struct DecodedCsv {
    /// UTF-8 content
    pub content: String,
    /// Detected or used encoding
    pub encoding: String,
    /// Detected or used delimiter
    pub delimiter: char,
}

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let result = chardet::detect(bytes);
    let charset = result.0;

    // Normalize charset names
    match charset.to_lowercase().as_str() {
        "" | "ascii" | "utf-8" | "utf8" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        _ => charset,
    }
}

/// Decode bytes to a string using the given encoding.
///
/// Unknown encodings are looked up by label in `encoding_rs`; a label it
/// does not know either is an error.
pub fn decode_content(bytes: &[u8], encoding: &str) -> SourceResult<String> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF".as_slice()).unwrap_or(bytes);
    match encoding.to_lowercase().as_str() {
        "utf-8" | "utf8" | "ascii" => Ok(String::from_utf8_lossy(bytes).into_owned()),
        "iso-8859-1" | "latin-1" | "latin1" => Ok(encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned()),
        "windows-1252" | "cp1252" => Ok(encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned()),
        other => encoding_rs::Encoding::for_label(other.as_bytes())
            .map(|enc| enc.decode(bytes).0.into_owned())
            .ok_or_else(|| SourceError::Encoding(encoding.to_string())),
    }
}

/// Detect the delimiter by counting occurrences in the first line
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().next().unwrap_or("");

    let mut best_sep = DELIMITERS[0];
    let mut best_count = 0;

    for &sep in &DELIMITERS {
        let count = first_line.matches(sep).count();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }

    best_sep
}

/// Decode bytes, detecting the encoding and (unless given) the delimiter.
pub fn decode_bytes(bytes: &[u8], delimiter: Option<char>) -> SourceResult<DecodedCsv> {
    if bytes.is_empty() {
        return Err(SourceError::Empty);
    }
    let encoding = detect_encoding(bytes);
    let content = decode_content(bytes, &encoding)?;
    let delimiter = delimiter.unwrap_or_else(|| detect_delimiter(&content));

    Ok(DecodedCsv {
        content,
        encoding,
        delimiter,
    })
}

/// Read and decode a file.
pub fn read_file<P: AsRef<Path>>(path: P, delimiter: Option<char>) -> SourceResult<DecodedCsv> {
    let bytes = std::fs::read(path.as_ref())?;
    decode_bytes(&bytes, delimiter)
}
