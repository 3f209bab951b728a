//! Reader for the semicolon-delimited roll extract.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use csv::{ByteRecord, ReaderBuilder};
use thiserror::Error;

use crate::types::{PersonalRecord, PollingStation, RollEntry};

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("failed to open extract: {0}")]
    Open(#[from] std::io::Error),
    #[error("failed to read extract row {row}: {source}")]
    Read {
        row: u64,
        #[source]
        source: csv::Error,
    },
}

/// Byte encoding of the extract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceEncoding {
    /// ISO-8859-1, what the roll exports are produced in.
    Latin1,
    /// UTF-8, invalid sequences replaced.
    Utf8,
}

impl SourceEncoding {
    pub fn decode(&self, bytes: &[u8]) -> String {
        match self {
            // Every Latin-1 byte is the Unicode scalar of the same value.
            SourceEncoding::Latin1 => bytes.iter().map(|&b| char::from(b)).collect(),
            SourceEncoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
        }
    }
}

impl FromStr for SourceEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "latin1" | "iso-8859-1" | "iso8859-1" => Ok(SourceEncoding::Latin1),
            "utf8" | "utf-8" => Ok(SourceEncoding::Utf8),
            _ => Err(format!("Unknown source encoding: {s}, must be LATIN1 or UTF8")),
        }
    }
}

/// Zero-based column positions in the extract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnLayout {
    pub locality: usize,
    pub district: usize,
    pub section: usize,
    pub table: usize,
    pub station_id: usize,
    pub address: [usize; 4],
    pub given_name: usize,
    pub surname1: usize,
    pub surname2: usize,
    pub birth_date: usize,
    pub document_id: usize,
    pub post_code: usize,
}

impl Default for ColumnLayout {
    fn default() -> Self {
        Self {
            locality: 2,
            district: 3,
            section: 4,
            table: 5,
            station_id: 6,
            address: [9, 10, 11, 12],
            given_name: 13,
            surname1: 14,
            surname2: 15,
            birth_date: 25,
            document_id: 27,
            post_code: 28,
        }
    }
}

/// Iterates the entries of an extract. The header row is discarded and rows
/// may be ragged: missing columns read as empty strings.
pub struct RollReader<R> {
    reader: csv::Reader<R>,
    layout: ColumnLayout,
    encoding: SourceEncoding,
    record: ByteRecord,
    row: u64,
}

impl RollReader<File> {
    pub fn from_path(
        path: &Path,
        layout: ColumnLayout,
        encoding: SourceEncoding,
    ) -> Result<Self, SourceError> {
        let file = File::open(path)?;
        Ok(Self::new(file, layout, encoding))
    }
}

impl<R: Read> RollReader<R> {
    pub fn new(input: R, layout: ColumnLayout, encoding: SourceEncoding) -> Self {
        let reader = ReaderBuilder::new()
            .delimiter(b';')
            .has_headers(true)
            .flexible(true)
            .from_reader(input);

        Self {
            reader,
            layout,
            encoding,
            record: ByteRecord::new(),
            row: 0,
        }
    }

    fn field(&self, index: usize) -> String {
        self.record
            .get(index)
            .map(|bytes| self.encoding.decode(bytes))
            .unwrap_or_default()
    }

    fn entry(&self) -> RollEntry {
        let layout = &self.layout;

        let address = layout
            .address
            .iter()
            .map(|&index| self.field(index))
            .collect::<Vec<_>>()
            .join(" ");

        let station_id = self.field(layout.station_id);

        RollEntry {
            person: PersonalRecord {
                document_id: self.field(layout.document_id),
                birth_date: self.field(layout.birth_date),
                given_name: self.field(layout.given_name),
                surname1: self.field(layout.surname1),
                surname2: self.field(layout.surname2),
                post_code: self.field(layout.post_code),
                station_id: station_id.clone(),
            },
            station: PollingStation {
                id: station_id.trim().to_string(),
                locality: self.field(layout.locality),
                district: self.field(layout.district),
                section: self.field(layout.section),
                table: self.field(layout.table),
                address: address.trim().to_string(),
            },
        }
    }
}

impl<R: Read> Iterator for RollReader<R> {
    type Item = Result<RollEntry, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.row += 1;
        match self.reader.read_byte_record(&mut self.record) {
            Ok(true) => Some(Ok(self.entry())),
            Ok(false) => None,
            Err(source) => Some(Err(SourceError::Read {
                row: self.row,
                source,
            })),
        }
    }
}
