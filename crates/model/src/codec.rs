//! Thin file adapters between on-disk rows and [`Record`]s.
//!
//! These keep to what the parsers give back: CSV cells stay strings (numeric
//! comparisons downstream coerce them), JSON values keep their types.

use std::path::Path;

use anyhow::Context;
use serde_json::Value;

use crate::record::{Record, records_from_json};

/// Streaming CSV reader; the header row supplies field names.
pub struct CsvRecords<R> {
    reader: csv::Reader<R>,
    headers: csv::StringRecord,
    row: csv::StringRecord,
}

impl CsvRecords<std::fs::File> {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)
            .with_context(|| format!("cannot open csv file: {}", path.display()))?;
        Self::new(reader)
    }
}

impl<R: std::io::Read> CsvRecords<R> {
    pub fn from_reader(reader: R) -> anyhow::Result<Self> {
        let reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);
        Self::new(reader)
    }

    fn new(mut reader: csv::Reader<R>) -> anyhow::Result<Self> {
        let headers = reader.headers()?.clone();
        Ok(CsvRecords {
            reader,
            headers,
            row: csv::StringRecord::new(),
        })
    }

    fn convert(&self) -> Record {
        // Short rows leave trailing fields absent.
        self.headers
            .iter()
            .zip(self.row.iter())
            .map(|(field, cell)| (field.to_owned(), Value::from(cell)))
            .collect()
    }
}

impl<R: std::io::Read> Iterator for CsvRecords<R> {
    type Item = anyhow::Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.reader.read_record(&mut self.row) {
            Ok(true) => Some(Ok(self.convert())),
            Ok(false) => None,
            Err(e) => Some(Err(e.into())),
        }
    }
}

/// Writes records as CSV. The header is taken from the first record's
/// fields; missing fields become empty cells.
pub fn write_csv<W: std::io::Write>(records: &[Record], writer: W) -> anyhow::Result<()> {
    let Some(first) = records.first() else {
        return Ok(());
    };
    let header: Vec<&str> = first.fields().collect();
    write_csv_with_header(records, &header, writer)
}

/// Writes records as CSV with an explicit header.
pub fn write_csv_with_header<W: std::io::Write>(
    records: &[Record],
    header: &[&str],
    writer: W,
) -> anyhow::Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(header)?;
    for record in records {
        for field in header {
            match record.get(field) {
                None | Some(Value::Null) => csv_writer.write_field("")?,
                Some(Value::String(text)) => csv_writer.write_field(text)?,
                Some(other) => csv_writer.write_field(other.to_string())?,
            }
        }
        csv_writer.write_record(None::<&[u8]>)?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Reads a JSON document and returns the array found at `pointer`
/// (RFC 6901, e.g. `/data/employees`), or the root when `pointer` is `None`.
pub fn read_json_file(path: &Path, pointer: Option<&str>) -> anyhow::Result<Vec<Record>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("cannot open json file: {}", path.display()))?;
    let mut document: Value = serde_json::from_reader(std::io::BufReader::new(file))?;
    let rows = match pointer {
        Some(pointer) => document
            .pointer_mut(pointer)
            .map(Value::take)
            .with_context(|| format!("no value at {pointer} in {}", path.display()))?,
        None => document,
    };
    records_from_json(rows)
}
