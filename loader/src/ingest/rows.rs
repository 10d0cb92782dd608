//! CSV row parsing and per-series grouping
//!
//! Files carry no header; every row is `series_id,timestamp,value`. A single
//! bad row rejects the whole file.

use crate::error::{LoaderError, Result, RowField};
use crate::measurement::MeasurementCollection;
use chrono::{DateTime, Utc};
use csv::{ReaderBuilder, StringRecord};
use std::collections::HashMap;
use uuid::Uuid;

/// Number of columns every row must have
const FIELDS_PER_ROW: usize = 3;

/// Collections parsed from one file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransformedFile {
    /// One collection per distinct series, in first-seen order
    pub collections: Vec<MeasurementCollection>,
    /// Rows converted into measurements
    pub row_count: usize,
}

impl TransformedFile {
    pub fn series_count(&self) -> usize {
        self.collections.len()
    }
}

/// Groups measurements by series in a single pass
///
/// Collections come out in the order their series was first seen, so the same
/// input always produces the same output.
#[derive(Default)]
struct SeriesGrouper {
    index: HashMap<Uuid, usize>,
    collections: Vec<MeasurementCollection>,
    rows: usize,
}

impl SeriesGrouper {
    fn push(&mut self, series_id: Uuid, time: DateTime<Utc>, value: f32) {
        let idx = match self.index.get(&series_id) {
            Some(&idx) => idx,
            None => {
                self.collections.push(MeasurementCollection::new(series_id));
                let idx = self.collections.len() - 1;
                self.index.insert(series_id, idx);
                idx
            }
        };
        self.collections[idx].push(time, value);
        self.rows += 1;
    }

    fn finish(self) -> TransformedFile {
        TransformedFile {
            collections: self.collections,
            row_count: self.rows,
        }
    }
}

/// Parse a whole file into per-series collections
///
/// # Errors
/// `LoaderError::RowParse` with the 0-based row index of the first bad row and
/// the 1-based line it starts on. Blank lines are skipped, so the two can
/// drift apart.
pub fn parse_rows(data: &[u8]) -> Result<TransformedFile> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(data);

    let mut grouper = SeriesGrouper::default();

    for (row, result) in reader.records().enumerate() {
        let record = result.map_err(|e| LoaderError::RowParse {
            row,
            line: e.position().map_or(0, |p| p.line()),
            field: RowField::Record,
            value: String::new(),
            reason: e.to_string(),
        })?;
        let line = record.position().map_or(0, |p| p.line());
        let (series_id, time, value) = parse_row(row, line, &record)?;
        grouper.push(series_id, time, value);
    }

    Ok(grouper.finish())
}

fn parse_row(
    row: usize,
    line: u64,
    record: &StringRecord,
) -> Result<(Uuid, DateTime<Utc>, f32)> {
    if record.len() != FIELDS_PER_ROW {
        return Err(LoaderError::RowParse {
            row,
            line,
            field: RowField::FieldCount,
            value: record.len().to_string(),
            reason: format!("expected {FIELDS_PER_ROW} fields"),
        });
    }

    let raw_id = &record[0];
    let series_id = Uuid::parse_str(raw_id)
        .map_err(|e| row_error(row, line, RowField::SeriesId, raw_id, e.to_string()))?;

    let raw_time = &record[1];
    let time = DateTime::parse_from_rfc3339(raw_time)
        .map_err(|e| {
            row_error(row, line, RowField::Timestamp, raw_time, e.to_string())
        })?
        .with_timezone(&Utc);

    let raw_value = &record[2];
    let value: f32 = raw_value
        .parse()
        .map_err(|e: std::num::ParseFloatError| {
            row_error(row, line, RowField::Value, raw_value, e.to_string())
        })?;
    if !value.is_finite() {
        return Err(row_error(
            row,
            line,
            RowField::Value,
            raw_value,
            "value is not a finite 32-bit float".to_string(),
        ));
    }

    Ok((series_id, time, value))
}

fn row_error(
    row: usize,
    line: u64,
    field: RowField,
    value: &str,
    reason: String,
) -> LoaderError {
    LoaderError::RowParse {
        row,
        line,
        field,
        value: value.to_string(),
        reason,
    }
}
