//! Tabular input and export
//!
//! Every cell is kept as text so postal codes like `01067` survive the
//! round trip.

use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use csv::{ReaderBuilder, Trim, Writer};

use crate::models::{ProcessedRecord, Resolution, RowResult};
use crate::scenario::Scenario;

/// An uploaded table: trimmed headers plus rows aligned to them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(Trim::Headers)
            .from_reader(reader);

        let headers: Vec<String> = reader
            .headers()
            .context("Failed reading table headers")?
            .iter()
            .map(str::to_string)
            .collect();

        let mut rows = Vec::new();
        for (i, record) in reader.records().enumerate() {
            let record = record.with_context(|| format!("Failed reading row {}", i + 1))?;
            let mut row: Vec<String> = record.iter().map(str::to_string).collect();
            row.resize(headers.len().max(row.len()), String::new());
            rows.push(row);
        }

        Ok(Self { headers, rows })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_reader(bytes)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed opening {}", path.display()))?;
        Self::from_reader(file).with_context(|| format!("Failed parsing {}", path.display()))
    }

    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

}

/// Trimmed, non-empty cell value of `column` in `row`
#[must_use]
pub fn cell<'a>(table: &Table, row: &'a [String], column: &str) -> Option<&'a str> {
    table
        .column_index(column)
        .and_then(|i| row.get(i))
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
}

fn format_number(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn coordinate_cells(resolution: &Resolution) -> [String; 2] {
    let location = resolution.location();
    [
        format_number(location.map(|l| l.latitude)),
        format_number(location.map(|l| l.longitude)),
    ]
}

/// Result cells for a record, in [`Scenario::result_columns`] order
#[must_use]
pub fn result_cells(result: &RowResult) -> Vec<String> {
    let mut cells: Vec<String> = result
        .resolutions()
        .into_iter()
        .flat_map(coordinate_cells)
        .collect();
    if let RowResult::Distance { distance_km, .. } = result {
        cells.push(format_number(*distance_km));
    }
    cells
}

/// Write the original columns plus the scenario's result columns.
///
/// A result column already present in the input (a re-uploaded export) is
/// overwritten in place; only missing ones are appended.
pub fn export_csv(
    headers: &[String],
    records: &[ProcessedRecord],
    scenario: Scenario,
) -> Result<Vec<u8>> {
    let mut writer = Writer::from_writer(Vec::new());

    let mut header_row: Vec<&str> = headers.iter().map(String::as_str).collect();
    let targets: Vec<usize> = scenario
        .result_columns()
        .iter()
        .map(|&column| match header_row.iter().position(|h| h.trim() == column) {
            Some(index) => index,
            None => {
                header_row.push(column);
                header_row.len() - 1
            }
        })
        .collect();
    writer
        .write_record(&header_row)
        .context("Failed writing export header")?;

    for record in records {
        let mut row = record.cells.clone();
        row.resize(header_row.len(), String::new());
        for (&target, value) in targets.iter().zip(result_cells(&record.result)) {
            row[target] = value;
        }
        writer
            .write_record(&row)
            .with_context(|| format!("Failed writing export row {}", record.index + 1))?;
    }

    writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Failed flushing export: {e}"))
}

/// `{stem}_geocoding_details_{MMDDYYYY}.csv`
#[must_use]
pub fn export_filename(original_filename: &str, date: NaiveDate) -> String {
    let name = Path::new(original_filename)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(original_filename);
    let stem = name.split('.').next().filter(|s| !s.is_empty()).unwrap_or("export");
    format!("{stem}_geocoding_details_{}.csv", date.format("%m%d%Y"))
}
