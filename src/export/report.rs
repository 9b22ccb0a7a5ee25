use std::fs::OpenOptions;
use std::path::Path;
use tracing::{debug, warn};

use crate::analysis::Measurement;
use crate::frame::Frame;

const STATUS_OK: &str = "ok";
const STATUS_MISSING: &str = "missing";

/// Columns the report writes around the record fields
const FIXED_COLUMNS: [&str; 4] = ["frame_index", "elapsed_ms", "status", "error"];
const RENAMED_FIELD_PREFIX: &str = "field_";

/// Field columns: the union of record field names in first-seen order
pub fn report_columns(measurements: &[Measurement]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for record in measurements.iter().filter_map(Measurement::record) {
        for name in record.field_names() {
            if !columns.iter().any(|existing| existing == name) {
                columns.push(name.to_string());
            }
        }
    }
    columns
}

/// Header for each field column.
///
/// A field named like one of the fixed columns is written as
/// `field_<name>`, prefixed again until it is unique, so every header in
/// the report names exactly one column.
pub fn field_headers(columns: &[String]) -> Vec<String> {
    let mut taken: Vec<String> = FIXED_COLUMNS
        .iter()
        .map(|name| name.to_string())
        .chain(columns.iter().cloned())
        .collect();

    columns
        .iter()
        .map(|name| {
            if !FIXED_COLUMNS.contains(&name.as_str()) {
                return name.clone();
            }
            let mut header = format!("{}{}", RENAMED_FIELD_PREFIX, name);
            while taken.contains(&header) {
                header = format!("{}{}", RENAMED_FIELD_PREFIX, header);
            }
            warn!("Measurement field '{}' written as report column '{}'", name, header);
            taken.push(header.clone());
            header
        })
        .collect()
}

/// Write one CSV row per measurement, in acquisition order.
///
/// Columns are `frame_index`, `elapsed_ms`, `status`, the record fields,
/// then `error`. Sentinel rows have empty field cells and the analyzer's
/// failure in `error`. An existing file at `path` is never overwritten.
pub fn write_report(
    path: &Path,
    frames: &[Frame],
    measurements: &[Measurement],
) -> Result<usize, csv::Error> {
    let columns = report_columns(measurements);
    let file = OpenOptions::new().write(true).create_new(true).open(path)?;
    let mut writer = csv::Writer::from_writer(file);

    let [index_column, elapsed_column, status_column, error_column] = FIXED_COLUMNS;
    let mut header: Vec<String> = [index_column, elapsed_column, status_column]
        .iter()
        .map(|name| name.to_string())
        .collect();
    header.extend(field_headers(&columns));
    header.push(error_column.to_string());
    writer.write_record(&header)?;

    let session_start = frames.first().map(|frame| frame.timestamp);

    for (frame_index, measurement) in measurements.iter().enumerate() {
        let elapsed_ms = match (frames.get(frame_index), session_start) {
            (Some(frame), Some(start)) => frame.elapsed_since(start).as_millis().to_string(),
            _ => String::new(),
        };

        let mut row = Vec::with_capacity(columns.len() + 4);
        row.push(frame_index.to_string());
        row.push(elapsed_ms);

        match measurement {
            Measurement::Recorded(record) => {
                row.push(STATUS_OK.to_string());
                for column in &columns {
                    row.push(
                        record
                            .get(column)
                            .map(|value| value.to_string())
                            .unwrap_or_default(),
                    );
                }
                row.push(String::new());
            }
            Measurement::Missing { reason } => {
                row.push(STATUS_MISSING.to_string());
                row.extend(columns.iter().map(|_| String::new()));
                row.push(reason.clone());
            }
        }

        writer.write_record(&row)?;
    }

    writer.flush()?;
    debug!(
        "Wrote {} report rows with {} field columns to {}",
        measurements.len(),
        columns.len(),
        path.display()
    );
    Ok(measurements.len())
}
