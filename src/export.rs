//! Writing extracted records to tabular files.
//!
//! Columns always follow the configured field order and missing values are
//! written as empty strings. When the primary writer fails, a plain CSV
//! writer with hand-rolled quoting gets one more try at a fixed path so a
//! long run is never lost to a serializer error.

use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::Settings;
use crate::error::{Result, ScrapeError};
use crate::models::{Field, Record};

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Csv,
    Json,
}

impl OutputFormat {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "csv" => Some(OutputFormat::Csv),
            "json" => Some(OutputFormat::Json),
            _ => None,
        }
    }

    /// Parse a format name, falling back to CSV with a warning.
    pub fn from_name_or_csv(name: &str) -> Self {
        Self::from_name(name).unwrap_or_else(|| {
            warn!("Unsupported output format '{}', using csv", name);
            OutputFormat::Csv
        })
    }

    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Json => "json",
        }
    }

    pub fn sink(&self) -> Box<dyn RecordSink> {
        match self {
            OutputFormat::Csv => Box::new(CsvSink),
            OutputFormat::Json => Box::new(JsonSink),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Serializes a batch of records to a file.
pub trait RecordSink {
    fn write(&self, path: &Path, fields: &[Field], records: &[Record]) -> Result<()>;
}

fn serialization_error(path: &Path, message: impl fmt::Display) -> ScrapeError {
    ScrapeError::Serialization {
        path: path.to_path_buf(),
        message: message.to_string(),
    }
}

/// CSV via the `csv` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvSink;

impl RecordSink for CsvSink {
    fn write(&self, path: &Path, fields: &[Field], records: &[Record]) -> Result<()> {
        let mut writer = csv::Writer::from_path(path).map_err(|e| serialization_error(path, e))?;
        writer
            .write_record(fields.iter().map(Field::as_str))
            .map_err(|e| serialization_error(path, e))?;
        for record in records {
            writer
                .write_record(record.row(fields))
                .map_err(|e| serialization_error(path, e))?;
        }
        writer.flush().map_err(|e| serialization_error(path, e))?;
        Ok(())
    }
}

/// A JSON array of objects whose keys follow the field order.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSink;

struct OrderedRecord<'a> {
    fields: &'a [Field],
    record: &'a Record,
}

impl Serialize for OrderedRecord<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for field in self.fields {
            map.serialize_entry(field.as_str(), self.record.value_or_empty(*field))?;
        }
        map.end()
    }
}

impl RecordSink for JsonSink {
    fn write(&self, path: &Path, fields: &[Field], records: &[Record]) -> Result<()> {
        let rows: Vec<OrderedRecord<'_>> = records
            .iter()
            .map(|record| OrderedRecord { fields, record })
            .collect();
        let file = File::create(path).map_err(|e| serialization_error(path, e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &rows).map_err(|e| serialization_error(path, e))?;
        writer.flush().map_err(|e| serialization_error(path, e))?;
        Ok(())
    }
}

/// Quote a CSV value when it contains a delimiter, quote or line break.
fn quote(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Last-resort CSV writer that depends on nothing but `std::io`.
pub fn write_raw_csv(path: &Path, fields: &[Field], records: &[Record]) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut out = BufWriter::new(File::create(path)?);
    let header: Vec<&str> = fields.iter().map(Field::as_str).collect();
    writeln!(out, "{}", header.join(","))?;
    for record in records {
        let row: Vec<String> = record.row(fields).into_iter().map(quote).collect();
        writeln!(out, "{}", row.join(","))?;
    }
    out.flush()
}

/// Where the export goes.
///
/// An explicit path wins (the format's extension is added when it has
/// none), then a configured file name inside the output directory, then a
/// timestamped `<site>_<YYYYmmdd_HHMMSS>.<ext>` there.
pub fn resolve_output_path(
    explicit: Option<&Path>,
    settings: &Settings,
    site: &str,
    format: OutputFormat,
) -> PathBuf {
    let with_extension = |path: PathBuf| {
        if path.extension().is_some() {
            path
        } else {
            path.with_extension(format.extension())
        }
    };

    if let Some(path) = explicit {
        return with_extension(path.to_path_buf());
    }
    if let Some(name) = &settings.output_filename {
        return with_extension(settings.output_dir.join(name));
    }
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    settings
        .output_dir
        .join(format!("{}_{}.{}", site, timestamp, format.extension()))
}

/// Path used by the raw fallback writer.
pub fn fallback_path(settings: &Settings, site: &str) -> PathBuf {
    settings.output_dir.join(format!("{}_data.csv", site))
}

/// Write `records` to `path` with the format's sink, falling back to the raw
/// CSV writer. Returns the path actually written.
pub fn export_records(
    records: &[Record],
    fields: &[Field],
    format: OutputFormat,
    path: &Path,
    settings: &Settings,
    site: &str,
) -> Result<PathBuf> {
    let primary = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => fs::create_dir_all(parent)
            .map_err(|e| serialization_error(path, e))
            .and_then(|_| format.sink().write(path, fields, records)),
        None => format.sink().write(path, fields, records),
    };

    match primary {
        Ok(()) => {
            info!("Wrote {} records to {}", records.len(), path.display());
            Ok(path.to_path_buf())
        }
        Err(e) => {
            let fallback = fallback_path(settings, site);
            warn!("{}; trying raw CSV writer at {}", e, fallback.display());
            match write_raw_csv(&fallback, fields, records) {
                Ok(()) => {
                    info!("Wrote {} records to {}", records.len(), fallback.display());
                    Ok(fallback)
                }
                Err(raw) => {
                    error!("Raw CSV fallback failed: {}", raw);
                    Err(ScrapeError::Serialization {
                        path: fallback,
                        message: format!("{}; raw fallback: {}", e, raw),
                    })
                }
            }
        }
    }
}
