use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{ArrayRef, Float64Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use log::info;
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;
use parquet::format::KeyValue;
use serde::{Deserialize, Serialize};

use super::loader::{TableDocument, SAMPLE_RATE_KEY};
use super::model::{ModalityTable, SynchronizedDataset};
use super::select::{extract, ChannelSelection};

/// Output file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Csv,
    Json,
    Parquet,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
            ExportFormat::Parquet => "parquet",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            "parquet" | "pq" => Ok(ExportFormat::Parquet),
            other => Err(format!("unknown export format '{other}' (csv, json, parquet)")),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

// ---------------------------------------------------------------------------
// Single tables
// ---------------------------------------------------------------------------

/// `time` column plus one column per channel. NaN is written as an empty
/// cell.
pub fn write_csv(table: &ModalityTable, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;

    let mut header = vec!["time"];
    header.extend(table.channels().iter().map(|c| c.name.as_str()));
    writer.write_record(&header).context("writing CSV header")?;

    for (row, t) in table.time().iter().enumerate() {
        let mut record = Vec::with_capacity(table.channels().len() + 1);
        record.push(t.to_string());
        for ch in table.channels() {
            let v = ch.values[row];
            record.push(if v.is_nan() { String::new() } else { v.to_string() });
        }
        writer
            .write_record(&record)
            .with_context(|| format!("writing CSV row {row}"))?;
    }
    writer.flush().context("flushing CSV")?;
    Ok(())
}

/// One [`TableDocument`].
pub fn write_json(table: &ModalityTable, path: &Path) -> Result<()> {
    let file =
        std::fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
    serde_json::to_writer(std::io::BufWriter::new(file), &TableDocument::from(table))
        .context("writing JSON")
}

/// Arrow form of a table: `time` plus nullable Float64 channel columns
/// (NaN as null), with the native rate in the `sample_rate` schema metadata.
pub fn record_batch(table: &ModalityTable) -> Result<RecordBatch> {
    let mut fields = vec![Field::new("time", DataType::Float64, false)];
    fields.extend(
        table
            .channels()
            .iter()
            .map(|c| Field::new(c.name.as_str(), DataType::Float64, true)),
    );
    let schema = Arc::new(Schema::new(fields).with_metadata(HashMap::from([(
        SAMPLE_RATE_KEY.to_string(),
        table.native_rate().to_string(),
    )])));

    let mut columns: Vec<ArrayRef> = vec![Arc::new(Float64Array::from(table.time().to_vec()))];
    columns.extend(table.channels().iter().map(|c| {
        let values: Float64Array = c
            .values
            .iter()
            .map(|v| if v.is_nan() { None } else { Some(*v) })
            .collect();
        Arc::new(values) as ArrayRef
    }));
    RecordBatch::try_new(schema, columns).context("building record batch")
}

/// Parquet file of [`record_batch`]; the rate is also stored as file-level
/// key-value metadata for readers that ignore the Arrow schema.
pub fn write_parquet(table: &ModalityTable, path: &Path) -> Result<()> {
    let batch = record_batch(table)?;
    let props = WriterProperties::builder()
        .set_key_value_metadata(Some(vec![KeyValue::new(
            SAMPLE_RATE_KEY.to_string(),
            table.native_rate().to_string(),
        )]))
        .build();
    let file =
        std::fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))
        .context("creating parquet writer")?;
    writer.write(&batch).context("writing parquet batch")?;
    writer.close().context("closing parquet writer")?;
    Ok(())
}

pub fn write_table(table: &ModalityTable, path: &Path, format: ExportFormat) -> Result<()> {
    match format {
        ExportFormat::Csv => write_csv(table, path),
        ExportFormat::Json => write_json(table, path),
        ExportFormat::Parquet => write_parquet(table, path),
    }
}

/// One file per table, `<dir>/<modality>.<ext>`. Returns the paths written.
pub fn export_tables(
    tables: &BTreeMap<String, ModalityTable>,
    dir: &Path,
    format: ExportFormat,
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    tables
        .iter()
        .map(|(modality, table)| {
            let path = dir.join(format!("{modality}.{}", format.extension()));
            write_table(table, &path, format)?;
            info!("wrote {} ({} rows)", path.display(), table.len());
            Ok(path)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Synchronized datasets
// ---------------------------------------------------------------------------

/// JSON form of a synchronized dataset.
#[derive(Debug, Serialize, Deserialize)]
pub struct DatasetDocument {
    pub target_rate: u32,
    pub common_duration: f64,
    pub timeline: Vec<f64>,
    pub tables: BTreeMap<String, TableDocument>,
}

impl DatasetDocument {
    fn build(
        dataset: &SynchronizedDataset,
        tables: &BTreeMap<String, ModalityTable>,
        range: Range<usize>,
    ) -> Self {
        let timeline = dataset.timeline().as_slice();
        let end = range.end.min(timeline.len());
        let range = range.start.min(end)..end;
        Self {
            target_rate: dataset.target_rate(),
            common_duration: dataset.common_duration(),
            timeline: timeline[range].to_vec(),
            tables: tables
                .iter()
                .map(|(modality, table)| (modality.clone(), TableDocument::from(table)))
                .collect(),
        }
    }
}

/// The whole dataset as one [`DatasetDocument`].
pub fn write_dataset_json(dataset: &SynchronizedDataset, path: &Path) -> Result<()> {
    let doc = DatasetDocument::build(dataset, dataset.tables(), 0..dataset.len());
    write_document(&doc, path)
}

fn write_document(doc: &DatasetDocument, path: &Path) -> Result<()> {
    let file =
        std::fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
    serde_json::to_writer(std::io::BufWriter::new(file), doc).context("writing JSON")
}

/// File name of the JSON dataset export.
pub const DATASET_JSON: &str = "synchronized.json";

/// Export the selected channels inside timeline rows `range`.
///
/// CSV and Parquet write one file per modality; JSON writes a single
/// [`DatasetDocument`] named [`DATASET_JSON`].
pub fn export_dataset(
    dataset: &SynchronizedDataset,
    selection: &ChannelSelection,
    range: Range<usize>,
    dir: &Path,
    format: ExportFormat,
) -> Result<Vec<PathBuf>> {
    let tables = extract(dataset, selection, range.clone());
    match format {
        ExportFormat::Json => {
            std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
            let path = dir.join(DATASET_JSON);
            write_document(&DatasetDocument::build(dataset, &tables, range), &path)?;
            info!("wrote {}", path.display());
            Ok(vec![path])
        }
        ExportFormat::Csv | ExportFormat::Parquet => export_tables(&tables, dir, format),
    }
}
