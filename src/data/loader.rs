use std::path::Path;

use anyhow::{bail, Context, Result};
use arrow::array::{Array, AsArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Float64Type};
use csv::StringRecord;
use log::{debug, warn};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde::{Deserialize, Serialize};

use super::model::{Channel, ModalityTable};
use super::schema::{force_plate_column_names, ChannelRole, ChannelSchema, ModalityKind};

/// Key of the sampling-rate entry in Parquet key-value metadata.
pub const SAMPLE_RATE_KEY: &str = "sample_rate";

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// CSV flavour. `None` in [`LoadOptions`] means auto-detect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsvLayout {
    /// Motion-capture export: title, rate, group labels, names, units, data.
    Vendor,
    /// Single header row with a `time` column.
    Tidy,
}

/// How to interpret a file. Everything is optional.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Table name; defaults to the file stem.
    pub name: Option<String>,
    /// Modality kind; defaults to parsing the table name.
    pub kind: Option<ModalityKind>,
    /// Native rate in Hz, overriding whatever the file says.
    pub rate: Option<u32>,
    pub layout: Option<CsvLayout>,
    /// Marker prefix such as `S12`; inferred from the first toe marker.
    pub subject: Option<String>,
    /// Replaces the kind's default schema.
    pub schema: Option<ChannelSchema>,
}

impl LoadOptions {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn with_rate(mut self, rate: u32) -> Self {
        self.rate = Some(rate);
        self
    }
}

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Load one modality table from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.csv`     – vendor export or tidy `time,...` table
/// * `.json`    – [`TableDocument`]
/// * `.parquet` – a `time` column plus numeric channel columns
pub fn load_file(path: &Path, options: &LoadOptions) -> Result<ModalityTable> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let raw = match ext.as_str() {
        "csv" | "txt" => load_csv(path, options),
        "json" => load_json(path, options),
        "parquet" | "pq" => load_parquet(path, options),
        other => bail!("Unsupported file extension: .{other}"),
    }
    .with_context(|| format!("loading {}", path.display()))?;

    let name = options
        .name
        .clone()
        .or_else(|| raw.name.clone())
        .unwrap_or_else(|| {
            path.file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("modality")
                .to_string()
        });
    let kind = options
        .kind
        .unwrap_or_else(|| name.parse().unwrap_or(ModalityKind::Other));
    finish(name, kind, raw, options)
}

/// Columns and rate as parsed, before validation and role assignment.
struct RawTable {
    /// Name stored in the file itself, if the format has one.
    name: Option<String>,
    rate: u32,
    time: Vec<f64>,
    channels: Vec<Channel>,
}

fn finish(
    name: String,
    kind: ModalityKind,
    raw: RawTable,
    options: &LoadOptions,
) -> Result<ModalityTable> {
    let mut channels = raw.channels;
    if kind == ModalityKind::Kinetics && channels.len() == 18 {
        for (ch, fp_name) in channels.iter_mut().zip(force_plate_column_names()) {
            ch.name = fp_name;
        }
    }

    let schema = match &options.schema {
        Some(schema) => schema.clone(),
        None => {
            let subject = options
                .subject
                .clone()
                .or_else(|| infer_subject(&channels))
                .unwrap_or_default();
            ChannelSchema::default_for(kind, &subject)
        }
    };

    let table = ModalityTable::new(name, raw.rate, raw.time, channels)?.with_schema(&schema);
    debug!(
        "loaded '{}': {} channels, {} samples at {} Hz ({} with roles)",
        table.name(),
        table.channels().len(),
        table.len(),
        table.native_rate(),
        table.channels().iter().filter(|c| c.role.is_some()).count()
    );
    Ok(table)
}

/// `S12` from a channel named `S12:RTOE:X`.
fn infer_subject(channels: &[Channel]) -> Option<String> {
    channels.iter().find_map(|c| {
        let (prefix, rest) = c.name.split_once(':')?;
        rest.contains("TOE").then(|| prefix.to_string())
    })
}

/// Rate from the median step of `time`.
fn infer_rate(time: &[f64]) -> Result<u32> {
    let mut steps: Vec<f64> = time.windows(2).map(|w| w[1] - w[0]).collect();
    if steps.is_empty() {
        bail!("cannot infer sampling rate from fewer than 2 samples; pass a rate");
    }
    steps.sort_by(f64::total_cmp);
    let median = steps[steps.len() / 2];
    let rate = (1.0 / median).round();
    if !rate.is_finite() || rate < 1.0 || rate > f64::from(u32::MAX) {
        bail!("cannot infer sampling rate from median step {median}");
    }
    debug!("inferred {rate} Hz from median step {median}");
    Ok(rate as u32)
}

fn parse_cell(cell: &str, bad: &mut usize) -> f64 {
    let cell = cell.trim();
    if cell.is_empty() {
        return f64::NAN;
    }
    cell.parse::<f64>().unwrap_or_else(|_| {
        *bad += 1;
        f64::NAN
    })
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

fn load_csv(path: &Path, options: &LoadOptions) -> Result<RawTable> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .context("opening CSV")?;
    let records = reader
        .records()
        .enumerate()
        .map(|(i, r)| r.with_context(|| format!("CSV line {}", i + 1)))
        .collect::<Result<Vec<_>>>()?;

    let layout = options.layout.unwrap_or_else(|| {
        if looks_like_vendor(&records) {
            CsvLayout::Vendor
        } else {
            CsvLayout::Tidy
        }
    });
    match layout {
        CsvLayout::Vendor => parse_vendor(&records, options.rate),
        CsvLayout::Tidy => parse_tidy(&records, options.rate),
    }
}

/// Line 1 of a vendor export holds only the sampling rate.
fn looks_like_vendor(records: &[StringRecord]) -> bool {
    records.get(1).is_some_and(|r| {
        r.get(0).is_some_and(|c| c.trim().parse::<u32>().is_ok())
            && r.iter().skip(1).all(|c| c.trim().is_empty())
    })
}

fn is_frame_column(name: &str) -> bool {
    matches!(name.to_ascii_lowercase().as_str(), "frame" | "sub frame")
}

/// Vendor layout:
///
/// ```text
/// Devices
/// 1000
/// ,,Force Plate 1 - Force,,,...
/// Frame,Sub Frame,Fx,Fy,Fz,...
/// ,,N,N,N,...
/// 1,0,0.12,-0.3,701.2,...
/// ```
fn parse_vendor(records: &[StringRecord], rate_override: Option<u32>) -> Result<RawTable> {
    if records.len() < 5 {
        bail!(
            "vendor CSV needs 5 header lines, found {} lines",
            records.len()
        );
    }

    let rate = match rate_override {
        Some(rate) => rate,
        None => {
            let cell = records[1].get(0).unwrap_or("").trim();
            let rate: f64 = cell
                .parse()
                .with_context(|| format!("line 2: '{cell}' is not a sampling rate"))?;
            if !(rate >= 1.0 && rate <= f64::from(u32::MAX)) {
                bail!("line 2: invalid sampling rate {rate}");
            }
            rate.round() as u32
        }
    };

    let groups = forward_fill(&records[2]);
    let names_row = &records[3];
    let columns: Vec<usize> = (0..names_row.len())
        .filter(|&i| {
            let name = names_row[i].trim();
            !name.is_empty() && !is_frame_column(name)
        })
        .collect();

    let raw_names: Vec<&str> = columns.iter().map(|&i| names_row[i].trim()).collect();
    let repeated = has_duplicates(&raw_names);
    let names: Vec<String> = columns
        .iter()
        .zip(&raw_names)
        .map(|(&i, &name)| match groups.get(i).filter(|g| repeated && !g.is_empty()) {
            Some(group) => format!("{group}:{name}"),
            None => name.to_string(),
        })
        .collect();
    let names = dedupe(names);

    let data = records[5..]
        .iter()
        .take_while(|r| r.len() > 1 && r.iter().any(|c| !c.trim().is_empty()));

    let mut values: Vec<Vec<f64>> = vec![Vec::new(); columns.len()];
    let mut bad = 0usize;
    let mut n = 0usize;
    for record in data {
        for (col, &i) in values.iter_mut().zip(&columns) {
            col.push(parse_cell(record.get(i).unwrap_or(""), &mut bad));
        }
        n += 1;
    }
    if bad > 0 {
        warn!("{bad} unparsable cells read as NaN");
    }

    let time = (0..n).map(|i| i as f64 / f64::from(rate)).collect();
    let channels = names
        .into_iter()
        .zip(values)
        .map(|(name, v)| Channel::new(name, v))
        .collect();
    Ok(RawTable {
        name: None,
        rate,
        time,
        channels,
    })
}

fn parse_tidy(records: &[StringRecord], rate_override: Option<u32>) -> Result<RawTable> {
    let (header, rows) = records.split_first().context("CSV is empty")?;
    let headers: Vec<&str> = header.iter().map(str::trim).collect();
    let time_idx = headers
        .iter()
        .position(|h| h.eq_ignore_ascii_case("time"))
        .context("CSV missing 'time' column")?;

    let columns: Vec<usize> = (0..headers.len())
        .filter(|&i| i != time_idx && !headers[i].is_empty())
        .collect();

    let mut time = Vec::with_capacity(rows.len());
    let mut values: Vec<Vec<f64>> = vec![Vec::with_capacity(rows.len()); columns.len()];
    let mut bad = 0usize;
    for (row_no, record) in rows.iter().enumerate() {
        let cell = record.get(time_idx).unwrap_or("").trim();
        let t: f64 = cell
            .parse()
            .with_context(|| format!("CSV row {row_no}: time '{cell}' is not a number"))?;
        time.push(t);
        for (col, &i) in values.iter_mut().zip(&columns) {
            col.push(parse_cell(record.get(i).unwrap_or(""), &mut bad));
        }
    }
    if bad > 0 {
        warn!("{bad} unparsable cells read as NaN");
    }

    let rate = match rate_override {
        Some(rate) => rate,
        None => infer_rate(&time)?,
    };
    let names = dedupe(columns.iter().map(|&i| headers[i].to_string()).collect());
    let channels = names
        .into_iter()
        .zip(values)
        .map(|(name, v)| Channel::new(name, v))
        .collect();
    Ok(RawTable {
        name: None,
        rate,
        time,
        channels,
    })
}

fn forward_fill(record: &StringRecord) -> Vec<String> {
    let mut current = String::new();
    record
        .iter()
        .map(|cell| {
            let cell = cell.trim();
            if !cell.is_empty() {
                current = cell.to_string();
            }
            current.clone()
        })
        .collect()
}

fn has_duplicates(names: &[&str]) -> bool {
    let mut seen = std::collections::BTreeSet::new();
    names.iter().any(|n| !seen.insert(*n))
}

/// Second and later occurrences of a name get `.1`, `.2`, ...
fn dedupe(names: Vec<String>) -> Vec<String> {
    let mut counts = std::collections::BTreeMap::<String, usize>::new();
    let mut taken: std::collections::BTreeSet<String> = names.iter().cloned().collect();
    names
        .into_iter()
        .map(|name| {
            let count = counts.entry(name.clone()).or_insert(0);
            *count += 1;
            if *count == 1 {
                return name;
            }
            let mut k = *count - 1;
            loop {
                let candidate = format!("{name}.{k}");
                if taken.insert(candidate.clone()) {
                    return candidate;
                }
                k += 1;
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// JSON form of one table, shared by the loader and the exporter.
///
/// ```json
/// {
///   "name": "emg",
///   "native_rate": 2000,
///   "time": [0.0, 0.0005, ...],
///   "channels": [
///     { "name": "TA", "values": [0.01, null, ...] },
///     { "name": "Fz_L", "role": "LeftFz", "values": [...] }
///   ]
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub native_rate: Option<u32>,
    pub time: Vec<f64>,
    pub channels: Vec<ChannelDocument>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelDocument {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<ChannelRole>,
    /// `null` stands for NaN.
    pub values: Vec<Option<f64>>,
}

impl From<&ModalityTable> for TableDocument {
    fn from(table: &ModalityTable) -> Self {
        Self {
            name: Some(table.name().to_string()),
            native_rate: Some(table.native_rate()),
            time: table.time().to_vec(),
            channels: table
                .channels()
                .iter()
                .map(|ch| ChannelDocument {
                    name: ch.name.clone(),
                    role: ch.role,
                    values: ch
                        .values
                        .iter()
                        .map(|v| if v.is_nan() { None } else { Some(*v) })
                        .collect(),
                })
                .collect(),
        }
    }
}

fn load_json(path: &Path, options: &LoadOptions) -> Result<RawTable> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    let doc: TableDocument = serde_json::from_str(&text).context("parsing JSON")?;

    let rate = match options.rate.or(doc.native_rate) {
        Some(rate) => rate,
        None => infer_rate(&doc.time)?,
    };
    let channels = doc
        .channels
        .into_iter()
        .map(|c| {
            let values = c.values.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect();
            Channel {
                name: c.name,
                role: c.role,
                values,
            }
        })
        .collect();
    Ok(RawTable {
        name: doc.name,
        rate,
        time: doc.time,
        channels,
    })
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load a Parquet table: a `time` column plus numeric channel columns.
///
/// Integer and float columns are read as `f64`, nulls as NaN; other columns
/// are skipped. Works with files written by Pandas and Polars as well as by
/// [`super::export`].
fn load_parquet(path: &Path, options: &LoadOptions) -> Result<RawTable> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder =
        ParquetRecordBatchReaderBuilder::try_new(file).context("reading parquet metadata")?;

    let stored_rate = builder
        .schema()
        .metadata()
        .get(SAMPLE_RATE_KEY)
        .cloned()
        .or_else(|| {
            builder
                .metadata()
                .file_metadata()
                .key_value_metadata()?
                .iter()
                .find(|kv| kv.key == SAMPLE_RATE_KEY)?
                .value
                .clone()
        });

    let schema = builder.schema().clone();
    let time_idx = schema
        .fields()
        .iter()
        .position(|f| f.name().eq_ignore_ascii_case("time"))
        .context("Parquet file missing 'time' column")?;

    let numeric: Vec<(usize, String)> = schema
        .fields()
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != time_idx)
        .filter_map(|(i, f)| {
            if f.data_type().is_numeric() {
                Some((i, f.name().clone()))
            } else {
                debug!("skipping non-numeric column '{}' ({})", f.name(), f.data_type());
                None
            }
        })
        .collect();

    let reader = builder.build().context("building parquet reader")?;
    let mut time = Vec::new();
    let mut values: Vec<Vec<f64>> = vec![Vec::new(); numeric.len()];

    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        extend_f64(&mut time, batch.column(time_idx))
            .context("reading 'time' column")?;
        for (out, (i, col_name)) in values.iter_mut().zip(&numeric) {
            extend_f64(out, batch.column(*i))
                .with_context(|| format!("reading column '{col_name}'"))?;
        }
    }
    if time.iter().any(|t| t.is_nan()) {
        bail!("'time' column contains nulls");
    }

    let rate = match (options.rate, stored_rate) {
        (Some(rate), _) => rate,
        (None, Some(s)) => s
            .trim()
            .parse()
            .with_context(|| format!("invalid '{SAMPLE_RATE_KEY}' metadata '{s}'"))?,
        (None, None) => infer_rate(&time)?,
    };

    let channels = numeric
        .into_iter()
        .zip(values)
        .map(|((_, name), v)| Channel::new(name, v))
        .collect();
    Ok(RawTable {
        name: None,
        rate,
        time,
        channels,
    })
}

/// Append a numeric Arrow column as `f64`, nulls as NaN.
fn extend_f64(out: &mut Vec<f64>, col: &dyn Array) -> Result<()> {
    let as_f64 = cast(col, &DataType::Float64).context("casting to Float64")?;
    let arr = as_f64.as_primitive::<Float64Type>();
    out.extend(arr.iter().map(|v| v.unwrap_or(f64::NAN)));
    Ok(())
}
