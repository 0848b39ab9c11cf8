//! Reading datasets, metadata and disambiguation mappings from disk

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use projection_loader::{Dataset, Metadata};
use projection_store::{FantasyPlayerId, Row, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Csv,
    Json,
    Toml,
}

fn format_of(path: &Path) -> Result<Format> {
    let extension = path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("csv") => Ok(Format::Csv),
        Some("json") => Ok(Format::Json),
        Some("toml") => Ok(Format::Toml),
        _ => bail!("cannot tell the format of {} (expected .csv, .json or .toml)", path.display()),
    }
}

/// Read a scraped dataset from a CSV file with a header row or a JSON array of objects
pub fn read_dataset(path: &Path) -> Result<Dataset> {
    match format_of(path)? {
        Format::Csv => read_csv_dataset(path),
        Format::Json => {
            let text =
                fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
            let rows: Vec<Row> =
                serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
            Ok(Dataset::from_rows(rows))
        }
        Format::Toml => bail!("datasets must be CSV or JSON: {}", path.display()),
    }
}

fn read_csv_dataset(path: &Path) -> Result<Dataset> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;
    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

    let mut dataset = Dataset::new(headers.iter().cloned());
    for (line, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("{}: record {}", path.display(), line + 1))?;
        let row: Row = headers
            .iter()
            .zip(record.iter())
            .map(|(column, cell)| (column.clone(), Value::parse_cell(cell)))
            .collect();
        dataset.push_row(row);
    }
    Ok(dataset)
}

/// Read load metadata from a flat TOML table or JSON object
pub fn read_metadata(path: &Path) -> Result<Metadata> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    match format_of(path)? {
        Format::Json => {
            serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
        }
        Format::Toml => {
            let table: toml::Table =
                toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
            let mut metadata = Metadata::new();
            for (key, value) in table {
                let value = toml_value(&key, value)?;
                metadata.insert(key, value);
            }
            Ok(metadata)
        }
        Format::Csv => bail!("metadata must be TOML or JSON: {}", path.display()),
    }
}

fn toml_value(key: &str, value: toml::Value) -> Result<Value> {
    Ok(match value {
        toml::Value::String(s) => Value::Text(s),
        toml::Value::Integer(i) => Value::Int(i),
        toml::Value::Float(f) => Value::Float(f),
        toml::Value::Boolean(b) => Value::Bool(b),
        // Coerced to a timestamp by the catalog on insert.
        toml::Value::Datetime(dt) => Value::Text(dt.to_string()),
        toml::Value::Array(_) | toml::Value::Table(_) => {
            return Err(anyhow!("metadata field '{key}' must be a single value"));
        }
    })
}

/// Read `name_as_scraped,fantasy_player_id` pairs from a CSV file
pub fn read_disambiguations(path: &Path) -> Result<BTreeMap<String, FantasyPlayerId>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;

    let mut mapping = BTreeMap::new();
    for (line, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("{}: record {}", path.display(), line + 1))?;
        let (Some(name), Some(id)) = (record.get(0), record.get(1)) else {
            bail!("{}: record {} needs a name and a fantasy player id", path.display(), line + 1);
        };
        if name.is_empty() || id.is_empty() {
            bail!("{}: record {} has an empty field", path.display(), line + 1);
        }
        mapping.insert(name.to_string(), FantasyPlayerId::new(id));
    }
    Ok(mapping)
}
