use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use arrow::array::{
    Array, ArrayRef, AsArray, Float32Array, Float64Array, Int32Array, Int64Array, StringArray,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use serde_json::Value as JsonValue;

// ---------------------------------------------------------------------------
// Column table
// ---------------------------------------------------------------------------

/// One column of a long-format table.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Float(Vec<f64>),
    Text(Vec<String>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Float(v) => v.len(),
            Column::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A long-format table: named columns of equal length, one row per record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnTable {
    columns: BTreeMap<String, Column>,
    n_rows: usize,
}

impl ColumnTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a column. The first column fixes the row count.
    pub fn insert(&mut self, name: &str, column: Column) -> Result<()> {
        if !self.columns.is_empty() && column.len() != self.n_rows {
            bail!(
                "column '{name}' has {} rows, expected {}",
                column.len(),
                self.n_rows
            );
        }
        self.n_rows = column.len();
        self.columns.insert(name.to_string(), column);
        Ok(())
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn has(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    pub fn floats(&self, name: &str) -> Result<&[f64]> {
        match self.columns.get(name) {
            Some(Column::Float(v)) => Ok(v),
            Some(Column::Text(_)) => bail!("column '{name}' is not numeric"),
            None => bail!("missing column '{name}'"),
        }
    }

    /// Column as text; numeric columns are formatted.
    pub fn texts(&self, name: &str) -> Result<Vec<String>> {
        match self.columns.get(name) {
            Some(Column::Text(v)) => Ok(v.clone()),
            Some(Column::Float(v)) => Ok(v.iter().map(|x| x.to_string()).collect()),
            None => bail!("missing column '{name}'"),
        }
    }
}

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Load a long-format table from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.parquet` – one primitive column per variable (recommended)
/// * `.json`    – `[{ "w": 550.0, "p": 101325.0, ... }, ...]` or
///   `{ "w": [...], "p": [...], ... }`
/// * `.csv`     – header row with column names, one record per row
pub fn load_table(path: &Path) -> Result<ColumnTable> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    log::debug!("loading table {}", path.display());
    let table = match ext.as_str() {
        "parquet" | "pq" => load_parquet(path),
        "json" => load_json(path),
        "csv" => load_csv(path),
        other => bail!("Unsupported file extension: .{other}"),
    }
    .with_context(|| format!("loading {}", path.display()))?;
    log::info!(
        "loaded {} rows x {} columns from {}",
        table.n_rows(),
        table.columns.len(),
        path.display()
    );
    Ok(table)
}

/// Write a table to a Parquet file.
pub fn write_parquet(path: &Path, table: &ColumnTable) -> Result<()> {
    let mut fields = Vec::new();
    let mut arrays: Vec<ArrayRef> = Vec::new();
    for (name, column) in &table.columns {
        match column {
            Column::Float(v) => {
                fields.push(Field::new(name, DataType::Float64, false));
                arrays.push(Arc::new(Float64Array::from(v.clone())));
            }
            Column::Text(v) => {
                fields.push(Field::new(name, DataType::Utf8, false));
                arrays.push(Arc::new(StringArray::from(v.clone())));
            }
        }
    }
    let schema = Arc::new(Schema::new(fields));
    let batch = RecordBatch::try_new(schema.clone(), arrays).context("building record batch")?;

    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = ArrowWriter::try_new(file, schema, None).context("creating parquet writer")?;
    writer.write(&batch).context("writing batch")?;
    writer.close().context("closing parquet writer")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

fn load_json(path: &Path) -> Result<ColumnTable> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    let root: JsonValue = serde_json::from_str(&text).context("parsing JSON")?;

    match &root {
        JsonValue::Array(records) => json_records(records),
        JsonValue::Object(columns) => {
            let mut table = ColumnTable::new();
            for (name, values) in columns {
                let values = values
                    .as_array()
                    .with_context(|| format!("column '{name}' is not an array"))?;
                table.insert(name, json_column(name, values.iter())?)?;
            }
            Ok(table)
        }
        _ => bail!("Expected top-level JSON array or object"),
    }
}

fn json_records(records: &[JsonValue]) -> Result<ColumnTable> {
    let first = match records.first() {
        Some(r) => r.as_object().context("Row 0 is not a JSON object")?,
        None => return Ok(ColumnTable::new()),
    };
    let mut table = ColumnTable::new();
    for name in first.keys() {
        let values = records
            .iter()
            .enumerate()
            .map(|(i, rec)| {
                rec.get(name)
                    .with_context(|| format!("Row {i}: missing '{name}'"))
            })
            .collect::<Result<Vec<_>>>()?;
        table.insert(name, json_column(name, values.into_iter())?)?;
    }
    Ok(table)
}

fn json_column<'a>(name: &str, values: impl Iterator<Item = &'a JsonValue>) -> Result<Column> {
    let values: Vec<&JsonValue> = values.collect();
    if values.iter().all(|v| v.is_number()) {
        let floats = values.iter().filter_map(|v| v.as_f64()).collect();
        return Ok(Column::Float(floats));
    }
    values
        .iter()
        .enumerate()
        .map(|(j, v)| match v {
            JsonValue::String(s) => Ok(s.clone()),
            JsonValue::Number(n) => Ok(n.to_string()),
            other => bail!("{name}[{j}]: unsupported value {other}"),
        })
        .collect::<Result<Vec<_>>>()
        .map(Column::Text)
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

/// Columns whose every cell parses as a float are numeric; the others are
/// text.
fn load_csv(path: &Path) -> Result<ColumnTable> {
    let mut reader = csv::Reader::from_path(path).context("opening CSV")?;
    let headers: Vec<String> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut cells: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        if record.len() != headers.len() {
            bail!(
                "CSV row {row_no}: {} fields, expected {}",
                record.len(),
                headers.len()
            );
        }
        for (col, value) in record.iter().enumerate() {
            cells[col].push(value.trim().to_string());
        }
    }

    let mut table = ColumnTable::new();
    for (name, values) in headers.iter().zip(cells) {
        let parsed: Option<Vec<f64>> = values.iter().map(|s| s.parse::<f64>().ok()).collect();
        let column = match parsed {
            Some(floats) => Column::Float(floats),
            None => Column::Text(values),
        };
        table.insert(name, column)?;
    }
    Ok(table)
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load a Parquet file with primitive columns (floats, integers, strings).
fn load_parquet(path: &Path) -> Result<ColumnTable> {
    let file = File::open(path).context("opening parquet file")?;
    let builder =
        ParquetRecordBatchReaderBuilder::try_new(file).context("reading parquet metadata")?;
    let reader = builder.build().context("building parquet reader")?;

    let mut columns: BTreeMap<String, Column> = BTreeMap::new();
    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        let schema = batch.schema();
        for (idx, field) in schema.fields().iter().enumerate() {
            let chunk = extract_column(batch.column(idx))
                .with_context(|| format!("column '{}'", field.name()))?;
            match (columns.get_mut(field.name()), chunk) {
                (None, chunk) => {
                    columns.insert(field.name().clone(), chunk);
                }
                (Some(Column::Float(acc)), Column::Float(v)) => acc.extend(v),
                (Some(Column::Text(acc)), Column::Text(v)) => acc.extend(v),
                _ => bail!("column '{}' changes type between batches", field.name()),
            }
        }
    }

    let mut table = ColumnTable::new();
    for (name, column) in columns {
        table.insert(&name, column)?;
    }
    Ok(table)
}

// -- Parquet / Arrow helpers --

fn extract_column(col: &ArrayRef) -> Result<Column> {
    if col.null_count() > 0 {
        bail!("null values are not supported");
    }
    let column = match col.data_type() {
        DataType::Float64 => {
            let arr = downcast::<Float64Array>(col)?;
            Column::Float(arr.values().to_vec())
        }
        DataType::Float32 => {
            let arr = downcast::<Float32Array>(col)?;
            Column::Float(arr.values().iter().map(|&v| v as f64).collect())
        }
        DataType::Int32 => {
            let arr = downcast::<Int32Array>(col)?;
            Column::Float(arr.values().iter().map(|&v| v as f64).collect())
        }
        DataType::Int64 => {
            let arr = downcast::<Int64Array>(col)?;
            Column::Float(arr.values().iter().map(|&v| v as f64).collect())
        }
        DataType::Utf8 => {
            let arr = downcast::<StringArray>(col)?;
            Column::Text(arr.iter().map(|s| s.unwrap_or("").to_string()).collect())
        }
        DataType::LargeUtf8 => {
            let arr = col.as_string::<i64>();
            Column::Text(arr.iter().map(|s| s.unwrap_or("").to_string()).collect())
        }
        other => bail!("unsupported column type {other:?}"),
    };
    Ok(column)
}

fn downcast<A: Array + 'static>(col: &ArrayRef) -> Result<&A> {
    col.as_any()
        .downcast_ref::<A>()
        .with_context(|| format!("unexpected array for {:?}", col.data_type()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_columns_are_typed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.csv");
        std::fs::write(&path, "bin,w,sigma_a\nb1,550.0,1e-3\nb2,560.0,2e-3\n").unwrap();

        let t = load_table(&path).unwrap();
        assert_eq!(t.n_rows(), 2);
        assert_eq!(t.floats("w").unwrap(), &[550.0, 560.0]);
        assert_eq!(t.texts("bin").unwrap(), vec!["b1", "b2"]);
        assert!(t.floats("bin").is_err());
    }

    #[test]
    fn json_records_and_columns_agree() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.json");
        let b = dir.path().join("b.json");
        std::fs::write(&a, r#"[{"w": 550.0, "p": 1.0}, {"w": 560.0, "p": 2.0}]"#).unwrap();
        std::fs::write(&b, r#"{"w": [550.0, 560.0], "p": [1.0, 2.0]}"#).unwrap();
        assert_eq!(load_table(&a).unwrap(), load_table(&b).unwrap());
    }

    #[test]
    fn parquet_written_table_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.parquet");
        let mut t = ColumnTable::new();
        t.insert("w", Column::Float(vec![500.0, 510.0])).unwrap();
        t.insert("bin", Column::Text(vec!["a".into(), "b".into()])).unwrap();
        write_parquet(&path, &t).unwrap();
        assert_eq!(load_table(&path).unwrap(), t);
    }

    #[test]
    fn ragged_columns_are_rejected() {
        let mut t = ColumnTable::new();
        t.insert("w", Column::Float(vec![1.0, 2.0])).unwrap();
        assert!(t.insert("p", Column::Float(vec![1.0])).is_err());
    }

    #[test]
    fn unknown_extension() {
        assert!(load_table(Path::new("table.xlsx")).is_err());
    }
}
