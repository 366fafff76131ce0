//! The pluggable workbook source boundary.
//!
//! Byte-level decoding of workbook formats lives outside this crate; the
//! engine only consumes the record stream defined here. Two implementations
//! ship with the crate: an in-memory builder for tests and embedders, and a
//! reader for the JSON workbook-dump format the CLI accepts.

use crate::core::{AnalysisError, Result, Value};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// One populated cell as reported by a workbook source.
#[derive(Debug, Clone, PartialEq)]
pub struct CellRecord {
    pub sheet: String,
    pub row: u32,
    pub col: u32,
    pub raw_value: Option<Value>,
    pub formula: Option<String>,
}

/// A finite, restartable source of workbook records.
///
/// Errors from the source are fatal to the run.
pub trait WorkbookReader {
    /// Iterate the populated cells. May be called more than once.
    fn records(&self) -> Result<Box<dyn Iterator<Item = Result<CellRecord>> + '_>>;

    /// Sheet names in workbook order.
    fn sheet_names(&self) -> Result<Vec<String>>;

    /// Workbook-scoped named ranges as `(name, definition_string)` pairs.
    fn named_ranges(&self) -> Result<Vec<(String, String)>>;
}

/// In-memory workbook for tests and embedding callers.
#[derive(Debug, Clone, Default)]
pub struct MemoryWorkbook {
    records: Vec<CellRecord>,
    sheets: Vec<String>,
    named: Vec<(String, String)>,
}

impl MemoryWorkbook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a cell; the sheet is registered on first use.
    pub fn cell(
        mut self,
        sheet: &str,
        row: u32,
        col: u32,
        value: Option<Value>,
        formula: Option<&str>,
    ) -> Self {
        if !self.sheets.iter().any(|s| s == sheet) {
            self.sheets.push(sheet.to_string());
        }
        self.records.push(CellRecord {
            sheet: sheet.to_string(),
            row,
            col,
            raw_value: value,
            formula: formula.map(String::from),
        });
        self
    }

    /// Shorthand for a literal numeric cell.
    pub fn number(self, sheet: &str, row: u32, col: u32, n: f64) -> Self {
        self.cell(sheet, row, col, Some(Value::Number(n)), None)
    }

    /// Shorthand for a literal text cell.
    pub fn text(self, sheet: &str, row: u32, col: u32, s: &str) -> Self {
        self.cell(sheet, row, col, Some(Value::Text(s.to_string())), None)
    }

    /// Shorthand for a formula cell with no cached value.
    pub fn formula(self, sheet: &str, row: u32, col: u32, f: &str) -> Self {
        self.cell(sheet, row, col, None, Some(f))
    }

    pub fn named_range(mut self, name: &str, definition: &str) -> Self {
        self.named.push((name.to_string(), definition.to_string()));
        self
    }
}

impl WorkbookReader for MemoryWorkbook {
    fn records(&self) -> Result<Box<dyn Iterator<Item = Result<CellRecord>> + '_>> {
        Ok(Box::new(self.records.iter().cloned().map(Ok)))
    }

    fn sheet_names(&self) -> Result<Vec<String>> {
        Ok(self.sheets.clone())
    }

    fn named_ranges(&self) -> Result<Vec<(String, String)>> {
        Ok(self.named.clone())
    }
}

/// Serialized workbook-dump format consumed by the CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct WorkbookDump {
    sheets: Vec<SheetDump>,
    #[serde(default)]
    named_ranges: Vec<NamedRangeDump>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SheetDump {
    name: String,
    #[serde(default)]
    cells: Vec<CellDump>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CellDump {
    row: u32,
    col: u32,
    #[serde(default)]
    value: Option<serde_json::Value>,
    #[serde(default)]
    formula: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct NamedRangeDump {
    name: String,
    definition: String,
}

/// Reads the JSON workbook-dump produced by an external byte decoder.
#[derive(Debug)]
pub struct JsonWorkbookReader {
    dump: WorkbookDump,
}

impl JsonWorkbookReader {
    pub fn from_path(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            AnalysisError::reader_with(format!("cannot open workbook dump {}", path.display()), e)
        })?;
        let dump = serde_json::from_reader(BufReader::new(file)).map_err(|e| {
            AnalysisError::reader_with(format!("malformed workbook dump {}", path.display()), e)
        })?;
        Ok(Self { dump })
    }

    pub fn from_str(json: &str) -> Result<Self> {
        let dump = serde_json::from_str(json)
            .map_err(|e| AnalysisError::reader_with("malformed workbook dump", e))?;
        Ok(Self { dump })
    }

    fn convert_value(v: &serde_json::Value) -> Result<Option<Value>> {
        match v {
            serde_json::Value::Null => Ok(None),
            serde_json::Value::String(s) => Ok(Some(Value::Text(s.clone()))),
            serde_json::Value::Bool(b) => Ok(Some(Value::Bool(*b))),
            serde_json::Value::Number(n) => Ok(Some(Value::Number(n.as_f64().ok_or_else(
                || AnalysisError::reader(format!("non-finite number in dump: {n}")),
            )?))),
            other => Err(AnalysisError::reader(format!(
                "unsupported cell value in dump: {other}"
            ))),
        }
    }
}

impl WorkbookReader for JsonWorkbookReader {
    fn records(&self) -> Result<Box<dyn Iterator<Item = Result<CellRecord>> + '_>> {
        let iter = self.dump.sheets.iter().flat_map(|sheet| {
            sheet.cells.iter().map(move |cell| {
                let raw_value = match &cell.value {
                    Some(v) => Self::convert_value(v)?,
                    None => None,
                };
                Ok(CellRecord {
                    sheet: sheet.name.clone(),
                    row: cell.row,
                    col: cell.col,
                    raw_value,
                    formula: cell.formula.clone(),
                })
            })
        });
        Ok(Box::new(iter))
    }

    fn sheet_names(&self) -> Result<Vec<String>> {
        Ok(self.dump.sheets.iter().map(|s| s.name.clone()).collect())
    }

    fn named_ranges(&self) -> Result<Vec<(String, String)>> {
        Ok(self
            .dump
            .named_ranges
            .iter()
            .map(|n| (n.name.clone(), n.definition.clone()))
            .collect())
    }
}
