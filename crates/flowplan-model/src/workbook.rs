//! Multi-table workbook artifacts.
//!
//! A workbook is a zip archive holding one CSV member per table
//! (`<name>.csv`). The reserved `status.csv` member carries the accumulated
//! status record as `key,value` rows, which is how a stateless caller
//! recovers pipeline progress from storage alone.

use std::io::{Cursor, Write};

use serde::ser::{Serialize, SerializeMap, Serializer};
use thiserror::Error;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::table::{Cell, Table};

pub const STATUS_SHEET: &str = "status";

#[derive(Error, Debug)]
pub enum WorkbookError {
    #[error("Not a workbook archive: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("Sheet {0} is missing")]
    MissingSheet(String),
    #[error("Sheet {sheet} is unreadable: {source}")]
    Csv {
        sheet: String,
        #[source]
        source: csv::Error,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Ordered key/value metadata carried forward through every artifact
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusRecord {
    entries: Vec<(String, String)>,
}

impl StatusRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a key, replacing an earlier value in place
    pub fn set(&mut self, key: impl Into<String>, value: impl ToString) {
        let key = key.into();
        let value = value.to_string();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn merge(&mut self, other: &StatusRecord) {
        for (k, v) in &other.entries {
            self.set(k.clone(), v);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_table(&self) -> Table {
        let mut table = Table::with_columns(&["key", "value"]);
        for (k, v) in &self.entries {
            table.push_row(vec![Cell::from(k.as_str()), Cell::from(v.as_str())]);
        }
        table
    }

    pub fn from_table(table: &Table) -> Self {
        let mut record = Self::new();
        for row in table.rows() {
            if let Some(key) = row.text("key") {
                record.set(key, row.text("value").unwrap_or_default());
            }
        }
        record
    }
}

impl Serialize for StatusRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// A workbook being assembled for writing
#[derive(Debug, Clone, Default)]
pub struct Workbook {
    status: StatusRecord,
    sheets: Vec<(String, Table)>,
}

impl Workbook {
    pub fn new(status: StatusRecord) -> Self {
        Self {
            status,
            sheets: Vec::new(),
        }
    }

    pub fn status(&self) -> &StatusRecord {
        &self.status
    }

    pub fn status_mut(&mut self) -> &mut StatusRecord {
        &mut self.status
    }

    /// Add a table, replacing any table of the same name
    pub fn push(&mut self, name: impl Into<String>, table: Table) {
        let name = name.into();
        match self.sheets.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = table,
            None => self.sheets.push((name, table)),
        }
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.sheets.iter().find(|(n, _)| n == name).map(|(_, t)| t)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, WorkbookError> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

        let status = self.status.to_table();
        let sheets = std::iter::once((STATUS_SHEET, &status))
            .chain(self.sheets.iter().map(|(n, t)| (n.as_str(), t)));
        for (name, table) in sheets {
            zip.start_file(member_name(name), options)?;
            write_table(&mut zip, name, table)?;
        }

        Ok(zip.finish()?.into_inner())
    }
}

fn write_table<W: Write>(writer: W, name: &str, table: &Table) -> Result<(), WorkbookError> {
    table.write_csv(writer).map_err(|source| WorkbookError::Csv {
        sheet: name.to_string(),
        source,
    })
}

fn member_name(sheet: &str) -> String {
    format!("{}.csv", sheet)
}

/// Random access to the tables of a stored or uploaded workbook
pub struct WorkbookReader {
    archive: ZipArchive<Cursor<Vec<u8>>>,
}

impl WorkbookReader {
    pub fn new(bytes: Vec<u8>) -> Result<Self, WorkbookError> {
        Ok(Self {
            archive: ZipArchive::new(Cursor::new(bytes))?,
        })
    }

    pub fn has_sheet(&self, name: &str) -> bool {
        let member = member_name(name);
        self.archive.file_names().any(|f| f == member)
    }

    /// Parse one table with every cell as text
    pub fn table(&mut self, name: &str) -> Result<Table, WorkbookError> {
        let file = match self.archive.by_name(&member_name(name)) {
            Ok(file) => file,
            Err(zip::result::ZipError::FileNotFound) => {
                return Err(WorkbookError::MissingSheet(name.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        Table::read_csv(file).map_err(|source| WorkbookError::Csv {
            sheet: name.to_string(),
            source,
        })
    }

    /// The embedded status record, empty when the workbook has none
    pub fn status(&mut self) -> Result<StatusRecord, WorkbookError> {
        if !self.has_sheet(STATUS_SHEET) {
            return Ok(StatusRecord::new());
        }
        Ok(StatusRecord::from_table(&self.table(STATUS_SHEET)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_record_replaces_in_place() {
        let mut status = StatusRecord::new();
        status.set("upload_user", "alice");
        status.set("upload_datetime", "2024-01-01 00:00:00");
        status.set("upload_user", "bob");

        let keys: Vec<_> = status.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["upload_user", "upload_datetime"]);
        assert_eq!(status.get("upload_user"), Some("bob"));
    }

    #[test]
    fn test_workbook_carries_status_and_tables() {
        let mut status = StatusRecord::new();
        status.set("upload_user", "alice");
        status.set("optimize_solvetime_sec", 0.25);

        let mut workbook = Workbook::new(status.clone());
        let mut route = Table::with_columns(&["route", "route_name"]);
        route.push_row(vec!["R1".into(), "Truck".into()]);
        workbook.push("route", route);

        let mut reader = WorkbookReader::new(workbook.to_bytes().unwrap()).unwrap();
        assert_eq!(reader.status().unwrap(), status);
        assert!(reader.has_sheet("route"));

        let table = reader.table("route").unwrap();
        let row = table.rows().next().unwrap();
        assert_eq!(row.text("route_name"), Some("Truck"));
        assert!(matches!(
            reader.table("product"),
            Err(WorkbookError::MissingSheet(name)) if name == "product"
        ));
    }

    #[test]
    fn test_garbage_is_not_a_workbook() {
        assert!(matches!(
            WorkbookReader::new(b"not a zip".to_vec()),
            Err(WorkbookError::Archive(_))
        ));
    }
}
