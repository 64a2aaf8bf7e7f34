//! Upload validation.
//!
//! Every declared sheet is parsed as text, rows with a null primary id are
//! dropped, non-identifier columns are coerced to numbers, and three
//! independent checks run: column completeness, master-key validity and
//! duplicate primary keys. Sheets that fail still land in the cleaned
//! workbook so the caller can report which sheet failed and why.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use serde::ser::{SerializeMap, Serializer};
use tracing::{debug, info, warn};

use crate::schema::{ColumnKind, Master, SHEETS, SheetSchema};
use crate::table::{Cell, Table};
use crate::workbook::{StatusRecord, Workbook, WorkbookError, WorkbookReader};

/// Table holding the per-sheet outcome inside the cleaned workbook
pub const VALIDATION_SHEET: &str = "validation";

/// Outcome of one check on one sheet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Check {
    Pass,
    Fail,
    /// The check could not run (sheet unreadable, prerequisite missing)
    Unknown,
}

impl Check {
    fn failed_if(failed: bool) -> Self {
        if failed { Check::Fail } else { Check::Pass }
    }

    pub fn is_pass(&self) -> bool {
        *self == Check::Pass
    }

    /// 0 = pass, 1 = fail, null = unknown
    pub fn to_cell(self) -> Cell {
        match self {
            Check::Pass => Cell::Number(0.0),
            Check::Fail => Cell::Number(1.0),
            Check::Unknown => Cell::Null,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SheetStatus {
    /// Every required column is present
    pub column: Check,
    /// Every master-key value exists in its master table
    pub master: Check,
    /// No primary key occurs twice
    pub duplicate: Check,
    pub error: bool,
}

impl SheetStatus {
    fn new(column: Check, master: Check, duplicate: Check) -> Self {
        let error = [column, master, duplicate].iter().any(|c| !c.is_pass());
        Self {
            column,
            master,
            duplicate,
            error,
        }
    }

    /// The sheet could not be parsed at all
    pub fn unreadable() -> Self {
        Self::new(Check::Unknown, Check::Unknown, Check::Unknown)
    }
}

/// Per-sheet validation status, in schema order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    sheets: Vec<(String, SheetStatus)>,
}

impl ValidationReport {
    pub fn get(&self, sheet: &str) -> Option<&SheetStatus> {
        self.sheets.iter().find(|(n, _)| n == sheet).map(|(_, s)| s)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SheetStatus)> {
        self.sheets.iter().map(|(n, s)| (n.as_str(), s))
    }

    pub fn has_errors(&self) -> bool {
        self.sheets.iter().any(|(_, s)| s.error)
    }

    /// Sheets whose error flag is set
    pub fn failed(&self) -> impl Iterator<Item = (&str, &SheetStatus)> {
        self.iter().filter(|(_, s)| s.error)
    }

    /// Names of the sheets flagged in a persisted validation table
    pub fn failed_in(table: &Table) -> Vec<String> {
        let mut table = table.clone();
        table.coerce_numbers(|c| c == "error");
        table
            .rows()
            .filter(|row| row.number("error") != Some(0.0))
            .map(|row| row.text("sheet").unwrap_or_default().to_string())
            .collect()
    }

    pub fn to_table(&self) -> Table {
        let mut table = Table::with_columns(&["sheet", "column", "master", "duplicate", "error"]);
        for (name, s) in &self.sheets {
            table.push_row(vec![
                Cell::from(name.as_str()),
                s.column.to_cell(),
                s.master.to_cell(),
                s.duplicate.to_cell(),
                Cell::Number(if s.error { 1.0 } else { 0.0 }),
            ]);
        }
        table
    }
}

impl Serialize for ValidationReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.sheets.len()))?;
        for (name, status) in &self.sheets {
            map.serialize_entry(name, status)?;
        }
        map.end()
    }
}

/// Result of validating an upload
#[derive(Debug)]
pub struct Validation {
    pub report: ValidationReport,
    /// Cleaned copy of every readable sheet plus the status record
    pub workbook: Workbook,
}

/// Validate raw upload bytes against the schema registry
pub fn validate(bytes: Vec<u8>, status: StatusRecord) -> Validation {
    let mut reader = match WorkbookReader::new(bytes) {
        Ok(reader) => Some(reader),
        Err(e) => {
            warn!("upload is not a readable workbook: {}", e);
            None
        }
    };

    let parsed: Vec<(&SheetSchema, Result<Table, WorkbookError>)> = SHEETS
        .iter()
        .map(|schema| {
            let table = match reader.as_mut() {
                Some(reader) => reader.table(schema.name).map(|t| clean(schema, t)),
                None => Err(WorkbookError::MissingSheet(schema.name.to_string())),
            };
            (schema, table)
        })
        .collect();

    // Id sets of the masters that parsed
    let masters: HashMap<Master, HashSet<&str>> = parsed
        .iter()
        .filter_map(|(schema, table)| {
            let master = schema.master?;
            let table = table.as_ref().ok()?;
            let ids = table.rows().filter_map(|r| r.text(master.key())).collect();
            Some((master, ids))
        })
        .collect();

    let mut report = ValidationReport::default();
    let mut workbook = Workbook::new(status);

    for (schema, table) in &parsed {
        let status = match table {
            Ok(table) => {
                let status = SheetStatus::new(
                    check_columns(schema, table),
                    check_master_keys(schema, table, &masters),
                    check_duplicates(schema, table),
                );
                let declared: Vec<&str> = schema.columns.iter().map(|c| c.name).collect();
                workbook.push(schema.name, table.select(&declared));
                status
            }
            Err(e) => {
                warn!(sheet = schema.name, "sheet unreadable: {}", e);
                SheetStatus::unreadable()
            }
        };
        if status.error {
            warn!(
                sheet = schema.name,
                column = ?status.column,
                master = ?status.master,
                duplicate = ?status.duplicate,
                "sheet failed validation"
            );
        }
        report.sheets.push((schema.name.to_string(), status));
    }

    workbook.push(VALIDATION_SHEET, report.to_table());
    info!(
        sheets = report.sheets.len(),
        failed = report.failed().count(),
        "validated upload"
    );

    Validation { report, workbook }
}

/// Drop rows without a primary id and coerce non-identifier columns
pub fn clean(schema: &SheetSchema, mut table: Table) -> Table {
    if let Some(id) = schema.columns.first() {
        table.drop_null(id.name);
    }
    table.coerce_numbers(|column| {
        !matches!(
            schema.column(column).map(|c| c.kind),
            Some(ColumnKind::Key | ColumnKind::Label)
        )
    });
    table
}

fn check_columns(schema: &SheetSchema, table: &Table) -> Check {
    let missing: Vec<&str> = schema
        .required_columns()
        .filter(|c| !table.has_column(c))
        .collect();
    if !missing.is_empty() {
        debug!(sheet = schema.name, ?missing, "missing columns");
    }
    Check::failed_if(!missing.is_empty())
}

fn check_master_keys(
    schema: &SheetSchema,
    table: &Table,
    masters: &HashMap<Master, HashSet<&str>>,
) -> Check {
    if schema.is_master() {
        return Check::Pass;
    }

    let mut result = Check::Pass;
    for key in schema.key_columns().filter(|k| table.has_column(k)) {
        let Some(ids) = Master::from_key(key).and_then(|m| masters.get(&m)) else {
            return Check::Unknown;
        };
        let unknown: Vec<&str> = table
            .rows()
            .map(|r| r.text(key).unwrap_or_default())
            .filter(|v| !ids.contains(v))
            .collect();
        if !unknown.is_empty() {
            debug!(sheet = schema.name, column = key, ?unknown, "values not in master");
            result = Check::Fail;
        }
    }
    result
}

fn check_duplicates(schema: &SheetSchema, table: &Table) -> Check {
    let keys: Vec<&str> = schema.key_columns().filter(|k| table.has_column(k)).collect();
    if keys.is_empty() {
        return Check::Unknown;
    }

    let mut seen: HashSet<Vec<Option<&str>>> = HashSet::new();
    let mut duplicated = false;
    for row in table.rows() {
        let key: Vec<Option<&str>> = keys.iter().map(|k| row.text(k)).collect();
        if !seen.insert(key.clone()) {
            debug!(sheet = schema.name, ?key, "duplicate key");
            duplicated = true;
        }
    }
    Check::failed_if(duplicated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema;

    fn sheet(name: &str, csv: &str) -> (String, Table) {
        (name.to_string(), Table::from_csv_str(csv).unwrap())
    }

    fn upload(sheets: Vec<(String, Table)>) -> Vec<u8> {
        let mut workbook = Workbook::new(StatusRecord::new());
        for (name, table) in sheets {
            workbook.push(name, table);
        }
        workbook.to_bytes().unwrap()
    }

    fn base_sheets() -> Vec<(String, Table)> {
        vec![
            sheet("supply", "supply,supply_name,supply_lat,supply_long\nS1,Mill,13.7,100.5\n"),
            sheet("product", "prod,prod_name\nP1,Sugar\n"),
            sheet("route", "route,route_name\nR1,Truck\n"),
            sheet("warehouse", "wh,wh_name\nW1,Hub\n"),
            sheet("destination", "dest,dest_name\nD1,Port\n"),
            sheet("supply_param", "supply,supply_cap,supply_min,supply_max\nS1,100,0,1\n"),
            sheet("supplyproduct_param", "supply,prod,supplyprod_cap\nS1,P1,100\n"),
            sheet(
                "logistics_param",
                "supply,route,wh,dest,logis_cap,logis_min,logis_max\nS1,R1,W1,D1,100,0,1\n",
            ),
            sheet(
                "supplychain_param",
                "supply,prod,route,wh,dest,sell_price,var_cost,trans_cost\nS1,P1,R1,W1,D1,5,1,1\n",
            ),
            sheet("warehouse_param", "wh,wh_fc\nW1,10\n"),
            sheet("demand_param", "prod,dest,demand_vol\nP1,D1,50\n"),
        ]
    }

    fn replace(sheets: &mut [(String, Table)], name: &str, csv: &str) {
        for (n, t) in sheets.iter_mut() {
            if n == name {
                *t = Table::from_csv_str(csv).unwrap();
            }
        }
    }

    #[test]
    fn test_clean_upload_passes() {
        let validation = validate(upload(base_sheets()), StatusRecord::new());

        assert!(!validation.report.has_errors());
        assert_eq!(validation.report.iter().count(), schema::SHEETS.len());
        // Optional columns absent from the upload are added as nulls
        let wh = validation.workbook.table("warehouse_param").unwrap();
        assert!(wh.has_column("wh_min_vol"));
        assert!(validation.workbook.table(VALIDATION_SHEET).is_some());
    }

    #[test]
    fn test_duplicate_supply() {
        let mut sheets = base_sheets();
        replace(&mut sheets, "supply", "supply,supply_name\nS1,Mill\nS1,Mill again\n");

        let report = validate(upload(sheets), StatusRecord::new()).report;
        let status = report.get("supply").unwrap();
        assert_eq!(status.duplicate, Check::Fail);
        assert!(status.error);
        assert!(report.has_errors());
    }

    #[test]
    fn test_missing_column() {
        let mut sheets = base_sheets();
        replace(&mut sheets, "supply_param", "supply,supply_cap,supply_min\nS1,100,0\n");

        let report = validate(upload(sheets), StatusRecord::new()).report;
        let status = report.get("supply_param").unwrap();
        assert_eq!(status.column, Check::Fail);
        assert_eq!(status.duplicate, Check::Pass);
        assert!(status.error);
    }

    #[test]
    fn test_unknown_master_key() {
        let mut sheets = base_sheets();
        replace(&mut sheets, "demand_param", "prod,dest,demand_vol\nP1,D1,50\nP9,D1,5\n");

        let report = validate(upload(sheets), StatusRecord::new()).report;
        assert_eq!(report.get("demand_param").unwrap().master, Check::Fail);
        assert_eq!(report.get("product").unwrap().master, Check::Pass);
    }

    #[test]
    fn test_rows_without_id_are_dropped() {
        let mut sheets = base_sheets();
        replace(&mut sheets, "route", "route,route_name\nR1,Truck\n,Orphan\n");

        let validation = validate(upload(sheets), StatusRecord::new());
        assert!(!validation.report.has_errors());
        assert_eq!(validation.workbook.table("route").unwrap().len(), 1);
    }

    #[test]
    fn test_missing_sheet_is_unreadable() {
        let sheets = base_sheets()
            .into_iter()
            .filter(|(n, _)| n != "route")
            .collect();

        let report = validate(upload(sheets), StatusRecord::new()).report;
        assert_eq!(report.get("route").unwrap(), &SheetStatus::unreadable());
        // Tables keyed by route cannot be checked against it
        assert_eq!(report.get("logistics_param").unwrap().master, Check::Unknown);
    }

    #[test]
    fn test_garbage_upload_fails_every_sheet() {
        let report = validate(b"definitely not a workbook".to_vec(), StatusRecord::new()).report;
        assert!(report.iter().all(|(_, s)| s.error && s.column == Check::Unknown));
    }
}
