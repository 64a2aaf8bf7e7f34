//! Rectangular tables with a header row.
//!
//! Cells start out as text when parsed from CSV; numeric columns are then
//! coerced, and a cell that fails coercion becomes [`Cell::Null`] instead of
//! raising, so bad input shows up downstream as missing data.

use std::fmt;
use std::io::{Read, Write};

static NULL: Cell = Cell::Null;

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Text(String),
    Number(f64),
    Bool(bool),
}

impl Cell {
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Convert a text cell to a number; anything unparseable becomes null
    pub fn coerce_number(self) -> Cell {
        match self {
            Cell::Text(s) => match s.trim().parse::<f64>() {
                Ok(n) if n.is_finite() => Cell::Number(n),
                _ => Cell::Null,
            },
            Cell::Number(n) if !n.is_finite() => Cell::Null,
            Cell::Bool(b) => Cell::Number(if b { 1.0 } else { 0.0 }),
            other => other,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Null => Ok(()),
            Cell::Text(s) => f.write_str(s),
            Cell::Number(n) => write!(f, "{}", n),
            Cell::Bool(b) => write!(f, "{}", b),
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Text(s.to_string())
    }
}

impl From<String> for Cell {
    fn from(s: String) -> Self {
        Cell::Text(s)
    }
}

impl From<f64> for Cell {
    fn from(n: f64) -> Self {
        Cell::Number(n).coerce_number()
    }
}

impl From<usize> for Cell {
    fn from(n: usize) -> Self {
        Cell::Number(n as f64)
    }
}

impl From<bool> for Cell {
    fn from(b: bool) -> Self {
        Cell::Bool(b)
    }
}

impl<T: Into<Cell>> From<Option<T>> for Cell {
    fn from(value: Option<T>) -> Self {
        value.map_or(Cell::Null, Into::into)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

/// Borrowed view of one table row, addressed by column name
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    columns: &'a [String],
    cells: &'a [Cell],
}

impl<'a> Row<'a> {
    pub fn get(&self, column: &str) -> &'a Cell {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|i| self.cells.get(i))
            .unwrap_or(&NULL)
    }

    pub fn text(&self, column: &str) -> Option<&'a str> {
        self.get(column).as_text()
    }

    pub fn number(&self, column: &str) -> Option<f64> {
        self.get(column).as_number()
    }
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn with_columns(columns: &[&str]) -> Self {
        Self::new(columns.iter().map(|c| c.to_string()).collect())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Append a row, padding with nulls or truncating to the header width
    pub fn push_row(&mut self, mut cells: Vec<Cell>) {
        cells.resize(self.columns.len(), Cell::Null);
        self.rows.push(cells);
    }

    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        self.rows.iter().map(|cells| Row {
            columns: &self.columns,
            cells,
        })
    }

    /// Drop rows whose cell in `column` is null
    pub fn drop_null(&mut self, column: &str) {
        if let Some(i) = self.columns.iter().position(|c| c == column) {
            self.rows.retain(|r| !r[i].is_null());
        } else {
            self.rows.clear();
        }
    }

    /// Coerce every column for which `numeric` returns true
    pub fn coerce_numbers(&mut self, numeric: impl Fn(&str) -> bool) {
        let targets: Vec<usize> = (0..self.columns.len())
            .filter(|&i| numeric(&self.columns[i]))
            .collect();
        for row in &mut self.rows {
            for &i in &targets {
                let cell = std::mem::replace(&mut row[i], Cell::Null);
                row[i] = cell.coerce_number();
            }
        }
    }

    /// Project onto `columns`, filling absent ones with nulls
    pub fn select(&self, columns: &[&str]) -> Table {
        let mut out = Table::with_columns(columns);
        for row in self.rows() {
            out.push_row(columns.iter().map(|c| row.get(c).clone()).collect());
        }
        out
    }

    pub fn read_csv<R: Read>(reader: R) -> Result<Table, csv::Error> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(reader);
        let columns = reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        let mut table = Table::new(columns);
        for record in reader.records() {
            let record = record?;
            table.push_row(
                record
                    .iter()
                    .map(|field| {
                        let field = field.trim();
                        if field.is_empty() {
                            Cell::Null
                        } else {
                            Cell::Text(field.to_string())
                        }
                    })
                    .collect(),
            );
        }
        Ok(table)
    }

    pub fn from_csv_str(source: &str) -> Result<Table, csv::Error> {
        Self::read_csv(source.as_bytes())
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), csv::Error> {
        let mut writer = csv::Writer::from_writer(writer);
        writer.write_record(&self.columns)?;
        for row in &self.rows {
            writer.write_record(row.iter().map(|c| c.to_string()))?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coercion_failure_becomes_null() {
        assert_eq!(Cell::from("12.5").coerce_number(), Cell::Number(12.5));
        assert_eq!(Cell::from(" 7 ").coerce_number(), Cell::Number(7.0));
        assert_eq!(Cell::from("n/a").coerce_number(), Cell::Null);
        assert_eq!(Cell::from("NaN").coerce_number(), Cell::Null);
        assert_eq!(Cell::Null.coerce_number(), Cell::Null);
    }

    #[test]
    fn test_read_csv_and_coerce() {
        let mut table = Table::from_csv_str(
            "supply,supply_cap,supply_min\n\
             S1,100,0.5\n\
             ,200,0\n\
             S3,lots,\n",
        )
        .unwrap();
        table.drop_null("supply");
        table.coerce_numbers(|c| c != "supply");

        assert_eq!(table.len(), 2);
        let rows: Vec<_> = table.rows().collect();
        assert_eq!(rows[0].text("supply"), Some("S1"));
        assert_eq!(rows[0].number("supply_cap"), Some(100.0));
        assert_eq!(rows[1].number("supply_cap"), None);
        assert!(rows[1].get("supply_min").is_null());
        assert!(rows[1].get("missing").is_null());
    }

    #[test]
    fn test_ragged_csv_is_an_error() {
        assert!(Table::from_csv_str("a,b\n1,2,3\n").is_err());
    }

    #[test]
    fn test_write_csv() {
        let mut table = Table::with_columns(&["id", "vol", "ok"]);
        table.push_row(vec!["S1".into(), 50.0.into(), true.into()]);
        table.push_row(vec!["S2".into(), Cell::Null]);

        let mut out = Vec::new();
        table.write_csv(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "id,vol,ok\nS1,50,true\nS2,,\n");
    }

    #[test]
    fn test_select_fills_missing_columns() {
        let table = Table::from_csv_str("wh,wh_fc\nW1,10\n").unwrap();
        let projected = table.select(&["wh", "wh_fc", "wh_min_vol"]);
        assert_eq!(projected.columns(), &["wh", "wh_fc", "wh_min_vol"]);
        assert!(projected.rows().next().unwrap().get("wh_min_vol").is_null());
    }
}
