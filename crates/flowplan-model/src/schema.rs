//! Declared tables of an upload workbook.
//!
//! Five master tables carry the entity ids; six parameter tables are keyed by
//! subsets of those ids. Column names here are the wire names used in the
//! workbook headers.

use crate::table::Table;

/// How a column's cells are interpreted after parsing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Master id, part of the table's primary key
    Key,
    /// Free text kept as a string (display names)
    Label,
    /// Coerced to a number, unparseable cells become null
    Number,
}

#[derive(Debug, Clone, Copy)]
pub struct ColumnDef {
    pub name: &'static str,
    pub kind: ColumnKind,
    /// Required columns count toward column completeness
    pub required: bool,
}

/// The five master dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Master {
    Supply,
    Product,
    Route,
    Warehouse,
    Destination,
}

impl Master {
    pub const ALL: [Master; 5] = [
        Master::Supply,
        Master::Product,
        Master::Route,
        Master::Warehouse,
        Master::Destination,
    ];

    /// Id column name, shared by the master table and every table keyed by it
    pub fn key(&self) -> &'static str {
        match self {
            Master::Supply => "supply",
            Master::Product => "prod",
            Master::Route => "route",
            Master::Warehouse => "wh",
            Master::Destination => "dest",
        }
    }

    pub fn sheet(&self) -> &'static str {
        match self {
            Master::Supply => SUPPLY,
            Master::Product => PRODUCT,
            Master::Route => ROUTE,
            Master::Warehouse => WAREHOUSE,
            Master::Destination => DESTINATION,
        }
    }

    pub fn from_key(column: &str) -> Option<Master> {
        Master::ALL.into_iter().find(|m| m.key() == column)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SheetSchema {
    pub name: &'static str,
    pub columns: &'static [ColumnDef],
    /// Set for master tables
    pub master: Option<Master>,
}

impl SheetSchema {
    pub fn is_master(&self) -> bool {
        self.master.is_some()
    }

    /// Primary key columns, in declaration order
    pub fn key_columns(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns
            .iter()
            .filter(|c| c.kind == ColumnKind::Key)
            .map(|c| c.name)
    }

    pub fn required_columns(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns.iter().filter(|c| c.required).map(|c| c.name)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Header-only table for the input template
    pub fn empty_table(&self) -> Table {
        Table::new(self.columns.iter().map(|c| c.name.to_string()).collect())
    }
}

pub const SUPPLY: &str = "supply";
pub const PRODUCT: &str = "product";
pub const ROUTE: &str = "route";
pub const WAREHOUSE: &str = "warehouse";
pub const DESTINATION: &str = "destination";
pub const SUPPLY_PARAM: &str = "supply_param";
pub const SUPPLY_PRODUCT_PARAM: &str = "supplyproduct_param";
pub const LOGISTICS_PARAM: &str = "logistics_param";
pub const SUPPLY_CHAIN_PARAM: &str = "supplychain_param";
pub const WAREHOUSE_PARAM: &str = "warehouse_param";
pub const DEMAND_PARAM: &str = "demand_param";

const fn key(name: &'static str) -> ColumnDef {
    ColumnDef {
        name,
        kind: ColumnKind::Key,
        required: true,
    }
}

const fn label(name: &'static str) -> ColumnDef {
    ColumnDef {
        name,
        kind: ColumnKind::Label,
        required: true,
    }
}

const fn number(name: &'static str) -> ColumnDef {
    ColumnDef {
        name,
        kind: ColumnKind::Number,
        required: true,
    }
}

const fn optional(name: &'static str) -> ColumnDef {
    ColumnDef {
        name,
        kind: ColumnKind::Number,
        required: false,
    }
}

/// Every table an upload must contain, masters first
pub static SHEETS: &[SheetSchema] = &[
    SheetSchema {
        name: SUPPLY,
        columns: &[
            key("supply"),
            label("supply_name"),
            optional("supply_lat"),
            optional("supply_long"),
        ],
        master: Some(Master::Supply),
    },
    SheetSchema {
        name: PRODUCT,
        columns: &[key("prod"), label("prod_name")],
        master: Some(Master::Product),
    },
    SheetSchema {
        name: ROUTE,
        columns: &[key("route"), label("route_name")],
        master: Some(Master::Route),
    },
    SheetSchema {
        name: WAREHOUSE,
        columns: &[
            key("wh"),
            label("wh_name"),
            optional("wh_lat"),
            optional("wh_long"),
        ],
        master: Some(Master::Warehouse),
    },
    SheetSchema {
        name: DESTINATION,
        columns: &[
            key("dest"),
            label("dest_name"),
            optional("dest_lat"),
            optional("dest_long"),
        ],
        master: Some(Master::Destination),
    },
    SheetSchema {
        name: SUPPLY_PARAM,
        columns: &[
            key("supply"),
            number("supply_cap"),
            number("supply_min"),
            number("supply_max"),
        ],
        master: None,
    },
    SheetSchema {
        name: SUPPLY_PRODUCT_PARAM,
        columns: &[key("supply"), key("prod"), number("supplyprod_cap")],
        master: None,
    },
    SheetSchema {
        name: LOGISTICS_PARAM,
        columns: &[
            key("supply"),
            key("route"),
            key("wh"),
            key("dest"),
            number("logis_cap"),
            number("logis_min"),
            number("logis_max"),
        ],
        master: None,
    },
    SheetSchema {
        name: SUPPLY_CHAIN_PARAM,
        columns: &[
            key("supply"),
            key("prod"),
            key("route"),
            key("wh"),
            key("dest"),
            number("sell_price"),
            number("var_cost"),
            number("trans_cost"),
        ],
        master: None,
    },
    SheetSchema {
        name: WAREHOUSE_PARAM,
        columns: &[
            key("wh"),
            number("wh_fc"),
            optional("wh_min_vol"),
            optional("wh_max_vol"),
        ],
        master: None,
    },
    SheetSchema {
        name: DEMAND_PARAM,
        columns: &[key("prod"), key("dest"), number("demand_vol")],
        master: None,
    },
];

pub fn sheet(name: &str) -> Option<&'static SheetSchema> {
    SHEETS.iter().find(|s| s.name == name)
}
