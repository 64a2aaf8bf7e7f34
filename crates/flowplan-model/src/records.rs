//! Typed rows for each declared table.

use crate::schema;
use crate::table::Row;

/// A row type that can be read out of its workbook table
pub trait Record: Sized {
    const SHEET: &'static str;

    /// `None` when the row lacks a field the record cannot do without
    fn from_row(row: Row<'_>) -> Option<Self>;
}

fn text(row: &Row<'_>, column: &str) -> Option<String> {
    row.text(column).map(str::to_string)
}

/// cap × fraction, null when either side is null
fn scaled(cap: Option<f64>, fraction: Option<f64>) -> Option<f64> {
    Some(cap? * fraction?)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Supply {
    pub id: String,
    pub name: Option<String>,
    pub lat: Option<f64>,
    pub long: Option<f64>,
}

impl Record for Supply {
    const SHEET: &'static str = schema::SUPPLY;

    fn from_row(row: Row<'_>) -> Option<Self> {
        Some(Self {
            id: text(&row, "supply")?,
            name: text(&row, "supply_name"),
            lat: row.number("supply_lat"),
            long: row.number("supply_long"),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Product {
    pub id: String,
    pub name: Option<String>,
}

impl Record for Product {
    const SHEET: &'static str = schema::PRODUCT;

    fn from_row(row: Row<'_>) -> Option<Self> {
        Some(Self {
            id: text(&row, "prod")?,
            name: text(&row, "prod_name"),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub id: String,
    pub name: Option<String>,
}

impl Record for Route {
    const SHEET: &'static str = schema::ROUTE;

    fn from_row(row: Row<'_>) -> Option<Self> {
        Some(Self {
            id: text(&row, "route")?,
            name: text(&row, "route_name"),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Warehouse {
    pub id: String,
    pub name: Option<String>,
    pub lat: Option<f64>,
    pub long: Option<f64>,
}

impl Record for Warehouse {
    const SHEET: &'static str = schema::WAREHOUSE;

    fn from_row(row: Row<'_>) -> Option<Self> {
        Some(Self {
            id: text(&row, "wh")?,
            name: text(&row, "wh_name"),
            lat: row.number("wh_lat"),
            long: row.number("wh_long"),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Destination {
    pub id: String,
    pub name: Option<String>,
    pub lat: Option<f64>,
    pub long: Option<f64>,
}

impl Record for Destination {
    const SHEET: &'static str = schema::DESTINATION;

    fn from_row(row: Row<'_>) -> Option<Self> {
        Some(Self {
            id: text(&row, "dest")?,
            name: text(&row, "dest_name"),
            lat: row.number("dest_lat"),
            long: row.number("dest_long"),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SupplyParam {
    pub supply: String,
    pub cap: Option<f64>,
    /// Minimum utilization fraction
    pub min: Option<f64>,
    /// Maximum utilization fraction
    pub max: Option<f64>,
}

impl SupplyParam {
    pub fn min_vol(&self) -> Option<f64> {
        scaled(self.cap, self.min)
    }

    pub fn max_vol(&self) -> Option<f64> {
        scaled(self.cap, self.max)
    }
}

impl Record for SupplyParam {
    const SHEET: &'static str = schema::SUPPLY_PARAM;

    fn from_row(row: Row<'_>) -> Option<Self> {
        Some(Self {
            supply: text(&row, "supply")?,
            cap: row.number("supply_cap"),
            min: row.number("supply_min"),
            max: row.number("supply_max"),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SupplyProductParam {
    pub supply: String,
    pub prod: String,
    pub cap: Option<f64>,
}

impl Record for SupplyProductParam {
    const SHEET: &'static str = schema::SUPPLY_PRODUCT_PARAM;

    fn from_row(row: Row<'_>) -> Option<Self> {
        Some(Self {
            supply: text(&row, "supply")?,
            prod: text(&row, "prod")?,
            cap: row.number("supplyprod_cap"),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogisticsParam {
    pub supply: String,
    pub route: String,
    pub wh: String,
    pub dest: String,
    pub cap: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl LogisticsParam {
    pub fn min_vol(&self) -> Option<f64> {
        scaled(self.cap, self.min)
    }

    pub fn max_vol(&self) -> Option<f64> {
        scaled(self.cap, self.max)
    }
}

impl Record for LogisticsParam {
    const SHEET: &'static str = schema::LOGISTICS_PARAM;

    fn from_row(row: Row<'_>) -> Option<Self> {
        Some(Self {
            supply: text(&row, "supply")?,
            route: text(&row, "route")?,
            wh: text(&row, "wh")?,
            dest: text(&row, "dest")?,
            cap: row.number("logis_cap"),
            min: row.number("logis_min"),
            max: row.number("logis_max"),
        })
    }
}

/// Price and cost of one (supply, product, route, warehouse, destination)
/// combination. Rows with any null field are not records at all.
#[derive(Debug, Clone, PartialEq)]
pub struct SupplyChainParam {
    pub supply: String,
    pub prod: String,
    pub route: String,
    pub wh: String,
    pub dest: String,
    pub sell_price: f64,
    pub var_cost: f64,
    pub trans_cost: f64,
}

impl Record for SupplyChainParam {
    const SHEET: &'static str = schema::SUPPLY_CHAIN_PARAM;

    fn from_row(row: Row<'_>) -> Option<Self> {
        Some(Self {
            supply: text(&row, "supply")?,
            prod: text(&row, "prod")?,
            route: text(&row, "route")?,
            wh: text(&row, "wh")?,
            dest: text(&row, "dest")?,
            sell_price: row.number("sell_price")?,
            var_cost: row.number("var_cost")?,
            trans_cost: row.number("trans_cost")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WarehouseParam {
    pub wh: String,
    /// Fixed cost charged when the warehouse is open
    pub fc: Option<f64>,
    pub min_vol: Option<f64>,
    pub max_vol: Option<f64>,
}

impl Record for WarehouseParam {
    const SHEET: &'static str = schema::WAREHOUSE_PARAM;

    fn from_row(row: Row<'_>) -> Option<Self> {
        Some(Self {
            wh: text(&row, "wh")?,
            fc: row.number("wh_fc"),
            min_vol: row.number("wh_min_vol"),
            max_vol: row.number("wh_max_vol"),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DemandParam {
    pub prod: String,
    pub dest: String,
    pub demand: Option<f64>,
}

impl Record for DemandParam {
    const SHEET: &'static str = schema::DEMAND_PARAM;

    fn from_row(row: Row<'_>) -> Option<Self> {
        Some(Self {
            prod: text(&row, "prod")?,
            dest: text(&row, "dest")?,
            demand: row.number("demand_vol"),
        })
    }
}
