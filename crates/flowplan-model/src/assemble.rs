//! Data assembly.
//!
//! Reloads the validated workbook into typed records and joins every
//! parameter onto the priced supply chain rows, producing one
//! [`FeasibleEdge`] per (supply, product, route, warehouse, destination)
//! combination. Joins are left joins: a missing parameter row leaves the
//! corresponding fields null rather than dropping the edge.

use std::collections::HashMap;

use thiserror::Error;
use tracing::info;

use crate::records::*;
use crate::schema;
use crate::validate::clean;
use crate::workbook::{WorkbookError, WorkbookReader};

#[derive(Error, Debug)]
pub enum AssembleError {
    #[error("Cannot load validated input: {0}")]
    Workbook(#[from] WorkbookError),
}

/// Identity of a feasible edge
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeKey {
    pub supply: String,
    pub prod: String,
    pub route: String,
    pub wh: String,
    pub dest: String,
}

impl From<&SupplyChainParam> for EdgeKey {
    fn from(p: &SupplyChainParam) -> Self {
        Self {
            supply: p.supply.clone(),
            prod: p.prod.clone(),
            route: p.route.clone(),
            wh: p.wh.clone(),
            dest: p.dest.clone(),
        }
    }
}

/// A priced combination with every attribute the later stages need
#[derive(Debug, Clone, PartialEq)]
pub struct FeasibleEdge {
    pub key: EdgeKey,

    pub supply_name: Option<String>,
    pub supply_lat: Option<f64>,
    pub supply_long: Option<f64>,
    pub prod_name: Option<String>,
    pub route_name: Option<String>,
    pub wh_name: Option<String>,
    pub wh_lat: Option<f64>,
    pub wh_long: Option<f64>,
    pub dest_name: Option<String>,
    pub dest_lat: Option<f64>,
    pub dest_long: Option<f64>,

    pub supply_cap: Option<f64>,
    pub supply_min: Option<f64>,
    pub supply_max: Option<f64>,
    pub supply_min_vol: Option<f64>,
    pub supply_max_vol: Option<f64>,
    pub supplyprod_cap: Option<f64>,
    pub logis_cap: Option<f64>,
    pub logis_min: Option<f64>,
    pub logis_max: Option<f64>,
    pub logis_min_vol: Option<f64>,
    pub logis_max_vol: Option<f64>,

    pub sell_price: f64,
    pub var_cost: f64,
    pub trans_cost: f64,

    pub wh_fc: Option<f64>,
    pub wh_min_vol: Option<f64>,
    pub wh_max_vol: Option<f64>,
    pub demand_vol: Option<f64>,
}

impl FeasibleEdge {
    /// Contribution of one unit shipped along this edge
    pub fn unit_margin(&self) -> f64 {
        self.sell_price - self.var_cost - self.trans_cost
    }
}

/// All tables of one pipeline run plus the joined edges
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub supplies: Vec<Supply>,
    pub products: Vec<Product>,
    pub routes: Vec<Route>,
    pub warehouses: Vec<Warehouse>,
    pub destinations: Vec<Destination>,
    pub supply_params: Vec<SupplyParam>,
    pub supply_product_params: Vec<SupplyProductParam>,
    pub logistics_params: Vec<LogisticsParam>,
    /// Only complete rows with a positive sell price
    pub supply_chain_params: Vec<SupplyChainParam>,
    pub warehouse_params: Vec<WarehouseParam>,
    pub demand_params: Vec<DemandParam>,
    pub edges: Vec<FeasibleEdge>,
}

impl Dataset {
    /// Load a validated workbook and assemble the feasible edges
    pub fn from_reader(reader: &mut WorkbookReader) -> Result<Self, AssembleError> {
        let mut dataset = Self {
            supplies: load(reader)?,
            products: load(reader)?,
            routes: load(reader)?,
            warehouses: load(reader)?,
            destinations: load(reader)?,
            supply_params: load(reader)?,
            supply_product_params: load(reader)?,
            logistics_params: load(reader)?,
            supply_chain_params: load(reader)?,
            warehouse_params: load(reader)?,
            demand_params: load(reader)?,
            edges: Vec::new(),
        };
        dataset.rebuild_edges();

        info!(
            supplies = dataset.supplies.len(),
            products = dataset.products.len(),
            warehouses = dataset.warehouses.len(),
            destinations = dataset.destinations.len(),
            edges = dataset.edges.len(),
            "assembled dataset"
        );
        Ok(dataset)
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, AssembleError> {
        Self::from_reader(&mut WorkbookReader::new(bytes)?)
    }

    /// Sum of every declared demand
    pub fn total_demand(&self) -> f64 {
        self.demand_params.iter().filter_map(|d| d.demand).sum()
    }

    /// Drop unpriced supply chain rows and join every parameter onto the rest
    pub fn rebuild_edges(&mut self) {
        self.supply_chain_params.retain(|p| p.sell_price > 0.0);
        self.edges = self.join();
    }

    fn join(&self) -> Vec<FeasibleEdge> {
        let supplies: HashMap<&str, &Supply> = index(&self.supplies, |s| s.id.as_str());
        let products: HashMap<&str, &Product> = index(&self.products, |p| p.id.as_str());
        let routes: HashMap<&str, &Route> = index(&self.routes, |r| r.id.as_str());
        let warehouses: HashMap<&str, &Warehouse> = index(&self.warehouses, |w| w.id.as_str());
        let destinations: HashMap<&str, &Destination> =
            index(&self.destinations, |d| d.id.as_str());
        let supply_params = index(&self.supply_params, |p| p.supply.as_str());
        let supply_product_params = index(&self.supply_product_params, |p| {
            (p.supply.as_str(), p.prod.as_str())
        });
        let logistics_params = index(&self.logistics_params, |p| {
            (
                p.supply.as_str(),
                p.route.as_str(),
                p.wh.as_str(),
                p.dest.as_str(),
            )
        });
        let warehouse_params = index(&self.warehouse_params, |p| p.wh.as_str());
        let demand_params = index(&self.demand_params, |p| (p.prod.as_str(), p.dest.as_str()));

        self.supply_chain_params
            .iter()
            .map(|p| {
                let supply = supplies.get(p.supply.as_str());
                let warehouse = warehouses.get(p.wh.as_str());
                let destination = destinations.get(p.dest.as_str());
                let supply_param = supply_params.get(p.supply.as_str());
                let logistics = logistics_params.get(&(
                    p.supply.as_str(),
                    p.route.as_str(),
                    p.wh.as_str(),
                    p.dest.as_str(),
                ));
                let wh_param = warehouse_params.get(p.wh.as_str());

                FeasibleEdge {
                    key: EdgeKey::from(p),
                    supply_name: supply.and_then(|s| s.name.clone()),
                    supply_lat: supply.and_then(|s| s.lat),
                    supply_long: supply.and_then(|s| s.long),
                    prod_name: products.get(p.prod.as_str()).and_then(|x| x.name.clone()),
                    route_name: routes.get(p.route.as_str()).and_then(|x| x.name.clone()),
                    wh_name: warehouse.and_then(|w| w.name.clone()),
                    wh_lat: warehouse.and_then(|w| w.lat),
                    wh_long: warehouse.and_then(|w| w.long),
                    dest_name: destination.and_then(|d| d.name.clone()),
                    dest_lat: destination.and_then(|d| d.lat),
                    dest_long: destination.and_then(|d| d.long),
                    supply_cap: supply_param.and_then(|s| s.cap),
                    supply_min: supply_param.and_then(|s| s.min),
                    supply_max: supply_param.and_then(|s| s.max),
                    supply_min_vol: supply_param.and_then(|s| s.min_vol()),
                    supply_max_vol: supply_param.and_then(|s| s.max_vol()),
                    supplyprod_cap: supply_product_params
                        .get(&(p.supply.as_str(), p.prod.as_str()))
                        .and_then(|x| x.cap),
                    logis_cap: logistics.and_then(|l| l.cap),
                    logis_min: logistics.and_then(|l| l.min),
                    logis_max: logistics.and_then(|l| l.max),
                    logis_min_vol: logistics.and_then(|l| l.min_vol()),
                    logis_max_vol: logistics.and_then(|l| l.max_vol()),
                    sell_price: p.sell_price,
                    var_cost: p.var_cost,
                    trans_cost: p.trans_cost,
                    wh_fc: wh_param.and_then(|w| w.fc),
                    wh_min_vol: wh_param.and_then(|w| w.min_vol),
                    wh_max_vol: wh_param.and_then(|w| w.max_vol),
                    demand_vol: demand_params
                        .get(&(p.prod.as_str(), p.dest.as_str()))
                        .and_then(|d| d.demand),
                }
            })
            .collect()
    }
}

fn load<R: Record>(reader: &mut WorkbookReader) -> Result<Vec<R>, AssembleError> {
    let mut table = reader.table(R::SHEET)?;
    if let Some(sheet) = schema::sheet(R::SHEET) {
        table = clean(sheet, table);
    }
    Ok(table.rows().filter_map(R::from_row).collect())
}

/// Index rows by key; with validated input every key is unique
fn index<'a, T, K, F>(rows: &'a [T], key: F) -> HashMap<K, &'a T>
where
    K: std::hash::Hash + Eq,
    F: Fn(&'a T) -> K,
{
    rows.iter().map(|r| (key(r), r)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Table;
    use crate::workbook::{StatusRecord, Workbook};

    fn workbook(overrides: &[(&str, &str)]) -> Vec<u8> {
        let defaults = [
            ("supply", "supply,supply_name,supply_lat,supply_long\nS1,Mill,13.7,100.5\n"),
            ("product", "prod,prod_name\nP1,Sugar\nP2,Molasses\n"),
            ("route", "route,route_name\nR1,Truck\n"),
            ("warehouse", "wh,wh_name,wh_lat,wh_long\nW1,Hub,,\n"),
            ("destination", "dest,dest_name,dest_lat,dest_long\nD1,Port,1,2\n"),
            ("supply_param", "supply,supply_cap,supply_min,supply_max\nS1,200,0.25,0.5\n"),
            ("supplyproduct_param", "supply,prod,supplyprod_cap\nS1,P1,80\n"),
            (
                "logistics_param",
                "supply,route,wh,dest,logis_cap,logis_min,logis_max\nS1,R1,W1,D1,100,0,1\n",
            ),
            (
                "supplychain_param",
                "supply,prod,route,wh,dest,sell_price,var_cost,trans_cost\n\
                 S1,P1,R1,W1,D1,5,1,1\n\
                 S1,P2,R1,W1,D1,0,1,1\n\
                 S1,P2,R1,W1,D1,4,,1\n",
            ),
            ("warehouse_param", "wh,wh_fc\nW1,10\n"),
            ("demand_param", "prod,dest,demand_vol\nP1,D1,50\nP2,D1,20\n"),
        ];

        let mut wb = Workbook::new(StatusRecord::new());
        for (name, csv) in defaults {
            let csv = overrides
                .iter()
                .find(|(n, _)| *n == name)
                .map_or(csv, |(_, c)| *c);
            wb.push(name, Table::from_csv_str(csv).unwrap());
        }
        wb.to_bytes().unwrap()
    }

    #[test]
    fn test_edges_follow_priced_rows() {
        let dataset = Dataset::from_bytes(workbook(&[])).unwrap();

        // Zero price and incomplete rows are not edges
        assert_eq!(dataset.supply_chain_params.len(), 1);
        assert_eq!(dataset.edges.len(), 1);

        let edge = &dataset.edges[0];
        assert_eq!(edge.key.prod, "P1");
        assert_eq!(edge.supply_name.as_deref(), Some("Mill"));
        assert_eq!(edge.supply_min_vol, Some(50.0));
        assert_eq!(edge.supply_max_vol, Some(100.0));
        assert_eq!(edge.supplyprod_cap, Some(80.0));
        assert_eq!(edge.logis_max_vol, Some(100.0));
        assert_eq!(edge.wh_fc, Some(10.0));
        assert_eq!(edge.wh_lat, None);
        assert_eq!(edge.dest_long, Some(2.0));
        assert_eq!(edge.demand_vol, Some(50.0));
        assert!((edge.unit_margin() - 3.0).abs() < 1e-12);
        assert!((dataset.total_demand() - 70.0).abs() < 1e-12);
    }

    #[test]
    fn test_missing_parameters_stay_null() {
        let dataset = Dataset::from_bytes(workbook(&[
            ("logistics_param", "supply,route,wh,dest,logis_cap,logis_min,logis_max\n"),
            ("warehouse_param", "wh,wh_fc\n"),
        ]))
        .unwrap();

        let edge = &dataset.edges[0];
        assert_eq!(edge.logis_cap, None);
        assert_eq!(edge.logis_max_vol, None);
        assert_eq!(edge.wh_fc, None);
    }

    #[test]
    fn test_missing_sheet_is_an_error() {
        let mut wb = Workbook::new(StatusRecord::new());
        wb.push("supply", Table::with_columns(&["supply", "supply_name"]));
        let err = Dataset::from_bytes(wb.to_bytes().unwrap()).unwrap_err();
        assert!(err.to_string().contains("product"));
    }
}
