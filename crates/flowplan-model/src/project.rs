//! Result projection.
//!
//! Solved transport volumes are joined back onto the feasible edges and
//! aggregated per route, supply, warehouse and destination. Master-based
//! reports list every entity, so unused ones appear with zero volume.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use flowplan_solver::Solution;
use serde::Serialize;
use tracing::info;

use crate::assemble::{Dataset, EdgeKey, FeasibleEdge};
use crate::build::{FIXED_COST_DEFAULT, NetworkModel};
use crate::table::{Cell, Table};

/// Grand totals of a solved run
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Totals {
    pub revenue: f64,
    pub variable_cost: f64,
    pub fixed_cost: f64,
    pub net_contribution: f64,
}

impl Totals {
    pub fn to_table(&self) -> Table {
        let mut table = Table::with_columns(&["metric", "value"]);
        for (metric, value) in [
            ("total_revenue", self.revenue),
            ("total_variable_cost", self.variable_cost),
            ("total_fixed_cost", self.fixed_cost),
            ("total_net_contribution", self.net_contribution),
        ] {
            table.push_row(vec![metric.into(), value.into()]);
        }
        table
    }
}

/// One feasible edge with its solved volume
#[derive(Debug, Clone)]
pub struct Flow {
    pub edge: FeasibleEdge,
    /// `None` when the solve produced no values
    pub vol: Option<f64>,
}

impl Flow {
    fn volume(&self) -> f64 {
        self.vol.unwrap_or(0.0)
    }

    pub fn revenue(&self) -> Option<f64> {
        Some(self.vol? * self.edge.sell_price)
    }

    pub fn variable_cost(&self) -> Option<f64> {
        Some(self.vol? * (self.edge.var_cost + self.edge.trans_cost))
    }

    pub fn net_contribution(&self) -> Option<f64> {
        Some(self.revenue()? - self.variable_cost()?)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SupplyRow {
    pub supply: String,
    pub name: Option<String>,
    pub lat: Option<f64>,
    pub long: Option<f64>,
    pub cap: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub min_vol: Option<f64>,
    pub max_vol: Option<f64>,
    pub vol: f64,
    pub netcon: f64,
    /// Distinct products shipped
    pub sku: usize,
    pub utilization: f64,
    pub netcon_per_unit: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WarehouseRow {
    pub wh: String,
    pub name: Option<String>,
    pub lat: Option<f64>,
    pub long: Option<f64>,
    pub fc: Option<f64>,
    pub vol: f64,
    /// Fixed cost actually incurred
    pub fc_charged: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DestinationRow {
    pub dest: String,
    pub name: Option<String>,
    pub lat: Option<f64>,
    pub long: Option<f64>,
    pub demand: f64,
    pub vol: f64,
}

/// All reports of one solved run
#[derive(Debug, Clone)]
pub struct Projection {
    pub flows: Vec<Flow>,
    pub supplies: Vec<SupplyRow>,
    pub warehouses: Vec<WarehouseRow>,
    pub destinations: Vec<DestinationRow>,
    pub totals: Totals,
}

impl Projection {
    pub fn new(dataset: &Dataset, model: &NetworkModel, solution: &Solution) -> Self {
        let values: HashMap<&EdgeKey, f64> = model
            .sets
            .id_trans
            .iter()
            .zip(&model.transport)
            .filter_map(|(key, &var)| Some((key, solution.value(var)?)))
            .collect();
        let flows: Vec<Flow> = dataset
            .edges
            .iter()
            .map(|edge| Flow {
                vol: values.get(&edge.key).copied(),
                edge: edge.clone(),
            })
            .collect();

        let supplies = supply_rows(dataset, &flows);
        let warehouses = warehouse_rows(dataset, &flows);
        let destinations = destination_rows(dataset, &flows);

        let revenue: f64 = flows.iter().filter_map(Flow::revenue).sum();
        let variable_cost: f64 = flows.iter().filter_map(Flow::variable_cost).sum();
        let fixed_cost: f64 = warehouses.iter().map(|w| w.fc_charged).sum();
        let totals = Totals {
            revenue,
            variable_cost,
            fixed_cost,
            net_contribution: revenue - (fixed_cost + variable_cost),
        };
        info!(
            revenue = totals.revenue,
            variable_cost = totals.variable_cost,
            fixed_cost = totals.fixed_cost,
            net_contribution = totals.net_contribution,
            "projected results"
        );

        Self {
            flows,
            supplies,
            warehouses,
            destinations,
            totals,
        }
    }

    /// Volume per (supply, destination) pair
    pub fn route_table(&self) -> Table {
        let mut routes: BTreeMap<(&str, &str), (&FeasibleEdge, f64)> = BTreeMap::new();
        for flow in &self.flows {
            let key = (flow.edge.key.supply.as_str(), flow.edge.key.dest.as_str());
            routes.entry(key).or_insert((&flow.edge, 0.0)).1 += flow.volume();
        }

        let mut table = Table::with_columns(&[
            "supply",
            "supply_name",
            "supply_lat",
            "supply_long",
            "dest",
            "dest_name",
            "dest_lat",
            "dest_long",
            "route_vol",
        ]);
        for ((supply, dest), (e, vol)) in routes {
            table.push_row(vec![
                supply.into(),
                e.supply_name.clone().into(),
                e.supply_lat.into(),
                e.supply_long.into(),
                dest.into(),
                e.dest_name.clone().into(),
                e.dest_lat.into(),
                e.dest_long.into(),
                vol.into(),
            ]);
        }
        table
    }

    /// Edge-level revenue and cost
    pub fn trans_table(&self) -> Table {
        let mut table = Table::with_columns(&[
            "supply",
            "supply_name",
            "supply_lat",
            "supply_long",
            "prod",
            "prod_name",
            "route",
            "route_name",
            "wh",
            "wh_name",
            "dest",
            "dest_name",
            "dest_lat",
            "dest_long",
            "trans_vol",
            "trans_rev",
            "trans_vc",
            "trans_netcon",
        ]);
        for flow in &self.flows {
            let e = &flow.edge;
            table.push_row(vec![
                e.key.supply.as_str().into(),
                e.supply_name.clone().into(),
                e.supply_lat.into(),
                e.supply_long.into(),
                e.key.prod.as_str().into(),
                e.prod_name.clone().into(),
                e.key.route.as_str().into(),
                e.route_name.clone().into(),
                e.key.wh.as_str().into(),
                e.wh_name.clone().into(),
                e.key.dest.as_str().into(),
                e.dest_name.clone().into(),
                e.dest_lat.into(),
                e.dest_long.into(),
                flow.vol.into(),
                flow.revenue().into(),
                flow.variable_cost().into(),
                flow.net_contribution().into(),
            ]);
        }
        table
    }

    /// Ids, names and volume only
    pub fn output_trans_table(&self) -> Table {
        self.trans_table().select(&[
            "supply",
            "supply_name",
            "prod",
            "prod_name",
            "route",
            "route_name",
            "wh",
            "wh_name",
            "dest",
            "dest_name",
            "trans_vol",
        ])
    }

    pub fn supply_table(&self, coordinates: bool) -> Table {
        let mut columns = vec!["supply", "supply_name"];
        if coordinates {
            columns.extend(["supply_lat", "supply_long"]);
        }
        columns.extend([
            "supply_cap",
            "supply_min",
            "supply_max",
            "supply_min_vol",
            "supply_max_vol",
            "supply_vol",
            "supply_netcon",
            "supply_sku",
            "supply_utilize",
            "supply_netconperunit",
        ]);

        let mut table = Table::with_columns(&columns);
        for s in &self.supplies {
            let mut row: Vec<Cell> = vec![s.supply.as_str().into(), s.name.clone().into()];
            if coordinates {
                row.extend([Cell::from(s.lat), Cell::from(s.long)]);
            }
            row.extend([
                Cell::from(s.cap),
                Cell::from(s.min),
                Cell::from(s.max),
                Cell::from(s.min_vol),
                Cell::from(s.max_vol),
                Cell::from(s.vol),
                Cell::from(s.netcon),
                Cell::from(s.sku),
                Cell::from(s.utilization),
                Cell::from(s.netcon_per_unit),
            ]);
            table.push_row(row);
        }
        table
    }

    pub fn warehouse_table(&self, coordinates: bool) -> Table {
        let mut columns = vec!["wh", "wh_name"];
        if coordinates {
            columns.extend(["wh_lat", "wh_long"]);
        }
        columns.extend(["wh_fc", "wh_vol", "wh_fc_val"]);

        let mut table = Table::with_columns(&columns);
        for w in &self.warehouses {
            let mut row: Vec<Cell> = vec![w.wh.as_str().into(), w.name.clone().into()];
            if coordinates {
                row.extend([Cell::from(w.lat), Cell::from(w.long)]);
            }
            row.extend([Cell::from(w.fc), Cell::from(w.vol), Cell::from(w.fc_charged)]);
            table.push_row(row);
        }
        table
    }

    pub fn destination_table(&self, coordinates: bool) -> Table {
        let mut columns = vec!["dest", "dest_name"];
        if coordinates {
            columns.extend(["dest_lat", "dest_long"]);
        }
        columns.extend(["demand_vol", "dest_vol"]);

        let mut table = Table::with_columns(&columns);
        for d in &self.destinations {
            let mut row: Vec<Cell> = vec![d.dest.as_str().into(), d.name.clone().into()];
            if coordinates {
                row.extend([Cell::from(d.lat), Cell::from(d.long)]);
            }
            row.extend([Cell::from(d.demand), Cell::from(d.vol)]);
            table.push_row(row);
        }
        table
    }

    /// Sheets of the visualization artifact
    pub fn plot_sheets(&self) -> Vec<(&'static str, Table)> {
        vec![
            ("summary", self.totals.to_table()),
            ("route", self.route_table()),
            ("supply", self.supply_table(true)),
            ("warehouse", self.warehouse_table(true)),
            ("destination", self.destination_table(true)),
            ("trans", self.trans_table()),
        ]
    }

    /// Sheets of the tabular output artifact
    pub fn output_sheets(&self) -> Vec<(&'static str, Table)> {
        vec![
            ("trans", self.output_trans_table()),
            ("supply", self.supply_table(false)),
            ("warehouse", self.warehouse_table(false)),
            ("destination", self.destination_table(false)),
        ]
    }
}

fn supply_rows(dataset: &Dataset, flows: &[Flow]) -> Vec<SupplyRow> {
    let params: HashMap<&str, _> = dataset
        .supply_params
        .iter()
        .map(|p| (p.supply.as_str(), p))
        .collect();

    dataset
        .supplies
        .iter()
        .map(|s| {
            let shipped = flows.iter().filter(|f| f.edge.key.supply == s.id);
            let vol: f64 = shipped.clone().map(Flow::volume).sum();
            let netcon: f64 = shipped
                .clone()
                .map(|f| f.volume() * f.edge.unit_margin())
                .sum();
            let sku = shipped
                .filter(|f| f.volume() > 0.0)
                .map(|f| f.edge.key.prod.as_str())
                .collect::<BTreeSet<_>>()
                .len();

            let param = params.get(s.id.as_str());
            let cap = param.and_then(|p| p.cap);
            SupplyRow {
                supply: s.id.clone(),
                name: s.name.clone(),
                lat: s.lat,
                long: s.long,
                cap,
                min: param.and_then(|p| p.min),
                max: param.and_then(|p| p.max),
                min_vol: param.and_then(|p| p.min_vol()),
                max_vol: param.and_then(|p| p.max_vol()),
                vol,
                netcon,
                sku,
                utilization: ratio(vol, cap),
                netcon_per_unit: ratio(netcon, Some(vol)),
            }
        })
        .collect()
}

/// numerator / denominator, 0 when the denominator is missing or zero
fn ratio(numerator: f64, denominator: Option<f64>) -> f64 {
    match denominator {
        Some(d) if d != 0.0 => numerator / d,
        _ => 0.0,
    }
}

fn warehouse_rows(dataset: &Dataset, flows: &[Flow]) -> Vec<WarehouseRow> {
    let fc: HashMap<&str, Option<f64>> = dataset
        .warehouse_params
        .iter()
        .map(|p| (p.wh.as_str(), p.fc))
        .collect();

    dataset
        .warehouses
        .iter()
        .map(|w| {
            let vol: f64 = flows
                .iter()
                .filter(|f| f.edge.key.wh == w.id)
                .map(Flow::volume)
                .sum();
            let declared = fc.get(w.id.as_str()).copied().flatten();
            // The model charged the default for undeclared warehouses
            let fc_charged = if vol > 0.0 {
                declared.unwrap_or(FIXED_COST_DEFAULT)
            } else {
                0.0
            };
            WarehouseRow {
                wh: w.id.clone(),
                name: w.name.clone(),
                lat: w.lat,
                long: w.long,
                fc: declared,
                vol,
                fc_charged,
            }
        })
        .collect()
}

fn destination_rows(dataset: &Dataset, flows: &[Flow]) -> Vec<DestinationRow> {
    dataset
        .destinations
        .iter()
        .map(|d| DestinationRow {
            dest: d.id.clone(),
            name: d.name.clone(),
            lat: d.lat,
            long: d.long,
            demand: dataset
                .demand_params
                .iter()
                .filter(|p| p.dest == d.id)
                .filter_map(|p| p.demand)
                .sum(),
            vol: flows
                .iter()
                .filter(|f| f.edge.key.dest == d.id)
                .map(Flow::volume)
                .sum(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::*;

    fn dataset() -> Dataset {
        let mut dataset = Dataset {
            supplies: vec![
                Supply {
                    id: "S1".into(),
                    name: Some("Mill".into()),
                    lat: Some(13.7),
                    long: Some(100.5),
                },
                Supply {
                    id: "S2".into(),
                    name: Some("Idle".into()),
                    lat: None,
                    long: None,
                },
            ],
            warehouses: vec![
                Warehouse {
                    id: "W1".into(),
                    name: Some("Hub".into()),
                    lat: None,
                    long: None,
                },
                Warehouse {
                    id: "W2".into(),
                    name: None,
                    lat: None,
                    long: None,
                },
            ],
            destinations: vec![Destination {
                id: "D1".into(),
                name: Some("Port".into()),
                lat: None,
                long: None,
            }],
            supply_params: vec![SupplyParam {
                supply: "S1".into(),
                cap: Some(100.0),
                min: Some(0.0),
                max: Some(1.0),
            }],
            supply_chain_params: vec![SupplyChainParam {
                supply: "S1".into(),
                prod: "P1".into(),
                route: "R1".into(),
                wh: "W1".into(),
                dest: "D1".into(),
                sell_price: 5.0,
                var_cost: 1.0,
                trans_cost: 1.0,
            }],
            warehouse_params: vec![
                WarehouseParam {
                    wh: "W1".into(),
                    fc: Some(10.0),
                    min_vol: None,
                    max_vol: None,
                },
                WarehouseParam {
                    wh: "W2".into(),
                    fc: Some(99.0),
                    min_vol: None,
                    max_vol: None,
                },
            ],
            demand_params: vec![DemandParam {
                prod: "P1".into(),
                dest: "D1".into(),
                demand: Some(50.0),
            }],
            ..Dataset::default()
        };
        dataset.rebuild_edges();
        dataset
    }

    fn project(values: Option<Vec<f64>>) -> Projection {
        let dataset = dataset();
        let model = NetworkModel::build(&dataset);
        let solution = match values {
            Some(values) => {
                let objective = model.problem.evaluate_objective(&values);
                Solution::optimal(values, objective)
            }
            None => Solution::infeasible(),
        };
        Projection::new(&dataset, &model, &solution)
    }

    #[test]
    fn test_totals_reconcile() {
        let projection = project(Some(vec![50.0, 1.0]));
        let t = projection.totals;

        assert!((t.revenue - 250.0).abs() < 1e-9, "revenue was {}", t.revenue);
        assert!((t.variable_cost - 100.0).abs() < 1e-9);
        assert!((t.fixed_cost - 10.0).abs() < 1e-9);
        assert!((t.net_contribution - 140.0).abs() < 1e-9);
        assert!(
            (t.net_contribution - (t.revenue - t.variable_cost - t.fixed_cost)).abs() < 1e-9,
            "totals must reconcile"
        );
    }

    #[test]
    fn test_supply_report() {
        let projection = project(Some(vec![50.0, 1.0]));
        let s1 = &projection.supplies[0];
        assert_eq!(s1.vol, 50.0);
        assert_eq!(s1.sku, 1);
        assert!((s1.utilization - 0.5).abs() < 1e-12);
        assert!((s1.netcon_per_unit - 3.0).abs() < 1e-12);

        // Unused supply shows up with zeros
        let s2 = &projection.supplies[1];
        assert_eq!((s2.vol, s2.sku, s2.utilization, s2.netcon_per_unit), (0.0, 0, 0.0, 0.0));
    }

    #[test]
    fn test_fixed_cost_charged_only_when_used() {
        let projection = project(Some(vec![50.0, 1.0]));
        let charged: Vec<_> = projection.warehouses.iter().map(|w| w.fc_charged).collect();
        assert_eq!(charged, vec![10.0, 0.0]);
    }

    #[test]
    fn test_failed_solve_projects_nulls() {
        let projection = project(None);
        assert!(projection.flows.iter().all(|f| f.vol.is_none()));
        assert_eq!(projection.totals, Totals::default());

        let trans = projection.trans_table();
        assert!(trans.rows().next().unwrap().get("trans_vol").is_null());
        assert_eq!(projection.destinations[0].demand, 50.0);
        assert_eq!(projection.destinations[0].vol, 0.0);
    }

    #[test]
    fn test_report_sheets() {
        let projection = project(Some(vec![50.0, 1.0]));
        let names: Vec<_> = projection.plot_sheets().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["summary", "route", "supply", "warehouse", "destination", "trans"]);

        let output = projection.output_trans_table();
        assert_eq!(output.columns().last().map(String::as_str), Some("trans_vol"));
        assert!(!projection.supply_table(false).has_column("supply_lat"));

        let route = projection.route_table();
        let row = route.rows().next().unwrap();
        assert_eq!(row.number("route_vol"), Some(50.0));
        assert_eq!(row.text("supply_name"), Some("Mill"));
    }
}
