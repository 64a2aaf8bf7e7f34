//! Pre-solve aggregate checks over the feasible edges.
//!
//! Each check yields a detail table for the diagnostics artifact and one
//! pass/fail flag. All four always run; gating the solve is up to the caller.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;
use tracing::{info, warn};

use crate::assemble::{Dataset, FeasibleEdge};
use crate::table::{Cell, Table};

/// Table holding the four flags inside the diagnostics artifact
pub const FEASIBILITY_SHEET: &str = "feasibility";

/// Per-check outcome, `true` meaning the check passed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FeasibilityStatus {
    /// Every positive demand has at least one feasible edge
    pub demand_coverage: bool,
    /// Per product, supply-product capacity covers demand
    pub product_capacity: bool,
    /// Per destination, logistics max volume covers demand
    pub logistics_capacity: bool,
    /// Supply volume bounds are reachable through logistics bounds
    pub supply_logistics: bool,
}

impl FeasibilityStatus {
    pub fn all_pass(&self) -> bool {
        self.demand_coverage && self.product_capacity && self.logistics_capacity && self.supply_logistics
    }

    fn checks(&self) -> [(&'static str, bool); 4] {
        [
            ("validate1", self.demand_coverage),
            ("validate2", self.product_capacity),
            ("validate3", self.logistics_capacity),
            ("validate4", self.supply_logistics),
        ]
    }

    /// Names of the failing checks
    pub fn failed(&self) -> impl Iterator<Item = &'static str> {
        self.checks()
            .into_iter()
            .filter(|(_, pass)| !pass)
            .map(|(name, _)| name)
    }

    /// 0 = pass, 1 = fail, one row per check
    pub fn to_table(&self) -> Table {
        let mut table = Table::with_columns(&["check", "error"]);
        for (name, pass) in self.checks() {
            table.push_row(vec![name.into(), Cell::Number(if pass { 0.0 } else { 1.0 })]);
        }
        table
    }
}

#[derive(Debug, Clone)]
pub struct FeasibilityReport {
    pub status: FeasibilityStatus,
    /// `validate1`..`validate4` detail tables
    pub details: Vec<(&'static str, Table)>,
}

pub fn check(dataset: &Dataset) -> FeasibilityReport {
    let (demand_coverage, validate1) = demand_coverage(dataset);
    let (product_capacity, validate2) = product_capacity(&dataset.edges);
    let (logistics_capacity, validate3) = logistics_capacity(&dataset.edges);
    let (supply_logistics, validate4) = supply_logistics(&dataset.edges);

    let status = FeasibilityStatus {
        demand_coverage,
        product_capacity,
        logistics_capacity,
        supply_logistics,
    };
    let failed: Vec<_> = status.failed().collect();
    if failed.is_empty() {
        info!("feasibility checks passed");
    } else {
        warn!(?failed, "feasibility checks failed");
    }

    FeasibilityReport {
        status,
        details: vec![
            ("validate1", validate1),
            ("validate2", validate2),
            ("validate3", validate3),
            ("validate4", validate4),
        ],
    }
}

/// Hashable stand-in for an optional float, for distinct-row semantics
fn bits(value: Option<f64>) -> Option<u64> {
    value.map(f64::to_bits)
}

fn at_least(lhs: Option<f64>, rhs: Option<f64>) -> bool {
    matches!((lhs, rhs), (Some(l), Some(r)) if l >= r)
}

/// Distinct edge count per demand row
fn demand_coverage(dataset: &Dataset) -> (bool, Table) {
    let mut edges: HashMap<(&str, &str), BTreeSet<_>> = HashMap::new();
    for edge in &dataset.edges {
        edges
            .entry((edge.key.prod.as_str(), edge.key.dest.as_str()))
            .or_default()
            .insert(&edge.key);
    }

    let mut table = Table::with_columns(&["prod", "dest", "demand_vol", "supplychain_param", "validate"]);
    let mut pass = true;
    for demand in &dataset.demand_params {
        let count = edges
            .get(&(demand.prod.as_str(), demand.dest.as_str()))
            .map_or(0, BTreeSet::len);
        let ok = count > 0 || demand.demand.is_none_or(|d| d <= 0.0);
        pass &= ok;
        table.push_row(vec![
            demand.prod.as_str().into(),
            demand.dest.as_str().into(),
            demand.demand.into(),
            count.into(),
            ok.into(),
        ]);
    }
    (pass, table)
}

/// Demand per product over distinct (prod, dest) vs capacity per product
/// over distinct (supply, prod)
fn product_capacity(edges: &[FeasibleEdge]) -> (bool, Table) {
    let demand = sum_distinct(edges, |e| {
        (
            e.key.prod.clone(),
            (e.key.dest.clone(), bits(e.demand_vol)),
            e.demand_vol,
        )
    });
    let capacity = sum_distinct(edges, |e| {
        (
            e.key.prod.clone(),
            (e.key.supply.clone(), bits(e.supplyprod_cap)),
            e.supplyprod_cap,
        )
    });
    compare(&["prod", "demand_vol", "supplyprod_cap", "validate"], demand, capacity)
}

/// Demand per destination vs logistics max volume per destination
fn logistics_capacity(edges: &[FeasibleEdge]) -> (bool, Table) {
    let demand = sum_distinct(edges, |e| {
        (
            e.key.dest.clone(),
            (e.key.prod.clone(), bits(e.demand_vol)),
            e.demand_vol,
        )
    });
    let capacity = sum_distinct(edges, |e| {
        (
            e.key.dest.clone(),
            (
                e.key.supply.clone(),
                e.key.route.clone(),
                e.key.wh.clone(),
                bits(e.logis_max_vol),
            ),
            e.logis_max_vol,
        )
    });
    compare(&["dest", "demand_vol", "logis_max_vol", "validate"], demand, capacity)
}

/// Supply volume bounds vs the logistics bounds reachable from that supply.
///
/// NOTE: the dataset fails only when some supply violates the min side and
/// some (possibly different) supply violates the max side.
fn supply_logistics(edges: &[FeasibleEdge]) -> (bool, Table) {
    let mut supplies: BTreeSet<(&str, Option<u64>, Option<u64>)> = BTreeSet::new();
    let mut bounds: BTreeMap<&str, BTreeMap<(&str, &str, &str), (Option<f64>, Option<f64>)>> =
        BTreeMap::new();
    for e in edges {
        supplies.insert((
            e.key.supply.as_str(),
            bits(e.supply_min_vol),
            bits(e.supply_max_vol),
        ));
        bounds.entry(e.key.supply.as_str()).or_default().insert(
            (e.key.route.as_str(), e.key.wh.as_str(), e.key.dest.as_str()),
            (e.logis_min_vol, e.logis_max_vol),
        );
    }

    let mut table = Table::with_columns(&[
        "supply",
        "supply_min_vol",
        "supply_max_vol",
        "logis_min_vol",
        "logis_max_vol",
        "validate1",
        "validate2",
    ]);
    let mut min_violated = false;
    let mut max_violated = false;
    for (supply, min_vol, max_vol) in supplies {
        let min_vol = min_vol.map(f64::from_bits);
        let max_vol = max_vol.map(f64::from_bits);
        let reachable = bounds.get(supply);
        let logis_min: f64 = reachable
            .into_iter()
            .flat_map(|m| m.values().filter_map(|(lo, _)| *lo))
            .sum();
        let logis_max: f64 = reachable
            .into_iter()
            .flat_map(|m| m.values().filter_map(|(_, hi)| *hi))
            .sum();

        let validate1 = at_least(Some(logis_max), min_vol);
        let validate2 = at_least(max_vol, Some(logis_min));
        min_violated |= !validate1;
        max_violated |= !validate2;
        table.push_row(vec![
            supply.into(),
            min_vol.into(),
            max_vol.into(),
            logis_min.into(),
            logis_max.into(),
            validate1.into(),
            validate2.into(),
        ]);
    }
    (!(min_violated && max_violated), table)
}

/// Sum `value` per group over rows distinct by (group, identity); nulls add 0
fn sum_distinct<G, I, F>(edges: &[FeasibleEdge], row: F) -> BTreeMap<G, f64>
where
    G: Ord + Clone,
    I: Ord,
    F: Fn(&FeasibleEdge) -> (G, I, Option<f64>),
{
    let mut seen: BTreeSet<(G, I)> = BTreeSet::new();
    let mut sums: BTreeMap<G, f64> = BTreeMap::new();
    for edge in edges {
        let (group, identity, value) = row(edge);
        let sum = sums.entry(group.clone()).or_insert(0.0);
        if seen.insert((group, identity)) {
            *sum += value.unwrap_or(0.0);
        }
    }
    sums
}

/// capacity >= demand for every group
fn compare(
    columns: &[&str],
    demand: BTreeMap<String, f64>,
    capacity: BTreeMap<String, f64>,
) -> (bool, Table) {
    let mut table = Table::with_columns(columns);
    let mut pass = true;
    for (group, demand) in demand {
        let cap = capacity.get(&group).copied();
        let ok = at_least(cap, Some(demand));
        pass &= ok;
        table.push_row(vec![group.into(), demand.into(), cap.into(), ok.into()]);
    }
    (pass, table)
}
