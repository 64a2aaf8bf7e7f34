//! MILP formulation of the supply network.
//!
//! One continuous transport variable per feasible edge and one binary open
//! flag per warehouse that appears on any edge. Parameters missing from the
//! tables fall back to the named defaults below.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use flowplan_solver::{ConstraintOp, MilpProblem, Sense, VariableKind};
use tracing::{debug, info};

use crate::assemble::{Dataset, EdgeKey};

/// No lower bound on supply volume
pub const SUPPLY_MIN_DEFAULT: f64 = 0.0;
/// A supply without parameters ships nothing
pub const SUPPLY_MAX_DEFAULT: f64 = 0.0;
/// Effectively unbounded per-product capacity
pub const PRODUCT_CAP_DEFAULT: f64 = 1e7;
pub const LOGISTICS_MIN_DEFAULT: f64 = 0.0;
/// Effectively unbounded lane capacity
pub const LOGISTICS_MAX_DEFAULT: f64 = 1e9;
pub const SELL_PRICE_DEFAULT: f64 = 0.0;
/// Unpriced edges are unattractive, not infeasible
pub const UNIT_COST_DEFAULT: f64 = 1e9;
/// Undeclared warehouses are too expensive to open
pub const FIXED_COST_DEFAULT: f64 = 1e9;
pub const DEMAND_DEFAULT: f64 = 0.0;

/// Index sets the variables are declared over
#[derive(Debug, Clone, Default)]
pub struct IndexSets {
    /// Feasible 5-tuples, in variable order
    pub id_trans: Vec<EdgeKey>,
    /// Warehouses on at least one feasible tuple
    pub id_wh: BTreeSet<String>,
}

impl IndexSets {
    pub fn new(dataset: &Dataset) -> Self {
        let mut id_trans: Vec<EdgeKey> = dataset.edges.iter().map(|e| e.key.clone()).collect();
        id_trans.sort();
        id_trans.dedup();
        let id_wh = id_trans.iter().map(|k| k.wh.clone()).collect();

        Self { id_trans, id_wh }
    }
}

/// Parameter lookups keyed like the index sets
struct Parameters<'a> {
    supply_min: HashMap<&'a str, f64>,
    supply_max: HashMap<&'a str, f64>,
    supplyprod_cap: HashMap<(&'a str, &'a str), f64>,
    logis_min: HashMap<(&'a str, &'a str, &'a str, &'a str), f64>,
    logis_max: HashMap<(&'a str, &'a str, &'a str, &'a str), f64>,
    /// (sell price, variable cost, transport cost)
    prices: HashMap<EdgeKey, (f64, f64, f64)>,
    wh_fc: HashMap<&'a str, f64>,
    wh_min: HashMap<&'a str, f64>,
    wh_max: HashMap<&'a str, f64>,
    demand: HashMap<(&'a str, &'a str), f64>,
}

impl<'a> Parameters<'a> {
    fn new(dataset: &'a Dataset) -> Self {
        let mut params = Self {
            supply_min: HashMap::new(),
            supply_max: HashMap::new(),
            supplyprod_cap: HashMap::new(),
            logis_min: HashMap::new(),
            logis_max: HashMap::new(),
            prices: HashMap::new(),
            wh_fc: HashMap::new(),
            wh_min: HashMap::new(),
            wh_max: HashMap::new(),
            demand: HashMap::new(),
        };

        for p in &dataset.supply_params {
            insert(&mut params.supply_min, p.supply.as_str(), p.min_vol());
            insert(&mut params.supply_max, p.supply.as_str(), p.max_vol());
        }
        for p in &dataset.supply_product_params {
            insert(&mut params.supplyprod_cap, (p.supply.as_str(), p.prod.as_str()), p.cap);
        }
        for p in &dataset.logistics_params {
            let key = (p.supply.as_str(), p.route.as_str(), p.wh.as_str(), p.dest.as_str());
            insert(&mut params.logis_min, key, p.min_vol());
            insert(&mut params.logis_max, key, p.max_vol());
        }
        for p in &dataset.supply_chain_params {
            params
                .prices
                .insert(EdgeKey::from(p), (p.sell_price, p.var_cost, p.trans_cost));
        }
        for p in &dataset.warehouse_params {
            insert(&mut params.wh_fc, p.wh.as_str(), p.fc);
            insert(&mut params.wh_min, p.wh.as_str(), p.min_vol);
            insert(&mut params.wh_max, p.wh.as_str(), p.max_vol);
        }
        for p in &dataset.demand_params {
            insert(&mut params.demand, (p.prod.as_str(), p.dest.as_str()), p.demand);
        }
        params
    }

    fn unit_margin(&self, key: &EdgeKey) -> f64 {
        let (price, var, trans) = self.prices.get(key).copied().unwrap_or((
            SELL_PRICE_DEFAULT,
            UNIT_COST_DEFAULT,
            UNIT_COST_DEFAULT,
        ));
        price - var - trans
    }
}

/// Null parameter cells behave like a missing row
fn insert<K: std::hash::Hash + Eq>(map: &mut HashMap<K, f64>, key: K, value: Option<f64>) {
    if let Some(value) = value {
        map.insert(key, value);
    }
}

/// A built model plus the mapping from its variables back to the network
#[derive(Debug, Clone)]
pub struct NetworkModel {
    pub problem: MilpProblem,
    pub sets: IndexSets,
    /// Transport variable of `sets.id_trans[i]` is variable `i`
    pub transport: Vec<usize>,
    /// Open flag variable per warehouse in `sets.id_wh`
    pub open: BTreeMap<String, usize>,
    /// Big-M of the warehouse linking constraints
    pub total_demand: f64,
}

impl NetworkModel {
    pub fn build(dataset: &Dataset) -> Self {
        let sets = IndexSets::new(dataset);
        let params = Parameters::new(dataset);
        let mut problem = MilpProblem::new(Sense::Maximize);

        let transport: Vec<usize> = sets
            .id_trans
            .iter()
            .map(|k| {
                problem.add_variable(
                    format!("trans_vol[{},{},{},{},{}]", k.supply, k.prod, k.route, k.wh, k.dest),
                    VariableKind::Continuous,
                )
            })
            .collect();
        let open: BTreeMap<String, usize> = sets
            .id_wh
            .iter()
            .map(|wh| {
                let var = problem.add_variable(format!("wh_decision[{}]", wh), VariableKind::Binary);
                (wh.clone(), var)
            })
            .collect();

        // Transport variables grouped by each constraint's key subset
        let mut by_supply: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        let mut by_supply_prod: BTreeMap<(&str, &str), Vec<usize>> = BTreeMap::new();
        let mut by_lane: BTreeMap<(&str, &str, &str, &str), Vec<usize>> = BTreeMap::new();
        let mut by_demand: BTreeMap<(&str, &str), Vec<usize>> = BTreeMap::new();
        let mut by_wh: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        for (k, &var) in sets.id_trans.iter().zip(&transport) {
            let (supply, prod, route, wh, dest) = (
                k.supply.as_str(),
                k.prod.as_str(),
                k.route.as_str(),
                k.wh.as_str(),
                k.dest.as_str(),
            );
            by_supply.entry(supply).or_default().push(var);
            by_supply_prod.entry((supply, prod)).or_default().push(var);
            by_lane.entry((supply, route, wh, dest)).or_default().push(var);
            by_demand.entry((prod, dest)).or_default().push(var);
            by_wh.entry(wh).or_default().push(var);
        }

        let sum = |vars: &[usize]| -> Vec<(usize, f64)> { vars.iter().map(|&v| (v, 1.0)).collect() };

        for (supply, vars) in &by_supply {
            let min = params.supply_min.get(supply).copied().unwrap_or(SUPPLY_MIN_DEFAULT);
            let max = params.supply_max.get(supply).copied().unwrap_or(SUPPLY_MAX_DEFAULT);
            problem.add_constraint(format!("c_supply_min[{}]", supply), sum(vars), ConstraintOp::Ge, min);
            problem.add_constraint(format!("c_supply_max[{}]", supply), sum(vars), ConstraintOp::Le, max);
        }

        for ((supply, prod), vars) in &by_supply_prod {
            let cap = params
                .supplyprod_cap
                .get(&(*supply, *prod))
                .copied()
                .unwrap_or(PRODUCT_CAP_DEFAULT);
            problem.add_constraint(
                format!("c_supplyproduct_cap[{},{}]", supply, prod),
                sum(vars),
                ConstraintOp::Le,
                cap,
            );
        }

        for (lane, vars) in &by_lane {
            let (supply, route, wh, dest) = *lane;
            let min = params.logis_min.get(lane).copied().unwrap_or(LOGISTICS_MIN_DEFAULT);
            let max = params.logis_max.get(lane).copied().unwrap_or(LOGISTICS_MAX_DEFAULT);
            let name = format!("{},{},{},{}", supply, route, wh, dest);
            problem.add_constraint(format!("c_logistics_min[{}]", name), sum(vars), ConstraintOp::Ge, min);
            problem.add_constraint(format!("c_logistics_max[{}]", name), sum(vars), ConstraintOp::Le, max);
        }

        // Demand must be met exactly
        for ((prod, dest), vars) in &by_demand {
            let demand = params
                .demand
                .get(&(*prod, *dest))
                .copied()
                .unwrap_or(DEMAND_DEFAULT);
            problem.add_constraint(
                format!("c_demand[{},{}]", prod, dest),
                sum(vars),
                ConstraintOp::Eq,
                demand,
            );
        }

        // Flow through a warehouse only if it is open
        let total_demand = dataset.total_demand();
        for (wh, vars) in &by_wh {
            let Some(&flag) = open.get(*wh) else {
                continue;
            };
            let linked = |coef: f64| {
                let mut terms = sum(vars);
                terms.push((flag, -coef));
                terms
            };
            problem.add_constraint(
                format!("c_wh_decision[{}]", wh),
                linked(total_demand),
                ConstraintOp::Le,
                0.0,
            );
            if let Some(&min) = params.wh_min.get(wh) {
                problem.add_constraint(format!("c_wh_min[{}]", wh), linked(min), ConstraintOp::Ge, 0.0);
            }
            if let Some(&max) = params.wh_max.get(wh) {
                problem.add_constraint(format!("c_wh_max[{}]", wh), linked(max), ConstraintOp::Le, 0.0);
            }
        }

        let mut objective: Vec<(usize, f64)> = sets
            .id_trans
            .iter()
            .zip(&transport)
            .map(|(k, &var)| (var, params.unit_margin(k)))
            .collect();
        for (wh, &flag) in &open {
            let fc = params.wh_fc.get(wh.as_str()).copied().unwrap_or(FIXED_COST_DEFAULT);
            objective.push((flag, -fc));
        }
        problem.set_objective(objective);

        debug!(
            supplies = by_supply.len(),
            lanes = by_lane.len(),
            demands = by_demand.len(),
            big_m = total_demand,
            "grouped constraints"
        );
        info!(
            variables = problem.num_variables(),
            binaries = problem.num_binaries(),
            constraints = problem.num_constraints(),
            "built model"
        );

        Self {
            problem,
            sets,
            transport,
            open,
            total_demand,
        }
    }

    /// Fix a warehouse open flag, for what-if runs
    pub fn fix_warehouse(&mut self, wh: &str, open: bool) -> bool {
        let Some(&var) = self.open.get(wh) else {
            return false;
        };
        let value = if open { 1.0 } else { 0.0 };
        self.problem.set_bounds(var, value, Some(value));
        true
    }
}
