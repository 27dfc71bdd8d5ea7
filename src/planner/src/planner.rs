// Copyright 2026 The ZQL Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The planner (spec §4.5): enumerates flip patterns for a plan graph,
//! scores each with a [`CostModel`], and picks the cheapest. Drives
//! scalar-sub-select resolution and recursion into related sub-plans.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;

use fixedbitset::FixedBitSet;

use zql_ast::{Condition, ColumnName, CorrelatedSubSelect, Literal, RelatedSelection, ScalarCompare, Select};

use crate::apply::apply_plan;
use crate::cost_model::{CostEstimate, CostModel, CostQuery};
use crate::debug::{AttemptOutcome, ConnectionEval, DebugObserver};
use crate::error::PlanError;
use crate::graph::{Constraint, ConnectionId, JoinId, JoinType, PlanGraph, PlanSnapshot};
use crate::CostModelConfig;

/// Cooperative cancellation (spec §5): cheap to clone, tested between
/// enumeration attempts. Tripping it never aborts planning outright; the
/// best plan found so far is returned.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, AtomicOrdering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(AtomicOrdering::Relaxed)
    }
}

/// Resolves a scalar sub-select at plan time (spec §4.5, "edge cases").
///
/// A sub-select is "simple" when its unique key is fully constrained by
/// literal equalities, making it a point lookup. Implementations that
/// can't tell, or whose sub-select isn't simple, return `Ok(None)`: the
/// predicate is left as-is and treated like a correlated sub-select.
pub trait ScalarResolver {
    /// `Ok(Some(Some(value)))`: point lookup found a row with this value.
    /// `Ok(Some(None))`: point lookup ran and found no row.
    /// `Ok(None)`: not resolvable here; leave the sub-select in place.
    fn resolve(&self, select: &Select, column: &ColumnName) -> anyhow::Result<Option<Option<Literal>>>;
}

/// Resolves nothing; every scalar sub-select is left unresolved. Useful
/// when the caller has no storage engine to point-lookup against.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopScalarResolver;

impl ScalarResolver for NoopScalarResolver {
    fn resolve(&self, _select: &Select, _column: &ColumnName) -> anyhow::Result<Option<Option<Literal>>> {
        Ok(None)
    }
}

/// Best attempt seen so far: `(total cost, attempt index, plan snapshot)`.
type Best = (f64, usize, PlanSnapshot);

/// Plans `select` against `cost_model`, returning a structurally new,
/// annotated AST (spec §6, `planQuery`). Pure in its inputs: running it
/// twice with equal arguments yields structurally equal outputs.
///
/// Related sub-selections are planned first, independently, post-order
/// (spec §4.5 step 1); each correlated sub-select's flip decision is
/// scoped to the plan graph of its enclosing select.
pub fn plan_query(
    select: &Select,
    cost_model: &dyn CostModel,
    config: &CostModelConfig,
    resolver: &dyn ScalarResolver,
    cancellation: &CancellationToken,
    debug: &mut dyn DebugObserver,
) -> Select {
    let prepared = prepare_select(select, cost_model, config, resolver, cancellation, debug);
    plan_prepared(&prepared, cost_model, config, cancellation, debug)
}

/// Recursively plans `select.related` and resolves scalar sub-selects
/// throughout `select`'s own plan-graph scope, without yet building or
/// enumerating this scope's own plan graph.
fn prepare_select(
    select: &Select,
    cost_model: &dyn CostModel,
    config: &CostModelConfig,
    resolver: &dyn ScalarResolver,
    cancellation: &CancellationToken,
    debug: &mut dyn DebugObserver,
) -> Select {
    let related = select
        .related
        .iter()
        .map(|r| RelatedSelection {
            alias: r.alias.clone(),
            correlation: r.correlation.clone(),
            select: Box::new(plan_query(&r.select, cost_model, config, resolver, cancellation, debug)),
        })
        .collect();

    let where_condition = select
        .where_condition
        .as_ref()
        .map(|c| prepare_condition(c, cost_model, config, resolver, cancellation, debug));

    Select {
        table: select.table.clone(),
        ordering: select.ordering.clone(),
        cursor: select.cursor.clone(),
        limit: select.limit,
        where_condition,
        related,
    }
}

fn prepare_condition(
    cond: &Condition,
    cost_model: &dyn CostModel,
    config: &CostModelConfig,
    resolver: &dyn ScalarResolver,
    cancellation: &CancellationToken,
    debug: &mut dyn DebugObserver,
) -> Condition {
    match cond {
        Condition::Simple(_) => cond.clone(),
        Condition::And(items) => Condition::And(
            items
                .iter()
                .map(|c| prepare_condition(c, cost_model, config, resolver, cancellation, debug))
                .collect(),
        ),
        Condition::Or(items) => Condition::Or(
            items
                .iter()
                .map(|c| prepare_condition(c, cost_model, config, resolver, cancellation, debug))
                .collect(),
        ),
        Condition::Correlated(inner) => Condition::Correlated(Box::new(CorrelatedSubSelect {
            select: prepare_select(&inner.select, cost_model, config, resolver, cancellation, debug),
            correlation: inner.correlation.clone(),
            flip: inner.flip,
        })),
        Condition::ScalarCompare(inner) => {
            prepare_scalar_compare(inner, cost_model, config, resolver, cancellation, debug)
        }
    }
}

fn prepare_scalar_compare(
    inner: &ScalarCompare,
    cost_model: &dyn CostModel,
    config: &CostModelConfig,
    resolver: &dyn ScalarResolver,
    cancellation: &CancellationToken,
    debug: &mut dyn DebugObserver,
) -> Condition {
    let select = prepare_select(&inner.select, cost_model, config, resolver, cancellation, debug);

    match resolver.resolve(&select, &inner.select_column) {
        Ok(Some(Some(value))) => Condition::ScalarCompare(Box::new(ScalarCompare {
            left: inner.left.clone(),
            op: inner.op,
            select,
            select_column: inner.select_column.clone(),
            resolved: Some(value),
        })),
        Ok(Some(None)) => Condition::always_false(),
        Ok(None) => Condition::ScalarCompare(Box::new(ScalarCompare {
            left: inner.left.clone(),
            op: inner.op,
            select,
            select_column: inner.select_column.clone(),
            resolved: inner.resolved.clone(),
        })),
        Err(source) => {
            debug.on_attempt_failed(0, &format!("scalar sub-select resolution failed: {source}"));
            Condition::ScalarCompare(Box::new(ScalarCompare {
                left: inner.left.clone(),
                op: inner.op,
                select,
                select_column: inner.select_column.clone(),
                resolved: inner.resolved.clone(),
            }))
        }
    }
}

/// Builds this scope's plan graph, enumerates flip patterns, and applies
/// the winning one. `prepared` must already have every related selection
/// planned and every resolvable scalar sub-select resolved.
fn plan_prepared(
    prepared: &Select,
    cost_model: &dyn CostModel,
    config: &CostModelConfig,
    cancellation: &CancellationToken,
    debug: &mut dyn DebugObserver,
) -> Select {
    let mut graph = PlanGraph::build(prepared, cost_model);
    let flippable_count = graph.flippable_joins().count();

    let baseline_cost = score_attempt(&mut graph, cost_model, config, 0, debug);
    let mut best: Best = (baseline_cost, 0, graph.snapshot());

    if flippable_count <= config.exhaustive_join_threshold {
        let total_patterns = 1u128 << flippable_count;
        for attempt in 1..total_patterns {
            if cancellation.is_cancelled() {
                break;
            }
            let mut bits = FixedBitSet::with_capacity(flippable_count);
            for i in 0..flippable_count {
                if attempt & (1u128 << i) != 0 {
                    bits.insert(i);
                }
            }
            graph.reset_planning_state();
            graph.apply_flip_pattern(&bits);
            let cost = score_attempt(&mut graph, cost_model, config, attempt as usize, debug);
            consider_attempt(&mut best, cost, attempt as usize, &graph);
        }
    } else {
        greedy_search(&mut graph, cost_model, config, cancellation, debug, &mut best);
    }

    graph.restore(&best.2);
    apply_plan(prepared, &graph)
}

/// Hill-climbs from the all-semi baseline (spec §4.5 step 2): each step
/// tries flipping every not-yet-flipped join in isolation and commits the
/// single flip that most reduces cost over the current working set;
/// stops once no remaining flip improves on it. Bounded by `J` steps of
/// up to `J` trials each, so at most `J^2` attempts (spec S6).
fn greedy_search(
    graph: &mut PlanGraph,
    cost_model: &dyn CostModel,
    config: &CostModelConfig,
    cancellation: &CancellationToken,
    debug: &mut dyn DebugObserver,
    best: &mut Best,
) {
    let flippable: Vec<JoinId> = graph.flippable_joins().map(|j| j.id).collect();
    let mut working = vec![false; flippable.len()];
    let mut working_cost = best.0;
    let mut attempt = 1usize;

    loop {
        if cancellation.is_cancelled() {
            break;
        }
        let mut step_best: Option<(f64, usize)> = None;

        for (i, &already_flipped) in working.iter().enumerate() {
            if already_flipped {
                continue;
            }
            if cancellation.is_cancelled() {
                break;
            }
            let mut trial = working.clone();
            trial[i] = true;
            graph.reset_planning_state();
            apply_bools(graph, &flippable, &trial);
            let cost = score_attempt(graph, cost_model, config, attempt, debug);
            consider_attempt(best, cost, attempt, graph);
            if step_best.is_none_or(|(best_cost, _)| cost < best_cost) {
                step_best = Some((cost, i));
            }
            attempt += 1;
        }

        match step_best {
            Some((cost, i)) if cost < working_cost => {
                working[i] = true;
                working_cost = cost;
            }
            _ => break,
        }
    }
}

/// Derives every connection's inbound constraint from the graph's current
/// join-type assignment: a semi join binds its child's unique key, a
/// flipped join binds its parent's correlated columns.
fn apply_constraints(graph: &mut PlanGraph) {
    let mut bindings: HashMap<ConnectionId, Vec<ColumnName>> = HashMap::new();
    for join in graph.joins() {
        let (target, columns): (_, Vec<ColumnName>) = match join.join_type {
            JoinType::Semi => (join.child, join.correlation.child_fields().cloned().collect()),
            JoinType::Flipped => (join.parent, join.correlation.parent_fields().cloned().collect()),
        };
        let entry = bindings.entry(target).or_default();
        for column in columns {
            if !entry.contains(&column) {
                entry.push(column);
            }
        }
    }
    for node in graph.topological_connections() {
        graph.connection_mut(node).constraint = match bindings.remove(&node) {
            Some(columns) => Constraint { columns },
            None => Constraint::empty(),
        };
    }
}

fn apply_bools(graph: &mut PlanGraph, flippable: &[JoinId], flipped: &[bool]) {
    for (&id, &is_flipped) in flippable.iter().zip(flipped.iter()) {
        graph.join_mut(id).join_type = if is_flipped { JoinType::Flipped } else { JoinType::Semi };
    }
}

/// Updates `best` if `cost` wins outright, or ties and wins the tie-break
/// (fewer flipped joins, then lower attempt index — spec §4.5 step 5).
fn consider_attempt(best: &mut Best, cost: f64, attempt: usize, graph: &PlanGraph) {
    let candidate = graph.snapshot();
    let better = cost < best.0
        || (cost == best.0 && candidate.flipped_count() < best.2.flipped_count())
        || (cost == best.0 && candidate.flipped_count() == best.2.flipped_count() && attempt < best.1);
    if better {
        *best = (cost, attempt, candidate);
    }
}

/// Scores the graph's current join-type assignment (spec §4.5 steps 3-4):
/// a topological walk propagating inbound constraints, summing
/// `rows + startupCost` per connection plus each join's scaled
/// contribution.
///
/// Constraints are derived from the join-type assignment directly rather
/// than threaded forward during the walk: a semi join's binding lands on
/// its child, a flipped join's on its parent, and the graph's edges always
/// run parent-to-child regardless of orientation, so a parent is visited
/// before any constraint a flipped join would place on it could be
/// computed mid-walk. Deriving every connection's constraint up front
/// (spec §4.5 step 3, "flipped joins propagate their child-side
/// constraints upward instead") sidesteps that ordering mismatch.
fn score_attempt(
    graph: &mut PlanGraph,
    cost_model: &dyn CostModel,
    config: &CostModelConfig,
    attempt: usize,
    debug: &mut dyn DebugObserver,
) -> f64 {
    apply_constraints(graph);

    let order = graph.topological_connections();
    let mut estimates = HashMap::with_capacity(graph.connection_count());

    for &conn_id in &order {
        let (table, filter, ordering, constraint) = {
            let conn = graph.connection(conn_id);
            (conn.table.clone(), conn.filter.clone(), conn.ordering.clone(), conn.constraint.clone())
        };
        let query = CostQuery {
            table: &table,
            ordering: ordering.as_ref(),
            filter: filter.as_ref(),
            constraint: if constraint.is_empty() { None } else { Some(&constraint) },
        };
        let estimate = match cost_model.estimate(&query) {
            Ok(estimate) => estimate,
            // Spec §7: StatsUnavailable degrades to a row-counts-only
            // estimate for this one connection rather than poisoning the
            // whole attempt to +inf — otherwise one never-ANALYZEd table
            // would make every flip pattern score identically and the
            // fewest-flips tie-break would always keep the all-semi
            // baseline, even when a flip elsewhere is genuinely cheaper.
            Err(PlanError::StatsUnavailable { table: unavailable }) => {
                debug.on_attempt_failed(attempt, &format!("no statistics for {unavailable}; using row-count-only fallback"));
                CostEstimate::new(config.unknown_table_cost, 0.0, None)
            }
            Err(err) => {
                debug.on_attempt_failed(attempt, &err.to_string());
                return f64::INFINITY;
            }
        };
        debug.on_connection_cost(&ConnectionEval { attempt, connection: conn_id, estimate });
        estimates.insert(conn_id, estimate);
    }

    let mut total: f64 = estimates.values().map(|e| e.rows + e.startup_cost).sum();

    for join in graph.joins() {
        let (Some(&parent_estimate), Some(&child_estimate)) =
            (estimates.get(&join.parent), estimates.get(&join.child))
        else {
            continue;
        };
        total += match join.join_type {
            JoinType::Semi => child_estimate.rows * child_estimate.fan_out.unwrap_or(1.0) * parent_estimate.rows,
            JoinType::Flipped => parent_estimate.rows * child_estimate.rows * parent_estimate.fan_out.unwrap_or(1.0),
        };
    }

    let join_types = graph.joins().iter().map(|j| (j.id, j.join_type)).collect();
    debug.on_plan_complete(&AttemptOutcome {
        attempt,
        total_cost: total,
        join_types,
        snapshot: graph.snapshot(),
    });

    total
}
