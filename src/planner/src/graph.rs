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

//! The plan graph (spec §3, §4.4): connections and joins derived from one
//! plan scope's AST. Built fresh per `plan_query` call and discarded once
//! the chosen plan is written back (spec §3, "lifecycle").

use petgraph::graph::NodeIndex;
use petgraph::stable_graph::StableGraph;
use petgraph::Direction as PetDirection;

use zql_ast::{Condition, ColumnName, Correlation, CorrelatedSubSelect, Ordering, Select, TableName};

use crate::cost_model::CostModel;

/// Opaque handle to one connection (table occurrence) in a plan graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(NodeIndex);

/// Stable integer identifying one join for AST write-back (spec §3,
/// "plan-id"). Also indexes `PlanGraph::joins`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JoinId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Semi,
    Flipped,
}

/// Columns whose values are known at plan time, bound by an upstream join
/// (spec §3, "inbound constraint").
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Constraint {
    pub columns: Vec<ColumnName>,
}

impl Constraint {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// One step locating a [`Condition::Correlated`] node within a `Select`
/// tree, relative to the root of its owning plan graph (Design Notes §9:
/// a parallel `planId -> AST path` map standing in for the original's
/// mutable back-pointers).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathStep {
    And(usize),
    Or(usize),
    /// Step into a correlated sub-select's own `where_condition`, to reach
    /// a join nested below it (still the same plan graph).
    IntoCorrelated,
}

#[derive(Debug, Clone)]
pub struct Connection {
    pub table: TableName,
    /// The non-correlated conjunction/disjunction of filters applying at
    /// this connection (correlated sub-selects stripped out; they are
    /// represented as joins instead).
    pub filter: Option<Condition>,
    pub ordering: Option<Ordering>,
    pub constraint: Constraint,
}

#[derive(Debug, Clone)]
pub struct Join {
    pub id: JoinId,
    pub parent: ConnectionId,
    pub child: ConnectionId,
    pub correlation: Correlation,
    pub join_type: JoinType,
    /// Whether this join is eligible to be flipped at all (spec §4.4: a
    /// join under a disjunction with a non-correlated sibling is fixed to
    /// semi and never appears in `flippable_joins()`).
    pub flippable: bool,
    pub path: Vec<PathStep>,
}

/// Captured join-type assignment, for `PlanGraph::snapshot`/`restore`.
#[derive(Debug, Clone)]
pub struct PlanSnapshot {
    join_types: Vec<JoinType>,
}

impl PlanSnapshot {
    /// Number of joins oriented `Flipped`, used for the tie-break rule
    /// that prefers fewer flipped joins (spec §4.5 step 5).
    pub fn flipped_count(&self) -> usize {
        self.join_types.iter().filter(|&&t| t == JoinType::Flipped).count()
    }
}

pub struct PlanGraph {
    graph: StableGraph<Connection, ()>,
    joins: Vec<Join>,
    root: ConnectionId,
}

impl PlanGraph {
    /// Builds a plan graph for one plan scope, rooted at `select`.
    /// Related sub-selections are NOT traversed: each roots its own
    /// independent plan graph built via a separate call (spec §3,
    /// "Sub-plan scope"). `cost_model` is consulted for each correlated
    /// sub-select's child's unique key, to decide flip legality (spec §3,
    /// §4.4).
    pub fn build(select: &Select, cost_model: &dyn CostModel) -> Self {
        let mut graph = StableGraph::new();
        let mut joins = Vec::new();
        let root = build_connection(select, &mut graph, &mut joins, Vec::new(), cost_model);
        PlanGraph { graph, joins, root }
    }

    pub fn root(&self) -> ConnectionId {
        self.root
    }

    pub fn connection(&self, id: ConnectionId) -> &Connection {
        &self.graph[id.0]
    }

    pub fn connection_mut(&mut self, id: ConnectionId) -> &mut Connection {
        &mut self.graph[id.0]
    }

    pub fn joins(&self) -> &[Join] {
        &self.joins
    }

    pub fn join(&self, id: JoinId) -> &Join {
        &self.joins[id.0 as usize]
    }

    pub fn join_mut(&mut self, id: JoinId) -> &mut Join {
        &mut self.joins[id.0 as usize]
    }

    /// Joins eligible for flipping, in plan-id order (spec §4.4).
    pub fn flippable_joins(&self) -> impl Iterator<Item = &Join> {
        self.joins.iter().filter(|j| j.flippable)
    }

    /// Sets every flippable join's type from `bits`: bit `i` set means the
    /// `i`-th flippable join (in plan-id order) is flipped (spec §3,
    /// "Flip pattern").
    pub fn apply_flip_pattern(&mut self, bits: &fixedbitset::FixedBitSet) {
        let flippable_ids: Vec<JoinId> = self.flippable_joins().map(|j| j.id).collect();
        for (i, id) in flippable_ids.into_iter().enumerate() {
            self.join_mut(id).join_type = if bits.contains(i) {
                JoinType::Flipped
            } else {
                JoinType::Semi
            };
        }
    }

    /// Resets every join to `Semi` (the baseline, attempt 0) and clears
    /// every connection's inbound constraint.
    pub fn reset_planning_state(&mut self) {
        for join in &mut self.joins {
            join.join_type = JoinType::Semi;
        }
        for node in self.graph.node_weights_mut() {
            node.constraint = Constraint::empty();
        }
    }

    pub fn snapshot(&self) -> PlanSnapshot {
        PlanSnapshot {
            join_types: self.joins.iter().map(|j| j.join_type).collect(),
        }
    }

    pub fn restore(&mut self, snapshot: &PlanSnapshot) {
        for (join, &join_type) in self.joins.iter_mut().zip(snapshot.join_types.iter()) {
            join.join_type = join_type;
        }
    }

    /// Count of connections in the plan graph, for trace sizing.
    pub fn connection_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Connections in an order where every join's parent comes before its
    /// child, so constraint propagation (spec §4.5 step 3) always sees an
    /// up-to-date upstream constraint.
    pub fn topological_connections(&self) -> Vec<ConnectionId> {
        petgraph::algo::toposort(&self.graph, None)
            .expect("plan graph is acyclic by AST invariant (spec §3)")
            .into_iter()
            .map(ConnectionId)
            .collect()
    }

    pub fn joins_with_child(&self, child: ConnectionId) -> impl Iterator<Item = &Join> {
        self.joins.iter().filter(move |j| j.child == child)
    }

    pub fn parent_edge_count(&self, id: ConnectionId) -> usize {
        self.graph.edges_directed(id.0, PetDirection::Incoming).count()
    }
}

fn build_connection(
    select: &Select,
    graph: &mut StableGraph<Connection, ()>,
    joins: &mut Vec<Join>,
    path_prefix: Vec<PathStep>,
    cost_model: &dyn CostModel,
) -> ConnectionId {
    let mut extracted = Vec::new();
    let filter = strip_correlated(select.where_condition.as_ref(), true, &mut Vec::new(), &mut extracted);

    let node = graph.add_node(Connection {
        table: select.table.clone(),
        filter,
        ordering: select.ordering.clone(),
        constraint: Constraint::empty(),
    });
    let conn_id = ConnectionId(node);

    for (local_path, flip_ctx, sub) in extracted {
        let mut child_path = path_prefix.clone();
        child_path.extend(local_path.clone());
        child_path.push(PathStep::IntoCorrelated);
        let child_id = build_connection(&sub.select, graph, joins, child_path, cost_model);
        graph.add_edge(node, child_id.0, ());

        let flippable = flip_ctx && is_flip_legal(cost_model, &sub.correlation, &sub.select.table);

        let mut full_path = path_prefix.clone();
        full_path.extend(local_path);
        joins.push(Join {
            id: JoinId(joins.len() as u32),
            parent: conn_id,
            child: child_id,
            correlation: sub.correlation,
            join_type: JoinType::Semi,
            flippable,
            path: full_path,
        });
    }

    conn_id
}

/// Whether flipping a join on `correlation` against `child_table` can be
/// proven safe (spec §3, "flip legality"; §8 invariant 7): legal only
/// when the child's declared unique key is fully covered by the
/// correlation's child-side fields, so pinning those fields to a single
/// parent's values already pins down at most one child row and flipping
/// can't duplicate a parent in the output. No unique key known (or the
/// provider errors) means legality can't be proven, so the join stays
/// semi-only.
fn is_flip_legal(cost_model: &dyn CostModel, correlation: &Correlation, child_table: &TableName) -> bool {
    let unique_key = match cost_model.unique_key(child_table) {
        Ok(key) => key,
        Err(err) => {
            tracing::warn!(table = %child_table, error = %err, "could not determine unique key; join stays semi-only");
            return false;
        }
    };
    match unique_key {
        Some(key) if !key.is_empty() => key.iter().all(|k| correlation.child_fields().any(|c| c == k)),
        _ => false,
    }
}

/// Strips `Condition::Correlated` nodes out of a condition tree, returning
/// the remaining non-correlated filter and appending `(path, flippable,
/// sub)` for every correlated sub-select found, in traversal order.
///
/// `flip_ctx` is whether flipping is currently permitted by ancestor
/// disjunctions (spec §4.4: suppressed once any ancestor `Or` has a
/// non-correlated sibling branch).
fn strip_correlated(
    cond: Option<&Condition>,
    flip_ctx: bool,
    path: &mut Vec<PathStep>,
    out: &mut Vec<(Vec<PathStep>, bool, CorrelatedSubSelect)>,
) -> Option<Condition> {
    let cond = cond?;
    match cond {
        Condition::Simple(_) | Condition::ScalarCompare(_) => Some(cond.clone()),
        Condition::Correlated(inner) => {
            out.push((path.clone(), flip_ctx, (**inner).clone()));
            None
        }
        Condition::And(items) => {
            let mut kept = Vec::new();
            for (i, item) in items.iter().enumerate() {
                path.push(PathStep::And(i));
                if let Some(stripped) = strip_correlated(Some(item), flip_ctx, path, out) {
                    kept.push(stripped);
                }
                path.pop();
            }
            match kept.len() {
                0 => None,
                1 => Some(kept.into_iter().next().unwrap()),
                _ => Some(Condition::And(kept)),
            }
        }
        Condition::Or(items) => {
            // A disjunction's branches can't be cost-scored independently
            // of one another (the plan graph has no combinator of its
            // own, only connections and joins), so there is no sound way
            // to credit a flip under an Or with the constraint-propagation
            // benefit it would get under an And. Always fixed to semi,
            // even when every sibling branch is itself correlated.
            let child_flip_ctx = false;
            let mut kept = Vec::new();
            for (i, item) in items.iter().enumerate() {
                path.push(PathStep::Or(i));
                if let Some(stripped) = strip_correlated(Some(item), child_flip_ctx, path, out) {
                    kept.push(stripped);
                }
                path.pop();
            }
            match kept.len() {
                0 => None,
                1 => Some(kept.into_iter().next().unwrap()),
                _ => Some(Condition::Or(kept)),
            }
        }
    }
}
