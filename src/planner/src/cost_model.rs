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

use zql_ast::{ColumnName, Condition, Ordering, TableName};

use crate::graph::Constraint;
use crate::PlanResult;

/// The cost of instantiating one connection under a given constraint and
/// filter (spec §3, "Cost estimate").
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostEstimate {
    /// Expected output cardinality of this connection, always `>= 1`.
    pub rows: f64,
    /// Fixed cost paid before the first row (e.g. sort-tree construction).
    pub startup_cost: f64,
    /// Expected child rows per parent row, when this connection is the
    /// child of a join on `constraint`'s columns. `None` when the caller
    /// didn't ask for it (no inbound constraint) or the model can't derive
    /// one.
    pub fan_out: Option<f64>,
}

impl CostEstimate {
    pub fn new(rows: f64, startup_cost: f64, fan_out: Option<f64>) -> Self {
        debug_assert!(rows >= 1.0, "row estimate must be >= 1, got {rows}");
        Self {
            rows: rows.max(1.0),
            startup_cost,
            fan_out,
        }
    }
}

/// One call's worth of input to a [`CostModel`]: a table, the ordering a
/// connection must serve, its non-correlated filter, and (if any) the
/// inbound constraint pinned by an upstream semi-join.
#[derive(Debug, Clone, Copy)]
pub struct CostQuery<'a> {
    pub table: &'a TableName,
    pub ordering: Option<&'a Ordering>,
    pub filter: Option<&'a Condition>,
    pub constraint: Option<&'a Constraint>,
}

/// Given `(table, ordering, filter-without-correlated-subqueries,
/// inbound-constraint?)`, return a cost estimate (spec §4.2).
///
/// Implementations must never panic; an unknown table is a sentinel high
/// cost, not an error that aborts planning (the concrete
/// [`CostModelConfig`](crate::CostModelConfig)'s `unknown_table_cost` is a
/// reasonable default for that sentinel).
pub trait CostModel {
    fn estimate(&self, query: &CostQuery<'_>) -> PlanResult<CostEstimate>;

    /// `table`'s declared unique key, ordered, if the engine knows one
    /// (spec §3, "Unique key"; §4.4 flip legality). `Ok(None)` when the
    /// engine has no such information for this table (including a
    /// genuinely unknown table) — callers must treat that as "flip
    /// legality can't be proven", not as a free pass.
    fn unique_key(&self, table: &TableName) -> PlanResult<Option<Vec<ColumnName>>>;
}

/// A cost model returning a constant estimate regardless of input, for
/// tests that only want to exercise the planner's enumeration and
/// bookkeeping, not the cost arithmetic (spec §6, "a stub that returns
/// constant costs").
#[derive(Debug, Clone, Copy)]
pub struct StubCostModel {
    pub estimate: CostEstimate,
}

impl StubCostModel {
    pub fn new(rows: f64) -> Self {
        Self {
            estimate: CostEstimate::new(rows, 0.0, None),
        }
    }
}

impl CostModel for StubCostModel {
    fn estimate(&self, _query: &CostQuery<'_>) -> PlanResult<CostEstimate> {
        Ok(self.estimate)
    }

    /// Every table has the single-column key `id`, matching the
    /// convention every fixture and generated test AST already follows.
    fn unique_key(&self, _table: &TableName) -> PlanResult<Option<Vec<ColumnName>>> {
        Ok(Some(vec![ColumnName::from("id")]))
    }
}

/// Decorator that traces every call to an inner cost model before
/// delegating (spec §6, "a cost-logger wrapper, for diagnostics").
pub struct LoggingCostModel<C> {
    inner: C,
}

impl<C> LoggingCostModel<C> {
    pub fn new(inner: C) -> Self {
        Self { inner }
    }
}

impl<C: CostModel> CostModel for LoggingCostModel<C> {
    fn estimate(&self, query: &CostQuery<'_>) -> PlanResult<CostEstimate> {
        let result = self.inner.estimate(query);
        match &result {
            Ok(estimate) => tracing::debug!(
                table = %query.table,
                rows = estimate.rows,
                startup_cost = estimate.startup_cost,
                fan_out = ?estimate.fan_out,
                "cost model estimate"
            ),
            Err(err) => tracing::warn!(table = %query.table, error = %err, "cost model failure"),
        }
        result
    }

    fn unique_key(&self, table: &TableName) -> PlanResult<Option<Vec<ColumnName>>> {
        self.inner.unique_key(table)
    }
}
