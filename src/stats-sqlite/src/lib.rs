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

//! The reference stats provider (spec §4.3): a [`CostModel`] backed by
//! `SQLite`. Asks the engine's own planner, via `EXPLAIN QUERY PLAN`, which
//! index (if any) it would use and whether it would need a sort, then
//! turns that into numbers using `sqlite_stat1` (populated by `ANALYZE`)
//! and a maintained NULL-ratio side table.
//!
//! Per-`(table, columns)` fan-out and NULL-ratio lookups are memoized in
//! an [`ArcSwap`] snapshot: planning holds a shared read of the current
//! snapshot, and [`SqliteCostModel::stats_updated`] /
//! [`SqliteCostModel::schema_updated`] swap in a fresh one (spec §9,
//! "Stats volatility").

mod render;

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use rusqlite::{Connection, OptionalExtension};

use zql_ast::{ColumnName, Condition, TableName};
use zql_planner::{CostEstimate, CostModel, CostModelConfig, CostQuery, PlanError, PlanResult};

const NULL_RATIO_TABLE: &str = "zql_null_ratio";

#[derive(Debug, Clone, Default)]
struct StatsSnapshot {
    fan_out: HashMap<(String, Vec<String>), f64>,
    null_ratio: HashMap<(String, String), f64>,
}

/// One row of `sqlite_stat1`: the index that produced it (`None` for the
/// table's own unindexed row count) and its parsed `stat` column.
struct Stat1Row {
    index: Option<String>,
    values: Vec<f64>,
}

/// What `EXPLAIN QUERY PLAN` told us about how `SQLite` would run one
/// connection's query: the index it picked (if any), the names of that
/// index's leading columns that were bound by an equality (in index
/// order, so callers can tell which predicate — constraint or filter —
/// each one came from), whether the match was the rowid/integer primary
/// key rather than a named index, and whether a separate sort step was
/// needed.
struct ExplainInfo {
    index: Option<String>,
    bound_columns: usize,
    bound_column_names: Vec<String>,
    primary_key_match: bool,
    needs_sort: bool,
}

/// A [`CostModel`] backed by a `SQLite` connection (spec §4.3).
///
/// Construction does not run `ANALYZE`; callers are expected to have done
/// so (or to call it themselves) before planning, the same way the
/// external storage subsystem is expected to in production.
pub struct SqliteCostModel {
    conn: Connection,
    config: CostModelConfig,
    cache: ArcSwap<StatsSnapshot>,
}

impl SqliteCostModel {
    pub fn new(conn: Connection, config: CostModelConfig) -> rusqlite::Result<Self> {
        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {NULL_RATIO_TABLE} (
                    table_name TEXT NOT NULL,
                    column_name TEXT NOT NULL,
                    ratio REAL NOT NULL,
                    PRIMARY KEY (table_name, column_name)
                )"
            ),
            [],
        )?;
        Ok(Self {
            conn,
            config,
            cache: ArcSwap::from_pointee(StatsSnapshot::default()),
        })
    }

    /// Records `table.column`'s NULL ratio, read back by row estimation
    /// (spec §4.3 step 1). Exposed for fixtures and the external storage
    /// subsystem's maintenance job; not used by planning itself.
    pub fn record_null_ratio(&self, table: &TableName, column: &ColumnName, ratio: f64) -> rusqlite::Result<()> {
        self.conn.execute(
            &format!(
                "INSERT INTO {NULL_RATIO_TABLE} (table_name, column_name, ratio) VALUES (?1, ?2, ?3)
                 ON CONFLICT(table_name, column_name) DO UPDATE SET ratio = excluded.ratio"
            ),
            rusqlite::params![table.as_str(), column.as_str(), ratio],
        )?;
        self.stats_updated();
        Ok(())
    }

    /// Invalidates the row-estimate and fan-out memo caches; the schema
    /// (index shape) is assumed unchanged (spec §6, "statsUpdated").
    pub fn stats_updated(&self) {
        self.cache.store(Arc::new(StatsSnapshot::default()));
    }

    /// Invalidates everything, including anything cached about index
    /// shape (spec §6, "schemaUpdated"). Index shape itself is never
    /// cached by this implementation, so this is currently identical to
    /// [`Self::stats_updated`]; kept distinct because callers reason about
    /// them as separate events.
    pub fn schema_updated(&self) {
        self.cache.store(Arc::new(StatsSnapshot::default()));
    }

    fn stat1_rows(&self, table: &str) -> PlanResult<Vec<Stat1Row>> {
        let mut stmt = self
            .conn
            .prepare("SELECT idx, stat FROM sqlite_stat1 WHERE tbl = ?1")
            .map_err(|e| cost_failure(table, e))?;
        let rows = stmt
            .query_map(rusqlite::params![table], |row| {
                let idx: Option<String> = row.get(0)?;
                let stat: String = row.get(1)?;
                Ok((idx, stat))
            })
            .map_err(|e| cost_failure(table, e))?;

        let mut out = Vec::new();
        for row in rows {
            let (index, stat) = row.map_err(|e| cost_failure(table, e))?;
            let values = stat.split_whitespace().filter_map(|s| s.parse::<f64>().ok()).collect();
            out.push(Stat1Row { index, values });
        }
        Ok(out)
    }

    /// Whether `table` appears in the schema at all, distinguishing a
    /// genuinely unknown table (spec §4.2, "unknown table returns a
    /// sentinel high cost") from a known table `ANALYZE` hasn't covered
    /// yet (`PlanError::StatsUnavailable`).
    fn table_exists(&self, table: &str) -> PlanResult<bool> {
        self.conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type IN ('table', 'view') AND name = ?1",
                rusqlite::params![table],
                |_| Ok(()),
            )
            .optional()
            .map(|found| found.is_some())
            .map_err(|e| cost_failure(table, e))
    }

    /// `table`'s primary-key columns, in key order, via `PRAGMA
    /// table_info` (spec §3, "Unique key"). `None` if the table has no
    /// declared primary key (including `rowid`-only tables, which this
    /// reference implementation doesn't treat as having a stable key).
    fn unique_key_columns(&self, table: &str) -> PlanResult<Option<Vec<String>>> {
        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA table_info({})", quote_ident(table)))
            .map_err(|e| cost_failure(table, e))?;
        let mut columns: Vec<(i64, String)> = stmt
            .query_map([], |row| {
                let name: String = row.get(1)?;
                let pk_position: i64 = row.get(5)?;
                Ok((pk_position, name))
            })
            .map_err(|e| cost_failure(table, e))?
            .collect::<rusqlite::Result<_>>()
            .map_err(|e| cost_failure(table, e))?;
        columns.retain(|(pk_position, _)| *pk_position > 0);
        columns.sort_by_key(|(pk_position, _)| *pk_position);
        if columns.is_empty() {
            Ok(None)
        } else {
            Ok(Some(columns.into_iter().map(|(_, name)| name).collect()))
        }
    }

    fn index_columns(&self, index: &str) -> PlanResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA index_info({})", quote_ident(index)))
            .map_err(|e| cost_failure(index, e))?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(2))
            .map_err(|e| cost_failure(index, e))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| cost_failure(index, e))?;
        Ok(names)
    }

    /// Asks `SQLite`'s own planner how it would execute a scan of `table`
    /// under `filter` plus an equality on each of `constraint_columns`
    /// (standing in for the inbound constraint's pinned values), required
    /// to serve `ordering_columns`.
    fn explain(
        &self,
        table: &str,
        filter: Option<&Condition>,
        constraint_columns: &[String],
        ordering_columns: &[String],
    ) -> PlanResult<ExplainInfo> {
        let mut clauses: Vec<String> = constraint_columns.iter().map(|c| format!("{c} = NULL")).collect();
        if let Some(filter) = filter {
            clauses.push(render::render_filter(filter));
        }
        let where_sql = if clauses.is_empty() { "1=1".to_owned() } else { clauses.join(" AND ") };
        let order_sql =
            if ordering_columns.is_empty() { String::new() } else { format!(" ORDER BY {}", ordering_columns.join(", ")) };
        let sql = format!("EXPLAIN QUERY PLAN SELECT * FROM {} WHERE {where_sql}{order_sql}", quote_ident(table));

        let mut stmt = self.conn.prepare(&sql).map_err(|e| cost_failure(table, e))?;
        let details: Vec<String> = stmt
            .query_map([], |row| row.get::<_, String>(3))
            .map_err(|e| cost_failure(table, e))?
            .collect::<rusqlite::Result<_>>()
            .map_err(|e| cost_failure(table, e))?;

        let mut info = ExplainInfo {
            index: None,
            bound_columns: 0,
            bound_column_names: Vec::new(),
            primary_key_match: false,
            needs_sort: false,
        };
        for detail in &details {
            if detail.contains("USE TEMP B-TREE FOR ORDER BY") {
                info.needs_sort = true;
            }
            if let Some(after) = detail.split("USING INDEX ").nth(1) {
                let name = after.split_whitespace().next().unwrap_or("").to_owned();
                // An index picked purely to satisfy ORDER BY (no `(col=?)`
                // clause at all) binds zero equality columns; forcing a
                // floor of 1 here would misread the stat1 row at the wrong
                // position as if the scan were actually constrained.
                let bound = after.matches('=').count();
                let columns = self.index_columns(&name)?;
                info.bound_column_names = columns.into_iter().take(bound).collect();
                info.index = Some(name);
                info.bound_columns = bound;
            } else if detail.contains("USING INTEGER PRIMARY KEY") || detail.contains("USING PRIMARY KEY") {
                // `rowid`/`INTEGER PRIMARY KEY` lookups never show up as a
                // named index (spec §4.3 step 4 covers only index-backed
                // access), but are equally selective: the declared primary
                // key column is unique, so a single equality narrows to at
                // most one row.
                let bound = detail.matches('=').count().max(1);
                let columns = self.unique_key_columns(table)?.unwrap_or_default();
                info.bound_column_names = columns.into_iter().take(bound).collect();
                info.bound_columns = bound;
                info.primary_key_match = true;
            }
        }
        Ok(info)
    }

    fn null_ratio(&self, table: &str, column: &str) -> PlanResult<Option<f64>> {
        let key = (table.to_owned(), column.to_owned());
        if let Some(ratio) = self.cache.load().null_ratio.get(&key) {
            return Ok(Some(*ratio));
        }
        let ratio: Option<f64> = self
            .conn
            .query_row(
                &format!("SELECT ratio FROM {NULL_RATIO_TABLE} WHERE table_name = ?1 AND column_name = ?2"),
                rusqlite::params![table, column],
                |row| row.get(0),
            )
            .ok();
        if let Some(ratio) = ratio {
            self.cache.rcu(|snapshot| {
                let mut next = (**snapshot).clone();
                next.null_ratio.insert(key.clone(), ratio);
                next
            });
        }
        Ok(ratio)
    }

    /// Fan-out for `constraint_columns` against `table` (spec §4.3 step
    /// 4): prefers a single compound index covering every constraint
    /// column in order, falling back to the most selective single-column
    /// match. Memoized per `(table, constraint_columns)`.
    fn fan_out(&self, table: &str, constraint_columns: &[String]) -> PlanResult<Option<f64>> {
        if constraint_columns.is_empty() {
            return Ok(None);
        }
        let key = (table.to_owned(), constraint_columns.to_vec());
        if let Some(value) = self.cache.load().fan_out.get(&key) {
            return Ok(Some(*value));
        }

        let rows = self.stat1_rows(table)?;
        let mut compound_match = None;
        let mut best_single: Option<f64> = None;

        for row in &rows {
            let Some(index) = &row.index else { continue };
            let cols = self.index_columns(index)?;
            // `sqlite_stat1`'s index rows are `nRows avgEq1 avgEq2 ...`:
            // `values[k]` is the average rows sharing a value across the
            // index's first `k` columns, so a `k`-column constraint reads
            // position `k`, not `k - 1`.
            if cols.len() >= constraint_columns.len() && cols[..constraint_columns.len()] == constraint_columns[..] {
                if let Some(&value) = row.values.get(constraint_columns.len()) {
                    compound_match = Some(value);
                }
            }
            if let Some(first) = cols.first() {
                if constraint_columns.contains(first) {
                    if let Some(&value) = row.values.get(1) {
                        best_single = Some(best_single.map_or(value, |b: f64| b.min(value)));
                    }
                }
            }
        }

        let result = compound_match.or(best_single);
        if let Some(value) = result {
            self.cache.rcu(|snapshot| {
                let mut next = (**snapshot).clone();
                next.fan_out.insert(key.clone(), value);
                next
            });
        }
        Ok(result)
    }
}

impl CostModel for SqliteCostModel {
    fn estimate(&self, query: &CostQuery<'_>) -> PlanResult<CostEstimate> {
        let table = query.table.as_str();

        if !self.table_exists(table)? {
            return Ok(CostEstimate::new(self.config.unknown_table_cost, 0.0, None));
        }

        let equality_cols = query.filter.map(equality_columns).unwrap_or_default();
        let constraint_cols: Vec<String> = query
            .constraint
            .map(|c| c.columns.iter().map(|col| col.as_str().to_owned()).collect())
            .unwrap_or_default();
        let ordering_cols: Vec<String> = query
            .ordering
            .map(|o| o.iter().map(|k| k.column.as_str().to_owned()).collect())
            .unwrap_or_default();

        let explain = self.explain(table, query.filter, &constraint_cols, &ordering_cols)?;
        let stat1 = self.stat1_rows(table)?;
        let base = stat1
            .iter()
            .find(|r| r.index.is_none())
            .and_then(|r| r.values.first().copied())
            .ok_or_else(|| PlanError::StatsUnavailable { table: table.to_owned() })?;

        let indexed_value = if explain.primary_key_match {
            // The declared primary key (or bare `rowid`) is unique, so an
            // equality on it narrows to at most one row — no stat1 entry
            // to look up, unlike a named index.
            Some(1.0)
        } else {
            explain.index.as_ref().map(|index| {
                let position = explain.bound_columns;
                stat1
                    .iter()
                    .find(|r| r.index.as_deref() == Some(index.as_str()))
                    .and_then(|r| r.values.get(position).copied())
                    .unwrap_or(base)
            })
        };

        let mut rows = match indexed_value {
            Some(value) => {
                if let Some(column) = constraint_cols.first() {
                    if let Some(ratio) = self.null_ratio(table, column)? {
                        rows_scale(value, 1.0 - ratio)
                    } else {
                        value
                    }
                } else {
                    value
                }
            }
            None => base,
        };

        // Count by column identity, not position: `bound_column_names`
        // covers whichever predicates (constraint or filter) the index
        // actually bound, so this only credits a filter equality as
        // "indexed" when its own column is one of them.
        let indexed_columns =
            equality_cols.iter().filter(|column| explain.bound_column_names.contains(column)).count();
        let unindexed_equalities = equality_cols.len().saturating_sub(indexed_columns);
        for _ in 0..unindexed_equalities {
            rows /= self.config.unindexed_equality_divisor;
        }
        rows = rows.max(1.0);

        let startup_cost = if explain.needs_sort {
            (rows * rows.log2().max(0.0)) / self.config.sort_cost_divisor
        } else {
            0.0
        };

        let fan_out = self.fan_out(table, &constraint_cols)?;

        Ok(CostEstimate::new(rows, startup_cost, fan_out))
    }

    fn unique_key(&self, table: &TableName) -> PlanResult<Option<Vec<ColumnName>>> {
        let columns = self.unique_key_columns(table.as_str())?;
        Ok(columns.map(|cols| cols.into_iter().map(ColumnName::from).collect()))
    }
}

fn rows_scale(rows: f64, factor: f64) -> f64 {
    rows * factor
}

fn equality_columns(condition: &Condition) -> Vec<String> {
    use zql_ast::Operand;
    use zql_ast::Operator;
    match condition {
        Condition::Simple(p) if p.op == Operator::Eq => match &p.left {
            Operand::Column(c) => vec![c.as_str().to_owned()],
            _ => Vec::new(),
        },
        Condition::And(items) => items.iter().flat_map(equality_columns).collect(),
        _ => Vec::new(),
    }
}

fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn cost_failure(table: &str, source: impl std::error::Error + Send + Sync + 'static) -> PlanError {
    PlanError::CostModelFailure { table: table.to_owned(), source: anyhow::Error::new(source) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zql_ast::{Condition, Operand, Operator, SimplePredicate};
    use zql_planner::Constraint;

    fn fixture() -> SqliteCostModel {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE track (id INTEGER PRIMARY KEY, album_id INTEGER, title TEXT);
             CREATE TABLE album (id INTEGER PRIMARY KEY, title TEXT);
             CREATE TABLE genre (id INTEGER PRIMARY KEY, name TEXT);
             CREATE INDEX track_album_id ON track(album_id);
             ANALYZE;
             DELETE FROM sqlite_stat1;
             INSERT INTO sqlite_stat1(tbl, idx, stat) VALUES ('track', NULL, '10000');
             INSERT INTO sqlite_stat1(tbl, idx, stat) VALUES ('track', 'track_album_id', '10000 5');
             INSERT INTO sqlite_stat1(tbl, idx, stat) VALUES ('album', NULL, '10');",
        )
        .unwrap();
        SqliteCostModel::new(conn, CostModelConfig::default()).unwrap()
    }

    #[test]
    fn unconstrained_table_uses_base_row_count() {
        let model = fixture();
        let table = zql_ast::TableName::from("album");
        let query = CostQuery { table: &table, ordering: None, filter: None, constraint: None };
        let estimate = model.estimate(&query).unwrap();
        assert_eq!(estimate.rows, 10.0);
    }

    #[test]
    fn fan_out_reads_compound_index_stat() {
        let model = fixture();
        let table = zql_ast::TableName::from("track");
        let constraint = Constraint { columns: vec![zql_ast::ColumnName::from("album_id")] };
        let query = CostQuery { table: &table, ordering: None, filter: None, constraint: Some(&constraint) };
        let estimate = model.estimate(&query).unwrap();
        assert_eq!(estimate.fan_out, Some(5.0));
    }

    #[test]
    fn order_by_only_index_scan_does_not_shrink_the_row_estimate() {
        // No filter, no constraint: SQLite picks `track_album_id` purely to
        // satisfy the ORDER BY, with zero `=` equality predicates. That must
        // not be read as a constrained, selective scan.
        let model = fixture();
        let table = zql_ast::TableName::from("track");
        let ordering = vec![zql_ast::OrderKey { column: zql_ast::ColumnName::from("album_id"), direction: zql_ast::Direction::Asc }];
        let query = CostQuery { table: &table, ordering: Some(&ordering), filter: None, constraint: None };
        let estimate = model.estimate(&query).unwrap();
        assert_eq!(estimate.rows, 10000.0);
    }

    #[test]
    fn unindexed_equality_applies_divisor() {
        let model = fixture();
        let table = zql_ast::TableName::from("track");
        let filter = Condition::Simple(SimplePredicate {
            left: Operand::Column(zql_ast::ColumnName::from("title")),
            op: Operator::Eq,
            right: Operand::Literal(zql_ast::Literal::Text("Big Ones".to_owned())),
        });
        let query = CostQuery { table: &table, ordering: None, filter: Some(&filter), constraint: None };
        let estimate = model.estimate(&query).unwrap();
        assert_eq!(estimate.rows, 10000.0 / 50.0);
    }

    #[test]
    fn missing_stats_reports_unavailable() {
        let model = fixture();
        let table = zql_ast::TableName::from("genre");
        let query = CostQuery { table: &table, ordering: None, filter: None, constraint: None };
        let err = model.estimate(&query).unwrap_err();
        assert!(matches!(err, PlanError::StatsUnavailable { .. }));
    }

    #[test]
    fn unknown_table_returns_sentinel_cost_instead_of_an_error() {
        let model = fixture();
        let table = zql_ast::TableName::from("no_such_table");
        let query = CostQuery { table: &table, ordering: None, filter: None, constraint: None };
        let estimate = model.estimate(&query).unwrap();
        assert_eq!(estimate.rows, CostModelConfig::default().unknown_table_cost);
    }

    #[test]
    fn unique_key_reads_the_declared_primary_key() {
        let model = fixture();
        let table = zql_ast::TableName::from("track");
        let key = model.unique_key(&table).unwrap();
        assert_eq!(key, Some(vec![zql_ast::ColumnName::from("id")]));
    }

    #[test]
    fn unique_key_is_none_for_an_unknown_table() {
        let model = fixture();
        let table = zql_ast::TableName::from("no_such_table");
        assert_eq!(model.unique_key(&table).unwrap(), None);
    }

    #[test]
    fn integer_primary_key_constraint_narrows_to_one_row() {
        let model = fixture();
        let table = zql_ast::TableName::from("album");
        let constraint = Constraint { columns: vec![zql_ast::ColumnName::from("id")] };
        let query = CostQuery { table: &table, ordering: None, filter: None, constraint: Some(&constraint) };
        let estimate = model.estimate(&query).unwrap();
        assert_eq!(estimate.rows, 1.0);
    }

    #[test]
    fn unindexed_filter_equality_is_still_divided_alongside_an_indexed_constraint() {
        let model = fixture();
        let table = zql_ast::TableName::from("track");
        // `album_id` is indexed (fan-out 5 per the fixture); `title` is not.
        // Conflating the two would count `title` as already covered by the
        // index (1 constraint column == 1 filter equality column, by blind
        // count) and skip the divisor, leaving rows at 5.0 instead of
        // (5.0 / 50.0).max(1.0) = 1.0.
        let filter = Condition::Simple(SimplePredicate {
            left: Operand::Column(zql_ast::ColumnName::from("title")),
            op: Operator::Eq,
            right: Operand::Literal(zql_ast::Literal::Text("Big Ones".to_owned())),
        });
        let constraint = Constraint { columns: vec![zql_ast::ColumnName::from("album_id")] };
        let query = CostQuery { table: &table, ordering: None, filter: Some(&filter), constraint: Some(&constraint) };
        let estimate = model.estimate(&query).unwrap();
        assert_eq!(estimate.rows, 1.0);
    }

    #[test]
    fn null_ratio_scales_indexed_row_estimate() {
        let model = fixture();
        let table = zql_ast::TableName::from("track");
        let column = zql_ast::ColumnName::from("album_id");
        model.record_null_ratio(&table, &column, 0.2).unwrap();
        let constraint = Constraint { columns: vec![column] };
        let query = CostQuery { table: &table, ordering: None, filter: None, constraint: Some(&constraint) };
        let estimate = model.estimate(&query).unwrap();
        // under the `album_id` constraint the row estimate is the
        // index's avg-rows-per-distinct-value (5), not the table total.
        assert_eq!(estimate.rows, 5.0 * 0.8);
    }

}
