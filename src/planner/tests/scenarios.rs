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

//! Scenario tests seeded directly from the planner's own validation
//! corpus: selective-child flips, mixed-selectivity siblings, OR-branch
//! suppression, empty results, scalar sub-select resolution, and the
//! greedy fallback's bound.

use std::collections::{HashMap, HashSet};

use pretty_assertions::assert_eq;

use zql_ast::{Condition, Correlation, Literal, Operand, Operator, Select, SimplePredicate};
use zql_planner::{
    plan_query, CancellationToken, CostEstimate, CostModel, CostModelConfig, CostQuery, NoopScalarResolver,
    PlanError, PlanResult, RecordingObserver, ScalarResolver,
};

/// `(rows, fan_out)` for a table queried under a specific constraint.
type ConstrainedEstimate = (f64, Option<f64>);

/// A cost model scripted per table: one baseline estimate, plus overrides
/// keyed by the exact set of inbound-constraint columns (as would come
/// from an index covering exactly those columns).
#[derive(Default)]
struct ScriptedCostModel {
    base: HashMap<&'static str, f64>,
    constrained: HashMap<(&'static str, Vec<&'static str>), ConstrainedEstimate>,
    /// Per-table unique key override. Absent entries fall back to `["id"]`,
    /// the convention every other fixture in this file follows.
    unique_keys: HashMap<&'static str, Option<Vec<&'static str>>>,
    /// Tables that report `PlanError::StatsUnavailable` for every query,
    /// regardless of constraint, standing in for a table `ANALYZE` never
    /// ran against.
    unavailable: HashSet<&'static str>,
}

impl ScriptedCostModel {
    fn with_base(mut self, table: &'static str, rows: f64) -> Self {
        self.base.insert(table, rows);
        self
    }

    fn with_constrained(mut self, table: &'static str, columns: Vec<&'static str>, rows: f64, fan_out: f64) -> Self {
        self.constrained.insert((table, columns), (rows, Some(fan_out)));
        self
    }

    fn with_unique_key(mut self, table: &'static str, key: Option<Vec<&'static str>>) -> Self {
        self.unique_keys.insert(table, key);
        self
    }

    fn with_stats_unavailable(mut self, table: &'static str) -> Self {
        self.unavailable.insert(table);
        self
    }
}

impl CostModel for ScriptedCostModel {
    fn estimate(&self, query: &CostQuery<'_>) -> PlanResult<CostEstimate> {
        let table = query.table.as_str();
        if self.unavailable.contains(table) {
            return Err(PlanError::StatsUnavailable { table: table.to_owned() });
        }
        if let Some(constraint) = query.constraint {
            let columns: Vec<&str> = constraint.columns.iter().map(|c| c.as_str()).collect();
            if let Some(&(rows, fan_out)) = self.constrained.get(&(table, columns.clone())) {
                return Ok(CostEstimate::new(rows, 0.0, fan_out));
            }
        }
        let rows = self.base.get(table).copied().unwrap_or(1.0);
        Ok(CostEstimate::new(rows, 0.0, None))
    }

    fn unique_key(&self, table: &zql_ast::TableName) -> PlanResult<Option<Vec<zql_ast::ColumnName>>> {
        match self.unique_keys.get(table.as_str()) {
            Some(key) => Ok(key.as_ref().map(|cols| cols.iter().map(|&c| c.into()).collect())),
            None => Ok(Some(vec!["id".into()])),
        }
    }
}

fn equals(column: &str, value: Literal) -> Condition {
    Condition::Simple(SimplePredicate {
        left: Operand::Column(column.into()),
        op: Operator::Eq,
        right: Operand::Literal(value),
    })
}

fn correlated(table: &str, filter: Condition, parent_col: &str, child_col: &str) -> Condition {
    let select = Select::new(table).with_where(filter);
    let correlation = Correlation::new(vec![(parent_col.into(), child_col.into())]).unwrap();
    Condition::correlated(select, correlation)
}

fn flip_of(select: &Select) -> Vec<Option<bool>> {
    fn walk(cond: &Condition, out: &mut Vec<Option<bool>>) {
        match cond {
            Condition::And(items) | Condition::Or(items) => items.iter().for_each(|c| walk(c, out)),
            Condition::Correlated(inner) => {
                out.push(inner.flip);
                if let Some(c) = &inner.select.where_condition {
                    walk(c, out);
                }
            }
            _ => {}
        }
    }
    let mut out = Vec::new();
    if let Some(c) = &select.where_condition {
        walk(c, &mut out);
    }
    out
}

#[test]
fn s1_single_join_selective_child_is_flipped() {
    let ast = Select::new("track").with_where(correlated(
        "album",
        equals("title", Literal::Text("Big Ones".into())),
        "album_id",
        "id",
    ));

    let cost_model = ScriptedCostModel::default()
        .with_base("track", 10000.0)
        .with_constrained("track", vec!["album_id"], 5.0, 1.0)
        .with_base("album", 1.0);

    let planned = plan_query(
        &ast,
        &cost_model,
        &CostModelConfig::default(),
        &NoopScalarResolver,
        &CancellationToken::new(),
        &mut RecordingObserver::default(),
    );

    assert_eq!(flip_of(&planned), vec![Some(true)]);
}

#[test]
fn s2_parallel_joins_mixed_selectivity_flips_only_the_selective_one() {
    let ast = Select::new("track").with_where(Condition::And(vec![
        correlated("album", equals("title", Literal::Text("Big Ones".into())), "album_id", "id"),
        correlated("genre", equals("name", Literal::Text("Rock".into())), "genre_id", "id"),
    ]));

    let cost_model = ScriptedCostModel::default()
        .with_base("track", 10000.0)
        .with_constrained("track", vec!["album_id"], 5.0, 1.0)
        .with_constrained("track", vec!["genre_id"], 2000.0, 1.0)
        .with_base("album", 1.0)
        .with_constrained("album", vec!["id"], 1.0, 1.0)
        .with_base("genre", 1.0)
        .with_constrained("genre", vec!["id"], 1.0, 1.0);

    let planned = plan_query(
        &ast,
        &cost_model,
        &CostModelConfig::default(),
        &NoopScalarResolver,
        &CancellationToken::new(),
        &mut RecordingObserver::default(),
    );

    assert_eq!(flip_of(&planned), vec![Some(true), None]);
}

#[test]
fn s3_or_branch_suppresses_flippability_even_when_flipping_would_be_cheaper() {
    let ast = Select::new("track").with_where(Condition::Or(vec![
        correlated("album", equals("title", Literal::Text("Big Ones".into())), "album_id", "id"),
        correlated("genre", equals("name", Literal::Text("Rock".into())), "genre_id", "id"),
    ]));

    // Scripted so that flipping either branch would look dramatically
    // cheaper than semi, if it were legal.
    let cost_model = ScriptedCostModel::default()
        .with_base("track", 10000.0)
        .with_constrained("track", vec!["album_id"], 1.0, 1.0)
        .with_constrained("track", vec!["genre_id"], 1.0, 1.0)
        .with_base("album", 1.0)
        .with_base("genre", 1.0);

    let planned = plan_query(
        &ast,
        &cost_model,
        &CostModelConfig::default(),
        &NoopScalarResolver,
        &CancellationToken::new(),
        &mut RecordingObserver::default(),
    );

    assert_eq!(flip_of(&planned), vec![None, None]);
}

#[test]
fn s4_empty_result_keeps_cost_finite_and_respects_baseline_dominance() {
    let artist_cond = correlated(
        "artist",
        equals("name", Literal::Text("NonexistentArtistZZZZ".into())),
        "artist_id",
        "id",
    );
    let album_select = Select::new("album").with_where(artist_cond);
    let album_correlation = Correlation::new(vec![("album_id".into(), "id".into())]).unwrap();
    let ast = Select::new("track").with_where(Condition::correlated(album_select, album_correlation));

    let cost_model = ScriptedCostModel::default()
        .with_base("track", 10000.0)
        .with_constrained("track", vec!["album_id"], 10.0, 1.0)
        .with_base("album", 10.0)
        .with_constrained("album", vec!["id"], 1.0, 1.0)
        .with_constrained("album", vec!["artist_id"], 1.0, 1.0)
        .with_base("artist", 1.0);

    let mut debug = RecordingObserver::default();
    plan_query(
        &ast,
        &cost_model,
        &CostModelConfig::default(),
        &NoopScalarResolver,
        &CancellationToken::new(),
        &mut debug,
    );

    assert!(!debug.attempts.is_empty());
    assert!(debug.attempts.iter().all(|a| a.total_cost.is_finite()));
    let baseline_cost = debug.attempts.iter().find(|a| a.attempt == 0).unwrap().total_cost;
    let best_cost = debug.attempts.iter().map(|a| a.total_cost).fold(f64::INFINITY, f64::min);
    assert!(best_cost <= baseline_cost);
}

struct PointLookupResolver;

impl ScalarResolver for PointLookupResolver {
    fn resolve(&self, select: &Select, column: &zql_ast::ColumnName) -> anyhow::Result<Option<Option<Literal>>> {
        if select.table.as_str() == "users" && column.as_str() == "id" {
            Ok(Some(Some(Literal::Int(42))))
        } else {
            Ok(None)
        }
    }
}

#[test]
fn s5_scalar_subselect_resolves_to_a_literal_and_keeps_the_subselect_for_hydration() {
    let ast = Select::new("issues").with_where(Condition::scalar_compare(
        Operand::Column("owner_id".into()),
        Operator::Eq,
        Select::new("users").with_where(equals("email", Literal::Text("alice@example.com".into()))),
        "id",
    ));

    let cost_model = ScriptedCostModel::default().with_base("issues", 100.0).with_base("users", 1.0);

    let planned = plan_query(
        &ast,
        &cost_model,
        &CostModelConfig::default(),
        &PointLookupResolver,
        &CancellationToken::new(),
        &mut RecordingObserver::default(),
    );

    match planned.where_condition {
        Some(Condition::ScalarCompare(inner)) => {
            assert_eq!(inner.resolved, Some(Literal::Int(42)));
            assert_eq!(inner.select.table.as_str(), "users");
        }
        other => panic!("expected a preserved ScalarCompare, got {other:?}"),
    }
}

#[test]
fn s5_scalar_subselect_with_no_matching_row_becomes_always_false() {
    struct NoRowResolver;
    impl ScalarResolver for NoRowResolver {
        fn resolve(&self, _select: &Select, _column: &zql_ast::ColumnName) -> anyhow::Result<Option<Option<Literal>>> {
            Ok(Some(None))
        }
    }

    let ast = Select::new("issues").with_where(Condition::scalar_compare(
        Operand::Column("owner_id".into()),
        Operator::Eq,
        Select::new("users").with_where(equals("email", Literal::Text("nobody@example.com".into()))),
        "id",
    ));

    let cost_model = ScriptedCostModel::default().with_base("issues", 100.0);

    let planned = plan_query(
        &ast,
        &cost_model,
        &CostModelConfig::default(),
        &NoRowResolver,
        &CancellationToken::new(),
        &mut RecordingObserver::default(),
    );

    assert_eq!(planned.where_condition, Some(Condition::always_false()));
}

#[test]
fn s6_greedy_fallback_bounds_attempts_quadratically_and_beats_baseline() {
    const JOIN_COUNT: usize = 15;

    let branches: Vec<Condition> = (0..JOIN_COUNT)
        .map(|i| {
            let table: &'static str = Box::leak(format!("child_{i}").into_boxed_str());
            correlated(table, equals("value", Literal::Int(i as i64)), "fk", "id")
        })
        .collect();
    let ast = Select::new("root").with_where(Condition::And(branches));

    // Flipping any one join looks uniformly beneficial: constrained
    // lookups are cheap everywhere, so greedy should flip several.
    let mut cost_model = ScriptedCostModel::default().with_base("root", 1000.0);
    for i in 0..JOIN_COUNT {
        let table: &'static str = Box::leak(format!("child_{i}").into_boxed_str());
        cost_model = cost_model.with_base(table, 1000.0).with_constrained(table, vec!["id"], 10.0, 1.0);
    }

    let mut debug = RecordingObserver::default();
    plan_query(
        &ast,
        &cost_model,
        &CostModelConfig::default(),
        &NoopScalarResolver,
        &CancellationToken::new(),
        &mut debug,
    );

    assert!(
        debug.attempts.len() <= JOIN_COUNT * JOIN_COUNT,
        "expected at most J^2 = {} attempts, got {}",
        JOIN_COUNT * JOIN_COUNT,
        debug.attempts.len()
    );
    let baseline_cost = debug.attempts.iter().find(|a| a.attempt == 0).unwrap().total_cost;
    let best_cost = debug.attempts.iter().map(|a| a.total_cost).fold(f64::INFINITY, f64::min);
    assert!(best_cost <= baseline_cost);
}

#[test]
fn s7_flip_stays_semi_when_child_fields_do_not_cover_the_unique_key() {
    // `album` is keyed on `id`, but the correlation only pins down
    // `title`: a match could still span several albums, so flipping
    // would risk duplicating `track` rows. Scripted so flipping would
    // look dramatically cheaper than semi, if it were legal.
    let ast = Select::new("track").with_where(correlated(
        "album",
        equals("artist_id", Literal::Int(7)),
        "title",
        "title",
    ));

    let cost_model = ScriptedCostModel::default()
        .with_base("track", 10000.0)
        .with_constrained("track", vec!["title"], 1.0, 1.0)
        .with_base("album", 1.0);

    let planned = plan_query(
        &ast,
        &cost_model,
        &CostModelConfig::default(),
        &NoopScalarResolver,
        &CancellationToken::new(),
        &mut RecordingObserver::default(),
    );

    assert_eq!(flip_of(&planned), vec![None]);
}

#[test]
fn s8_flip_stays_semi_when_the_cost_model_has_no_unique_key_for_the_child() {
    let ast = Select::new("track").with_where(correlated(
        "album",
        equals("title", Literal::Text("Big Ones".into())),
        "album_id",
        "id",
    ));

    let cost_model = ScriptedCostModel::default()
        .with_base("track", 10000.0)
        .with_constrained("track", vec!["album_id"], 5.0, 1.0)
        .with_base("album", 1.0)
        .with_unique_key("album", None);

    let planned = plan_query(
        &ast,
        &cost_model,
        &CostModelConfig::default(),
        &NoopScalarResolver,
        &CancellationToken::new(),
        &mut RecordingObserver::default(),
    );

    assert_eq!(flip_of(&planned), vec![None]);
}

#[test]
fn s9_stats_unavailable_on_one_join_does_not_poison_a_beneficial_flip_on_another() {
    // `album` never got `ANALYZE`'d; every attempt falls back to the same
    // sentinel cost for it regardless of flip pattern, so it stays semi
    // under the fewest-flips tie-break. `genre` has real stats and a
    // clear flip benefit, and must still be found despite `album`'s
    // failures scattered across the same attempts.
    let ast = Select::new("track").with_where(Condition::And(vec![
        correlated("album", equals("title", Literal::Text("Big Ones".into())), "album_id", "id"),
        correlated("genre", equals("name", Literal::Text("Rock".into())), "genre_id", "id"),
    ]));

    let cost_model = ScriptedCostModel::default()
        .with_base("track", 10000.0)
        .with_constrained("track", vec!["genre_id"], 5.0, 1.0)
        .with_stats_unavailable("album")
        .with_base("genre", 1.0)
        .with_constrained("genre", vec!["id"], 1.0, 1.0);

    let planned = plan_query(
        &ast,
        &cost_model,
        &CostModelConfig::default(),
        &NoopScalarResolver,
        &CancellationToken::new(),
        &mut RecordingObserver::default(),
    );

    assert_eq!(flip_of(&planned), vec![None, Some(true)]);
}

#[test]
fn s10_flipped_joins_cost_contribution_uses_the_parents_fan_out_not_the_childs() {
    // Under a Flipped join, `apply_constraints` binds the correlation's
    // parent-side columns onto the parent connection (spec §4.5 step 3:
    // "flipped joins propagate their child-side constraints upward"), so
    // the parent is the side the cost model actually reports a fan-out
    // for; the child is queried unconstrained and has none. Scripting a
    // fan-out only on the constrained `track` estimate pins the total
    // cost to a value only reachable by reading `parent_estimate.fan_out`.
    let ast = Select::new("track").with_where(correlated(
        "album",
        equals("title", Literal::Text("Big Ones".into())),
        "album_id",
        "id",
    ));

    let cost_model = ScriptedCostModel::default()
        .with_base("track", 10000.0)
        .with_constrained("track", vec!["album_id"], 5.0, 9.0)
        .with_base("album", 1.0)
        .with_constrained("album", vec!["id"], 1.0, 1.0);

    let mut debug = RecordingObserver::default();
    let planned = plan_query(
        &ast,
        &cost_model,
        &CostModelConfig::default(),
        &NoopScalarResolver,
        &CancellationToken::new(),
        &mut debug,
    );

    assert_eq!(flip_of(&planned), vec![Some(true)]);

    let flipped_attempt = debug
        .attempts
        .iter()
        .find(|a| a.join_types.iter().all(|&(_, join_type)| join_type == zql_planner::JoinType::Flipped))
        .expect("a fully-flipped attempt was scored");
    // track.rows(5.0) + album.rows(1.0) + track.rows(5.0) * album.rows(1.0) * track.fan_out(9.0)
    assert_eq!(flipped_attempt.total_cost, 5.0 + 1.0 + 5.0 * 1.0 * 9.0);
}
