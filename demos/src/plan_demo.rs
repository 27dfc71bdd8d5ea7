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

//! Plans a small fixture query against a real `SQLite` stats provider and
//! prints which joins the planner chose to flip.

use rusqlite::Connection;

use zql_ast::{Condition, Correlation, Literal, Operand, Operator, Select, SimplePredicate};
use zql_planner::{plan_query, CancellationToken, CostModelConfig, NoopObserver, NoopScalarResolver};
use zql_stats_sqlite::SqliteCostModel;

fn equals(column: &str, value: Literal) -> Condition {
    Condition::Simple(SimplePredicate {
        left: Operand::Column(column.into()),
        op: Operator::Eq,
        right: Operand::Literal(value),
    })
}

/// `track whereExists album (title = 'Big Ones')`: the child is
/// dramatically more selective than the parent, so the planner should
/// flip this join.
fn scenario_single_selective_join() -> Select {
    let album = Select::new("album").with_where(equals("title", Literal::Text("Big Ones".to_owned())));
    let correlation = Correlation::new(vec![("album_id".into(), "id".into())]).expect("non-empty correlation");
    Select::new("track").with_where(Condition::correlated(album, correlation))
}

fn fixture() -> rusqlite::Result<Connection> {
    let conn = Connection::open_in_memory()?;
    conn.execute_batch(
        "CREATE TABLE track (id INTEGER PRIMARY KEY, album_id INTEGER, title TEXT);
         CREATE TABLE album (id INTEGER PRIMARY KEY, title TEXT);
         CREATE INDEX track_album_id ON track(album_id);
         ANALYZE;
         DELETE FROM sqlite_stat1;
         INSERT INTO sqlite_stat1(tbl, idx, stat) VALUES ('track', NULL, '10000');
         INSERT INTO sqlite_stat1(tbl, idx, stat) VALUES ('track', 'track_album_id', '10000 5');
         INSERT INTO sqlite_stat1(tbl, idx, stat) VALUES ('album', NULL, '10');",
    )?;
    Ok(conn)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let conn = fixture()?;
    let cost_model = SqliteCostModel::new(conn, CostModelConfig::default())?;
    let ast = scenario_single_selective_join();

    let mut observer = NoopObserver;
    let planned = plan_query(
        &ast,
        &cost_model,
        &CostModelConfig::default(),
        &NoopScalarResolver,
        &CancellationToken::new(),
        &mut observer,
    );

    match &planned.where_condition {
        Some(Condition::Correlated(inner)) => {
            println!("album join flip = {:?}", inner.flip);
        }
        other => println!("unexpected where-condition: {other:?}"),
    }

    Ok(())
}
