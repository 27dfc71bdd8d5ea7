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

//! Renders the non-correlated filter a [`zql_planner::CostModel`] query
//! carries into SQL text, so the reference provider can ask `SQLite`'s own
//! query planner about it via `EXPLAIN QUERY PLAN`.
//!
//! This is read-only, diagnostic SQL generation, not a query executor: it
//! exists solely to ask the engine how it *would* run the query.

use zql_ast::{Condition, Operand, Operator};

pub fn render_filter(condition: &Condition) -> String {
    match condition {
        Condition::Simple(p) if p.op == Operator::In => {
            format!("{} IN ({})", render_operand(&p.left), render_operand(&p.right))
        }
        Condition::Simple(p) => format!(
            "{} {} {}",
            render_operand(&p.left),
            render_operator(p.op),
            render_operand(&p.right)
        ),
        Condition::And(items) => render_list(items, "AND"),
        Condition::Or(items) => render_list(items, "OR"),
        // Stripped out of every `CostQuery::filter` by the plan graph
        // before it reaches a cost model; render as a no-op if seen.
        Condition::Correlated(_) => "1=1".to_owned(),
        Condition::ScalarCompare(inner) => match &inner.resolved {
            Some(lit) => format!("{} {} {}", render_operand(&inner.left), render_operator(inner.op), lit.to_sql()),
            None => format!(
                "{} {} (SELECT {} FROM {} {})",
                render_operand(&inner.left),
                render_operator(inner.op),
                inner.select_column.as_str(),
                inner.select.table.as_str(),
                inner
                    .select
                    .where_condition
                    .as_ref()
                    .map(|c| format!("WHERE {}", render_filter(c)))
                    .unwrap_or_default()
            ),
        },
    }
}

fn render_list(items: &[Condition], joiner: &str) -> String {
    if items.is_empty() {
        return "1=1".to_owned();
    }
    let parts: Vec<String> = items.iter().map(|c| format!("({})", render_filter(c))).collect();
    parts.join(&format!(" {joiner} "))
}

fn render_operand(operand: &Operand) -> String {
    match operand {
        Operand::Column(c) => c.as_str().to_owned(),
        Operand::Literal(l) => l.to_sql(),
        // The reference provider has no access to a param's bound value at
        // plan time; NULL keeps the query syntactically valid and lets
        // SQLite still choose an index on the column side of the compare.
        Operand::Param(_) => "NULL".to_owned(),
    }
}

fn render_operator(op: Operator) -> &'static str {
    match op {
        Operator::Eq => "=",
        Operator::Ne => "!=",
        Operator::Lt => "<",
        Operator::Le => "<=",
        Operator::Gt => ">",
        Operator::Ge => ">=",
        Operator::Is => "IS",
        Operator::IsNot => "IS NOT",
        Operator::Like => "LIKE",
        Operator::ILike => "LIKE",
        Operator::In => "IN",
    }
}
