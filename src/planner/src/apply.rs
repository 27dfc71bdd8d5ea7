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

//! Plan application (spec §4.6): writes each join's chosen orientation
//! back onto a clone of the AST it was planned from, as a `flip` flag on
//! the corresponding correlated sub-select node.

use std::collections::HashMap;

use zql_ast::{Condition, CorrelatedSubSelect, Select};

use crate::graph::{JoinType, PathStep, PlanGraph};

/// Applies `graph`'s current join-type assignment onto `select`, the
/// exact tree `graph` was built from, returning a new, annotated tree.
///
/// Pure in `(select, graph)`: running it twice with the same inputs
/// yields structurally equal outputs (spec §4.6 invariant).
pub fn apply_plan(select: &Select, graph: &PlanGraph) -> Select {
    let flips: HashMap<&[PathStep], bool> = graph
        .joins()
        .iter()
        .filter(|j| j.join_type == JoinType::Flipped)
        .map(|j| (j.path.as_slice(), true))
        .collect();

    let mut path = Vec::new();
    apply_select(select, &flips, &mut path)
}

fn apply_select(select: &Select, flips: &HashMap<&[PathStep], bool>, path: &mut Vec<PathStep>) -> Select {
    Select {
        table: select.table.clone(),
        ordering: select.ordering.clone(),
        cursor: select.cursor.clone(),
        limit: select.limit,
        where_condition: select
            .where_condition
            .as_ref()
            .map(|c| apply_condition(c, flips, path)),
        related: select.related.clone(),
    }
}

fn apply_condition(
    cond: &Condition,
    flips: &HashMap<&[PathStep], bool>,
    path: &mut Vec<PathStep>,
) -> Condition {
    match cond {
        Condition::Simple(_) | Condition::ScalarCompare(_) => cond.clone(),
        Condition::And(items) => Condition::And(
            items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    path.push(PathStep::And(i));
                    let out = apply_condition(item, flips, path);
                    path.pop();
                    out
                })
                .collect(),
        ),
        Condition::Or(items) => Condition::Or(
            items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    path.push(PathStep::Or(i));
                    let out = apply_condition(item, flips, path);
                    path.pop();
                    out
                })
                .collect(),
        ),
        Condition::Correlated(inner) => {
            let flip = flips.get(path.as_slice()).copied();
            path.push(PathStep::IntoCorrelated);
            let inner_select = apply_select(&inner.select, flips, path);
            path.pop();
            Condition::Correlated(Box::new(CorrelatedSubSelect {
                select: inner_select,
                correlation: inner.correlation.clone(),
                flip,
            }))
        }
    }
}
