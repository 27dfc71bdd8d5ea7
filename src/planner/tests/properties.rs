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

//! Property tests for the two universally-quantified invariants from the
//! planner's own testable-properties list that a handful of fixed
//! scenarios can't exercise well: determinism and idempotence, over
//! randomly generated ASTs.

use proptest::prelude::*;

use zql_ast::{Condition, Correlation, Literal, Operand, Operator, Select, SimplePredicate};
use zql_planner::{plan_query, CancellationToken, CostModelConfig, NoopObserver, NoopScalarResolver, StubCostModel};

fn arb_literal() -> impl Strategy<Value = Literal> {
    prop_oneof![Just(Literal::Null), any::<bool>().prop_map(Literal::Bool), (0i64..50).prop_map(Literal::Int),]
}

fn arb_simple() -> impl Strategy<Value = Condition> {
    (prop_oneof![Just("a"), Just("b"), Just("c")], arb_literal()).prop_map(|(col, lit)| {
        Condition::Simple(SimplePredicate { left: Operand::Column(col.into()), op: Operator::Eq, right: Operand::Literal(lit) })
    })
}

fn arb_condition(depth: u32) -> BoxedStrategy<Condition> {
    let leaf = arb_simple().boxed();
    if depth == 0 {
        return leaf;
    }
    let correlated = (prop_oneof![Just("album"), Just("genre"), Just("artist")], arb_condition(depth - 1))
        .prop_map(|(table, filter)| {
            let select = Select::new(table).with_where(filter);
            let correlation = Correlation::new(vec![("fk".into(), "id".into())]).unwrap();
            Condition::correlated(select, correlation)
        })
        .boxed();
    prop_oneof![
        3 => leaf,
        2 => correlated,
        1 => prop::collection::vec(arb_condition(depth - 1), 1..3).prop_map(Condition::And),
        1 => prop::collection::vec(arb_condition(depth - 1), 1..3).prop_map(Condition::Or),
    ]
    .boxed()
}

fn arb_select(depth: u32) -> impl Strategy<Value = Select> {
    prop_oneof![Just("track"), Just("issue")].prop_flat_map(move |table| {
        prop::option::of(arb_condition(depth)).prop_map(move |cond| {
            let mut select = Select::new(table);
            if let Some(cond) = cond {
                select = select.with_where(cond);
            }
            select
        })
    })
}

fn plan(select: &Select) -> Select {
    plan_query(
        select,
        &StubCostModel::new(10.0),
        &CostModelConfig::default(),
        &NoopScalarResolver,
        &CancellationToken::new(),
        &mut NoopObserver,
    )
}

proptest! {
    #[test]
    fn planning_is_deterministic(ast in arb_select(3)) {
        let first = plan(&ast);
        let second = plan(&ast);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn planning_is_idempotent(ast in arb_select(3)) {
        let once = plan(&ast);
        let twice = plan(&once);
        prop_assert_eq!(once, twice);
    }
}
