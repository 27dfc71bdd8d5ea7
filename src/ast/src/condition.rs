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

use zql_common::{ColumnName, Literal, TableName};

use crate::error::{AstError, Result};
use crate::select::Select;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Is,
    IsNot,
    Like,
    ILike,
    In,
}

/// One side of a [`SimplePredicate`]. The left side is restricted to
/// [`Operand::Column`] / [`Operand::Literal`] by construction (spec §4.1);
/// [`Operand::Param`] (a static parameter bound outside the query, e.g. the
/// current user id) is legal only on the right.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Column(ColumnName),
    Literal(Literal),
    Param(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimplePredicate {
    pub left: Operand,
    pub op: Operator,
    pub right: Operand,
}

impl SimplePredicate {
    pub fn new(left: Operand, op: Operator, right: Operand) -> Result<Self> {
        match left {
            Operand::Column(_) | Operand::Literal(_) => {}
            Operand::Param(ref name) => {
                return Err(AstError::InvalidPredicateLeftOperand(format!(
                    "param({name})"
                )))
            }
        }
        Ok(Self { left, op, right })
    }
}

/// An ordered list of parent-column / child-column field pairs linking a
/// correlated sub-select (or related sub-selection) to its enclosing
/// select. Never empty (spec §4.1: "constructing an AST with a correlation
/// whose fields are empty... fails with `InvalidAst`").
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Correlation {
    fields: Vec<(ColumnName, ColumnName)>,
}

impl Correlation {
    pub fn new(fields: Vec<(ColumnName, ColumnName)>) -> Result<Self> {
        if fields.is_empty() {
            return Err(AstError::EmptyCorrelation);
        }
        Ok(Self { fields })
    }

    pub fn fields(&self) -> &[(ColumnName, ColumnName)] {
        &self.fields
    }

    pub fn parent_fields(&self) -> impl Iterator<Item = &ColumnName> {
        self.fields.iter().map(|(parent, _)| parent)
    }

    pub fn child_fields(&self) -> impl Iterator<Item = &ColumnName> {
        self.fields.iter().map(|(_, child)| child)
    }

    pub(crate) fn deep_map(&self, column_fn: &impl Fn(&ColumnName) -> ColumnName) -> Correlation {
        Correlation {
            fields: self
                .fields
                .iter()
                .map(|(parent, child)| (column_fn(parent), column_fn(child)))
                .collect(),
        }
    }
}

/// A where-condition, exhaustive over every variant the planner needs to
/// understand (spec §3). `Correlated` carries a private `flip` slot that
/// plan application sets; it is otherwise always `None` on input ASTs.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Simple(SimplePredicate),
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Correlated(Box<CorrelatedSubSelect>),
    /// A scalar sub-select used as a value in a predicate, e.g.
    /// `ownerId = (select id from users where email = 'alice@example.com')`.
    ScalarCompare(Box<ScalarCompare>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CorrelatedSubSelect {
    pub select: Select,
    pub correlation: Correlation,
    pub flip: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScalarCompare {
    pub left: Operand,
    pub op: Operator,
    pub select: Select,
    /// The single column of the sub-select's single row being compared.
    pub select_column: ColumnName,
    /// Set by plan-time resolution when the sub-select is "simple" (its
    /// unique key is fully constrained by literal equalities) and its
    /// point lookup found a row. The sub-select itself is always preserved
    /// for hydration even once resolved (spec §4.5, S5). A lookup that
    /// finds no row is instead rewritten to [`Condition::always_false`].
    pub resolved: Option<Literal>,
}

impl Condition {
    /// A sentinel condition that never matches any row, used by scalar
    /// sub-select resolution (spec §4.5) to replace a predicate whose
    /// sub-select resolved to no rows.
    pub fn always_false() -> Condition {
        Condition::Simple(SimplePredicate {
            left: Operand::Literal(Literal::Int(0)),
            op: Operator::Eq,
            right: Operand::Literal(Literal::Int(1)),
        })
    }

    pub fn correlated(select: Select, correlation: Correlation) -> Condition {
        Condition::Correlated(Box::new(CorrelatedSubSelect {
            select,
            correlation,
            flip: None,
        }))
    }

    pub fn scalar_compare(
        left: Operand,
        op: Operator,
        select: Select,
        select_column: impl Into<ColumnName>,
    ) -> Condition {
        Condition::ScalarCompare(Box::new(ScalarCompare {
            left,
            op,
            select,
            select_column: select_column.into(),
            resolved: None,
        }))
    }

    pub fn deep_map(
        &self,
        table_fn: &impl Fn(&TableName) -> TableName,
        column_fn: &impl Fn(&ColumnName) -> ColumnName,
    ) -> Condition {
        match self {
            Condition::Simple(p) => Condition::Simple(SimplePredicate {
                left: map_operand(&p.left, column_fn),
                op: p.op,
                right: map_operand(&p.right, column_fn),
            }),
            Condition::And(items) => {
                Condition::And(items.iter().map(|c| c.deep_map(table_fn, column_fn)).collect())
            }
            Condition::Or(items) => {
                Condition::Or(items.iter().map(|c| c.deep_map(table_fn, column_fn)).collect())
            }
            Condition::Correlated(inner) => Condition::Correlated(Box::new(CorrelatedSubSelect {
                select: inner.select.deep_map(table_fn, column_fn),
                correlation: inner.correlation.deep_map(column_fn),
                flip: inner.flip,
            })),
            Condition::ScalarCompare(inner) => Condition::ScalarCompare(Box::new(ScalarCompare {
                left: map_operand(&inner.left, column_fn),
                op: inner.op,
                select: inner.select.deep_map(table_fn, column_fn),
                select_column: column_fn(&inner.select_column),
                resolved: inner.resolved.clone(),
            })),
        }
    }
}

fn map_operand(operand: &Operand, column_fn: &impl Fn(&ColumnName) -> ColumnName) -> Operand {
    match operand {
        Operand::Column(c) => Operand::Column(column_fn(c)),
        Operand::Literal(l) => Operand::Literal(l.clone()),
        Operand::Param(p) => Operand::Param(p.clone()),
    }
}
