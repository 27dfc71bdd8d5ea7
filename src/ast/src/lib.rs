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

//! The ZQL query AST: an immutable tree of selects, filters, orderings,
//! correlated sub-selects, and related sub-selections.
//!
//! The tree is the planner's sole input and output. Nothing in this crate
//! knows about storage, statistics, or costs; see `zql_planner` for that.

mod condition;
mod error;
mod hash;
mod select;

pub use condition::{
    Condition, Correlation, CorrelatedSubSelect, Operand, Operator, ScalarCompare, SimplePredicate,
};
pub use error::AstError;
pub use hash::stable_hash;
pub use select::{Cursor, Direction, OrderKey, Ordering, RelatedSelection, Select};

pub use zql_common::{ColumnName, Literal, TableName};
