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

/// Errors raised while constructing an AST node.
///
/// These are the only errors this crate produces: a successfully
/// constructed AST is, by construction, well-formed. Any error here
/// surfaces to the caller as `InvalidAst` (spec: abort, don't degrade).
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AstError {
    #[error("correlation must have at least one parent/child field pair")]
    EmptyCorrelation,

    #[error("simple predicate's left operand must be a column or a literal, got {0}")]
    InvalidPredicateLeftOperand(String),
}

pub type Result<T> = std::result::Result<T, AstError>;
