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

/// Errors a [`crate::CostModel`] or scalar-sub-select resolver can raise.
///
/// Per spec §7, none of these ever reach `plan_query`'s caller: a
/// `CostModelFailure` scores its attempt as `+inf`; a `StatsUnavailable`
/// falls back to a row-counts-only estimate for just that connection,
/// so the rest of the attempt's cost comparison stays meaningful; a
/// `ScalarSubqueryResolutionFailure` leaves the sub-select in place.
/// `InvalidAst` (construction-time) lives in `zql_ast` and is the only
/// variant that does surface.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("cost model failed for table {table}: {source}")]
    CostModelFailure {
        table: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("no statistics available for table {table}")]
    StatsUnavailable { table: String },

    #[error("scalar sub-select resolution failed: {source}")]
    ScalarSubqueryResolutionFailure {
        #[source]
        source: anyhow::Error,
    },
}

pub type PlanResult<T> = std::result::Result<T, PlanError>;
