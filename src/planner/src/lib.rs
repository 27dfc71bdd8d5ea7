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

//! The ZQL query planner: explores flip-pattern assignments over a plan
//! graph derived from an AST, scores each with a pluggable [`CostModel`],
//! and writes the winning plan back onto a cloned AST.

mod apply;
mod config;
mod cost_model;
mod debug;
mod error;
mod graph;
mod planner;

pub use apply::apply_plan;
pub use config::CostModelConfig;
pub use cost_model::{CostEstimate, CostModel, CostQuery, LoggingCostModel, StubCostModel};
pub use debug::{AttemptOutcome, ConnectionEval, DebugObserver, NoopObserver, RecordingObserver};
pub use error::{PlanError, PlanResult};
pub use graph::{Connection, ConnectionId, Constraint, Join, JoinId, JoinType, PlanGraph, PlanSnapshot};
pub use planner::{plan_query, CancellationToken, NoopScalarResolver, ScalarResolver};
