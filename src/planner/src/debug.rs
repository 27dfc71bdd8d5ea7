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

//! The debug/trace accumulator (spec §4.7): an optional observer fed
//! per-attempt and per-connection events, for validation tooling that
//! correlates estimated costs with actual rows scanned.

use crate::cost_model::CostEstimate;
use crate::graph::{ConnectionId, JoinId, JoinType, PlanSnapshot};

/// One completed enumeration attempt.
#[derive(Debug, Clone)]
pub struct AttemptOutcome {
    pub attempt: usize,
    pub total_cost: f64,
    pub join_types: Vec<(JoinId, JoinType)>,
    pub snapshot: PlanSnapshot,
}

/// One connection's cost evaluation within an attempt.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionEval {
    pub attempt: usize,
    pub connection: ConnectionId,
    pub estimate: CostEstimate,
}

/// Receives planning events. All methods default to no-ops (spec §6,
/// "all optional"); implementations must copy out anything they want to
/// keep, since payloads are not references into the live plan graph.
pub trait DebugObserver {
    fn on_plan_complete(&mut self, _outcome: &AttemptOutcome) {}
    fn on_connection_cost(&mut self, _eval: &ConnectionEval) {}
    fn on_attempt_failed(&mut self, _attempt: usize, _reason: &str) {}
}

/// The default observer: does nothing, costs nothing.
#[derive(Debug, Default)]
pub struct NoopObserver;

impl DebugObserver for NoopObserver {}

/// An in-memory accumulator validation tools can drain (spec §4.7).
#[derive(Debug, Default)]
pub struct RecordingObserver {
    pub attempts: Vec<AttemptOutcome>,
    pub connection_evals: Vec<ConnectionEval>,
    pub failures: Vec<(usize, String)>,
}

impl DebugObserver for RecordingObserver {
    fn on_plan_complete(&mut self, outcome: &AttemptOutcome) {
        self.attempts.push(outcome.clone());
    }

    fn on_connection_cost(&mut self, eval: &ConnectionEval) {
        self.connection_evals.push(*eval);
    }

    fn on_attempt_failed(&mut self, attempt: usize, reason: &str) {
        self.failures.push((attempt, reason.to_owned()));
    }
}
