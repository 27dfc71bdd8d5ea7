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

/// Numbers the spec (Design Notes §9) explicitly forbids hard-coding:
/// they're empirical, engine-specific corrections, threaded through as
/// configuration rather than baked into the cost model or the planner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostModelConfig {
    /// Divisor applied per unindexed equality predicate (spec §4.3 step 2).
    /// Default `50.0`, calibrated against one engine's default 25%
    /// unindexed-equality selectivity assumption; a reference stats
    /// provider for a different engine should supply its own.
    pub unindexed_equality_divisor: f64,

    /// Divisor applied to `rows * log2(rows)` when an engine-native sort is
    /// available (spec §4.3 step 3, Design Notes open question 3). Engines
    /// without a native sort should set this to `1.0`.
    pub sort_cost_divisor: f64,

    /// Join count above which the planner switches from exhaustive
    /// enumeration to the greedy single-flip search (spec §4.5 step 2).
    pub exhaustive_join_threshold: usize,

    /// Sentinel row count assigned to a connection when real statistics
    /// aren't available for its table: a genuinely unknown table, inside
    /// the cost model (spec §4.2, "Error": "unknown table returns a
    /// sentinel high cost, not an exception"); or a known table the
    /// stats provider hasn't analyzed yet, inside the planner's
    /// `StatsUnavailable` fallback (spec §7). Large but finite, so it
    /// doesn't collapse every flip pattern's cost to the same value.
    pub unknown_table_cost: f64,
}

impl Default for CostModelConfig {
    fn default() -> Self {
        Self {
            unindexed_equality_divisor: 50.0,
            sort_cost_divisor: 10.0,
            exhaustive_join_threshold: 12,
            unknown_table_cost: 1.0e12,
        }
    }
}
