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

use std::hash::{Hash, Hasher};

/// A literal value appearing in a predicate or parameter binding.
///
/// Closed enum rather than a trait object: the planner and the reference
/// stats provider only ever need to render these into SQL text or compare
/// them for equality, and a closed set keeps `deepMap`/stable-hash total.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Eq for Literal {}

impl Hash for Literal {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Literal::Null => {}
            Literal::Bool(b) => b.hash(state),
            Literal::Int(i) => i.hash(state),
            Literal::Float(f) => f.to_bits().hash(state),
            Literal::Text(s) => s.hash(state),
        }
    }
}

impl Literal {
    /// Renders this literal as SQL text suitable for embedding in a
    /// read-only query sent to the reference stats provider's backing
    /// engine. Not a general-purpose SQL escaper: callers that need one
    /// belong outside the planner's scope.
    pub fn to_sql(&self) -> String {
        match self {
            Literal::Null => "NULL".to_owned(),
            Literal::Bool(b) => if *b { "1" } else { "0" }.to_owned(),
            Literal::Int(i) => i.to_string(),
            Literal::Float(f) => f.to_string(),
            Literal::Text(s) => format!("'{}'", s.replace('\'', "''")),
        }
    }
}
