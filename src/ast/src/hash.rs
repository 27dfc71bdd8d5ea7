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

//! A content hash over the AST, stable across process runs (unlike
//! `std`'s `RandomState`-keyed hashers) since it is used to key an
//! externally-persisted pipeline cache (spec §4.1).
//!
//! Plain FNV-1a over a byte stream describing the tree shape: simple,
//! deterministic, and doesn't need a crate of its own.

use zql_common::Literal;

use crate::condition::{Condition, Operand};
use crate::select::{Cursor, Select};

const FNV_OFFSET: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

struct Fnv1a(u64);

impl Fnv1a {
    fn new() -> Self {
        Self(FNV_OFFSET)
    }

    fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 ^= u64::from(b);
            self.0 = self.0.wrapping_mul(FNV_PRIME);
        }
        // length-prefix-free streams of variable-length fields (names,
        // text literals) could collide without a separator.
        self.0 ^= 0xff;
        self.0 = self.0.wrapping_mul(FNV_PRIME);
    }

    fn write_u64(&mut self, v: u64) {
        self.write(&v.to_le_bytes());
    }

    fn finish(self) -> u64 {
        self.0
    }
}

pub fn stable_hash(select: &Select) -> u64 {
    let mut hasher = Fnv1a::new();
    hash_select(select, &mut hasher);
    hasher.finish()
}

fn hash_select(select: &Select, h: &mut Fnv1a) {
    h.write(select.table.as_str().as_bytes());
    match &select.ordering {
        Some(ordering) => {
            h.write_u64(ordering.len() as u64);
            for key in ordering {
                h.write(key.column.as_str().as_bytes());
                h.write_u64(key.direction as u64);
            }
        }
        None => h.write(b"no-order"),
    }
    match &select.cursor {
        Some(cursor) => hash_cursor(cursor, h),
        None => h.write(b"no-cursor"),
    }
    h.write_u64(select.limit.unwrap_or(u64::MAX));
    match &select.where_condition {
        Some(cond) => hash_condition(cond, h),
        None => h.write(b"no-where"),
    }
    h.write_u64(select.related.len() as u64);
    for related in &select.related {
        h.write(related.alias.as_bytes());
        hash_correlation_fields(&related.correlation, h);
        hash_select(&related.select, h);
    }
}

fn hash_cursor(cursor: &Cursor, h: &mut Fnv1a) {
    h.write_u64(cursor.values.len() as u64);
    for v in &cursor.values {
        hash_literal(v, h);
    }
    h.write(&[cursor.inclusive as u8]);
}

fn hash_literal(lit: &Literal, h: &mut Fnv1a) {
    match lit {
        Literal::Null => h.write(b"null"),
        Literal::Bool(b) => h.write(&[*b as u8]),
        Literal::Int(i) => h.write_u64(*i as u64),
        Literal::Float(f) => h.write_u64(f.to_bits()),
        Literal::Text(s) => h.write(s.as_bytes()),
    }
}

fn hash_operand(op: &Operand, h: &mut Fnv1a) {
    match op {
        Operand::Column(c) => {
            h.write(b"col");
            h.write(c.as_str().as_bytes());
        }
        Operand::Literal(l) => {
            h.write(b"lit");
            hash_literal(l, h);
        }
        Operand::Param(p) => {
            h.write(b"param");
            h.write(p.as_bytes());
        }
    }
}

fn hash_correlation_fields(
    correlation: &crate::condition::Correlation,
    h: &mut Fnv1a,
) {
    h.write_u64(correlation.fields().len() as u64);
    for (parent, child) in correlation.fields() {
        h.write(parent.as_str().as_bytes());
        h.write(child.as_str().as_bytes());
    }
}

fn hash_condition(condition: &Condition, h: &mut Fnv1a) {
    match condition {
        Condition::Simple(p) => {
            h.write(b"simple");
            hash_operand(&p.left, h);
            h.write_u64(p.op as u64);
            hash_operand(&p.right, h);
        }
        Condition::And(items) => {
            h.write(b"and");
            h.write_u64(items.len() as u64);
            for c in items {
                hash_condition(c, h);
            }
        }
        Condition::Or(items) => {
            h.write(b"or");
            h.write_u64(items.len() as u64);
            for c in items {
                hash_condition(c, h);
            }
        }
        Condition::Correlated(inner) => {
            h.write(b"correlated");
            hash_correlation_fields(&inner.correlation, h);
            h.write(&[inner.flip.map(|f| f as u8 + 1).unwrap_or(0)]);
            hash_select(&inner.select, h);
        }
        Condition::ScalarCompare(inner) => {
            h.write(b"scalar");
            hash_operand(&inner.left, h);
            h.write_u64(inner.op as u64);
            h.write(inner.select_column.as_str().as_bytes());
            match &inner.resolved {
                Some(lit) => {
                    h.write(b"resolved");
                    hash_literal(lit, h);
                }
                None => h.write(b"unresolved"),
            }
            hash_select(&inner.select, h);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::{Operand, Operator, SimplePredicate};
    use crate::select::Select;

    fn eq(column: &str, value: i64) -> Condition {
        Condition::Simple(
            SimplePredicate::new(Operand::Column(column.into()), Operator::Eq, Operand::Literal(Literal::Int(value)))
                .unwrap(),
        )
    }

    #[test]
    fn same_tree_hashes_equal_across_independent_builds() {
        let a = Select::new("tracks").with_where(eq("album_id", 3));
        let b = Select::new("tracks").with_where(eq("album_id", 3));
        assert_eq!(stable_hash(&a), stable_hash(&b));
    }

    #[test]
    fn differing_literal_changes_the_hash() {
        let a = Select::new("tracks").with_where(eq("album_id", 3));
        let b = Select::new("tracks").with_where(eq("album_id", 4));
        assert_ne!(stable_hash(&a), stable_hash(&b));
    }

    #[test]
    fn differing_table_changes_the_hash() {
        let a = Select::new("tracks").with_where(eq("album_id", 3));
        let b = Select::new("albums").with_where(eq("album_id", 3));
        assert_ne!(stable_hash(&a), stable_hash(&b));
    }

    #[test]
    fn and_is_not_confused_with_or_over_the_same_items() {
        let and = Select::new("tracks").with_where(Condition::And(vec![eq("a", 1), eq("b", 2)]));
        let or = Select::new("tracks").with_where(Condition::Or(vec![eq("a", 1), eq("b", 2)]));
        assert_ne!(stable_hash(&and), stable_hash(&or));
    }

    #[test]
    fn resolved_scalar_compare_hashes_differently_than_unresolved() {
        let base = Select::new("tracks").with_where(Condition::scalar_compare(
            Operand::Column("owner_id".into()),
            Operator::Eq,
            Select::new("users"),
            "id",
        ));
        let Some(Condition::ScalarCompare(mut inner)) = base.where_condition.clone() else {
            panic!("expected ScalarCompare")
        };
        inner.resolved = Some(Literal::Int(7));
        let resolved = Select::new("tracks").with_where(Condition::ScalarCompare(inner));
        assert_ne!(stable_hash(&base), stable_hash(&resolved));
    }
}
