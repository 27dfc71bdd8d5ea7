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

use crate::condition::{Condition, Correlation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OrderKey {
    pub column: ColumnName,
    pub direction: Direction,
}

/// A completed ordering: the earlier passes outside this crate guarantee
/// it already includes a column sequence that uniquely identifies a row.
pub type Ordering = Vec<OrderKey>;

/// A starting point for keyset pagination: the row values to resume after
/// (or at, depending on `inclusive`), one per column of the ordering.
#[derive(Debug, Clone, PartialEq)]
pub struct Cursor {
    pub values: Vec<Literal>,
    pub inclusive: bool,
}

/// A child select attached to a parent row for output shaping. Each one
/// roots an independent plan graph (spec §3, "Sub-plan scope").
#[derive(Debug, Clone, PartialEq)]
pub struct RelatedSelection {
    pub alias: String,
    pub correlation: Correlation,
    pub select: Box<Select>,
}

/// One node of the query AST, rooted at the outermost select.
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub table: TableName,
    pub ordering: Option<Ordering>,
    pub cursor: Option<Cursor>,
    pub limit: Option<u64>,
    pub where_condition: Option<Condition>,
    pub related: Vec<RelatedSelection>,
}

impl Select {
    pub fn new(table: impl Into<TableName>) -> Self {
        Self {
            table: table.into(),
            ordering: None,
            cursor: None,
            limit: None,
            where_condition: None,
            related: Vec::new(),
        }
    }

    pub fn with_where(mut self, condition: Condition) -> Self {
        self.where_condition = Some(condition);
        self
    }

    pub fn with_ordering(mut self, ordering: Ordering) -> Self {
        self.ordering = Some(ordering);
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_related(mut self, related: RelatedSelection) -> Self {
        self.related.push(related);
        self
    }

    /// Rewrites every table and column name through `table_fn`/`column_fn`,
    /// returning a new tree. Used to translate between client and server
    /// naming (spec §4.1, "Deep map"); the original is left untouched.
    pub fn deep_map(
        &self,
        table_fn: &impl Fn(&TableName) -> TableName,
        column_fn: &impl Fn(&ColumnName) -> ColumnName,
    ) -> Select {
        Select {
            table: table_fn(&self.table),
            ordering: self.ordering.as_ref().map(|ordering| {
                ordering
                    .iter()
                    .map(|key| OrderKey {
                        column: column_fn(&key.column),
                        direction: key.direction,
                    })
                    .collect()
            }),
            cursor: self.cursor.clone(),
            limit: self.limit,
            where_condition: self
                .where_condition
                .as_ref()
                .map(|c| c.deep_map(table_fn, column_fn)),
            related: self
                .related
                .iter()
                .map(|r| RelatedSelection {
                    alias: r.alias.clone(),
                    correlation: r.correlation.deep_map(column_fn),
                    select: Box::new(r.select.deep_map(table_fn, column_fn)),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::Correlation;

    #[test]
    fn builder_methods_compose() {
        let select = Select::new("tracks")
            .with_ordering(vec![OrderKey { column: "id".into(), direction: Direction::Asc }])
            .with_limit(50)
            .with_related(RelatedSelection {
                alias: "album".into(),
                correlation: Correlation::new(vec![("album_id".into(), "id".into())]).unwrap(),
                select: Box::new(Select::new("albums")),
            });
        assert_eq!(select.table.as_str(), "tracks");
        assert_eq!(select.limit, Some(50));
        assert_eq!(select.related.len(), 1);
        assert_eq!(select.related[0].alias, "album");
    }

    #[test]
    fn deep_map_rewrites_table_ordering_and_related_but_leaves_original_untouched() {
        let original = Select::new("tracks")
            .with_ordering(vec![OrderKey { column: "id".into(), direction: Direction::Desc }])
            .with_related(RelatedSelection {
                alias: "album".into(),
                correlation: Correlation::new(vec![("album_id".into(), "id".into())]).unwrap(),
                select: Box::new(Select::new("albums")),
            });

        let mapped = original.deep_map(
            &|t| format!("server_{}", t.as_str()).into(),
            &|c| format!("col_{}", c.as_str()).into(),
        );

        assert_eq!(mapped.table.as_str(), "server_tracks");
        assert_eq!(mapped.ordering.unwrap()[0].column.as_str(), "col_id");
        assert_eq!(mapped.related[0].select.table.as_str(), "server_albums");
        assert_eq!(mapped.related[0].correlation.fields()[0].1.as_str(), "col_id");

        // the original tree is untouched by deep_map
        assert_eq!(original.table.as_str(), "tracks");
        assert_eq!(original.related[0].select.table.as_str(), "albums");
    }
}
