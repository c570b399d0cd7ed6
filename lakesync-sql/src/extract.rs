//! Table reference extraction.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::ControlFlow;

use lakesync_core::QualifiedName;
use sqlparser::ast::{visit_relations, Query};

use crate::parse::{parse_query_with, SqlDialect};
use crate::relation::{RelationNode, RelationWalker};

/// Tables a query reads, as far as the structural walk can tell.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    /// Base tables, qualified exactly as written.
    pub tables: BTreeSet<QualifiedName>,
    /// Relations the walk does not model: table functions, tables read from
    /// expression subqueries, and similar.
    pub opaque: Vec<String>,
    /// False when the text could not be parsed as a single query.
    pub parsed: bool,
}

impl Extraction {
    fn unparsed() -> Self {
        Self::default()
    }

    /// Parsed, and every relation is a base table the walk understood.
    ///
    /// Only such queries may be rewritten to read from caches.
    pub fn is_fully_structured(&self) -> bool {
        self.parsed && self.opaque.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Extract tables using the generic dialect. Never fails.
pub fn extract_tables(sql: &str) -> Extraction {
    extract_tables_with(SqlDialect::Generic, sql)
}

pub fn extract_tables_with(dialect: SqlDialect, sql: &str) -> Extraction {
    match parse_query_with(dialect, sql) {
        Ok(query) => extract_from_query(&query),
        Err(e) => {
            tracing::debug!(error = %e, "table extraction skipped, query did not parse");
            Extraction::unparsed()
        }
    }
}

pub(crate) fn extract_from_query(query: &Query) -> Extraction {
    let mut walker = RelationWalker::default();
    let tree = walker.query(query);

    let mut bases = Vec::new();
    tree.base_tables(&mut bases);
    let mut opaque = Vec::new();
    tree.others(&mut opaque);

    // Every relation in the full tree that the structural walk did not reach
    // (e.g. `WHERE id IN (SELECT id FROM t)`) makes the query opaque.
    let mut reached: BTreeMap<String, usize> = BTreeMap::new();
    for name in walker.reached {
        *reached.entry(name).or_default() += 1;
    }
    let _ = visit_relations(query, |relation| {
        let key = relation.to_string();
        match reached.get_mut(&key) {
            Some(count) if *count > 0 => *count -= 1,
            _ => opaque.push(key),
        }
        ControlFlow::<()>::Continue(())
    });

    Extraction {
        tables: bases.into_iter().collect(),
        opaque,
        parsed: true,
    }
}

/// Relation tree of `sql`, or `None` when it does not parse.
pub fn relation_tree(sql: &str) -> Option<RelationNode> {
    parse_query_with(SqlDialect::Generic, sql)
        .ok()
        .map(|query| RelationNode::from_query(&query))
}
