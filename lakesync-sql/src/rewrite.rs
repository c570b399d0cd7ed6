//! Table reference rewriting.

use std::collections::BTreeMap;

use lakesync_core::{is_plain_identifier, QualifiedName};
use sqlparser::ast::{
    Ident, ObjectName, ObjectNamePart, Query, SetExpr, TableAlias, TableFactor, TableWithJoins,
};

use crate::parse::{parse_query_with, SqlDialect};
use crate::relation::{qualified_name, CteScope};

/// Case-insensitive mapping from referenced tables to replacement tables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubstitutionMap {
    entries: BTreeMap<String, QualifiedName>,
}

impl SubstitutionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `from` to `to`, replacing any earlier mapping of the same key.
    pub fn insert(&mut self, from: &QualifiedName, to: QualifiedName) {
        self.entries.insert(from.normalized(), to);
    }

    pub fn with(mut self, from: &QualifiedName, to: QualifiedName) -> Self {
        self.insert(from, to);
        self
    }

    pub fn get(&self, from: &QualifiedName) -> Option<&QualifiedName> {
        self.entries.get(&from.normalized())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries keyed by normalized source name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &QualifiedName)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Rewrite table references in `sql`. Unparsable input comes back unchanged.
pub fn rewrite_tables(sql: &str, map: &SubstitutionMap) -> String {
    rewrite_tables_with(SqlDialect::Generic, sql, map)
}

pub fn rewrite_tables_with(dialect: SqlDialect, sql: &str, map: &SubstitutionMap) -> String {
    if map.is_empty() {
        return sql.to_string();
    }
    match parse_query_with(dialect, sql) {
        Ok(mut query) => {
            let replaced = rewrite_query(&mut query, map);
            tracing::debug!(replaced, "rewrote table references");
            query.to_string()
        }
        Err(e) => {
            tracing::debug!(error = %e, "rewrite skipped, query did not parse");
            sql.to_string()
        }
    }
}

/// Rewrite a parsed query in place, returning the number of references replaced.
///
/// Only base table references in FROM/JOIN position are touched; CTE
/// references shadow tables of the same name. A reference without an alias
/// whose table name changes gets its original name as alias so qualified
/// column references keep resolving.
pub fn rewrite_query(query: &mut Query, map: &SubstitutionMap) -> usize {
    let mut rewriter = Rewriter {
        map,
        scope: CteScope::default(),
        replaced: 0,
    };
    rewriter.query(query);
    rewriter.replaced
}

struct Rewriter<'a> {
    map: &'a SubstitutionMap,
    scope: CteScope,
    replaced: usize,
}

impl Rewriter<'_> {
    fn query(&mut self, query: &mut Query) {
        self.scope.push();
        if let Some(with) = query.with.as_mut() {
            let recursive = with.recursive;
            for cte in with.cte_tables.iter_mut() {
                if recursive {
                    self.scope.define(&cte.alias.name);
                }
                self.query(&mut cte.query);
                if !recursive {
                    self.scope.define(&cte.alias.name);
                }
            }
        }
        self.set_expr(&mut query.body);
        self.scope.pop();
    }

    fn set_expr(&mut self, set_expr: &mut SetExpr) {
        match set_expr {
            SetExpr::Select(select) => {
                for twj in select.from.iter_mut() {
                    self.table_with_joins(twj);
                }
            }
            SetExpr::Query(query) => self.query(query),
            SetExpr::SetOperation { left, right, .. } => {
                self.set_expr(left);
                self.set_expr(right);
            }
            _ => {}
        }
    }

    fn table_with_joins(&mut self, twj: &mut TableWithJoins) {
        self.table_factor(&mut twj.relation);
        for join in twj.joins.iter_mut() {
            self.table_factor(&mut join.relation);
        }
    }

    fn table_factor(&mut self, factor: &mut TableFactor) {
        let map = self.map;
        match factor {
            TableFactor::Table {
                name, alias, args, ..
            } => {
                if args.is_some() || self.scope.resolve(name).is_some() {
                    return;
                }
                let Some(original) = qualified_name(name) else {
                    return;
                };
                let Some(target) = map.get(&original) else {
                    return;
                };
                if alias.is_none() && !target.table.eq_ignore_ascii_case(&original.table) {
                    // keep the reference's own quoting
                    let alias_name = name
                        .0
                        .last()
                        .and_then(ObjectNamePart::as_ident)
                        .cloned()
                        .unwrap_or_else(|| ident(&original.table));
                    *alias = Some(TableAlias {
                        name: alias_name,
                        columns: vec![],
                    });
                }
                *name = object_name(target);
                self.replaced += 1;
            }
            TableFactor::Derived { subquery, .. } => self.query(subquery),
            TableFactor::NestedJoin {
                table_with_joins, ..
            } => self.table_with_joins(table_with_joins),
            _ => {}
        }
    }
}

fn ident(value: &str) -> Ident {
    if is_plain_identifier(value) {
        Ident::new(value)
    } else {
        Ident::with_quote('"', value)
    }
}

fn object_name(name: &QualifiedName) -> ObjectName {
    ObjectName(
        name.parts()
            .into_iter()
            .map(|part| ObjectNamePart::Identifier(ident(part)))
            .collect(),
    )
}
