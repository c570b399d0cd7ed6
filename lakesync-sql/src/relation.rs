//! Closed view of a query's relation structure.
//!
//! The sqlparser tree has dozens of relation kinds. Extraction and rewriting
//! only understand a handful; everything else becomes [`RelationNode::Other`]
//! and is never treated as a cacheable base table.

use lakesync_core::QualifiedName;
use sqlparser::ast::{
    Ident, ObjectName, ObjectNamePart, Query, SetExpr, TableFactor, TableWithJoins,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationNode {
    /// A named table read directly.
    BaseTable(QualifiedName),
    /// A reference to a common table expression in scope.
    CteReference(String),
    Join(Box<RelationNode>, Box<RelationNode>),
    /// A nested query: its CTE bodies followed by its body. Empty when the
    /// query reads no relation at all (`SELECT 1`, `VALUES`).
    Subquery(Vec<RelationNode>),
    /// UNION / INTERSECT / EXCEPT.
    SetOperation(Box<RelationNode>, Box<RelationNode>),
    /// Anything the walk does not model (table functions, PIVOT, `TABLE t`...).
    Other(String),
}

impl RelationNode {
    /// Build the relation tree of a parsed query.
    pub fn from_query(query: &Query) -> Self {
        let mut walker = RelationWalker::default();
        walker.query(query)
    }

    /// Collect every base table in the tree.
    pub fn base_tables(&self, out: &mut Vec<QualifiedName>) {
        match self {
            Self::BaseTable(name) => out.push(name.clone()),
            Self::Join(left, right) | Self::SetOperation(left, right) => {
                left.base_tables(out);
                right.base_tables(out);
            }
            Self::Subquery(children) => {
                for child in children {
                    child.base_tables(out);
                }
            }
            Self::CteReference(_) | Self::Other(_) => {}
        }
    }

    /// Collect descriptions of every unmodelled relation in the tree.
    pub fn others(&self, out: &mut Vec<String>) {
        match self {
            Self::Other(description) => out.push(description.clone()),
            Self::Join(left, right) | Self::SetOperation(left, right) => {
                left.others(out);
                right.others(out);
            }
            Self::Subquery(children) => {
                for child in children {
                    child.others(out);
                }
            }
            Self::BaseTable(_) | Self::CteReference(_) => {}
        }
    }
}

// ============================================================================
// WALK
// ============================================================================

/// Builds [`RelationNode`]s while tracking CTE scope.
///
/// `reached` records the printed name of every `TableFactor::Table` visited,
/// whatever it turned out to be, so callers can tell which relations of the
/// full tree the structural walk never saw.
#[derive(Debug, Default)]
pub(crate) struct RelationWalker {
    pub(crate) scope: CteScope,
    pub(crate) reached: Vec<String>,
}

impl RelationWalker {
    pub(crate) fn query(&mut self, query: &Query) -> RelationNode {
        let mut children = Vec::new();
        self.scope.push();
        if let Some(with) = &query.with {
            for cte in &with.cte_tables {
                if with.recursive {
                    self.scope.define(&cte.alias.name);
                }
                children.push(self.query(&cte.query));
                if !with.recursive {
                    self.scope.define(&cte.alias.name);
                }
            }
        }
        children.push(self.set_expr(&query.body));
        self.scope.pop();
        RelationNode::Subquery(children)
    }

    fn set_expr(&mut self, set_expr: &SetExpr) -> RelationNode {
        match set_expr {
            SetExpr::Select(select) => {
                let mut nodes = select.from.iter().map(|twj| self.table_with_joins(twj));
                match nodes.next() {
                    Some(first) => nodes.fold(first, |acc, next| {
                        RelationNode::Join(Box::new(acc), Box::new(next))
                    }),
                    None => RelationNode::Subquery(Vec::new()),
                }
            }
            SetExpr::Query(query) => self.query(query),
            SetExpr::SetOperation { left, right, .. } => RelationNode::SetOperation(
                Box::new(self.set_expr(left)),
                Box::new(self.set_expr(right)),
            ),
            SetExpr::Values(_) => RelationNode::Subquery(Vec::new()),
            other => RelationNode::Other(other.to_string()),
        }
    }

    fn table_with_joins(&mut self, twj: &TableWithJoins) -> RelationNode {
        let mut node = self.table_factor(&twj.relation);
        for join in &twj.joins {
            let right = self.table_factor(&join.relation);
            node = RelationNode::Join(Box::new(node), Box::new(right));
        }
        node
    }

    fn table_factor(&mut self, factor: &TableFactor) -> RelationNode {
        match factor {
            TableFactor::Table { name, args, .. } => {
                self.reached.push(name.to_string());
                if args.is_some() {
                    return RelationNode::Other(factor.to_string());
                }
                if let Some(cte) = self.scope.resolve(name) {
                    return RelationNode::CteReference(cte);
                }
                match qualified_name(name) {
                    Some(table) => RelationNode::BaseTable(table),
                    None => RelationNode::Other(name.to_string()),
                }
            }
            TableFactor::Derived { subquery, .. } => self.query(subquery),
            TableFactor::NestedJoin {
                table_with_joins, ..
            } => self.table_with_joins(table_with_joins),
            other => RelationNode::Other(other.to_string()),
        }
    }
}

// ============================================================================
// CTE SCOPE
// ============================================================================

/// Stack of CTE names visible at the current point of the walk.
#[derive(Debug, Default)]
pub(crate) struct CteScope {
    frames: Vec<Vec<String>>,
}

impl CteScope {
    pub(crate) fn push(&mut self) {
        self.frames.push(Vec::new());
    }

    pub(crate) fn pop(&mut self) {
        self.frames.pop();
    }

    pub(crate) fn define(&mut self, name: &Ident) {
        if let Some(frame) = self.frames.last_mut() {
            frame.push(name.value.clone());
        }
    }

    /// The CTE a single-part relation name refers to, if any.
    pub(crate) fn resolve(&self, name: &ObjectName) -> Option<String> {
        let parts = object_name_parts(name);
        let [single] = parts.as_slice() else {
            return None;
        };
        self.frames
            .iter()
            .rev()
            .flatten()
            .find(|cte| cte.eq_ignore_ascii_case(single))
            .cloned()
    }
}

// ============================================================================
// NAME CONVERSION
// ============================================================================

/// Unquoted identifier values of an object name.
pub(crate) fn object_name_parts(name: &ObjectName) -> Vec<String> {
    name.0
        .iter()
        .map(|part| match part {
            ObjectNamePart::Identifier(ident) => ident.value.clone(),
        })
        .collect()
}

pub(crate) fn qualified_name(name: &ObjectName) -> Option<QualifiedName> {
    QualifiedName::from_parts(&object_name_parts(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_query;

    fn tree(sql: &str) -> RelationNode {
        RelationNode::from_query(&parse_query(sql).unwrap())
    }

    fn bases(sql: &str) -> Vec<String> {
        let mut out = Vec::new();
        tree(sql).base_tables(&mut out);
        out.into_iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_single_table() {
        assert_eq!(
            tree("SELECT * FROM orders"),
            RelationNode::Subquery(vec![RelationNode::BaseTable(QualifiedName::bare("orders"))])
        );
    }

    #[test]
    fn test_join_is_left_deep() {
        let node = tree("SELECT * FROM a JOIN b ON a.id = b.id JOIN c ON b.id = c.id");
        let RelationNode::Subquery(children) = node else {
            panic!("expected subquery");
        };
        match &children[0] {
            RelationNode::Join(left, right) => {
                assert!(matches!(**left, RelationNode::Join(_, _)));
                assert_eq!(**right, RelationNode::BaseTable(QualifiedName::bare("c")));
            }
            other => panic!("unexpected node {other:?}"),
        }
    }

    #[test]
    fn test_comma_join_folds() {
        assert_eq!(bases("SELECT * FROM a, b"), vec!["a", "b"]);
    }

    #[test]
    fn test_qualified_parts_preserved() {
        assert_eq!(bases("SELECT * FROM db.public.orders"), vec!["db.public.orders"]);
        assert_eq!(bases("SELECT * FROM \"My Table\""), vec!["My Table"]);
    }

    #[test]
    fn test_cte_reference_not_base_table() {
        let sql = "WITH recent AS (SELECT * FROM orders) SELECT * FROM recent";
        assert_eq!(bases(sql), vec!["orders"]);
    }

    #[test]
    fn test_cte_scope_ends_with_query() {
        let sql = "SELECT * FROM (WITH x AS (SELECT 1) SELECT * FROM x) d JOIN x ON true";
        assert_eq!(bases(sql), vec!["x"]);
    }

    #[test]
    fn test_table_function_is_other() {
        let mut others = Vec::new();
        tree("SELECT * FROM read_parquet('f.parquet')").others(&mut others);
        assert_eq!(others.len(), 1);
    }

    #[test]
    fn test_values_and_selectless_have_no_relations() {
        assert!(bases("SELECT 1").is_empty());
        assert!(bases("VALUES (1), (2)").is_empty());
    }

    #[test]
    fn test_set_operation() {
        let node = tree("SELECT id FROM a UNION ALL SELECT id FROM b");
        let RelationNode::Subquery(children) = node else {
            panic!("expected subquery");
        };
        assert!(matches!(children[0], RelationNode::SetOperation(_, _)));
    }
}
