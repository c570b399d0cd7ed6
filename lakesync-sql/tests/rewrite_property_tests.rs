//! Property-Based Tests for table extraction and rewriting
//!
//! Property: for any query Q and substitution map S over tables present in Q,
//! ExtractTables(Rewrite(Q, S)) == {S[t] | t in E, t in S} ∪ {t | t in E, t not in S}
//! where E = ExtractTables(Q). Literals and predicates survive unchanged.

use lakesync_core::QualifiedName;
use lakesync_sql::{extract_tables, rewrite_tables, SubstitutionMap};
use proptest::prelude::*;
use std::collections::BTreeSet;

// ============================================================================
// GENERATORS
// ============================================================================

/// Table names that can never collide with SQL keywords.
fn arb_table() -> impl Strategy<Value = String> {
    "t_[a-z0-9]{1,6}"
}

#[derive(Debug, Clone, Copy)]
enum Combine {
    Join,
    Comma,
    Union,
}

fn arb_combine() -> impl Strategy<Value = Combine> {
    prop_oneof![Just(Combine::Join), Just(Combine::Comma), Just(Combine::Union)]
}

/// One relation: the table itself or a filtered derived table over it.
fn relation(table: &str, derived: bool, idx: usize) -> String {
    if derived {
        format!("(SELECT * FROM {table} WHERE note = 'FROM {table}') AS d{idx}")
    } else {
        table.to_string()
    }
}

/// A query over `tables`, shaped by the per-table flags.
fn build_query(tables: &[String], derived: &[bool], combines: &[Combine]) -> String {
    let mut sql = format!(
        "SELECT * FROM {} WHERE total > 100",
        relation(&tables[0], derived[0], 0)
    );
    for (i, table) in tables.iter().enumerate().skip(1) {
        let rel = relation(table, derived[i], i);
        sql = match combines[i - 1] {
            Combine::Join => format!("SELECT * FROM ({sql}) AS q{i} JOIN {rel} ON true"),
            Combine::Comma => format!("SELECT * FROM ({sql}) AS q{i}, {rel}"),
            Combine::Union => format!("{sql} UNION ALL SELECT * FROM {rel}"),
        };
    }
    sql
}

fn arb_query_and_map() -> impl Strategy<Value = (String, Vec<String>, Vec<bool>)> {
    prop::collection::btree_set(arb_table(), 1..5)
        .prop_flat_map(|set| {
            let tables: Vec<String> = set.into_iter().collect();
            let n = tables.len();
            (
                Just(tables),
                prop::collection::vec(any::<bool>(), n),
                prop::collection::vec(arb_combine(), n),
                prop::collection::vec(any::<bool>(), n),
            )
        })
        .prop_map(|(tables, derived, combines, mapped)| {
            let sql = build_query(&tables, &derived, &combines);
            (sql, tables, mapped)
        })
}

fn target(table: &str) -> QualifiedName {
    QualifiedName::three_part("lakesync", "src", format!("{table}_cache"))
}

// ============================================================================
// PROPERTIES
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_rewrite_preserves_structure((sql, tables, mapped) in arb_query_and_map()) {
        let before = extract_tables(&sql);
        prop_assert!(before.is_fully_structured());
        let expected_before: BTreeSet<QualifiedName> =
            tables.iter().map(QualifiedName::bare).collect();
        prop_assert_eq!(&before.tables, &expected_before);

        let mut map = SubstitutionMap::new();
        for (table, is_mapped) in tables.iter().zip(&mapped) {
            if *is_mapped {
                map.insert(&QualifiedName::bare(table), target(table));
            }
        }

        let rewritten = rewrite_tables(&sql, &map);
        let after = extract_tables(&rewritten);
        prop_assert!(after.is_fully_structured());

        let expected: BTreeSet<QualifiedName> = before
            .tables
            .iter()
            .map(|t| map.get(t).cloned().unwrap_or_else(|| t.clone()))
            .collect();
        prop_assert_eq!(after.tables, expected);

        // literals and predicates are untouched
        for table in &tables {
            let literal = format!("'FROM {table}'");
            prop_assert_eq!(sql.matches(&literal).count(), rewritten.matches(&literal).count());
        }
        prop_assert!(rewritten.contains("total > 100"));
    }

    #[test]
    fn prop_empty_map_is_identity((sql, _tables, _mapped) in arb_query_and_map()) {
        prop_assert_eq!(rewrite_tables(&sql, &SubstitutionMap::new()), sql);
    }

    #[test]
    fn prop_rewrite_is_idempotent((sql, tables, _mapped) in arb_query_and_map()) {
        let mut map = SubstitutionMap::new();
        for table in &tables {
            map.insert(&QualifiedName::bare(table), target(table));
        }
        let once = rewrite_tables(&sql, &map);
        prop_assert_eq!(rewrite_tables(&once, &map), once.clone());
    }
}
