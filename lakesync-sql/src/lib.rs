//! lakesync SQL - table reference extraction and rewriting
//!
//! Works on the parsed query tree, never on raw text, so string literals and
//! column names that happen to look like table names are left alone.
//!
//! - [`extract_tables`] lists every base table a query reads.
//! - [`rewrite_tables`] redirects table references through a
//!   [`SubstitutionMap`] and prints the query back out.
//!
//! Both degrade instead of failing: an unparsable query extracts to an empty,
//! unparsed [`Extraction`] and rewrites to its original text.

mod extract;
mod parse;
mod relation;
mod rewrite;

pub use extract::{extract_tables, extract_tables_with, relation_tree, Extraction};
pub use parse::{parse_query, parse_query_with, SqlDialect};
pub use relation::RelationNode;
pub use rewrite::{rewrite_query, rewrite_tables, rewrite_tables_with, SubstitutionMap};
