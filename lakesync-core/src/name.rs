//! Qualified table names

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ValidationError;

/// A table reference with optional catalog and schema parts.
///
/// Parts are stored exactly as written. Comparison against cache names and
/// substitution keys goes through [`QualifiedName::normalized`], which is
/// case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QualifiedName {
    pub catalog: Option<String>,
    pub schema: Option<String>,
    pub table: String,
}

impl QualifiedName {
    /// A bare, unqualified table name.
    pub fn bare(table: impl Into<String>) -> Self {
        Self {
            catalog: None,
            schema: None,
            table: table.into(),
        }
    }

    /// A fully qualified catalog.schema.table name.
    pub fn three_part(
        catalog: impl Into<String>,
        schema: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            catalog: Some(catalog.into()),
            schema: Some(schema.into()),
            table: table.into(),
        }
    }

    /// Build a name from one to three parts, last part being the table.
    pub fn from_parts<S: AsRef<str>>(parts: &[S]) -> Option<Self> {
        match parts {
            [table] => Some(Self::bare(table.as_ref())),
            [schema, table] => Some(Self {
                catalog: None,
                schema: Some(schema.as_ref().to_string()),
                table: table.as_ref().to_string(),
            }),
            [catalog, schema, table] => Some(Self::three_part(
                catalog.as_ref(),
                schema.as_ref(),
                table.as_ref(),
            )),
            _ => None,
        }
    }

    /// Parse a dotted name such as `db.public.orders`.
    ///
    /// Only plain dotted names are accepted; quoted identifiers containing
    /// dots must be built with [`QualifiedName::from_parts`].
    pub fn parse(text: &str) -> Result<Self, ValidationError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "table name".to_string(),
            });
        }
        let parts: Vec<&str> = trimmed.split('.').map(str::trim).collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(ValidationError::InvalidValue {
                field: "table name".to_string(),
                reason: format!("'{}' has an empty name part", trimmed),
            });
        }
        Self::from_parts(&parts).ok_or_else(|| ValidationError::InvalidValue {
            field: "table name".to_string(),
            reason: format!("'{}' has more than three parts", trimmed),
        })
    }

    /// Present parts in order, catalog first.
    pub fn parts(&self) -> Vec<&str> {
        let mut parts = Vec::with_capacity(3);
        if let Some(catalog) = &self.catalog {
            parts.push(catalog.as_str());
        }
        if let Some(schema) = &self.schema {
            parts.push(schema.as_str());
        }
        parts.push(self.table.as_str());
        parts
    }

    /// Uppercased dotted form used as a case-insensitive lookup key.
    pub fn normalized(&self) -> String {
        self.to_string().to_uppercase()
    }

    pub fn is_bare(&self) -> bool {
        self.catalog.is_none() && self.schema.is_none()
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.parts().join("."))
    }
}

/// True if `name` can be written unquoted: ASCII letter or underscore first,
/// then letters, digits or underscores.
pub fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
