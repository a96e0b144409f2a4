//! Namespace-definition validation.
//!
//! Validation is deterministic and runs before any state is touched: an
//! invalid definition never partially opens a namespace.

use std::collections::HashSet;

use super::types::{FieldType, IndexKind, NamespaceDef};
use crate::error::{Error, Result};

/// Validates a namespace definition.
pub fn validate(def: &NamespaceDef) -> Result<()> {
    if def.name.trim().is_empty() {
        return Err(Error::params("namespace name must not be empty"));
    }

    let mut seen_fields: HashSet<String> = HashSet::new();
    for field in &def.fields {
        if field.name.trim().is_empty() {
            return Err(Error::params("field name must not be empty"));
        }
        if !seen_fields.insert(field.name.to_lowercase()) {
            return Err(Error::params(format!("duplicate field '{}'", field.name)));
        }
    }

    let mut seen_indexes: HashSet<String> = HashSet::new();
    let mut pk_count = 0;
    for index in &def.indexes {
        if index.name.trim().is_empty() {
            return Err(Error::params("index name must not be empty"));
        }
        if !seen_indexes.insert(index.name.to_lowercase()) {
            return Err(Error::params(format!("duplicate index '{}'", index.name)));
        }
        if index.opts.sparse && index.opts.dense {
            return Err(Error::params(format!(
                "index '{}' cannot be both sparse and dense",
                index.name
            )));
        }

        match index.kind {
            IndexKind::Composite => {
                if index.fields.len() < 2 {
                    return Err(Error::params(format!(
                        "composite index '{}' needs at least two fields",
                        index.name
                    )));
                }
            }
            IndexKind::Joined => {
                if index.fields.len() != 1 {
                    return Err(Error::params(format!(
                        "joined index '{}' must name exactly one attach field",
                        index.name
                    )));
                }
                // The attach field is virtual; skip schema lookup below.
                continue;
            }
            _ => {
                if index.fields.len() != 1 {
                    return Err(Error::params(format!(
                        "index '{}' must cover exactly one field",
                        index.name
                    )));
                }
            }
        }

        for field_name in &index.fields {
            let field = def
                .fields
                .iter()
                .find(|f| f.name.eq_ignore_ascii_case(field_name))
                .ok_or_else(|| {
                    Error::params(format!(
                        "index '{}' references unknown field '{}'",
                        index.name, field_name
                    ))
                })?;
            if index.kind == IndexKind::Fulltext && field.field_type != FieldType::String {
                return Err(Error::params(format!(
                    "fulltext index '{}' requires a string field",
                    index.name
                )));
            }
            if index.kind == IndexKind::Composite && field.array {
                return Err(Error::params(format!(
                    "composite index '{}' cannot include array field '{}'",
                    index.name, field_name
                )));
            }
        }

        if index.opts.pk {
            pk_count += 1;
            if index.opts.sparse {
                return Err(Error::params(format!(
                    "pk index '{}' cannot be sparse",
                    index.name
                )));
            }
            if !index.kind.is_searchable() && index.kind != IndexKind::Composite {
                // A store pk is legal only as part of a composite pk; a bare
                // store index cannot resolve upserts.
                return Err(Error::params(format!(
                    "pk index '{}' must be searchable",
                    index.name
                )));
            }
        }
    }

    if pk_count > 1 {
        return Err(Error::params("at most one pk index per namespace"));
    }

    Ok(())
}

/// Returns true when a reopen with `incoming` is compatible with the already
/// open `current` definition: same fields and same indexes, compared
/// case-insensitively by name and exactly by shape.
pub fn compatible(current: &NamespaceDef, incoming: &NamespaceDef) -> bool {
    if !current.name.eq_ignore_ascii_case(&incoming.name) {
        return false;
    }
    if current.fields.len() != incoming.fields.len()
        || current.indexes.len() != incoming.indexes.len()
    {
        return false;
    }
    for (a, b) in current.fields.iter().zip(incoming.fields.iter()) {
        if !a.name.eq_ignore_ascii_case(&b.name)
            || a.field_type != b.field_type
            || a.array != b.array
            || a.sparse != b.sparse
        {
            return false;
        }
    }
    for (a, b) in current.indexes.iter().zip(incoming.indexes.iter()) {
        if !a.name.eq_ignore_ascii_case(&b.name)
            || a.kind != b.kind
            || a.opts != b.opts
            || a.fields.len() != b.fields.len()
        {
            return false;
        }
        for (fa, fb) in a.fields.iter().zip(b.fields.iter()) {
            if !fa.eq_ignore_ascii_case(fb) {
                return false;
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldDef, IndexDef};

    fn base_def() -> NamespaceDef {
        NamespaceDef::new("items")
            .field(FieldDef::new("id", FieldType::Int))
            .field(FieldDef::new("year", FieldType::Int))
            .index(IndexDef::new("id", IndexKind::Hash).pk())
            .index(IndexDef::new("year", IndexKind::Tree))
    }

    #[test]
    fn test_valid_definition() {
        assert!(validate(&base_def()).is_ok());
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let def = base_def().field(FieldDef::new("ID", FieldType::Int));
        assert!(validate(&def).is_err());
    }

    #[test]
    fn test_two_pk_indexes_rejected() {
        let def = base_def().index(IndexDef::new("year2", IndexKind::Tree).pk());
        let err = validate(&def).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Params);
    }

    #[test]
    fn test_sparse_pk_rejected() {
        let def = NamespaceDef::new("n")
            .field(FieldDef::new("id", FieldType::Int))
            .index(IndexDef::new("id", IndexKind::Hash).pk().sparse());
        assert!(validate(&def).is_err());
    }

    #[test]
    fn test_composite_needs_two_fields() {
        let mut idx = IndexDef::composite(&["id", "year"]);
        idx.fields.truncate(1);
        let def = base_def().index(idx);
        assert!(validate(&def).is_err());
    }

    #[test]
    fn test_index_over_unknown_field_rejected() {
        let def = base_def().index(IndexDef::new("ghost", IndexKind::Tree));
        assert!(validate(&def).is_err());
    }

    #[test]
    fn test_fulltext_requires_string_field() {
        let def = base_def().index(IndexDef::new("year2", IndexKind::Fulltext));
        // "year2" is unknown; use a real int field instead
        let def2 = NamespaceDef::new("n")
            .field(FieldDef::new("year", FieldType::Int))
            .index(IndexDef::new("year", IndexKind::Fulltext));
        assert!(validate(&def).is_err());
        assert!(validate(&def2).is_err());
    }

    #[test]
    fn test_compatible_ignores_name_case() {
        let a = base_def();
        let mut b = base_def();
        b.name = "ITEMS".into();
        b.fields[1].name = "YEAR".into();
        b.indexes[1].name = "YEAR".into();
        b.indexes[1].fields = vec!["YEAR".into()];
        assert!(compatible(&a, &b));
    }

    #[test]
    fn test_incompatible_type_change() {
        let a = base_def();
        let mut b = base_def();
        b.fields[1].field_type = FieldType::String;
        assert!(!compatible(&a, &b));
    }
}
