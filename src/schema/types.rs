//! Namespace-definition document types.
//!
//! Wire shape:
//!
//! ```json
//! {
//!   "name": "items",
//!   "fields": [
//!     {"name": "id", "type": "int"},
//!     {"name": "year", "type": "int"},
//!     {"name": "packages", "type": "int", "array": true},
//!     {"name": "age_limit", "type": "int64", "sparse": true}
//!   ],
//!   "indexes": [
//!     {"name": "id", "kind": "hash", "fields": ["id"], "opts": {"pk": true}},
//!     {"name": "year", "kind": "tree", "fields": ["year"]},
//!     {"name": "age+genre", "kind": "composite", "fields": ["age", "genre"]}
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};

/// Scalar field types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// 32-bit signed integer.
    Int,
    /// 64-bit signed integer.
    Int64,
    /// 64-bit floating point.
    Double,
    /// Boolean.
    Bool,
    /// UTF-8 string.
    String,
}

impl FieldType {
    /// Returns the type name for error messages.
    pub fn type_name(self) -> &'static str {
        match self {
            FieldType::Int => "int",
            FieldType::Int64 => "int64",
            FieldType::Double => "double",
            FieldType::Bool => "bool",
            FieldType::String => "string",
        }
    }

    /// True for int/int64/double.
    pub fn is_numeric(self) -> bool {
        matches!(self, FieldType::Int | FieldType::Int64 | FieldType::Double)
    }
}

/// A field descriptor.
///
/// Nullability is implied: a field absent from an upserted document is null.
/// Dotted names (`actor.name`) are legal and treated as plain field names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Canonical field name. Matching at the query boundary is
    /// case-insensitive; this spelling is what results render with.
    pub name: String,
    /// Scalar type (element type for arrays).
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Whether the field holds an array of scalars.
    #[serde(default)]
    pub array: bool,
    /// Sparse fields are omitted from their indexes when absent.
    #[serde(default)]
    pub sparse: bool,
}

impl FieldDef {
    /// Creates a scalar field descriptor.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            array: false,
            sparse: false,
        }
    }

    /// Marks the field as an array.
    pub fn array(mut self) -> Self {
        self.array = true;
        self
    }

    /// Marks the field as sparse.
    pub fn sparse(mut self) -> Self {
        self.sparse = true;
        self
    }
}

/// Index kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    /// Unordered, EQ/SET lookups only.
    Hash,
    /// Ordered, supports ranges and ordered iteration.
    Tree,
    /// Not searchable, materialize only. Accepts the `"-"` spelling.
    #[serde(alias = "-")]
    Store,
    /// Substring/prefix match with score.
    Fulltext,
    /// Tuple key over ≥ 2 fields, ordered.
    Composite,
    /// Attach point for join sub-queries; holds no entries.
    Joined,
}

impl IndexKind {
    /// True when the index can answer lookups at all.
    pub fn is_searchable(self) -> bool {
        !matches!(self, IndexKind::Store | IndexKind::Joined)
    }
}

/// Index options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexOpts {
    /// Primary key. At most one per namespace; must be unique and total.
    #[serde(default)]
    pub pk: bool,
    /// Rows lacking the field are omitted from the index but stay in the
    /// store.
    #[serde(default)]
    pub sparse: bool,
    /// Explicit default; dense and sparse are mutually exclusive.
    #[serde(default)]
    pub dense: bool,
}

/// An index descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDef {
    /// Index name. Composite indexes conventionally use the `+`-joined field
    /// list (`age+genre`) and are addressable as a field in every front-end.
    pub name: String,
    /// Index kind.
    pub kind: IndexKind,
    /// Constituent fields; length ≥ 2 for composite.
    pub fields: Vec<String>,
    /// Options.
    #[serde(default)]
    pub opts: IndexOpts,
}

impl IndexDef {
    /// Creates an index over a single field, named after it.
    pub fn new(name: impl Into<String>, kind: IndexKind) -> Self {
        let name = name.into();
        Self {
            name: name.clone(),
            kind,
            fields: vec![name],
            opts: IndexOpts::default(),
        }
    }

    /// Creates a composite index; the name is the `+`-joined field list.
    pub fn composite(fields: &[&str]) -> Self {
        Self {
            name: fields.join("+"),
            kind: IndexKind::Composite,
            fields: fields.iter().map(|f| f.to_string()).collect(),
            opts: IndexOpts::default(),
        }
    }

    /// Marks the index as primary key.
    pub fn pk(mut self) -> Self {
        self.opts.pk = true;
        self
    }

    /// Marks the index as sparse.
    pub fn sparse(mut self) -> Self {
        self.opts.sparse = true;
        self
    }
}

/// The namespace-definition document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceDef {
    /// Namespace name; resolved case-insensitively, rendered canonically.
    pub name: String,
    /// Field descriptors in declaration order.
    pub fields: Vec<FieldDef>,
    /// Index descriptors in declaration order.
    #[serde(default)]
    pub indexes: Vec<IndexDef>,
}

impl NamespaceDef {
    /// Creates an empty definition.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            indexes: Vec::new(),
        }
    }

    /// Adds a field.
    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Adds an index.
    pub fn index(mut self, index: IndexDef) -> Self {
        self.indexes.push(index);
        self
    }

    /// Returns the pk index, if declared.
    pub fn pk_index(&self) -> Option<&IndexDef> {
        self.indexes.iter().find(|i| i.opts.pk)
    }
}
