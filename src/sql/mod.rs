//! SQL front-end.
//!
//! A deliberately small subset:
//!
//! ```sql
//! SELECT <cols|*|COUNT(*)> FROM ns
//!     [WHERE <expr>] [ORDER BY f [ASC|DESC], ...] [LIMIT n] [OFFSET n]
//! DELETE FROM ns [WHERE <expr>]
//! ```
//!
//! `<expr>` supports `=`, `<`, `<=`, `>`, `>=`, `IN (…)`, `RANGE (lo, hi)`,
//! `AND`, `OR`, `NOT` and parentheses. Keywords and identifiers are
//! case-insensitive; single-quoted identifiers preserve case for dotted
//! field access (`'actor.name'`). `COUNT(*)` in the select list requests the
//! total matched count. Anything outside the subset is `ErrSQL`.
//!
//! The parser's output is the same query IR the builder and DSL emit.

mod lexer;
mod parser;

pub use lexer::{tokenize, Token};
pub use parser::{parse, SqlStatement};
