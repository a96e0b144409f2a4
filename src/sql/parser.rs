//! SQL parser: token stream → query IR.

use super::lexer::{tokenize, Token};
use crate::error::{Error, Result};
use crate::query::{CondOp, Condition, PredicateNode, Query, SortSpec};
use crate::value::Value;

/// A parsed statement.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlStatement {
    /// `SELECT ... FROM ns ...`
    Select(Query),
    /// `DELETE FROM ns [WHERE ...]`
    Delete(Query),
}

/// Parses one SQL statement.
pub fn parse(text: &str) -> Result<SqlStatement> {
    let tokens = tokenize(text)?;
    let mut parser = Parser { tokens, pos: 0 };
    let statement = parser.statement()?;
    parser.expect_eof()?;
    Ok(statement)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::Eof)
    }

    fn next(&mut self) -> Token {
        let token = self.peek().clone();
        self.pos += 1;
        token
    }

    fn eat_kw(&mut self, kw: &str) -> bool {
        if self.peek().is_kw(kw) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_kw(&mut self, kw: &str) -> Result<()> {
        if self.eat_kw(kw) {
            Ok(())
        } else {
            Err(Error::sql(format!("expected {kw}, got {:?}", self.peek())))
        }
    }

    fn expect(&mut self, token: &Token) -> Result<()> {
        if self.peek() == token {
            self.pos += 1;
            Ok(())
        } else {
            Err(Error::sql(format!(
                "expected {token:?}, got {:?}",
                self.peek()
            )))
        }
    }

    fn expect_eof(&mut self) -> Result<()> {
        match self.peek() {
            Token::Eof => Ok(()),
            other => Err(Error::sql(format!("trailing input: {other:?}"))),
        }
    }

    fn statement(&mut self) -> Result<SqlStatement> {
        if self.eat_kw("SELECT") {
            self.select().map(SqlStatement::Select)
        } else if self.eat_kw("DELETE") {
            self.delete().map(SqlStatement::Delete)
        } else {
            Err(Error::sql(format!(
                "expected SELECT or DELETE, got {:?}",
                self.peek()
            )))
        }
    }

    fn select(&mut self) -> Result<Query> {
        let (select_fields, req_total) = self.select_list()?;

        self.expect_kw("FROM")?;
        let namespace = self.identifier("namespace")?;
        let mut query = Query::new(namespace);
        query.select_fields = select_fields;
        query.req_total = req_total;

        if self.eat_kw("WHERE") {
            query.root = Some(self.or_expr()?);
        }
        if self.eat_kw("ORDER") {
            self.expect_kw("BY")?;
            query.sort = self.sort_list()?;
        }
        if self.eat_kw("LIMIT") {
            query.limit = Some(self.unsigned("LIMIT")?);
        }
        if self.eat_kw("OFFSET") {
            query.offset = self.unsigned("OFFSET")?;
        }
        Ok(query)
    }

    fn delete(&mut self) -> Result<Query> {
        self.expect_kw("FROM")?;
        let namespace = self.identifier("namespace")?;
        let mut query = Query::new(namespace);
        if self.eat_kw("WHERE") {
            query.root = Some(self.or_expr()?);
        }
        Ok(query)
    }

    /// Select list: `*`, `COUNT(*)`, or column names. Returns the projected
    /// columns and whether `COUNT(*)` asked for the total.
    fn select_list(&mut self) -> Result<(Vec<String>, bool)> {
        let mut fields = Vec::new();
        let mut req_total = false;
        loop {
            match self.peek().clone() {
                Token::Star => {
                    self.pos += 1;
                    fields.clear();
                }
                Token::Ident(name) if name.eq_ignore_ascii_case("count") => {
                    self.pos += 1;
                    self.expect(&Token::LParen)?;
                    self.expect(&Token::Star)?;
                    self.expect(&Token::RParen)?;
                    req_total = true;
                }
                Token::Ident(name) => {
                    self.pos += 1;
                    fields.push(name);
                }
                Token::Str(name) => {
                    self.pos += 1;
                    fields.push(name);
                }
                other => return Err(Error::sql(format!("bad select list entry: {other:?}"))),
            }
            if !matches!(self.peek(), Token::Comma) {
                break;
            }
            self.pos += 1;
        }
        Ok((fields, req_total))
    }

    fn sort_list(&mut self) -> Result<Vec<SortSpec>> {
        let mut out = Vec::new();
        loop {
            let field = self.identifier("sort field")?;
            let desc = if self.eat_kw("DESC") {
                true
            } else {
                self.eat_kw("ASC");
                false
            };
            out.push(SortSpec { field, desc });
            if !matches!(self.peek(), Token::Comma) {
                break;
            }
            self.pos += 1;
        }
        Ok(out)
    }

    fn or_expr(&mut self) -> Result<PredicateNode> {
        let mut children = vec![self.and_expr()?];
        while self.eat_kw("OR") {
            children.push(self.and_expr()?);
        }
        Ok(if children.len() == 1 {
            children.remove(0)
        } else {
            PredicateNode::Or(children)
        })
    }

    fn and_expr(&mut self) -> Result<PredicateNode> {
        let mut children = vec![self.unary()?];
        while self.eat_kw("AND") {
            children.push(self.unary()?);
        }
        Ok(if children.len() == 1 {
            children.remove(0)
        } else {
            PredicateNode::And(children)
        })
    }

    fn unary(&mut self) -> Result<PredicateNode> {
        if self.eat_kw("NOT") {
            return Ok(PredicateNode::Not(Box::new(self.unary()?)));
        }
        if matches!(self.peek(), Token::LParen) {
            self.pos += 1;
            let inner = self.or_expr()?;
            self.expect(&Token::RParen)?;
            return Ok(inner);
        }
        self.condition().map(PredicateNode::Cond)
    }

    fn condition(&mut self) -> Result<Condition> {
        let field = self.identifier("field")?;
        match self.next() {
            Token::Eq => Ok(Condition::new(field, CondOp::Eq, vec![self.value()?])),
            Token::Lt => Ok(Condition::new(field, CondOp::Lt, vec![self.value()?])),
            Token::Le => Ok(Condition::new(field, CondOp::Le, vec![self.value()?])),
            Token::Gt => Ok(Condition::new(field, CondOp::Gt, vec![self.value()?])),
            Token::Ge => Ok(Condition::new(field, CondOp::Ge, vec![self.value()?])),
            Token::Ident(kw) if kw.eq_ignore_ascii_case("IN") => {
                self.expect(&Token::LParen)?;
                let mut values = vec![self.value()?];
                while matches!(self.peek(), Token::Comma) {
                    self.pos += 1;
                    values.push(self.value()?);
                }
                self.expect(&Token::RParen)?;
                Ok(Condition::new(field, CondOp::Set, values))
            }
            Token::Ident(kw) if kw.eq_ignore_ascii_case("RANGE") => {
                self.expect(&Token::LParen)?;
                let lo = self.value()?;
                self.expect(&Token::Comma)?;
                let hi = self.value()?;
                self.expect(&Token::RParen)?;
                Ok(Condition::new(field, CondOp::Range, vec![lo, hi]))
            }
            other => Err(Error::sql(format!(
                "expected an operator after '{field}', got {other:?}"
            ))),
        }
    }

    /// A field position accepts bare identifiers and single-quoted
    /// identifiers (case preserved for dotted access).
    fn identifier(&mut self, what: &str) -> Result<String> {
        match self.next() {
            Token::Ident(name) | Token::Str(name) => Ok(name),
            other => Err(Error::sql(format!("expected {what}, got {other:?}"))),
        }
    }

    fn value(&mut self) -> Result<Value> {
        match self.next() {
            Token::Int(i) => Ok(if i >= i64::from(i32::MIN) && i <= i64::from(i32::MAX) {
                Value::Int(i as i32)
            } else {
                Value::Int64(i)
            }),
            Token::Float(f) => Ok(Value::Double(f)),
            Token::Str(s) => Ok(Value::String(s)),
            Token::Ident(word) if word.eq_ignore_ascii_case("true") => Ok(Value::Bool(true)),
            Token::Ident(word) if word.eq_ignore_ascii_case("false") => Ok(Value::Bool(false)),
            Token::Ident(word) if word.eq_ignore_ascii_case("null") => Ok(Value::Null),
            other => Err(Error::sql(format!("expected a literal, got {other:?}"))),
        }
    }

    fn unsigned(&mut self, what: &str) -> Result<usize> {
        match self.next() {
            Token::Int(i) if i >= 0 => Ok(i as usize),
            other => Err(Error::sql(format!(
                "{what} expects a non-negative integer, got {other:?}"
            ))),
        }
    }
}
