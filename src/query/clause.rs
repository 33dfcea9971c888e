//! WHERE clause assembly
//!
//! Conditions, glue words and group parentheses are kept as a flat token
//! list. Adjacent conditions are joined with AND unless told otherwise.

use serde_json::Value;

use super::operator::Operator;
use crate::schema::Dialect;
use crate::{Error, Result};

/// One `column <op> <args>` test
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: String,
    pub operator: Operator,
    pub args: Vec<Value>,
}

impl Condition {
    pub fn new(field: impl Into<String>, operator: Operator, args: Vec<Value>) -> Result<Self> {
        operator.check_arity(args.len())?;
        Ok(Self {
            field: field.into(),
            operator,
            args,
        })
    }

    pub fn render(&self, dialect: Dialect) -> Result<String> {
        self.operator.render(&self.field, &self.args, dialect)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Glue {
    And,
    Or,
}

impl Glue {
    fn as_sql(&self) -> &'static str {
        match self {
            Glue::And => " AND ",
            Glue::Or => " OR ",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Condition(Condition),
    Glue(Glue),
    Open,
    Close,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WhereClause {
    tokens: Vec<Token>,
    depth: usize,
}

impl WhereClause {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Open groups not yet closed
    pub fn depth(&self) -> usize {
        self.depth
    }

    fn needs_glue(&self) -> bool {
        matches!(self.tokens.last(), Some(Token::Condition(_)) | Some(Token::Close))
    }

    pub fn push(&mut self, condition: Condition) {
        if self.needs_glue() {
            self.tokens.push(Token::Glue(Glue::And));
        }
        self.tokens.push(Token::Condition(condition));
    }

    /// Join the next condition with `glue`; a second glue replaces the first
    /// and glue with nothing to its left is dropped
    pub fn glue(&mut self, glue: Glue) {
        match self.tokens.last_mut() {
            None | Some(Token::Open) => {}
            Some(Token::Glue(last)) => *last = glue,
            Some(_) => self.tokens.push(Token::Glue(glue)),
        }
    }

    pub fn start_group(&mut self) {
        if self.needs_glue() {
            self.tokens.push(Token::Glue(Glue::And));
        }
        self.tokens.push(Token::Open);
        self.depth += 1;
    }

    pub fn end_group(&mut self) -> Result<()> {
        if self.depth == 0 {
            return Err(Error::UnbalancedGroup);
        }
        if let Some(Token::Glue(_)) = self.tokens.last() {
            self.tokens.pop();
        }
        if let Some(Token::Open) = self.tokens.last() {
            // Empty group: drop it along with the glue that led into it
            self.tokens.pop();
            if let Some(Token::Glue(_)) = self.tokens.last() {
                self.tokens.pop();
            }
        } else {
            self.tokens.push(Token::Close);
        }
        self.depth -= 1;
        Ok(())
    }

    pub fn render(&self, dialect: Dialect) -> Result<String> {
        if self.depth > 0 {
            return Err(Error::UnbalancedGroup);
        }
        let mut sql = String::new();
        for (i, token) in self.tokens.iter().enumerate() {
            match token {
                Token::Condition(condition) => sql.push_str(&condition.render(dialect)?),
                Token::Glue(glue) if i + 1 < self.tokens.len() => sql.push_str(glue.as_sql()),
                Token::Glue(_) => {}
                Token::Open => sql.push('('),
                Token::Close => sql.push(')'),
            }
        }
        Ok(sql)
    }
}
