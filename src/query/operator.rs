//! Comparison operators and literal rendering

use std::str::FromStr;

use serde_json::Value;

use crate::schema::Dialect;
use crate::{Error, Result};

/// How many arguments an operator takes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exactly(usize),
    Any,
}

impl Arity {
    pub fn accepts(&self, given: usize) -> bool {
        match self {
            Arity::Exactly(n) => *n == given,
            Arity::Any => true,
        }
    }
}

impl std::fmt::Display for Arity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Arity::Exactly(n) => write!(f, "{}", n),
            Arity::Any => write!(f, "any number"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    Regexp,
    Between,
    In,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::Ne => "ne",
            Operator::Gt => "gt",
            Operator::Gte => "gte",
            Operator::Lt => "lt",
            Operator::Lte => "lte",
            Operator::Like => "like",
            Operator::Regexp => "regexp",
            Operator::Between => "between",
            Operator::In => "in",
        }
    }

    pub fn all() -> &'static [Operator] {
        &[
            Operator::Eq,
            Operator::Ne,
            Operator::Gt,
            Operator::Gte,
            Operator::Lt,
            Operator::Lte,
            Operator::Like,
            Operator::Regexp,
            Operator::Between,
            Operator::In,
        ]
    }

    pub fn arity(&self) -> Arity {
        match self {
            Operator::Between => Arity::Exactly(2),
            Operator::In => Arity::Any,
            _ => Arity::Exactly(1),
        }
    }

    /// Reject argument lists the operator cannot render
    pub fn check_arity(&self, given: usize) -> Result<()> {
        let arity = self.arity();
        if arity.accepts(given) {
            Ok(())
        } else {
            Err(Error::ArgumentCount {
                operator: self.as_str(),
                expected: arity.to_string(),
                given,
            })
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::Like => "LIKE",
            Operator::Regexp => "REGEXP",
            Operator::Between => "BETWEEN",
            Operator::In => "IN",
        }
    }

    /// Render `column <op> <args>`. Single arguments are always quoted;
    /// numeric members of `BETWEEN` and `IN` lists go in bare.
    pub fn render(&self, column: &str, args: &[Value], dialect: Dialect) -> Result<String> {
        self.check_arity(args.len())?;
        Ok(match (self, args) {
            (Operator::Eq, [Value::Null]) => format!("{} IS NULL", column),
            (Operator::Ne, [Value::Null]) => format!("{} IS NOT NULL", column),
            (Operator::Between, [low, high]) => format!(
                "{} BETWEEN {} AND {}",
                column,
                list_literal(low, dialect),
                list_literal(high, dialect)
            ),
            (Operator::In, []) => format!("{} IN (NULL)", column),
            (Operator::In, values) => {
                let values: Vec<String> = values.iter().map(|v| list_literal(v, dialect)).collect();
                format!("{} IN ({})", column, values.join(", "))
            }
            (_, [value]) => format!("{} {} {}", column, self.symbol(), literal(value, dialect)),
            _ => unreachable!("arity checked above"),
        })
    }
}

impl FromStr for Operator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Operator::all()
            .iter()
            .copied()
            .find(|op| op.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::UnknownOperator(s.to_string()))
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Quoted SQL literal for a JSON value; only JSON null stays bare
pub fn literal(value: &Value, dialect: Dialect) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(true) => dialect.quote("1"),
        Value::Bool(false) => dialect.quote("0"),
        Value::Number(n) => dialect.quote(&n.to_string()),
        Value::String(s) => dialect.quote(s),
        other => dialect.quote(&other.to_string()),
    }
}

/// `BETWEEN` and `IN` members: numbers and numeric strings go in bare
fn list_literal(value: &Value, dialect: Dialect) -> String {
    match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) if is_numeric(s) => s.clone(),
        other => literal(other, dialect),
    }
}

fn is_numeric(s: &str) -> bool {
    let digits = s.strip_prefix('-').unwrap_or(s);
    let mut parts = digits.splitn(2, '.');
    let whole = parts.next().unwrap_or_default();
    let fraction = parts.next();
    !whole.is_empty()
        && whole.bytes().all(|b| b.is_ascii_digit())
        && fraction.is_none_or(|f| !f.is_empty() && f.bytes().all(|b| b.is_ascii_digit()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn render(op: Operator, args: &[Value]) -> Result<String> {
        op.render("age", args, Dialect::Sqlite)
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(render(Operator::Eq, &[json!(31)]).unwrap(), "age = '31'");
        assert_eq!(render(Operator::Ne, &[json!("x")]).unwrap(), "age != 'x'");
        assert_eq!(render(Operator::Gte, &[json!(1.5)]).unwrap(), "age >= '1.5'");
        assert_eq!(render(Operator::Lt, &[json!("it's")]).unwrap(), "age < 'it''s'");
        assert_eq!(render(Operator::Like, &[json!("A%")]).unwrap(), "age LIKE 'A%'");
        assert_eq!(render(Operator::Regexp, &[json!("^A")]).unwrap(), "age REGEXP '^A'");
        assert_eq!(render(Operator::Eq, &[json!(true)]).unwrap(), "age = '1'");
    }

    #[test]
    fn test_null_comparisons() {
        assert_eq!(render(Operator::Eq, &[Value::Null]).unwrap(), "age IS NULL");
        assert_eq!(render(Operator::Ne, &[Value::Null]).unwrap(), "age IS NOT NULL");
    }

    #[test]
    fn test_between_arity() {
        assert_eq!(
            render(Operator::Between, &[json!(1), json!(5)]).unwrap(),
            "age BETWEEN 1 AND 5"
        );
        assert_eq!(
            render(Operator::Between, &[json!("2"), json!("z")]).unwrap(),
            "age BETWEEN 2 AND 'z'"
        );
        for args in [vec![json!(1)], vec![json!(1), json!(2), json!(3)]] {
            match render(Operator::Between, &args) {
                Err(Error::ArgumentCount { operator, given, .. }) => {
                    assert_eq!(operator, "between");
                    assert_eq!(given, args.len());
                }
                other => panic!("expected an arity error, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_in_lists() {
        assert_eq!(render(Operator::In, &[]).unwrap(), "age IN (NULL)");
        assert_eq!(
            render(Operator::In, &[json!("3"), json!("-4.5"), json!("x'y"), json!(7)]).unwrap(),
            "age IN (3, -4.5, 'x''y', 7)"
        );
        assert_eq!(render(Operator::In, &[json!("1.")]).unwrap(), "age IN ('1.')");
    }

    #[test]
    fn test_single_arity_enforced() {
        assert!(render(Operator::Eq, &[]).is_err());
        assert!(render(Operator::Lt, &[json!(1), json!(2)]).is_err());
    }

    #[test]
    fn test_parse() {
        assert_eq!("GTE".parse::<Operator>().unwrap(), Operator::Gte);
        assert!(matches!("near".parse::<Operator>(), Err(Error::UnknownOperator(_))));
    }
}
