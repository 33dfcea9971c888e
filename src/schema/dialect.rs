//! SQL dialect differences
//!
//! Statement text is generated for MySQL (the dialect the stored layout was
//! designed for) or SQLite (what the bundled gateway executes).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    MySql,
    #[default]
    Sqlite,
}

impl Dialect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::MySql => "mysql",
            Dialect::Sqlite => "sqlite",
        }
    }

    /// Escape a string for use inside single quotes
    pub fn escape(&self, value: &str) -> String {
        match self {
            Dialect::Sqlite => value.replace('\'', "''"),
            Dialect::MySql => {
                let mut out = String::with_capacity(value.len());
                for c in value.chars() {
                    match c {
                        '\0' => out.push_str("\\0"),
                        '\n' => out.push_str("\\n"),
                        '\r' => out.push_str("\\r"),
                        '\\' => out.push_str("\\\\"),
                        '\'' => out.push_str("\\'"),
                        '"' => out.push_str("\\\""),
                        '\x1a' => out.push_str("\\Z"),
                        _ => out.push(c),
                    }
                }
                out
            }
        }
    }

    /// Escape and quote a string literal
    pub fn quote(&self, value: &str) -> String {
        format!("'{}'", self.escape(value))
    }

    /// Statement that opens a write transaction
    pub fn begin_transaction(&self) -> &'static str {
        match self {
            Dialect::MySql => "START TRANSACTION",
            // Take the write lock up front so archive-then-insert cannot interleave
            Dialect::Sqlite => "BEGIN IMMEDIATE TRANSACTION",
        }
    }

    /// Scalar "largest of" function
    pub fn greatest(&self) -> &'static str {
        match self {
            Dialect::MySql => "GREATEST",
            Dialect::Sqlite => "MAX",
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
